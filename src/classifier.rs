//! Query admission classifier.
//!
//! A pure, lexicon-based scorer: three weighted vocabularies (providers,
//! named services, general cloud keywords) and two rejection lexicons
//! (off-topic topics, off-topic intent phrases), matched case-insensitively
//! as substrings over the normalized query. No I/O, no shared state.

use crate::domain::{Category, ClassificationResult, Query};

const PROVIDER_WEIGHT: f64 = 0.4;
const SERVICE_WEIGHT: f64 = 0.3;
const KEYWORD_WEIGHT: f64 = 0.5;

/// Below this score a query is rejected as non-cloud; at or above it, the
/// query is accepted (the ≥0.5 "confident" and [0.2, 0.5) "lenient" bands
/// from the decision table both resolve to the same accept outcome here).
const SCORE_LENIENT: f64 = 0.2;

const PROVIDERS: &[&str] = &["aws", "amazon web services", "azure", "microsoft azure", "gcp", "google cloud"];

const SERVICES: &[&str] = &[
    "ec2", "s3", "lambda", "rds", "dynamodb", "cloudfront", "route53", "vpc", "iam",
    "azure functions", "azure devops", "blob storage", "cosmos db", "aks",
    "bigquery", "gke", "cloud run", "pubsub", "cloud storage",
    "kubernetes", "docker", "terraform", "cloudformation",
];

const GENERAL_KEYWORDS: &[&str] = &[
    "cloud", "infrastructure", "server", "serverless", "container", "deploy",
    "deployment", "scalability", "scaling", "architecture", "network",
    "virtual machine", "vm", "storage", "database", "compute", "load balancer",
    "availability zone", "region", "backup", "disaster recovery", "compliance",
];

const REJECTED_TOPICS: &[&str] = &[
    "weather", "recipe", "sports score", "movie", "celebrity", "dating",
    "horoscope", "joke", "lottery",
];

const REJECTED_INTENTS: &[&str] = &[
    "write me a poem", "write a song", "tell me a story", "what's your favorite",
    "who would win", "roleplay as",
];

fn category_keywords() -> &'static [(&'static str, &'static [&'static str])] {
    &[
        ("migration", &["migrate", "migration", "lift-and-shift", "lift and shift", "rehost"]),
        ("hybrid", &["hybrid cloud", "hybrid"]),
        ("disaster-recovery", &["disaster recovery", "dr plan", "failover"]),
        ("security", &["security", "encryption", "firewall", "compliance", "vulnerability", "iam"]),
        ("networking", &["network", "vpc", "subnet", "load balancer", "dns", "route53"]),
        ("storage", &["storage", "s3", "blob storage", "cloud storage", "bucket"]),
        ("compute", &["compute", "ec2", "virtual machine", "vm", "instance"]),
    ]
}

fn word_count(normalized: &str) -> usize {
    normalized.split_whitespace().count().max(1)
}

fn count_hits(haystack: &str, needles: &[&str]) -> usize {
    needles.iter().filter(|n| haystack.contains(*n)).count()
}

fn any_hit(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(*n))
}

fn provider_category(normalized: &str) -> Option<Category> {
    if any_hit(normalized, &["aws", "amazon web services"]) {
        Some(Category::Aws)
    } else if any_hit(normalized, &["azure", "microsoft azure"]) {
        Some(Category::Azure)
    } else if any_hit(normalized, &["gcp", "google cloud"]) {
        Some(Category::Gcp)
    } else {
        None
    }
}

fn dispatch_category(normalized: &str) -> Category {
    if let Some(provider) = provider_category(normalized) {
        return provider;
    }
    for (name, keywords) in category_keywords() {
        if any_hit(normalized, keywords) {
            return match *name {
                "migration" => Category::Migration,
                "hybrid" => Category::Hybrid,
                "disaster-recovery" => Category::DisasterRecovery,
                "security" => Category::Security,
                "networking" => Category::Networking,
                "storage" => Category::Storage,
                "compute" => Category::Compute,
                _ => unreachable!(),
            };
        }
    }
    Category::GeneralCloud
}

fn raw_score(normalized: &str) -> f64 {
    let provider_hits = count_hits(normalized, PROVIDERS) as f64;
    let service_hits = count_hits(normalized, SERVICES) as f64;
    let keyword_hits = count_hits(normalized, GENERAL_KEYWORDS) as f64;
    let words = word_count(normalized) as f64;

    let score = PROVIDER_WEIGHT * provider_hits.min(1.0)
        + SERVICE_WEIGHT * service_hits.min(1.0)
        + KEYWORD_WEIGHT * (keyword_hits / words);

    score.min(1.0)
}

/// Classify a query per the lexicon-weighted decision table. Pure function, no
/// side effects; two calls on the same query return identical results.
pub fn classify(query: &Query) -> ClassificationResult {
    let normalized = query.normalized();

    if normalized.is_empty() {
        return ClassificationResult {
            in_scope: false,
            category: Category::Empty,
            confidence: 1.0,
            rejection_reason: Some("empty query".to_string()),
        };
    }

    if any_hit(&normalized, REJECTED_TOPICS) {
        return ClassificationResult {
            in_scope: false,
            category: Category::Rejected,
            confidence: 0.95,
            rejection_reason: Some("off-topic subject".to_string()),
        };
    }

    let score = raw_score(&normalized);
    let rejected_intent_hits = count_hits(&normalized, REJECTED_INTENTS);

    if rejected_intent_hits >= 2 && score < SCORE_LENIENT {
        return ClassificationResult {
            in_scope: false,
            category: Category::General,
            confidence: 0.8,
            rejection_reason: Some("off-topic intent".to_string()),
        };
    }

    if score >= SCORE_LENIENT {
        return ClassificationResult {
            in_scope: true,
            category: dispatch_category(&normalized),
            confidence: score,
            rejection_reason: None,
        };
    }

    ClassificationResult {
        in_scope: false,
        category: Category::NonCloud,
        confidence: 1.0 - score,
        rejection_reason: Some("query does not appear to be cloud-related".to_string()),
    }
}

/// The exact user-visible string for an admission rejection.
pub const REJECTION_MESSAGE: &str = "I'm specialized in cloud architecture and solutions. Please ask about AWS, Azure, GCP, migrations, security, compliance, or infrastructure topics.";
