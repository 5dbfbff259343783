//! Pure insight-extraction and parameter-retuning math.
//!
//! Every function here is a deterministic function of its inputs; the
//! actor loop that calls them on a schedule lives in [`super::controller`].

use super::{Feedback, Verdict};
use crate::domain::{Category, Parameters};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A category with enough negative feedback to count as an underserved
/// area of the knowledge base.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeGap {
    pub topic: Category,
    pub severity: f64,
    pub negative_count: usize,
    pub suggested_actions: Vec<String>,
}

/// Snapshot of derived analytics, recomputed on every controller tick.
#[derive(Debug, Clone)]
pub struct Insights {
    pub query_patterns: HashMap<Category, f64>,
    pub knowledge_gaps: Vec<KnowledgeGap>,
    pub response_quality_trend: f64,
    pub updated_at: DateTime<Utc>,
}

/// `query_patterns[category] = positive_count / total_count`.
pub fn query_patterns(feedback: &[Feedback]) -> HashMap<Category, f64> {
    let mut totals: HashMap<Category, (u32, u32)> = HashMap::new();
    for record in feedback {
        let entry = totals.entry(record.category).or_insert((0, 0));
        entry.1 += 1;
        if record.verdict == Verdict::Positive {
            entry.0 += 1;
        }
    }
    totals.into_iter().map(|(category, (positive, total))| (category, positive as f64 / total as f64)).collect()
}

fn suggested_actions_for(category: Category) -> Vec<String> {
    match category {
        Category::Migration => vec!["Expand migration playbook coverage.".to_string(), "Add more lift-and-shift case studies.".to_string()],
        Category::Security | Category::DisasterRecovery => {
            vec!["Review and expand compliance/DR documentation.".to_string()]
        }
        Category::Hybrid | Category::CostOptimization => vec!["Broaden hybrid/cost-optimization source coverage.".to_string()],
        _ => vec!["Review recent negative feedback for this category.".to_string()],
    }
}

/// Categories with ≥2 negative records in the window.
/// Severity starts at 0.3 at the threshold and increases 0.1 per
/// additional negative record beyond that, capped at 1.0.
pub fn knowledge_gaps(feedback: &[Feedback]) -> Vec<KnowledgeGap> {
    let mut negative_counts: HashMap<Category, usize> = HashMap::new();
    for record in feedback {
        if record.verdict == Verdict::Negative {
            *negative_counts.entry(record.category).or_insert(0) += 1;
        }
    }
    negative_counts
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .map(|(category, count)| {
            let severity = (0.3 + 0.1 * (count as f64 - 2.0)).min(1.0);
            KnowledgeGap { topic: category, severity, negative_count: count, suggested_actions: suggested_actions_for(category) }
        })
        .collect()
}

fn average_quality(records: &[Feedback]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.verdict.weight()).sum::<f64>() / records.len() as f64
}

/// Split feedback in time order into two halves (newest first) and
/// compare average quality.
pub fn response_quality_trend(feedback: &[Feedback]) -> f64 {
    if feedback.len() < 2 {
        return 0.0;
    }
    let mut by_recency = feedback.to_vec();
    by_recency.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let midpoint = by_recency.len() / 2;
    let (newer, older) = by_recency.split_at(midpoint);
    average_quality(newer) - average_quality(older)
}

pub fn compute_insights(feedback: &[Feedback], now: DateTime<Utc>) -> Insights {
    Insights {
        query_patterns: query_patterns(feedback),
        knowledge_gaps: knowledge_gaps(feedback),
        response_quality_trend: response_quality_trend(feedback),
        updated_at: now,
    }
}

/// All-float mirror of `Parameters`, used internally so `chunk_limit_adjust`
/// accumulates fractional nudges before a single truncation at the end
/// smoothed in float space and truncated once, at the end of a tick.
#[derive(Debug, Clone, Copy)]
struct RawParameters {
    retrieval_threshold: f64,
    fallback_threshold: f64,
    temperature_adjust: f64,
    chunk_limit_adjust: f64,
    web_search_threshold: f64,
}

impl From<Parameters> for RawParameters {
    fn from(p: Parameters) -> Self {
        Self {
            retrieval_threshold: p.retrieval_threshold,
            fallback_threshold: p.fallback_threshold,
            temperature_adjust: p.temperature_adjust,
            chunk_limit_adjust: p.chunk_limit_adjust as f64,
            web_search_threshold: p.web_search_threshold,
        }
    }
}

impl RawParameters {
    fn finalize(self) -> Parameters {
        Parameters {
            retrieval_threshold: self.retrieval_threshold,
            fallback_threshold: self.fallback_threshold,
            temperature_adjust: self.temperature_adjust,
            chunk_limit_adjust: self.chunk_limit_adjust.trunc() as i32,
            web_search_threshold: self.web_search_threshold,
        }
        .clamped()
    }
}

/// Per-category adjustment magnitudes applied both when deriving a tick's
/// target snapshot and when nudging a one-off per-query snapshot.
fn category_nudge(category: Category, satisfaction: f64, raw: &mut RawParameters) {
    if satisfaction >= 0.6 {
        return;
    }
    let magnitude = (0.6 - satisfaction) * 0.1;
    match category {
        Category::Migration | Category::DisasterRecovery => raw.chunk_limit_adjust += magnitude,
        Category::Security => {
            raw.retrieval_threshold += magnitude;
            raw.temperature_adjust -= magnitude;
        }
        Category::Hybrid | Category::CostOptimization => raw.web_search_threshold -= magnitude,
        _ => {}
    }
}

/// Derive the un-smoothed target snapshot for a controller tick:
/// trend-driven threshold shifts, per-category nudges for low-satisfaction
/// categories, and a knowledge-gap-severity nudge.
pub fn derive_target_parameters(current: Parameters, insights: &Insights) -> Parameters {
    let mut raw = RawParameters::from(current);

    if insights.response_quality_trend <= -0.2 {
        raw.retrieval_threshold -= 0.05;
        raw.fallback_threshold -= 0.05;
    } else if insights.response_quality_trend >= 0.2 {
        raw.retrieval_threshold += 0.05;
        raw.fallback_threshold += 0.05;
    }

    for (category, satisfaction) in &insights.query_patterns {
        category_nudge(*category, *satisfaction, &mut raw);
    }

    if !insights.knowledge_gaps.is_empty() {
        let avg_severity = insights.knowledge_gaps.iter().map(|g| g.severity).sum::<f64>() / insights.knowledge_gaps.len() as f64;
        raw.web_search_threshold -= avg_severity * 0.1;
    }

    raw.finalize()
}

/// Smooth `current` 30% of the way toward `target`.
pub fn smooth_toward(current: Parameters, target: Parameters) -> Parameters {
    const SMOOTHING_FACTOR: f64 = 0.3;
    let current_raw = RawParameters::from(current);
    let target_raw = RawParameters::from(target);
    RawParameters {
        retrieval_threshold: current_raw.retrieval_threshold + (target_raw.retrieval_threshold - current_raw.retrieval_threshold) * SMOOTHING_FACTOR,
        fallback_threshold: current_raw.fallback_threshold + (target_raw.fallback_threshold - current_raw.fallback_threshold) * SMOOTHING_FACTOR,
        temperature_adjust: current_raw.temperature_adjust + (target_raw.temperature_adjust - current_raw.temperature_adjust) * SMOOTHING_FACTOR,
        chunk_limit_adjust: current_raw.chunk_limit_adjust + (target_raw.chunk_limit_adjust - current_raw.chunk_limit_adjust) * SMOOTHING_FACTOR,
        web_search_threshold: current_raw.web_search_threshold + (target_raw.web_search_threshold - current_raw.web_search_threshold) * SMOOTHING_FACTOR,
    }
    .finalize()
}

/// One-off per-query snapshot: apply the category nudge table directly to
/// the current snapshot, with no smoothing damping.
pub fn parameters_for_category(current: Parameters, category: Category, query_patterns: &HashMap<Category, f64>) -> Parameters {
    let mut raw = RawParameters::from(current);
    if let Some(satisfaction) = query_patterns.get(&category) {
        category_nudge(category, *satisfaction, &mut raw);
    }
    raw.finalize()
}
