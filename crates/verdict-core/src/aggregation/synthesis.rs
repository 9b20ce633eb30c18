//! Narrative synthesis: highlights and a one-line summary.

use serde::{Deserialize, Serialize};

use crate::domain::CompetencyResult;

use super::Recommendation;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    /// Drawn from the highest-scoring competencies first.
    pub strengths: Vec<String>,
    /// Drawn from the lowest-scoring competencies first.
    pub weaknesses: Vec<String>,
    pub summary: String,
}

/// Collect up to `limit` distinct items, visiting `ordered` results in turn.
fn highlights<'a, F>(ordered: &[&'a CompetencyResult], limit: usize, items: F) -> Vec<String>
where
    F: Fn(&'a CompetencyResult) -> &'a [String],
{
    let mut out: Vec<String> = Vec::new();
    for item in ordered.iter().flat_map(|r| items(*r)) {
        if out.len() == limit {
            break;
        }
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}

pub(crate) fn synthesize(
    effective: &[CompetencyResult],
    weighted_score: f64,
    recommendation: Recommendation,
    limit: usize,
) -> Synthesis {
    // Stable sorts: ties keep competency declaration order.
    let mut best: Vec<&CompetencyResult> = effective.iter().collect();
    best.sort_by(|a, b| b.score().total_cmp(&a.score()));
    let mut worst: Vec<&CompetencyResult> = effective.iter().collect();
    worst.sort_by(|a, b| a.score().total_cmp(&b.score()));

    let strengths = highlights(&best, limit, CompetencyResult::strengths);
    let weaknesses = highlights(&worst, limit, CompetencyResult::weaknesses);

    let mut summary = format!("{recommendation} at {weighted_score:.1}/100");
    if let (Some(top), Some(bottom)) = (best.first(), worst.first()) {
        if top.competency() == bottom.competency() {
            let name = top.competency().display_name();
            summary.push_str(&format!(", assessed on {name}"));
        } else {
            summary.push_str(&format!(
                ", strongest in {} ({:.0}), weakest in {} ({:.0})",
                top.competency().display_name(),
                top.score(),
                bottom.competency().display_name(),
                bottom.score()
            ));
        }
    }
    summary.push('.');
    if let Some(s) = strengths.first() {
        summary.push_str(&format!(" Key strength: {s}."));
    }
    if let Some(w) = weaknesses.first() {
        summary.push_str(&format!(" Key concern: {w}."));
    }

    Synthesis {
        strengths,
        weaknesses,
        summary,
    }
}
