//! Low-confidence detection.

use crate::domain::{CompetencyResult, ConfidenceIssue, ConfidenceProfile, IssueReason};

/// Flag every result whose overall confidence is below `threshold`, in
/// encounter order, capped at `max_issues`. Issues are not ranked.
pub fn detect_confidence_issues(
    results: &[CompetencyResult],
    threshold: f64,
    max_issues: usize,
) -> Vec<ConfidenceIssue> {
    results
        .iter()
        .filter(|r| r.confidence().overall < threshold)
        .take(max_issues)
        .map(|r| ConfidenceIssue {
            competency: r.competency(),
            confidence: r.confidence().overall,
            reason: classify(r.confidence(), threshold),
        })
        .collect()
}

/// Attribute low confidence to its sub-signals.
///
/// Sub-signals below `threshold` decide the reason. When neither is below it
/// but both are reported, the lower one is blamed (ties go to evidence).
/// Without usable sub-signals the issue is put down to weak evidence.
pub fn classify(profile: &ConfidenceProfile, threshold: f64) -> IssueReason {
    let evidence = profile.evidence_strength;
    let consistency = profile.internal_consistency;
    let weak_evidence = evidence.is_some_and(|v| v < threshold);
    let weak_consistency = consistency.is_some_and(|v| v < threshold);

    match (weak_evidence, weak_consistency) {
        (true, true) => IssueReason::Both,
        (true, false) => IssueReason::WeakEvidence,
        (false, true) => IssueReason::LowConsistency,
        (false, false) => match (evidence, consistency) {
            (Some(e), Some(c)) if c < e => IssueReason::LowConsistency,
            _ => IssueReason::WeakEvidence,
        },
    }
}
