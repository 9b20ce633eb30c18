//! Evidence conflict detection.
//!
//! Finds transcript segments that several results cite with materially
//! different quality ratings. Pure and synchronous; no agent calls.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::domain::{Citation, CompetencyResult, EvidenceConflict, SegmentId};

/// Absorbs float noise so a gap exactly at the threshold is kept.
const GAP_EPSILON: f64 = 1e-9;

/// Detect conflicts, ranked by gap (largest first) and capped at
/// `max_conflicts`.
///
/// Citations are grouped per segment in first-seen order. A segment becomes a
/// conflict when it has at least two citations and
/// `max(quality) - min(quality) >= threshold`. Repeated citations of one
/// segment by the same competency are kept as separate citations. Equal gaps
/// keep first-seen segment order.
pub fn detect_conflicts(
    results: &[CompetencyResult],
    threshold: f64,
    max_conflicts: usize,
) -> Vec<EvidenceConflict> {
    let mut order: Vec<SegmentId> = Vec::new();
    let mut by_segment: HashMap<SegmentId, Vec<Citation>> = HashMap::new();

    for result in results {
        for evidence in result.evidence() {
            let citations = by_segment
                .entry(evidence.segment_id.clone())
                .or_insert_with(|| {
                    order.push(evidence.segment_id.clone());
                    Vec::new()
                });
            citations.push(Citation {
                competency: result.competency(),
                quality: evidence.quality,
            });
        }
    }

    let mut conflicts: Vec<EvidenceConflict> = order
        .into_iter()
        .filter_map(|segment_id| {
            let citations = by_segment.remove(&segment_id)?;
            if citations.len() < 2 {
                return None;
            }
            let (min, max) = citations.iter().fold((f64::MAX, f64::MIN), |(lo, hi), c| {
                (lo.min(c.quality), hi.max(c.quality))
            });
            let gap = max - min;
            (gap + GAP_EPSILON >= threshold).then_some(EvidenceConflict {
                segment_id,
                citations,
                gap,
                priority: 0,
            })
        })
        .collect();

    conflicts.sort_by(|a, b| b.gap.partial_cmp(&a.gap).unwrap_or(Ordering::Equal));
    conflicts.truncate(max_conflicts);
    for (rank, conflict) in conflicts.iter_mut().enumerate() {
        conflict.priority = rank + 1;
    }
    conflicts
}
