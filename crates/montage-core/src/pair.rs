//! Merging of co-located narration-derived and visual-derived hits.
//!
//! Hits from both search collections, across every query, are grouped by
//! their `(source_id, start, end)` window. Within a group the best-scoring
//! hit of each kind is kept, so a window retrieved by several queries
//! becomes a single segment ranked by its strongest score.

use std::collections::HashMap;

use crate::models::{CandidateKind, PairedSegment, ScoredCandidate, SegmentKey};

/// Group scored hits into [`PairedSegment`]s, in first-seen order.
///
/// Groups without a visual member are kept in the output but are not
/// [eligible](PairedSegment::is_eligible) for selection.
pub fn pair_segments(scored: &[ScoredCandidate]) -> Vec<PairedSegment> {
    let mut index: HashMap<SegmentKey, usize> = HashMap::new();
    let mut groups: Vec<PairedSegment> = Vec::new();

    for sc in scored {
        let key = sc.candidate.key();
        let slot = match index.get(&key) {
            Some(&i) => i,
            None => {
                groups.push(PairedSegment {
                    key: key.clone(),
                    visual: None,
                    narration: None,
                });
                index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };

        let group = &mut groups[slot];
        let member = match sc.candidate.kind {
            CandidateKind::VisualDerived => &mut group.visual,
            CandidateKind::NarrationDerived => &mut group.narration,
        };
        let replace = match member {
            Some(existing) => sc.composite_score > existing.composite_score,
            None => true,
        };
        if replace {
            *member = Some(sc.clone());
        }
    }

    groups
}
