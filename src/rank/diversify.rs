//! Result diversification: hard per-table and per-parent-document caps
//! applied to the scored list before truncation, so one table or document
//! cannot monopolize the output.

use std::collections::HashMap;
use tracing::debug;

use super::types::RankedCandidate;
use super::TARGET_RANK;
use crate::config::DiversityCaps;

/// Apply diversification caps to an already-sorted candidate list, then
/// truncate to `limit`.
pub fn diversify(
    ranked: Vec<RankedCandidate>,
    caps: &DiversityCaps,
    limit: usize,
) -> Vec<RankedCandidate> {
    let mut per_table: HashMap<String, usize> = HashMap::new();
    let mut per_parent: HashMap<String, usize> = HashMap::new();
    let mut kept = Vec::new();
    let mut skipped = 0usize;

    for candidate in ranked {
        if kept.len() >= limit {
            break;
        }

        let table_count = per_table.entry(candidate.candidate.table.clone()).or_insert(0);
        if *table_count >= caps.per_table {
            skipped += 1;
            continue;
        }

        if let Some(parent) = &candidate.candidate.parent_doc {
            let parent_count = per_parent.entry(parent.clone()).or_insert(0);
            if *parent_count >= caps.per_parent_doc {
                skipped += 1;
                continue;
            }
            *parent_count += 1;
        }

        *table_count += 1;
        kept.push(candidate);
    }

    if skipped > 0 {
        debug!(
            target: TARGET_RANK,
            "Diversification skipped {} candidates over table/document caps", skipped
        );
    }

    kept
}
