use crate::alignment::Aligner;
use crate::types::*;

/// A cluster explained as the left part of one parent joined to the right
/// part of another
#[derive(Debug, Clone, PartialEq)]
pub struct ChimeraInfo {
    pub query_idx: usize,
    pub left_parent_idx: usize,
    pub right_parent_idx: usize,
    pub left_match_len: usize,
    pub right_match_len: usize,
    pub query_len: usize,
}

/// Find two-parent recombinants within one sample's clusters.
///
/// A cluster is a recombinant when:
/// 1. both parents are at least `parent_freq_multiplier` times as abundant
/// 2. its prefix matches the left parent perfectly
/// 3. its suffix matches a different right parent perfectly
/// 4. prefix and suffix together span the whole cluster sequence
pub fn detect_chimeras(
    clusters: &[Cluster],
    parent_freq_multiplier: f64,
    aligner: &mut Aligner,
) -> Vec<ChimeraInfo> {
    let mut chimeras = Vec::new();
    for (query_idx, query) in clusters.iter().enumerate() {
        let query_len = query.seq.len();
        if query_len == 0 {
            continue;
        }
        // (parent index, left match, right match)
        let mut matches: Vec<(usize, usize, usize)> = Vec::new();
        for (ref_idx, parent) in clusters.iter().enumerate() {
            if ref_idx == query_idx || parent.seq == query.seq {
                continue;
            }
            if (parent.count as f64) < query.count as f64 * parent_freq_multiplier {
                continue;
            }
            let aln = aligner.align(&parent.seq, &query.seq);
            matches.push((ref_idx, aln.leading_match_len(), aln.trailing_match_len()));
        }
        if matches.len() < 2 {
            continue;
        }

        let mut best: Option<ChimeraInfo> = None;
        for &(left_idx, left_len, _) in &matches {
            for &(right_idx, _, right_len) in &matches {
                if left_idx == right_idx || left_len + right_len < query_len {
                    continue;
                }
                let better = best
                    .as_ref()
                    .map(|b| left_len + right_len > b.left_match_len + b.right_match_len)
                    .unwrap_or(true);
                if better {
                    best = Some(ChimeraInfo {
                        query_idx,
                        left_parent_idx: left_idx,
                        right_parent_idx: right_idx,
                        left_match_len: left_len,
                        right_match_len: right_len,
                        query_len,
                    });
                }
            }
        }
        if let Some(info) = best {
            log::debug!(
                "Detected chimera: {} (count {}) = left parent {} ({}bp) + right parent {} ({}bp)",
                query.name,
                query.count,
                clusters[info.left_parent_idx].name,
                info.left_match_len,
                clusters[info.right_parent_idx].name,
                info.right_match_len
            );
            chimeras.push(info);
        }
    }
    chimeras
}
