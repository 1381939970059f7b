use crate::constants::*;
use crate::error::{HapError, Result};
use block_aligner::{cigar::*, scan_block::*, scores::*};
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlnOp {
    Match,
    Mismatch,
    /// Consumes query only
    Ins,
    /// Consumes reference only
    Del,
}

/// Error profile between two sequences, the currency of every merge and
/// one-off decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub mismatches: u32,
    pub one_base_indels: u32,
    pub two_base_indels: u32,
    pub large_indels: u32,
}

impl Comparison {
    pub fn total_errors(&self) -> u32 {
        self.mismatches + self.one_base_indels + self.two_base_indels + self.large_indels
    }

    pub fn is_identical(&self) -> bool {
        self.total_errors() == 0
    }

    /// Exactly one substitution or one single-base indel
    pub fn is_one_off(&self) -> bool {
        self.mismatches + self.one_base_indels == 1
            && self.two_base_indels == 0
            && self.large_indels == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlnResult {
    pub score: i32,
    pub ops: Vec<(AlnOp, u32)>,
}

impl AlnResult {
    fn identical(len: usize) -> Self {
        let ops = if len == 0 { vec![] } else { vec![(AlnOp::Match, len as u32)] };
        Self {
            score: len as i32,
            ops,
        }
    }

    pub fn comparison(&self, count_end_gaps: bool) -> Comparison {
        let mut comp = Comparison::default();
        let first_aligned = self
            .ops
            .iter()
            .position(|(op, _)| matches!(op, AlnOp::Match | AlnOp::Mismatch));
        let last_aligned = self
            .ops
            .iter()
            .rposition(|(op, _)| matches!(op, AlnOp::Match | AlnOp::Mismatch));
        for (i, &(op, len)) in self.ops.iter().enumerate() {
            match op {
                AlnOp::Match => {}
                AlnOp::Mismatch => comp.mismatches += len,
                AlnOp::Ins | AlnOp::Del => {
                    let end_gap = match (first_aligned, last_aligned) {
                        (Some(first), Some(last)) => i < first || i > last,
                        _ => true,
                    };
                    if end_gap && !count_end_gaps {
                        continue;
                    }
                    match len {
                        1 => comp.one_base_indels += 1,
                        2 => comp.two_base_indels += 1,
                        _ => comp.large_indels += 1,
                    }
                }
            }
        }
        comp
    }

    /// Query bases matched perfectly from the start of the alignment
    pub fn leading_match_len(&self) -> usize {
        self.ops
            .iter()
            .take_while(|(op, _)| *op == AlnOp::Match)
            .map(|(_, len)| *len as usize)
            .sum()
    }

    /// Query bases matched perfectly back from the end of the alignment
    pub fn trailing_match_len(&self) -> usize {
        self.ops
            .iter()
            .rev()
            .take_while(|(op, _)| *op == AlnOp::Match)
            .map(|(_, len)| *len as usize)
            .sum()
    }
}

type CacheMap = FxHashMap<(Vec<u8>, Vec<u8>), AlnResult>;

/// Alignment results shared by every engine instance. Entries are only
/// added; two threads racing on the same pair both compute it and the
/// first insert wins.
#[derive(Debug, Clone, Default)]
pub struct AlnCache {
    entries: Arc<RwLock<CacheMap>>,
}

impl AlnCache {
    pub fn get(&self, reference: &[u8], query: &[u8]) -> Option<AlnResult> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&(reference.to_vec(), query.to_vec())).cloned()
    }

    pub fn insert(&self, reference: &[u8], query: &[u8], result: AlnResult) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry((reference.to_vec(), query.to_vec()))
            .or_insert(result);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge a previously written cache; a missing file is not an error.
    pub fn load_from_dir(&self, dir: &Path) -> Result<usize> {
        let path = dir.join(ALN_CACHE_FILE);
        if !path.exists() {
            log::debug!("No alignment cache at {}", path.display());
            return Ok(0);
        }
        let loaded: CacheMap = bincode::deserialize_from(BufReader::new(File::open(&path)?))
            .map_err(|source| HapError::Checkpoint {
                path: path.clone(),
                source,
            })?;
        let n = loaded.len();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for (key, value) in loaded {
            entries.entry(key).or_insert(value);
        }
        log::info!("Loaded {} cached alignments from {}", n, path.display());
        Ok(n)
    }

    pub fn write_to_dir(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(ALN_CACHE_FILE);
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        bincode::serialize_into(BufWriter::new(File::create(&path)?), &*entries).map_err(
            |source| HapError::Checkpoint {
                path: path.clone(),
                source,
            },
        )?;
        log::info!("Wrote {} cached alignments to {}", entries.len(), path.display());
        Ok(())
    }
}

/// One alignment engine. Engines are never shared between threads; clones
/// share the cache but keep their own counters.
#[derive(Debug, Clone)]
pub struct Aligner {
    cache: AlnCache,
    pub count_end_gaps: bool,
    /// Run-wide upper block size; sized per pair when unset
    block_size: Option<usize>,
    pub alignments_done: u64,
}

impl Aligner {
    pub fn new(cache: AlnCache, count_end_gaps: bool) -> Self {
        Self {
            cache,
            count_end_gaps,
            block_size: None,
            alignments_done: 0,
        }
    }

    /// Fix the block size for every alignment from the longest input sequence.
    pub fn sized_for(mut self, max_seq_len: usize) -> Self {
        self.block_size = Some(block_size_from_len(max_seq_len));
        self
    }

    pub fn cache(&self) -> &AlnCache {
        &self.cache
    }

    pub fn align(&mut self, reference: &[u8], query: &[u8]) -> AlnResult {
        if let Some(hit) = self.cache.get(reference, query) {
            return hit;
        }
        let result = global_align(reference, query, self.block_size);
        self.alignments_done += 1;
        self.cache.insert(reference, query, result.clone());
        result
    }

    pub fn compare(&mut self, reference: &[u8], query: &[u8]) -> Comparison {
        let count_end_gaps = self.count_end_gaps;
        self.align(reference, query).comparison(count_end_gaps)
    }
}

#[inline]
fn block_size_from_len(seq_length: usize) -> usize {
    if seq_length > 1000 {
        MAX_BLOCK_SIZE
    } else if seq_length > 200 {
        128
    } else {
        64
    }
}

fn global_align(reference: &[u8], query: &[u8], block_size: Option<usize>) -> AlnResult {
    if reference == query {
        return AlnResult::identical(query.len());
    }
    if reference.is_empty() || query.is_empty() {
        let mut ops = vec![];
        if !query.is_empty() {
            ops.push((AlnOp::Ins, query.len() as u32));
        }
        if !reference.is_empty() {
            ops.push((AlnOp::Del, reference.len() as u32));
        }
        let len = query.len().max(reference.len()) as i32;
        return AlnResult {
            score: GAPS.open as i32 + GAPS.extend as i32 * (len - 1),
            ops,
        };
    }

    let max_bs = block_size.unwrap_or_else(|| block_size_from_len(query.len().max(reference.len())));
    let mut a = Block::<true, false>::new(query.len(), reference.len(), max_bs);
    let reference_pad = PaddedBytes::from_bytes::<NucMatrix>(reference, max_bs);
    let query_pad = PaddedBytes::from_bytes::<NucMatrix>(query, max_bs);
    a.align(
        &query_pad,
        &reference_pad,
        &SUB_MATRIX,
        GAPS,
        MIN_BLOCK_SIZE..=max_bs,
        i32::MAX,
    );
    let res = a.res();
    let mut cigar = Cigar::new(res.query_idx, res.reference_idx);
    a.trace().cigar_eq(
        &query_pad,
        &reference_pad,
        res.query_idx,
        res.reference_idx,
        &mut cigar,
    );

    let mut ops: Vec<(AlnOp, u32)> = vec![];
    let mut push = |op: AlnOp, len: u32| {
        if len == 0 {
            return;
        }
        match ops.last_mut() {
            Some((last, last_len)) if *last == op => *last_len += len,
            _ => ops.push((op, len)),
        }
    };
    for op_len in cigar.to_vec() {
        let op = match op_len.op {
            Operation::Eq => AlnOp::Match,
            Operation::X => AlnOp::Mismatch,
            Operation::M => AlnOp::Match,
            Operation::I => AlnOp::Ins,
            Operation::D => AlnOp::Del,
            _ => continue,
        };
        push(op, op_len.len as u32);
    }
    // Global mode should consume both sequences; close any remainder with gaps
    push(AlnOp::Ins, query.len().saturating_sub(res.query_idx) as u32);
    push(AlnOp::Del, reference.len().saturating_sub(res.reference_idx) as u32);

    log::trace!(
        "aligned {}bp query to {}bp reference, score {}",
        query.len(),
        reference.len(),
        res.score
    );

    AlnResult {
        score: res.score,
        ops,
    }
}
