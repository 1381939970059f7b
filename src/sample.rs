use crate::alignment::Aligner;
use crate::chimera;
use crate::collapse::{self, IterPar};
use crate::error::{HapError, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Clustering state of one sample. Only the worker that owns the sample
/// mutates it; later phases reload it from its checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleCollapse {
    pub name: String,
    pub replicates: Vec<ReplicateInfo>,
    /// Raw reads, drained into clusters by `cluster`
    pub input: Vec<Read>,
    pub included: Vec<Cluster>,
    pub excluded: Vec<Cluster>,
}

fn by_fraction_then_uid(a: &Cluster, b: &Cluster) -> Ordering {
    b.fraction
        .partial_cmp(&a.fraction)
        .unwrap_or(Ordering::Equal)
        .then(a.uid.cmp(&b.uid))
}

impl SampleCollapse {
    pub fn new(name: impl Into<String>, replicate_names: &[String], reads: Vec<Read>) -> Self {
        let replicates = replicate_names
            .iter()
            .map(|rep| ReplicateInfo {
                name: rep.clone(),
                input_reads: reads.iter().filter(|r| &r.replicate == rep).map(|r| r.count).sum(),
            })
            .collect();
        Self {
            name: name.into(),
            replicates,
            input: reads,
            included: vec![],
            excluded: vec![],
        }
    }

    pub fn input_read_count(&self) -> u64 {
        self.replicates.iter().map(|r| r.input_reads).sum()
    }

    pub fn cluster_count(&self) -> usize {
        self.included.len() + self.excluded.len()
    }

    pub fn all_clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.included.iter().chain(self.excluded.iter())
    }

    /// Group identical reads, then run the merge schedule. Every input read
    /// ends up in exactly one included cluster.
    pub fn cluster(&mut self, schedule: &[IterPar], aligner: &mut Aligner) {
        let reads = std::mem::take(&mut self.input);
        let n_reads = reads.len();
        let mut by_seq: BTreeMap<Vec<u8>, Vec<Read>> = BTreeMap::new();
        for read in reads {
            by_seq.entry(read.seq.clone()).or_default().push(read);
        }
        let clusters: Vec<Cluster> = by_seq
            .into_values()
            .enumerate()
            .map(|(uid, reads)| Cluster::from_reads(uid as u32, reads))
            .collect();
        let n_unique = clusters.len();
        self.included = collapse::collapse(clusters, schedule, aligner);
        self.excluded.clear();
        self.update_after_exclusion();
        self.rename_clusters();
        log::debug!(
            "{}: {} reads, {} unique sequences, {} clusters",
            self.name,
            n_reads,
            n_unique,
            self.included.len()
        );
    }

    /// Flag recombinant clusters' reads as chimeric, then mark clusters whose
    /// chimeric read share reaches `chi_cutoff`.
    pub fn mark_chimeras(&mut self, chi_cutoff: f64, parent_freq_multiplier: f64, aligner: &mut Aligner) -> usize {
        let found = chimera::detect_chimeras(&self.included, parent_freq_multiplier, aligner);
        for info in &found {
            for read in self.included[info.query_idx].reads.iter_mut() {
                read.mark_chimeric();
            }
        }
        let mut marked = 0;
        for clus in self.included.iter_mut() {
            let share = clus.chimeric_read_fraction();
            if share > 0.0 && share >= chi_cutoff {
                clus.chimeric = true;
                marked += 1;
            }
        }
        log::debug!("{}: marked {} chimeric clusters", self.name, marked);
        marked
    }

    /// Tag every cluster whose uid is listed; included ones move to excluded.
    /// Existing tags are never removed.
    pub fn apply_exclusion(&mut self, uids: &BTreeSet<u32>, reason: ExclusionReason) -> usize {
        if uids.is_empty() {
            return 0;
        }
        for clus in self.excluded.iter_mut() {
            if uids.contains(&clus.uid) {
                clus.meta.add_reason(reason);
            }
        }
        let (failing, passing): (Vec<Cluster>, Vec<Cluster>) = std::mem::take(&mut self.included)
            .into_iter()
            .partition(|c| uids.contains(&c.uid));
        self.included = passing;
        let moved = failing.len();
        for mut clus in failing {
            clus.meta.add_reason(reason);
            self.excluded.push(clus);
        }
        if moved > 0 {
            log::debug!("{}: excluded {} clusters ({})", self.name, moved, reason.tag_key());
        }
        moved
    }

    fn failing_uids(&self, fails: impl Fn(&Cluster) -> bool) -> BTreeSet<u32> {
        self.all_clusters().filter(|c| fails(c)).map(|c| c.uid).collect()
    }

    pub fn exclude_by_replicate_count(&mut self, required: usize) -> usize {
        let uids = self.failing_uids(|c| c.replicate_count() < required);
        let moved = self.apply_exclusion(&uids, ExclusionReason::FailedReplicateCount);
        self.update_after_exclusion();
        moved
    }

    /// Exclude clusters below `cutoff`. Unless `final_average_only`, a cluster
    /// also fails when any replicate it occurs in is below the cutoff.
    pub fn exclude_on_frac(&mut self, cutoff: f64, final_average_only: bool) -> usize {
        let uids = self.failing_uids(|c| {
            c.fraction < cutoff
                || (!final_average_only && c.replicate_fracs.values().any(|f| *f < cutoff))
        });
        let moved = self.apply_exclusion(&uids, ExclusionReason::FailedFracCutOff);
        self.update_after_exclusion();
        moved
    }

    /// Exclude clusters one edit away from an included cluster more than
    /// `multiplier` times as frequent.
    pub fn exclude_low_freq_one_offs(&mut self, multiplier: f64, aligner: &mut Aligner) -> usize {
        let mut uids = BTreeSet::new();
        for clus in self.included.iter().chain(self.excluded.iter()) {
            for other in &self.included {
                if other.uid == clus.uid || other.fraction <= clus.fraction * multiplier {
                    continue;
                }
                if aligner.compare(&other.seq, &clus.seq).is_one_off() {
                    uids.insert(clus.uid);
                    break;
                }
            }
        }
        let moved = self.apply_exclusion(&uids, ExclusionReason::FailedLowFreqOneOff);
        self.update_after_exclusion();
        moved
    }

    /// Move clusters already marked chimeric; does not re-run detection.
    pub fn exclude_chimeras_no_remark(&mut self) -> usize {
        let uids = self.failing_uids(|c| c.chimeric);
        let moved = self.apply_exclusion(&uids, ExclusionReason::Chimeric);
        self.update_after_exclusion();
        moved
    }

    /// Reinstate excluded clusters at `positions`, clearing chimeric flags on
    /// the cluster and its reads.
    pub fn rescue(&mut self, positions: &[usize]) -> usize {
        let mut positions: Vec<usize> = positions.iter().copied().filter(|p| *p < self.excluded.len()).collect();
        positions.sort_unstable_by(|a, b| b.cmp(a));
        positions.dedup();
        for &pos in &positions {
            let mut clus = self.excluded.remove(pos);
            clus.unmark_chimeric();
            clus.meta.mark_rescued();
            log::debug!("{}: rescued {}", self.name, clus.display_name());
            self.included.push(clus);
        }
        if !positions.is_empty() {
            self.update_after_exclusion();
            self.rename_clusters();
        }
        positions.len()
    }

    /// Recompute fractions of included clusters against included reads only.
    /// Excluded clusters keep the fraction they had when excluded.
    pub fn update_after_exclusion(&mut self) {
        let mut totals: BTreeMap<String, u64> = BTreeMap::new();
        for clus in &self.included {
            for read in &clus.reads {
                *totals.entry(read.replicate.clone()).or_insert(0) += read.count;
            }
        }
        let n_reps = totals.values().filter(|t| **t > 0).count();
        for clus in self.included.iter_mut() {
            let mut fracs = BTreeMap::new();
            for (rep, total) in &totals {
                let cnt = clus.count_in_replicate(rep);
                if cnt > 0 && *total > 0 {
                    fracs.insert(rep.clone(), cnt as f64 / *total as f64);
                }
            }
            clus.fraction = if n_reps == 0 {
                0.0
            } else {
                fracs.values().sum::<f64>() / n_reps as f64
            };
            clus.replicate_fracs = fracs;
        }
    }

    /// Rank clusters by descending fraction, ties by uid. Idempotent.
    pub fn rename_clusters(&mut self) {
        self.included.sort_by(by_fraction_then_uid);
        for (rank, clus) in self.included.iter_mut().enumerate() {
            clus.name = format!("{}.{:02}", self.name, rank);
        }
        self.excluded.sort_by(by_fraction_then_uid);
        for (rank, clus) in self.excluded.iter_mut().enumerate() {
            clus.name = format!("{}.x{:02}", self.name, rank);
        }
    }

    /// Label every cluster with its closest expected sequence.
    pub fn check_against_expected(&mut self, expected: &[RefSeq], aligner: &mut Aligner) -> Result<()> {
        if expected.is_empty() {
            return Ok(());
        }
        for clus in self.included.iter_mut().chain(self.excluded.iter_mut()) {
            clus.expects = Some(classify_against_expected(&clus.seq, expected, aligner));
        }
        for clus in self.all_clusters() {
            log::trace!("{} : {:?}", clus.name, clus.expects);
            if clus.expects.as_deref().map(str::is_empty).unwrap_or(true) {
                return Err(HapError::internal(format!(
                    "expected-sequence classification is blank for {} in sample {}",
                    clus.display_name(),
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Name of the closest expected sequence, suffixed with the error profile
/// unless the match is exact.
pub fn classify_against_expected(seq: &[u8], expected: &[RefSeq], aligner: &mut Aligner) -> String {
    let mut best: Option<(&RefSeq, crate::alignment::Comparison)> = None;
    for reference in expected {
        let comp = aligner.compare(&reference.seq, seq);
        let better = best
            .as_ref()
            .map(|(_, b)| comp.total_errors() < b.total_errors())
            .unwrap_or(true);
        if better {
            best = Some((reference, comp));
        }
    }
    match best {
        Some((reference, comp)) if comp.is_identical() && reference.seq == seq => reference.name.clone(),
        Some((reference, comp)) => format!(
            "{}_mis:{}_1bI:{}_2bI:{}_lbI:{}",
            reference.name, comp.mismatches, comp.one_base_indels, comp.two_base_indels, comp.large_indels
        ),
        None => String::new(),
    }
}
