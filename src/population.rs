use crate::alignment::Aligner;
use crate::collapse::{self, Collapsible, IterPar};
use crate::error::{HapError, Result};
use crate::sample::classify_against_expected;
use crate::types::*;
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// A sample's included cluster as seen by the population phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubClusterRef {
    pub key: ClusterKey,
    pub name: String,
    pub seq: Vec<u8>,
    pub count: u64,
    pub fraction: f64,
}

impl SubClusterRef {
    pub fn from_cluster(sample: &str, clus: &Cluster) -> Self {
        Self {
            key: clus.key(sample),
            name: clus.name.clone(),
            seq: clus.seq.clone(),
            count: clus.count,
            fraction: clus.fraction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopCluster {
    pub name: String,
    pub seq: Vec<u8>,
    /// Reads over every member
    pub count: u64,
    /// Sum of member fractions; the abundance used for population merging
    pub frac_sum: f64,
    pub members: Vec<SubClusterRef>,
    pub expects: Option<String>,
}

impl PopCluster {
    fn new(seq: Vec<u8>, members: Vec<SubClusterRef>) -> Self {
        Self {
            name: String::new(),
            count: members.iter().map(|m| m.count).sum(),
            frac_sum: members.iter().map(|m| m.fraction).sum(),
            seq,
            members,
            expects: None,
        }
    }

    pub fn samples(&self) -> BTreeSet<&str> {
        self.members.iter().map(|m| m.key.sample.as_str()).collect()
    }

    pub fn sample_count(&self) -> usize {
        self.samples().len()
    }

    /// Mean fraction over the samples the haplotype occurs in
    pub fn mean_sample_fraction(&self) -> f64 {
        let n = self.sample_count();
        if n == 0 {
            0.0
        } else {
            self.frac_sum / n as f64
        }
    }

    pub fn fraction_in(&self, sample: &str) -> f64 {
        self.members
            .iter()
            .filter(|m| m.key.sample == sample)
            .map(|m| m.fraction)
            .sum()
    }
}

impl Collapsible for PopCluster {
    fn seq(&self) -> &[u8] {
        &self.seq
    }

    fn abundance(&self) -> f64 {
        self.frac_sum
    }

    fn absorb(&mut self, other: Self) {
        self.count += other.count;
        self.frac_sum += other.frac_sum;
        self.members.extend(other.members);
    }
}

/// Cross-sample haplotypes plus the index from sample clusters to the
/// population cluster holding them. Always rebuilt whole by `aggregate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationCollapse {
    pub experiment: String,
    pub num_samples: usize,
    pub clusters: Vec<PopCluster>,
    sub_clusters_positions: FxHashMap<ClusterKey, usize>,
}

impl PopulationCollapse {
    pub fn aggregate(
        experiment: &str,
        inputs: Vec<SubClusterRef>,
        num_samples: usize,
        schedule: &[IterPar],
        aligner: &mut Aligner,
    ) -> Self {
        let n_inputs = inputs.len();
        let mut by_seq: BTreeMap<Vec<u8>, Vec<SubClusterRef>> = BTreeMap::new();
        for sub in inputs {
            by_seq.entry(sub.seq.clone()).or_default().push(sub);
        }
        let grouped: Vec<PopCluster> = by_seq
            .into_iter()
            .map(|(seq, mut members)| {
                members.sort_by(|a, b| a.key.cmp(&b.key));
                PopCluster::new(seq, members)
            })
            .collect();

        let mut clusters = collapse::collapse(grouped, schedule, aligner);
        for clus in clusters.iter_mut() {
            clus.members.sort_by(|a, b| a.key.cmp(&b.key));
        }
        clusters.sort_by(|a, b| {
            b.sample_count()
                .cmp(&a.sample_count())
                .then(b.frac_sum.partial_cmp(&a.frac_sum).unwrap_or(Ordering::Equal))
                .then(a.seq.cmp(&b.seq))
        });
        for (idx, clus) in clusters.iter_mut().enumerate() {
            clus.name = format!("{}.{:02}", experiment, idx);
        }

        let mut sub_clusters_positions = FxHashMap::default();
        for (idx, clus) in clusters.iter().enumerate() {
            for member in &clus.members {
                sub_clusters_positions.insert(member.key.clone(), idx);
            }
        }
        log::debug!(
            "Population clustering: {} sample clusters from {} samples -> {} haplotypes",
            n_inputs,
            num_samples,
            clusters.len()
        );
        Self {
            experiment: experiment.to_string(),
            num_samples,
            clusters,
            sub_clusters_positions,
        }
    }

    pub fn position_of(&self, key: &ClusterKey) -> Option<usize> {
        self.sub_clusters_positions.get(key).copied()
    }

    pub fn cluster_of(&self, key: &ClusterKey) -> Option<&PopCluster> {
        self.position_of(key).map(|pos| &self.clusters[pos])
    }

    pub fn total_members(&self) -> usize {
        self.sub_clusters_positions.len()
    }

    /// Population cluster of `key`; a missing entry means the index and the
    /// sample checkpoints have drifted apart.
    pub fn require_cluster_of(&self, key: &ClusterKey) -> Result<&PopCluster> {
        self.cluster_of(key).ok_or_else(|| {
            HapError::internal(format!("sample cluster {} has no population cluster", key))
        })
    }

    /// Reuse names of previously published haplotypes with identical
    /// sequences; unmatched haplotypes are numbered after them.
    pub fn rename_with_previous(&mut self, previous: &[RefSeq]) {
        let mut next = previous.len();
        let mut matched = 0;
        for clus in self.clusters.iter_mut() {
            if let Some(prev) = previous.iter().find(|p| p.seq == clus.seq) {
                clus.name = prev.name.clone();
                matched += 1;
            } else {
                clus.name = format!("{}.{:02}", self.experiment, next);
                next += 1;
            }
        }
        log::info!(
            "Renamed population: {} of {} haplotypes match the previous population",
            matched,
            self.clusters.len()
        );
    }

    pub fn compare_to_refs(&mut self, refs: &[RefSeq], aligner: &mut Aligner) -> Result<()> {
        if refs.is_empty() {
            return Ok(());
        }
        for clus in self.clusters.iter_mut() {
            let expects = classify_against_expected(&clus.seq, refs, aligner);
            if expects.is_empty() {
                return Err(HapError::internal(format!(
                    "expected-sequence classification is blank for population cluster {}",
                    clus.name
                )));
            }
            clus.expects = Some(expects);
        }
        Ok(())
    }
}
