use crate::alignment::{Aligner, Comparison};
use crate::error::HapError;
use crate::types::Cluster;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Error allowance for one round of iterative merging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterPar {
    /// Candidate parents compared before giving up on a cluster
    pub stop_check: usize,
    pub mismatches: u32,
    pub one_base_indels: u32,
    pub two_base_indels: u32,
    pub large_indels: u32,
    /// A parent must be at least this many times as abundant as the child
    pub parent_fold: f64,
}

impl IterPar {
    pub fn exact() -> Self {
        Self {
            stop_check: 100,
            mismatches: 0,
            one_base_indels: 0,
            two_base_indels: 0,
            large_indels: 0,
            parent_fold: 1.0,
        }
    }

    pub fn passes(&self, comp: &Comparison) -> bool {
        comp.mismatches <= self.mismatches
            && comp.one_base_indels <= self.one_base_indels
            && comp.two_base_indels <= self.two_base_indels
            && comp.large_indels <= self.large_indels
    }

    pub fn header() -> &'static str {
        "iteration\tstopCheck\tmismatches\toneBaseIndel\ttwoBaseIndel\tlargeBaseIndel\tparentFold"
    }
}

/// `stop:mismatches:oneBaseIndels:twoBaseIndels:largeIndels:parentFold`
impl FromStr for IterPar {
    type Err = HapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split(':').collect();
        if fields.len() != 6 {
            return Err(HapError::config(format!(
                "iteration parameters need 6 colon separated fields, got {} in '{}'",
                fields.len(),
                s
            )));
        }
        let int = |i: usize| -> Result<u32, HapError> {
            fields[i]
                .parse::<u32>()
                .map_err(|e| HapError::config(format!("bad field '{}' in '{}': {}", fields[i], s, e)))
        };
        let parent_fold = fields[5]
            .parse::<f64>()
            .map_err(|e| HapError::config(format!("bad parent fold '{}' in '{}': {}", fields[5], s, e)))?;
        if parent_fold < 1.0 {
            return Err(HapError::config(format!("parent fold must be >= 1, got {}", parent_fold)));
        }
        Ok(Self {
            stop_check: int(0)?.max(1) as usize,
            mismatches: int(1)?,
            one_base_indels: int(2)?,
            two_base_indels: int(3)?,
            large_indels: int(4)?,
            parent_fold,
        })
    }
}

impl fmt::Display for IterPar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.stop_check,
            self.mismatches,
            self.one_base_indels,
            self.two_base_indels,
            self.large_indels,
            self.parent_fold
        )
    }
}

/// Default per-sample schedule: exact, then one error, then two
pub fn default_sample_schedule() -> Vec<IterPar> {
    vec![
        IterPar::exact(),
        IterPar {
            mismatches: 1,
            one_base_indels: 1,
            parent_fold: 10.0,
            ..IterPar::exact()
        },
        IterPar {
            mismatches: 2,
            one_base_indels: 1,
            parent_fold: 20.0,
            ..IterPar::exact()
        },
    ]
}

pub fn default_pop_schedule() -> Vec<IterPar> {
    vec![IterPar::exact()]
}

/// Anything the iterative merge can work on: sample clusters absorb reads,
/// population clusters absorb sample sub-clusters.
pub trait Collapsible {
    fn seq(&self) -> &[u8];
    fn abundance(&self) -> f64;
    /// The receiver keeps its representative sequence
    fn absorb(&mut self, other: Self);
}

impl Collapsible for Cluster {
    fn seq(&self) -> &[u8] {
        &self.seq
    }

    fn abundance(&self) -> f64 {
        self.count as f64
    }

    fn absorb(&mut self, other: Self) {
        self.count += other.count;
        self.reads.extend(other.reads);
    }
}

fn sort_by_abundance<C: Collapsible>(clusters: &mut [C]) {
    // stable, so ties keep the caller's deterministic order
    clusters.sort_by(|a, b| {
        b.abundance()
            .partial_cmp(&a.abundance())
            .unwrap_or(Ordering::Equal)
    });
}

/// One merge round. Clusters are visited from least to most abundant and
/// merged into the first sufficiently abundant cluster within the allowance.
fn collapse_round<C: Collapsible>(clusters: Vec<C>, par: &IterPar, aligner: &mut Aligner) -> Vec<C> {
    let mut slots: Vec<Option<C>> = clusters.into_iter().map(Some).collect();
    for i in (1..slots.len()).rev() {
        let mut target = None;
        if let Some(child) = slots[i].as_ref() {
            let mut checked = 0;
            for j in 0..i {
                let Some(parent) = slots[j].as_ref() else {
                    continue;
                };
                if parent.abundance() < child.abundance() * par.parent_fold {
                    continue;
                }
                checked += 1;
                let comp = aligner.compare(parent.seq(), child.seq());
                if par.passes(&comp) {
                    target = Some(j);
                    break;
                }
                if checked >= par.stop_check {
                    break;
                }
            }
        }
        if let Some(j) = target {
            if let Some(child) = slots[i].take() {
                if let Some(parent) = slots[j].as_mut() {
                    parent.absorb(child);
                }
            }
        }
    }
    let mut merged: Vec<C> = slots.into_iter().flatten().collect();
    sort_by_abundance(&mut merged);
    merged
}

/// Run every round of `schedule`. Deterministic for a given input order;
/// each round can only reduce the number of clusters.
pub fn collapse<C: Collapsible>(mut clusters: Vec<C>, schedule: &[IterPar], aligner: &mut Aligner) -> Vec<C> {
    sort_by_abundance(&mut clusters);
    for (round, par) in schedule.iter().enumerate() {
        let before = clusters.len();
        clusters = collapse_round(clusters, par, aligner);
        log::trace!(
            "collapse round {}: {} -> {} clusters",
            round + 1,
            before,
            clusters.len()
        );
    }
    clusters
}
