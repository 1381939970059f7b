use crate::constants::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

/// One unique sequence from one replicate file, with its abundance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Read {
    pub name: String,
    pub seq: Vec<u8>,
    pub count: u64,
    pub replicate: String,
    pub chimeric: bool,
}

impl Read {
    pub fn new(name: impl Into<String>, seq: Vec<u8>, count: u64, replicate: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seq,
            count,
            replicate: replicate.into(),
            chimeric: false,
        }
    }

    pub fn mark_chimeric(&mut self) {
        self.chimeric = true;
    }

    pub fn unmark_chimeric(&mut self) {
        self.chimeric = false;
    }
}

/// Why a cluster was moved into the excluded set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExclusionReason {
    Chimeric,
    FailedReplicateCount,
    FailedFracCutOff,
    FailedLowFreqOneOff,
    CommonlyLowFreq,
    OneSampOnly,
    OneSampOnlyOneOff,
}

impl ExclusionReason {
    pub const ALL: [ExclusionReason; 7] = [
        ExclusionReason::Chimeric,
        ExclusionReason::FailedReplicateCount,
        ExclusionReason::FailedFracCutOff,
        ExclusionReason::FailedLowFreqOneOff,
        ExclusionReason::CommonlyLowFreq,
        ExclusionReason::OneSampOnly,
        ExclusionReason::OneSampOnlyOneOff,
    ];

    pub fn tag_key(&self) -> &'static str {
        match self {
            ExclusionReason::Chimeric => EXCLUDE_IS_CHIMERIC,
            ExclusionReason::FailedReplicateCount => EXCLUDE_FAILED_REPLICATE,
            ExclusionReason::FailedFracCutOff => EXCLUDE_FAILED_FRAC,
            ExclusionReason::FailedLowFreqOneOff => EXCLUDE_FAILED_LOW_FREQ_ONE_OFF,
            ExclusionReason::CommonlyLowFreq => EXCLUDE_COMMONLY_LOW_FREQ,
            ExclusionReason::OneSampOnly => EXCLUDE_ONE_SAMP_ONLY,
            ExclusionReason::OneSampOnlyOneOff => EXCLUDE_ONE_SAMP_ONLY_ONE_OFF,
        }
    }

    pub fn from_tag_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.tag_key() == key)
    }
}

/// Exclusion reasons and rescue marker of a cluster, plus free-form tags.
/// Reasons are only ever added; rescue adds its marker but keeps the reasons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaData {
    reasons: BTreeSet<ExclusionReason>,
    rescued: bool,
    pub extra: BTreeMap<String, String>,
}

impl MetaData {
    pub fn add_reason(&mut self, reason: ExclusionReason) {
        self.reasons.insert(reason);
    }

    pub fn has_reason(&self, reason: ExclusionReason) -> bool {
        self.reasons.contains(&reason)
    }

    pub fn reasons(&self) -> impl Iterator<Item = ExclusionReason> + '_ {
        self.reasons.iter().copied()
    }

    pub fn num_reasons(&self) -> usize {
        self.reasons.len()
    }

    /// The exclusion reason when there is exactly one; clusters with several
    /// reasons are never candidates for rescue.
    pub fn sole_reason(&self) -> Option<ExclusionReason> {
        if self.reasons.len() == 1 {
            self.reasons.iter().next().copied()
        } else {
            None
        }
    }

    pub fn mark_rescued(&mut self) {
        self.rescued = true;
    }

    pub fn is_rescued(&self) -> bool {
        self.rescued
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty() && !self.rescued && self.extra.is_empty()
    }

    /// Parse the `[key=value;...]` block of a display name.
    pub fn from_name(name: &str) -> Self {
        let mut meta = MetaData::default();
        let (Some(start), Some(end)) = (name.rfind('['), name.rfind(']')) else {
            return meta;
        };
        if end <= start {
            return meta;
        }
        for field in name[start + 1..end].split(';') {
            let Some((key, value)) = field.split_once('=') else {
                continue;
            };
            if let Some(reason) = ExclusionReason::from_tag_key(key) {
                meta.add_reason(reason);
            } else if key == RESCUE_KEY {
                meta.rescued = value == "TRUE";
            } else {
                meta.extra.insert(key.to_string(), value.to_string());
            }
        }
        meta
    }
}

impl fmt::Display for MetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<String> = self
            .reasons
            .iter()
            .map(|r| format!("{}=TRUE", r.tag_key()))
            .collect();
        if self.rescued {
            fields.push(format!("{}=TRUE", RESCUE_KEY));
        }
        for (key, value) in &self.extra {
            fields.push(format!("{}={}", key, value));
        }
        write!(f, "[{}]", fields.join(";"))
    }
}

/// Stable identifier of a sample cluster across checkpoints and renames.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterKey {
    pub sample: String,
    pub uid: u32,
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.sample, self.uid)
    }
}

/// Reads collapsed to one representative sequence within a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub uid: u32,
    pub name: String,
    pub seq: Vec<u8>,
    pub count: u64,
    /// Mean over replicates of the per-replicate fraction
    pub fraction: f64,
    pub replicate_fracs: BTreeMap<String, f64>,
    pub reads: Vec<Read>,
    pub meta: MetaData,
    pub chimeric: bool,
    pub expects: Option<String>,
}

impl Cluster {
    /// All reads are expected to share the representative sequence.
    pub fn from_reads(uid: u32, reads: Vec<Read>) -> Self {
        let seq = reads.first().map(|r| r.seq.clone()).unwrap_or_default();
        let count = reads.iter().map(|r| r.count).sum();
        Self {
            uid,
            name: format!("clus.{}", uid),
            seq,
            count,
            fraction: 0.0,
            replicate_fracs: BTreeMap::new(),
            reads,
            meta: MetaData::default(),
            chimeric: false,
            expects: None,
        }
    }

    pub fn key(&self, sample: &str) -> ClusterKey {
        ClusterKey {
            sample: sample.to_string(),
            uid: self.uid,
        }
    }

    pub fn replicate_count(&self) -> usize {
        self.reads
            .iter()
            .map(|r| r.replicate.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn count_in_replicate(&self, replicate: &str) -> u64 {
        self.reads
            .iter()
            .filter(|r| r.replicate == replicate)
            .map(|r| r.count)
            .sum()
    }

    pub fn chimeric_read_fraction(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let chimeric: u64 = self.reads.iter().filter(|r| r.chimeric).map(|r| r.count).sum();
        chimeric as f64 / self.count as f64
    }

    pub fn unmark_chimeric(&mut self) {
        self.chimeric = false;
        for read in self.reads.iter_mut() {
            read.unmark_chimeric();
        }
    }

    pub fn display_name(&self) -> String {
        let mut name = format!("{}_f{:.4}", self.name, self.fraction);
        if !self.meta.is_empty() {
            name.push_str(&self.meta.to_string());
        }
        name
    }
}

/// Per-replicate input bookkeeping for a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateInfo {
    pub name: String,
    pub input_reads: u64,
}

/// Expected haplotype supplied by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefSeq {
    pub name: String,
    pub seq: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sole_reason_requires_exactly_one() {
        let mut meta = MetaData::default();
        assert_eq!(meta.sole_reason(), None);
        meta.add_reason(ExclusionReason::Chimeric);
        assert_eq!(meta.sole_reason(), Some(ExclusionReason::Chimeric));
        meta.add_reason(ExclusionReason::Chimeric);
        assert_eq!(meta.sole_reason(), Some(ExclusionReason::Chimeric));
        meta.add_reason(ExclusionReason::FailedFracCutOff);
        assert_eq!(meta.sole_reason(), None);
        assert_eq!(meta.num_reasons(), 2);
    }

    #[test]
    fn metadata_survives_display_name() {
        let mut meta = MetaData::default();
        meta.add_reason(ExclusionReason::FailedLowFreqOneOff);
        meta.mark_rescued();
        meta.extra.insert("batch".to_string(), "2".to_string());
        let name = format!("S1.03_f0.0100{}", meta);
        assert_eq!(
            name,
            "S1.03_f0.0100[ExcludeFailedLowFreqOneOff=TRUE;rescue=TRUE;batch=2]"
        );
        assert_eq!(MetaData::from_name(&name), meta);
        assert!(MetaData::from_name("S1.03_f0.0100").is_empty());
    }

    #[test]
    fn cluster_counts_replicates() {
        let reads = vec![
            Read::new("a_t3", b"ACGT".to_vec(), 3, "rep1"),
            Read::new("b_t2", b"ACGT".to_vec(), 2, "rep2"),
            Read::new("c_t5", b"ACGT".to_vec(), 5, "rep2"),
        ];
        let mut clus = Cluster::from_reads(7, reads);
        assert_eq!(clus.count, 10);
        assert_eq!(clus.replicate_count(), 2);
        assert_eq!(clus.count_in_replicate("rep2"), 7);

        clus.reads[2].mark_chimeric();
        clus.chimeric = true;
        assert!((clus.chimeric_read_fraction() - 0.5).abs() < 1e-12);
        clus.unmark_chimeric();
        assert!(!clus.chimeric);
        assert_eq!(clus.chimeric_read_fraction(), 0.0);
    }
}
