use crate::collapse::{self, IterPar};
use crate::constants::*;
use crate::error::{HapError, Result};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Everything a processing run needs. Built from the command line by the
/// binary; tests build it directly.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub master_dir: PathBuf,
    pub out_dir: PathBuf,
    pub input_file_name: String,
    pub exclude_samples: BTreeSet<String>,
    pub threads: usize,
    pub experiment_name: String,

    // per-sample filtering
    /// Replicates a cluster must occur in; `None` requires all of them
    pub replicates_required: Option<usize>,
    pub frac_cutoff: f64,
    pub custom_cutoffs: Option<PathBuf>,
    pub frac_exclude_only_in_final_average_frac: bool,
    pub pre_filt_cutoff: u64,
    pub chi_cutoff: f64,
    pub parent_freq_multiplier: f64,
    pub collapse_low_freq_one_offs: bool,
    pub low_freq_multiplier: f64,
    pub keep_chimeras: bool,
    pub expected_seqs: Option<PathBuf>,

    // population filtering and rescue
    pub no_population: bool,
    pub rescue_excluded_chimeric: bool,
    pub rescue_excluded_one_off_low_freq: bool,
    pub rescue_matching_expected: bool,
    pub major_hap_frac_for_rescue: f64,
    pub remove_commonly_low_freq_haps: bool,
    pub low_freq_hap_frac_cutoff: f64,
    pub remove_one_samp_only_haps: bool,
    pub one_samp_only_haps_frac: f64,
    pub remove_one_samp_only_one_off_haps: bool,
    pub one_samp_only_one_off_haps_frac: f64,
    pub previous_pop: Option<PathBuf>,

    pub sample_schedule: Vec<IterPar>,
    pub pop_schedule: Vec<IterPar>,
    pub count_end_gaps: bool,

    pub aln_info_dir: Option<PathBuf>,
    pub out_aln_info_dir: Option<PathBuf>,
    pub write_all_clusters: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            master_dir: PathBuf::from("."),
            out_dir: PathBuf::from("haplopop-out"),
            input_file_name: DEFAULT_INPUT_FILE_NAME.to_string(),
            exclude_samples: BTreeSet::new(),
            threads: 1,
            experiment_name: "PopUID".to_string(),
            replicates_required: None,
            frac_cutoff: DEFAULT_FRAC_CUTOFF,
            custom_cutoffs: None,
            frac_exclude_only_in_final_average_frac: false,
            pre_filt_cutoff: 0,
            chi_cutoff: DEFAULT_CHI_CUTOFF,
            parent_freq_multiplier: DEFAULT_PARENT_FREQ_MULTIPLIER,
            collapse_low_freq_one_offs: false,
            low_freq_multiplier: DEFAULT_LOW_FREQ_MULTIPLIER,
            keep_chimeras: false,
            expected_seqs: None,
            no_population: false,
            rescue_excluded_chimeric: false,
            rescue_excluded_one_off_low_freq: false,
            rescue_matching_expected: false,
            major_hap_frac_for_rescue: DEFAULT_MAJOR_HAP_FRAC_FOR_RESCUE,
            remove_commonly_low_freq_haps: false,
            low_freq_hap_frac_cutoff: DEFAULT_LOW_FREQ_HAP_FRAC_CUTOFF,
            remove_one_samp_only_haps: false,
            one_samp_only_haps_frac: DEFAULT_ONE_SAMP_ONLY_HAPS_FRAC,
            remove_one_samp_only_one_off_haps: false,
            one_samp_only_one_off_haps_frac: DEFAULT_ONE_SAMP_ONLY_ONE_OFF_HAPS_FRAC,
            previous_pop: None,
            sample_schedule: collapse::default_sample_schedule(),
            pop_schedule: collapse::default_pop_schedule(),
            count_end_gaps: false,
            aln_info_dir: None,
            out_aln_info_dir: None,
            write_all_clusters: false,
        }
    }
}

impl ProcessConfig {
    /// Fail fast on settings no worker could run with.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(HapError::config("thread count must be at least 1"));
        }
        if self.sample_schedule.is_empty() || self.pop_schedule.is_empty() {
            return Err(HapError::config("clustering schedules cannot be empty"));
        }
        if self.replicates_required == Some(0) {
            return Err(HapError::config("required replicate count must be at least 1"));
        }
        let fractions = [
            ("--frac-cutoff", self.frac_cutoff),
            ("--chi-cut-off", self.chi_cutoff),
            ("--major-hap-frac-for-rescue", self.major_hap_frac_for_rescue),
            ("--low-freq-hap-frac-cutoff", self.low_freq_hap_frac_cutoff),
            ("--one-samp-only-haps-frac", self.one_samp_only_haps_frac),
            ("--one-samp-only-one-off-haps-frac", self.one_samp_only_one_off_haps_frac),
        ];
        for (flag, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(HapError::config(format!("{} must be within [0, 1], got {}", flag, value)));
            }
        }
        if self.parent_freq_multiplier < 1.0 || self.low_freq_multiplier < 1.0 {
            return Err(HapError::config("frequency multipliers must be at least 1"));
        }
        if self.rescue_matching_expected && self.expected_seqs.is_none() {
            log::warn!("--rescue-matching-expected has no effect without --expected-seqs");
        }
        Ok(())
    }
}

/// Per-sample frequency cutoffs from a tab-delimited table with `sample`
/// and `cutOff` columns. Samples missing from the table get `default`.
pub fn process_custom_cutoffs(
    table: Option<&Path>,
    samples: &BTreeSet<String>,
    default: f64,
) -> Result<BTreeMap<String, f64>> {
    let mut cutoffs: BTreeMap<String, f64> = samples.iter().map(|s| (s.clone(), default)).collect();
    let Some(path) = table else {
        return Ok(cutoffs);
    };
    let contents = std::fs::read_to_string(path)?;
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines
        .next()
        .map(|l| l.split('\t').map(str::trim).collect())
        .unwrap_or_default();
    let column = |name: &str| header.iter().position(|h| *h == name);
    let (Some(sample_col), Some(cutoff_col)) = (column("sample"), column("cutOff")) else {
        return Err(HapError::config(format!(
            "custom cutoff table {} needs the columns sample and cutOff, found: {}",
            path.display(),
            header.join(",")
        )));
    };
    for line in lines {
        let toks: Vec<&str> = line.split('\t').map(str::trim).collect();
        let (Some(sample), Some(value)) = (toks.get(sample_col), toks.get(cutoff_col)) else {
            return Err(HapError::config(format!(
                "short row in custom cutoff table {}: '{}'",
                path.display(),
                line
            )));
        };
        let cutoff: f64 = value.parse().map_err(|_| {
            HapError::config(format!("bad cutOff '{}' for sample {} in {}", value, sample, path.display()))
        })?;
        if samples.contains(*sample) {
            cutoffs.insert(sample.to_string(), cutoff);
        } else {
            log::debug!("Custom cutoff for unknown sample {} ignored", sample);
        }
    }
    Ok(cutoffs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> BTreeSet<String> {
        ["S1", "S2"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn listed_samples_override_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cutoffs.tab.txt");
        std::fs::write(&path, "cutOff\tsample\n0.2\tS1\n0.3\tS9\n").unwrap();
        let cutoffs = process_custom_cutoffs(Some(&path), &samples(), 0.01).unwrap();
        assert_eq!(cutoffs["S1"], 0.2);
        assert_eq!(cutoffs["S2"], 0.01);
        assert!(!cutoffs.contains_key("S9"));
    }

    #[test]
    fn missing_columns_are_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cutoffs.tab.txt");
        std::fs::write(&path, "sample\tcutoff\nS1\t0.2\n").unwrap();
        let err = process_custom_cutoffs(Some(&path), &samples(), 0.01).unwrap_err();
        assert!(matches!(err, HapError::Config { .. }));
    }

    #[test]
    fn no_table_means_default_everywhere() {
        let cutoffs = process_custom_cutoffs(None, &samples(), 0.05).unwrap();
        assert!(cutoffs.values().all(|c| *c == 0.05));
    }

    #[test]
    fn validation_rejects_zero_threads() {
        let config = ProcessConfig {
            threads: 0,
            ..ProcessConfig::default()
        };
        assert!(matches!(config.validate(), Err(HapError::Config { .. })));
        assert!(ProcessConfig::default().validate().is_ok());
    }
}
