use clap::{Parser, Subcommand, ValueEnum};
use crate::collapse::IterPar;
use crate::config::ProcessConfig;
use crate::constants::*;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "haplopop",
    about = "haplopop - per-sample haplotype clustering, population aggregation and rescue for replicated amplicon sequencing",
    version,
    author,
    disable_help_subcommand = true,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Logging verbosity level
    #[arg(short, long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Print help in markdown format
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cluster every sample under a master directory and build the population
    #[command(name = "process")]
    Process(ProcessArgs),

    /// Extract the sample field from a sequencer read header
    #[command(name = "decode")]
    Decode(DecodeArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ProcessArgs {
    /// Master directory laid out as <sample>/<replicate>/<file>
    #[arg(short, long, required = true, help_heading = CLI_HEADINGS[0])]
    pub master_dir: PathBuf,

    /// Output directory for checkpoints and reports (created if it does not exist)
    #[arg(short, long, default_value = "haplopop-out", help_heading = CLI_HEADINGS[0])]
    pub output_dir: PathBuf,

    /// Name of the per-replicate input file
    #[arg(long, default_value = DEFAULT_INPUT_FILE_NAME, help_heading = CLI_HEADINGS[0])]
    pub first_name: String,

    /// Samples to skip, comma separated
    #[arg(long, value_delimiter = ',', help_heading = CLI_HEADINGS[0])]
    pub exclude_samples: Vec<String>,

    /// Number of sample worker threads
    #[arg(short, long, default_value = "4")]
    pub threads: usize,

    /// Prefix for population haplotype names
    #[arg(long, default_value = "PopUID", help_heading = CLI_HEADINGS[0])]
    pub experiment_name: String,

    /// Expected haplotype sequences (FASTA/FASTQ) to classify clusters against
    #[arg(long, help_heading = CLI_HEADINGS[0])]
    pub expected_seqs: Option<PathBuf>,

    /// Previously published population sequences whose names should be reused
    #[arg(long, help_heading = CLI_HEADINGS[0])]
    pub previous_pop: Option<PathBuf>,

    /// Directory holding an alignment cache to preload
    #[arg(long, help_heading = CLI_HEADINGS[0])]
    pub aln_info_dir: Option<PathBuf>,

    /// Directory to write the alignment cache to at the end of the run
    #[arg(long, help_heading = CLI_HEADINGS[0])]
    pub out_aln_info_dir: Option<PathBuf>,

    /// Also write allClustersInfo.tab.txt.gz with every cluster
    #[arg(long, help_heading = CLI_HEADINGS[0])]
    pub write_out_all_info_file: bool,

    /// Replicates a cluster must appear in (default: all of the sample's replicates)
    #[arg(long, help_heading = CLI_HEADINGS[1])]
    pub replicates_required: Option<usize>,

    /// Default fraction cutoff for the frequency filter
    #[arg(long, default_value_t = DEFAULT_FRAC_CUTOFF, help_heading = CLI_HEADINGS[1])]
    pub frac_cutoff: f64,

    /// Tab-delimited table with columns sample and cutOff overriding --frac-cutoff
    #[arg(long, help_heading = CLI_HEADINGS[1])]
    pub custom_cut_offs: Option<PathBuf>,

    /// Apply the frequency cutoff to the replicate-averaged fraction only
    #[arg(long, help_heading = CLI_HEADINGS[1])]
    pub frac_exclude_only_in_final_average_frac: bool,

    /// Samples with fewer input reads are not used for the population
    #[arg(long, default_value_t = 0, help_heading = CLI_HEADINGS[1])]
    pub pre_filt_cutoff: u64,

    /// Share of chimeric reads needed to mark a cluster chimeric
    #[arg(long, default_value_t = DEFAULT_CHI_CUTOFF, help_heading = CLI_HEADINGS[1])]
    pub chi_cut_off: f64,

    /// Chimera parents must be this many times as abundant as the chimera
    #[arg(long, default_value_t = DEFAULT_PARENT_FREQ_MULTIPLIER, help_heading = CLI_HEADINGS[1])]
    pub parent_freq_multiplier: f64,

    /// Exclude one-off variants of much more abundant clusters
    #[arg(long, help_heading = CLI_HEADINGS[1])]
    pub collapse_low_freq_one_offs: bool,

    /// Abundance ratio for --collapse-low-freq-one-offs
    #[arg(long, default_value_t = DEFAULT_LOW_FREQ_MULTIPLIER, help_heading = CLI_HEADINGS[1])]
    pub low_freq_multiplier: f64,

    /// Keep clusters marked chimeric
    #[arg(long, help_heading = CLI_HEADINGS[1])]
    pub keep_chimeras: bool,

    /// Skip population clustering
    #[arg(long, help_heading = CLI_HEADINGS[2])]
    pub no_population: bool,

    /// Rescue chimeric clusters matching a major population haplotype
    #[arg(long, help_heading = CLI_HEADINGS[2])]
    pub rescue_excluded_chimeric_haplotypes: bool,

    /// Rescue low-frequency one-offs matching a major population haplotype
    #[arg(long, help_heading = CLI_HEADINGS[2])]
    pub rescue_excluded_one_off_low_freq_haplotypes: bool,

    /// Rescue excluded clusters identical to an expected sequence
    #[arg(long, help_heading = CLI_HEADINGS[2])]
    pub rescue_matching_expected: bool,

    /// Fraction a top cluster needs to count as a major haplotype
    #[arg(long, default_value_t = DEFAULT_MAJOR_HAP_FRAC_FOR_RESCUE, help_heading = CLI_HEADINGS[2])]
    pub major_haplotype_frac_for_rescue: f64,

    /// Exclude haplotypes whose mean fraction across samples is low
    #[arg(long, help_heading = CLI_HEADINGS[2])]
    pub remove_commonly_low_freq_haplotypes: bool,

    /// Mean fraction cutoff for --remove-commonly-low-freq-haplotypes
    #[arg(long, default_value_t = DEFAULT_LOW_FREQ_HAP_FRAC_CUTOFF, help_heading = CLI_HEADINGS[2])]
    pub low_freq_haplotype_frac_cut_off: f64,

    /// Exclude haplotypes found in only one sample
    #[arg(long, help_heading = CLI_HEADINGS[2])]
    pub remove_one_samp_only_haps: bool,

    /// Fraction below which single-sample haplotypes are removed
    #[arg(long, default_value_t = DEFAULT_ONE_SAMP_ONLY_HAPS_FRAC, help_heading = CLI_HEADINGS[2])]
    pub one_samp_only_haps_frac: f64,

    /// Exclude single-sample haplotypes one edit from a shared haplotype
    #[arg(long, help_heading = CLI_HEADINGS[2])]
    pub remove_one_samp_only_one_off_haps: bool,

    /// Fraction below which single-sample one-off haplotypes are removed
    #[arg(long, default_value_t = DEFAULT_ONE_SAMP_ONLY_ONE_OFF_HAPS_FRAC, help_heading = CLI_HEADINGS[2])]
    pub one_samp_only_one_off_haps_frac: f64,

    /// Per-sample merge round stop:mismatches:oneBaseIndels:twoBaseIndels:largeIndels:parentFold (repeatable)
    #[arg(long = "sample-iter", help_heading = CLI_HEADINGS[3])]
    pub sample_iters: Vec<IterPar>,

    /// Population merge round, same format as --sample-iter (repeatable)
    #[arg(long = "pop-iter", help_heading = CLI_HEADINGS[3])]
    pub pop_iters: Vec<IterPar>,

    /// Count terminal gaps as indels when comparing sequences
    #[arg(long, help_heading = CLI_HEADINGS[3])]
    pub count_end_gaps: bool,
}

impl ProcessArgs {
    pub fn to_config(&self) -> ProcessConfig {
        let defaults = ProcessConfig::default();
        ProcessConfig {
            master_dir: self.master_dir.clone(),
            out_dir: self.output_dir.clone(),
            input_file_name: self.first_name.clone(),
            exclude_samples: self.exclude_samples.iter().cloned().collect(),
            threads: self.threads,
            experiment_name: self.experiment_name.clone(),
            replicates_required: self.replicates_required,
            frac_cutoff: self.frac_cutoff,
            custom_cutoffs: self.custom_cut_offs.clone(),
            frac_exclude_only_in_final_average_frac: self.frac_exclude_only_in_final_average_frac,
            pre_filt_cutoff: self.pre_filt_cutoff,
            chi_cutoff: self.chi_cut_off,
            parent_freq_multiplier: self.parent_freq_multiplier,
            collapse_low_freq_one_offs: self.collapse_low_freq_one_offs,
            low_freq_multiplier: self.low_freq_multiplier,
            keep_chimeras: self.keep_chimeras,
            expected_seqs: self.expected_seqs.clone(),
            no_population: self.no_population,
            rescue_excluded_chimeric: self.rescue_excluded_chimeric_haplotypes,
            rescue_excluded_one_off_low_freq: self.rescue_excluded_one_off_low_freq_haplotypes,
            rescue_matching_expected: self.rescue_matching_expected,
            major_hap_frac_for_rescue: self.major_haplotype_frac_for_rescue,
            remove_commonly_low_freq_haps: self.remove_commonly_low_freq_haplotypes,
            low_freq_hap_frac_cutoff: self.low_freq_haplotype_frac_cut_off,
            remove_one_samp_only_haps: self.remove_one_samp_only_haps,
            one_samp_only_haps_frac: self.one_samp_only_haps_frac,
            remove_one_samp_only_one_off_haps: self.remove_one_samp_only_one_off_haps,
            one_samp_only_one_off_haps_frac: self.one_samp_only_one_off_haps_frac,
            previous_pop: self.previous_pop.clone(),
            sample_schedule: if self.sample_iters.is_empty() {
                defaults.sample_schedule
            } else {
                self.sample_iters.clone()
            },
            pop_schedule: if self.pop_iters.is_empty() {
                defaults.pop_schedule
            } else {
                self.pop_iters.clone()
            },
            count_end_gaps: self.count_end_gaps,
            aln_info_dir: self.aln_info_dir.clone(),
            out_aln_info_dir: self.out_aln_info_dir.clone(),
            write_all_clusters: self.write_out_all_info_file,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct DecodeArgs {
    /// Read header(s) to decode
    #[arg(num_args = 1.., required = true)]
    pub headers: Vec<String>,

    /// Regular expression to apply instead of the Illumina header pattern
    #[arg(long)]
    pub pattern: Option<String>,

    /// Capture group holding the sample field
    #[arg(long, default_value_t = crate::decoder::ILLUMINA_SAMPLE_GROUP)]
    pub index: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl Cli {
    pub fn log_level_filter(&self) -> log::LevelFilter {
        match self.log_level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_args_map_to_config() {
        let cli = Cli::parse_from([
            "haplopop",
            "process",
            "--master-dir",
            "runs",
            "--sample-iter",
            "100:0:0:0:0:1",
            "--sample-iter",
            "100:1:0:0:0:10",
            "--exclude-samples",
            "S3,S4",
            "--rescue-excluded-chimeric-haplotypes",
        ]);
        let Some(Commands::Process(args)) = cli.command else {
            panic!("expected process");
        };
        let config = args.to_config();
        assert_eq!(config.sample_schedule.len(), 2);
        assert_eq!(config.pop_schedule.len(), 1);
        assert_eq!(config.exclude_samples.len(), 2);
        assert!(config.rescue_excluded_chimeric);
        assert_eq!(config.frac_cutoff, DEFAULT_FRAC_CUTOFF);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_iteration_string_is_rejected() {
        let parsed = Cli::try_parse_from(["haplopop", "process", "--master-dir", "runs", "--pop-iter", "1:2"]);
        assert!(parsed.is_err());
    }
}
