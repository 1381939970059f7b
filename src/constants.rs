use block_aligner;

pub const TS_DASHES_BLANK_COLONS_DOT_BLANK: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub const SUB_MATRIX: block_aligner::scores::NucMatrix = block_aligner::scores::NucMatrix::new_simple(1, -2);
pub const GAPS: block_aligner::scores::Gaps = block_aligner::scores::Gaps { open: -3, extend: -2 };
pub const MIN_BLOCK_SIZE: usize = 32;
pub const MAX_BLOCK_SIZE: usize = 256;

// Read header conventions from the upstream extraction step
pub const ABUNDANCE_SUFFIX: &str = "_t";
pub const CHIMERIC_READ_PREFIX: &str = "CHI_";

// Metadata keys written into cluster display names
pub const EXCLUDE_IS_CHIMERIC: &str = "ExcludeIsChimeric";
pub const EXCLUDE_FAILED_REPLICATE: &str = "ExcludeFailedReplicateCutOff";
pub const EXCLUDE_FAILED_FRAC: &str = "ExcludeFailedFracCutOff";
pub const EXCLUDE_FAILED_LOW_FREQ_ONE_OFF: &str = "ExcludeFailedLowFreqOneOff";
pub const EXCLUDE_COMMONLY_LOW_FREQ: &str = "ExcludeCommonlyLowFreq";
pub const EXCLUDE_ONE_SAMP_ONLY: &str = "ExcludeOneSampOnly";
pub const EXCLUDE_ONE_SAMP_ONLY_ONE_OFF: &str = "ExcludeOneSampOnlyOneOff";
pub const RESCUE_KEY: &str = "rescue";

// Checkpoint and report layout under the output directory
pub const SAMPLES_DIR: &str = "samples";
pub const POPULATION_DIR: &str = "population";
pub const FINAL_DIR: &str = "final";
pub const PARS_DIR: &str = "pars";
pub const SAMPLE_CHECKPOINT_FILE: &str = "sample.bin";
pub const POPULATION_CHECKPOINT_FILE: &str = "population.bin";
pub const SAMPLES_MANIFEST_FILE: &str = "samples.tab.txt";
pub const ALN_CACHE_FILE: &str = "alnCache.bin";
pub const SELECTED_CLUSTERS_FILE: &str = "selectedClustersInfo.tab.txt";
pub const ALL_CLUSTERS_FILE: &str = "allClustersInfo.tab.txt.gz";
pub const HAP_ID_TABLE_FILE: &str = "hapIdTable.tab.txt";
pub const POP_SEQS_FILE: &str = "popSeqs.fasta";
pub const POP_SEQS_WITH_SAMPLES_FILE: &str = "popSeqsWithMetaWithSampleName.fasta";

/// Input files must sit at <master>/<sample>/<replicate>/<file>
pub const SAMPLE_FILE_DEPTH: usize = 3;
pub const DEFAULT_INPUT_FILE_NAME: &str = "output.fastq";

pub const DEFAULT_FRAC_CUTOFF: f64 = 0.05;
pub const DEFAULT_CHI_CUTOFF: f64 = 0.40;
pub const DEFAULT_PARENT_FREQ_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_LOW_FREQ_MULTIPLIER: f64 = 30.0;
pub const DEFAULT_MAJOR_HAP_FRAC_FOR_RESCUE: f64 = 0.10;
pub const DEFAULT_LOW_FREQ_HAP_FRAC_CUTOFF: f64 = 0.01;
pub const DEFAULT_ONE_SAMP_ONLY_HAPS_FRAC: f64 = 0.15;
pub const DEFAULT_ONE_SAMP_ONLY_ONE_OFF_HAPS_FRAC: f64 = 0.15;

/// Only the two most abundant clusters of a sample can seed a major haplotype
pub const MAJOR_HAP_TOP_N: usize = 2;

pub const CLI_HEADINGS: [&str; 4] = [
    "Input/Output",
    "Sample Filtering",
    "Population Filtering and Rescue",
    "Clustering Schedules (advanced)",
];
