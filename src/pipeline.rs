use crate::alignment::{Aligner, AlnCache};
use crate::checkpoint;
use crate::collection::SampleCollection;
use crate::config::{self, ProcessConfig};
use crate::constants::*;
use crate::error::Result;
use crate::report;
use crate::rescue::{self, RescuePolicy, RescueReport};
use crate::sample::SampleCollapse;
use crate::seq_parse::{self, ReplicateFile};
use crate::types::RefSeq;
use crate::utils::log_memory_usage;
use crate::worker::{self, AlignerPool, LockableQueue};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct SampleSummary {
    pub name: String,
    pub replicates: usize,
    pub input_reads: u64,
    pub included: usize,
    pub excluded: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub samples: Vec<SampleSummary>,
    pub passing_samples: BTreeSet<String>,
    pub population_haplotypes: usize,
    pub rescue: RescueReport,
    pub expected_rescue: RescueReport,
    pub alignments_done: u64,
}

/// Read-only inputs shared by every sample worker
pub struct SampleContext<'a> {
    pub config: &'a ProcessConfig,
    pub cutoffs: &'a BTreeMap<String, f64>,
    pub expected: &'a [RefSeq],
}

/// Take one sample from raw reads to its checkpoint.
pub fn process_sample(
    name: &str,
    files: &[ReplicateFile],
    ctx: &SampleContext,
    aligner: &mut Aligner,
) -> Result<SampleSummary> {
    let config = ctx.config;
    log::debug!("Starting: {}", name);

    let reads = seq_parse::load_sample_reads(files)?;
    let replicate_names: Vec<String> = files.iter().map(|f| f.replicate.clone()).collect();
    let mut samp = SampleCollapse::new(name, &replicate_names, reads);

    samp.cluster(&config.sample_schedule, aligner);
    samp.mark_chimeras(config.chi_cutoff, config.parent_freq_multiplier, aligner);

    let required = config.replicates_required.unwrap_or(samp.replicates.len());
    samp.exclude_by_replicate_count(required);

    let cutoff = ctx.cutoffs.get(name).copied().unwrap_or(config.frac_cutoff);
    samp.exclude_on_frac(cutoff, config.frac_exclude_only_in_final_average_frac);

    if config.collapse_low_freq_one_offs {
        samp.exclude_low_freq_one_offs(config.low_freq_multiplier, aligner);
    }
    if !config.keep_chimeras {
        samp.exclude_chimeras_no_remark();
    }
    samp.rename_clusters();
    samp.check_against_expected(ctx.expected, aligner)?;

    checkpoint::dump_sample(&config.out_dir, &samp)?;
    log::debug!(
        "Ending: {} ({} included, {} excluded)",
        name,
        samp.included.len(),
        samp.excluded.len()
    );
    Ok(SampleSummary {
        name: name.to_string(),
        replicates: samp.replicates.len(),
        input_reads: samp.input_read_count(),
        included: samp.included.len(),
        excluded: samp.excluded.len(),
    })
}

/// Population phase: aggregate, rescue and the exclusion loops, in that
/// order. Single threaded.
pub fn run_population(
    coll: &mut SampleCollection,
    config: &ProcessConfig,
    expected: &[RefSeq],
    aligner: &mut Aligner,
    summary: &mut RunSummary,
) -> Result<()> {
    let schedule = &config.pop_schedule;
    coll.do_population_clustering(schedule, aligner)?;

    let policy = RescuePolicy {
        chimeric: config.rescue_excluded_chimeric,
        low_freq_one_off: config.rescue_excluded_one_off_low_freq,
        ..RescuePolicy::default()
    };
    summary.rescue = rescue::run_population_rescue(coll, policy, config.major_hap_frac_for_rescue, schedule, aligner)?;

    if config.remove_commonly_low_freq_haps {
        let cutoff = config.low_freq_hap_frac_cutoff;
        rescue::exclude_until_stable(coll, schedule, aligner, |c, _| c.exclude_commonly_low_freq_haps(cutoff))?;
    }
    if config.remove_one_samp_only_one_off_haps {
        let frac = config.one_samp_only_one_off_haps_frac;
        rescue::exclude_until_stable(coll, schedule, aligner, |c, a| c.exclude_one_samp_only_one_off_haps(frac, a))?;
    }
    if config.remove_one_samp_only_haps {
        let frac = config.one_samp_only_haps_frac;
        rescue::exclude_until_stable(coll, schedule, aligner, |c, _| c.exclude_one_samp_only_haps(frac))?;
    }
    if config.rescue_matching_expected && !expected.is_empty() {
        summary.expected_rescue = rescue::rescue_matching_expected(coll, expected, schedule, aligner)?;
    }

    if let Some(path) = &config.previous_pop {
        let previous = seq_parse::read_reference_seqs(path)?;
        coll.population_mut()?.rename_with_previous(&previous);
    }
    coll.population_mut()?.compare_to_refs(expected, aligner)?;
    checkpoint::dump_population(&config.out_dir, coll.population()?)?;
    summary.population_haplotypes = coll.population()?.clusters.len();
    Ok(())
}

pub fn write_reports(coll: &SampleCollection, config: &ProcessConfig) -> Result<()> {
    let out = &config.out_dir;
    report::write_selected_clusters(coll, &out.join(SELECTED_CLUSTERS_FILE))?;
    if config.write_all_clusters {
        report::write_all_clusters(coll, &out.join(ALL_CLUSTERS_FILE))?;
    }
    report::write_sample_finals(coll, &out.join(FINAL_DIR))?;
    if coll.has_population() {
        report::write_hap_id_table(coll, &out.join(HAP_ID_TABLE_FILE))?;
        report::write_pop_seqs(coll, &out.join(POPULATION_DIR))?;
    }
    report::write_schedule(&config.sample_schedule, &out.join(PARS_DIR).join("pars.tab.txt"))?;
    report::write_schedule(&config.pop_schedule, &out.join(PARS_DIR).join("popPars.tab.txt"))?;
    Ok(())
}

/// Full processing run over `config.master_dir`.
pub fn run(config: &ProcessConfig) -> Result<RunSummary> {
    let start = Instant::now();
    config.validate()?;
    std::fs::create_dir_all(&config.out_dir)?;

    let sample_files =
        seq_parse::discover_sample_files(&config.master_dir, &config.input_file_name, &config.exclude_samples)?;
    let sample_names: BTreeSet<String> = sample_files.keys().cloned().collect();
    let cutoffs = config::process_custom_cutoffs(config.custom_cutoffs.as_deref(), &sample_names, config.frac_cutoff)?;
    let expected = match &config.expected_seqs {
        Some(path) => seq_parse::read_reference_seqs(path)?,
        None => vec![],
    };

    let cache = AlnCache::default();
    if let Some(dir) = &config.aln_info_dir {
        cache.load_from_dir(dir)?;
    }
    let all_files: Vec<&ReplicateFile> = sample_files.values().flatten().collect();
    let max_len = seq_parse::max_read_length(&all_files)?;
    log::info!("Longest input sequence: {} bp, sizing alignment blocks to match", max_len);

    let template = Aligner::new(cache.clone(), config.count_end_gaps).sized_for(max_len);
    let pool = AlignerPool::new(&template, config.threads);
    let queue = LockableQueue::new(sample_names.iter().cloned());
    let ctx = SampleContext {
        config,
        cutoffs: &cutoffs,
        expected: &expected,
    };
    let summaries = Mutex::new(Vec::new());
    log::info!("Clustering {} samples on {} threads", sample_names.len(), config.threads);
    worker::run_workers(config.threads, &queue, &pool, |name, aligner| {
        let files = sample_files.get(&name).map(Vec::as_slice).unwrap_or(&[]);
        let summary = process_sample(&name, files, &ctx, aligner)?;
        summaries.lock().unwrap_or_else(|e| e.into_inner()).push(summary);
        Ok(())
    })?;
    log_memory_usage(true, "STAGE 1: Sample clustering done");

    let mut samples = summaries.into_inner().unwrap_or_else(|e| e.into_inner());
    samples.sort_by(|a, b| a.name.cmp(&b.name));
    report::write_samples_manifest(&samples, &config.out_dir.join(SAMPLES_MANIFEST_FILE))?;

    let mut coll = SampleCollection::new(&config.out_dir, &config.experiment_name, sample_names);
    coll.determine_passing_samples(config.pre_filt_cutoff)?;

    let mut aligner = template;
    let mut summary = RunSummary {
        samples,
        passing_samples: coll.passing_samples.clone(),
        ..RunSummary::default()
    };
    if !config.no_population {
        run_population(&mut coll, config, &expected, &mut aligner, &mut summary)?;
        log_memory_usage(true, "STAGE 2: Population clustering done");
    }

    write_reports(&coll, config)?;
    if let Some(dir) = &config.out_aln_info_dir {
        cache.write_to_dir(dir)?;
    }
    summary.alignments_done = pool.alignments_done() + aligner.alignments_done;
    log::info!("Alignments computed: {}", summary.alignments_done);
    log::info!("Total time elapsed: {:?}", start.elapsed());
    Ok(summary)
}
