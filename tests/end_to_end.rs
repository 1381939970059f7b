use haplopop::checkpoint;
use haplopop::config::ProcessConfig;
use haplopop::constants::*;
use haplopop::error::HapError;
use haplopop::pipeline;
use haplopop::types::ExclusionReason;
use std::path::Path;

const SEQ_A: &[u8] = b"ATGCGTACCTGAAGTCCATGGTACGATCGTTAGCCAGTTCGAACGGTATCCGATGCAATG";
const SEQ_D: &[u8] = b"GGCTTAACGTCAGTACCGTTGACTGCATGCCAATGTCAGGTCTTACGCAGTTCAAGCGTA";
const SEQ_E: &[u8] = b"CCGATTGCAGTCATGGACTCCAGTTAGCGTACTGGAATCCGTGAACTGACCTAGGTCCTA";

fn parent_b() -> Vec<u8> {
    let mut seq = SEQ_A.to_vec();
    for pos in [5, 12, 20, 28, 40, 48, 55] {
        seq[pos] = match seq[pos] {
            b'A' => b'G',
            b'C' => b'T',
            b'G' => b'A',
            _ => b'C',
        };
    }
    seq
}

fn recombinant() -> Vec<u8> {
    let mut seq = SEQ_A[..30].to_vec();
    seq.extend_from_slice(&parent_b()[30..]);
    seq
}

/// Write `<master>/<sample>/<replicate>/output.fastq` with abundance-suffixed records
fn write_replicate(master: &Path, sample: &str, replicate: &str, records: &[(&[u8], u64)]) {
    let dir = master.join(sample).join(replicate);
    std::fs::create_dir_all(&dir).unwrap();
    let mut contents = String::new();
    for (i, (seq, count)) in records.iter().enumerate() {
        let seq = String::from_utf8_lossy(seq);
        let qual = "I".repeat(seq.len());
        contents.push_str(&format!("@{}.{}.{:02}_t{}\n{}\n+\n{}\n", sample, replicate, i, count, seq, qual));
    }
    std::fs::write(dir.join(DEFAULT_INPUT_FILE_NAME), contents).unwrap();
}

fn config_for(master: &Path, out: &Path) -> ProcessConfig {
    ProcessConfig {
        master_dir: master.to_path_buf(),
        out_dir: out.to_path_buf(),
        threads: 2,
        experiment_name: "exp".to_string(),
        ..ProcessConfig::default()
    }
}

#[test]
fn two_samples_three_replicates_give_two_haplotypes() {
    let master = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    for sample in ["S1", "S2"] {
        for rep in ["rep1", "rep2", "rep3"] {
            write_replicate(master.path(), sample, rep, &[(SEQ_A, 90), (SEQ_D, 10)]);
        }
    }
    let config = ProcessConfig {
        write_all_clusters: true,
        ..config_for(master.path(), out.path())
    };
    let summary = pipeline::run(&config).unwrap();

    assert_eq!(summary.samples.len(), 2);
    assert!(summary.samples.iter().all(|s| s.replicates == 3 && s.included == 2 && s.excluded == 0));
    assert_eq!(summary.population_haplotypes, 2);

    let pop = checkpoint::load_population(out.path()).unwrap();
    assert_eq!(pop.clusters.len(), 2);
    for clus in &pop.clusters {
        let samples: Vec<&str> = clus.samples().into_iter().collect();
        assert_eq!(samples, vec!["S1", "S2"]);
        assert_eq!(clus.members.len(), 2);
    }
    let s1 = checkpoint::load_sample(out.path(), "S1").unwrap();
    assert!((s1.included[0].fraction - 0.9).abs() < 1e-9);

    for file in [SELECTED_CLUSTERS_FILE, ALL_CLUSTERS_FILE, HAP_ID_TABLE_FILE, SAMPLES_MANIFEST_FILE] {
        assert!(out.path().join(file).exists(), "missing {}", file);
    }
    assert!(out.path().join(POPULATION_DIR).join(POP_SEQS_FILE).exists());
    assert!(out.path().join(FINAL_DIR).join("S2.fasta").exists());
    assert!(out.path().join(PARS_DIR).join("popPars.tab.txt").exists());
}

fn chimera_inputs(master: &Path) {
    let b = parent_b();
    let c = recombinant();
    write_replicate(master, "S1", "rep1", &[(SEQ_A, 50), (b.as_slice(), 30), (c.as_slice(), 5), (SEQ_D, 15)]);
    write_replicate(master, "S2", "rep1", &[(c.as_slice(), 60), (SEQ_E, 40)]);
}

#[test]
fn chimera_excluded_without_rescue() {
    let master = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    chimera_inputs(master.path());
    let config = ProcessConfig {
        frac_cutoff: 0.01,
        ..config_for(master.path(), out.path())
    };
    let summary = pipeline::run(&config).unwrap();
    assert_eq!(summary.rescue.rescued, 0);

    let s1 = checkpoint::load_sample(out.path(), "S1").unwrap();
    assert_eq!(s1.included.len(), 3);
    assert_eq!(s1.excluded.len(), 1);
    let chimera = &s1.excluded[0];
    assert_eq!(chimera.seq, recombinant());
    assert_eq!(chimera.meta.sole_reason(), Some(ExclusionReason::Chimeric));
    assert!(chimera.chimeric);
    assert!((chimera.fraction - 0.05).abs() < 1e-9);
}

#[test]
fn chimera_rescued_by_major_population_haplotype() {
    let master = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    chimera_inputs(master.path());
    let config = ProcessConfig {
        frac_cutoff: 0.01,
        rescue_excluded_chimeric: true,
        ..config_for(master.path(), out.path())
    };
    let summary = pipeline::run(&config).unwrap();
    assert_eq!(summary.rescue.rescued, 1);
    assert!(summary.rescue.rounds <= 1);

    let s1 = checkpoint::load_sample(out.path(), "S1").unwrap();
    assert!(s1.excluded.is_empty());
    let rescued = s1.included.iter().find(|c| c.seq == recombinant()).unwrap();
    assert!(rescued.meta.is_rescued());
    assert!(!rescued.chimeric);
    assert!(rescued.reads.iter().all(|r| !r.chimeric));

    let pop = checkpoint::load_population(out.path()).unwrap();
    let hap = pop.cluster_of(&rescued.key("S1")).unwrap();
    assert_eq!(hap.sample_count(), 2);
}

#[test]
fn custom_cutoff_applies_only_to_listed_sample() {
    let master = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    for sample in ["S1", "S2"] {
        write_replicate(master.path(), sample, "rep1", &[(SEQ_A, 85), (SEQ_D, 15)]);
    }
    let table = master.path().join("cutoffs.tab.txt");
    std::fs::write(&table, "sample\tcutOff\nS1\t0.2\n").unwrap();
    let config = ProcessConfig {
        frac_cutoff: 0.01,
        custom_cutoffs: Some(table),
        ..config_for(master.path(), out.path())
    };
    pipeline::run(&config).unwrap();

    let s1 = checkpoint::load_sample(out.path(), "S1").unwrap();
    assert_eq!(s1.excluded.len(), 1);
    assert_eq!(s1.excluded[0].seq, SEQ_D);
    assert!(s1.excluded[0].meta.has_reason(ExclusionReason::FailedFracCutOff));

    let s2 = checkpoint::load_sample(out.path(), "S2").unwrap();
    assert_eq!(s2.included.len(), 2);
    assert!(s2.excluded.is_empty());
}

#[test]
fn malformed_cutoff_table_aborts_before_clustering() {
    let master = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_replicate(master.path(), "S1", "rep1", &[(SEQ_A, 10)]);
    let table = master.path().join("cutoffs.tab.txt");
    std::fs::write(&table, "name\tvalue\nS1\t0.2\n").unwrap();
    let config = ProcessConfig {
        custom_cutoffs: Some(table),
        ..config_for(master.path(), out.path())
    };
    let err = pipeline::run(&config).unwrap_err();
    assert!(matches!(err, HapError::Config { .. }));
    assert!(!checkpoint::sample_path(out.path(), "S1").exists());
}

#[test]
fn misplaced_input_file_aborts_run() {
    let master = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_replicate(master.path(), "S1", "rep1", &[(SEQ_A, 10)]);
    // sample directory without a replicate level
    std::fs::create_dir_all(master.path().join("S2")).unwrap();
    std::fs::write(master.path().join("S2").join(DEFAULT_INPUT_FILE_NAME), "@r_t1\nACGT\n+\nIIII\n").unwrap();
    let err = pipeline::run(&config_for(master.path(), out.path())).unwrap_err();
    assert!(matches!(err, HapError::InputStructure { .. }));
}
