use crate::collapse::IterPar;
use crate::collection::SampleCollection;
use crate::constants::*;
use crate::error::Result;
use crate::pipeline::SampleSummary;
use crate::population::PopulationCollapse;
use crate::sample::SampleCollapse;
use crate::types::Cluster;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}

fn write_fasta_record(w: &mut impl Write, name: &str, seq: &[u8]) -> Result<()> {
    writeln!(w, ">{}", name)?;
    w.write_all(seq)?;
    writeln!(w)?;
    Ok(())
}

fn pop_name(pop: Option<&PopulationCollapse>, sample: &str, clus: &Cluster) -> (String, usize) {
    pop.and_then(|p| p.cluster_of(&clus.key(sample)))
        .map(|p| (p.name.clone(), p.sample_count()))
        .unwrap_or_else(|| ("NA".to_string(), 0))
}

fn load_samples(coll: &SampleCollection) -> Result<Vec<SampleCollapse>> {
    coll.sample_names.iter().map(|name| coll.view_sample(name)).collect()
}

/// Per-sample input bookkeeping written once the workers have joined
pub fn write_samples_manifest(summaries: &[SampleSummary], output_path: &Path) -> Result<()> {
    let mut file = create(output_path)?;
    writeln!(file, "sample\treplicates\tinputReads\tincluded\texcluded")?;
    for s in summaries {
        writeln!(
            file,
            "{}\t{}\t{}\t{}\t{}",
            s.name, s.replicates, s.input_reads, s.included, s.excluded
        )?;
    }
    file.flush()?;
    Ok(())
}

/// One row per included cluster of every sample
pub fn write_selected_clusters(coll: &SampleCollection, output_path: &Path) -> Result<()> {
    let pop = coll.population().ok();
    let mut file = create(output_path)?;
    writeln!(
        file,
        "s_Sample\ts_Passing\ts_ReadCntTotUsed\ts_InputReplicateCount\ts_COI\tc_clusterID\tc_name\tc_AveragedFrac\tc_ReadCnt\tc_RepCnt\th_popUID\th_SampCnt\tc_expects\tc_meta"
    )?;
    for samp in load_samples(coll)? {
        let used: u64 = samp.included.iter().map(|c| c.count).sum();
        let passing = coll.passing_samples.contains(&samp.name);
        for clus in &samp.included {
            let (pop_uid, samp_cnt) = pop_name(pop, &samp.name, clus);
            writeln!(
                file,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.6}\t{}\t{}\t{}\t{}\t{}\t{}",
                samp.name,
                passing,
                used,
                samp.replicates.len(),
                samp.included.len(),
                clus.uid,
                clus.name,
                clus.fraction,
                clus.count,
                clus.replicate_count(),
                pop_uid,
                samp_cnt,
                clus.expects.as_deref().unwrap_or(""),
                clus.meta
            )?;
        }
    }
    file.flush()?;
    Ok(())
}

/// Every cluster, included or excluded, gzip compressed
pub fn write_all_clusters(coll: &SampleCollection, output_path: &Path) -> Result<()> {
    let pop = coll.population().ok();
    let mut writer = GzEncoder::new(create(output_path)?, Compression::default());
    writeln!(
        writer,
        "s_Sample\tc_status\tc_clusterID\tc_name\tc_AveragedFrac\tc_ReadCnt\tc_RepCnt\tc_chimeric\tc_chimericReadFrac\th_popUID\tc_reasons\tc_rescued\tc_expects\tc_seq"
    )?;
    for samp in load_samples(coll)? {
        let rows = samp
            .included
            .iter()
            .map(|c| ("included", c))
            .chain(samp.excluded.iter().map(|c| ("excluded", c)));
        for (status, clus) in rows {
            let (pop_uid, _) = pop_name(pop, &samp.name, clus);
            let reasons: Vec<&str> = clus.meta.reasons().map(|r| r.tag_key()).collect();
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{:.6}\t{}\t{}\t{}\t{:.4}\t{}\t{}\t{}\t{}\t{}",
                samp.name,
                status,
                clus.uid,
                clus.name,
                clus.fraction,
                clus.count,
                clus.replicate_count(),
                clus.chimeric,
                clus.chimeric_read_fraction(),
                pop_uid,
                reasons.join(","),
                clus.meta.is_rescued(),
                clus.expects.as_deref().unwrap_or(""),
                String::from_utf8_lossy(&clus.seq)
            )?;
        }
    }
    writer.finish()?.flush()?;
    Ok(())
}

/// Population haplotypes by sample, cells are the sample's fraction
pub fn write_hap_id_table(coll: &SampleCollection, output_path: &Path) -> Result<()> {
    let pop = coll.population()?;
    let samples: Vec<&String> = coll.passing_samples.iter().collect();
    let mut file = create(output_path)?;
    write!(file, "#PopUID\tsampleCount\tmeanFrac")?;
    for s in &samples {
        write!(file, "\t{}", s)?;
    }
    writeln!(file)?;
    for clus in &pop.clusters {
        write!(
            file,
            "{}\t{}\t{:.6}",
            clus.name,
            clus.sample_count(),
            clus.mean_sample_fraction()
        )?;
        for s in &samples {
            let frac = clus.fraction_in(s);
            if frac > 0.0 {
                write!(file, "\t{:.6}", frac)?;
            } else {
                write!(file, "\t")?;
            }
        }
        writeln!(file)?;
    }
    file.flush()?;
    Ok(())
}

/// `popSeqs.fasta` plus the per-sample copies named by population UID
pub fn write_pop_seqs(coll: &SampleCollection, pop_dir: &Path) -> Result<()> {
    let pop = coll.population()?;
    let mut file = create(&pop_dir.join(POP_SEQS_FILE))?;
    for clus in &pop.clusters {
        let mut name = format!(
            "{}_f{:.4}[sampleCount={}]",
            clus.name,
            clus.mean_sample_fraction(),
            clus.sample_count()
        );
        if let Some(expects) = &clus.expects {
            name = format!("{}[expects={}]", name, expects);
        }
        write_fasta_record(&mut file, &name, &clus.seq)?;
    }
    file.flush()?;

    let mut per_sample = create(&pop_dir.join(POP_SEQS_WITH_SAMPLES_FILE))?;
    for name in &coll.passing_samples {
        let samp = coll.view_sample(name)?;
        for clus in &samp.included {
            let hap = pop.require_cluster_of(&clus.key(name))?;
            let header = format!(
                "{}[PopUID={};sample={};frac={:.6};readCnt={}]",
                clus.name, hap.name, name, clus.fraction, clus.count
            );
            write_fasta_record(&mut per_sample, &header, &clus.seq)?;
        }
    }
    per_sample.flush()?;
    Ok(())
}

/// `final/<sample>.fasta` with the included clusters' display names
pub fn write_sample_finals(coll: &SampleCollection, final_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(final_dir)?;
    for samp in load_samples(coll)? {
        let mut file = create(&final_dir.join(format!("{}.fasta", samp.name)))?;
        for clus in &samp.included {
            write_fasta_record(&mut file, &clus.display_name(), &clus.seq)?;
        }
        file.flush()?;
    }
    Ok(())
}

pub fn write_schedule(schedule: &[IterPar], output_path: &Path) -> Result<()> {
    let mut file = create(output_path)?;
    writeln!(file, "{}", IterPar::header())?;
    for (i, par) in schedule.iter().enumerate() {
        writeln!(file, "{}\t{}", i + 1, par)?;
    }
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::{Aligner, AlnCache};
    use crate::checkpoint;
    use crate::collapse::default_pop_schedule;
    use crate::sample::tests::{build_sample, SEQ_A, SEQ_D};
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn two_sample_collection(dir: &Path, aligner: &mut Aligner) -> SampleCollection {
        let rep = vec![(SEQ_A.to_vec(), 90), (SEQ_D.to_vec(), 10)];
        let mut names = std::collections::BTreeSet::new();
        for name in ["S1", "S2"] {
            let mut samp = build_sample(name, &[rep.clone()], aligner);
            samp.exclude_on_frac(0.2, false);
            checkpoint::dump_sample(dir, &samp).unwrap();
            names.insert(name.to_string());
        }
        let mut coll = SampleCollection::new(dir, "exp", names);
        coll.do_population_clustering(&default_pop_schedule(), aligner).unwrap();
        coll
    }

    #[test]
    fn tables_reflect_final_partition() {
        let dir = tempfile::tempdir().unwrap();
        let mut aligner = Aligner::new(AlnCache::default(), false);
        let coll = two_sample_collection(dir.path(), &mut aligner);

        let selected = dir.path().join(SELECTED_CLUSTERS_FILE);
        write_selected_clusters(&coll, &selected).unwrap();
        let text = std::fs::read_to_string(&selected).unwrap();
        // header plus one included cluster per sample
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(1).unwrap().contains("exp.00"));

        let all = dir.path().join(ALL_CLUSTERS_FILE);
        write_all_clusters(&coll, &all).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(File::open(&all).unwrap()).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded.lines().filter(|l| l.contains("\texcluded\t")).count(), 2);
        assert!(decoded.contains(EXCLUDE_FAILED_FRAC));

        let hap_ids = dir.path().join(HAP_ID_TABLE_FILE);
        write_hap_id_table(&coll, &hap_ids).unwrap();
        let text = std::fs::read_to_string(&hap_ids).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("#PopUID\tsampleCount\tmeanFrac\tS1\tS2"));
    }

    #[test]
    fn fasta_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut aligner = Aligner::new(AlnCache::default(), false);
        let coll = two_sample_collection(dir.path(), &mut aligner);
        write_pop_seqs(&coll, &dir.path().join(POPULATION_DIR)).unwrap();
        write_sample_finals(&coll, &dir.path().join(FINAL_DIR)).unwrap();

        let pop = std::fs::read_to_string(dir.path().join(POPULATION_DIR).join(POP_SEQS_FILE)).unwrap();
        assert!(pop.starts_with(">exp.00_f1.0000[sampleCount=2]\n"));
        let per_sample =
            std::fs::read_to_string(dir.path().join(POPULATION_DIR).join(POP_SEQS_WITH_SAMPLES_FILE)).unwrap();
        assert_eq!(per_sample.lines().filter(|l| l.starts_with('>')).count(), 2);
        let s1 = std::fs::read_to_string(dir.path().join(FINAL_DIR).join("S1.fasta")).unwrap();
        assert_eq!(s1.lines().next(), Some(">S1.00_f1.0000"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn write_failures_surface_as_errors() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let summaries = vec![SampleSummary {
            name: "S1".to_string(),
            replicates: 1,
            input_reads: 100,
            included: 2,
            excluded: 0,
        }];
        assert!(write_samples_manifest(&summaries, full).is_err());
        assert!(write_schedule(&default_pop_schedule(), full).is_err());
    }
}
