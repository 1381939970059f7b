use crate::constants::*;
use crate::error::{HapError, Result};
use crate::types::*;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// One replicate input file of a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicateFile {
    pub replicate: String,
    pub path: PathBuf,
}

fn collect_named_files(dir: &Path, file_name: &str, depth: usize, found: &mut Vec<PathBuf>) -> Result<()> {
    if depth > SAMPLE_FILE_DEPTH {
        return Ok(());
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_named_files(&path, file_name, depth + 1, found)?;
        } else if path.file_name().map(|n| n == file_name).unwrap_or(false) {
            found.push(path);
        }
    }
    Ok(())
}

/// Find `<master>/<sample>/<replicate>/<file_name>` inputs, grouped by sample.
/// A matching file at any other depth is an input-structure error.
pub fn discover_sample_files(
    master_dir: &Path,
    file_name: &str,
    exclude_samples: &BTreeSet<String>,
) -> Result<BTreeMap<String, Vec<ReplicateFile>>> {
    if !master_dir.is_dir() {
        return Err(HapError::input_structure(format!(
            "master directory {} does not exist",
            master_dir.display()
        )));
    }
    let mut found = Vec::new();
    collect_named_files(master_dir, file_name, 1, &mut found)?;

    let mut samples: BTreeMap<String, Vec<ReplicateFile>> = BTreeMap::new();
    for path in found {
        let relative = path.strip_prefix(master_dir).unwrap_or(&path);
        let toks: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        if toks.len() != SAMPLE_FILE_DEPTH {
            return Err(HapError::input_structure(format!(
                "File path should be {} levels deep, not {} for {}",
                SAMPLE_FILE_DEPTH,
                toks.len(),
                relative.display()
            )));
        }
        if exclude_samples.contains(&toks[0]) {
            log::debug!("Skipping excluded sample file {}", path.display());
            continue;
        }
        samples.entry(toks[0].clone()).or_default().push(ReplicateFile {
            replicate: toks[1].clone(),
            path,
        });
    }
    log::info!(
        "Found {} samples with {} replicate files under {}",
        samples.len(),
        samples.values().map(|v| v.len()).sum::<usize>(),
        master_dir.display()
    );
    Ok(samples)
}

/// Abundance and upstream chimera flag encoded in a read header
pub fn parse_read_header(name: &str) -> (u64, bool) {
    let chimeric = name.starts_with(CHIMERIC_READ_PREFIX);
    let count = name
        .rsplit_once(ABUNDANCE_SUFFIX)
        .and_then(|(_, cnt)| cnt.parse::<f64>().ok())
        .filter(|cnt| *cnt >= 1.0)
        .map(|cnt| cnt.round() as u64)
        .unwrap_or(1);
    (count, chimeric)
}

fn open_fastx(path: &Path) -> Result<Box<dyn needletail::FastxReader>> {
    let bufreader = BufReader::new(File::open(path)?);
    needletail::parse_fastx_reader(bufreader).map_err(|e| HapError::parse(path, e))
}

pub fn read_replicate(file: &ReplicateFile) -> Result<Vec<Read>> {
    let mut reader = open_fastx(&file.path)?;
    let mut reads = Vec::new();
    while let Some(record) = reader.next() {
        let rec = record.map_err(|e| HapError::parse(&file.path, e))?;
        let name = crate::utils::first_word(&String::from_utf8_lossy(rec.id()));
        let (count, chimeric) = parse_read_header(&name);
        let seq = rec.seq().to_ascii_uppercase();
        let mut read = Read::new(name, seq, count, file.replicate.as_str());
        read.chimeric = chimeric;
        reads.push(read);
    }
    log::trace!("Read {} sequences from {}", reads.len(), file.path.display());
    Ok(reads)
}

/// Reads of every replicate, in replicate order
pub fn load_sample_reads(files: &[ReplicateFile]) -> Result<Vec<Read>> {
    let mut reads = Vec::new();
    for file in files {
        reads.extend(read_replicate(file)?);
    }
    Ok(reads)
}

/// Longest sequence over all inputs, used to size the alignment blocks.
pub fn max_read_length(files: &[&ReplicateFile]) -> Result<usize> {
    let lengths: Vec<usize> = files
        .par_iter()
        .map(|file| -> Result<usize> {
            let mut reader = open_fastx(&file.path)?;
            let mut max_len = 0;
            while let Some(record) = reader.next() {
                let rec = record.map_err(|e| HapError::parse(&file.path, e))?;
                max_len = max_len.max(rec.num_bases());
            }
            Ok(max_len)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(lengths.into_iter().max().unwrap_or(0))
}

pub fn read_reference_seqs(path: &Path) -> Result<Vec<RefSeq>> {
    let mut reader = open_fastx(path)?;
    let mut refs = Vec::new();
    while let Some(record) = reader.next() {
        let rec = record.map_err(|e| HapError::parse(path, e))?;
        refs.push(RefSeq {
            name: crate::utils::first_word(&String::from_utf8_lossy(rec.id())),
            seq: rec.seq().to_ascii_uppercase(),
        });
    }
    log::info!("Loaded {} expected sequences from {}", refs.len(), path.display());
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = File::create(path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn header_abundance_and_chimera_flag() {
        assert_eq!(parse_read_header("seq.00_t120"), (120, false));
        assert_eq!(parse_read_header("CHI_seq.01_t3"), (3, true));
        assert_eq!(parse_read_header("plainread"), (1, false));
        assert_eq!(parse_read_header("odd_tname"), (1, false));
    }

    #[test]
    fn discovers_three_level_layout() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("S2/rep1/output.fastq"), "@a_t2\nACGT\n+\nIIII\n");
        write_file(&dir.path().join("S1/rep2/output.fastq"), "@a_t2\nACGT\n+\nIIII\n");
        write_file(&dir.path().join("S1/rep1/output.fastq"), "@a_t2\nACGT\n+\nIIII\n");
        write_file(&dir.path().join("S3/rep1/output.fastq"), "@a_t2\nACGT\n+\nIIII\n");
        write_file(&dir.path().join("S1/rep1/other.fastq"), "@a\nACGT\n+\nIIII\n");

        let exclude: BTreeSet<String> = ["S3".to_string()].into_iter().collect();
        let samples = discover_sample_files(dir.path(), "output.fastq", &exclude).unwrap();
        assert_eq!(samples.keys().cloned().collect::<Vec<_>>(), vec!["S1", "S2"]);
        let reps: Vec<&str> = samples["S1"].iter().map(|f| f.replicate.as_str()).collect();
        assert_eq!(reps, vec!["rep1", "rep2"]);
    }

    #[test]
    fn wrong_depth_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("S1/output.fastq"), "@a\nACGT\n+\nIIII\n");
        let err = discover_sample_files(dir.path(), "output.fastq", &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, HapError::InputStructure { .. }));
    }

    #[test]
    fn reads_replicate_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("S1/rep1/output.fasta");
        write_file(&path, ">seq.00_t9 extra\nacgtac\n>CHI_seq.01_t2\nACGTTT\n");
        let reads = read_replicate(&ReplicateFile {
            replicate: "rep1".to_string(),
            path,
        })
        .unwrap();
        assert_eq!(reads.len(), 2);
        assert_eq!(reads[0].name, "seq.00_t9");
        assert_eq!(reads[0].seq, b"ACGTAC".to_vec());
        assert_eq!(reads[0].count, 9);
        assert!(reads[1].chimeric);
        assert_eq!(reads[1].replicate, "rep1");
    }
}
