use crate::constants::*;
use crate::error::{HapError, Result};
use crate::population::PopulationCollapse;
use crate::sample::SampleCollapse;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

pub fn sample_dir(out_dir: &Path, sample: &str) -> PathBuf {
    out_dir.join(SAMPLES_DIR).join(sample)
}

pub fn sample_path(out_dir: &Path, sample: &str) -> PathBuf {
    sample_dir(out_dir, sample).join(SAMPLE_CHECKPOINT_FILE)
}

pub fn population_path(out_dir: &Path) -> PathBuf {
    out_dir.join(POPULATION_DIR).join(POPULATION_CHECKPOINT_FILE)
}

fn write_bin<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    bincode::serialize_into(BufWriter::new(File::create(path)?), value).map_err(|source| {
        HapError::Checkpoint {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn read_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    bincode::deserialize_from(BufReader::new(File::open(path)?)).map_err(|source| {
        HapError::Checkpoint {
            path: path.to_path_buf(),
            source,
        }
    })
}

pub fn dump_sample(out_dir: &Path, sample: &SampleCollapse) -> Result<()> {
    let path = sample_path(out_dir, &sample.name);
    write_bin(&path, sample)?;
    log::trace!("Checkpointed {} to {}", sample.name, path.display());
    Ok(())
}

pub fn load_sample(out_dir: &Path, sample: &str) -> Result<SampleCollapse> {
    read_bin(&sample_path(out_dir, sample))
}

pub fn dump_population(out_dir: &Path, pop: &PopulationCollapse) -> Result<()> {
    write_bin(&population_path(out_dir), pop)
}

pub fn load_population(out_dir: &Path) -> Result<PopulationCollapse> {
    read_bin(&population_path(out_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::{Aligner, AlnCache};
    use crate::sample::tests::{build_sample, SEQ_A, SEQ_D};
    use crate::types::ExclusionReason;

    #[test]
    fn sample_checkpoint_keeps_tags_and_partition() {
        let dir = tempfile::tempdir().unwrap();
        let mut aligner = Aligner::new(AlnCache::default(), false);
        let mut samp = build_sample(
            "S1",
            &[vec![(SEQ_A.to_vec(), 97), (SEQ_D.to_vec(), 3)]],
            &mut aligner,
        );
        samp.exclude_on_frac(0.05, false);
        samp.excluded[0].meta.extra.insert("note".to_string(), "x".to_string());
        dump_sample(dir.path(), &samp).unwrap();

        let loaded = load_sample(dir.path(), "S1").unwrap();
        assert_eq!(loaded, samp);
        assert!(loaded.excluded[0].meta.has_reason(ExclusionReason::FailedFracCutOff));
    }

    #[test]
    fn missing_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_sample(dir.path(), "nope").is_err());
        assert!(load_population(dir.path()).is_err());
    }
}
