use crate::alignment::Aligner;
use crate::checkpoint;
use crate::collapse::IterPar;
use crate::error::{HapError, Result};
use crate::population::{PopulationCollapse, SubClusterRef};
use crate::sample::SampleCollapse;
use crate::types::*;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// All samples of a run plus the current population view. Samples live in
/// their checkpoints between phases and are loaded on demand.
#[derive(Debug)]
pub struct SampleCollection {
    pub out_dir: PathBuf,
    pub experiment: String,
    pub sample_names: BTreeSet<String>,
    pub passing_samples: BTreeSet<String>,
    loaded: BTreeMap<String, SampleCollapse>,
    population: Option<PopulationCollapse>,
}

impl SampleCollection {
    pub fn new(out_dir: impl Into<PathBuf>, experiment: &str, sample_names: BTreeSet<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            experiment: experiment.to_string(),
            passing_samples: sample_names.clone(),
            sample_names,
            loaded: BTreeMap::new(),
            population: None,
        }
    }

    /// Load a sample from its last checkpoint unless it is already in memory.
    pub fn set_up_sample_from_previous(&mut self, name: &str) -> Result<&mut SampleCollapse> {
        if !self.loaded.contains_key(name) {
            let samp = checkpoint::load_sample(&self.out_dir, name)?;
            self.loaded.insert(name.to_string(), samp);
        }
        self.loaded
            .get_mut(name)
            .ok_or_else(|| HapError::internal(format!("sample {} failed to load", name)))
    }

    /// Write a loaded sample back to its checkpoint and release it.
    pub fn dump_sample(&mut self, name: &str) -> Result<()> {
        if let Some(samp) = self.loaded.remove(name) {
            checkpoint::dump_sample(&self.out_dir, &samp)?;
        }
        Ok(())
    }

    /// Load, mutate and checkpoint one sample.
    pub fn with_sample<T>(&mut self, name: &str, f: impl FnOnce(&mut SampleCollapse) -> Result<T>) -> Result<T> {
        let samp = self.set_up_sample_from_previous(name)?;
        let out = f(samp)?;
        self.dump_sample(name)?;
        Ok(out)
    }

    /// Read-only copy of a sample's current state
    pub fn view_sample(&self, name: &str) -> Result<SampleCollapse> {
        match self.loaded.get(name) {
            Some(samp) => Ok(samp.clone()),
            None => checkpoint::load_sample(&self.out_dir, name),
        }
    }

    /// Samples with at least `pre_filt_cutoff` input reads take part in the
    /// population phase.
    pub fn determine_passing_samples(&mut self, pre_filt_cutoff: u64) -> Result<()> {
        let mut passing = BTreeSet::new();
        for name in &self.sample_names {
            let samp = self.view_sample(name)?;
            if samp.input_read_count() >= pre_filt_cutoff {
                passing.insert(name.clone());
            } else {
                log::info!(
                    "Sample {} has {} reads, below the pre-filter cutoff of {}",
                    name,
                    samp.input_read_count(),
                    pre_filt_cutoff
                );
            }
        }
        self.passing_samples = passing;
        Ok(())
    }

    pub fn create_pop_input(&self) -> Result<Vec<SubClusterRef>> {
        let mut input = Vec::new();
        for name in &self.passing_samples {
            let samp = self.view_sample(name)?;
            input.extend(samp.included.iter().map(|c| SubClusterRef::from_cluster(name, c)));
        }
        Ok(input)
    }

    /// Rebuild the population from the samples' current included clusters,
    /// replacing any previous population.
    pub fn do_population_clustering(&mut self, schedule: &[IterPar], aligner: &mut Aligner) -> Result<&PopulationCollapse> {
        let input = self.create_pop_input()?;
        let pop = PopulationCollapse::aggregate(&self.experiment, input, self.passing_samples.len(), schedule, aligner);
        checkpoint::dump_population(&self.out_dir, &pop)?;
        Ok(self.population.insert(pop))
    }

    pub fn population(&self) -> Result<&PopulationCollapse> {
        self.population
            .as_ref()
            .ok_or_else(|| HapError::internal("population clustering has not been run"))
    }

    pub fn population_mut(&mut self) -> Result<&mut PopulationCollapse> {
        self.population
            .as_mut()
            .ok_or_else(|| HapError::internal("population clustering has not been run"))
    }

    pub fn has_population(&self) -> bool {
        self.population.is_some()
    }

    /// Exclude the listed sample clusters from their samples. The population
    /// is stale afterwards until re-aggregated.
    fn exclude_pop_members(&mut self, targets: BTreeMap<String, BTreeSet<u32>>, reason: ExclusionReason) -> Result<usize> {
        let mut moved = 0;
        for (sample, uids) in targets {
            moved += self.with_sample(&sample, |samp| {
                let n = samp.apply_exclusion(&uids, reason);
                samp.update_after_exclusion();
                samp.rename_clusters();
                Ok(n)
            })?;
        }
        if moved > 0 {
            log::info!("Excluded {} sample clusters ({})", moved, reason.tag_key());
        }
        Ok(moved)
    }

    fn members_of<'a>(clusters: impl Iterator<Item = &'a crate::population::PopCluster>) -> BTreeMap<String, BTreeSet<u32>> {
        let mut targets: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();
        for clus in clusters {
            for member in &clus.members {
                targets.entry(member.key.sample.clone()).or_default().insert(member.key.uid);
            }
        }
        targets
    }

    /// Haplotypes whose mean fraction over the samples they occur in is
    /// below `cutoff`. Returns whether anything was excluded.
    pub fn exclude_commonly_low_freq_haps(&mut self, cutoff: f64) -> Result<bool> {
        let targets = Self::members_of(
            self.population()?
                .clusters
                .iter()
                .filter(|c| c.mean_sample_fraction() < cutoff),
        );
        Ok(self.exclude_pop_members(targets, ExclusionReason::CommonlyLowFreq)? > 0)
    }

    /// Haplotypes seen in a single sample below `frac`. Needs at least two
    /// samples in the population.
    pub fn exclude_one_samp_only_haps(&mut self, frac: f64) -> Result<bool> {
        let pop = self.population()?;
        if pop.num_samples < 2 {
            return Ok(false);
        }
        let targets = Self::members_of(
            pop.clusters
                .iter()
                .filter(|c| c.sample_count() == 1 && c.mean_sample_fraction() < frac),
        );
        Ok(self.exclude_pop_members(targets, ExclusionReason::OneSampOnly)? > 0)
    }

    /// Single-sample haplotypes below `frac` that are one edit away from a
    /// haplotype shared by several samples.
    pub fn exclude_one_samp_only_one_off_haps(&mut self, frac: f64, aligner: &mut Aligner) -> Result<bool> {
        let pop = self.population()?;
        let shared: Vec<&[u8]> = pop
            .clusters
            .iter()
            .filter(|c| c.sample_count() > 1)
            .map(|c| c.seq.as_slice())
            .collect();
        let mut flagged = Vec::new();
        for clus in pop.clusters.iter() {
            if clus.sample_count() != 1 || clus.mean_sample_fraction() >= frac {
                continue;
            }
            if shared.iter().any(|seq| aligner.compare(seq, &clus.seq).is_one_off()) {
                flagged.push(clus);
            }
        }
        let targets = Self::members_of(flagged.into_iter());
        Ok(self.exclude_pop_members(targets, ExclusionReason::OneSampOnlyOneOff)? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::AlnCache;
    use crate::collapse::default_pop_schedule;
    use crate::sample::tests::{build_sample, SEQ_A, SEQ_D, SEQ_E};

    fn collection(dir: &std::path::Path, samples: Vec<SampleCollapse>) -> SampleCollection {
        let names = samples.iter().map(|s| s.name.clone()).collect();
        for samp in &samples {
            checkpoint::dump_sample(dir, samp).unwrap();
        }
        SampleCollection::new(dir, "exp", names)
    }

    #[test]
    fn pre_filter_cutoff_drops_small_samples() {
        let dir = tempfile::tempdir().unwrap();
        let mut aligner = Aligner::new(AlnCache::default(), false);
        let big = build_sample("S1", &[vec![(SEQ_A.to_vec(), 500)]], &mut aligner);
        let small = build_sample("S2", &[vec![(SEQ_A.to_vec(), 20)]], &mut aligner);
        let mut coll = collection(dir.path(), vec![big, small]);
        coll.determine_passing_samples(100).unwrap();
        assert_eq!(coll.passing_samples.iter().collect::<Vec<_>>(), vec!["S1"]);
        assert_eq!(coll.create_pop_input().unwrap().len(), 1);
    }

    #[test]
    fn one_sample_only_haplotypes_are_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let mut aligner = Aligner::new(AlnCache::default(), false);
        let s1 = build_sample("S1", &[vec![(SEQ_A.to_vec(), 90), (SEQ_E.to_vec(), 10)]], &mut aligner);
        let s2 = build_sample("S2", &[vec![(SEQ_A.to_vec(), 80), (SEQ_D.to_vec(), 20)]], &mut aligner);
        let mut coll = collection(dir.path(), vec![s1, s2]);
        coll.do_population_clustering(&default_pop_schedule(), &mut aligner).unwrap();
        assert_eq!(coll.population().unwrap().clusters.len(), 3);

        // E at 0.1 falls below 0.15, D at 0.2 does not
        assert!(coll.exclude_one_samp_only_haps(0.15).unwrap());
        let s1 = coll.view_sample("S1").unwrap();
        assert_eq!(s1.excluded.len(), 1);
        assert!(s1.excluded[0].meta.has_reason(ExclusionReason::OneSampOnly));
        assert!((s1.included[0].fraction - 1.0).abs() < 1e-12);

        coll.do_population_clustering(&default_pop_schedule(), &mut aligner).unwrap();
        assert_eq!(coll.population().unwrap().clusters.len(), 2);
        assert!(!coll.exclude_one_samp_only_haps(0.15).unwrap());
    }

    #[test]
    fn commonly_low_freq_haplotypes_are_excluded_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let mut aligner = Aligner::new(AlnCache::default(), false);
        let s1 = build_sample("S1", &[vec![(SEQ_A.to_vec(), 995), (SEQ_D.to_vec(), 5)]], &mut aligner);
        let s2 = build_sample("S2", &[vec![(SEQ_A.to_vec(), 992), (SEQ_D.to_vec(), 8)]], &mut aligner);
        let mut coll = collection(dir.path(), vec![s1, s2]);
        coll.do_population_clustering(&default_pop_schedule(), &mut aligner).unwrap();
        assert!(coll.exclude_commonly_low_freq_haps(0.01).unwrap());
        for name in ["S1", "S2"] {
            let samp = coll.view_sample(name).unwrap();
            assert_eq!(samp.included.len(), 1);
            assert!(samp.excluded[0].meta.has_reason(ExclusionReason::CommonlyLowFreq));
        }
    }

    #[test]
    fn one_sample_one_off_needs_a_shared_neighbour() {
        let dir = tempfile::tempdir().unwrap();
        let mut aligner = Aligner::new(AlnCache::default(), false);
        let mut near_a = SEQ_A.to_vec();
        near_a[25] = if near_a[25] == b'G' { b'C' } else { b'G' };
        let s1 = build_sample(
            "S1",
            &[vec![(SEQ_A.to_vec(), 90), (near_a.clone(), 5), (SEQ_E.to_vec(), 5)]],
            &mut aligner,
        );
        let s2 = build_sample("S2", &[vec![(SEQ_A.to_vec(), 100)]], &mut aligner);
        let mut coll = collection(dir.path(), vec![s1, s2]);
        coll.do_population_clustering(&default_pop_schedule(), &mut aligner).unwrap();
        assert!(coll.exclude_one_samp_only_one_off_haps(0.15, &mut aligner).unwrap());
        let s1 = coll.view_sample("S1").unwrap();
        assert_eq!(s1.excluded.len(), 1);
        assert_eq!(s1.excluded[0].seq, near_a);
        assert!(s1.excluded[0].meta.has_reason(ExclusionReason::OneSampOnlyOneOff));
    }

    #[test]
    fn population_requires_aggregation() {
        let dir = tempfile::tempdir().unwrap();
        let coll = SampleCollection::new(dir.path(), "exp", BTreeSet::new());
        assert!(matches!(coll.population(), Err(HapError::InternalConsistency { .. })));
    }
}
