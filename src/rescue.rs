use crate::alignment::Aligner;
use crate::collapse::IterPar;
use crate::collection::SampleCollection;
use crate::constants::MAJOR_HAP_TOP_N;
use crate::error::Result;
use crate::population::PopulationCollapse;
use crate::types::*;
use std::collections::BTreeSet;

/// Which single exclusion reasons a rescue pass may undo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RescuePolicy {
    pub chimeric: bool,
    pub low_freq_one_off: bool,
    pub failed_frac: bool,
    pub commonly_low_freq: bool,
}

impl RescuePolicy {
    pub fn accepts(&self, reason: ExclusionReason) -> bool {
        match reason {
            ExclusionReason::Chimeric => self.chimeric,
            ExclusionReason::FailedLowFreqOneOff => self.low_freq_one_off,
            ExclusionReason::FailedFracCutOff => self.failed_frac,
            ExclusionReason::CommonlyLowFreq => self.commonly_low_freq,
            _ => false,
        }
    }

    pub fn any(&self) -> bool {
        self.chimeric || self.low_freq_one_off || self.failed_frac || self.commonly_low_freq
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RescueReport {
    /// Population re-aggregations triggered by rescues
    pub rounds: usize,
    pub rescued: usize,
}

/// Excluded positions eligible under `policy`. A cluster carrying more than
/// one exclusion reason is never eligible.
pub fn rescue_candidates(
    excluded: &[Cluster],
    policy: &RescuePolicy,
    matches: impl Fn(&Cluster) -> bool,
) -> Vec<usize> {
    excluded
        .iter()
        .enumerate()
        .filter(|(_, clus)| {
            clus.meta
                .sole_reason()
                .map(|reason| policy.accepts(reason))
                .unwrap_or(false)
        })
        .filter(|(_, clus)| matches(clus))
        .map(|(pos, _)| pos)
        .collect()
}

/// Sequences of population clusters holding a top-ranked cluster of some
/// passing sample at or above `min_frac`. Taken once, before any rescue.
pub fn collect_major_haplotypes(coll: &SampleCollection, min_frac: f64) -> Result<BTreeSet<Vec<u8>>> {
    let pop = coll.population()?;
    let mut majors = BTreeSet::new();
    for name in &coll.passing_samples {
        let samp = coll.view_sample(name)?;
        for clus in samp.included.iter().take(MAJOR_HAP_TOP_N) {
            if clus.fraction >= min_frac {
                majors.insert(pop.require_cluster_of(&clus.key(name))?.seq.clone());
            }
        }
    }
    log::debug!("{} major haplotypes available for rescue", majors.len());
    Ok(majors)
}

/// One pass over every passing sample; returns the number of clusters
/// moved back to included.
pub fn rescue_pass(
    coll: &mut SampleCollection,
    policy: &RescuePolicy,
    matches: impl Fn(&Cluster) -> bool,
) -> Result<usize> {
    let mut rescued = 0;
    let names: Vec<String> = coll.passing_samples.iter().cloned().collect();
    for name in names {
        rescued += coll.with_sample(&name, |samp| {
            let positions = rescue_candidates(&samp.excluded, policy, &matches);
            Ok(samp.rescue(&positions))
        })?;
    }
    Ok(rescued)
}

/// Rescue, re-aggregate and repeat until a pass rescues nothing. Every
/// rescue permanently empties one excluded slot, so the number of rounds is
/// bounded by the excluded clusters across samples.
fn rescue_until_stable(
    coll: &mut SampleCollection,
    policy: &RescuePolicy,
    schedule: &[IterPar],
    aligner: &mut Aligner,
    matches: impl Fn(&PopulationCollapse, &Cluster) -> bool,
) -> Result<RescueReport> {
    let mut report = RescueReport::default();
    loop {
        let pop = coll.population()?.clone();
        let rescued = rescue_pass(coll, policy, |clus| matches(&pop, clus))?;
        if rescued == 0 {
            break;
        }
        report.rounds += 1;
        report.rescued += rescued;
        log::info!("Rescue round {}: reinstated {} clusters", report.rounds, rescued);
        coll.do_population_clustering(schedule, aligner)?;
    }
    Ok(report)
}

/// Chimeric and low-frequency one-off rescue against major population
/// haplotypes of strictly higher abundance.
pub fn run_population_rescue(
    coll: &mut SampleCollection,
    policy: RescuePolicy,
    major_hap_frac: f64,
    schedule: &[IterPar],
    aligner: &mut Aligner,
) -> Result<RescueReport> {
    if !policy.any() {
        return Ok(RescueReport::default());
    }
    let majors = collect_major_haplotypes(coll, major_hap_frac)?;
    rescue_until_stable(coll, &policy, schedule, aligner, |pop, clus| {
        pop.clusters
            .iter()
            .any(|p| p.seq == clus.seq && p.frac_sum > clus.fraction && majors.contains(&p.seq))
    })
}

/// Rescue excluded clusters identical to an expected reference sequence.
pub fn rescue_matching_expected(
    coll: &mut SampleCollection,
    expected: &[RefSeq],
    schedule: &[IterPar],
    aligner: &mut Aligner,
) -> Result<RescueReport> {
    let policy = RescuePolicy {
        chimeric: true,
        low_freq_one_off: true,
        failed_frac: true,
        commonly_low_freq: true,
    };
    let expected: BTreeSet<&[u8]> = expected.iter().map(|r| r.seq.as_slice()).collect();
    rescue_until_stable(coll, &policy, schedule, aligner, |_, clus| {
        expected.contains(clus.seq.as_slice())
    })
}

/// Repeat `step` and re-aggregate until a step excludes nothing. Returns
/// the number of re-aggregations.
pub fn exclude_until_stable(
    coll: &mut SampleCollection,
    schedule: &[IterPar],
    aligner: &mut Aligner,
    mut step: impl FnMut(&mut SampleCollection, &mut Aligner) -> Result<bool>,
) -> Result<usize> {
    let mut rounds = 0;
    while step(coll, aligner)? {
        rounds += 1;
        coll.do_population_clustering(schedule, aligner)?;
    }
    Ok(rounds)
}
