
use rustc_hash::FxHashMap as HashMap;
use serde::Serialize;
use std::ops::AddAssign;

use crate::data_types::alignments::ReadOrigin;

/// Final classification of one (read, variant) observation.
/// The discriminants are the `n_var` slot each outcome lands in.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, strum_macros::AsRefStr)]
pub enum HapMatch {
    /// The read matched only the first haplotype window
    #[strum(serialize = "HAP0")]
    Hap0 = 0,
    /// The read matched only the second haplotype window
    #[strum(serialize = "HAP1")]
    Hap1,
    /// The read matched both windows
    #[strum(serialize = "BOTH")]
    Both,
    /// The read matched neither window
    #[strum(serialize = "NEITHER")]
    Neither // make sure Neither is always the last one in the list
}

/// Per-site bias counters: classification slots plus read count and summed
/// mapping quality split by the read's haplotype-of-origin tag.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct SiteBiasCounter {
    /// Observations by classification: [hap0-only, hap1-only, both, neither]
    n_var: [u64; 4],
    /// Read counts by origin tag: [hapA, hapB]
    n_read: [u64; 2],
    /// Summed mapping quality by origin tag: [hapA, hapB]
    map_q: [u64; 2]
}

impl AddAssign for SiteBiasCounter {
    // Enables += with counters, which is how parallel shards merge
    fn add_assign(&mut self, rhs: Self) {
        for (slot, value) in self.n_var.iter_mut().zip(rhs.n_var) {
            *slot += value;
        }
        for (slot, value) in self.n_read.iter_mut().zip(rhs.n_read) {
            *slot += value;
        }
        for (slot, value) in self.map_q.iter_mut().zip(rhs.map_q) {
            *slot += value;
        }
    }
}

impl SiteBiasCounter {
    /// Adds one classified observation to its `n_var` slot.
    pub fn record_classification(&mut self, classification: HapMatch) {
        self.n_var[classification as usize] += 1;
    }

    /// Adds one read with a recognized origin tag to the read slots.
    /// # Arguments
    /// * `origin` - the parsed haplotype-of-origin tag
    /// * `mapping_quality` - the read's MAPQ, accumulated into `map_q`
    pub fn record_read(&mut self, origin: ReadOrigin, mapping_quality: u8) {
        let slot = origin as usize;
        self.n_read[slot] += 1;
        self.map_q[slot] += mapping_quality as u64;
    }

    /// The raw bias ratio toward one haplotype slot: the fraction of
    /// haplotype-informative observations (hap0, hap1, both) supporting that
    /// slot, counting "both" as half. `None` when no informative observation
    /// was made.
    /// # Arguments
    /// * `hap_slot` - 0 or 1; which haplotype carries the reference allele is
    ///   a genotype-orientation question the report writer answers
    /// # Panics
    /// * if `hap_slot` is not 0 or 1
    pub fn hap_bias(&self, hap_slot: usize) -> Option<f64> {
        assert!(hap_slot < 2, "hap_slot must be 0 or 1");
        let informative = self.n_var[0] + self.n_var[1] + self.n_var[2];
        if informative > 0 {
            Some((self.n_var[hap_slot] as f64 + 0.5 * self.n_var[2] as f64) / informative as f64)
        } else {
            None
        }
    }

    /// The fraction of tagged reads at this site that came from the given
    /// origin, or `None` if no tagged read was seen.
    pub fn read_fraction(&self, origin: ReadOrigin) -> Option<f64> {
        let total = self.n_read[0] + self.n_read[1];
        if total > 0 {
            Some(self.n_read[origin as usize] as f64 / total as f64)
        } else {
            None
        }
    }

    // getters
    pub fn n_var(&self) -> [u64; 4] {
        self.n_var
    }

    pub fn n_read(&self) -> [u64; 2] {
        self.n_read
    }

    pub fn map_q(&self) -> [u64; 2] {
        self.map_q
    }
}

/// Optional scoring diagnostics, collected per contig and mergeable across
/// shards. All classification tallies are split by site shape, index 0 for
/// SNV sites and index 1 for length-changing sites, and only cover sites
/// whose two haplotype windows differ.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ScoringDiagnostics {
    /// Observations whose classification agreed with the read's origin tag
    correct: [u64; 2],
    /// Observations whose classification contradicted the origin tag
    mismatched: [u64; 2],
    /// Observations matching both haplotype windows
    both: [u64; 2],
    /// Observations matching neither haplotype window
    neither: [u64; 2],
    /// Reads whose origin tag was not a recognized label
    unknown_origin_reads: u64,
    /// Read names per SNV site whose agreeing classification was only settled
    /// by the substring fallback tier; these sites deserve manual review
    fallback_resolved: HashMap<u64, Vec<String>>
}

impl AddAssign for ScoringDiagnostics {
    fn add_assign(&mut self, rhs: Self) {
        for (slot, value) in self.correct.iter_mut().zip(rhs.correct) {
            *slot += value;
        }
        for (slot, value) in self.mismatched.iter_mut().zip(rhs.mismatched) {
            *slot += value;
        }
        for (slot, value) in self.both.iter_mut().zip(rhs.both) {
            *slot += value;
        }
        for (slot, value) in self.neither.iter_mut().zip(rhs.neither) {
            *slot += value;
        }
        self.unknown_origin_reads += rhs.unknown_origin_reads;
        for (var_start, read_names) in rhs.fallback_resolved {
            self.fallback_resolved.entry(var_start).or_default().extend(read_names);
        }
    }
}

impl ScoringDiagnostics {
    /// Counts a read whose origin tag was not one of the recognized labels.
    pub fn record_unknown_origin(&mut self) {
        self.unknown_origin_reads += 1;
    }

    /// Records one classified observation at an informative site.
    /// # Arguments
    /// * `var_start` - the variant site position
    /// * `read_name` - the observed read
    /// * `is_snv` - the site-shape split for the tallies
    /// * `classification` - the cascade's final call
    /// * `origin` - the parsed origin tag, if recognized
    /// * `used_fallback` - true if the substring fallback tier settled the call
    pub fn record_observation(
        &mut self, var_start: u64, read_name: &str, is_snv: bool,
        classification: HapMatch, origin: Option<ReadOrigin>, used_fallback: bool
    ) {
        let shape = if is_snv { 0 } else { 1 };
        let agrees = matches!(
            (classification, origin),
            (HapMatch::Hap0, Some(ReadOrigin::HapA)) | (HapMatch::Hap1, Some(ReadOrigin::HapB))
        );
        match classification {
            HapMatch::Both => self.both[shape] += 1,
            HapMatch::Neither => self.neither[shape] += 1,
            HapMatch::Hap0 | HapMatch::Hap1 => {
                if agrees {
                    self.correct[shape] += 1;
                    if used_fallback && is_snv {
                        self.fallback_resolved.entry(var_start).or_default().push(read_name.to_string());
                    }
                } else {
                    self.mismatched[shape] += 1;
                }
            }
        }
    }

    // getters
    pub fn correct(&self) -> [u64; 2] {
        self.correct
    }

    pub fn mismatched(&self) -> [u64; 2] {
        self.mismatched
    }

    pub fn both(&self) -> [u64; 2] {
        self.both
    }

    pub fn neither(&self) -> [u64; 2] {
        self.neither
    }

    pub fn unknown_origin_reads(&self) -> u64 {
        self.unknown_origin_reads
    }

    pub fn fallback_resolved(&self) -> &HashMap<u64, Vec<String>> {
        &self.fallback_resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    #[test]
    fn test_counter_slots() {
        let mut counter = SiteBiasCounter::default();
        counter.record_classification(HapMatch::Hap0);
        counter.record_classification(HapMatch::Hap0);
        counter.record_classification(HapMatch::Hap1);
        counter.record_classification(HapMatch::Both);
        counter.record_classification(HapMatch::Neither);
        counter.record_read(ReadOrigin::HapA, 60);
        counter.record_read(ReadOrigin::HapA, 20);
        counter.record_read(ReadOrigin::HapB, 30);

        assert_eq!(counter.n_var(), [2, 1, 1, 1]);
        assert_eq!(counter.n_read(), [2, 1]);
        assert_eq!(counter.map_q(), [80, 30]);
    }

    #[test]
    fn test_counter_add_assign() {
        let mut counter = SiteBiasCounter::default();
        counter.record_classification(HapMatch::Hap0);
        counter.record_read(ReadOrigin::HapA, 60);

        let mut other = SiteBiasCounter::default();
        other.record_classification(HapMatch::Hap1);
        other.record_classification(HapMatch::Both);
        other.record_read(ReadOrigin::HapB, 40);

        counter += other;
        assert_eq!(counter.n_var(), [1, 1, 1, 0]);
        assert_eq!(counter.n_read(), [1, 1]);
        assert_eq!(counter.map_q(), [60, 40]);
    }

    #[test]
    fn test_bias_ratios() {
        let mut counter = SiteBiasCounter::default();
        assert_eq!(counter.hap_bias(0), None);
        assert_eq!(counter.read_fraction(ReadOrigin::HapA), None);

        // 6 hap0, 2 hap1, 2 both, 1 neither
        for _ in 0..6 {
            counter.record_classification(HapMatch::Hap0);
        }
        for _ in 0..2 {
            counter.record_classification(HapMatch::Hap1);
        }
        for _ in 0..2 {
            counter.record_classification(HapMatch::Both);
        }
        counter.record_classification(HapMatch::Neither);
        counter.record_read(ReadOrigin::HapA, 60);
        counter.record_read(ReadOrigin::HapB, 60);
        counter.record_read(ReadOrigin::HapB, 60);

        // neither is excluded from the informative denominator
        assert_approx_eq!(counter.hap_bias(0).unwrap(), (6.0 + 1.0) / 10.0);
        assert_approx_eq!(counter.hap_bias(1).unwrap(), (2.0 + 1.0) / 10.0);
        assert_approx_eq!(counter.read_fraction(ReadOrigin::HapA).unwrap(), 1.0 / 3.0);
        assert_approx_eq!(counter.read_fraction(ReadOrigin::HapB).unwrap(), 2.0 / 3.0);
    }

    #[test]
    fn test_diagnostics_observation_branches() {
        let mut diagnostics = ScoringDiagnostics::default();

        // agreeing calls by shape
        diagnostics.record_observation(10, "read_1", true, HapMatch::Hap0, Some(ReadOrigin::HapA), false);
        diagnostics.record_observation(10, "read_2", false, HapMatch::Hap1, Some(ReadOrigin::HapB), false);
        // disagreeing call, ambiguous calls, unknown tag
        diagnostics.record_observation(10, "read_3", true, HapMatch::Hap1, Some(ReadOrigin::HapA), false);
        diagnostics.record_observation(10, "read_4", true, HapMatch::Both, Some(ReadOrigin::HapA), false);
        diagnostics.record_observation(10, "read_5", false, HapMatch::Neither, Some(ReadOrigin::HapB), false);
        diagnostics.record_observation(10, "read_6", true, HapMatch::Hap0, None, false);

        assert_eq!(diagnostics.correct(), [1, 1]);
        assert_eq!(diagnostics.mismatched(), [2, 0]);
        assert_eq!(diagnostics.both(), [1, 0]);
        assert_eq!(diagnostics.neither(), [0, 1]);
        assert!(diagnostics.fallback_resolved().is_empty());
    }

    #[test]
    fn test_diagnostics_fallback_tracking() {
        let mut diagnostics = ScoringDiagnostics::default();

        // only agreeing SNV calls settled by the fallback tier are tracked
        diagnostics.record_observation(42, "read_1", true, HapMatch::Hap0, Some(ReadOrigin::HapA), true);
        diagnostics.record_observation(42, "read_2", false, HapMatch::Hap1, Some(ReadOrigin::HapB), true);
        diagnostics.record_observation(42, "read_3", true, HapMatch::Hap1, Some(ReadOrigin::HapA), true);

        assert_eq!(diagnostics.fallback_resolved().len(), 1);
        assert_eq!(diagnostics.fallback_resolved()[&42], vec!["read_1".to_string()]);
    }

    #[test]
    fn test_diagnostics_add_assign() {
        let mut diagnostics = ScoringDiagnostics::default();
        diagnostics.record_observation(10, "read_1", true, HapMatch::Hap0, Some(ReadOrigin::HapA), true);
        diagnostics.record_unknown_origin();

        let mut other = ScoringDiagnostics::default();
        other.record_observation(10, "read_2", true, HapMatch::Hap0, Some(ReadOrigin::HapA), true);
        other.record_observation(20, "read_3", true, HapMatch::Both, Some(ReadOrigin::HapB), false);
        other.record_unknown_origin();

        diagnostics += other;
        assert_eq!(diagnostics.correct(), [2, 0]);
        assert_eq!(diagnostics.both(), [1, 0]);
        assert_eq!(diagnostics.unknown_origin_reads(), 2);
        assert_eq!(diagnostics.fallback_resolved()[&10], vec!["read_1".to_string(), "read_2".to_string()]);
    }
}
