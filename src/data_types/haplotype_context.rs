
use coitrees::{COITree, IntervalTree};
use indexmap::IndexMap;
use itertools::Itertools;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use serde::Serialize;

/// The two per-variant haplotype windows for one site, padded symmetrically.
/// A strand that suffered an overlap conflict during construction carries an
/// empty window; the site is also in the conflict set, so scoring never
/// compares against it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct HaplotypeSequencePair {
    /// Local window with the first genotype allele spliced in
    seq_hap0: Vec<u8>,
    /// Local window with the second genotype allele spliced in
    seq_hap1: Vec<u8>
}

impl HaplotypeSequencePair {
    pub fn new(seq_hap0: Vec<u8>, seq_hap1: Vec<u8>) -> Self {
        Self {
            seq_hap0,
            seq_hap1
        }
    }

    /// Returns true if the two windows differ, i.e. the site is informative
    /// for bias measurement.
    pub fn haplotypes_differ(&self) -> bool {
        self.seq_hap0 != self.seq_hap1
    }

    // getters
    pub fn seq_hap0(&self) -> &[u8] {
        &self.seq_hap0
    }

    pub fn seq_hap1(&self) -> &[u8] {
        &self.seq_hap1
    }
}

/// Signed length delta each haplotype carries relative to the reference at a
/// variant position: positive for a net deletion, negative for a net
/// insertion, 0 for equal-length substitutions. Only used to disambiguate
/// indel matches, never as a coordinate.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct GapRecord {
    pub hap0: i64,
    pub hap1: i64
}

/// Joint haplotype sequences spanning a whole chained variant region, shared
/// by every member of the cohort.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CohortRecord {
    /// Reference position the cohort windows are anchored to (the first member's start)
    anchor: u64,
    /// Cohort-level window for the first haplotype
    seq_hap0: Vec<u8>,
    /// Cohort-level window for the second haplotype
    seq_hap1: Vec<u8>
}

impl CohortRecord {
    pub fn new(anchor: u64, seq_hap0: Vec<u8>, seq_hap1: Vec<u8>) -> Self {
        Self {
            anchor,
            seq_hap0,
            seq_hap1
        }
    }

    // getters
    pub fn anchor(&self) -> u64 {
        self.anchor
    }

    pub fn seq_hap0(&self) -> &[u8] {
        &self.seq_hap0
    }

    pub fn seq_hap1(&self) -> &[u8] {
        &self.seq_hap1
    }
}

/// Reference positions excluded from scoring because cohort construction
/// could not unambiguously assign them to one haplotype sequence.
///
/// Detected conflicts are recorded as seeds; `close` derives the scoring-time
/// membership set by expanding every seed by the chaining radius. The closure
/// is always recomputed from the seeds, so closing twice is the same as
/// closing once.
#[derive(Clone, Debug, Default)]
pub struct ConflictSet {
    /// Positions where a conflict was detected
    seeds: HashSet<u64>,
    /// Seeds expanded by the chaining radius; the set scoring consults
    closed: HashSet<u64>
}

impl ConflictSet {
    /// Records a detected conflict position.
    pub fn add_seed(&mut self, position: u64) {
        self.seeds.insert(position);
    }

    /// Rebuilds the closed set from the seeds, expanding each by
    /// `[seed - var_chain, seed + var_chain)`. Reads near a conflict cannot
    /// be attributed reliably either, hence the radius.
    pub fn close(&mut self, var_chain: u64) {
        self.closed.clear();
        for &seed in self.seeds.iter() {
            for position in seed.saturating_sub(var_chain)..seed + var_chain {
                self.closed.insert(position);
            }
        }
    }

    /// Membership test used before any counter update.
    pub fn contains(&self, position: u64) -> bool {
        self.closed.contains(&position) || self.seeds.contains(&position)
    }

    /// The detected (un-expanded) conflict positions, sorted.
    pub fn sorted_seeds(&self) -> Vec<u64> {
        self.seeds.iter().copied().sorted_unstable().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn num_seeds(&self) -> usize {
        self.seeds.len()
    }

    #[cfg(test)]
    pub(crate) fn closed_len(&self) -> usize {
        self.closed.len()
    }
}

/// The read-only haplotype context for one contig: everything the match
/// cascade and the aggregator consult while scoring reads.
pub struct ContigContext {
    /// The contig these tables describe
    contig: String,
    /// Context radius the windows were built with; scoring must reuse it
    padding: usize,
    /// Chaining distance the cohorts and conflict closure were built with
    var_chain: usize,
    /// Per-variant haplotype windows, in variant position order
    haplotypes: IndexMap<u64, HaplotypeSequencePair>,
    /// Length deltas for indel-bearing sites
    gaps: HashMap<u64, GapRecord>,
    /// Cohort-level windows for members of indel-bearing, conflict-free chains
    cohorts: HashMap<u64, CohortRecord>,
    /// Closed set of positions excluded from scoring
    conflicts: ConflictSet,
    /// Interval tree over variant reference spans, for per-segment overlap queries;
    /// interval starts are the variant start positions
    variant_tree: COITree<(), usize>
}

impl std::fmt::Debug for ContigContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // COITree does not have Debug, so report its size instead
        f.debug_struct("ContigContext")
            .field("contig", &self.contig)
            .field("padding", &self.padding)
            .field("var_chain", &self.var_chain)
            .field("haplotypes", &self.haplotypes)
            .field("gaps", &self.gaps)
            .field("cohorts", &self.cohorts)
            .field("conflicts", &self.conflicts)
            .field("variant_tree_len", &self.variant_tree.len())
            .finish()
    }
}

impl ContigContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        contig: String, padding: usize, var_chain: usize,
        haplotypes: IndexMap<u64, HaplotypeSequencePair>,
        gaps: HashMap<u64, GapRecord>,
        cohorts: HashMap<u64, CohortRecord>,
        conflicts: ConflictSet,
        variant_tree: COITree<(), usize>
    ) -> Self {
        Self {
            contig,
            padding,
            var_chain,
            haplotypes,
            gaps,
            cohorts,
            conflicts,
            variant_tree
        }
    }

    /// Returns the starts of all variants whose reference span overlaps
    /// `[start, end)`, sorted and deduplicated.
    /// # Arguments
    /// * `start` - 0-based inclusive start of the query window
    /// * `end` - 0-based exclusive end of the query window
    pub fn overlapping_variants(&self, start: u64, end: u64) -> Vec<u64> {
        if start >= end {
            return vec![];
        }

        // tree coordinates are 0-based inclusive
        let first = start.min(i32::MAX as u64) as i32;
        let last = (end - 1).min(i32::MAX as u64) as i32;
        let mut found = vec![];
        self.variant_tree.query(first, last, |interval| {
            found.push(interval.first as u64);
        });
        found.into_iter().sorted_unstable().dedup().collect()
    }

    pub fn haplotype_pair(&self, var_start: u64) -> Option<&HaplotypeSequencePair> {
        self.haplotypes.get(&var_start)
    }

    pub fn gap(&self, var_start: u64) -> Option<GapRecord> {
        self.gaps.get(&var_start).copied()
    }

    pub fn cohort(&self, var_start: u64) -> Option<&CohortRecord> {
        self.cohorts.get(&var_start)
    }

    pub fn is_conflict(&self, position: u64) -> bool {
        self.conflicts.contains(position)
    }

    // getters
    pub fn contig(&self) -> &str {
        &self.contig
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    pub fn var_chain(&self) -> usize {
        self.var_chain
    }

    pub fn haplotypes(&self) -> &IndexMap<u64, HaplotypeSequencePair> {
        &self.haplotypes
    }

    pub fn conflicts(&self) -> &ConflictSet {
        &self.conflicts
    }

    pub fn num_gaps(&self) -> usize {
        self.gaps.len()
    }

    pub fn num_cohorts(&self) -> usize {
        self.cohorts.len()
    }
}
