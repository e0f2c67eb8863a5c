
use anyhow::{Context, ensure};
use coitrees::{COITree, Interval, IntervalTree};
use derive_builder::Builder;
use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, info, warn};
use rustc_hash::FxHashMap as HashMap;

use crate::data_types::haplotype_context::{CohortRecord, ConflictSet, ContigContext, GapRecord, HaplotypeSequencePair};
use crate::data_types::reference_genome::ReferenceAccessor;
use crate::data_types::variants::Variant;

/// Controls the haplotype context construction
#[derive(Builder, Clone, Copy, Debug)]
#[builder(default)]
pub struct ContextConfig {
    /// Chaining distance: variants closer than this are handled as one cohort,
    /// and conflict positions poison this radius around themselves
    var_chain: usize,
    /// Number of reference bases of context added on each side of a variant window
    padding: usize
}

impl Default for ContextConfig {
    fn default() -> Self {
        // defaults tuned for short-read data; callers override through the builder
        Self {
            var_chain: 25,
            padding: 5
        }
    }
}

impl ContextConfig {
    // getters
    pub fn var_chain(&self) -> usize {
        self.var_chain
    }

    pub fn padding(&self) -> usize {
        self.padding
    }
}

/// Outcome of attempting to splice one variant allele into a strand sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SpliceOutcome {
    /// The allele now occupies `[offset, offset + len)` of the strand sequence
    Applied { offset: usize, len: usize },
    /// The variant started at or before the strand's covered-to position and
    /// was not applied
    Conflict
}

/// The result of one independent per-strand reduction over a cohort.
#[derive(Debug)]
struct StrandPass {
    /// The cohort window with this strand's alleles spliced in
    sequence: Vec<u8>,
    /// Per-variant splice outcomes, parallel to the cohort member list
    outcomes: Vec<SpliceOutcome>,
    /// Running length delta after processing each member (ref len - allele len
    /// of the most recently applied variant)
    running_deltas: Vec<i64>,
    /// Positions flagged by overlap conflicts on this strand
    conflict_seeds: Vec<u64>
}

impl StrandPass {
    fn has_conflict(&self) -> bool {
        self.outcomes.iter().any(|o| matches!(o, SpliceOutcome::Conflict))
    }
}

/// Splices one strand's alleles (selected by genotype) into the cohort
/// reference window, left to right. A member whose start lies at or before
/// the strand's covered-to position is not applied and flags a conflict.
/// # Arguments
/// * `cohort` - the cohort members in position order
/// * `hap_index` - which genotype slot this strand follows (0 or 1)
/// * `window_start` - reference coordinate of `ref_window[0]`
/// * `ref_window` - the unmodified reference sequence of the cohort window
fn splice_strand(cohort: &[&Variant], hap_index: usize, window_start: u64, ref_window: &[u8]) -> anyhow::Result<StrandPass> {
    let mut sequence = ref_window.to_vec();
    let mut outcomes = Vec::with_capacity(cohort.len());
    let mut running_deltas = Vec::with_capacity(cohort.len());
    let mut conflict_seeds = vec![];

    // `adjust` maps reference coordinates onto the shifting strand sequence:
    // it starts at the window origin and absorbs the delta of each applied
    // variant before the next one
    let mut adjust = window_start as i64;
    let mut delta: i64 = 0;
    let mut prev_start: i64 = -1;
    let mut covered: i64 = 0;

    for variant in cohort.iter() {
        let position = variant.position() as i64;
        if position > prev_start + covered {
            adjust += delta;
            let allele_index = variant.genotype()[hap_index];
            let allele_len = variant.allele_sequence(allele_index).len();
            let offset = (position - adjust) as usize;

            if allele_index == 0 {
                // the window already carries the reference allele
                delta = 0;
            } else {
                let end_offset = (variant.stop() as i64 - adjust) as usize;
                ensure!(
                    end_offset <= sequence.len(),
                    "variant at position {} extends past its cohort window", variant.position()
                );
                let allele = variant.allele_sequence(allele_index).to_vec();
                sequence.splice(offset..end_offset, allele);
                delta = variant.ref_allele().len() as i64 - allele_len as i64;
            }

            prev_start = position;
            covered = if delta == 0 { allele_len as i64 - 1 } else { delta };
            outcomes.push(SpliceOutcome::Applied { offset, len: allele_len });
        } else {
            conflict_seeds.push(prev_start as u64);
            conflict_seeds.push(variant.position());
            outcomes.push(SpliceOutcome::Conflict);
        }
        running_deltas.push(delta);
    }

    Ok(StrandPass {
        sequence,
        outcomes,
        running_deltas,
        conflict_seeds
    })
}

/// Slices the padded per-variant window out of a spliced strand sequence.
/// A conflicted member gets an empty window; its position is always in the
/// conflict set, so scoring never compares against it.
fn slice_variant_window(pass: &StrandPass, member_index: usize, padding: usize) -> anyhow::Result<Vec<u8>> {
    match pass.outcomes[member_index] {
        SpliceOutcome::Applied { offset, len } => {
            let window_end = offset + len + padding;
            ensure!(
                offset >= padding && window_end <= pass.sequence.len(),
                "variant window [{}, {window_end}) is outside its cohort sequence", offset as i64 - padding as i64
            );
            Ok(pass.sequence[offset - padding..window_end].to_vec())
        },
        SpliceOutcome::Conflict => Ok(vec![])
    }
}

/// Inserts a haplotype pair, warning on (and overwriting) a duplicate key.
fn insert_haplotype_pair(
    haplotypes: &mut IndexMap<u64, HaplotypeSequencePair>,
    contig: &str, position: u64, pair: HaplotypeSequencePair
) {
    if haplotypes.insert(position, pair).is_some() {
        warn!("Duplicate variant context at {contig}:{position}, keeping the latest entry");
    }
}

/// Returns the sorted member indices of all variants overlapping `[window_start, window_end)`.
fn query_variant_range(
    tree: &COITree<(), usize>,
    start_lookup: &HashMap<u64, Vec<usize>>,
    window_start: u64, window_end: u64
) -> Vec<usize> {
    if window_start >= window_end {
        return vec![];
    }

    // tree coordinates are 0-based inclusive
    let mut starts = vec![];
    tree.query(window_start as i32, (window_end - 1) as i32, |interval| {
        starts.push(interval.first as u64);
    });

    starts.into_iter()
        .sorted_unstable()
        .dedup()
        .flat_map(|start| start_lookup[&start].iter().copied())
        .sorted_unstable()
        .dedup()
        .collect()
}

/// Builds the read-only haplotype context for one contig: per-variant window
/// pairs, gap records, cohort records, and the closed conflict set.
/// # Arguments
/// * `contig` - the contig name
/// * `variants` - the contig's variants, sorted by position
/// * `reference` - the reference sequence accessor
/// * `config` - chaining distance and window padding
/// # Errors
/// * if the variants are not position-sorted or their coordinates overflow the interval index
/// * if a reference fetch fails
pub fn build_contig_context<R: ReferenceAccessor>(
    contig: &str,
    variants: &[Variant],
    reference: &R,
    config: &ContextConfig
) -> anyhow::Result<ContigContext> {
    ensure!(config.var_chain() > config.padding(), "var_chain ({}) must be greater than padding ({})", config.var_chain(), config.padding());
    ensure!(
        variants.windows(2).all(|pair| pair[0].position() <= pair[1].position()),
        "variants on {contig} are not sorted by position"
    );
    let var_chain = config.var_chain() as u64;
    let padding = config.padding();
    if let Some(last) = variants.last() {
        ensure!(
            last.stop() + var_chain <= i32::MAX as u64,
            "variant coordinates on {contig} overflow the interval index"
        );
    }

    // range index over the variant reference spans; also handed to the
    // finished context for read-overlap queries
    let intervals: Vec<Interval<()>> = variants.iter()
        .map(|v| Interval::new(v.position() as i32, v.stop() as i32 - 1, ()))
        .collect();
    let variant_tree: COITree<(), usize> = COITree::new(&intervals);
    let mut start_lookup: HashMap<u64, Vec<usize>> = Default::default();
    for (index, variant) in variants.iter().enumerate() {
        start_lookup.entry(variant.position()).or_default().push(index);
    }

    let mut haplotypes: IndexMap<u64, HaplotypeSequencePair> = Default::default();
    let mut gaps: HashMap<u64, GapRecord> = Default::default();
    let mut cohorts: HashMap<u64, CohortRecord> = Default::default();
    let mut conflicts = ConflictSet::default();

    let mut cursor = 0;
    while cursor < variants.len() {
        let variant = &variants[cursor];
        let mut window_start = variant.position().saturating_sub(var_chain);
        let mut window_end = variant.stop() + var_chain;
        let mut cohort = query_variant_range(&variant_tree, &start_lookup, window_start, window_end);

        if cohort.len() > 1 {
            // grow the window until no variant within chaining distance of any
            // member is left out
            loop {
                for &member in cohort.iter() {
                    let member_variant = &variants[member];
                    window_start = window_start.min(member_variant.position().saturating_sub(var_chain));
                    window_end = window_end.max(member_variant.position() + member_variant.longest_allele_len() as u64 + var_chain);
                }
                let requery = query_variant_range(&variant_tree, &start_lookup, window_start, window_end);
                if requery == cohort {
                    break;
                }
                cohort = requery;
            }
            debug!("Chained {} variants into a cohort at {contig}:{}", cohort.len(), variant.position());

            let members: Vec<&Variant> = cohort.iter().map(|&index| &variants[index]).collect();
            let ref_window = reference.fetch(contig, window_start, window_end)
                .with_context(|| format!("Error while fetching cohort window {contig}:{window_start}-{window_end}:"))?;

            let pass0 = splice_strand(&members, 0, window_start, &ref_window)?;
            let pass1 = splice_strand(&members, 1, window_start, &ref_window)?;
            for &seed in pass0.conflict_seeds.iter().chain(pass1.conflict_seeds.iter()) {
                conflicts.add_seed(seed);
            }

            let mut indel_in_cohort = false;
            for (member_index, member) in members.iter().enumerate() {
                let seq_hap0 = slice_variant_window(&pass0, member_index, padding)?;
                let seq_hap1 = slice_variant_window(&pass1, member_index, padding)?;
                insert_haplotype_pair(&mut haplotypes, contig, member.position(), HaplotypeSequencePair::new(seq_hap0, seq_hap1));

                let hap0 = pass0.running_deltas[member_index];
                let hap1 = pass1.running_deltas[member_index];
                if hap0 != 0 || hap1 != 0 {
                    gaps.insert(member.position(), GapRecord { hap0, hap1 });
                    indel_in_cohort = true;
                }
            }

            // a cohort-level record is only trustworthy when an indel shifted
            // the frame somewhere and no member was ambiguous
            if indel_in_cohort && !pass0.has_conflict() && !pass1.has_conflict() {
                let anchor = members[0].position();
                let cohort_seq = |pass: &StrandPass| -> anyhow::Result<Vec<u8>> {
                    match *pass.outcomes.last().unwrap() {
                        SpliceOutcome::Applied { offset, len } => {
                            let lead_in = config.var_chain() - padding;
                            let trim_end = offset + len + padding;
                            ensure!(
                                lead_in <= trim_end && trim_end <= pass.sequence.len(),
                                "cohort window at {contig}:{anchor} is outside its spliced sequence"
                            );
                            Ok(pass.sequence[lead_in..trim_end].to_vec())
                        },
                        SpliceOutcome::Conflict => unreachable!("conflicted cohorts are never recorded")
                    }
                };
                let record = CohortRecord::new(anchor, cohort_seq(&pass0)?, cohort_seq(&pass1)?);
                for member in members.iter() {
                    cohorts.insert(member.position(), record.clone());
                }
            }

            cursor = cohort.last().unwrap() + 1;
        } else {
            // lone variant: splice each genotype allele into the padded window directly
            let window_start = variant.position().saturating_sub(padding as u64);
            let ref_window = reference.fetch(contig, window_start, variant.stop() + padding as u64)
                .with_context(|| format!("Error while fetching variant window at {contig}:{}:", variant.position()))?;

            let genotype = variant.genotype();
            let pass0 = splice_strand(&[variant], 0, window_start, &ref_window)?;
            let pass1 = splice_strand(&[variant], 1, window_start, &ref_window)?;
            insert_haplotype_pair(
                &mut haplotypes, contig, variant.position(),
                HaplotypeSequencePair::new(pass0.sequence, pass1.sequence)
            );

            let hap0 = variant.ref_allele().len() as i64 - variant.allele_sequence(genotype[0]).len() as i64;
            let hap1 = variant.ref_allele().len() as i64 - variant.allele_sequence(genotype[1]).len() as i64;
            if hap0 != 0 || hap1 != 0 {
                gaps.insert(variant.position(), GapRecord { hap0, hap1 });
            }

            cursor += 1;
        }
    }

    // reads near a conflict cannot be attributed reliably either, so the
    // whole chaining radius around each seed is excluded from scoring
    conflicts.close(var_chain);

    info!(
        "Built haplotype context for {contig}: {} variant windows, {} gap records, {} cohort entries, {} conflict seeds.",
        haplotypes.len(), gaps.len(), cohorts.len(), conflicts.num_seeds()
    );

    Ok(ContigContext::new(
        contig.to_string(), padding, config.var_chain(),
        haplotypes, gaps, cohorts, conflicts, variant_tree
    ))
}

/// Builds contexts for a whole variant set, one contig at a time, preserving
/// contig order for downstream reporting.
/// # Arguments
/// * `variants_by_contig` - position-sorted variants per contig
/// * `reference` - the reference sequence accessor
/// * `config` - chaining distance and window padding
/// # Errors
/// * if any contig fails to build
pub fn build_reference_contexts<R: ReferenceAccessor>(
    variants_by_contig: &IndexMap<String, Vec<Variant>>,
    reference: &R,
    config: &ContextConfig
) -> anyhow::Result<IndexMap<String, ContigContext>> {
    let mut contexts = IndexMap::with_capacity(variants_by_contig.len());
    for (contig, variants) in variants_by_contig.iter() {
        let context = build_contig_context(contig, variants, reference, config)
            .with_context(|| format!("Error while building haplotype context for {contig}:"))?;
        contexts.insert(contig.clone(), context);
    }
    Ok(contexts)
}
