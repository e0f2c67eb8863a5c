
use anyhow::Context;
use indexmap::IndexMap;
use log::{debug, warn};
use rayon::prelude::*;

use crate::data_types::alignments::{AlignedSegment, ReadOrigin};
use crate::data_types::bias_metrics::{HapMatch, ScoringDiagnostics, SiteBiasCounter};
use crate::data_types::haplotype_context::ContigContext;
use crate::match_engine::{MatchTier, ScoringError, classify_read_at_variant};

/// Owns the mutable per-site counters for one contig while reads are scored.
/// Every variant position in the haplotype context gets a counter before the
/// first read is processed, so missing-key lookups during scoring are a
/// context-integrity failure rather than a growth path.
#[derive(Clone, Debug)]
pub struct BiasAggregator {
    /// The contig being scored
    contig: String,
    /// Per-site counters in variant position order
    counters: IndexMap<u64, SiteBiasCounter>
}

impl BiasAggregator {
    /// Initializes one zeroed counter per variant position in the context.
    pub fn from_context(context: &ContigContext) -> Self {
        let counters = context.haplotypes().keys()
            .map(|&position| (position, SiteBiasCounter::default()))
            .collect();
        Self {
            contig: context.contig().to_string(),
            counters
        }
    }

    /// Applies one classified (read, variant) observation: the classification
    /// slot always moves; the read slots only move for a recognized origin tag.
    /// # Arguments
    /// * `var_start` - the variant position
    /// * `classification` - the cascade's final call
    /// * `origin` - the parsed origin tag, if recognized
    /// * `mapping_quality` - the read's MAPQ
    /// # Errors
    /// * if the variant position has no counter, which means it never had context
    pub fn record(
        &mut self, var_start: u64, classification: HapMatch,
        origin: Option<ReadOrigin>, mapping_quality: u8
    ) -> Result<(), ScoringError> {
        let counter = self.counters.get_mut(&var_start)
            .ok_or(ScoringError::MissingContext { position: var_start })?;
        counter.record_classification(classification);
        if let Some(origin) = origin {
            counter.record_read(origin, mapping_quality);
        }
        Ok(())
    }

    /// Folds another shard of counters into this one. Sum-reduction is
    /// commutative and associative, so merge order does not matter.
    pub fn merge(&mut self, other: BiasAggregator) {
        debug_assert_eq!(self.contig, other.contig);
        for (position, counter) in other.counters {
            *self.counters.entry(position).or_default() += counter;
        }
    }

    // getters
    pub fn contig(&self) -> &str {
        &self.contig
    }

    pub fn counters(&self) -> &IndexMap<u64, SiteBiasCounter> {
        &self.counters
    }

    pub fn counter(&self, var_start: u64) -> Option<&SiteBiasCounter> {
        self.counters.get(&var_start)
    }
}

/// Scores one segment against every variant it overlaps, updating counters
/// and (optionally) diagnostics. Conflict-set membership is checked before
/// any classification or counter update.
fn score_segment(
    context: &ContigContext,
    segment: &AlignedSegment,
    aggregator: &mut BiasAggregator,
    mut diagnostics: Option<&mut ScoringDiagnostics>
) -> anyhow::Result<()> {
    let origin = segment.origin();

    // the overlap query yields each variant exactly once per segment
    for var_start in context.overlapping_variants(segment.start(), segment.end()) {
        if context.is_conflict(var_start) {
            continue;
        }

        let decision = classify_read_at_variant(segment, var_start, context)
            .with_context(|| format!(
                "Error while scoring read {:?} against {}:{var_start}:",
                segment.read_name(), context.contig()
            ))?;
        aggregator.record(var_start, decision.classification, origin, segment.mapping_quality())?;

        if origin.is_none() {
            match diagnostics.as_deref_mut() {
                Some(collector) => collector.record_unknown_origin(),
                None => warn!(
                    "Read {:?} has unrecognized origin tag {:?}, excluded from read totals",
                    segment.read_name(), segment.origin_tag()
                )
            }
        }

        if let Some(collector) = diagnostics.as_deref_mut() {
            // only sites whose windows actually differ say anything about bias
            let informative = context.haplotype_pair(var_start)
                .map(|pair| pair.haplotypes_differ())
                .unwrap_or(false);
            if informative {
                collector.record_observation(
                    var_start,
                    segment.read_name(),
                    context.gap(var_start).is_none(),
                    decision.classification,
                    origin,
                    decision.tier == MatchTier::Substring
                );
            }
        }
    }

    Ok(())
}

/// Sequentially scores a contig's segments against its haplotype context.
/// # Arguments
/// * `context` - the finished haplotype context (conflict set already closed)
/// * `segments` - the aligned segments for this contig
/// * `diagnostics` - optional collector for scoring diagnostics
/// # Errors
/// * if any (read, variant) pair fails to classify or lacks context
pub fn score_contig_reads(
    context: &ContigContext,
    segments: &[AlignedSegment],
    mut diagnostics: Option<&mut ScoringDiagnostics>
) -> anyhow::Result<BiasAggregator> {
    let mut aggregator = BiasAggregator::from_context(context);
    debug!("Scoring {} segments on {}...", segments.len(), context.contig());
    for segment in segments.iter() {
        score_segment(context, segment, &mut aggregator, diagnostics.as_deref_mut())?;
    }
    Ok(aggregator)
}

/// Parallel variant of `score_contig_reads`: segments are scored in rayon
/// shards, each with its own counters and diagnostics, then sum-merged.
/// The haplotype context is only read, so shards share it freely.
/// # Arguments
/// * `context` - the finished haplotype context (conflict set already closed)
/// * `segments` - the aligned segments for this contig
/// # Errors
/// * if any (read, variant) pair fails to classify or lacks context
pub fn score_contig_reads_parallel(
    context: &ContigContext,
    segments: &[AlignedSegment]
) -> anyhow::Result<(BiasAggregator, ScoringDiagnostics)> {
    debug!("Scoring {} segments on {} in parallel...", segments.len(), context.contig());
    segments.par_iter()
        .try_fold(
            || (BiasAggregator::from_context(context), ScoringDiagnostics::default()),
            |(mut aggregator, mut diagnostics), segment| -> anyhow::Result<(BiasAggregator, ScoringDiagnostics)> {
                score_segment(context, segment, &mut aggregator, Some(&mut diagnostics))?;
                Ok((aggregator, diagnostics))
            }
        )
        .try_reduce(
            || (BiasAggregator::from_context(context), ScoringDiagnostics::default()),
            |(mut aggregator, mut diagnostics), (other_aggregator, other_diagnostics)| {
                aggregator.merge(other_aggregator);
                diagnostics += other_diagnostics;
                Ok((aggregator, diagnostics))
            }
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context_builder::{ContextConfigBuilder, build_contig_context};
    use crate::data_types::reference_genome::InMemoryReference;
    use crate::data_types::variants::Variant;

    /// Context with a single het SNV A->G at position 4 of ACGTACGTACGT
    fn snv_context() -> ContigContext {
        let mut reference = InMemoryReference::empty();
        reference.add_contig("chrT".to_string(), "ACGTACGTACGT").unwrap();
        let variants = [
            Variant::new(4, b"A".to_vec(), vec![b"G".to_vec()], [0, 1]).unwrap()
        ];
        let config = ContextConfigBuilder::default()
            .var_chain(6usize)
            .padding(2usize)
            .build().unwrap();
        build_contig_context("chrT", &variants, &reference, &config).unwrap()
    }

    fn full_match_segment(name: &str, start: u64, sequence: &[u8], tag: &str, mapq: u8) -> AlignedSegment {
        AlignedSegment::new(
            name.to_string(), start, &[(0, sequence.len())],
            mapq, tag.to_string(), sequence.to_vec()
        ).unwrap()
    }

    #[test]
    fn test_counters_initialized_before_scoring() {
        let context = snv_context();
        let aggregator = score_contig_reads(&context, &[], None).unwrap();
        // the site exists with zeroed slots even though nothing was scored
        assert_eq!(aggregator.counters().len(), 1);
        assert_eq!(aggregator.counter(4).unwrap().n_var(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_score_hap0_read() {
        let context = snv_context();
        let segments = [
            full_match_segment("read_1", 0, b"ACGTACGTACGT", "hapA", 60)
        ];

        let mut diagnostics = ScoringDiagnostics::default();
        let aggregator = score_contig_reads(&context, &segments, Some(&mut diagnostics)).unwrap();
        let counter = aggregator.counter(4).unwrap();
        assert_eq!(counter.n_var(), [1, 0, 0, 0]);
        assert_eq!(counter.n_read(), [1, 0]);
        assert_eq!(counter.map_q(), [60, 0]);

        // informative SNV site, agreeing call, no fallback
        assert_eq!(diagnostics.correct(), [1, 0]);
        assert_eq!(diagnostics.unknown_origin_reads(), 0);
        assert!(diagnostics.fallback_resolved().is_empty());
    }

    #[test]
    fn test_score_hap1_read() {
        let context = snv_context();
        let segments = [
            full_match_segment("read_1", 0, b"ACGTGCGTACGT", "hapB", 30)
        ];

        let aggregator = score_contig_reads(&context, &segments, None).unwrap();
        let counter = aggregator.counter(4).unwrap();
        assert_eq!(counter.n_var(), [0, 1, 0, 0]);
        assert_eq!(counter.n_read(), [0, 1]);
        assert_eq!(counter.map_q(), [0, 30]);
    }

    #[test]
    fn test_unknown_origin_tag_excluded_from_read_slots() {
        let context = snv_context();
        let segments = [
            full_match_segment("read_1", 0, b"ACGTACGTACGT", "hapX", 60)
        ];

        let mut diagnostics = ScoringDiagnostics::default();
        let aggregator = score_contig_reads(&context, &segments, Some(&mut diagnostics)).unwrap();
        let counter = aggregator.counter(4).unwrap();
        // the classification still lands, the read totals do not
        assert_eq!(counter.n_var(), [1, 0, 0, 0]);
        assert_eq!(counter.n_read(), [0, 0]);
        assert_eq!(counter.map_q(), [0, 0]);
        assert_eq!(diagnostics.unknown_origin_reads(), 1);
    }

    #[test]
    fn test_non_overlapping_read_not_scored() {
        let context = snv_context();
        let segments = [
            full_match_segment("read_1", 7, b"TACGT", "hapA", 60)
        ];

        let aggregator = score_contig_reads(&context, &segments, None).unwrap();
        assert_eq!(aggregator.counter(4).unwrap().n_var(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_conflict_sites_never_scored() {
        // chained variants where the first's span covers the second: both
        // positions are conflicts, so reads leave every counter untouched
        let mut reference = InMemoryReference::empty();
        reference.add_contig(
            "mock_chr1".to_string(), "ACCGTTACCAGGACTTGACAAACCGGTTAACCGGTTAACCGGTTAACCGT"
        ).unwrap();
        let variants = [
            Variant::new(20, b"AACCG".to_vec(), vec![b"AAC".to_vec()], [0, 1]).unwrap(),
            Variant::new(24, b"G".to_vec(), vec![b"T".to_vec()], [0, 1]).unwrap()
        ];
        let config = ContextConfigBuilder::default()
            .var_chain(8usize)
            .padding(3usize)
            .build().unwrap();
        let context = build_contig_context("mock_chr1", &variants, &reference, &config).unwrap();
        assert!(context.is_conflict(20) && context.is_conflict(24));

        let segments = [
            full_match_segment("read_1", 10, b"GGACTTGACAAACCGGTTAACCGGTTAACC", "hapA", 60)
        ];
        let mut diagnostics = ScoringDiagnostics::default();
        let aggregator = score_contig_reads(&context, &segments, Some(&mut diagnostics)).unwrap();
        assert_eq!(aggregator.counter(20).unwrap().n_var(), [0, 0, 0, 0]);
        assert_eq!(aggregator.counter(24).unwrap().n_var(), [0, 0, 0, 0]);
        assert_eq!(diagnostics.correct(), [0, 0]);
    }

    #[test]
    fn test_multiple_variants_one_read() {
        // two independent SNVs far enough apart to stay un-chained, both
        // covered by one read: the pair is scored once per variant
        let mut reference = InMemoryReference::empty();
        reference.add_contig("chrT".to_string(), &"ACGTACGTAC".repeat(4)).unwrap();
        let variants = [
            Variant::new(10, b"A".to_vec(), vec![b"T".to_vec()], [0, 1]).unwrap(),
            Variant::new(25, b"C".to_vec(), vec![b"A".to_vec()], [1, 0]).unwrap()
        ];
        let config = ContextConfigBuilder::default()
            .var_chain(6usize)
            .padding(2usize)
            .build().unwrap();
        let context = build_contig_context("chrT", &variants, &reference, &config).unwrap();

        // read from haplotype 0: reference at 10, the A allele at 25
        let mut hap0_seq = b"ACGTACGTAC".repeat(4);
        hap0_seq[25] = b'A';
        let segments = [
            full_match_segment("read_1", 0, &hap0_seq, "hapA", 50)
        ];

        let aggregator = score_contig_reads(&context, &segments, None).unwrap();
        assert_eq!(aggregator.counter(10).unwrap().n_var(), [1, 0, 0, 0]);
        assert_eq!(aggregator.counter(10).unwrap().n_read(), [1, 0]);
        assert_eq!(aggregator.counter(25).unwrap().n_var(), [1, 0, 0, 0]);
        assert_eq!(aggregator.counter(25).unwrap().n_read(), [1, 0]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let context = snv_context();
        let segments: Vec<AlignedSegment> = (0..40)
            .map(|i| {
                let (sequence, tag): (&[u8], &str) = if i % 3 == 0 {
                    (b"ACGTGCGTACGT", "hapB")
                } else {
                    (b"ACGTACGTACGT", "hapA")
                };
                full_match_segment(&format!("read_{i}"), 0, sequence, tag, 60)
            })
            .collect();

        let mut seq_diagnostics = ScoringDiagnostics::default();
        let sequential = score_contig_reads(&context, &segments, Some(&mut seq_diagnostics)).unwrap();
        let (parallel, par_diagnostics) = score_contig_reads_parallel(&context, &segments).unwrap();

        assert_eq!(sequential.counter(4), parallel.counter(4));
        assert_eq!(seq_diagnostics.correct(), par_diagnostics.correct());
        assert_eq!(seq_diagnostics.mismatched(), par_diagnostics.mismatched());
        assert_eq!(seq_diagnostics.unknown_origin_reads(), par_diagnostics.unknown_origin_reads());

        // 14 hapB reads, 26 hapA reads
        let counter = parallel.counter(4).unwrap();
        assert_eq!(counter.n_var(), [26, 14, 0, 0]);
        assert_eq!(counter.n_read(), [26, 14]);
    }

    #[test]
    fn test_aggregator_merge() {
        let context = snv_context();
        let mut first = BiasAggregator::from_context(&context);
        first.record(4, HapMatch::Hap0, Some(ReadOrigin::HapA), 60).unwrap();
        let mut second = BiasAggregator::from_context(&context);
        second.record(4, HapMatch::Both, Some(ReadOrigin::HapB), 20).unwrap();

        first.merge(second);
        let counter = first.counter(4).unwrap();
        assert_eq!(counter.n_var(), [1, 0, 1, 0]);
        assert_eq!(counter.n_read(), [1, 1]);
        assert_eq!(counter.map_q(), [60, 20]);
    }

    #[test]
    fn test_record_without_context_fails() {
        let context = snv_context();
        let mut aggregator = BiasAggregator::from_context(&context);
        let result = aggregator.record(99, HapMatch::Hap0, Some(ReadOrigin::HapA), 60);
        assert!(matches!(result.unwrap_err(), ScoringError::MissingContext { position: 99 }));
    }
}
