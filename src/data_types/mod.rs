
/// Contains the typed CIGAR and aligned-segment definitions
pub mod alignments;
/// Contains the per-site classification counters and scoring diagnostics
pub mod bias_metrics;
/// Contains the per-contig haplotype context tables produced by the builder
pub mod haplotype_context;
/// Contains the reference sequence accessor boundary
pub mod reference_genome;
/// Contains variant definition functionality and checks
pub mod variants;
