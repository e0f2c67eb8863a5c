
/// Accumulates per-site bias counters from read classifications
pub mod bias_aggregator;
/// Builds per-variant haplotype sequence contexts from a variant set
pub mod context_builder;
/// Contains various shared data types
pub mod data_types;
/// Classifies a read against the haplotype context of a variant site
pub mod match_engine;
/// Various utility functions that tend to be very generic
pub mod util;
