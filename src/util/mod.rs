
/// Pure functions translating reference coordinates into read offsets via the CIGAR
pub mod cigar_mapping;
/// Helper functions for reading/writing JSON via serde
pub mod json_io;
