
use anyhow::{bail, ensure};
use rustc_hash::FxHashMap as HashMap;

/// Boundary for reference sequence access.
/// The context builder only ever asks for small windows around variants, so
/// implementations are free to keep sequences on disk, memory-map them, or
/// pre-load whole contigs.
pub trait ReferenceAccessor {
    /// Fetches the reference bases for `[start, end)` on a contig, 0-based half-open.
    /// Context windows routinely reach past a contig's tail, so implementations
    /// clamp the range to the contig instead of failing.
    /// # Arguments
    /// * `contig` - the contig name
    /// * `start` - 0-based inclusive start
    /// * `end` - 0-based exclusive end
    /// # Errors
    /// * if the contig is unknown or the range is inverted
    fn fetch(&self, contig: &str, start: u64, end: u64) -> anyhow::Result<Vec<u8>>;
}

/// Fully in-memory reference, the bundled `ReferenceAccessor` implementation.
/// Sequences are upper-cased on insert so window comparisons are case-stable.
#[derive(Clone, Debug, Default)]
pub struct InMemoryReference {
    /// Lookup from a contig name to its full sequence
    contigs: HashMap<String, Vec<u8>>
}

impl InMemoryReference {
    /// Creates an empty reference to populate with `add_contig`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a full contig sequence.
    /// # Arguments
    /// * `name` - the contig name
    /// * `sequence` - the full contig sequence
    /// # Errors
    /// * if the contig name was already added
    pub fn add_contig(&mut self, name: String, sequence: &str) -> anyhow::Result<()> {
        ensure!(!self.contigs.contains_key(&name), "contig {name:?} was already added");
        self.contigs.insert(name, sequence.to_ascii_uppercase().into_bytes());
        Ok(())
    }

    /// Returns the length of a contig, if present.
    pub fn contig_len(&self, name: &str) -> Option<u64> {
        self.contigs.get(name).map(|s| s.len() as u64)
    }
}

impl ReferenceAccessor for InMemoryReference {
    fn fetch(&self, contig: &str, start: u64, end: u64) -> anyhow::Result<Vec<u8>> {
        let sequence = match self.contigs.get(contig) {
            Some(s) => s,
            None => bail!("contig {contig:?} is not in the reference")
        };
        ensure!(start <= end, "invalid range {start}..{end} on contig {contig:?}");
        let clamped_start = (start as usize).min(sequence.len());
        let clamped_end = (end as usize).min(sequence.len());
        Ok(sequence[clamped_start..clamped_end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_window() {
        let mut reference = InMemoryReference::empty();
        reference.add_contig("mock_chr1".to_string(), "acgtACGTacgt").unwrap();

        assert_eq!(reference.contig_len("mock_chr1"), Some(12));
        assert_eq!(reference.fetch("mock_chr1", 0, 4).unwrap(), b"ACGT");
        assert_eq!(reference.fetch("mock_chr1", 2, 7).unwrap(), b"GTACG");
        assert_eq!(reference.fetch("mock_chr1", 12, 12).unwrap(), b"");
    }

    #[test]
    fn test_fetch_clamps_to_contig() {
        let mut reference = InMemoryReference::empty();
        reference.add_contig("mock_chr1".to_string(), "ACGT").unwrap();

        // windows reaching past the tail come back truncated
        assert_eq!(reference.fetch("mock_chr1", 2, 10).unwrap(), b"GT");
        assert_eq!(reference.fetch("mock_chr1", 6, 10).unwrap(), b"");
    }

    #[test]
    fn test_fetch_errors() {
        let mut reference = InMemoryReference::empty();
        reference.add_contig("mock_chr1".to_string(), "ACGT").unwrap();

        assert!(reference.fetch("mock_chr2", 0, 1).is_err());
        assert!(reference.fetch("mock_chr1", 3, 2).is_err());
        assert!(reference.add_contig("mock_chr1".to_string(), "ACGT").is_err());
    }
}
