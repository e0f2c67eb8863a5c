
use strum_macros::{Display, EnumString};

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum AlignmentError {
    #[error("unsupported CIGAR operation code {code} in read {read_name:?}")]
    UnsupportedCigarCode { code: u8, read_name: String },
    #[error("read {read_name:?} sequence length {seq_len} does not match CIGAR read-consuming length {cigar_len}")]
    SequenceLengthMismatch { read_name: String, seq_len: usize, cigar_len: usize }
}

/// A single typed CIGAR operation with its run length.
/// Raw numeric codes are converted at segment construction so the coordinate
/// walks never see an unrecognized operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CigarOp {
    /// M, =, or X; consumes both reference and read
    AlignMatch(usize),
    /// I; consumes read only
    Insertion(usize),
    /// D; consumes reference only
    Deletion(usize),
    /// S or H; already absent from the stored sequence
    Clip(usize)
}

impl CigarOp {
    /// Converts a raw SAM numeric operation code and run length into a typed operation.
    /// # Arguments
    /// * `code` - the SAM operation code (M=0, I=1, D=2, S=4, H=5, ==7, X=8)
    /// * `len` - the run length
    /// * `read_name` - the owning read, used in the error
    /// # Errors
    /// * if the code is not one of the supported operations (N and P included)
    pub fn from_raw(code: u8, len: usize, read_name: &str) -> Result<CigarOp, AlignmentError> {
        match code {
            0 | 7 | 8 => Ok(CigarOp::AlignMatch(len)),
            1 => Ok(CigarOp::Insertion(len)),
            2 => Ok(CigarOp::Deletion(len)),
            4 | 5 => Ok(CigarOp::Clip(len)),
            _ => Err(AlignmentError::UnsupportedCigarCode { code, read_name: read_name.to_string() })
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CigarOp::AlignMatch(len) |
            CigarOp::Insertion(len) |
            CigarOp::Deletion(len) |
            CigarOp::Clip(len) => *len
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the operation advances the reference cursor
    pub fn consumes_reference(&self) -> bool {
        matches!(self, CigarOp::AlignMatch(_) | CigarOp::Deletion(_))
    }

    /// True if the operation consumes bases of the clip-trimmed read sequence
    pub fn consumes_read(&self) -> bool {
        matches!(self, CigarOp::AlignMatch(_) | CigarOp::Insertion(_))
    }
}

/// The ground-truth haplotype-of-origin label carried by simulated/benchmark reads.
/// The string forms are the tag values the read simulator writes.
#[derive(Clone, Copy, Debug, Display, EnumString, Eq, Hash, PartialEq)]
pub enum ReadOrigin {
    /// Read simulated from the first haplotype
    #[strum(serialize = "hapA")]
    HapA = 0,
    /// Read simulated from the second haplotype
    #[strum(serialize = "hapB")]
    HapB
}

/// One aligned read segment with everything scoring needs: coordinates, the
/// typed CIGAR, mapping quality, the origin tag, and the clip-trimmed sequence.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AlignedSegment {
    /// The read name, used for error reporting and diagnostics
    read_name: String,
    /// 0-based alignment start on the contig
    start: u64,
    /// 0-based exclusive alignment end, derived from the reference-consuming CIGAR length
    end: u64,
    /// The typed CIGAR operations
    cigar: Vec<CigarOp>,
    /// The mapping quality reported by the aligner
    mapping_quality: u8,
    /// Raw haplotype-of-origin tag value; parsed during aggregation
    origin_tag: String,
    /// The aligned sequence with soft-clipped bases already removed
    sequence: Vec<u8>
}

impl AlignedSegment {
    /// Creates a segment from raw `(code, len)` CIGAR pairs as decoded by the alignment collaborator.
    /// The alignment end is derived from the reference-consuming operations.
    /// # Arguments
    /// * `read_name` - the read name
    /// * `start` - 0-based alignment start on the contig
    /// * `raw_cigar` - raw SAM operation code and run length pairs
    /// * `mapping_quality` - aligner-reported MAPQ
    /// * `origin_tag` - raw haplotype-of-origin tag value
    /// * `sequence` - the clip-trimmed aligned sequence
    /// # Errors
    /// * if any CIGAR code is unsupported
    /// * if the sequence length disagrees with the read-consuming CIGAR length
    pub fn new(
        read_name: String, start: u64, raw_cigar: &[(u8, usize)],
        mapping_quality: u8, origin_tag: String, sequence: Vec<u8>
    ) -> Result<AlignedSegment, AlignmentError> {
        let cigar: Vec<CigarOp> = raw_cigar.iter()
            .map(|&(code, len)| CigarOp::from_raw(code, len, &read_name))
            .collect::<Result<_, AlignmentError>>()?;

        let cigar_read_len: usize = cigar.iter()
            .filter(|op| op.consumes_read())
            .map(|op| op.len())
            .sum();
        if cigar_read_len != sequence.len() {
            return Err(AlignmentError::SequenceLengthMismatch {
                read_name, seq_len: sequence.len(), cigar_len: cigar_read_len
            });
        }

        let ref_len: usize = cigar.iter()
            .filter(|op| op.consumes_reference())
            .map(|op| op.len())
            .sum();

        Ok(AlignedSegment {
            read_name,
            start,
            end: start + ref_len as u64,
            cigar,
            mapping_quality,
            origin_tag,
            sequence
        })
    }

    /// Parses the origin tag into one of the recognized labels, if possible.
    /// Callers decide how to account for unrecognized tags.
    pub fn origin(&self) -> Option<ReadOrigin> {
        self.origin_tag.parse().ok()
    }

    // getters
    pub fn read_name(&self) -> &str {
        &self.read_name
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn cigar(&self) -> &[CigarOp] {
        &self.cigar
    }

    pub fn mapping_quality(&self) -> u8 {
        self.mapping_quality
    }

    pub fn origin_tag(&self) -> &str {
        &self.origin_tag
    }

    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_cigar_from_raw() {
        assert_eq!(CigarOp::from_raw(0, 10, "r").unwrap(), CigarOp::AlignMatch(10));
        assert_eq!(CigarOp::from_raw(7, 5, "r").unwrap(), CigarOp::AlignMatch(5));
        assert_eq!(CigarOp::from_raw(8, 2, "r").unwrap(), CigarOp::AlignMatch(2));
        assert_eq!(CigarOp::from_raw(1, 3, "r").unwrap(), CigarOp::Insertion(3));
        assert_eq!(CigarOp::from_raw(2, 4, "r").unwrap(), CigarOp::Deletion(4));
        assert_eq!(CigarOp::from_raw(4, 6, "r").unwrap(), CigarOp::Clip(6));
        assert_eq!(CigarOp::from_raw(5, 1, "r").unwrap(), CigarOp::Clip(1));

        // N (3) and P (6) are not handled by the coordinate walks
        assert_eq!(
            CigarOp::from_raw(3, 10, "read_1").unwrap_err(),
            AlignmentError::UnsupportedCigarCode { code: 3, read_name: "read_1".to_string() }
        );
        assert_eq!(
            CigarOp::from_raw(6, 1, "read_2").unwrap_err(),
            AlignmentError::UnsupportedCigarCode { code: 6, read_name: "read_2".to_string() }
        );
    }

    #[test]
    fn test_segment_end_derivation() {
        // 5M 2I 3D 4M consumes 5+3+4 = 12 reference bases and 5+2+4 = 11 read bases
        let segment = AlignedSegment::new(
            "read_1".to_string(), 100,
            &[(0, 5), (1, 2), (2, 3), (0, 4)],
            60, "hapA".to_string(), b"ACGTACGTACG".to_vec()
        ).unwrap();
        assert_eq!(segment.start(), 100);
        assert_eq!(segment.end(), 112);
        assert_eq!(segment.origin(), Some(ReadOrigin::HapA));
    }

    #[test]
    fn test_segment_clips_excluded() {
        // clips consume neither reference nor stored sequence
        let segment = AlignedSegment::new(
            "read_1".to_string(), 10,
            &[(4, 5), (0, 4), (5, 2)],
            20, "hapB".to_string(), b"ACGT".to_vec()
        ).unwrap();
        assert_eq!(segment.end(), 14);
        assert_eq!(segment.origin(), Some(ReadOrigin::HapB));
    }

    #[test]
    fn test_segment_length_mismatch() {
        let result = AlignedSegment::new(
            "read_1".to_string(), 0,
            &[(0, 4)],
            60, "hapA".to_string(), b"ACGTA".to_vec()
        );
        assert_eq!(result.unwrap_err(), AlignmentError::SequenceLengthMismatch {
            read_name: "read_1".to_string(), seq_len: 5, cigar_len: 4
        });
    }

    #[test]
    fn test_origin_parsing() {
        assert_eq!(ReadOrigin::from_str("hapA").unwrap(), ReadOrigin::HapA);
        assert_eq!(ReadOrigin::from_str("hapB").unwrap(), ReadOrigin::HapB);
        assert!(ReadOrigin::from_str("hapC").is_err());
        assert_eq!(ReadOrigin::HapA.to_string(), "hapA");
    }
}
