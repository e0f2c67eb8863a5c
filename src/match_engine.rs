
use crate::data_types::alignments::AlignedSegment;
use crate::data_types::bias_metrics::HapMatch;
use crate::data_types::haplotype_context::{ContigContext, GapRecord};
use crate::util::cigar_mapping::{CoordinateError, gap_at_position, locate_read_offset};

#[derive(thiserror::Error, Debug)]
pub enum ScoringError {
    #[error("no haplotype context exists for the variant at position {position}")]
    MissingContext { position: u64 },
    #[error(transparent)]
    Coordinate(#[from] CoordinateError)
}

/// The comparison tier whose flags became the final classification
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchTier {
    /// Anchored comparison against the cohort-level haplotype windows
    Cohort,
    /// Anchored comparison against the per-variant haplotype windows
    Windowed,
    /// Unanchored containment fallback against the per-variant windows
    Substring // make sure Substring is always the last one in the list
}

/// Result of running the cascade for one (read, variant) pair
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MatchDecision {
    /// The final classification
    pub classification: HapMatch,
    /// The tier that settled it
    pub tier: MatchTier
}

/// Anchored window comparison of one haplotype sequence against the read.
///
/// The haplotype window is laid over the read at
/// `[r_start - padding, r_start - padding + len)` where `r_start` is the
/// CIGAR-located read offset of `target`. A window hanging over either read
/// boundary is trimmed to the overlap; a window with no remaining overlap
/// never matches.
/// # Arguments
/// * `segment` - the aligned read
/// * `target` - the reference position the window is anchored to
/// * `hap_seq` - the haplotype window sequence
/// * `padding` - the context radius the window was built with
fn windowed_match(segment: &AlignedSegment, target: u64, hap_seq: &[u8], padding: usize) -> Result<bool, ScoringError> {
    if hap_seq.is_empty() {
        return Ok(false);
    }
    // a segment starting past the anchor cannot be laid over it
    if segment.start() > target {
        return Ok(false);
    }

    let r_start = locate_read_offset(segment.start(), target, segment.cigar())?;
    let read = segment.sequence();

    let mut hap = hap_seq;
    let l_bound = if r_start < padding {
        let trim = padding - r_start;
        if trim >= hap.len() {
            return Ok(false);
        }
        hap = &hap[trim..];
        0
    } else {
        r_start - padding
    };

    let r_bound = l_bound + hap.len();
    let r_bound = if r_bound > read.len() {
        let overhang = r_bound - read.len();
        if overhang >= hap.len() {
            return Ok(false);
        }
        hap = &hap[..hap.len() - overhang];
        read.len()
    } else {
        r_bound
    };

    Ok(&read[l_bound..r_bound] == hap)
}

/// Unanchored fallback comparison: the haplotype window matches if it appears
/// as a substring of the read, or if trimming up to `padding - 1` bases off
/// either window end aligns it with the corresponding read boundary.
/// # Arguments
/// * `read` - the clip-trimmed read sequence
/// * `hap_seq` - the haplotype window sequence
/// * `padding` - the context radius the window was built with
fn substring_match(read: &[u8], hap_seq: &[u8], padding: usize) -> bool {
    if hap_seq.is_empty() {
        return false;
    }
    if hap_seq.len() <= read.len() && read.windows(hap_seq.len()).any(|w| w == hap_seq) {
        return true;
    }

    for trim in 1..padding {
        if trim >= hap_seq.len() {
            break;
        }
        let trimmed_len = hap_seq.len() - trim;
        if read.len() < trimmed_len {
            continue;
        }
        // the window hangs over the read's left edge
        if hap_seq[trim..] == read[..trimmed_len] {
            return true;
        }
        // the window hangs over the read's right edge
        if hap_seq[..trimmed_len] == read[read.len() - trimmed_len..] {
            return true;
        }
    }
    false
}

/// Resolves a both-haplotype match using the read's observed indel magnitude
/// at the variant position: if it equals exactly one haplotype's recorded gap,
/// the other haplotype's flag is cleared. Flags are only ever cleared here,
/// never set.
fn apply_gap_disambiguation(
    flags: (bool, bool), segment: &AlignedSegment, var_start: u64, gap: GapRecord
) -> Result<(bool, bool), ScoringError> {
    if !(flags.0 && flags.1) {
        return Ok(flags);
    }

    let read_gap = gap_at_position(segment.start(), var_start, segment.cigar())?;
    let mut flags = flags;
    if read_gap == gap.hap0 && read_gap != gap.hap1 {
        flags.1 = false;
    } else if read_gap != gap.hap0 && read_gap == gap.hap1 {
        flags.0 = false;
    }
    Ok(flags)
}

/// Runs the escalating comparison cascade for one (read, variant) pair:
/// cohort windows (when the variant belongs to a recorded cohort), then the
/// per-variant windows, then the unanchored substring fallback. Each anchored
/// tier is followed by gap disambiguation, and the cascade stops at the first
/// tier whose two flags disagree.
/// # Arguments
/// * `segment` - the aligned read
/// * `var_start` - the variant's start position
/// * `context` - the contig's haplotype context
/// # Errors
/// * if the variant has no haplotype context entry
/// * if a coordinate walk is queried out of range
pub fn classify_read_at_variant(
    segment: &AlignedSegment, var_start: u64, context: &ContigContext
) -> Result<MatchDecision, ScoringError> {
    let pair = context.haplotype_pair(var_start)
        .ok_or(ScoringError::MissingContext { position: var_start })?;
    let padding = context.padding();
    let gap = context.gap(var_start);

    let mut flags = (false, false);
    let mut tier = MatchTier::Cohort;
    if let Some(cohort) = context.cohort(var_start) {
        flags.0 = windowed_match(segment, cohort.anchor(), cohort.seq_hap0(), padding)?;
        flags.1 = windowed_match(segment, cohort.anchor(), cohort.seq_hap1(), padding)?;
        if let Some(gap) = gap {
            flags = apply_gap_disambiguation(flags, segment, var_start, gap)?;
        }
    }

    if flags.0 == flags.1 {
        tier = MatchTier::Windowed;
        flags.0 = windowed_match(segment, var_start, pair.seq_hap0(), padding)?;
        flags.1 = windowed_match(segment, var_start, pair.seq_hap1(), padding)?;
        if let Some(gap) = gap {
            flags = apply_gap_disambiguation(flags, segment, var_start, gap)?;
        }
    }

    if flags.0 == flags.1 {
        tier = MatchTier::Substring;
        flags.0 = substring_match(segment.sequence(), pair.seq_hap0(), padding);
        flags.1 = substring_match(segment.sequence(), pair.seq_hap1(), padding);
    }

    let classification = match flags {
        (true, true) => HapMatch::Both,
        (true, false) => HapMatch::Hap0,
        (false, true) => HapMatch::Hap1,
        (false, false) => HapMatch::Neither
    };
    Ok(MatchDecision {
        classification,
        tier
    })
}
