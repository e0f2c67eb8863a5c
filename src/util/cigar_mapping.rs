
use crate::data_types::alignments::CigarOp;

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum CoordinateError {
    #[error("target position {target} precedes alignment start {start}")]
    TargetBeforeStart { start: u64, target: u64 }
}

/// Returns the offset into the clip-trimmed read sequence where the target
/// reference position lands, by walking the alignment's CIGAR operations.
///
/// Match runs advance both cursors; a target inside the run maps to the
/// partially consumed offset. An insertion reports the offset *before* its
/// inserted bases once the reference cursor has reached the target.
/// A deletion covering the target reports the read offset at the deletion.
/// Walking off the end of the CIGAR returns the final read offset.
/// # Arguments
/// * `start` - 0-based alignment start on the reference
/// * `target` - 0-based reference position to locate, must be >= `start`
/// * `cigar` - the alignment's CIGAR operations
/// # Errors
/// * if `target` precedes `start`
pub fn locate_read_offset(start: u64, target: u64, cigar: &[CigarOp]) -> Result<usize, CoordinateError> {
    if target < start {
        return Err(CoordinateError::TargetBeforeStart { start, target });
    }

    let mut ref_cursor = start;
    let mut read_cursor: usize = 0;
    for op in cigar.iter() {
        match *op {
            CigarOp::AlignMatch(len) => {
                let run_end = ref_cursor + len as u64;
                if run_end > target {
                    return Ok(read_cursor + (target - ref_cursor) as usize);
                }
                ref_cursor = run_end;
                read_cursor += len;
            },
            CigarOp::Insertion(len) => {
                if ref_cursor >= target {
                    return Ok(read_cursor);
                }
                read_cursor += len;
            },
            CigarOp::Deletion(len) => {
                ref_cursor += len as u64;
                if ref_cursor > target {
                    return Ok(read_cursor);
                }
            },
            CigarOp::Clip(_) => {}
        }
    }

    Ok(read_cursor)
}

/// Returns the signed indel magnitude the read carries at the target
/// reference position: `-len` when the walk lands in an insertion, `+len`
/// when it lands in a deletion, and 0 when the target sits inside a match
/// run (or the walk ends first). The value is a disambiguation signal only,
/// never a coordinate.
///
/// The reference cursor is primed one base early so an indel immediately
/// following the target base is attributed to it, which is where a
/// left-aligned variant anchors.
/// # Arguments
/// * `start` - 0-based alignment start on the reference
/// * `target` - 0-based reference position to probe, must be >= `start`
/// * `cigar` - the alignment's CIGAR operations
/// # Errors
/// * if `target` precedes `start`
pub fn gap_at_position(start: u64, target: u64, cigar: &[CigarOp]) -> Result<i64, CoordinateError> {
    if target < start {
        return Err(CoordinateError::TargetBeforeStart { start, target });
    }

    let target = target as i64;
    let mut ref_cursor = start as i64 - 1;
    for op in cigar.iter() {
        match *op {
            CigarOp::AlignMatch(len) => {
                ref_cursor += len as i64;
                if ref_cursor > target {
                    return Ok(0);
                }
            },
            CigarOp::Insertion(len) => {
                ref_cursor += 1;
                if ref_cursor > target {
                    return Ok(-(len as i64));
                }
            },
            CigarOp::Deletion(len) => {
                ref_cursor += len as i64;
                if ref_cursor > target {
                    return Ok(len as i64);
                }
            },
            CigarOp::Clip(_) => {}
        }
    }

    Ok(0)
}
