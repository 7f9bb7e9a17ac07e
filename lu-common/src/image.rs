// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Validated, zero-allocation view over a staged update image.
//!
//! [`ImageView::parse`] performs every structural check once, outside
//! interrupt context, so that later predicate evaluation never has to
//! guard against a truncated or miscounted section.

use crate::error::UpdateError;
use crate::format::{
    AddrOffsetVal, ConstraintHeader, ConstraintRange, HwOp, MemInit, Operation, PredicateHeader,
    Transfer, UpdateHeader, ADDR_OFFSET_VAL_LEN, CONSTRAINT_HEADER_LEN, CONSTRAINT_RANGE_LEN,
    CURRENT_VERSION, HEADER_LEN, OPERATION_LEN, PREDICATE_HEADER_LEN, TRANSFER_LEN,
};

/// Reads and validates the 4-byte `size` prefix shared by every section,
/// returning the byte range of the section's body (excluding the prefix
/// itself) and the section's declared total length.
fn read_section_len(buf: &[u8], offset: usize) -> Result<usize, UpdateError> {
    let bytes = buf
        .get(offset..offset + 4)
        .ok_or(UpdateError::ImageCorrupt)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
}

/// A validated, borrowed update image: header plus the section layout
/// needed to iterate predicates, transfers, hardware inits, and memory
/// inits without re-checking bounds at each step.
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    header: UpdateHeader,
    buf: &'a [u8],
    text_off: usize,
    rodata_off: usize,
    predicates_off: usize,
    predicates_size: usize,
    transfers_off: usize,
    transfers_size: usize,
    hw_inits_off: usize,
    hw_inits_size: usize,
    mem_inits_off: usize,
    mem_inits_size: usize,
}

impl<'a> ImageView<'a> {
    /// Parse and fully validate a staged image. `buf` must be exactly
    /// `HEADER_LEN + header.payload_size` bytes — any other length is
    /// rejected as [`UpdateError::OverflowInBuffer`].
    pub fn parse(buf: &'a [u8]) -> Result<Self, UpdateError> {
        let header = UpdateHeader::parse(buf)?;
        if header.version != CURRENT_VERSION {
            return Err(UpdateError::VersionMismatch {
                expected: CURRENT_VERSION,
                found: header.version,
            });
        }
        if buf.len() != HEADER_LEN + header.payload_size as usize {
            return Err(UpdateError::OverflowInBuffer);
        }

        let text_off = HEADER_LEN;
        let text_end = text_off
            .checked_add(header.text_size as usize)
            .ok_or(UpdateError::ImageCorrupt)?;
        if text_end > buf.len() {
            return Err(UpdateError::ImageCorrupt);
        }

        let rodata_off = text_end;
        let rodata_end = rodata_off
            .checked_add(header.rodata_size as usize)
            .ok_or(UpdateError::ImageCorrupt)?;
        if rodata_end > buf.len() {
            return Err(UpdateError::ImageCorrupt);
        }

        let predicates_off = rodata_end;
        let predicates_size = read_section_len(buf, predicates_off)?;
        let predicates_end = predicates_off
            .checked_add(predicates_size)
            .ok_or(UpdateError::ImageCorrupt)?;
        if predicates_size < 4 || predicates_end > buf.len() {
            return Err(UpdateError::ImageCorrupt);
        }

        let transfers_off = predicates_end;
        let transfers_size = read_section_len(buf, transfers_off)?;
        let transfers_end = transfers_off
            .checked_add(transfers_size)
            .ok_or(UpdateError::ImageCorrupt)?;
        if transfers_size < 4 || transfers_end > buf.len() {
            return Err(UpdateError::ImageCorrupt);
        }

        let hw_inits_off = transfers_end;
        let hw_inits_size = read_section_len(buf, hw_inits_off)?;
        let hw_inits_end = hw_inits_off
            .checked_add(hw_inits_size)
            .ok_or(UpdateError::ImageCorrupt)?;
        if hw_inits_size < 4 || hw_inits_end > buf.len() {
            return Err(UpdateError::ImageCorrupt);
        }

        let mem_inits_off = hw_inits_end;
        let mem_inits_size = read_section_len(buf, mem_inits_off)?;
        let mem_inits_end = mem_inits_off
            .checked_add(mem_inits_size)
            .ok_or(UpdateError::ImageCorrupt)?;
        if mem_inits_size < 4 || mem_inits_end > buf.len() {
            return Err(UpdateError::ImageCorrupt);
        }

        let payload_total = header.text_size as usize
            + header.rodata_size as usize
            + predicates_size
            + transfers_size
            + hw_inits_size
            + mem_inits_size;
        if payload_total != header.payload_size as usize {
            return Err(UpdateError::ImageCorrupt);
        }
        if mem_inits_end != buf.len() {
            return Err(UpdateError::ImageCorrupt);
        }

        let view = Self {
            header,
            buf,
            text_off,
            rodata_off,
            predicates_off,
            predicates_size,
            transfers_off,
            transfers_size,
            hw_inits_off,
            hw_inits_size,
            mem_inits_off,
            mem_inits_size,
        };

        view.validate_predicates()?;
        view.validate_hw_inits()?;
        view.validate_fixed_section(view.transfers_size, TRANSFER_LEN)?;
        view.validate_fixed_section(view.mem_inits_size, ADDR_OFFSET_VAL_LEN)?;
        Ok(view)
    }

    fn validate_predicates(&self) -> Result<(), UpdateError> {
        let body = &self.buf[self.predicates_off + 4..self.predicates_off + self.predicates_size];
        let mut cursor = 0usize;
        while cursor < body.len() {
            let rec = body.get(cursor..).ok_or(UpdateError::ImageCorrupt)?;
            let phdr = PredicateHeader::parse(rec)?;
            let size = phdr.size as usize;
            if size < PREDICATE_HEADER_LEN || cursor + size > body.len() {
                return Err(UpdateError::ImageCorrupt);
            }
            let sub = &rec[PREDICATE_HEADER_LEN..size];
            let mut off = 0usize;

            let ops_len = (phdr.n_inactive_ops as usize + phdr.n_reset_ops as usize)
                .checked_mul(OPERATION_LEN)
                .ok_or(UpdateError::ImageCorrupt)?;
            off = off.checked_add(ops_len).ok_or(UpdateError::ImageCorrupt)?;
            if off > sub.len() {
                return Err(UpdateError::ImageCorrupt);
            }

            for _ in 0..phdr.n_constraints {
                let chdr = ConstraintHeader::parse(sub.get(off..).ok_or(UpdateError::ImageCorrupt)?)?;
                let clen = chdr.size as usize;
                let expected = CONSTRAINT_HEADER_LEN + chdr.n_ranges as usize * CONSTRAINT_RANGE_LEN;
                if clen != expected || off + clen > sub.len() {
                    return Err(UpdateError::ImageCorrupt);
                }
                off += clen;
            }

            let state_len = (phdr.n_state_init as usize)
                .checked_mul(12)
                .ok_or(UpdateError::ImageCorrupt)?;
            off = off.checked_add(state_len).ok_or(UpdateError::ImageCorrupt)?;
            if off > sub.len() {
                return Err(UpdateError::ImageCorrupt);
            }

            let hw_end = off
                .checked_add(phdr.hw_transfer_size as usize)
                .ok_or(UpdateError::ImageCorrupt)?;
            if hw_end > sub.len() {
                return Err(UpdateError::ImageCorrupt);
            }
            validate_hw_op_stream(&sub[off..hw_end], phdr.hw_transfer_size as usize)?;
            off = hw_end;

            if off != sub.len() {
                return Err(UpdateError::ImageCorrupt);
            }

            cursor += size;
        }
        if cursor != body.len() {
            return Err(UpdateError::ImageCorrupt);
        }
        Ok(())
    }

    fn validate_hw_inits(&self) -> Result<(), UpdateError> {
        let body = &self.buf[self.hw_inits_off + 4..self.hw_inits_off + self.hw_inits_size];
        validate_hw_op_stream(body, body.len())
    }

    /// Every fixed-record section's body must be an exact multiple of its
    /// record length; a partial trailing record means the declared `size`
    /// lied and the image is corrupt, not merely short.
    fn validate_fixed_section(&self, size: usize, record_len: usize) -> Result<(), UpdateError> {
        if (size - 4) % record_len != 0 {
            return Err(UpdateError::ImageCorrupt);
        }
        Ok(())
    }

    pub fn header(&self) -> &UpdateHeader {
        &self.header
    }

    pub fn text(&self) -> &'a [u8] {
        &self.buf[self.text_off..self.text_off + self.header.text_size as usize]
    }

    pub fn rodata(&self) -> &'a [u8] {
        &self.buf[self.rodata_off..self.rodata_off + self.header.rodata_size as usize]
    }

    pub fn predicates(&self) -> PredicatesIter<'a> {
        PredicatesIter {
            body: &self.buf[self.predicates_off + 4..self.predicates_off + self.predicates_size],
        }
    }

    pub fn transfers(&self) -> FixedRecordIter<'a, Transfer> {
        FixedRecordIter::new(
            &self.buf[self.transfers_off + 4..self.transfers_off + self.transfers_size],
            TRANSFER_LEN,
            Transfer::parse,
        )
    }

    pub fn hw_inits(&self) -> HwOpIter<'a> {
        HwOpIter {
            body: &self.buf[self.hw_inits_off + 4..self.hw_inits_off + self.hw_inits_size],
        }
    }

    pub fn mem_inits(&self) -> FixedRecordIter<'a, MemInit> {
        FixedRecordIter::new(
            &self.buf[self.mem_inits_off + 4..self.mem_inits_off + self.mem_inits_size],
            ADDR_OFFSET_VAL_LEN,
            MemInit::parse,
        )
    }
}

fn validate_hw_op_stream(buf: &[u8], declared_len: usize) -> Result<(), UpdateError> {
    if buf.len() != declared_len {
        return Err(UpdateError::ImageCorrupt);
    }
    let mut cursor = 0;
    while cursor < buf.len() {
        let (_, len) = HwOp::parse(&buf[cursor..])?;
        cursor += len;
    }
    if cursor != buf.len() {
        return Err(UpdateError::ImageCorrupt);
    }
    Ok(())
}

/// Pre-validated single predicate record, yielded by [`PredicatesIter`].
#[derive(Clone, Copy, Debug)]
pub struct PredicateView<'a> {
    header: PredicateHeader,
    inactive_ops: &'a [u8],
    reset_ops: &'a [u8],
    constraints: &'a [u8],
    state_inits: &'a [u8],
    hw_transfers: &'a [u8],
}

impl<'a> PredicateView<'a> {
    pub fn header(&self) -> &PredicateHeader {
        &self.header
    }

    pub fn inactive_ops(&self) -> FixedRecordIter<'a, Operation> {
        FixedRecordIter::new(self.inactive_ops, OPERATION_LEN, Operation::parse)
    }

    pub fn reset_ops(&self) -> FixedRecordIter<'a, Operation> {
        FixedRecordIter::new(self.reset_ops, OPERATION_LEN, Operation::parse)
    }

    pub fn constraints(&self) -> ConstraintsIter<'a> {
        ConstraintsIter {
            body: self.constraints,
        }
    }

    pub fn state_inits(&self) -> FixedRecordIter<'a, AddrOffsetVal> {
        FixedRecordIter::new(self.state_inits, ADDR_OFFSET_VAL_LEN, AddrOffsetVal::parse)
    }

    pub fn hw_transfers(&self) -> HwOpIter<'a> {
        HwOpIter {
            body: self.hw_transfers,
        }
    }
}

/// Iterator over predicate records in the predicates section.
#[derive(Clone, Copy, Debug)]
pub struct PredicatesIter<'a> {
    body: &'a [u8],
}

impl<'a> Iterator for PredicatesIter<'a> {
    type Item = PredicateView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.body.is_empty() {
            return None;
        }
        // Bounds were already confirmed by `validate_predicates`.
        let header = PredicateHeader::parse(self.body).ok()?;
        let size = header.size as usize;
        let (rec, rest) = self.body.split_at(size);
        self.body = rest;

        let sub = &rec[PREDICATE_HEADER_LEN..];
        let mut off = 0usize;
        let inactive_len = header.n_inactive_ops as usize * OPERATION_LEN;
        let reset_len = header.n_reset_ops as usize * OPERATION_LEN;
        let inactive_ops = &sub[off..off + inactive_len];
        off += inactive_len;
        let reset_ops = &sub[off..off + reset_len];
        off += reset_len;

        let constraints_start = off;
        for _ in 0..header.n_constraints {
            let chdr = ConstraintHeader::parse(&sub[off..]).ok()?;
            off += chdr.size as usize;
        }
        let constraints = &sub[constraints_start..off];

        let state_len = header.n_state_init as usize * 12;
        let state_inits = &sub[off..off + state_len];
        off += state_len;

        let hw_transfers = &sub[off..off + header.hw_transfer_size as usize];

        Some(PredicateView {
            header,
            inactive_ops,
            reset_ops,
            constraints,
            state_inits,
            hw_transfers,
        })
    }
}

/// Iterator over constraints within a single predicate.
#[derive(Clone, Copy, Debug)]
pub struct ConstraintsIter<'a> {
    body: &'a [u8],
}

impl<'a> Iterator for ConstraintsIter<'a> {
    type Item = Constraint<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.body.is_empty() {
            return None;
        }
        let header = ConstraintHeader::parse(self.body).ok()?;
        let size = header.size as usize;
        let (rec, rest) = self.body.split_at(size);
        self.body = rest;
        let ranges = &rec[CONSTRAINT_HEADER_LEN..];
        Some(Constraint { header, ranges })
    }
}

/// Iterator over fixed-size records of type `T`.
#[derive(Clone, Copy, Debug)]
pub struct FixedRecordIter<'a, T> {
    body: &'a [u8],
    record_len: usize,
    parse: fn(&[u8]) -> Result<T, UpdateError>,
}

impl<'a, T> FixedRecordIter<'a, T> {
    fn new(body: &'a [u8], record_len: usize, parse: fn(&[u8]) -> Result<T, UpdateError>) -> Self {
        Self {
            body,
            record_len,
            parse,
        }
    }
}

impl<'a, T> Iterator for FixedRecordIter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.body.is_empty() {
            return None;
        }
        let (rec, rest) = self.body.split_at(self.record_len.min(self.body.len()));
        self.body = rest;
        (self.parse)(rec).ok()
    }
}

/// Iterator over hardware-operation records (image-wide or predicate-local).
#[derive(Clone, Copy, Debug)]
pub struct HwOpIter<'a> {
    body: &'a [u8],
}

impl<'a> Iterator for HwOpIter<'a> {
    type Item = HwOp;

    fn next(&mut self) -> Option<Self::Item> {
        if self.body.is_empty() {
            return None;
        }
        let (op, len) = HwOp::parse(self.body).ok()?;
        self.body = &self.body[len..];
        Some(op)
    }
}

/// A single constraint: the symbol to read, its width, and the ranges
/// that bound an acceptable value.
#[derive(Clone, Copy, Debug)]
pub struct Constraint<'a> {
    header: ConstraintHeader,
    ranges: &'a [u8],
}

impl<'a> Constraint<'a> {
    pub fn header(&self) -> &ConstraintHeader {
        &self.header
    }

    pub fn ranges(&self) -> impl Iterator<Item = ConstraintRange> + 'a {
        let body = self.ranges;
        (0..self.header.n_ranges as usize).filter_map(move |i| {
            let off = i * CONSTRAINT_RANGE_LEN;
            ConstraintRange::parse(body.get(off..)?).ok()
        })
    }
}
