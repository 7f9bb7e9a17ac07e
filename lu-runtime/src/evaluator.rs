// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Predicate evaluator: a pure function of image bytes, the triggering
//! event's handler address, and the live values at constraint symbol
//! addresses. Runs from interrupt context — no allocation, no blocking.

use lu_common::format::PredicateHeader;
use lu_common::image::{ImageView, PredicateView};

/// Thumb-mode function pointers carry a permanent low bit; event handler
/// addresses staged in the image and the address observed at runtime must
/// be compared with that bit masked off.
const THUMB_BIT: u32 = 1;

fn mask_thumb(addr: u32) -> u32 {
    addr & !THUMB_BIT
}

/// Reads the live value at a constraint's symbol address. Implemented by
/// the host over the running application's memory image.
pub trait SymbolReader {
    /// Read `bytes` (1, 2, or 4) at `addr`, zero-extended into a `u32`.
    fn read_width(&self, addr: u32, bytes: u8) -> u32;
}

/// Answers whether a given operation (a timer, identified by its pointer
/// in the old image) is currently inactive.
pub trait TimerQuery {
    fn is_inactive(&self, op_ptr: u32) -> bool;
}

/// Monotonic cycle counter used to measure evaluation cost.
pub trait CycleCounter {
    fn now(&self) -> u32;
}

/// A no-op counter for hosts without a DWT cycle counter (or for tests).
pub struct NullCycleCounter;

impl CycleCounter for NullCycleCounter {
    fn now(&self) -> u32 {
        0
    }
}

/// A predicate that matched the triggering event, evaluated and ready to commit.
#[derive(Clone, Copy, Debug)]
pub struct MatchedPredicate {
    pub header: PredicateHeader,
    pub predicate_index: usize,
    pub cycles: u32,
}

/// Walks `view`'s predicates looking for the first whose `event_handler_addr`
/// matches `event_addr` (Thumb-bit masked) and whose inactive-op and
/// constraint checks both pass. Returns `None` if `predicate_only` is set
/// on the image, regardless of match outcome.
pub fn evaluate(
    view: &ImageView<'_>,
    event_addr: u32,
    symbols: &impl SymbolReader,
    timers: &impl TimerQuery,
    cycles: &impl CycleCounter,
) -> Option<MatchedPredicate> {
    if view.header().flags.predicate_only() {
        return None;
    }

    let start = cycles.now();
    let masked_event = mask_thumb(event_addr);

    for (index, predicate) in view.predicates().enumerate() {
        if mask_thumb(predicate.header().event_handler_addr) != masked_event {
            continue;
        }
        if !inactive_ops_satisfied(&predicate, timers) {
            continue;
        }
        if !constraints_satisfied(&predicate, symbols) {
            continue;
        }
        let end = cycles.now();
        return Some(MatchedPredicate {
            header: *predicate.header(),
            predicate_index: index,
            cycles: end.wrapping_sub(start),
        });
    }
    None
}

fn inactive_ops_satisfied(predicate: &PredicateView<'_>, timers: &impl TimerQuery) -> bool {
    predicate
        .inactive_ops()
        .all(|op| timers.is_inactive(op.op_ptr))
}

fn constraints_satisfied(predicate: &PredicateView<'_>, symbols: &impl SymbolReader) -> bool {
    predicate.constraints().all(|constraint| {
        let header = constraint.header();
        let value = symbols.read_width(header.symbol_addr, header.bytes as u8);
        constraint.ranges().any(|range| range.contains(value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lu_common::format::{ConstraintRange, ImageFlags, UpdateHeader, CURRENT_VERSION, HEADER_LEN};

    struct FakeSymbols {
        value: u32,
    }

    impl SymbolReader for FakeSymbols {
        fn read_width(&self, _addr: u32, _bytes: u8) -> u32 {
            self.value
        }
    }

    struct AllInactive;
    impl TimerQuery for AllInactive {
        fn is_inactive(&self, _op_ptr: u32) -> bool {
            true
        }
    }

    struct AllActive;
    impl TimerQuery for AllActive {
        fn is_inactive(&self, _op_ptr: u32) -> bool {
            false
        }
    }

    fn build_image_with_predicate(
        event_handler_addr: u32,
        n_inactive: u32,
        range: ConstraintRange,
    ) -> std::vec::Vec<u8> {
        use lu_common::format::ConstraintHeader;

        let mut predicate_body = std::vec::Vec::new();
        for i in 0..n_inactive {
            predicate_body.extend_from_slice(&(0x1000_9000 + i).to_le_bytes());
        }
        let chdr = ConstraintHeader {
            size: 16 + 8,
            symbol_addr: 0x2000_0100,
            bytes: 4,
            n_ranges: 1,
        };
        let mut chdr_buf = [0u8; 16];
        chdr.write_into(&mut chdr_buf);
        predicate_body.extend_from_slice(&chdr_buf);
        let mut rbuf = [0u8; 8];
        range.write_into(&mut rbuf);
        predicate_body.extend_from_slice(&rbuf);

        let phdr = PredicateHeader {
            size: (32 + predicate_body.len()) as u32,
            event_handler_addr,
            updated_event_handler_addr: event_handler_addr + 0x1000,
            n_inactive_ops: n_inactive,
            n_reset_ops: 0,
            n_constraints: 1,
            n_state_init: 0,
            hw_transfer_size: 0,
        };
        let mut phdr_buf = [0u8; 32];
        phdr.write_into(&mut phdr_buf);

        let mut predicates = std::vec::Vec::new();
        predicates.extend_from_slice(&phdr_buf);
        predicates.extend_from_slice(&predicate_body);

        let predicates_size = 4 + predicates.len();
        let header = UpdateHeader {
            version: CURRENT_VERSION,
            main_ptr_addr: 0x2000_0000,
            main_ptr: 0x1000_1000,
            update_flag_addr: 0x2000_0004,
            text_start: 0,
            text_size: 0,
            rodata_start: 0,
            rodata_size: 0,
            bss_start: 0,
            bss_size: 0,
            bss_start_addr: 0,
            bss_size_addr: 0,
            payload_size: (predicates_size + 4 + 4 + 4) as u32,
            flags: ImageFlags::new(false, false),
        };
        let mut out = std::vec![0u8; HEADER_LEN];
        header.write_into(&mut out);
        out.extend_from_slice(&(predicates_size as u32).to_le_bytes());
        out.extend_from_slice(&predicates);
        for _ in 0..3 {
            out.extend_from_slice(&4u32.to_le_bytes());
        }
        out
    }

    #[test]
    fn matches_when_event_inactive_and_constraint_satisfied() {
        let buf = build_image_with_predicate(
            0x1000_5001,
            1,
            ConstraintRange { lower: 1, upper: 10 },
        );
        let view = ImageView::parse(&buf).unwrap();
        let symbols = FakeSymbols { value: 5 };
        let matched = evaluate(&view, 0x1000_5000, &symbols, &AllInactive, &NullCycleCounter);
        assert!(matched.is_some());
    }

    #[test]
    fn no_match_when_timer_still_active() {
        let buf = build_image_with_predicate(
            0x1000_5001,
            1,
            ConstraintRange { lower: 1, upper: 10 },
        );
        let view = ImageView::parse(&buf).unwrap();
        let symbols = FakeSymbols { value: 5 };
        let matched = evaluate(&view, 0x1000_5000, &symbols, &AllActive, &NullCycleCounter);
        assert!(matched.is_none());
    }

    #[test]
    fn no_match_when_constraint_out_of_range() {
        let buf = build_image_with_predicate(
            0x1000_5001,
            0,
            ConstraintRange { lower: 1, upper: 10 },
        );
        let view = ImageView::parse(&buf).unwrap();
        let symbols = FakeSymbols { value: 99 };
        let matched = evaluate(&view, 0x1000_5000, &symbols, &AllInactive, &NullCycleCounter);
        assert!(matched.is_none());
    }

    #[test]
    fn predicate_only_images_never_match() {
        let mut buf = build_image_with_predicate(
            0x1000_5001,
            0,
            ConstraintRange { lower: 1, upper: 10 },
        );
        buf[52..56].copy_from_slice(&ImageFlags::new(true, false).raw().to_le_bytes());
        let view = ImageView::parse(&buf).unwrap();
        let symbols = FakeSymbols { value: 5 };
        let matched = evaluate(&view, 0x1000_5000, &symbols, &AllInactive, &NullCycleCounter);
        assert!(matched.is_none());
    }
}
