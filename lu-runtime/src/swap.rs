// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Swap engine: applies a matched predicate's writes and hands back the
//! resolved new-image entry point. Runs once execution is quiescent for
//! the triggering event.

use lu_common::error::UpdateError;
use lu_common::format::HwOp;
use lu_common::image::{ImageView, PredicateView};

/// The hardware subsystem through which the triggering event was bound,
/// and the address that identifies it in the old image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventBinding {
    Timer(u32),
    Gpio(u32),
    Uart(u32),
}

/// Pin (or pin-mask) configuration and interrupt dispatch, abstracted so
/// this crate has no dependency on a specific GPIO driver.
pub trait GpioPort {
    fn configure_pin(&mut self, pin: u32, flags: u32);
    fn configure_interrupt(&mut self, pin: u32, config: u32);
    fn init_callback(&mut self, cb_handle: u32, handler_fn: u32, pin_mask: u32);
    fn manage_callback(&mut self, cb_handle: u32, add: bool);
    fn set_bits_raw(&mut self, mask: u32);
    fn clear_bits_raw(&mut self, mask: u32);
    /// Unregister every callback currently armed on this port. The crate
    /// never walks a driver's private callback list itself.
    fn cancel_all_callbacks(&mut self);
}

/// Timer lifecycle, abstracted so this crate has no dependency on a
/// specific RTOS timer subsystem.
pub trait TimerPort {
    fn init(&mut self, timer_handle: u32, expiry_fn: u32, stop_fn: u32);
    fn is_inactive(&self, op_ptr: u32) -> bool;
    fn abort(&mut self, op_ptr: u32);
}

/// The single seam through which `StateTransfer`/`MemInit`/`Transfer`
/// records touch memory.
///
/// Default methods write directly through the given address, matching
/// the original's flat-memory-space assumption on a microcontroller with
/// no MMU. Hosts that stage updates against a process rather than real
/// memory (tests, `lu-sender`) override all three.
pub trait MemoryWriter {
    fn write_u32(&mut self, addr: u32, val: u32) {
        self.write_bytes(addr, &val.to_le_bytes());
    }

    fn write_bytes(&mut self, addr: u32, data: &[u8]) {
        // SAFETY: caller-supplied image data targets addresses the image
        // generator asserts are valid write destinations in the running
        // firmware's address space; this runtime does not validate them.
        unsafe {
            core::ptr::copy_nonoverlapping(data.as_ptr(), addr as *mut u8, data.len());
        }
    }

    fn read_bytes(&mut self, addr: u32, out: &mut [u8]) {
        // SAFETY: see `write_bytes`.
        unsafe {
            core::ptr::copy_nonoverlapping(addr as *const u8, out.as_mut_ptr(), out.len());
        }
    }
}

/// Applies a matched predicate's effects: cancels stale callbacks and
/// timers, performs local and bulk writes, replays image-wide hardware
/// and memory init, and resolves the triggering event's new binding.
pub struct SwapEngine;

impl SwapEngine {
    /// Commit `predicate`'s effects from `view`, given the event binding
    /// that triggered evaluation. Returns the address execution should
    /// resume at, or `UpdateError::UnresolvedBinding` if no hw-init record
    /// rebinds the triggering timer/GPIO (UART rebinds directly and
    /// always resolves).
    pub fn commit(
        predicate: &PredicateView<'_>,
        view: &ImageView<'_>,
        binding: EventBinding,
        gpio: &mut impl GpioPort,
        timers: &mut impl TimerPort,
        mem: &mut impl MemoryWriter,
    ) -> Result<u32, UpdateError> {
        gpio.cancel_all_callbacks();

        for op in predicate.reset_ops() {
            timers.abort(op.op_ptr);
        }

        for state in predicate.state_inits() {
            mem.write_u32(state.target_addr(), state.val);
        }

        for hw_op in predicate.hw_transfers() {
            apply_hw_op(hw_op, gpio, timers);
        }

        for transfer in view.transfers() {
            let mut scratch = [0u8; 64];
            let mut remaining = transfer.size as usize;
            let mut origin = transfer.origin;
            let mut dest = transfer.dest;
            while remaining > 0 {
                let chunk = remaining.min(scratch.len());
                mem.read_bytes(origin, &mut scratch[..chunk]);
                mem.write_bytes(dest, &scratch[..chunk]);
                origin += chunk as u32;
                dest += chunk as u32;
                remaining -= chunk;
            }
        }

        for hw_op in view.hw_inits() {
            apply_hw_op(hw_op, gpio, timers);
        }

        for mem_init in view.mem_inits() {
            mem.write_u32(mem_init.target_addr(), mem_init.val);
        }

        resolve_binding(view, predicate, binding)
    }
}

fn apply_hw_op(op: HwOp, gpio: &mut impl GpioPort, timers: &mut impl TimerPort) {
    match op {
        HwOp::TimerInit {
            timer_handle,
            expiry_fn,
            stop_fn,
        } => timers.init(timer_handle, expiry_fn, stop_fn),
        HwOp::PinConfigure { pin, flags } => gpio.configure_pin(pin, flags),
        HwOp::PinInterruptConfigure { pin, config } => gpio.configure_interrupt(pin, config),
        HwOp::InitCallback {
            cb_handle,
            handler_fn,
            pin_mask,
        } => gpio.init_callback(cb_handle, handler_fn, pin_mask),
        HwOp::ManageCallback { cb_handle, add } => gpio.manage_callback(cb_handle, add),
        HwOp::PortSetBitsRaw { mask } => gpio.set_bits_raw(mask),
        HwOp::PortClearBitsRaw { mask } => gpio.clear_bits_raw(mask),
    }
}

fn resolve_binding(
    view: &ImageView<'_>,
    predicate: &PredicateView<'_>,
    binding: EventBinding,
) -> Result<u32, UpdateError> {
    let updated_addr = predicate.header().updated_event_handler_addr;
    match binding {
        EventBinding::Uart(_) => Ok(updated_addr),
        EventBinding::Timer(_) => view
            .hw_inits()
            .find_map(|op| match op {
                HwOp::TimerInit {
                    timer_handle,
                    expiry_fn,
                    stop_fn,
                } if expiry_fn == updated_addr || stop_fn == updated_addr => Some(timer_handle),
                _ => None,
            })
            .ok_or(UpdateError::UnresolvedBinding),
        EventBinding::Gpio(_) => view
            .hw_inits()
            .find_map(|op| match op {
                HwOp::InitCallback {
                    cb_handle,
                    handler_fn,
                    ..
                } if handler_fn == updated_addr => Some(cb_handle),
                _ => None,
            })
            .ok_or(UpdateError::UnresolvedBinding),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lu_common::format::{AddrOffsetVal, CURRENT_VERSION, HEADER_LEN};
    use lu_common::format::{ImageFlags, UpdateHeader};
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeGpio {
        cancelled: bool,
        set_masks: std::vec::Vec<u32>,
    }

    impl GpioPort for FakeGpio {
        fn configure_pin(&mut self, _pin: u32, _flags: u32) {}
        fn configure_interrupt(&mut self, _pin: u32, _config: u32) {}
        fn init_callback(&mut self, _cb_handle: u32, _handler_fn: u32, _pin_mask: u32) {}
        fn manage_callback(&mut self, _cb_handle: u32, _add: bool) {}
        fn set_bits_raw(&mut self, mask: u32) {
            self.set_masks.push(mask);
        }
        fn clear_bits_raw(&mut self, _mask: u32) {}
        fn cancel_all_callbacks(&mut self) {
            self.cancelled = true;
        }
    }

    #[derive(Default)]
    struct FakeTimers {
        aborted: std::vec::Vec<u32>,
    }

    impl TimerPort for FakeTimers {
        fn init(&mut self, _timer_handle: u32, _expiry_fn: u32, _stop_fn: u32) {}
        fn is_inactive(&self, _op_ptr: u32) -> bool {
            true
        }
        fn abort(&mut self, op_ptr: u32) {
            self.aborted.push(op_ptr);
        }
    }

    #[derive(Default)]
    struct FakeMemory {
        mem: HashMap<u32, u8>,
    }

    impl MemoryWriter for FakeMemory {
        fn write_u32(&mut self, addr: u32, val: u32) {
            self.write_bytes(addr, &val.to_le_bytes());
        }
        fn write_bytes(&mut self, addr: u32, data: &[u8]) {
            for (i, b) in data.iter().enumerate() {
                self.mem.insert(addr + i as u32, *b);
            }
        }
        fn read_bytes(&mut self, addr: u32, out: &mut [u8]) {
            for (i, b) in out.iter_mut().enumerate() {
                *b = self.mem.get(&(addr + i as u32)).copied().unwrap_or(0);
            }
        }
    }

    fn minimal_image_with_state_init(addr: u32, val: u32) -> std::vec::Vec<u8> {
        let phdr = lu_common::format::PredicateHeader {
            size: 32 + 12,
            event_handler_addr: 0x1000_5001,
            updated_event_handler_addr: 0x1000_9001,
            n_inactive_ops: 0,
            n_reset_ops: 0,
            n_constraints: 0,
            n_state_init: 1,
            hw_transfer_size: 0,
        };
        let mut phdr_buf = [0u8; 32];
        phdr.write_into(&mut phdr_buf);
        let state = AddrOffsetVal {
            addr,
            offset: 0,
            val,
        };
        let mut state_buf = [0u8; 12];
        state.write_into(&mut state_buf);

        let mut predicates = std::vec::Vec::new();
        predicates.extend_from_slice(&phdr_buf);
        predicates.extend_from_slice(&state_buf);
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
    fn commit_applies_state_init_and_resolves_uart_binding() {
        let buf = minimal_image_with_state_init(0x2000_0200, 7);
        let view = lu_common::image::ImageView::parse(&buf).unwrap();
        let predicate = view.predicates().next().unwrap();

        let mut gpio = FakeGpio::default();
        let mut timers = FakeTimers::default();
        let mut mem = FakeMemory::default();

        let resolved = SwapEngine::commit(
            &predicate,
            &view,
            EventBinding::Uart(0),
            &mut gpio,
            &mut timers,
            &mut mem,
        )
        .unwrap();

        assert_eq!(resolved, 0x1000_9001);
        assert!(gpio.cancelled);
        let mut out = [0u8; 4];
        mem.read_bytes(0x2000_0200, &mut out);
        assert_eq!(u32::from_le_bytes(out), 7);
    }

    #[test]
    fn commit_fails_to_resolve_timer_binding_with_no_matching_hw_init() {
        let buf = minimal_image_with_state_init(0x2000_0200, 7);
        let view = lu_common::image::ImageView::parse(&buf).unwrap();
        let predicate = view.predicates().next().unwrap();

        let mut gpio = FakeGpio::default();
        let mut timers = FakeTimers::default();
        let mut mem = FakeMemory::default();

        let result = SwapEngine::commit(
            &predicate,
            &view,
            EventBinding::Timer(0x1000_4000),
            &mut gpio,
            &mut timers,
            &mut mem,
        );

        assert_eq!(result.unwrap_err(), UpdateError::UnresolvedBinding);
    }

    fn minimal_image_with_hw_init(updated_event_handler_addr: u32, hw_init: HwOp) -> std::vec::Vec<u8> {
        let phdr = lu_common::format::PredicateHeader {
            size: 32,
            event_handler_addr: 0x1000_5001,
            updated_event_handler_addr,
            n_inactive_ops: 0,
            n_reset_ops: 0,
            n_constraints: 0,
            n_state_init: 0,
            hw_transfer_size: 0,
        };
        let mut phdr_buf = [0u8; 32];
        phdr.write_into(&mut phdr_buf);

        let predicates_size = 4 + phdr_buf.len();

        let mut hw_init_buf = std::vec![0u8; hw_init.encoded_len()];
        hw_init.write_into(&mut hw_init_buf);
        let hw_inits_size = 4 + hw_init_buf.len();

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
            payload_size: (predicates_size + 4 + hw_inits_size + 4) as u32,
            flags: ImageFlags::new(false, false),
        };
        let mut out = std::vec![0u8; HEADER_LEN];
        header.write_into(&mut out);
        out.extend_from_slice(&(predicates_size as u32).to_le_bytes());
        out.extend_from_slice(&phdr_buf);
        out.extend_from_slice(&4u32.to_le_bytes()); // empty transfers
        out.extend_from_slice(&(hw_inits_size as u32).to_le_bytes());
        out.extend_from_slice(&hw_init_buf);
        out.extend_from_slice(&4u32.to_le_bytes()); // empty mem_inits
        out
    }

    #[test]
    fn commit_resolves_timer_binding_to_new_timer_handle() {
        let buf = minimal_image_with_hw_init(
            0x1000_9001,
            HwOp::TimerInit {
                timer_handle: 0x2000_0500,
                expiry_fn: 0x1000_9001,
                stop_fn: 0x1000_9005,
            },
        );
        let view = lu_common::image::ImageView::parse(&buf).unwrap();
        let predicate = view.predicates().next().unwrap();

        let mut gpio = FakeGpio::default();
        let mut timers = FakeTimers::default();
        let mut mem = FakeMemory::default();

        let resolved = SwapEngine::commit(
            &predicate,
            &view,
            EventBinding::Timer(0x1000_4000),
            &mut gpio,
            &mut timers,
            &mut mem,
        )
        .unwrap();

        assert_eq!(resolved, 0x2000_0500);
    }

    #[test]
    fn commit_resolves_gpio_binding_to_new_callback_handle() {
        let buf = minimal_image_with_hw_init(
            0x1000_9001,
            HwOp::InitCallback {
                cb_handle: 0x2000_0600,
                handler_fn: 0x1000_9001,
                pin_mask: 0x4,
            },
        );
        let view = lu_common::image::ImageView::parse(&buf).unwrap();
        let predicate = view.predicates().next().unwrap();

        let mut gpio = FakeGpio::default();
        let mut timers = FakeTimers::default();
        let mut mem = FakeMemory::default();

        let resolved = SwapEngine::commit(
            &predicate,
            &view,
            EventBinding::Gpio(0x3000_0000),
            &mut gpio,
            &mut timers,
            &mut mem,
        )
        .unwrap();

        assert_eq!(resolved, 0x2000_0600);
    }
}
