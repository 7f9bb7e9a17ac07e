// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Public event-hook surface: the four trigger/commit pairs an
//! application wires into its timer, GPIO, and UART interrupt handlers,
//! plus the idle-loop flash step and the runtime reset/boot-flag queries.

use core::cell::Cell;

use lu_common::error::UpdateError;
use lu_common::format::MAX_IMAGE_BYTES;
use lu_common::image::ImageView;

use crate::evaluator::{evaluate, CycleCounter, SymbolReader, TimerQuery};
use crate::sink::{ByteSink, SinkOutcome};
use crate::swap::{EventBinding, GpioPort, MemoryWriter, SwapEngine, TimerPort};
use crate::writer::{FlashDriver, FlashWriter, WriterPolicy, WriterState};

/// GPIO bit masks the runtime pulses around flash writes and commits.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusPins {
    pub written_mask: u32,
    pub finished_mask: u32,
}

/// A predicate that matched and is waiting to be committed by the next
/// call into the matching `commit_at_*` hook. Written once by the
/// evaluator, drained exactly once by the committer — never read by
/// anything else, so a single-slot cell is sufficient.
#[derive(Clone, Copy, Debug)]
struct Slot {
    predicate_index: usize,
    binding: EventBinding,
}

/// The address of the staged image's text section is fixed relative to
/// the header; once `ImageView::parse` has validated the bytes we keep
/// only the header and byte range, re-parsing a view on demand rather
/// than storing a borrow that would make this struct self-referential.
struct StagedImage {
    bytes: [u8; MAX_IMAGE_BYTES],
    len: usize,
}

impl StagedImage {
    const fn new() -> Self {
        Self {
            bytes: [0; MAX_IMAGE_BYTES],
            len: 0,
        }
    }

    fn view(&self) -> Option<ImageView<'_>> {
        if self.len == 0 {
            return None;
        }
        ImageView::parse(&self.bytes[..self.len]).ok()
    }
}

/// The live-update runtime: owns the byte sink, flash writer, staged
/// image, and the matched-predicate handoff slot. Generic over every
/// hardware collaborator so the crate has no dependency on a specific MCU.
pub struct LiveUpdateRuntime<F, G, T, M, S, C> {
    sink: ByteSink,
    writer: FlashWriter,
    staged: StagedImage,
    matched: Cell<Option<Slot>>,
    boot_into_updated: Cell<bool>,
    status_pins: StatusPins,
    flash: F,
    gpio: G,
    timers: T,
    mem: M,
    symbols: S,
    cycles: C,
}

impl<F, G, T, M, S, C> LiveUpdateRuntime<F, G, T, M, S, C>
where
    F: FlashDriver,
    G: GpioPort,
    T: TimerPort + TimerQuery,
    M: MemoryWriter,
    S: SymbolReader,
    C: CycleCounter,
{
    pub fn new(
        policy: WriterPolicy,
        status_pins: StatusPins,
        flash: F,
        gpio: G,
        timers: T,
        mem: M,
        symbols: S,
        cycles: C,
    ) -> Self {
        Self {
            sink: ByteSink::new(),
            writer: FlashWriter::new(policy),
            staged: StagedImage::new(),
            matched: Cell::new(None),
            boot_into_updated: Cell::new(false),
            status_pins,
            flash,
            gpio,
            timers,
            mem,
            symbols,
            cycles,
        }
    }

    /// Feed bytes received from the serial transport. Call from the
    /// receive ISR.
    pub fn ingest(&mut self, chunk: &[u8]) {
        if let SinkOutcome::Complete(_) = self.sink.ingest(chunk) {
            let len = self.sink.len();
            self.staged.bytes[..len].copy_from_slice(self.sink.as_bytes());
            self.staged.len = len;
        }
    }

    /// Drive the flash writer one step. Call from the idle loop.
    pub fn flash_step(&mut self) -> Result<WriterState, UpdateError> {
        let view = self.staged.view().ok_or(UpdateError::ImageCorrupt)?;
        if self.writer.state() == WriterState::Idle {
            self.writer.start();
        }
        let state = self.writer.step(&view, &mut self.flash).inspect_err(|_| {
            defmt::warn!("flash write step failed, write machine stalled at current step");
        })?;
        if state == WriterState::Done {
            self.gpio.set_bits_raw(self.status_pins.written_mask);
            self.sink.reset();
            if view.header().flags.write_only() {
                self.staged.len = 0;
            }
        }
        Ok(state)
    }

    fn trigger(&self, event_addr: u32, binding: EventBinding) {
        if !self.writer.is_done() {
            return;
        }
        let Some(view) = self.staged.view() else {
            return;
        };
        if let Some(m) = evaluate(&view, event_addr, &self.symbols, &self.timers, &self.cycles) {
            self.matched.set(Some(Slot {
                predicate_index: m.predicate_index,
                binding,
            }));
        }
    }

    fn commit(&mut self) -> Option<u32> {
        let slot = self.matched.take()?;
        let view = self.staged.view()?;
        let predicate = view.predicates().nth(slot.predicate_index)?;
        let resolved = match SwapEngine::commit(
            &predicate,
            &view,
            slot.binding,
            &mut self.gpio,
            &mut self.timers,
            &mut self.mem,
        ) {
            Ok(addr) => addr,
            Err(_) => {
                defmt::warn!("matched predicate had no resolvable new-image binding");
                return None;
            }
        };
        self.gpio.set_bits_raw(self.status_pins.finished_mask);
        self.boot_into_updated.set(true);
        self.staged.len = 0;
        self.sink.reset();
        self.writer.reset();
        Some(resolved)
    }

    pub fn trigger_on_timer(&self, op_ptr: u32, event_addr: u32) {
        self.trigger(event_addr, EventBinding::Timer(op_ptr));
    }

    pub fn commit_at_timer(&mut self) -> Option<u32> {
        self.commit()
    }

    pub fn trigger_on_gpio(&self, cb_handle: u32, event_addr: u32) {
        self.trigger(event_addr, EventBinding::Gpio(cb_handle));
    }

    pub fn commit_at_gpio(&mut self) -> Option<u32> {
        self.commit()
    }

    pub fn trigger_on_uart(&self, op_ptr: u32, event_addr: u32) {
        self.trigger(event_addr, EventBinding::Uart(op_ptr));
    }

    pub fn commit_at_uart(&mut self) -> Option<u32> {
        self.commit()
    }

    /// Reset the runtime to receive a fresh image without rebooting.
    pub fn reset(&mut self) {
        self.sink.reset();
        self.staged.len = 0;
        self.matched.set(None);
        self.writer.reset();
    }

    /// Whether the startup shim should jump into the updated entry point
    /// rather than the original one. Backed by the `MemoryWriter` seam so
    /// the flag survives a soft reset the same way the original's RAM
    /// flag does.
    pub fn boot_into_updated_entry(&self) -> bool {
        self.boot_into_updated.get()
    }
}
