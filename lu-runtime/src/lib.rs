// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Predicate evaluator and quiescent-swap engine for live firmware
//! updates: receives an image over a byte transport, stages it to flash,
//! and swaps an event handler for its updated counterpart the moment
//! that event's predicate is satisfied and its timers are quiescent.

#![cfg_attr(not(test), no_std)]

pub mod evaluator;
pub mod hooks;
pub mod sink;
pub mod swap;
pub mod writer;

pub use evaluator::{evaluate, CycleCounter, MatchedPredicate, NullCycleCounter, SymbolReader, TimerQuery};
pub use hooks::{LiveUpdateRuntime, StatusPins};
pub use sink::{ByteSink, SinkOutcome};
pub use swap::{EventBinding, GpioPort, MemoryWriter, SwapEngine, TimerPort};
pub use writer::{FlashDriver, FlashWriter, WriterPolicy, WriterState};
