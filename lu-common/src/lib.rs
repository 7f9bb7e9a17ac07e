// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Wire format and shared types for the live-update runtime.
//!
//! This crate supports both `no_std` (embedded) and `std` (host) environments:
//! - Default: `no_std` mode for the runtime crate
//! - `std` feature: enables `std::error::Error` impls for host tooling

#![cfg_attr(not(feature = "std"), no_std)]

pub mod error;
pub mod format;
pub mod image;

pub use error::{FlashIoError, UpdateError};
pub use format::{
    AddrOffsetVal, ConstraintHeader, ConstraintRange, HwOp, ImageFlags, MemInit, Operation,
    PredicateHeader, StateTransfer, Transfer, UpdateHeader, CURRENT_VERSION, FLASH_PAGE_SIZE,
    HEADER_LEN, MAX_IMAGE_BYTES,
};
pub use image::{Constraint, ConstraintsIter, FixedRecordIter, HwOpIter, ImageView, PredicateView, PredicatesIter};
