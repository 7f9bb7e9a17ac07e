// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Error taxonomy shared by the image parser, flash writer, and swap engine.

use core::fmt;

/// Opaque flash driver error code, as reported by the underlying flash
/// controller. The runtime never interprets the code itself — it only
/// logs it and gives up on the current step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlashIoError(pub i32);

impl fmt::Display for FlashIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flash driver returned error code {}", self.0)
    }
}

/// Everything that can go wrong while receiving, parsing, writing, or
/// applying an update image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateError {
    /// Staged image does not match the runtime's compiled-in format version.
    VersionMismatch { expected: u32, found: u32 },
    /// The framer would have exceeded the staging buffer.
    OverflowInBuffer,
    /// The flash driver reported a non-zero error on a page write.
    FlashIoError(FlashIoError),
    /// No new-image binding could be found for the triggering event.
    UnresolvedBinding,
    /// Structural mismatch while walking sections: a declared size ran
    /// past the staging buffer, a predicate's sub-counts didn't consume
    /// exactly its declared length, or an unrecognized hardware-op tag
    /// was encountered.
    ImageCorrupt,
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::VersionMismatch { expected, found } => write!(
                f,
                "image format version {} does not match runtime version {}",
                found, expected
            ),
            UpdateError::OverflowInBuffer => {
                write!(f, "staged byte count does not match header.payload_size")
            }
            UpdateError::FlashIoError(e) => write!(f, "flash I/O error: {}", e),
            UpdateError::UnresolvedBinding => {
                write!(f, "no new-image binding found for the triggering event")
            }
            UpdateError::ImageCorrupt => write!(f, "update image is structurally corrupt"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for UpdateError {}
