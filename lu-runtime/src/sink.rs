// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Byte sink and framer: accumulates incoming serial bytes into a staging
//! buffer and recognizes a complete, version-checked image.

use heapless::Vec;
use lu_common::format::{UpdateHeader, CURRENT_VERSION, HEADER_LEN, MAX_IMAGE_BYTES};
use lu_common::image::ImageView;

/// Result of feeding a chunk of bytes into a [`ByteSink`].
#[derive(Debug)]
pub enum SinkOutcome<'a> {
    /// More bytes are needed before the header or payload is complete.
    Pending,
    /// The header parsed but declares a format version this runtime does
    /// not support. The sink resets itself so the next chunk starts fresh.
    VersionMismatch { expected: u32, found: u32 },
    /// The declared payload has been fully received and validated.
    Complete(ImageView<'a>),
    /// The staged bytes are structurally invalid once the declared length
    /// was reached. The sink resets itself.
    Corrupt,
}

/// Accumulates update image bytes received over the wire.
///
/// Never allocates, never blocks, never panics on overflow — excess bytes
/// past `MAX_IMAGE_BYTES` are dropped and the sink is reset, matching the
/// framer's "never panics, never blocks" requirement.
pub struct ByteSink {
    buf: Vec<u8, MAX_IMAGE_BYTES>,
}

impl ByteSink {
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Number of bytes currently staged.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// The raw staged bytes, for callers that need to copy them out of
    /// the sink (e.g. into a runtime's own staging storage) before the
    /// next `ingest` or `reset` call overwrites them.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop all staged bytes, ready to receive a new image from scratch.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Feed a chunk of bytes received from the transport.
    pub fn ingest(&mut self, chunk: &[u8]) -> SinkOutcome<'_> {
        for &byte in chunk {
            if self.buf.push(byte).is_err() {
                // Buffer is full and the declared payload (if known) is
                // larger than we can stage; give up on this image.
                self.reset();
                return SinkOutcome::Corrupt;
            }
            if self.buf.len() == HEADER_LEN {
                if let Ok(header) = UpdateHeader::parse(&self.buf) {
                    if header.version != CURRENT_VERSION {
                        let expected = CURRENT_VERSION;
                        let found = header.version;
                        defmt::warn!(
                            "staged image version {} != runtime version {}, discarding",
                            found,
                            expected
                        );
                        self.reset();
                        return SinkOutcome::VersionMismatch { expected, found };
                    }
                }
            }
        }

        if self.buf.len() < HEADER_LEN {
            return SinkOutcome::Pending;
        }
        let header = match UpdateHeader::parse(&self.buf) {
            Ok(h) => h,
            Err(_) => {
                self.reset();
                return SinkOutcome::Corrupt;
            }
        };
        let declared_total = HEADER_LEN + header.payload_size as usize;
        if self.buf.len() < declared_total {
            return SinkOutcome::Pending;
        }
        if self.buf.len() != declared_total {
            self.reset();
            return SinkOutcome::Corrupt;
        }

        if ImageView::parse(&self.buf).is_err() {
            defmt::warn!("staged image failed structural validation, discarding");
            self.reset();
            return SinkOutcome::Corrupt;
        }
        match ImageView::parse(&self.buf) {
            Ok(view) => SinkOutcome::Complete(view),
            Err(_) => unreachable!("validated above"),
        }
    }
}

impl Default for ByteSink {
    fn default() -> Self {
        Self::new()
    }
}
