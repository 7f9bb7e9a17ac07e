// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Raw serial transport for streaming update images.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use serialport::SerialPort;

/// Default timeout for serial operations in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// A raw byte-stream connection to the device's update receiver. There is
/// no command/response handshake — the device frames the image purely by
/// the header's declared `payload_size`.
pub struct Transport {
    port: Box<dyn SerialPort>,
}

impl Transport {
    pub fn new(port_name: &str) -> Result<Self> {
        let port = serialport::new(port_name, 115200)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()
            .with_context(|| format!("failed to open serial port {}", port_name))?;
        Ok(Self { port })
    }

    pub fn port_name(&self) -> String {
        self.port.name().unwrap_or_else(|| "?".to_string())
    }

    /// Write `chunk` to the device, propagating any I/O error.
    pub fn send_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.port
            .write_all(chunk)
            .context("failed to write to serial port")
    }

    pub fn flush(&mut self) -> Result<()> {
        self.port.flush().context("failed to flush serial port")
    }
}
