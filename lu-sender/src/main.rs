// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host tool for streaming and inspecting live-update images.
//!
//! Usage:
//!   lu-sender send firmware.img --port /dev/ttyACM0
//!   lu-sender describe firmware.img

mod cli;
mod commands;
mod transport;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    cli::run(args)
}
