// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use crate::transport::Transport;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "lu-sender")]
#[command(about = "Stream and inspect live-update images")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Stream a prebuilt update image to a device over a serial port
    Send {
        /// Update image file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Serial port (e.g. /dev/ttyACM0)
        #[arg(short, long)]
        port: String,
    },

    /// Parse and print an update image's header and section layout
    Describe {
        /// Update image file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Send { file, port } => {
            let mut transport = Transport::new(&port)?;
            commands::send_image(&mut transport, &file)
        }
        Commands::Describe { file } => commands::describe(&file),
    }
}
