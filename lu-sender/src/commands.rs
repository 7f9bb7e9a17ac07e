// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations for streaming and inspecting live-update images.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use lu_common::image::ImageView;

use crate::transport::Transport;

const CHUNK_SIZE: usize = 256;

/// Stream a prebuilt update image to the device over `transport`.
pub fn send_image(transport: &mut Transport, file: &Path) -> Result<()> {
    let image = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;

    let view = ImageView::parse(&image)
        .map_err(|e| anyhow::anyhow!("{} is not a valid update image: {}", file.display(), e))?;

    println!(
        "Image: {} ({} bytes, version {})",
        file.display(),
        image.len(),
        view.header().version
    );
    println!();

    let pb = ProgressBar::new(image.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    for chunk in image.chunks(CHUNK_SIZE) {
        transport.send_chunk(chunk)?;
        pb.inc(chunk.len() as u64);
    }
    transport.flush()?;
    pb.finish_with_message("done");

    println!();
    println!("Image streamed successfully.");
    Ok(())
}

/// Parse a local image file and print its header and section layout.
pub fn describe(file: &Path) -> Result<()> {
    let image = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let view = ImageView::parse(&image)
        .map_err(|e| anyhow::anyhow!("{} is not a valid update image: {}", file.display(), e))?;
    let header = view.header();

    println!("Update image: {}", file.display());
    println!("  version:            {}", header.version);
    println!("  payload_size:       {} bytes", header.payload_size);
    println!(
        "  flags:              predicate_only={} write_only={}",
        header.flags.predicate_only(),
        header.flags.write_only()
    );
    println!(
        "  text:               0x{:08x} ({} bytes)",
        header.text_start, header.text_size
    );
    println!(
        "  rodata:             0x{:08x} ({} bytes)",
        header.rodata_start, header.rodata_size
    );
    if header.bss_present() {
        println!(
            "  bss:                0x{:08x} ({} bytes)",
            header.bss_start, header.bss_size
        );
    }
    println!("  main_ptr:           0x{:08x} @ 0x{:08x}", header.main_ptr, header.main_ptr_addr);
    println!("  update_flag_addr:   0x{:08x}", header.update_flag_addr);
    println!();

    let predicates: Vec<_> = view.predicates().collect();
    println!("  predicates:         {}", predicates.len());
    for (i, p) in predicates.iter().enumerate() {
        println!(
            "    [{}] event 0x{:08x} -> 0x{:08x}, {} constraints, {} state inits, {} inactive ops",
            i,
            p.header().event_handler_addr,
            p.header().updated_event_handler_addr,
            p.header().n_constraints,
            p.header().n_state_init,
            p.header().n_inactive_ops,
        );
    }

    let transfers = view.transfers().count();
    let hw_inits = view.hw_inits().count();
    let mem_inits = view.mem_inits().count();
    println!("  bulk transfers:     {}", transfers);
    println!("  hardware inits:     {}", hw_inits);
    println!("  memory inits:       {}", mem_inits);

    Ok(())
}
