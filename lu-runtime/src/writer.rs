// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash writer: drives a validated image from the staging buffer into
//! flash one page at a time, one step per call.

use lu_common::error::{FlashIoError, UpdateError};
use lu_common::format::FLASH_PAGE_SIZE;
use lu_common::image::ImageView;

/// Page-granular flash access. The only seam through which the writer
/// touches hardware, so the crate carries no dependency on a specific
/// flash controller.
pub trait FlashDriver {
    /// Erase then program one page starting at `addr` with `data`.
    /// `data.len()` never exceeds `page_size()`.
    fn erase_program_page(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashIoError>;

    /// Read `len` bytes starting at `addr` into `out`.
    fn read(&mut self, addr: u32, out: &mut [u8]) -> Result<(), FlashIoError>;

    fn page_size(&self) -> u32 {
        FLASH_PAGE_SIZE
    }
}

/// Which optional persistence steps run after the bulk text/rodata write.
/// All enabled by default; individually disableable per build policy.
#[derive(Clone, Copy, Debug)]
pub struct WriterPolicy {
    pub write_bss_loc: bool,
    pub write_bss_size: bool,
    pub write_main_ptr: bool,
    pub write_update_flag: bool,
}

impl Default for WriterPolicy {
    fn default() -> Self {
        Self {
            write_bss_loc: true,
            write_bss_size: true,
            write_main_ptr: true,
            write_update_flag: true,
        }
    }
}

/// The writer's current step. Replaces a set of module-scope mutable
/// cursors with a single value carrying its own progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    Idle,
    WriteText { offset: usize },
    WriteRodata { offset: usize },
    WriteBssLoc,
    WriteBssSize,
    WriteMainPtr,
    WriteUpdateFlag,
    Finalize,
    Done,
}

/// Drives one [`ImageView`]'s text/rodata sections and header-declared
/// bookkeeping writes into flash, one page (or one scalar write) per
/// [`FlashWriter::step`] call.
pub struct FlashWriter {
    state: WriterState,
    policy: WriterPolicy,
}

impl FlashWriter {
    pub fn new(policy: WriterPolicy) -> Self {
        Self {
            state: WriterState::Idle,
            policy,
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == WriterState::Done
    }

    /// Begin writing `view` to flash via `driver`. Replaces any in-progress write.
    pub fn start(&mut self) {
        self.state = WriterState::WriteText { offset: 0 };
    }

    /// Return to `Idle`, e.g. after a commit consumes the just-written image.
    pub fn reset(&mut self) {
        self.state = WriterState::Idle;
    }

    /// Run at most one step. Intended to be called repeatedly from the
    /// idle loop, not a tight loop in interrupt context.
    pub fn step(
        &mut self,
        view: &ImageView<'_>,
        driver: &mut impl FlashDriver,
    ) -> Result<WriterState, UpdateError> {
        let header = view.header();
        let page = driver.page_size() as usize;

        self.state = match self.state {
            WriterState::Idle => WriterState::Idle,
            WriterState::WriteText { offset } => {
                let text = view.text();
                if offset >= text.len() {
                    WriterState::WriteRodata { offset: 0 }
                } else {
                    let next = write_section_page(driver, page, header.text_start, text, offset)?;
                    WriterState::WriteText { offset: next }
                }
            }
            WriterState::WriteRodata { offset } => {
                let rodata = view.rodata();
                if offset >= rodata.len() {
                    WriterState::WriteBssLoc
                } else {
                    let next = write_section_page(driver, page, header.rodata_start, rodata, offset)?;
                    WriterState::WriteRodata { offset: next }
                }
            }
            WriterState::WriteBssLoc => {
                if self.policy.write_bss_loc && header.bss_present() {
                    write_scalar(driver, page, header.bss_start_addr, &header.bss_start.to_le_bytes())?;
                }
                WriterState::WriteBssSize
            }
            WriterState::WriteBssSize => {
                if self.policy.write_bss_size && header.bss_present() {
                    write_scalar(driver, page, header.bss_size_addr, &header.bss_size.to_le_bytes())?;
                }
                WriterState::WriteMainPtr
            }
            WriterState::WriteMainPtr => {
                if self.policy.write_main_ptr {
                    write_scalar(driver, page, header.main_ptr_addr, &header.main_ptr.to_le_bytes())?;
                }
                WriterState::WriteUpdateFlag
            }
            WriterState::WriteUpdateFlag => {
                if self.policy.write_update_flag {
                    write_scalar(driver, page, header.update_flag_addr, &1u32.to_le_bytes())?;
                }
                WriterState::Finalize
            }
            WriterState::Finalize => WriterState::Done,
            WriterState::Done => WriterState::Done,
        };
        Ok(self.state)
    }
}

/// Scratch capacity for a read-splice-erase-program cycle. Bounds the
/// largest page a `FlashDriver` may report; `FLASH_PAGE_SIZE` is the only
/// page size this workspace's drivers use.
const SCRATCH_PAGE_LEN: usize = FLASH_PAGE_SIZE as usize;

/// Erase-program the flash page starting at `page_base`, splicing `chunk`
/// in at `offset_in_page` unless `chunk` exactly fills the page (in which
/// case the existing contents don't need preserving).
fn splice_one_page(
    driver: &mut impl FlashDriver,
    page_size: usize,
    page_base: u32,
    offset_in_page: usize,
    chunk: &[u8],
) -> Result<(), UpdateError> {
    if offset_in_page == 0 && chunk.len() == page_size {
        return driver
            .erase_program_page(page_base, chunk)
            .map_err(UpdateError::FlashIoError);
    }
    let mut scratch = [0u8; SCRATCH_PAGE_LEN];
    let page = &mut scratch[..page_size];
    driver.read(page_base, page).map_err(UpdateError::FlashIoError)?;
    page[offset_in_page..offset_in_page + chunk.len()].copy_from_slice(chunk);
    driver.erase_program_page(page_base, page).map_err(UpdateError::FlashIoError)
}

/// Write one flash page's worth of `data[offset..]`, computing the
/// physical page that encloses `section_start + offset` rather than
/// assuming section-relative chunk boundaries line up with flash pages.
/// Returns the offset to resume from on the next call.
fn write_section_page(
    driver: &mut impl FlashDriver,
    page_size: usize,
    section_start: u32,
    data: &[u8],
    offset: usize,
) -> Result<usize, UpdateError> {
    let addr = section_start + offset as u32;
    let offset_in_page = addr as usize % page_size;
    let chunk_len = (page_size - offset_in_page).min(data.len() - offset);
    let page_base = addr - offset_in_page as u32;
    splice_one_page(driver, page_size, page_base, offset_in_page, &data[offset..offset + chunk_len])?;
    Ok(offset + chunk_len)
}

/// Write a small fixed-size scalar at an arbitrary address, splicing
/// across a page boundary if the scalar happens to straddle one.
fn write_scalar(
    driver: &mut impl FlashDriver,
    page_size: usize,
    addr: u32,
    data: &[u8],
) -> Result<(), UpdateError> {
    let mut offset = 0;
    while offset < data.len() {
        offset = write_section_page(driver, page_size, addr, data, offset)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lu_common::format::{ImageFlags, UpdateHeader, CURRENT_VERSION, HEADER_LEN};

    struct FakeFlash {
        writes: std::vec::Vec<(u32, std::vec::Vec<u8>)>,
        mem: std::collections::HashMap<u32, u8>,
    }

    impl FakeFlash {
        fn new() -> Self {
            Self {
                writes: std::vec::Vec::new(),
                mem: std::collections::HashMap::new(),
            }
        }
    }

    impl FlashDriver for FakeFlash {
        fn erase_program_page(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashIoError> {
            for (i, b) in data.iter().enumerate() {
                self.mem.insert(addr + i as u32, *b);
            }
            self.writes.push((addr, data.to_vec()));
            Ok(())
        }

        fn read(&mut self, addr: u32, out: &mut [u8]) -> Result<(), FlashIoError> {
            for (i, b) in out.iter_mut().enumerate() {
                *b = *self.mem.get(&(addr + i as u32)).unwrap_or(&0);
            }
            Ok(())
        }

        fn page_size(&self) -> u32 {
            16
        }
    }

    fn image_with_text(text: &[u8]) -> std::vec::Vec<u8> {
        let header = UpdateHeader {
            version: CURRENT_VERSION,
            main_ptr_addr: 0x2000_0000,
            main_ptr: 0x1000_1000,
            update_flag_addr: 0x2000_0004,
            text_start: 0x1000_2000,
            text_size: text.len() as u32,
            rodata_start: 0x1000_3000,
            rodata_size: 0,
            bss_start: 0,
            bss_size: 0,
            bss_start_addr: 0,
            bss_size_addr: 0,
            payload_size: text.len() as u32 + 16,
            flags: ImageFlags::new(false, false),
        };
        let mut out = std::vec![0u8; HEADER_LEN];
        header.write_into(&mut out);
        out.extend_from_slice(text);
        for _ in 0..4 {
            out.extend_from_slice(&4u32.to_le_bytes());
        }
        out
    }

    #[test]
    fn writes_text_in_page_sized_chunks_then_finishes() {
        let buf = image_with_text(&[0xAB; 40]);
        let view = ImageView::parse(&buf).unwrap();
        let mut driver = FakeFlash::new();
        let mut writer = FlashWriter::new(WriterPolicy::default());
        writer.start();

        while !writer.is_done() {
            writer.step(&view, &mut driver).unwrap();
        }

        let text_writes: std::vec::Vec<_> = driver
            .writes
            .iter()
            .filter(|(addr, _)| *addr >= 0x1000_2000 && *addr < 0x1000_3000)
            .collect();
        assert_eq!(text_writes.len(), 3); // 16 + 16 + 8
        assert_eq!(writer.state(), WriterState::Done);
    }

    #[test]
    fn disabled_policy_skips_persistence_writes() {
        let buf = image_with_text(&[]);
        let view = ImageView::parse(&buf).unwrap();
        let mut driver = FakeFlash::new();
        let policy = WriterPolicy {
            write_bss_loc: false,
            write_bss_size: false,
            write_main_ptr: false,
            write_update_flag: false,
        };
        let mut writer = FlashWriter::new(policy);
        writer.start();
        while !writer.is_done() {
            writer.step(&view, &mut driver).unwrap();
        }
        assert!(driver.writes.is_empty());
    }

    fn image_with_text_at(text_start: u32, text: &[u8]) -> std::vec::Vec<u8> {
        let header = UpdateHeader {
            version: CURRENT_VERSION,
            main_ptr_addr: 0x2000_0000,
            main_ptr: 0x1000_1000,
            update_flag_addr: 0x2000_0004,
            text_start,
            text_size: text.len() as u32,
            rodata_start: text_start + text.len() as u32,
            rodata_size: 0,
            bss_start: 0,
            bss_size: 0,
            bss_start_addr: 0,
            bss_size_addr: 0,
            payload_size: text.len() as u32 + 16,
            flags: ImageFlags::new(false, false),
        };
        let mut out = std::vec![0u8; HEADER_LEN];
        header.write_into(&mut out);
        out.extend_from_slice(text);
        for _ in 0..4 {
            out.extend_from_slice(&4u32.to_le_bytes());
        }
        out
    }

    #[test]
    fn splices_non_page_aligned_text_preserving_surrounding_bytes() {
        // text_start sits 5 bytes into a 16-byte page; the first page
        // must be read, spliced, and written back rather than erased
        // with only the new bytes (which would zero the preceding 5
        // bytes of whatever else lives on that page).
        let text_start = 0x1000_2005;
        let page_base = 0x1000_2000;
        let buf = image_with_text_at(text_start, &[0xCD; 6]);
        let view = ImageView::parse(&buf).unwrap();
        let mut driver = FakeFlash::new();
        driver.mem.insert(page_base, 0x11);
        driver.mem.insert(page_base + 1, 0x22);
        driver.mem.insert(page_base + 15, 0x33); // last byte of the first page

        let mut writer = FlashWriter::new(WriterPolicy::default());
        writer.start();
        while !writer.is_done() {
            writer.step(&view, &mut driver).unwrap();
        }

        let mut first_page = [0u8; 16];
        for (i, b) in first_page.iter_mut().enumerate() {
            *b = *driver.mem.get(&(page_base + i as u32)).unwrap();
        }
        assert_eq!(&first_page[0..2], &[0x11, 0x22]);
        assert_eq!(&first_page[5..11], &[0xCD; 6]);
        assert_eq!(first_page[15], 0x33);
    }
}
