// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! On-wire / on-flash record definitions for the live-update image format.
//!
//! Every multi-byte field is little-endian `u32`; every record is packed
//! with no padding. Section boundaries are never raw pointer arithmetic —
//! offsets are computed and checked in [`crate::image`].

use crate::error::UpdateError;

/// Format version this runtime understands. Images with a different
/// version are rejected before any byte of the payload is trusted.
pub const CURRENT_VERSION: u32 = 11;

/// Maximum total image size (header + payload) the staging buffer holds.
pub const MAX_IMAGE_BYTES: usize = 0x6000;

/// Flash page size assumed by the page-granular writer.
pub const FLASH_PAGE_SIZE: u32 = 0x1000;

/// Byte length of [`UpdateHeader`] on the wire.
pub const HEADER_LEN: usize = 14 * 4;

/// Byte length of a fixed-size `{addr, offset, val}` record
/// ([`StateTransfer`]/[`MemInit`]).
pub const ADDR_OFFSET_VAL_LEN: usize = 12;

/// Byte length of a fixed-size [`Transfer`] record.
pub const TRANSFER_LEN: usize = 12;

/// Byte length of a [`PredicateHeader`].
pub const PREDICATE_HEADER_LEN: usize = 8 * 4;

/// Byte length of a [`Constraint`] header (excluding its ranges).
pub const CONSTRAINT_HEADER_LEN: usize = 4 * 4;

/// Byte length of a single [`ConstraintRange`].
pub const CONSTRAINT_RANGE_LEN: usize = 8;

/// Byte length of an [`Operation`] record.
pub const OPERATION_LEN: usize = 4;

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, UpdateError> {
    let bytes = buf
        .get(offset..offset + 4)
        .ok_or(UpdateError::ImageCorrupt)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Independently settable flags on [`UpdateHeader`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageFlags(u32);

impl ImageFlags {
    const PREDICATE_ONLY: u32 = 1 << 0;
    const WRITE_ONLY: u32 = 1 << 1;

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn new(predicate_only: bool, write_only: bool) -> Self {
        let mut raw = 0;
        if predicate_only {
            raw |= Self::PREDICATE_ONLY;
        }
        if write_only {
            raw |= Self::WRITE_ONLY;
        }
        Self(raw)
    }

    /// Evaluate predicates but never arm a swap — used to instrument
    /// predicate cost without committing updates.
    pub fn predicate_only(self) -> bool {
        self.0 & Self::PREDICATE_ONLY != 0
    }

    /// Flash the image and stop; do not arm the evaluator.
    pub fn write_only(self) -> bool {
        self.0 & Self::WRITE_ONLY != 0
    }
}

/// Top-level update image header, fixed `HEADER_LEN` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateHeader {
    pub version: u32,
    pub main_ptr_addr: u32,
    pub main_ptr: u32,
    pub update_flag_addr: u32,
    pub text_start: u32,
    pub text_size: u32,
    pub rodata_start: u32,
    pub rodata_size: u32,
    pub bss_start: u32,
    pub bss_size: u32,
    pub bss_start_addr: u32,
    pub bss_size_addr: u32,
    pub payload_size: u32,
    pub flags: ImageFlags,
}

impl UpdateHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, UpdateError> {
        if buf.len() < HEADER_LEN {
            return Err(UpdateError::ImageCorrupt);
        }
        Ok(Self {
            version: read_u32(buf, 0)?,
            main_ptr_addr: read_u32(buf, 4)?,
            main_ptr: read_u32(buf, 8)?,
            update_flag_addr: read_u32(buf, 12)?,
            text_start: read_u32(buf, 16)?,
            text_size: read_u32(buf, 20)?,
            rodata_start: read_u32(buf, 24)?,
            rodata_size: read_u32(buf, 28)?,
            bss_start: read_u32(buf, 32)?,
            bss_size: read_u32(buf, 36)?,
            bss_start_addr: read_u32(buf, 40)?,
            bss_size_addr: read_u32(buf, 44)?,
            payload_size: read_u32(buf, 48)?,
            flags: ImageFlags::from_raw(read_u32(buf, 52)?),
        })
    }

    /// Encode this header into `out`, which must be at least `HEADER_LEN`
    /// bytes. Used by tests and by `lu-sender` when assembling images.
    pub fn write_into(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..8].copy_from_slice(&self.main_ptr_addr.to_le_bytes());
        out[8..12].copy_from_slice(&self.main_ptr.to_le_bytes());
        out[12..16].copy_from_slice(&self.update_flag_addr.to_le_bytes());
        out[16..20].copy_from_slice(&self.text_start.to_le_bytes());
        out[20..24].copy_from_slice(&self.text_size.to_le_bytes());
        out[24..28].copy_from_slice(&self.rodata_start.to_le_bytes());
        out[28..32].copy_from_slice(&self.rodata_size.to_le_bytes());
        out[32..36].copy_from_slice(&self.bss_start.to_le_bytes());
        out[36..40].copy_from_slice(&self.bss_size.to_le_bytes());
        out[40..44].copy_from_slice(&self.bss_start_addr.to_le_bytes());
        out[44..48].copy_from_slice(&self.bss_size_addr.to_le_bytes());
        out[48..52].copy_from_slice(&self.payload_size.to_le_bytes());
        out[52..56].copy_from_slice(&self.flags.raw().to_le_bytes());
    }

    pub fn bss_present(&self) -> bool {
        self.bss_start != 0
    }
}

/// Fixed `PREDICATE_HEADER_LEN`-byte header at the start of each predicate record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PredicateHeader {
    /// Total byte length of this predicate record, including this header.
    pub size: u32,
    pub event_handler_addr: u32,
    pub updated_event_handler_addr: u32,
    pub n_inactive_ops: u32,
    pub n_reset_ops: u32,
    pub n_constraints: u32,
    pub n_state_init: u32,
    pub hw_transfer_size: u32,
}

impl PredicateHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, UpdateError> {
        if buf.len() < PREDICATE_HEADER_LEN {
            return Err(UpdateError::ImageCorrupt);
        }
        Ok(Self {
            size: read_u32(buf, 0)?,
            event_handler_addr: read_u32(buf, 4)?,
            updated_event_handler_addr: read_u32(buf, 8)?,
            n_inactive_ops: read_u32(buf, 12)?,
            n_reset_ops: read_u32(buf, 16)?,
            n_constraints: read_u32(buf, 20)?,
            n_state_init: read_u32(buf, 24)?,
            hw_transfer_size: read_u32(buf, 28)?,
        })
    }

    pub fn write_into(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..8].copy_from_slice(&self.event_handler_addr.to_le_bytes());
        out[8..12].copy_from_slice(&self.updated_event_handler_addr.to_le_bytes());
        out[12..16].copy_from_slice(&self.n_inactive_ops.to_le_bytes());
        out[16..20].copy_from_slice(&self.n_reset_ops.to_le_bytes());
        out[20..24].copy_from_slice(&self.n_constraints.to_le_bytes());
        out[24..28].copy_from_slice(&self.n_state_init.to_le_bytes());
        out[28..32].copy_from_slice(&self.hw_transfer_size.to_le_bytes());
    }
}

/// A pointer to a timer in the old image, used as an inactive-op or reset-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operation {
    pub op_ptr: u32,
}

impl Operation {
    pub fn parse(buf: &[u8]) -> Result<Self, UpdateError> {
        Ok(Self {
            op_ptr: read_u32(buf, 0)?,
        })
    }

    pub fn write_into(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.op_ptr.to_le_bytes());
    }
}

/// Inclusive bound on a constrained value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstraintRange {
    pub lower: u32,
    pub upper: u32,
}

impl ConstraintRange {
    pub fn parse(buf: &[u8]) -> Result<Self, UpdateError> {
        Ok(Self {
            lower: read_u32(buf, 0)?,
            upper: read_u32(buf, 4)?,
        })
    }

    pub fn write_into(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.lower.to_le_bytes());
        out[4..8].copy_from_slice(&self.upper.to_le_bytes());
    }

    pub fn contains(&self, val: u32) -> bool {
        self.lower <= val && val <= self.upper
    }
}

/// A data constraint: `symbol_addr`, read at `bytes` width, must lie in
/// at least one of `n_ranges` ranges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstraintHeader {
    /// Total byte length of this record, ranges included.
    pub size: u32,
    pub symbol_addr: u32,
    pub bytes: u32,
    pub n_ranges: u32,
}

impl ConstraintHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, UpdateError> {
        if buf.len() < CONSTRAINT_HEADER_LEN {
            return Err(UpdateError::ImageCorrupt);
        }
        Ok(Self {
            size: read_u32(buf, 0)?,
            symbol_addr: read_u32(buf, 4)?,
            bytes: read_u32(buf, 8)?,
            n_ranges: read_u32(buf, 12)?,
        })
    }

    pub fn write_into(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..8].copy_from_slice(&self.symbol_addr.to_le_bytes());
        out[8..12].copy_from_slice(&self.bytes.to_le_bytes());
        out[12..16].copy_from_slice(&self.n_ranges.to_le_bytes());
    }
}

/// `{addr, offset, val}`: write the 32-bit `val` at byte address
/// `addr + offset`. Shared layout for `StateTransfer` and `MemInit`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddrOffsetVal {
    pub addr: u32,
    pub offset: u32,
    pub val: u32,
}

impl AddrOffsetVal {
    pub fn parse(buf: &[u8]) -> Result<Self, UpdateError> {
        if buf.len() < ADDR_OFFSET_VAL_LEN {
            return Err(UpdateError::ImageCorrupt);
        }
        Ok(Self {
            addr: read_u32(buf, 0)?,
            offset: read_u32(buf, 4)?,
            val: read_u32(buf, 8)?,
        })
    }

    pub fn write_into(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.addr.to_le_bytes());
        out[4..8].copy_from_slice(&self.offset.to_le_bytes());
        out[8..12].copy_from_slice(&self.val.to_le_bytes());
    }

    pub fn target_addr(&self) -> u32 {
        self.addr.wrapping_add(self.offset)
    }
}

pub type StateTransfer = AddrOffsetVal;
pub type MemInit = AddrOffsetVal;

/// `{origin, dest, size}`: memcpy `size` bytes from `origin` to `dest`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub origin: u32,
    pub dest: u32,
    pub size: u32,
}

impl Transfer {
    pub fn parse(buf: &[u8]) -> Result<Self, UpdateError> {
        if buf.len() < TRANSFER_LEN {
            return Err(UpdateError::ImageCorrupt);
        }
        Ok(Self {
            origin: read_u32(buf, 0)?,
            dest: read_u32(buf, 4)?,
            size: read_u32(buf, 8)?,
        })
    }

    pub fn write_into(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.origin.to_le_bytes());
        out[4..8].copy_from_slice(&self.dest.to_le_bytes());
        out[8..12].copy_from_slice(&self.size.to_le_bytes());
    }
}

/// Closed enumeration of hardware-configuration calls recognized by the
/// runtime (spec §6). The image generator emits a tag and argument words,
/// never a raw function pointer — see `DESIGN.md` ("Raw function-pointer
/// dispatch → tagged variant").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HwOp {
    /// Initialize a timer with its expiry and stop callbacks.
    TimerInit {
        timer_handle: u32,
        expiry_fn: u32,
        stop_fn: u32,
    },
    /// Configure pin direction and pull.
    PinConfigure { pin: u32, flags: u32 },
    /// Configure a pin's interrupt trigger and mode.
    PinInterruptConfigure { pin: u32, config: u32 },
    /// Initialize a GPIO callback record.
    InitCallback {
        cb_handle: u32,
        handler_fn: u32,
        pin_mask: u32,
    },
    /// Register (or unregister) a callback.
    ManageCallback { cb_handle: u32, add: bool },
    /// Set pin bits on the GPIO port.
    PortSetBitsRaw { mask: u32 },
    /// Clear pin bits on the GPIO port.
    PortClearBitsRaw { mask: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
enum HwOpTag {
    TimerInit = 1,
    PinConfigure = 2,
    PinInterruptConfigure = 3,
    InitCallback = 4,
    ManageCallback = 5,
    PortSetBitsRaw = 6,
    PortClearBitsRaw = 7,
}

impl HwOpTag {
    fn from_raw(raw: u32) -> Result<Self, UpdateError> {
        Ok(match raw {
            1 => Self::TimerInit,
            2 => Self::PinConfigure,
            3 => Self::PinInterruptConfigure,
            4 => Self::InitCallback,
            5 => Self::ManageCallback,
            6 => Self::PortSetBitsRaw,
            7 => Self::PortClearBitsRaw,
            _ => return Err(UpdateError::ImageCorrupt),
        })
    }
}

/// Byte length of a `{size, tag}` hw-op record header, before its args.
pub const HW_OP_HEADER_LEN: usize = 8;

impl HwOp {
    fn n_args(tag: HwOpTag) -> usize {
        match tag {
            HwOpTag::TimerInit => 3,
            HwOpTag::PinConfigure => 2,
            HwOpTag::PinInterruptConfigure => 2,
            HwOpTag::InitCallback => 3,
            HwOpTag::ManageCallback => 2,
            HwOpTag::PortSetBitsRaw => 1,
            HwOpTag::PortClearBitsRaw => 1,
        }
    }

    /// Total byte length this op occupies on the wire, `{size, tag, args...}`.
    pub fn encoded_len(&self) -> usize {
        let tag = self.tag();
        HW_OP_HEADER_LEN + Self::n_args(tag) * 4
    }

    fn tag(&self) -> HwOpTag {
        match self {
            HwOp::TimerInit { .. } => HwOpTag::TimerInit,
            HwOp::PinConfigure { .. } => HwOpTag::PinConfigure,
            HwOp::PinInterruptConfigure { .. } => HwOpTag::PinInterruptConfigure,
            HwOp::InitCallback { .. } => HwOpTag::InitCallback,
            HwOp::ManageCallback { .. } => HwOpTag::ManageCallback,
            HwOp::PortSetBitsRaw { .. } => HwOpTag::PortSetBitsRaw,
            HwOp::PortClearBitsRaw { .. } => HwOpTag::PortClearBitsRaw,
        }
    }

    /// Parse one hw-op record from `buf`. `buf` must start at the
    /// record's `size` field and contain at least the declared `size`
    /// bytes. Returns the op plus its declared total length.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), UpdateError> {
        if buf.len() < HW_OP_HEADER_LEN {
            return Err(UpdateError::ImageCorrupt);
        }
        let size = read_u32(buf, 0)? as usize;
        let tag_raw = read_u32(buf, 4)?;
        let tag = HwOpTag::from_raw(tag_raw)?;
        let expected_len = HW_OP_HEADER_LEN + Self::n_args(tag) * 4;
        if size != expected_len || buf.len() < size {
            return Err(UpdateError::ImageCorrupt);
        }
        let args = &buf[HW_OP_HEADER_LEN..size];
        let arg = |i: usize| read_u32(args, i * 4);

        let op = match tag {
            HwOpTag::TimerInit => HwOp::TimerInit {
                timer_handle: arg(0)?,
                expiry_fn: arg(1)?,
                stop_fn: arg(2)?,
            },
            HwOpTag::PinConfigure => HwOp::PinConfigure {
                pin: arg(0)?,
                flags: arg(1)?,
            },
            HwOpTag::PinInterruptConfigure => HwOp::PinInterruptConfigure {
                pin: arg(0)?,
                config: arg(1)?,
            },
            HwOpTag::InitCallback => HwOp::InitCallback {
                cb_handle: arg(0)?,
                handler_fn: arg(1)?,
                pin_mask: arg(2)?,
            },
            HwOpTag::ManageCallback => HwOp::ManageCallback {
                cb_handle: arg(0)?,
                add: arg(1)? != 0,
            },
            HwOpTag::PortSetBitsRaw => HwOp::PortSetBitsRaw { mask: arg(0)? },
            HwOpTag::PortClearBitsRaw => HwOp::PortClearBitsRaw { mask: arg(0)? },
        };
        Ok((op, size))
    }

    /// Encode into `out`, which must be at least `self.encoded_len()` bytes.
    pub fn write_into(&self, out: &mut [u8]) {
        let len = self.encoded_len();
        out[0..4].copy_from_slice(&(len as u32).to_le_bytes());
        out[4..8].copy_from_slice(&(self.tag() as u32).to_le_bytes());
        let args: &[u32] = &match self {
            HwOp::TimerInit {
                timer_handle,
                expiry_fn,
                stop_fn,
            } => [*timer_handle, *expiry_fn, *stop_fn],
            HwOp::PinConfigure { pin, flags } => [*pin, *flags, 0],
            HwOp::PinInterruptConfigure { pin, config } => [*pin, *config, 0],
            HwOp::InitCallback {
                cb_handle,
                handler_fn,
                pin_mask,
            } => [*cb_handle, *handler_fn, *pin_mask],
            HwOp::ManageCallback { cb_handle, add } => [*cb_handle, *add as u32, 0],
            HwOp::PortSetBitsRaw { mask } => [*mask, 0, 0],
            HwOp::PortClearBitsRaw { mask } => [*mask, 0, 0],
        };
        let n = Self::n_args(self.tag());
        for (i, v) in args.iter().take(n).enumerate() {
            let off = HW_OP_HEADER_LEN + i * 4;
            out[off..off + 4].copy_from_slice(&v.to_le_bytes());
        }
    }
}
