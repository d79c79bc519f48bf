//! Page geometry and byte order helpers.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use crate::error::{AccessError, Result};

/// Size of a 4KB page.
pub const SIZE_4KB: usize = 0x1000;

/// Page size used to split physical memory accesses.
pub const PAGE_SIZE: u64 = SIZE_4KB as u64;

/// Mask selecting the page-aligned part of an address.
pub const PAGE_MASK: u64 = !(PAGE_SIZE - 1);

/// Returns the page-aligned base of `address`.
pub const fn page_base(address: u64) -> u64 {
    address & PAGE_MASK
}

/// Returns the offset of `address` within its page.
pub const fn page_offset(address: u64) -> usize {
    (address & (PAGE_SIZE - 1)) as usize
}

/// Checks a scalar memory access width.
pub fn validate_scalar_size(size: usize) -> Result<()> {
    match size {
        1 | 2 | 4 | 8 => Ok(()),
        _ => Err(AccessError::InvalidSize(size)),
    }
}

/// Checks a port I/O access width. Eight byte port accesses do not exist.
pub fn validate_port_size(size: usize) -> Result<()> {
    match size {
        1 | 2 | 4 => Ok(()),
        _ => Err(AccessError::InvalidSize(size)),
    }
}

/// Interprets up to eight bytes as a little-endian integer.
pub fn bytes_to_int(data: &[u8]) -> u64 {
    data.iter().take(8).rev().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

/// Encodes the low `size` bytes of `value` in little-endian order.
pub fn int_to_bytes(value: u64, size: usize) -> Vec<u8> {
    value.to_le_bytes().iter().copied().take(size).collect()
}

/// Truncates `value` to the width of a `size` byte access.
pub const fn truncate_to_size(value: u64, size: usize) -> u64 {
    if size >= 8 {
        value
    } else {
        value & ((1u64 << (size * 8)) - 1)
    }
}
