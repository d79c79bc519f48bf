//! Decomposition of raw memory requests into page-sized pieces.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use xmlcli_sdk::{
    base::{page_base, page_offset, PAGE_SIZE},
    AccessError, Result,
};

/// A raw read or write request over `length` bytes starting at `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryWindow {
    pub base: u64,
    pub length: usize,
}

/// The part of a [`MemoryWindow`] that falls within a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageChunk {
    /// Page-aligned address of the page.
    pub page: u64,
    /// Offset of the chunk within the page.
    pub offset: usize,
    /// Number of bytes of the chunk.
    pub length: usize,
    /// Offset of the chunk within the window.
    pub position: usize,
}

impl MemoryWindow {
    pub const fn new(base: u64, length: usize) -> Self {
        Self { base, length }
    }

    /// Splits the window at page boundaries, in ascending address order.
    ///
    /// The result is a leading partial page, any number of full pages and a trailing partial page. Leading and
    /// trailing chunks are omitted when they would be empty.
    ///
    /// Fails with [`AccessError::InvalidSize`] when the window runs past the end of the address space.
    pub fn chunks(&self) -> Result<Chunks> {
        let end = self.base.checked_add(self.length as u64).ok_or(AccessError::InvalidSize(self.length))?;
        Ok(Chunks { current: self.base, end, position: 0 })
    }
}

/// Iterator over the [`PageChunk`]s of a [`MemoryWindow`].
pub struct Chunks {
    current: u64,
    end: u64,
    position: usize,
}

impl Iterator for Chunks {
    type Item = PageChunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.end {
            return None;
        }

        let page = page_base(self.current);
        // The last page of the address space has no successor.
        let chunk_end = page.checked_add(PAGE_SIZE).map_or(self.end, |next| next.min(self.end));
        let chunk = PageChunk {
            page,
            offset: page_offset(self.current),
            length: (chunk_end - self.current) as usize,
            position: self.position,
        };

        self.position += chunk.length;
        self.current = chunk_end;
        Some(chunk)
    }
}
