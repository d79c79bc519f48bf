//! Single page mappings of a physical memory device file.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::ptr::NonNull;
use std::{
    fs::{File, OpenOptions},
    io,
    os::unix::{fs::OpenOptionsExt, io::AsRawFd},
    path::Path,
};

use xmlcli_sdk::{base::PAGE_SIZE, AccessError, Result};

/// Opens the memory device for synchronous read/write access.
pub(crate) fn open_device(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_SYNC)
        .open(path)
        .map_err(|err| AccessError::device_io(&path.display().to_string(), err))
}

/// One page of the device file mapped shared and read/write. Unmapped on drop.
pub(crate) struct PageMapping {
    ptr: NonNull<u8>,
    len: usize,
}

impl PageMapping {
    /// Maps the page starting at the page-aligned offset `page` of `file`.
    pub(crate) fn new(file: &File, page: u64) -> Result<Self> {
        let len = PAGE_SIZE as usize;
        let offset = libc::off_t::try_from(page)
            .map_err(|_| AccessError::DeviceIo(format!("page {page:#x} is beyond the device offset range")))?;

        // Safety:
        // With a NULL address the kernel picks a location that does not conflict with existing mappings. The
        // mapping only refers to `file` through its descriptor and stays valid after the descriptor is closed.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                offset,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(AccessError::device_io("mmap", io::Error::last_os_error()));
        }
        let ptr = NonNull::new(ptr as *mut u8).ok_or_else(|| AccessError::DeviceIo("mmap returned NULL".into()))?;

        Ok(Self { ptr, len })
    }

    /// Copies `dest.len()` bytes starting at `offset` within the page.
    pub(crate) fn read(&self, offset: usize, dest: &mut [u8]) {
        debug_assert!(offset + dest.len() <= self.len);
        for (index, byte) in dest.iter_mut().enumerate() {
            // Safety: the range lies within the mapped page.
            *byte = unsafe { self.ptr.as_ptr().add(offset + index).read_volatile() };
        }
    }

    /// Copies `src` into the page starting at `offset`.
    pub(crate) fn write(&self, offset: usize, src: &[u8]) {
        debug_assert!(offset + src.len() <= self.len);
        for (index, byte) in src.iter().enumerate() {
            // Safety: the range lies within the mapped page.
            unsafe { self.ptr.as_ptr().add(offset + index).write_volatile(*byte) };
        }
    }
}

impl Drop for PageMapping {
    fn drop(&mut self) {
        // Safety: `ptr` and `len` describe the mapping created in `new`, which no other value refers to.
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}
