//! Typed bindings to the native port and memory helper libraries.
//!
//! The helper libraries export a small C interface:
//!
//! ```c
//! uint8_t *read_port(uint16_t port, uint8_t size);          // malloc'd buffer of `size` bytes, NULL on failure
//! int      write_port(uint16_t port, uint8_t size, uint32_t value);
//! int      mem_read(uint64_t address, void *dest, size_t size);
//! int      mem_write(uint64_t address, const void *src, size_t size);
//! ```
//!
//! Every status return is 0 on success.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::path::Path;

use libloading::Library;
use xmlcli_sdk::{base, AccessError, Result};

type ReadPortFn = unsafe extern "C" fn(u16, u8) -> *mut u8;
type WritePortFn = unsafe extern "C" fn(u16, u8, u32) -> i32;
type MemReadFn = unsafe extern "C" fn(u64, *mut u8, usize) -> i32;
type MemWriteFn = unsafe extern "C" fn(u64, *const u8, usize) -> i32;

fn load(path: &Path) -> Result<Library> {
    // Safety: loading runs the library initializers; the helper libraries have none beyond the C runtime.
    unsafe { Library::new(path) }.map_err(|err| AccessError::device_io(&path.display().to_string(), err))
}

fn symbol<T: Copy>(library: &Library, name: &[u8]) -> Result<T> {
    // Safety: the caller names the exact C signature of the export as `T`.
    let symbol = unsafe { library.get::<T>(name) }
        .map_err(|err| AccessError::device_io(&String::from_utf8_lossy(name), err))?;
    Ok(*symbol)
}

/// The port helper library.
pub(crate) struct PortLibrary {
    read_port: ReadPortFn,
    write_port: WritePortFn,
    // Keeps the function pointers above valid.
    _library: Library,
}

impl PortLibrary {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let library = load(path)?;
        let read_port = symbol::<ReadPortFn>(&library, b"read_port\0")?;
        let write_port = symbol::<WritePortFn>(&library, b"write_port\0")?;
        log::info!(target: "xmlcli_access", "Loaded port library {}", path.display());
        Ok(Self { read_port, write_port, _library: library })
    }

    pub(crate) fn read(&self, port: u16, size: usize) -> Result<u32> {
        base::validate_port_size(size)?;
        // Safety: `read_port` returns NULL or a malloc'd buffer of `size` bytes that the caller owns.
        let buffer = unsafe { (self.read_port)(port, size as u8) };
        if buffer.is_null() {
            return Err(AccessError::DeviceIo(format!("read_port({port:#x}, {size}) failed")));
        }

        let mut bytes = [0u8; 4];
        // Safety: `buffer` holds `size` readable bytes and is released exactly once here.
        unsafe {
            core::ptr::copy_nonoverlapping(buffer, bytes.as_mut_ptr(), size);
            libc::free(buffer as *mut libc::c_void);
        }
        Ok(base::bytes_to_int(&bytes[..size]) as u32)
    }

    pub(crate) fn write(&self, port: u16, size: usize, value: u32) -> Result<()> {
        base::validate_port_size(size)?;
        // Safety: plain value arguments only.
        let status = unsafe { (self.write_port)(port, size as u8, value) };
        match status {
            0 => Ok(()),
            status => Err(AccessError::DeviceIo(format!("write_port({port:#x}, {size}) returned {status}"))),
        }
    }
}

/// The memory helper library.
pub(crate) struct MemoryLibrary {
    mem_read: MemReadFn,
    mem_write: MemWriteFn,
    _library: Library,
}

impl MemoryLibrary {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let library = load(path)?;
        let mem_read = symbol::<MemReadFn>(&library, b"mem_read\0")?;
        let mem_write = symbol::<MemWriteFn>(&library, b"mem_write\0")?;
        log::info!(target: "xmlcli_access", "Loaded memory library {}", path.display());
        Ok(Self { mem_read, mem_write, _library: library })
    }

    pub(crate) fn read(&self, address: u64, dest: &mut [u8]) -> Result<()> {
        // Safety: `dest` is valid for `dest.len()` bytes for the duration of the call.
        let status = unsafe { (self.mem_read)(address, dest.as_mut_ptr(), dest.len()) };
        match status {
            0 => Ok(()),
            status => Err(AccessError::DeviceIo(format!("mem_read({address:#x}, {}) returned {status}", dest.len()))),
        }
    }

    pub(crate) fn write(&self, address: u64, src: &[u8]) -> Result<()> {
        // Safety: `src` is valid for `src.len()` bytes for the duration of the call.
        let status = unsafe { (self.mem_write)(address, src.as_ptr(), src.len()) };
        match status {
            0 => Ok(()),
            status => Err(AccessError::DeviceIo(format!("mem_write({address:#x}, {}) returned {status}", src.len()))),
        }
    }
}
