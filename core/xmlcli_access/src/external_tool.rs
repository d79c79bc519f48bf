//! Access through an external register read/write utility.
//!
//! Every operation runs the utility once, passing its command script as an argument (never through a shell).
//! Block reads come back through a scratch data file and port reads through the utility log file; both are
//! removed once the operation is over.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::{
    ffi::OsString,
    fs,
    io,
    path::{Path, PathBuf},
    process::Command,
    thread,
    time::Duration,
};

use xmlcli_sdk::{base, config::ExternalToolConfiguration, AccessError, Result};

use crate::backend::{scalar_from_block, AccessBackend};

/// Removes the file at the wrapped path when dropped.
struct ScratchFile<'a>(&'a Path);

impl Drop for ScratchFile<'_> {
    fn drop(&mut self) {
        match fs::remove_file(self.0) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => log::warn!(target: "xmlcli_access", "Failed to remove {}: {err}", self.0.display()),
        }
    }
}

/// Width suffix of the utility's sized commands.
fn width(size: usize) -> &'static str {
    match size {
        2 => "16",
        4 => "32",
        _ => "",
    }
}

/// Builds the utility command line for one command script.
fn tool_args(log_file: Option<&Path>, command: &str) -> Vec<OsString> {
    let mut args = vec![OsString::from("/Nologo"), OsString::from("/Min")];
    if let Some(log_file) = log_file {
        let mut arg = OsString::from("/LogFile=");
        arg.push(log_file);
        args.push(arg);
    }
    args.push(OsString::from(format!("/Command={command}; RwExit")));
    args
}

fn save_command(filename: &Path, address: u64, size: usize) -> String {
    format!("SAVE {} Memory 0x{address:x} 0x{size:x}", filename.display())
}

fn load_command(filename: &Path, address: u64) -> String {
    format!("LOAD {} Memory 0x{address:x}", filename.display())
}

/// Memory write commands; an 8 byte write becomes two 32 bit writes.
fn write_command(address: u64, size: usize, value: u64) -> String {
    let value = base::truncate_to_size(value, size);
    if size == 8 {
        format!("W32 0x{address:x} 0x{:x}; W32 0x{:x} 0x{:x}", value & 0xFFFF_FFFF, address + 4, value >> 32)
    } else {
        format!("W{} 0x{address:x} 0x{value:x}", width(size))
    }
}

/// Keeps the first `size` bytes the tool saved.
fn saved_block(mut data: Vec<u8>, size: usize) -> Result<Vec<u8>> {
    if data.len() < size {
        return Err(AccessError::DeviceIo(format!("expected {size} bytes, the tool saved {}", data.len())));
    }
    data.truncate(size);
    Ok(data)
}

fn in_command(port: u16, size: usize) -> String {
    format!("I{} 0x{port:x}", width(size))
}

fn out_command(port: u16, size: usize, value: u32) -> String {
    format!("O{} 0x{port:x} 0x{value:x}", width(size))
}

/// Finds the value of `port` in the utility log, formatted as `In Port 0x<port> = 0x<value>`.
pub fn parse_in_port(log: &str, port: u16) -> Option<u32> {
    let expected = format!("In Port 0x{port:x}");
    log.lines().find_map(|line| {
        let (name, value) = line.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case(&expected) {
            return None;
        }
        let value = value.trim();
        let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")).unwrap_or(value);
        u32::from_str_radix(digits, 16).ok()
    })
}

/// [`AccessBackend`] running an external register read/write utility.
pub struct ExternalToolBackend {
    config: ExternalToolConfiguration,
}

impl ExternalToolBackend {
    pub fn new(config: &ExternalToolConfiguration) -> Self {
        log::debug!(target: "xmlcli_access", "External tool access through {}", config.rw_exe.display());
        Self { config: config.clone() }
    }

    fn run(&self, log_file: Option<&Path>, command: &str) -> Result<()> {
        log::trace!(target: "xmlcli_access", "{} {command}", self.config.rw_exe.display());
        let status = Command::new(&self.config.rw_exe)
            .args(tool_args(log_file, command))
            .status()
            .map_err(|err| AccessError::device_io(&self.config.rw_exe.display().to_string(), err))?;

        if status.success() {
            Ok(())
        } else {
            Err(AccessError::DeviceIo(format!("'{command}' failed with {status}")))
        }
    }

    fn scratch(&self) -> PathBuf {
        self.config.temp_data_bin.clone()
    }
}

impl AccessBackend for ExternalToolBackend {
    fn name(&self) -> &'static str {
        "winrwe"
    }

    fn halt_cpu(&mut self, delay: Duration) -> Result<()> {
        thread::sleep(delay);
        Ok(())
    }

    fn run_cpu(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_cpu_running(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn mem_read(&mut self, address: u64, size: usize) -> Result<u64> {
        base::validate_scalar_size(size)?;
        let data = self.mem_block(address, size)?;
        scalar_from_block(&data, size)
    }

    fn mem_write(&mut self, address: u64, size: usize, value: u64) -> Result<()> {
        base::validate_scalar_size(size)?;
        self.run(None, &write_command(address, size, value))
    }

    fn mem_block(&mut self, address: u64, size: usize) -> Result<Vec<u8>> {
        let scratch = self.scratch();
        let _guard = ScratchFile(&scratch);
        self.run(None, &save_command(&scratch, address, size))?;
        saved_block(fs::read(&scratch)?, size)
    }

    fn mem_block_write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        let scratch = self.scratch();
        let _guard = ScratchFile(&scratch);
        fs::write(&scratch, data)?;
        self.run(None, &load_command(&scratch, address))
    }

    fn mem_save(&mut self, filename: &Path, address: u64, size: usize) -> Result<()> {
        self.run(None, &save_command(filename, address, size))
    }

    fn load_data(&mut self, filename: &Path, address: u64) -> Result<()> {
        self.run(None, &load_command(filename, address))
    }

    fn read_io(&mut self, port: u16, size: usize) -> Result<u32> {
        base::validate_port_size(size)?;
        let log_file = self.config.result_text.clone();
        let _guard = ScratchFile(&log_file);
        self.run(Some(&log_file), &in_command(port, size))?;

        let log = fs::read_to_string(&log_file)?;
        Ok(parse_in_port(&log, port).unwrap_or_else(|| {
            log::warn!(target: "xmlcli_access", "Port {port:#x} is missing from the tool log, reading 0");
            0
        }))
    }

    fn write_io(&mut self, port: u16, size: usize, value: u32) -> Result<()> {
        base::validate_port_size(size)?;
        self.run(None, &out_command(port, size, value))
    }
}
