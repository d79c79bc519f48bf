//! Backend configuration
//!
//! Each access method reads its settings from one section of [`AccessConfiguration`]. The sections start from
//! their [`Default`]s and can be adjusted one named option at a time with [`AccessConfiguration::set_option`], which
//! is how settings coming from a user configuration file are applied.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::path::PathBuf;

use crate::error::{AccessError, Result};

/// Settings for the physical memory device backend.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct DirectMemoryConfiguration {
    /// Device file exposing physical memory.
    pub memory_file: PathBuf,
    /// Optional helper library providing `read_port`/`write_port`.
    pub lib_port: Option<PathBuf>,
    /// Optional helper library providing `mem_read`/`mem_write`.
    pub lib_mem: Option<PathBuf>,
    /// Route memory accesses through `lib_mem` instead of mapping `memory_file`.
    pub external_mem: bool,
}

impl Default for DirectMemoryConfiguration {
    fn default() -> Self {
        Self { memory_file: PathBuf::from("/dev/mem"), lib_port: None, lib_mem: None, external_mem: false }
    }
}

/// Settings for the external register read/write utility backend.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct ExternalToolConfiguration {
    pub rw_exe: PathBuf,
    /// Scratch file used for block reads.
    pub temp_data_bin: PathBuf,
    /// Log file used for port reads.
    pub result_text: PathBuf,
}

impl Default for ExternalToolConfiguration {
    fn default() -> Self {
        Self {
            rw_exe: PathBuf::from("Rw.exe"),
            temp_data_bin: PathBuf::from("TmpData.bin"),
            result_text: PathBuf::from("RwResult.txt"),
        }
    }
}

/// Configuration for every backend, passed explicitly at backend construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct AccessConfiguration {
    pub direct_memory: DirectMemoryConfiguration,
    pub external_tool: ExternalToolConfiguration,
}

impl AccessConfiguration {
    /// Applies one named option.
    ///
    /// Option names are case insensitive. An empty value clears the optional library paths.
    ///
    /// ## Errors
    ///
    /// Returns [`AccessError::Configuration`] for an unknown option or a value that is not a boolean where one is
    /// expected.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "memory_file" => self.direct_memory.memory_file = PathBuf::from(value),
            "lib_port" => self.direct_memory.lib_port = optional_path(value),
            "lib_mem" => self.direct_memory.lib_mem = optional_path(value),
            "external_mem" => self.direct_memory.external_mem = parse_bool(name, value)?,
            "rw_exe" => self.external_tool.rw_exe = PathBuf::from(value),
            "temp_data_bin" => self.external_tool.temp_data_bin = PathBuf::from(value),
            "result_text" => self.external_tool.result_text = PathBuf::from(value),
            _ => return Err(AccessError::Configuration(format!("unknown option '{name}'"))),
        }
        Ok(())
    }

    /// Applies a sequence of named options, stopping at the first failure.
    pub fn apply<'a, I>(&mut self, options: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        options.into_iter().try_for_each(|(name, value)| self.set_option(name, value))
    }
}

fn optional_path(value: &str) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AccessError::Configuration(format!("option '{name}' expects a boolean, got '{value}'"))),
    }
}
