//! XmlCli SDK
//!
//! Shared building blocks for the XmlCli hardware access layer:
//!
//! - [`error`]: the [`AccessError`](error::AccessError) taxonomy returned by every access operation.
//! - [`base`]: page geometry and little-endian byte helpers used when decomposing memory and port accesses.
//! - [`config`]: the per-backend configuration resolved from named options before a backend is constructed.
//! - [`log`]: a `log` crate logger with selectable output formats.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
pub mod base;
pub mod config;
pub mod error;
pub mod log;

pub use error::{AccessError, Result, SessionFault};
