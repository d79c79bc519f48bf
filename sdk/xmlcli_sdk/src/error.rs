//! Error types for XmlCli access operations.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

/// A specialized [`Result`](core::result::Result) type for access operations.
pub type Result<T> = core::result::Result<T, AccessError>;

/// Access layer error taxonomy.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AccessError {
    /// The capability is not implemented by the selected backend.
    NotSupported(&'static str),
    /// An I/O, memory or MSR operation was requested with an unsupported width.
    InvalidSize(usize),
    /// A device file, mapping, native library or subprocess failed.
    DeviceIo(String),
    /// The mailbox scan was exhausted without a signature match.
    BufferNotFound,
    /// The firmware never produced the first response signature.
    HandshakeTimeout,
    /// The first response signature matched but the second did not.
    HandshakeMismatch,
    /// The interface nesting state was violated.
    SessionState(SessionFault),
    /// A named configuration option was unknown, missing or malformed.
    Configuration(String),
}

/// Ways the interface nesting stack of an access session can be misused.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SessionFault {
    /// `close_interface` was called with no matching `init_interface`.
    Unbalanced,
    /// `init_interface` was called beyond the supported nesting depth.
    NestingOverflow,
}

impl AccessError {
    /// Wraps a lower level failure as a [`AccessError::DeviceIo`] with some context.
    pub fn device_io(context: &str, err: impl fmt::Display) -> Self {
        AccessError::DeviceIo(format!("{context}: {err}"))
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::NotSupported(capability) => write!(f, "{capability} is not supported by this access method"),
            AccessError::InvalidSize(size) => write!(f, "Invalid access size: {size}"),
            AccessError::DeviceIo(msg) => write!(f, "Device I/O error: {msg}"),
            AccessError::BufferNotFound => write!(f, "Interface buffer not found"),
            AccessError::HandshakeTimeout => write!(f, "No response from firmware"),
            AccessError::HandshakeMismatch => write!(f, "Firmware response was incomplete"),
            AccessError::SessionState(SessionFault::Unbalanced) => {
                write!(f, "close_interface called without a matching init_interface")
            }
            AccessError::SessionState(SessionFault::NestingOverflow) => {
                write!(f, "Interface nesting depth exceeded")
            }
            AccessError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for AccessError {}

impl From<std::io::Error> for AccessError {
    fn from(err: std::io::Error) -> Self {
        AccessError::DeviceIo(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_maps_to_device_io() {
        let err: AccessError = std::io::Error::new(std::io::ErrorKind::NotFound, "no /dev/mem").into();
        assert_eq!(err, AccessError::DeviceIo("no /dev/mem".to_string()));
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(AccessError::InvalidSize(8).to_string(), "Invalid access size: 8");
        assert_eq!(
            AccessError::NotSupported("read_msr").to_string(),
            "read_msr is not supported by this access method"
        );
        assert_eq!(
            AccessError::device_io("mmap", "permission denied").to_string(),
            "Device I/O error: mmap: permission denied"
        );
    }
}
