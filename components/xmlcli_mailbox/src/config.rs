//! Handshake tuning
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::time::Duration;

/// Number of times the response field is polled after the SMI.
pub const POLL_ATTEMPTS: usize = 3;

/// Timing and threshold values used while locating the mailbox and running the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfiguration {
    /// How long the CPU runs before each poll of the response field.
    pub poll_delays: [Duration; POLL_ATTEMPTS],
    /// Software SMI raised once the digest is written.
    pub smi_value: u8,
    /// Lowest mailbox spec version that may redirect a disabled interface.
    pub min_redirect_version: u32,
    /// Mailbox pointers above this value are absolute, the others relative to the shared mailbox.
    pub absolute_pointer_threshold: u32,
}

impl Default for HandshakeConfiguration {
    fn default() -> Self {
        Self {
            poll_delays: [Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(4)],
            smi_value: 0xF6,
            min_redirect_version: 0x800,
            absolute_pointer_threshold: 0xFFFF,
        }
    }
}

impl HandshakeConfiguration {
    /// Same values without any waiting, for simulated targets.
    pub fn without_delays() -> Self {
        Self { poll_delays: [Duration::ZERO; POLL_ATTEMPTS], ..Default::default() }
    }
}
