//! Challenge/response handshake with the firmware
//!
//! Once the interface buffer is located, the host proves it may unlock XmlCli by answering the key the firmware
//! left in the buffer:
//!
//! 1. Read the 32 byte key at [`KEY_OFFSET`] and write `HMAC-SHA256(key, CHALLENGE)` at [`DIGEST_OFFSET`].
//! 2. Raise the XmlCli software SMI.
//! 3. Let the CPU run and poll [`DIGEST_OFFSET`] for [`RESPONSE_SIGNATURE1`], up to three times.
//! 4. Check [`RESPONSE_SIGNATURE2`] right after it and clear both on success.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use ring::hmac;
use xmlcli_access::AccessSession;
use xmlcli_sdk::{AccessError, Result};

use crate::{config::HandshakeConfiguration, mailbox::MailboxLocator};

pub const GUID_SIZE: u64 = 0x10;
pub const KEY_OFFSET: u64 = GUID_SIZE;
pub const KEY_SIZE: usize = 0x20;
pub const DIGEST_OFFSET: u64 = KEY_OFFSET + KEY_SIZE as u64;
pub const DIGEST_SIZE: usize = 0x20;
pub const RESPONSE_SIGNATURE_SIZE: usize = 8;
pub const RESPONSE_SIGNATURE1: u64 = 0xB05A_DC0D_3EB0_079A;
pub const RESPONSE_SIGNATURE2: u64 = 0xD095_BE11_0E9A_B1ED;

/// Message authenticated with the firmware key.
pub const CHALLENGE: [u8; 16] =
    [0xee, 0x83, 0x84, 0x5b, 0xf6, 0x0a, 0xa0, 0x4c, 0x7c, 0x80, 0x31, 0x0d, 0xef, 0xd9, 0x4a, 0x32];

/// Where a handshake stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Searching,
    KeyExchanged { buffer: u64 },
    SmiSent { buffer: u64 },
    PollingResponse { buffer: u64, attempt: usize },
    Succeeded { buffer: u64 },
    Failed(AccessError),
}

/// Answers the firmware challenge with `key`.
pub fn compute_digest(key: &[u8]) -> [u8; DIGEST_SIZE] {
    let tag = hmac::sign(&hmac::Key::new(hmac::HMAC_SHA256, key), &CHALLENGE);
    let mut digest = [0u8; DIGEST_SIZE];
    digest.copy_from_slice(tag.as_ref());
    digest
}

/// Runs one handshake over a borrowed session.
pub struct HandshakeEngine<'a> {
    session: &'a mut AccessSession,
    config: &'a HandshakeConfiguration,
    state: HandshakeState,
}

impl<'a> HandshakeEngine<'a> {
    pub fn new(session: &'a mut AccessSession, config: &'a HandshakeConfiguration) -> Self {
        Self { session, config, state: HandshakeState::Searching }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Locates the interface buffer from `start` and runs the handshake, returning the buffer address.
    ///
    /// Every failure is also recorded as [`HandshakeState::Failed`].
    pub fn run(&mut self, start: u64) -> Result<u64> {
        let result = self.authenticate(start);
        if let Err(err) = &result {
            self.state = HandshakeState::Failed(err.clone());
        }
        result
    }

    fn authenticate(&mut self, start: u64) -> Result<u64> {
        let buffer = MailboxLocator::new(self.config).find_interface_buffer(&mut **self.session, start)?;

        let key = self.session.mem_block(buffer + KEY_OFFSET, KEY_SIZE)?;
        let digest = compute_digest(&key);
        self.session.mem_block_write(buffer + DIGEST_OFFSET, &digest)?;
        self.state = HandshakeState::KeyExchanged { buffer };

        log::info!(target: "handshake", "Enabling XmlCli Support");
        self.session.trigger_smi(self.config.smi_value)?;
        self.state = HandshakeState::SmiSent { buffer };

        let mut response = 0;
        for (index, delay) in self.config.poll_delays.iter().enumerate() {
            self.state = HandshakeState::PollingResponse { buffer, attempt: index + 1 };
            self.session.run_cpu()?;
            self.session.halt_cpu(*delay)?;
            response = self.session.mem_read(buffer + DIGEST_OFFSET, RESPONSE_SIGNATURE_SIZE)?;
            if response == RESPONSE_SIGNATURE1 {
                break;
            }
            log::debug!(target: "handshake", "No response yet after attempt {}", index + 1);
        }

        let confirmation =
            self.session.mem_read(buffer + DIGEST_OFFSET + RESPONSE_SIGNATURE_SIZE as u64, RESPONSE_SIGNATURE_SIZE)?;
        if response != RESPONSE_SIGNATURE1 {
            return Err(AccessError::HandshakeTimeout);
        }
        if confirmation != RESPONSE_SIGNATURE2 {
            log::debug!(target: "handshake", "Unexpected confirmation {confirmation:#018x}");
            return Err(AccessError::HandshakeMismatch);
        }

        self.session.mem_write(buffer + DIGEST_OFFSET, RESPONSE_SIGNATURE_SIZE, 0)?;
        self.session.mem_write(buffer + DIGEST_OFFSET + RESPONSE_SIGNATURE_SIZE as u64, RESPONSE_SIGNATURE_SIZE, 0)?;
        self.state = HandshakeState::Succeeded { buffer };
        Ok(buffer)
    }
}
