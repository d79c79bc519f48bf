//! Mailbox discovery
//!
//! Firmware advertises the XmlCli mailbox through two CMOS bytes holding bits 16..32 of its address. The address
//! either points at the interface buffer region directly, or at a shared mailbox whose header redirects to it. The
//! interface buffer itself is found by scanning for the signature derived from [`INTERFACE_BUFFER_GUID`].
//!
//! ## Shared mailbox header
//!
//! | Offset | Size | Content |
//! |--------|------|---------|
//! | 0x00 | 4 | [`SHARED_MAILBOX_SIGNATURE`] |
//! | 0x08 | 4 | [`SHARED_MAILBOX_SIGNATURE`] |
//! | 0x14 | 1 | spec version, minor |
//! | 0x15 | 2 | spec version, major |
//! | 0x17 | 1 | spec version, release (low nibble) |
//! | 0x20 | 4 | [`LEGACY_MAILBOX_SIGNATURE`] or [`XMLCLI_DISABLED_SIGNATURE`] |
//! | 0x24 | 4 | legacy mailbox pointer |
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use r_efi::efi;
use xmlcli_access::AccessBackend;
use xmlcli_sdk::{AccessError, Result};

use crate::config::HandshakeConfiguration;

/// Primary CMOS index/data ports.
pub const CMOS_INDEX_PORT: u16 = 0x72;
pub const CMOS_DATA_PORT: u16 = 0x73;
/// Fallback CMOS index/data ports.
pub const CMOS_FALLBACK_INDEX_PORT: u16 = 0x70;
pub const CMOS_FALLBACK_DATA_PORT: u16 = 0x71;

/// CMOS registers holding address bits 16..24 and 24..32, in the primary bank.
pub const CMOS_ADDRESS_REGISTERS: [u8; 2] = [0xF0, 0xF1];
/// CMOS registers holding address bits 16..24 and 24..32, in the fallback bank.
pub const CMOS_FALLBACK_ADDRESS_REGISTERS: [u8; 2] = [0x78, 0x79];

pub const SHARED_MAILBOX_SIGNATURE: u64 = 0xBA5E_BA11;
pub const SHARED_MAILBOX_SIG1_OFFSET: u64 = 0x00;
pub const SHARED_MAILBOX_SIG2_OFFSET: u64 = 0x08;
pub const SPEC_VERSION_MINOR_OFFSET: u64 = 0x14;
pub const SPEC_VERSION_MAJOR_OFFSET: u64 = 0x15;
pub const SPEC_VERSION_RELEASE_OFFSET: u64 = 0x17;
pub const LEGACY_MAILBOX_SIGNATURE_OFFSET: u64 = 0x20;
pub const LEGACY_MAILBOX_POINTER_OFFSET: u64 = 0x24;
pub const LEGACY_MAILBOX_SIGNATURE: u64 = 0x5A7E_CAFE;
pub const XMLCLI_DISABLED_SIGNATURE: u64 = 0xCD15_AB1E;
/// Offset of the interface buffer address within the legacy mailbox.
pub const LEGACY_TEMP_ADDRESS_OFFSET: u64 = 0x60;

/// Interface buffers are aligned on this stride.
pub const SCAN_STRIDE: usize = 0x40;
/// Scanned offsets stay below this bound.
pub const SCAN_WINDOW: u64 = 0xFFFF;

/// GUID at the start of the XmlCli interface buffer.
pub const INTERFACE_BUFFER_GUID: efi::Guid =
    efi::Guid::from_fields(0xA8CB_BBEA, 0xF37C, 0x4DA4, 0x5E, 0x81, &[0x68, 0x4F, 0x6F, 0xC5, 0x12, 0x49]);

/// The two 64 bit words a GUID occupies in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxSignature {
    words: [u64; 2],
}

impl MailboxSignature {
    pub fn from_guid(guid: &efi::Guid) -> Self {
        let bytes = guid.as_bytes();
        let word = |range: core::ops::Range<usize>| {
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[range]);
            u64::from_le_bytes(word)
        };
        Self { words: [word(0..8), word(8..16)] }
    }

    pub fn words(&self) -> [u64; 2] {
        self.words
    }

    pub fn matches(&self, first: u64, second: u64) -> bool {
        self.words == [first, second]
    }
}

/// Version of the mailbox layout reported by the shared mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CliSpecVersion {
    pub major: u16,
    pub minor: u8,
    pub release: u8,
}

impl fmt::Display for CliSpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.release)
    }
}

/// Resolves where the interface buffer lives.
#[derive(Debug, Clone)]
pub struct MailboxLocator {
    signature: MailboxSignature,
    min_redirect_version: u32,
    absolute_pointer_threshold: u32,
}

impl Default for MailboxLocator {
    fn default() -> Self {
        Self::new(&HandshakeConfiguration::default())
    }
}

impl MailboxLocator {
    pub fn new(config: &HandshakeConfiguration) -> Self {
        Self {
            signature: MailboxSignature::from_guid(&INTERFACE_BUFFER_GUID),
            min_redirect_version: config.min_redirect_version,
            absolute_pointer_threshold: config.absolute_pointer_threshold,
        }
    }

    /// Reads the mailbox address from CMOS, using the fallback bank when the primary one is blank.
    pub fn cmos_address(&self, backend: &mut dyn AccessBackend) -> Result<u64> {
        let mut bytes = [0u64; 2];
        for (byte, register) in bytes.iter_mut().zip(CMOS_ADDRESS_REGISTERS) {
            backend.write_io(CMOS_INDEX_PORT, 1, u32::from(register))?;
            *byte = u64::from(backend.read_io(CMOS_DATA_PORT, 4)? & 0xFF);
        }

        if bytes == [0xFF, 0xFF] || bytes == [0x00, 0x00] {
            log::debug!(target: "mailbox", "Primary CMOS bank is blank, using the fallback bank");
            for (byte, register) in bytes.iter_mut().zip(CMOS_FALLBACK_ADDRESS_REGISTERS) {
                backend.write_io(CMOS_FALLBACK_INDEX_PORT, 1, u32::from(register))?;
                *byte = u64::from(backend.read_io(CMOS_FALLBACK_DATA_PORT, 1)? & 0xFF);
            }
        }

        let address = (bytes[1] << 24) + (bytes[0] << 16);
        log::debug!(target: "mailbox", "CMOS mailbox address {address:#x}");
        Ok(address)
    }

    /// Returns whether a shared mailbox header starts at `address`.
    pub fn is_shared_mailbox(&self, backend: &mut dyn AccessBackend, address: u64) -> Result<bool> {
        Ok(backend.mem_read(address + SHARED_MAILBOX_SIG1_OFFSET, 4)? == SHARED_MAILBOX_SIGNATURE
            && backend.mem_read(address + SHARED_MAILBOX_SIG2_OFFSET, 4)? == SHARED_MAILBOX_SIGNATURE)
    }

    pub fn spec_version(&self, backend: &mut dyn AccessBackend, address: u64) -> Result<CliSpecVersion> {
        Ok(CliSpecVersion {
            minor: backend.mem_read(address + SPEC_VERSION_MINOR_OFFSET, 1)? as u8,
            major: backend.mem_read(address + SPEC_VERSION_MAJOR_OFFSET, 2)? as u16,
            release: (backend.mem_read(address + SPEC_VERSION_RELEASE_OFFSET, 1)? & 0xF) as u8,
        })
    }

    fn follow_pointer(&self, base: u64, pointer: u64) -> u64 {
        if pointer > u64::from(self.absolute_pointer_threshold) {
            pointer
        } else {
            base + pointer
        }
    }

    /// Resolves the scan start used to enable XmlCli.
    ///
    /// A shared mailbox of a recent enough version whose interface is marked disabled redirects to the mailbox
    /// its pointer names. Anything else leaves `address` as is.
    pub fn resolve_for_enable(&self, backend: &mut dyn AccessBackend, address: u64) -> Result<u64> {
        if !self.is_shared_mailbox(backend, address)? {
            return Ok(address);
        }

        let version = self.spec_version(backend, address)?;
        log::info!(target: "mailbox", "Shared mailbox at {address:#x}, CLI spec version {version}");

        let raw_version = backend.mem_read(address + SPEC_VERSION_MINOR_OFFSET, 4)?;
        if raw_version < u64::from(self.min_redirect_version) {
            return Ok(address);
        }
        if backend.mem_read(address + LEGACY_MAILBOX_SIGNATURE_OFFSET, 4)? != XMLCLI_DISABLED_SIGNATURE {
            return Ok(address);
        }

        let pointer = backend.mem_read(address + LEGACY_MAILBOX_POINTER_OFFSET, 4)?;
        let target = self.follow_pointer(address, pointer);
        log::debug!(target: "mailbox", "XmlCli interface disabled, redirecting to {target:#x}");
        Ok(target)
    }

    /// Resolves the scan start used to validate a request, following the legacy mailbox indirection.
    pub fn resolve_for_validation(&self, backend: &mut dyn AccessBackend, address: u64) -> Result<u64> {
        if !self.is_shared_mailbox(backend, address)?
            || backend.mem_read(address + LEGACY_MAILBOX_SIGNATURE_OFFSET, 4)? != LEGACY_MAILBOX_SIGNATURE
        {
            return Ok(address);
        }

        let offset = backend.mem_read(address + LEGACY_MAILBOX_POINTER_OFFSET, 4)?;
        let legacy_mailbox = self.follow_pointer(address, offset);
        let target = backend.mem_read(legacy_mailbox + LEGACY_TEMP_ADDRESS_OFFSET, 4)?;
        log::debug!(
            target: "mailbox",
            "Legacy mailbox at {legacy_mailbox:#x}, interface buffer search from {target:#x}"
        );
        Ok(target)
    }

    /// Scans from `address` for the interface buffer signature, returning the address of the first match.
    pub fn find_interface_buffer(&self, backend: &mut dyn AccessBackend, address: u64) -> Result<u64> {
        for offset in (0..SCAN_WINDOW).step_by(SCAN_STRIDE) {
            let candidate = address + offset;
            let first = backend.mem_read(candidate, 8)?;
            let second = backend.mem_read(candidate + 8, 8)?;
            if self.signature.matches(first, second) {
                log::info!(target: "mailbox", "Interface buffer found at {candidate:#x}");
                return Ok(candidate);
            }
        }

        log::debug!(target: "mailbox", "No interface buffer within {SCAN_WINDOW:#x} bytes of {address:#x}");
        Err(AccessError::BufferNotFound)
    }
}
