//! Simulated Platform for XmlCli Mailbox Integration Tests
//!
//! [`SimulatedPlatform`] is an [`AccessBackend`] over sparse memory and two CMOS banks. Firmware behavior on an SMI
//! is scripted with a closure. Tests keep a [`Platform`] handle to arrange memory and inspect what the access layer
//! did once the backend has been moved into a session.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    rc::Rc,
    sync::Once,
    time::Duration,
};

use xmlcli_access::{AccessBackend, AccessSession};
use xmlcli_mailbox::{
    handshake::{compute_digest, DIGEST_OFFSET, KEY_OFFSET, KEY_SIZE, RESPONSE_SIGNATURE1, RESPONSE_SIGNATURE2},
    mailbox::{MailboxSignature, INTERFACE_BUFFER_GUID},
};
use xmlcli_sdk::{base, Result};

/// Key the simulated firmware leaves in the interface buffer.
pub const FIRMWARE_KEY: [u8; KEY_SIZE] = [
    0x3c, 0x9a, 0x51, 0x07, 0xe2, 0x6d, 0xb8, 0x14, 0x7f, 0x20, 0xc5, 0x93, 0x0e, 0x48, 0xaa, 0x61, 0xd7, 0x02, 0x5b,
    0x86, 0xf1, 0x39, 0x6e, 0xc0, 0x28, 0x9d, 0x43, 0xb5, 0x1a, 0x77, 0xec, 0x50,
];

/// Firmware reaction to a software SMI.
pub type Firmware = Box<dyn FnMut(&mut PlatformState)>;

static INIT: Once = Once::new();

/// Logs as directed by `RUST_LOG`, silent when it is unset.
pub fn init_logging() {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        if std::env::var("RUST_LOG").is_err() {
            builder.filter_level(log::LevelFilter::Off);
        }
        builder.init();
    });
}

/// Everything observable about the simulated platform.
#[derive(Default)]
pub struct PlatformState {
    memory: BTreeMap<u64, u8>,
    cmos_primary: HashMap<u8, u8>,
    cmos_fallback: HashMap<u8, u8>,
    primary_index: u8,
    fallback_index: u8,
    /// Address and length of every memory write made through the backend.
    pub memory_writes: Vec<(u64, usize)>,
    /// Every port write made through the backend.
    pub io_writes: Vec<(u16, u32)>,
    pub smi_count: usize,
    watched: Option<u64>,
    /// Number of 8 byte reads of the watched address.
    pub watched_reads: usize,
    pub running: bool,
}

impl PlatformState {
    pub fn read(&self, address: u64, size: usize) -> u64 {
        let bytes: Vec<u8> = (0..size as u64).map(|offset| self.byte(address + offset)).collect();
        base::bytes_to_int(&bytes)
    }

    pub fn byte(&self, address: u64) -> u8 {
        self.memory.get(&address).copied().unwrap_or(0)
    }

    /// Writes memory directly, the way firmware would. Not recorded in `memory_writes`.
    pub fn write(&mut self, address: u64, size: usize, value: u64) {
        self.write_bytes(address, &base::int_to_bytes(value, size));
    }

    pub fn write_bytes(&mut self, address: u64, data: &[u8]) {
        for (offset, byte) in data.iter().enumerate() {
            self.memory.insert(address + offset as u64, *byte);
        }
    }

    /// Places the interface buffer signature and [`FIRMWARE_KEY`] at `address`.
    pub fn place_interface_buffer(&mut self, address: u64) {
        let [first, second] = MailboxSignature::from_guid(&INTERFACE_BUFFER_GUID).words();
        self.write(address, 8, first);
        self.write(address + 8, 8, second);
        self.write_bytes(address + KEY_OFFSET, &FIRMWARE_KEY);
    }

    /// Places a shared mailbox header at `address`.
    pub fn place_shared_mailbox(&mut self, address: u64, version: u32, entry_signature: u64, pointer: u32) {
        self.write(address, 4, 0xBA5E_BA11);
        self.write(address + 0x08, 4, 0xBA5E_BA11);
        self.write(address + 0x14, 4, u64::from(version));
        self.write(address + 0x20, 4, entry_signature);
        self.write(address + 0x24, 4, u64::from(pointer));
    }

    pub fn set_primary_cmos(&mut self, low: u8, high: u8) {
        self.cmos_primary.insert(0xF0, low);
        self.cmos_primary.insert(0xF1, high);
    }

    pub fn set_fallback_cmos(&mut self, low: u8, high: u8) {
        self.cmos_fallback.insert(0x78, low);
        self.cmos_fallback.insert(0x79, high);
    }

    /// Counts reads of the response field of the buffer at `buffer`.
    pub fn watch_response_field(&mut self, buffer: u64) {
        self.watched = Some(buffer + DIGEST_OFFSET);
    }
}

/// Shared view of a [`SimulatedPlatform`].
pub type Platform = Rc<RefCell<PlatformState>>;

/// An [`AccessBackend`] over a [`PlatformState`].
pub struct SimulatedPlatform {
    state: Platform,
    firmware: Option<Firmware>,
}

/// A running platform with blank memory and CMOS, and no firmware reacting to SMIs.
pub fn simulated_platform() -> (SimulatedPlatform, Platform) {
    init_logging();
    let state = Rc::new(RefCell::new(PlatformState { running: true, ..Default::default() }));
    (SimulatedPlatform { state: state.clone(), firmware: None }, state)
}

impl SimulatedPlatform {
    pub fn with_firmware(mut self, firmware: Firmware) -> Self {
        self.firmware = Some(firmware);
        self
    }

    pub fn into_session(self) -> AccessSession {
        AccessSession::open(Box::new(self))
    }
}

/// Firmware that answers a correct digest of [`FIRMWARE_KEY`] in the buffer at `buffer` with both response
/// signatures, and ignores anything else.
pub fn responding_firmware(buffer: u64) -> Firmware {
    let expected = compute_digest(&FIRMWARE_KEY);
    Box::new(move |state: &mut PlatformState| {
        let digest: Vec<u8> =
            (0..expected.len() as u64).map(|offset| state.byte(buffer + DIGEST_OFFSET + offset)).collect();
        if digest == expected {
            state.write(buffer + DIGEST_OFFSET, 8, RESPONSE_SIGNATURE1);
            state.write(buffer + DIGEST_OFFSET + 8, 8, RESPONSE_SIGNATURE2);
        }
    })
}

/// Firmware that acknowledges the request but never confirms it.
pub fn half_responding_firmware(buffer: u64) -> Firmware {
    Box::new(move |state: &mut PlatformState| {
        state.write(buffer + DIGEST_OFFSET, 8, RESPONSE_SIGNATURE1);
        state.write(buffer + DIGEST_OFFSET + 8, 8, 0x0BAD_0BAD_0BAD_0BAD);
    })
}

impl AccessBackend for SimulatedPlatform {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn halt_cpu(&mut self, _delay: Duration) -> Result<()> {
        self.state.borrow_mut().running = false;
        Ok(())
    }

    fn run_cpu(&mut self) -> Result<()> {
        self.state.borrow_mut().running = true;
        Ok(())
    }

    fn is_cpu_running(&mut self) -> Result<bool> {
        Ok(self.state.borrow().running)
    }

    fn mem_read(&mut self, address: u64, size: usize) -> Result<u64> {
        base::validate_scalar_size(size)?;
        let mut state = self.state.borrow_mut();
        if size == 8 && state.watched == Some(address) {
            state.watched_reads += 1;
        }
        Ok(state.read(address, size))
    }

    fn mem_write(&mut self, address: u64, size: usize, value: u64) -> Result<()> {
        base::validate_scalar_size(size)?;
        let mut state = self.state.borrow_mut();
        state.memory_writes.push((address, size));
        state.write(address, size, value);
        Ok(())
    }

    fn mem_block(&mut self, address: u64, size: usize) -> Result<Vec<u8>> {
        let state = self.state.borrow();
        Ok((0..size as u64).map(|offset| state.byte(address + offset)).collect())
    }

    fn mem_block_write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.memory_writes.push((address, data.len()));
        state.write_bytes(address, data);
        Ok(())
    }

    fn read_io(&mut self, port: u16, size: usize) -> Result<u32> {
        base::validate_port_size(size)?;
        let state = self.state.borrow();
        let value = match port {
            0x73 => state.cmos_primary.get(&state.primary_index).copied().unwrap_or(0),
            0x71 => state.cmos_fallback.get(&state.fallback_index).copied().unwrap_or(0),
            _ => 0,
        };
        Ok(u32::from(value))
    }

    fn write_io(&mut self, port: u16, size: usize, value: u32) -> Result<()> {
        base::validate_port_size(size)?;
        {
            let mut state = self.state.borrow_mut();
            state.io_writes.push((port, value));
            match port {
                0x72 => state.primary_index = value as u8,
                0x70 => state.fallback_index = value as u8,
                0xB2 => state.smi_count += 1,
                _ => {}
            }
        }

        if port == 0xB2 {
            if let Some(firmware) = self.firmware.as_mut() {
                firmware(&mut *self.state.borrow_mut());
            }
        }
        Ok(())
    }
}
