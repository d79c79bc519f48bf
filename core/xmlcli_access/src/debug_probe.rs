//! Access through a hardware debug probe.
//!
//! The probe exposes the target's hardware threads as a domain, package, die, core and thread tree. The backend
//! works against one selected thread, which is reselected as the first alive thread every time an interface level
//! is entered.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::{
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use xmlcli_sdk::{base, AccessError, Result};

use crate::backend::{AccessBackend, SMI_TRIGGER_PORT};

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// MSR holding the SMM base of a thread.
pub const SMBASE_MSR: u32 = 0x171;

/// Location of a hardware thread in the probe topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ThreadPath {
    pub domain: usize,
    pub package: usize,
    pub die: usize,
    pub core: usize,
    pub thread: usize,
}

/// Narrows the probe topology to a subset of threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadSelector {
    /// A socket is shorthand for domain 0, package `socket`, die 0 and overrides those fields.
    pub socket: Option<usize>,
    pub domain: Option<usize>,
    pub package: Option<usize>,
    pub die: Option<usize>,
    pub core: Option<usize>,
}

impl ThreadSelector {
    fn normalized(mut self) -> Self {
        if let Some(socket) = self.socket {
            self.domain = Some(0);
            self.package = Some(socket);
            self.die = Some(0);
        }
        self
    }

    /// Whether `path` lies under the levels this selector names, from the domain down.
    ///
    /// A level only narrows the selection when every level above it is set too, so a package without a domain or a
    /// core without a die is ignored here.
    pub fn matches(&self, path: &ThreadPath) -> bool {
        let selector = self.normalized();
        let levels = [
            (selector.domain, path.domain),
            (selector.package, path.package),
            (selector.die, path.die),
            (selector.core, path.core),
        ];
        for (wanted, actual) in levels {
            match wanted {
                Some(wanted) if wanted != actual => return false,
                Some(_) => {}
                None => break,
            }
        }
        true
    }
}

/// Identifies the core a thread belongs to.
fn core_of(path: &ThreadPath) -> [usize; 4] {
    [path.domain, path.package, path.die, path.core]
}

/// The operations a debug probe provides.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait DebugProbe {
    /// All threads known to the probe, in probe order.
    fn threads(&self) -> Vec<ThreadPath>;

    fn is_alive(&self, thread: &ThreadPath) -> bool;

    fn is_running(&mut self, thread: &ThreadPath) -> Result<bool>;

    /// Halts all threads.
    fn halt(&mut self) -> Result<()>;

    /// Resumes all threads.
    fn go(&mut self) -> Result<()>;

    fn reset_target(&mut self) -> Result<()>;

    fn pulse_power_good(&mut self) -> Result<()>;

    fn mem_read(&mut self, thread: &ThreadPath, address: u64, size: usize) -> Result<u64>;

    fn mem_write(&mut self, thread: &ThreadPath, address: u64, size: usize, value: u64) -> Result<()>;

    fn mem_block(&mut self, thread: &ThreadPath, address: u64, size: usize) -> Result<Vec<u8>>;

    /// Saves memory to `filename`. The probe requires an absolute path.
    fn mem_save(&mut self, thread: &ThreadPath, filename: &Path, address: u64, size: usize) -> Result<()>;

    /// Loads `filename` into memory. The probe requires an absolute path.
    fn mem_load(&mut self, thread: &ThreadPath, filename: &Path, address: u64) -> Result<()>;

    fn port_read(&mut self, thread: &ThreadPath, port: u16, size: usize) -> Result<u32>;

    fn port_write(&mut self, thread: &ThreadPath, port: u16, size: usize, value: u32) -> Result<()>;

    fn msr_read(&mut self, thread: &ThreadPath, address: u32) -> Result<u64>;

    fn msr_write(&mut self, thread: &ThreadPath, address: u32, value: u64) -> Result<()>;
}

/// [`AccessBackend`] driving a [`DebugProbe`].
pub struct DebugProbeBackend {
    probe: Box<dyn DebugProbe>,
    name: &'static str,
    thread: ThreadPath,
}

impl DebugProbeBackend {
    /// Creates the backend and selects the first alive thread.
    ///
    /// `name` identifies the probe flavor (`dci`, `itpii`, ...).
    pub fn new(probe: Box<dyn DebugProbe>, name: &'static str) -> Result<Self> {
        let thread = first_alive(probe.as_ref())?;
        log::info!(target: "xmlcli_access", "{name}: selected thread {thread:?}");
        Ok(Self { probe, name, thread })
    }

    pub fn get_alive_threads(&self) -> Vec<ThreadPath> {
        alive_threads(self.probe.as_ref())
    }

    pub fn is_thread_alive(&self, thread: &ThreadPath) -> bool {
        self.probe.is_alive(thread)
    }

    pub fn set_thread(&mut self, thread: ThreadPath) {
        self.thread = thread;
    }

    /// The thread subsequent operations run on.
    pub fn thread(&self) -> ThreadPath {
        self.thread
    }

    /// Returns the `number`-th thread of the threads `selector` picks.
    ///
    /// With a domain or socket the threads are narrowed as [`ThreadSelector::matches`] describes. Without one, a
    /// `core` is an index into every core of the topology in probe order. With neither, every thread is picked.
    pub fn get_thread_by_number(&self, number: usize, selector: ThreadSelector) -> Result<ThreadPath> {
        let threads = self.probe.threads();
        let selector = selector.normalized();

        let picked: Vec<ThreadPath> = match (selector.domain, selector.core) {
            (None, Some(core)) => {
                let mut cores: Vec<[usize; 4]> = Vec::new();
                for thread in &threads {
                    if !cores.contains(&core_of(thread)) {
                        cores.push(core_of(thread));
                    }
                }
                let wanted = cores
                    .get(core)
                    .copied()
                    .ok_or_else(|| AccessError::DeviceIo(format!("core {core} out of range")))?;
                threads.into_iter().filter(|thread| core_of(thread) == wanted).collect()
            }
            _ => threads.into_iter().filter(|thread| selector.matches(thread)).collect(),
        };

        picked
            .get(number)
            .copied()
            .ok_or_else(|| AccessError::DeviceIo(format!("no thread {number} matching {selector:?}")))
    }

    fn thread_by_index(&self, index: usize) -> Result<ThreadPath> {
        self.probe
            .threads()
            .get(index)
            .copied()
            .ok_or_else(|| AccessError::DeviceIo(format!("thread index {index} out of range")))
    }
}

fn alive_threads(probe: &dyn DebugProbe) -> Vec<ThreadPath> {
    probe.threads().into_iter().filter(|thread| probe.is_alive(thread)).collect()
}

fn first_alive(probe: &dyn DebugProbe) -> Result<ThreadPath> {
    alive_threads(probe).first().copied().ok_or_else(|| {
        log::error!(target: "xmlcli_access", "The debug probe reports no alive thread");
        AccessError::DeviceIo("no alive thread".into())
    })
}

fn absolute(filename: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(filename)?)
}

impl AccessBackend for DebugProbeBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn attach(&mut self) -> Result<()> {
        self.thread = first_alive(self.probe.as_ref())?;
        Ok(())
    }

    fn halt_cpu(&mut self, delay: Duration) -> Result<()> {
        thread::sleep(delay);
        if self.probe.threads().is_empty() {
            return Err(AccessError::DeviceIo("halt_cpu: the debug probe reports no CPU threads".into()));
        }
        if self.probe.is_running(&self.thread)? {
            if let Err(err) = self.probe.halt() {
                log::warn!(target: "xmlcli_access", "{}: halt failed: {err}", self.name);
            }
        }
        Ok(())
    }

    fn run_cpu(&mut self) -> Result<()> {
        if !self.probe.is_running(&self.thread)? {
            self.probe.go()?;
        }
        Ok(())
    }

    fn is_cpu_running(&mut self) -> Result<bool> {
        self.probe.is_running(&self.thread)
    }

    fn mem_read(&mut self, address: u64, size: usize) -> Result<u64> {
        base::validate_scalar_size(size)?;
        self.probe.mem_read(&self.thread, address, size)
    }

    fn mem_write(&mut self, address: u64, size: usize, value: u64) -> Result<()> {
        base::validate_scalar_size(size)?;
        self.probe.mem_write(&self.thread, address, size, base::truncate_to_size(value, size))
    }

    fn mem_block(&mut self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.probe.mem_block(&self.thread, address, size)
    }

    fn mem_save(&mut self, filename: &Path, address: u64, size: usize) -> Result<()> {
        let filename = absolute(filename)?;
        self.probe.mem_save(&self.thread, &filename, address, size)
    }

    fn load_data(&mut self, filename: &Path, address: u64) -> Result<()> {
        let filename = absolute(filename)?;
        self.probe.mem_load(&self.thread, &filename, address)
    }

    fn read_io(&mut self, port: u16, size: usize) -> Result<u32> {
        base::validate_port_size(size)?;
        self.probe.port_read(&self.thread, port, size)
    }

    fn write_io(&mut self, port: u16, size: usize, value: u32) -> Result<()> {
        base::validate_port_size(size)?;
        self.probe.port_write(&self.thread, port, size, value)
    }

    fn trigger_smi(&mut self, value: u8) -> Result<()> {
        self.halt_cpu(Duration::ZERO)?;
        self.write_io(SMI_TRIGGER_PORT, 1, u32::from(value))?;
        self.run_cpu()
    }

    fn read_msr(&mut self, thread: usize, address: u32) -> Result<u64> {
        let path = self.thread_by_index(thread)?;
        self.probe.msr_read(&path, address)
    }

    fn write_msr(&mut self, thread: usize, address: u32, value: u64) -> Result<()> {
        let path = self.thread_by_index(thread)?;
        self.probe.msr_write(&path, address, value)
    }

    fn warm_reset(&mut self) -> Result<()> {
        self.probe.reset_target()
    }

    fn cold_reset(&mut self) -> Result<()> {
        self.probe.pulse_power_good()
    }

    fn read_sm_base(&mut self) -> Result<u64> {
        self.halt_cpu(Duration::ZERO)?;
        self.probe.msr_read(&self.thread, SMBASE_MSR)
    }
}
