//! Exclusive, nesting-aware access sessions.
//!
//! An [`AccessSession`] owns a backend for as long as the caller needs the hardware. Only one session exists in the
//! process at a time; opening a second one blocks until the first is dropped.
//!
//! Callers bracket hardware work with [`AccessSession::init_interface`] and [`AccessSession::close_interface`].
//! Those calls nest, up to [`MAX_NESTING_DEPTH`] levels. Each level records whether the CPU was running when it
//! began, so closing a level puts the CPU back exactly as that level found it.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::ops::{Deref, DerefMut};
use std::{
    sync::{Mutex, MutexGuard, PoisonError, TryLockError},
    time::Duration,
};

use xmlcli_sdk::{AccessError, Result, SessionFault};

use crate::backend::AccessBackend;

/// Maximum number of nested `init_interface` levels, one bit of the run-state bitmap each.
pub const MAX_NESTING_DEPTH: u8 = u8::BITS as u8;

static SESSION_LOCK: Mutex<()> = Mutex::new(());

/// An open connection to the target through one backend.
pub struct AccessSession {
    backend: Box<dyn AccessBackend>,
    interface: &'static str,
    depth: u8,
    running: u8,
    _guard: MutexGuard<'static, ()>,
}

impl AccessSession {
    /// Opens a session, waiting for any other session in the process to be dropped first.
    pub fn open(backend: Box<dyn AccessBackend>) -> Self {
        // A panic while a session was open leaves nothing behind that this lock protects.
        let guard = SESSION_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        Self::with_guard(backend, guard)
    }

    /// Opens a session if no other session is open, handing the backend back otherwise.
    pub fn try_open(backend: Box<dyn AccessBackend>) -> core::result::Result<Self, Box<dyn AccessBackend>> {
        match SESSION_LOCK.try_lock() {
            Ok(guard) => Ok(Self::with_guard(backend, guard)),
            Err(TryLockError::Poisoned(poisoned)) => Ok(Self::with_guard(backend, poisoned.into_inner())),
            Err(TryLockError::WouldBlock) => Err(backend),
        }
    }

    fn with_guard(backend: Box<dyn AccessBackend>, guard: MutexGuard<'static, ()>) -> Self {
        let interface = backend.name();
        log::debug!(target: "xmlcli_access", "Opened access session over {interface}");
        Self { backend, interface, depth: 0, running: 0, _guard: guard }
    }

    /// Name of the access method behind this session.
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// Number of currently open interface levels.
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Enters a new interface level, remembering the current run state and halting the CPU.
    ///
    /// ## Errors
    ///
    /// Fails with [`SessionFault::NestingOverflow`] beyond [`MAX_NESTING_DEPTH`] levels, or with whatever the
    /// backend reports while attaching, querying or halting. A failed call leaves the depth unchanged.
    pub fn init_interface(&mut self) -> Result<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(AccessError::SessionState(SessionFault::NestingOverflow));
        }

        self.backend.attach()?;
        let was_running = self.backend.is_cpu_running()?;
        let bit = 1u8 << self.depth;
        if was_running {
            self.running |= bit;
        } else {
            self.running &= !bit;
        }
        self.backend.halt_cpu(Duration::ZERO)?;
        self.depth += 1;

        log::trace!(target: "xmlcli_access", "init_interface depth={} running={was_running}", self.depth);
        Ok(())
    }

    /// Leaves the innermost interface level, restoring the run state recorded when it began.
    pub fn close_interface(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Err(AccessError::SessionState(SessionFault::Unbalanced));
        }

        let level = self.depth - 1;
        if self.running & (1u8 << level) != 0 {
            self.backend.run_cpu()?;
        } else {
            self.backend.halt_cpu(Duration::ZERO)?;
        }
        self.depth = level;

        log::trace!(target: "xmlcli_access", "close_interface depth={}", self.depth);
        Ok(())
    }
}

impl Deref for AccessSession {
    type Target = dyn AccessBackend;

    fn deref(&self) -> &Self::Target {
        self.backend.as_ref()
    }
}

impl DerefMut for AccessSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.backend.as_mut()
    }
}

impl Drop for AccessSession {
    fn drop(&mut self) {
        if self.depth != 0 {
            log::warn!(
                target: "xmlcli_access",
                "Access session over {} dropped with {} open interface level(s)",
                self.interface,
                self.depth
            );
        }
        while self.depth != 0 {
            if let Err(err) = self.close_interface() {
                log::error!(target: "xmlcli_access", "Failed to restore CPU state: {err}");
                break;
            }
        }
    }
}
