//! XmlCli mailbox
//!
//! Unlocks the XmlCli firmware configuration channel of a target platform over an [`AccessSession`].
//!
//! ## Flow
//!
//! 1. The [`MailboxLocator`](mailbox::MailboxLocator) reads the mailbox address out of CMOS and follows the shared
//!    mailbox redirections, using only port reads/writes and memory reads.
//! 2. It scans for the interface buffer signature.
//! 3. The [`HandshakeEngine`](handshake::HandshakeEngine) answers the firmware key with an HMAC-SHA256 digest,
//!    raises the XmlCli SMI and polls the buffer for the firmware response.
//!
//! [`enable_xmlcli`] runs the whole flow. [`validate_xmlcli_request`] only checks that the interface buffer can be
//! found and never writes to the target.
//!
//! Both operations bracket their work with one `init_interface`/`close_interface` pair and report a status code:
//! 0 on success and 1 on failure. The reason for a failure is logged.
//!
//! ## Examples
//!
//! ```rust ignore
//! use xmlcli_access::{open_session, BackendSelection};
//! use xmlcli_sdk::config::AccessConfiguration;
//!
//! let mut session = open_session(BackendSelection::from_name("linux")?, &AccessConfiguration::default())?;
//! if xmlcli_mailbox::enable_xmlcli(&mut session) == 0 {
//!     // XmlCli becomes available after a reboot.
//! }
//! ```
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
pub mod config;
pub mod handshake;
pub mod mailbox;

pub use config::HandshakeConfiguration;

use handshake::HandshakeEngine;
use log::Level;
use mailbox::MailboxLocator;
use xmlcli_access::AccessSession;
use xmlcli_sdk::{AccessError, Result};

/// Enables XmlCli with the default timings. Returns 0 on success, 1 otherwise.
///
/// The outcome is only reported through the `log` facade under the `handshake` target: success at info, a missing
/// interface buffer or an unanswered handshake at warn and any other failure at error. Without an installed logger
/// the status code is the only trace.
pub fn enable_xmlcli(session: &mut AccessSession) -> i32 {
    enable_xmlcli_with_config(session, &HandshakeConfiguration::default())
}

/// Enables XmlCli. Returns 0 on success, 1 otherwise.
pub fn enable_xmlcli_with_config(session: &mut AccessSession, config: &HandshakeConfiguration) -> i32 {
    let result = with_interface(session, |session| {
        let locator = MailboxLocator::new(config);
        let address = locator.cmos_address(&mut **session)?;
        let start = locator.resolve_for_enable(&mut **session, address)?;
        HandshakeEngine::new(session, config).run(start)
    });

    let (status, level, message) = enable_outcome(&result);
    log::log!(target: "handshake", level, "{message}");
    status
}

/// Status code, log level and message of an enable attempt.
fn enable_outcome<T>(result: &Result<T>) -> (i32, Level, String) {
    match result {
        Ok(_) => (0, Level::Info, "Enabled XmlCli support Successfully, Please Reboot..".into()),
        Err(AccessError::BufferNotFound) => (1, Level::Warn, "Interface Buffer Not Found, Aborting..".into()),
        Err(AccessError::HandshakeTimeout | AccessError::HandshakeMismatch) => {
            (1, Level::Warn, "No Response, there was some problem, Aborting..".into())
        }
        Err(err) => (1, Level::Error, format!("Enabling XmlCli failed: {err}")),
    }
}

/// Checks that the interface buffer holding the key exchange material can be located. Returns 0 when found, 1
/// otherwise.
pub fn validate_xmlcli_request(session: &mut AccessSession) -> i32 {
    validate_xmlcli_request_with_config(session, &HandshakeConfiguration::default())
}

/// Checks that the interface buffer can be located, following the legacy mailbox indirection. Never writes to
/// memory or raises an SMI.
pub fn validate_xmlcli_request_with_config(session: &mut AccessSession, config: &HandshakeConfiguration) -> i32 {
    let result = with_interface(session, |session| {
        let locator = MailboxLocator::new(config);
        let address = locator.cmos_address(&mut **session)?;
        let start = locator.resolve_for_validation(&mut **session, address)?;
        locator.find_interface_buffer(&mut **session, start)
    });

    match result {
        Ok(_) => 0,
        Err(AccessError::BufferNotFound) => 1,
        Err(err) => {
            log::error!(target: "mailbox", "Validating the XmlCli request failed: {err}");
            1
        }
    }
}

/// Runs `work` within one interface level, closing it on every path.
fn with_interface<T>(session: &mut AccessSession, work: impl FnOnce(&mut AccessSession) -> Result<T>) -> Result<T> {
    session.init_interface()?;
    let result = work(session);
    let closed = session.close_interface();
    let value = result?;
    closed?;
    Ok(value)
}
