//! End to end tests for `enable_xmlcli`
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

use xmlcli_mailbox::{
    enable_xmlcli_with_config,
    handshake::{DIGEST_OFFSET, DIGEST_SIZE, RESPONSE_SIGNATURE1},
    mailbox::{LEGACY_MAILBOX_SIGNATURE, XMLCLI_DISABLED_SIGNATURE},
    HandshakeConfiguration,
};

use super::common::{half_responding_firmware, init_logging, responding_firmware, simulated_platform};

const MAILBOX: u64 = 0x3412_0000;
const BUFFER: u64 = MAILBOX + 0x40;

fn config() -> HandshakeConfiguration {
    HandshakeConfiguration::without_delays()
}

#[test]
fn test_enable_through_fallback_cmos() {
    let (target, platform) = simulated_platform();
    {
        let mut state = platform.borrow_mut();
        state.set_primary_cmos(0xFF, 0xFF);
        state.set_fallback_cmos(0x12, 0x34);
        state.place_interface_buffer(BUFFER);
        state.watch_response_field(BUFFER);
    }
    let mut session = target.with_firmware(responding_firmware(BUFFER)).into_session();

    assert_eq!(enable_xmlcli_with_config(&mut session, &config()), 0);
    assert_eq!(session.depth(), 0);

    let state = platform.borrow();
    assert_eq!(state.smi_count, 1);
    assert_eq!(state.watched_reads, 1);
    assert_eq!(state.read(BUFFER + DIGEST_OFFSET, 8), 0);
    assert_eq!(state.read(BUFFER + DIGEST_OFFSET + 8, 8), 0);
    assert_eq!(
        state.memory_writes,
        vec![(BUFFER + DIGEST_OFFSET, DIGEST_SIZE), (BUFFER + DIGEST_OFFSET, 8), (BUFFER + DIGEST_OFFSET + 8, 8)]
    );
    assert!(state.io_writes.contains(&(0x70, 0x78)));
    assert!(state.io_writes.contains(&(0xB2, 0xF6)));
    assert!(state.running);
}

#[test]
fn test_enable_through_primary_cmos() {
    let (target, platform) = simulated_platform();
    {
        let mut state = platform.borrow_mut();
        state.set_primary_cmos(0x12, 0x34);
        state.place_interface_buffer(BUFFER);
    }
    let mut session = target.with_firmware(responding_firmware(BUFFER)).into_session();

    assert_eq!(enable_xmlcli_with_config(&mut session, &config()), 0);

    let state = platform.borrow();
    assert!(state.io_writes.iter().all(|(port, _)| *port != 0x70));
    assert_eq!(state.smi_count, 1);
}

#[test]
fn test_enable_times_out_without_firmware_response() {
    let (target, platform) = simulated_platform();
    {
        let mut state = platform.borrow_mut();
        state.set_fallback_cmos(0x12, 0x34);
        state.place_interface_buffer(BUFFER);
        state.watch_response_field(BUFFER);
    }
    let mut session = target.into_session();

    assert_eq!(enable_xmlcli_with_config(&mut session, &config()), 1);
    assert_eq!(session.depth(), 0);

    let state = platform.borrow();
    assert_eq!(state.smi_count, 1);
    assert_eq!(state.watched_reads, 3);
    assert_eq!(state.memory_writes, vec![(BUFFER + DIGEST_OFFSET, DIGEST_SIZE)]);
    assert!(state.running);
}

#[test]
fn test_enable_rejects_wrong_confirmation() {
    let (target, platform) = simulated_platform();
    {
        let mut state = platform.borrow_mut();
        state.set_fallback_cmos(0x12, 0x34);
        state.place_interface_buffer(BUFFER);
        state.watch_response_field(BUFFER);
    }
    let mut session = target.with_firmware(half_responding_firmware(BUFFER)).into_session();

    assert_eq!(enable_xmlcli_with_config(&mut session, &config()), 1);

    let state = platform.borrow();
    assert_eq!(state.watched_reads, 1);
    assert_eq!(state.read(BUFFER + DIGEST_OFFSET, 8), RESPONSE_SIGNATURE1);
    assert_eq!(state.read(BUFFER + DIGEST_OFFSET + 8, 8), 0x0BAD_0BAD_0BAD_0BAD);
}

#[test]
fn test_enable_without_interface_buffer_leaves_target_untouched() {
    let (target, platform) = simulated_platform();
    platform.borrow_mut().set_fallback_cmos(0x12, 0x34);
    let mut session = target.with_firmware(responding_firmware(BUFFER)).into_session();

    assert_eq!(enable_xmlcli_with_config(&mut session, &config()), 1);
    assert_eq!(session.depth(), 0);

    let state = platform.borrow();
    assert!(state.memory_writes.is_empty());
    assert_eq!(state.smi_count, 0);
}

#[test]
fn test_enable_follows_absolute_redirect_of_disabled_interface() {
    const REDIRECTED: u64 = 0x5000_0000;

    let (target, platform) = simulated_platform();
    {
        let mut state = platform.borrow_mut();
        state.set_fallback_cmos(0x12, 0x34);
        state.place_shared_mailbox(MAILBOX, 0x800, XMLCLI_DISABLED_SIGNATURE, REDIRECTED as u32);
        state.place_interface_buffer(REDIRECTED);
    }
    let mut session = target.with_firmware(responding_firmware(REDIRECTED)).into_session();

    assert_eq!(enable_xmlcli_with_config(&mut session, &config()), 0);
    assert_eq!(platform.borrow().memory_writes[0], (REDIRECTED + DIGEST_OFFSET, DIGEST_SIZE));
}

#[test]
fn test_enable_follows_relative_redirect_of_disabled_interface() {
    const REDIRECTED: u64 = MAILBOX + 0x1000;

    let (target, platform) = simulated_platform();
    {
        let mut state = platform.borrow_mut();
        state.set_fallback_cmos(0x12, 0x34);
        state.place_shared_mailbox(MAILBOX, 0x0001_0900, XMLCLI_DISABLED_SIGNATURE, 0x1000);
        state.place_interface_buffer(REDIRECTED);
    }
    let mut session = target.with_firmware(responding_firmware(REDIRECTED)).into_session();

    assert_eq!(enable_xmlcli_with_config(&mut session, &config()), 0);
    assert_eq!(platform.borrow().memory_writes[0], (REDIRECTED + DIGEST_OFFSET, DIGEST_SIZE));
}

#[test]
fn test_enable_ignores_redirect_of_older_or_enabled_mailbox() {
    for (version, entry_signature) in [(0x7FF, XMLCLI_DISABLED_SIGNATURE), (0x800, LEGACY_MAILBOX_SIGNATURE)] {
        let (target, platform) = simulated_platform();
        {
            let mut state = platform.borrow_mut();
            state.set_fallback_cmos(0x12, 0x34);
            state.place_shared_mailbox(MAILBOX, version, entry_signature, 0x5000_0000);
            state.place_interface_buffer(BUFFER);
        }
        let mut session = target.with_firmware(responding_firmware(BUFFER)).into_session();

        assert_eq!(enable_xmlcli_with_config(&mut session, &config()), 0);
        assert_eq!(platform.borrow().memory_writes[0], (BUFFER + DIGEST_OFFSET, DIGEST_SIZE));
    }
}

#[test]
fn test_enable_keeps_halted_target_halted() {
    let (target, platform) = simulated_platform();
    {
        let mut state = platform.borrow_mut();
        state.running = false;
        state.set_fallback_cmos(0x12, 0x34);
        state.place_interface_buffer(BUFFER);
    }
    let mut session = target.with_firmware(responding_firmware(BUFFER)).into_session();

    assert_eq!(enable_xmlcli_with_config(&mut session, &config()), 0);
    assert!(!platform.borrow().running);
}

#[test]
fn test_logging_setup_is_repeatable() {
    init_logging();
    let _ = simulated_platform();
    init_logging();
    if std::env::var("RUST_LOG").is_err() {
        assert_eq!(log::max_level(), log::LevelFilter::Off);
    }
}
