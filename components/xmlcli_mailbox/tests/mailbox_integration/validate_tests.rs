//! End to end tests for `validate_xmlcli_request`
//!
//! Validation must never write memory or raise an SMI, whatever it finds.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

use xmlcli_mailbox::{
    mailbox::{LEGACY_MAILBOX_SIGNATURE, LEGACY_TEMP_ADDRESS_OFFSET},
    validate_xmlcli_request_with_config, HandshakeConfiguration,
};

use super::common::{responding_firmware, simulated_platform, Platform};

const MAILBOX: u64 = 0x3412_0000;

fn config() -> HandshakeConfiguration {
    HandshakeConfiguration::without_delays()
}

fn assert_read_only(platform: &Platform) {
    let state = platform.borrow();
    assert!(state.memory_writes.is_empty());
    assert_eq!(state.smi_count, 0);
    assert!(state.io_writes.iter().all(|(port, _)| matches!(port, 0x70 | 0x72)));
}

#[test]
fn test_validate_without_buffer_fails() {
    let (target, platform) = simulated_platform();
    platform.borrow_mut().set_fallback_cmos(0x12, 0x34);
    let mut session = target.into_session();

    assert_eq!(validate_xmlcli_request_with_config(&mut session, &config()), 1);
    assert_eq!(session.depth(), 0);
    assert_read_only(&platform);
}

#[test]
fn test_validate_finds_buffer_at_cmos_address() {
    let (target, platform) = simulated_platform();
    {
        let mut state = platform.borrow_mut();
        state.set_fallback_cmos(0x12, 0x34);
        state.place_interface_buffer(MAILBOX + 0x80);
    }
    let mut session = target.with_firmware(responding_firmware(MAILBOX + 0x80)).into_session();

    assert_eq!(validate_xmlcli_request_with_config(&mut session, &config()), 0);
    assert_read_only(&platform);
    assert!(platform.borrow().running);
}

#[test]
fn test_validate_follows_relative_legacy_mailbox() {
    const BUFFER: u64 = 0x6000_0000;

    let (target, platform) = simulated_platform();
    {
        let mut state = platform.borrow_mut();
        state.set_fallback_cmos(0x12, 0x34);
        state.place_shared_mailbox(MAILBOX, 0x800, LEGACY_MAILBOX_SIGNATURE, 0x200);
        state.write(MAILBOX + 0x200 + LEGACY_TEMP_ADDRESS_OFFSET, 4, BUFFER);
        state.place_interface_buffer(BUFFER);
    }
    let mut session = target.into_session();

    assert_eq!(validate_xmlcli_request_with_config(&mut session, &config()), 0);
    assert_read_only(&platform);
}

#[test]
fn test_validate_follows_absolute_legacy_mailbox() {
    const LEGACY: u64 = 0x7000_0000;
    const BUFFER: u64 = 0x6100_0040;

    let (target, platform) = simulated_platform();
    {
        let mut state = platform.borrow_mut();
        state.set_fallback_cmos(0x12, 0x34);
        state.place_shared_mailbox(MAILBOX, 0x800, LEGACY_MAILBOX_SIGNATURE, LEGACY as u32);
        state.write(LEGACY + LEGACY_TEMP_ADDRESS_OFFSET, 4, 0x6100_0000);
        state.place_interface_buffer(BUFFER);
    }
    let mut session = target.into_session();

    assert_eq!(validate_xmlcli_request_with_config(&mut session, &config()), 0);
    assert_read_only(&platform);
}

#[test]
fn test_validate_fails_when_legacy_mailbox_points_nowhere() {
    let (target, platform) = simulated_platform();
    {
        let mut state = platform.borrow_mut();
        state.set_fallback_cmos(0x12, 0x34);
        state.place_shared_mailbox(MAILBOX, 0x800, LEGACY_MAILBOX_SIGNATURE, 0x200);
        // The buffer sits next to the shared mailbox, but the legacy mailbox names another region.
        state.write(MAILBOX + 0x200 + LEGACY_TEMP_ADDRESS_OFFSET, 4, 0x6000_0000);
        state.place_interface_buffer(MAILBOX + 0x40);
    }
    let mut session = target.into_session();

    assert_eq!(validate_xmlcli_request_with_config(&mut session, &config()), 1);
    assert_read_only(&platform);
}
