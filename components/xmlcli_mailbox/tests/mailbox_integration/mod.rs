//! XmlCli Mailbox Integration Tests
//!
//! Runs `enable_xmlcli` and `validate_xmlcli_request` end to end against a simulated platform.
//!
//! ## Logging
//!
//! Set `RUST_LOG` to a level (`debug`, `trace`, ...) to print the access layer logs while the tests run:
//!
//! ```sh
//! RUST_LOG=debug cargo test -p xmlcli_mailbox --test mailbox_integration
//! ```
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

// Simulated platform shared by all test modules
mod common;

mod enable_tests;
mod validate_tests;
