//! End-to-end tests for payee-verify.
//!
//! Each test drives the full verification flow through [`TestHarness`]:
//! identity, name match, governor, scripted provider and a real store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod harness;
mod quota;
mod sqlite_store;
mod verification_flow;

pub use harness::{
    bank_form, base_time, test_config, upi_form, HarnessError, TestHarness, OTHER_TOKEN,
    OWNER_TOKEN, SECOND_STORE, STORE,
};
