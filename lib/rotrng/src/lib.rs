// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hardware access library for the ring-oscillator TRNG / DRBG IP block.
//!
//! The block pairs a ring-oscillator entropy source with a block-cipher
//! DRBG behind a small register window. This crate owns everything below
//! the service surface: the register map and port abstraction, the
//! SP 800-90A block-cipher derivation function used to distill seed
//! material, the instantiate/reseed/generate state machine for both
//! silicon revisions, and the mandatory known-answer and health
//! self-tests.
//!
//! Use the drv-rotrng crate to interact with this driver.
//!
//! On platforms where the TRNG is owned by a separate security processor
//! the same service surface is backed by a platform mailbox instead of
//! this engine; that transport lives with the platform integration.

#![cfg_attr(not(any(test, feature = "fake")), no_std)]

mod cipher;
mod df;
pub mod engine;
pub mod health;
pub mod regs;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use crate::engine::{Stats, Status, Trng};
pub use crate::regs::{Mmio, TrngPort};
