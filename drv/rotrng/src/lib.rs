// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver service for the ring-oscillator TRNG / DRBG.
//!
//! Use the rng-api crate types to configure it. [`RotRng::init`] brings
//! the device through its mandatory self-tests before any caller sees a
//! byte; after that the surface is "fill this buffer with random bytes",
//! chunked internally into 32-byte security-strength blocks.
//!
//! The calling security subsystem cannot proceed on a degraded RNG, so
//! the `RngCore::fill_bytes` entry point treats every underlying fault
//! as fatal; callers that can degrade gracefully use `try_fill_bytes`.

#![cfg_attr(not(test), no_std)]

use core::cmp;

use drv_rng_api::{Config, IpVersion, Mode, RngError, SECURITY_STRENGTH};
pub use drv_rng_api::{CryptoRng, Error, RngCore};
use lib_rotrng::{health, Stats, Status, Trng, TrngPort};
use zeroize::Zeroizing;

pub struct RotRng<P: TrngPort> {
    trng: Trng<P>,
}

impl<P: TrngPort> RotRng<P> {
    /// Bring the device up: run the known-answer test for the silicon
    /// revision and the entropy health test, instantiate with the
    /// caller's configuration, and give HRNG an initial reseed from its
    /// entropy source.
    ///
    /// The self-tests run before any output is produced, including after
    /// a catastrophic fault was cleared by a power cycle.
    pub fn init(
        port: P,
        version: IpVersion,
        cfg: &Config,
    ) -> Result<Self, RngError> {
        let mut trng = Trng::new(port, version);
        health::kat(&mut trng)?;
        health::health_test(&mut trng)?;

        trng.instantiate(cfg)?;
        if cfg.mode == Mode::Hrng {
            trng.reseed(None, cfg.dfmul)?;
        }

        log::info!("trng service up ({:?}, {:?})", version, cfg.mode);
        Ok(RotRng { trng })
    }

    /// Fill `dest` from the DRBG, a 32-byte block at a time; the tail
    /// goes through a scratch block so the engine only ever sees
    /// full-strength requests.
    pub fn try_fill(&mut self, dest: &mut [u8]) -> Result<(), RngError> {
        let mut block = Zeroizing::new([0u8; SECURITY_STRENGTH]);
        let mut cnt = 0;
        while cnt < dest.len() {
            let len = cmp::min(block.len(), dest.len() - cnt);
            if len == block.len() {
                self.trng.generate(&mut dest[cnt..cnt + len], false)?;
            } else {
                self.trng.generate(&mut block[..], false)?;
                dest[cnt..cnt + len].copy_from_slice(&block[..len]);
            }
            cnt += len;
        }
        Ok(())
    }

    /// Reseed now. DRNG callers supply fresh seed material; HRNG pulls
    /// from its entropy source with `seed` of `None`.
    pub fn reseed(
        &mut self,
        seed: Option<&[u8]>,
        dfmul: u32,
    ) -> Result<(), RngError> {
        self.trng.reseed(seed, dfmul)
    }

    pub fn status(&self) -> Status {
        self.trng.status()
    }

    pub fn stats(&self) -> Stats {
        self.trng.stats()
    }

    /// Scrub the device and wipe staged secrets. The port comes back for
    /// platform teardown.
    pub fn shutdown(mut self) -> Status {
        self.trng.release();
        self.trng.status()
    }

    /// Direct engine access for bring-up and tests.
    pub fn trng_mut(&mut self) -> &mut Trng<P> {
        &mut self.trng
    }
}

impl<P: TrngPort> RngCore for RotRng<P> {
    fn next_u32(&mut self) -> u32 {
        rand_core::impls::next_u32_via_fill(self)
    }

    fn next_u64(&mut self) -> u64 {
        rand_core::impls::next_u64_via_fill(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.try_fill_bytes(dest)
            .expect("RNG failed to fill the provided buffer.")
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.try_fill(dest).map_err(Error::from)
    }
}

impl<P: TrngPort> CryptoRng for RotRng<P> {}
