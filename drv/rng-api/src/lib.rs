// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! API crate for the ring-oscillator TRNG / DRBG driver.
//!
//! Shared types for the driver and its callers: the error enumeration with
//! its `rand_core::Error` bridge, the operating mode and silicon revision
//! tags, and the user configuration consumed at instantiate time.

#![cfg_attr(not(test), no_std)]

use core::num::NonZeroU32;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
pub use rand_core::{CryptoRng, Error, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Output granularity of the DRBG core: one generate request produces a
/// multiple of this many bytes at full security strength.
pub const SECURITY_STRENGTH: usize = 32;

/// Length of a hardware seed when the derivation function is bypassed, and
/// of every derived seed.
pub const SEED_LEN: usize = 48;

/// Length of the optional personalization string.
pub const PSTR_LEN: usize = 48;

/// Upper bound on pre-derivation seed material, `(DFMUL_MAX + 1) * 16`.
pub const MAX_SEED_LEN: usize = 160;

/// Valid range for the derivation-function length multiplier when the DF
/// is enabled. `dfmul == 0` means the DF is bypassed.
pub const DFMUL_MIN: u32 = 2;
pub const DFMUL_MAX: u32 = 9;

#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum RngError {
    /// Caller argument out of range (buffer length, seed length, dfmul).
    BadArg = 1,
    /// Operation not valid for the instance's current lifecycle status.
    BadState,
    /// Rejected configuration: mode/flag incompatibility or domain error.
    InvalidConfig,
    /// Hardware did not signal DONE / a full burst within the deadline.
    Timeout,
    /// Entropy health failure: CERTF after reseed, or trivial seed pattern.
    EntropyHealth,
    /// Caller attempted to reseed with the original instantiate seed.
    SeedReuse,
    /// Seed life exhausted in a mode that cannot reseed implicitly.
    SeedExpired,
    /// Serial seed write-back verification mismatch.
    SeedLoadFault,
    /// Deterministic test failure or stuck core output. Sticky: cleared
    /// only by a full release / power cycle and a fresh known-answer test.
    Catastrophic,
    /// Known-answer or health self-test mismatch.
    SelfTestFail,
}

impl From<RngError> for u32 {
    fn from(e: RngError) -> Self {
        e as Self
    }
}

impl From<u32> for RngError {
    fn from(u: u32) -> Self {
        match FromPrimitive::from_u32(u) {
            Some(err) => err,
            None => panic!("Invalid u32 for conversion to RngError."),
        }
    }
}

// This conversion produces an error code appropriate for rand_core by
// adding Error::CUSTOM_START to the u32 representation:
// https://docs.rs/rand_core/0.6/rand_core/struct.Error.html#associatedconstant.CUSTOM_START
impl From<RngError> for Error {
    fn from(e: RngError) -> Self {
        let code = u32::from(e) + Error::CUSTOM_START;
        match NonZeroU32::new(code) {
            Some(rc) => Error::from(rc),
            None => {
                panic!("Invalid RngError for conversion to rand_core::Error.")
            }
        }
    }
}

impl From<Error> for RngError {
    fn from(e: Error) -> Self {
        // 'code' is always Some for errors constructed from a NonZeroU32,
        // which is the only way this driver produces them.
        let code = match e.code() {
            Some(code) => code.get(),
            None => panic!("Invalid rand_core::Error for conversion."),
        };
        if code < Error::CUSTOM_START {
            panic!("Invalid rand_core::Error for conversion to RngError.");
        }
        RngError::from(code - Error::CUSTOM_START)
    }
}

/// Operating mode selected at instantiate time. Fixed for the life of the
/// instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Externally seeded DRBG; the entropy source is never enabled.
    Drng,
    /// Raw ring-oscillator output, optionally conditioned by the DF.
    Ptrng,
    /// Ring oscillators seed the DRBG, which generates the output.
    Hrng,
}

/// Silicon revision of the IP block. The revisions share the generate path
/// but load seed material differently (V1 parallel, V2 serial).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IpVersion {
    V1,
    V2,
}

impl IpVersion {
    /// Bytes of seed material a reseed stages for this revision.
    ///
    /// V1 loads 48 raw bytes into the parallel bank when the DF is
    /// bypassed and distills `(dfmul + 1) * 16` bytes otherwise. V2
    /// always clocks `(dfmul + 1) * 16` bytes, the exact count
    /// CTRL_3.DLEN advertises to the core.
    pub fn seed_len(self, df_disable: bool, dfmul: u32) -> usize {
        if self == IpVersion::V1 && df_disable {
            SEED_LEN
        } else {
            (dfmul as usize + 1) * 16
        }
    }
}

/// Owned seed material, sized for the largest supported pre-DF input.
/// Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; MAX_SEED_LEN],
    len: usize,
}

impl Seed {
    pub fn new(src: &[u8]) -> Result<Self, RngError> {
        if src.is_empty() || src.len() > MAX_SEED_LEN || src.len() % 4 != 0 {
            return Err(RngError::BadArg);
        }
        let mut bytes = [0u8; MAX_SEED_LEN];
        bytes[..src.len()].copy_from_slice(src);
        Ok(Seed {
            bytes,
            len: src.len(),
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// User configuration, validated once at instantiate.
///
/// The iseed/pstr enable flags of the hardware interface map onto the
/// `Option` fields here: a present value is an enabled flag.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Config {
    #[zeroize(skip)]
    pub mode: Mode,
    /// Generate calls permitted per seed. Unlimited when 0 in PTRNG.
    pub seed_life: u32,
    /// DF length multiplier; pre-DF seed material is `(dfmul + 1) * 16`
    /// bytes. Must be 0 when `df_disable` is set.
    pub dfmul: u32,
    /// Bypass the derivation function and load the seed raw (48 bytes
    /// on V1, one 16-byte DLEN block on V2).
    pub df_disable: bool,
    /// Permit caller-requested prediction-resistance reseeds.
    pub predict_en: bool,
    /// Initial seed, required in DRNG, forbidden elsewhere.
    pub init_seed: Option<Seed>,
    /// Personalization string mixed into the seed.
    pub pstr: Option<[u8; PSTR_LEN]>,
}

impl Config {
    pub fn iseed_en(&self) -> bool {
        self.init_seed.is_some()
    }

    pub fn pstr_en(&self) -> bool {
        self.pstr.is_some()
    }

    /// Length of the seed material staged by a reseed under this config.
    pub fn seed_len(&self, version: IpVersion) -> usize {
        version.seed_len(self.df_disable, self.dfmul)
    }

    /// Check the mode/flag compatibility rules and parameter domains.
    pub fn validate(&self, version: IpVersion) -> Result<(), RngError> {
        match (self.df_disable, self.dfmul) {
            (true, 0) => (),
            (false, m) if (DFMUL_MIN..=DFMUL_MAX).contains(&m) => (),
            _ => return Err(RngError::InvalidConfig),
        }

        match self.mode {
            Mode::Ptrng => {
                // Pure entropy mode has no seed, no reseed and no
                // personalization; all of those knobs must be off.
                if self.iseed_en()
                    || self.pstr_en()
                    || self.predict_en
                    || self.seed_life != 0
                {
                    return Err(RngError::InvalidConfig);
                }
            }
            Mode::Drng => {
                if !self.iseed_en() {
                    return Err(RngError::InvalidConfig);
                }
            }
            Mode::Hrng => {
                if self.iseed_en() {
                    return Err(RngError::InvalidConfig);
                }
            }
        }

        if let Some(seed) = &self.init_seed {
            if seed.len() != self.seed_len(version) {
                return Err(RngError::InvalidConfig);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drng_config(seed_len: usize) -> Config {
        Config {
            mode: Mode::Drng,
            seed_life: 5,
            dfmul: 2,
            df_disable: false,
            predict_en: false,
            init_seed: Some(Seed::new(&vec![0xA5; seed_len]).unwrap()),
            pstr: None,
        }
    }

    #[test]
    fn error_u32_round_trip() {
        for e in [
            RngError::BadArg,
            RngError::Timeout,
            RngError::Catastrophic,
            RngError::SelfTestFail,
        ] {
            assert_eq!(e, RngError::from(u32::from(e)));
        }
    }

    #[test]
    fn error_rand_core_round_trip() {
        let e = Error::from(RngError::EntropyHealth);
        assert_eq!(RngError::from(e), RngError::EntropyHealth);
    }

    #[test]
    fn drng_valid() {
        assert!(drng_config(48).validate(IpVersion::V1).is_ok());
    }

    #[test]
    fn drng_requires_seed() {
        let mut cfg = drng_config(48);
        cfg.init_seed = None;
        assert_eq!(
            cfg.validate(IpVersion::V1),
            Err(RngError::InvalidConfig)
        );
    }

    #[test]
    fn drng_seed_length_tracks_dfmul() {
        // dfmul=2 wants (2+1)*16 = 48 bytes
        assert!(drng_config(48).validate(IpVersion::V1).is_ok());
        assert!(drng_config(64).validate(IpVersion::V1).is_err());

        // dfmul=7 wants 128 bytes
        let mut cfg = drng_config(128);
        cfg.dfmul = 7;
        assert!(cfg.validate(IpVersion::V2).is_ok());
    }

    #[test]
    fn dfmul_domain() {
        let mut cfg = drng_config(48);
        cfg.dfmul = 1;
        assert!(cfg.validate(IpVersion::V1).is_err());
        cfg.dfmul = 10;
        assert!(cfg.validate(IpVersion::V1).is_err());

        // df_disable requires dfmul == 0 and a 48 byte seed
        let mut cfg = drng_config(48);
        cfg.df_disable = true;
        assert!(cfg.validate(IpVersion::V1).is_err());
        cfg.dfmul = 0;
        assert!(cfg.validate(IpVersion::V1).is_ok());
    }

    #[test]
    fn v2_raw_seed_is_one_dlen_block() {
        // With the DF bypassed V2 still clocks (dfmul+1)*16 = 16 bytes;
        // the 48-byte V1 shape must be refused.
        let mut cfg = drng_config(48);
        cfg.df_disable = true;
        cfg.dfmul = 0;
        assert!(cfg.validate(IpVersion::V2).is_err());

        cfg.init_seed = Some(Seed::new(&[0x5Au8; 16]).unwrap());
        assert!(cfg.validate(IpVersion::V2).is_ok());
        assert_eq!(cfg.seed_len(IpVersion::V2), 16);
        assert_eq!(cfg.seed_len(IpVersion::V1), SEED_LEN);
    }

    #[test]
    fn ptrng_forbids_seeding_knobs() {
        let base = Config {
            mode: Mode::Ptrng,
            seed_life: 0,
            dfmul: 0,
            df_disable: true,
            predict_en: false,
            init_seed: None,
            pstr: None,
        };
        assert!(base.validate(IpVersion::V1).is_ok());

        let mut cfg = base.clone();
        cfg.seed_life = 1;
        assert!(cfg.validate(IpVersion::V1).is_err());

        let mut cfg = base.clone();
        cfg.predict_en = true;
        assert!(cfg.validate(IpVersion::V1).is_err());

        let mut cfg = base.clone();
        cfg.pstr = Some([0u8; PSTR_LEN]);
        assert!(cfg.validate(IpVersion::V1).is_err());

        let mut cfg = base;
        cfg.init_seed = Some(Seed::new(&[1u8; 48]).unwrap());
        assert!(cfg.validate(IpVersion::V1).is_err());
    }

    #[test]
    fn hrng_forbids_init_seed() {
        let cfg = Config {
            mode: Mode::Hrng,
            seed_life: 10,
            dfmul: 7,
            df_disable: false,
            predict_en: false,
            init_seed: Some(Seed::new(&[1u8; 128]).unwrap()),
            pstr: None,
        };
        assert!(cfg.validate(IpVersion::V1).is_err());
    }

    #[test]
    fn seed_rejects_bad_lengths() {
        assert!(Seed::new(&[]).is_err());
        assert!(Seed::new(&[0u8; 7]).is_err());
        assert!(Seed::new(&[0u8; MAX_SEED_LEN + 4]).is_err());
        assert_eq!(Seed::new(&[0u8; 48]).unwrap().len(), 48);
    }
}
