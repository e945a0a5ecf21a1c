// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power-on self-tests.
//!
//! Each silicon revision has one known-answer vector: a fixed
//! seed/personalization pair whose first 32 generated bytes are pinned.
//! A mismatch means the cipher pipeline or the DRBG core is broken and
//! the device must not be used. The health test exercises the live
//! entropy path the same way, minus the fixed answer.

use crate::engine::Trng;
use crate::regs::TrngPort;
use drv_rng_api::{
    Config, IpVersion, Mode, RngError, Seed, PSTR_LEN, SECURITY_STRENGTH,
};

const KAT_V1_SEED: [u8; 48] = [
    0x3b, 0xc3, 0xed, 0x64, 0xf4, 0x80, 0x1c, 0xc7, 0x14, 0xcc, 0x35, 0xed,
    0x57, 0x01, 0x2a, 0xe4, 0xbc, 0xef, 0xde, 0xf6, 0x7c, 0x46, 0xa6, 0x34,
    0xc6, 0x79, 0xe8, 0x91, 0x5d, 0xb1, 0xdb, 0xa7, 0x49, 0xa5, 0xbb, 0x4f,
    0xed, 0x30, 0xb3, 0x7b, 0xa9, 0x8b, 0xf5, 0x56, 0x4d, 0x40, 0x18, 0x9f,
];

const KAT_V1_PSTR: [u8; PSTR_LEN] = [
    0xb2, 0x80, 0x7e, 0x4c, 0xd0, 0xe4, 0xe2, 0xa9, 0x2f, 0x1f, 0x5d, 0xc1,
    0xa2, 0x1f, 0x40, 0xfc, 0x1f, 0x24, 0x5d, 0x42, 0x61, 0x80, 0xe6, 0xe9,
    0x71, 0x05, 0x17, 0x5b, 0xaf, 0x70, 0x30, 0x18, 0xbc, 0x23, 0x18, 0x15,
    0xcb, 0xb8, 0xa6, 0x3e, 0x83, 0xb8, 0x4a, 0xfe, 0x38, 0xfc, 0x25, 0x87,
];

pub const KAT_V1_EXPECTED: [u8; SECURITY_STRENGTH] = [
    0x91, 0x9a, 0x6b, 0x99, 0xd5, 0xbc, 0x2c, 0x11, 0x5f, 0x3a, 0xfc, 0x0b,
    0x0e, 0x7b, 0xc7, 0x69, 0x4d, 0xe1, 0xe5, 0xfe, 0x59, 0x9e, 0xaa, 0x41,
    0xd3, 0x48, 0xfd, 0x3d, 0xd2, 0xc4, 0x50, 0x1e,
];

const KAT_V2_SEED: [u8; 128] = [
    0xe4, 0x9b, 0xf6, 0x80, 0xb2, 0x14, 0xb2, 0xc6, 0x20, 0x4f, 0x26, 0x1a,
    0x0e, 0xd8, 0xe9, 0x76, 0x51, 0x48, 0x61, 0xa4, 0x60, 0x6e, 0x1d, 0x7a,
    0x62, 0x0a, 0x2f, 0xd1, 0x2e, 0x2b, 0xf1, 0x23, 0x13, 0x65, 0x2c, 0x45,
    0x00, 0x08, 0x06, 0xf7, 0xff, 0xf9, 0x0d, 0x77, 0x2a, 0x3b, 0x43, 0x7f,
    0xdf, 0x99, 0x2e, 0x21, 0x49, 0xd2, 0xee, 0xfd, 0x97, 0x08, 0x08, 0xd4,
    0x4c, 0xe7, 0xcb, 0xa1, 0x1e, 0x96, 0xa0, 0x3f, 0x38, 0x7c, 0x38, 0x7d,
    0x15, 0xce, 0x30, 0x99, 0xd1, 0xe4, 0xcb, 0x47, 0x81, 0xeb, 0x60, 0xa2,
    0x74, 0x00, 0xbd, 0x0b, 0xb2, 0xe4, 0x58, 0x12, 0x55, 0x63, 0x23, 0x4a,
    0xec, 0xe0, 0x59, 0xd3, 0x7d, 0x37, 0x88, 0x05, 0xa0, 0xa3, 0x93, 0x02,
    0x24, 0x6a, 0x05, 0x8f, 0x5e, 0xef, 0x0b, 0xf2, 0xd7, 0x81, 0xc5, 0xf6,
    0xa9, 0x48, 0x62, 0x3d, 0x17, 0xed, 0xc8, 0xaf,
];

const KAT_V2_RESEED: [u8; 128] = [
    0x8a, 0x4e, 0x28, 0x68, 0x66, 0x20, 0x28, 0x63, 0x4d, 0xd4, 0x98, 0xe5,
    0x39, 0x75, 0xb6, 0xfc, 0x6c, 0xc5, 0x83, 0x44, 0x18, 0x36, 0x5a, 0xad,
    0x61, 0x83, 0xb9, 0xd5, 0x80, 0xc0, 0xbc, 0xb1, 0x6e, 0x16, 0xad, 0x7f,
    0x23, 0x65, 0x3b, 0x8f, 0x21, 0xf0, 0x51, 0x8c, 0x53, 0x46, 0x22, 0xc9,
    0x94, 0x75, 0x5e, 0xe6, 0x49, 0x91, 0x0e, 0xe4, 0x97, 0xdd, 0x4d, 0x2f,
    0x8f, 0x82, 0x95, 0x7b, 0x42, 0x1f, 0x28, 0x3e, 0x35, 0xd5, 0x2d, 0x9d,
    0x02, 0x2b, 0xa6, 0x3b, 0x10, 0x1f, 0x98, 0xed, 0xeb, 0x15, 0x7b, 0x02,
    0x1a, 0x67, 0xbe, 0xe5, 0xf8, 0xff, 0xd0, 0x23, 0x5c, 0xf3, 0xc9, 0x80,
    0xc2, 0xa4, 0x31, 0xbd, 0x30, 0x8a, 0x19, 0xdb, 0xb6, 0x41, 0xd7, 0xa5,
    0x0b, 0x6d, 0xc1, 0xb1, 0x7b, 0x74, 0x28, 0x3a, 0x5d, 0x3a, 0x72, 0x80,
    0xdc, 0x08, 0x9a, 0x6e, 0xab, 0x5e, 0xb2, 0xff,
];

const KAT_V2_PSTR: [u8; PSTR_LEN] = [
    0xed, 0xac, 0x42, 0x70, 0xb8, 0x2a, 0x5a, 0xd3, 0xb5, 0xcb, 0xd6, 0xac,
    0xb6, 0x3d, 0xc8, 0x9f, 0x09, 0x2f, 0xcd, 0xfe, 0x2a, 0x5a, 0xc1, 0x15,
    0x6e, 0xb4, 0xec, 0x9d, 0x26, 0x12, 0x84, 0xfa, 0x5f, 0x8f, 0x1a, 0x15,
    0x6c, 0xdc, 0x87, 0x9a, 0x47, 0x2c, 0x44, 0x1f, 0x5d, 0x9e, 0xd4, 0xb7,
];

pub const KAT_V2_EXPECTED: [u8; SECURITY_STRENGTH] = [
    0xee, 0xa7, 0x5b, 0xb6, 0x2b, 0x97, 0xf0, 0xc0, 0x0f, 0xd6, 0xab, 0x13,
    0x00, 0x87, 0x7e, 0xf4, 0x00, 0x7f, 0xd7, 0x56, 0xfe, 0xe5, 0xdf, 0xa6,
    0x55, 0x5b, 0xb2, 0x86, 0xdd, 0x81, 0x73, 0xb2,
];

/// Run the known-answer test for the instance's silicon revision. The
/// instance must be (and is left) uninitialized.
pub fn kat<P: TrngPort>(trng: &mut Trng<P>) -> Result<(), RngError> {
    match trng.version() {
        IpVersion::V1 => kat_v1(trng),
        IpVersion::V2 => kat_v2(trng),
    }
}

/// V1 vector: externally seeded, DF over a 48-byte seed plus
/// personalization string, first 32 output bytes pinned.
pub fn kat_v1<P: TrngPort>(trng: &mut Trng<P>) -> Result<(), RngError> {
    let cfg = Config {
        mode: Mode::Drng,
        seed_life: 5,
        dfmul: 2,
        df_disable: false,
        predict_en: false,
        init_seed: Some(Seed::new(&KAT_V1_SEED)?),
        pstr: Some(KAT_V1_PSTR),
    };
    trng.instantiate(&cfg)?;

    let mut out = [0u8; SECURITY_STRENGTH];
    trng.generate(&mut out, false)?;
    finish_kat(trng, &out, &KAT_V1_EXPECTED)
}

/// V2 vector: serial 128-byte seed, a reseed with a second fixed seed,
/// then the pinned 32 bytes.
pub fn kat_v2<P: TrngPort>(trng: &mut Trng<P>) -> Result<(), RngError> {
    let cfg = Config {
        mode: Mode::Drng,
        seed_life: 2,
        dfmul: 7,
        df_disable: false,
        predict_en: false,
        init_seed: Some(Seed::new(&KAT_V2_SEED)?),
        pstr: Some(KAT_V2_PSTR),
    };
    trng.instantiate(&cfg)?;
    trng.reseed(Some(&KAT_V2_RESEED), 7)?;

    let mut out = [0u8; SECURITY_STRENGTH];
    trng.generate(&mut out, false)?;
    finish_kat(trng, &out, &KAT_V2_EXPECTED)
}

fn finish_kat<P: TrngPort>(
    trng: &mut Trng<P>,
    out: &[u8; SECURITY_STRENGTH],
    expected: &[u8; SECURITY_STRENGTH],
) -> Result<(), RngError> {
    if out != expected {
        log::error!("known-answer test mismatch; refusing to run");
        trng.mark_error();
        return Err(RngError::SelfTestFail);
    }
    trng.release();
    Ok(())
}

/// Smoke test of the live entropy path: seed the DRBG from the
/// oscillators through the DF, then tear back down.
pub fn health_test<P: TrngPort>(trng: &mut Trng<P>) -> Result<(), RngError> {
    let cfg = Config {
        mode: Mode::Hrng,
        seed_life: 10,
        dfmul: 7,
        df_disable: false,
        predict_en: false,
        init_seed: None,
        pstr: None,
    };
    trng.instantiate(&cfg)?;
    trng.release();
    Ok(())
}
