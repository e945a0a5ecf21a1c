// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Block-cipher derivation function, NIST SP 800-90A §10.3.2/10.3.3.
//!
//! Distills variable-length entropy (plus an optional personalization
//! string) into either a 48-byte DRBG seed or a 32-byte random output.
//! The input is packed into one formatted block:
//!
//! ```text
//! | iv_counter (4) | L (4) | N (4) | entropy | pstr? | 0x80 | 0.. |
//! ```
//!
//! with big-endian length fields, then run through a CBC-MAC pass keyed
//! with the fixed DF key and a chained-encryption pass keyed with the
//! CBC-MAC output.

use byteorder::{BigEndian, ByteOrder};
use static_assertions::const_assert;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::{BlockCipher, BLOCK_LEN, KEY_LEN};
use drv_rng_api::{RngError, MAX_SEED_LEN, PSTR_LEN, SECURITY_STRENGTH, SEED_LEN};

// iv_counter + L + N
const HEADER_LEN: usize = 12;

// Worst case: header, maximum entropy, personalization string, one pad
// byte, rounded up to a whole block.
pub(crate) const DF_INPUT_LEN: usize = 224;

const_assert!(DF_INPUT_LEN % BLOCK_LEN == 0);
const_assert!(DF_INPUT_LEN >= HEADER_LEN + MAX_SEED_LEN + PSTR_LEN + 1);
const_assert!(SEED_LEN == KEY_LEN + BLOCK_LEN);

const fn df_key() -> [u8; KEY_LEN] {
    let mut k = [0u8; KEY_LEN];
    let mut i = 0;
    while i < KEY_LEN {
        k[i] = i as u8;
        i += 1;
    }
    k
}

const DF_KEY: [u8; KEY_LEN] = df_key();

/// Which of the two fixed output shapes the caller wants.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum DfOutput {
    /// 48-byte DRBG seed.
    Seed,
    /// 32-byte conditioned random output (PTRNG with DF).
    Rand,
}

impl DfOutput {
    fn len(self) -> usize {
        match self {
            DfOutput::Seed => SEED_LEN,
            DfOutput::Rand => SECURITY_STRENGTH,
        }
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct DerivationFunction {
    cipher: BlockCipher,
    input: [u8; DF_INPUT_LEN],
}

impl DerivationFunction {
    pub fn new() -> Self {
        DerivationFunction {
            cipher: BlockCipher::new(),
            input: [0u8; DF_INPUT_LEN],
        }
    }

    /// Run the two-pass derivation over `entropy` (and `pstr` when
    /// present) into `out`, which must be exactly the length `what`
    /// selects.
    pub fn derive(
        &mut self,
        entropy: &[u8],
        pstr: Option<&[u8; PSTR_LEN]>,
        what: DfOutput,
        out: &mut [u8],
    ) -> Result<(), RngError> {
        if entropy.is_empty() || entropy.len() > MAX_SEED_LEN {
            return Err(RngError::BadArg);
        }
        if out.len() != what.len() {
            return Err(RngError::BadArg);
        }

        let raw_len = entropy.len() + pstr.map_or(0, |p| p.len());

        // Pack the formatted block. Building it front to back leaves the
        // pad and the zero tail in place without any overlapping moves.
        self.input.zeroize();
        BigEndian::write_u32(&mut self.input[4..8], raw_len as u32);
        BigEndian::write_u32(&mut self.input[8..12], what.len() as u32);
        let mut off = HEADER_LEN;
        self.input[off..off + entropy.len()].copy_from_slice(entropy);
        off += entropy.len();
        if let Some(p) = pstr {
            self.input[off..off + PSTR_LEN].copy_from_slice(p);
            off += PSTR_LEN;
        }
        self.input[off] = 0x80;
        off += 1;
        let padded = (off + BLOCK_LEN - 1) / BLOCK_LEN * BLOCK_LEN;
        let nblocks = padded / BLOCK_LEN;

        // First pass: CBC-MAC under the fixed key, one block of key
        // stream per counter value.
        self.cipher.set_key(&DF_KEY);
        let mut temp = [0u8; SEED_LEN];
        for blk in 0..SEED_LEN / BLOCK_LEN {
            BigEndian::write_u32(&mut self.input[0..4], blk as u32);
            let mut iv = [0u8; BLOCK_LEN];
            self.cipher.checksum(&self.input[..padded], &mut iv, nblocks);
            temp[blk * BLOCK_LEN..(blk + 1) * BLOCK_LEN]
                .copy_from_slice(&iv);
        }

        // Second pass: re-key with K = temp[0..32] and chain-encrypt
        // X = temp[32..48] forward until enough output accumulates.
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&temp[..KEY_LEN]);
        self.cipher.set_key(&key);
        key.zeroize();

        let mut x = [0u8; BLOCK_LEN];
        x.copy_from_slice(&temp[KEY_LEN..]);
        temp.zeroize();

        for chunk in out.chunks_exact_mut(BLOCK_LEN) {
            let mut block = [0u8; BLOCK_LEN];
            self.cipher.encrypt(&x, &mut block);
            chunk.copy_from_slice(&block);
            x = block;
        }
        x.zeroize();

        Ok(())
    }
}
