// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Block cipher used by the derivation function.
//!
//! Encrypt-only, fixed at 14 rounds over 16-byte blocks with a 32-byte
//! key. The round transform fuses the substitution and column-mix steps
//! through three lookup tables derived from the base s-box at compile
//! time. Nothing here is exposed outside the crate.

use static_assertions::const_assert_eq;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub(crate) const BLOCK_LEN: usize = 16;
pub(crate) const KEY_LEN: usize = 32;

const ROUNDS: usize = 14;
const SCHED_LEN: usize = BLOCK_LEN * (ROUNDS + 1);

const_assert_eq!(SCHED_LEN, 240);

#[rustfmt::skip]
const SBOX: [u8; 256] = [
    0x63, 0x7c, 0x77, 0x7b, 0xf2, 0x6b, 0x6f, 0xc5,
    0x30, 0x01, 0x67, 0x2b, 0xfe, 0xd7, 0xab, 0x76,
    0xca, 0x82, 0xc9, 0x7d, 0xfa, 0x59, 0x47, 0xf0,
    0xad, 0xd4, 0xa2, 0xaf, 0x9c, 0xa4, 0x72, 0xc0,
    0xb7, 0xfd, 0x93, 0x26, 0x36, 0x3f, 0xf7, 0xcc,
    0x34, 0xa5, 0xe5, 0xf1, 0x71, 0xd8, 0x31, 0x15,
    0x04, 0xc7, 0x23, 0xc3, 0x18, 0x96, 0x05, 0x9a,
    0x07, 0x12, 0x80, 0xe2, 0xeb, 0x27, 0xb2, 0x75,
    0x09, 0x83, 0x2c, 0x1a, 0x1b, 0x6e, 0x5a, 0xa0,
    0x52, 0x3b, 0xd6, 0xb3, 0x29, 0xe3, 0x2f, 0x84,
    0x53, 0xd1, 0x00, 0xed, 0x20, 0xfc, 0xb1, 0x5b,
    0x6a, 0xcb, 0xbe, 0x39, 0x4a, 0x4c, 0x58, 0xcf,
    0xd0, 0xef, 0xaa, 0xfb, 0x43, 0x4d, 0x33, 0x85,
    0x45, 0xf9, 0x02, 0x7f, 0x50, 0x3c, 0x9f, 0xa8,
    0x51, 0xa3, 0x40, 0x8f, 0x92, 0x9d, 0x38, 0xf5,
    0xbc, 0xb6, 0xda, 0x21, 0x10, 0xff, 0xf3, 0xd2,
    0xcd, 0x0c, 0x13, 0xec, 0x5f, 0x97, 0x44, 0x17,
    0xc4, 0xa7, 0x7e, 0x3d, 0x64, 0x5d, 0x19, 0x73,
    0x60, 0x81, 0x4f, 0xdc, 0x22, 0x2a, 0x90, 0x88,
    0x46, 0xee, 0xb8, 0x14, 0xde, 0x5e, 0x0b, 0xdb,
    0xe0, 0x32, 0x3a, 0x0a, 0x49, 0x06, 0x24, 0x5c,
    0xc2, 0xd3, 0xac, 0x62, 0x91, 0x95, 0xe4, 0x79,
    0xe7, 0xc8, 0x37, 0x6d, 0x8d, 0xd5, 0x4e, 0xa9,
    0x6c, 0x56, 0xf4, 0xea, 0x65, 0x7a, 0xae, 0x08,
    0xba, 0x78, 0x25, 0x2e, 0x1c, 0xa6, 0xb4, 0xc6,
    0xe8, 0xdd, 0x74, 0x1f, 0x4b, 0xbd, 0x8b, 0x8a,
    0x70, 0x3e, 0xb5, 0x66, 0x48, 0x03, 0xf6, 0x0e,
    0x61, 0x35, 0x57, 0xb9, 0x86, 0xc1, 0x1d, 0x9e,
    0xe1, 0xf8, 0x98, 0x11, 0x69, 0xd9, 0x8e, 0x94,
    0x9b, 0x1e, 0x87, 0xe9, 0xce, 0x55, 0x28, 0xdf,
    0x8c, 0xa1, 0x89, 0x0d, 0xbf, 0xe6, 0x42, 0x68,
    0x41, 0x99, 0x2d, 0x0f, 0xb0, 0x54, 0xbb, 0x16,
];

const fn derive_x2(s: &[u8; 256]) -> [u8; 256] {
    let mut t = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let x = s[i];
        t[i] = (x << 1) ^ (if x & 0x80 != 0 { 0x1b } else { 0 });
        i += 1;
    }
    t
}

const fn derive_x3(s: &[u8; 256], s2: &[u8; 256]) -> [u8; 256] {
    let mut t = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        t[i] = s2[i] ^ s[i];
        i += 1;
    }
    t
}

const SBOX_X2: [u8; 256] = derive_x2(&SBOX);
const SBOX_X3: [u8; 256] = derive_x3(&SBOX, &SBOX_X2);

// Round constants for the key schedule; index (word / 8) - 1.
const RCON: [u8; 7] = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40];

/// Substitute and column-mix in one pass, reading each input byte at its
/// row-shifted position.
fn mix_column_sbox(inp: &[u8; BLOCK_LEN], out: &mut [u8; BLOCK_LEN]) {
    for c in 0..4 {
        let a0 = inp[4 * c] as usize;
        let a1 = inp[(4 * (c + 1) + 1) % BLOCK_LEN] as usize;
        let a2 = inp[(4 * (c + 2) + 2) % BLOCK_LEN] as usize;
        let a3 = inp[(4 * (c + 3) + 3) % BLOCK_LEN] as usize;

        out[4 * c] = SBOX_X2[a0] ^ SBOX_X3[a1] ^ SBOX[a2] ^ SBOX[a3];
        out[4 * c + 1] = SBOX[a0] ^ SBOX_X2[a1] ^ SBOX_X3[a2] ^ SBOX[a3];
        out[4 * c + 2] = SBOX[a0] ^ SBOX[a1] ^ SBOX_X2[a2] ^ SBOX_X3[a3];
        out[4 * c + 3] = SBOX_X3[a0] ^ SBOX[a1] ^ SBOX[a2] ^ SBOX_X2[a3];
    }
}

/// Substitute-and-shift only; the final round has no column mix.
fn shift_row_sbox(inp: &[u8; BLOCK_LEN], out: &mut [u8; BLOCK_LEN]) {
    for c in 0..4 {
        for r in 0..4 {
            out[4 * c + r] =
                SBOX[inp[(4 * (c + r) + r) % BLOCK_LEN] as usize];
        }
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct BlockCipher {
    sched: [u8; SCHED_LEN],
}

impl BlockCipher {
    pub fn new() -> Self {
        BlockCipher {
            sched: [0u8; SCHED_LEN],
        }
    }

    /// Expand a 32-byte key into the round schedule.
    pub fn set_key(&mut self, key: &[u8; KEY_LEN]) {
        self.sched[..KEY_LEN].copy_from_slice(key);

        let mut i = KEY_LEN;
        while i < SCHED_LEN {
            let mut t = [
                self.sched[i - 4],
                self.sched[i - 3],
                self.sched[i - 2],
                self.sched[i - 1],
            ];
            let word = i / 4;
            if word % 8 == 0 {
                t.rotate_left(1);
                for b in t.iter_mut() {
                    *b = SBOX[*b as usize];
                }
                t[0] ^= RCON[word / 8 - 1];
            } else if word % 8 == 4 {
                for b in t.iter_mut() {
                    *b = SBOX[*b as usize];
                }
            }
            for (j, tb) in t.iter().enumerate() {
                self.sched[i + j] = self.sched[i + j - KEY_LEN] ^ tb;
            }
            i += 4;
        }
    }

    pub fn encrypt(
        &self,
        input: &[u8; BLOCK_LEN],
        out: &mut [u8; BLOCK_LEN],
    ) {
        let mut state = [0u8; BLOCK_LEN];
        for (j, b) in state.iter_mut().enumerate() {
            *b = input[j] ^ self.sched[j];
        }

        let mut mixed = [0u8; BLOCK_LEN];
        for round in 1..ROUNDS {
            mix_column_sbox(&state, &mut mixed);
            let rk = &self.sched[round * BLOCK_LEN..(round + 1) * BLOCK_LEN];
            for j in 0..BLOCK_LEN {
                state[j] = mixed[j] ^ rk[j];
            }
        }

        shift_row_sbox(&state, &mut mixed);
        let rk = &self.sched[ROUNDS * BLOCK_LEN..];
        for j in 0..BLOCK_LEN {
            out[j] = mixed[j] ^ rk[j];
        }
    }

    /// CBC-MAC chain: XOR each block into `iv`, then encrypt `iv` in
    /// place. `data` must hold at least `nblocks` full blocks.
    pub fn checksum(
        &self,
        data: &[u8],
        iv: &mut [u8; BLOCK_LEN],
        nblocks: usize,
    ) {
        for block in data.chunks_exact(BLOCK_LEN).take(nblocks) {
            for (j, b) in block.iter().enumerate() {
                iv[j] ^= b;
            }
            let chained = *iv;
            self.encrypt(&chained, iv);
        }
    }
}
