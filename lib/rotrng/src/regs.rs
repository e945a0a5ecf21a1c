// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register map and access primitives.
//!
//! The IP has no published PAC, so the map lives here as offset and bit
//! constants. All device access funnels through the [`TrngPort`] trait
//! so the state machine can run against real MMIO or a scripted test
//! device; [`Mmio`] is the hardware implementation.

use byteorder::{BigEndian, ByteOrder};
use drv_rng_api::RngError;

pub const STATUS: usize = 0x04;
pub const CTRL: usize = 0x08;
pub const CTRL_2: usize = 0x0c;
pub const CTRL_3: usize = 0x10;
pub const CTRL_4: usize = 0x14;
pub const EXT_SEED: usize = 0x40;
pub const PER_STRING: usize = 0x80;
pub const CORE_OUTPUT: usize = 0xc0;
pub const RESET: usize = 0xd0;
pub const OSC_EN: usize = 0xd4;

/// Size of the EXT_SEED and PER_STRING register banks, in 32-bit words.
pub const SEED_WORDS: usize = 12;

pub mod status {
    pub const DONE: u32 = 1 << 0;
    pub const DTF: u32 = 1 << 1;
    pub const CERTF: u32 = 1 << 3;
    pub const QCNT_SHIFT: u32 = 9;
    pub const QCNT_MASK: u32 = 0x7 << QCNT_SHIFT;
    /// A full 16-byte burst is queued when QCNT reads 4.
    pub const QCNT_FULL: u32 = 4 << QCNT_SHIFT;
}

pub mod ctrl {
    pub const PRNGSRST: u32 = 1 << 0;
    pub const TRSSEN: u32 = 1 << 2;
    pub const PRNGXS: u32 = 1 << 3;
    pub const PRNGSTART: u32 = 1 << 5;
    pub const TSTMODE: u32 = 1 << 6;
    /// Set for generate requests, clear for reseed requests.
    pub const PRNGMODE: u32 = 1 << 7;
    pub const EUMODE: u32 = 1 << 8;
    pub const SINGLEGENMODE: u32 = 1 << 9;
    pub const PERSODISABLE: u32 = 1 << 10;
}

pub mod ctrl2 {
    pub const DIT_MASK: u32 = 0x1f;
    pub const RCT_SHIFT: u32 = 8;
    pub const RCT_MASK: u32 = 0x1ff << RCT_SHIFT;
}

pub mod ctrl3 {
    pub const DLEN_MASK: u32 = 0xff;
    pub const APT_SHIFT: u32 = 8;
    pub const APT_MASK: u32 = 0x3ff << APT_SHIFT;
}

pub const RESET_DELAY_US: u32 = 10;
pub const GENERATE_TIMEOUT_US: u32 = 8_000;
pub const RESEED_TIMEOUT_US: u32 = 1_500_000;

// The serial seed interface needs 2 seed clocks of settling per byte and
// 700 every 8 bytes; expressed here in microseconds at the slowest
// supported seed clock.
pub const SERIAL_BYTE_SETTLE_US: u32 = 1;
pub const SERIAL_BLOCK_SETTLE_US: u32 = 10;

/// Abstract register window. Real hardware goes through [`Mmio`]; tests
/// drive the engine with a scripted device.
///
/// Reads take `&mut self` because reading CORE_OUTPUT pops the burst
/// FIFO on the device side.
pub trait TrngPort {
    fn read_reg(&mut self, offset: usize) -> u32;
    fn write_reg(&mut self, offset: usize, val: u32);
    fn delay_us(&mut self, us: u32);
}

/// Volatile MMIO port over the device's mapped register window.
pub struct Mmio {
    base: *mut u8,
    udelay: fn(u32),
}

impl Mmio {
    /// # Safety
    ///
    /// `base` must be the virtual address of the device's register
    /// window, mapped device-memory for the lifetime of the port, and
    /// not aliased by another driver instance.
    pub unsafe fn new(base: *mut u8, udelay: fn(u32)) -> Self {
        Mmio { base, udelay }
    }
}

impl TrngPort for Mmio {
    fn read_reg(&mut self, offset: usize) -> u32 {
        // Offsets come from the constants in this module and stay inside
        // the mapped window.
        unsafe {
            core::ptr::read_volatile(self.base.add(offset) as *const u32)
        }
    }

    fn write_reg(&mut self, offset: usize, val: u32) {
        unsafe {
            core::ptr::write_volatile(self.base.add(offset) as *mut u32, val)
        }
    }

    fn delay_us(&mut self, us: u32) {
        (self.udelay)(us)
    }
}

/// Read-modify-write the masked field of a register.
pub fn update_reg<P: TrngPort>(
    port: &mut P,
    offset: usize,
    mask: u32,
    val: u32,
) {
    let cur = port.read_reg(offset);
    port.write_reg(offset, (cur & !mask) | (val & mask));
}

/// Poll `offset` until `(value & mask) == expect` or the deadline lapses.
/// Returns the last value read so callers can inspect neighboring bits.
///
/// The polling thread may be descheduled for longer than the whole
/// deadline, so one final sample is taken after the loop before the poll
/// is declared a timeout.
pub fn wait_for_event<P: TrngPort>(
    port: &mut P,
    offset: usize,
    mask: u32,
    expect: u32,
    timeout_us: u32,
) -> Result<u32, RngError> {
    let mut remaining = timeout_us;
    while remaining > 0 {
        let val = port.read_reg(offset);
        if val & mask == expect {
            return Ok(val);
        }
        port.delay_us(1);
        remaining -= 1;
    }

    let val = port.read_reg(offset);
    if val & mask == expect {
        Ok(val)
    } else {
        Err(RngError::Timeout)
    }
}

/// The single byte↔word conversion point: seed material and core output
/// are both big-endian byte streams at the register interface.
pub fn word_from_bytes(bytes: &[u8]) -> u32 {
    BigEndian::read_u32(bytes)
}

pub fn word_to_bytes(word: u32, bytes: &mut [u8]) {
    BigEndian::write_u32(bytes, word)
}

/// Parallel load of a 48-byte stream into a 12-word register bank.
///
/// The hardware consumes the stream high-word-first: input word `i`
/// lands at `base + (11 - i) * 4`. `None` loads zeros.
pub fn load_words<P: TrngPort>(
    port: &mut P,
    base: usize,
    data: Option<&[u8]>,
) {
    if let Some(d) = data {
        debug_assert_eq!(d.len(), SEED_WORDS * 4);
    }
    for i in 0..SEED_WORDS {
        let word = match data {
            Some(d) => word_from_bytes(&d[i * 4..i * 4 + 4]),
            None => 0,
        };
        port.write_reg(base + (SEED_WORDS - 1 - i) * 4, word);
    }
}

/// Serial seed load for the V2 revision: every bit of every byte is
/// shifted MSB-first into CTRL_4 while PRNGSTART is held. Each byte is
/// reconstructed from CTRL_4 read-backs and verified against the source
/// before moving on.
pub fn load_serial<P: TrngPort>(
    port: &mut P,
    seed: &[u8],
) -> Result<(), RngError> {
    for (i, &byte) in seed.iter().enumerate() {
        let mut echo: u8 = 0;
        for bit in (0..8).rev() {
            port.write_reg(CTRL_4, u32::from((byte >> bit) & 1));
            echo = (echo << 1) | (port.read_reg(CTRL_4) & 1) as u8;
        }
        if echo != byte {
            return Err(RngError::SeedLoadFault);
        }
        port.delay_us(SERIAL_BYTE_SETTLE_US);
        if (i + 1) % 8 == 0 {
            port.delay_us(SERIAL_BLOCK_SETTLE_US);
        }
    }
    Ok(())
}

/// Zero a register bank.
pub fn zero_words<P: TrngPort>(port: &mut P, base: usize, nwords: usize) {
    for i in 0..nwords {
        port.write_reg(base + i * 4, 0);
    }
}
