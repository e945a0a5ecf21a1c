// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scripted register back-end.
//!
//! Replays queued core output, models the status flags the state machine
//! polls, and records every register write so tests can pin exact
//! hardware sequences. Fault injection covers the cases the driver must
//! survive: certification failures, deterministic test failures, stuck
//! bursts, serial-bit corruption and a hung reseed.

use std::collections::VecDeque;

use crate::regs::{self, ctrl, status, TrngPort};

const NREGS: usize = 64;

pub struct FakeTrng {
    regs: [u32; NREGS],
    /// Every write, in order, as (offset, value).
    pub writes: Vec<(usize, u32)>,
    /// Word FIFO backing CORE_OUTPUT for entropy and generate reads.
    pub output: VecDeque<u32>,
    /// Raise CERTF alongside DONE.
    pub certf_on_done: bool,
    /// Never report DONE.
    pub hang_done: bool,
    /// Raise DTF once this many bursts have been consumed.
    pub dtf_after_bursts: Option<usize>,
    /// Flip the nth CTRL_4 read-back bit.
    pub corrupt_serial_read: Option<usize>,
    /// Accumulated delay_us time.
    pub slept_us: u64,
    started: bool,
    words_read: usize,
    serial_reads: usize,
}

impl FakeTrng {
    pub fn new() -> Self {
        FakeTrng {
            regs: [0u32; NREGS],
            writes: Vec::new(),
            output: VecDeque::new(),
            certf_on_done: false,
            hang_done: false,
            dtf_after_bursts: None,
            corrupt_serial_read: None,
            slept_us: 0,
            started: false,
            words_read: 0,
            serial_reads: 0,
        }
    }

    /// Queue a big-endian byte stream as CORE_OUTPUT words. The driver's
    /// word swap hands these exact bytes back to its caller.
    pub fn push_output(&mut self, bytes: &[u8]) {
        assert_eq!(bytes.len() % 4, 0);
        for chunk in bytes.chunks_exact(4) {
            self.output.push_back(regs::word_from_bytes(chunk));
        }
    }

    /// Last value written to a register.
    pub fn reg(&self, offset: usize) -> u32 {
        self.regs[offset / 4]
    }

    /// Whether any write touched the `nwords`-word bank at `base`.
    pub fn wrote_in_range(&self, base: usize, nwords: usize) -> bool {
        self.writes
            .iter()
            .any(|&(o, _)| o >= base && o < base + nwords * 4)
    }
}

impl Default for FakeTrng {
    fn default() -> Self {
        Self::new()
    }
}

impl TrngPort for FakeTrng {
    fn read_reg(&mut self, offset: usize) -> u32 {
        match offset {
            regs::STATUS => {
                let mut v = 0;
                if !self.output.is_empty() {
                    v |= status::QCNT_FULL;
                }
                if self.started && !self.hang_done {
                    v |= status::DONE;
                    if self.certf_on_done {
                        v |= status::CERTF;
                    }
                }
                if let Some(n) = self.dtf_after_bursts {
                    if self.words_read / 4 >= n {
                        v |= status::DTF;
                    }
                }
                v
            }
            regs::CORE_OUTPUT => {
                self.words_read += 1;
                self.output.pop_front().unwrap_or(0)
            }
            regs::CTRL_4 => {
                let mut v = self.regs[regs::CTRL_4 / 4] & 1;
                if self.corrupt_serial_read == Some(self.serial_reads) {
                    v ^= 1;
                }
                self.serial_reads += 1;
                v
            }
            _ => self.regs[offset / 4],
        }
    }

    fn write_reg(&mut self, offset: usize, val: u32) {
        self.writes.push((offset, val));
        self.regs[offset / 4] = val;
        if offset == regs::CTRL && val & ctrl::PRNGSTART != 0 {
            self.started = true;
        }
    }

    fn delay_us(&mut self, us: u32) {
        self.slept_us += u64::from(us);
    }
}
