// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Instance state machine: reset → instantiate → (reseed ↔ generate)* →
//! release, plus the fault transitions into [`Status::Error`] and the
//! sticky [`Status::Catastrophic`].
//!
//! The caller serializes access; nothing here locks. All device traffic
//! goes through the owned [`TrngPort`].

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::df::{DerivationFunction, DfOutput};
use crate::regs::{self, ctrl, ctrl2, ctrl3, status, TrngPort};
use drv_rng_api::{
    Config, IpVersion, Mode, RngError, DFMUL_MAX, DFMUL_MIN, MAX_SEED_LEN,
    SECURITY_STRENGTH, SEED_LEN,
};

/// The core emits output in 16-byte bursts (four words of QCNT).
pub const BURST_LEN: usize = 16;

// V2 on-line health test defaults: SP 800-90B RCT/APT cutoffs for the
// binary noise source at the silicon's nominal digitization interval.
const DEFAULT_DIT: u32 = 4;
const DEFAULT_RCT_CUTOFF: u32 = 31;
const DEFAULT_APT_CUTOFF: u32 = 325;

/// Instance lifecycle status.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Uninitialized,
    Healthy,
    /// Recoverable fault; release and re-instantiate to continue.
    Error,
    /// Deterministic-test or stuck-output fault. Sticky: only release
    /// plus a fresh known-answer test may bring the device back.
    Catastrophic,
}

/// Generation counters, reset on every reseed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub bytes_since_reseed: u64,
    pub bytes_total: u64,
    pub elapsed_seed_life: u32,
}

/// Secret-bearing working buffers, wiped on release and on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct Staged {
    /// Pre-DF seed material: collected entropy or the caller's seed.
    entropy: [u8; MAX_SEED_LEN],
    /// Working seed as loaded into the EXT_SEED bank.
    seed: [u8; SEED_LEN],
    /// Previous output burst, for stuck-output detection.
    last_burst: [u8; BURST_LEN],
}

impl Staged {
    fn new() -> Self {
        Staged {
            entropy: [0u8; MAX_SEED_LEN],
            seed: [0u8; SEED_LEN],
            last_burst: [0u8; BURST_LEN],
        }
    }
}

pub struct Trng<P: TrngPort> {
    port: P,
    version: IpVersion,
    status: Status,
    cfg: Option<Config>,
    stats: Stats,
    df: DerivationFunction,
    staged: Staged,
}

impl<P: TrngPort> Trng<P> {
    pub fn new(port: P, version: IpVersion) -> Self {
        Trng {
            port,
            version,
            status: Status::Uninitialized,
            cfg: None,
            stats: Stats::default(),
            df: DerivationFunction::new(),
            staged: Staged::new(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn version(&self) -> IpVersion {
        self.version
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Direct device access for bring-up and tests.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// True when no staged secret material remains in driver memory.
    pub fn secrets_wiped(&self) -> bool {
        self.cfg.is_none()
            && self.staged.entropy.iter().all(|&b| b == 0)
            && self.staged.seed.iter().all(|&b| b == 0)
    }

    pub(crate) fn mark_error(&mut self) {
        self.status = Status::Error;
    }

    /// Pulse the soft reset, then the hard reset line.
    fn reset(&mut self) {
        soft_reset(&mut self.port);
        self.port.write_reg(regs::RESET, 1);
        self.port.delay_us(regs::RESET_DELAY_US);
        self.port.write_reg(regs::RESET, 0);
    }

    /// Validate and adopt `cfg`, reset the core, and seed it (except in
    /// PTRNG, which is seedless). Leaves the instance HEALTHY on
    /// success, ERROR on any hardware fault.
    pub fn instantiate(&mut self, cfg: &Config) -> Result<(), RngError> {
        match self.status {
            Status::Uninitialized | Status::Error => (),
            Status::Catastrophic => return Err(RngError::Catastrophic),
            Status::Healthy => return Err(RngError::BadState),
        }
        cfg.validate(self.version)?;

        self.cfg = Some(cfg.clone());
        self.stats = Stats::default();
        self.reset();

        if self.version == IpVersion::V2 && cfg.mode != Mode::Drng {
            regs::update_reg(
                &mut self.port,
                regs::CTRL_2,
                ctrl2::DIT_MASK | ctrl2::RCT_MASK,
                DEFAULT_DIT | (DEFAULT_RCT_CUTOFF << ctrl2::RCT_SHIFT),
            );
            regs::update_reg(
                &mut self.port,
                regs::CTRL_3,
                ctrl3::APT_MASK,
                DEFAULT_APT_CUTOFF << ctrl3::APT_SHIFT,
            );
        }

        if cfg.mode != Mode::Ptrng {
            let seed = cfg.init_seed.clone();
            self.reseed_internal(
                seed.as_ref().map(|s| s.as_slice()),
                cfg.dfmul,
            )?;
        }

        self.status = Status::Healthy;
        log::debug!("trng instantiated ({:?})", cfg.mode);
        Ok(())
    }

    /// Explicit reseed from HEALTHY: DRNG with a fresh caller seed, HRNG
    /// from its own entropy source.
    pub fn reseed(
        &mut self,
        seed: Option<&[u8]>,
        dfmul: u32,
    ) -> Result<(), RngError> {
        match self.status {
            Status::Healthy => (),
            Status::Catastrophic => return Err(RngError::Catastrophic),
            _ => return Err(RngError::BadState),
        }
        let cfg = self.cfg.as_ref().ok_or(RngError::BadState)?;
        match (cfg.mode, seed) {
            (Mode::Drng, Some(s)) => {
                if let Some(init) = &cfg.init_seed {
                    if init.as_slice() == s {
                        return Err(RngError::SeedReuse);
                    }
                }
            }
            (Mode::Hrng, None) => (),
            _ => return Err(RngError::BadArg),
        }
        self.reseed_internal(seed, dfmul)
    }

    fn reseed_internal(
        &mut self,
        seed: Option<&[u8]>,
        dfmul: u32,
    ) -> Result<(), RngError> {
        let r = self.try_reseed(seed, dfmul);
        if let Err(e) = r {
            self.apply_fault(e);
        }
        r
    }

    fn try_reseed(
        &mut self,
        seed: Option<&[u8]>,
        dfmul: u32,
    ) -> Result<(), RngError> {
        let cfg = self.cfg.as_ref().ok_or(RngError::BadState)?;
        let mode = cfg.mode;
        let df_disable = cfg.df_disable;

        match (df_disable, dfmul) {
            (true, 0) => (),
            (false, m) if (DFMUL_MIN..=DFMUL_MAX).contains(&m) => (),
            _ => return Err(RngError::BadArg),
        }

        self.stats = Stats::default();
        let seed_len = self.version.seed_len(df_disable, dfmul);

        match (self.version, df_disable) {
            (IpVersion::V2, _) => {
                self.reseed_v2(mode, seed, dfmul, seed_len)?
            }
            (IpVersion::V1, true) => self.reseed_v1_raw(mode, seed)?,
            (IpVersion::V1, false) => {
                self.reseed_v1_df(mode, seed, seed_len)?
            }
        }

        if self.version == IpVersion::V1 {
            // PRNGMODE clear selects the reseed operation.
            self.port.write_reg(regs::CTRL, ctrl::PRNGXS);
            regs::update_reg(
                &mut self.port,
                regs::CTRL,
                ctrl::PRNGSTART,
                ctrl::PRNGSTART,
            );
        }

        let st = regs::wait_for_event(
            &mut self.port,
            regs::STATUS,
            status::DONE,
            status::DONE,
            regs::RESEED_TIMEOUT_US,
        )?;
        if st & status::CERTF != 0 {
            log::warn!("entropy certification failure after reseed");
            return Err(RngError::EntropyHealth);
        }
        regs::update_reg(&mut self.port, regs::CTRL, ctrl::PRNGSTART, 0);
        Ok(())
    }

    /// V1 with the DF bypassed: 48 raw bytes straight into the seed
    /// bank.
    fn reseed_v1_raw(
        &mut self,
        mode: Mode,
        seed: Option<&[u8]>,
    ) -> Result<(), RngError> {
        match mode {
            Mode::Hrng => {
                gather_entropy(
                    &mut self.port,
                    &mut self.staged.entropy[..SEED_LEN],
                    &mut self.staged.last_burst,
                )?;
                check_seed_pattern(&self.staged.entropy[..SEED_LEN])?;
                self.staged
                    .seed
                    .copy_from_slice(&self.staged.entropy[..SEED_LEN]);
            }
            Mode::Drng => {
                let s = seed.ok_or(RngError::BadArg)?;
                if s.len() != SEED_LEN {
                    return Err(RngError::BadArg);
                }
                check_seed_pattern(s)?;
                self.staged.seed.copy_from_slice(s);
            }
            Mode::Ptrng => return Err(RngError::BadState),
        }
        regs::load_words(
            &mut self.port,
            regs::EXT_SEED,
            Some(&self.staged.seed),
        );
        let pstr = self.cfg.as_ref().and_then(|c| c.pstr);
        if let Some(p) = pstr {
            regs::load_words(&mut self.port, regs::PER_STRING, Some(&p));
        }
        Ok(())
    }

    /// V1 with the DF: distill `seed_len` bytes of caller seed or
    /// collected entropy into a 48-byte seed, then load it in parallel.
    fn reseed_v1_df(
        &mut self,
        mode: Mode,
        seed: Option<&[u8]>,
        seed_len: usize,
    ) -> Result<(), RngError> {
        match mode {
            Mode::Hrng => {
                gather_entropy(
                    &mut self.port,
                    &mut self.staged.entropy[..seed_len],
                    &mut self.staged.last_burst,
                )?;
            }
            Mode::Drng => {
                let s = seed.ok_or(RngError::BadArg)?;
                if s.len() != seed_len {
                    return Err(RngError::BadArg);
                }
                self.staged.entropy[..seed_len].copy_from_slice(s);
            }
            Mode::Ptrng => return Err(RngError::BadState),
        }
        check_seed_pattern(&self.staged.entropy[..seed_len])?;

        let pstr = self.cfg.as_ref().and_then(|c| c.pstr);
        self.df.derive(
            &self.staged.entropy[..seed_len],
            pstr.as_ref(),
            DfOutput::Seed,
            &mut self.staged.seed,
        )?;
        regs::load_words(
            &mut self.port,
            regs::EXT_SEED,
            Some(&self.staged.seed),
        );
        Ok(())
    }

    /// V2: the seed bypasses the software DF. DRNG clocks it in bit by
    /// bit over CTRL_4; HRNG seeds itself from the oscillators.
    fn reseed_v2(
        &mut self,
        mode: Mode,
        seed: Option<&[u8]>,
        dfmul: u32,
        seed_len: usize,
    ) -> Result<(), RngError> {
        if mode == Mode::Drng {
            let s = seed.ok_or(RngError::BadArg)?;
            if s.len() != seed_len {
                return Err(RngError::BadArg);
            }
            check_seed_pattern(s)?;
        }

        regs::update_reg(&mut self.port, regs::CTRL_3, ctrl3::DLEN_MASK, dfmul);

        let mut base = match mode {
            Mode::Drng => ctrl::TSTMODE | ctrl::TRSSEN,
            // PRNGMODE stays clear: this is a reseed.
            Mode::Hrng => ctrl::TRSSEN | ctrl::PRNGXS,
            Mode::Ptrng => return Err(RngError::BadState),
        };

        let pstr = self.cfg.as_ref().and_then(|c| c.pstr);
        match &pstr {
            Some(p) => {
                regs::load_words(&mut self.port, regs::PER_STRING, Some(p));
            }
            None => base |= ctrl::PERSODISABLE,
        }

        if mode == Mode::Hrng {
            self.port.write_reg(regs::OSC_EN, 1);
        }

        // The order below is load-bearing on silicon: mode bits first,
        // PRNGSTART in a second write, and only then the serial stream.
        self.port.write_reg(regs::CTRL, base);
        regs::update_reg(
            &mut self.port,
            regs::CTRL,
            ctrl::PRNGSTART,
            ctrl::PRNGSTART,
        );

        if mode == Mode::Drng {
            // Checked above.
            let s = seed.ok_or(RngError::BadArg)?;
            regs::load_serial(&mut self.port, s)?;
        }
        Ok(())
    }

    /// Fill `buf` with DRBG or entropy output. `predict` requests a
    /// prediction-resistance reseed first, where the mode permits one.
    pub fn generate(
        &mut self,
        buf: &mut [u8],
        predict: bool,
    ) -> Result<(), RngError> {
        let r = self.try_generate(buf, predict);
        if let Err(e) = r {
            self.apply_fault(e);
        }
        r
    }

    fn try_generate(
        &mut self,
        buf: &mut [u8],
        predict: bool,
    ) -> Result<(), RngError> {
        match self.status {
            Status::Healthy => (),
            // Sticky; do not touch the device again.
            Status::Catastrophic => return Err(RngError::Catastrophic),
            _ => return Err(RngError::BadState),
        }

        if buf.len() < SECURITY_STRENGTH || buf.len() % BURST_LEN != 0 {
            return Err(RngError::BadArg);
        }

        let cfg = self.cfg.as_ref().ok_or(RngError::BadState)?;
        let mode = cfg.mode;
        let seed_life = cfg.seed_life;
        let dfmul = cfg.dfmul;
        let df_en = !cfg.df_disable;
        let predict_en = cfg.predict_en;

        if predict && !predict_en {
            return Err(RngError::BadArg);
        }
        if mode == Mode::Ptrng && df_en && buf.len() != SECURITY_STRENGTH {
            // The conditioned path emits exactly one 32-byte block.
            return Err(RngError::BadArg);
        }

        match mode {
            Mode::Hrng => {
                if self.stats.elapsed_seed_life >= seed_life
                    || (predict && self.stats.elapsed_seed_life > 0)
                {
                    self.reseed_internal(None, dfmul)?;
                }
                self.port
                    .write_reg(regs::CTRL, ctrl::PRNGMODE | ctrl::PRNGXS);
            }
            Mode::Drng => {
                if self.stats.elapsed_seed_life > seed_life {
                    return Err(RngError::SeedExpired);
                }
                if predict && self.stats.elapsed_seed_life > 0 {
                    // DRNG cannot self-reseed; the caller must.
                    return Err(RngError::SeedExpired);
                }
                self.port
                    .write_reg(regs::CTRL, ctrl::PRNGMODE | ctrl::PRNGXS);
            }
            Mode::Ptrng => {
                self.port.write_reg(regs::OSC_EN, 1);
                soft_reset(&mut self.port);
                self.port
                    .write_reg(regs::CTRL, ctrl::EUMODE | ctrl::TRSSEN);
            }
        }

        if mode == Mode::Ptrng && df_en {
            let elen = (dfmul as usize + 1) * BURST_LEN;
            collect_random(
                &mut self.port,
                &mut self.staged.entropy[..elen],
                &mut self.staged.last_burst,
                false,
            )?;
            self.df.derive(
                &self.staged.entropy[..elen],
                None,
                DfOutput::Rand,
                buf,
            )?;
        } else {
            collect_random(
                &mut self.port,
                buf,
                &mut self.staged.last_burst,
                mode != Mode::Ptrng,
            )?;
        }

        let len = buf.len() as u64;
        self.stats.bytes_since_reseed += len;
        self.stats.bytes_total += len;
        self.stats.elapsed_seed_life += 1;
        Ok(())
    }

    /// Scrub the device and the instance: zero both register banks, hold
    /// the core in reset, and wipe every staged secret.
    pub fn release(&mut self) {
        regs::zero_words(&mut self.port, regs::EXT_SEED, regs::SEED_WORDS);
        regs::zero_words(&mut self.port, regs::PER_STRING, regs::SEED_WORDS);
        self.port.write_reg(regs::RESET, 1);

        self.staged.zeroize();
        self.df.zeroize();
        self.cfg = None;
        self.stats = Stats::default();
        self.status = Status::Uninitialized;
        log::debug!("trng released");
    }

    fn apply_fault(&mut self, e: RngError) {
        if self.status == Status::Catastrophic {
            return;
        }
        if let Some(s) = fault_class(e) {
            log::warn!("trng fault {:?} -> {:?}", e, s);
            self.status = s;
        }
    }
}

/// Which lifecycle transition, if any, a failure forces. Argument and
/// state rejections leave the instance alone.
fn fault_class(e: RngError) -> Option<Status> {
    match e {
        RngError::Catastrophic => Some(Status::Catastrophic),
        RngError::BadArg
        | RngError::BadState
        | RngError::InvalidConfig
        | RngError::SeedReuse => None,
        _ => Some(Status::Error),
    }
}

fn soft_reset<P: TrngPort>(port: &mut P) {
    regs::update_reg(port, regs::CTRL, ctrl::PRNGSRST, ctrl::PRNGSRST);
    port.delay_us(regs::RESET_DELAY_US);
    regs::update_reg(port, regs::CTRL, ctrl::PRNGSRST, 0);
}

/// Route the entropy unit to the output FIFO and drain `dst.len()`
/// bytes from it.
fn gather_entropy<P: TrngPort>(
    port: &mut P,
    dst: &mut [u8],
    last_burst: &mut [u8; BURST_LEN],
) -> Result<(), RngError> {
    port.write_reg(regs::OSC_EN, 1);
    soft_reset(port);
    port.write_reg(regs::CTRL, ctrl::EUMODE | ctrl::TRSSEN);
    collect_random(port, dst, last_burst, true)
}

/// Drain `dst.len() / 16` bursts from the core FIFO.
///
/// Each burst waits for QCNT to report four queued words. A DTF flag
/// (when `check_dtf`) or a burst identical to its predecessor is a
/// catastrophic fault.
fn collect_random<P: TrngPort>(
    port: &mut P,
    dst: &mut [u8],
    last_burst: &mut [u8; BURST_LEN],
    check_dtf: bool,
) -> Result<(), RngError> {
    regs::update_reg(port, regs::CTRL, ctrl::PRNGSTART, ctrl::PRNGSTART);

    let mut first = true;
    for chunk in dst.chunks_exact_mut(BURST_LEN) {
        let st = regs::wait_for_event(
            port,
            regs::STATUS,
            status::QCNT_MASK,
            status::QCNT_FULL,
            regs::GENERATE_TIMEOUT_US,
        )?;
        if check_dtf && st & status::DTF != 0 {
            log::error!("deterministic test failure during generate");
            return Err(RngError::Catastrophic);
        }

        let mut burst = [0u8; BURST_LEN];
        for word in 0..BURST_LEN / 4 {
            let w = port.read_reg(regs::CORE_OUTPUT);
            regs::word_to_bytes(w, &mut burst[word * 4..word * 4 + 4]);
        }
        if !first && burst == *last_burst {
            log::error!("stuck core output");
            return Err(RngError::Catastrophic);
        }
        *last_burst = burst;
        first = false;
        chunk.copy_from_slice(&burst);
    }

    regs::update_reg(port, regs::CTRL, ctrl::PRNGSTART, 0);
    Ok(())
}

/// A seed word stuck at either toggle pattern means a dead entropy
/// chain; refuse it.
fn check_seed_pattern(seed: &[u8]) -> Result<(), RngError> {
    for w in seed.chunks_exact(4) {
        let v = regs::word_from_bytes(w);
        if v == 0xAAAA_AAAA || v == 0x5555_5555 {
            return Err(RngError::EntropyHealth);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeTrng;
    use drv_rng_api::Seed;

    fn fresh_bytes(len: usize, salt: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(13).wrapping_add(salt)).collect()
    }

    fn drng_v1_cfg(seed: &[u8]) -> Config {
        Config {
            mode: Mode::Drng,
            seed_life: 5,
            dfmul: 2,
            df_disable: false,
            predict_en: false,
            init_seed: Some(Seed::new(seed).unwrap()),
            pstr: None,
        }
    }

    fn hrng_cfg() -> Config {
        Config {
            mode: Mode::Hrng,
            seed_life: 10,
            dfmul: 7,
            df_disable: false,
            predict_en: false,
            init_seed: None,
            pstr: None,
        }
    }

    fn ptrng_cfg(dfmul: u32) -> Config {
        Config {
            mode: Mode::Ptrng,
            seed_life: 0,
            dfmul,
            df_disable: dfmul == 0,
            predict_en: false,
            init_seed: None,
            pstr: None,
        }
    }

    fn new_v1() -> Trng<FakeTrng> {
        Trng::new(FakeTrng::new(), IpVersion::V1)
    }

    #[test]
    fn instantiate_requires_valid_config() {
        let mut t = new_v1();
        let mut cfg = drng_v1_cfg(&fresh_bytes(48, 1));
        cfg.dfmul = 1;
        assert_eq!(t.instantiate(&cfg), Err(RngError::InvalidConfig));
        assert_eq!(t.status(), Status::Uninitialized);
        assert!(t.port().writes.is_empty());
    }

    #[test]
    fn drng_instantiate_loads_df_output_reversed() {
        let mut t = new_v1();
        t.instantiate(&drng_v1_cfg(&fresh_bytes(48, 1))).unwrap();
        assert_eq!(t.status(), Status::Healthy);

        // Twelve seed-bank writes, last one at the bank's base.
        let seed_writes: Vec<&(usize, u32)> = t
            .port()
            .writes
            .iter()
            .filter(|(o, _)| (regs::EXT_SEED..regs::EXT_SEED + 48).contains(o))
            .collect();
        assert_eq!(seed_writes.len(), regs::SEED_WORDS);
        assert_eq!(seed_writes[0].0, regs::EXT_SEED + 11 * 4);
        assert_eq!(seed_writes[11].0, regs::EXT_SEED);
    }

    #[test]
    fn drng_generate_returns_fifo_bytes() {
        let mut t = new_v1();
        t.instantiate(&drng_v1_cfg(&fresh_bytes(48, 1))).unwrap();

        let expected = fresh_bytes(32, 99);
        t.port_mut().push_output(&expected);

        let mut out = [0u8; 32];
        t.generate(&mut out, false).unwrap();
        assert_eq!(out[..], expected[..]);
        assert_eq!(t.stats().elapsed_seed_life, 1);
        assert_eq!(t.stats().bytes_since_reseed, 32);
    }

    #[test]
    fn generate_rejects_short_and_ragged_buffers() {
        let mut t = new_v1();
        t.instantiate(&drng_v1_cfg(&fresh_bytes(48, 1))).unwrap();

        let mut short = [0u8; 16];
        assert_eq!(t.generate(&mut short, false), Err(RngError::BadArg));
        let mut ragged = [0u8; 40];
        assert_eq!(t.generate(&mut ragged, false), Err(RngError::BadArg));
        // Argument rejection is not a fault.
        assert_eq!(t.status(), Status::Healthy);
    }

    #[test]
    fn drng_seed_life_exhaustion_is_an_error() {
        let mut t = new_v1();
        let mut cfg = drng_v1_cfg(&fresh_bytes(48, 1));
        cfg.seed_life = 2;
        t.instantiate(&cfg).unwrap();

        let mut out = [0u8; 32];
        for round in 0..3 {
            t.port_mut().push_output(&fresh_bytes(32, round));
            t.generate(&mut out, false).unwrap();
        }
        assert_eq!(t.stats().elapsed_seed_life, 3);

        t.port_mut().push_output(&fresh_bytes(32, 77));
        assert_eq!(t.generate(&mut out, false), Err(RngError::SeedExpired));
        assert_eq!(t.status(), Status::Error);
        assert_eq!(t.generate(&mut out, false), Err(RngError::BadState));
    }

    #[test]
    fn predict_needs_enable_flag() {
        let mut t = new_v1();
        t.instantiate(&drng_v1_cfg(&fresh_bytes(48, 1))).unwrap();
        let mut out = [0u8; 32];
        assert_eq!(t.generate(&mut out, true), Err(RngError::BadArg));
        assert_eq!(t.status(), Status::Healthy);
    }

    #[test]
    fn hrng_implicit_reseed_at_seed_life() {
        let mut t = new_v1();
        let mut cfg = hrng_cfg();
        cfg.seed_life = 10;
        // instantiate gathers (7+1)*16 = 128 bytes of entropy
        t.port_mut().push_output(&fresh_bytes(128, 3));
        t.instantiate(&cfg).unwrap();

        let mut out = [0u8; 32];
        for round in 0..10 {
            t.port_mut().push_output(&fresh_bytes(32, round));
            t.generate(&mut out, false).unwrap();
        }
        assert_eq!(t.stats().elapsed_seed_life, 10);

        // Eleventh call reseeds from the oscillators, then generates.
        t.port_mut().push_output(&fresh_bytes(128, 50));
        t.port_mut().push_output(&fresh_bytes(32, 51));
        t.generate(&mut out, false).unwrap();
        assert_eq!(t.stats().elapsed_seed_life, 1);
        assert_eq!(t.stats().bytes_since_reseed, 32);
    }

    #[test]
    fn hrng_predict_forces_reseed() {
        let mut t = new_v1();
        let mut cfg = hrng_cfg();
        cfg.predict_en = true;
        t.port_mut().push_output(&fresh_bytes(128, 3));
        t.instantiate(&cfg).unwrap();

        let mut out = [0u8; 32];
        t.port_mut().push_output(&fresh_bytes(32, 4));
        t.generate(&mut out, false).unwrap();
        assert_eq!(t.stats().elapsed_seed_life, 1);

        t.port_mut().push_output(&fresh_bytes(128, 5));
        t.port_mut().push_output(&fresh_bytes(32, 6));
        t.generate(&mut out, true).unwrap();
        assert_eq!(t.stats().elapsed_seed_life, 1);
        assert_eq!(t.stats().bytes_since_reseed, 32);
    }

    #[test]
    fn hrng_rejects_trivial_entropy_pattern() {
        let mut t = new_v1();
        // One stuck 0xAAAAAAAA word in 128 bytes of otherwise fine
        // entropy fails the reseed.
        let mut entropy = fresh_bytes(128, 3);
        entropy[16..20].copy_from_slice(&[0xAA; 4]);
        t.port_mut().push_output(&entropy);
        assert_eq!(
            t.instantiate(&hrng_cfg()),
            Err(RngError::EntropyHealth)
        );
        assert_eq!(t.status(), Status::Error);
    }

    #[test]
    fn stuck_bursts_are_catastrophic_and_sticky() {
        let mut t = new_v1();
        t.instantiate(&drng_v1_cfg(&fresh_bytes(48, 1))).unwrap();

        let mut doubled = fresh_bytes(16, 9);
        let copy = doubled.clone();
        doubled.extend_from_slice(&copy);
        t.port_mut().push_output(&doubled);

        let mut out = [0u8; 32];
        assert_eq!(t.generate(&mut out, false), Err(RngError::Catastrophic));
        assert_eq!(t.status(), Status::Catastrophic);

        // Subsequent calls fail without touching the device.
        t.port_mut().writes.clear();
        assert_eq!(t.generate(&mut out, false), Err(RngError::Catastrophic));
        assert!(t.port().writes.is_empty());

        // A soft re-init is refused too.
        assert_eq!(
            t.instantiate(&drng_v1_cfg(&fresh_bytes(48, 2))),
            Err(RngError::Catastrophic)
        );
    }

    #[test]
    fn dtf_is_catastrophic() {
        let mut t = new_v1();
        t.instantiate(&drng_v1_cfg(&fresh_bytes(48, 1))).unwrap();

        t.port_mut().dtf_after_bursts = Some(1);
        t.port_mut().push_output(&fresh_bytes(32, 9));
        let mut out = [0u8; 32];
        assert_eq!(t.generate(&mut out, false), Err(RngError::Catastrophic));
        assert_eq!(t.status(), Status::Catastrophic);
    }

    #[test]
    fn certf_after_reseed_is_an_error() {
        let mut t = new_v1();
        t.port_mut().certf_on_done = true;
        assert_eq!(
            t.instantiate(&drng_v1_cfg(&fresh_bytes(48, 1))),
            Err(RngError::EntropyHealth)
        );
        assert_eq!(t.status(), Status::Error);

        let mut out = [0u8; 32];
        assert_eq!(t.generate(&mut out, false), Err(RngError::BadState));

        // Recoverable: a fresh instantiate succeeds once the entropy
        // source certifies again.
        t.port_mut().certf_on_done = false;
        t.instantiate(&drng_v1_cfg(&fresh_bytes(48, 2))).unwrap();
        assert_eq!(t.status(), Status::Healthy);
    }

    #[test]
    fn generate_timeout_is_an_error() {
        let mut t = new_v1();
        t.instantiate(&drng_v1_cfg(&fresh_bytes(48, 1))).unwrap();
        // Nothing queued: QCNT never reaches four.
        let mut out = [0u8; 32];
        assert_eq!(t.generate(&mut out, false), Err(RngError::Timeout));
        assert_eq!(t.status(), Status::Error);
    }

    #[test]
    fn reseed_rejects_original_seed() {
        let seed = fresh_bytes(48, 1);
        let mut t = new_v1();
        t.instantiate(&drng_v1_cfg(&seed)).unwrap();

        assert_eq!(t.reseed(Some(&seed), 2), Err(RngError::SeedReuse));
        assert_eq!(t.status(), Status::Healthy);

        let other = fresh_bytes(48, 2);
        t.reseed(Some(&other), 2).unwrap();
        assert_eq!(t.stats(), Stats::default());
    }

    #[test]
    fn hrng_reseed_takes_no_caller_seed() {
        let mut t = new_v1();
        t.port_mut().push_output(&fresh_bytes(128, 3));
        t.instantiate(&hrng_cfg()).unwrap();
        assert_eq!(
            t.reseed(Some(&fresh_bytes(48, 4)), 7),
            Err(RngError::BadArg)
        );
    }

    #[test]
    fn ptrng_touches_no_seed_registers() {
        let mut t = new_v1();
        t.instantiate(&ptrng_cfg(0)).unwrap();
        assert!(!t.port().wrote_in_range(regs::EXT_SEED, regs::SEED_WORDS));
        assert!(
            !t.port().wrote_in_range(regs::PER_STRING, regs::SEED_WORDS)
        );

        // Raw mode hands FIFO bytes straight to the caller.
        let expected = fresh_bytes(48, 21);
        t.port_mut().push_output(&expected);
        let mut out = [0u8; 48];
        t.generate(&mut out, false).unwrap();
        assert_eq!(out[..], expected[..]);
    }

    #[test]
    fn ptrng_with_df_conditions_output() {
        let mut t = new_v1();
        t.instantiate(&ptrng_cfg(7)).unwrap();

        let entropy = fresh_bytes(128, 33);
        t.port_mut().push_output(&entropy);
        let mut out = [0u8; 32];
        t.generate(&mut out, false).unwrap();
        // Conditioned, not copied.
        assert_ne!(out[..], entropy[..32]);

        // And only the 32-byte shape is allowed here.
        let mut big = [0u8; 64];
        assert_eq!(t.generate(&mut big, false), Err(RngError::BadArg));
    }

    #[test]
    fn release_wipes_registers_and_memory() {
        let seed = fresh_bytes(48, 1);
        let mut t = new_v1();
        let mut cfg = drng_v1_cfg(&seed);
        cfg.pstr = Some([0x42; 48]);
        t.instantiate(&cfg).unwrap();
        assert!(!t.secrets_wiped());

        t.release();
        assert_eq!(t.status(), Status::Uninitialized);
        assert!(t.secrets_wiped());
        for i in 0..regs::SEED_WORDS {
            assert_eq!(t.port().reg(regs::EXT_SEED + i * 4), 0);
            assert_eq!(t.port().reg(regs::PER_STRING + i * 4), 0);
        }
        assert_eq!(t.port().reg(regs::RESET), 1);
    }

    #[test]
    fn v2_serial_reseed_order_and_dlen() {
        let seed = fresh_bytes(128, 5);
        let mut t = Trng::new(FakeTrng::new(), IpVersion::V2);
        let mut cfg = drng_v1_cfg(&seed);
        cfg.dfmul = 7;
        cfg.seed_life = 2;
        t.instantiate(&cfg).unwrap();

        assert_eq!(
            t.port().reg(regs::CTRL_3) & ctrl3::DLEN_MASK,
            7
        );

        let writes = &t.port().writes;
        let mode_write = writes
            .iter()
            .position(|&(o, v)| {
                o == regs::CTRL
                    && v & ctrl::TSTMODE != 0
                    && v & ctrl::PRNGSTART == 0
            })
            .expect("mode ctrl write");
        let start_write = writes
            .iter()
            .position(|&(o, v)| o == regs::CTRL && v & ctrl::PRNGSTART != 0)
            .expect("start ctrl write");
        let first_bit = writes
            .iter()
            .position(|&(o, _)| o == regs::CTRL_4)
            .expect("serial bit write");
        assert!(mode_write < start_write);
        assert!(start_write < first_bit);

        // 128 bytes, one write per bit.
        let bits =
            writes.iter().filter(|&&(o, _)| o == regs::CTRL_4).count();
        assert_eq!(bits, 128 * 8);
    }

    #[test]
    fn v2_raw_seed_clocks_one_dlen_block() {
        // DF bypassed on V2: DLEN=0 advertises a single 16-byte block,
        // and exactly that much gets clocked in.
        let seed = fresh_bytes(16, 5);
        let mut t = Trng::new(FakeTrng::new(), IpVersion::V2);
        let mut cfg = drng_v1_cfg(&seed);
        cfg.dfmul = 0;
        cfg.df_disable = true;
        t.instantiate(&cfg).unwrap();

        assert_eq!(t.port().reg(regs::CTRL_3) & ctrl3::DLEN_MASK, 0);
        let bits = t
            .port()
            .writes
            .iter()
            .filter(|&&(o, _)| o == regs::CTRL_4)
            .count();
        assert_eq!(bits, 16 * 8);

        // A 48-byte reseed no longer matches the advertised length.
        assert_eq!(
            t.reseed(Some(&fresh_bytes(48, 6)), 0),
            Err(RngError::BadArg)
        );
    }

    #[test]
    fn v2_serial_corruption_aborts() {
        let seed = fresh_bytes(128, 5);
        let mut t = Trng::new(FakeTrng::new(), IpVersion::V2);
        t.port_mut().corrupt_serial_read = Some(40);
        let mut cfg = drng_v1_cfg(&seed);
        cfg.dfmul = 7;
        assert_eq!(t.instantiate(&cfg), Err(RngError::SeedLoadFault));
        assert_eq!(t.status(), Status::Error);
    }

    #[test]
    fn v2_hrng_gets_health_cutoffs() {
        let mut t = Trng::new(FakeTrng::new(), IpVersion::V2);
        t.instantiate(&hrng_cfg()).unwrap();
        let c2 = t.port().reg(regs::CTRL_2);
        assert_eq!(c2 & ctrl2::DIT_MASK, DEFAULT_DIT);
        assert_eq!(c2 & ctrl2::RCT_MASK, DEFAULT_RCT_CUTOFF << ctrl2::RCT_SHIFT);
        let c3 = t.port().reg(regs::CTRL_3);
        assert_eq!(c3 & ctrl3::APT_MASK, DEFAULT_APT_CUTOFF << ctrl3::APT_SHIFT);
        // HRNG on V2 must not clock the serial interface.
        assert!(t.port().writes.iter().all(|&(o, _)| o != regs::CTRL_4));
    }

    #[test]
    fn v2_pstr_parallel_load_clears_persodisable() {
        let seed = fresh_bytes(128, 5);
        let mut t = Trng::new(FakeTrng::new(), IpVersion::V2);
        let mut cfg = drng_v1_cfg(&seed);
        cfg.dfmul = 7;
        cfg.pstr = Some([0x77; 48]);
        t.instantiate(&cfg).unwrap();
        assert!(t.port().wrote_in_range(regs::PER_STRING, regs::SEED_WORDS));
        assert_eq!(t.port().reg(regs::CTRL) & ctrl::PERSODISABLE, 0);

        // Without a personalization string the bank stays untouched and
        // PERSODISABLE is set.
        let mut t = Trng::new(FakeTrng::new(), IpVersion::V2);
        let mut cfg = drng_v1_cfg(&fresh_bytes(128, 6));
        cfg.dfmul = 7;
        t.instantiate(&cfg).unwrap();
        assert!(
            !t.port().wrote_in_range(regs::PER_STRING, regs::SEED_WORDS)
        );
        let mode_write = t
            .port()
            .writes
            .iter()
            .find(|&&(o, v)| o == regs::CTRL && v & ctrl::TSTMODE != 0)
            .copied()
            .unwrap();
        assert_ne!(mode_write.1 & ctrl::PERSODISABLE, 0);
    }
}
