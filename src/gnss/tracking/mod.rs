
use std::f64::consts;
use std::fmt;

use num_complex::Complex;
use tracing::{debug, trace};

use crate::block::{BlockFunctionality, BlockResult};
use crate::gnss::code::{CodeGenerator, CodeKind};
use crate::gnss::replica::CcReplica;
use crate::{Error, Result, Sample};

pub mod correlator;

use self::correlator::{CodeDelayLine, Correlator};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DllMode {
	Far,
	Close,
	OnTop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PllMode {
	Unlocked,
	Locked,
}

fn default_gain() -> f64 { 1.0 }

/// Loop parameters, fixed for the life of a tracker.  There are no built-in gains; callers choose them.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackerConfig {
	/// Early-to-prompt correlator spacing [sec]
	pub spacing_sec: f64,
	pub dll_alpha: f64,
	pub dll_beta: f64,
	pub pll_alpha: f64,
	pub pll_beta: f64,
	/// Correlation magnitude that counts as signal present
	pub threshold: f64,
	/// Input scale applied before correlation
	#[serde(default = "default_gain")]
	pub gain: f64,
}

impl TrackerConfig {

	pub fn new(spacing_sec:f64, dll_alpha:f64, dll_beta:f64, pll_alpha:f64, pll_beta:f64, threshold:f64) -> Self {
		Self { spacing_sec, dll_alpha, dll_beta, pll_alpha, pll_beta, threshold, gain: default_gain() }
	}

	pub fn with_gain(mut self, gain:f64) -> Self {
		self.gain = gain;
		self
	}

	pub fn validate(&self) -> Result<()> {
		if !(self.spacing_sec.is_finite() && self.spacing_sec > 0.0) {
			return Err(Error::InvalidConfig(format!("correlator spacing must be positive, got {}", self.spacing_sec)));
		}
		if !(self.threshold.is_finite() && self.threshold > 0.0) {
			return Err(Error::InvalidConfig(format!("threshold must be positive, got {}", self.threshold)));
		}
		if !(self.gain.is_finite() && self.gain > 0.0) {
			return Err(Error::InvalidConfig(format!("gain must be positive, got {}", self.gain)));
		}
		let gains = [("dll_alpha", self.dll_alpha), ("dll_beta", self.dll_beta), ("pll_alpha", self.pll_alpha), ("pll_beta", self.pll_beta)];
		for (name, v) in gains.iter() {
			if !v.is_finite() { return Err(Error::InvalidConfig(format!("{} must be finite, got {}", name, v))); }
		}
		Ok(())
	}

}

/// Initial code and carrier estimates, normally from an acquisition stage
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackerSeed {
	pub code_offset_chips: f64,
	pub code_doppler_hz: f64,
	pub carrier_doppler_hz: f64,
}

/// Loop state at the end of one integrate-and-dump interval
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrackReport {
	pub prn: usize,
	pub code: CodeKind,
	pub dump: u64,
	pub chip_index: i64,
	pub local_time: f64,
	pub emag: f64,
	pub pmag: f64,
	pub lmag: f64,
	pub snr_db: f64,
	pub dll_error: f64,
	pub pll_error: f64,
	pub dll_mode: DllMode,
	pub pll_mode: PllMode,
	pub nav_bit: bool,
	pub nav_change: bool,
	pub code_phase_offset_sec: f64,
	pub code_freq_offset_hz: f64,
	pub carrier_phase_offset_cycles: f64,
	pub carrier_freq_offset_hz: f64,
	pub carrier_accum: i64,
}

/// Costas discriminator in cycles, insensitive to the 180 degree data ambiguity; in [-0.5, 0.5)
pub fn costas_error(prompt:Complex<f64>) -> f64 {
	if prompt.re == 0.0 && prompt.im == 0.0 { return 0.0; }
	let e = (prompt.im * prompt.re.signum()).atan2(prompt.re.abs()) / consts::PI;
	if e >= 0.5 { e - 1.0 } else { e }
}

/// Early-minus-late delay lock loop with a Costas phase lock loop.
///
/// One replica feeds a delay line of local code reference values.  The late tap correlates against the newest
/// reference, prompt against the one S ticks old and early against the one 2S ticks old, where S is the
/// correlator spacing in ticks.  The replica is advanced S ticks worth of chips at construction so that the
/// reported code phase belongs to the prompt tap.
pub struct EmlTracker<G: CodeGenerator> {
	replica: CcReplica<G>,
	config: TrackerConfig,

	spacing_ticks: usize,
	search_size: f64,

	line: CodeDelayLine,
	early: Correlator,
	prompt: Correlator,
	late: Correlator,
	energy_in: f64,
	energy_local: f64,

	iad_count: usize,
	iad_count_max: usize,
	iad_count_default: usize,

	emag: f64,
	pmag: f64,
	lmag: f64,
	snr: f64,
	dll_error: f64,
	pll_error: f64,
	last_prompt: Complex<f64>,

	dll_mode: DllMode,
	pll_mode: PllMode,
	nav_bit: bool,
	nav_change: bool,
	dump_count: u64,
}

impl<G: CodeGenerator> EmlTracker<G> {

	pub fn new(mut replica:CcReplica<G>, config:TrackerConfig) -> Result<Self> {
		config.validate()?;

		let sync_sec = replica.generator().sync_period() as f64 / replica.code_freq();
		if config.spacing_sec >= sync_sec / 2.0 {
			return Err(Error::InvalidConfig(format!("correlator spacing {} s must be under half the {} s sync period",
				config.spacing_sec, sync_sec)));
		}

		let spacing_ticks = ((config.spacing_sec / replica.tick_size()).round() as usize).max(1);
		let correlator_bias = spacing_ticks as f64 * replica.chips_per_tick();
		replica.bias_code_phase(correlator_bias);

		let iad_count_default = ((replica.generator().sync_period() as f64 / replica.chips_per_tick()).round() as usize).max(1);

		debug!(prn = replica.generator().prn(), spacing_ticks, iad_count_default, "tracker created");

		Ok(Self {
			replica, config,
			spacing_ticks,
			search_size: correlator_bias,
			line:   CodeDelayLine::new(2 * spacing_ticks),
			early:  Correlator::new(2 * spacing_ticks),
			prompt: Correlator::new(spacing_ticks),
			late:   Correlator::new(0),
			energy_in: 0.0,
			energy_local: 0.0,
			iad_count: 0,
			iad_count_max: iad_count_default,
			iad_count_default,
			emag: 0.0, pmag: 0.0, lmag: 0.0, snr: 0.0,
			dll_error: 0.0, pll_error: 0.0,
			last_prompt: Complex::new(0.0, 0.0),
			dll_mode: DllMode::Far,
			pll_mode: PllMode::Unlocked,
			nav_bit: false,
			nav_change: false,
			dump_count: 0,
		})
	}

	/// Correlates one input sample without closing the loops
	pub fn integrate(&mut self, sample:Complex<f64>) {
		self.replica.tick();

		let x = sample * self.config.gain;
		let carrier = self.replica.carrier().conj();
		let mixed = x * carrier;

		let code_ref = if self.replica.code() { -1.0 } else { 1.0 };
		self.line.push(code_ref);

		self.early.accumulate(mixed, &self.line);
		self.prompt.accumulate(mixed, &self.line);
		self.late.accumulate(mixed, &self.line);

		self.energy_in    += x.norm_sqr();
		self.energy_local += (carrier * code_ref).norm_sqr();
	}

	/// Correlates one sample; returns true when an integrate-and-dump interval closed on this sample
	pub fn process(&mut self, sample:Complex<f64>) -> bool {
		self.integrate(sample);
		self.iad_count += 1;

		if self.iad_count >= self.iad_count_max {
			self.update_loop();
			self.reset_accumulators();
			self.iad_count = 0;
			true
		} else {
			false
		}
	}

	fn update_loop(&mut self) {
		let (e, p, l) = (self.early.value(), self.prompt.value(), self.late.value());
		let norm = (self.energy_in * self.energy_local).sqrt();
		if norm > 0.0 {
			self.emag = e.norm() / norm;
			self.pmag = p.norm() / norm;
			self.lmag = l.norm() / norm;
		} else {
			self.emag = 0.0;
			self.pmag = 0.0;
			self.lmag = 0.0;
		}
		self.snr = 10.0 * (self.pmag.powi(2) / self.replica.tick_size()).log10();
		self.dll_error = self.lmag - self.emag;
		self.pll_error = costas_error(p);
		self.last_prompt = p;

		let thresh = self.config.threshold;
		let mode = if self.emag.min(self.lmag) > thresh / 2.0 && self.pmag > self.emag.max(self.lmag) {
			DllMode::OnTop
		} else if self.emag > thresh || self.pmag > thresh || self.lmag > thresh {
			DllMode::Close
		} else {
			DllMode::Far
		};
		if mode != self.dll_mode {
			debug!(prn = self.prn(), from = ?self.dll_mode, to = ?mode, dump = self.dump_count, "DLL mode change");
		}
		self.dll_mode = mode;

		let bit = p.re > 0.0;
		self.nav_change = self.dump_count > 0 && bit != self.nav_bit;
		self.nav_bit = bit;

		match self.dll_mode {
			DllMode::OnTop | DllMode::Close => {
				self.replica.move_code_phase(self.config.dll_alpha * self.dll_error);
				self.replica.set_code_freq_offset(self.config.dll_beta * self.dll_error);
			},
			DllMode::Far => self.replica.move_code_phase(self.search_size),
		}

		if self.dll_mode == DllMode::OnTop {
			self.replica.move_carrier_phase(self.config.pll_alpha * self.pll_error);
			let cfo = self.replica.carrier_freq_offset() + self.config.pll_beta * self.pll_error / (self.iad_count_max as f64);
			self.replica.set_carrier_freq_offset(cfo);
		}

		self.pll_mode = if self.dll_mode == DllMode::OnTop && self.pll_error.abs() < 0.25 { PllMode::Locked } else { PllMode::Unlocked };
		self.dump_count += 1;

		trace!(prn = self.prn(), dump = self.dump_count, emag = self.emag, pmag = self.pmag, lmag = self.lmag,
			dll_error = self.dll_error, pll_error = self.pll_error, "dump");

		self.resync();
	}

	// Dump boundaries follow the code's sync boundaries even after phase corrections
	fn resync(&mut self) {
		let code_gen = self.replica.generator();
		let chips_remaining = (code_gen.sync_index() - code_gen.index()) as f64 - self.replica.code_phase();
		let rate = self.replica.chips_per_tick() + self.replica.code_freq_offset();

		let default = self.iad_count_default as i64;
		let mut count = if rate > 0.0 { (chips_remaining / rate).round() as i64 } else { default };
		count = count.max(1);
		if count < default / 2 { count += default; }

		self.iad_count_max = count as usize;
	}

	fn reset_accumulators(&mut self) {
		self.early.reset();
		self.prompt.reset();
		self.late.reset();
		self.energy_in = 0.0;
		self.energy_local = 0.0;
	}

	/// Restarts the loops from a new acquisition estimate
	pub fn reseed(&mut self, seed:&TrackerSeed) {
		self.replica.move_code_phase(seed.code_offset_chips);
		self.replica.set_code_freq_offset_hz(seed.code_doppler_hz);
		self.replica.set_carrier_freq_offset_hz(seed.carrier_doppler_hz);

		self.reset_accumulators();
		self.line.clear();
		self.iad_count = 0;
		self.dll_mode = DllMode::Far;
		self.pll_mode = PllMode::Unlocked;
		self.resync();

		debug!(prn = self.prn(), ?seed, iad_count_max = self.iad_count_max, "tracker reseeded");
	}

	pub fn report(&self) -> TrackReport {
		let code_gen = self.replica.generator();
		TrackReport {
			prn: code_gen.prn(),
			code: code_gen.kind(),
			dump: self.dump_count,
			chip_index: code_gen.index(),
			local_time: self.replica.local_time(),
			emag: self.emag,
			pmag: self.pmag,
			lmag: self.lmag,
			snr_db: self.snr,
			dll_error: self.dll_error,
			pll_error: self.pll_error,
			dll_mode: self.dll_mode,
			pll_mode: self.pll_mode,
			nav_bit: self.nav_bit,
			nav_change: self.nav_change,
			code_phase_offset_sec: self.replica.code_phase_offset_sec(),
			code_freq_offset_hz: self.replica.code_freq_offset_hz(),
			carrier_phase_offset_cycles: self.replica.carrier_phase_offset(),
			carrier_freq_offset_hz: self.replica.carrier_freq_offset_hz(),
			carrier_accum: self.replica.carrier_accum(),
		}
	}

	pub fn replica(&self) -> &CcReplica<G> { &self.replica }
	pub fn replica_mut(&mut self) -> &mut CcReplica<G> { &mut self.replica }
	pub fn config(&self) -> &TrackerConfig { &self.config }

	pub fn prn(&self) -> usize { self.replica.generator().prn() }
	pub fn spacing_ticks(&self) -> usize { self.spacing_ticks }
	pub fn search_size(&self) -> f64 { self.search_size }
	pub fn iad_count(&self) -> usize { self.iad_count }
	pub fn iad_count_max(&self) -> usize { self.iad_count_max }
	pub fn dump_count(&self) -> u64 { self.dump_count }

	pub fn emag(&self) -> f64 { self.emag }
	pub fn pmag(&self) -> f64 { self.pmag }
	pub fn lmag(&self) -> f64 { self.lmag }
	pub fn snr(&self) -> f64 { self.snr }
	pub fn dll_error(&self) -> f64 { self.dll_error }
	pub fn pll_error(&self) -> f64 { self.pll_error }
	pub fn dll_mode(&self) -> DllMode { self.dll_mode }
	pub fn pll_mode(&self) -> PllMode { self.pll_mode }
	pub fn nav_bit(&self) -> bool { self.nav_bit }
	pub fn nav_change(&self) -> bool { self.nav_change }

}

impl<G: CodeGenerator> fmt::Display for EmlTracker<G> {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		let rep = &self.replica;
		writeln!(f, "# EML tracker, {} PRN {}", rep.generator().kind(), self.prn())?;
		writeln!(f, "#   tick size: {:.6} us, {:.6} chips/tick", rep.tick_size() * 1.0e6, rep.chips_per_tick())?;
		writeln!(f, "#   spacing: {} ticks, search step {:.4} chips", self.spacing_ticks, self.search_size)?;
		writeln!(f, "#   DLL alpha/beta: {:e}/{:e}, PLL alpha/beta: {:e}/{:e}, threshold {}",
			self.config.dll_alpha, self.config.dll_beta, self.config.pll_alpha, self.config.pll_beta, self.config.threshold)?;
		writeln!(f, "#   dump {}: iad {}/{}, mode {:?}/{:?}", self.dump_count, self.iad_count, self.iad_count_max, self.dll_mode, self.pll_mode)?;
		writeln!(f, "#   e/p/l: {:.4} {:.4} {:.4}, snr {:.2} dB", self.emag, self.pmag, self.lmag, self.snr)?;
		writeln!(f, "#   prompt: {:.3}{:+.3}i, dll err {:.6}, pll err {:.6}", self.last_prompt.re, self.last_prompt.im, self.dll_error, self.pll_error)?;
		writeln!(f, "#   code: index {}, phase {:.6}, offset {:.6} chips ({:.3} ns), {:.4} Hz",
			rep.generator().index(), rep.code_phase(), rep.code_phase_offset(), rep.code_phase_offset_sec() * 1.0e9, rep.code_freq_offset_hz())?;
		write!(f, "#   carrier: phase {:.6}, offset {:.6} cycles, accum {}, {:.4} Hz",
			rep.carrier_phase(), rep.carrier_phase_offset(), rep.carrier_accum(), rep.carrier_freq_offset_hz())
	}
}

impl<G: CodeGenerator> BlockFunctionality<TrackerSeed, (), Sample, TrackReport> for EmlTracker<G> {

	fn control(&mut self, seed:&TrackerSeed) -> Result<()> {
		self.reseed(seed);
		Ok(())
	}

	fn apply(&mut self, sample:&Sample) -> BlockResult<TrackReport> {
		if self.process(sample.val) { BlockResult::Ready(self.report()) }
		else { BlockResult::NotReady }
	}

}
