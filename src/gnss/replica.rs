
use std::f64::consts;

use num_complex::Complex;

use crate::gnss::code::CodeGenerator;
use crate::{Error, Result};

/// Code and carrier numerically controlled oscillator driving one code generator.
///
/// Both phases are kept in [0, 1).  Whole code chips live in the generator's index and whole carrier cycles
/// in `carrier_accum`, so the fractional parts are all that the floating-point state carries.
pub struct CcReplica<G: CodeGenerator> {
	tick_size: f64,
	code_freq: f64,
	carrier_freq: f64,
	chips_per_tick: f64,
	cycles_per_tick: f64,

	code_phase: f64,
	code_phase_offset: f64,
	code_freq_offset: f64,

	carrier_phase: f64,
	carrier_phase_offset: f64,
	carrier_freq_offset: f64,
	carrier_accum: i64,

	local_time: f64,
	generator: G,
}

impl<G: CodeGenerator> CcReplica<G> {

	/// `tick_size` in seconds, `code_freq` in chips per second, `carrier_freq` in Hz
	pub fn new(tick_size:f64, code_freq:f64, carrier_freq:f64, generator:G) -> Result<Self> {
		if !(tick_size.is_finite() && tick_size > 0.0) {
			return Err(Error::InvalidConfig(format!("tick size must be positive, got {}", tick_size)));
		}
		if !(code_freq.is_finite() && code_freq > 0.0) {
			return Err(Error::InvalidConfig(format!("code frequency must be positive, got {}", code_freq)));
		}
		if !carrier_freq.is_finite() {
			return Err(Error::InvalidConfig(format!("carrier frequency must be finite, got {}", carrier_freq)));
		}

		Ok(Self {
			tick_size, code_freq, carrier_freq,
			chips_per_tick:  code_freq * tick_size,
			cycles_per_tick: carrier_freq * tick_size,
			code_phase: 0.0, code_phase_offset: 0.0, code_freq_offset: 0.0,
			carrier_phase: 0.0, carrier_phase_offset: 0.0, carrier_freq_offset: 0.0, carrier_accum: 0,
			local_time: 0.0,
			generator,
		})
	}

	pub fn tick(&mut self) {
		self.local_time += self.tick_size;

		self.code_phase        += self.chips_per_tick + self.code_freq_offset;
		self.code_phase_offset += self.code_freq_offset;
		self.wrap_code();

		self.carrier_phase        += self.cycles_per_tick + self.carrier_freq_offset;
		self.carrier_phase_offset += self.carrier_freq_offset;
		self.wrap_carrier();
	}

	/// Loop-filter code correction; recorded in the code phase offset
	pub fn move_code_phase(&mut self, chips:f64) {
		self.code_phase        += chips;
		self.code_phase_offset += chips;
		self.wrap_code();
	}

	/// Loop-filter carrier correction; recorded in the carrier phase offset
	pub fn move_carrier_phase(&mut self, cycles:f64) {
		self.carrier_phase        += cycles;
		self.carrier_phase_offset += cycles;
		self.wrap_carrier();
	}

	/// Shifts the code phase without touching the offset bookkeeping
	pub fn bias_code_phase(&mut self, chips:f64) {
		self.code_phase += chips;
		self.wrap_code();
	}

	fn wrap_code(&mut self) {
		while self.code_phase >= 1.0 {
			self.code_phase -= 1.0;
			self.generator.advance();
		}
		while self.code_phase < 0.0 {
			self.code_phase += 1.0;
			self.generator.retreat();
		}
	}

	fn wrap_carrier(&mut self) {
		while self.carrier_phase >= 1.0 {
			self.carrier_phase -= 1.0;
			self.carrier_accum += 1;
		}
		while self.carrier_phase < 0.0 {
			self.carrier_phase += 1.0;
			self.carrier_accum -= 1;
		}
	}

	pub fn set_code_freq_offset_hz(&mut self, hz:f64) { self.code_freq_offset = hz * self.tick_size; }
	pub fn code_freq_offset_hz(&self) -> f64 { self.code_freq_offset / self.tick_size }

	pub fn set_carrier_freq_offset_hz(&mut self, hz:f64) { self.carrier_freq_offset = hz * self.tick_size; }
	pub fn carrier_freq_offset_hz(&self) -> f64 { self.carrier_freq_offset / self.tick_size }

	/// Code frequency offset in chips per tick
	pub fn code_freq_offset(&self) -> f64 { self.code_freq_offset }
	pub fn set_code_freq_offset(&mut self, chips_per_tick:f64) { self.code_freq_offset = chips_per_tick; }

	/// Carrier frequency offset in cycles per tick
	pub fn carrier_freq_offset(&self) -> f64 { self.carrier_freq_offset }
	pub fn set_carrier_freq_offset(&mut self, cycles_per_tick:f64) { self.carrier_freq_offset = cycles_per_tick; }

	pub fn code(&self) -> bool { self.generator.chip() }

	/// Unit phasor at the current carrier phase
	pub fn carrier(&self) -> Complex<f64> { Complex::from_polar(1.0, 2.0 * consts::PI * self.carrier_phase) }

	pub fn reset(&mut self) {
		self.code_phase = 0.0;
		self.code_phase_offset = 0.0;
		self.code_freq_offset = 0.0;
		self.carrier_phase = 0.0;
		self.carrier_phase_offset = 0.0;
		self.carrier_freq_offset = 0.0;
		self.carrier_accum = 0;
		self.local_time = 0.0;
		self.generator.reset();
	}

	pub fn code_phase(&self) -> f64 { self.code_phase }
	pub fn code_phase_offset(&self) -> f64 { self.code_phase_offset }
	pub fn code_phase_offset_sec(&self) -> f64 { self.code_phase_offset * self.code_chip_len() }

	pub fn carrier_phase(&self) -> f64 { self.carrier_phase }
	pub fn carrier_phase_offset(&self) -> f64 { self.carrier_phase_offset }
	pub fn carrier_accum(&self) -> i64 { self.carrier_accum }

	pub fn local_time(&self) -> f64 { self.local_time }
	pub fn tick_size(&self) -> f64 { self.tick_size }
	pub fn code_freq(&self) -> f64 { self.code_freq }
	pub fn carrier_freq(&self) -> f64 { self.carrier_freq }
	pub fn chips_per_tick(&self) -> f64 { self.chips_per_tick }
	pub fn cycles_per_tick(&self) -> f64 { self.cycles_per_tick }

	/// Duration of one chip in seconds
	pub fn code_chip_len(&self) -> f64 { 1.0 / self.code_freq }

	pub fn generator(&self) -> &G { &self.generator }
	pub fn generator_mut(&mut self) -> &mut G { &mut self.generator }

}
