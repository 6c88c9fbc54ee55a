
use std::f64::consts;
use std::str::FromStr;

use num_complex::Complex;
use num_traits::Zero;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::gnss::code::{CaCodeGenerator, PCodeGenerator};
use crate::gnss::constants::{self, CA_CHIP_FREQ_HZ, NAV_BIT_PERIOD_SEC, P_CHIP_FREQ_HZ};
use crate::gnss::replica::CcReplica;
use crate::utils::db_to_linear;
use crate::{Error, Result, Sample};

/// Number of bands written per epoch: L1 then L2
pub const BAND_COUNT:usize = 2;

/// One simulated signal, parsed from `code:band:prn:offset:doppler:nav`.
///
/// `code` is `c`, `p` or `cp`; `offset` is in microseconds; `doppler` in Hz; `nav` is `0`, `c`, `p` or `cp` and
/// selects which codes carry the dummy navigation bit.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SvSpec {
	pub ca: bool,
	pub p: bool,
	pub band: u8,
	pub prn: usize,
	pub offset_sec: f64,
	pub doppler_hz: f64,
	pub ca_nav: bool,
	pub p_nav: bool,
}

impl FromStr for SvSpec {
	type Err = Error;

	fn from_str(s:&str) -> Result<Self> {
		let words:Vec<&str> = s.split(':').collect();
		if words.len() != 6 { return Err(Error::InvalidConfig(format!("expected code:band:prn:offset:doppler:nav, got '{}'", s))); }

		let code = words[0].to_lowercase();
		let nav  = words[5].to_lowercase();
		if code.is_empty() || code.len() > 2 || !code.chars().all(|c| c == 'c' || c == 'p') {
			return Err(Error::UnknownCode(words[0].to_string()));
		}
		if nav.len() > 2 || !nav.chars().all(|c| c == 'c' || c == 'p' || c == '0') {
			return Err(Error::InvalidConfig(format!("bad nav selector '{}'", words[5])));
		}

		let parse_err = |what:&str, v:&str| Error::InvalidConfig(format!("bad {} '{}'", what, v));
		let band:u8       = words[1].parse().map_err(|_| parse_err("band", words[1]))?;
		let prn:usize     = words[2].parse().map_err(|_| parse_err("PRN", words[2]))?;
		let offset_us:f64 = words[3].parse().map_err(|_| parse_err("offset", words[3]))?;
		let doppler_hz:f64 = words[4].parse().map_err(|_| parse_err("Doppler", words[4]))?;

		if band < 1 || band as usize > BAND_COUNT { return Err(parse_err("band", words[1])); }

		let ca = code.contains('c');
		let p  = code.contains('p');
		Ok(Self { ca, p, band, prn, offset_sec: offset_us * 1.0e-6, doppler_hz, ca_nav: ca && nav.contains('c'), p_nav: p && nav.contains('p') })
	}
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimConfig {
	pub sample_rate_hz: f64,
	pub inter_freq_hz: f64,
	pub ca_amplitude: f64,
	pub p_amplitude: f64,
	/// Standard deviation of each noise component
	pub noise_sigma: f64,
	pub gain: f64,
	/// Receiver oscillator error, as a fraction (1e-6 = 1 ppm)
	pub freq_err: f64,
	/// Leave the codes at baseband with no carrier
	pub code_only: bool,
	pub seed: u64,
}

impl Default for SimConfig {
	fn default() -> Self {
		Self {
			sample_rate_hz: 20.0e6,
			inter_freq_hz: 0.42e6,
			ca_amplitude: 0.1767 * consts::SQRT_2,
			p_amplitude: 0.1250 * consts::SQRT_2,
			noise_sigma: 2.805,
			gain: 1.0,
			freq_err: 0.0,
			code_only: false,
			seed: 0,
		}
	}
}

impl SimConfig {

	/// Scales the noise by a level in dB, using the same power-style conversion as the gain
	pub fn with_noise_db(mut self, db:f64) -> Self {
		self.noise_sigma *= db_to_linear(db);
		self
	}

	pub fn with_gain_db(mut self, db:f64) -> Self {
		self.gain = db_to_linear(db);
		self
	}

}

/// Baseband contribution of one satellite: C/A in phase, P in quadrature, on a carrier at the IF plus Doppler
pub struct SvSource {
	spec: SvSpec,
	ca: Option<CcReplica<CaCodeGenerator>>,
	p: Option<CcReplica<PCodeGenerator>>,
	ca_amplitude: f64,
	p_amplitude: f64,
	code_only: bool,
	carrier_phase: f64,
	cycles_per_tick: f64,
	nav_ticks: u64,
	ticks: u64,
}

fn bipolar(chip:bool) -> f64 { if chip { -1.0 } else { 1.0 } }

impl SvSource {

	pub fn new(spec:SvSpec, config:&SimConfig) -> Result<Self> {
		let band_freq = constants::band_freq_hz(spec.band).ok_or_else(|| Error::InvalidConfig(format!("no band {}", spec.band)))?;
		if !(config.sample_rate_hz.is_finite() && config.sample_rate_hz > 0.0) {
			return Err(Error::InvalidConfig(format!("sample rate must be positive, got {}", config.sample_rate_hz)));
		}
		let tick = 1.0 / config.sample_rate_hz;
		let scale = 1.0 - config.freq_err;
		let doppler = spec.doppler_hz * scale;

		let ca = if spec.ca {
			let mut rep = CcReplica::new(tick, CA_CHIP_FREQ_HZ * scale, 0.0, CaCodeGenerator::new(spec.prn)?)?;
			rep.set_code_freq_offset_hz(doppler * CA_CHIP_FREQ_HZ / band_freq);
			rep.move_code_phase(spec.offset_sec * CA_CHIP_FREQ_HZ);
			Some(rep)
		} else { None };

		let p = if spec.p {
			let mut rep = CcReplica::new(tick, P_CHIP_FREQ_HZ * scale, 0.0, PCodeGenerator::new(spec.prn)?)?;
			rep.set_code_freq_offset_hz(doppler * P_CHIP_FREQ_HZ / band_freq);
			rep.move_code_phase(spec.offset_sec * P_CHIP_FREQ_HZ);
			Some(rep)
		} else { None };

		let nav_ticks = ((NAV_BIT_PERIOD_SEC / tick).round() as u64).max(1);

		debug!(prn = spec.prn, band = spec.band, ca = spec.ca, p = spec.p, doppler, "SV source created");

		Ok(Self {
			ca_amplitude: config.ca_amplitude,
			p_amplitude: config.p_amplitude,
			code_only: config.code_only,
			carrier_phase: 0.0,
			cycles_per_tick: (config.inter_freq_hz + doppler) * tick,
			nav_ticks,
			ticks: 0,
			ca, p, spec,
		})
	}

	pub fn spec(&self) -> &SvSpec { &self.spec }
	pub fn band(&self) -> u8 { self.spec.band }

	// The dummy navigation message alternates every bit period
	fn nav_sign(&self) -> f64 { if (self.ticks / self.nav_ticks) % 2 == 1 { -1.0 } else { 1.0 } }

	/// Advances one sample period and returns the signal at the new time
	pub fn next_sample(&mut self) -> Complex<f64> {
		let nav = self.nav_sign();
		self.ticks += 1;

		let mut v:Complex<f64> = Complex::zero();
		if let Some(rep) = self.ca.as_mut() {
			rep.tick();
			let d = if self.spec.ca_nav { nav } else { 1.0 };
			v.re += self.ca_amplitude * bipolar(rep.code()) * d;
		}
		if let Some(rep) = self.p.as_mut() {
			rep.tick();
			let d = if self.spec.p_nav { nav } else { 1.0 };
			v.im += self.p_amplitude * bipolar(rep.code()) * d;
		}

		if self.code_only { return v; }

		self.carrier_phase = (self.carrier_phase + self.cycles_per_tick).rem_euclid(1.0);
		v * Complex::from_polar(1.0, 2.0 * consts::PI * self.carrier_phase)
	}

}

/// Sums SV sources per band, then adds receiver noise and gain
pub struct SignalSimulator {
	config: SimConfig,
	sources: Vec<SvSource>,
	rng: StdRng,
	noise: Normal<f64>,
	idx: usize,
}

impl SignalSimulator {

	pub fn new(config:SimConfig, specs:&[SvSpec]) -> Result<Self> {
		let noise = Normal::new(0.0, config.noise_sigma.abs())
			.map_err(|e| Error::InvalidConfig(format!("noise sigma {}: {}", config.noise_sigma, e)))?;
		let sources = specs.iter().map(|s| SvSource::new(s.clone(), &config)).collect::<Result<Vec<SvSource>>>()?;
		let rng = StdRng::seed_from_u64(config.seed);
		Ok(Self { config, sources, rng, noise, idx: 0 })
	}

	pub fn config(&self) -> &SimConfig { &self.config }
	pub fn sources(&self) -> &[SvSource] { &self.sources }

	/// One sample per band, L1 first
	pub fn next_epoch(&mut self) -> Vec<Sample> {
		let mut accum:Vec<Complex<f64>> = vec![Complex::zero(); BAND_COUNT];
		for src in self.sources.iter_mut() {
			let band = src.band() as usize - 1;
			accum[band] += src.next_sample();
		}

		let idx = self.idx;
		self.idx += 1;

		let gain = self.config.gain;
		let (rng, noise) = (&mut self.rng, &self.noise);
		accum.into_iter().map(|s| {
			let n = Complex::new(noise.sample(&mut *rng), noise.sample(&mut *rng));
			Sample{ val: (s + n) * gain, idx }
		}).collect()
	}

}

impl Iterator for SignalSimulator {
	type Item = Vec<Sample>;

	fn next(&mut self) -> Option<Vec<Sample>> { Some(self.next_epoch()) }
}
