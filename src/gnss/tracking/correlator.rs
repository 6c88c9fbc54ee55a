
use std::collections::VecDeque;

use num_complex::Complex;
use num_traits::Zero;

/// Most recent local code reference values, newest at delay 0
#[derive(Debug, Clone)]
pub struct CodeDelayLine {
	buf: VecDeque<f64>,
}

impl CodeDelayLine {

	pub fn new(max_delay:usize) -> Self {
		Self { buf: std::iter::repeat(0.0).take(max_delay + 1).collect() }
	}

	pub fn push(&mut self, code_ref:f64) {
		self.buf.pop_back();
		self.buf.push_front(code_ref);
	}

	/// Reference value from `delay` ticks ago; zero before the line has filled
	pub fn get(&self, delay:usize) -> f64 { self.buf.get(delay).copied().unwrap_or(0.0) }

	pub fn max_delay(&self) -> usize { self.buf.len() - 1 }

	pub fn clear(&mut self) {
		for v in self.buf.iter_mut() { *v = 0.0; }
	}

}

/// Integrate-and-dump accumulator for one correlator tap
#[derive(Debug, Clone, Copy)]
pub struct Correlator {
	delay: usize,
	sum: Complex<f64>,
}

impl Correlator {

	pub fn new(delay:usize) -> Self { Self { delay, sum: Complex::zero() } }

	pub fn delay(&self) -> usize { self.delay }
	pub fn set_delay(&mut self, delay:usize) { self.delay = delay; }

	pub fn accumulate(&mut self, mixed:Complex<f64>, line:&CodeDelayLine) {
		self.sum += mixed * line.get(self.delay);
	}

	pub fn value(&self) -> Complex<f64> { self.sum }

	pub fn reset(&mut self) { self.sum = Complex::zero(); }

}
