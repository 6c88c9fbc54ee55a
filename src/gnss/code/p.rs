
use std::sync::OnceLock;

use tracing::{debug, error};

use crate::gnss::constants::{P_CHIPS_PER_WEEK, P_SYNC_CHIPS, X1_EPOCH_CHIPS, X1_EPOCHS_PER_WEEK, X2_EPOCH_CHIPS};
use crate::gnss::constants::{X1A_CYCLE_CHIPS, X1B_CYCLE_CHIPS, X2A_CYCLE_CHIPS, X2B_CYCLE_CHIPS};
use crate::utils::{wrap_index, BitTable};
use crate::{Error, Result};

use super::sequence::{self, CodeSequence};
use super::{CodeGenerator, CodeKind};

pub const MAX_PRN:usize = 37;

/// Chips held in memory at once: four X1 epochs (four Z-counts, 6 seconds)
pub const WINDOW_CHIPS:i64 = 4 * X1_EPOCH_CHIPS;

// X2 falls 37 chips behind X1 every epoch, so only 403,199 whole X2 epochs fit in a week
const X2_REGULAR_CHIPS:i64 = (X1_EPOCHS_PER_WEEK - 1) * X2_EPOCH_CHIPS;
const X2_END_OF_WEEK_CHIPS:i64 = P_CHIPS_PER_WEEK - X2_REGULAR_CHIPS;

struct Register {
	initial: u32,
	stages: &'static [u32],
	cycle: usize,
}

// IS-GPS-200 Table 3-II; the rightmost digit of each initial state is stage 1
const X1A:Register = Register{ initial: 0b001001001000, stages: &[6, 8, 11, 12], cycle: X1A_CYCLE_CHIPS };
const X1B:Register = Register{ initial: 0b010101010100, stages: &[1, 2, 5, 8, 9, 10, 11, 12], cycle: X1B_CYCLE_CHIPS };
const X2A:Register = Register{ initial: 0b100100100101, stages: &[1, 3, 4, 5, 7, 8, 9, 10, 11, 12], cycle: X2A_CYCLE_CHIPS };
const X2B:Register = Register{ initial: 0b010101010100, stages: &[2, 3, 4, 8, 9, 12], cycle: X2B_CYCLE_CHIPS };

impl Register {
	fn sequence(&self) -> Result<CodeSequence> { CodeSequence::short_cycled(self.cycle, self.initial, sequence::taps(self.stages)) }
}

// Runs a short-cycled register for as many whole cycles as fit in `span` chips, then holds it on its last chip
struct HeldRegister {
	seq: CodeSequence,
	run: usize,
	step: usize,
}

impl HeldRegister {

	fn new(seq:CodeSequence, span:usize) -> Self {
		let run = (span / seq.len()) * seq.len();
		Self { seq, run, step: 0 }
	}

	fn next(&mut self) -> bool {
		if self.step < self.run {
			let c = self.seq.chip();
			self.seq.increment();
			self.step += 1;
			c
		} else {
			self.seq.bit(self.seq.len() - 1)
		}
	}

}

fn combined_epoch(a:&Register, b:&Register, span:usize) -> Result<BitTable> {
	let mut ra = HeldRegister::new(a.sequence()?, span);
	let mut rb = HeldRegister::new(b.sequence()?, span);
	Ok(BitTable::from_fn(span, |_| ra.next() ^ rb.next()))
}

/// X1 and X2 epoch tables shared by every P-code generator in the process
pub struct BaseSequences {
	x1: BitTable,
	x2: BitTable,
	x2_end_of_week: BitTable,
}

impl BaseSequences {

	fn build() -> Result<Self> {
		debug!("building P-code X1/X2 epoch tables");
		let x1 = combined_epoch(&X1A, &X1B, X1_EPOCH_CHIPS as usize)?;
		let x2 = combined_epoch(&X2A, &X2B, X2_EPOCH_CHIPS as usize)?;
		let x2_end_of_week = combined_epoch(&X2A, &X2B, X2_END_OF_WEEK_CHIPS as usize)?;
		Ok(Self { x1, x2, x2_end_of_week })
	}

	/// `n` X1 chips starting at week chip `m`, LSB first
	pub fn x1_bits(&self, m:i64, n:usize) -> u64 {
		self.x1.bits_cyclic(wrap_index(m, X1_EPOCH_CHIPS) as usize, n)
	}

	/// `n` X2 chips starting at week chip `m`, LSB first.  Chips before the start of the week come from the
	/// end of the previous one, where X2A and X2B are held.
	pub fn x2_bits(&self, m:i64, n:usize) -> u64 {
		let mut ans:u64 = 0;
		let mut done:usize = 0;
		let mut m = wrap_index(m, P_CHIPS_PER_WEEK);
		while done < n {
			let remaining = (n - done) as i64;
			let (bits, k) = if m < X2_REGULAR_CHIPS {
				let k = remaining.min(X2_REGULAR_CHIPS - m) as usize;
				(self.x2.bits_cyclic((m % X2_EPOCH_CHIPS) as usize, k), k)
			} else {
				let off = m - X2_REGULAR_CHIPS;
				let k = remaining.min(X2_END_OF_WEEK_CHIPS - off) as usize;
				(self.x2_end_of_week.bits(off as usize, k), k)
			};
			ans |= bits << done;
			done += k;
			m = wrap_index(m + k as i64, P_CHIPS_PER_WEEK);
		}
		ans
	}

	/// Single P-code chip for `prn` at week chip `m`
	pub fn chip(&self, prn:usize, m:i64) -> bool {
		(self.x1_bits(m, 1) ^ self.x2_bits(m - prn as i64, 1)) == 1
	}

	fn window(&self, prn:usize, start:i64) -> BitTable {
		let len = WINDOW_CHIPS as usize;
		let words:Vec<u64> = (0..(len + 63) / 64).map(|w| {
			let m = start + (w * 64) as i64;
			let n = 64usize.min(len - w * 64);
			self.x1_bits(m, n) ^ self.x2_bits(m - prn as i64, n)
		}).collect();
		BitTable::from_words(words, len)
	}

}

/// Process-wide X1/X2 tables, built on first use no matter how many generators exist
pub fn base_sequences() -> Result<&'static BaseSequences> {
	static BASE:OnceLock<Option<BaseSequences>> = OnceLock::new();
	BASE.get_or_init(|| match BaseSequences::build() {
		Ok(base) => Some(base),
		Err(e) => {
			error!("unable to build P-code base sequences: {}", e);
			None
		}
	}).as_ref().ok_or(Error::InvalidRegister("P-code X1/X2 registers failed to build"))
}

/// GPS P code, PRN i = X1 XOR (X2 delayed by i chips).
///
/// The week-long code cannot be tabulated, so the generator keeps a 6-second window and rebuilds it whenever the
/// index leaves that window.  Rebuilding costs tens of milliseconds and is logged at debug level.
pub struct PCodeGenerator {
	prn: usize,
	base: &'static BaseSequences,
	window: BitTable,
	window_start: i64,
	offset: i64,
	regenerations: usize,
}

impl PCodeGenerator {

	pub fn new(prn:usize) -> Result<Self> {
		if prn < 1 || prn > MAX_PRN { return Err(Error::UnsupportedPrn{ code: "P", prn }); }
		let base = base_sequences()?;
		let window = base.window(prn, 0);
		Ok(Self { prn, base, window, window_start: 0, offset: 0, regenerations: 0 })
	}

	/// Number of times the window has been rebuilt since construction
	pub fn regenerations(&self) -> usize { self.regenerations }

	pub fn window_start(&self) -> i64 { self.window_start }

	/// Z-count (1.5 s X1 epochs) since the start of the week
	pub fn z_count(&self) -> i64 { self.index() / X1_EPOCH_CHIPS }

	fn load_window(&mut self, start:i64) {
		debug!(prn = self.prn, z_count = start / X1_EPOCH_CHIPS, "regenerating P-code window");
		self.window = self.base.window(self.prn, start);
		self.window_start = start;
		self.regenerations += 1;
	}

}

impl CodeGenerator for PCodeGenerator {

	fn chip(&self) -> bool { self.window.get(self.offset as usize) }

	fn advance(&mut self) {
		self.offset += 1;
		if self.offset >= WINDOW_CHIPS {
			let next = wrap_index(self.window_start + WINDOW_CHIPS, P_CHIPS_PER_WEEK);
			self.load_window(next);
			self.offset = 0;
		}
	}

	fn retreat(&mut self) {
		if self.offset == 0 {
			let prev = wrap_index(self.window_start - WINDOW_CHIPS, P_CHIPS_PER_WEEK);
			self.load_window(prev);
			self.offset = WINDOW_CHIPS - 1;
		} else {
			self.offset -= 1;
		}
	}

	fn set_index(&mut self, idx:i64) {
		let i = wrap_index(idx, P_CHIPS_PER_WEEK);
		let start = i - i % WINDOW_CHIPS;
		if start != self.window_start { self.load_window(start); }
		self.offset = i - start;
	}

	fn index(&self) -> i64 { self.window_start + self.offset }

	fn chip_count(&self) -> i64 { P_CHIPS_PER_WEEK }
	fn sync_period(&self) -> i64 { P_SYNC_CHIPS }

	fn prn(&self) -> usize { self.prn }
	fn kind(&self) -> CodeKind { CodeKind::P }

}
