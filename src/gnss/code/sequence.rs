
use crate::utils::BitTable;
use crate::{Error, Result};

/// One period of a linear feedback shift register output, tabulated once so that every later access is O(1).
///
/// The register is a Fibonacci LFSR: bit k-1 of the register holds stage k, the output chip is the highest
/// stage, and on every shift the parity of `register & taps` is fed into stage 1.  The degree of the register
/// is the position of the highest tap.
#[derive(Debug, Clone)]
pub struct CodeSequence {
	table: BitTable,
	index: usize,
}

impl CodeSequence {

	/// Tabulates a full-period sequence.  `length` must be the true period of (`initial`, `taps`).
	pub fn new(length:usize, initial:u32, taps:u32) -> Result<Self> {
		let (table, final_state, first_repeat) = run_register(length, initial, taps)?;

		if let Some(period) = first_repeat {
			return Err(Error::PeriodMismatch{ length, period });
		}
		if final_state != initial {
			return Err(Error::PeriodMismatch{ length, period: natural_period(initial, taps) });
		}

		Ok(Self { table, index: 0 })
	}

	/// Tabulates the first `length` chips of a register that gets reset before its natural period ends
	pub fn short_cycled(length:usize, initial:u32, taps:u32) -> Result<Self> {
		let (table, _, first_repeat) = run_register(length, initial, taps)?;

		if let Some(period) = first_repeat {
			return Err(Error::PeriodMismatch{ length, period });
		}

		Ok(Self { table, index: 0 })
	}

	pub fn len(&self) -> usize { self.table.len() }
	pub fn is_empty(&self) -> bool { self.table.is_empty() }

	pub fn chip(&self) -> bool { self.table.get(self.index) }
	pub fn bit(&self, i:usize) -> bool { self.table.get(i % self.table.len()) }

	pub fn increment(&mut self) {
		self.index += 1;
		if self.index == self.table.len() { self.index = 0; }
	}

	pub fn set_index(&mut self, i:usize) { self.index = i % self.table.len(); }
	pub fn index(&self) -> usize { self.index }

	pub fn is_last_in_sequence(&self) -> bool { self.index == self.table.len() - 1 }

}

fn degree(taps:u32) -> u32 { 32 - taps.leading_zeros() }

fn shift(reg:u32, taps:u32, mask:u32) -> u32 {
	let feedback = (reg & taps).count_ones() & 1;
	((reg << 1) | feedback) & mask
}

// Returns the output table, the register state after `length` shifts, and the step at which the
// register first came back to `initial` if that happened before `length`
fn run_register(length:usize, initial:u32, taps:u32) -> Result<(BitTable, u32, Option<usize>)> {
	if taps == 0 || degree(taps) > 31 { return Err(Error::InvalidRegister("taps must select between 1 and 31 stages")); }
	let deg  = degree(taps);
	let mask = (1u32 << deg) - 1;

	if initial == 0 || initial & !mask != 0 { return Err(Error::InvalidRegister("initial state must be non-zero and fit the register")); }
	if length == 0 || length > mask as usize { return Err(Error::InvalidRegister("length must be between 1 and 2^degree - 1")); }

	let mut table = BitTable::zeros(length);
	let mut reg = initial;
	let mut first_repeat:Option<usize> = None;
	for i in 0..length {
		if i > 0 && reg == initial && first_repeat.is_none() { first_repeat = Some(i); }
		table.set(i, (reg >> (deg - 1)) & 1 == 1);
		reg = shift(reg, taps, mask);
	}

	Ok((table, reg, first_repeat))
}

fn natural_period(initial:u32, taps:u32) -> usize {
	let mask = (1u32 << degree(taps)) - 1;
	let mut reg = shift(initial, taps, mask);
	let mut period = 1;
	while reg != initial && period <= mask as usize {
		reg = shift(reg, taps, mask);
		period += 1;
	}
	period
}

/// Tap mask with the given (1-based) register stages set
pub fn taps(stages:&[u32]) -> u32 { stages.iter().fold(0, |acc, s| acc | (1 << (s - 1))) }
