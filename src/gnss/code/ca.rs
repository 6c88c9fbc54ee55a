
use crate::gnss::constants::CA_CODE_LEN;
use crate::utils::wrap_index;
use crate::{Error, Result};

use super::sequence::{self, CodeSequence};
use super::{CodeGenerator, CodeKind};

// G2 delay in chips for PRN 1 through 37, IS-GPS-200 Table 3-Ia
pub const G2_DELAY:[usize; 37] = [
	  5,   6,   7,   8,  17,  18, 139, 140, 141, 251,
	252, 254, 255, 256, 257, 258, 469, 470, 471, 472,
	473, 474, 509, 512, 513, 514, 515, 516, 859, 860,
	861, 862, 863, 950, 947, 948, 950,
];

pub const MAX_PRN:usize = 37;

const G1_STAGES:[u32; 2] = [3, 10];
const G2_STAGES:[u32; 6] = [2, 3, 6, 8, 9, 10];
const ALL_ONES:u32 = 0x3FF;

/// GPS L1 C/A code: G1 XOR a PRN-specific delay of G2, 1023 chips per millisecond
#[derive(Debug, Clone)]
pub struct CaCodeGenerator {
	prn: usize,
	g2_delay: usize,
	g1: CodeSequence,
	g2: CodeSequence,
	index: i64,
}

impl CaCodeGenerator {

	pub fn new(prn:usize) -> Result<Self> {
		if prn < 1 || prn > MAX_PRN { return Err(Error::UnsupportedPrn{ code: "C/A", prn }); }

		let g1 = CodeSequence::new(CA_CODE_LEN, ALL_ONES, sequence::taps(&G1_STAGES))?;
		let g2 = CodeSequence::new(CA_CODE_LEN, ALL_ONES, sequence::taps(&G2_STAGES))?;

		let mut ans = Self { prn, g2_delay: G2_DELAY[prn - 1], g1, g2, index: 0 };
		ans.set_index(0);
		Ok(ans)
	}

	pub fn g2_delay(&self) -> usize { self.g2_delay }

	/// The whole code as +1/-1 values (logic 0 maps to +1)
	pub fn code_bipolar(prn:usize) -> Result<Vec<i8>> {
		let mut code_gen = Self::new(prn)?;
		Ok((0..CA_CODE_LEN).map(|_| {
			let v = if code_gen.chip() { -1 } else { 1 };
			code_gen.advance();
			v
		}).collect())
	}

}

impl CodeGenerator for CaCodeGenerator {

	fn chip(&self) -> bool { self.g1.chip() ^ self.g2.chip() }

	fn advance(&mut self) {
		self.index += 1;
		self.g1.increment();
		self.g2.increment();
	}

	fn set_index(&mut self, idx:i64) {
		let len = CA_CODE_LEN as i64;
		self.index = idx;
		self.g1.set_index(wrap_index(idx, len) as usize);
		self.g2.set_index(wrap_index(idx + len - self.g2_delay as i64, len) as usize);
	}

	fn index(&self) -> i64 { self.index }

	fn chip_count(&self) -> i64 { CA_CODE_LEN as i64 }
	fn sync_period(&self) -> i64 { CA_CODE_LEN as i64 }

	fn prn(&self) -> usize { self.prn }
	fn kind(&self) -> CodeKind { CodeKind::CA }

}
