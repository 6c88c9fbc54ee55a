
use std::fmt;
use std::str::FromStr;

use crate::gnss::constants;
use crate::{Error, Result};

pub mod ca;
pub mod p;
pub mod sequence;

pub use self::ca::CaCodeGenerator;
pub use self::p::PCodeGenerator;
pub use self::sequence::CodeSequence;

/// A ranging code chip stream, indexable by absolute chip count.
///
/// Indices are signed so that phase corrections may move a replica backwards past its origin; each
/// generator reduces the index onto its own period.
pub trait CodeGenerator {

	/// Chip at the current index (true = logic 1)
	fn chip(&self) -> bool;

	fn advance(&mut self);
	fn retreat(&mut self) { let i = self.index(); self.set_index(i - 1); }

	fn set_index(&mut self, idx:i64);
	fn index(&self) -> i64;

	/// Number of chips in one full period of the code
	fn chip_count(&self) -> i64;

	/// Number of chips between integrate-and-dump boundaries
	fn sync_period(&self) -> i64;

	/// The next sync boundary strictly after the current index
	fn sync_index(&self) -> i64 {
		let p = self.sync_period();
		(self.index().div_euclid(p) + 1) * p
	}

	fn is_sync_boundary(&self) -> bool { self.index().rem_euclid(self.sync_period()) == 0 }

	fn reset(&mut self) { self.set_index(0); }

	fn prn(&self) -> usize;
	fn kind(&self) -> CodeKind;

}

impl<G: CodeGenerator + ?Sized> CodeGenerator for Box<G> {
	fn chip(&self) -> bool { (**self).chip() }
	fn advance(&mut self) { (**self).advance() }
	fn retreat(&mut self) { (**self).retreat() }
	fn set_index(&mut self, idx:i64) { (**self).set_index(idx) }
	fn index(&self) -> i64 { (**self).index() }
	fn chip_count(&self) -> i64 { (**self).chip_count() }
	fn sync_period(&self) -> i64 { (**self).sync_period() }
	fn sync_index(&self) -> i64 { (**self).sync_index() }
	fn is_sync_boundary(&self) -> bool { (**self).is_sync_boundary() }
	fn reset(&mut self) { (**self).reset() }
	fn prn(&self) -> usize { (**self).prn() }
	fn kind(&self) -> CodeKind { (**self).kind() }
}

pub type BoxedCodeGenerator = Box<dyn CodeGenerator + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CodeKind {
	CA,
	P,
}

impl CodeKind {

	pub fn chip_freq_hz(&self) -> f64 {
		match self {
			CodeKind::CA => constants::CA_CHIP_FREQ_HZ,
			CodeKind::P  => constants::P_CHIP_FREQ_HZ,
		}
	}

}

impl FromStr for CodeKind {
	type Err = Error;

	fn from_str(s:&str) -> Result<Self> {
		match s.to_lowercase().as_str() {
			"c" | "ca" => Ok(CodeKind::CA),
			"p"        => Ok(CodeKind::P),
			_          => Err(Error::UnknownCode(s.to_string())),
		}
	}
}

impl fmt::Display for CodeKind {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		match self {
			CodeKind::CA => write!(f, "C/A"),
			CodeKind::P  => write!(f, "P"),
		}
	}
}

pub fn new_code_generator(kind:CodeKind, prn:usize) -> Result<BoxedCodeGenerator> {
	Ok(match kind {
		CodeKind::CA => Box::new(CaCodeGenerator::new(prn)?),
		CodeKind::P  => Box::new(PCodeGenerator::new(prn)?),
	})
}

#[cfg(test)]
mod tests {

	use super::*;

	#[test]
	fn code_kind_parses_receiver_option_letters() {
		assert_eq!("c".parse::<CodeKind>().unwrap(), CodeKind::CA);
		assert_eq!("P".parse::<CodeKind>().unwrap(), CodeKind::P);
		assert!("y".parse::<CodeKind>().is_err());
	}

	#[test]
	fn boxed_generator_forwards_to_inner() {
		let mut g = new_code_generator(CodeKind::CA, 3).unwrap();
		let mut direct = CaCodeGenerator::new(3).unwrap();
		for _ in 0..2000 {
			assert_eq!(g.chip(), direct.chip());
			g.advance();
			direct.advance();
		}
		assert_eq!(g.index(), 2000);
		assert_eq!(g.sync_index(), 2046);
		assert_eq!(g.kind(), CodeKind::CA);
		assert_eq!(g.prn(), 3);
	}

}
