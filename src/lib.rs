
use num_complex::Complex;

pub mod block;
pub mod gnss;
pub mod io;
pub mod utils;

#[derive(Debug, Clone, Copy)]
pub struct Sample {
	pub val: Complex<f64>,
	pub idx: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("PRN {prn} is not supported for {code} code")]
	UnsupportedPrn { code: &'static str, prn: usize },

	#[error("LFSR table length {length} does not match register period {period}")]
	PeriodMismatch { length: usize, period: usize },

	#[error("invalid shift register: {0}")]
	InvalidRegister(&'static str),

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("unknown code '{0}'")]
	UnknownCode(String),

	#[error("unknown IQ format '{0}'")]
	UnknownIqFormat(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("channel closed")]
	ChannelClosed,

	#[error("block task failed: {0}")]
	Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
