
use std::fmt;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::str::FromStr;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_complex::Complex;
use tracing::warn;

use crate::{Error, Result, Sample};

/// Sample encoding of an interleaved I/Q stream.
///
/// Byte formats are little-endian.  The quantized formats pack values MSB first with I before Q, and a
/// value never straddles a byte: `OneBit` is a sign bit (set = negative, decoded as -1/+1), `TwoBit` is a
/// sign bit followed by a magnitude bit (set = 3, clear = 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum IqFormat {
	F32,
	I16,
	I8,
	OneBit,
	TwoBit,
}

/// Input magnitude at or above which a two-bit value takes the high level
pub const TWO_BIT_THRESHOLD:f64 = 2.0;

impl IqFormat {

	/// Bits in one of the two values making up a complex sample
	pub fn value_bits(&self) -> u32 {
		match self {
			IqFormat::F32    => 32,
			IqFormat::I16    => 16,
			IqFormat::I8     => 8,
			IqFormat::OneBit => 1,
			IqFormat::TwoBit => 2,
		}
	}

	/// Bits in one complex sample
	pub fn sample_bits(&self) -> u32 { 2 * self.value_bits() }

	pub fn is_packed(&self) -> bool { self.value_bits() < 8 }

}

impl FromStr for IqFormat {
	type Err = Error;

	fn from_str(s:&str) -> Result<Self> {
		match s {
			"f" => Ok(IqFormat::F32),
			"s" => Ok(IqFormat::I16),
			"b" => Ok(IqFormat::I8),
			"1" => Ok(IqFormat::OneBit),
			"2" => Ok(IqFormat::TwoBit),
			_   => Err(Error::UnknownIqFormat(s.to_string())),
		}
	}
}

impl fmt::Display for IqFormat {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		match self {
			IqFormat::F32    => write!(f, "f"),
			IqFormat::I16    => write!(f, "s"),
			IqFormat::I8     => write!(f, "b"),
			IqFormat::OneBit => write!(f, "1"),
			IqFormat::TwoBit => write!(f, "2"),
		}
	}
}

/// Reads epochs of `bands` complex samples (one per band) sharing a single sample index
pub struct IqReader<R: Read> {
	src: BufReader<R>,
	format: IqFormat,
	bands: usize,
	idx: usize,
	bit_buf: u8,
	bits_left: u32,
}

impl<R: Read> IqReader<R> {

	pub fn new(src:R, format:IqFormat, bands:usize) -> Result<Self> {
		if bands == 0 { return Err(Error::InvalidConfig("an IQ stream needs at least one band".to_string())); }
		Ok(Self { src: BufReader::new(src), format, bands, idx: 0, bit_buf: 0, bits_left: 0 })
	}

	pub fn bands(&self) -> usize { self.bands }
	pub fn format(&self) -> IqFormat { self.format }

	fn read_value(&mut self) -> io::Result<f64> {
		match self.format {
			IqFormat::F32 => self.src.read_f32::<LittleEndian>().map(|v| v as f64),
			IqFormat::I16 => self.src.read_i16::<LittleEndian>().map(|v| v as f64),
			IqFormat::I8  => self.src.read_i8().map(|v| v as f64),
			IqFormat::OneBit => {
				let b = self.read_bits(1)?;
				Ok(if b == 1 { -1.0 } else { 1.0 })
			},
			IqFormat::TwoBit => {
				let b = self.read_bits(2)?;
				let mag = if b & 1 == 1 { 3.0 } else { 1.0 };
				Ok(if b & 2 == 2 { -mag } else { mag })
			},
		}
	}

	fn read_bits(&mut self, n:u32) -> io::Result<u8> {
		if self.bits_left == 0 {
			self.bit_buf = self.src.read_u8()?;
			self.bits_left = 8;
		}
		self.bits_left -= n;
		Ok((self.bit_buf >> self.bits_left) & ((1u8 << n) - 1))
	}

	/// Next epoch, or `None` at the end of the stream
	pub fn read_epoch(&mut self) -> Result<Option<Vec<Sample>>> {
		let mut epoch = Vec::with_capacity(self.bands);
		for band in 0..self.bands {
			let re = match self.read_value() {
				Ok(v) => v,
				Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
					if band > 0 { warn!("IQ stream ended partway through epoch {}", self.idx); }
					return Ok(None);
				},
				Err(e) => return Err(e.into()),
			};
			let im = match self.read_value() {
				Ok(v) => v,
				Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
					warn!("IQ stream ended partway through a sample at epoch {}", self.idx);
					return Ok(None);
				},
				Err(e) => return Err(e.into()),
			};
			epoch.push(Sample{ val: Complex::new(re, im), idx: self.idx });
		}
		self.idx += 1;
		Ok(Some(epoch))
	}

}

impl<R: Read> Iterator for IqReader<R> {
	type Item = Vec<Sample>;

	fn next(&mut self) -> Option<Vec<Sample>> {
		match self.read_epoch() {
			Ok(opt) => opt,
			Err(e) => {
				warn!("stopping IQ input: {}", e);
				None
			}
		}
	}
}

/// Writes complex samples in the same layout `IqReader` reads; integer formats round and saturate.
///
/// Packed formats hold a partial byte until it fills; `flush` pads it with zero bits, which read back as
/// extra positive samples, so flush only at the end of the stream.
pub struct IqWriter<W: Write> {
	dst: BufWriter<W>,
	format: IqFormat,
	acc: u8,
	acc_bits: u32,
}

impl<W: Write> IqWriter<W> {

	pub fn new(dst:W, format:IqFormat) -> Self { Self { dst: BufWriter::new(dst), format, acc: 0, acc_bits: 0 } }

	fn write_value(&mut self, v:f64) -> io::Result<()> {
		match self.format {
			IqFormat::F32 => self.dst.write_f32::<LittleEndian>(v as f32),
			IqFormat::I16 => self.dst.write_i16::<LittleEndian>(v.round().max(i16::MIN as f64).min(i16::MAX as f64) as i16),
			IqFormat::I8  => self.dst.write_i8(v.round().max(i8::MIN as f64).min(i8::MAX as f64) as i8),
			IqFormat::OneBit => self.write_bits((v < 0.0) as u8, 1),
			IqFormat::TwoBit => {
				let sign = (v < 0.0) as u8;
				let mag = (v.abs() >= TWO_BIT_THRESHOLD) as u8;
				self.write_bits((sign << 1) | mag, 2)
			},
		}
	}

	fn write_bits(&mut self, bits:u8, n:u32) -> io::Result<()> {
		self.acc = (self.acc << n) | bits;
		self.acc_bits += n;
		if self.acc_bits == 8 {
			self.dst.write_u8(self.acc)?;
			self.acc = 0;
			self.acc_bits = 0;
		}
		Ok(())
	}

	pub fn write_sample(&mut self, val:Complex<f64>) -> Result<()> {
		self.write_value(val.re)?;
		self.write_value(val.im)?;
		Ok(())
	}

	pub fn write_epoch(&mut self, epoch:&[Sample]) -> Result<()> {
		for s in epoch { self.write_sample(s.val)?; }
		Ok(())
	}

	pub fn flush(&mut self) -> Result<()> {
		if self.acc_bits > 0 {
			self.dst.write_u8(self.acc << (8 - self.acc_bits))?;
			self.acc = 0;
			self.acc_bits = 0;
		}
		self.dst.flush()?;
		Ok(())
	}

}

#[cfg(test)]
mod tests {

	use super::*;

	fn written(format:IqFormat, vals:&[Complex<f64>]) -> Vec<u8> {
		let mut buf:Vec<u8> = vec![];
		{
			let mut w = IqWriter::new(&mut buf, format);
			for v in vals { w.write_sample(*v).unwrap(); }
			w.flush().unwrap();
		}
		buf
	}

	#[test]
	fn format_selectors() {
		assert_eq!("f".parse::<IqFormat>().unwrap(), IqFormat::F32);
		assert_eq!("s".parse::<IqFormat>().unwrap(), IqFormat::I16);
		assert_eq!("b".parse::<IqFormat>().unwrap(), IqFormat::I8);
		assert_eq!("1".parse::<IqFormat>().unwrap(), IqFormat::OneBit);
		assert_eq!("2".parse::<IqFormat>().unwrap(), IqFormat::TwoBit);
		assert!("q".parse::<IqFormat>().is_err());
		assert_eq!(IqFormat::I16.to_string(), "s");
		assert_eq!(IqFormat::TwoBit.to_string(), "2");
	}

	#[test]
	fn float_stream_reads_back() {
		let vals = vec![Complex::new(0.5, -1.25), Complex::new(3.0, 0.0), Complex::new(-2.0, 7.5), Complex::new(1.0, 1.0)];
		let buf = written(IqFormat::F32, &vals);
		assert_eq!(buf.len() as u32 * 8, 4 * IqFormat::F32.sample_bits());

		let epochs:Vec<Vec<Sample>> = IqReader::new(&buf[..], IqFormat::F32, 2).unwrap().collect();
		assert_eq!(epochs.len(), 2);
		assert_eq!(epochs[0][1].val, vals[1]);
		assert_eq!(epochs[1][0].val, vals[2]);
		assert_eq!(epochs[1][0].idx, 1);
		assert_eq!(epochs[1][1].idx, 1);
	}

	#[test]
	fn integer_formats_saturate() {
		let buf = written(IqFormat::I8, &[Complex::new(300.0, -300.0), Complex::new(2.6, -2.4)]);
		assert_eq!(buf, vec![127u8, 128u8, 3u8, 254u8]);

		let buf = written(IqFormat::I16, &[Complex::new(1.0e6, -12.0)]);
		let back:Vec<Vec<Sample>> = IqReader::new(&buf[..], IqFormat::I16, 1).unwrap().collect();
		assert_eq!(back[0][0].val, Complex::new(32767.0, -12.0));
	}

	#[test]
	fn partial_epoch_ends_the_stream() {
		let buf = written(IqFormat::I16, &[Complex::new(1.0, 2.0), Complex::new(3.0, 4.0), Complex::new(5.0, 6.0)]);
		let mut rdr = IqReader::new(&buf[..], IqFormat::I16, 2).unwrap();
		assert!(rdr.read_epoch().unwrap().is_some());
		assert!(rdr.read_epoch().unwrap().is_none());
	}

	#[test]
	fn one_bit_stream_keeps_signs() {
		let vals = vec![Complex::new(0.3, -2.0), Complex::new(-0.1, 5.0), Complex::new(0.0, -0.2), Complex::new(-7.0, -7.0)];
		let buf = written(IqFormat::OneBit, &vals);
		assert_eq!(buf, vec![0b0110_0111u8]);

		let back:Vec<Vec<Sample>> = IqReader::new(&buf[..], IqFormat::OneBit, 2).unwrap().collect();
		assert_eq!(back.len(), 2);
		assert_eq!(back[0][0].val, Complex::new(1.0, -1.0));
		assert_eq!(back[0][1].val, Complex::new(-1.0, 1.0));
		assert_eq!(back[1][0].val, Complex::new(1.0, -1.0));
		assert_eq!(back[1][1].val, Complex::new(-1.0, -1.0));
		assert_eq!(back[1][1].idx, 1);
	}

	#[test]
	fn two_bit_stream_keeps_sign_and_magnitude() {
		let vals = vec![Complex::new(0.5, -0.5), Complex::new(2.5, -9.0), Complex::new(-1.99, 2.0)];
		let buf = written(IqFormat::TwoBit, &vals);
		// The third sample fills only half a byte, so the flush pads it with zeros
		assert_eq!(buf, vec![0b00_10_01_11u8, 0b10_01_0000u8]);

		let back:Vec<Vec<Sample>> = IqReader::new(&buf[..], IqFormat::TwoBit, 1).unwrap().collect();
		assert_eq!(back.len(), 4);
		assert_eq!(back[0][0].val, Complex::new(1.0, -1.0));
		assert_eq!(back[1][0].val, Complex::new(3.0, -3.0));
		assert_eq!(back[2][0].val, Complex::new(-1.0, 3.0));
		assert_eq!(back[3][0].val, Complex::new(1.0, 1.0));
	}

	struct FailingSource;

	impl Read for FailingSource {
		fn read(&mut self, _buf:&mut [u8]) -> io::Result<usize> {
			Err(io::Error::new(io::ErrorKind::Other, "device unplugged"))
		}
	}

	#[test]
	fn read_errors_reach_the_caller() {
		let mut rdr = IqReader::new(FailingSource, IqFormat::F32, 1).unwrap();
		assert!(matches!(rdr.read_epoch(), Err(Error::Io(_))));

		let mut rdr = IqReader::new(FailingSource, IqFormat::OneBit, 1).unwrap();
		assert!(rdr.next().is_none());
	}

	#[test]
	fn zero_bands_rejected() {
		assert!(IqReader::new(&b""[..], IqFormat::F32, 0).is_err());
	}

}
