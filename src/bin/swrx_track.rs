
extern crate clap;
extern crate colored;
extern crate swrx;

use std::fs::File;
use std::io::Read;
use std::str::FromStr;

use clap::{Arg, App};
use colored::*;
use tracing::{info, warn};

use swrx::block::Block;
use swrx::gnss::code::{self, BoxedCodeGenerator, CodeKind};
use swrx::gnss::constants;
use swrx::gnss::replica::CcReplica;
use swrx::gnss::tracking::{DllMode, EmlTracker, TrackReport, TrackerConfig, TrackerSeed};
use swrx::io::{IqFormat, IqReader};
use swrx::utils::db_to_linear;
use swrx::{Error, Result, Sample};

const DEFAULT_DLL_ALPHA:f64 = 1.0e-5;
const DEFAULT_DLL_BETA:f64  = 1.0e-12;
const DEFAULT_PLL_ALPHA:f64 = 0.4;
const DEFAULT_PLL_BETA:f64  = 0.1;
const DEFAULT_THRESHOLD:f64 = 0.5;

/// One receiver channel, parsed from `code:band:prn:offset:doppler` (offset in us, Doppler in Hz)
#[derive(Debug, Clone, PartialEq)]
struct ChannelSpec {
	code: CodeKind,
	band: u8,
	prn: usize,
	offset_sec: f64,
	doppler_hz: f64,
}

impl FromStr for ChannelSpec {
	type Err = Error;

	fn from_str(s:&str) -> Result<Self> {
		let words:Vec<&str> = s.split(':').collect();
		if words.len() != 5 { return Err(Error::InvalidConfig(format!("expected code:band:prn:offset:doppler, got '{}'", s))); }

		let bad = |what:&str, v:&str| Error::InvalidConfig(format!("bad {} '{}'", what, v));
		let code:CodeKind  = words[0].parse()?;
		let band:u8        = words[1].parse().map_err(|_| bad("band", words[1]))?;
		let prn:usize      = words[2].parse().map_err(|_| bad("PRN", words[2]))?;
		let offset_us:f64  = words[3].parse().map_err(|_| bad("offset", words[3]))?;
		let doppler_hz:f64 = words[4].parse().map_err(|_| bad("Doppler", words[4]))?;
		if constants::band_freq_hz(band).is_none() { return Err(bad("band", words[1])); }

		Ok(Self { code, band, prn, offset_sec: offset_us * 1.0e-6, doppler_hz })
	}
}

impl ChannelSpec {

	fn seed(&self) -> TrackerSeed {
		let chip_freq = self.code.chip_freq_hz();
		let band_freq = constants::band_freq_hz(self.band).unwrap_or(constants::L1_FREQ_HZ);
		TrackerSeed {
			code_offset_chips: self.offset_sec * chip_freq,
			code_doppler_hz: self.doppler_hz * chip_freq / band_freq,
			carrier_doppler_hz: self.doppler_hz,
		}
	}

}

struct Channel {
	spec: ChannelSpec,
	block: Block<TrackerSeed, Sample, TrackReport>,
	last_mode: DllMode,
}

fn init_logging(verbosity:u64) {
	let log_level = match verbosity {
		0 => tracing::Level::WARN,
		1 => tracing::Level::INFO,
		2 => tracing::Level::DEBUG,
		_ => tracing::Level::TRACE,
	};

	tracing_subscriber::fmt()
		.with_max_level(log_level)
		.with_target(false)
		.with_writer(std::io::stderr)
		.init();
}

fn print_report(spec:&ChannelSpec, last_mode:&mut DllMode, report:&TrackReport) -> Result<()> {
	println!("{}", serde_json::to_string(report)?);

	if report.dll_mode != *last_mode {
		let summary = format!("{} PRN {:2} L{} dump {:6}: {:?} {:?} p={:.3} dll={:+.4} pll={:+.4} {:9.2} [Hz]",
			report.code, report.prn, spec.band, report.dump, report.dll_mode, report.pll_mode,
			report.pmag, report.dll_error, report.pll_error, report.carrier_freq_offset_hz);
		match report.dll_mode {
			DllMode::OnTop => eprintln!("{}", summary.green()),
			DllMode::Close => eprintln!("{}", summary.yellow()),
			DllMode::Far   => eprintln!("{}", summary.red()),
		}
		*last_mode = report.dll_mode;
	}
	Ok(())
}

fn app<'a, 'b>() -> App<'a, 'b> {
	App::new("GPS Software Receiver Tracking")
		.version("0.1.0")
		.author("John Stanford (johnwstanford@gmail.com)")
		.about("Tracks GPS C/A and P code signals in an IQ stream and writes one JSON record per channel per dump")
		.arg(Arg::with_name("code")
			.short("c").long("code")
			.help("Channel to track as code:band:prn:offset:doppler; code is c or p, band is 1 or 2, offset in us, Doppler in Hz")
			.takes_value(true).multiple(true).number_of_values(1).required(true))
		.arg(Arg::with_name("sample_rate")
			.short("r").long("sample-rate")
			.help("Sample rate [MHz], default 20")
			.takes_value(true))
		.arg(Arg::with_name("inter_freq")
			.short("x").long("inter-freq")
			.help("Intermediate frequency of the receiver [MHz], default 0.42")
			.takes_value(true))
		.arg(Arg::with_name("quantization")
			.short("q").long("quantization")
			.help("IQ sample format: 1 (1-bit), 2 (2-bit), f (f32), s (i16) or b (i8), default f")
			.takes_value(true))
		.arg(Arg::with_name("bands")
			.short("b").long("bands")
			.help("Complex samples per epoch in the input, default 2")
			.takes_value(true))
		.arg(Arg::with_name("gain")
			.short("g").long("gain")
			.help("Receiver gain [dB]")
			.takes_value(true).allow_hyphen_values(true))
		.arg(Arg::with_name("time_limit")
			.short("t").long("time-limit")
			.help("Stop after this much input [ms]")
			.takes_value(true))
		.arg(Arg::with_name("input")
			.short("i").long("input")
			.help("Input file, default stdin")
			.takes_value(true))
		.arg(Arg::with_name("config")
			.long("config")
			.help("JSON file with tracker loop parameters")
			.takes_value(true))
		.arg(Arg::with_name("dll_alpha").long("dll-alpha").takes_value(true).allow_hyphen_values(true))
		.arg(Arg::with_name("dll_beta").long("dll-beta").takes_value(true).allow_hyphen_values(true))
		.arg(Arg::with_name("pll_alpha").long("pll-alpha").takes_value(true).allow_hyphen_values(true))
		.arg(Arg::with_name("pll_beta").long("pll-beta").takes_value(true).allow_hyphen_values(true))
		.arg(Arg::with_name("threshold").long("threshold").takes_value(true))
		.arg(Arg::with_name("verbose")
			.short("v").long("verbose")
			.help("Increase log verbosity")
			.multiple(true))
}

#[tokio::main]
async fn main() -> Result<()> {

	let matches = app().get_matches();

	init_logging(matches.occurrences_of("verbose"));

	let parse_f64 = |name:&str| -> Result<Option<f64>> {
		match matches.value_of(name) {
			Some(s) => s.parse::<f64>().map(Some).map_err(|_| Error::InvalidConfig(format!("bad value for {}: '{}'", name, s))),
			None => Ok(None),
		}
	};

	let fs:f64         = parse_f64("sample_rate")?.unwrap_or(20.0) * 1.0e6;
	let inter_freq:f64 = parse_f64("inter_freq")?.unwrap_or(0.42) * 1.0e6;
	let gain:f64       = parse_f64("gain")?.map(db_to_linear).unwrap_or(1.0);
	let format:IqFormat = matches.value_of("quantization").unwrap_or("f").parse()?;
	let bands:usize    = match matches.value_of("bands") {
		Some(s) => s.parse().map_err(|_| Error::InvalidConfig(format!("bad band count '{}'", s)))?,
		None => 2,
	};
	let max_epochs:Option<usize> = parse_f64("time_limit")?.map(|ms| (ms * 1.0e-3 * fs).round() as usize);
	let tick = 1.0 / fs;

	let file_config:Option<TrackerConfig> = match matches.value_of("config") {
		Some(path) => Some(serde_json::from_reader(File::open(path)?)?),
		None => None,
	};

	let specs = matches.values_of("code").map(|v| v.collect::<Vec<&str>>()).unwrap_or_default()
		.into_iter().map(|s| s.parse::<ChannelSpec>()).collect::<Result<Vec<ChannelSpec>>>()?;

	let mut channels:Vec<Channel> = vec![];
	for spec in specs {
		if spec.band as usize > bands {
			return Err(Error::InvalidConfig(format!("channel on band {} but the input has {} band(s)", spec.band, bands)));
		}

		let chip_freq = spec.code.chip_freq_hz();
		let mut config = match &file_config {
			Some(c) => c.clone(),
			None => TrackerConfig::new((0.5 / chip_freq).max(tick), DEFAULT_DLL_ALPHA, DEFAULT_DLL_BETA,
				DEFAULT_PLL_ALPHA, DEFAULT_PLL_BETA, DEFAULT_THRESHOLD),
		};
		if let Some(v) = parse_f64("dll_alpha")? { config.dll_alpha = v; }
		if let Some(v) = parse_f64("dll_beta")?  { config.dll_beta  = v; }
		if let Some(v) = parse_f64("pll_alpha")? { config.pll_alpha = v; }
		if let Some(v) = parse_f64("pll_beta")?  { config.pll_beta  = v; }
		if let Some(v) = parse_f64("threshold")? { config.threshold = v; }
		config.gain *= gain;

		let code_gen:BoxedCodeGenerator = code::new_code_generator(spec.code, spec.prn)?;
		let replica = CcReplica::new(tick, chip_freq, inter_freq, code_gen)?;
		let mut trk = EmlTracker::new(replica, config)?;
		trk.reseed(&spec.seed());

		info!("{}", trk);
		eprintln!("{}", format!("Tracking {} PRN {} on L{} from {:.3} us, {:.1} [Hz]",
			spec.code, spec.prn, spec.band, spec.offset_sec * 1.0e6, spec.doppler_hz).blue());

		channels.push(Channel{ spec, block: Block::from(trk), last_mode: DllMode::Far });
	}

	let src:Box<dyn Read> = match matches.value_of("input") {
		Some(path) => Box::new(File::open(path)?),
		None => Box::new(std::io::stdin()),
	};
	let mut rdr = IqReader::new(src, format, bands)?;

	let mut epochs:usize = 0;
	while let Some(epoch) = rdr.read_epoch()? {
		if let Some(max) = max_epochs {
			if epochs >= max { break; }
		}
		epochs += 1;

		for ch in channels.iter_mut() {
			ch.block.send(epoch[ch.spec.band as usize - 1]).await?;
			while let Ok(report) = ch.block.rx_output.try_recv() {
				print_report(&ch.spec, &mut ch.last_mode, &report)?;
			}
		}
	}

	info!("processed {} epochs ({:.3} ms)", epochs, epochs as f64 * tick * 1.0e3);

	for ch in channels {
		let Channel{ spec, block, mut last_mode } = ch;
		for report in block.shutdown().await? {
			print_report(&spec, &mut last_mode, &report)?;
		}
	}

	if epochs == 0 { warn!("no input samples were read"); }

	Ok(())
}
