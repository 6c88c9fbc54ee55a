
extern crate clap;
extern crate colored;
extern crate swrx;

use std::fs::File;
use std::io::Write;

use clap::{Arg, App};
use colored::*;
use tracing::info;

use swrx::gnss::sim::{SignalSimulator, SimConfig, SvSpec};
use swrx::io::{IqFormat, IqWriter};
use swrx::{Error, Result};

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

fn app<'a, 'b>() -> App<'a, 'b> {
	App::new("GPS Signal Simulator")
		.version("0.1.0")
		.author("John Stanford (johnwstanford@gmail.com)")
		.about("Writes a simulated L1/L2 GPS IQ stream, one sample per band per epoch")
		.arg(Arg::with_name("code")
			.short("c").long("code")
			.help("Signal to generate as code:band:prn:offset:doppler:nav; code is c, p or cp, band is 1 or 2, offset in us, Doppler in Hz, nav is 0, c, p or cp")
			.takes_value(true).multiple(true).number_of_values(1))
		.arg(Arg::with_name("code_only")
			.long("code-only")
			.help("Only generate the codes; no carrier"))
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
		.arg(Arg::with_name("gain")
			.short("g").long("gain")
			.help("Gain applied before digitization [dB], default 0")
			.takes_value(true).allow_hyphen_values(true))
		.arg(Arg::with_name("noise")
			.short("n").long("noise")
			.help("Receiver noise level [dB], default 0")
			.takes_value(true).allow_hyphen_values(true))
		.arg(Arg::with_name("freq_err")
			.short("f").long("freq-err")
			.help("Receiver oscillator error [ppm], default 0")
			.takes_value(true).allow_hyphen_values(true))
		.arg(Arg::with_name("run_time")
			.short("t").long("run-time")
			.help("Length of the simulation [ms], default 20")
			.takes_value(true))
		.arg(Arg::with_name("output")
			.short("o").long("output")
			.help("Output file, default stdout")
			.takes_value(true))
		.arg(Arg::with_name("seed")
			.long("seed")
			.help("Noise generator seed")
			.takes_value(true))
		.arg(Arg::with_name("verbose")
			.short("v").long("verbose")
			.help("Increase log verbosity")
			.multiple(true))
}

fn main() -> Result<()> {

	let matches = app().get_matches();

	init_logging(matches.occurrences_of("verbose"));

	let parse_f64 = |name:&str| -> Result<Option<f64>> {
		match matches.value_of(name) {
			Some(s) => s.parse::<f64>().map(Some).map_err(|_| Error::InvalidConfig(format!("bad value for {}: '{}'", name, s))),
			None => Ok(None),
		}
	};

	let mut config = SimConfig::default();
	if let Some(mhz) = parse_f64("sample_rate")? { config.sample_rate_hz = mhz * 1.0e6; }
	if let Some(mhz) = parse_f64("inter_freq")?  { config.inter_freq_hz  = mhz * 1.0e6; }
	if let Some(db)  = parse_f64("gain")?        { config = config.with_gain_db(db); }
	if let Some(db)  = parse_f64("noise")?       { config = config.with_noise_db(db); }
	if let Some(ppm) = parse_f64("freq_err")?    { config.freq_err = ppm * 1.0e-6; }
	if let Some(s) = matches.value_of("seed") {
		config.seed = s.parse().map_err(|_| Error::InvalidConfig(format!("bad seed '{}'", s)))?;
	}
	config.code_only = matches.is_present("code_only");

	let format:IqFormat = matches.value_of("quantization").unwrap_or("f").parse()?;
	let run_time_ms = parse_f64("run_time")?.unwrap_or(20.0);
	let epochs = (run_time_ms * 1.0e-3 * config.sample_rate_hz).round() as usize;

	let specs = matches.values_of("code").map(|v| v.collect::<Vec<&str>>()).unwrap_or_default()
		.into_iter().map(|s| s.parse::<SvSpec>()).collect::<Result<Vec<SvSpec>>>()?;

	for spec in specs.iter() {
		let codes = match (spec.ca, spec.p) { (true, true) => "C/A+P", (true, false) => "C/A", _ => "P" };
		eprintln!("{}", format!("Simulating {} PRN {} on L{}, offset {:.3} us, {:.1} [Hz]",
			codes, spec.prn, spec.band, spec.offset_sec * 1.0e6, spec.doppler_hz).blue());
	}
	info!(?config, epochs, "starting simulation");

	let dst:Box<dyn Write> = match matches.value_of("output") {
		Some(path) => Box::new(File::create(path)?),
		None => Box::new(std::io::stdout()),
	};
	let mut wtr = IqWriter::new(dst, format);

	let sim = SignalSimulator::new(config, &specs)?;
	for epoch in sim.take(epochs) {
		wtr.write_epoch(&epoch)?;
	}
	wtr.flush()?;

	eprintln!("{}", format!("Wrote {} epochs ({} ms)", epochs, run_time_ms).green());

	Ok(())
}
