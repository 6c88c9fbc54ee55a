
use num_complex::Complex;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::gnss::code::p::WINDOW_CHIPS;
use crate::gnss::code::{CaCodeGenerator, CodeGenerator, PCodeGenerator};
use crate::gnss::replica::CcReplica;

use super::*;

const FS:f64 = 16.368e6;
const CHIP_RATE:f64 = 1.023e6;

fn replica(prn:usize) -> CcReplica<CaCodeGenerator> {
	CcReplica::new(1.0 / FS, CHIP_RATE, 0.0, CaCodeGenerator::new(prn).unwrap()).unwrap()
}

// Noiseless unit-amplitude PRN 1 at the given code offset [chips], Doppler [Hz] and carrier phase [cycles]
fn signal(code_offset:f64, doppler_hz:f64, phase:f64) -> CcReplica<CaCodeGenerator> {
	let mut sig = replica(1);
	sig.move_code_phase(code_offset);
	sig.set_carrier_freq_offset_hz(doppler_hz);
	sig.move_carrier_phase(phase);
	sig
}

fn next_sample(sig:&mut CcReplica<CaCodeGenerator>) -> Complex<f64> {
	sig.tick();
	let c = if sig.code() { -1.0 } else { 1.0 };
	sig.carrier() * c
}

fn tracker(config:TrackerConfig) -> EmlTracker<CaCodeGenerator> {
	EmlTracker::new(replica(1), config).unwrap()
}

fn half_chip_config(dll_alpha:f64, dll_beta:f64) -> TrackerConfig {
	TrackerConfig::new(0.5 / CHIP_RATE, dll_alpha, dll_beta, 0.4, 0.1, 0.5)
}

// Runs until `dumps` intervals have closed, returning the report from each
fn run(trk:&mut EmlTracker<CaCodeGenerator>, sig:&mut CcReplica<CaCodeGenerator>, dumps:usize) -> Vec<TrackReport> {
	let mut reports = vec![];
	while reports.len() < dumps {
		if trk.process(next_sample(sig)) { reports.push(trk.report()); }
	}
	reports
}

#[test]
fn aligned_signal_sits_on_top_of_the_correlation_peak() {
	let mut trk = tracker(half_chip_config(1.0e-5, 1.0e-12));
	assert_eq!(trk.spacing_ticks(), 8);
	assert_eq!(trk.iad_count_max(), 16368);

	let mut sig = signal(0.0, 0.0, 0.0);
	for _ in 0..16367 { assert!(!trk.process(next_sample(&mut sig))); }
	assert!(trk.process(next_sample(&mut sig)));

	assert!(trk.pmag() > 0.99, "pmag {}", trk.pmag());
	assert!((trk.emag() - 0.5).abs() < 0.01, "emag {}", trk.emag());
	assert!((trk.lmag() - 0.5).abs() < 0.01, "lmag {}", trk.lmag());
	assert!(trk.dll_error().abs() < 0.01);
	assert_eq!(trk.dll_mode(), DllMode::OnTop);
	assert_eq!(trk.pll_mode(), PllMode::Locked);
	assert!(trk.nav_bit());
	assert!(!trk.nav_change());

	// The prompt tap lags the generator by half a chip, so the next dump lands 8 ticks early
	assert_eq!(trk.iad_count_max(), 16360);
	run(&mut trk, &mut sig, 1);
	assert_eq!(trk.iad_count_max(), 16368);
}

#[test]
fn loops_converge_on_code_and_doppler_offsets() {
	let mut trk = tracker(half_chip_config(0.1, 0.0));
	trk.replica_mut().set_carrier_freq_offset_hz(45.0);
	let mut sig = signal(0.2, 50.0, 0.1);

	let reports = run(&mut trk, &mut sig, 40);
	assert!(reports.iter().all(|r| r.dll_mode == DllMode::OnTop));

	let last = &reports[39];
	assert_eq!(last.pll_mode, PllMode::Locked);
	assert!(last.dll_error.abs() < 0.01, "dll error {}", last.dll_error);
	assert!(last.pll_error.abs() < 0.01, "pll error {}", last.pll_error);
	assert!((last.carrier_freq_offset_hz - 50.0).abs() < 0.5, "carrier {}", last.carrier_freq_offset_hz);

	// Samples quantize the code estimate to 1/16 chip
	let offset_chips = last.code_phase_offset_sec * CHIP_RATE;
	assert!((offset_chips - 0.2).abs() < 0.07, "code offset {}", offset_chips);
	assert!(reports[20..].iter().all(|r| !r.nav_change));
}

#[test]
fn late_signal_is_pulled_in_from_close() {
	let mut trk = tracker(half_chip_config(0.1, 0.0));
	let mut sig = signal(-0.3, 0.0, 0.0);

	let reports = run(&mut trk, &mut sig, 8);
	assert_eq!(reports[0].dll_mode, DllMode::Close);
	assert!(reports[0].dll_error < 0.0);
	assert_eq!(reports[2].dll_mode, DllMode::OnTop);
	assert!(reports[7].code_phase_offset_sec * CHIP_RATE < -0.2);
}

#[test]
fn far_mode_sweeps_until_the_peak_is_found() {
	let mut trk = tracker(half_chip_config(0.1, 0.0));
	let mut sig = signal(3.0, 0.0, 0.0);

	let reports = run(&mut trk, &mut sig, 16);
	assert_eq!(reports[0].dll_mode, DllMode::Far);
	assert_eq!(reports[0].pll_mode, PllMode::Unlocked);
	assert!((reports[0].code_phase_offset_sec * CHIP_RATE - trk.search_size()).abs() < 1.0e-9);

	let first_on_top = reports.iter().position(|r| r.dll_mode == DllMode::OnTop);
	assert!(matches!(first_on_top, Some(n) if n < 12), "{:?}", first_on_top);
	assert!((reports[15].code_phase_offset_sec * CHIP_RATE - 3.0).abs() < 0.1);
}

#[test]
fn magnitudes_are_normalized_under_noise() {
	let mut rng = StdRng::seed_from_u64(0x5eed);
	let noise = Normal::new(0.0, 0.5).unwrap();

	let mut trk = tracker(half_chip_config(0.1, 0.0));
	let mut sig = signal(0.0, 0.0, 0.0);
	let mut dumps = 0;
	while dumps < 5 {
		let x = next_sample(&mut sig) + Complex::new(noise.sample(&mut rng), noise.sample(&mut rng));
		if trk.process(x) {
			dumps += 1;
			for m in &[trk.emag(), trk.pmag(), trk.lmag()] { assert!(*m >= 0.0 && *m <= 1.0 + 1.0e-9); }
			assert_eq!(trk.dll_mode(), DllMode::OnTop);
		}
	}

	// Pure noise never exceeds the threshold, so the tracker keeps sweeping
	let mut trk = tracker(half_chip_config(0.1, 0.0));
	let noise = Normal::new(0.0, 1.0).unwrap();
	let mut dumps = 0;
	while dumps < 3 {
		if trk.process(Complex::new(noise.sample(&mut rng), noise.sample(&mut rng))) {
			dumps += 1;
			for m in &[trk.emag(), trk.pmag(), trk.lmag()] { assert!(*m >= 0.0 && *m <= 1.0 + 1.0e-9); }
			assert_eq!(trk.dll_mode(), DllMode::Far);
		}
	}
}

#[test]
fn dumps_arrive_once_per_interval() {
	let mut trk = tracker(half_chip_config(0.1, 0.0));
	let mut sig = signal(0.4, 0.0, 0.0);
	for _ in 0..6 {
		let expected = trk.iad_count_max();
		assert!(expected > 0);
		let mut calls = 1;
		while !trk.process(next_sample(&mut sig)) { calls += 1; }
		assert_eq!(calls, expected);
		assert_eq!(trk.iad_count(), 0);
	}
	assert_eq!(trk.dump_count(), 6);
}

#[test]
fn silent_input_reports_zero_correlation() {
	let mut trk = tracker(half_chip_config(0.1, 0.0));
	while !trk.process(Complex::new(0.0, 0.0)) {}
	assert_eq!(trk.pmag(), 0.0);
	assert_eq!(trk.pll_error(), 0.0);
	assert_eq!(trk.dll_mode(), DllMode::Far);
	assert!(trk.iad_count_max() > 0);
}

#[test]
fn costas_discriminator_folds_into_half_cycle() {
	assert_eq!(costas_error(Complex::new(0.0, 0.0)), 0.0);
	assert!((costas_error(Complex::new(1.0, 1.0)) - 0.25).abs() < 1.0e-12);
	// Data bit flips leave the error unchanged
	assert!((costas_error(Complex::new(-1.0, -1.0)) - 0.25).abs() < 1.0e-12);
	assert!((costas_error(Complex::new(1.0, -1.0)) + 0.25).abs() < 1.0e-12);
	assert!((costas_error(Complex::new(0.0, 1.0)) + 0.5).abs() < 1.0e-12);
	assert!((costas_error(Complex::new(0.0, -1.0)) + 0.5).abs() < 1.0e-12);
	for k in 0..100 {
		let e = costas_error(Complex::from_polar(1.0, k as f64 * 0.0628));
		assert!(e >= -0.5 && e < 0.5);
	}
}

#[test]
fn reseed_restarts_the_loops() {
	let mut trk = tracker(half_chip_config(0.1, 0.0));
	let mut sig = signal(0.0, 0.0, 0.0);
	run(&mut trk, &mut sig, 2);
	assert_eq!(trk.dll_mode(), DllMode::OnTop);

	let idx = trk.replica().generator().index();
	trk.reseed(&TrackerSeed{ code_offset_chips: 10.0, code_doppler_hz: 1.5, carrier_doppler_hz: -200.0 });
	assert_eq!(trk.replica().generator().index(), idx + 10);
	assert_eq!(trk.dll_mode(), DllMode::Far);
	assert_eq!(trk.iad_count(), 0);
	assert!((trk.replica().carrier_freq_offset_hz() + 200.0).abs() < 1.0e-9);
	assert!((trk.replica().code_freq_offset_hz() - 1.5).abs() < 1.0e-9);
	assert!(trk.iad_count_max() >= 16368 / 2);
}

#[test]
fn invalid_configs_are_rejected() {
	let ok = half_chip_config(0.1, 0.0);
	assert!(ok.validate().is_ok());

	let mut bad = ok.clone();
	bad.spacing_sec = 0.0;
	assert!(EmlTracker::new(replica(1), bad).is_err());

	let mut bad = ok.clone();
	bad.threshold = -0.5;
	assert!(bad.validate().is_err());

	let mut bad = ok.clone();
	bad.pll_beta = f64::NAN;
	assert!(bad.validate().is_err());

	assert!(ok.with_gain(0.0).validate().is_err());
}

#[test]
fn spacing_must_be_under_half_a_sync_period() {
	let mut config = half_chip_config(0.1, 0.0);
	config.spacing_sec = 0.6e-3;
	assert!(matches!(EmlTracker::new(replica(1), config.clone()), Err(Error::InvalidConfig(_))));

	config.spacing_sec = 1.0e300;
	assert!(EmlTracker::new(replica(1), config.clone()).is_err());

	config.spacing_sec = 0.4e-3;
	assert!(EmlTracker::new(replica(1), config).is_ok());
}

#[test]
fn spacing_is_at_least_one_tick() {
	let trk = tracker(TrackerConfig::new(1.0e-9, 0.1, 0.0, 0.4, 0.1, 0.5));
	assert_eq!(trk.spacing_ticks(), 1);
	assert!((trk.search_size() - 0.0625).abs() < 1.0e-12);
}

#[test]
fn config_loads_from_json_with_default_gain() {
	let json = r#"{"spacing_sec":4.9e-7,"dll_alpha":1e-5,"dll_beta":1e-12,"pll_alpha":0.4,"pll_beta":0.1,"threshold":0.5}"#;
	let config:TrackerConfig = serde_json::from_str(json).unwrap();
	assert_eq!(config.gain, 1.0);
	assert_eq!(config.dll_beta, 1.0e-12);
}

#[test]
fn report_serializes_to_json() {
	let mut trk = tracker(half_chip_config(0.1, 0.0));
	let mut sig = signal(0.0, 0.0, 0.0);
	let report = run(&mut trk, &mut sig, 1).remove(0);
	let v:serde_json::Value = serde_json::to_value(&report).unwrap();
	assert_eq!(v["prn"], 1);
	assert_eq!(v["dll_mode"], "OnTop");
	assert_eq!(v["code"], "CA");
	assert_eq!(v["dump"], 1);
}

#[test]
fn diagnostic_dump_mentions_loop_state() {
	let trk = tracker(half_chip_config(0.1, 0.0));
	let text = format!("{}", trk);
	assert!(text.contains("C/A PRN 1"));
	assert!(text.contains("spacing: 8 ticks"));
	assert!(text.contains("Far"));
}

const P_FS:f64 = 20.0e6;
const P_CHIP_RATE:f64 = 10.23e6;

fn p_replica(prn:usize, start:i64) -> CcReplica<PCodeGenerator> {
	let mut code_gen = PCodeGenerator::new(prn).unwrap();
	code_gen.set_index(start);
	CcReplica::new(1.0 / P_FS, P_CHIP_RATE, 0.0, code_gen).unwrap()
}

fn p_tracker(prn:usize, start:i64) -> EmlTracker<PCodeGenerator> {
	EmlTracker::new(p_replica(prn, start), TrackerConfig::new(0.5 / P_CHIP_RATE, 0.1, 0.0, 0.4, 0.1, 0.5)).unwrap()
}

fn next_p_sample(sig:&mut CcReplica<PCodeGenerator>) -> Complex<f64> {
	sig.tick();
	let c = if sig.code() { -1.0 } else { 1.0 };
	sig.carrier() * c
}

fn run_p(trk:&mut EmlTracker<PCodeGenerator>, sig:&mut CcReplica<PCodeGenerator>, dumps:usize) -> Vec<TrackReport> {
	let mut reports = vec![];
	while reports.len() < dumps {
		if trk.process(next_p_sample(sig)) { reports.push(trk.report()); }
	}
	reports
}

#[test]
fn p_code_converges_on_code_and_doppler_offsets() {
	let mut trk = p_tracker(3, 0);
	// Half a P chip is just under one 20 MHz tick
	assert_eq!(trk.spacing_ticks(), 1);
	assert_eq!(trk.iad_count_max(), 20000);
	trk.replica_mut().set_carrier_freq_offset_hz(25.0);

	let mut sig = p_replica(3, 0);
	sig.move_code_phase(0.2);
	sig.set_carrier_freq_offset_hz(30.0);

	let reports = run_p(&mut trk, &mut sig, 40);
	assert!(reports.iter().all(|r| r.dll_mode == DllMode::OnTop));
	assert!(reports.iter().all(|r| r.code == CodeKind::P && r.prn == 3));

	let last = &reports[39];
	assert_eq!(last.pll_mode, PllMode::Locked);
	assert!(last.dll_error.abs() < 0.01, "dll error {}", last.dll_error);
	assert!((last.carrier_freq_offset_hz - 30.0).abs() < 0.5, "carrier {}", last.carrier_freq_offset_hz);
	let offset_chips = last.code_phase_offset_sec * P_CHIP_RATE;
	assert!((offset_chips - 0.2).abs() < 0.05, "code offset {}", offset_chips);
	assert_eq!(trk.iad_count_max(), 20000);
}

#[test]
fn p_code_stays_on_top_across_a_window_boundary() {
	let start = WINDOW_CHIPS - 3 * 10_230;
	let mut trk = p_tracker(11, start);
	let mut sig = p_replica(11, start);
	assert_eq!(trk.replica().generator().regenerations(), 0);

	let reports = run_p(&mut trk, &mut sig, 6);
	assert!(reports.iter().all(|r| r.dll_mode == DllMode::OnTop), "{:?}", reports.iter().map(|r| r.dll_mode).collect::<Vec<_>>());
	assert!(reports[5].pmag > 0.99);
	assert_eq!(reports[5].pll_mode, PllMode::Locked);

	let code_gen = trk.replica().generator();
	assert_eq!(code_gen.regenerations(), 1);
	assert_eq!(code_gen.window_start(), WINDOW_CHIPS);
	assert!(reports[5].chip_index > WINDOW_CHIPS);
}
