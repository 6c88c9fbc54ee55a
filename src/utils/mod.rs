
pub mod bit_table;

pub use self::bit_table::BitTable;

/// Reduces a signed index onto [0, len)
pub fn wrap_index(idx:i64, len:i64) -> i64 { idx.rem_euclid(len) }

/// Converts a gain in dB (power) to a linear amplitude scale, matching the receiver's `-g` option
pub fn db_to_linear(db:f64) -> f64 { 10.0_f64.powf(db / 10.0) }

#[test]
fn wrap_index_handles_negative_values() {
	assert_eq!(wrap_index(-1, 1023), 1022);
	assert_eq!(wrap_index(1023, 1023), 0);
	assert_eq!(wrap_index(2050, 1023), 4);
}

#[test]
fn db_to_linear_matches_power_ratio() {
	assert!((db_to_linear(0.0) - 1.0).abs() < 1e-12);
	assert!((db_to_linear(10.0) - 10.0).abs() < 1e-12);
	assert!((db_to_linear(-3.0) - 0.501187).abs() < 1e-6);
}
