
pub const SPEED_OF_LIGHT_M_PER_SEC:f64 = 299_792_458.0;

pub const L1_FREQ_HZ:f64 = 1_575.42e6;
pub const L2_FREQ_HZ:f64 = 1_227.60e6;

pub const CA_CHIP_FREQ_HZ:f64 = 1.023e6;
pub const P_CHIP_FREQ_HZ:f64  = 10.23e6;

pub const CA_CODE_LEN:usize = 1023;
pub const CA_CODE_PERIOD_SEC:f64 = 1.0e-3;
pub const NAV_BIT_PERIOD_SEC:f64 = 20.0e-3;

// P-code structure, IS-GPS-200 section 3.3.2.2
pub const X1A_CYCLE_CHIPS:usize = 4092;
pub const X1B_CYCLE_CHIPS:usize = 4093;
pub const X2A_CYCLE_CHIPS:usize = 4092;
pub const X2B_CYCLE_CHIPS:usize = 4093;

pub const X1_EPOCH_CHIPS:i64 = 15_345_000;
pub const X2_EPOCH_CHIPS:i64 = 15_345_037;
pub const X1_EPOCHS_PER_WEEK:i64 = 403_200;
pub const P_CHIPS_PER_WEEK:i64 = X1_EPOCH_CHIPS * X1_EPOCHS_PER_WEEK;

pub const Z_COUNT_SEC:f64 = 1.5;

/// P-code chips in one millisecond; P-code dumps line up with C/A code epochs
pub const P_SYNC_CHIPS:i64 = 10_230;

/// Carrier frequency for a GPS band number (1 = L1, 2 = L2)
pub fn band_freq_hz(band:u8) -> Option<f64> {
	match band {
		1 => Some(L1_FREQ_HZ),
		2 => Some(L2_FREQ_HZ),
		_ => None,
	}
}
