
/// Ranging code generators: LFSR tables, GPS C/A and P codes
pub mod code;

pub mod constants;

/// Code and carrier NCO
pub mod replica;

/// Baseband GPS signal simulation
pub mod sim;

/// Early-minus-late code tracking with a Costas carrier loop
pub mod tracking;
