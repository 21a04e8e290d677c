//! Reward schedule for a proof-of-work mint.

/// Base token denomination (smallest units per whole token).
const DENOMINATION: u64 = 100_000_000;

/// Reward halves every two weeks after launch.
const HALVING_PERIOD_DAYS: u64 = 14;
const SECONDS_PER_PERIOD: u64 = HALVING_PERIOD_DAYS * 24 * 3600;

// Tue Sep  2 04:20:00 UTC 2025.
const START_TIME: u64 = 1756786800;

/// Token units minted for a proof whose hash has `clz` leading zero bits,
/// found in a block at `block_time`.
///
/// The reward scales quadratically with the difficulty of the found hash and
/// halves every period since launch. Times before launch are clamped to the
/// launch time so pre-start proofs earn the full period-zero reward.
pub fn mined_amount(block_time: u64, clz: usize) -> u64 {
    let block_time = block_time.max(START_TIME);
    let clz = clz as u64;
    let clz_pow_2 = clz.pow(2);
    let halving_factor = 2u64.pow(((block_time - START_TIME) / SECONDS_PER_PERIOD) as u32);
    DENOMINATION * clz_pow_2 / halving_factor
}
