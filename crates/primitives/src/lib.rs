//! Shared domain types for the minting pipeline.

mod funding;
mod proof;
mod reward;
mod utxo;

pub use funding::{FundingAnalysis, FundingStrategy};
pub use proof::ProofContext;
pub use reward::mined_amount;
pub use utxo::{parse_outpoint_ref, ParseOutPointError, Utxo};
