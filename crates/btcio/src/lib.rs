//! Bitcoind access for the minting pipeline.
//!
//! A thin JSON-RPC client behind the [`L1Client`] trait, plus the atomic
//! commit/spell package broadcaster built on `submitpackage`.

mod broadcast;
mod client;

pub use broadcast::{broadcast_package, PackageTxids};
pub use client::{
    BitcoindClient, L1Client, L1ClientError, PackageTxResult, RawTxInfo, SubmitPackageResponse,
};
