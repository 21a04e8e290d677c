//! Command line arguments for the `batchmint` binary.

use std::path::PathBuf;

use argh::FromArgs;

/// Resumable multi-output token minting pipeline.
#[derive(FromArgs)]
pub(crate) struct Args {
    #[argh(option, description = "path to the TOML config file", short = 'c')]
    pub(crate) config: PathBuf,

    #[argh(subcommand)]
    pub(crate) subc: Subcommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub(crate) enum Subcommand {
    Run(SubcRun),
    Retry(SubcRetry),
    Status(SubcStatus),
    Reset(SubcReset),
    Reward(SubcReward),
}

/// Start or resume the minting run.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "run",
    description = "starts or resumes the minting run"
)]
pub(crate) struct SubcRun {
    #[argh(option, description = "path to the proof context JSON file")]
    pub(crate) context: PathBuf,

    #[argh(option, description = "path to the funding analysis JSON file")]
    pub(crate) funding: PathBuf,

    #[argh(option, description = "path to the wallet seed phrase file")]
    pub(crate) mnemonic_file: PathBuf,
}

/// Re-attempt a single failed or stuck output.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "retry",
    description = "re-attempts one output from payload composition"
)]
pub(crate) struct SubcRetry {
    #[argh(option, description = "index of the output to retry", short = 'i')]
    pub(crate) index: u32,

    #[argh(option, description = "path to the proof context JSON file")]
    pub(crate) context: PathBuf,

    #[argh(option, description = "path to the funding analysis JSON file")]
    pub(crate) funding: PathBuf,

    #[argh(option, description = "path to the wallet seed phrase file")]
    pub(crate) mnemonic_file: PathBuf,
}

/// Show per-output progress.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "status",
    description = "prints per-output progress and confirmations"
)]
pub(crate) struct SubcStatus {}

/// Wipe the run state.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "reset",
    description = "wipes run state for a fresh start"
)]
pub(crate) struct SubcReset {
    #[argh(switch, description = "do not ask for confirmation", short = 'f')]
    pub(crate) force: bool,
}

/// Compute the reward for a proof.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "reward",
    description = "prints the mint reward for a proof difficulty"
)]
pub(crate) struct SubcReward {
    #[argh(option, description = "leading zero bits of the proof hash")]
    pub(crate) clz: usize,

    #[argh(
        option,
        description = "block timestamp (unix seconds, default: now)"
    )]
    pub(crate) at: Option<u64>,
}
