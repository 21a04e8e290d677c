//! Resumable multi-output token minting pipeline.

mod args;

use std::{fs, io::Write, path::Path, sync::Arc};

use anyhow::{bail, Context};
use args::{Args, Subcommand};
use batchmint_btcio::{BitcoindClient, L1Client};
use batchmint_config::Config;
use batchmint_db::{open_run_database, OutputStatus, SledRunDatabase};
use batchmint_key_derivation::KeyRing;
use batchmint_pipeline::{OutputProcessor, PipelineController};
use batchmint_primitives::{mined_amount, FundingAnalysis, ProofContext};
use batchmint_prover::HttpProver;
use batchmint_storage::ProgressStore;
use tracing::info;
use zeroize::Zeroizing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args: Args = argh::from_env();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    match args.subc {
        Subcommand::Run(subc) => {
            let (ctl, ctx, analysis) =
                build_pipeline(&config, &subc.context, &subc.funding, &subc.mnemonic_file)?;
            let summary = ctl.run(&ctx, &analysis).await?;
            info!(
                completed = summary.completed,
                failed = summary.failed,
                skipped = summary.skipped,
                "run finished"
            );
        }
        Subcommand::Retry(subc) => {
            let (ctl, ctx, analysis) =
                build_pipeline(&config, &subc.context, &subc.funding, &subc.mnemonic_file)?;
            ctl.retry_output(subc.index, &ctx, &analysis).await?;
        }
        Subcommand::Status(_) => {
            print_status(&config).await?;
        }
        Subcommand::Reset(subc) => {
            if !subc.force && !confirm("wipe all run state?")? {
                bail!("aborted");
            }
            let store = open_store(&config)?;
            store.reset()?;
            println!("run state wiped");
        }
        Subcommand::Reward(subc) => {
            let at = subc.at.unwrap_or_else(|| batchmint_db::now_millis() / 1_000);
            println!("{}", mined_amount(at, subc.clz));
        }
    }
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().compact().with_filter(filter))
        .init();
}

fn open_store(config: &Config) -> anyhow::Result<Arc<ProgressStore<SledRunDatabase>>> {
    let db = open_run_database(&config.datadir).context("opening run database")?;
    Ok(Arc::new(ProgressStore::new(db)))
}

fn node_client(config: &Config) -> BitcoindClient {
    BitcoindClient::new(
        config.bitcoind.rpc_url.clone(),
        config.bitcoind.rpc_user.clone(),
        config.bitcoind.rpc_password.clone(),
    )
}

type Pipeline = (
    PipelineController<SledRunDatabase>,
    ProofContext,
    FundingAnalysis,
);

fn build_pipeline(
    config: &Config,
    context_path: &Path,
    funding_path: &Path,
    mnemonic_path: &Path,
) -> anyhow::Result<Pipeline> {
    let ctx: ProofContext = read_json(context_path).context("loading proof context")?;
    let analysis: FundingAnalysis = read_json(funding_path).context("loading funding analysis")?;

    let phrase = Zeroizing::new(
        fs::read_to_string(mnemonic_path)
            .with_context(|| format!("reading {}", mnemonic_path.display()))?,
    );
    let ring = KeyRing::from_mnemonic(phrase.trim(), config.network)?;
    let change_address = ring.derive(0)?.address().to_string();

    let store = open_store(config)?;
    let prover = Arc::new(HttpProver::new(config.prover.url.clone()));
    let node = Arc::new(node_client(config));

    let processor = OutputProcessor::new(
        store.clone(),
        prover,
        node,
        ring,
        change_address,
        config.pipeline.fee_rate,
    );
    let ctl = PipelineController::new(processor, store, &config.pipeline);
    Ok((ctl, ctx, analysis))
}

async fn print_status(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let Some(run) = store.load()? else {
        println!("no run initialized");
        return Ok(());
    };
    let node = node_client(config);

    println!(
        "run: {}/{} outputs completed",
        run.completed_count(),
        run.total_outputs
    );
    for record in &run.outputs {
        let status = format!("{:?}", record.status).to_lowercase();
        let mut line = format!("  output {:>3}  {status:<10}", record.index);
        if let Some(sub_step) = record.current_sub_step {
            line.push_str(&format!(" at {sub_step:?}"));
        }
        if let Some(spell_txid) = record.spell_txid {
            line.push_str(&format!("  spell {spell_txid}"));
            if record.status == OutputStatus::Completed {
                match node.get_raw_transaction_info(&spell_txid).await {
                    Ok(tx_info) => {
                        line.push_str(&format!("  ({} confirmations)", tx_info.confirmations))
                    }
                    Err(_) => line.push_str("  (confirmations unknown)"),
                }
            }
        }
        if let Some(error) = &record.error {
            line.push_str(&format!("  error: {error}"));
        }
        println!("{line}");
    }
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_str(&raw)?)
}
