use std::collections::BTreeMap;

use batchmint_primitives::{ProofContext, Utxo};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Spell format version the proving service expects.
pub const SPELL_VERSION: u32 = 6;

/// Key under which the token app appears in `apps`/`private_inputs`/`charms`.
pub const APP_KEY: &str = "$01";

/// Identity of the token app: tag, mint txid and verification key hash.
pub const APP_ID: &str =
    "t/7cf8ee7186e40f7bd91032d14967bca152df097f720dd6d84957a42ed65786ee/6c730a8c2525445acd8efecb8dae6549dc64ce78ef3c50631ee0dad9ab8f7618";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("mining UTXO is required")]
    MissingMiningUtxo,

    #[error("funding UTXO is required")]
    MissingFundingUtxo,

    #[error("mining transaction hex is required")]
    MissingMiningTx,

    #[error("change address is required")]
    MissingChangeAddress,

    #[error("spell has no inputs")]
    EmptyInputs,

    #[error("spell has no outputs")]
    EmptyOutputs,
}

/// Full request body POSTed to the proving service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProverRequest {
    pub spell: Spell,

    /// Raw transactions referenced by the spell inputs.
    pub prev_txs: Vec<String>,

    /// `"txid:vout"` reference of the coin paying prover fees.
    pub funding_utxo: String,

    pub funding_utxo_value: u64,

    pub change_address: String,

    pub fee_rate: u64,

    pub chain: String,
}

/// The spell proper: which coin is consumed, what token amount comes out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spell {
    pub version: u32,

    /// App key to app identity.
    pub apps: BTreeMap<String, String>,

    /// App key to proof witness data.
    pub private_inputs: BTreeMap<String, PrivateInput>,

    pub ins: Vec<SpellInput>,

    pub outs: Vec<SpellOutput>,
}

/// Witness material for one app: the mining tx and its inclusion proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateInput {
    pub tx: String,

    pub tx_block_proof: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellInput {
    /// `"txid:vout"` reference of the consumed coin.
    pub utxo_id: String,

    pub charms: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellOutput {
    pub address: String,

    /// App key to minted token amount.
    pub charms: BTreeMap<String, u64>,
}

/// Builds the prover request for one output.
///
/// The mining UTXO is the coin the spell consumes; the funding UTXO pays the
/// transaction fees; the reward amount comes from the shared [`ProofContext`].
/// Each missing required field maps to its own error so the stored failure
/// message names exactly what was absent.
pub fn compose_request(
    mining_utxo: Option<&Utxo>,
    funding_utxo: Option<&Utxo>,
    ctx: &ProofContext,
    change_address: &str,
    block_proof: &str,
    fee_rate: u64,
) -> Result<ProverRequest, ComposeError> {
    let mining_utxo = mining_utxo.ok_or(ComposeError::MissingMiningUtxo)?;
    let funding_utxo = funding_utxo.ok_or(ComposeError::MissingFundingUtxo)?;
    if ctx.mining_tx_hex.is_empty() {
        return Err(ComposeError::MissingMiningTx);
    }
    if change_address.is_empty() {
        return Err(ComposeError::MissingChangeAddress);
    }

    let spell = Spell {
        version: SPELL_VERSION,
        apps: BTreeMap::from([(APP_KEY.to_owned(), APP_ID.to_owned())]),
        private_inputs: BTreeMap::from([(
            APP_KEY.to_owned(),
            PrivateInput {
                tx: ctx.mining_tx_hex.clone(),
                tx_block_proof: block_proof.to_owned(),
            },
        )]),
        ins: vec![SpellInput {
            utxo_id: mining_utxo.outpoint_ref(),
            charms: BTreeMap::new(),
        }],
        outs: vec![SpellOutput {
            address: change_address.to_owned(),
            charms: BTreeMap::from([(APP_KEY.to_owned(), ctx.reward)]),
        }],
    };

    Ok(ProverRequest {
        spell,
        prev_txs: vec![ctx.mining_tx_hex.clone()],
        funding_utxo: funding_utxo.outpoint_ref(),
        funding_utxo_value: funding_utxo.value,
        change_address: change_address.to_owned(),
        fee_rate,
        chain: "bitcoin".to_owned(),
    })
}

/// Structural completeness check before a request leaves the composer.
pub fn validate_request(request: &ProverRequest) -> Result<(), ComposeError> {
    if request.spell.ins.is_empty() {
        return Err(ComposeError::EmptyInputs);
    }
    if request.spell.outs.is_empty() {
        return Err(ComposeError::EmptyOutputs);
    }
    if request.funding_utxo.is_empty() {
        return Err(ComposeError::MissingFundingUtxo);
    }
    if request.change_address.is_empty() {
        return Err(ComposeError::MissingChangeAddress);
    }
    Ok(())
}
