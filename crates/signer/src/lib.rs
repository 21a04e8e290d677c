//! Taproot key-path signing for the commit/spell transaction pair.
//!
//! The spell transaction mixes two input classes: the commit input, whose
//! witness the prover built and which must survive byte-for-byte, and mining
//! inputs owned by this wallet, which are matched to a derivation index and
//! re-signed. Both transactions use BIP-341 key-path spends with the default
//! sighash and a single-element witness.

use batchmint_key_derivation::{KeyError, KeyRing};
use bitcoin::{
    consensus,
    hashes::Hash,
    key::Keypair,
    secp256k1::Message,
    sighash::{Prevouts, SighashCache},
    transaction::Version,
    TapSighashType, Transaction, TxOut, Txid, Witness,
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("transaction hex decode failed: {0}")]
    Decode(#[from] consensus::encode::FromHexError),

    #[error("vout {vout} not found in {txid} ({len} outputs)")]
    MissingPrevout { txid: Txid, vout: u32, len: usize },

    #[error("could not prepare mining input {index}: {source}")]
    PrepareInput { index: usize, source: KeyError },

    #[error("unknown input UTXO at index {0}")]
    UnknownInputUtxo(usize),

    #[error("sighash computation failed: {0}")]
    Sighash(#[from] bitcoin::sighash::TaprootError),
}

/// A fully-signed transaction with its derived artifacts.
#[derive(Debug, Clone)]
pub struct SignedTx {
    pub tx: Transaction,
    pub txid: Txid,
    pub hex: String,
}

impl SignedTx {
    fn from_tx(tx: Transaction) -> Self {
        let txid = tx.compute_txid();
        let hex = consensus::encode::serialize_hex(&tx);
        Self { tx, txid, hex }
    }
}

fn prevout_of(tx: &Transaction, vout: u32) -> Result<&TxOut, SignError> {
    tx.output
        .get(vout as usize)
        .ok_or_else(|| SignError::MissingPrevout {
            txid: tx.compute_txid(),
            vout,
            len: tx.output.len(),
        })
}

/// Signs the commit transaction's single wallet-owned input.
///
/// The prover builds the commit transaction to spend the funding coin, so
/// `funding_tx_hex` supplies the prevout. The owning key is located by the
/// bounded script probe, tweaked per BIP-341, and used for a key-path
/// Schnorr signature.
pub fn sign_commit_tx(
    ring: &KeyRing,
    unsigned_commit_hex: &str,
    funding_tx_hex: &str,
) -> Result<SignedTx, SignError> {
    let mut commit_tx: Transaction = consensus::encode::deserialize_hex(unsigned_commit_hex)?;
    let funding_tx: Transaction = consensus::encode::deserialize_hex(funding_tx_hex)?;
    commit_tx.version = Version::TWO;

    let outpoint = commit_tx.input[0].previous_output;
    let prevout = prevout_of(&funding_tx, outpoint.vout)?.clone();

    let key = ring
        .match_script(&prevout.script_pubkey)
        .map_err(|source| SignError::PrepareInput { index: 0, source })?;
    debug!(index = key.index(), "matched commit input to wallet key");

    let prevouts = [prevout];
    let sighash = SighashCache::new(&commit_tx).taproot_key_spend_signature_hash(
        0,
        &Prevouts::All(&prevouts),
        TapSighashType::Default,
    )?;

    let signature = sign_keypath(ring, &key.tweaked_keypair(ring.secp_ctx()), sighash);
    commit_tx.input[0].witness = Witness::from_slice(&[signature.serialize()]);

    Ok(SignedTx::from_tx(commit_tx))
}

/// Signs the spell transaction, preserving the prover-built commit input.
///
/// Every input is classified: the one spending the signed commit transaction
/// keeps its existing witness untouched; inputs spending the mining
/// transaction are matched to wallet keys and re-signed. Anything else is an
/// unknown UTXO and fails the attempt.
pub fn sign_spell_tx(
    ring: &KeyRing,
    spell_tx_hex: &str,
    signed_commit_hex: &str,
    mining_tx_hex: &str,
) -> Result<SignedTx, SignError> {
    let mut spell_tx: Transaction = consensus::encode::deserialize_hex(spell_tx_hex)?;
    let commit_tx: Transaction = consensus::encode::deserialize_hex(signed_commit_hex)?;
    let mining_tx: Transaction = consensus::encode::deserialize_hex(mining_tx_hex)?;
    spell_tx.version = Version::TWO;

    let commit_txid = commit_tx.compute_txid();
    let mining_txid = mining_tx.compute_txid();

    // First pass: resolve every input's prevout and, for mining inputs, the
    // tweaked signing key. The sighash commits to all prevouts, so this must
    // complete before any signature is produced.
    let mut prevouts = Vec::with_capacity(spell_tx.input.len());
    let mut signing_keys: Vec<Option<Keypair>> = Vec::with_capacity(spell_tx.input.len());

    for (index, input) in spell_tx.input.iter().enumerate() {
        let outpoint = input.previous_output;
        if outpoint.txid == commit_txid {
            // Commitment script from the prover; never re-signed locally.
            prevouts.push(prevout_of(&commit_tx, outpoint.vout)?.clone());
            signing_keys.push(None);
        } else if outpoint.txid == mining_txid {
            let prevout = prevout_of(&mining_tx, outpoint.vout)?.clone();
            let key = ring
                .match_script(&prevout.script_pubkey)
                .map_err(|source| SignError::PrepareInput { index, source })?;
            debug!(index, key_index = key.index(), "matched mining input");
            prevouts.push(prevout);
            signing_keys.push(Some(key.tweaked_keypair(ring.secp_ctx())));
        } else {
            return Err(SignError::UnknownInputUtxo(index));
        }
    }

    let mut sighashes = Vec::with_capacity(spell_tx.input.len());
    {
        let mut cache = SighashCache::new(&spell_tx);
        for index in 0..spell_tx.input.len() {
            sighashes.push(cache.taproot_key_spend_signature_hash(
                index,
                &Prevouts::All(&prevouts),
                TapSighashType::Default,
            )?);
        }
    }

    for (index, keypair) in signing_keys.iter().enumerate() {
        if let Some(keypair) = keypair {
            let signature = sign_keypath(ring, keypair, sighashes[index]);
            spell_tx.input[index].witness = Witness::from_slice(&[signature.serialize()]);
        }
        // Commit input: witness stays exactly as the prover produced it.
    }

    Ok(SignedTx::from_tx(spell_tx))
}

fn sign_keypath(
    ring: &KeyRing,
    tweaked: &Keypair,
    sighash: bitcoin::TapSighash,
) -> bitcoin::secp256k1::schnorr::Signature {
    let msg = Message::from_digest(sighash.to_byte_array());
    ring.secp_ctx().sign_schnorr_no_aux_rand(&msg, tweaked)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use batchmint_key_derivation::KeyRing;
    use bitcoin::{
        absolute::LockTime,
        hashes::Hash,
        secp256k1::{schnorr, XOnlyPublicKey},
        Amount, Network, OutPoint, ScriptBuf, Sequence, TxIn,
    };

    use super::*;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn ring() -> KeyRing {
        KeyRing::from_mnemonic(MNEMONIC, Network::Bitcoin).unwrap()
    }

    fn txin(txid: Txid, vout: u32) -> TxIn {
        TxIn {
            previous_output: OutPoint { txid, vout },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }
    }

    /// Mining tx paying outputs 0 and 1 to wallet indices 0 and 1.
    fn mining_tx(ring: &KeyRing) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![txin(Txid::all_zeros(), 7)],
            output: vec![
                TxOut {
                    value: Amount::from_sat(333),
                    script_pubkey: ring.derive(0).unwrap().script_pubkey().to_owned(),
                },
                TxOut {
                    value: Amount::from_sat(10_000),
                    script_pubkey: ring.derive(1).unwrap().script_pubkey().to_owned(),
                },
            ],
        }
    }

    fn output_key(script: &ScriptBuf) -> XOnlyPublicKey {
        XOnlyPublicKey::from_slice(&script.as_bytes()[2..]).unwrap()
    }

    fn assert_valid_keypath_sig(
        tx: &Transaction,
        prevouts: &[TxOut],
        input_index: usize,
        witness: &Witness,
    ) {
        assert_eq!(witness.len(), 1);
        let sig = schnorr::Signature::from_slice(witness.nth(0).unwrap()).unwrap();
        let sighash = SighashCache::new(tx)
            .taproot_key_spend_signature_hash(
                input_index,
                &Prevouts::All(prevouts),
                TapSighashType::Default,
            )
            .unwrap();
        let msg = Message::from_digest(sighash.to_byte_array());
        let pubkey = output_key(&prevouts[input_index].script_pubkey);
        bitcoin::secp256k1::Secp256k1::verification_only()
            .verify_schnorr(&sig, &msg, &pubkey)
            .unwrap();
    }

    #[test]
    fn signs_commit_input_with_matched_key() {
        let ring = ring();
        let mining = mining_tx(&ring);
        let mining_hex = consensus::encode::serialize_hex(&mining);

        let commit = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![txin(mining.compute_txid(), 1)],
            output: vec![TxOut {
                value: Amount::from_sat(9_000),
                // Arbitrary commitment script stands in for the prover's.
                script_pubkey: ring.derive(42).unwrap().script_pubkey().to_owned(),
            }],
        };
        let unsigned_hex = consensus::encode::serialize_hex(&commit);

        let signed = sign_commit_tx(&ring, &unsigned_hex, &mining_hex).unwrap();
        assert_valid_keypath_sig(
            &signed.tx,
            &[mining.output[1].clone()],
            0,
            &signed.tx.input[0].witness,
        );
        assert_eq!(signed.txid, signed.tx.compute_txid());
    }

    #[test]
    fn spell_signing_preserves_commit_witness_and_signs_mining_input() {
        let ring = ring();
        let mining = mining_tx(&ring);
        let mining_hex = consensus::encode::serialize_hex(&mining);

        let mut commit = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![txin(mining.compute_txid(), 1)],
            output: vec![TxOut {
                value: Amount::from_sat(9_000),
                script_pubkey: ring.derive(42).unwrap().script_pubkey().to_owned(),
            }],
        };
        commit.input[0].witness = Witness::from_slice(&[vec![0xab; 64]]);
        let commit_hex = consensus::encode::serialize_hex(&commit);

        let mut spell = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![
                txin(commit.compute_txid(), 0),
                txin(mining.compute_txid(), 0),
            ],
            output: vec![TxOut {
                value: Amount::from_sat(333),
                script_pubkey: ring.derive(0).unwrap().script_pubkey().to_owned(),
            }],
        };
        // Witness the prover attached to the commit input.
        let prover_witness = Witness::from_slice(&[vec![1u8, 2, 3], vec![4u8; 33]]);
        spell.input[0].witness = prover_witness.clone();
        let spell_hex = consensus::encode::serialize_hex(&spell);

        let signed = sign_spell_tx(&ring, &spell_hex, &commit_hex, &mining_hex).unwrap();

        assert_eq!(signed.tx.input[0].witness, prover_witness);
        let prevouts = vec![commit.output[0].clone(), mining.output[0].clone()];
        assert_valid_keypath_sig(&signed.tx, &prevouts, 1, &signed.tx.input[1].witness);
    }

    #[test]
    fn rejects_unknown_input() {
        let ring = ring();
        let mining = mining_tx(&ring);
        let mining_hex = consensus::encode::serialize_hex(&mining);

        let commit = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![txin(mining.compute_txid(), 1)],
            output: vec![TxOut {
                value: Amount::from_sat(9_000),
                script_pubkey: ring.derive(42).unwrap().script_pubkey().to_owned(),
            }],
        };
        let commit_hex = consensus::encode::serialize_hex(&commit);

        let foreign = Txid::from_str(
            "1111111111111111111111111111111111111111111111111111111111111111",
        )
        .unwrap();
        let spell = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![txin(foreign, 0)],
            output: vec![TxOut {
                value: Amount::from_sat(333),
                script_pubkey: ring.derive(0).unwrap().script_pubkey().to_owned(),
            }],
        };
        let spell_hex = consensus::encode::serialize_hex(&spell);

        let err = sign_spell_tx(&ring, &spell_hex, &commit_hex, &mining_hex).unwrap_err();
        assert!(matches!(err, SignError::UnknownInputUtxo(0)));
    }

    #[test]
    fn reports_missing_prevout() {
        let ring = ring();
        let mining = mining_tx(&ring);
        let mining_hex = consensus::encode::serialize_hex(&mining);

        let commit = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![txin(mining.compute_txid(), 9)],
            output: vec![TxOut {
                value: Amount::from_sat(9_000),
                script_pubkey: ring.derive(0).unwrap().script_pubkey().to_owned(),
            }],
        };
        let unsigned_hex = consensus::encode::serialize_hex(&commit);

        let err = sign_commit_tx(&ring, &unsigned_hex, &mining_hex).unwrap_err();
        assert!(matches!(err, SignError::MissingPrevout { vout: 9, .. }));
    }
}
