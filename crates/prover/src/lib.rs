//! Prover request composition and the proving service client.
//!
//! A request packages one mining output into a "spell": the mining tx plus
//! its block inclusion proof as witness data, the spend reference, the token
//! amount to mint, and the fee funding. The prover answers with exactly two
//! raw transactions, commit then spell.

mod client;
mod request;

pub use client::{HttpProver, ProvedTxs, ProverApi, ProverError, PROVER_MAX_RETRIES};
pub use request::{
    compose_request, validate_request, ComposeError, PrivateInput, ProverRequest, Spell,
    SpellInput, SpellOutput, APP_ID, APP_KEY, SPELL_VERSION,
};

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use batchmint_primitives::{ProofContext, Utxo};
    use bitcoin::Txid;

    use super::*;

    fn ctx() -> ProofContext {
        let mining_txid = Txid::from_str(
            "e2d8736dd1d90bb9e2b6a8b06b4849ec2a023882a0f14b32ec71b85cbd5ee96e",
        )
        .unwrap();
        ProofContext {
            mining_txid,
            mining_tx_hex: "020000000001...".to_owned(),
            reward: 400_000_000,
            spendable_outputs: vec![
                Utxo {
                    txid: mining_txid,
                    vout: 0,
                    value: 1_000,
                },
                Utxo {
                    txid: mining_txid,
                    vout: 1,
                    value: 1_000,
                },
            ],
        }
    }

    fn funding() -> Utxo {
        Utxo {
            txid: Txid::from_str(
                "a4b1c35c24a2302c98c41a5d09b6ef93a46b90b0141ba71ee49cf0750b51f4a7",
            )
            .unwrap(),
            vout: 2,
            value: 5_000,
        }
    }

    #[test]
    fn composes_full_request() {
        let ctx = ctx();
        let funding = funding();
        let request = compose_request(
            ctx.mining_utxo(1),
            Some(&funding),
            &ctx,
            "bc1paddress",
            "proofbytes",
            1,
        )
        .unwrap();

        assert_eq!(request.spell.version, SPELL_VERSION);
        assert_eq!(request.spell.apps[APP_KEY], APP_ID);
        assert_eq!(request.spell.private_inputs[APP_KEY].tx, ctx.mining_tx_hex);
        assert_eq!(
            request.spell.private_inputs[APP_KEY].tx_block_proof,
            "proofbytes"
        );
        assert_eq!(
            request.spell.ins[0].utxo_id,
            format!("{}:1", ctx.mining_txid)
        );
        assert_eq!(request.spell.outs[0].address, "bc1paddress");
        assert_eq!(request.spell.outs[0].charms[APP_KEY], 400_000_000);
        assert_eq!(request.prev_txs, vec![ctx.mining_tx_hex.clone()]);
        assert_eq!(request.funding_utxo, funding.outpoint_ref());
        assert_eq!(request.funding_utxo_value, 5_000);
        assert_eq!(request.change_address, "bc1paddress");
        assert_eq!(request.fee_rate, 1);
        assert_eq!(request.chain, "bitcoin");

        validate_request(&request).unwrap();
    }

    #[test]
    fn each_missing_field_has_its_own_error() {
        let ctx = ctx();
        let funding = funding();

        assert_eq!(
            compose_request(None, Some(&funding), &ctx, "addr", "", 1).unwrap_err(),
            ComposeError::MissingMiningUtxo
        );
        assert_eq!(
            compose_request(ctx.mining_utxo(0), None, &ctx, "addr", "", 1).unwrap_err(),
            ComposeError::MissingFundingUtxo
        );
        assert_eq!(
            compose_request(ctx.mining_utxo(0), Some(&funding), &ctx, "", "", 1).unwrap_err(),
            ComposeError::MissingChangeAddress
        );

        let mut no_tx = ctx.clone();
        no_tx.mining_tx_hex.clear();
        assert_eq!(
            compose_request(no_tx.mining_utxo(0), Some(&funding), &no_tx, "addr", "", 1)
                .unwrap_err(),
            ComposeError::MissingMiningTx
        );
    }

    #[test]
    fn validate_rejects_gutted_request() {
        let ctx = ctx();
        let funding = funding();
        let mut request =
            compose_request(ctx.mining_utxo(0), Some(&funding), &ctx, "addr", "", 1).unwrap();

        request.spell.ins.clear();
        assert_eq!(
            validate_request(&request).unwrap_err(),
            ComposeError::EmptyInputs
        );
    }

    #[test]
    fn request_serializes_with_wire_field_names() {
        let ctx = ctx();
        let funding = funding();
        let request =
            compose_request(ctx.mining_utxo(0), Some(&funding), &ctx, "addr", "p", 2).unwrap();

        let value = serde_json::to_value(&request).unwrap();
        assert!(value["spell"]["private_inputs"]["$01"]["tx_block_proof"].is_string());
        assert!(value["spell"]["ins"][0]["utxo_id"].is_string());
        assert_eq!(value["fee_rate"], 2);
        assert_eq!(value["funding_utxo_value"], 5_000);
    }

    #[test]
    fn response_must_hold_exactly_two_txs() {
        let pair =
            ProvedTxs::from_response(vec!["aa".to_owned(), "bb".to_owned()]).unwrap();
        assert_eq!(pair.commit_tx_hex, "aa");
        assert_eq!(pair.spell_tx_hex, "bb");

        let err = ProvedTxs::from_response(vec!["aa".to_owned()]).unwrap_err();
        assert!(matches!(err, ProverError::MalformedResponse { count: 1 }));
    }
}
