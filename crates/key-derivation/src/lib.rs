//! BIP-86 taproot key derivation and bounded script matching.
//!
//! The wallet does not persist a script-to-index map, so ownership of a
//! spending script is established by deriving candidate keys in order and
//! comparing output scripts. The probe is bounded by [`KEY_SEARCH_BOUND`];
//! anything past it is reported as an unknown key, never guessed.

use bip39::{Language, Mnemonic};
use bitcoin::{
    bip32::{ChildNumber, DerivationPath, Xpriv},
    key::{Keypair, TapTweak},
    secp256k1::{All, Secp256k1, XOnlyPublicKey},
    Address, Network, Script, ScriptBuf,
};
use thiserror::Error;
use zeroize::Zeroizing;

/// Upper bound on the linear key probe.
///
/// Mining transactions only ever pay to the first handful of wallet
/// addresses, so a miss within this bound means a derivation-path mismatch
/// rather than a deep address.
pub const KEY_SEARCH_BOUND: u32 = 100;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(#[from] bip39::Error),

    #[error("key derivation failed: {0}")]
    Derivation(#[from] bitcoin::bip32::Error),

    #[error("no wallet key matches script {script} within {bound} indices")]
    NoMatchingKey { script: String, bound: u32 },
}

/// One derived taproot key, untweaked, with its derived artifacts.
#[derive(Debug, Clone)]
pub struct DerivedKey {
    index: u32,
    keypair: Keypair,
    internal_key: XOnlyPublicKey,
    script_pubkey: ScriptBuf,
    address: Address,
}

impl DerivedKey {
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The untweaked internal key committed to by the output script.
    pub fn internal_key(&self) -> XOnlyPublicKey {
        self.internal_key
    }

    /// The P2TR output script this key controls.
    pub fn script_pubkey(&self) -> &Script {
        &self.script_pubkey
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Keypair with the BIP-341 key-path tweak applied (empty merkle root).
    ///
    /// The tweak negates the secret key first when the untweaked public key
    /// has odd Y, so signatures verify against the x-only output key.
    pub fn tweaked_keypair(&self, secp: &Secp256k1<All>) -> Keypair {
        self.keypair.tap_tweak(secp, None).to_inner()
    }
}

/// Deterministic taproot keys for one wallet, `m/86'/{coin}'/0'/0/{index}`.
pub struct KeyRing {
    xpriv: Xpriv,
    network: Network,
    secp: Secp256k1<All>,
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl KeyRing {
    /// Builds a key ring from a BIP-39 seed phrase (empty passphrase).
    pub fn from_mnemonic(phrase: &str, network: Network) -> Result<Self, KeyError> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)?;
        let seed = Zeroizing::new(mnemonic.to_seed(""));
        Self::from_seed(seed.as_ref(), network)
    }

    pub fn from_seed(seed: &[u8], network: Network) -> Result<Self, KeyError> {
        let xpriv = Xpriv::new_master(network, seed)?;
        Ok(Self {
            xpriv,
            network,
            secp: Secp256k1::new(),
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Derives the taproot key at receive index `index`.
    pub fn derive(&self, index: u32) -> Result<DerivedKey, KeyError> {
        let coin = match self.network {
            Network::Bitcoin => 0,
            _ => 1,
        };
        let path = DerivationPath::from(vec![
            ChildNumber::from_hardened_idx(86).expect("valid child number"),
            ChildNumber::from_hardened_idx(coin).expect("valid child number"),
            ChildNumber::from_hardened_idx(0).expect("valid child number"),
            ChildNumber::from_normal_idx(0).expect("valid child number"),
            ChildNumber::from_normal_idx(index)?,
        ]);
        let child = self.xpriv.derive_priv(&self.secp, &path)?;
        let keypair = Keypair::from_secret_key(&self.secp, &child.private_key);
        let (internal_key, _) = XOnlyPublicKey::from_keypair(&keypair);
        let script_pubkey = ScriptBuf::new_p2tr(&self.secp, internal_key, None);
        let address = Address::p2tr(&self.secp, internal_key, None, self.network);

        Ok(DerivedKey {
            index,
            keypair,
            internal_key,
            script_pubkey,
            address,
        })
    }

    /// Finds the wallet key owning `script` by probing indices
    /// `0..KEY_SEARCH_BOUND` in order and comparing output scripts.
    pub fn match_script(&self, script: &Script) -> Result<DerivedKey, KeyError> {
        for index in 0..KEY_SEARCH_BOUND {
            let key = self.derive(index)?;
            if key.script_pubkey.as_script() == script {
                return Ok(key);
            }
        }
        Err(KeyError::NoMatchingKey {
            script: script.to_hex_string(),
            bound: KEY_SEARCH_BOUND,
        })
    }

    /// Shared secp context for signing call sites.
    pub fn secp_ctx(&self) -> &Secp256k1<All> {
        &self.secp
    }
}
