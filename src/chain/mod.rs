//! Chain provider abstraction: a uniform interface over the blockchains an
//! agent can settle payments on, plus the read-only registry the protocol
//! engine selects from.
//!
//! Concrete backends live in [`evm`] and [`solana`]. New chains are added by
//! implementing [`ChainProvider`] and registering the instance; the engine
//! never branches on a chain name.

pub mod evm;
pub mod solana;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use crate::util::{MoneyAmount, MoneyAmountParseError, format_units};

/// Opaque chain identifier as it appears on the wire (e.g. `"base"`,
/// `"solana"`). The engine treats it purely as a registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChainId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChainId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for ChainId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque chain-native transaction reference: a 0x-prefixed hash on EVM
/// chains, a base58 signature on Solana.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(String);

impl TxRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TxRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors surfaced by chain providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The signer holds fewer token units than the requested transfer.
    /// Both sides are pre-formatted decimal amounts so callers can decide
    /// whether to top up or raise a limit.
    #[error("insufficient balance. Have: {available}, Need: {required}")]
    InsufficientBalance { available: String, required: String },
    /// The signing credential is neither a base58-encoded keypair nor a JSON
    /// byte array.
    #[error("invalid key format: expected base58-encoded keypair or JSON byte array")]
    InvalidKeyFormat,
    #[error("invalid {kind} address: {value}")]
    InvalidAddress { kind: &'static str, value: String },
    #[error("malformed transaction reference: {0}")]
    MalformedTxRef(String),
    /// The chain did not report a definitive inclusion status before the
    /// provider's confirmation deadline.
    #[error("transaction {0} not confirmed within the deadline")]
    ConfirmationTimeout(TxRef),
    #[error("token balance exceeds u64 range")]
    BalanceOutOfRange,
    #[error("amount not representable in token units")]
    Amount(#[from] MoneyAmountParseError),
    /// Transport or backend failure from the underlying chain client.
    #[error("rpc failure: {0}")]
    Rpc(String),
}

/// Uniform operations every chain backend offers to the protocol engine.
///
/// `send_stablecoin` and `wait_for_confirmation` are long-latency suspension
/// points; implementations must not require callers to hold any lock across
/// them.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Chain this provider settles on; used as the registry key.
    fn chain_id(&self) -> ChainId;

    /// The signer's chain-native address, derived from the held credential.
    fn address(&self) -> String;

    /// Stablecoin balance of `address` in the token's native integer unit.
    ///
    /// An uninitialized account (Solana token account that does not exist
    /// yet) reads as zero; transport failures still propagate as errors.
    async fn balance(&self, address: &str) -> Result<u64, ProviderError>;

    /// Transfers `amount` (USD decimal) of the stablecoin to `to` and returns
    /// the chain-native transaction reference. Fails with
    /// [`ProviderError::InsufficientBalance`] before submitting anything if
    /// the signer's balance is short.
    async fn send_stablecoin(&self, to: &str, amount: &MoneyAmount)
    -> Result<TxRef, ProviderError>;

    /// Waits until the chain reports the transaction at the confirmed level.
    /// Returns `Ok(false)` if the transaction was included but failed.
    async fn wait_for_confirmation(&self, tx: &TxRef) -> Result<bool, ProviderError>;
}

/// How long a provider polls for confirmation before giving up.
pub(crate) const CONFIRMATION_DEADLINE: std::time::Duration =
    std::time::Duration::from_secs(60);

/// Poll cadence while waiting for confirmation.
pub(crate) const CONFIRMATION_POLL_INTERVAL: std::time::Duration =
    std::time::Duration::from_millis(200);

/// Fails with a formatted [`ProviderError::InsufficientBalance`] when the
/// available token units cannot cover the required amount.
pub(crate) fn ensure_sufficient(
    available: u64,
    required: u64,
    decimals: u32,
) -> Result<(), ProviderError> {
    if available < required {
        return Err(ProviderError::InsufficientBalance {
            available: format_units(available, decimals),
            required: format_units(required, decimals),
        });
    }
    Ok(())
}

/// Mapping from chain identifier to provider instance, supplied at client
/// construction and read-only for the life of the client.
#[derive(Clone, Default)]
pub struct ProviderRegistry(HashMap<ChainId, Arc<dyn ChainProvider>>);

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under its own chain id. A later registration for
    /// the same chain replaces the earlier one.
    pub fn register<P: ChainProvider + 'static>(mut self, provider: P) -> Self {
        self.0.insert(provider.chain_id(), Arc::new(provider));
        self
    }

    pub fn by_chain(&self, chain: &ChainId) -> Option<Arc<dyn ChainProvider>> {
        self.0.get(chain).cloned()
    }

    pub fn contains(&self, chain: &ChainId) -> bool {
        self.0.contains_key(chain)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn chains(&self) -> impl Iterator<Item = &ChainId> {
        self.0.keys()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}
