//! EVM chain backend: stablecoin settlement as a plain ERC-20 `transfer`,
//! balance reads via `balanceOf`, confirmation by polling for the receipt.

use alloy_network::EthereumWallet;
use alloy_primitives::{Address, B256, U256};
use alloy_provider::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy_provider::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_client::ClientBuilder;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::sol;
use async_trait::async_trait;
use std::fmt::{Debug, Formatter};
use std::str::FromStr;
use tokio::time::Instant;

use crate::chain::{
    CONFIRMATION_DEADLINE, CONFIRMATION_POLL_INTERVAL, ChainId, ChainProvider, ProviderError,
    TxRef, ensure_sufficient,
};
use crate::config::EvmChainConfig;
use crate::util::MoneyAmount;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function transfer(address to, uint256 value) external returns (bool);
    }
}

/// Combined filler type for gas, blob gas, nonce, and chain ID.
pub type InnerFiller =
    JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>;

/// The fully composed Ethereum provider type used in this crate.
///
/// Combines filler layers for gas, nonce, chain ID, blob gas, and wallet
/// signing, and wraps a [`RootProvider`] for actual JSON-RPC communication.
pub type InnerProvider = FillProvider<
    JoinFill<JoinFill<Identity, InnerFiller>, WalletFiller<EthereumWallet>>,
    RootProvider,
>;

/// EVM implementation of [`ChainProvider`].
///
/// Holds a composed Alloy provider [`InnerProvider`] plus the stablecoin
/// contract address and its decimal precision.
pub struct EvmProvider {
    chain: ChainId,
    inner: InnerProvider,
    signer_address: Address,
    token: Address,
    decimals: u8,
}

impl Debug for EvmProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmProvider")
            .field("chain", &self.chain)
            .field("signer", &self.signer_address)
            .field("token", &self.token)
            .finish()
    }
}

impl EvmProvider {
    pub fn from_config(config: &EvmChainConfig) -> Result<Self, ProviderError> {
        let signer = PrivateKeySigner::from_str(config.private_key.trim())
            .map_err(|_| ProviderError::InvalidKeyFormat)?;
        let signer_address = signer.address();
        let token = parse_address("token", &config.token_address)?;

        let wallet = EthereumWallet::from(signer);
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                BlobGasFiller::default(),
                JoinFill::new(NonceFiller::default(), ChainIdFiller::default()),
            ),
        );
        let client = ClientBuilder::default().http(config.rpc_url.clone());
        let inner: InnerProvider = ProviderBuilder::default()
            .filler(filler)
            .wallet(wallet)
            .connect_client(client);

        tracing::info!(
            chain = %config.chain,
            rpc = %config.rpc_url,
            signer = %signer_address,
            token = %token,
            "Initialized EVM provider"
        );

        Ok(Self {
            chain: config.chain.clone(),
            inner,
            signer_address,
            token,
            decimals: config.token_decimals,
        })
    }

    fn erc20(&self) -> IERC20::IERC20Instance<InnerProvider> {
        IERC20::new(self.token, self.inner.clone())
    }

    async fn balance_of(&self, owner: Address) -> Result<u64, ProviderError> {
        let balance: U256 = self
            .erc20()
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| ProviderError::Rpc(e.to_string()))?;
        u64::try_from(balance).map_err(|_| ProviderError::BalanceOutOfRange)
    }
}

fn parse_address(kind: &'static str, value: &str) -> Result<Address, ProviderError> {
    Address::from_str(value).map_err(|_| ProviderError::InvalidAddress {
        kind,
        value: value.to_string(),
    })
}

#[async_trait]
impl ChainProvider for EvmProvider {
    fn chain_id(&self) -> ChainId {
        self.chain.clone()
    }

    fn address(&self) -> String {
        self.signer_address.to_string()
    }

    async fn balance(&self, address: &str) -> Result<u64, ProviderError> {
        let owner = parse_address("evm", address)?;
        self.balance_of(owner).await
    }

    async fn send_stablecoin(
        &self,
        to: &str,
        amount: &MoneyAmount,
    ) -> Result<TxRef, ProviderError> {
        let to = parse_address("evm", to)?;
        let units = amount.as_token_units(self.decimals as u32)?;
        let available = self.balance_of(self.signer_address).await?;
        ensure_sufficient(available, units, self.decimals as u32)?;

        let pending = self
            .erc20()
            .transfer(to, U256::from(units))
            .send()
            .await
            .map_err(|e| ProviderError::Rpc(e.to_string()))?;
        let tx_hash = *pending.tx_hash();
        tracing::debug!(chain = %self.chain, %to, units, tx = %tx_hash, "Submitted ERC-20 transfer");
        Ok(TxRef::new(tx_hash.to_string()))
    }

    async fn wait_for_confirmation(&self, tx: &TxRef) -> Result<bool, ProviderError> {
        let hash = B256::from_str(tx.as_str())
            .map_err(|_| ProviderError::MalformedTxRef(tx.to_string()))?;
        let deadline = Instant::now() + CONFIRMATION_DEADLINE;
        loop {
            let receipt = self
                .inner
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| ProviderError::Rpc(e.to_string()))?;
            if let Some(receipt) = receipt {
                return Ok(receipt.status());
            }
            if Instant::now() >= deadline {
                return Err(ProviderError::ConfirmationTimeout(tx.clone()));
            }
            tokio::time::sleep(CONFIRMATION_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::USDC_DECIMALS;
    use url::Url;

    fn test_config() -> EvmChainConfig {
        EvmChainConfig {
            chain: ChainId::from("base"),
            rpc_url: Url::parse("http://localhost:8545").unwrap(),
            // Well-known anvil development key.
            private_key: "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
                .to_string(),
            token_address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string(),
            token_decimals: USDC_DECIMALS,
        }
    }

    #[test]
    fn derives_signer_address_from_private_key() {
        let provider = EvmProvider::from_config(&test_config()).unwrap();
        assert_eq!(
            provider.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
        assert_eq!(provider.chain_id(), ChainId::from("base"));
    }

    #[test]
    fn rejects_malformed_private_key() {
        let mut config = test_config();
        config.private_key = "not-a-key".to_string();
        assert!(matches!(
            EvmProvider::from_config(&config),
            Err(ProviderError::InvalidKeyFormat)
        ));
    }

    #[test]
    fn rejects_malformed_token_address() {
        let mut config = test_config();
        config.token_address = "0x1234".to_string();
        assert!(matches!(
            EvmProvider::from_config(&config),
            Err(ProviderError::InvalidAddress { kind: "token", .. })
        ));
    }
}
