//! Configuration for chain providers.
//!
//! Configuration is plain data handed to the client at construction; nothing
//! here reads global state after startup. [`AgentConfig::from_env`] offers an
//! environment-variable convenience for the common deployments: one EVM
//! signing key shared across EVM chains, one Solana keypair, and an RPC URL
//! per chain. Chains whose RPC URL is not set are skipped with a warning.

use serde::Deserialize;
use url::Url;

use crate::chain::{ChainId, ProviderError, ProviderRegistry};
use crate::chain::evm::EvmProvider;
use crate::chain::solana::SolanaProvider;

pub const ENV_EVM_PRIVATE_KEY: &str = "EVM_PRIVATE_KEY";
pub const ENV_SOLANA_PRIVATE_KEY: &str = "SOLANA_PRIVATE_KEY";
pub const ENV_RPC_BASE: &str = "RPC_URL_BASE";
pub const ENV_RPC_BASE_SEPOLIA: &str = "RPC_URL_BASE_SEPOLIA";
pub const ENV_RPC_SOLANA: &str = "RPC_URL_SOLANA";
pub const ENV_RPC_SOLANA_DEVNET: &str = "RPC_URL_SOLANA_DEVNET";

/// USDC contract addresses per supported chain.
pub const USDC_ADDRESS_BASE: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
pub const USDC_ADDRESS_BASE_SEPOLIA: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";
pub const USDC_MINT_SOLANA: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const USDC_MINT_SOLANA_DEVNET: &str = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU";

pub const USDC_DECIMALS: u8 = 6;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("invalid URL in {var}: {value}")]
    InvalidUrl { var: &'static str, value: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Settings for one EVM chain backend.
#[derive(Debug, Clone, Deserialize)]
pub struct EvmChainConfig {
    pub chain: ChainId,
    pub rpc_url: Url,
    pub private_key: String,
    pub token_address: String,
    pub token_decimals: u8,
}

/// Settings for one Solana chain backend.
#[derive(Debug, Clone, Deserialize)]
pub struct SolanaChainConfig {
    pub chain: ChainId,
    pub rpc_url: Url,
    pub keypair: String,
    pub token_mint: String,
    pub token_decimals: u8,
}

/// Full chain configuration for an agent: any number of EVM and Solana
/// backends, each settling USDC (or another stablecoin) on its chain.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub evm: Vec<EvmChainConfig>,
    #[serde(default)]
    pub solana: Vec<SolanaChainConfig>,
}

impl AgentConfig {
    /// Reads chain settings from the environment.
    ///
    /// A chain is enabled when its `RPC_URL_*` variable is present and the
    /// matching signing key variable is set. Unset chains are skipped with a
    /// warning rather than failing, so one binary can serve mainnet and
    /// testnet deployments with different variable sets.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = AgentConfig::default();

        let evm_key = std::env::var(ENV_EVM_PRIVATE_KEY).ok();
        let evm_chains = [
            ("base", ENV_RPC_BASE, USDC_ADDRESS_BASE),
            ("base-sepolia", ENV_RPC_BASE_SEPOLIA, USDC_ADDRESS_BASE_SEPOLIA),
        ];
        for (chain, rpc_var, token_address) in evm_chains {
            let Some(rpc_url) = env_url(rpc_var)? else {
                tracing::warn!(chain, var = rpc_var, "RPC URL not set, chain disabled");
                continue;
            };
            let private_key = evm_key
                .clone()
                .ok_or(ConfigError::MissingEnv(ENV_EVM_PRIVATE_KEY))?;
            config.evm.push(EvmChainConfig {
                chain: ChainId::from(chain),
                rpc_url,
                private_key,
                token_address: token_address.to_string(),
                token_decimals: USDC_DECIMALS,
            });
        }

        let solana_key = std::env::var(ENV_SOLANA_PRIVATE_KEY).ok();
        let solana_chains = [
            ("solana", ENV_RPC_SOLANA, USDC_MINT_SOLANA),
            ("solana-devnet", ENV_RPC_SOLANA_DEVNET, USDC_MINT_SOLANA_DEVNET),
        ];
        for (chain, rpc_var, token_mint) in solana_chains {
            let Some(rpc_url) = env_url(rpc_var)? else {
                tracing::warn!(chain, var = rpc_var, "RPC URL not set, chain disabled");
                continue;
            };
            let keypair = solana_key
                .clone()
                .ok_or(ConfigError::MissingEnv(ENV_SOLANA_PRIVATE_KEY))?;
            config.solana.push(SolanaChainConfig {
                chain: ChainId::from(chain),
                rpc_url,
                keypair,
                token_mint: token_mint.to_string(),
                token_decimals: USDC_DECIMALS,
            });
        }

        Ok(config)
    }

    /// Constructs a provider per configured chain and collects them into a
    /// registry for the client.
    pub fn build_registry(&self) -> Result<ProviderRegistry, ConfigError> {
        let mut registry = ProviderRegistry::new();
        for evm in &self.evm {
            registry = registry.register(EvmProvider::from_config(evm)?);
        }
        for solana in &self.solana {
            registry = registry.register(SolanaProvider::from_config(solana)?);
        }
        Ok(registry)
    }
}

fn env_url(var: &'static str) -> Result<Option<Url>, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(None),
        Ok(value) => Url::parse(&value)
            .map(Some)
            .map_err(|_| ConfigError::InvalidUrl { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_from_json() {
        let json = r#"{
            "evm": [{
                "chain": "base",
                "rpc_url": "https://mainnet.base.org",
                "private_key": "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
                "token_address": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
                "token_decimals": 6
            }],
            "solana": []
        }"#;
        let config: AgentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.evm.len(), 1);
        assert_eq!(config.evm[0].chain, ChainId::from("base"));
        assert!(config.solana.is_empty());
    }

    #[test]
    fn empty_config_builds_empty_registry() {
        let registry = AgentConfig::default().build_registry().unwrap();
        assert!(registry.is_empty());
    }
}
