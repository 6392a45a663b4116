//! Solana chain backend: SPL token settlement via `transfer_checked`, with
//! idempotent creation of the recipient's associated token account so a first
//! payment to a fresh wallet still lands.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use std::fmt::{Debug, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::Instant;

use crate::chain::{
    CONFIRMATION_DEADLINE, CONFIRMATION_POLL_INTERVAL, ChainId, ChainProvider, ProviderError,
    TxRef, ensure_sufficient,
};
use crate::config::SolanaChainConfig;
use crate::util::MoneyAmount;

/// Solana implementation of [`ChainProvider`].
pub struct SolanaProvider {
    chain: ChainId,
    keypair: Arc<Keypair>,
    rpc_client: Arc<RpcClient>,
    mint: Pubkey,
    decimals: u8,
}

impl Debug for SolanaProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaProvider")
            .field("chain", &self.chain)
            .field("signer", &self.keypair.pubkey())
            .field("mint", &self.mint)
            .finish()
    }
}

impl SolanaProvider {
    pub fn from_config(config: &SolanaChainConfig) -> Result<Self, ProviderError> {
        let keypair = parse_keypair(&config.keypair)?;
        let mint = Pubkey::from_str(&config.token_mint).map_err(|_| {
            ProviderError::InvalidAddress {
                kind: "mint",
                value: config.token_mint.clone(),
            }
        })?;
        let rpc_client = RpcClient::new_with_commitment(
            config.rpc_url.to_string(),
            CommitmentConfig::confirmed(),
        );

        tracing::info!(
            chain = %config.chain,
            rpc = %config.rpc_url,
            signer = %keypair.pubkey(),
            mint = %mint,
            "Initialized Solana provider"
        );

        Ok(Self {
            chain: config.chain.clone(),
            keypair: Arc::new(keypair),
            rpc_client: Arc::new(rpc_client),
            mint,
            decimals: config.token_decimals,
        })
    }

    /// Token balance of `owner`'s associated token account for the configured
    /// mint. An account that does not exist yet reads as zero.
    async fn token_balance(&self, owner: &Pubkey) -> Result<u64, ProviderError> {
        let ata = get_associated_token_address(owner, &self.mint);
        let response = self
            .rpc_client
            .get_account_with_commitment(&ata, CommitmentConfig::confirmed())
            .await
            .map_err(|e| ProviderError::Rpc(e.to_string()))?;
        match response.value {
            None => Ok(0),
            Some(account) => {
                let token_account = spl_token::state::Account::unpack(&account.data)
                    .map_err(|e| ProviderError::Rpc(e.to_string()))?;
                Ok(token_account.amount)
            }
        }
    }
}

/// Parses a Solana signing key from either its base58-encoded 64-byte form or
/// a JSON byte array (the `solana-keygen` file format), tried in that order.
fn parse_keypair(input: &str) -> Result<Keypair, ProviderError> {
    let trimmed = input.trim();
    if let Ok(bytes) = bs58::decode(trimmed).into_vec() {
        if let Ok(keypair) = Keypair::try_from(bytes.as_slice()) {
            return Ok(keypair);
        }
    }
    if let Ok(bytes) = serde_json::from_str::<Vec<u8>>(trimmed) {
        if let Ok(keypair) = Keypair::try_from(bytes.as_slice()) {
            return Ok(keypair);
        }
    }
    Err(ProviderError::InvalidKeyFormat)
}

#[async_trait]
impl ChainProvider for SolanaProvider {
    fn chain_id(&self) -> ChainId {
        self.chain.clone()
    }

    fn address(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    async fn balance(&self, address: &str) -> Result<u64, ProviderError> {
        let owner = Pubkey::from_str(address).map_err(|_| ProviderError::InvalidAddress {
            kind: "solana",
            value: address.to_string(),
        })?;
        self.token_balance(&owner).await
    }

    async fn send_stablecoin(
        &self,
        to: &str,
        amount: &MoneyAmount,
    ) -> Result<TxRef, ProviderError> {
        let recipient = Pubkey::from_str(to).map_err(|_| ProviderError::InvalidAddress {
            kind: "solana",
            value: to.to_string(),
        })?;
        let units = amount.as_token_units(self.decimals as u32)?;
        let payer = self.keypair.pubkey();
        let available = self.token_balance(&payer).await?;
        ensure_sufficient(available, units, self.decimals as u32)?;

        let source_ata = get_associated_token_address(&payer, &self.mint);
        let dest_ata = get_associated_token_address(&recipient, &self.mint);
        let instructions = vec![
            create_associated_token_account_idempotent(
                &payer,
                &recipient,
                &self.mint,
                &spl_token::id(),
            ),
            spl_token::instruction::transfer_checked(
                &spl_token::id(),
                &source_ata,
                &self.mint,
                &dest_ata,
                &payer,
                &[],
                units,
                self.decimals,
            )
            .map_err(|e| ProviderError::Rpc(e.to_string()))?,
        ];

        let blockhash = self
            .rpc_client
            .get_latest_blockhash()
            .await
            .map_err(|e| ProviderError::Rpc(e.to_string()))?;
        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(&payer),
            &[self.keypair.as_ref()],
            blockhash,
        );
        let signature = self
            .rpc_client
            .send_transaction(&transaction)
            .await
            .map_err(|e| ProviderError::Rpc(e.to_string()))?;
        tracing::debug!(chain = %self.chain, %recipient, units, tx = %signature, "Submitted SPL transfer");
        Ok(TxRef::new(signature.to_string()))
    }

    async fn wait_for_confirmation(&self, tx: &TxRef) -> Result<bool, ProviderError> {
        let signature = Signature::from_str(tx.as_str())
            .map_err(|_| ProviderError::MalformedTxRef(tx.to_string()))?;
        let deadline = Instant::now() + CONFIRMATION_DEADLINE;
        loop {
            let status = self
                .rpc_client
                .get_signature_status_with_commitment(&signature, CommitmentConfig::confirmed())
                .await
                .map_err(|e| ProviderError::Rpc(e.to_string()))?;
            if let Some(result) = status {
                return Ok(result.is_ok());
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

    #[test]
    fn parses_base58_keypair() {
        let keypair = Keypair::new();
        let parsed = parse_keypair(&keypair.to_base58_string()).unwrap();
        assert_eq!(parsed.pubkey(), keypair.pubkey());
    }

    #[test]
    fn parses_json_byte_array_keypair() {
        let keypair = Keypair::new();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        let parsed = parse_keypair(&json).unwrap();
        assert_eq!(parsed.pubkey(), keypair.pubkey());
    }

    #[test]
    fn base58_is_tried_before_json() {
        let keypair = Keypair::new();
        let padded = format!("  {}\n", keypair.to_base58_string());
        assert_eq!(parse_keypair(&padded).unwrap().pubkey(), keypair.pubkey());
    }

    #[test]
    fn rejects_garbage_key() {
        assert!(matches!(
            parse_keypair("definitely not a keypair"),
            Err(ProviderError::InvalidKeyFormat)
        ));
        assert!(matches!(
            parse_keypair("[1,2,3]"),
            Err(ProviderError::InvalidKeyFormat)
        ));
    }
}
