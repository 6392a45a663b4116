//! # x402-agent
//!
//! An HTTP client for autonomous agents that settles [x402](https://www.x402.org/)
//! payment challenges automatically: when a server answers `402 Payment
//! Required` with a challenge, the client pays the requested stablecoin
//! amount on a supported chain, waits for on-chain confirmation, and replays
//! the request with `X-Payment-*` proof headers attached.
//!
//! Supported settlement backends are EVM chains (ERC-20 transfer via
//! [alloy](https://alloy.rs)) and Solana (SPL `transfer_checked`). New chains
//! plug in by implementing [`chain::ChainProvider`].
//!
//! ```no_run
//! use x402_agent::{AgentConfig, X402Client};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = AgentConfig::from_env()?.build_registry()?;
//! let client = X402Client::new(registry)
//!     .with_max_payment("1.00".parse()?);
//! let response = client.get("https://api.example.com/paid-data").await?;
//! println!("{}", response.text().await?);
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod challenge;
pub mod client;
pub mod config;
pub mod proof;
pub mod timestamp;
pub mod util;

pub use chain::{ChainId, ChainProvider, ProviderError, ProviderRegistry, TxRef};
pub use challenge::{ChallengeOption, PaymentChallenge};
pub use client::{X402Client, X402Error};
pub use config::{AgentConfig, ConfigError};
pub use proof::{PaymentProof, ProofCache};
pub use timestamp::UnixTimestamp;
pub use util::MoneyAmount;
