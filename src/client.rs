//! The protocol engine: issue a request, recognize a 402 challenge, settle
//! the payment on a supported chain, and replay the request with proof
//! headers attached.

use reqwest::header::InvalidHeaderValue;
use reqwest::{IntoUrl, Request, Response, StatusCode};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::chain::{ChainId, ProviderError, ProviderRegistry, TxRef};
use crate::challenge::{self, ChallengeOption, PaymentChallenge};
use crate::proof::{PaymentProof, ProofCache};
use crate::timestamp::UnixTimestamp;
use crate::util::MoneyAmount;

type ChallengeHook = Arc<dyn Fn(&PaymentChallenge) + Send + Sync>;
type PaymentHook = Arc<dyn Fn(&PaymentProof) + Send + Sync>;

/// Errors surfaced by [`X402Client::fetch`].
#[derive(Debug, thiserror::Error)]
pub enum X402Error {
    /// The server answered 402 but the body carried no parsable challenge.
    #[error("402 response carried no parsable payment challenge")]
    MalformedChallenge,
    #[error("payment challenge is already expired")]
    ChallengeExpired,
    /// None of the chains the server offered has a registered provider.
    #[error("no configured provider for any offered chain: {}", .offered.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", "))]
    NoSupportedChain { offered: Vec<ChainId> },
    /// The selected option costs more than the configured auto-pay ceiling.
    #[error("challenge amount {amount} exceeds the configured limit {limit}")]
    AmountExceedsLimit {
        amount: MoneyAmount,
        limit: MoneyAmount,
    },
    /// The transfer landed on chain but executed unsuccessfully.
    #[error("payment transaction {0} was not confirmed")]
    PaymentNotConfirmed(TxRef),
    /// The request body is a stream and cannot be replayed.
    #[error("request cannot be cloned for replay")]
    RequestNotCloneable,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("payment proof is not encodable as headers: {0}")]
    HeaderEncode(#[from] InvalidHeaderValue),
}

/// An HTTP client that settles x402 payment challenges automatically.
///
/// Construction is by consuming builder methods:
///
/// ```no_run
/// # use x402_agent::client::X402Client;
/// # use x402_agent::chain::{ChainId, ProviderRegistry};
/// # fn registry() -> ProviderRegistry { ProviderRegistry::new() }
/// let client = X402Client::new(registry())
///     .with_preferred_chain(ChainId::from("base"))
///     .with_max_payment("1.00".parse().unwrap());
/// ```
#[derive(Clone)]
pub struct X402Client {
    http: reqwest::Client,
    registry: ProviderRegistry,
    cache: Arc<ProofCache>,
    preferred_chain: Option<ChainId>,
    max_payment: Option<MoneyAmount>,
    on_challenge: Option<ChallengeHook>,
    on_payment: Option<PaymentHook>,
}

impl Debug for X402Client {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X402Client")
            .field("registry", &self.registry)
            .field("preferred_chain", &self.preferred_chain)
            .field("max_payment", &self.max_payment)
            .finish()
    }
}

impl X402Client {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            http: reqwest::Client::new(),
            registry,
            cache: Arc::new(ProofCache::new()),
            preferred_chain: None,
            max_payment: None,
            on_challenge: None,
            on_payment: None,
        }
    }

    /// Replaces the underlying HTTP client, e.g. to set timeouts or proxies.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Prefer this chain when the server offers it and a provider exists.
    pub fn with_preferred_chain(mut self, chain: ChainId) -> Self {
        self.preferred_chain = Some(chain);
        self
    }

    /// Auto-pay ceiling: challenges asking more than this are refused.
    pub fn with_max_payment(mut self, limit: MoneyAmount) -> Self {
        self.max_payment = Some(limit);
        self
    }

    /// Called with every parsed challenge before any settlement starts.
    pub fn on_challenge<F>(mut self, hook: F) -> Self
    where
        F: Fn(&PaymentChallenge) + Send + Sync + 'static,
    {
        self.on_challenge = Some(Arc::new(hook));
        self
    }

    /// Called with every confirmed payment proof before the replay.
    pub fn on_payment<F>(mut self, hook: F) -> Self
    where
        F: Fn(&PaymentProof) + Send + Sync + 'static,
    {
        self.on_payment = Some(Arc::new(hook));
        self
    }

    pub fn cache(&self) -> &ProofCache {
        &self.cache
    }

    /// Convenience for a plain GET of `url` through [`Self::fetch`].
    pub async fn get(&self, url: impl IntoUrl) -> Result<Response, X402Error> {
        let request = self.http.get(url).build()?;
        self.fetch(request).await
    }

    /// Issues `request`, paying a 402 challenge if one comes back.
    ///
    /// A cached proof for the URL is replayed first; if the server still
    /// answers 402 the stale proof is dropped and a fresh payment runs. A
    /// successful settlement caches its proof before the final replay, so a
    /// replay that fails at the transport level does not lose the payment.
    #[tracing::instrument(skip_all, fields(url = %request.url()))]
    pub async fn fetch(&self, request: Request) -> Result<Response, X402Error> {
        let url = request.url().to_string();

        if let Some(proof) = self.cache.get(&url) {
            let mut replay = clone_request(&request)?;
            replay.headers_mut().extend(proof.header_map()?);
            let response = self.http.execute(replay).await?;
            if response.status() != StatusCode::PAYMENT_REQUIRED {
                return Ok(response);
            }
            tracing::debug!("Cached proof rejected, settling a fresh payment");
            self.cache.remove(&url);
            return self.settle_and_replay(request, response).await;
        }

        let replay = clone_request(&request)?;
        let response = self.http.execute(request).await?;
        if response.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(response);
        }
        self.settle_and_replay(replay, response).await
    }

    /// Picks the challenge option to settle: the preferred chain when the
    /// server offers it, otherwise the first server-listed chain that has a
    /// registered provider.
    pub(crate) fn select_option(&self, challenge: &PaymentChallenge) -> Option<ChallengeOption> {
        if let Some(preferred) = &self.preferred_chain {
            if self.registry.contains(preferred) {
                if let Some(option) = challenge.chains.iter().find(|o| &o.chain == preferred) {
                    return Some(option.clone());
                }
            }
        }
        challenge
            .chains
            .iter()
            .find(|o| self.registry.contains(&o.chain))
            .cloned()
    }

    async fn settle_and_replay(
        &self,
        request: Request,
        response: Response,
    ) -> Result<Response, X402Error> {
        let url = request.url().to_string();
        let body = response.bytes().await?;
        let challenge = challenge::parse(&body).ok_or(X402Error::MalformedChallenge)?;
        if challenge.is_expired(UnixTimestamp::now()) {
            return Err(X402Error::ChallengeExpired);
        }
        if let Some(hook) = &self.on_challenge {
            hook(&challenge);
        }

        let option = self.select_option(&challenge).ok_or_else(|| {
            X402Error::NoSupportedChain {
                offered: challenge.chains.iter().map(|o| o.chain.clone()).collect(),
            }
        })?;
        if let Some(limit) = &self.max_payment {
            if option.amount > *limit {
                return Err(X402Error::AmountExceedsLimit {
                    amount: option.amount,
                    limit: limit.clone(),
                });
            }
        }
        let provider =
            self.registry
                .by_chain(&option.chain)
                .ok_or_else(|| X402Error::NoSupportedChain {
                    offered: vec![option.chain.clone()],
                })?;

        tracing::info!(chain = %option.chain, amount = %option.amount, "Settling payment challenge");
        let tx_ref = provider
            .send_stablecoin(&option.receiver, &option.amount)
            .await?;
        let confirmed = provider.wait_for_confirmation(&tx_ref).await?;
        if !confirmed {
            return Err(X402Error::PaymentNotConfirmed(tx_ref));
        }

        let proof = PaymentProof {
            chain: option.chain,
            receiver: option.receiver,
            amount: option.amount,
            tx_ref,
            nonce: challenge.nonce,
            timestamp: UnixTimestamp::now(),
        };
        if let Some(hook) = &self.on_payment {
            hook(&proof);
        }
        let headers = proof.header_map()?;
        self.cache.put(&url, proof);

        let mut replay = request;
        replay.headers_mut().extend(headers);
        Ok(self.http.execute(replay).await?)
    }
}

fn clone_request(request: &Request) -> Result<Request, X402Error> {
    request.try_clone().ok_or(X402Error::RequestNotCloneable)
}
