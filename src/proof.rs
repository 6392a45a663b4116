//! Payment proofs and the per-URL proof cache.
//!
//! After a settlement confirms, the client replays the request with a set of
//! `X-Payment-*` headers describing the on-chain transfer. The proof is also
//! cached against the request URL so repeated fetches within the cache window
//! do not pay twice.

use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use std::time::Duration;

use crate::chain::{ChainId, TxRef};
use crate::timestamp::UnixTimestamp;
use crate::util::MoneyAmount;

pub const HEADER_PAYMENT_CHAIN: &str = "x-payment-chain";
pub const HEADER_PAYMENT_TXHASH: &str = "x-payment-txhash";
pub const HEADER_PAYMENT_AMOUNT: &str = "x-payment-amount";
pub const HEADER_PAYMENT_NONCE: &str = "x-payment-nonce";
pub const HEADER_PAYMENT_TIMESTAMP: &str = "x-payment-timestamp";

/// How long a cached proof stays valid for replay.
pub const PROOF_TTL: Duration = Duration::from_secs(3600);

/// Everything the server needs to verify a settled payment.
#[derive(Debug, Clone)]
pub struct PaymentProof {
    pub chain: ChainId,
    pub receiver: String,
    pub amount: MoneyAmount,
    pub tx_ref: TxRef,
    pub nonce: String,
    pub timestamp: UnixTimestamp,
}

impl PaymentProof {
    /// Renders the proof as request headers.
    pub fn header_map(&self) -> Result<HeaderMap, InvalidHeaderValue> {
        let mut headers = HeaderMap::with_capacity(5);
        headers.insert(
            HeaderName::from_static(HEADER_PAYMENT_CHAIN),
            HeaderValue::from_str(self.chain.as_str())?,
        );
        headers.insert(
            HeaderName::from_static(HEADER_PAYMENT_TXHASH),
            HeaderValue::from_str(self.tx_ref.as_str())?,
        );
        headers.insert(
            HeaderName::from_static(HEADER_PAYMENT_AMOUNT),
            HeaderValue::from_str(&self.amount.to_string())?,
        );
        headers.insert(
            HeaderName::from_static(HEADER_PAYMENT_NONCE),
            HeaderValue::from_str(&self.nonce)?,
        );
        headers.insert(
            HeaderName::from_static(HEADER_PAYMENT_TIMESTAMP),
            HeaderValue::from_str(&self.timestamp.to_string())?,
        );
        Ok(headers)
    }
}

/// Concurrent map from request URL to a proof and when it was stored.
///
/// Eviction is lazy: an entry past [`PROOF_TTL`] is removed on the lookup
/// that finds it stale. Concurrent payments for the same URL are allowed to
/// race; the last completed write wins, which at worst caches the fresher of
/// two valid proofs.
#[derive(Debug, Default)]
pub struct ProofCache {
    entries: DashMap<String, (PaymentProof, UnixTimestamp)>,
}

impl ProofCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, url: impl Into<String>, proof: PaymentProof) {
        self.put_at(url, proof, UnixTimestamp::now());
    }

    pub(crate) fn put_at(&self, url: impl Into<String>, proof: PaymentProof, at: UnixTimestamp) {
        self.entries.insert(url.into(), (proof, at));
    }

    /// Looks up a live proof for `url`, evicting it if the TTL has lapsed.
    pub fn get(&self, url: &str) -> Option<PaymentProof> {
        self.get_at(url, UnixTimestamp::now())
    }

    fn get_at(&self, url: &str, now: UnixTimestamp) -> Option<PaymentProof> {
        let stale = match self.entries.get(url) {
            None => return None,
            Some(entry) => {
                let (proof, stored_at) = entry.value();
                if now.seconds_since(*stored_at) < PROOF_TTL.as_secs() {
                    return Some(proof.clone());
                }
                true
            }
        };
        if stale {
            self.entries.remove(url);
        }
        None
    }

    pub fn remove(&self, url: &str) {
        self.entries.remove(url);
    }

    /// Snapshot of every live cached proof. Entries past the TTL are skipped,
    /// so the snapshot never contains a proof [`Self::get`] would refuse.
    pub fn values(&self) -> Vec<PaymentProof> {
        self.values_at(UnixTimestamp::now())
    }

    fn values_at(&self, now: UnixTimestamp) -> Vec<PaymentProof> {
        self.entries
            .iter()
            .filter(|entry| now.seconds_since(entry.value().1) < PROOF_TTL.as_secs())
            .map(|entry| entry.value().0.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_proof() -> PaymentProof {
        PaymentProof {
            chain: ChainId::from("base"),
            receiver: "0xRecv".to_string(),
            amount: MoneyAmount::parse("0.50").unwrap(),
            tx_ref: TxRef::new("0xabc123"),
            nonce: "nonce-1".to_string(),
            timestamp: UnixTimestamp::from_secs(1699999000),
        }
    }

    #[test]
    fn renders_all_five_headers() {
        let headers = sample_proof().header_map().unwrap();
        assert_eq!(headers.len(), 5);
        assert_eq!(headers[HEADER_PAYMENT_CHAIN], "base");
        assert_eq!(headers[HEADER_PAYMENT_TXHASH], "0xabc123");
        assert_eq!(headers[HEADER_PAYMENT_AMOUNT], "0.5");
        assert_eq!(headers[HEADER_PAYMENT_NONCE], "nonce-1");
        assert_eq!(headers[HEADER_PAYMENT_TIMESTAMP], "1699999000");
    }

    #[test]
    fn cache_returns_live_entry() {
        let cache = ProofCache::new();
        cache.put("https://api.example/data", sample_proof());
        let hit = cache.get("https://api.example/data").unwrap();
        assert_eq!(hit.tx_ref, TxRef::new("0xabc123"));
        assert!(cache.get("https://api.example/other").is_none());
    }

    #[test]
    fn cache_evicts_expired_entry_on_lookup() {
        let cache = ProofCache::new();
        let stored_at = UnixTimestamp::from_secs(1_000_000);
        cache.put_at("https://api.example/data", sample_proof(), stored_at);

        let just_inside = stored_at + (PROOF_TTL.as_secs() - 1);
        assert!(cache.get_at("https://api.example/data", just_inside).is_some());

        let past_ttl = stored_at + PROOF_TTL.as_secs();
        assert!(cache.get_at("https://api.example/data", past_ttl).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn values_snapshots_cached_proofs() {
        let cache = ProofCache::new();
        cache.put("https://api.example/a", sample_proof());
        cache.put("https://api.example/b", sample_proof());
        assert_eq!(cache.values().len(), 2);
        cache.clear();
        assert!(cache.values().is_empty());
    }

    #[test]
    fn values_skips_expired_entries() {
        let cache = ProofCache::new();
        let stored_at = UnixTimestamp::from_secs(1_000_000);
        cache.put_at("https://api.example/old", sample_proof(), stored_at);
        cache.put_at(
            "https://api.example/fresh",
            sample_proof(),
            stored_at + PROOF_TTL.as_secs(),
        );

        let now = stored_at + PROOF_TTL.as_secs();
        let live = cache.values_at(now);
        assert_eq!(live.len(), 1);
        assert!(cache.get_at("https://api.example/old", now).is_none());
        assert!(cache.get_at("https://api.example/fresh", now).is_some());
    }

    #[test]
    fn last_write_wins_for_same_url() {
        let cache = ProofCache::new();
        cache.put("https://api.example/data", sample_proof());
        let mut fresher = sample_proof();
        fresher.tx_ref = TxRef::new("0xdef456");
        cache.put("https://api.example/data", fresher);
        assert_eq!(
            cache.get("https://api.example/data").unwrap().tx_ref,
            TxRef::new("0xdef456")
        );
        assert_eq!(cache.len(), 1);
    }
}
