//! Wire format of the payment challenge a server attaches to an HTTP 402
//! response body.
//!
//! The body is JSON with a single `x402` envelope field:
//!
//! ```json
//! {
//!   "x402": {
//!     "chains": [
//!       { "chain": "base", "receiver": "0xRecv...", "amount": "0.50" }
//!     ],
//!     "nonce": "d6e1...",
//!     "expires": "1699999999"
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::timestamp::UnixTimestamp;
use crate::util::MoneyAmount;

/// One way the server is willing to be paid: a chain, a receiving address on
/// that chain, and the price on that chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeOption {
    pub chain: ChainId,
    pub receiver: String,
    pub amount: MoneyAmount,
}

/// A parsed 402 challenge. `chains` is ordered by server preference; `nonce`
/// ties a later payment proof back to this specific challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentChallenge {
    pub chains: Vec<ChallengeOption>,
    pub nonce: String,
    pub expires: UnixTimestamp,
}

impl PaymentChallenge {
    pub fn is_expired(&self, now: UnixTimestamp) -> bool {
        self.expires <= now
    }
}

#[derive(Debug, Deserialize)]
struct ChallengeEnvelope {
    x402: PaymentChallenge,
}

/// Parses a 402 response body into a challenge.
///
/// Returns `None` for anything that is not a usable challenge: a body that is
/// not JSON, JSON without the `x402` field, a malformed challenge object, or
/// a challenge offering no chains at all.
pub fn parse(body: &[u8]) -> Option<PaymentChallenge> {
    let envelope: ChallengeEnvelope = serde_json::from_slice(body).ok()?;
    if envelope.x402.chains.is_empty() {
        return None;
    }
    Some(envelope.x402)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge_body() -> &'static str {
        r#"{
            "x402": {
                "chains": [
                    { "chain": "base", "receiver": "0xRecv", "amount": "0.50" },
                    { "chain": "solana", "receiver": "SoRecv", "amount": "0.49" }
                ],
                "nonce": "abc123",
                "expires": "1699999999"
            }
        }"#
    }

    #[test]
    fn parses_well_formed_challenge() {
        let challenge = parse(challenge_body().as_bytes()).unwrap();
        assert_eq!(challenge.chains.len(), 2);
        assert_eq!(challenge.chains[0].chain, ChainId::from("base"));
        assert_eq!(challenge.chains[0].receiver, "0xRecv");
        assert_eq!(challenge.chains[0].amount.to_string(), "0.5");
        assert_eq!(challenge.nonce, "abc123");
        assert_eq!(challenge.expires, UnixTimestamp::from_secs(1699999999));
    }

    #[test]
    fn accepts_numeric_expiry() {
        let body = r#"{"x402":{"chains":[{"chain":"base","receiver":"0xR","amount":"1"}],"nonce":"n","expires":1699999999}}"#;
        let challenge = parse(body.as_bytes()).unwrap();
        assert_eq!(challenge.expires, UnixTimestamp::from_secs(1699999999));
    }

    #[test]
    fn rejects_non_json_body() {
        assert!(parse(b"payment required, please").is_none());
    }

    #[test]
    fn rejects_body_without_envelope() {
        assert!(parse(br#"{"error": "payment required"}"#).is_none());
    }

    #[test]
    fn rejects_empty_chain_list() {
        let body = r#"{"x402":{"chains":[],"nonce":"n","expires":"1699999999"}}"#;
        assert!(parse(body.as_bytes()).is_none());
    }

    #[test]
    fn expiry_comparison_is_inclusive() {
        let challenge = parse(challenge_body().as_bytes()).unwrap();
        assert!(challenge.is_expired(UnixTimestamp::from_secs(1699999999)));
        assert!(challenge.is_expired(UnixTimestamp::from_secs(1700000000)));
        assert!(!challenge.is_expired(UnixTimestamp::from_secs(1699999998)));
    }
}
