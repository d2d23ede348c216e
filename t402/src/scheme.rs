//! Client-side payment scheme system.
//!
//! A [`SchemeClient`] creates signed payment payloads for a specific
//! payment scheme. Clients register scheme implementations in a
//! [`SchemeRegistry`] keyed by network identifier or wildcard pattern
//! (e.g., `"eip155:*"`), and the auto-pay machinery looks them up by the
//! network of the requirement being paid.
//!
//! All I/O-bound methods return [`BoxFuture`] so that traits remain
//! dyn-compatible (required for dynamic scheme registration).

use std::collections::HashMap;

use t402_proto::helpers::matches_network_pattern;
use t402_proto::{Extensions, PaymentPayload, PaymentRequirements, ResourceInfo};

pub use crate::facilitator::BoxFuture;

/// Boxed error type used across scheme trait boundaries.
pub type SchemeError = Box<dyn std::error::Error + Send + Sync>;

/// Client-side payment mechanism for one scheme.
///
/// Implementations produce a full signed [`PaymentPayload`] for the given
/// requirements. Async because signing may involve RPC calls or hardware
/// wallet interactions. Implementations must be safe for concurrent use.
pub trait SchemeClient: Send + Sync {
    /// Payment scheme identifier (e.g., `"exact"`).
    fn scheme(&self) -> &str;

    /// Creates a signed payment payload for the selected requirements.
    ///
    /// `resource` and `extensions` are echoed from the server's 402
    /// advertisement and should be carried into the payload.
    fn create_payment_payload<'a>(
        &'a self,
        requirements: &'a PaymentRequirements,
        resource: Option<&'a ResourceInfo>,
        extensions: Option<&'a Extensions>,
    ) -> BoxFuture<'a, Result<PaymentPayload, SchemeError>>;
}

/// Registry of client-side scheme implementations, keyed by network.
///
/// Keys are either exact CAIP-2 identifiers (`"eip155:84532"`) or wildcard
/// patterns (`"eip155:*"`). Lookup prefers an exact match, then the
/// matching pattern with the longest prefix.
///
/// The registry is populated at startup and only read afterwards, so
/// shared references are safe for concurrent use.
#[derive(Default)]
pub struct SchemeRegistry(HashMap<String, Box<dyn SchemeClient>>);

impl std::fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let networks: Vec<&str> = self.0.keys().map(String::as_str).collect();
        f.debug_tuple("SchemeRegistry").field(&networks).finish()
    }
}

impl SchemeRegistry {
    /// Creates an empty scheme registry.
    #[must_use]
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Registers a scheme client for a network or wildcard pattern.
    ///
    /// A later registration for the same pattern replaces the earlier one.
    pub fn register(
        &mut self,
        network: impl Into<String>,
        client: Box<dyn SchemeClient>,
    ) -> &mut Self {
        self.0.insert(network.into(), client);
        self
    }

    /// Finds the scheme client for a network.
    ///
    /// Tries an exact match first, then falls back to wildcard patterns.
    /// When several patterns match, the longest prefix wins, so
    /// `"eip155:845*"` takes precedence over `"eip155:*"`.
    #[must_use]
    pub fn for_network(&self, network: &str) -> Option<&dyn SchemeClient> {
        if let Some(client) = self.0.get(network) {
            return Some(&**client);
        }

        self.0
            .iter()
            .filter(|(pattern, _)| matches_network_pattern(network, pattern))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, client)| &**client)
    }

    /// Returns `true` if no scheme clients are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubClient(&'static str);

    impl SchemeClient for StubClient {
        fn scheme(&self) -> &str {
            self.0
        }

        fn create_payment_payload<'a>(
            &'a self,
            requirements: &'a PaymentRequirements,
            resource: Option<&'a ResourceInfo>,
            extensions: Option<&'a Extensions>,
        ) -> BoxFuture<'a, Result<PaymentPayload, SchemeError>> {
            let payload = PaymentPayload {
                x402_version: 2,
                accepted: requirements.clone(),
                payload: serde_json::json!({"signature": "0xStub"}),
                resource: resource.cloned(),
                extensions: extensions.cloned(),
            };
            Box::pin(async move { Ok(payload) })
        }
    }

    #[test]
    fn exact_match_beats_wildcard() {
        let mut registry = SchemeRegistry::new();
        registry.register("eip155:*", Box::new(StubClient("wildcard")));
        registry.register("eip155:84532", Box::new(StubClient("exact")));

        let client = registry.for_network("eip155:84532").unwrap();
        assert_eq!(client.scheme(), "exact");
    }

    #[test]
    fn longest_pattern_wins() {
        let mut registry = SchemeRegistry::new();
        registry.register("eip155:*", Box::new(StubClient("short")));
        registry.register("eip155:845*", Box::new(StubClient("long")));

        let client = registry.for_network("eip155:84532").unwrap();
        assert_eq!(client.scheme(), "long");

        let client = registry.for_network("eip155:1").unwrap();
        assert_eq!(client.scheme(), "short");
    }

    #[test]
    fn unmatched_network_returns_none() {
        let mut registry = SchemeRegistry::new();
        registry.register("eip155:*", Box::new(StubClient("evm")));
        assert!(registry.for_network("solana:mainnet").is_none());
    }
}
