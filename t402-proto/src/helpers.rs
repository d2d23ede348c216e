//! Utility functions for the x402 protocol.
//!
//! Provides version detection, payload parsing, and network pattern
//! matching utilities used across the protocol stack.

use serde_json::Value;

use crate::v2::{PaymentPayload, PaymentRequired};
use crate::{Network, ProtocolError, X402_VERSION};

/// Extracts the `x402Version` field from JSON data.
///
/// # Errors
///
/// Returns [`ProtocolError::MissingVersion`] if the field is absent.
/// Returns [`ProtocolError::InvalidVersion`] if the value is not a supported
/// version.
pub fn detect_version(data: &Value) -> Result<u32, ProtocolError> {
    let version = data
        .get("x402Version")
        .ok_or(ProtocolError::MissingVersion)?;

    let version = version.as_u64().ok_or(ProtocolError::InvalidVersion(0))?;

    if version == u64::from(X402_VERSION) {
        Ok(X402_VERSION)
    } else {
        Err(ProtocolError::InvalidVersion(version))
    }
}

/// Parses a 402 response body from JSON data.
///
/// # Errors
///
/// Returns [`ProtocolError`] on parse failure or version mismatch.
pub fn parse_payment_required(data: &Value) -> Result<PaymentRequired, ProtocolError> {
    detect_version(data)?;
    Ok(serde_json::from_value(data.clone())?)
}

/// Parses a payment payload from JSON data.
///
/// # Errors
///
/// Returns [`ProtocolError`] on parse failure or version mismatch.
pub fn parse_payment_payload(data: &Value) -> Result<PaymentPayload, ProtocolError> {
    detect_version(data)?;
    Ok(serde_json::from_value(data.clone())?)
}

/// Checks if a network matches a pattern (supports wildcards).
///
/// Patterns ending with `*` match any reference sharing the prefix, so
/// `"eip155:*"` matches `"eip155:84532"`.
#[must_use]
pub fn matches_network_pattern(network: &str, pattern: &str) -> bool {
    pattern
        .strip_suffix('*')
        .map_or_else(|| pattern == network, |prefix| network.starts_with(prefix))
}

/// Returns the CAIP-2 namespace of a network identifier.
///
/// For `"eip155:84532"` this is `"eip155"`. A bare name without a colon is
/// returned unchanged.
#[must_use]
pub fn network_namespace(network: &Network) -> &str {
    network.split(':').next().unwrap_or(network)
}

/// Checks if a payment payload matches the given requirements on the
/// protocol-critical fields: scheme, network, amount, asset, and `payTo`.
///
/// `maxTimeoutSeconds` and `extra` are deliberately ignored to avoid
/// false-negative rejections when facilitator enrichment adds
/// scheme-specific metadata.
#[must_use]
pub fn match_payload_to_requirements(payload: &Value, requirements: &Value) -> bool {
    let Some(accepted) = payload.get("accepted") else {
        return false;
    };
    accepted.get("scheme") == requirements.get("scheme")
        && accepted.get("network") == requirements.get("network")
        && accepted.get("amount") == requirements.get("amount")
        && accepted.get("asset") == requirements.get("asset")
        && accepted.get("payTo") == requirements.get("payTo")
}
