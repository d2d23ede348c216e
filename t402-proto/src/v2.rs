//! V2 payment types for the x402 protocol.
//!
//! These types use CAIP-2 chain IDs (e.g., `"eip155:84532"`) and carry
//! resource metadata in a dedicated [`ResourceInfo`] struct. All types
//! serialize to JSON with camelCase field names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Extensions, Network};

/// Metadata about the resource being paid for.
///
/// Provides human-readable information about what the buyer is paying for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// URL of the resource (e.g., `"mcp://tool/get_weather"`).
    pub url: String,

    /// Human-readable description of the resource.
    pub description: String,

    /// MIME type of the resource content.
    pub mime_type: String,
}

/// Payment requirements set by the seller.
///
/// Defines the terms under which a payment will be accepted. Immutable
/// once constructed; the server advertises a list of these and uses the
/// first entry for verification and settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme identifier (e.g., `"exact"`, `"split"`).
    pub scheme: String,

    /// CAIP-2 network identifier (e.g., `"eip155:84532"`).
    pub network: Network,

    /// Payment amount in the smallest unit of the asset.
    pub amount: String,

    /// Recipient address.
    pub pay_to: String,

    /// Asset address/identifier.
    pub asset: String,

    /// Maximum time in seconds for payment validity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,

    /// Additional scheme-specific data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// 402 Payment Required response body.
///
/// Returned when a resource requires payment. Contains the ordered list of
/// acceptable payment methods and resource metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (always 2).
    #[serde(default = "default_v2")]
    pub x402_version: u32,

    /// Human-readable error message explaining why payment is required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Information about the resource being paid for.
    pub resource: ResourceInfo,

    /// List of acceptable payment methods, in server preference order.
    pub accepts: Vec<PaymentRequirements>,

    /// Optional protocol extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

/// A signed payment authorization from the buyer.
///
/// The payload includes the accepted requirements, allowing the facilitator
/// to verify that the buyer agreed to specific terms. Built by the client,
/// carried in a single tool call, consumed once by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version (always 2).
    #[serde(default = "default_v2")]
    pub x402_version: u32,

    /// The payment requirements the buyer accepted.
    pub accepted: PaymentRequirements,

    /// The scheme-specific signed payload.
    pub payload: Value,

    /// Information about the resource being paid for, echoed from the 402.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,

    /// Optional protocol extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

impl PaymentPayload {
    /// Returns the payment scheme of the accepted requirements.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.accepted.scheme
    }

    /// Returns the network of the accepted requirements.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.accepted.network
    }
}

/// Request to verify a payment before settlement.
///
/// Sent by a resource server to a facilitator. The payload is kept as raw
/// JSON: the facilitator is the authority on its scheme-specific shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Protocol version (always 2).
    #[serde(default = "default_v2")]
    pub x402_version: u32,

    /// The payment payload to verify.
    pub payment_payload: Value,

    /// The requirements to verify against.
    pub payment_requirements: PaymentRequirements,
}

impl VerifyRequest {
    /// Creates a verification request from a raw payload and requirements.
    #[must_use]
    pub fn new(payment_payload: Value, payment_requirements: PaymentRequirements) -> Self {
        Self {
            x402_version: crate::X402_VERSION,
            payment_payload,
            payment_requirements,
        }
    }
}

/// Request to settle a verified payment.
///
/// Structurally identical to [`VerifyRequest`] on the wire, but represented
/// as a distinct type so the compiler can prevent accidental misuse. Use
/// `From<VerifyRequest>` to convert a verified request into a settle request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    /// Protocol version (always 2).
    #[serde(default = "default_v2")]
    pub x402_version: u32,

    /// The payment payload to settle.
    pub payment_payload: Value,

    /// The requirements for settlement.
    pub payment_requirements: PaymentRequirements,
}

impl From<VerifyRequest> for SettleRequest {
    fn from(request: VerifyRequest) -> Self {
        Self {
            x402_version: request.x402_version,
            payment_payload: request.payment_payload,
            payment_requirements: request.payment_requirements,
        }
    }
}

const fn default_v2() -> u32 {
    2
}
