//! Error types for MCP x402 payment integration.

use t402::extensions::payment_identifier::PaymentIdError;
use t402::facilitator::FacilitatorError;

/// Errors that can occur during MCP x402 payment operations.
///
/// Payment failures the protocol expresses as 402 tool results (missing
/// payment, failed verification, failed settlement) are *not* errors at
/// this level — the wrapper and driver return them as
/// [`CallToolResult`](crate::types::CallToolResult) values. This type
/// covers the paths that genuinely abort a call: transport failures, hook
/// aborts, and payment construction problems.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum McpPaymentError {
    /// The tool call itself failed (non-payment error).
    #[error("Tool call failed: {0}")]
    ToolCallFailed(String),

    /// No scheme client is registered for the advertised network.
    #[error("No matching payment option found")]
    NoMatchingPaymentOption,

    /// Failed to create a payment payload.
    #[error("Failed to create payment: {0}")]
    PaymentCreationFailed(String),

    /// A lifecycle hook aborted the operation.
    #[error("Operation aborted: {0}")]
    Aborted(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error from the facilitator layer.
    #[error(transparent)]
    Facilitator(#[from] FacilitatorError),

    /// A payment-identifier failed validation.
    #[error(transparent)]
    PaymentId(#[from] PaymentIdError),
}
