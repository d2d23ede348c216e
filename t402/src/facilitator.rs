//! Core trait and error type for x402 payment facilitators.
//!
//! This module provides the unified [`Facilitator`] trait for verifying and
//! settling x402 payments, along with the [`FacilitatorError`] enum covering
//! all failure modes.
//!
//! The trait is dyn-compatible, allowing heterogeneous facilitator instances
//! to be stored in registries and passed as trait objects. All I/O-bound
//! methods return [`BoxFuture`] so the trait stays dyn-compatible.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use t402_proto::{SettleRequest, SettleResponse, VerifyRequest, VerifyResponse};

/// Boxed, `Send` future — the standard dyn-compatible async return type.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur during facilitator operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FacilitatorError {
    /// The payment payload format is invalid or malformed.
    #[error("Invalid payment format: {0}")]
    InvalidFormat(String),

    /// On-chain operation failed (RPC error, transaction reverted, etc.).
    #[error("Onchain error: {0}")]
    OnchainFailure(String),

    /// Failed to reach the facilitator.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Any other error not covered by the specific variants.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl From<serde_json::Error> for FacilitatorError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidFormat(value.to_string())
    }
}

/// Trait defining the asynchronous interface for x402 payment facilitators.
///
/// This is the unified trait for both local scheme handlers and remote
/// facilitator clients. It is dyn-compatible, allowing instances to be
/// stored as `Arc<dyn Facilitator>` and shared between concurrent calls;
/// implementations must be safe for concurrent use.
pub trait Facilitator: Send + Sync {
    /// Verifies a proposed x402 payment payload against the declared
    /// payment requirements.
    ///
    /// This includes checking payload integrity, signature validity,
    /// balance sufficiency, network compatibility, and compliance with the
    /// requirements.
    fn verify(
        &self,
        request: VerifyRequest,
    ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>>;

    /// Executes settlement for a verified payment.
    ///
    /// Implementations should re-validate the payment and, if valid,
    /// perform the settlement. Single-use semantics of a payload across
    /// calls are the facilitator's responsibility (via nonces or the
    /// payment-identifier extension); callers never retry settle.
    fn settle(
        &self,
        request: SettleRequest,
    ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>>;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    fn verify(
        &self,
        request: VerifyRequest,
    ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>> {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: SettleRequest,
    ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>> {
        self.as_ref().settle(request)
    }
}
