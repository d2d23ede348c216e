//! Wire format types for the x402 payment protocol.
//!
//! This crate defines the serialization-level data structures exchanged
//! between buyers, resource servers, and facilitators in the V2 (current)
//! protocol format. It has minimal dependencies (only `serde` and
//! `serde_json`) and is intended to be the shared "lingua franca" across
//! the entire t402 stack.
//!
//! # Modules
//!
//! - [`v2`] — Protocol types (`PaymentRequirements`, `PaymentPayload`, `PaymentRequired`, etc.)
//! - [`responses`] — Facilitator responses (`VerifyResponse`, `SettleResponse`)
//! - [`helpers`] — Version detection, parsing, and network pattern matching
//! - [`split`] — Recipient configuration for the `split` payment scheme

use std::collections::HashMap;

pub mod helpers;
pub mod responses;
pub mod split;
pub mod v2;

pub use responses::{SettleResponse, VerifyResponse};
pub use v2::{
    PaymentPayload, PaymentRequired, PaymentRequirements, ResourceInfo, SettleRequest,
    VerifyRequest,
};

/// Current protocol version.
pub const X402_VERSION: u32 = 2;

/// CAIP-2 format network identifier (e.g., `"eip155:8453"`, `"solana:mainnet"`).
pub type Network = String;

/// Protocol extension data attached to various x402 wire types.
///
/// Keys are extension names; values are arbitrary JSON data specific to
/// each extension.
pub type Extensions = HashMap<String, serde_json::Value>;

/// Errors that can occur when parsing x402 protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The `x402Version` field is missing from the JSON data.
    #[error("missing x402Version field")]
    MissingVersion,

    /// The `x402Version` field has an unsupported value.
    #[error("invalid x402Version: {0}")]
    InvalidVersion(u64),

    /// A required field is missing from the JSON data.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// JSON deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
