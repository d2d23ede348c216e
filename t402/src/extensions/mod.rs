//! Namespaced x402 protocol extensions.
//!
//! Extensions ride in the `extensions` map of `PaymentRequired` and
//! `PaymentPayload` wire types under well-known keys. Each submodule is a
//! self-contained extension implementation.

pub mod payment_identifier;
