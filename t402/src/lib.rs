//! x402 Payment Protocol SDK core.
//!
//! This crate provides the core traits and abstractions for the x402
//! payment protocol. It re-exports all wire format types from
//! [`t402_proto`] and adds:
//!
//! - [`facilitator`] — The [`Facilitator`](facilitator::Facilitator) trait
//!   for verifying and settling payments
//! - [`scheme`] — The client-side [`SchemeClient`](scheme::SchemeClient)
//!   trait and network-keyed [`SchemeRegistry`](scheme::SchemeRegistry)
//! - [`extensions`] — Namespaced protocol extensions
//!   (currently `payment-identifier`)

pub mod extensions;
pub mod facilitator;
pub mod scheme;

/// Re-export all wire format types from `t402-proto`.
pub use t402_proto as proto;
pub use t402_proto::*;
