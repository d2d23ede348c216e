//! HTTP client for remote x402 payment facilitators.
//!
//! This crate provides [`FacilitatorClient`], a [`t402::facilitator::Facilitator`]
//! implementation that talks to a remote facilitator over HTTP. It handles
//! the `POST /verify` and `POST /settle` endpoints and is safe for
//! concurrent use (reqwest's pooled client underneath).

mod facilitator;

pub use facilitator::{FacilitatorClient, FacilitatorClientError};
