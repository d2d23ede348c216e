//! MCP (Model Context Protocol) integration for the x402 payment protocol.
//!
//! This crate enables paid tool calls in MCP servers and automatic payment
//! handling in MCP clients, following the x402 payment protocol
//! specification.
//!
//! # Architecture
//!
//! The crate provides framework-agnostic types and utilities that work with
//! any MCP SDK implementation via [`serde_json::Value`]-based interfaces.
//! Payment data rides in the `_meta` side channel of tool calls and results;
//! no transport headers are used.
//!
//! # Server Usage
//!
//! Wrap tool handlers with payment verification and settlement:
//!
//! ```rust,ignore
//! use t402_mcp::server::{PaymentWrapper, PaymentWrapperConfig};
//!
//! let wrapper = PaymentWrapper::new(facilitator, PaymentWrapperConfig {
//!     accepts: vec![payment_requirements],
//!     ..Default::default()
//! });
//!
//! // Process tool calls with automatic payment enforcement
//! let result = wrapper.process(request, |req| async { handle_tool(req).await }).await?;
//! ```
//!
//! # Client Usage
//!
//! Wrap an MCP session with automatic x402 payment handling:
//!
//! ```rust,ignore
//! use t402_mcp::client::PaidMcpClient;
//!
//! let client = PaidMcpClient::builder(my_mcp_caller)
//!     .scheme("eip155:*", evm_scheme_client)
//!     .build();
//!
//! // Tool calls automatically handle 402 payment flows
//! let result = client.call_tool("get_weather", args).await?;
//! ```
//!
//! # Utility Functions
//!
//! The [`extract`] module provides low-level helpers for working with
//! x402 payment data in MCP `_meta` fields:
//!
//! - [`extract::extract_payment_from_meta`] - Extract payment payload from request meta
//! - [`extract::attach_payment_to_meta`] - Attach payment payload to request meta
//! - [`extract::extract_payment_response_from_meta`] - Extract settlement response from result meta
//! - [`extract::extract_payment_required_from_result`] - Extract 402 info from error results

pub mod client;
pub mod error;
pub mod extract;
pub mod server;
pub mod types;

/// MCP `_meta` key for sending payment payloads (client → server).
pub const PAYMENT_META_KEY: &str = "x402/payment";

/// MCP `_meta` key for settlement responses (server → client).
pub const PAYMENT_RESPONSE_META_KEY: &str = "x402/payment-response";
