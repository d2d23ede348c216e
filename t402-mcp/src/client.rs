//! Client-side MCP x402 payment handling.
//!
//! This module provides [`PaidMcpClient`] which wraps an MCP caller with
//! automatic x402 payment handling. When a tool returns a 402 payment
//! required response, the client builds a payment payload, attaches it to
//! the request `_meta`, and retries exactly once.
//!
//! # Architecture
//!
//! The client uses the [`McpCaller`] trait to abstract over MCP SDK
//! implementations. Payment creation is delegated to
//! [`SchemeClient`](t402::scheme::SchemeClient) instances registered in a
//! [`SchemeRegistry`](t402::scheme::SchemeRegistry) keyed by network
//! identifier or wildcard pattern.

use t402::extensions::payment_identifier;
use t402::facilitator::BoxFuture;
use t402::proto::PaymentRequired;
use t402::scheme::SchemeRegistry;

use crate::PAYMENT_META_KEY;
use crate::error::McpPaymentError;
use crate::extract;
use crate::types::{
    AfterPaymentContext, CallToolParams, CallToolResult, ClientHooks, ClientOptions, NoClientHooks,
    PaidToolCallResult, PaymentRequiredContext,
};

/// Trait abstracting MCP tool call capability.
///
/// Implement this trait to integrate with any MCP SDK. The implementation
/// should forward `call_tool` to the underlying MCP session/client.
///
/// # Examples
///
/// ```rust,ignore
/// struct MyMcpSession { /* ... */ }
///
/// impl McpCaller for MyMcpSession {
///     fn call_tool(
///         &self,
///         params: CallToolParams,
///     ) -> BoxFuture<'_, Result<CallToolResult, McpPaymentError>> {
///         Box::pin(async move {
///             // Forward to actual MCP SDK
///             todo!()
///         })
///     }
/// }
/// ```
pub trait McpCaller: Send + Sync {
    /// Calls an MCP tool with the given parameters.
    fn call_tool(
        &self,
        params: CallToolParams,
    ) -> BoxFuture<'_, Result<CallToolResult, McpPaymentError>>;
}

/// An x402-aware MCP client with automatic payment handling.
///
/// Wraps an [`McpCaller`] with a scheme registry and lifecycle hooks. When
/// a tool returns a 402 payment required response, the client:
///
/// 1. Extracts payment requirements from the error result
/// 2. Consults hooks for a custom payload or approval
/// 3. Builds a payment via the scheme client for `accepts[0].network`
/// 4. Retries once with payment in `_meta`
/// 5. Extracts the settlement response from the result
///
/// Repeated 402s after a paid retry propagate unchanged; the caller
/// decides what to do.
pub struct PaidMcpClient<C: McpCaller> {
    caller: C,
    schemes: SchemeRegistry,
    options: ClientOptions,
    hooks: Box<dyn ClientHooks>,
}

impl<C: McpCaller> std::fmt::Debug for PaidMcpClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaidMcpClient")
            .field("schemes", &self.schemes)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<C: McpCaller> PaidMcpClient<C> {
    /// Creates a builder for configuring a [`PaidMcpClient`].
    pub fn builder(caller: C) -> PaidMcpClientBuilder<C> {
        PaidMcpClientBuilder {
            caller,
            schemes: SchemeRegistry::new(),
            options: ClientOptions::default(),
            hooks: None,
        }
    }

    /// Returns a reference to the underlying MCP caller.
    pub const fn caller(&self) -> &C {
        &self.caller
    }

    /// Calls a tool with automatic x402 payment handling.
    ///
    /// The driver performs **at most one** retry per call: the initial
    /// unpaid attempt, then a single paid attempt if the server demanded
    /// payment.
    ///
    /// # Errors
    ///
    /// Returns [`McpPaymentError`] if the tool call transport fails,
    /// payment creation fails, or a hook aborts the operation.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<PaidToolCallResult, McpPaymentError> {
        let params = CallToolParams {
            name: name.to_owned(),
            arguments: arguments.clone(),
            meta: None,
        };

        let result = self.caller.call_tool(params).await?;

        // Not an error: nothing to pay for. Servers may still attach a
        // receipt to free calls, so the extraction runs regardless.
        if !result.is_error {
            return Ok(build_paid_result(result, false));
        }

        // An error without a parseable 402 body (or with nothing to
        // accept) is an ordinary tool failure; hand it back unchanged.
        let payment_required = match extract::extract_payment_required_from_result(&result) {
            Some(pr) if !pr.accepts.is_empty() => pr,
            _ => return Ok(build_paid_result(result, false)),
        };

        tracing::debug!(
            tool = %name,
            options = payment_required.accepts.len(),
            "Tool requires payment"
        );

        let pr_ctx = PaymentRequiredContext {
            tool_name: name.to_owned(),
            arguments: arguments.clone(),
            payment_required: payment_required.clone(),
        };

        // on_payment_required hook — can supply a custom payment payload.
        if let Some(payload) = self.hooks.on_payment_required(&pr_ctx).await? {
            return self.call_tool_with_payload(name, arguments, payload).await;
        }

        // Auto-payment disabled or declined by the approval hook: the
        // server's 402 goes back to the caller as-is.
        if !self.options.auto_payment || !self.hooks.on_payment_requested(&pr_ctx).await? {
            tracing::debug!(tool = %name, "Payment declined");
            return Ok(build_paid_result(result, false));
        }

        let payload = create_payment(&self.schemes, &payment_required).await?;

        self.call_tool_with_payload(name, arguments, payload).await
    }

    /// Calls a tool with a pre-created payment payload.
    ///
    /// # Errors
    ///
    /// Returns [`McpPaymentError`] if the tool call fails.
    pub async fn call_tool_with_payment(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
        payload: serde_json::Value,
    ) -> Result<PaidToolCallResult, McpPaymentError> {
        self.call_tool_with_payload(name, arguments, payload).await
    }

    /// Fetches payment requirements for a tool without paying.
    ///
    /// Calls the tool and extracts the [`PaymentRequired`] from the error
    /// response, if any.
    ///
    /// # Errors
    ///
    /// Returns [`McpPaymentError`] if the tool call fails.
    pub async fn get_tool_payment_requirements(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Option<PaymentRequired>, McpPaymentError> {
        let params = CallToolParams {
            name: name.to_owned(),
            arguments,
            meta: None,
        };

        let result = self.caller.call_tool(params).await?;
        Ok(extract::extract_payment_required_from_result(&result))
    }

    async fn call_tool_with_payload(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
        payload: serde_json::Value,
    ) -> Result<PaidToolCallResult, McpPaymentError> {
        let mut meta = serde_json::Map::new();
        extract::attach_payment_to_meta(&mut meta, payload.clone());

        let params = CallToolParams {
            name: name.to_owned(),
            arguments,
            meta: Some(meta),
        };

        let result = self.caller.call_tool(params).await?;

        let settle_response = result
            .meta
            .as_ref()
            .and_then(extract::extract_payment_response_from_meta);

        let after_ctx = AfterPaymentContext {
            tool_name: name.to_owned(),
            payment_payload: payload,
            result: result.clone(),
            settle_response,
        };
        // Observational; a failing hook must not lose the paid result.
        if let Err(e) = self.hooks.on_after_payment(&after_ctx).await {
            tracing::debug!(tool = %name, error = %e, "after-payment hook failed");
        }

        Ok(build_paid_result(result, true))
    }
}

/// Builder for configuring a [`PaidMcpClient`].
pub struct PaidMcpClientBuilder<C: McpCaller> {
    caller: C,
    schemes: SchemeRegistry,
    options: ClientOptions,
    hooks: Option<Box<dyn ClientHooks>>,
}

impl<C: McpCaller> std::fmt::Debug for PaidMcpClientBuilder<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaidMcpClientBuilder")
            .field("schemes", &self.schemes)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<C: McpCaller> PaidMcpClientBuilder<C> {
    /// Registers a payment scheme client for a network or wildcard pattern
    /// (e.g., `"eip155:84532"` or `"eip155:*"`).
    #[must_use]
    pub fn scheme(
        mut self,
        network: impl Into<String>,
        client: Box<dyn t402::scheme::SchemeClient>,
    ) -> Self {
        self.schemes.register(network, client);
        self
    }

    /// Sets client options.
    #[must_use]
    pub const fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Enables or disables automatic payment handling.
    #[must_use]
    pub const fn auto_payment(mut self, enabled: bool) -> Self {
        self.options.auto_payment = enabled;
        self
    }

    /// Sets lifecycle hooks for payment events.
    #[must_use]
    pub fn hooks(mut self, hooks: Box<dyn ClientHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Builds the configured [`PaidMcpClient`].
    ///
    /// # Panics
    ///
    /// Panics if no scheme clients have been registered.
    #[must_use]
    pub fn build(self) -> PaidMcpClient<C> {
        assert!(
            !self.schemes.is_empty(),
            "at least one scheme client must be registered"
        );
        PaidMcpClient {
            caller: self.caller,
            schemes: self.schemes,
            options: self.options,
            hooks: self.hooks.unwrap_or_else(|| Box::new(NoClientHooks)),
        }
    }
}

/// Standalone function to make a paid MCP tool call.
///
/// This is a convenience function for simple use cases where you don't
/// need the full [`PaidMcpClient`] builder. It calls the tool, detects 402
/// responses, creates a payment from the first accepted requirement, and
/// retries once.
///
/// # Errors
///
/// Returns [`McpPaymentError`] if the transport fails or no registered
/// scheme client matches the advertised network.
pub async fn call_paid_tool(
    caller: &dyn McpCaller,
    schemes: &SchemeRegistry,
    name: &str,
    arguments: serde_json::Map<String, serde_json::Value>,
) -> Result<PaidToolCallResult, McpPaymentError> {
    // First call without payment
    let params = CallToolParams {
        name: name.to_owned(),
        arguments: arguments.clone(),
        meta: None,
    };

    let result = caller.call_tool(params).await?;

    if !result.is_error {
        return Ok(build_paid_result(result, false));
    }

    let payment_required = match extract::extract_payment_required_from_result(&result) {
        Some(pr) if !pr.accepts.is_empty() => pr,
        _ => return Ok(build_paid_result(result, false)),
    };

    let payload = create_payment(schemes, &payment_required).await?;

    // Retry once with payment in _meta
    let mut meta = serde_json::Map::new();
    extract::attach_payment_to_meta(&mut meta, payload);

    let params = CallToolParams {
        name: name.to_owned(),
        arguments,
        meta: Some(meta),
    };

    let result = caller.call_tool(params).await?;
    Ok(build_paid_result(result, true))
}

/// Builds a payment payload for the first advertised requirement.
///
/// Selects the scheme client registered for the requirement's network and,
/// when the server advertised the payment-identifier extension, merges a
/// generated id into the echoed extensions before signing.
async fn create_payment(
    schemes: &SchemeRegistry,
    payment_required: &PaymentRequired,
) -> Result<serde_json::Value, McpPaymentError> {
    let selected = &payment_required.accepts[0];

    let client = schemes
        .for_network(&selected.network)
        .ok_or(McpPaymentError::NoMatchingPaymentOption)?;

    let mut extensions = payment_required.extensions.clone();
    if let Some(ext) = extensions.as_mut() {
        payment_identifier::append_payment_id(ext, None)?;
    }

    let payload = client
        .create_payment_payload(
            selected,
            Some(&payment_required.resource),
            extensions.as_ref(),
        )
        .await
        .map_err(|e| McpPaymentError::PaymentCreationFailed(e.to_string()))?;

    Ok(serde_json::to_value(payload)?)
}

/// Converts a [`CallToolResult`] into a [`PaidToolCallResult`].
fn build_paid_result(result: CallToolResult, payment_made: bool) -> PaidToolCallResult {
    let payment_response = result
        .meta
        .as_ref()
        .and_then(extract::extract_payment_response_from_meta);

    PaidToolCallResult {
        content: result.content.clone(),
        is_error: result.is_error,
        payment_response,
        payment_made,
        raw_result: result,
    }
}
