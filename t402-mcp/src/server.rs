//! Server-side MCP x402 payment wrapper.
//!
//! This module provides [`PaymentWrapper`] which wraps MCP tool handlers
//! with automatic x402 payment verification and settlement.
//!
//! # Flow
//!
//! 1. Extract `x402/payment` from request `_meta`
//! 2. If no payment, return a 402 payment required result
//! 3. Verify payment via facilitator
//! 4. `on_before_execution` hook (can abort)
//! 5. Execute the original handler
//! 6. `on_after_execution` hook
//! 7. Settle payment via facilitator
//! 8. `on_after_settlement` hook
//! 9. Return the result with settlement info in `_meta`
//!
//! Settlement runs after the handler so buyers are not charged for failed
//! work, but before the result reaches the client so the receipt is
//! attached atomically. Verification runs before the handler so no free
//! work is done on bad payment.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use t402::extensions::payment_identifier::{self, PAYMENT_IDENTIFIER};
use t402::facilitator::Facilitator;
use t402::proto::{Extensions, PaymentRequired, ResourceInfo, VerifyRequest, X402_VERSION};

use crate::error::McpPaymentError;
use crate::extract::{self, tool_resource_url};
use crate::types::{
    AfterExecutionContext, CallToolParams, CallToolResult, ContentItem, NoServerHooks,
    PaymentWrapperConfig, ServerHookContext, ServerHooks, SettlementContext,
};

/// Wraps MCP tool handlers with x402 payment verification and settlement.
///
/// The wrapper intercepts tool call requests, enforces payment, and manages
/// the full verify → execute → settle lifecycle. It holds no per-call
/// state, so one instance serves any number of overlapping calls.
///
/// # Examples
///
/// ```rust,ignore
/// let wrapper = PaymentWrapper::new(facilitator, PaymentWrapperConfig {
///     accepts: vec![payment_requirements],
///     ..Default::default()
/// });
///
/// let result = wrapper.process(request, |req| async {
///     Ok(CallToolResult { content: vec![ContentItem::text("ok")], ..Default::default() })
/// }).await?;
/// ```
pub struct PaymentWrapper {
    facilitator: Arc<dyn Facilitator>,
    config: PaymentWrapperConfig,
}

impl std::fmt::Debug for PaymentWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentWrapper")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PaymentWrapper {
    /// Creates a new payment wrapper.
    ///
    /// # Panics
    ///
    /// Panics if `config.accepts` is empty.
    pub fn new(facilitator: Arc<dyn Facilitator>, config: PaymentWrapperConfig) -> Self {
        assert!(
            !config.accepts.is_empty(),
            "PaymentWrapperConfig.accepts must have at least one payment requirement"
        );
        Self {
            facilitator,
            config,
        }
    }

    /// Processes a tool call request with payment enforcement.
    ///
    /// The `handler` closure is called only after payment verification
    /// succeeds and the before-execution hook approves. Settlement occurs
    /// after the handler returns a successful result.
    ///
    /// Payment failures are returned as `Ok` results with `is_error: true`
    /// (following the MCP convention of tool errors, not transport errors).
    ///
    /// # Errors
    ///
    /// Handler and hook errors are not caught; they propagate to the
    /// transport. Settlement is skipped in both cases.
    pub async fn process<H, Fut>(
        &self,
        request: CallToolParams,
        handler: H,
    ) -> Result<CallToolResult, McpPaymentError>
    where
        H: FnOnce(CallToolParams) -> Fut,
        Fut: Future<Output = Result<CallToolResult, McpPaymentError>>,
    {
        let tool_name = request.name.clone();

        // Extract payment from _meta; malformed values read as absent so
        // garbage meta degrades to a 402 advertisement.
        let payment_data = request
            .meta
            .as_ref()
            .and_then(extract::extract_payment_from_meta);

        let Some(payment_value) = payment_data else {
            tracing::debug!(tool = %tool_name, "No payment in request meta");
            return Ok(self.payment_required_result(&tool_name, "Payment required to access this tool"));
        };

        // Enforce the payment-identifier extension before spending a
        // facilitator round trip, when this tool declared it as required.
        if self.requires_payment_id()
            && let Err(e) = validate_payload_payment_id(&payment_value)
        {
            tracing::debug!(tool = %tool_name, error = %e, "Payment identifier rejected");
            return Ok(self.payment_required_result(&tool_name, &e.to_string()));
        }

        // Verify payment against the authoritative first requirement.
        let requirements = &self.config.accepts[0];
        let verify_request = VerifyRequest::new(payment_value.clone(), requirements.clone());

        let verify_response = match self.facilitator.verify(verify_request.clone()).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(tool = %tool_name, error = %e, "Facilitator verify failed");
                return Ok(self
                    .payment_required_result(&tool_name, &format!("Payment verification error: {e}")));
            }
        };

        if !verify_response.is_valid {
            let reason = verify_response
                .invalid_reason
                .as_deref()
                .unwrap_or("Payment verification failed");
            tracing::debug!(tool = %tool_name, reason, "Payment rejected by facilitator");
            return Ok(self.payment_required_result(&tool_name, reason));
        }

        let hooks = self.hooks();
        let hook_ctx = ServerHookContext {
            tool_name: tool_name.clone(),
            arguments: request.arguments.clone(),
            payment_requirements: requirements.clone(),
            payment_payload: payment_value,
        };

        if !hooks.on_before_execution(&hook_ctx).await? {
            tracing::debug!(tool = %tool_name, "Execution blocked by before-execution hook");
            return Ok(self.payment_required_result(&tool_name, "Execution blocked by hook"));
        }

        // Execute the original handler. Errors propagate; settlement is
        // skipped, same as an error result.
        let result = handler(request).await?;

        // The after-execution hook observes every handler result, error
        // results included.
        hooks
            .on_after_execution(&AfterExecutionContext {
                server_ctx: hook_ctx.clone(),
                result: result.clone(),
            })
            .await?;

        if result.is_error {
            return Ok(result);
        }

        // Settle. A failure after successful work is reported as a 402 to
        // signal non-delivery; the SettleResponse itself is never embedded
        // in the failure body, which would trigger client pay-retry loops.
        let settle_response = match self.facilitator.settle(verify_request.into()).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(tool = %tool_name, error = %e, "Facilitator settle failed");
                return Ok(self
                    .payment_required_result(&tool_name, &format!("Payment settlement failed: {e}")));
            }
        };

        if !settle_response.success {
            let reason = settle_response.error_reason.as_deref().unwrap_or("unknown");
            tracing::warn!(tool = %tool_name, reason, "Settlement rejected by facilitator");
            return Ok(self
                .payment_required_result(&tool_name, &format!("Payment settlement failed: {reason}")));
        }

        hooks
            .on_after_settlement(&SettlementContext {
                server_ctx: hook_ctx,
                settlement: settle_response.clone(),
            })
            .await?;

        // Attach the receipt, preserving any meta the handler set.
        let mut result = result;
        let meta = result.meta.get_or_insert_with(serde_json::Map::new);
        extract::attach_payment_response_to_meta(meta, &settle_response)?;

        tracing::debug!(
            tool = %tool_name,
            transaction = %settle_response.transaction,
            "Paid tool call settled"
        );

        Ok(result)
    }

    /// Creates a 402 payment required result.
    ///
    /// The [`PaymentRequired`] body is delivered both as `structuredContent`
    /// and as the JSON text of `content[0]`, with `isError: true`. The
    /// configured `accepts` list is advertised unchanged and in order.
    fn payment_required_result(&self, tool_name: &str, error_msg: &str) -> CallToolResult {
        let resource = self.config.resource.clone().unwrap_or_else(|| ResourceInfo {
            url: tool_resource_url(tool_name, None),
            description: format!("Tool: {tool_name}"),
            mime_type: "application/json".to_owned(),
        });

        let pr = PaymentRequired {
            x402_version: X402_VERSION,
            error: Some(error_msg.to_owned()),
            resource,
            accepts: self.config.accepts.clone(),
            extensions: self.config.extensions.clone(),
        };

        let body = serde_json::to_value(&pr).unwrap_or_default();
        let text = serde_json::to_string(&body).unwrap_or_default();

        CallToolResult {
            content: vec![ContentItem::text(text)],
            is_error: true,
            meta: None,
            structured_content: Some(body),
        }
    }

    fn requires_payment_id(&self) -> bool {
        self.config
            .extensions
            .as_ref()
            .and_then(|ext| ext.get(PAYMENT_IDENTIFIER))
            .is_some_and(payment_identifier::is_required)
    }

    fn hooks(&self) -> &dyn ServerHooks {
        self.config.hooks.as_deref().unwrap_or(&NoServerHooks)
    }
}

/// Validates the payment-identifier carried in a raw payment payload.
fn validate_payload_payment_id(
    payment_value: &Value,
) -> Result<(), payment_identifier::PaymentIdError> {
    let extensions: Option<Extensions> = payment_value
        .get("extensions")
        .and_then(|v| serde_json::from_value(v.clone()).ok());
    payment_identifier::validate_requirement(extensions.as_ref(), true)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use t402::facilitator::{BoxFuture, FacilitatorError};
    use t402::proto::{
        PaymentRequirements, SettleRequest, SettleResponse, VerifyResponse,
    };

    use super::*;

    #[derive(Clone, Copy)]
    enum FacilitatorMode {
        Accept,
        RejectVerify(&'static str),
        VerifyUnreachable,
        RejectSettle(&'static str),
        SettleUnreachable(&'static str),
    }

    struct MockFacilitator {
        mode: FacilitatorMode,
        verify_calls: AtomicUsize,
        settle_calls: AtomicUsize,
        events: Mutex<Vec<&'static str>>,
    }

    impl MockFacilitator {
        fn new(mode: FacilitatorMode) -> Arc<Self> {
            Arc::new(Self {
                mode,
                verify_calls: AtomicUsize::new(0),
                settle_calls: AtomicUsize::new(0),
                events: Mutex::new(Vec::new()),
            })
        }
    }

    impl Facilitator for MockFacilitator {
        fn verify(
            &self,
            _request: VerifyRequest,
        ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            self.events.lock().unwrap().push("verify");
            let mode = self.mode;
            Box::pin(async move {
                match mode {
                    FacilitatorMode::RejectVerify(reason) => Ok(VerifyResponse::invalid(reason)),
                    FacilitatorMode::VerifyUnreachable => {
                        Err(FacilitatorError::Transport("connection refused".into()))
                    }
                    _ => Ok(VerifyResponse::valid("0xBuyer")),
                }
            })
        }

        fn settle(
            &self,
            _request: SettleRequest,
        ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>> {
            self.settle_calls.fetch_add(1, Ordering::SeqCst);
            self.events.lock().unwrap().push("settle");
            let mode = self.mode;
            Box::pin(async move {
                match mode {
                    FacilitatorMode::RejectSettle(reason) => {
                        Ok(SettleResponse::error(reason, "eip155:84532"))
                    }
                    FacilitatorMode::SettleUnreachable(msg) => {
                        Err(FacilitatorError::OnchainFailure(msg.into()))
                    }
                    _ => Ok(SettleResponse::success("0xabc", "eip155:84532").with_payer("0xBuyer")),
                }
            })
        }
    }

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".into(),
            network: "eip155:84532".into(),
            amount: "100000".into(),
            pay_to: "0xPayee".into(),
            asset: "0xUSDC".into(),
            max_timeout_seconds: None,
            extra: None,
        }
    }

    fn wrapper(mode: FacilitatorMode) -> (PaymentWrapper, Arc<MockFacilitator>) {
        let facilitator = MockFacilitator::new(mode);
        let wrapper = PaymentWrapper::new(
            facilitator.clone(),
            PaymentWrapperConfig {
                accepts: vec![requirements()],
                ..Default::default()
            },
        );
        (wrapper, facilitator)
    }

    fn paid_request(name: &str) -> CallToolParams {
        let payment = serde_json::json!({
            "x402Version": 2,
            "accepted": serde_json::to_value(requirements()).unwrap(),
            "payload": {"signature": "0xSig"},
        });
        let mut meta = serde_json::Map::new();
        meta.insert(crate::PAYMENT_META_KEY.to_owned(), payment);
        CallToolParams {
            name: name.to_owned(),
            arguments: serde_json::Map::new(),
            meta: Some(meta),
        }
    }

    fn bare_request(name: &str) -> CallToolParams {
        CallToolParams {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    fn weather_result() -> CallToolResult {
        CallToolResult {
            content: vec![ContentItem::text(
                r#"{"city":"SF","weather":"sunny","temperature":68}"#,
            )],
            ..Default::default()
        }
    }

    fn body_error(result: &CallToolResult) -> String {
        result.structured_content.as_ref().unwrap()["error"]
            .as_str()
            .unwrap()
            .to_owned()
    }

    #[test]
    #[should_panic(expected = "at least one payment requirement")]
    fn empty_accepts_is_fatal_at_construction() {
        let facilitator = MockFacilitator::new(FacilitatorMode::Accept);
        let _ = PaymentWrapper::new(facilitator, PaymentWrapperConfig::default());
    }

    #[tokio::test]
    async fn missing_payment_yields_402_without_invoking_handler() {
        let (wrapper, facilitator) = wrapper(FacilitatorMode::Accept);
        let handler_calls = AtomicUsize::new(0);

        let result = wrapper
            .process(bare_request("get_weather"), |_req| async {
                handler_calls.fetch_add(1, Ordering::SeqCst);
                Ok(weather_result())
            })
            .await
            .unwrap();

        assert!(result.is_error);
        assert_eq!(handler_calls.load(Ordering::SeqCst), 0);
        assert_eq!(facilitator.verify_calls.load(Ordering::SeqCst), 0);
        assert_eq!(body_error(&result), "Payment required to access this tool");

        let body = result.structured_content.as_ref().unwrap();
        assert_eq!(body["x402Version"], 2);
        assert_eq!(body["resource"]["url"], "mcp://tool/get_weather");
        assert_eq!(body["resource"]["description"], "Tool: get_weather");
        assert_eq!(body["resource"]["mimeType"], "application/json");
        assert_eq!(
            body["accepts"],
            serde_json::to_value(vec![requirements()]).unwrap()
        );

        // The text content carries the same body, JSON-encoded.
        let text = result.content[0].as_text().unwrap();
        let decoded: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(&decoded, body);
    }

    #[tokio::test]
    async fn malformed_payment_is_treated_as_missing() {
        let (wrapper, facilitator) = wrapper(FacilitatorMode::Accept);

        let mut meta = serde_json::Map::new();
        meta.insert(
            crate::PAYMENT_META_KEY.to_owned(),
            serde_json::json!("garbage"),
        );
        let request = CallToolParams {
            name: "get_weather".into(),
            arguments: serde_json::Map::new(),
            meta: Some(meta),
        };

        let result = wrapper
            .process(request, |_req| async { Ok(weather_result()) })
            .await
            .unwrap();

        assert!(result.is_error);
        assert_eq!(body_error(&result), "Payment required to access this tool");
        assert_eq!(facilitator.verify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn advertisement_is_idempotent() {
        let (wrapper, _) = wrapper(FacilitatorMode::Accept);

        let first = wrapper
            .process(bare_request("get_weather"), |_req| async {
                Ok(weather_result())
            })
            .await
            .unwrap();
        let second = wrapper
            .process(bare_request("get_weather"), |_req| async {
                Ok(weather_result())
            })
            .await
            .unwrap();

        assert_eq!(
            first.content[0].as_text().unwrap(),
            second.content[0].as_text().unwrap()
        );
        assert_eq!(first.structured_content, second.structured_content);
    }

    #[tokio::test]
    async fn verification_failure_surfaces_reason_verbatim() {
        let (wrapper, facilitator) = wrapper(FacilitatorMode::RejectVerify("bad signature"));
        let handler_calls = AtomicUsize::new(0);

        let result = wrapper
            .process(paid_request("get_weather"), |_req| async {
                handler_calls.fetch_add(1, Ordering::SeqCst);
                Ok(weather_result())
            })
            .await
            .unwrap();

        assert!(result.is_error);
        assert_eq!(body_error(&result), "bad signature");
        assert_eq!(handler_calls.load(Ordering::SeqCst), 0);
        assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn verify_transport_error_yields_402() {
        let (wrapper, _) = wrapper(FacilitatorMode::VerifyUnreachable);

        let result = wrapper
            .process(paid_request("get_weather"), |_req| async {
                Ok(weather_result())
            })
            .await
            .unwrap();

        assert!(result.is_error);
        assert!(body_error(&result).starts_with("Payment verification error:"));
    }

    #[tokio::test]
    async fn happy_path_attaches_receipt() {
        let (wrapper, facilitator) = wrapper(FacilitatorMode::Accept);

        let result = wrapper
            .process(paid_request("get_weather"), |_req| async {
                Ok(weather_result())
            })
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(facilitator.verify_calls.load(Ordering::SeqCst), 1);
        assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 1);

        let receipt =
            extract::extract_payment_response_from_meta(result.meta.as_ref().unwrap()).unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.transaction, "0xabc");
        assert_eq!(receipt.network, "eip155:84532");
    }

    #[tokio::test]
    async fn receipt_attachment_preserves_handler_meta() {
        let (wrapper, _) = wrapper(FacilitatorMode::Accept);

        let result = wrapper
            .process(paid_request("get_weather"), |_req| async {
                let mut meta = serde_json::Map::new();
                meta.insert("app/trace".to_owned(), serde_json::json!("abc123"));
                Ok(CallToolResult {
                    meta: Some(meta),
                    ..weather_result()
                })
            })
            .await
            .unwrap();

        let meta = result.meta.as_ref().unwrap();
        assert_eq!(meta["app/trace"], "abc123");
        assert!(meta.contains_key(crate::PAYMENT_RESPONSE_META_KEY));
    }

    #[tokio::test]
    async fn handler_error_result_skips_settlement() {
        let (wrapper, facilitator) = wrapper(FacilitatorMode::Accept);

        let error_result = CallToolResult {
            content: vec![ContentItem::text("not found")],
            is_error: true,
            ..Default::default()
        };
        let expected = error_result.clone();

        let result = wrapper
            .process(paid_request("get_weather"), move |_req| async move {
                Ok(error_result)
            })
            .await
            .unwrap();

        assert_eq!(result, expected);
        assert!(result.meta.is_none());
        assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_failure_propagates_and_skips_settlement() {
        let (wrapper, facilitator) = wrapper(FacilitatorMode::Accept);

        let err = wrapper
            .process(paid_request("get_weather"), |_req| async {
                Err(McpPaymentError::ToolCallFailed("backend down".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, McpPaymentError::ToolCallFailed(_)));
        assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn settle_failure_yields_402_without_receipt() {
        let (wrapper, _) = wrapper(FacilitatorMode::SettleUnreachable("insufficient balance"));

        let result = wrapper
            .process(paid_request("get_weather"), |_req| async {
                Ok(weather_result())
            })
            .await
            .unwrap();

        assert!(result.is_error);
        assert!(result.meta.is_none());
        assert_eq!(
            body_error(&result),
            "Payment settlement failed: Onchain error: insufficient balance"
        );

        // Same advertisement shape as a plain 402, with no settle response
        // embedded anywhere in the body.
        let body = result.structured_content.as_ref().unwrap();
        assert_eq!(
            body["accepts"],
            serde_json::to_value(vec![requirements()]).unwrap()
        );
        assert!(body.get("success").is_none());
        assert!(body.get("transaction").is_none());
    }

    #[tokio::test]
    async fn settle_rejection_reports_reason() {
        let (wrapper, _) = wrapper(FacilitatorMode::RejectSettle("nonce reused"));

        let result = wrapper
            .process(paid_request("get_weather"), |_req| async {
                Ok(weather_result())
            })
            .await
            .unwrap();

        assert!(result.is_error);
        assert_eq!(body_error(&result), "Payment settlement failed: nonce reused");
    }

    struct RecordingHooks {
        events: Arc<Mutex<Vec<&'static str>>>,
        allow: bool,
    }

    impl ServerHooks for RecordingHooks {
        fn on_before_execution(
            &self,
            _ctx: &ServerHookContext,
        ) -> BoxFuture<'_, Result<bool, McpPaymentError>> {
            self.events.lock().unwrap().push("before");
            let allow = self.allow;
            Box::pin(async move { Ok(allow) })
        }

        fn on_after_execution(
            &self,
            _ctx: &AfterExecutionContext,
        ) -> BoxFuture<'_, Result<(), McpPaymentError>> {
            self.events.lock().unwrap().push("after");
            Box::pin(async { Ok(()) })
        }

        fn on_after_settlement(
            &self,
            ctx: &SettlementContext,
        ) -> BoxFuture<'_, Result<(), McpPaymentError>> {
            assert!(ctx.settlement.success);
            self.events.lock().unwrap().push("after_settle");
            Box::pin(async { Ok(()) })
        }
    }

    fn hooked_wrapper(
        allow: bool,
        mode: FacilitatorMode,
    ) -> (PaymentWrapper, Arc<MockFacilitator>, Arc<Mutex<Vec<&'static str>>>) {
        let facilitator = MockFacilitator::new(mode);
        let events = Arc::new(Mutex::new(Vec::new()));
        let wrapper = PaymentWrapper::new(
            facilitator.clone(),
            PaymentWrapperConfig {
                accepts: vec![requirements()],
                hooks: Some(Box::new(RecordingHooks {
                    events: events.clone(),
                    allow,
                })),
                ..Default::default()
            },
        );
        (wrapper, facilitator, events)
    }

    #[tokio::test]
    async fn hooks_run_in_order_around_handler_and_settle() {
        let (wrapper, facilitator, events) = hooked_wrapper(true, FacilitatorMode::Accept);

        let result = wrapper
            .process(paid_request("get_weather"), |_req| async {
                facilitator.events.lock().unwrap().push("handler");
                Ok(weather_result())
            })
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(
            *facilitator.events.lock().unwrap(),
            vec!["verify", "handler", "settle"]
        );
        assert_eq!(*events.lock().unwrap(), vec!["before", "after", "after_settle"]);
    }

    #[tokio::test]
    async fn blocking_hook_denies_execution() {
        let (wrapper, facilitator, events) = hooked_wrapper(false, FacilitatorMode::Accept);
        let handler_calls = AtomicUsize::new(0);

        let result = wrapper
            .process(paid_request("get_weather"), |_req| async {
                handler_calls.fetch_add(1, Ordering::SeqCst);
                Ok(weather_result())
            })
            .await
            .unwrap();

        assert!(result.is_error);
        assert_eq!(body_error(&result), "Execution blocked by hook");
        assert_eq!(handler_calls.load(Ordering::SeqCst), 0);
        assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 0);
        assert_eq!(*events.lock().unwrap(), vec!["before"]);
    }

    #[tokio::test]
    async fn after_hook_observes_handler_errors_without_settlement() {
        let (wrapper, facilitator, events) = hooked_wrapper(true, FacilitatorMode::Accept);

        let result = wrapper
            .process(paid_request("get_weather"), |_req| async {
                Ok(CallToolResult {
                    content: vec![ContentItem::text("not found")],
                    is_error: true,
                    ..Default::default()
                })
            })
            .await
            .unwrap();

        assert!(result.is_error);
        assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 0);
        assert_eq!(*events.lock().unwrap(), vec!["before", "after"]);
    }

    #[tokio::test]
    async fn hooks_are_skipped_without_payment() {
        let (wrapper, _, events) = hooked_wrapper(true, FacilitatorMode::Accept);

        let result = wrapper
            .process(bare_request("get_weather"), |_req| async {
                Ok(weather_result())
            })
            .await
            .unwrap();

        assert!(result.is_error);
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn hook_errors_propagate() {
        struct FailingHooks;

        impl ServerHooks for FailingHooks {
            fn on_before_execution(
                &self,
                _ctx: &ServerHookContext,
            ) -> BoxFuture<'_, Result<bool, McpPaymentError>> {
                Box::pin(async { Err(McpPaymentError::Aborted("hook exploded".into())) })
            }
        }

        let facilitator = MockFacilitator::new(FacilitatorMode::Accept);
        let wrapper = PaymentWrapper::new(
            facilitator,
            PaymentWrapperConfig {
                accepts: vec![requirements()],
                hooks: Some(Box::new(FailingHooks)),
                ..Default::default()
            },
        );

        let err = wrapper
            .process(paid_request("get_weather"), |_req| async {
                Ok(weather_result())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, McpPaymentError::Aborted(_)));
    }

    #[tokio::test]
    async fn required_payment_id_is_enforced_and_extracted() {
        let facilitator = MockFacilitator::new(FacilitatorMode::Accept);
        let mut advertised = Extensions::new();
        advertised.insert(
            PAYMENT_IDENTIFIER.to_owned(),
            serde_json::to_value(payment_identifier::declare(true)).unwrap(),
        );
        let wrapper = PaymentWrapper::new(
            facilitator,
            PaymentWrapperConfig {
                accepts: vec![requirements()],
                extensions: Some(advertised.clone()),
                ..Default::default()
            },
        );

        // Payload without an id is denied before verification.
        let result = wrapper
            .process(paid_request("get_weather"), |_req| async {
                Ok(weather_result())
            })
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(body_error(&result).contains("required"));

        // The advertised declaration is carried in the 402 so the client
        // can merge its id into it.
        let body = result.structured_content.as_ref().unwrap();
        assert!(body["extensions"].get(PAYMENT_IDENTIFIER).is_some());

        // Client-side merge, then the call goes through and the id
        // round-trips.
        let mut extensions = advertised;
        payment_identifier::append_payment_id(&mut extensions, None).unwrap();
        let appended =
            payment_identifier::extract_payment_id(Some(&extensions), true).unwrap();

        let mut request = paid_request("get_weather");
        if let Some(meta) = request.meta.as_mut()
            && let Some(payment) = meta.get_mut(crate::PAYMENT_META_KEY)
        {
            payment["extensions"] = serde_json::to_value(&extensions).unwrap();
        }

        let seen = Arc::new(Mutex::new(String::new()));
        let seen_in_handler = seen.clone();
        let result = wrapper
            .process(request, move |req| async move {
                let payment = extract::extract_payment_from_meta(req.meta.as_ref().unwrap())
                    .unwrap();
                let extensions: Extensions =
                    serde_json::from_value(payment["extensions"].clone()).unwrap();
                *seen_in_handler.lock().unwrap() =
                    payment_identifier::extract_payment_id(Some(&extensions), true).unwrap();
                Ok(weather_result())
            })
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(*seen.lock().unwrap(), appended);
        assert!(payment_identifier::is_valid_payment_id(&appended));
    }
}
