//! The `payment-identifier` extension.
//!
//! Lets clients attach an idempotency key to a payment payload so that
//! facilitators can deduplicate settlement requests. The key is opaque to
//! this crate; uniqueness across concurrent generators rests on the UUID v4
//! source.
//!
//! Flow: the server declares the extension in its 402 advertisement
//! ([`declare`]), the client merges an id into the payload extensions
//! ([`append_payment_id`]), and the server or facilitator reads it back
//! ([`extract_payment_id`], [`validate_requirement`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use t402_proto::Extensions;
use uuid::Uuid;

/// Extension key in the `extensions` map.
pub const PAYMENT_IDENTIFIER: &str = "payment-identifier";

/// Minimum payment id length.
pub const PAYMENT_ID_MIN_LENGTH: usize = 16;

/// Maximum payment id length.
pub const PAYMENT_ID_MAX_LENGTH: usize = 128;

/// Default prefix for generated payment ids.
pub const DEFAULT_ID_PREFIX: &str = "pay_";

/// Errors produced by payment-identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum PaymentIdError {
    /// The id fails format validation.
    #[error(
        "invalid payment ID: {0:?}. ID must be {PAYMENT_ID_MIN_LENGTH}-{PAYMENT_ID_MAX_LENGTH} \
         characters and contain only alphanumeric characters, hyphens, and underscores"
    )]
    Invalid(String),

    /// The extension is required but no id is present.
    #[error("payment identifier is required but missing from the payload extensions")]
    Missing,

    /// The extension record could not be re-serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The `required` flag and client-provided id of the extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIdInfo {
    /// Whether the server requires clients to supply an id.
    pub required: bool,

    /// The client-provided id, absent in the server's declaration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// The full extension record as carried in the `extensions` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIdExtension {
    /// Required flag and id.
    pub info: PaymentIdInfo,

    /// JSON Schema describing the `info` object.
    pub schema: Value,
}

/// Returns the JSON Schema for validating payment identifier info.
///
/// Compliant with JSON Schema Draft 2020-12.
#[must_use]
pub fn payment_id_schema() -> Value {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "properties": {
            "required": {
                "type": "boolean",
            },
            "id": {
                "type": "string",
                "minLength": PAYMENT_ID_MIN_LENGTH,
                "maxLength": PAYMENT_ID_MAX_LENGTH,
                "pattern": "^[a-zA-Z0-9_-]+$",
            },
        },
        "required": ["required"],
    })
}

/// Creates the server-side extension declaration.
///
/// Place the result under [`PAYMENT_IDENTIFIER`] in the extensions map of a
/// 402 advertisement.
#[must_use]
pub fn declare(required: bool) -> PaymentIdExtension {
    PaymentIdExtension {
        info: PaymentIdInfo { required, id: None },
        schema: payment_id_schema(),
    }
}

/// Generates a unique payment identifier with the given prefix.
///
/// The format is `prefix` + UUID v4 without hyphens (32 hex chars), e.g.
/// `"pay_7d5d747be160e280504c099d984bcfe0"`. Pass `None` for the default
/// `"pay_"` prefix.
#[must_use]
pub fn generate_payment_id(prefix: Option<&str>) -> String {
    let prefix = prefix.unwrap_or(DEFAULT_ID_PREFIX);
    format!("{prefix}{}", Uuid::new_v4().simple())
}

/// Validates that a payment id meets the format requirements.
///
/// The id must be 16-128 characters of `[a-zA-Z0-9_-]`.
#[must_use]
pub fn is_valid_payment_id(id: &str) -> bool {
    if id.len() < PAYMENT_ID_MIN_LENGTH || id.len() > PAYMENT_ID_MAX_LENGTH {
        return false;
    }
    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Returns `true` if the value has the structure of a payment-identifier
/// extension record.
///
/// Tolerates both values produced from [`PaymentIdExtension`] and loose
/// maps reconstructed from JSON.
#[must_use]
pub fn is_payment_id_extension(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let has_required = obj
        .get("info")
        .and_then(|info| info.get("required"))
        .is_some_and(Value::is_boolean);
    has_required && obj.contains_key("schema")
}

/// Reads the `required` flag from an extension value.
///
/// Robust against loose-map representations; absent or malformed values
/// read as not required.
#[must_use]
pub fn is_required(value: &Value) -> bool {
    value
        .get("info")
        .and_then(|info| info.get("required"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Merges a payment id into an extensions map, if the server declared the
/// extension.
///
/// Reads the server's `payment-identifier` declaration from `extensions`
/// and sets `info.id` to `id`, or to a freshly generated id when `None`.
/// No-op when the key is absent or does not look like a declaration.
///
/// # Errors
///
/// Returns [`PaymentIdError::Invalid`] if a provided id fails validation.
pub fn append_payment_id(
    extensions: &mut Extensions,
    id: Option<&str>,
) -> Result<(), PaymentIdError> {
    let Some(declared) = extensions.get(PAYMENT_IDENTIFIER) else {
        return Ok(());
    };
    if !is_payment_id_extension(declared) {
        return Ok(());
    }

    let payment_id = match id {
        Some(id) => id.to_owned(),
        None => generate_payment_id(None),
    };
    if !is_valid_payment_id(&payment_id) {
        return Err(PaymentIdError::Invalid(payment_id));
    }

    let mut record: PaymentIdExtension = serde_json::from_value(declared.clone())
        .unwrap_or_else(|_| declare(is_required(declared)));
    record.info.id = Some(payment_id);

    extensions.insert(PAYMENT_IDENTIFIER.to_owned(), serde_json::to_value(record)?);

    Ok(())
}

/// Extracts the payment id from a payload's extensions.
///
/// Returns an empty string if the extension or id is absent.
///
/// # Errors
///
/// With `validate` set, returns [`PaymentIdError::Invalid`] for malformed
/// ids; without it, the raw value is returned unchecked.
pub fn extract_payment_id(
    extensions: Option<&Extensions>,
    validate: bool,
) -> Result<String, PaymentIdError> {
    let id = extensions
        .and_then(|ext| ext.get(PAYMENT_IDENTIFIER))
        .and_then(|value| value.get("info"))
        .and_then(|info| info.get("id"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    if validate && !id.is_empty() && !is_valid_payment_id(&id) {
        return Err(PaymentIdError::Invalid(id));
    }

    Ok(id)
}

/// Asserts that a payload carries a well-formed payment id when required.
///
/// # Errors
///
/// Returns [`PaymentIdError::Missing`] when `required` is set and no id is
/// present, or [`PaymentIdError::Invalid`] when the id is malformed.
pub fn validate_requirement(
    extensions: Option<&Extensions>,
    required: bool,
) -> Result<(), PaymentIdError> {
    let id = extract_payment_id(extensions, true)?;
    if required && id.is_empty() {
        return Err(PaymentIdError::Missing);
    }
    Ok(())
}
