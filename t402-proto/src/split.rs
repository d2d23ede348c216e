//! Recipient configuration for the `split` payment scheme.
//!
//! A split payment divides one settlement across multiple recipients using
//! basis-point allocations. The allocation is carried in the `extra` field
//! of [`PaymentRequirements`](crate::v2::PaymentRequirements) and validated
//! before advertisement.

use serde::{Deserialize, Serialize};

/// Total basis points in a whole (100%).
pub const TOTAL_BPS: u32 = 10_000;

/// A recipient in a split payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRecipient {
    /// Wallet address of the recipient.
    pub address: String,

    /// Basis points allocation (1-10000, where 10000 = 100%).
    pub bps: u32,

    /// Optional human-readable label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
}

/// Configuration for a split payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitConfig {
    /// Recipients of the split, in payout order.
    pub recipients: Vec<SplitRecipient>,
}

/// Errors produced when validating a split configuration.
#[derive(Debug, thiserror::Error)]
pub enum SplitConfigError {
    /// The recipient list is empty.
    #[error("split must have at least 1 recipient")]
    NoRecipients,

    /// A recipient's bps allocation is out of range.
    #[error("recipient bps must be 1-10000, got {bps} for {address}")]
    BpsOutOfRange {
        /// The offending recipient address.
        address: String,
        /// The out-of-range value.
        bps: u32,
    },

    /// The allocations do not add up to a whole.
    #[error("recipient bps must sum to 10000, got {0}")]
    BpsSum(u32),
}

impl SplitConfig {
    /// Creates a split configuration from a list of recipients.
    #[must_use]
    pub fn new(recipients: Vec<SplitRecipient>) -> Self {
        Self { recipients }
    }

    /// Validates the split configuration.
    ///
    /// Each recipient's bps must be in `[1, 10000]` and the allocations
    /// must sum to exactly 10000.
    ///
    /// # Errors
    ///
    /// Returns [`SplitConfigError`] describing the first violation found.
    pub fn validate(&self) -> Result<(), SplitConfigError> {
        if self.recipients.is_empty() {
            return Err(SplitConfigError::NoRecipients);
        }

        for r in &self.recipients {
            if r.bps < 1 || r.bps > TOTAL_BPS {
                return Err(SplitConfigError::BpsOutOfRange {
                    address: r.address.clone(),
                    bps: r.bps,
                });
            }
        }

        let total: u32 = self.recipients.iter().map(|r| r.bps).sum();
        if total != TOTAL_BPS {
            return Err(SplitConfigError::BpsSum(total));
        }

        Ok(())
    }

    /// Calculates each recipient's share of a total amount.
    ///
    /// Uses floor division; the last recipient receives the remainder so no
    /// dust is left undistributed.
    #[must_use]
    pub fn shares(&self, total_amount: u128) -> Vec<(String, u128)> {
        let mut out = Vec::with_capacity(self.recipients.len());
        let mut distributed: u128 = 0;

        for (i, recipient) in self.recipients.iter().enumerate() {
            let share = if i == self.recipients.len() - 1 {
                total_amount - distributed
            } else {
                total_amount * u128::from(recipient.bps) / u128::from(TOTAL_BPS)
            };
            out.push((recipient.address.clone(), share));
            distributed += share;
        }

        out
    }
}
