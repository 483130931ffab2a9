//! Invoice payment-status state machine.

use serde::{Deserialize, Serialize};

/// The payment status of an invoice.
///
/// State transitions:
/// ```text
/// PENDING ──┬──► PAID
///           │      ▲
///           └──► PAYMENT_FAILED
/// ```
///
/// Re-applying the current status is always allowed (duplicate delivery).
/// PAID is absorbing: nothing moves an invoice out of it. A failed payment
/// can still be followed by a successful retry. Nothing returns to PENDING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Created, awaiting payment.
    #[default]
    Pending,

    /// Payment confirmed by a verified gateway callback (terminal).
    Paid,

    /// The last payment attempt failed.
    PaymentFailed,
}

impl InvoiceStatus {
    /// Returns true if the invoice may move from this status to `next`.
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        match (self, next) {
            (current, next) if *current == next => true,
            (Pending, Paid | PaymentFailed) => true,
            (PaymentFailed, Paid) => true,
            _ => false,
        }
    }

    /// Returns true if a payment outcome has been recorded.
    pub fn is_settled(&self) -> bool {
        !matches!(self, InvoiceStatus::Pending)
    }

    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid)
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::PaymentFailed => "PAYMENT_FAILED",
        }
    }

    /// Parses a wire name.
    pub fn parse(value: &str) -> Option<InvoiceStatus> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(InvoiceStatus::Pending),
            "PAID" => Some(InvoiceStatus::Paid),
            "PAYMENT_FAILED" => Some(InvoiceStatus::PaymentFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
