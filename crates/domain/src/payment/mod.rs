//! Payment transactions as recorded by the gateway adapter.

mod postgres;
mod store;

use chrono::{DateTime, Utc};
use common::{InvoiceId, Money, PaymentTransactionId, UserId};
use serde::{Deserialize, Serialize};

use crate::invoice::InvoiceStatus;

pub use postgres::PostgresPaymentStore;
pub use store::{InMemoryPaymentStore, PaymentStore};

/// Status of a payment transaction.
///
/// `ERROR` and `UNKNOWN` only describe status queries that could not be
/// answered; they never drive an invoice transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    PaymentFailed,
    Error,
    Unknown,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::PaymentFailed => "PAYMENT_FAILED",
            PaymentStatus::Error => "ERROR",
            PaymentStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(value: &str) -> Option<PaymentStatus> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(PaymentStatus::Pending),
            "PAID" => Some(PaymentStatus::Paid),
            "PAYMENT_FAILED" => Some(PaymentStatus::PaymentFailed),
            "ERROR" => Some(PaymentStatus::Error),
            "UNKNOWN" => Some(PaymentStatus::Unknown),
            _ => None,
        }
    }

    /// The invoice status this payment outcome drives, if any.
    pub fn invoice_status(&self) -> Option<InvoiceStatus> {
        match self {
            PaymentStatus::Paid => Some(InvoiceStatus::Paid),
            PaymentStatus::PaymentFailed => Some(InvoiceStatus::PaymentFailed),
            _ => None,
        }
    }
}

impl From<InvoiceStatus> for PaymentStatus {
    fn from(status: InvoiceStatus) -> Self {
        match status {
            InvoiceStatus::Pending => PaymentStatus::Pending,
            InvoiceStatus::Paid => PaymentStatus::Paid,
            InvoiceStatus::PaymentFailed => PaymentStatus::PaymentFailed,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    pub id: PaymentTransactionId,
    /// The reference sent to the gateway as `vnp_TxnRef`.
    pub provider_txn_ref: String,
    /// The gateway's own transaction number, known after the callback.
    pub provider_transaction_no: Option<String>,
    pub invoice_id: InvoiceId,
    pub user_id: Option<UserId>,
    pub amount: Money,
    pub status: PaymentStatus,
    pub bank_code: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Set once the settlement event for this transaction reached the bus.
    pub settlement_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPaymentTransaction {
    pub provider_txn_ref: String,
    pub invoice_id: InvoiceId,
    pub user_id: Option<UserId>,
    pub amount: Money,
    pub status: PaymentStatus,
    pub bank_code: Option<String>,
    pub error_message: Option<String>,
}

/// The fields a verified callback settles.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaymentCompletion {
    pub provider_transaction_no: Option<String>,
    pub bank_code: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}
