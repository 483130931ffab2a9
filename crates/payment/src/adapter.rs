//! Payment gateway adapter.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{InvoiceId, Money, Principal};
use domain::events::{PaymentEvent, PaymentEventData};
use domain::{
    DomainError, ErrorKind, InvoiceLookup, InvoiceStatus, InvoiceSummary, NewPaymentTransaction,
    PaymentCompletion, PaymentStatus, PaymentStore, PaymentTransaction,
};
use event_bus::topology::{exchanges, routing_keys};
use event_bus::{EventBus, EventPublisher};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PaymentError, Result};
use crate::gateway::{GatewayConfig, SessionParams};
use crate::signing::{SECURE_HASH, SECURE_HASH_TYPE, Signer};

/// Callback parameter naming our invoice. Appended to the return URL, so
/// the gateway never signs it.
pub const INVOICE_ID_PARAM: &str = "invoiceId";

const PAYMENT_METHOD: &str = "VNPAY";
const GATEWAY_SUCCESS: &str = "00";

/// Values of `vnp_SecureHashType` that name the HMAC-SHA512 scheme.
const ACCEPTED_HASH_TYPES: [&str; 2] = ["HmacSHA512", "SHA512"];
const REFERENCE_ATTEMPTS: usize = 3;

/// Body of `POST /payments/create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub invoice_id: InvoiceId,
    /// Defaults to the invoice total; must equal it when given.
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub bank_code: Option<String>,
    #[serde(default)]
    pub return_url: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PaymentRequest {
    pub fn for_invoice(invoice_id: InvoiceId) -> Self {
        Self {
            invoice_id,
            amount: None,
            bank_code: None,
            return_url: None,
            language: None,
            description: None,
        }
    }
}

/// A created payment page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub invoice_id: InvoiceId,
    pub transaction_ref: String,
    pub payment_url: String,
    pub amount: Money,
    pub bank_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The result of a verified callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackOutcome {
    pub invoice_id: InvoiceId,
    pub transaction_ref: String,
    pub status: PaymentStatus,
    pub success: bool,
    pub response_code: Option<String>,
    /// The transaction was already settled by an earlier callback. The
    /// settlement event is only sent again if it never reached the bus.
    pub duplicate: bool,
}

/// Answer to a payment status query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub invoice_id: InvoiceId,
    pub status: PaymentStatus,
    pub transaction_ref: Option<String>,
    pub amount: Option<Money>,
    pub bank_code: Option<String>,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentStatusView {
    fn unrecorded(invoice_id: InvoiceId, status: PaymentStatus, message: String) -> Self {
        Self {
            invoice_id,
            status,
            transaction_ref: None,
            amount: None,
            bank_code: None,
            message: Some(message),
            updated_at: Utc::now(),
        }
    }
}

impl From<&PaymentTransaction> for PaymentStatusView {
    fn from(transaction: &PaymentTransaction) -> Self {
        Self {
            invoice_id: transaction.invoice_id,
            status: transaction.status,
            transaction_ref: Some(transaction.provider_txn_ref.clone()),
            amount: Some(transaction.amount),
            bank_code: transaction.bank_code.clone(),
            message: transaction.error_message.clone(),
            updated_at: transaction.updated_at,
        }
    }
}

/// Creates payment sessions, verifies gateway callbacks and answers status
/// queries.
pub struct PaymentAdapter<S, L, B>
where
    S: PaymentStore,
    L: InvoiceLookup,
    B: EventBus,
{
    store: S,
    invoices: L,
    publisher: EventPublisher<B>,
    config: GatewayConfig,
    signer: Signer,
}

impl<S, L, B> PaymentAdapter<S, L, B>
where
    S: PaymentStore,
    L: InvoiceLookup,
    B: EventBus,
{
    pub fn new(
        store: S,
        invoices: L,
        publisher: EventPublisher<B>,
        config: GatewayConfig,
    ) -> Result<Self> {
        let signer = Signer::new(&config.hash_secret)?;
        Ok(Self {
            store,
            invoices,
            publisher,
            config,
            signer,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Starts a payment for an invoice the caller may read.
    ///
    /// The PENDING transaction is stored before the URL is returned, so a
    /// callback racing the response still finds its reference.
    #[tracing::instrument(skip(self, request, principal), fields(invoice_id = %request.invoice_id))]
    pub async fn create_payment_session(
        &self,
        request: &PaymentRequest,
        principal: &Principal,
        client_ip: &str,
    ) -> Result<PaymentSession> {
        let invoice = self
            .invoices
            .find_invoice(request.invoice_id, Some(principal))
            .await?
            .ok_or(PaymentError::InvoiceNotFound(request.invoice_id))?;

        if invoice.status == InvoiceStatus::Paid {
            return Err(PaymentError::AlreadyPaid(invoice.invoice_id));
        }

        let amount = match request.amount {
            Some(amount) if amount != invoice.total_amount => {
                return Err(PaymentError::InvalidParameter {
                    name: "amount",
                    value: format!("{amount} does not match invoice total {}", invoice.total_amount),
                });
            }
            Some(amount) => amount,
            None => invoice.total_amount,
        };
        if !amount.is_positive() {
            return Err(PaymentError::InvalidParameter {
                name: "amount",
                value: amount.to_string(),
            });
        }

        let transaction = self
            .reserve_reference(&invoice, amount, request.bank_code.clone())
            .await?;

        let params = self.config.session_params(&SessionParams {
            invoice_id: invoice.invoice_id,
            txn_ref: &transaction.provider_txn_ref,
            amount,
            bank_code: request.bank_code.as_deref(),
            return_url: request.return_url.as_deref(),
            locale: request.language.as_deref(),
            order_info: request.description.as_deref(),
            client_ip,
            now: transaction.created_at,
        });
        let payment_url = self.config.payment_url(&self.signer, &params);

        metrics::counter!("payment_sessions_created_total").increment(1);
        tracing::info!(
            transaction_ref = %transaction.provider_txn_ref,
            amount = %amount,
            "payment session created"
        );

        let mut data = event_data(&transaction, Some(&invoice));
        data.payment_url = Some(payment_url.clone());
        if let Err(e) = self
            .publisher
            .publish(
                exchanges::PAYMENT,
                &routing_keys::PAYMENT_FAN_OUT,
                &PaymentEvent::PaymentInitialized(data),
            )
            .await
        {
            tracing::error!(error = %e, "PAYMENT_INITIALIZED not published");
        }

        Ok(PaymentSession {
            invoice_id: invoice.invoice_id,
            transaction_ref: transaction.provider_txn_ref,
            payment_url,
            amount,
            bank_code: request.bank_code.clone(),
            created_at: transaction.created_at,
        })
    }

    /// Stores a PENDING transaction under a fresh 8-digit reference.
    async fn reserve_reference(
        &self,
        invoice: &InvoiceSummary,
        amount: Money,
        bank_code: Option<String>,
    ) -> Result<PaymentTransaction> {
        for _ in 0..REFERENCE_ATTEMPTS {
            let candidate = NewPaymentTransaction {
                provider_txn_ref: new_txn_ref(),
                invoice_id: invoice.invoice_id,
                user_id: Some(invoice.user_id),
                amount,
                status: PaymentStatus::Pending,
                bank_code: bank_code.clone(),
                error_message: None,
            };
            match self.store.insert(candidate).await {
                Ok(transaction) => return Ok(transaction),
                Err(DomainError::Conflict(reason)) => {
                    tracing::debug!(%reason, "transaction reference collision");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(DomainError::Conflict("no free transaction reference".to_string()).into())
    }

    /// Verifies and applies a gateway callback.
    ///
    /// Fails closed: a missing or wrong signature, an altered invoice id or
    /// hash type, or a reference that does not belong to the named invoice
    /// changes nothing. A repeated callback for a settled transaction is
    /// reported as a duplicate; it re-sends the settlement event only when
    /// the first attempt to publish it failed.
    #[tracing::instrument(skip(self, params))]
    pub async fn handle_callback(&self, params: &BTreeMap<String, String>) -> Result<CallbackOutcome> {
        let raw_invoice = required(params, INVOICE_ID_PARAM)?;
        let Ok(invoice_id) = raw_invoice.parse::<InvoiceId>() else {
            return Err(reject(raw_invoice, "invoice id is not a number"));
        };

        let Some(provided) = params.get(SECURE_HASH).filter(|h| !h.is_empty()) else {
            return Err(reject(raw_invoice, "signature missing"));
        };
        if let Some(hash_type) = params.get(SECURE_HASH_TYPE)
            && !ACCEPTED_HASH_TYPES.contains(&hash_type.as_str())
        {
            return Err(reject(raw_invoice, "unsupported hash type"));
        }
        let signed: BTreeMap<String, String> = params
            .iter()
            .filter(|(key, _)| {
                !matches!(key.as_str(), SECURE_HASH | SECURE_HASH_TYPE | INVOICE_ID_PARAM)
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if !self.signer.verify(&signed, provided) {
            return Err(reject(raw_invoice, "signature mismatch"));
        }

        let Some(txn_ref) = params.get("vnp_TxnRef").filter(|r| !r.is_empty()) else {
            return Err(reject(raw_invoice, "transaction reference missing"));
        };
        let transaction = match self.store.find_by_ref(txn_ref).await? {
            Some(t) if t.invoice_id == invoice_id => t,
            Some(_) => return Err(reject(raw_invoice, "reference belongs to another invoice")),
            None => return Err(reject(raw_invoice, "unknown transaction reference")),
        };

        let response_code = optional(params, "vnp_ResponseCode");
        let success = response_code.as_deref() == Some(GATEWAY_SUCCESS)
            && optional(params, "vnp_TransactionStatus").as_deref() == Some(GATEWAY_SUCCESS);
        let status = if success {
            PaymentStatus::Paid
        } else {
            PaymentStatus::PaymentFailed
        };
        let completion = PaymentCompletion {
            provider_transaction_no: optional(params, "vnp_TransactionNo"),
            bank_code: optional(params, "vnp_BankCode"),
            error_code: if success { None } else { response_code.clone() },
            error_message: (!success).then(|| {
                format!(
                    "Payment declined by gateway (response code {})",
                    response_code.as_deref().unwrap_or("none")
                )
            }),
        };

        let settled = self
            .store
            .complete(txn_ref, PaymentStatus::Pending, status, completion)
            .await?;

        let Some(settled) = settled else {
            let current = self.store.find_by_ref(txn_ref).await?.unwrap_or(transaction);
            metrics::counter!("payment_callbacks_total", "outcome" => "duplicate").increment(1);
            if current.status == status {
                tracing::info!(transaction_ref = %txn_ref, "duplicate callback ignored");
            } else {
                tracing::warn!(
                    transaction_ref = %txn_ref,
                    settled = %current.status,
                    reported = %status,
                    "conflicting callback for a settled transaction ignored"
                );
            }
            if !current.settlement_published && current.status.invoice_status().is_some() {
                tracing::info!(transaction_ref = %txn_ref, "settlement event outstanding, publishing again");
                self.publish_settlement(&current).await?;
            }
            return Ok(CallbackOutcome {
                invoice_id,
                transaction_ref: current.provider_txn_ref,
                success: current.status == PaymentStatus::Paid,
                status: current.status,
                response_code,
                duplicate: true,
            });
        };

        let outcome = if success { "paid" } else { "failed" };
        metrics::counter!("payment_callbacks_total", "outcome" => outcome).increment(1);
        tracing::info!(transaction_ref = %txn_ref, status = %settled.status, "payment settled");

        self.publish_settlement(&settled).await?;

        Ok(CallbackOutcome {
            invoice_id,
            transaction_ref: settled.provider_txn_ref,
            status: settled.status,
            success,
            response_code,
            duplicate: false,
        })
    }

    /// Announces a settlement and records that it went out. A failed
    /// bookkeeping write only means the event may be sent once more.
    async fn publish_settlement(&self, transaction: &PaymentTransaction) -> Result<()> {
        self.announce_settlement(transaction).await?;
        if let Err(e) = self
            .store
            .mark_settlement_published(&transaction.provider_txn_ref)
            .await
        {
            tracing::warn!(
                transaction_ref = %transaction.provider_txn_ref,
                error = %e,
                "settlement event sent but not recorded"
            );
        }
        Ok(())
    }

    /// Publishes `PAYMENT_COMPLETED` or `PAYMENT_FAILED`. The invoice owner
    /// is asked for the customer's contact details; without them the event
    /// still goes out.
    async fn announce_settlement(&self, transaction: &PaymentTransaction) -> Result<()> {
        let invoice = match self.invoices.find_invoice(transaction.invoice_id, None).await {
            Ok(invoice) => invoice,
            Err(e) => {
                tracing::warn!(error = %e, "invoice lookup for payment event failed");
                None
            }
        };

        let data = event_data(transaction, invoice.as_ref());
        let event = if transaction.status == PaymentStatus::Paid {
            PaymentEvent::PaymentCompleted(data)
        } else {
            PaymentEvent::PaymentFailed(data)
        };

        self.publisher
            .publish(exchanges::PAYMENT, &routing_keys::PAYMENT_FAN_OUT, &event)
            .await
            .map_err(|e| {
                tracing::error!(
                    transaction_ref = %transaction.provider_txn_ref,
                    error = %e,
                    "payment settled but its event was not published"
                );
                PaymentError::Domain(e.into())
            })?;
        Ok(())
    }

    /// The payment status of an invoice.
    ///
    /// The latest stored transaction wins. Without one, the invoice owner is
    /// asked once and its answer is cached; a missing invoice or a failed
    /// lookup is reported as UNKNOWN or ERROR and not cached.
    #[tracing::instrument(skip(self, principal))]
    pub async fn get_status(
        &self,
        invoice_id: InvoiceId,
        principal: Option<&Principal>,
    ) -> Result<PaymentStatusView> {
        if let Some(transaction) = self.store.latest_for_invoice(invoice_id).await? {
            if let (Some(principal), Some(owner)) = (principal, transaction.user_id) {
                if !principal.can_act_for(owner) {
                    return Err(DomainError::Forbidden(format!(
                        "user {} may not read payments of invoice {invoice_id}",
                        principal.user_id
                    ))
                    .into());
                }
            }
            return Ok(PaymentStatusView::from(&transaction));
        }

        match self.invoices.find_invoice(invoice_id, principal).await {
            Ok(Some(summary)) => {
                let cached = self.cache_invoice_status(&summary).await?;
                Ok(PaymentStatusView::from(&cached))
            }
            Ok(None) => Ok(PaymentStatusView::unrecorded(
                invoice_id,
                PaymentStatus::Unknown,
                "No payment information found".to_string(),
            )),
            Err(e) if e.kind() == ErrorKind::Forbidden => Err(e.into()),
            Err(e) => {
                tracing::warn!(error = %e, "invoice lookup for payment status failed");
                Ok(PaymentStatusView::unrecorded(
                    invoice_id,
                    PaymentStatus::Error,
                    format!("Failed to get payment status: {e}"),
                ))
            }
        }
    }

    async fn cache_invoice_status(&self, invoice: &InvoiceSummary) -> Result<PaymentTransaction> {
        let lookup_ref = format!("lookup:{}", invoice.invoice_id);
        let record = NewPaymentTransaction {
            provider_txn_ref: lookup_ref.clone(),
            invoice_id: invoice.invoice_id,
            user_id: Some(invoice.user_id),
            amount: invoice.total_amount,
            status: PaymentStatus::from(invoice.status),
            bank_code: None,
            error_message: None,
        };

        match self.store.insert(record).await {
            Ok(transaction) => Ok(transaction),
            Err(DomainError::Conflict(_)) => self
                .store
                .find_by_ref(&lookup_ref)
                .await?
                .ok_or_else(|| DomainError::not_found("PaymentTransaction", &lookup_ref).into()),
            Err(e) => Err(e.into()),
        }
    }
}

fn reject(invoice: &str, reason: &str) -> PaymentError {
    metrics::counter!("payment_callbacks_total", "outcome" => "invalid_signature").increment(1);
    tracing::error!(invoice_id = %invoice, reason, "payment callback rejected");
    PaymentError::InvalidSignature(reason.to_string())
}

fn required<'a>(params: &'a BTreeMap<String, String>, name: &'static str) -> Result<&'a str> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .ok_or(PaymentError::MissingParameter(name))
}

fn optional(params: &BTreeMap<String, String>, name: &str) -> Option<String> {
    params.get(name).filter(|value| !value.is_empty()).cloned()
}

/// An 8-digit reference for the gateway's `vnp_TxnRef`.
fn new_txn_ref() -> String {
    format!("{:08}", Uuid::new_v4().as_u128() % 100_000_000)
}

fn event_data(transaction: &PaymentTransaction, invoice: Option<&InvoiceSummary>) -> PaymentEventData {
    PaymentEventData {
        transaction_id: transaction.provider_txn_ref.clone(),
        invoice_id: transaction.invoice_id,
        user_id: transaction.user_id,
        amount: transaction.amount,
        status: transaction.status,
        payment_method: PAYMENT_METHOD.to_string(),
        bank_code: transaction.bank_code.clone(),
        provider_transaction_no: transaction.provider_transaction_no.clone(),
        error_code: transaction.error_code.clone(),
        error_message: transaction.error_message.clone(),
        customer_email: invoice.and_then(|i| i.customer_email.clone()),
        customer_name: invoice.and_then(|i| i.customer_name.clone()),
        payment_url: None,
    }
}
