//! Payment adapter tests against in-memory invoices, payments and bus.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::{InvoiceId, Money, Principal, ProductId, RetryPolicy, Role, UserId};
use domain::events::PaymentEvent;
use domain::{
    CreateInvoiceRequest, ErrorKind, InMemoryInvoiceStore, InMemoryPaymentStore,
    InvoiceLineRequest, InvoiceService, InvoiceStatus, PaymentStatus, PaymentStore,
};
use event_bus::topology::routing_keys;
use event_bus::{EventPublisher, InMemoryEventBus};
use payment::{GatewayConfig, PaymentAdapter, PaymentError, PaymentRequest, Signer};
use url::Url;

const SECRET: &str = "test-hash-secret";

type Invoices = InvoiceService<InMemoryInvoiceStore, InMemoryEventBus>;
type Adapter = PaymentAdapter<Arc<InMemoryPaymentStore>, Arc<Invoices>, InMemoryEventBus>;

struct Harness {
    bus: InMemoryEventBus,
    invoices: Arc<Invoices>,
    payments: Arc<InMemoryPaymentStore>,
    adapter: Adapter,
}

fn fast() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(1)
        .initial_delay(Duration::from_millis(1))
        .build()
}

async fn harness() -> Harness {
    let bus = InMemoryEventBus::with_standard_topology().await;
    let publisher = EventPublisher::new(bus.clone(), fast());
    let invoices = Arc::new(InvoiceService::new(
        InMemoryInvoiceStore::new(),
        publisher.clone(),
    ));
    let payments = Arc::new(InMemoryPaymentStore::new());
    let config = GatewayConfig::new(
        Url::parse("https://sandbox.vnpayment.vn/paymentv2/vpcpay.html").unwrap(),
        "TMN01",
        SECRET,
        "http://shop.local/payment/return",
    );
    let adapter =
        PaymentAdapter::new(payments.clone(), invoices.clone(), publisher, config).unwrap();

    Harness {
        bus,
        invoices,
        payments,
        adapter,
    }
}

fn customer() -> Principal {
    Principal::new(UserId::new(3), vec![Role::User], "customer-token")
}

async fn pending_invoice(h: &Harness) -> InvoiceId {
    let request = CreateInvoiceRequest {
        user_id: UserId::new(3),
        ship_address: "9 Le Loi".to_string(),
        total_amount: None,
        customer_email: Some("minh@example.com".to_string()),
        customer_name: Some("Minh".to_string()),
        items: vec![InvoiceLineRequest {
            product_id: ProductId::new(1),
            product_name: "Runner".to_string(),
            quantity: 2,
            price: Money::from_cents(1_250),
        }],
    };
    h.invoices.create_from_cart(&request).await.unwrap().id
}

/// What the gateway sends back, signed the way the gateway signs it.
fn callback(invoice_id: InvoiceId, txn_ref: &str, response_code: &str) -> BTreeMap<String, String> {
    let mut params: BTreeMap<String, String> = [
        ("vnp_Amount", "2500"),
        ("vnp_BankCode", "NCB"),
        ("vnp_OrderInfo", "Thanh toan don hang"),
        ("vnp_ResponseCode", response_code),
        ("vnp_TmnCode", "TMN01"),
        ("vnp_TransactionNo", "14226112"),
        ("vnp_TransactionStatus", response_code),
        ("vnp_TxnRef", txn_ref),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let hash = Signer::new(SECRET).unwrap().sign(&params);
    params.insert("vnp_SecureHash".to_string(), hash);
    params.insert("vnp_SecureHashType".to_string(), "HmacSHA512".to_string());
    params.insert("invoiceId".to_string(), invoice_id.to_string());
    params
}

async fn payment_events(h: &Harness, event_type: &str) -> usize {
    h.bus
        .published_of_type(routing_keys::INVOICE_PAYMENT_EVENTS, event_type)
        .await
        .len()
}

mod sessions {
    use super::*;

    #[tokio::test]
    async fn session_stores_pending_transaction_and_signs_url() {
        let h = harness().await;
        let invoice_id = pending_invoice(&h).await;

        let session = h
            .adapter
            .create_payment_session(&PaymentRequest::for_invoice(invoice_id), &customer(), "10.0.0.1")
            .await
            .unwrap();

        assert_eq!(session.amount, Money::from_cents(2_500));
        assert_eq!(session.transaction_ref.len(), 8);
        assert!(session.payment_url.contains("vnp_Amount=2500"));
        assert!(session.payment_url.contains(&format!("vnp_TxnRef={}", session.transaction_ref)));
        assert!(session.payment_url.contains("vnp_SecureHash="));

        let stored = h
            .payments
            .find_by_ref(&session.transaction_ref)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(stored.user_id, Some(UserId::new(3)));

        let initialized = h
            .bus
            .published_of_type(routing_keys::PAYMENT_EVENTS, "PAYMENT_INITIALIZED")
            .await;
        assert_eq!(initialized.len(), 1);
        let event: PaymentEvent = initialized[0].decode().unwrap();
        assert_eq!(event.data().payment_url.as_deref(), Some(session.payment_url.as_str()));
    }

    #[tokio::test]
    async fn amount_must_match_invoice_total() {
        let h = harness().await;
        let invoice_id = pending_invoice(&h).await;
        let mut request = PaymentRequest::for_invoice(invoice_id);
        request.amount = Some(Money::from_cents(100));

        let err = h
            .adapter
            .create_payment_session(&request, &customer(), "10.0.0.1")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(h.payments.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_invoice_is_not_found() {
        let h = harness().await;
        let err = h
            .adapter
            .create_payment_session(
                &PaymentRequest::for_invoice(InvoiceId::new(404)),
                &customer(),
                "10.0.0.1",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvoiceNotFound(_)));
    }

    #[tokio::test]
    async fn stranger_cannot_pay_someone_elses_invoice() {
        let h = harness().await;
        let invoice_id = pending_invoice(&h).await;
        let stranger = Principal::new(UserId::new(99), vec![Role::User], "t");

        let err = h
            .adapter
            .create_payment_session(&PaymentRequest::for_invoice(invoice_id), &stranger, "10.0.0.1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn paid_invoice_refuses_new_session() {
        let h = harness().await;
        let invoice_id = pending_invoice(&h).await;
        h.invoices
            .update_status(invoice_id, InvoiceStatus::Paid, Some("T1"))
            .await
            .unwrap();

        let err = h
            .adapter
            .create_payment_session(&PaymentRequest::for_invoice(invoice_id), &customer(), "10.0.0.1")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::AlreadyPaid(_)));
    }
}

mod callbacks {
    use super::*;

    async fn session(h: &Harness) -> (InvoiceId, String) {
        let invoice_id = pending_invoice(h).await;
        let session = h
            .adapter
            .create_payment_session(&PaymentRequest::for_invoice(invoice_id), &customer(), "10.0.0.1")
            .await
            .unwrap();
        (invoice_id, session.transaction_ref)
    }

    #[tokio::test]
    async fn successful_callback_completes_payment_once() {
        let h = harness().await;
        let (invoice_id, txn_ref) = session(&h).await;
        let params = callback(invoice_id, &txn_ref, "00");

        let first = h.adapter.handle_callback(&params).await.unwrap();
        assert!(first.success);
        assert!(!first.duplicate);
        assert_eq!(first.status, PaymentStatus::Paid);

        let second = h.adapter.handle_callback(&params).await.unwrap();
        assert!(second.duplicate);
        assert_eq!(second.status, PaymentStatus::Paid);

        assert_eq!(payment_events(&h, "PAYMENT_COMPLETED").await, 1);

        let stored = h.payments.find_by_ref(&txn_ref).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Paid);
        assert_eq!(stored.provider_transaction_no.as_deref(), Some("14226112"));
        assert_eq!(stored.bank_code.as_deref(), Some("NCB"));

        let completed = h
            .bus
            .published_of_type(routing_keys::EMAIL_PAYMENT_EVENTS, "PAYMENT_COMPLETED")
            .await;
        let event: PaymentEvent = completed[0].decode().unwrap();
        assert_eq!(event.data().customer_email.as_deref(), Some("minh@example.com"));
    }

    #[tokio::test]
    async fn declined_callback_fails_payment() {
        let h = harness().await;
        let (invoice_id, txn_ref) = session(&h).await;

        let outcome = h
            .adapter
            .handle_callback(&callback(invoice_id, &txn_ref, "24"))
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.status, PaymentStatus::PaymentFailed);
        assert_eq!(payment_events(&h, "PAYMENT_FAILED").await, 1);

        let stored = h.payments.find_by_ref(&txn_ref).await.unwrap().unwrap();
        assert_eq!(stored.error_code.as_deref(), Some("24"));
    }

    #[tokio::test]
    async fn tampered_amount_is_rejected_and_changes_nothing() {
        let h = harness().await;
        let (invoice_id, txn_ref) = session(&h).await;
        let mut params = callback(invoice_id, &txn_ref, "00");
        params.insert("vnp_Amount".to_string(), "2501".to_string());

        let err = h.adapter.handle_callback(&params).await.unwrap_err();

        assert!(matches!(err, PaymentError::InvalidSignature(_)));
        assert_eq!(err.kind(), ErrorKind::Security);
        let stored = h.payments.find_by_ref(&txn_ref).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(payment_events(&h, "PAYMENT_COMPLETED").await, 0);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let h = harness().await;
        let (invoice_id, txn_ref) = session(&h).await;
        let mut params = callback(invoice_id, &txn_ref, "00");
        params.remove("vnp_SecureHash");

        let err = h.adapter.handle_callback(&params).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(_)));
    }

    #[tokio::test]
    async fn reference_of_another_invoice_is_rejected() {
        let h = harness().await;
        let (_, txn_ref) = session(&h).await;
        let other = pending_invoice(&h).await;

        let err = h
            .adapter
            .handle_callback(&callback(other, &txn_ref, "00"))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::InvalidSignature(_)));
        let stored = h.payments.find_by_ref(&txn_ref).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_reference_is_rejected() {
        let h = harness().await;
        let invoice_id = pending_invoice(&h).await;

        let err = h
            .adapter
            .handle_callback(&callback(invoice_id, "00000000", "00"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(_)));
    }

    #[tokio::test]
    async fn missing_invoice_id_is_a_bad_request() {
        let h = harness().await;
        let (invoice_id, txn_ref) = session(&h).await;
        let mut params = callback(invoice_id, &txn_ref, "00");
        params.remove("invoiceId");

        let err = h.adapter.handle_callback(&params).await.unwrap_err();
        assert!(matches!(err, PaymentError::MissingParameter("invoiceId")));
    }

    #[tokio::test]
    async fn late_decline_after_success_is_a_duplicate() {
        let h = harness().await;
        let (invoice_id, txn_ref) = session(&h).await;

        h.adapter
            .handle_callback(&callback(invoice_id, &txn_ref, "00"))
            .await
            .unwrap();
        let late = h
            .adapter
            .handle_callback(&callback(invoice_id, &txn_ref, "24"))
            .await
            .unwrap();

        assert!(late.duplicate);
        assert_eq!(late.status, PaymentStatus::Paid);
        assert_eq!(payment_events(&h, "PAYMENT_FAILED").await, 0);
    }

    #[tokio::test]
    async fn retried_callback_publishes_settlement_lost_to_an_outage() {
        let h = harness().await;
        let (invoice_id, txn_ref) = session(&h).await;
        let params = callback(invoice_id, &txn_ref, "00");

        h.bus.set_unavailable(true);
        assert!(h.adapter.handle_callback(&params).await.is_err());
        h.bus.set_unavailable(false);

        let stored = h.payments.find_by_ref(&txn_ref).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Paid);
        assert!(!stored.settlement_published);
        assert_eq!(payment_events(&h, "PAYMENT_COMPLETED").await, 0);

        let retry = h.adapter.handle_callback(&params).await.unwrap();
        assert!(retry.duplicate);
        assert_eq!(retry.status, PaymentStatus::Paid);
        assert_eq!(payment_events(&h, "PAYMENT_COMPLETED").await, 1);

        let stored = h.payments.find_by_ref(&txn_ref).await.unwrap().unwrap();
        assert!(stored.settlement_published);

        h.adapter.handle_callback(&params).await.unwrap();
        assert_eq!(payment_events(&h, "PAYMENT_COMPLETED").await, 1);
    }

    #[tokio::test]
    async fn retry_after_outage_announces_the_stored_outcome() {
        let h = harness().await;
        let (invoice_id, txn_ref) = session(&h).await;

        h.bus.set_unavailable(true);
        assert!(h
            .adapter
            .handle_callback(&callback(invoice_id, &txn_ref, "24"))
            .await
            .is_err());
        h.bus.set_unavailable(false);

        let retry = h
            .adapter
            .handle_callback(&callback(invoice_id, &txn_ref, "00"))
            .await
            .unwrap();

        assert!(retry.duplicate);
        assert_eq!(retry.status, PaymentStatus::PaymentFailed);
        assert_eq!(payment_events(&h, "PAYMENT_FAILED").await, 1);
        assert_eq!(payment_events(&h, "PAYMENT_COMPLETED").await, 0);
    }

    #[tokio::test]
    async fn non_numeric_invoice_id_is_rejected_as_tampering() {
        let h = harness().await;
        let (invoice_id, txn_ref) = session(&h).await;
        let mut params = callback(invoice_id, &txn_ref, "00");
        params.insert("invoiceId".to_string(), format!("{invoice_id}x"));

        let err = h.adapter.handle_callback(&params).await.unwrap_err();

        assert!(matches!(err, PaymentError::InvalidSignature(_)));
        assert_eq!(err.kind(), ErrorKind::Security);
    }

    #[tokio::test]
    async fn unknown_hash_type_is_rejected() {
        let h = harness().await;
        let (invoice_id, txn_ref) = session(&h).await;
        let mut params = callback(invoice_id, &txn_ref, "00");
        params.insert("vnp_SecureHashType".to_string(), "MD5".to_string());

        let err = h.adapter.handle_callback(&params).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(_)));

        params.insert("vnp_SecureHashType".to_string(), "SHA512".to_string());
        assert!(h.adapter.handle_callback(&params).await.unwrap().success);
    }

    /// Replaces the character at `index` with one that differs from it in
    /// any letter case.
    fn alter_char(value: &str, index: usize) -> String {
        value
            .char_indices()
            .map(|(i, c)| {
                if i != index {
                    c
                } else if c.eq_ignore_ascii_case(&'z') {
                    'y'
                } else {
                    'z'
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn altering_any_character_of_any_parameter_is_rejected() {
        let h = harness().await;
        let (invoice_id, txn_ref) = session(&h).await;
        let genuine = callback(invoice_id, &txn_ref, "00");

        for (name, value) in &genuine {
            for index in 0..value.len() {
                let mut params = genuine.clone();
                params.insert(name.clone(), alter_char(value, index));

                let err = h.adapter.handle_callback(&params).await.unwrap_err();
                assert!(
                    matches!(err, PaymentError::InvalidSignature(_)),
                    "{name} altered at {index} gave {err:?}"
                );
            }
        }

        let stored = h.payments.find_by_ref(&txn_ref).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(payment_events(&h, "PAYMENT_COMPLETED").await, 0);
        assert_eq!(payment_events(&h, "PAYMENT_FAILED").await, 0);

        assert!(h.adapter.handle_callback(&genuine).await.unwrap().success);
    }
}

mod status {
    use super::*;

    #[tokio::test]
    async fn latest_transaction_wins() {
        let h = harness().await;
        let invoice_id = pending_invoice(&h).await;
        let session = h
            .adapter
            .create_payment_session(&PaymentRequest::for_invoice(invoice_id), &customer(), "10.0.0.1")
            .await
            .unwrap();

        let view = h.adapter.get_status(invoice_id, Some(&customer())).await.unwrap();

        assert_eq!(view.status, PaymentStatus::Pending);
        assert_eq!(view.transaction_ref.as_deref(), Some(session.transaction_ref.as_str()));
    }

    #[tokio::test]
    async fn invoice_status_is_fetched_once_and_cached() {
        let h = harness().await;
        let invoice_id = pending_invoice(&h).await;

        let view = h.adapter.get_status(invoice_id, Some(&customer())).await.unwrap();
        assert_eq!(view.status, PaymentStatus::Pending);
        assert_eq!(h.payments.len().await, 1);

        h.adapter.get_status(invoice_id, Some(&customer())).await.unwrap();
        assert_eq!(h.payments.len().await, 1);
    }

    #[tokio::test]
    async fn missing_invoice_is_unknown_and_not_cached() {
        let h = harness().await;

        let view = h.adapter.get_status(InvoiceId::new(404), None).await.unwrap();

        assert_eq!(view.status, PaymentStatus::Unknown);
        assert!(view.transaction_ref.is_none());
        assert!(h.payments.is_empty().await);
    }

    #[tokio::test]
    async fn stranger_cannot_read_status() {
        let h = harness().await;
        let invoice_id = pending_invoice(&h).await;
        h.adapter
            .create_payment_session(&PaymentRequest::for_invoice(invoice_id), &customer(), "10.0.0.1")
            .await
            .unwrap();
        let stranger = Principal::new(UserId::new(99), vec![Role::User], "t");

        let err = h
            .adapter
            .get_status(invoice_id, Some(&stranger))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
