use std::time::Duration;

use async_trait::async_trait;
use common::{InvoiceId, Money, Principal, ProductId, RetryPolicy, UserId, retry_if};
use domain::{
    CreateInvoiceRequest, DomainError, ErrorKind, InventoryChange, InventoryGateway,
    InvoiceGateway, InvoiceLookup, InvoiceReceipt, InvoiceStatus, InvoiceSummary, ProductCatalog,
    ProductSnapshot, Result,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

const INVOICE_SERVICE: &str = "invoice-service";
const PRODUCT_SERVICE: &str = "product-service";

/// Connection settings for [`HttpPeerClient`].
#[derive(Debug, Clone)]
pub struct PeerClientConfig {
    pub base_url: Url,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Applied to transient failures only: 5xx, connect errors and timeouts.
    pub retry: RetryPolicy,
    /// Sent on calls made without a caller, such as the payment adapter's
    /// invoice lookup from a gateway callback.
    pub service_token: Option<String>,
}

impl PeerClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(100))
                .build(),
            service_token: None,
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_service_token(mut self, token: impl Into<String>) -> Self {
        self.service_token = Some(token.into());
        self
    }
}

/// HTTP implementation of the invoice and product ports.
///
/// The caller's bearer token is forwarded on every call. 4xx answers
/// surface as [`DomainError::Rejected`] and are never retried.
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
    service_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceBody {
    id: InvoiceId,
    user_id: UserId,
    status: InvoiceStatus,
    total_amount: Money,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductBody {
    product_id: ProductId,
    name: String,
    price: Money,
    quantity: i64,
}

impl HttpPeerClient {
    pub fn new(config: PeerClientConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url,
            retry: config.retry,
            service_token: config.service_token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| DomainError::Validation(format!("invalid peer path {path}: {e}")))
    }

    fn request(&self, method: Method, url: &Url, token: Option<&str>) -> RequestBuilder {
        let builder = self.client.request(method, url.clone());
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends the request built by `build`, retrying transient failures, and
    /// decodes a successful body.
    async fn call<T, F>(&self, dependency: &'static str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        retry_if(
            &self.retry,
            || self.attempt(dependency, build()),
            |e: &DomainError| e.kind() == ErrorKind::TransientDependency,
        )
        .await
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        dependency: &'static str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(dependency, e))?;
        let response = check_status(dependency, response).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(dependency, e))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn transport_error(dependency: &str, error: reqwest::Error) -> DomainError {
    if error.is_builder() {
        return DomainError::Validation(format!("{dependency} request is invalid: {error}"));
    }
    let reason = if error.is_timeout() {
        format!("timed out: {error}")
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    };
    DomainError::transient(dependency, reason)
}

async fn check_status(dependency: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let reason = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
    };

    if status.is_server_error() {
        Err(DomainError::transient(dependency, format!("{status}: {reason}")))
    } else {
        Err(DomainError::Rejected {
            dependency: dependency.to_string(),
            status: status.as_u16(),
            reason,
        })
    }
}

#[async_trait]
impl InvoiceGateway for HttpPeerClient {
    #[tracing::instrument(skip(self, request, principal), fields(user_id = %request.user_id))]
    async fn create_from_cart(
        &self,
        request: &CreateInvoiceRequest,
        principal: &Principal,
    ) -> Result<InvoiceReceipt> {
        let url = self.endpoint("invoices/create-from-cart")?;
        let invoice: InvoiceBody = self
            .call(INVOICE_SERVICE, || {
                self.request(Method::POST, &url, Some(principal.bearer_token()))
                    .json(request)
            })
            .await?;

        Ok(InvoiceReceipt {
            invoice_id: invoice.id,
            total_amount: invoice.total_amount,
            status: invoice.status,
        })
    }
}

#[async_trait]
impl InvoiceLookup for HttpPeerClient {
    async fn find_invoice(
        &self,
        invoice_id: InvoiceId,
        principal: Option<&Principal>,
    ) -> Result<Option<InvoiceSummary>> {
        let url = self.endpoint(&format!("invoices/{invoice_id}"))?;
        let token = principal
            .map(|p| p.bearer_token())
            .or(self.service_token.as_deref());

        let result: Result<InvoiceBody> = self
            .call(INVOICE_SERVICE, || self.request(Method::GET, &url, token))
            .await;

        match result {
            Ok(invoice) => Ok(Some(InvoiceSummary {
                invoice_id: invoice.id,
                user_id: invoice.user_id,
                status: invoice.status,
                total_amount: invoice.total_amount,
                customer_email: invoice.customer_email,
                customer_name: invoice.customer_name,
            })),
            Err(DomainError::Rejected { status, .. }) if status == StatusCode::NOT_FOUND => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl InventoryGateway for HttpPeerClient {
    #[tracing::instrument(skip(self, principal))]
    async fn adjust(
        &self,
        product_id: ProductId,
        delta: i64,
        principal: &Principal,
    ) -> Result<InventoryChange> {
        let url = self.endpoint(&format!("products/{product_id}/inventory"))?;
        let body = serde_json::json!({ "delta": delta });

        self.call(PRODUCT_SERVICE, || {
            self.request(Method::PATCH, &url, Some(principal.bearer_token()))
                .json(&body)
        })
        .await
    }
}

#[async_trait]
impl ProductCatalog for HttpPeerClient {
    async fn product(
        &self,
        product_id: ProductId,
        principal: &Principal,
    ) -> Result<ProductSnapshot> {
        let url = self.endpoint(&format!("products/{product_id}"))?;
        let product: ProductBody = self
            .call(PRODUCT_SERVICE, || {
                self.request(Method::GET, &url, Some(principal.bearer_token()))
            })
            .await?;

        Ok(ProductSnapshot {
            id: product.product_id,
            name: product.name,
            price: product.price,
            quantity: product.quantity,
        })
    }
}
