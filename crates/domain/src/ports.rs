//! Seams between services.
//!
//! The checkout orchestrator and the payment adapter talk to the invoice and
//! product services through these traits. In a single process they are
//! implemented by [`InvoiceService`](crate::InvoiceService) and
//! [`InventoryService`](crate::InventoryService); across processes by the
//! HTTP clients in the `checkout` crate. Every call carries the caller's
//! [`Principal`] so authorization is never bypassed.

use std::sync::Arc;

use async_trait::async_trait;
use common::{InvoiceId, Money, Principal, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::inventory::InventoryChange;
use crate::invoice::InvoiceStatus;

/// What the cart needs to know about a product when pricing a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLineRequest {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub price: Money,
}

/// Body of the create-invoice-from-cart call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    pub user_id: UserId,
    pub ship_address: String,
    /// When present, used verbatim as the invoice total.
    #[serde(default)]
    pub total_amount: Option<Money>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub items: Vec<InvoiceLineRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceReceipt {
    pub invoice_id: InvoiceId,
    pub total_amount: Money,
    pub status: InvoiceStatus,
}

/// What the payment adapter needs to know about an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSummary {
    pub invoice_id: InvoiceId,
    pub user_id: UserId,
    pub status: InvoiceStatus,
    pub total_amount: Money,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn product(&self, product_id: ProductId, principal: &Principal)
    -> Result<ProductSnapshot>;
}

#[async_trait]
pub trait InvoiceGateway: Send + Sync {
    async fn create_from_cart(
        &self,
        request: &CreateInvoiceRequest,
        principal: &Principal,
    ) -> Result<InvoiceReceipt>;
}

#[async_trait]
pub trait InventoryGateway: Send + Sync {
    /// Applies a signed stock delta, clamped at zero.
    async fn adjust(
        &self,
        product_id: ProductId,
        delta: i64,
        principal: &Principal,
    ) -> Result<InventoryChange>;
}

#[async_trait]
pub trait InvoiceLookup: Send + Sync {
    /// Returns `None` when the invoice does not exist. A principal, when
    /// given, must be allowed to read the invoice.
    async fn find_invoice(
        &self,
        invoice_id: InvoiceId,
        principal: Option<&Principal>,
    ) -> Result<Option<InvoiceSummary>>;
}

#[async_trait]
impl<T: ProductCatalog + ?Sized> ProductCatalog for Arc<T> {
    async fn product(
        &self,
        product_id: ProductId,
        principal: &Principal,
    ) -> Result<ProductSnapshot> {
        (**self).product(product_id, principal).await
    }
}

#[async_trait]
impl<T: InvoiceGateway + ?Sized> InvoiceGateway for Arc<T> {
    async fn create_from_cart(
        &self,
        request: &CreateInvoiceRequest,
        principal: &Principal,
    ) -> Result<InvoiceReceipt> {
        (**self).create_from_cart(request, principal).await
    }
}

#[async_trait]
impl<T: InventoryGateway + ?Sized> InventoryGateway for Arc<T> {
    async fn adjust(
        &self,
        product_id: ProductId,
        delta: i64,
        principal: &Principal,
    ) -> Result<InventoryChange> {
        (**self).adjust(product_id, delta, principal).await
    }
}

#[async_trait]
impl<T: InvoiceLookup + ?Sized> InvoiceLookup for Arc<T> {
    async fn find_invoice(
        &self,
        invoice_id: InvoiceId,
        principal: Option<&Principal>,
    ) -> Result<Option<InvoiceSummary>> {
        (**self).find_invoice(invoice_id, principal).await
    }
}
