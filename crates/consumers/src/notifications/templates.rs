use chrono::{DateTime, Utc};
use domain::events::{InvoiceEvent, PaymentEvent, UserEvent};
use serde::Serialize;

const SIGNATURE: &str = "ShopShoes Team";

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// A rendered email without its recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Draft {
    pub template: &'static str,
    pub subject: String,
    pub body: String,
}

impl Draft {
    pub fn addressed_to(self, to: String) -> EmailMessage {
        EmailMessage {
            to,
            subject: self.subject,
            body: self.body,
        }
    }
}

fn greeting(name: Option<&str>) -> &str {
    name.filter(|n| !n.trim().is_empty()).unwrap_or("Customer")
}

fn date(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

pub(crate) fn payment(event: &PaymentEvent) -> Draft {
    let data = event.data();
    let name = greeting(data.customer_name.as_deref());
    let order = data.invoice_id;

    match event {
        PaymentEvent::PaymentInitialized(_) => Draft {
            template: "payment_initialized",
            subject: format!("Payment Initiated - Order #{order}"),
            body: format!(
                "Dear {name},\n\n\
                 We have received your payment request for order #{order}.\n\
                 Amount: {}\n\
                 Payment Method: {}\n\n\
                 Your payment is being processed. We will notify you once it's completed.\n\n\
                 Thank you for shopping with us!\n\
                 {SIGNATURE}",
                data.amount, data.payment_method
            ),
        },
        PaymentEvent::PaymentCompleted(_) => Draft {
            template: "payment_completed",
            subject: format!("Payment Confirmed - Order #{order}"),
            body: format!(
                "Dear {name},\n\n\
                 Your payment for order #{order} has been successfully processed.\n\
                 Amount: {}\n\
                 Payment Method: {}\n\
                 Transaction ID: {}\n\n\
                 Thank you for your purchase!\n\
                 {SIGNATURE}",
                data.amount, data.payment_method, data.transaction_id
            ),
        },
        PaymentEvent::PaymentFailed(_) => Draft {
            template: "payment_failed",
            subject: format!("Payment Failed - Order #{order}"),
            body: format!(
                "Dear {name},\n\n\
                 We're sorry, but your payment for order #{order} could not be processed.\n\
                 Amount: {}\n\
                 Payment Method: {}\n\
                 Error: {}\n\n\
                 Please try again or contact our customer support for assistance.\n\n\
                 {SIGNATURE}",
                data.amount,
                data.payment_method,
                data.error_message.as_deref().unwrap_or("Unknown error")
            ),
        },
    }
}

pub(crate) fn invoice(event: &InvoiceEvent) -> Draft {
    let data = event.data();
    let name = greeting(data.customer_name.as_deref());
    let order = data.invoice_id;

    match event {
        InvoiceEvent::InvoiceCreated(_) => {
            let items: String = data
                .items
                .iter()
                .map(|item| {
                    format!("- {} x{}: ${}\n", item.product_name, item.quantity, item.price)
                })
                .collect();
            Draft {
                template: "invoice_created",
                subject: format!("Your Order #{order} has been placed"),
                body: format!(
                    "Dear {name},\n\n\
                     Thank you for your order!\n\n\
                     Order #{order}\n\
                     Date: {}\n\
                     Total Amount: ${}\n\n\
                     Items:\n{items}\n\
                     Please proceed to payment to complete your order.\n\n\
                     {SIGNATURE}",
                    date(&data.order_date),
                    data.total_amount
                ),
            }
        }
        InvoiceEvent::InvoiceUpdated(_) => Draft {
            template: "invoice_updated",
            subject: format!("Order #{order} Status Update"),
            body: format!(
                "Dear {name},\n\n\
                 Your order #{order} has been updated. The current status is: {}\n\n\
                 Order Details:\n\
                 Date: {}\n\
                 Total Amount: ${}\n\n\
                 If you have any questions, please contact our customer support.\n\n\
                 {SIGNATURE}",
                data.status,
                date(&data.order_date),
                data.total_amount
            ),
        },
    }
}

pub(crate) fn user(event: &UserEvent, reset_url: &str) -> Draft {
    let data = event.data();
    let name = data
        .full_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(data.username.as_str());

    match event {
        UserEvent::UserRegistered(_) => Draft {
            template: "welcome",
            subject: "Welcome to ShopShoes!".to_string(),
            body: format!(
                "Dear {name},\n\n\
                 Welcome to ShopShoes! We're excited to have you as a new customer.\n\n\
                 Your account has been successfully created. You can now log in and start shopping.\n\n\
                 Username: {}\n\n\
                 Thank you for joining us!\n\
                 {SIGNATURE}",
                data.username
            ),
        },
        UserEvent::PasswordResetRequested(_) => {
            let link = format!(
                "{reset_url}?token={}",
                data.reset_token.as_deref().unwrap_or_default()
            );
            let expiry = data
                .token_expiry
                .as_ref()
                .map_or_else(|| "soon".to_string(), date);
            Draft {
                template: "password_reset",
                subject: "Password Reset Request".to_string(),
                body: format!(
                    "Dear {name},\n\n\
                     We received a request to reset your password. To reset your password, click on the link below:\n\n\
                     {link}\n\n\
                     This link will expire on {expiry}.\n\n\
                     If you did not request a password reset, please ignore this email or contact our support team.\n\n\
                     {SIGNATURE}"
                ),
            }
        }
    }
}
