//! Gateway settings and request parameters for the hosted payment page.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use common::{InvoiceId, Money};
use url::Url;

use crate::signing::{SECURE_HASH, Signer, query_string};

/// Gateway timestamps are local time in UTC+7.
const GATEWAY_UTC_OFFSET_HOURS: i64 = 7;
/// How long a payment page stays valid.
pub const SESSION_TTL_MINUTES: i64 = 15;

/// Merchant settings for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub pay_url: Url,
    pub tmn_code: String,
    pub hash_secret: String,
    /// Where the gateway redirects the customer; `invoiceId` is appended.
    pub return_url: String,
    pub version: String,
    pub command: String,
    pub currency: String,
    pub default_locale: String,
}

impl GatewayConfig {
    pub fn new(
        pay_url: Url,
        tmn_code: impl Into<String>,
        hash_secret: impl Into<String>,
        return_url: impl Into<String>,
    ) -> Self {
        Self {
            pay_url,
            tmn_code: tmn_code.into(),
            hash_secret: hash_secret.into(),
            return_url: return_url.into(),
            version: "2.1.0".to_string(),
            command: "pay".to_string(),
            currency: "VND".to_string(),
            default_locale: "vn".to_string(),
        }
    }
}

/// One payment page request, before signing.
#[derive(Debug, Clone)]
pub(crate) struct SessionParams<'a> {
    pub invoice_id: InvoiceId,
    pub txn_ref: &'a str,
    pub amount: Money,
    pub bank_code: Option<&'a str>,
    pub return_url: Option<&'a str>,
    pub locale: Option<&'a str>,
    pub order_info: Option<&'a str>,
    pub client_ip: &'a str,
    pub now: DateTime<Utc>,
}

fn gateway_time(at: DateTime<Utc>) -> String {
    (at.naive_utc() + Duration::hours(GATEWAY_UTC_OFFSET_HOURS))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// Appends `invoiceId` to a return URL, keeping any existing query.
fn return_url_for(base: &str, invoice_id: InvoiceId) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}invoiceId={invoice_id}")
}

impl GatewayConfig {
    /// The unsigned parameter set of a payment page request.
    pub(crate) fn session_params(&self, session: &SessionParams<'_>) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            params.insert(key.to_string(), value);
        };

        put("vnp_Version", self.version.clone());
        put("vnp_Command", self.command.clone());
        put("vnp_TmnCode", self.tmn_code.clone());
        put("vnp_Amount", session.amount.cents().to_string());
        put("vnp_CurrCode", self.currency.clone());
        put("vnp_TxnRef", session.txn_ref.to_string());
        put(
            "vnp_OrderInfo",
            session
                .order_info
                .map(str::to_string)
                .unwrap_or_else(|| format!("Thanh toan don hang:{}", session.invoice_id)),
        );
        put("vnp_OrderType", "other".to_string());
        put(
            "vnp_Locale",
            session.locale.unwrap_or(self.default_locale.as_str()).to_string(),
        );
        put(
            "vnp_ReturnUrl",
            return_url_for(
                session.return_url.unwrap_or(self.return_url.as_str()),
                session.invoice_id,
            ),
        );
        put("vnp_IpAddr", session.client_ip.to_string());
        put("vnp_CreateDate", gateway_time(session.now));
        put(
            "vnp_ExpireDate",
            gateway_time(session.now + Duration::minutes(SESSION_TTL_MINUTES)),
        );
        if let Some(bank_code) = session.bank_code.filter(|code| !code.is_empty()) {
            put("vnp_BankCode", bank_code.to_string());
        }

        params
    }

    /// The signed redirect URL for `params`.
    pub(crate) fn payment_url(&self, signer: &Signer, params: &BTreeMap<String, String>) -> String {
        let hash = signer.sign(params);
        format!(
            "{}?{}&{SECURE_HASH}={hash}",
            self.pay_url.as_str().trim_end_matches('?'),
            query_string(params)
        )
    }
}
