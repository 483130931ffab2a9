//! Request signing for the payment gateway.
//!
//! The signed payload is the canonical query string: parameters sorted by
//! key, empty values dropped, each value form-urlencoded (space as `+`),
//! joined as `key=value` pairs with `&`. The signature is the lowercase hex
//! HMAC-SHA512 of that string under the merchant's hash secret.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha512;
use url::form_urlencoded;

use crate::error::{PaymentError, Result};

type HmacSha512 = Hmac<Sha512>;

/// Parameter carrying the signature.
pub const SECURE_HASH: &str = "vnp_SecureHash";
/// Parameter naming the hash algorithm, never signed.
pub const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// The string that gets signed.
pub fn canonical_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{key}={}", encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// The query string sent to the gateway: keys and values encoded, in the
/// same order as the canonical string.
pub fn query_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// HMAC-SHA512 signer keyed with the merchant hash secret.
#[derive(Clone)]
pub struct Signer {
    mac: HmacSha512,
}

impl Signer {
    pub fn new(secret: &str) -> Result<Self> {
        let mac = HmacSha512::new_from_slice(secret.as_bytes())
            .map_err(|e| PaymentError::Configuration(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Signs the canonical form of `params`.
    pub fn sign(&self, params: &BTreeMap<String, String>) -> String {
        let mut mac = self.mac.clone();
        mac.update(canonical_string(params).as_bytes());
        format!("{:x}", mac.finalize().into_bytes())
    }

    /// Checks `provided` against the signature of `params` in constant time.
    ///
    /// Hex case is ignored; anything that is not hex fails.
    pub fn verify(&self, params: &BTreeMap<String, String>, provided: &str) -> bool {
        let Some(provided) = decode_hex(provided) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(canonical_string(params).as_bytes());
        mac.verify_slice(&provided).is_ok()
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn canonical_string_sorts_and_skips_empty_values() {
        let p = params(&[
            ("vnp_TxnRef", "12345678"),
            ("vnp_Amount", "2500"),
            ("vnp_BankCode", ""),
            ("vnp_OrderInfo", "Thanh toan don hang:7"),
        ]);

        assert_eq!(
            canonical_string(&p),
            "vnp_Amount=2500&vnp_OrderInfo=Thanh+toan+don+hang%3A7&vnp_TxnRef=12345678"
        );
    }

    #[test]
    fn return_url_is_encoded() {
        let p = params(&[("vnp_ReturnUrl", "http://shop.local/pay?invoiceId=7")]);
        assert_eq!(
            query_string(&p),
            "vnp_ReturnUrl=http%3A%2F%2Fshop.local%2Fpay%3FinvoiceId%3D7"
        );
    }

    #[test]
    fn signature_is_128_lowercase_hex_chars() {
        let signer = Signer::new("secret").unwrap();
        let hash = signer.sign(&params(&[("vnp_Amount", "100")]));
        assert_eq!(hash.len(), 128);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn verify_accepts_own_signature_in_any_case() {
        let signer = Signer::new("secret").unwrap();
        let p = params(&[("vnp_Amount", "100"), ("vnp_TxnRef", "42")]);
        let hash = signer.sign(&p);

        assert!(signer.verify(&p, &hash));
        assert!(signer.verify(&p, &hash.to_uppercase()));
    }

    #[test]
    fn verify_rejects_other_secret_and_garbage() {
        let p = params(&[("vnp_Amount", "100")]);
        let hash = Signer::new("secret").unwrap().sign(&p);
        let other = Signer::new("other").unwrap();

        assert!(!other.verify(&p, &hash));
        assert!(!other.verify(&p, ""));
        assert!(!other.verify(&p, "zz"));
        assert!(!other.verify(&p, "abc"));
    }

    proptest! {
        #[test]
        fn altering_any_character_of_any_value_breaks_the_signature(
            values in proptest::collection::vec("[a-zA-Z0-9 :/?=]{1,16}", 1..6),
            pick in any::<prop::sample::Index>(),
            pos in any::<prop::sample::Index>(),
            replacement in proptest::char::range('!', '~'),
        ) {
            let signer = Signer::new("proptest-secret").unwrap();
            let original: BTreeMap<String, String> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("vnp_Field{i}"), v.clone()))
                .collect();
            let hash = signer.sign(&original);

            let mut tampered = original.clone();
            let key = format!("vnp_Field{}", pick.index(values.len()));
            let value = tampered.get_mut(&key).unwrap();
            let mut chars: Vec<char> = value.chars().collect();
            let at = pos.index(chars.len());
            prop_assume!(chars[at] != replacement);
            chars[at] = replacement;
            *value = chars.into_iter().collect();

            prop_assert!(signer.verify(&original, &hash));
            prop_assert!(!signer.verify(&tampered, &hash));
        }
    }
}
