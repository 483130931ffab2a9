use serde::{Deserialize, Serialize};

/// Declares a database-assigned numeric identifier.
///
/// Each id is a distinct type so that, for example, a `CartId` cannot be
/// handed to an invoice lookup by accident.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw identifier value.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier value.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a registered user, as issued by the auth collaborator.
    UserId
);
numeric_id!(
    /// Identifier of a user's cart.
    CartId
);
numeric_id!(
    /// Identifier of a single cart line.
    CartLineId
);
numeric_id!(
    /// Identifier of an invoice.
    InvoiceId
);
numeric_id!(
    /// Identifier of a single invoice item.
    InvoiceItemId
);
numeric_id!(
    /// Identifier of a product and its inventory ledger entry.
    ProductId
);
numeric_id!(
    /// Internal identifier of a payment transaction row.
    PaymentTransactionId
);

/// Row version used for optimistic concurrency control.
///
/// Starts at 0 for a freshly inserted row and increments by 1 on every
/// successful conditional write.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a version from a raw value.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// The version of a row that has never been updated.
    pub const fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let id = InvoiceId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let back: InvoiceId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ids_parse_from_path_segments() {
        assert_eq!("17".parse::<ProductId>().unwrap(), ProductId::new(17));
        assert!("abc".parse::<CartId>().is_err());
    }

    #[test]
    fn version_ordering() {
        let v = Version::initial();
        assert_eq!(v.next(), Version::new(1));
        assert!(Version::new(1) < Version::new(2));
    }
}
