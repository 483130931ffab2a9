//! Event contracts, one tagged enum per family.
//!
//! Each family decodes with an exhaustive match at the consumer boundary.
//! An `eventType` outside the family is reported as unknown rather than
//! silently ignored or half-parsed.

pub mod cart;
pub mod inventory;
pub mod invoice;
pub mod order;
pub mod payment;
pub mod user;

pub use cart::{CartEvent, CartEventData, CartEventItem};
pub use inventory::{InventoryChangeRecord, InventoryEvent, InventoryEventData};
pub use invoice::{InvoiceEvent, InvoiceEventData, InvoiceEventItem};
pub use order::{OrderEvent, OrderEventData, OrderLine};
pub use payment::{PaymentEvent, PaymentEventData};
pub use user::{UserEvent, UserEventData};

/// Implements [`event_bus::EventContract`] for a family whose variants are
/// all newtypes. The tags must match the serde variant names.
macro_rules! event_family {
    ($family:ident { $($variant:ident => $tag:literal),+ $(,)? }) => {
        impl event_bus::EventContract for $family {
            const EVENT_TYPES: &'static [&'static str] = &[$($tag),+];

            fn event_type(&self) -> &'static str {
                match self {
                    $($family::$variant(_) => $tag),+
                }
            }
        }
    };
}

pub(crate) use event_family;
