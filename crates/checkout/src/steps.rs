//! Checkout step names, used in logs.

/// Step name: load the cart and check ownership.
pub const STEP_LOAD_CART: &str = "load_cart";

/// Step name: create the invoice from the cart snapshot.
pub const STEP_CREATE_INVOICE: &str = "create_invoice";

/// Step name: decrement inventory for every line.
pub const STEP_DECREMENT_INVENTORY: &str = "decrement_inventory";

/// Step name: clear the cart.
pub const STEP_CLEAR_CART: &str = "clear_cart";

/// Step name: publish `CART_CHECKOUT`.
pub const STEP_ANNOUNCE: &str = "announce_checkout";
