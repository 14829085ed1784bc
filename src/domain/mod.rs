//! Domain models for marketplace orders.

mod order;
pub mod status;

pub use order::{
    Actor, CartLine, CartSnapshot, LineItem, Order, OrderError, OrderId, OrderParts, Role,
    StatusChange,
};
pub use status::{CanonicalStatus, Locale};
