//! Cart persistence boundary.
//!
//! [`CartStore`] hands out transactions; everything the cart workflows read or
//! write goes through a [`CartTransaction`] so that a merge or an add-to-cart
//! is applied completely or not at all.

pub mod in_memory;
pub mod postgres;
#[cfg(test)]
pub(crate) mod recording;
pub mod r#trait;

pub use in_memory::{InMemoryCartStore, InMemoryTransaction};
pub use postgres::{PostgresCartStore, PostgresTransaction};
pub use r#trait::{CartStore, CartTransaction, StoreError};
