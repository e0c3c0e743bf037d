//! Infrastructure layer: cart persistence and the cart workflows built on it.

pub mod cart_service;
pub mod cart_store;
pub mod reconciler;
pub mod resolver;


pub use cart_service::{AddItem, AddedItem, CartService, CartServiceError};
pub use cart_store::{CartStore, CartTransaction, InMemoryCartStore, PostgresCartStore, StoreError};
pub use reconciler::{LineItemReconciler, MergeError, MergeReport};
pub use resolver::CartResolver;
