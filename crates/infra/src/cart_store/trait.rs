use std::sync::Arc;

use thiserror::Error;

use gallery_cart::{Cart, CartItem, CartOwner, NewCartItem, Quantity, VariationKey};
use gallery_core::{CartId, CartItemId, SessionId, UserId};

/// Cart store operation error.
///
/// These are **infrastructure errors** as opposed to domain errors
/// (validation, ownership).
///
/// ## Error Categories
///
/// - **NotFound**: a row the operation requires does not exist
/// - **Conflict**: a uniqueness constraint fired, or the backend aborted the
///   transaction because of a concurrent writer; retrying after re-reading is
///   expected to succeed
/// - **Backend**: any other storage failure (connection, corrupt row, ...)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflicting concurrent write: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Persistent storage of carts and their line items.
///
/// All reads and writes happen inside a [`CartTransaction`] obtained from
/// [`CartStore::begin`]. A transaction either commits as a whole or leaves no
/// trace: dropping it without calling `commit` rolls it back.
///
/// ## Constraints
///
/// Implementations must enforce, independently of the callers:
/// - at most one cart per session id and at most one cart per user id
/// - a cart is owned by exactly one of a session or a user
/// - at most one item per `(cart, variation key)`
/// - deleting a cart deletes its items
///
/// Violations surface as [`StoreError::Conflict`] so that a racing writer
/// fails fast instead of producing a duplicate row.
#[async_trait::async_trait]
pub trait CartStore: Send + Sync {
    type Tx: CartTransaction;

    /// Start a unit of work.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

#[async_trait::async_trait]
impl<S> CartStore for Arc<S>
where
    S: CartStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        (**self).begin().await
    }
}

/// Operations available inside a store transaction.
///
/// Lookups that return a cart lock that cart row for the remainder of the
/// transaction on backends that support row locks.
#[async_trait::async_trait]
pub trait CartTransaction: Send {
    async fn find_cart(&mut self, cart_id: CartId) -> Result<Option<Cart>, StoreError>;

    async fn find_by_user(&mut self, user_id: UserId) -> Result<Option<Cart>, StoreError>;

    /// Guest cart owned by `session_id` (never a user-owned cart).
    async fn find_by_session(&mut self, session_id: &SessionId) -> Result<Option<Cart>, StoreError>;

    async fn create_cart(&mut self, owner: &CartOwner) -> Result<Cart, StoreError>;

    /// Hand a guest cart over to `user_id`, clearing its session id.
    async fn reown_cart(&mut self, cart_id: CartId, user_id: UserId) -> Result<Cart, StoreError>;

    /// Delete a cart and its items. Returns `false` if it did not exist.
    async fn delete_cart(&mut self, cart_id: CartId) -> Result<bool, StoreError>;

    /// Refresh `updated_at` after its items changed.
    async fn touch_cart(&mut self, cart_id: CartId) -> Result<(), StoreError>;

    /// Items of a cart in ascending id order.
    async fn items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>, StoreError>;

    async fn find_item(&mut self, item_id: CartItemId) -> Result<Option<CartItem>, StoreError>;

    async fn find_item_by_key(
        &mut self,
        cart_id: CartId,
        key: &VariationKey,
    ) -> Result<Option<CartItem>, StoreError>;

    async fn insert_item(&mut self, item: NewCartItem) -> Result<CartItem, StoreError>;

    async fn set_item_quantity(
        &mut self,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<CartItem, StoreError>;

    /// Move an item (keeping its id and snapshot) onto another cart.
    async fn reparent_item(&mut self, item_id: CartItemId, cart_id: CartId) -> Result<(), StoreError>;

    /// Returns `false` if the item did not exist.
    async fn delete_item(&mut self, item_id: CartItemId) -> Result<bool, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
