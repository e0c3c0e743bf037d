//! Test store that logs the order in which a transaction touches rows.
//!
//! Lock ordering only matters on backends with row locks, so it cannot be
//! observed through the in-memory store directly. This wrapper forwards to
//! an [`InMemoryCartStore`] and appends one entry per call to a shared log.

use std::sync::{Arc, Mutex};

use gallery_cart::{Cart, CartItem, CartOwner, NewCartItem, Quantity, VariationKey};
use gallery_core::{CartId, CartItemId, SessionId, UserId};

use super::{CartStore, CartTransaction, InMemoryCartStore, InMemoryTransaction, StoreError};

#[derive(Clone)]
pub struct RecordingStore {
    inner: Arc<InMemoryCartStore>,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<InMemoryCartStore>) -> Self {
        Self {
            inner,
            log: Arc::default(),
        }
    }

    /// Calls recorded so far, e.g. `"find_by_session"` or `"find_cart:3"`.
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

pub struct RecordingTransaction {
    inner: InMemoryTransaction,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingTransaction {
    fn record(&self, call: impl Into<String>) {
        self.log.lock().unwrap().push(call.into());
    }
}

#[async_trait::async_trait]
impl CartStore for RecordingStore {
    type Tx = RecordingTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(RecordingTransaction {
            inner: self.inner.begin().await?,
            log: self.log.clone(),
        })
    }
}

#[async_trait::async_trait]
impl CartTransaction for RecordingTransaction {
    async fn find_cart(&mut self, cart_id: CartId) -> Result<Option<Cart>, StoreError> {
        self.record(format!("find_cart:{cart_id}"));
        self.inner.find_cart(cart_id).await
    }

    async fn find_by_user(&mut self, user_id: UserId) -> Result<Option<Cart>, StoreError> {
        self.record("find_by_user");
        self.inner.find_by_user(user_id).await
    }

    async fn find_by_session(&mut self, session_id: &SessionId) -> Result<Option<Cart>, StoreError> {
        self.record("find_by_session");
        self.inner.find_by_session(session_id).await
    }

    async fn create_cart(&mut self, owner: &CartOwner) -> Result<Cart, StoreError> {
        self.record("create_cart");
        self.inner.create_cart(owner).await
    }

    async fn reown_cart(&mut self, cart_id: CartId, user_id: UserId) -> Result<Cart, StoreError> {
        self.record(format!("reown_cart:{cart_id}"));
        self.inner.reown_cart(cart_id, user_id).await
    }

    async fn delete_cart(&mut self, cart_id: CartId) -> Result<bool, StoreError> {
        self.record(format!("delete_cart:{cart_id}"));
        self.inner.delete_cart(cart_id).await
    }

    async fn touch_cart(&mut self, cart_id: CartId) -> Result<(), StoreError> {
        self.record(format!("touch_cart:{cart_id}"));
        self.inner.touch_cart(cart_id).await
    }

    async fn items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>, StoreError> {
        self.record(format!("items:{cart_id}"));
        self.inner.items(cart_id).await
    }

    async fn find_item(&mut self, item_id: CartItemId) -> Result<Option<CartItem>, StoreError> {
        self.record(format!("find_item:{item_id}"));
        self.inner.find_item(item_id).await
    }

    async fn find_item_by_key(
        &mut self,
        cart_id: CartId,
        key: &VariationKey,
    ) -> Result<Option<CartItem>, StoreError> {
        self.record(format!("find_item_by_key:{cart_id}"));
        self.inner.find_item_by_key(cart_id, key).await
    }

    async fn insert_item(&mut self, item: NewCartItem) -> Result<CartItem, StoreError> {
        self.record(format!("insert_item:{}", item.cart_id));
        self.inner.insert_item(item).await
    }

    async fn set_item_quantity(
        &mut self,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<CartItem, StoreError> {
        self.record(format!("set_item_quantity:{item_id}"));
        self.inner.set_item_quantity(item_id, quantity).await
    }

    async fn reparent_item(&mut self, item_id: CartItemId, cart_id: CartId) -> Result<(), StoreError> {
        self.record(format!("reparent_item:{item_id}"));
        self.inner.reparent_item(item_id, cart_id).await
    }

    async fn delete_item(&mut self, item_id: CartItemId) -> Result<bool, StoreError> {
        self.record(format!("delete_item:{item_id}"));
        self.inner.delete_item(item_id).await
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.record("commit");
        self.inner.commit().await
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.record("rollback");
        self.inner.rollback().await
    }
}
