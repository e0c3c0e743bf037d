use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use gallery_cart::{Cart, CartItem, CartOwner, NewCartItem, Quantity, VariationKey};
use gallery_core::{CartId, CartItemId, SessionId, UserId};

use super::r#trait::{CartStore, CartTransaction, StoreError};

#[derive(Debug, Clone, Default)]
struct State {
    last_cart_id: i64,
    last_item_id: i64,
    carts: BTreeMap<CartId, Cart>,
    items: BTreeMap<CartItemId, CartItem>,
}

impl State {
    fn owner_taken(&self, owner: &CartOwner, except: Option<CartId>) -> bool {
        self.carts
            .values()
            .any(|c| &c.owner == owner && Some(c.id) != except)
    }

    fn key_taken(&self, cart_id: CartId, key: &VariationKey, except: Option<CartItemId>) -> bool {
        self.items
            .values()
            .any(|i| i.cart_id == cart_id && &i.key == key && Some(i.id) != except)
    }
}

/// In-memory cart store.
///
/// Intended for tests/dev. Transactions are serialized through a single async
/// mutex and write to a private copy of the state that replaces the shared
/// state only on commit, so every transaction is all-or-nothing.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCartStore {
    state: Arc<AsyncMutex<State>>,
    fail_writes_after: Arc<Mutex<Option<usize>>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Test hook: every subsequent transaction fails on its `n + 1`-th write.
    pub fn fail_writes_after(&self, n: usize) {
        if let Ok(mut slot) = self.fail_writes_after.lock() {
            *slot = Some(n);
        }
    }

    /// Disarm [`fail_writes_after`](Self::fail_writes_after).
    pub fn clear_faults(&self) {
        if let Ok(mut slot) = self.fail_writes_after.lock() {
            *slot = None;
        }
    }

    /// Number of carts currently committed.
    pub async fn cart_count(&self) -> usize {
        self.state.lock().await.carts.len()
    }

    /// Number of items currently committed.
    pub async fn item_count(&self) -> usize {
        self.state.lock().await.items.len()
    }
}

#[async_trait::async_trait]
impl CartStore for InMemoryCartStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let fail_after = *self
            .fail_writes_after
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            staged,
            writes: 0,
            fail_after,
        })
    }
}

/// Unit of work over [`InMemoryCartStore`]. Holds the store lock until it is
/// committed, rolled back or dropped.
#[derive(Debug)]
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<State>,
    staged: State,
    writes: usize,
    fail_after: Option<usize>,
}

impl InMemoryTransaction {
    fn record_write(&mut self, operation: &str) -> Result<(), StoreError> {
        if let Some(limit) = self.fail_after {
            if self.writes >= limit {
                return Err(StoreError::Backend(format!(
                    "injected failure in {operation} after {limit} writes"
                )));
            }
        }
        self.writes += 1;
        Ok(())
    }

    fn cart_mut(&mut self, cart_id: CartId) -> Result<&mut Cart, StoreError> {
        self.staged
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::NotFound(format!("cart {cart_id}")))
    }

    fn item_mut(&mut self, item_id: CartItemId) -> Result<&mut CartItem, StoreError> {
        self.staged
            .items
            .get_mut(&item_id)
            .ok_or_else(|| StoreError::NotFound(format!("cart item {item_id}")))
    }
}

#[async_trait::async_trait]
impl CartTransaction for InMemoryTransaction {
    async fn find_cart(&mut self, cart_id: CartId) -> Result<Option<Cart>, StoreError> {
        Ok(self.staged.carts.get(&cart_id).cloned())
    }

    async fn find_by_user(&mut self, user_id: UserId) -> Result<Option<Cart>, StoreError> {
        Ok(self
            .staged
            .carts
            .values()
            .find(|c| c.owner.user_id() == Some(user_id))
            .cloned())
    }

    async fn find_by_session(&mut self, session_id: &SessionId) -> Result<Option<Cart>, StoreError> {
        Ok(self
            .staged
            .carts
            .values()
            .find(|c| c.owner.session_id() == Some(session_id))
            .cloned())
    }

    async fn create_cart(&mut self, owner: &CartOwner) -> Result<Cart, StoreError> {
        self.record_write("create_cart")?;
        if self.staged.owner_taken(owner, None) {
            return Err(StoreError::Conflict(format!("a cart already exists for {owner:?}")));
        }

        self.staged.last_cart_id += 1;
        let now = Utc::now();
        let cart = Cart {
            id: CartId::from_raw(self.staged.last_cart_id),
            owner: owner.clone(),
            created_at: now,
            updated_at: now,
        };
        self.staged.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn reown_cart(&mut self, cart_id: CartId, user_id: UserId) -> Result<Cart, StoreError> {
        self.record_write("reown_cart")?;
        let owner = CartOwner::User(user_id);
        if self.staged.owner_taken(&owner, Some(cart_id)) {
            return Err(StoreError::Conflict(format!("user {user_id} already owns a cart")));
        }

        let cart = self.cart_mut(cart_id)?;
        cart.owner = owner;
        cart.updated_at = Utc::now();
        Ok(cart.clone())
    }

    async fn delete_cart(&mut self, cart_id: CartId) -> Result<bool, StoreError> {
        self.record_write("delete_cart")?;
        let existed = self.staged.carts.remove(&cart_id).is_some();
        self.staged.items.retain(|_, item| item.cart_id != cart_id);
        Ok(existed)
    }

    async fn touch_cart(&mut self, cart_id: CartId) -> Result<(), StoreError> {
        self.record_write("touch_cart")?;
        self.cart_mut(cart_id)?.updated_at = Utc::now();
        Ok(())
    }

    async fn items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>, StoreError> {
        // BTreeMap iteration is already in ascending id order.
        Ok(self
            .staged
            .items
            .values()
            .filter(|i| i.cart_id == cart_id)
            .cloned()
            .collect())
    }

    async fn find_item(&mut self, item_id: CartItemId) -> Result<Option<CartItem>, StoreError> {
        Ok(self.staged.items.get(&item_id).cloned())
    }

    async fn find_item_by_key(
        &mut self,
        cart_id: CartId,
        key: &VariationKey,
    ) -> Result<Option<CartItem>, StoreError> {
        Ok(self
            .staged
            .items
            .values()
            .find(|i| i.cart_id == cart_id && &i.key == key)
            .cloned())
    }

    async fn insert_item(&mut self, item: NewCartItem) -> Result<CartItem, StoreError> {
        self.record_write("insert_item")?;
        if !self.staged.carts.contains_key(&item.cart_id) {
            return Err(StoreError::Conflict(format!("cart {} no longer exists", item.cart_id)));
        }
        if self.staged.key_taken(item.cart_id, &item.key, None) {
            return Err(StoreError::Conflict(format!(
                "cart {} already has an item for {:?}",
                item.cart_id, item.key
            )));
        }

        self.staged.last_item_id += 1;
        let now = Utc::now();
        let stored = CartItem {
            id: CartItemId::from_raw(self.staged.last_item_id),
            cart_id: item.cart_id,
            key: item.key,
            quantity: item.quantity,
            price: item.price,
            created_at: now,
            updated_at: now,
        };
        self.staged.items.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn set_item_quantity(
        &mut self,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<CartItem, StoreError> {
        self.record_write("set_item_quantity")?;
        let item = self.item_mut(item_id)?;
        item.quantity = quantity;
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn reparent_item(&mut self, item_id: CartItemId, cart_id: CartId) -> Result<(), StoreError> {
        self.record_write("reparent_item")?;
        if !self.staged.carts.contains_key(&cart_id) {
            return Err(StoreError::Conflict(format!("cart {cart_id} no longer exists")));
        }
        let key = self.item_mut(item_id)?.key.clone();
        if self.staged.key_taken(cart_id, &key, Some(item_id)) {
            return Err(StoreError::Conflict(format!(
                "cart {cart_id} already has an item for {key:?}"
            )));
        }

        let item = self.item_mut(item_id)?;
        item.cart_id = cart_id;
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_item(&mut self, item_id: CartItemId) -> Result<bool, StoreError> {
        self.record_write("delete_item")?;
        Ok(self.staged.items.remove(&item_id).is_some())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        *self.guard = std::mem::take(&mut self.staged);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
