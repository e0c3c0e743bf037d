//! Cart operations exposed to the presentation layer.
//!
//! Every operation takes the caller's [`IdentityContext`] explicitly and
//! resolves the authoritative cart through [`CartResolver`] first, so a
//! pending guest-to-user merge is applied before anything is read or written.
//!
//! ## Error handling
//!
//! Store conflicts (a racing writer hit a uniqueness constraint or deleted the
//! cart underneath us) are retried once by re-resolving the cart and repeating
//! the mutation. A second conflict is reported as [`CartServiceError::Conflict`].

use thiserror::Error;
use tracing::{info, instrument, warn};

use gallery_cart::{
    project, Cart, CartItem, CartView, IdentityContext, LoginEvent, NewCartItem, PriceSnapshot,
    Quantity, SharedSummary, VariationKey,
};
use gallery_core::{CartId, CartItemId, DomainError};

use crate::cart_store::{CartStore, CartTransaction, StoreError};
use crate::resolver::CartResolver;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CartServiceError {
    /// Referenced cart or item does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Item-level mutation against an item outside the caller's cart.
    #[error("item does not belong to the caller's cart: {0}")]
    OwnershipMismatch(String),
    /// Rejected input.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Request would break a cart invariant (e.g. quantity overflow).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// Concurrent write conflict that persisted after one retry.
    #[error("conflicting concurrent update: {0}")]
    Conflict(String),
    /// Checkout requested without any items.
    #[error("cart is empty")]
    EmptyCart,
    /// Storage failure.
    #[error(transparent)]
    Store(StoreError),
}

impl CartServiceError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, CartServiceError::Conflict(_))
    }
}

impl From<StoreError> for CartServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(msg) => CartServiceError::NotFound(msg),
            StoreError::Conflict(msg) => CartServiceError::Conflict(msg),
            StoreError::Backend(_) => CartServiceError::Store(value),
        }
    }
}

impl From<DomainError> for CartServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => CartServiceError::Validation(msg),
            DomainError::InvalidId(msg) => CartServiceError::Validation(msg),
            DomainError::InvariantViolation(msg) => CartServiceError::InvariantViolation(msg),
        }
    }
}

/// A validated add-to-cart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddItem {
    pub key: VariationKey,
    pub quantity: Quantity,
    pub price: PriceSnapshot,
}

/// Result of adding an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedItem {
    pub item: CartItem,
    /// `false` when an existing line with the same variation key was incremented.
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct CartService<S> {
    store: S,
    resolver: CartResolver<S>,
}

impl<S> CartService<S>
where
    S: CartStore + Clone,
{
    pub fn new(store: S) -> Self {
        Self {
            resolver: CartResolver::new(store.clone()),
            store,
        }
    }

    /// Full cart page: items in id order and the total.
    #[instrument(skip(self, identity), err)]
    pub async fn get_cart_view(&self, identity: &IdentityContext) -> Result<CartView, CartServiceError> {
        match self.view_once(identity).await {
            Err(e) if e.is_conflict() => {
                warn!(error = %e, "conflict while loading cart; retrying once");
                self.view_once(identity).await
            }
            other => other,
        }
    }

    /// Add `request.quantity` of a variation, creating the cart if needed.
    ///
    /// An existing line with the same variation key is incremented in place
    /// and keeps the price snapshot it was first added with.
    #[instrument(
        skip(self, identity, request),
        fields(artwork_id = request.key.artwork_id(), quantity = request.quantity.get()),
        err
    )]
    pub async fn add_item(
        &self,
        identity: &IdentityContext,
        request: AddItem,
    ) -> Result<AddedItem, CartServiceError> {
        match self.add_once(identity, &request).await {
            Err(e) if e.is_conflict() => {
                warn!(error = %e, "conflict while adding item; re-resolving and retrying once");
                self.add_once(identity, &request).await
            }
            other => other,
        }
    }

    /// Set the quantity of an item in the caller's cart.
    #[instrument(skip(self, identity), fields(item_id = %item_id, quantity = quantity.get()), err)]
    pub async fn update_quantity(
        &self,
        identity: &IdentityContext,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<CartItem, CartServiceError> {
        match self.update_once(identity, item_id, quantity).await {
            Err(e) if e.is_conflict() => {
                warn!(error = %e, "conflict while updating item; retrying once");
                self.update_once(identity, item_id, quantity).await
            }
            other => other,
        }
    }

    /// Remove an item from the caller's cart.
    #[instrument(skip(self, identity), fields(item_id = %item_id), err)]
    pub async fn remove_item(
        &self,
        identity: &IdentityContext,
        item_id: CartItemId,
    ) -> Result<(), CartServiceError> {
        match self.remove_once(identity, item_id).await {
            Err(e) if e.is_conflict() => {
                warn!(error = %e, "conflict while removing item; retrying once");
                self.remove_once(identity, item_id).await
            }
            other => other,
        }
    }

    /// Count and preview shown on every page.
    #[instrument(skip(self, identity), err)]
    pub async fn shared_summary(
        &self,
        identity: &IdentityContext,
    ) -> Result<SharedSummary, CartServiceError> {
        let view = self.get_cart_view(identity).await?;
        Ok(project(&view.items).into())
    }

    /// Login hook: must be called with the session id captured before rotation.
    ///
    /// Makes sure the user has a cart (folding in the pre-login guest cart),
    /// then folds in anything that was put in a cart under the rotated session
    /// id in the meantime.
    #[instrument(skip(self, event), fields(user_id = %event.user_id, rotated = event.rotated()), err)]
    pub async fn on_login(&self, event: &LoginEvent) -> Result<Cart, CartServiceError> {
        let pre = event.pre_rotation_identity();
        let cart = self
            .resolve_retrying(&pre, true)
            .await?
            .ok_or_else(|| CartServiceError::NotFound("user cart".to_string()))?;

        let cart = if event.rotated() {
            self.resolve_retrying(&event.post_rotation_identity(), false)
                .await?
                .unwrap_or(cart)
        } else {
            cart
        };

        info!(cart_id = %cart.id, "login cart reconciled");
        Ok(cart)
    }

    /// Cart view for checkout, or [`CartServiceError::EmptyCart`].
    #[instrument(skip(self, identity), err)]
    pub async fn ensure_checkout_ready(
        &self,
        identity: &IdentityContext,
    ) -> Result<CartView, CartServiceError> {
        let view = self.get_cart_view(identity).await?;
        if view.is_empty() {
            return Err(CartServiceError::EmptyCart);
        }
        Ok(view)
    }

    async fn resolve_retrying(
        &self,
        identity: &IdentityContext,
        create_if_missing: bool,
    ) -> Result<Option<Cart>, CartServiceError> {
        match self.resolver.resolve(identity, create_if_missing).await {
            Err(e) if e.is_conflict() => {
                warn!(error = %e, "conflict while resolving cart; retrying once");
                Ok(self.resolver.resolve(identity, create_if_missing).await?)
            }
            other => Ok(other?),
        }
    }

    async fn view_once(&self, identity: &IdentityContext) -> Result<CartView, CartServiceError> {
        let Some(cart) = self.resolver.resolve(identity, false).await? else {
            return Ok(CartView::empty());
        };

        let mut tx = self.store.begin().await?;
        let items = tx.items(cart.id).await?;
        tx.commit().await?;
        Ok(CartView::new(&cart, items))
    }

    async fn add_once(
        &self,
        identity: &IdentityContext,
        request: &AddItem,
    ) -> Result<AddedItem, CartServiceError> {
        let cart = self
            .resolver
            .resolve(identity, true)
            .await?
            .ok_or_else(|| CartServiceError::NotFound("cart".to_string()))?;

        let mut tx = self.store.begin().await?;
        lock_cart(&mut tx, cart.id).await?;

        let added = match tx.find_item_by_key(cart.id, &request.key).await? {
            Some(existing) => {
                let quantity = existing.quantity.checked_add(request.quantity)?;
                AddedItem {
                    item: tx.set_item_quantity(existing.id, quantity).await?,
                    created: false,
                }
            }
            None => AddedItem {
                item: tx
                    .insert_item(NewCartItem {
                        cart_id: cart.id,
                        key: request.key.clone(),
                        quantity: request.quantity,
                        price: request.price.clone(),
                    })
                    .await?,
                created: true,
            },
        };

        tx.touch_cart(cart.id).await?;
        tx.commit().await?;
        Ok(added)
    }

    async fn update_once(
        &self,
        identity: &IdentityContext,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<CartItem, CartServiceError> {
        let cart = self.resolver.resolve(identity, false).await?;

        let mut tx = self.store.begin().await?;
        let cart_id = owned_item(&mut tx, cart.as_ref(), item_id).await?;
        let item = tx.set_item_quantity(item_id, quantity).await?;
        tx.touch_cart(cart_id).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn remove_once(
        &self,
        identity: &IdentityContext,
        item_id: CartItemId,
    ) -> Result<(), CartServiceError> {
        let cart = self.resolver.resolve(identity, false).await?;

        let mut tx = self.store.begin().await?;
        let cart_id = owned_item(&mut tx, cart.as_ref(), item_id).await?;
        tx.delete_item(item_id).await?;
        tx.touch_cart(cart_id).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Lock the cart row; a cart deleted since it was resolved (merged away by a
/// concurrent login) is a conflict so the caller re-resolves.
async fn lock_cart<T: CartTransaction>(tx: &mut T, cart_id: CartId) -> Result<Cart, CartServiceError> {
    tx.find_cart(cart_id)
        .await?
        .ok_or_else(|| CartServiceError::Conflict(format!("cart {cart_id} was removed concurrently")))
}

/// Check that `item_id` exists and belongs to `cart`; returns the cart id.
///
/// The cart row is locked before the item row, the same order add-to-cart and
/// the merge use.
async fn owned_item<T: CartTransaction>(
    tx: &mut T,
    cart: Option<&Cart>,
    item_id: CartItemId,
) -> Result<CartId, CartServiceError> {
    if let Some(cart) = cart {
        lock_cart(tx, cart.id).await?;
    }

    let item = tx
        .find_item(item_id)
        .await?
        .ok_or_else(|| CartServiceError::NotFound(format!("cart item {item_id}")))?;

    match cart {
        Some(cart) if cart.id == item.cart_id => Ok(cart.id),
        _ => {
            warn!(
                item_id = %item_id,
                item_cart = %item.cart_id,
                caller_cart = ?cart.map(|c| c.id),
                "rejected mutation of an item outside the caller's cart"
            );
            Err(CartServiceError::OwnershipMismatch(format!(
                "cart item {item_id} is not in the caller's cart"
            )))
        }
    }
}
