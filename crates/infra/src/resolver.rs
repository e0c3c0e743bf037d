//! Cart resolver: maps an identity context to its single authoritative cart.
//!
//! Safe to call on every request. When an authenticated identity still has a
//! guest cart under its session id, the guest cart is either handed over to
//! the user (no user cart yet) or merged into the user cart.

use tracing::{debug, error, info, instrument};

use gallery_cart::{Cart, CartOwner, IdentityContext};
use gallery_core::{SessionId, UserId};

use crate::cart_store::{CartStore, CartTransaction, StoreError};
use crate::reconciler::LineItemReconciler;

#[derive(Debug, Clone)]
pub struct CartResolver<S> {
    store: S,
    reconciler: LineItemReconciler<S>,
}

impl<S> CartResolver<S>
where
    S: CartStore + Clone,
{
    pub fn new(store: S) -> Self {
        Self {
            reconciler: LineItemReconciler::new(store.clone()),
            store,
        }
    }

    /// Resolve the cart for `identity`, creating one when `create_if_missing`.
    ///
    /// Storage failures propagate. A failed merge does not: the user cart is
    /// returned unmerged and the guest cart stays in place for the next
    /// request to retry.
    #[instrument(skip(self, identity), fields(user_id = ?identity.user_id), err)]
    pub async fn resolve(
        &self,
        identity: &IdentityContext,
        create_if_missing: bool,
    ) -> Result<Option<Cart>, StoreError> {
        match identity.user_id {
            Some(user_id) => {
                self.resolve_user(user_id, &identity.session_id, create_if_missing)
                    .await
            }
            None => self.resolve_guest(&identity.session_id, create_if_missing).await,
        }
    }

    async fn resolve_guest(
        &self,
        session_id: &SessionId,
        create_if_missing: bool,
    ) -> Result<Option<Cart>, StoreError> {
        let mut tx = self.store.begin().await?;
        if let Some(cart) = tx.find_by_session(session_id).await? {
            tx.commit().await?;
            return Ok(Some(cart));
        }
        if !create_if_missing {
            tx.rollback().await?;
            return Ok(None);
        }

        let cart = tx
            .create_cart(&CartOwner::Session(session_id.clone()))
            .await?;
        tx.commit().await?;
        debug!(cart_id = %cart.id, "created guest cart");
        Ok(Some(cart))
    }

    async fn resolve_user(
        &self,
        user_id: UserId,
        session_id: &SessionId,
        create_if_missing: bool,
    ) -> Result<Option<Cart>, StoreError> {
        let mut tx = self.store.begin().await?;
        // Session cart first: a concurrent hand-over of this guest cart is
        // committed by the time the lock is granted, so the user lookup that
        // follows sees the cart under its new owner.
        let guest_cart = tx.find_by_session(session_id).await?;
        let user_cart = tx.find_by_user(user_id).await?;

        match (user_cart, guest_cart) {
            (Some(user_cart), Some(guest_cart)) if user_cart.id != guest_cart.id => {
                // The merge runs in its own transaction.
                tx.rollback().await?;
                self.merge_or_keep(guest_cart, user_cart).await.map(Some)
            }
            (Some(user_cart), _) => {
                tx.commit().await?;
                Ok(Some(user_cart))
            }
            (None, Some(guest_cart)) => {
                let cart = tx.reown_cart(guest_cart.id, user_id).await?;
                tx.commit().await?;
                info!(cart_id = %cart.id, %user_id, "guest cart handed over to user");
                Ok(Some(cart))
            }
            (None, None) if create_if_missing => {
                let cart = tx.create_cart(&CartOwner::User(user_id)).await?;
                tx.commit().await?;
                debug!(cart_id = %cart.id, %user_id, "created user cart");
                Ok(Some(cart))
            }
            (None, None) => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }

    async fn merge_or_keep(&self, guest_cart: Cart, user_cart: Cart) -> Result<Cart, StoreError> {
        if let Err(e) = self.reconciler.merge(&guest_cart, &user_cart).await {
            error!(
                error = %e,
                source_cart = %guest_cart.id,
                destination_cart = %user_cart.id,
                "cart merge failed; serving the user cart unmerged"
            );
            return Ok(user_cart);
        }

        // Reload for the refreshed timestamp.
        let mut tx = self.store.begin().await?;
        let reloaded = tx.find_cart(user_cart.id).await?;
        tx.commit().await?;
        Ok(reloaded.unwrap_or(user_cart))
    }
}
