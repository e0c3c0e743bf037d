//! Line-item reconciler: folds a guest cart into a user cart.
//!
//! ```text
//! merge(source, destination)
//!   ↓
//! 1. Begin one store transaction
//!   ↓
//! 2. Lock both carts (ascending id order)
//!   ↓
//! 3. Load both item sets, plan the merge (pure, gallery-cart)
//!   ↓
//! 4. Apply: combine quantities / re-parent items
//!   ↓
//! 5. Touch destination, delete source if it still exists
//!   ↓
//! 6. Commit (any failure rolls everything back)
//! ```
//!
//! A merge whose source has already been merged or deleted is a no-op, so a
//! merge can be re-run safely after a failure or a concurrent login.

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use gallery_cart::{plan_merge, Cart, MergeStep};
use gallery_core::{CartId, DomainError};

use crate::cart_store::{CartStore, CartTransaction, StoreError};

/// A merge that did not happen. Both carts are left as they were.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("merge destination cart {0} does not exist")]
    DestinationMissing(CartId),

    #[error("merge plan rejected: {0}")]
    Plan(#[from] DomainError),

    #[error("merge transaction failed: {0}")]
    Store(#[from] StoreError),
}

/// What a merge did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeReport {
    /// Source and destination were the same cart.
    SelfMerge,
    /// The source cart no longer exists (already merged or deleted).
    SourceGone,
    Merged {
        /// Source lines folded into an existing destination line.
        combined: usize,
        /// Source lines moved onto the destination cart.
        reparented: usize,
    },
}

/// Applies merge plans to the store, one transaction per merge.
#[derive(Debug, Clone)]
pub struct LineItemReconciler<S> {
    store: S,
}

impl<S> LineItemReconciler<S>
where
    S: CartStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Merge `source` into `destination` atomically.
    #[instrument(
        skip(self, source, destination),
        fields(source_cart = %source.id, destination_cart = %destination.id),
        err
    )]
    pub async fn merge(&self, source: &Cart, destination: &Cart) -> Result<MergeReport, MergeError> {
        if source.id == destination.id {
            warn!(cart_id = %source.id, "refusing to merge a cart into itself; skipping");
            return Ok(MergeReport::SelfMerge);
        }

        info!("merging guest cart into user cart");

        let mut tx = self.store.begin().await?;
        match apply_merge(&mut tx, source.id, destination.id).await {
            Ok(report) => {
                tx.commit().await?;
                info!(?report, "cart merge finished");
                Ok(report)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    error!(error = %rollback, "rollback after failed merge also failed");
                }
                Err(e)
            }
        }
    }
}

async fn apply_merge<T>(
    tx: &mut T,
    source_id: CartId,
    destination_id: CartId,
) -> Result<MergeReport, MergeError>
where
    T: CartTransaction,
{
    // Lock in a global order so two merges touching the same carts cannot deadlock.
    let (source, destination) = if source_id < destination_id {
        let source = tx.find_cart(source_id).await?;
        (source, tx.find_cart(destination_id).await?)
    } else {
        let destination = tx.find_cart(destination_id).await?;
        (tx.find_cart(source_id).await?, destination)
    };

    let Some(source) = source else {
        info!(cart_id = %source_id, "source cart already merged or deleted; nothing to do");
        return Ok(MergeReport::SourceGone);
    };
    let destination = destination.ok_or(MergeError::DestinationMissing(destination_id))?;

    let source_items = tx.items(source.id).await?;
    let destination_items = tx.items(destination.id).await?;
    let plan = plan_merge(&source_items, &destination_items)?;

    for step in plan.steps() {
        match *step {
            MergeStep::Combine {
                source,
                target,
                quantity,
            } => {
                tx.set_item_quantity(target, quantity).await?;
                tx.delete_item(source).await?;
            }
            MergeStep::Reparent { item } => {
                tx.reparent_item(item, destination.id).await?;
            }
        }
    }

    tx.touch_cart(destination.id).await?;

    if tx.find_cart(source.id).await?.is_some() {
        tx.delete_cart(source.id).await?;
    } else {
        warn!(cart_id = %source.id, "source cart disappeared during merge");
    }

    Ok(MergeReport::Merged {
        combined: plan.combined(),
        reparented: plan.reparented(),
    })
}
