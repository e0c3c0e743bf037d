//! Read projection: totals, counts and the preview shown on every page.
//!
//! Pure functions over loaded items; nothing here mutates state.

use chrono::{DateTime, Utc};
use serde::Serialize;

use gallery_core::{CartId, Entity};

use crate::model::{Cart, CartItem, Money};

/// Maximum number of items in the shared preview.
pub const PREVIEW_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartProjection {
    pub total: Money,
    /// Sum of item quantities.
    pub count: i64,
    /// Most recently created items first, at most [`PREVIEW_LIMIT`].
    pub preview_items: Vec<CartItem>,
}

/// Full cart page payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub cart_id: Option<CartId>,
    pub items: Vec<CartItem>,
    pub total: Money,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CartView {
    pub fn empty() -> Self {
        Self {
            cart_id: None,
            items: Vec::new(),
            total: Money::ZERO,
            updated_at: None,
        }
    }

    pub fn new(cart: &Cart, mut items: Vec<CartItem>) -> Self {
        items.sort_by_key(Entity::id);
        let total = total(&items);
        Self {
            cart_id: Some(cart.id),
            items,
            total,
            updated_at: Some(cart.updated_at),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Cart data shared with every page (header badge + mini cart).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SharedSummary {
    pub count: i64,
    pub preview_items: Vec<CartItem>,
}

impl From<CartProjection> for SharedSummary {
    fn from(p: CartProjection) -> Self {
        Self {
            count: p.count,
            preview_items: p.preview_items,
        }
    }
}

pub fn project(items: &[CartItem]) -> CartProjection {
    CartProjection {
        total: total(items),
        count: count(items),
        preview_items: preview(items, PREVIEW_LIMIT),
    }
}

/// `sum(unit_price * quantity)`; an item without a usable price counts as 0.
pub fn total(items: &[CartItem]) -> Money {
    items.iter().fold(Money::ZERO, |acc, item| match item.price.unit_price {
        Some(price) => acc.saturating_add(price.times(item.quantity)),
        None => {
            tracing::warn!(
                item_id = %item.id,
                cart_id = %item.cart_id,
                artwork_id = item.key.artwork_id(),
                "cart item has no numeric price snapshot; counting it as 0"
            );
            acc
        }
    })
}

pub fn count(items: &[CartItem]) -> i64 {
    items.iter().map(|i| i64::from(i.quantity.get())).sum()
}

pub fn preview(items: &[CartItem], limit: usize) -> Vec<CartItem> {
    let mut latest: Vec<CartItem> = items.to_vec();
    latest.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    latest.truncate(limit);
    latest
}
