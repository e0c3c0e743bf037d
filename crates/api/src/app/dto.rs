use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gallery_cart::{Cart, CartItem, CartView, Money, PriceSnapshot, Quantity, SharedSummary, VariationKey};
use gallery_core::{CartId, CartItemId, DomainError, DomainResult, SessionId, UserId};
use gallery_infra::{AddItem, AddedItem};

// -------------------------
// Request DTOs
// -------------------------

fn default_quantity() -> i64 {
    1
}

/// Add-to-cart form. Price, thumbnail and title are the catalog snapshot the
/// page was rendered with.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub artwork_id: String,
    #[serde(rename = "type")]
    pub product_type: String,
    pub frame: String,
    pub size: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    pub price: f64,
    pub img_thumb: Option<String>,
    pub title: Option<String>,
}

impl AddItemRequest {
    pub fn into_domain(self) -> DomainResult<AddItem> {
        let unit_price = Money::from_major(self.price)
            .ok_or_else(|| DomainError::validation("price must be a finite amount"))?;
        Ok(AddItem {
            key: VariationKey::new(self.artwork_id, self.product_type, self.frame, self.size)?,
            quantity: Quantity::new(self.quantity)?,
            price: PriceSnapshot::new(unit_price, self.img_thumb, self.title)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

/// Login notification. The current `x-session-id` is the pre-rotation id.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: Uuid,
    /// Session id after rotation; defaults to the current one.
    pub new_session_id: Option<String>,
}

impl LoginRequest {
    pub fn new_session_id(&self, current: &SessionId) -> DomainResult<SessionId> {
        match &self.new_session_id {
            Some(id) => SessionId::new(id.clone()),
            None => Ok(current.clone()),
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct CartItemResponse {
    pub id: CartItemId,
    pub artwork_id: String,
    #[serde(rename = "type")]
    pub product_type: String,
    pub frame: String,
    pub size: String,
    pub quantity: i32,
    pub price: Option<Money>,
    pub img_thumb: Option<String>,
    pub title: Option<String>,
    pub subtotal: Money,
    pub created_at: DateTime<Utc>,
}

impl From<&CartItem> for CartItemResponse {
    fn from(item: &CartItem) -> Self {
        Self {
            id: item.id,
            artwork_id: item.key.artwork_id().to_string(),
            product_type: item.key.product_type().to_string(),
            frame: item.key.frame().to_string(),
            size: item.key.size().to_string(),
            quantity: item.quantity.get(),
            price: item.price.unit_price,
            img_thumb: item.price.thumbnail_url.clone(),
            title: item.price.title.clone(),
            subtotal: item
                .price
                .unit_price
                .map(|p| p.times(item.quantity))
                .unwrap_or(Money::ZERO),
            created_at: item.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CartViewResponse {
    pub cart_id: Option<CartId>,
    pub items: Vec<CartItemResponse>,
    pub total: Money,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&CartView> for CartViewResponse {
    fn from(view: &CartView) -> Self {
        Self {
            cart_id: view.cart_id,
            items: view.items.iter().map(CartItemResponse::from).collect(),
            total: view.total,
            updated_at: view.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddItemResponse {
    pub created: bool,
    pub item: CartItemResponse,
}

impl From<&AddedItem> for AddItemResponse {
    fn from(added: &AddedItem) -> Self {
        Self {
            created: added.created,
            item: CartItemResponse::from(&added.item),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub count: i64,
    pub preview_items: Vec<CartItemResponse>,
}

impl From<&SharedSummary> for SummaryResponse {
    fn from(summary: &SharedSummary) -> Self {
        Self {
            count: summary.count,
            preview_items: summary.preview_items.iter().map(CartItemResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub cart_id: CartId,
    pub user_id: Option<UserId>,
}

impl From<&Cart> for LoginResponse {
    fn from(cart: &Cart) -> Self {
        Self {
            cart_id: cart.id,
            user_id: cart.owner.user_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: serde_json::Value) -> AddItemRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn add_request_defaults_quantity_and_validates() {
        let add = request(serde_json::json!({
            "artwork_id": "A1",
            "type": "print",
            "frame": "black",
            "size": "M",
            "price": 20.5,
            "img_thumb": "https://img.example.com/a1.jpg",
            "title": "Sunrise"
        }))
        .into_domain()
        .unwrap();
        assert_eq!(add.quantity.get(), 1);
        assert_eq!(add.price.unit_price, Some(Money::from_minor(2050)));

        let negative = request(serde_json::json!({
            "artwork_id": "A1", "type": "print", "frame": "black", "size": "M", "price": -1.0
        }));
        assert!(negative.into_domain().is_err());

        let zero_qty = request(serde_json::json!({
            "artwork_id": "A1", "type": "print", "frame": "black", "size": "M",
            "price": 1.0, "quantity": 0
        }));
        assert!(zero_qty.into_domain().is_err());
    }
}
