use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value as JsonValue, json};

use gallery_core::{CartId, CartItemId, DomainError, DomainResult, Entity, SessionId, UserId, ValueObject};

/// Who a cart belongs to.
///
/// A cart is owned by exactly one of an anonymous session or an authenticated
/// user, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum CartOwner {
    Session(SessionId),
    User(UserId),
}

impl CartOwner {
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            CartOwner::Session(s) => Some(s),
            CartOwner::User(_) => None,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CartOwner::Session(_) => None,
            CartOwner::User(u) => Some(*u),
        }
    }
}

/// Cart row.
///
/// Items are not embedded: the cart exclusively owns its items, but they are
/// loaded separately and refer back to the cart through `CartItem::cart_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner: CartOwner,
    pub created_at: DateTime<Utc>,
    /// Refreshed whenever the cart's items change.
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn is_guest(&self) -> bool {
        matches!(self.owner, CartOwner::Session(_))
    }
}

impl Entity for Cart {
    type Id = CartId;

    fn id(&self) -> CartId {
        self.id
    }
}

/// The unit of deduplication inside a cart: `(artwork, type, frame, size)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariationKey {
    artwork_id: String,
    #[serde(rename = "type")]
    product_type: String,
    frame: String,
    size: String,
}

impl ValueObject for VariationKey {}

impl VariationKey {
    pub const ARTWORK_ID_MAX: usize = 50;
    pub const TYPE_MAX: usize = 20;
    pub const FRAME_MAX: usize = 20;
    pub const SIZE_MAX: usize = 10;

    pub fn new(
        artwork_id: impl Into<String>,
        product_type: impl Into<String>,
        frame: impl Into<String>,
        size: impl Into<String>,
    ) -> DomainResult<Self> {
        Ok(Self {
            artwork_id: bounded("artwork_id", artwork_id.into(), Self::ARTWORK_ID_MAX)?,
            product_type: bounded("type", product_type.into(), Self::TYPE_MAX)?,
            frame: bounded("frame", frame.into(), Self::FRAME_MAX)?,
            size: bounded("size", size.into(), Self::SIZE_MAX)?,
        })
    }

    pub fn artwork_id(&self) -> &str {
        &self.artwork_id
    }

    pub fn product_type(&self) -> &str {
        &self.product_type
    }

    pub fn frame(&self) -> &str {
        &self.frame
    }

    pub fn size(&self) -> &str {
        &self.size
    }
}

fn bounded(field: &str, value: String, max: usize) -> DomainResult<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    if value.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value)
}

/// Amount in the smallest currency unit (cents).
///
/// Serialized as a decimal number of major units (`25.5`), which is what the
/// storefront and the price snapshot blobs carry.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_minor(cents: i64) -> Self {
        Self(cents)
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Convert a decimal amount of major units, rounding to the nearest cent.
    pub fn from_major(amount: f64) -> Option<Self> {
        if !amount.is_finite() {
            return None;
        }
        let cents = (amount * 100.0).round();
        if cents.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Self(cents as i64))
    }

    pub fn as_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Lenient decode of a JSON price: numbers and numeric strings are
    /// accepted, anything else is `None`.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => n.as_f64().and_then(Self::from_major),
            JsonValue::String(s) => s.trim().parse::<f64>().ok().and_then(Self::from_major),
            _ => None,
        }
    }

    pub fn times(self, quantity: Quantity) -> Money {
        Money(self.0.saturating_mul(i64::from(quantity.get())))
    }

    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_major())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = f64::deserialize(deserializer)?;
        Money::from_major(amount).ok_or_else(|| serde::de::Error::custom("amount out of range"))
    }
}

/// Positive line quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i32")]
pub struct Quantity(i32);

impl ValueObject for Quantity {}

impl Quantity {
    pub fn new(value: i64) -> DomainResult<Self> {
        if value < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        let value = i32::try_from(value)
            .map_err(|_| DomainError::validation("quantity is too large"))?;
        Ok(Self(value))
    }

    pub fn get(&self) -> i32 {
        self.0
    }

    /// Sum two quantities (used when matching lines are combined).
    pub fn checked_add(self, other: Quantity) -> DomainResult<Quantity> {
        self.0
            .checked_add(other.0)
            .map(Quantity)
            .ok_or_else(|| DomainError::invariant("combined quantity overflows"))
    }
}

impl TryFrom<i64> for Quantity {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Quantity::new(value)
    }
}

impl From<Quantity> for i32 {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

/// Pricing and display data captured when an item is added.
///
/// Never re-fetched from the catalog: totals reflect the price at add time.
/// `unit_price` is `None` when a stored snapshot had no usable price.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub unit_price: Option<Money>,
    pub thumbnail_url: Option<String>,
    pub title: Option<String>,
}

impl ValueObject for PriceSnapshot {}

impl PriceSnapshot {
    /// Validated snapshot for a new add-to-cart request.
    pub fn new(
        unit_price: Money,
        thumbnail_url: Option<String>,
        title: Option<String>,
    ) -> DomainResult<Self> {
        if unit_price < Money::ZERO {
            return Err(DomainError::validation("price must not be negative"));
        }
        let thumbnail_url = thumbnail_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        if let Some(url) = &thumbnail_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(DomainError::validation("img_thumb must be an http(s) url"));
            }
        }
        Ok(Self {
            unit_price: Some(unit_price),
            thumbnail_url,
            title: title.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Structured blob persisted in `cart_items.price_snapshot`.
    pub fn to_blob(&self) -> JsonValue {
        json!({
            "price": self.unit_price.map(|p| p.as_major()),
            "img_thumb": self.thumbnail_url,
            "title": self.title,
        })
    }

    /// Decode a persisted blob. Unknown or malformed fields decode to `None`
    /// rather than failing the row.
    pub fn from_blob(blob: &JsonValue) -> Self {
        let text = |key: &str| blob.get(key).and_then(JsonValue::as_str).map(str::to_string);
        Self {
            unit_price: blob.get("price").and_then(Money::from_json),
            thumbnail_url: text("img_thumb"),
            title: text("title"),
        }
    }
}

/// A line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    /// Back-reference to the owning cart (lookups only).
    pub cart_id: CartId,
    pub key: VariationKey,
    pub quantity: Quantity,
    pub price: PriceSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for CartItem {
    type Id = CartItemId;

    fn id(&self) -> CartItemId {
        self.id
    }
}

/// Item to be inserted (id and timestamps are assigned by the store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCartItem {
    pub cart_id: CartId,
    pub key: VariationKey,
    pub quantity: Quantity,
    pub price: PriceSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variation_key_enforces_column_limits() {
        assert!(VariationKey::new("A1", "print", "black", "M").is_ok());
        assert!(VariationKey::new("", "print", "black", "M").is_err());
        assert!(VariationKey::new("A1", "print", "black", "XXXXXXXXXXL").is_err());
        assert!(VariationKey::new("a".repeat(51), "print", "black", "M").is_err());
    }

    #[test]
    fn variation_keys_differing_in_any_field_are_distinct() {
        let base = VariationKey::new("A1", "print", "black", "M").unwrap();
        assert_ne!(base, VariationKey::new("A1", "print", "white", "M").unwrap());
        assert_ne!(base, VariationKey::new("A1", "canvas", "black", "M").unwrap());
        assert_ne!(base, VariationKey::new("A1", "print", "black", "L").unwrap());
        assert_eq!(base, VariationKey::new(" A1 ", "print", "black", "M").unwrap());
    }

    #[test]
    fn quantity_must_be_positive() {
        assert!(Quantity::new(0).is_err());
        assert!(Quantity::new(-3).is_err());
        assert_eq!(Quantity::new(3).unwrap().get(), 3);
        assert!(Quantity::new(i64::from(i32::MAX) + 1).is_err());
    }

    #[test]
    fn quantity_addition_detects_overflow() {
        let max = Quantity::new(i64::from(i32::MAX)).unwrap();
        let one = Quantity::new(1).unwrap();
        assert!(matches!(
            max.checked_add(one),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn money_formats_and_rounds_to_cents() {
        assert_eq!(Money::from_major(5.5).unwrap().minor_units(), 550);
        assert_eq!(Money::from_major(19.999).unwrap().minor_units(), 2000);
        assert_eq!(Money::from_minor(2550).to_string(), "25.50");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");
        assert!(Money::from_major(f64::NAN).is_none());
    }

    #[test]
    fn money_from_json_accepts_numeric_strings_only() {
        assert_eq!(Money::from_json(&json!(20)), Some(Money::from_minor(2000)));
        assert_eq!(Money::from_json(&json!("12.30")), Some(Money::from_minor(1230)));
        assert_eq!(Money::from_json(&json!("free")), None);
        assert_eq!(Money::from_json(&json!(null)), None);
        assert_eq!(Money::from_json(&json!({"amount": 1})), None);
    }

    #[test]
    fn price_snapshot_blob_uses_storefront_keys() {
        let snapshot = PriceSnapshot::new(
            Money::from_minor(2000),
            Some("https://cdn.example/a1.jpg".to_string()),
            Some("Sunset".to_string()),
        )
        .unwrap();

        let blob = snapshot.to_blob();
        assert_eq!(blob["price"], json!(20.0));
        assert_eq!(blob["img_thumb"], json!("https://cdn.example/a1.jpg"));
        assert_eq!(PriceSnapshot::from_blob(&blob), snapshot);
    }

    #[test]
    fn malformed_blob_decodes_without_price() {
        let snapshot = PriceSnapshot::from_blob(&json!({"price": "n/a", "title": 7}));
        assert_eq!(snapshot.unit_price, None);
        assert_eq!(snapshot.title, None);
    }

    #[test]
    fn price_snapshot_validation() {
        assert!(PriceSnapshot::new(Money::from_minor(-1), None, None).is_err());
        assert!(PriceSnapshot::new(Money::ZERO, Some("ftp://x".into()), None).is_err());
        let ok = PriceSnapshot::new(Money::ZERO, Some("  ".into()), Some("".into())).unwrap();
        assert_eq!(ok.thumbnail_url, None);
        assert_eq!(ok.title, None);
    }
}
