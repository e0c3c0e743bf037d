//! Postgres-backed cart store.
//!
//! Every [`CartTransaction`] wraps one SQL transaction. Cart lookups take a
//! row lock (`SELECT ... FOR UPDATE`) so that two requests reconciling the
//! same cart serialize instead of interleaving.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Second cart for an owner, duplicate variation line |
//! | Database (foreign key violation) | `23503` | `Conflict` | Item written into a cart deleted by a concurrent merge |
//! | Database (serialization failure) | `40001` | `Conflict` | Concurrent transaction aborted by the server |
//! | Database (deadlock detected) | `40P01` | `Conflict` | Concurrent transaction aborted by the server |
//! | Database (other) | Any other | `Backend` | Check constraint, syntax, ... |
//! | PoolClosed / Io / ... | N/A | `Backend` | Connection failures |

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::{instrument, Span};
use uuid::Uuid;

use gallery_cart::{
    Cart, CartItem, CartOwner, NewCartItem, PriceSnapshot, Quantity, VariationKey,
};
use gallery_core::{CartId, CartItemId, SessionId, UserId};

use super::r#trait::{CartStore, CartTransaction, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_create_carts.sql");

const CART_COLUMNS: &str = "id, session_id, user_id, created_at, updated_at";
const ITEM_COLUMNS: &str =
    "id, cart_id, artwork_id, type, frame, size, quantity, price_snapshot, created_at, updated_at";

/// Postgres-backed cart store.
///
/// Ownership uniqueness, the single-owner rule, per-cart variation uniqueness
/// and cascade deletes are all enforced by the schema in
/// `migrations/0001_create_carts.sql`.
#[derive(Debug, Clone)]
pub struct PostgresCartStore {
    pool: Arc<PgPool>,
}

impl PostgresCartStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the cart tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CartStore for PostgresCartStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTransaction { tx })
    }
}

/// One SQL transaction. Dropped without `commit` it is rolled back by SQLx.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    async fn fetch_cart(
        &mut self,
        operation: &str,
        filter: &str,
        bind: CartFilter<'_>,
    ) -> Result<Option<Cart>, StoreError> {
        let sql = format!("SELECT {CART_COLUMNS} FROM carts WHERE {filter} FOR UPDATE");
        let query = sqlx::query(&sql);
        let query = match bind {
            CartFilter::Id(id) => query.bind(id.as_raw()),
            CartFilter::User(user_id) => query.bind(*user_id.as_uuid()),
            CartFilter::Session(session_id) => query.bind(session_id.as_str()),
        };

        let row = query
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        row.map(|row| decode_cart(&row)).transpose()
    }
}

enum CartFilter<'a> {
    Id(CartId),
    User(UserId),
    Session(&'a SessionId),
}

#[async_trait::async_trait]
impl CartTransaction for PostgresTransaction {
    #[instrument(skip(self), fields(cart_id = %cart_id), err)]
    async fn find_cart(&mut self, cart_id: CartId) -> Result<Option<Cart>, StoreError> {
        self.fetch_cart("find_cart", "id = $1", CartFilter::Id(cart_id))
            .await
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn find_by_user(&mut self, user_id: UserId) -> Result<Option<Cart>, StoreError> {
        self.fetch_cart("find_by_user", "user_id = $1", CartFilter::User(user_id))
            .await
    }

    #[instrument(skip(self, session_id), err)]
    async fn find_by_session(&mut self, session_id: &SessionId) -> Result<Option<Cart>, StoreError> {
        self.fetch_cart(
            "find_by_session",
            "session_id = $1 AND user_id IS NULL",
            CartFilter::Session(session_id),
        )
        .await
    }

    #[instrument(skip(self, owner), fields(guest = owner.session_id().is_some(), cart_id), err)]
    async fn create_cart(&mut self, owner: &CartOwner) -> Result<Cart, StoreError> {
        let sql = format!(
            "INSERT INTO carts (session_id, user_id) VALUES ($1, $2) RETURNING {CART_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(owner.session_id().map(|s| s.as_str()))
            .bind(owner.user_id().map(|u| *u.as_uuid()))
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("create_cart", e))?;

        let cart = decode_cart(&row)?;
        Span::current().record("cart_id", cart.id.as_raw());
        Ok(cart)
    }

    #[instrument(skip(self), fields(cart_id = %cart_id, user_id = %user_id), err)]
    async fn reown_cart(&mut self, cart_id: CartId, user_id: UserId) -> Result<Cart, StoreError> {
        let sql = format!(
            r#"
            UPDATE carts
            SET user_id = $2, session_id = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING {CART_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(cart_id.as_raw())
            .bind(*user_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("reown_cart", e))?
            .ok_or_else(|| StoreError::NotFound(format!("cart {cart_id}")))?;

        decode_cart(&row)
    }

    #[instrument(skip(self), fields(cart_id = %cart_id), err)]
    async fn delete_cart(&mut self, cart_id: CartId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(cart_id.as_raw())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_cart", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(cart_id = %cart_id), err)]
    async fn touch_cart(&mut self, cart_id: CartId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id.as_raw())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("touch_cart", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("cart {cart_id}")));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(cart_id = %cart_id, item_count), err)]
    async fn items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>, StoreError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY id ASC");
        let rows = sqlx::query(&sql)
            .bind(cart_id.as_raw())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("items", e))?;

        let items = rows.iter().map(decode_item).collect::<Result<Vec<_>, _>>()?;
        Span::current().record("item_count", items.len());
        Ok(items)
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn find_item(&mut self, item_id: CartItemId) -> Result<Option<CartItem>, StoreError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM cart_items WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(item_id.as_raw())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_item", e))?;
        row.as_ref().map(decode_item).transpose()
    }

    #[instrument(skip(self, key), fields(cart_id = %cart_id, artwork_id = key.artwork_id()), err)]
    async fn find_item_by_key(
        &mut self,
        cart_id: CartId,
        key: &VariationKey,
    ) -> Result<Option<CartItem>, StoreError> {
        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM cart_items
            WHERE cart_id = $1 AND artwork_id = $2 AND type = $3 AND frame = $4 AND size = $5
            FOR UPDATE
            "#
        );
        let row = sqlx::query(&sql)
            .bind(cart_id.as_raw())
            .bind(key.artwork_id())
            .bind(key.product_type())
            .bind(key.frame())
            .bind(key.size())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_item_by_key", e))?;
        row.as_ref().map(decode_item).transpose()
    }

    #[instrument(
        skip(self, item),
        fields(cart_id = %item.cart_id, artwork_id = item.key.artwork_id(), quantity = item.quantity.get()),
        err
    )]
    async fn insert_item(&mut self, item: NewCartItem) -> Result<CartItem, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO cart_items (cart_id, artwork_id, type, frame, size, quantity, price_snapshot)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(item.cart_id.as_raw())
            .bind(item.key.artwork_id())
            .bind(item.key.product_type())
            .bind(item.key.frame())
            .bind(item.key.size())
            .bind(item.quantity.get())
            .bind(item.price.to_blob())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_item", e))?;
        decode_item(&row)
    }

    #[instrument(skip(self), fields(item_id = %item_id, quantity = quantity.get()), err)]
    async fn set_item_quantity(
        &mut self,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<CartItem, StoreError> {
        let sql = format!(
            "UPDATE cart_items SET quantity = $2, updated_at = NOW() WHERE id = $1 RETURNING {ITEM_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(item_id.as_raw())
            .bind(quantity.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("set_item_quantity", e))?
            .ok_or_else(|| StoreError::NotFound(format!("cart item {item_id}")))?;
        decode_item(&row)
    }

    #[instrument(skip(self), fields(item_id = %item_id, cart_id = %cart_id), err)]
    async fn reparent_item(&mut self, item_id: CartItemId, cart_id: CartId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE cart_items SET cart_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(item_id.as_raw())
            .bind(cart_id.as_raw())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("reparent_item", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("cart item {item_id}")));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn delete_item(&mut self, item_id: CartItemId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(item_id.as_raw())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Raw `carts` row.
#[derive(Debug)]
struct CartRow {
    id: i64,
    session_id: Option<String>,
    user_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for CartRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<CartRow> for Cart {
    type Error = StoreError;

    fn try_from(row: CartRow) -> Result<Self, Self::Error> {
        let owner = match (row.user_id, row.session_id) {
            (Some(user_id), _) => CartOwner::User(UserId::from_uuid(user_id)),
            (None, Some(session_id)) => CartOwner::Session(
                SessionId::new(session_id)
                    .map_err(|e| StoreError::Backend(format!("cart {}: {e}", row.id)))?,
            ),
            (None, None) => {
                return Err(StoreError::Backend(format!("cart {} has no owner", row.id)));
            }
        };

        Ok(Cart {
            id: CartId::from_raw(row.id),
            owner,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Raw `cart_items` row.
#[derive(Debug)]
struct CartItemRow {
    id: i64,
    cart_id: i64,
    artwork_id: String,
    product_type: String,
    frame: String,
    size: String,
    quantity: i32,
    price_snapshot: JsonValue,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for CartItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            cart_id: row.try_get("cart_id")?,
            artwork_id: row.try_get("artwork_id")?,
            product_type: row.try_get("type")?,
            frame: row.try_get("frame")?,
            size: row.try_get("size")?,
            quantity: row.try_get("quantity")?,
            price_snapshot: row.try_get("price_snapshot")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = StoreError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        let corrupt = |e: gallery_core::DomainError| {
            StoreError::Backend(format!("cart item {}: {e}", row.id))
        };

        Ok(CartItem {
            id: CartItemId::from_raw(row.id),
            cart_id: CartId::from_raw(row.cart_id),
            key: VariationKey::new(row.artwork_id, row.product_type, row.frame, row.size)
                .map_err(corrupt)?,
            quantity: Quantity::new(i64::from(row.quantity)).map_err(corrupt)?,
            price: PriceSnapshot::from_blob(&row.price_snapshot),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn decode_cart(row: &PgRow) -> Result<Cart, StoreError> {
    let row = CartRow::from_row(row)
        .map_err(|e| StoreError::Backend(format!("failed to deserialize cart row: {e}")))?;
    row.try_into()
}

fn decode_item(row: &PgRow) -> Result<CartItem, StoreError> {
    let row = CartItemRow::from_row(row)
        .map_err(|e| StoreError::Backend(format!("failed to deserialize cart item row: {e}")))?;
    row.try_into()
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // unique violation, foreign key violation
                Some("23505") | Some("23503") => StoreError::Conflict(msg),
                // serialization failure, deadlock detected
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::NotFound(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
