//! Store selection and cart service wiring.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use gallery_cart::{Cart, CartItem, CartView, IdentityContext, LoginEvent, Quantity, SharedSummary};
use gallery_core::CartItemId;
use gallery_infra::{AddItem, AddedItem, CartService, CartServiceError, InMemoryCartStore, PostgresCartStore};

use crate::config::ApiConfig;

type InMemoryCarts = CartService<Arc<InMemoryCartStore>>;
type PersistentCarts = CartService<Arc<PostgresCartStore>>;

/// Cart service over whichever store the process was configured with.
#[derive(Clone)]
pub enum AppServices {
    InMemory { carts: Arc<InMemoryCarts> },
    Persistent { carts: Arc<PersistentCarts> },
}

pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    if config.use_persistent_stores {
        return build_persistent_services(config).await;
    }
    Ok(build_in_memory_services())
}

pub fn build_in_memory_services() -> AppServices {
    tracing::info!("using in-memory cart store");
    AppServices::InMemory {
        carts: Arc::new(CartService::new(InMemoryCartStore::arc())),
    }
}

async fn build_persistent_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store = PostgresCartStore::new(pool);
    store.migrate().await.context("failed to apply cart schema")?;

    tracing::info!(
        max_connections = config.database_max_connections,
        "using Postgres cart store"
    );
    Ok(AppServices::Persistent {
        carts: Arc::new(CartService::new(Arc::new(store))),
    })
}

impl AppServices {
    pub async fn get_cart_view(&self, identity: &IdentityContext) -> Result<CartView, CartServiceError> {
        match self {
            AppServices::InMemory { carts } => carts.get_cart_view(identity).await,
            AppServices::Persistent { carts } => carts.get_cart_view(identity).await,
        }
    }

    pub async fn add_item(
        &self,
        identity: &IdentityContext,
        request: AddItem,
    ) -> Result<AddedItem, CartServiceError> {
        match self {
            AppServices::InMemory { carts } => carts.add_item(identity, request).await,
            AppServices::Persistent { carts } => carts.add_item(identity, request).await,
        }
    }

    pub async fn update_quantity(
        &self,
        identity: &IdentityContext,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<CartItem, CartServiceError> {
        match self {
            AppServices::InMemory { carts } => carts.update_quantity(identity, item_id, quantity).await,
            AppServices::Persistent { carts } => carts.update_quantity(identity, item_id, quantity).await,
        }
    }

    pub async fn remove_item(
        &self,
        identity: &IdentityContext,
        item_id: CartItemId,
    ) -> Result<(), CartServiceError> {
        match self {
            AppServices::InMemory { carts } => carts.remove_item(identity, item_id).await,
            AppServices::Persistent { carts } => carts.remove_item(identity, item_id).await,
        }
    }

    pub async fn shared_summary(&self, identity: &IdentityContext) -> Result<SharedSummary, CartServiceError> {
        match self {
            AppServices::InMemory { carts } => carts.shared_summary(identity).await,
            AppServices::Persistent { carts } => carts.shared_summary(identity).await,
        }
    }

    pub async fn on_login(&self, event: &LoginEvent) -> Result<Cart, CartServiceError> {
        match self {
            AppServices::InMemory { carts } => carts.on_login(event).await,
            AppServices::Persistent { carts } => carts.on_login(event).await,
        }
    }

    pub async fn ensure_checkout_ready(
        &self,
        identity: &IdentityContext,
    ) -> Result<CartView, CartServiceError> {
        match self {
            AppServices::InMemory { carts } => carts.ensure_checkout_ready(identity).await,
            AppServices::Persistent { carts } => carts.ensure_checkout_ready(identity).await,
        }
    }
}
