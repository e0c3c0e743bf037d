//! Shopping cart domain module.
//!
//! This crate contains the business rules for carts, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage): the cart and item
//! model, the line-item merge planner and the read projection.

pub mod identity;
pub mod merge;
pub mod model;
pub mod projection;

pub use identity::{IdentityContext, LoginEvent};
pub use merge::{MergePlan, MergeStep, plan_merge};
pub use model::{
    Cart, CartItem, CartOwner, Money, NewCartItem, PriceSnapshot, Quantity, VariationKey,
};
pub use projection::{CartProjection, CartView, PREVIEW_LIMIT, SharedSummary, project};
