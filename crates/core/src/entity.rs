//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Carts and cart items are entities: an item keeps its identifier when it is
/// re-parented onto another cart during a merge.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
