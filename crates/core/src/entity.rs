//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Projected entities (packages, releases) are keyed by their identifier in the
/// entity store; two entities with the same id are the same entity even when
/// their mutable fields differ.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Ord + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
