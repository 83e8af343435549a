//! Low-level primitives the session attribute layer is built on.
//!
//! Includes the keyed store capability with its in-memory backend and the
//! worker pool used for cascading work.

/// Worker pool for off-thread cascade work.
///
/// Keeps store notification threads free of blocking work.
pub mod executor;

/// Keyed store abstraction and in-memory implementation.
///
/// Typed stores with access modes, passivation tiers, and listener registration.
pub mod store;
