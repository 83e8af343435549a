//! Fine-grained session attribute storage.
//!
//! Sessions are decomposed into one names index entry plus one entry per
//! attribute, so single attributes can be replicated, evicted, and passivated
//! without touching the rest of the session.

#![warn(missing_docs)]

pub mod primitives;
pub mod session;
pub mod storage;
pub mod types;

pub use session::{
    ActivationListenerProvider, AttributeBundle, AttributesFactoryConfig, AttributesView,
    ImmutableAttributes, ImmutableSession, SessionAttributesFactory,
};
pub use types::{Result, SessionError, SessionId};
