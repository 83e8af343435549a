//! Fine-grained session attributes.
//!
//! A session's attributes live in a names index entry (`name -> AttributeId`) and
//! one attribute entry per id. [`SessionAttributesFactory`] loads, validates, and
//! deletes them as a unit; [`AttributesView`] reads and writes single attributes.

mod activation;
mod bundle;
mod cascade;
mod factory;
mod index;
mod view;


pub use activation::{
    ActivationListenerProvider, ActivationNotifier, ImmutableSession, NoActivationListeners,
};
pub use bundle::{AttributeBundle, ImmutableAttributes};
pub use factory::{AttributesFactoryConfig, SessionAttributesFactory};
pub use index::{AttributeStore, MetaDataStore, NamesStore};
pub use view::AttributesView;
