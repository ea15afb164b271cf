//! Package registry domain module.
//!
//! This crate contains the projected entities (packages and their releases) and
//! the events the registry authority emits, as plain deterministic types (no IO,
//! no HTTP, no storage).

pub mod event;
pub mod package;
pub mod release;

pub use event::{DefaultVersionChanged, PackageCreated, PackageVersionCreated, RegistryEvent};
pub use package::Package;
pub use release::Release;
