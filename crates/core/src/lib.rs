//! `pkgmg-core` — foundation building blocks for the registry indexer.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{Address, PackageName, ReleaseId, VersionName};
