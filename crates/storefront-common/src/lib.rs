//! Common types for storefront
//!
//! Store record model, lifecycle status, cluster name generation and the
//! shared error type used by the catalog, driver and provisioner crates.

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod naming;
pub mod store;

pub use error::Error;
pub use naming::StoreIdentifiers;
pub use store::{Store, StoreId, StoreStatus};

/// Result type alias using the storefront Error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
