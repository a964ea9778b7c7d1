//! Store provisioning core
//!
//! - [`Provisioner`] owns the create and delete workflows. Create persists a
//!   `Provisioning` record, then installs in a detached task whose outcome
//!   becomes `Ready` or `Failed`. Delete tears down the release before it
//!   forgets the record.
//! - [`StatusReconciler`] runs on every read: it observes the live namespace
//!   and, when the observation is conclusive and disagrees, overwrites the
//!   persisted status.
//! - [`ReconcileLoop`] optionally does the same for `Provisioning` records on
//!   a fixed interval.
//!
//! All status writes are conditional on the record version that was read. A
//! writer that loses a race re-reads the record and decides again.

#![deny(missing_docs)]

mod provisioner;
mod reconciler;
mod sweep;
mod view;
mod write;

pub use provisioner::{CreatedStore, InstallHandle, Provisioner, ProvisionerConfig};
pub use reconciler::{ReconciledStore, StatusReconciler};
pub use sweep::ReconcileLoop;
pub use view::{StoreUrlTemplate, StoreView};
