//! Order lifecycle management: policy, store, service and reconciliation.

mod error;
pub mod policy;
mod reconciler;
mod report;
mod reviews;
mod service;
mod store;

pub use error::{LifecycleError, Result};
pub use policy::AvailableAction;
pub use reconciler::{MergeReport, RemoteBatch, Resolution, SyncReconciler};
pub use report::{ReportPeriod, SalesReport};
pub use reviews::ReviewLedger;
pub use service::{Clock, ConfirmationSink, LifecycleService, SystemClock, TransitionOutcome};
pub use store::{AppliedChange, OrderEvent, OrderFilter, OrderStore, Party};
