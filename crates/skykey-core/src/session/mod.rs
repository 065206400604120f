//! Chained sessions
//!
//! The registry owns every established role chain; the refresher keeps their
//! final credentials ahead of expiry.

pub mod refresher;
pub mod registry;
pub mod types;

pub use refresher::{RefreshOutcome, RefreshReport, SessionRefresher, tick_interval};
pub use registry::{RegistrySummary, SessionRegistry};
pub use types::{ChainedSession, RefreshState, SessionCredentials, SessionInfo, StepCredentials};
