//! gpslink common - lifecycle management for the GPS data-bridge service.
//!
//! Everything the `gpslinkctl` binary does lives here: resolving and
//! fetching release bundles, the install/update swap, supervisor
//! integration, and the force-restart controller built on dynamic
//! process discovery.

pub mod archive;
pub mod config;
pub mod error;
pub mod install;
pub mod paths;
pub mod procscan;
pub mod release;
pub mod restart;
pub mod supervise;

pub use config::BridgeConfig;
pub use error::LifecycleError;
pub use install::{InstallKind, InstallOutcome};
pub use release::{Channel, Release, ReleaseClient};
pub use restart::{force_restart, RestartOutcome};
