//! Well-known locations on the gateway.
//!
//! The defaults follow the Venus OS layout: user-installed services live
//! under /data (survives firmware updates), svscan watches /service, and
//! multilog writes under /var/log. Every function in the other modules
//! takes explicit paths so tests can point them at a tempdir.

/// Service name as it appears in run scripts and process command lines.
pub const SERVICE_NAME: &str = "gpslink";

/// Default installation directory on the device.
pub const DEFAULT_INSTALL_DIR: &str = "/data/gpslink";

/// Directory svscan watches; a symlink here activates the service.
pub const DEFAULT_SERVICE_LINK: &str = "/service/gpslink";

/// Where the log run script points multilog.
pub const DEFAULT_LOG_DIR: &str = "/var/log/gpslink";

/// Operator-owned configuration file, relative to the install dir.
pub const CONFIG_FILE: &str = "config";

/// Bundled configuration template, relative to the install dir.
pub const CONFIG_SAMPLE: &str = "config.sample";

/// Marker left by a first install until the operator activates the service.
pub const PENDING_MARKER: &str = ".pending-config";
