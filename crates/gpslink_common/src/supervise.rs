//! Supervisor integration: run scripts and the activation link.
//!
//! The external supervisor (svscan/supervise) knows nothing about this
//! service beyond a directory with a `run` command and a `log/run` command.
//! The worker's run command execs the manager in the foreground with stderr
//! merged into stdout, so the supervise table entry IS the worker and one
//! pipe carries all logging into multilog. Any exit means "restart me";
//! the run command never exits 0 in normal operation.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;
use crate::paths::DEFAULT_LOG_DIR;

/// multilog keeps `n` rotated segments of at most `s` bytes each,
/// timestamping every line.
const LOG_SEGMENT_BYTES: u32 = 250_000;
const LOG_SEGMENT_COUNT: u32 = 8;

/// Run command for the worker: foreground exec, merged streams.
pub fn run_script(install_dir: &Path) -> String {
    format!(
        "#!/bin/sh\nexec 2>&1\nexec {}/gpslinkctl run\n",
        install_dir.display()
    )
}

/// Run command for the log rotator.
pub fn log_run_script(log_dir: &str) -> String {
    format!(
        "#!/bin/sh\nexec multilog t s{LOG_SEGMENT_BYTES} n{LOG_SEGMENT_COUNT} {log_dir}\n"
    )
}

/// Make sure the supervisor subtree exists and points at this install dir.
/// Bundles ship these scripts, but a hand-assembled tree may not; rewriting
/// them also fixes a bundle built for a different install path.
pub fn ensure_service_tree(install_dir: &Path, warnings: &mut Vec<String>) {
    let service_dir = install_dir.join("service");
    let log_dir = service_dir.join("log");

    let steps: [(std::path::PathBuf, String); 2] = [
        (service_dir.join("run"), run_script(install_dir)),
        (log_dir.join("run"), log_run_script(DEFAULT_LOG_DIR)),
    ];

    if let Err(e) = fs::create_dir_all(&log_dir) {
        warn!(error = %e, "could not create service subtree");
        warnings.push(format!("service subtree not created: {e}"));
        return;
    }

    for (path, contents) in steps {
        if let Err(e) = fs::write(&path, contents) {
            warn!(path = %path.display(), error = %e, "could not write run script");
            warnings.push(format!("run script not written at {}: {e}", path.display()));
        }
    }
}

/// Activate: link the service subtree into the directory svscan watches.
/// svscan notices the new entry and starts supervising within seconds.
pub fn activate(install_dir: &Path, service_link: &Path) -> Result<()> {
    let target = install_dir.join("service");

    #[cfg(unix)]
    {
        if service_link.exists() || fs::symlink_metadata(service_link).is_ok() {
            fs::remove_file(service_link)?;
        }
        std::os::unix::fs::symlink(&target, service_link)?;
    }
    #[cfg(not(unix))]
    {
        let _ = &target;
        unimplemented!("supervisor activation is unix-only");
    }

    info!(link = %service_link.display(), "service activated");
    Ok(())
}

/// Deactivate: remove the link. Returns whether a link was present.
pub fn deactivate(service_link: &Path) -> Result<bool> {
    if fs::symlink_metadata(service_link).is_ok() {
        fs::remove_file(service_link)?;
        info!(link = %service_link.display(), "service deactivated");
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Whether the supervisor is currently managing this installation.
pub fn is_active(service_link: &Path) -> bool {
    fs::symlink_metadata(service_link).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_script_execs_in_foreground_with_merged_streams() {
        let script = run_script(Path::new("/data/gpslink"));
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("exec 2>&1"));
        assert!(script.contains("exec /data/gpslink/gpslinkctl run"));
    }

    #[test]
    fn test_log_run_script_caps_and_rotates() {
        let script = log_run_script("/var/log/gpslink");
        assert!(script.contains("multilog t "));
        assert!(script.contains("s250000"));
        assert!(script.contains("n8"));
        assert!(script.ends_with("/var/log/gpslink\n"));
    }

    #[test]
    fn test_ensure_service_tree_writes_both_scripts() {
        let tmp = TempDir::new().unwrap();
        let mut warnings = Vec::new();
        ensure_service_tree(tmp.path(), &mut warnings);
        assert!(warnings.is_empty());
        assert!(tmp.path().join("service/run").exists());
        assert!(tmp.path().join("service/log/run").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_activate_deactivate_cycle() {
        let tmp = TempDir::new().unwrap();
        let install_dir = tmp.path().join("gpslink");
        fs::create_dir_all(install_dir.join("service")).unwrap();
        let link = tmp.path().join("service-link");

        assert!(!is_active(&link));
        activate(&install_dir, &link).unwrap();
        assert!(is_active(&link));
        assert_eq!(fs::read_link(&link).unwrap(), install_dir.join("service"));

        // Re-activating replaces the link instead of failing
        activate(&install_dir, &link).unwrap();

        assert!(deactivate(&link).unwrap());
        assert!(!is_active(&link));
        assert!(!deactivate(&link).unwrap());
    }
}
