//! Installer/updater for the deployable bundle.
//!
//! The single worst failure mode here is losing a live config, so the
//! order is fixed: the config is moved to a sibling backup before anything
//! destructive happens, and the old tree is retired by rename rather than
//! removed in place. A crash mid-install leaves either the old tree or the
//! retired copy on disk, never neither.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::error::{LifecycleError, Result};
use crate::paths::{CONFIG_FILE, CONFIG_SAMPLE, PENDING_MARKER};
use crate::supervise;

/// Pause between placing an update and kicking the restart controller,
/// so the supervisor sees a settled tree.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// What kind of install this turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallKind {
    /// No prior config existed. The service stays inactive until the
    /// operator edits the config and activates it.
    FirstInstall,
    /// A prior config was preserved; the caller should trigger a restart.
    Updated,
}

#[derive(Debug)]
pub struct InstallOutcome {
    pub kind: InstallKind,
    pub config_preserved: bool,
    pub warnings: Vec<String>,
}

impl InstallOutcome {
    pub fn needs_restart(&self) -> bool {
        self.kind == InstallKind::Updated
    }
}

/// Sibling path the live config is parked at while the tree is swapped.
pub fn config_backup_path(install_dir: &Path) -> PathBuf {
    let mut name = install_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gpslink".to_string());
    name.push_str(".config-prev");
    install_dir.with_file_name(name)
}

/// Sibling path the previous tree is retired to during the swap.
fn retired_path(install_dir: &Path) -> PathBuf {
    let mut name = install_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gpslink".to_string());
    name.push_str(".old");
    install_dir.with_file_name(name)
}

/// Install or update the bundle at `install_dir` from a staged tree.
///
/// Steps, each a distinct failure domain:
/// 1. park the live config at a sibling backup path (absence is fine)
/// 2. retire the old tree by rename (fatal if it cannot be moved aside)
/// 3. move the staged tree into place
/// 4. restore the parked config, or materialize one from the sample
/// 5. drop the retired tree (non-fatal)
/// 6. normalize executable bits on entry points and run scripts (non-fatal)
pub fn install(staging_dir: &Path, install_dir: &Path) -> Result<InstallOutcome> {
    let mut warnings = Vec::new();

    // Step 1: preserve before destroy. Nothing below runs unless the live
    // config is safely out of the tree.
    let live_config = install_dir.join(CONFIG_FILE);
    let backup = config_backup_path(install_dir);
    let mut had_config = backup.exists();
    if live_config.exists() {
        fs::rename(&live_config, &backup).map_err(|source| LifecycleError::Config {
            path: backup.clone(),
            source,
        })?;
        had_config = true;
        info!(backup = %backup.display(), "parked existing config");
    }

    // Step 2: retire the previous tree. A leftover retired tree from a
    // crashed run has to go first, and any failure here is fatal: a partial
    // old tree left in place could shadow new files.
    let retired = retired_path(install_dir);
    if retired.exists() {
        fs::remove_dir_all(&retired).map_err(|source| LifecycleError::Cleanup {
            path: retired.clone(),
            source,
        })?;
    }
    if install_dir.exists() {
        fs::rename(install_dir, &retired).map_err(|source| LifecycleError::Cleanup {
            path: install_dir.to_path_buf(),
            source,
        })?;
    }

    // Step 3: place the staged tree. Rename when staging sits on the same
    // filesystem, recursive copy otherwise. No automatic rollback on a
    // partial copy; the retired tree stays on disk for manual recovery.
    if fs::rename(staging_dir, install_dir).is_err() {
        copy_dir(staging_dir, install_dir).map_err(|source| LifecycleError::Copy {
            path: install_dir.to_path_buf(),
            source,
        })?;
    }

    // Step 4: bring the config back, or materialize one from the sample
    // and leave the installation pending first configuration.
    let kind = if had_config {
        fs::rename(&backup, &live_config).map_err(|source| LifecycleError::Config {
            path: live_config.clone(),
            source,
        })?;
        InstallKind::Updated
    } else {
        let sample = install_dir.join(CONFIG_SAMPLE);
        if sample.exists() {
            fs::copy(&sample, &live_config).map_err(|source| LifecycleError::Config {
                path: live_config.clone(),
                source,
            })?;
        } else {
            warnings.push(format!(
                "bundle is missing {CONFIG_SAMPLE}; wrote built-in template"
            ));
            fs::write(&live_config, BridgeConfig::sample()).map_err(|source| {
                LifecycleError::Config {
                    path: live_config.clone(),
                    source,
                }
            })?;
        }
        fs::write(install_dir.join(PENDING_MARKER), b"")?;
        InstallKind::FirstInstall
    };

    // Step 5: drop the retired tree. Failure leaves garbage, not breakage.
    if retired.exists() {
        if let Err(e) = fs::remove_dir_all(&retired) {
            warn!(path = %retired.display(), error = %e, "could not remove retired tree");
            warnings.push(format!("retired tree left at {}: {e}", retired.display()));
        }
    }

    // Step 6: the supervisor invocation fails loudly if these are wrong,
    // so a chmod failure is logged rather than fatal.
    supervise::ensure_service_tree(install_dir, &mut warnings);
    normalize_executables(install_dir, &mut warnings);

    info!(
        install_dir = %install_dir.display(),
        kind = ?kind,
        "bundle installed"
    );

    Ok(InstallOutcome {
        kind,
        config_preserved: had_config,
        warnings,
    })
}

/// Remove an installation, keeping the operator's config parked at the
/// sibling backup path. The caller is responsible for deactivating the
/// service and terminating the process set first.
pub fn uninstall(install_dir: &Path) -> Result<()> {
    let live_config = install_dir.join(CONFIG_FILE);
    if live_config.exists() {
        let backup = config_backup_path(install_dir);
        fs::rename(&live_config, &backup).map_err(|source| LifecycleError::Config {
            path: backup.clone(),
            source,
        })?;
        info!(backup = %backup.display(), "config kept at backup path");
    }
    if install_dir.exists() {
        fs::remove_dir_all(install_dir).map_err(|source| LifecycleError::Cleanup {
            path: install_dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// True while a first install waits for the operator to edit the config.
pub fn is_pending_configuration(install_dir: &Path) -> bool {
    install_dir.join(PENDING_MARKER).exists()
}

/// Clear the pending marker once the operator activates the service.
pub fn clear_pending(install_dir: &Path) -> std::io::Result<()> {
    let marker = install_dir.join(PENDING_MARKER);
    if marker.exists() {
        fs::remove_file(marker)?;
    }
    Ok(())
}

fn copy_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Entry points and run scripts must be executable for the supervisor.
fn normalize_executables(install_dir: &Path, warnings: &mut Vec<String>) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut targets: Vec<PathBuf> = ["gpslinkctl", "service/run", "service/log/run"]
            .iter()
            .map(|rel| install_dir.join(rel))
            .collect();

        // Lifecycle scripts shipped at the bundle root
        if let Ok(entries) = fs::read_dir(install_dir) {
            for entry in entries.flatten() {
                if entry.path().extension().is_some_and(|e| e == "sh") {
                    targets.push(entry.path());
                }
            }
        }

        for path in targets {
            if !path.exists() {
                continue;
            }
            if let Err(e) = fs::set_permissions(&path, fs::Permissions::from_mode(0o755)) {
                warn!(path = %path.display(), error = %e, "chmod failed");
                warnings.push(format!("could not mark {} executable: {e}", path.display()));
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (install_dir, warnings);
    }
}
