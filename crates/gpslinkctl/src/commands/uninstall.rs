//! Uninstall: deactivate, terminate the process set, remove the tree.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gpslink_common::install;
use gpslink_common::procscan::{ServiceMatcher, SystemTable};
use gpslink_common::restart::{force_restart_with, RestartTiming, UnixSignals};
use gpslink_common::{paths, supervise};

pub fn uninstall(install_dir: &Path) -> Result<()> {
    // Unlink first so the supervisor does not respawn what we kill.
    let link = PathBuf::from(paths::DEFAULT_SERVICE_LINK);
    supervise::deactivate(&link)?;

    let matcher = ServiceMatcher::for_service(paths::SERVICE_NAME);
    let outcome = force_restart_with(
        &mut SystemTable::new(),
        &mut UnixSignals,
        &matcher,
        // Nothing respawns after deactivation, so skip the respawn wait.
        &RestartTiming {
            respawn_wait: std::time::Duration::ZERO,
            ..RestartTiming::default()
        },
    );
    if !outcome.nothing_running() {
        println!("{outcome}");
    }

    install::uninstall(install_dir)
        .with_context(|| format!("removing {}", install_dir.display()))?;

    println!("Uninstalled {}.", install_dir.display());
    println!(
        "Config kept at {}",
        install::config_backup_path(install_dir).display()
    );
    Ok(())
}
