//! Activation: hand the installed service to the supervisor.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use gpslink_common::install::{clear_pending, is_pending_configuration};
use gpslink_common::{paths, supervise, BridgeConfig};

pub fn activate(install_dir: &Path) -> Result<()> {
    if !install_dir.exists() {
        bail!(
            "no installation at {}; run 'gpslinkctl install' first",
            install_dir.display()
        );
    }

    let config_path = install_dir.join(paths::CONFIG_FILE);
    let config = BridgeConfig::load(&config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;

    if is_pending_configuration(install_dir) && config == BridgeConfig::default() {
        println!(
            "Config at {} still holds the sample defaults.",
            config_path.display()
        );
        println!("Activating anyway; edit it and run 'gpslinkctl restart' to apply changes.");
    }

    let link = PathBuf::from(paths::DEFAULT_SERVICE_LINK);
    supervise::activate(install_dir, &link)
        .with_context(|| format!("linking {}", link.display()))?;
    clear_pending(install_dir)?;

    println!("Service activated; the supervisor will start it shortly.");
    Ok(())
}

pub fn deactivate() -> Result<()> {
    let link = PathBuf::from(paths::DEFAULT_SERVICE_LINK);
    if supervise::deactivate(&link)? {
        println!("Service deactivated. Running processes are left alone;");
        println!("use 'gpslinkctl restart' semantics via uninstall to stop them.");
    } else {
        println!("Service was not active.");
    }
    Ok(())
}
