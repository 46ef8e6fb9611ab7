//! Install/update command: resolve, fetch, stage, swap, restart.

use std::path::Path;
use std::thread;

use anyhow::{Context, Result};
use gpslink_common::install::{self, InstallKind, SETTLE_DELAY};
use gpslink_common::release::{Channel, ReleaseClient};
use gpslink_common::restart::force_restart;
use gpslink_common::{archive, paths};
use tracing::info;

pub async fn install(channel: Channel, install_dir: &Path) -> Result<()> {
    let client = ReleaseClient::new();

    let release = client
        .resolve(channel)
        .await
        .with_context(|| format!("resolving channel '{channel}'"))?;
    println!("Resolved {channel} release: {}", release.tag_name);

    let work = tempfile::tempdir().context("creating staging directory")?;
    let tarball = client
        .download(&release, work.path())
        .await
        .with_context(|| format!("downloading {}", release.tag_name))?;

    let staging = archive::extract_bundle(&tarball, work.path())
        .with_context(|| format!("extracting {}", tarball.display()))?;

    let outcome = install::install(&staging, install_dir)
        .with_context(|| format!("installing into {}", install_dir.display()))?;

    for warning in &outcome.warnings {
        println!("warning: {warning}");
    }

    match outcome.kind {
        InstallKind::FirstInstall => {
            println!("Installed {} (first install).", release.tag_name);
            println!(
                "Edit {} to point at your GPS source, then run: gpslinkctl activate",
                install_dir.join(paths::CONFIG_FILE).display()
            );
        }
        InstallKind::Updated => {
            println!("Updated to {}; restarting service.", release.tag_name);
            info!(settle = ?SETTLE_DELAY, "letting the new tree settle before restart");
            thread::sleep(SETTLE_DELAY);
            let outcome = force_restart(paths::SERVICE_NAME);
            println!("{outcome}");
        }
    }

    Ok(())
}
