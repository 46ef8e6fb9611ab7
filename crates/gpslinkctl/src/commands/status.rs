//! Status: installation state plus the currently discovered process set.

use std::path::{Path, PathBuf};

use anyhow::Result;
use gpslink_common::install::is_pending_configuration;
use gpslink_common::procscan::{discover, ServiceMatcher, SystemTable};
use gpslink_common::{paths, supervise};

pub fn status(install_dir: &Path) -> Result<()> {
    println!("gpslink {}", env!("CARGO_PKG_VERSION"));

    if !install_dir.exists() {
        println!("Installation: absent ({})", install_dir.display());
        return Ok(());
    }

    let state = if is_pending_configuration(install_dir) {
        "pending first configuration"
    } else if supervise::is_active(&PathBuf::from(paths::DEFAULT_SERVICE_LINK)) {
        "active"
    } else {
        "installed, not activated"
    };
    println!("Installation: {state} ({})", install_dir.display());

    let matcher = ServiceMatcher::for_service(paths::SERVICE_NAME);
    let found = discover(&mut SystemTable::new(), &matcher);

    match found.rotator {
        Some(ref r) => println!("Log rotator: pid {}", r.pid),
        None => println!("Log rotator: not running"),
    }

    if found.victims.is_empty() {
        println!("Service processes: none");
    } else {
        println!("Service processes:");
        for record in &found.victims {
            println!("  {:>6}  {}", record.pid, record.cmdline);
        }
    }

    Ok(())
}
