//! Force restart: log reset, batch kill, supervisor respawn.

use anyhow::Result;
use gpslink_common::paths::SERVICE_NAME;
use gpslink_common::restart::force_restart;

pub fn restart() -> Result<()> {
    let outcome = force_restart(SERVICE_NAME);
    println!("{outcome}");
    // "Nothing running" and a missing rotator are warnings, not failures:
    // the supervisor owns the respawn either way.
    Ok(())
}
