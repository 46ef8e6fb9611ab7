//! Force-restart controller.
//!
//! Synchronous and best-effort: reset the log rotator's current segment,
//! kill every discovered member of the service process set in one batch,
//! then wait for the OS to reap them and for the external supervisor to
//! respawn the worker. Nothing is relaunched here; svscan's directory
//! watch brings the service back.

use std::fmt;
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{info, warn};

use crate::procscan::{discover, ProcessTable, ServiceMatcher, SystemTable};

/// Signal delivery seam. Production sends real signals; tests record them.
pub trait SignalPort {
    /// Non-terminating rotation reset ("close current segment, begin a new
    /// one"). The rotator interprets SIGALRM this way.
    fn reset(&mut self, pid: i32) -> Result<(), Errno>;
    /// Immediate, non-catchable termination.
    fn kill(&mut self, pid: i32) -> Result<(), Errno>;
}

/// Real signal delivery through the kernel.
pub struct UnixSignals;

impl SignalPort for UnixSignals {
    fn reset(&mut self, pid: i32) -> Result<(), Errno> {
        kill(Pid::from_raw(pid), Signal::SIGALRM)
    }

    fn kill(&mut self, pid: i32) -> Result<(), Errno> {
        kill(Pid::from_raw(pid), Signal::SIGKILL)
    }
}

/// Wait intervals between kill, reap, and supervisor respawn.
#[derive(Debug, Clone)]
pub struct RestartTiming {
    pub reap_wait: Duration,
    pub respawn_wait: Duration,
}

impl Default for RestartTiming {
    fn default() -> Self {
        Self {
            reap_wait: Duration::from_secs(2),
            respawn_wait: Duration::from_secs(5),
        }
    }
}

impl RestartTiming {
    /// No waiting, for tests and for uninstall (nothing will respawn).
    pub fn immediate() -> Self {
        Self {
            reap_wait: Duration::ZERO,
            respawn_wait: Duration::ZERO,
        }
    }
}

/// Outcome report. The two soft conditions are deliberately distinct:
/// a missing rotator on an otherwise running service is a different
/// situation from a service that is down entirely.
#[derive(Debug, Default)]
pub struct RestartOutcome {
    pub rotator_found: bool,
    pub rotator_reset: bool,
    pub victims_found: usize,
    pub killed: usize,
    /// Signals that failed because the target was already gone.
    pub signal_misses: usize,
    /// Set members still visible after the reap wait.
    pub survivors: usize,
}

impl RestartOutcome {
    /// The service was already down; a soft outcome, never an error.
    pub fn nothing_running(&self) -> bool {
        self.victims_found == 0
    }
}

impl fmt::Display for RestartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nothing_running() {
            write!(f, "nothing running; leaving restart to the supervisor")?;
        } else {
            write!(
                f,
                "terminated {}/{} processes; supervisor will respawn the worker",
                self.killed, self.victims_found
            )?;
        }
        if !self.rotator_found {
            write!(f, " (warning: log rotator not found)")?;
        } else if !self.rotator_reset {
            write!(f, " (warning: log reset signal not delivered)")?;
        }
        if self.signal_misses > 0 {
            write!(f, " ({} already gone)", self.signal_misses)?;
        }
        if self.survivors > 0 {
            write!(f, " (warning: {} still alive after kill)", self.survivors)?;
        }
        Ok(())
    }
}

/// Force-restart the named service using the live process table.
pub fn force_restart(service_name: &str) -> RestartOutcome {
    let matcher = ServiceMatcher::for_service(service_name);
    force_restart_with(
        &mut SystemTable::new(),
        &mut UnixSignals,
        &matcher,
        &RestartTiming::default(),
    )
}

/// Force-restart against explicit table, signal, and timing seams.
pub fn force_restart_with(
    table: &mut dyn ProcessTable,
    signals: &mut dyn SignalPort,
    matcher: &ServiceMatcher,
    timing: &RestartTiming,
) -> RestartOutcome {
    let mut outcome = RestartOutcome::default();
    let found = discover(table, matcher);

    // Log reset first: advisory, not required for correctness. The rotator
    // is still part of the victim set below.
    if let Some(ref rotator) = found.rotator {
        outcome.rotator_found = true;
        match signals.reset(rotator.pid) {
            Ok(()) => {
                outcome.rotator_reset = true;
                info!(pid = rotator.pid, "log rotator segment reset");
            }
            Err(e) => warn!(pid = rotator.pid, errno = %e, "log reset not delivered"),
        }
    } else {
        warn!("log rotator not found");
    }

    outcome.victims_found = found.victims.len();
    if found.victims.is_empty() {
        info!("no service processes found; nothing to terminate");
        return outcome;
    }

    // One batch, per-pid failures swallowed: a process that exited between
    // discovery and delivery is a success, not an error.
    for victim in &found.victims {
        match signals.kill(victim.pid) {
            Ok(()) => {
                outcome.killed += 1;
                info!(pid = victim.pid, cmdline = %victim.cmdline, "killed");
            }
            Err(Errno::ESRCH) => {
                outcome.signal_misses += 1;
            }
            Err(e) => {
                outcome.signal_misses += 1;
                warn!(pid = victim.pid, errno = %e, "kill not delivered");
            }
        }
    }

    // Let the OS reap the set, then confirm nothing from the previous set
    // is still reachable through the process table.
    thread::sleep(timing.reap_wait);
    outcome.survivors = discover(table, matcher).victims.len();
    if outcome.survivors > 0 {
        warn!(count = outcome.survivors, "processes survived the kill batch");
    }

    // Give the supervisor time to notice the worker's disappearance and
    // respawn it before reporting completion.
    thread::sleep(timing.respawn_wait);

    outcome
}
