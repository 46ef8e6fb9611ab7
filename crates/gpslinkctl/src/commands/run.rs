//! Supervised entry point: the foreground bridge manager.
//!
//! The supervisor execs this via the service run script, so this process
//! IS the worker in the process table. It owns two children: the socat
//! bridge that tunnels the TCP GPS stream onto a virtual serial device,
//! and the downstream publisher that puts readings on the message bus.
//! A watchdog restarts both children when either dies or when the
//! published fix goes stale. Exiting at all means "restart me" to the
//! supervisor; this function never returns success.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use gpslink_common::paths::CONFIG_FILE;
use gpslink_common::BridgeConfig;
use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{interval, sleep, timeout};
use tracing::{error, info, warn};

const SOCAT_PATH: &str = "/usr/bin/socat";

/// Pause after launching socat so the tty link exists before the
/// publisher opens it.
const TTY_SETTLE: Duration = Duration::from_secs(2);

/// Grace period between TERM and KILL when stopping a child.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Bus address the publisher exposes its last-update age on.
const BUS_SERVICE: &str = "com.victronenergy.gps";
const BUS_PATH_LAST_UPDATE: &str = "/TimeSinceLastUpdate";

pub async fn run(install_dir: &Path) -> Result<()> {
    merge_stderr_into_stdout()?;

    let config_path = install_dir.join(CONFIG_FILE);
    let config = BridgeConfig::load(&config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    info!(
        source = %format!("{}:{}", config.source_ip, config.source_port),
        tty = %config.tty_device,
        "bridge manager starting"
    );

    ensure_socat().await?;

    let mut manager = BridgeManager::new(config.clone());
    manager.start_children().await?;

    let mut ticks = interval(Duration::from_secs(config.check_interval_secs.max(1)));
    ticks.tick().await; // first tick fires immediately
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                manager.watchdog_tick().await;
            }
            _ = sigterm.recv() => {
                info!("received TERM, stopping children");
                break;
            }
            _ = sigint.recv() => {
                info!("received INT, stopping children");
                break;
            }
        }
    }

    manager.stop_children().await;
    // Any exit tells the supervisor to restart the service; a clean zero
    // would be read the same way, so make the intent explicit.
    bail!("bridge manager stopped")
}

/// One pipe must carry all logging for multilog to capture.
fn merge_stderr_into_stdout() -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::fd::AsRawFd;
        let stdout_fd = std::io::stdout().as_raw_fd();
        let stderr_fd = std::io::stderr().as_raw_fd();
        nix::unistd::dup2(stdout_fd, stderr_fd).map_err(|e| anyhow!("dup2 failed: {e}"))?;
    }
    Ok(())
}

/// socat ships on some gateway images but not all; install it through the
/// image's package manager when missing.
async fn ensure_socat() -> Result<()> {
    if Path::new(SOCAT_PATH).exists() {
        return Ok(());
    }
    warn!("socat not found, attempting installation via opkg");
    for args in [vec!["update"], vec!["install", "socat"]] {
        let status = Command::new("opkg")
            .args(&args)
            .status()
            .await
            .context("opkg not available")?;
        if !status.success() {
            bail!("opkg {} failed with {status}", args.join(" "));
        }
    }
    info!("socat installed");
    Ok(())
}

struct BridgeManager {
    config: BridgeConfig,
    bridge: Option<Child>,
    publisher: Option<Child>,
}

impl BridgeManager {
    fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            bridge: None,
            publisher: None,
        }
    }

    async fn start_children(&mut self) -> Result<()> {
        self.stop_children().await;

        let socat_args = self.config.socat_args();
        info!(args = %socat_args.join(" "), "starting bridge child");
        let bridge = Command::new(SOCAT_PATH)
            .args(&socat_args)
            .spawn()
            .context("launching socat")?;
        self.bridge = Some(bridge);

        sleep(TTY_SETTLE).await;

        let publisher_args = self.config.publisher_args();
        info!(
            publisher = %self.config.publisher,
            args = %publisher_args.join(" "),
            "starting publisher child"
        );
        match Command::new(&self.config.publisher)
            .args(&publisher_args)
            .spawn()
        {
            Ok(child) => self.publisher = Some(child),
            Err(e) => {
                self.stop_children().await;
                return Err(e).context("launching publisher");
            }
        }

        info!(
            bridge_pid = self.bridge.as_ref().and_then(|c| c.id()),
            publisher_pid = self.publisher.as_ref().and_then(|c| c.id()),
            "children running"
        );
        Ok(())
    }

    async fn stop_children(&mut self) {
        for child in [self.publisher.take(), self.bridge.take()]
            .into_iter()
            .flatten()
        {
            stop_child(child).await;
        }
    }

    /// Liveness first, then data freshness. Either failure restarts both
    /// children; the restart order recreates the tty link before the
    /// publisher reopens it.
    async fn watchdog_tick(&mut self) {
        if child_died(&mut self.bridge) {
            error!("bridge child died unexpectedly, restarting services");
            self.restart_children().await;
            return;
        }
        if child_died(&mut self.publisher) {
            error!("publisher child died unexpectedly, restarting services");
            self.restart_children().await;
            return;
        }

        match read_idle_seconds().await {
            Some(idle) => {
                info!(idle_secs = idle, "time since last fix");
                if idle > self.config.max_idle_secs as f64 {
                    error!(idle_secs = idle, "GPS data stale, restarting services");
                    self.restart_children().await;
                }
            }
            None => {
                warn!("could not read last-update age from the bus; may be transient");
            }
        }
    }

    async fn restart_children(&mut self) {
        self.stop_children().await;
        if let Err(e) = self.start_children().await {
            error!(error = %e, "child restart failed; next tick retries");
        }
    }
}

fn child_died(slot: &mut Option<Child>) -> bool {
    match slot {
        None => true,
        Some(child) => matches!(child.try_wait(), Ok(Some(_)) | Err(_)),
    }
}

/// TERM, a grace period, then KILL.
async fn stop_child(mut child: Child) {
    let Some(pid) = child.id() else {
        return;
    };
    info!(pid, "stopping child");

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }

    if timeout(STOP_GRACE, child.wait()).await.is_err() {
        warn!(pid, "child did not stop gracefully, killing");
        let _ = child.kill().await;
    }
}

/// Ask the bus how long ago the publisher saw a fix. Returns None when the
/// value cannot be read; the caller treats that as transient.
async fn read_idle_seconds() -> Option<f64> {
    let output = timeout(
        Duration::from_secs(5),
        Command::new("dbus-send")
            .args([
                "--system",
                "--print-reply",
                "--type=method_call",
                &format!("--dest={BUS_SERVICE}"),
                BUS_PATH_LAST_UPDATE,
                "org.freedesktop.DBus.Properties.Get",
                "string:com.victronenergy.BusItem",
                "string:Value",
            ])
            .output(),
    )
    .await
    .ok()?
    .ok()?;

    if !output.status.success() {
        return None;
    }
    parse_idle_reply(&String::from_utf8_lossy(&output.stdout))
}

/// The reply carries `... double <seconds>`.
fn parse_idle_reply(reply: &str) -> Option<f64> {
    let mut words = reply.split_whitespace();
    while let Some(word) = words.next() {
        if word == "double" {
            return words.next()?.parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_idle_reply_extracts_seconds() {
        let reply = "method return time=17.2 sender=:1.14\n   variant       double 42.5\n";
        assert_eq!(parse_idle_reply(reply), Some(42.5));
    }

    #[test]
    fn test_parse_idle_reply_rejects_other_shapes() {
        assert_eq!(parse_idle_reply(""), None);
        assert_eq!(parse_idle_reply("variant int32 7"), None);
        assert_eq!(parse_idle_reply("double"), None);
        assert_eq!(parse_idle_reply("double nan-ish garbage"), None);
    }
}
