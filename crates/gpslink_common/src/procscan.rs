//! Service-owned process discovery.
//!
//! There is no persisted process-group identifier: the bridge and publisher
//! children are spawned by the worker, not by the supervisor, so membership
//! is recomputed on every restart by matching live command lines. The
//! matching rules live in one place, are deterministic, and always exclude
//! the controller's own process.

use std::collections::BTreeMap;

use sysinfo::System;

/// One row of the process-table query interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: i32,
    pub cmdline: String,
}

/// Live process-table snapshot. A trait seam so discovery rules can be
/// exercised against canned tables in tests.
pub trait ProcessTable {
    fn snapshot(&mut self) -> Vec<ProcessRecord>;
}

/// Production table backed by sysinfo.
pub struct SystemTable {
    sys: System,
}

impl SystemTable {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for SystemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemTable {
    fn snapshot(&mut self) -> Vec<ProcessRecord> {
        self.sys.refresh_processes();
        self.sys
            .processes()
            .iter()
            .map(|(pid, process)| ProcessRecord {
                pid: pid.as_u32() as i32,
                cmdline: process.cmd().join(" "),
            })
            .collect()
    }
}

/// Deterministic command-line matching rules for one service instance.
#[derive(Debug, Clone)]
pub struct ServiceMatcher {
    service_name: String,
    bridge_signature: String,
    publisher_signature: String,
    self_pid: i32,
}

impl ServiceMatcher {
    pub fn new(
        service_name: impl Into<String>,
        bridge_signature: impl Into<String>,
        publisher_signature: impl Into<String>,
        self_pid: i32,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            bridge_signature: bridge_signature.into(),
            publisher_signature: publisher_signature.into(),
            self_pid,
        }
    }

    /// Matcher for the running controller process.
    pub fn for_service(service_name: &str) -> Self {
        Self::new(
            service_name,
            crate::config::VLINK_SIGNATURE,
            "gps_dbus",
            std::process::id() as i32,
        )
    }

    /// The log rotator serving this service's log directory.
    pub fn is_log_rotator(&self, record: &ProcessRecord) -> bool {
        record.cmdline.contains("multilog") && record.cmdline.contains(&self.service_name)
    }

    /// Controller invocations other than the supervised `run` entry point
    /// (a concurrent `gpslinkctl status`, the restart invocation itself)
    /// must never be counted as victims.
    fn is_controller_query(&self, record: &ProcessRecord) -> bool {
        let Some(idx) = record.cmdline.find("gpslinkctl") else {
            return false;
        };
        let rest = &record.cmdline[idx + "gpslinkctl".len()..];
        !rest
            .split_whitespace()
            .next()
            .is_some_and(|arg| arg == "run")
    }

    /// Union of the three discovery patterns: the service name (worker and
    /// supervisor wrapper, rotator included), the virtual-serial-link
    /// signature of the bridge child, and the publisher signature.
    pub fn is_service_member(&self, record: &ProcessRecord) -> bool {
        if record.pid == self.self_pid {
            return false;
        }
        if record.cmdline.contains("gpslinkctl") && self.is_controller_query(record) {
            return false;
        }
        record.cmdline.contains(&self.service_name)
            || record.cmdline.contains(&self.bridge_signature)
            || record.cmdline.contains(&self.publisher_signature)
    }
}

/// Result of one discovery pass over the process table.
#[derive(Debug, Default)]
pub struct Discovery {
    /// The log rotator, if one is running. Reset target, also a victim.
    pub rotator: Option<ProcessRecord>,
    /// Every process belonging to the service, deduplicated by pid.
    pub victims: Vec<ProcessRecord>,
}

/// Enumerate the service-owned process set right now.
pub fn discover(table: &mut dyn ProcessTable, matcher: &ServiceMatcher) -> Discovery {
    let mut rotator = None;
    let mut victims: BTreeMap<i32, ProcessRecord> = BTreeMap::new();

    for record in table.snapshot() {
        if rotator.is_none() && matcher.is_log_rotator(&record) {
            rotator = Some(record.clone());
        }
        if matcher.is_service_member(&record) {
            victims.insert(record.pid, record);
        }
    }

    Discovery {
        rotator,
        victims: victims.into_values().collect(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// In-memory table for discovery tests.
    pub struct FakeTable {
        pub rows: Vec<ProcessRecord>,
    }

    impl ProcessTable for FakeTable {
        fn snapshot(&mut self) -> Vec<ProcessRecord> {
            self.rows.clone()
        }
    }

    pub fn record(pid: i32, cmdline: &str) -> ProcessRecord {
        ProcessRecord {
            pid,
            cmdline: cmdline.to_string(),
        }
    }
}
