//! End-to-end bundle flow: archive expansion through install and update.
//!
//! Covers the operator-visible guarantees:
//! 1. A first install leaves the service pending configuration with a
//!    sample-derived config, never a fabricated one.
//! 2. Installing a staged archive twice in a row (update-over-update)
//!    preserves the config the operator set between the runs, byte for
//!    byte.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use gpslink_common::archive::extract_bundle;
use gpslink_common::install::{install, is_pending_configuration, InstallKind};
use gpslink_common::paths::{CONFIG_FILE, CONFIG_SAMPLE};
use tempfile::TempDir;

const SAMPLE: &str = "source_ip=192.168.8.1\nsource_port=5555\n";

/// Build a registry-shaped tarball: one top-level directory with the
/// generated hash suffix registries append.
fn make_release_tarball(dest: &Path, version: &str) -> PathBuf {
    let top = format!("gpslink-gpslink-{version}0abc");
    let entries = [
        (format!("{top}/gpslinkctl"), format!("worker {version}")),
        (format!("{top}/{CONFIG_SAMPLE}"), SAMPLE.to_string()),
        (format!("{top}/service/run"), "#!/bin/sh\n".to_string()),
        (format!("{top}/service/log/run"), "#!/bin/sh\n".to_string()),
    ];

    let file = File::create(dest).unwrap();
    let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(gz);
    for (path, contents) in &entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
    dest.to_path_buf()
}

#[test]
fn first_install_stays_inactive_with_sample_config() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();

    let tarball = make_release_tarball(&work.join("v1.tar.gz"), "v1");
    let staging = extract_bundle(&tarball, &work).unwrap();

    let install_dir = tmp.path().join("data/gpslink");
    fs::create_dir_all(install_dir.parent().unwrap()).unwrap();
    let outcome = install(&staging, &install_dir).unwrap();

    assert_eq!(outcome.kind, InstallKind::FirstInstall);
    assert!(!outcome.needs_restart());
    assert!(is_pending_configuration(&install_dir));
    let config = fs::read_to_string(install_dir.join(CONFIG_FILE)).unwrap();
    assert_eq!(config, SAMPLE);
}

#[test]
fn update_over_update_preserves_operator_config() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();
    let install_dir = tmp.path().join("data/gpslink");
    fs::create_dir_all(install_dir.parent().unwrap()).unwrap();

    // First install, then the operator points the bridge at their router.
    let tarball = make_release_tarball(&work.join("v1.tar.gz"), "v1");
    let staging = extract_bundle(&tarball, &work).unwrap();
    install(&staging, &install_dir).unwrap();

    let operator_config = "source_ip=10.0.0.5\nsource_port=5555\n";
    fs::write(install_dir.join(CONFIG_FILE), operator_config).unwrap();

    // Two consecutive updates
    for version in ["v2", "v3"] {
        let tarball = make_release_tarball(&work.join(format!("{version}.tar.gz")), version);
        let staging = extract_bundle(&tarball, &work).unwrap();
        let outcome = install(&staging, &install_dir).unwrap();

        assert_eq!(outcome.kind, InstallKind::Updated);
        assert!(outcome.needs_restart());
        assert_eq!(
            fs::read_to_string(install_dir.join("gpslinkctl")).unwrap(),
            format!("worker {version}")
        );
        let config = fs::read(install_dir.join(CONFIG_FILE)).unwrap();
        assert_eq!(config, operator_config.as_bytes(), "config must survive {version}");
    }
}
