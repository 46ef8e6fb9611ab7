//! Bundle archive expansion.
//!
//! Registry tarballs extract to a single top-level directory carrying a
//! generated `owner-repo-<sha>` suffix. Expansion normalizes that to a
//! plain `gpslink` staging directory and refuses anything that does not
//! expand to exactly one plausible top-level directory.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::info;

use crate::error::{LifecycleError, Result};
use crate::paths::SERVICE_NAME;

/// Expand `tarball` under `work_dir` and return the normalized staging
/// directory (`work_dir/gpslink`). The live installation is never touched.
pub fn extract_bundle(tarball: &Path, work_dir: &Path) -> Result<PathBuf> {
    let unpack_dir = work_dir.join("unpack");
    if unpack_dir.exists() {
        fs::remove_dir_all(&unpack_dir)?;
    }
    fs::create_dir_all(&unpack_dir)?;

    let file = File::open(tarball)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive
        .unpack(&unpack_dir)
        .map_err(|e| LifecycleError::Extraction(format!("{}: {e}", tarball.display())))?;

    let top = single_top_level_dir(&unpack_dir)?;

    let staging = work_dir.join(SERVICE_NAME);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::rename(&top, &staging)?;
    fs::remove_dir_all(&unpack_dir)?;

    info!(staging = %staging.display(), "expanded release archive");
    Ok(staging)
}

/// The archive must expand to exactly one directory; stray regular files
/// (pax headers and the like) are tolerated.
fn single_top_level_dir(unpack_dir: &Path) -> Result<PathBuf> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(unpack_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }

    match dirs.len() {
        1 => Ok(dirs.remove(0)),
        0 => Err(LifecycleError::Extraction(
            "archive contained no top-level directory".to_string(),
        )),
        n => Err(LifecycleError::Extraction(format!(
            "archive contained {n} top-level directories, expected one"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Build a gzipped tarball holding the given (path, contents) entries.
    fn make_tarball(dest: &Path, entries: &[(&str, &str)]) {
        let file = File::create(dest).unwrap();
        let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(gz);
        for (path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_extract_normalizes_suffixed_dir() {
        let tmp = TempDir::new().unwrap();
        let tarball = tmp.path().join("bundle.tar.gz");
        make_tarball(
            &tarball,
            &[
                ("gpslink-gpslink-ab12cd3/config.sample", "source_ip=1.2.3.4\n"),
                ("gpslink-gpslink-ab12cd3/service/run", "#!/bin/sh\n"),
            ],
        );

        let staging = extract_bundle(&tarball, tmp.path()).unwrap();
        assert_eq!(staging.file_name().unwrap(), "gpslink");
        assert!(staging.join("config.sample").exists());
        assert!(staging.join("service/run").exists());
    }

    #[test]
    fn test_extract_rejects_flat_archive() {
        let tmp = TempDir::new().unwrap();
        let tarball = tmp.path().join("flat.tar.gz");
        make_tarball(&tarball, &[("loose-file", "contents")]);

        let err = extract_bundle(&tarball, tmp.path()).unwrap_err();
        assert!(matches!(err, LifecycleError::Extraction(_)));
    }

    #[test]
    fn test_extract_rejects_multiple_top_dirs() {
        let tmp = TempDir::new().unwrap();
        let tarball = tmp.path().join("twin.tar.gz");
        make_tarball(&tarball, &[("one/a", "x"), ("two/b", "y")]);

        let err = extract_bundle(&tarball, tmp.path()).unwrap_err();
        match err {
            LifecycleError::Extraction(msg) => assert!(msg.contains("2 top-level")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_extract_rejects_garbage_archive() {
        let tmp = TempDir::new().unwrap();
        let tarball = tmp.path().join("garbage.tar.gz");
        let mut f = File::create(&tarball).unwrap();
        f.write_all(b"this is not a tarball").unwrap();

        assert!(extract_bundle(&tarball, tmp.path()).is_err());
    }

    #[test]
    fn test_extract_replaces_stale_staging() {
        let tmp = TempDir::new().unwrap();
        let stale = tmp.path().join("gpslink");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("leftover"), "old").unwrap();

        let tarball = tmp.path().join("bundle.tar.gz");
        make_tarball(&tarball, &[("gpslink-gpslink-ff00aa1/config.sample", "fresh\n")]);

        let staging = extract_bundle(&tarball, tmp.path()).unwrap();
        assert!(!staging.join("leftover").exists());
        assert!(staging.join("config.sample").exists());
    }
}
