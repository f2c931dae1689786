//! Snapshot archive composition (spec §4.6 "Snapshot archive format"):
//! `snapshot-metadata.json` plus one `volumes/<name>.tar` per exported
//! volume, the whole thing gzip-compressed into a single object.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::model::snapshot::SnapshotManifest;

/// Build a `.tar.gz` in memory from the manifest plus one already-tarred
/// volume archive per entry in `volume_tars` (path on the local filesystem
/// produced by the helper-container export step).
pub fn build_archive(manifest: &SnapshotManifest, volume_tars: &BTreeMap<String, &Path>) -> CoreResult<Vec<u8>> {
    manifest.validate()?;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let metadata_json = serde_json::to_vec_pretty(manifest).map_err(|e| CoreError::Other(e.into()))?;
    let mut header = tar::Header::new_gnu();
    header.set_size(metadata_json.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "snapshot-metadata.json", metadata_json.as_slice())
        .map_err(|e| CoreError::Other(e.into()))?;

    for volume in &manifest.volumes {
        let local_path = volume_tars
            .get(volume)
            .ok_or_else(|| CoreError::Invariant(format!("manifest lists volume {volume:?} with no tar to archive")))?;
        builder
            .append_path_with_name(local_path, SnapshotManifest::volume_tar_path(volume))
            .map_err(|e| CoreError::Other(e.into()))?;
    }

    let encoder = builder.into_inner().map_err(|e| CoreError::Other(e.into()))?;
    encoder.finish().map_err(|e| CoreError::Other(e.into()))
}

/// The inverse of [`build_archive`]: parse the manifest and extract each
/// volume's tar to `out_dir/<name>.tar`, returning the validated manifest.
pub fn unpack_archive(bytes: &[u8], out_dir: &Path) -> CoreResult<SnapshotManifest> {
    let decoder = GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    let mut manifest: Option<SnapshotManifest> = None;

    for entry in archive.entries().map_err(|e| CoreError::Other(e.into()))? {
        let mut entry = entry.map_err(|e| CoreError::Other(e.into()))?;
        let path = entry.path().map_err(|e| CoreError::Other(e.into()))?.into_owned();
        let path_str = path.to_string_lossy().to_string();

        if path_str == "snapshot-metadata.json" {
            let mut contents = String::new();
            entry.read_to_string(&mut contents).map_err(|e| CoreError::Other(e.into()))?;
            let parsed: SnapshotManifest = serde_json::from_str(&contents).map_err(|e| CoreError::Other(e.into()))?;
            parsed.validate()?;
            manifest = Some(parsed);
        } else if let Some(name) = path_str.strip_prefix("volumes/").and_then(|s| s.strip_suffix(".tar")) {
            let dest = out_dir.join(format!("{name}.tar"));
            entry.unpack(&dest).map_err(|e| CoreError::Other(e.into()))?;
        }
    }

    manifest.ok_or_else(|| CoreError::Invariant("archive is missing snapshot-metadata.json".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::{PodId, SnapshotId};
    use std::io::Write;

    fn write_volume_tar(dir: &Path, name: &str, file_contents: &[u8]) -> std::path::PathBuf {
        let tar_path = dir.join(format!("{name}-src.tar"));
        let file = std::fs::File::create(&tar_path).unwrap();
        let mut builder = tar::Builder::new(file);
        let mut header = tar::Header::new_gnu();
        header.set_size(file_contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "file.txt", file_contents).unwrap();
        builder.into_inner().unwrap().flush().unwrap();
        tar_path
    }

    #[test]
    fn round_trips_manifest_and_volumes() {
        let dir = tempfile::tempdir().unwrap();
        let workspace_tar = write_volume_tar(dir.path(), "workspace", b"hello");
        let home_tar = write_volume_tar(dir.path(), "home", b"world");

        let manifest = SnapshotManifest::new(
            SnapshotId::new(),
            PodId::new(),
            vec!["workspace".to_string(), "home".to_string()],
        );
        let mut tars = BTreeMap::new();
        tars.insert("workspace".to_string(), workspace_tar.as_path());
        tars.insert("home".to_string(), home_tar.as_path());

        let archive_bytes = build_archive(&manifest, &tars).unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        let parsed = unpack_archive(&archive_bytes, out_dir.path()).unwrap();
        assert_eq!(parsed.pod_id, manifest.pod_id);
        assert_eq!(parsed.volumes, manifest.volumes);
        assert!(out_dir.path().join("workspace.tar").exists());
        assert!(out_dir.path().join("home.tar").exists());
    }

    #[test]
    fn refuses_to_build_when_a_listed_volume_has_no_tar() {
        let manifest = SnapshotManifest::new(SnapshotId::new(), PodId::new(), vec!["workspace".to_string()]);
        let tars = BTreeMap::new();
        assert!(build_archive(&manifest, &tars).is_err());
    }
}
