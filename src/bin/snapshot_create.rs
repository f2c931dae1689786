//! `snapshot-create`: host-local CLI invoked by the control plane over the
//! host connection (spec §6 "CLI contract"). Tars each canonical volume
//! with a throwaway helper container, composes the archive, uploads it,
//! and prints one final JSON line with the result.

use std::path::PathBuf;
use std::process::Command;

use clap::Parser;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::json;

use pinacle_core::config::S3StorageConfig;
use pinacle_core::model::pod::{volume_name, CANONICAL_VOLUMES};
use pinacle_core::model::{PodId, SnapshotId, SnapshotManifest};
use pinacle_core::snapshot::{archive, FilesystemStorage, S3Storage, StorageProvider};

const HELPER_IMAGE: &str = "pinacle/volume-helper:latest";

#[derive(Parser)]
struct Cli {
    #[arg(long)]
    container_id: String,
    #[arg(long)]
    pod_id: PodId,
    #[arg(long)]
    snapshot_id: SnapshotId,
    #[arg(long, value_enum)]
    storage_type: StorageType,
    #[arg(long)]
    storage_path: Option<String>,
    #[arg(long)]
    s3_endpoint: Option<String>,
    #[arg(long)]
    s3_bucket: Option<String>,
    #[arg(long, default_value = "us-east-1")]
    s3_region: String,
    #[arg(long)]
    s3_access_key: Option<String>,
    #[arg(long)]
    s3_secret_key: Option<String>,
}

#[derive(Clone, clap::ValueEnum)]
enum StorageType {
    S3,
    Filesystem,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SuccessOutput {
    success: bool,
    storage_path: String,
    size_bytes: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(output) => {
            println!("{}", serde_json::to_string(&output).unwrap());
            std::process::exit(0);
        }
        Err(err) => {
            println!("{}", json!({ "success": false, "error": err.to_string() }));
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<SuccessOutput> {
    ensure_container_exists(&cli.container_id)?;

    let scratch = tempfile::tempdir()?;
    let mut volumes = Vec::new();

    for volume in CANONICAL_VOLUMES {
        let vol_name = volume_name(&cli.pod_id, volume);
        if !docker_volume_exists(&vol_name)? {
            continue;
        }
        export_volume(&vol_name, volume, scratch.path())?;
        volumes.push(volume.to_string());
    }

    let manifest = SnapshotManifest::new(cli.snapshot_id, cli.pod_id, volumes.clone());
    manifest.validate()?;

    let tar_paths: Vec<(String, PathBuf)> = volumes.iter().map(|v| (v.clone(), scratch.path().join(format!("{v}.tar")))).collect();
    let volume_tars: std::collections::BTreeMap<String, &std::path::Path> =
        tar_paths.iter().map(|(name, path)| (name.clone(), path.as_path())).collect();

    let archive_bytes = archive::build_archive(&manifest, &volume_tars)?;
    let size_bytes = archive_bytes.len() as u64;

    let storage: Box<dyn StorageProvider> = match cli.storage_type {
        StorageType::Filesystem => {
            let path = cli.storage_path.ok_or_else(|| anyhow::anyhow!("--storage-path is required for filesystem storage"))?;
            Box::new(FilesystemStorage::new(path))
        }
        StorageType::S3 => {
            let config = S3StorageConfig {
                endpoint: cli.s3_endpoint,
                bucket: cli.s3_bucket.ok_or_else(|| anyhow::anyhow!("--s3-bucket is required"))?,
                region: cli.s3_region,
                access_key: cli.s3_access_key.ok_or_else(|| anyhow::anyhow!("--s3-access-key is required"))?,
                secret_key: cli.s3_secret_key.ok_or_else(|| anyhow::anyhow!("--s3-secret-key is required"))?,
            };
            Box::new(S3Storage::new(&config).await?)
        }
    };

    let key = format!("snapshots/{}.tar.gz", cli.snapshot_id);
    let body = futures_util::stream::once(async move { Ok::<_, std::io::Error>(bytes::Bytes::from(archive_bytes)) }).boxed();
    let storage_path = storage.upload(&key, body).await?;

    Ok(SuccessOutput { success: true, storage_path, size_bytes })
}

fn ensure_container_exists(container_id: &str) -> anyhow::Result<()> {
    let status = Command::new("docker").args(["inspect", container_id]).status()?;
    if !status.success() {
        anyhow::bail!("container {container_id} not found");
    }
    Ok(())
}

fn docker_volume_exists(volume: &str) -> anyhow::Result<bool> {
    Ok(Command::new("docker").args(["volume", "inspect", volume]).status()?.success())
}

fn export_volume(volume_name: &str, short_name: &str, scratch: &std::path::Path) -> anyhow::Result<()> {
    let output_dir = scratch.display().to_string();
    let status = Command::new("docker")
        .args([
            "run",
            "--rm",
            "--network",
            "none",
            "-v",
            &format!("{volume_name}:/source:ro"),
            "-v",
            &format!("{output_dir}:/output"),
            HELPER_IMAGE,
            "tar",
            "cf",
            &format!("/output/{short_name}.tar"),
            "-C",
            "/source",
            ".",
        ])
        .status()?;
    if !status.success() {
        anyhow::bail!("tar export of volume {volume_name} failed");
    }
    Ok(())
}
