//! `snapshot-restore`: host-local counterpart to `snapshot-create` (spec
//! §6). Downloads the archive, unpacks it, and imports each volume tar back
//! into the pod's (already-provisioned, stopped) docker volumes.

use std::process::Command;

use clap::Parser;
use futures_util::TryStreamExt;
use serde_json::json;

use pinacle_core::config::S3StorageConfig;
use pinacle_core::model::pod::volume_name;
use pinacle_core::model::PodId;
use pinacle_core::snapshot::{archive, FilesystemStorage, S3Storage, StorageProvider};

const HELPER_IMAGE: &str = "pinacle/volume-helper:latest";

#[derive(Parser)]
struct Cli {
    #[arg(long)]
    pod_id: PodId,
    #[arg(long)]
    storage_path: String,
    #[arg(long, value_enum)]
    storage_type: StorageType,
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

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => {
            println!("{}", json!({ "success": true }));
            std::process::exit(0);
        }
        Err(err) => {
            println!("{}", json!({ "success": false, "error": err.to_string() }));
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let storage: Box<dyn StorageProvider> = match cli.storage_type {
        StorageType::Filesystem => Box::new(FilesystemStorage::new(cli.storage_path.clone())),
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

    let stream = storage.download(&cli.storage_path).await?;
    let chunks: Vec<bytes::Bytes> = stream.try_collect().await.map_err(|e| anyhow::anyhow!("downloading archive: {e}"))?;
    let bytes: Vec<u8> = chunks.into_iter().flatten().collect();

    let scratch = tempfile::tempdir()?;
    let manifest = archive::unpack_archive(&bytes, scratch.path())?;

    for volume in &manifest.volumes {
        let vol_name = volume_name(&cli.pod_id, volume);
        import_volume(&vol_name, volume, scratch.path())?;
    }

    Ok(())
}

fn import_volume(volume_name: &str, short_name: &str, scratch: &std::path::Path) -> anyhow::Result<()> {
    let scratch_dir = scratch.display().to_string();
    let status = Command::new("docker")
        .args([
            "run",
            "--rm",
            "--network",
            "none",
            "-v",
            &format!("{volume_name}:/dest"),
            "-v",
            &format!("{scratch_dir}:/input:ro"),
            HELPER_IMAGE,
            "sh",
            "-c",
            &format!("rm -rf /dest/* /dest/.[!.]* 2>/dev/null; tar xf /input/{short_name}.tar -C /dest"),
        ])
        .status()?;
    if !status.success() {
        anyhow::bail!("tar import into volume {volume_name} failed");
    }
    Ok(())
}
