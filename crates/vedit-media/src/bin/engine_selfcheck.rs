//! Environment selfcheck for the extraction engine.
//!
//! Verifies the external tool pair and the comparison filters the
//! engine depends on, so deploys fail loudly instead of at the first
//! extraction request.

use std::path::Path;
use tracing_subscriber::EnvFilter;

use vedit_media::{check_ffmpeg, check_ffprobe, ffmpeg_has_filter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let work_dir =
        std::env::var("VEDIT_WORK_DIR").unwrap_or_else(|_| "/tmp/vedit".to_string());
    println!("engine-selfcheck: starting with work_dir={}", work_dir);
    ensure_workdir(&work_dir).await?;

    let ffmpeg = check_ffmpeg()?;
    let ffprobe = check_ffprobe()?;
    println!(
        "engine-selfcheck: ffmpeg={} ffprobe={}",
        ffmpeg.display(),
        ffprobe.display()
    );
    ensure_ffmpeg_runs().await?;

    // The quality reporter needs these filters in the local build
    for filter in ["ssim", "psnr"] {
        if !ffmpeg_has_filter(filter).await? {
            anyhow::bail!("ffmpeg build is missing the required '{}' filter", filter);
        }
    }
    if ffmpeg_has_filter("libvmaf").await? {
        println!("engine-selfcheck: libvmaf available, VMAF scoring enabled");
    } else {
        println!("engine-selfcheck: libvmaf not available, VMAF scoring disabled");
    }

    println!("engine-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path.as_ref()).await?;
    Ok(())
}

async fn ensure_ffmpeg_runs() -> anyhow::Result<()> {
    let output = tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("ffmpeg not runnable: {}", e))?;

    if !output.status.success() {
        anyhow::bail!("ffmpeg -version failed: {:?}", output.status);
    }
    Ok(())
}
