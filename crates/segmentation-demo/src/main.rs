//! Segmentation Demo - Main Entry Point

use segmentation_demo::{init_logging, run_demo, DemoSettings};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = DemoSettings::load(settings_path.as_deref())?;
    init_logging(&settings.log_level)?;

    info!("=== Segmentation Demo v{} ===", env!("CARGO_PKG_VERSION"));

    let written = run_demo(&settings).await?;
    info!("Wrote {} masks to {}", written, settings.output_dir.display());

    Ok(())
}
