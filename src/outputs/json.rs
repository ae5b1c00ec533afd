//! JSON output for query results.
//!
//! Files land in `{json_output_dir}/{local date}/{name}.json`. A second run on
//! the same day overwrites the earlier file of the same name.

use crate::utils::today_stamp;
use serde::Serialize;
use std::error::Error;
use std::fs as stdfs;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Check up front that `path` can be created and written to.
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = Path::new(path).join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!(%path, "Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Serialize `value` to `{json_output_dir}/{today}/{name}.json` and return the
/// path written.
#[instrument(level = "info", skip(value), fields(json_output_dir = %json_output_dir))]
pub async fn write_value<T: Serialize>(
    value: &T,
    json_output_dir: &str,
    name: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(value)?;

    let day_dir = Path::new(json_output_dir).join(today_stamp());
    if let Err(e) = fs::create_dir_all(&day_dir).await {
        error!(dir = %day_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = day_dir.join(format!("{name}.json"));
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote JSON file");
    Ok(path)
}
