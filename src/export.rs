use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::blend::FeatureRow;
use crate::error::{Component, FeatureError};
use crate::store::GameStore;

/// Writes feature rows as CSV with a header, in the order given.
pub fn write_feature_csv<W: Write>(rows: &[FeatureRow], writer: W) -> Result<(), FeatureError> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Exports the stored feature rows of `seasons` to `path`, ordered by season,
/// kickoff time and game id. The file is replaced only once fully written.
pub fn export_training_set<S: GameStore + ?Sized>(
    store: &S,
    seasons: &[i32],
    path: &Path,
) -> Result<usize, FeatureError> {
    let season = seasons.iter().copied().min().unwrap_or_default();
    let rows = store
        .fetch_feature_rows(seasons)
        .map_err(FeatureError::store(season, Component::Export))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    let file = File::create(&tmp)?;
    write_feature_csv(&rows, file)?;
    std::fs::rename(&tmp, path)?;

    info!(path = %path.display(), rows = rows.len(), ?seasons, "exported training set");
    Ok(rows.len())
}
