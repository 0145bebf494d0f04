use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::info;

/// Pretty-printed JSON log, parent directories created as needed
pub fn write_json_log<T: Serialize>(path: &Path, value: &T) -> Result<(), crate::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    info!("Wrote log: {:?}", path);
    Ok(())
}

/// Provenance tags embedded into every GeoTIFF the pipeline writes
pub fn provenance_items(stage: &str, subject: &str, sources: &[&Path]) -> Vec<(&'static str, String)> {
    let mut items = vec![
        ("PROCESSING_STAGE", stage.to_string()),
        ("PROCESSING_SUBJECT", subject.to_string()),
        ("CONVERSION_TOOL", env!("CARGO_PKG_NAME").to_string()),
        ("CONVERSION_VERSION", env!("CARGO_PKG_VERSION").to_string()),
        ("CONVERSION_TIMESTAMP", chrono::Utc::now().to_rfc3339()),
    ];
    if !sources.is_empty() {
        let names: Vec<String> = sources
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        items.push(("SOURCE_FILES", names.join(",")));
    }
    items
}
