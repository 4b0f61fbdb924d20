//! Read/write the trained model file.
//!
//! The file keeps its conventional name (`models/xgboost_model.pkl`) but holds
//! JSON: a small envelope with metadata around the serialized ensemble.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::Paths;
use crate::error::AppError;
use crate::models::BoostedTrees;

const TOOL: &str = "load-forecast";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub tool: String,
    pub created_at: NaiveDateTime,
    pub model: BoostedTrees,
}

/// Write `model` to `paths.model_file()`, replacing any previous file.
pub fn save_model(model: &BoostedTrees, paths: &Paths) -> Result<PathBuf, AppError> {
    let path = paths.model_file();
    write_model(model, &path)?;
    Ok(path)
}

pub fn write_model(model: &BoostedTrees, path: &Path) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create model file '{}': {e}", path.display())))?;
    let envelope = ModelFile {
        tool: TOOL.to_string(),
        created_at: Utc::now().naive_utc(),
        model: model.clone(),
    };
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &envelope)
        .map_err(|e| AppError::input(format!("Failed to write model file: {e}")))?;
    // Buffered bytes only reach the file here; a failed flush is a failed save.
    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to write model file '{}': {e}", path.display())))?;
    info!(path = %path.display(), "Model saved");
    Ok(())
}

/// Read a model file written by [`save_model`].
pub fn load_model(path: &Path) -> Result<BoostedTrees, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open model file '{}': {e}", path.display())))?;
    let envelope: ModelFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::input(format!("Invalid model file '{}': {e}", path.display())))?;
    Ok(envelope.model)
}
