//! Kaggle dataset download for the PJM East hourly load file.

use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::domain::{DATASET_FILE, DATASET_KEY, Paths};
use crate::error::AppError;

const BASE_URL: &str = "https://www.kaggle.com/api/v1/datasets/download";

/// Local zip magic (`PK\x03\x04`).
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

pub struct KaggleClient {
    client: Client,
    username: String,
    key: String,
    base_url: String,
}

impl KaggleClient {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let username = std::env::var("KAGGLE_USERNAME")
            .map_err(|_| AppError::input("Missing KAGGLE_USERNAME in environment (.env)."))?;
        let key = std::env::var("KAGGLE_KEY")
            .map_err(|_| AppError::input("Missing KAGGLE_KEY in environment (.env)."))?;
        let base_url = std::env::var("KAGGLE_API_URL").unwrap_or_else(|_| BASE_URL.to_string());
        Ok(Self {
            client: Client::new(),
            username,
            key,
            base_url,
        })
    }

    /// Download one file of a dataset and return its bytes.
    pub fn download_file(&self, dataset: &str, file: &str) -> Result<Vec<u8>, AppError> {
        let url = format!("{}/{dataset}/{file}", self.base_url.trim_end_matches('/'));
        info!(%url, "downloading dataset file");
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.key))
            .send()
            .map_err(|e| AppError::external(format!("Kaggle request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::external(format!(
                "Kaggle request for '{dataset}/{file}' failed with status {}.",
                resp.status()
            )));
        }

        let body = resp
            .bytes()
            .map_err(|e| AppError::external(format!("Failed to read Kaggle response: {e}")))?;
        Ok(body.to_vec())
    }
}

/// Path to the cached raw CSV, downloading it first when it is not there yet.
///
/// Credentials are only needed on a cache miss.
pub fn fetch_dataset(paths: &Paths) -> Result<PathBuf, AppError> {
    let target = paths.raw_csv();
    if target.is_file() {
        info!(path = %target.display(), "using cached dataset");
        return Ok(target);
    }
    let client = KaggleClient::from_env()?;
    let bytes = client.download_file(DATASET_KEY, DATASET_FILE)?;
    write_payload(&bytes, &target)?;
    info!(path = %target.display(), bytes = bytes.len(), "dataset downloaded");
    Ok(target)
}

/// Store a downloaded payload at `target`.
///
/// Kaggle serves larger files zipped; the dataset file is then extracted from
/// the archive. The file only appears at `target` once it is complete.
fn write_payload(bytes: &[u8], target: &Path) -> Result<(), AppError> {
    if bytes.is_empty() {
        return Err(AppError::external("Kaggle returned an empty file."));
    }
    let partial = target.with_extension("part");
    let written = if bytes.starts_with(ZIP_MAGIC) {
        extract_dataset_file(bytes, &partial)
    } else {
        fs::write(&partial, bytes)
            .map_err(|e| AppError::input(format!("Failed to write '{}': {e}", partial.display())))
    };
    if let Err(e) = written {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }
    fs::rename(&partial, target)
        .map_err(|e| AppError::input(format!("Failed to move download to '{}': {e}", target.display())))
}

fn extract_dataset_file(bytes: &[u8], dest: &Path) -> Result<(), AppError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AppError::external(format!("Kaggle returned an unreadable zip archive: {e}")))?;
    let name = archive
        .file_names()
        .find(|name| Path::new(name).file_name().is_some_and(|f| f == DATASET_FILE))
        .map(str::to_string)
        .ok_or_else(|| AppError::external(format!("Downloaded archive does not contain {DATASET_FILE}.")))?;
    debug!(entry = %name, "extracting dataset file from archive");

    let mut entry = archive
        .by_name(&name)
        .map_err(|e| AppError::external(format!("Failed to read '{name}' from archive: {e}")))?;
    let mut out = File::create(dest)
        .map_err(|e| AppError::input(format!("Failed to create '{}': {e}", dest.display())))?;
    io::copy(&mut entry, &mut out)
        .map_err(|e| AppError::external(format!("Failed to extract '{name}': {e}")))?;
    out.sync_all()
        .map_err(|e| AppError::input(format!("Failed to write '{}': {e}", dest.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_file_skips_the_download() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        paths.ensure_dirs().unwrap();
        fs::write(paths.raw_csv(), "Datetime,PJME_MW\n2002-01-01 01:00:00,30393.0\n").unwrap();
        assert_eq!(fetch_dataset(&paths).unwrap(), paths.raw_csv());
    }

    fn zipped(entries: &[(&str, &[u8])]) -> Vec<u8> {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, body) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn plain_payload_is_written_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(DATASET_FILE);
        write_payload(b"Datetime,PJME_MW\n", &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"Datetime,PJME_MW\n");

        let err = write_payload(b"", &target).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn zipped_payload_is_extracted() {
        let csv: &[u8] = b"Datetime,PJME_MW\n2002-01-01 01:00:00,30393.0\n";
        let archive = zipped(&[("README.txt", &b"hourly load"[..]), (DATASET_FILE, csv)]);
        assert!(archive.starts_with(ZIP_MAGIC));

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(DATASET_FILE);
        write_payload(&archive, &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), csv);
        assert!(!target.with_extension("part").exists());
    }

    #[test]
    fn archive_without_the_dataset_leaves_no_file() {
        let archive = zipped(&[("other.csv", &b"a,b\n"[..])]);
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(DATASET_FILE);
        let err = write_payload(&archive, &target).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(!target.exists());
        assert!(!target.with_extension("part").exists());
    }
}
