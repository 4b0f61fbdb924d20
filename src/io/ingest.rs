//! CSV ingest and hourly normalization.
//!
//! Turns the raw `Datetime,PJME_MW` export into a strictly hourly series:
//!
//! 1. rows sharing an identical timestamp are averaged
//! 2. readings are binned to the hour (bin mean) over the full observed range
//! 3. empty hours carry the last defined value forward
//!
//! Any malformed timestamp or value aborts the load; there is no row-level
//! recovery here.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

use chrono::{NaiveDateTime, Timelike};
use csv::StringRecord;
use tracing::{debug, info};

use crate::domain::{HourlySeries, RawRecord, TARGET, TIMESTAMP_COLUMN};
use crate::error::AppError;

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Counters describing what cleaning did to the raw rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub rows_read: usize,
    /// Distinct timestamps that appeared more than once.
    pub duplicate_timestamps: usize,
    /// Hours in the resampled range.
    pub hours: usize,
    /// Hours with no reading that were forward-filled.
    pub filled_hours: usize,
}

/// Cleaned series plus what it took to get there.
#[derive(Debug, Clone)]
pub struct IngestedSeries {
    pub series: HourlySeries,
    pub stats: IngestStats,
}

/// Read `path` and return the cleaned hourly series.
pub fn load_and_clean(path: &Path) -> Result<IngestedSeries, AppError> {
    info!("Loading data from {}...", path.display());
    let records = read_raw_csv(path)?;
    let ingested = clean_series(&records)?;
    info!(
        rows = ingested.stats.rows_read,
        duplicates = ingested.stats.duplicate_timestamps,
        hours = ingested.stats.hours,
        filled = ingested.stats.filled_hours,
        "cleaned load series"
    );
    Ok(ingested)
}

/// Parse the raw CSV into records, in file order.
pub fn read_raw_csv(path: &Path) -> Result<Vec<RawRecord>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let ts_idx = column_index(&header_map, TIMESTAMP_COLUMN)?;
    let load_idx = column_index(&header_map, TARGET)?;

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let record =
            result.map_err(|e| AppError::input(format!("CSV parse error on line {line}: {e}")))?;

        let raw_ts = record.get(ts_idx).unwrap_or("");
        let timestamp = parse_timestamp(raw_ts)
            .map_err(|e| AppError::input(format!("Line {line}: {e}")))?;
        let load_mw = parse_load(record.get(load_idx).unwrap_or(""))
            .map_err(|e| AppError::input(format!("Line {line}: {e}")))?;

        records.push(RawRecord { timestamp, load_mw });
    }

    if records.is_empty() {
        return Err(AppError::insufficient(format!(
            "CSV '{}' contains no data rows.",
            path.display()
        )));
    }

    debug!(rows = records.len(), "read raw CSV");
    Ok(records)
}

/// Deduplicate, resample to hourly and forward-fill.
pub fn clean_series(records: &[RawRecord]) -> Result<IngestedSeries, AppError> {
    if records.is_empty() {
        return Err(AppError::insufficient("No raw records to clean."));
    }

    // 1) Collapse identical timestamps by averaging the defined readings.
    let mut by_timestamp: BTreeMap<NaiveDateTime, MeanAcc> = BTreeMap::new();
    let mut seen: HashMap<NaiveDateTime, usize> = HashMap::new();
    for r in records {
        by_timestamp.entry(r.timestamp).or_default().push(r.load_mw);
        *seen.entry(r.timestamp).or_default() += 1;
    }
    let duplicate_timestamps = seen.values().filter(|&&n| n > 1).count();

    // 2) Bin to the hour. Bins keep the mean of the per-timestamp means.
    let mut by_hour: BTreeMap<NaiveDateTime, MeanAcc> = BTreeMap::new();
    for (ts, acc) in &by_timestamp {
        by_hour.entry(floor_to_hour(*ts)).or_default().push(acc.mean());
    }

    let (Some(first), Some(last)) = (
        by_hour.keys().next().copied(),
        by_hour.keys().next_back().copied(),
    ) else {
        return Err(AppError::insufficient("No timestamps to resample."));
    };

    let hours = (last - first).num_hours() as usize + 1;
    let mut values = Vec::with_capacity(hours);
    let mut filled_hours = 0usize;
    let mut carry: Option<f64> = None;

    // 3) Walk every hour in range; forward-fill the holes.
    for i in 0..hours {
        let ts = first + chrono::Duration::hours(i as i64);
        let observed = by_hour.get(&ts).and_then(MeanAcc::mean);
        let value = match observed {
            Some(v) => {
                carry = Some(v);
                Some(v)
            }
            None => {
                filled_hours += 1;
                carry
            }
        };
        values.push(value);
    }

    Ok(IngestedSeries {
        series: HourlySeries {
            start: first,
            values,
        },
        stats: IngestStats {
            rows_read: records.len(),
            duplicate_timestamps,
            hours,
            filled_hours,
        },
    })
}

/// Parse a `Datetime` cell.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("Empty timestamp.".to_string());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| format!("Invalid timestamp '{trimmed}'."))
}

fn parse_load(raw: &str) -> Result<Option<f64>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let v = trimmed
        .parse::<f64>()
        .map_err(|_| format!("Invalid load value '{trimmed}'."))?;
    Ok(v.is_finite().then_some(v))
}

fn floor_to_hour(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_hms_opt(ts.hour(), 0, 0).unwrap_or(ts)
}

/// Running mean over the defined values only.
#[derive(Debug, Default, Clone, Copy)]
struct MeanAcc {
    sum: f64,
    count: usize,
}

impl MeanAcc {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Strip a UTF-8 BOM some exporters put before the first header.
    name.trim().trim_start_matches('\u{feff}').to_string()
}

fn column_index(header_map: &HashMap<String, usize>, name: &str) -> Result<usize, AppError> {
    header_map
        .get(name)
        .copied()
        .ok_or_else(|| AppError::input(format!("Missing required CSV column '{name}'.")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    fn ts(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 8, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn rec(t: NaiveDateTime, v: f64) -> RawRecord {
        RawRecord {
            timestamp: t,
            load_mw: Some(v),
        }
    }

    #[test]
    fn duplicates_are_averaged() {
        let records = vec![rec(ts(1, 0, 0), 100.0), rec(ts(1, 0, 0), 200.0), rec(ts(1, 1, 0), 50.0)];
        let out = clean_series(&records).unwrap();
        assert_eq!(out.series.values, vec![Some(150.0), Some(50.0)]);
        assert_eq!(out.stats.duplicate_timestamps, 1);
    }

    #[test]
    fn gaps_are_forward_filled_and_range_is_complete() {
        let records = vec![rec(ts(1, 5, 0), 10.0), rec(ts(1, 1, 0), 1.0), rec(ts(1, 2, 0), 2.0)];
        let out = clean_series(&records).unwrap();
        assert_eq!(out.series.start, ts(1, 1, 0));
        assert_eq!(
            out.series.values,
            vec![Some(1.0), Some(2.0), Some(2.0), Some(2.0), Some(10.0)]
        );
        assert_eq!(out.stats.filled_hours, 2);
        assert_eq!(out.series.end(), Some(ts(1, 5, 0)));
    }

    #[test]
    fn leading_undefined_hour_stays_undefined() {
        let records = vec![
            RawRecord {
                timestamp: ts(1, 0, 0),
                load_mw: None,
            },
            rec(ts(1, 1, 0), 7.0),
        ];
        let out = clean_series(&records).unwrap();
        assert_eq!(out.series.values, vec![None, Some(7.0)]);
    }

    #[test]
    fn sub_hourly_readings_share_an_hourly_bin() {
        let records = vec![rec(ts(2, 3, 0), 10.0), rec(ts(2, 3, 30), 20.0), rec(ts(2, 4, 0), 5.0)];
        let out = clean_series(&records).unwrap();
        assert_eq!(out.series.values, vec![Some(15.0), Some(5.0)]);
    }

    #[test]
    fn timestamp_formats_are_accepted() {
        assert_eq!(parse_timestamp("2018-08-01 01:00:00").unwrap(), ts(1, 1, 0));
        assert_eq!(parse_timestamp("2018-08-01T01:00").unwrap(), ts(1, 1, 0));
        assert!(parse_timestamp("01/08/2018 01h").is_err());
    }

    #[test]
    fn read_raw_csv_rejects_malformed_timestamp() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Datetime,PJME_MW").unwrap();
        writeln!(file, "2018-08-01 01:00:00,100.0").unwrap();
        writeln!(file, "not-a-date,120.0").unwrap();
        let err = read_raw_csv(file.path()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("Line 3"));
    }

    #[test]
    fn read_raw_csv_rejects_empty_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Datetime,PJME_MW").unwrap();
        let err = read_raw_csv(file.path()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn load_and_clean_reads_bom_prefixed_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "\u{feff}Datetime,PJME_MW").unwrap();
        writeln!(file, "2018-08-01 02:00:00,200").unwrap();
        writeln!(file, "2018-08-01 00:00:00,100").unwrap();
        let out = load_and_clean(file.path()).unwrap();
        assert_eq!(out.series.values, vec![Some(100.0), Some(100.0), Some(200.0)]);
    }
}
