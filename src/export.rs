use crate::availability::{ListingAvailability, AVAILABILITY_CSV_HEADER};
use crate::models::{ListingRecord, CSV_HEADER};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// `<base>/run_<municipalities>_<timestamp>`, created if missing.
pub fn create_run_dir(base: &Path, municipalities: &[String], started: DateTime<Utc>) -> Result<PathBuf> {
    let names: Vec<String> = municipalities
        .iter()
        .map(|m| {
            m.trim()
                .to_lowercase()
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '-' })
                .collect::<String>()
        })
        .filter(|m| !m.is_empty())
        .collect();
    let dir = base.join(format!(
        "run_{}_{}",
        names.join("_"),
        started.format("%Y%m%d-%H%M%S")
    ));
    fs::create_dir_all(&dir).context(format!("Failed to create output directory: {}", dir.display()))?;
    Ok(dir)
}

/// Records sorted by check-in date, then title.
pub fn write_records_csv(records: &[ListingRecord], output_path: &Path) -> Result<()> {
    let mut sorted: Vec<&ListingRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        a.combination
            .date
            .cmp(&b.combination.date)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.listing_id.cmp(&b.listing_id))
    });

    let file = File::create(output_path)
        .context(format!("Failed to create output file: {}", output_path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(CSV_HEADER)?;
    for record in sorted {
        writer.write_record(record.to_csv_record())?;
    }
    writer.flush()?;

    info!("Saved {} records to {}", records.len(), output_path.display());
    Ok(())
}

pub fn write_availability_csv(rows: &[ListingAvailability], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create output file: {}", output_path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(AVAILABILITY_CSV_HEADER)?;
    for row in rows {
        writer.write_record(row.to_csv_record())?;
    }
    writer.flush()?;

    info!("Saved availability of {} listings to {}", rows.len(), output_path.display());
    Ok(())
}

/// One row per day, one column per property type; absent types count 0.
pub fn write_timeline_csv(timeline: &BTreeMap<NaiveDate, BTreeMap<String, usize>>, output_path: &Path) -> Result<()> {
    let types: BTreeSet<&str> = timeline
        .values()
        .flat_map(|counts| counts.keys().map(String::as_str))
        .collect();

    let file = File::create(output_path)
        .context(format!("Failed to create output file: {}", output_path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(std::iter::once("date").chain(types.iter().copied()))?;
    for (day, counts) in timeline {
        let mut row = vec![day.to_string()];
        row.extend(types.iter().map(|t| counts.get(*t).copied().unwrap_or(0).to_string()));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// The effective run configuration, saved next to the exported data.
pub fn write_config_json<T: Serialize>(config: &T, dir: &Path) -> Result<PathBuf> {
    let path = dir.join("config.json");
    let file = File::create(&path).context(format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, config).context("Failed to serialize config")?;
    writer.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::per_listing;
    use crate::models::{ScanCombination, Source};
    use chrono::{NaiveDate, TimeZone};
    use tempfile::tempdir;

    fn record(id: &str, day: u32, title: &str) -> ListingRecord {
        let mut record = ListingRecord::bare(
            id,
            Source::Airbnb,
            "Schagen",
            ScanCombination::new(NaiveDate::from_ymd_opt(2025, 12, day).unwrap(), 2, 2),
            Utc.with_ymd_and_hms(2025, 11, 20, 9, 0, 0).unwrap(),
        );
        record.title = Some(title.to_string());
        record
    }

    #[test]
    fn test_run_dir_name() {
        let dir = tempdir().unwrap();
        let started = Utc.with_ymd_and_hms(2025, 11, 20, 9, 5, 0).unwrap();
        let run = create_run_dir(
            dir.path(),
            &["Schagen".to_string(), "Hollands Kroon".to_string()],
            started,
        )
        .unwrap();
        assert!(run.is_dir());
        assert_eq!(
            run.file_name().unwrap().to_str().unwrap(),
            "run_schagen_hollands-kroon_20251120-090500"
        );
    }

    #[test]
    fn test_records_csv_is_sorted_by_date_then_title() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("listings.csv");
        let records = vec![record("1", 3, "Zeezicht"), record("2", 1, "Polderhuis"), record("3", 3, "Duinhuis")];

        write_records_csv(&records, &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.headers().unwrap().len(), CSV_HEADER.len());
        let ids: Vec<String> = reader
            .records()
            .map(|r| r.unwrap().get(2).unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn test_availability_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("availability.csv");
        let records = vec![record("1", 1, "Zeezicht")];
        let start = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 12, 4).unwrap();

        write_availability_csv(&per_listing(&records, start, end), &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("listing_id,listing_title"));
        assert!(content.contains("1,Zeezicht,,Schagen,2,4,50.0"));
    }

    #[test]
    fn test_timeline_csv_fills_missing_types() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("timeline.csv");
        let mut a = record("1", 1, "Zeezicht");
        a.property_type = Some("Entire home".to_string());
        let mut b = record("2", 2, "Polderhuis");
        b.property_type = Some("Private room".to_string());

        write_timeline_csv(&crate::availability::timeline(&[a, b]), &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "date,Entire home,Private room");
        assert_eq!(lines[1], "2025-12-01,1,0");
        assert_eq!(lines[2], "2025-12-02,1,1");
        assert_eq!(lines[3], "2025-12-03,0,1");
    }

    #[test]
    fn test_config_json_is_written() {
        let dir = tempdir().unwrap();
        let path = write_config_json(&serde_json::json!({"workers": 2}), dir.path()).unwrap();
        let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved["workers"], 2);
    }
}
