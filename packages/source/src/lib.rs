#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Location rows from the property gazetteer export.
//!
//! The export is a CSV file with one row per property. Two row shapes are
//! accepted:
//!
//! - **basic**: `uprn, x, y, lat, lng, addr, street, town, postcode`
//! - **round-diff**: the basic columns plus, for each round category
//!   prefix (`ref`, `recy`, `mix`, `glass`, `gw`), either a single
//!   already-diffed `<prefix>` column holding the new round, or an
//!   `<prefix>_old` / `<prefix>_new` pair that is diffed here.
//!
//! A row needs either `lat`/`lng` or a grid `x`/`y`. When only the grid
//! position is present, latitude and longitude are derived from it. An
//! empty cell is missing; a zero is a real coordinate.
//!
//! Headers are matched case-insensitively. Rows that cannot be parsed are
//! skipped with a warning so one bad row never aborts a run.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use uprn_maps_framing::bng;
use uprn_maps_models::{LocationRecord, RoundCategory};

/// Number of digits in a UPRN entered by a user.
pub const UPRN_DIGITS: usize = 12;

/// Errors from reading location rows.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The export could not be opened or read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path to the export.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The CSV header row could not be read.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A user-supplied UPRN is malformed.
    #[error("{input:?} is not a valid UPRN (expected {UPRN_DIGITS} digits)")]
    InvalidUprn {
        /// The rejected input.
        input: String,
    },

    /// No row carries the requested UPRN.
    #[error("UPRN {uprn} not found in the location export")]
    UprnNotFound {
        /// The UPRN that was looked up.
        uprn: u64,
    },
}

/// One raw row as exported by the data source.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRow {
    uprn: Option<String>,
    x: Option<f64>,
    y: Option<f64>,
    lat: Option<f64>,
    #[serde(alias = "lon", alias = "long")]
    lng: Option<f64>,
    #[serde(alias = "address")]
    addr: Option<String>,
    street: Option<String>,
    town: Option<String>,
    postcode: Option<String>,

    #[serde(rename = "ref")]
    ref_round: Option<String>,
    ref_old: Option<String>,
    ref_new: Option<String>,
    recy: Option<String>,
    recy_old: Option<String>,
    recy_new: Option<String>,
    mix: Option<String>,
    mix_old: Option<String>,
    mix_new: Option<String>,
    glass: Option<String>,
    glass_old: Option<String>,
    glass_new: Option<String>,
    gw: Option<String>,
    gw_old: Option<String>,
    gw_new: Option<String>,
}

/// Round columns present in one row.
struct RoundColumns<'a> {
    diffed: Option<&'a str>,
    old: Option<&'a str>,
    new: Option<&'a str>,
}

impl RawRow {
    fn round_columns(&self, category: RoundCategory) -> RoundColumns<'_> {
        let (diffed, old, new) = match category {
            RoundCategory::GeneralRefuse => (&self.ref_round, &self.ref_old, &self.ref_new),
            RoundCategory::Recycling => (&self.recy, &self.recy_old, &self.recy_new),
            RoundCategory::MixedRecycling => (&self.mix, &self.mix_old, &self.mix_new),
            RoundCategory::Glass => (&self.glass, &self.glass_old, &self.glass_new),
            RoundCategory::GardenWaste => (&self.gw, &self.gw_old, &self.gw_new),
        };
        RoundColumns {
            diffed: diffed.as_deref(),
            old: old.as_deref(),
            new: new.as_deref(),
        }
    }

    /// Converts the row into a record, or explains why it was rejected.
    fn into_record(self) -> Result<LocationRecord, String> {
        let uprn_str = self.uprn.as_deref().map(str::trim).unwrap_or_default();
        let uprn = parse_uprn_value(uprn_str).ok_or_else(|| format!("bad UPRN {uprn_str:?}"))?;

        let grid = self.x.zip(self.y);
        let (lat, lng) = match (self.lat.zip(self.lng), grid) {
            (Some(position), _) => position,
            (None, Some((x, y))) => {
                let derived = bng::to_wgs84(x, y);
                (derived.lat, derived.lng)
            }
            (None, None) => return Err(format!("UPRN {uprn} has no position")),
        };

        let mut record = LocationRecord::new(uprn, lat, lng)
            .with_address(
                text(self.addr.as_deref()),
                text(self.street.as_deref()),
                text(self.town.as_deref()),
            )
            .with_postcode(text(self.postcode.as_deref()));

        if let Some((x, y)) = grid {
            record = record.with_projected(x, y);
        }

        for &category in RoundCategory::all() {
            if let Some(new_round) = round_change(category, &self.round_columns(category)) {
                record = record.with_round_change(category, new_round);
            }
        }

        Ok(record)
    }
}

fn text(value: Option<&str>) -> &str {
    value.map_or("", str::trim)
}

/// Resolves the new round for `category`, if it changed.
///
/// An `_old`/`_new` pair takes precedence over an already-diffed column.
fn round_change<'a>(category: RoundCategory, columns: &RoundColumns<'a>) -> Option<&'a str> {
    if columns.new.is_some() || columns.old.is_some() {
        return category
            .is_change(columns.old, columns.new)
            .then(|| columns.new.map(str::trim))
            .flatten();
    }
    columns
        .diffed
        .map(str::trim)
        .filter(|round| !round.is_empty() && *round != "0")
}

/// Parses a UPRN as stored in the export (plain integer, optionally with
/// a trailing `.0` from spreadsheet tools).
fn parse_uprn_value(value: &str) -> Option<u64> {
    let digits = value.strip_suffix(".0").unwrap_or(value);
    digits.parse::<u64>().ok().filter(|&uprn| uprn > 0)
}

/// Validates a UPRN typed by a user: exactly [`UPRN_DIGITS`] digits.
///
/// # Errors
///
/// Returns [`SourceError::InvalidUprn`] if the input is not a 12-digit
/// number.
pub fn validate_uprn(input: &str) -> Result<u64, SourceError> {
    let trimmed = input.trim();
    if trimmed.len() != UPRN_DIGITS || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SourceError::InvalidUprn {
            input: input.to_owned(),
        });
    }
    trimmed.parse().map_err(|_| SourceError::InvalidUprn {
        input: input.to_owned(),
    })
}

/// Reads every location from a CSV export on disk.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be opened or has no readable
/// header row.
pub fn read_locations(path: &Path) -> Result<Vec<LocationRecord>, SourceError> {
    let file = std::fs::File::open(path).map_err(|e| SourceError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let records = parse_locations(file)?;
    log::info!("Read {} locations from {}", records.len(), path.display());
    Ok(records)
}

/// Parses locations from any CSV reader.
///
/// Malformed rows and rows without a position are skipped. When a UPRN
/// appears twice the first row wins.
///
/// # Errors
///
/// Returns [`SourceError::Csv`] if the header row cannot be read.
pub fn parse_locations(reader: impl Read) -> Result<Vec<LocationRecord>, SourceError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: csv::StringRecord = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();
    csv_reader.set_headers(headers);

    let mut seen = BTreeSet::new();
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (index, result) in csv_reader.deserialize::<RawRow>().enumerate() {
        let row_number = index + 2;
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                log::warn!("Skipping malformed row {row_number}: {e}");
                skipped += 1;
                continue;
            }
        };

        match row.into_record() {
            Ok(record) => {
                if seen.insert(record.uprn) {
                    records.push(record);
                } else {
                    log::warn!("Skipping duplicate UPRN {} at row {row_number}", record.uprn);
                    skipped += 1;
                }
            }
            Err(reason) => {
                log::warn!("Skipping row {row_number}: {reason}");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} unusable row(s)");
    }

    Ok(records)
}

/// Finds the record with the given UPRN.
///
/// # Errors
///
/// Returns [`SourceError::UprnNotFound`] if no record matches.
pub fn find_location(records: &[LocationRecord], uprn: u64) -> Result<LocationRecord, SourceError> {
    records
        .iter()
        .find(|r| r.uprn == uprn)
        .cloned()
        .ok_or(SourceError::UprnNotFound { uprn })
}
