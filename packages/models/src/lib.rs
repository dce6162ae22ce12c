#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the UPRN map pipeline.
//!
//! A [`LocationRecord`] is one geocoded property. The grouping engine turns
//! a list of them into [`Group`]s keyed by [`GroupKey`], the request
//! builder turns each group into [`MapRequest`]s, and the rendering client
//! resolves each request to a [`RenderedTile`].

pub mod group;
pub mod progress;
pub mod request;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use group::{BoundingBox, Bounds, Group, GroupKey};
pub use request::{Elevation, MapRequest, Marker, MarkerColor, MarkerStyle, RenderedTile};

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl Coord {
    /// Creates a coordinate from latitude and longitude.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A British National Grid (EPSG:27700) coordinate in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedCoord {
    /// Easting.
    pub x: f64,
    /// Northing.
    pub y: f64,
}

impl ProjectedCoord {
    /// Creates a projected coordinate from easting and northing.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A waste-collection round category.
///
/// Variant order is the canonical page order for round-diff documents.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(ascii_case_insensitive)]
pub enum RoundCategory {
    /// General refuse collection.
    #[strum(serialize = "REF")]
    #[serde(rename = "REF")]
    GeneralRefuse,
    /// Dry recycling collection.
    #[strum(serialize = "RECY")]
    #[serde(rename = "RECY")]
    Recycling,
    /// Mixed recycling collection.
    #[strum(serialize = "MIX")]
    #[serde(rename = "MIX")]
    MixedRecycling,
    /// Glass collection.
    #[strum(serialize = "GLASS")]
    #[serde(rename = "GLASS")]
    Glass,
    /// Garden waste collection (subscription service).
    #[strum(serialize = "GW")]
    #[serde(rename = "GW")]
    GardenWaste,
}

impl RoundCategory {
    /// Returns all categories in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::GeneralRefuse,
            Self::Recycling,
            Self::MixedRecycling,
            Self::Glass,
            Self::GardenWaste,
        ]
    }

    /// Human-readable label used in page titles.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::GeneralRefuse => "General refuse",
            Self::Recycling => "Recycling",
            Self::MixedRecycling => "Mixed recycling",
            Self::Glass => "Glass",
            Self::GardenWaste => "Garden waste",
        }
    }

    /// Column prefix used by the round-diff row shape (e.g. `recy_new`).
    #[must_use]
    pub const fn column_prefix(self) -> &'static str {
        match self {
            Self::GeneralRefuse => "ref",
            Self::Recycling => "recy",
            Self::MixedRecycling => "mix",
            Self::Glass => "glass",
            Self::GardenWaste => "gw",
        }
    }

    /// Single-character glyph drawn next to markers of this category.
    #[must_use]
    pub const fn glyph(self) -> char {
        match self {
            Self::GeneralRefuse => 'r',
            Self::Recycling => 'c',
            Self::MixedRecycling => 'm',
            Self::Glass => 'g',
            Self::GardenWaste => 'w',
        }
    }

    /// Whether an old/new round pair counts as a round change.
    ///
    /// A change needs a new round that is present, non-zero and different
    /// from the old one. Garden waste also needs an old round: a brand-new
    /// subscription is not a change.
    #[must_use]
    pub fn is_change(self, old: Option<&str>, new: Option<&str>) -> bool {
        let old = old.map(str::trim).filter(|s| !s.is_empty());
        let Some(new) = new.map(str::trim).filter(|s| !s.is_empty() && *s != "0") else {
            return false;
        };

        match (self, old) {
            (Self::GardenWaste, None) => false,
            (_, Some(old)) => old != new,
            (_, None) => true,
        }
    }
}

/// One geocoded property.
///
/// Identity is the UPRN: two records with the same `uprn` describe the
/// same location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    /// Unique Property Reference Number.
    pub uprn: u64,
    /// WGS84 position.
    pub position: Coord,
    /// British National Grid position, when the source supplied one.
    pub projected: Option<ProjectedCoord>,
    /// Full address line.
    pub address: String,
    /// Street name.
    pub street: String,
    /// Town name.
    pub town: String,
    /// Postcode as supplied by the source (may be empty).
    pub postcode: String,
    /// New round identifier per category, only for categories that changed.
    pub round_changes: BTreeMap<RoundCategory, String>,
}

impl LocationRecord {
    /// Creates a record with only identity and position set.
    #[must_use]
    pub const fn new(uprn: u64, lat: f64, lng: f64) -> Self {
        Self {
            uprn,
            position: Coord::new(lat, lng),
            projected: None,
            address: String::new(),
            street: String::new(),
            town: String::new(),
            postcode: String::new(),
            round_changes: BTreeMap::new(),
        }
    }

    /// Sets the projected coordinate.
    #[must_use]
    pub fn with_projected(mut self, x: f64, y: f64) -> Self {
        self.projected = Some(ProjectedCoord::new(x, y));
        self
    }

    /// Sets the postcode.
    #[must_use]
    pub fn with_postcode(mut self, postcode: &str) -> Self {
        postcode.clone_into(&mut self.postcode);
        self
    }

    /// Sets the address fields.
    #[must_use]
    pub fn with_address(mut self, address: &str, street: &str, town: &str) -> Self {
        address.clone_into(&mut self.address);
        street.clone_into(&mut self.street);
        town.clone_into(&mut self.town);
        self
    }

    /// Records a round change for `category`.
    #[must_use]
    pub fn with_round_change(mut self, category: RoundCategory, new_round: &str) -> Self {
        self.round_changes.insert(category, new_round.to_owned());
        self
    }

    /// New round for `category`, if it changed.
    #[must_use]
    pub fn round_change(&self, category: RoundCategory) -> Option<&str> {
        self.round_changes.get(&category).map(String::as_str)
    }

    /// Summary of every round change, e.g. `"RECY R34, GW G2"`.
    #[must_use]
    pub fn change_summary(&self) -> Option<String> {
        if self.round_changes.is_empty() {
            return None;
        }
        Some(
            self.round_changes
                .iter()
                .map(|(category, round)| format!("{category} {round}"))
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}
