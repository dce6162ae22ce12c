#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Partitions locations into map groups.
//!
//! Three strategies are supported, selected by [`Strategy`]:
//!
//! - [`Strategy::Postcode`] keys each location by its normalized postcode.
//! - [`Strategy::Cluster`] runs DBSCAN over British National Grid
//!   coordinates through a [`Clusterer`].
//! - [`Strategy::RoundDiff`] collects the locations whose collection round
//!   changed, one group per requested category.
//!
//! Every location lands in at most one group per run.

pub mod dbscan;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uprn_maps_models::{Group, GroupKey, LocationRecord, RoundCategory};

pub use dbscan::{Clusterer, LinfaDbscan};

/// Groups keyed in page order.
pub type Grouping = BTreeMap<GroupKey, Group>;

/// Errors from grouping.
#[derive(Debug, thiserror::Error)]
pub enum GroupingError {
    /// Strategy parameters are out of range.
    #[error("Invalid strategy parameters: {0}")]
    InvalidStrategyParams(String),

    /// The clustering backend failed.
    #[error("Clustering failed: {0}")]
    Clustering(String),
}

/// How locations are partitioned into groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Strategy {
    /// One group per normalized postcode.
    Postcode,
    /// DBSCAN density clusters over projected coordinates.
    Cluster {
        /// Neighbourhood radius in metres.
        eps: f64,
        /// Minimum neighbourhood size for a core point.
        min_samples: usize,
    },
    /// One group per round category with at least one changed location.
    RoundDiff {
        /// Categories to report on.
        categories: Vec<RoundCategory>,
    },
}

impl Strategy {
    /// Checks the strategy parameters.
    ///
    /// # Errors
    ///
    /// Returns [`GroupingError::InvalidStrategyParams`] if `eps` is not a
    /// positive finite number, `min_samples` is zero, or no round
    /// categories were requested.
    pub fn validate(&self) -> Result<(), GroupingError> {
        match self {
            Self::Postcode => Ok(()),
            Self::Cluster { eps, min_samples } => {
                if !eps.is_finite() || *eps <= 0.0 {
                    return Err(GroupingError::InvalidStrategyParams(format!(
                        "eps must be a positive finite distance, got {eps}"
                    )));
                }
                if *min_samples < 1 {
                    return Err(GroupingError::InvalidStrategyParams(
                        "min_samples must be at least 1".to_owned(),
                    ));
                }
                Ok(())
            }
            Self::RoundDiff { categories } => {
                if categories.is_empty() {
                    return Err(GroupingError::InvalidStrategyParams(
                        "at least one round category is required".to_owned(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Normalizes a postcode: upper case, internal whitespace collapsed to a
/// single space, trimmed.
#[must_use]
pub fn normalize_postcode(postcode: &str) -> String {
    postcode
        .split_whitespace()
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Groups `locations` using the default DBSCAN backend.
///
/// # Errors
///
/// Returns [`GroupingError`] if the strategy parameters are invalid or
/// clustering fails.
pub fn group(locations: &[LocationRecord], strategy: &Strategy) -> Result<Grouping, GroupingError> {
    group_with(locations, strategy, &LinfaDbscan)
}

/// Groups `locations` using the given clustering backend.
///
/// # Errors
///
/// Returns [`GroupingError`] if the strategy parameters are invalid or
/// clustering fails.
pub fn group_with(
    locations: &[LocationRecord],
    strategy: &Strategy,
    clusterer: &dyn Clusterer,
) -> Result<Grouping, GroupingError> {
    strategy.validate()?;

    let buckets = match strategy {
        Strategy::Postcode => by_postcode(locations),
        Strategy::Cluster { eps, min_samples } => {
            by_cluster(locations, *eps, *min_samples, clusterer)?
        }
        Strategy::RoundDiff { categories } => by_round_change(locations, categories),
    };

    let grouping: Grouping = buckets
        .into_iter()
        .filter_map(|(key, members)| Group::new(key.clone(), members).map(|g| (key, g)))
        .collect();

    log_summary(&grouping, locations.len());

    Ok(grouping)
}

fn by_postcode(locations: &[LocationRecord]) -> BTreeMap<GroupKey, Vec<LocationRecord>> {
    let mut buckets: BTreeMap<GroupKey, Vec<LocationRecord>> = BTreeMap::new();
    for location in locations {
        let postcode = normalize_postcode(&location.postcode);
        let key = if postcode.is_empty() {
            GroupKey::Unassigned
        } else {
            GroupKey::Postcode(postcode)
        };
        buckets.entry(key).or_default().push(location.clone());
    }
    buckets
}

fn by_cluster(
    locations: &[LocationRecord],
    eps: f64,
    min_samples: usize,
    clusterer: &dyn Clusterer,
) -> Result<BTreeMap<GroupKey, Vec<LocationRecord>>, GroupingError> {
    let mut buckets: BTreeMap<GroupKey, Vec<LocationRecord>> = BTreeMap::new();

    let (projected, unprojected): (Vec<_>, Vec<_>) =
        locations.iter().partition(|l| l.projected.is_some());

    if !unprojected.is_empty() {
        log::warn!(
            "{} location(s) have no projected coordinates and are treated as noise",
            unprojected.len()
        );
    }

    let points: Vec<(f64, f64)> = projected
        .iter()
        .filter_map(|l| l.projected.map(|p| (p.x, p.y)))
        .collect();
    let labels = clusterer.cluster(&points, eps, min_samples)?;
    if labels.len() != points.len() {
        return Err(GroupingError::Clustering(format!(
            "expected {} labels, got {}",
            points.len(),
            labels.len()
        )));
    }

    for (location, label) in projected.into_iter().zip(labels) {
        let key = label.map_or(GroupKey::Noise, GroupKey::Cluster);
        buckets.entry(key).or_default().push(location.clone());
    }
    for location in unprojected {
        buckets
            .entry(GroupKey::Noise)
            .or_default()
            .push(location.clone());
    }

    Ok(buckets)
}

/// Places each changed location in the first requested category (in
/// canonical order) it changed in.
fn by_round_change(
    locations: &[LocationRecord],
    categories: &[RoundCategory],
) -> BTreeMap<GroupKey, Vec<LocationRecord>> {
    let requested: BTreeSet<RoundCategory> = categories.iter().copied().collect();
    let mut buckets: BTreeMap<GroupKey, Vec<LocationRecord>> = BTreeMap::new();

    for location in locations {
        let Some(category) = requested
            .iter()
            .copied()
            .find(|&c| location.round_change(c).is_some())
        else {
            continue;
        };
        buckets
            .entry(GroupKey::Round(category))
            .or_default()
            .push(location.clone());
    }

    buckets
}

fn log_summary(grouping: &Grouping, total: usize) {
    log::info!(
        "Grouped {total} location(s) into {} group(s)",
        grouping.len()
    );
    if let Some(unassigned) = grouping.get(&GroupKey::Unassigned) {
        log::warn!("{} location(s) have no postcode", unassigned.len());
    }
    if let Some(noise) = grouping.get(&GroupKey::Noise) {
        log::warn!(
            "{} location(s) are density noise and get no page of their own",
            noise.len()
        );
    }
}
