#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Map request construction.
//!
//! Turns a group and its framings into [`MapRequest`]s: one per ladder
//! level, each carrying the group's markers in the group's colour. The
//! run-level overview request carries every location in the run.
//!
//! Construction is pure; nothing here talks to the network.

pub mod palette;
pub mod service_registry;

use std::collections::BTreeMap;

use strum_macros::{AsRefStr, Display, EnumString};
use uprn_maps_framing::Framing;
use uprn_maps_grouping::Grouping;
use uprn_maps_models::{
    Elevation, Group, GroupKey, LocationRecord, MapRequest, Marker, MarkerColor, MarkerStyle,
};

pub use palette::{ColorScheme, Palette};
pub use service_registry::{RegistryError, ServiceConfig, ServiceKind};

/// Marker style used when a level has no configured style.
pub const DEFAULT_STYLE: MarkerStyle = MarkerStyle {
    size: 10.0,
    outline_width: 1.5,
};

/// What text is attached to each marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LabelVerbosity {
    /// The UPRN.
    #[default]
    Uprn,
    /// The address line, falling back to the UPRN when empty.
    Address,
}

/// Options shared by every request in a run.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Marker label text.
    pub labels: LabelVerbosity,
    /// Marker style per group ladder elevation.
    pub styles: BTreeMap<Elevation, MarkerStyle>,
    /// Marker style for the run-level overview.
    pub overview_style: MarkerStyle,
}

impl BuildOptions {
    /// Options derived from a service configuration.
    #[must_use]
    pub fn from_service(service: &ServiceConfig, labels: LabelVerbosity) -> Self {
        Self {
            labels,
            styles: service
                .levels
                .iter()
                .map(|l| (Elevation(l.elevation), l.style()))
                .collect(),
            overview_style: service.overview.style(),
        }
    }

    fn style_at(&self, elevation: Elevation) -> MarkerStyle {
        self.styles.get(&elevation).copied().unwrap_or(DEFAULT_STYLE)
    }
}

/// Builds one request per framing for `group`.
#[must_use]
pub fn build(
    group: &Group,
    framings: &[Framing],
    colors: &ColorScheme,
    options: &BuildOptions,
) -> Vec<MapRequest> {
    let markers = group_markers(group, colors, options.labels);

    framings
        .iter()
        .map(|framing| MapRequest {
            key: Some(group.key().clone()),
            elevation: framing.level.elevation,
            overview: framing.overview,
            center: framing.center,
            extent: framing.extent,
            width: framing.level.width,
            height: framing.level.height,
            dpi: framing.level.dpi,
            style: options.style_at(framing.level.elevation),
            markers: markers.clone(),
        })
        .collect()
}

/// Builds the run-level overview request carrying every location in
/// `grouping`, noise included.
#[must_use]
pub fn overview(
    grouping: &Grouping,
    framing: &Framing,
    colors: &ColorScheme,
    options: &BuildOptions,
) -> MapRequest {
    let markers = grouping
        .values()
        .flat_map(|group| group_markers(group, colors, options.labels))
        .collect();

    MapRequest {
        key: None,
        elevation: framing.level.elevation,
        overview: true,
        center: framing.center,
        extent: framing.extent,
        width: framing.level.width,
        height: framing.level.height,
        dpi: framing.level.dpi,
        style: options.overview_style,
        markers,
    }
}

fn group_markers(group: &Group, colors: &ColorScheme, labels: LabelVerbosity) -> Vec<Marker> {
    let key = group.key();
    let color_index = colors.index_of(key);
    let color = color_index.map_or(MarkerColor::NOISE, |_| colors.color_of(key));
    let glyph = match key {
        GroupKey::Round(category) => Some(category.glyph()),
        _ => None,
    };

    group
        .members()
        .iter()
        .map(|member| Marker {
            uprn: member.uprn,
            position: member.position,
            projected: member.projected,
            label: label(member, key, labels),
            color_index,
            color,
            glyph,
        })
        .collect()
}

fn label(member: &LocationRecord, key: &GroupKey, labels: LabelVerbosity) -> String {
    let base = match labels {
        LabelVerbosity::Address if !member.address.is_empty() => member.address.clone(),
        LabelVerbosity::Uprn | LabelVerbosity::Address => member.uprn.to_string(),
    };
    match (key, member.change_summary()) {
        (GroupKey::Round(_), Some(changes)) => format!("{base} ({changes})"),
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use uprn_maps_framing::{Level, frame};
    use uprn_maps_grouping::{Strategy, group};
    use uprn_maps_models::{Bounds, RoundCategory};

    use super::*;

    fn ladder() -> Vec<Level> {
        [1750, 5000, 10_000]
            .into_iter()
            .map(|scale| Level {
                elevation: Elevation(scale),
                width: 1000,
                height: 800,
                dpi: 300,
            })
            .collect()
    }

    fn options() -> BuildOptions {
        BuildOptions {
            labels: LabelVerbosity::Uprn,
            styles: BTreeMap::from([(
                Elevation(1750),
                MarkerStyle {
                    size: 20.0,
                    outline_width: 3.0,
                },
            )]),
            overview_style: DEFAULT_STYLE,
        }
    }

    fn locations() -> Vec<LocationRecord> {
        vec![
            LocationRecord::new(1, 52.330, -0.180)
                .with_postcode("AB1")
                .with_address("1 High St", "High St", "Town"),
            LocationRecord::new(2, 52.331, -0.181).with_postcode("AB1"),
            LocationRecord::new(3, 52.340, -0.190).with_postcode("AB2"),
        ]
    }

    #[test]
    fn one_request_per_framing_level() {
        let grouping = group(&locations(), &Strategy::Postcode).unwrap();
        let colors = ColorScheme::for_grouping(&grouping);
        let context = Bounds::of(&locations()).unwrap();

        for group in grouping.values() {
            let framings = frame(group.members(), &ladder(), &context).unwrap();
            let requests = build(group, &framings, &colors, &options());
            assert_eq!(requests.len(), framings.len());
            for request in &requests {
                assert_eq!(request.key.as_ref(), Some(group.key()));
                assert_eq!(request.markers.len(), group.len());
            }
            assert!(requests.last().unwrap().overview);
            assert!((requests[0].style.size - 20.0).abs() < f64::EPSILON);
            assert!((requests[1].style.size - DEFAULT_STYLE.size).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn groups_get_distinct_colours() {
        let grouping = group(&locations(), &Strategy::Postcode).unwrap();
        let colors = ColorScheme::for_grouping(&grouping);
        let context = Bounds::of(&locations()).unwrap();

        let firsts: Vec<MapRequest> = grouping
            .values()
            .map(|g| {
                let framings = frame(g.members(), &ladder(), &context).unwrap();
                build(g, &framings, &colors, &options()).remove(0)
            })
            .collect();
        assert_eq!(firsts[0].markers[0].color_index, Some(0));
        assert_eq!(firsts[1].markers[0].color_index, Some(1));
        assert_ne!(firsts[0].markers[0].color, firsts[1].markers[0].color);
    }

    #[test]
    fn overview_carries_every_location_including_noise() {
        let mut everyone = locations();
        everyone[2] = everyone[2].clone().with_projected(500_000.0, 250_000.0);
        let grouping: Grouping = [
            Group::new(GroupKey::Cluster(0), everyone[..2].to_vec()).unwrap(),
            Group::new(GroupKey::Noise, everyone[2..].to_vec()).unwrap(),
        ]
        .into_iter()
        .map(|g| (g.key().clone(), g))
        .collect();
        let colors = ColorScheme::for_grouping(&grouping);
        let context = Bounds::of(&everyone).unwrap();
        let framing = uprn_maps_framing::frame_level(ladder()[2], true, &context.wgs84);

        let request = overview(&grouping, &framing, &colors, &options());
        assert!(request.key.is_none());
        assert!(request.overview);
        assert_eq!(request.markers.len(), 3);
        let noise = request.markers.iter().find(|m| m.uprn == 3).unwrap();
        assert_eq!(noise.color_index, None);
        assert_eq!(noise.color, MarkerColor::NOISE);
    }

    #[test]
    fn round_markers_carry_glyph_and_changes() {
        let changed = LocationRecord::new(7, 52.0, 0.1)
            .with_round_change(RoundCategory::Recycling, "R34")
            .with_round_change(RoundCategory::GardenWaste, "G2");
        let grouping = group(
            &[changed],
            &Strategy::RoundDiff {
                categories: RoundCategory::all().to_vec(),
            },
        )
        .unwrap();
        let colors = ColorScheme::for_grouping(&grouping);
        let group = &grouping[&GroupKey::Round(RoundCategory::Recycling)];
        let framings = frame(group.members(), &ladder(), group.bounds()).unwrap();

        let request = build(group, &framings, &colors, &options()).remove(0);
        assert_eq!(request.markers[0].glyph, Some('c'));
        assert_eq!(request.markers[0].label, "7 (RECY R34, GW G2)");
    }

    #[test]
    fn address_labels_fall_back_to_uprn() {
        let records = locations();
        let key = GroupKey::Postcode("AB1".to_owned());
        assert_eq!(label(&records[0], &key, LabelVerbosity::Address), "1 High St");
        assert_eq!(label(&records[1], &key, LabelVerbosity::Address), "2");
        assert_eq!(label(&records[0], &key, LabelVerbosity::Uprn), "1");
    }
}
