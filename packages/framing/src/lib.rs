#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Viewport framing.
//!
//! For each level of an elevation ladder, [`frame`] picks the centre and
//! extent a map view must cover. Detail levels frame the group itself; the
//! last (topmost) level frames the whole run so a reader can see where the
//! group sits among its neighbours.

pub mod bng;

use serde::{Deserialize, Serialize};
use uprn_maps_models::{BoundingBox, Bounds, Coord, Elevation, LocationRecord};

/// Fraction of the span added on every side of a framed extent.
pub const PADDING: f64 = 0.1;

/// Half-span in degrees of the extent used when a group collapses to a
/// single point.
pub const DEFAULT_HALF_SPAN_DEGREES: f64 = 0.001;

const METRES_PER_INCH: f64 = 0.0254;
const METRES_PER_DEGREE_LAT: f64 = 110_540.0;
const METRES_PER_DEGREE_LNG_AT_EQUATOR: f64 = 111_320.0;

/// Errors from framing.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// Framing was requested for no locations.
    #[error("Cannot frame an empty group")]
    EmptyGroup,
}

/// One rung of an elevation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    /// Map scale.
    pub elevation: Elevation,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output resolution.
    pub dpi: u32,
}

impl Level {
    /// Ground span `(width, height)` in metres covered by the output image.
    #[must_use]
    pub fn ground_span(&self) -> (f64, f64) {
        let metres_per_pixel =
            f64::from(self.elevation.scale()) * METRES_PER_INCH / f64::from(self.dpi.max(1));
        (
            f64::from(self.width) * metres_per_pixel,
            f64::from(self.height) * metres_per_pixel,
        )
    }
}

/// The chosen view for one ladder level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Framing {
    /// The ladder level.
    pub level: Level,
    /// Whether this is the topmost (run overview) level.
    pub overview: bool,
    /// Centre of the view.
    pub center: Coord,
    /// WGS84 extent (`x` = longitude, `y` = latitude).
    pub extent: BoundingBox,
    /// Whether the extent fits inside the level's ground span.
    pub fits: bool,
}

/// Frames `locations` once per ladder level.
///
/// The ladder is ordered tightest to widest. Every level except the last
/// frames the members' bounding box; the last frames `context`, the
/// combined bounds of every group in the run.
///
/// # Errors
///
/// Returns [`FramingError::EmptyGroup`] if `locations` is empty.
pub fn frame(
    locations: &[LocationRecord],
    ladder: &[Level],
    context: &Bounds,
) -> Result<Vec<Framing>, FramingError> {
    let members = Bounds::of(locations).ok_or(FramingError::EmptyGroup)?;
    let last = ladder.len().saturating_sub(1);

    Ok(ladder
        .iter()
        .enumerate()
        .map(|(index, level)| {
            let overview = index == last;
            let source = if overview { &context.wgs84 } else { &members.wgs84 };
            frame_level(*level, overview, source)
        })
        .collect())
}

/// Frames a single extent at one level.
#[must_use]
pub fn frame_level(level: Level, overview: bool, bounds: &BoundingBox) -> Framing {
    let extent = padded_extent(bounds);
    let (x, y) = extent.center();
    let center = Coord::new(y, x);
    let fits = fits(&extent, &level);

    if !fits {
        log::warn!(
            "Extent {:.5}..{:.5}, {:.5}..{:.5} does not fit at {}; markers may be clipped",
            extent.min_x,
            extent.max_x,
            extent.min_y,
            extent.max_y,
            level.elevation
        );
    }

    Framing {
        level,
        overview,
        center,
        extent,
        fits,
    }
}

/// Pads each axis on its own: a zero-span axis gets the default half-span.
fn padded_extent(bounds: &BoundingBox) -> BoundingBox {
    let (x, y) = bounds.center();
    BoundingBox::around(x, y, padded_half(bounds.width()), padded_half(bounds.height()))
}

fn padded_half(span: f64) -> f64 {
    if span <= f64::EPSILON {
        DEFAULT_HALF_SPAN_DEGREES
    } else {
        span / 2.0 + span * PADDING
    }
}

/// Whether a WGS84 extent fits inside the ground span of `level`.
#[must_use]
pub fn fits(extent: &BoundingBox, level: &Level) -> bool {
    let (_, lat) = extent.center();
    let width_m = extent.width() * METRES_PER_DEGREE_LNG_AT_EQUATOR * lat.to_radians().cos();
    let height_m = extent.height() * METRES_PER_DEGREE_LAT;
    let (span_w, span_h) = level.ground_span();
    width_m <= span_w && height_m <= span_h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(scale: u32) -> Level {
        Level {
            elevation: Elevation(scale),
            width: 2000,
            height: 1500,
            dpi: 300,
        }
    }

    fn ladder() -> Vec<Level> {
        vec![level(1750), level(5000), level(10_000)]
    }

    fn records() -> Vec<LocationRecord> {
        vec![
            LocationRecord::new(1, 52.330, -0.180),
            LocationRecord::new(2, 52.332, -0.184),
            LocationRecord::new(3, 52.331, -0.181),
        ]
    }

    #[test]
    fn one_framing_per_level_with_last_as_overview() {
        let locations = records();
        let context = Bounds::of(&locations).unwrap();
        let framings = frame(&locations, &ladder(), &context).unwrap();
        assert_eq!(framings.len(), 3);
        assert_eq!(
            framings.iter().map(|f| f.overview).collect::<Vec<_>>(),
            vec![false, false, true]
        );
        assert_eq!(framings[1].level.elevation, Elevation(5000));
    }

    #[test]
    fn detail_extent_contains_every_member_with_symmetric_padding() {
        let locations = records();
        let context = Bounds::of(&locations).unwrap();
        let bbox = context.wgs84;
        let framing = frame(&locations, &ladder(), &context).unwrap()[0];

        for location in &locations {
            assert!(framing.extent.contains(location.position.lng, location.position.lat));
        }
        let left = bbox.min_x - framing.extent.min_x;
        let right = framing.extent.max_x - bbox.max_x;
        assert!((left - right).abs() < 1e-12);
        assert!((left - bbox.width() * PADDING).abs() < 1e-12);
    }

    #[test]
    fn single_location_uses_default_extent() {
        let location = LocationRecord::new(1, 52.33, -0.18);
        let context = Bounds::of(std::slice::from_ref(&location)).unwrap();
        let framing = frame(&[location], &ladder(), &context).unwrap()[0];

        assert!(!framing.extent.is_degenerate());
        assert!((framing.extent.width() - 2.0 * DEFAULT_HALF_SPAN_DEGREES).abs() < 1e-12);
        assert!((framing.center.lat - 52.33).abs() < 1e-12);
        assert!((framing.center.lng + 0.18).abs() < 1e-12);
    }

    #[test]
    fn members_on_one_street_are_padded_along_it() {
        let locations = vec![
            LocationRecord::new(1, 52.33, -0.20),
            LocationRecord::new(2, 52.33, -0.10),
        ];
        let context = Bounds::of(&locations).unwrap();
        let framing = frame(&locations, &ladder(), &context).unwrap()[0];

        assert!((framing.extent.min_x - (-0.21)).abs() < 1e-9);
        assert!((framing.extent.max_x - (-0.09)).abs() < 1e-9);
        assert!((framing.extent.height() - 2.0 * DEFAULT_HALF_SPAN_DEGREES).abs() < 1e-12);
        for location in &locations {
            let inset = (location.position.lng - framing.extent.min_x)
                .min(framing.extent.max_x - location.position.lng);
            assert!(inset > 0.005, "marker on the edge: {inset}");
        }
    }

    #[test]
    fn topmost_frames_the_run_context() {
        let locations = records();
        let far = LocationRecord::new(9, 52.40, -0.30);
        let mut everyone = locations.clone();
        everyone.push(far);
        let context = Bounds::of(&everyone).unwrap();

        let framings = frame(&locations, &ladder(), &context).unwrap();
        let overview = framings.last().unwrap();
        assert!(overview.extent.contains(-0.30, 52.40));
        assert!(!framings[0].extent.contains(-0.30, 52.40));
    }

    #[test]
    fn empty_group_is_an_error() {
        let context = Bounds::of(&records()).unwrap();
        assert!(matches!(
            frame(&[], &ladder(), &context),
            Err(FramingError::EmptyGroup)
        ));
    }

    #[test]
    fn wide_extent_does_not_fit_tight_level() {
        let wide = BoundingBox::around(-0.18, 52.33, 0.5, 0.5);
        assert!(!fits(&wide, &level(1750)));
        let tight = BoundingBox::around(-0.18, 52.33, 0.001, 0.001);
        assert!(fits(&tight, &level(10_000)));
    }
}
