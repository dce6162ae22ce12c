//! Map requests and the tiles they resolve to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{BoundingBox, Coord, GroupKey, ProjectedCoord};

/// A map elevation expressed as a scale denominator (1:N).
///
/// Higher elevations are wider and less detailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Elevation(pub u32);

impl Elevation {
    /// The scale denominator.
    #[must_use]
    pub const fn scale(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Elevation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1:{}", self.0)
    }
}

/// RGBA fill and outline colours for a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerColor {
    /// Fill colour.
    pub fill: [u8; 4],
    /// Outline colour.
    pub outline: [u8; 4],
}

impl MarkerColor {
    /// Colour used for density noise markers.
    pub const NOISE: Self = Self {
        fill: [0, 0, 0, 255],
        outline: [255, 255, 255, 255],
    };

    /// Fill colour as a `rrggbb` hex string.
    #[must_use]
    pub fn fill_hex(&self) -> String {
        format!("{:02x}{:02x}{:02x}", self.fill[0], self.fill[1], self.fill[2])
    }
}

/// Marker size and outline width for one elevation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerStyle {
    /// Marker diameter in points.
    pub size: f64,
    /// Outline width in points.
    pub outline_width: f64,
}

/// One point drawn on a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// UPRN of the location this marker represents.
    pub uprn: u64,
    /// WGS84 position.
    pub position: Coord,
    /// British National Grid position, if known.
    pub projected: Option<ProjectedCoord>,
    /// Label text (UPRN or address line).
    pub label: String,
    /// Palette index, or `None` for noise.
    pub color_index: Option<usize>,
    /// Resolved colours.
    pub color: MarkerColor,
    /// Round-category glyph for round-diff groups.
    pub glyph: Option<char>,
}

/// A renderable map view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapRequest {
    /// Group this request belongs to (`None` for the run-level overview).
    pub key: Option<GroupKey>,
    /// Elevation of this view.
    pub elevation: Elevation,
    /// Whether this is an overview-level view framing every group.
    pub overview: bool,
    /// Centre of the view.
    pub center: Coord,
    /// WGS84 extent (`x` = longitude, `y` = latitude).
    pub extent: BoundingBox,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output resolution.
    pub dpi: u32,
    /// Marker styling for this elevation.
    pub style: MarkerStyle,
    /// Markers in draw order.
    pub markers: Vec<Marker>,
}

impl MapRequest {
    /// Short description used in log lines and error context.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.key {
            Some(key) => format!("{key} @ {}", self.elevation),
            None => format!("overview @ {}", self.elevation),
        }
    }
}

/// Raster bytes returned by the rendering service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTile {
    /// Group of the originating request (`None` for the run-level overview).
    pub key: Option<GroupKey>,
    /// Elevation of the originating request.
    pub elevation: Elevation,
    /// Requested width in pixels.
    pub width: u32,
    /// Requested height in pixels.
    pub height: u32,
    /// Encoded image (JPEG or PNG).
    pub bytes: Vec<u8>,
}

impl RenderedTile {
    /// Creates a tile from the request it answers.
    #[must_use]
    pub fn for_request(request: &MapRequest, bytes: Vec<u8>) -> Self {
        Self {
            key: request.key.clone(),
            elevation: request.elevation,
            width: request.width,
            height: request.height,
            bytes,
        }
    }
}
