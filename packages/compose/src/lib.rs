#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Page composition.
//!
//! [`compose_page`] pastes rendered tiles onto a page canvas at the slots
//! of a [`PageTemplate`]. [`finalize`] orders pages into a [`Document`]:
//! the overview page first, then group pages in group key order. A
//! [`DocumentWriter`] encodes the result; [`pdf::PdfWriter`] is the one
//! used by the CLI.

pub mod pdf;

use std::path::PathBuf;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use uprn_maps_models::{Elevation, GroupKey, RenderedTile};

pub use pdf::PdfWriter;

/// Errors from page composition and document encoding.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    /// A tile could not be decoded as an image.
    #[error("Failed to decode tile at {level}: {source}")]
    Decode {
        /// Elevation of the tile.
        level: Elevation,
        /// Decoder error.
        source: image::ImageError,
    },

    /// A tile has no slot on the page template.
    #[error("Page template has no slot for elevation {0}")]
    NoSlot(Elevation),

    /// The document could not be encoded.
    #[error("PDF encoding failed: {0}")]
    Pdf(String),

    /// The document could not be written.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Output path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// What a page shows. Ordering is document order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PageKind {
    /// The run-level overview of every group.
    Overview,
    /// One group.
    Group(GroupKey),
}

/// Where a tile of one elevation goes, in pixels from the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Elevation of the tile placed here.
    pub elevation: Elevation,
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

/// Title baseline position (pixels from the top-left) and size in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TitlePlacement {
    /// Left edge.
    pub x: u32,
    /// Baseline.
    pub y: u32,
    /// Font size in points.
    pub size: f64,
}

/// Page size, resolution, and slot layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PageTemplate {
    /// Page width in pixels.
    pub width: u32,
    /// Page height in pixels.
    pub height: u32,
    /// Page resolution.
    pub dpi: u32,
    /// Title placement.
    pub title: TitlePlacement,
    /// Tile slots.
    pub slots: Vec<Slot>,
}

impl PageTemplate {
    fn slot_for(&self, elevation: Elevation) -> Option<&Slot> {
        self.slots.iter().find(|s| s.elevation == elevation)
    }
}

/// One composed page.
#[derive(Debug, Clone)]
pub struct Page {
    /// What the page shows.
    pub kind: PageKind,
    /// Page heading.
    pub title: String,
    /// Composited raster.
    pub canvas: RgbImage,
    /// Raster resolution.
    pub dpi: u32,
    /// Title placement.
    pub title_placement: TitlePlacement,
}

/// Pages in final order.
#[derive(Debug, Clone)]
pub struct Document {
    /// Document title.
    pub title: String,
    /// Pages, overview first.
    pub pages: Vec<Page>,
}

/// Encodes a finished document.
pub trait DocumentWriter: Send + Sync {
    /// Writes `document` to its destination, consuming its pages.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError`] if encoding or writing fails.
    fn write(&self, document: Document) -> Result<(), ComposeError>;
}

/// Places each tile at its template slot, resizing to the slot when the
/// tile's dimensions differ.
///
/// # Errors
///
/// Returns [`ComposeError::Decode`] if a tile is not a decodable image, or
/// [`ComposeError::NoSlot`] if the template has no slot for a tile.
pub fn compose_page(
    kind: PageKind,
    title: &str,
    tiles: Vec<RenderedTile>,
    template: &PageTemplate,
) -> Result<Page, ComposeError> {
    let mut canvas = RgbImage::from_pixel(template.width, template.height, Rgb([255, 255, 255]));

    for tile in tiles {
        let slot = template
            .slot_for(tile.elevation)
            .ok_or(ComposeError::NoSlot(tile.elevation))?;

        let decoded = image::load_from_memory(&tile.bytes)
            .map_err(|e| ComposeError::Decode {
                level: tile.elevation,
                source: e,
            })?
            .to_rgb8();

        let placed = if decoded.dimensions() == (slot.width, slot.height) {
            decoded
        } else {
            log::debug!(
                "Resizing {}x{} tile to {}x{} slot",
                decoded.width(),
                decoded.height(),
                slot.width,
                slot.height
            );
            imageops::resize(&decoded, slot.width, slot.height, FilterType::Triangle)
        };

        imageops::overlay(&mut canvas, &placed, i64::from(slot.x), i64::from(slot.y));
    }

    Ok(Page {
        kind,
        title: title.to_owned(),
        canvas,
        dpi: template.dpi,
        title_placement: template.title,
    })
}

/// Orders pages: overview first, then group pages in key order.
#[must_use]
pub fn finalize(title: &str, mut pages: Vec<Page>) -> Document {
    pages.sort_by(|a, b| a.kind.cmp(&b.kind));
    Document {
        title: title.to_owned(),
        pages,
    }
}
