//! Marker colours.
//!
//! A [`Palette`] holds perceptually distinct pastel colours; a
//! [`ColorScheme`] ties each page-producing group to one of them.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uprn_maps_grouping::Grouping;
use uprn_maps_models::{GroupKey, MarkerColor};

/// Blend factor towards white for generated colours.
pub const PASTEL_FACTOR: f64 = 0.9;

/// Random candidates tried per palette entry.
const CANDIDATES: usize = 100;

/// Offset subtracted from the red and green channels of a fill colour to
/// get its outline. Blue is kept.
const OUTLINE_DARKEN: u8 = 45;

/// Seed for palette generation, fixed so reruns produce the same colours.
const SEED: u64 = 0x5550_524E;

/// Pastel fill colours with darker outlines, sorted by hue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<MarkerColor>,
}

impl Palette {
    /// Generates `n` distinct colours.
    ///
    /// Each new colour is the candidate with the largest minimum distance to
    /// the colours chosen so far.
    #[must_use]
    pub fn generate(n: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut chosen: Vec<[f64; 3]> = Vec::with_capacity(n);

        for _ in 0..n {
            let mut best: Option<([f64; 3], f64)> = None;
            for _ in 0..CANDIDATES {
                let candidate = random_pastel(&mut rng);
                let Some(distance) = chosen
                    .iter()
                    .map(|c| distance(&candidate, c))
                    .min_by(f64::total_cmp)
                else {
                    best = Some((candidate, f64::INFINITY));
                    break;
                };
                if best.is_none_or(|(_, d)| distance > d) {
                    best = Some((candidate, distance));
                }
            }
            if let Some((color, _)) = best {
                chosen.push(color);
            }
        }

        let mut colors: Vec<MarkerColor> = chosen.iter().map(to_marker_color).collect();
        colors.sort_by(|a, b| hue(a.fill).total_cmp(&hue(b.fill)));
        Self { colors }
    }

    /// Number of colours.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Whether the palette is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Colour at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<MarkerColor> {
        self.colors.get(index).copied()
    }

    /// All colours in hue order.
    #[must_use]
    pub fn colors(&self) -> &[MarkerColor] {
        &self.colors
    }
}

fn random_pastel(rng: &mut StdRng) -> [f64; 3] {
    let mut channel = || (rng.gen_range(0.0..1.0) + PASTEL_FACTOR) / (1.0 + PASTEL_FACTOR);
    [channel(), channel(), channel()]
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_marker_color(rgb: &[f64; 3]) -> MarkerColor {
    let fill = rgb.map(|c| (c * 255.0).clamp(0.0, 255.0) as u8);
    let [r, g, b] = fill;
    MarkerColor {
        fill: [r, g, b, 255],
        outline: [
            r.saturating_sub(OUTLINE_DARKEN),
            g.saturating_sub(OUTLINE_DARKEN),
            b,
            255,
        ],
    }
}

/// Hue in degrees `[0, 360)`.
fn hue(rgba: [u8; 4]) -> f64 {
    let [r, g, b] = [rgba[0], rgba[1], rgba[2]].map(|c| f64::from(c) / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if delta <= f64::EPSILON {
        return 0.0;
    }
    let h = if (max - r).abs() <= f64::EPSILON {
        ((g - b) / delta).rem_euclid(6.0)
    } else if (max - g).abs() <= f64::EPSILON {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    h * 60.0
}

/// Palette plus the assignment of page-producing groups to palette
/// entries.
///
/// Assignment follows group key order, so the same grouping always gets
/// the same colours. Noise uses [`MarkerColor::NOISE`].
#[derive(Debug, Clone)]
pub struct ColorScheme {
    palette: Palette,
    assignment: BTreeMap<GroupKey, usize>,
}

impl ColorScheme {
    /// Builds a scheme for every page-producing group in `grouping`.
    #[must_use]
    pub fn for_grouping(grouping: &Grouping) -> Self {
        Self::for_keys(grouping.keys())
    }

    /// Builds a scheme for the given keys; keys without a page are skipped.
    pub fn for_keys<'a>(keys: impl IntoIterator<Item = &'a GroupKey>) -> Self {
        let mut page_keys: Vec<GroupKey> = keys.into_iter().filter(|k| k.has_page()).cloned().collect();
        page_keys.sort();
        page_keys.dedup();

        let palette = Palette::generate(page_keys.len());
        let assignment = page_keys
            .into_iter()
            .enumerate()
            .map(|(index, key)| (key, index))
            .collect();

        Self {
            palette,
            assignment,
        }
    }

    /// Palette index for `key`, or `None` for noise and unknown keys.
    #[must_use]
    pub fn index_of(&self, key: &GroupKey) -> Option<usize> {
        self.assignment.get(key).copied()
    }

    /// Colours for `key`.
    #[must_use]
    pub fn color_of(&self, key: &GroupKey) -> MarkerColor {
        self.index_of(key)
            .and_then(|index| self.palette.get(index))
            .unwrap_or(MarkerColor::NOISE)
    }

    /// The underlying palette.
    #[must_use]
    pub const fn palette(&self) -> &Palette {
        &self.palette
    }
}
