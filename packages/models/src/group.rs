//! Group keys, groups, and their derived bounds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{LocationRecord, RoundCategory};

/// An axis-aligned rectangle.
///
/// `x` is longitude (or easting) and `y` is latitude (or northing).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum x.
    pub min_x: f64,
    /// Minimum y.
    pub min_y: f64,
    /// Maximum x.
    pub max_x: f64,
    /// Maximum y.
    pub max_y: f64,
}

impl BoundingBox {
    /// Builds the minimal box containing every point, or `None` for an
    /// empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        let mut iter = points.into_iter();
        let (x, y) = iter.next()?;
        let mut bbox = Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        };
        for (x, y) in iter {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        Some(bbox)
    }

    /// A box of the given half-extents centred on `(x, y)`.
    #[must_use]
    pub fn around(x: f64, y: f64, half_width: f64, half_height: f64) -> Self {
        Self {
            min_x: x - half_width,
            min_y: y - half_height,
            max_x: x + half_width,
            max_y: y + half_height,
        }
    }

    /// Smallest box containing both boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grows the box by `fraction` of its span on every side.
    #[must_use]
    pub fn padded(&self, fraction: f64) -> Self {
        let dx = self.width() * fraction;
        let dy = self.height() * fraction;
        Self {
            min_x: self.min_x - dx,
            min_y: self.min_y - dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    /// Whether `(x, y)` lies inside or on the edge of the box.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Span along x.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Span along y.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Centre point as `(x, y)`.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            f64::midpoint(self.min_x, self.max_x),
            f64::midpoint(self.min_y, self.max_y),
        )
    }

    /// Whether the box has zero area.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.width() <= f64::EPSILON || self.height() <= f64::EPSILON
    }
}

/// Bounds of a group in both coordinate systems.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// WGS84 bounds (`x` = longitude, `y` = latitude).
    pub wgs84: BoundingBox,
    /// British National Grid bounds, present only when every member has a
    /// projected coordinate.
    pub projected: Option<BoundingBox>,
}

impl Bounds {
    /// Computes bounds over `records`, or `None` when empty.
    #[must_use]
    pub fn of(records: &[LocationRecord]) -> Option<Self> {
        let wgs84 = BoundingBox::from_points(records.iter().map(|r| (r.position.lng, r.position.lat)))?;
        let projected = records
            .iter()
            .map(|r| r.projected.map(|p| (p.x, p.y)))
            .collect::<Option<Vec<_>>>()
            .and_then(BoundingBox::from_points);
        Some(Self { wgs84, projected })
    }

    /// Combined bounds of both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            wgs84: self.wgs84.union(&other.wgs84),
            projected: match (self.projected, other.projected) {
                (Some(a), Some(b)) => Some(a.union(&b)),
                _ => None,
            },
        }
    }
}

/// Key identifying a group within one grouping run.
///
/// Ordering is the page order of the final document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum GroupKey {
    /// Normalized postcode.
    Postcode(String),
    /// Locations without a usable postcode.
    Unassigned,
    /// DBSCAN cluster label.
    Cluster(usize),
    /// DBSCAN noise (and locations without projected coordinates).
    Noise,
    /// Locations whose round changed for this category.
    Round(RoundCategory),
}

impl GroupKey {
    /// Whether groups under this key get their own page.
    #[must_use]
    pub const fn has_page(&self) -> bool {
        !matches!(self, Self::Noise)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postcode(postcode) => f.write_str(postcode),
            Self::Unassigned => f.write_str("unassigned"),
            Self::Cluster(label) => write!(f, "cluster-{label}"),
            Self::Noise => f.write_str("noise"),
            Self::Round(category) => write!(f, "{category}"),
        }
    }
}

/// A non-empty set of locations sharing a key.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    key: GroupKey,
    members: Vec<LocationRecord>,
    bounds: Bounds,
}

impl Group {
    /// Creates a group, computing its bounds. Returns `None` when
    /// `members` is empty.
    #[must_use]
    pub fn new(key: GroupKey, members: Vec<LocationRecord>) -> Option<Self> {
        let bounds = Bounds::of(&members)?;
        Some(Self {
            key,
            members,
            bounds,
        })
    }

    /// The group key.
    #[must_use]
    pub const fn key(&self) -> &GroupKey {
        &self.key
    }

    /// Members in source order.
    #[must_use]
    pub fn members(&self) -> &[LocationRecord] {
        &self.members
    }

    /// Number of members (always at least one).
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false`; groups are never empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Bounds computed at construction.
    #[must_use]
    pub const fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Page title for this group.
    ///
    /// Postcode groups use the first member's street and town, matching a
    /// printed address heading.
    #[must_use]
    pub fn title(&self) -> String {
        match &self.key {
            GroupKey::Postcode(postcode) => {
                let first = &self.members[0];
                [first.street.as_str(), first.town.as_str(), postcode.as_str()]
                    .iter()
                    .filter(|s| !s.is_empty())
                    .copied()
                    .collect::<Vec<_>>()
                    .join(", ")
            }
            GroupKey::Unassigned => format!("No postcode ({} properties)", self.len()),
            GroupKey::Cluster(label) => {
                format!("Cluster {} ({} properties)", label + 1, self.len())
            }
            GroupKey::Noise => format!("Unclustered ({} properties)", self.len()),
            GroupKey::Round(category) => format!(
                "{} round changes ({} properties)",
                category.label(),
                self.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_contains_all_points() {
        let points = [(0.1, 52.0), (-0.3, 52.4), (0.2, 51.9)];
        let bbox = BoundingBox::from_points(points).unwrap();
        for (x, y) in points {
            assert!(bbox.contains(x, y));
        }
        assert!((bbox.width() - 0.5).abs() < 1e-12);
        assert!(BoundingBox::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn padding_is_symmetric() {
        let bbox = BoundingBox::from_points([(0.0, 0.0), (10.0, 4.0)]).unwrap();
        let padded = bbox.padded(0.1);
        assert!((bbox.min_x - padded.min_x - (padded.max_x - bbox.max_x)).abs() < 1e-12);
        assert!((bbox.min_y - padded.min_y - (padded.max_y - bbox.max_y)).abs() < 1e-12);
        assert_eq!(padded.center(), bbox.center());
    }

    #[test]
    fn projected_bounds_need_every_member() {
        let with = LocationRecord::new(1, 52.0, 0.0).with_projected(500_000.0, 250_000.0);
        let without = LocationRecord::new(2, 52.1, 0.1);
        assert!(Bounds::of(&[with.clone()]).unwrap().projected.is_some());
        assert!(Bounds::of(&[with, without]).unwrap().projected.is_none());
    }

    #[test]
    fn empty_group_is_rejected() {
        assert!(Group::new(GroupKey::Unassigned, Vec::new()).is_none());
    }

    #[test]
    fn keys_sort_in_page_order() {
        let mut keys = vec![
            GroupKey::Postcode("AB2".to_owned()),
            GroupKey::Unassigned,
            GroupKey::Postcode("AB1".to_owned()),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                GroupKey::Postcode("AB1".to_owned()),
                GroupKey::Postcode("AB2".to_owned()),
                GroupKey::Unassigned,
            ]
        );
        assert!(GroupKey::Cluster(2) < GroupKey::Cluster(10));
        assert!(!GroupKey::Noise.has_page());
    }

    #[test]
    fn postcode_title_uses_first_member_address() {
        let group = Group::new(
            GroupKey::Postcode("AB1 2CD".to_owned()),
            vec![
                LocationRecord::new(1, 52.0, 0.0).with_address("1 High St", "High St", "Huntingdon"),
            ],
        )
        .unwrap();
        assert_eq!(group.title(), "High St, Huntingdon, AB1 2CD");
    }
}
