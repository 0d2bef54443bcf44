use log::debug;

use crate::{data::{degrees_to_e7, osm::MAX_LON_E7}, errors::StorageError};

/// Latitude limit of the web mercator projection, E7.
pub const MAX_MERCATOR_LAT_E7: i32 = 850_511_287;

/// Axis aligned rectangle in E7 coordinates. Left/right are longitudes, bottom/top latitudes.
/// Zero width or height is allowed.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    left: i32,
    bottom: i32,
    right: i32,
    top: i32,
}

impl BoundingBox {
    pub fn new(left: i32, bottom: i32, right: i32, top: i32) -> Result<Self, StorageError> {
        if left > right || bottom > top {
            return Err(StorageError::InvalidBox { left, bottom, right, top });
        }
        Ok(BoundingBox { left, bottom, right, top })
    }

    pub fn from_degrees(left: f64, bottom: f64, right: f64, top: f64) -> Result<Self, StorageError> {
        Self::new(degrees_to_e7(left), degrees_to_e7(bottom), degrees_to_e7(right), degrees_to_e7(top))
    }

    /// Degenerate box covering a single position.
    pub fn from_point(lat: i32, lon: i32) -> Self {
        BoundingBox { left: lon, bottom: lat, right: lon, top: lat }
    }

    pub fn world() -> Self {
        BoundingBox {
            left: -MAX_LON_E7,
            bottom: -MAX_MERCATOR_LAT_E7,
            right: MAX_LON_E7,
            top: MAX_MERCATOR_LAT_E7,
        }
    }

    pub fn left(&self) -> i32 {
        self.left
    }

    pub fn bottom(&self) -> i32 {
        self.bottom
    }

    pub fn right(&self) -> i32 {
        self.right
    }

    pub fn top(&self) -> i32 {
        self.top
    }

    pub fn width(&self) -> i64 {
        i64::from(self.right) - i64::from(self.left)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.top) - i64::from(self.bottom)
    }

    /// Inclusive of the boundary.
    pub fn contains_point(&self, lat: i32, lon: i32) -> bool {
        self.left <= lon && lon <= self.right && self.bottom <= lat && lat <= self.top
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.left <= other.left && other.right <= self.right && self.bottom <= other.bottom && other.top <= self.top
    }

    /// Touching edges count as intersecting.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.left <= other.right && other.left <= self.right && self.bottom <= other.top && other.bottom <= self.top
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            left: self.left.min(other.left),
            bottom: self.bottom.min(other.bottom),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
        }
    }

    pub fn include_point(&mut self, lat: i32, lon: i32) {
        self.left = self.left.min(lon);
        self.bottom = self.bottom.min(lat);
        self.right = self.right.max(lon);
        self.top = self.top.max(lat);
    }

    /// Grow by `dx` horizontally and `dy` vertically on every side, saturating at the i32 range.
    pub fn expanded(&self, dx: i64, dy: i64) -> BoundingBox {
        let clamp = |value: i64| value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        BoundingBox {
            left: clamp(i64::from(self.left) - dx),
            bottom: clamp(i64::from(self.bottom) - dy),
            right: clamp(i64::from(self.right) + dx),
            top: clamp(i64::from(self.top) + dy),
        }
    }
}

/// Regions whose data has been completely downloaded, oldest first.
#[derive(Debug, Clone, Default)]
pub struct BoundingBoxRegistry {
    boxes: Vec<BoundingBox>,
}

impl BoundingBoxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a downloaded region. An identical box already present is moved to the end so
    /// that it becomes the most recent one, returns false in that case.
    pub fn add(&mut self, bbox: BoundingBox) -> bool {
        let existed = self.remove_exact(&bbox);
        self.boxes.push(bbox);
        debug!(boxes = self.boxes.len(), existed = existed; "Registered bounding box");
        !existed
    }

    /// Exact match removal; unknown boxes are ignored.
    pub fn delete(&mut self, bbox: &BoundingBox) -> bool {
        let removed = self.remove_exact(bbox);
        if removed {
            debug!(boxes = self.boxes.len(); "Deleted bounding box");
        }
        removed
    }

    fn remove_exact(&mut self, bbox: &BoundingBox) -> bool {
        match self.boxes.iter().position(|candidate| candidate == bbox) {
            Some(idx) => {
                self.boxes.remove(idx);
                true
            },
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.boxes.clear();
    }

    /// Most recently added box, the world when nothing was downloaded.
    pub fn last_box(&self) -> BoundingBox {
        self.boxes.last().copied().unwrap_or_else(BoundingBox::world)
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn union(&self) -> Option<BoundingBox> {
        let mut iter = self.boxes.iter();
        let first = *iter.next()?;
        Some(iter.fold(first, |acc, bbox| acc.union(bbox)))
    }

    pub fn covers_point(&self, lat: i32, lon: i32) -> bool {
        self.boxes.iter().any(|bbox| bbox.contains_point(lat, lon))
    }

    /// True if a single registered box contains `bbox` completely.
    pub fn covers(&self, bbox: &BoundingBox) -> bool {
        self.boxes.iter().any(|candidate| candidate.contains(bbox))
    }
}
