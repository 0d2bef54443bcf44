pub mod bbox;
pub mod osm;

/// Convert degrees to the E7 fixed point representation used throughout the storage.
pub fn degrees_to_e7(degrees: f64) -> i32 {
    (degrees * 1e7).round() as i32
}

pub fn e7_to_degrees(value: i32) -> f64 {
    f64::from(value) / 1e7
}

/// Everything one parse produced: the entities plus the region they cover, if known.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone)]
pub struct OsmBatch {
    pub elements: Vec<osm::Element>,
    pub bounds: Option<bbox::BoundingBox>,
}
