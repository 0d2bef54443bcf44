//! Uniform grid over the E7 coordinate space.
//!
//! Only nodes are gridded. Every node id lives in exactly one cell, derived from its position.
//! Ways are found through their member nodes: the index caches each way's envelope and keeps
//! track of the widest and tallest envelope so that a box query can be widened far enough to
//! reach at least one member node of every way whose envelope intersects the box.
//!
//! Ways spanning more than [`LARGE_WAY_CELLS`] cells (boundaries, coastlines, rivers) are kept
//! out of that widening. They sit in a separate set that queries test by envelope directly.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::data::{bbox::BoundingBox, osm::OsmId};

/// 0.01 degrees.
pub const DEFAULT_CELL_SIZE_E7: i32 = 100_000;

/// Envelope extent, in cells, above which a way is tested by envelope instead of through the grid.
pub const LARGE_WAY_CELLS: i64 = 4;

/// Grid cell coordinates: (column, row).
pub type CellKey = (i32, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub lat: i32,
    pub lon: i32,
}

pub struct SpatialIndex {
    cell_size: i32,
    cells: HashMap<CellKey, HashSet<OsmId>>,
    positions: HashMap<OsmId, Position>,
    way_envelopes: HashMap<OsmId, BoundingBox>,
    large_ways: HashSet<OsmId>,
    // extents of the ways not in `large_ways`
    widths: BTreeMap<i64, usize>,
    heights: BTreeMap<i64, usize>,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE_E7)
    }
}

impl SpatialIndex {
    /// Non positive cell sizes fall back to the default.
    pub fn new(cell_size: i32) -> Self {
        SpatialIndex {
            cell_size: if cell_size > 0 { cell_size } else { DEFAULT_CELL_SIZE_E7 },
            cells: HashMap::new(),
            positions: HashMap::new(),
            way_envelopes: HashMap::new(),
            large_ways: HashSet::new(),
            widths: BTreeMap::new(),
            heights: BTreeMap::new(),
        }
    }

    pub fn cell_of(&self, lat: i32, lon: i32) -> CellKey {
        (lon.div_euclid(self.cell_size), lat.div_euclid(self.cell_size))
    }

    /// Add a node or move it to a new position. Returns the previous position.
    pub fn insert_node(&mut self, id: OsmId, lat: i32, lon: i32) -> Option<Position> {
        let cell = self.cell_of(lat, lon);
        let previous = self.positions.insert(id, Position { lat, lon });
        if let Some(old) = previous {
            let old_cell = self.cell_of(old.lat, old.lon);
            if old_cell == cell {
                return previous;
            }
            self.remove_from_cell(old_cell, id);
        }
        self.cells.entry(cell).or_default().insert(id);
        previous
    }

    pub fn remove_node(&mut self, id: OsmId) -> Option<Position> {
        let position = self.positions.remove(&id)?;
        self.remove_from_cell(self.cell_of(position.lat, position.lon), id);
        Some(position)
    }

    fn remove_from_cell(&mut self, cell: CellKey, id: OsmId) {
        if let Some(ids) = self.cells.get_mut(&cell) {
            ids.remove(&id);
            if ids.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }

    pub fn position(&self, id: OsmId) -> Option<Position> {
        self.positions.get(&id).copied()
    }

    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Cells overlapping `bbox`. When the box spans more cells than are occupied the occupied
    /// cells are filtered instead of probing every one.
    fn candidate_cells(&self, bbox: &BoundingBox) -> Vec<&HashSet<OsmId>> {
        let (x0, y0) = self.cell_of(bbox.bottom(), bbox.left());
        let (x1, y1) = self.cell_of(bbox.top(), bbox.right());
        let span = (i64::from(x1) - i64::from(x0) + 1) * (i64::from(y1) - i64::from(y0) + 1);

        if span > self.cells.len() as i64 {
            self.cells
                .iter()
                .filter(|((x, y), _)| (x0..=x1).contains(x) && (y0..=y1).contains(y))
                .map(|(_, ids)| ids)
                .collect()
        } else {
            let mut result = Vec::new();
            for x in x0..=x1 {
                for y in y0..=y1 {
                    if let Some(ids) = self.cells.get(&(x, y)) {
                        result.push(ids);
                    }
                }
            }
            result
        }
    }

    /// Ids of all nodes inside `bbox`, boundary included. Unordered.
    pub fn node_ids_in(&self, bbox: &BoundingBox) -> Vec<OsmId> {
        let mut result = Vec::new();
        for ids in self.candidate_cells(bbox) {
            for id in ids {
                if let Some(position) = self.positions.get(id) {
                    if bbox.contains_point(position.lat, position.lon) {
                        result.push(*id);
                    }
                }
            }
        }
        result
    }

    /// Envelope of the resolvable positions among `members`.
    pub fn envelope_of(&self, members: &[OsmId]) -> Option<BoundingBox> {
        let mut positions = members.iter().filter_map(|id| self.positions.get(id));
        let first = positions.next()?;
        let mut envelope = BoundingBox::from_point(first.lat, first.lon);
        for position in positions {
            envelope.include_point(position.lat, position.lon);
        }
        Some(envelope)
    }

    /// Envelope over every gridded node.
    pub fn data_envelope(&self) -> Option<BoundingBox> {
        let mut positions = self.positions.values();
        let first = positions.next()?;
        let mut envelope = BoundingBox::from_point(first.lat, first.lon);
        for position in positions {
            envelope.include_point(position.lat, position.lon);
        }
        Some(envelope)
    }

    /// Recompute the cached envelope of a way from its current members.
    pub fn update_way(&mut self, id: OsmId, members: &[OsmId]) {
        let envelope = self.envelope_of(members);
        self.set_way_envelope(id, envelope);
    }

    pub fn remove_way(&mut self, id: OsmId) {
        self.set_way_envelope(id, None);
    }

    fn set_way_envelope(&mut self, id: OsmId, envelope: Option<BoundingBox>) {
        let previous = match envelope {
            Some(envelope) => self.way_envelopes.insert(id, envelope),
            None => self.way_envelopes.remove(&id),
        };
        if let Some(previous) = previous {
            if !self.large_ways.remove(&id) {
                release(&mut self.widths, previous.width());
                release(&mut self.heights, previous.height());
            }
        }
        if let Some(envelope) = envelope {
            if self.is_large(&envelope) {
                self.large_ways.insert(id);
            } else {
                *self.widths.entry(envelope.width()).or_default() += 1;
                *self.heights.entry(envelope.height()).or_default() += 1;
            }
        }
    }

    fn is_large(&self, envelope: &BoundingBox) -> bool {
        let limit = LARGE_WAY_CELLS * i64::from(self.cell_size);
        envelope.width() > limit || envelope.height() > limit
    }

    /// Cached envelope, absent for ways without any resolvable node.
    pub fn way_envelope(&self, id: OsmId) -> Option<BoundingBox> {
        self.way_envelopes.get(&id).copied()
    }

    /// `bbox` widened by the largest extent among grid-reachable ways: any such way whose
    /// envelope intersects `bbox` has a member node inside the returned box. Large ways are
    /// found through [`SpatialIndex::large_ways_in`] instead.
    pub fn way_search_box(&self, bbox: &BoundingBox) -> BoundingBox {
        let dx = self.widths.keys().next_back().copied().unwrap_or(0);
        let dy = self.heights.keys().next_back().copied().unwrap_or(0);
        bbox.expanded(dx, dy)
    }

    /// Large ways whose envelope intersects `bbox`. Unordered.
    pub fn large_ways_in<'a>(&'a self, bbox: &'a BoundingBox) -> impl Iterator<Item = OsmId> + 'a {
        self.large_ways
            .iter()
            .copied()
            .filter(|id| self.way_envelopes.get(id).is_some_and(|envelope| envelope.intersects(bbox)))
    }

    pub fn rehash_node(&mut self, old: OsmId, new: OsmId) {
        if let Some(position) = self.positions.remove(&old) {
            let cell = self.cell_of(position.lat, position.lon);
            self.remove_from_cell(cell, old);
            self.positions.insert(new, position);
            self.cells.entry(cell).or_default().insert(new);
        }
    }

    pub fn rehash_way(&mut self, old: OsmId, new: OsmId) {
        if let Some(envelope) = self.way_envelopes.remove(&old) {
            self.way_envelopes.insert(new, envelope);
        }
        if self.large_ways.remove(&old) {
            self.large_ways.insert(new);
        }
    }

    /// Every node id in the grid with the cell it is filed under, for integrity checks.
    pub(crate) fn cell_entries(&self) -> impl Iterator<Item = (CellKey, OsmId)> + '_ {
        self.cells.iter().flat_map(|(cell, ids)| ids.iter().map(move |id| (*cell, *id)))
    }

    pub(crate) fn way_ids(&self) -> impl Iterator<Item = OsmId> + '_ {
        self.way_envelopes.keys().copied()
    }

    /// Ways whose classification disagrees with their cached envelope.
    pub(crate) fn misclassified_ways(&self) -> Vec<OsmId> {
        let mut wrong: Vec<OsmId> = self
            .way_envelopes
            .iter()
            .filter(|(id, envelope)| self.is_large(envelope) != self.large_ways.contains(*id))
            .map(|(id, _)| *id)
            .collect();
        wrong.extend(self.large_ways.iter().filter(|id| !self.way_envelopes.contains_key(*id)));
        wrong
    }
}

fn release(counts: &mut BTreeMap<i64, usize>, value: i64) {
    if let Some(count) = counts.get_mut(&value) {
        *count -= 1;
        if *count == 0 {
            counts.remove(&value);
        }
    }
}
