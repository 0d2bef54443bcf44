//! The combined storage: element maps plus every index derived from them.
//!
//! [`Storage`] is the only type allowed to mutate the element maps. Each public mutation
//! updates the spatial grid, the topology index and the element maps before it returns, so a
//! reader holding the [`SharedStorage`] lock never sees a half applied change.

pub mod diagnostics;
pub mod rehash;
pub mod spatial;
pub mod store;
pub mod topology;

use std::{
    collections::HashSet,
    mem,
    sync::{Arc, RwLock},
};

use crate::{
    data::{
        bbox::{BoundingBox, BoundingBoxRegistry},
        osm::{valid_position, Element, ElementKey, ElementKind, ElementRef, Node, OsmElement, OsmId, Relation, RelationMember, Tags, Way},
    },
    edit_result::{EditResult, Issue},
    errors::StorageError,
};

use self::{spatial::{Position, SpatialIndex}, store::ElementStore, topology::Topology};

/// Single writer, many readers.
pub type SharedStorage = Arc<RwLock<Storage>>;

#[derive(Default)]
pub struct Storage {
    store: ElementStore,
    spatial: SpatialIndex,
    topology: Topology,
    boxes: BoundingBoxRegistry,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cell_size(cell_size_e7: i32) -> Self {
        Storage {
            spatial: SpatialIndex::new(cell_size_e7),
            ..Self::default()
        }
    }

    pub fn into_shared(self) -> SharedStorage {
        Arc::new(RwLock::new(self))
    }

    pub fn get(&self, kind: ElementKind, id: OsmId) -> Option<ElementRef<'_>> {
        self.store.get(kind, id)
    }

    pub fn node(&self, id: OsmId) -> Option<&Node> {
        self.store.nodes.get(id)
    }

    pub fn way(&self, id: OsmId) -> Option<&Way> {
        self.store.ways.get(id)
    }

    pub fn relation(&self, id: OsmId) -> Option<&Relation> {
        self.store.relations.get(id)
    }

    pub fn contains(&self, key: ElementKey) -> bool {
        self.store.contains(key)
    }

    pub fn count(&self, kind: ElementKind) -> usize {
        self.store.count(kind)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn all_elements(&self) -> Vec<ElementRef<'_>> {
        self.store.all_elements()
    }

    pub fn way_nodes(&self) -> Vec<&Node> {
        self.store.way_nodes()
    }

    /// Add or overwrite an element and update every index. Returns the element previously
    /// stored under the same key.
    pub fn insert(&mut self, element: Element) -> Result<Option<Element>, StorageError> {
        match element {
            Element::Node(node) => Ok(self.insert_node(node)?.map(Element::Node)),
            Element::Way(way) => Ok(self.insert_way(way).map(Element::Way)),
            Element::Relation(relation) => Ok(self.insert_relation(relation).map(Element::Relation)),
        }
    }

    /// Like [`Storage::insert`] but refuses to overwrite.
    pub fn insert_new(&mut self, element: Element) -> Result<(), StorageError> {
        let key = element.key();
        if self.store.contains(key) {
            return Err(StorageError::DuplicateKey(key));
        }
        self.insert(element).map(|_| ())
    }

    fn insert_node(&mut self, node: Node) -> Result<Option<Node>, StorageError> {
        if !node.has_valid_position() {
            return Err(StorageError::InvalidCoordinate { lat: node.lat, lon: node.lon });
        }
        let (id, lat, lon) = (node.id, node.lat, node.lon);
        let previous = self.store.nodes.insert(id, node);
        let moved = self.spatial.insert_node(id, lat, lon) != Some(Position { lat, lon });
        if moved {
            self.refresh_ways_of(id);
        }
        Ok(previous)
    }

    fn insert_way(&mut self, way: Way) -> Option<Way> {
        let id = way.id;
        if let Some(old) = self.store.ways.get(id) {
            self.topology.remove_way(id, &old.nodes);
        }
        self.topology.add_way(id, &way.nodes);
        self.spatial.update_way(id, &way.nodes);
        self.store.ways.insert(id, way)
    }

    fn insert_relation(&mut self, relation: Relation) -> Option<Relation> {
        let id = relation.id;
        if let Some(old) = self.store.relations.get(id) {
            self.topology.remove_relation(id, &old.members);
        }
        self.topology.add_relation(id, &relation.members);
        self.store.relations.insert(id, relation)
    }

    /// Envelopes of the ways referencing `node` depend on its position and presence.
    fn refresh_ways_of(&mut self, node: OsmId) {
        for &way_id in self.topology.ways_for_node(node) {
            if let Some(way) = self.store.ways.get(way_id) {
                self.spatial.update_way(way_id, &way.nodes);
            }
        }
    }

    /// Remove an element and its index entries. Ways and relations that still list it keep
    /// their (now dangling) reference.
    pub fn remove(&mut self, kind: ElementKind, id: OsmId) -> Option<Element> {
        match kind {
            ElementKind::Node => {
                let node = self.store.nodes.remove(id)?;
                self.spatial.remove_node(id);
                self.refresh_ways_of(id);
                Some(Element::Node(node))
            },
            ElementKind::Way => {
                let way = self.store.ways.remove(id)?;
                self.topology.remove_way(id, &way.nodes);
                self.spatial.remove_way(id);
                Some(Element::Way(way))
            },
            ElementKind::Relation => {
                let relation = self.store.relations.remove(id)?;
                self.topology.remove_relation(id, &relation.members);
                Some(Element::Relation(relation))
            },
        }
    }

    /// Bulk load as done after parsing a file or a download response.
    pub fn ingest<I>(&mut self, elements: I, bounds: Option<BoundingBox>) -> Result<usize, StorageError>
    where
        I: IntoIterator<Item = Element>,
    {
        let mut count = 0;
        for element in elements {
            self.insert(element)?;
            count += 1;
        }
        if let Some(bounds) = bounds {
            self.boxes.add(bounds);
        }
        Ok(count)
    }

    pub fn set_node_position(&mut self, id: OsmId, lat: i32, lon: i32) -> Result<(), StorageError> {
        if !valid_position(lat, lon) {
            return Err(StorageError::InvalidCoordinate { lat, lon });
        }
        let node = self.store.nodes.get_mut(id).ok_or(StorageError::NotFound(ElementKey::node(id)))?;
        node.lat = lat;
        node.lon = lon;
        self.spatial.insert_node(id, lat, lon);
        self.refresh_ways_of(id);
        Ok(())
    }

    /// Replace the member list of a way, returning the old one.
    pub fn set_way_nodes(&mut self, id: OsmId, nodes: Vec<OsmId>) -> Result<Vec<OsmId>, StorageError> {
        let way = self.store.ways.get_mut(id).ok_or(StorageError::NotFound(ElementKey::way(id)))?;
        self.topology.remove_way(id, &way.nodes);
        self.topology.add_way(id, &nodes);
        self.spatial.update_way(id, &nodes);
        Ok(mem::replace(&mut way.nodes, nodes))
    }

    pub fn set_relation_members(&mut self, id: OsmId, members: Vec<RelationMember>) -> Result<Vec<RelationMember>, StorageError> {
        let relation = self.store.relations.get_mut(id).ok_or(StorageError::NotFound(ElementKey::relation(id)))?;
        self.topology.remove_relation(id, &relation.members);
        self.topology.add_relation(id, &members);
        Ok(mem::replace(&mut relation.members, members))
    }

    pub fn set_tags(&mut self, key: ElementKey, tags: Tags) -> Result<Tags, StorageError> {
        let slot = match key.kind {
            ElementKind::Node => self.store.nodes.get_mut(key.id).map(|node| &mut node.tags),
            ElementKind::Way => self.store.ways.get_mut(key.id).map(|way| &mut way.tags),
            ElementKind::Relation => self.store.relations.get_mut(key.id).map(|relation| &mut relation.tags),
        };
        let slot = slot.ok_or(StorageError::NotFound(key))?;
        Ok(mem::replace(slot, tags))
    }

    fn sorted_nodes(&self, ids: impl IntoIterator<Item = OsmId>) -> Vec<&Node> {
        let nodes = &self.store.nodes;
        let mut found: Vec<(u64, &Node)> = ids
            .into_iter()
            .filter_map(|id| Some((nodes.seq(id)?, nodes.get(id)?)))
            .collect();
        found.sort_unstable_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, node)| node).collect()
    }

    fn sorted_ways(&self, ids: impl IntoIterator<Item = OsmId>) -> Vec<&Way> {
        let ways = &self.store.ways;
        let mut found: Vec<(u64, &Way)> = ids
            .into_iter()
            .filter_map(|id| Some((ways.seq(id)?, ways.get(id)?)))
            .collect();
        found.sort_unstable_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, way)| way).collect()
    }

    /// Nodes inside `bbox`, boundary included, in insertion order.
    pub fn nodes_in(&self, bbox: &BoundingBox) -> Vec<&Node> {
        self.sorted_nodes(self.spatial.node_ids_in(bbox))
    }

    /// Ways whose envelope intersects `bbox`. Ways without any resident member node have no
    /// envelope and are never returned.
    pub fn ways_in(&self, bbox: &BoundingBox) -> Vec<&Way> {
        let search = self.spatial.way_search_box(bbox);
        let mut candidates: HashSet<OsmId> = HashSet::new();
        for node in self.spatial.node_ids_in(&search) {
            candidates.extend(self.topology.ways_for_node(node));
        }
        candidates.extend(self.spatial.large_ways_in(bbox));
        let hits = candidates
            .into_iter()
            .filter(|id| self.spatial.way_envelope(*id).is_some_and(|envelope| envelope.intersects(bbox)));
        self.sorted_ways(hits)
    }

    /// Ways whose member list contains `node`, in the order they were added to the storage.
    pub fn ways_using(&self, node: OsmId) -> Vec<&Way> {
        self.sorted_ways(self.topology.ways_for_node(node).iter().copied())
    }

    /// True if `node` is the first or last member of at least one way.
    pub fn is_end_node(&self, node: OsmId) -> bool {
        self.topology
            .ways_for_node(node)
            .iter()
            .filter_map(|id| self.store.ways.get(*id))
            .any(|way| way.is_end_node(node))
    }

    /// Relations listing `key` as a member, in the order they were added to the storage.
    pub fn relations_using(&self, key: ElementKey) -> Vec<&Relation> {
        let relations = &self.store.relations;
        let mut found: Vec<(u64, &Relation)> = self
            .topology
            .relations_for(key)
            .iter()
            .filter_map(|id| Some((relations.seq(*id)?, relations.get(*id)?)))
            .collect();
        found.sort_unstable_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, relation)| relation).collect()
    }

    pub fn way_envelope(&self, id: OsmId) -> Option<BoundingBox> {
        self.spatial.way_envelope(id)
    }

    /// Envelope of everything a relation contains, descending into member relations. Cycles and
    /// self references are visited once.
    pub fn relation_envelope(&self, id: OsmId) -> Option<BoundingBox> {
        let mut visited: HashSet<OsmId> = HashSet::new();
        let mut pending = vec![id];
        let mut envelope: Option<BoundingBox> = None;
        let mut include = |bbox: BoundingBox| {
            envelope = Some(match envelope {
                Some(current) => current.union(&bbox),
                None => bbox,
            });
        };

        while let Some(relation_id) = pending.pop() {
            if !visited.insert(relation_id) {
                continue;
            }
            let Some(relation) = self.store.relations.get(relation_id) else {
                continue;
            };
            for member in &relation.members {
                match member.key.kind {
                    ElementKind::Node => {
                        if let Some(position) = self.spatial.position(member.key.id) {
                            include(BoundingBox::from_point(position.lat, position.lon));
                        }
                    },
                    ElementKind::Way => {
                        if let Some(bbox) = self.spatial.way_envelope(member.key.id) {
                            include(bbox);
                        }
                    },
                    ElementKind::Relation => pending.push(member.key.id),
                }
            }
        }
        envelope
    }

    /// Report members of `key` that are not resident. `None` if `key` itself is unknown.
    pub fn check_references(&self, key: ElementKey) -> Option<EditResult<'_>> {
        let element = self.store.get(key.kind, key.id)?;
        let dangling = match element {
            ElementRef::Node(_) => false,
            ElementRef::Way(way) => way.nodes.iter().any(|id| !self.store.nodes.contains(*id)),
            ElementRef::Relation(relation) => relation.members.iter().any(|member| !self.store.contains(member.key)),
        };
        let mut result = EditResult::new(element);
        if dangling {
            result.add_issue(Issue::DanglingReference);
        }
        Some(result)
    }

    /// Smallest box containing every node.
    pub fn calc_bounding_box_from_data(&self) -> Result<BoundingBox, StorageError> {
        self.spatial.data_envelope().ok_or(StorageError::EmptyStore)
    }

    pub fn add_box(&mut self, bbox: BoundingBox) -> bool {
        self.boxes.add(bbox)
    }

    pub fn delete_box(&mut self, bbox: &BoundingBox) -> bool {
        self.boxes.delete(bbox)
    }

    pub fn clear_boxes(&mut self) {
        self.boxes.clear();
    }

    pub fn last_box(&self) -> BoundingBox {
        self.boxes.last_box()
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        self.boxes.boxes()
    }

    pub fn in_downloaded_area(&self, lat: i32, lon: i32) -> bool {
        self.boxes.covers_point(lat, lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> Storage {
        let mut storage = Storage::with_cell_size(1_000);
        storage.insert(Node::new(1, 0, 0).into()).unwrap();
        storage.insert(Node::new(2, 500, 500).into()).unwrap();
        storage.insert(Node::new(3, 5_000, 5_000).into()).unwrap();
        storage.insert(Way::new(10, vec![1, 2]).into()).unwrap();
        storage
    }

    fn bbox(left: i32, bottom: i32, right: i32, top: i32) -> BoundingBox {
        BoundingBox::new(left, bottom, right, top).unwrap()
    }

    fn ids<'a>(ways: Vec<&'a Way>) -> Vec<OsmId> {
        ways.into_iter().map(|way| way.id).collect()
    }

    #[test]
    fn rejects_out_of_range_node() {
        let mut storage = Storage::new();
        let err = storage.insert(Node::new(1, 900_000_001, 0).into()).unwrap_err();

        assert_eq!(err, StorageError::InvalidCoordinate { lat: 900_000_001, lon: 0 });
        assert!(storage.is_empty());
    }

    #[test]
    fn insert_new_refuses_existing_key() {
        let mut storage = storage();

        assert_eq!(
            storage.insert_new(Way::new(10, vec![3]).into()),
            Err(StorageError::DuplicateKey(ElementKey::way(10)))
        );
        assert_eq!(storage.way(10).unwrap().nodes, vec![1, 2]);
    }

    #[test]
    fn overwriting_way_updates_topology() {
        let mut storage = storage();
        let previous = storage.insert(Way::new(10, vec![2, 3]).into()).unwrap();

        assert_eq!(previous, Some(Element::Way(Way::new(10, vec![1, 2]))));
        assert!(storage.ways_using(1).is_empty());
        assert_eq!(ids(storage.ways_using(3)), vec![10]);
        assert!(storage.verify_integrity().is_empty());
    }

    #[test]
    fn ways_using_follows_insertion_order() {
        let mut storage = storage();
        storage.insert(Way::new(7, vec![2, 3]).into()).unwrap();
        storage.insert(Way::new(8, vec![3, 2]).into()).unwrap();

        assert_eq!(ids(storage.ways_using(2)), vec![10, 7, 8]);
        assert!(storage.is_end_node(2));
        assert!(!storage.is_end_node(99));
    }

    #[test]
    fn ways_in_finds_way_crossing_box_without_member_inside() {
        let mut storage = Storage::with_cell_size(100);
        storage.insert(Node::new(1, 500, -10_000).into()).unwrap();
        storage.insert(Node::new(2, 500, 10_000).into()).unwrap();
        storage.insert(Way::new(10, vec![1, 2]).into()).unwrap();

        let hit = storage.ways_in(&bbox(-100, 0, 100, 1_000));
        assert_eq!(ids(hit), vec![10]);
        assert!(storage.nodes_in(&bbox(-100, 0, 100, 1_000)).is_empty());
        assert!(storage.ways_in(&bbox(-100, 600, 100, 1_000)).is_empty());
    }

    #[test]
    fn ways_in_mixes_local_and_boundary_ways() {
        let mut storage = Storage::with_cell_size(100);
        for id in 0..50 {
            storage.insert(Node::new(id, 0, id as i32 * 100).into()).unwrap();
        }
        for id in 0..49 {
            storage.insert(Way::new(100 + id, vec![id, id + 1]).into()).unwrap();
        }
        storage.insert(Way::new(500, vec![0, 49]).into()).unwrap();

        assert_eq!(ids(storage.ways_in(&bbox(2_010, -10, 2_020, 10))), vec![120, 500]);
        assert!(storage.ways_in(&bbox(0, 100, 4_900, 200)).is_empty());
        assert!(storage.verify_integrity().is_empty());
    }

    #[test]
    fn ways_in_skips_ways_without_resident_nodes() {
        let mut storage = storage();
        storage.insert(Way::new(11, vec![41, 42]).into()).unwrap();

        assert_eq!(ids(storage.ways_in(&BoundingBox::world())), vec![10]);
    }

    #[test]
    fn moving_node_moves_way_envelope() {
        let mut storage = storage();
        storage.set_node_position(2, 9_000, 9_000).unwrap();

        assert_eq!(storage.way_envelope(10), Some(bbox(0, 0, 9_000, 9_000)));
        assert_eq!(ids(storage.ways_in(&bbox(8_000, 8_000, 9_500, 9_500))), vec![10]);
        assert_eq!(storage.node(2).map(|node| (node.lat, node.lon)), Some((9_000, 9_000)));
        assert_eq!(
            storage.set_node_position(99, 0, 0),
            Err(StorageError::NotFound(ElementKey::node(99)))
        );
    }

    #[test]
    fn late_node_resolves_way_envelope() {
        let mut storage = Storage::new();
        storage.insert(Way::new(10, vec![1, 2]).into()).unwrap();
        assert_eq!(storage.way_envelope(10), None);

        storage.insert(Node::new(1, 10, 20).into()).unwrap();
        assert_eq!(storage.way_envelope(10), Some(bbox(20, 10, 20, 10)));

        storage.remove(ElementKind::Node, 1);
        assert_eq!(storage.way_envelope(10), None);
    }

    #[test]
    fn removing_way_clears_reverse_map() {
        let mut storage = storage();
        let removed = storage.remove(ElementKind::Way, 10);

        assert!(matches!(removed, Some(Element::Way(ref way)) if way.id == 10));
        assert!(storage.ways_using(1).is_empty());
        assert!(storage.ways_in(&BoundingBox::world()).is_empty());
        assert_eq!(storage.remove(ElementKind::Way, 10), None);
    }

    #[test]
    fn set_way_nodes_is_incremental() {
        let mut storage = storage();
        let old = storage.set_way_nodes(10, vec![2, 3]).unwrap();

        assert_eq!(old, vec![1, 2]);
        assert!(storage.ways_using(1).is_empty());
        assert_eq!(ids(storage.ways_using(3)), vec![10]);
        assert!(storage.is_end_node(3));
        assert!(storage.verify_integrity().is_empty());
    }

    #[test]
    fn relations_using_and_members_edit() {
        let mut storage = storage();
        let members = vec![RelationMember::new(ElementKey::way(10), "outer")];
        storage.insert(Relation::new(20, members).into()).unwrap();

        assert_eq!(storage.relations_using(ElementKey::way(10)).len(), 1);
        storage.set_relation_members(20, vec![RelationMember::new(ElementKey::node(3), "label")]).unwrap();
        assert!(storage.relations_using(ElementKey::way(10)).is_empty());
        assert_eq!(storage.relations_using(ElementKey::node(3))[0].id, 20);
    }

    #[test]
    fn relation_envelope_tolerates_cycles() {
        let mut storage = storage();
        storage
            .insert(Relation::new(20, vec![
                RelationMember::new(ElementKey::relation(20), ""),
                RelationMember::new(ElementKey::relation(21), ""),
                RelationMember::new(ElementKey::way(10), "outer"),
            ]).into())
            .unwrap();
        storage
            .insert(Relation::new(21, vec![
                RelationMember::new(ElementKey::relation(20), ""),
                RelationMember::new(ElementKey::node(3), "label"),
            ]).into())
            .unwrap();

        assert_eq!(storage.relation_envelope(20), Some(bbox(0, 0, 5_000, 5_000)));
        assert_eq!(storage.relation_envelope(99), None);
    }

    #[test]
    fn dangling_reference_is_an_issue() {
        let mut storage = storage();
        storage.insert(Way::new(11, vec![3, 77]).into()).unwrap();

        let result = storage.check_references(ElementKey::way(11)).unwrap();
        assert!(result.issues().contains(&Issue::DanglingReference));
        assert!(!storage.check_references(ElementKey::way(10)).unwrap().has_issue());
        assert!(storage.check_references(ElementKey::way(12)).is_none());
    }

    #[test]
    fn bounding_box_from_data() {
        let mut storage = storage();
        storage.insert(Node::new(4, -300, 7_000).into()).unwrap();

        assert_eq!(storage.calc_bounding_box_from_data(), Ok(bbox(0, -300, 7_000, 5_000)));
        assert_eq!(Storage::new().calc_bounding_box_from_data(), Err(StorageError::EmptyStore));
    }

    #[test]
    fn ingest_registers_bounds() {
        let mut storage = Storage::new();
        let elements: Vec<Element> = vec![Node::new(1, 0, 0).into(), Way::new(2, vec![1]).into()];
        let bounds = bbox(-10, -10, 10, 10);

        assert_eq!(storage.ingest(elements, Some(bounds)), Ok(2));
        assert_eq!(storage.last_box(), bounds);
        assert!(storage.in_downloaded_area(5, 5));
        assert!(!storage.in_downloaded_area(50, 5));
    }

    #[test]
    fn set_tags_replaces() {
        let mut storage = storage();
        let tags: Tags = [("highway".to_string(), "path".to_string())].into_iter().collect();

        assert!(storage.set_tags(ElementKey::way(10), tags).unwrap().is_empty());
        assert_eq!(storage.way(10).unwrap().tags().get("highway").map(String::as_str), Some("path"));
        assert!(storage.set_tags(ElementKey::relation(1), Tags::new()).is_err());
    }

    #[test]
    fn shared_storage_readers_see_complete_updates() {
        let shared = storage().into_shared();
        let writer = Arc::clone(&shared);

        let handle = std::thread::spawn(move || {
            let mut storage = writer.write().unwrap();
            storage.rehash(ElementKind::Node, 1, -1).unwrap();
        });
        handle.join().unwrap();

        let storage = shared.read().unwrap();
        assert_eq!(storage.way(10).unwrap().nodes, vec![-1, 2]);
        assert!(storage.verify_integrity().is_empty());
    }
}
