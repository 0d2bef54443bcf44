use std::collections::BTreeSet;

use osm_store::{
    BoundingBox, Element, ElementKey, ElementKind, Node, OsmElement, OsmId, Relation, RelationMember, Storage, StorageError, Way,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    InsertNode(OsmId, i32, i32),
    InsertWay(OsmId, Vec<OsmId>),
    RemoveNode(OsmId),
    RemoveWay(OsmId),
    MoveNode(OsmId, i32, i32),
    SetWayNodes(OsmId, Vec<OsmId>),
    RehashNode(OsmId, OsmId),
    RehashWay(OsmId, OsmId),
    InsertRelation(OsmId, Vec<ElementKey>, bool),
    RemoveRelation(OsmId),
    SetRelationMembers(OsmId, Vec<ElementKey>),
    RehashRelation(OsmId, OsmId),
}

fn coord() -> impl Strategy<Value = i32> {
    -5_000..5_000i32
}

fn node_id() -> impl Strategy<Value = OsmId> {
    -12..12i64
}

fn way_id() -> impl Strategy<Value = OsmId> {
    100..106i64
}

fn relation_id() -> impl Strategy<Value = OsmId> {
    200..204i64
}

fn members() -> impl Strategy<Value = Vec<OsmId>> {
    proptest::collection::vec(node_id(), 0..6)
}

fn member_key() -> impl Strategy<Value = ElementKey> {
    prop_oneof![
        node_id().prop_map(ElementKey::node),
        way_id().prop_map(ElementKey::way),
        relation_id().prop_map(ElementKey::relation),
    ]
}

fn relation_members() -> impl Strategy<Value = Vec<ElementKey>> {
    proptest::collection::vec(member_key(), 0..5)
}

fn member_list(keys: &[ElementKey]) -> Vec<RelationMember> {
    keys.iter().map(|key| RelationMember::new(*key, "")).collect()
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (node_id(), coord(), coord()).prop_map(|(id, lat, lon)| Op::InsertNode(id, lat, lon)),
        2 => (way_id(), members()).prop_map(|(id, nodes)| Op::InsertWay(id, nodes)),
        1 => node_id().prop_map(Op::RemoveNode),
        1 => way_id().prop_map(Op::RemoveWay),
        1 => (node_id(), coord(), coord()).prop_map(|(id, lat, lon)| Op::MoveNode(id, lat, lon)),
        1 => (way_id(), members()).prop_map(|(id, nodes)| Op::SetWayNodes(id, nodes)),
        2 => (node_id(), node_id()).prop_map(|(old, new)| Op::RehashNode(old, new)),
        1 => (way_id(), way_id()).prop_map(|(old, new)| Op::RehashWay(old, new)),
        2 => (relation_id(), relation_members(), any::<bool>())
            .prop_map(|(id, keys, with_self)| Op::InsertRelation(id, keys, with_self)),
        1 => relation_id().prop_map(Op::RemoveRelation),
        1 => (relation_id(), relation_members()).prop_map(|(id, keys)| Op::SetRelationMembers(id, keys)),
        1 => (relation_id(), relation_id()).prop_map(|(old, new)| Op::RehashRelation(old, new)),
    ]
}

fn apply(storage: &mut Storage, op: &Op) {
    match op {
        Op::InsertNode(id, lat, lon) => {
            storage.insert(Node::new(*id, *lat, *lon).into()).unwrap();
        },
        Op::InsertWay(id, nodes) => {
            storage.insert(Way::new(*id, nodes.clone()).into()).unwrap();
        },
        Op::RemoveNode(id) => {
            storage.remove(ElementKind::Node, *id);
        },
        Op::RemoveWay(id) => {
            storage.remove(ElementKind::Way, *id);
        },
        Op::MoveNode(id, lat, lon) => {
            let _ = storage.set_node_position(*id, *lat, *lon);
        },
        Op::SetWayNodes(id, nodes) => {
            let _ = storage.set_way_nodes(*id, nodes.clone());
        },
        Op::RehashNode(old, new) => {
            let _ = storage.rehash(ElementKind::Node, *old, *new);
        },
        Op::RehashWay(old, new) => {
            let _ = storage.rehash(ElementKind::Way, *old, *new);
        },
        Op::InsertRelation(id, keys, with_self) => {
            let mut members = member_list(keys);
            if *with_self {
                members.push(RelationMember::new(ElementKey::relation(*id), "subarea"));
            }
            storage.insert(Relation::new(*id, members).into()).unwrap();
        },
        Op::RemoveRelation(id) => {
            storage.remove(ElementKind::Relation, *id);
        },
        Op::SetRelationMembers(id, keys) => {
            let _ = storage.set_relation_members(*id, member_list(keys));
        },
        Op::RehashRelation(old, new) => {
            let _ = storage.rehash(ElementKind::Relation, *old, *new);
        },
    }
}

/// Ways using `node` found by scanning every way.
fn scan_ways_using(storage: &Storage, node: OsmId) -> BTreeSet<OsmId> {
    storage
        .all_elements()
        .iter()
        .filter_map(|element| element.as_way())
        .filter(|way| way.has_node(node))
        .map(|way| way.id)
        .collect()
}

/// Relations listing `key` found by scanning every relation.
fn scan_relations_using(storage: &Storage, key: ElementKey) -> BTreeSet<OsmId> {
    storage
        .all_elements()
        .iter()
        .filter_map(|element| element.as_relation())
        .filter(|relation| relation.has_member(key))
        .map(|relation| relation.id)
        .collect()
}

fn snapshot(storage: &Storage) -> (Vec<Element>, String) {
    let elements = storage.all_elements().iter().map(|element| element.to_element()).collect();
    let mut dump = Vec::new();
    storage.log_storage(&mut dump).unwrap();
    (elements, String::from_utf8(dump).unwrap())
}

fn populated(nodes: &[(i32, i32)], ways: &[Vec<OsmId>]) -> Storage {
    let mut storage = Storage::with_cell_size(1_000);
    for (idx, (lat, lon)) in nodes.iter().enumerate() {
        storage.insert(Node::new(idx as OsmId, *lat, *lon).into()).unwrap();
    }
    for (idx, members) in ways.iter().enumerate() {
        storage.insert(Way::new(1_000 + idx as OsmId, members.clone()).into()).unwrap();
    }
    storage
}

fn positions() -> impl Strategy<Value = Vec<(i32, i32)>> {
    proptest::collection::vec((coord(), coord()), 1..40)
}

fn query_box() -> impl Strategy<Value = BoundingBox> {
    (coord(), coord(), 0..6_000i32, 0..6_000i32)
        .prop_map(|(left, bottom, width, height)| BoundingBox::new(left, bottom, left + width, bottom + height).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn indexes_stay_coherent(ops in proptest::collection::vec(op(), 1..60)) {
        let mut storage = Storage::with_cell_size(1_000);
        for op in &ops {
            apply(&mut storage, op);

            let problems = storage.verify_integrity();
            prop_assert!(problems.is_empty(), "after {:?}: {:?}", op, problems);
            for element in storage.all_elements() {
                if let Some(node) = element.as_node() {
                    let indexed: BTreeSet<OsmId> = storage.ways_using(node.id).iter().map(|way| way.id).collect();
                    prop_assert_eq!(indexed, scan_ways_using(&storage, node.id));
                }
                let key = element.key();
                let parents: BTreeSet<OsmId> = storage.relations_using(key).iter().map(|relation| relation.id).collect();
                prop_assert_eq!(parents, scan_relations_using(&storage, key));
            }
        }
    }

    #[test]
    fn rehash_moves_every_reference(
        nodes in positions(),
        ways in proptest::collection::vec(proptest::collection::vec(0..40i64, 1..6), 0..10),
        pick in any::<proptest::sample::Index>(),
        new in -500..-1i64,
    ) {
        let mut storage = populated(&nodes, &ways);
        let old = pick.index(nodes.len()) as OsmId;
        let before = storage.node(old).cloned().unwrap();
        let referencing: BTreeSet<OsmId> = scan_ways_using(&storage, old);

        storage.rehash(ElementKind::Node, old, new).unwrap();

        prop_assert!(storage.node(old).is_none());
        let after = storage.node(new).unwrap();
        prop_assert_eq!((after.lat, after.lon, &after.tags), (before.lat, before.lon, &before.tags));
        for way_id in &referencing {
            let way = storage.way(*way_id).unwrap();
            prop_assert!(way.has_node(new));
            prop_assert!(!way.has_node(old));
        }
        prop_assert_eq!(scan_ways_using(&storage, new), referencing);
        prop_assert!(storage.verify_integrity().is_empty());
    }

    #[test]
    fn rehash_conflict_changes_nothing(
        nodes in proptest::collection::vec((coord(), coord()), 2..30),
        ways in proptest::collection::vec(proptest::collection::vec(0..30i64, 1..6), 0..8),
        a in any::<proptest::sample::Index>(),
        b in any::<proptest::sample::Index>(),
    ) {
        let mut storage = populated(&nodes, &ways);
        let old = a.index(nodes.len()) as OsmId;
        let new = b.index(nodes.len()) as OsmId;
        prop_assume!(old != new);
        let before = snapshot(&storage);

        let result = storage.rehash(ElementKind::Node, old, new);

        prop_assert_eq!(result, Err(StorageError::Conflict(osm_store::ElementKey::node(new))));
        prop_assert_eq!(snapshot(&storage), before);
    }

    #[test]
    fn nodes_in_matches_brute_force(nodes in positions(), bbox in query_box()) {
        let storage = populated(&nodes, &[]);

        let found: BTreeSet<OsmId> = storage.nodes_in(&bbox).iter().map(|node| node.id).collect();
        let expected: BTreeSet<OsmId> = nodes
            .iter()
            .enumerate()
            .filter(|(_, (lat, lon))| bbox.contains_point(*lat, *lon))
            .map(|(idx, _)| idx as OsmId)
            .collect();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn ways_in_matches_brute_force(
        nodes in positions(),
        ways in proptest::collection::vec(proptest::collection::vec(0..50i64, 1..6), 0..12),
        bbox in query_box(),
    ) {
        let storage = populated(&nodes, &ways);

        let found: BTreeSet<OsmId> = storage.ways_in(&bbox).iter().map(|way| way.id).collect();
        let mut expected = BTreeSet::new();
        for (idx, members) in ways.iter().enumerate() {
            let mut envelope: Option<BoundingBox> = None;
            for id in members {
                if let Some((lat, lon)) = nodes.get(*id as usize) {
                    let point = BoundingBox::from_point(*lat, *lon);
                    envelope = Some(envelope.map_or(point, |current| current.union(&point)));
                }
            }
            if envelope.is_some_and(|envelope| envelope.intersects(&bbox)) {
                expected.insert(1_000 + idx as OsmId);
            }
        }
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn data_box_hits_extremes(nodes in positions()) {
        let storage = populated(&nodes, &[]);
        let bbox = storage.calc_bounding_box_from_data().unwrap();

        prop_assert_eq!(bbox.left(), nodes.iter().map(|(_, lon)| *lon).min().unwrap());
        prop_assert_eq!(bbox.right(), nodes.iter().map(|(_, lon)| *lon).max().unwrap());
        prop_assert_eq!(bbox.bottom(), nodes.iter().map(|(lat, _)| *lat).min().unwrap());
        prop_assert_eq!(bbox.top(), nodes.iter().map(|(lat, _)| *lat).max().unwrap());
    }
}

#[test]
fn element_description_survives_rehash() {
    let mut storage = populated(&[(0, 0)], &[]);
    storage.rehash(ElementKind::Node, 0, -7).unwrap();

    assert_eq!(storage.get(ElementKind::Node, -7).unwrap().description(), "node #-7");
}
