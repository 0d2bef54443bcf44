use std::collections::HashMap;

use crate::data::osm::{ElementKey, OsmId, RelationMember};

/// Reverse adjacency: node id to the ways listing it, and element key to the relations
/// listing it as a member. Entries are keyed by id, so a reference to an element that is not
/// resident is still tracked.
#[derive(Default)]
pub struct Topology {
    node_ways: HashMap<OsmId, Vec<OsmId>>,
    parents: HashMap<ElementKey, Vec<OsmId>>,
}

fn link(list: &mut Vec<OsmId>, id: OsmId) {
    if !list.contains(&id) {
        list.push(id);
    }
}

fn unlink<K: std::hash::Hash + Eq>(map: &mut HashMap<K, Vec<OsmId>>, key: K, id: OsmId) {
    if let Some(list) = map.get_mut(&key) {
        list.retain(|candidate| *candidate != id);
        if list.is_empty() {
            map.remove(&key);
        }
    }
}

fn replace(list: &mut [OsmId], old: OsmId, new: OsmId) {
    for id in list.iter_mut().filter(|id| **id == old) {
        *id = new;
    }
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_way(&mut self, way: OsmId, nodes: &[OsmId]) {
        for &node in nodes {
            link(self.node_ways.entry(node).or_default(), way);
        }
    }

    pub fn remove_way(&mut self, way: OsmId, nodes: &[OsmId]) {
        for &node in nodes {
            unlink(&mut self.node_ways, node, way);
        }
    }

    /// Ways referencing `node`, unordered.
    pub fn ways_for_node(&self, node: OsmId) -> &[OsmId] {
        self.node_ways.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ways that already listed `new` as a dangling reference keep their entry.
    pub fn rehash_node(&mut self, old: OsmId, new: OsmId) {
        if let Some(ways) = self.node_ways.remove(&old) {
            let target = self.node_ways.entry(new).or_default();
            for way in ways {
                link(target, way);
            }
        }
    }

    pub fn rehash_way(&mut self, old: OsmId, new: OsmId, nodes: &[OsmId]) {
        for node in nodes {
            if let Some(ways) = self.node_ways.get_mut(node) {
                replace(ways, old, new);
            }
        }
    }

    pub fn add_relation(&mut self, relation: OsmId, members: &[RelationMember]) {
        for member in members {
            link(self.parents.entry(member.key).or_default(), relation);
        }
    }

    pub fn remove_relation(&mut self, relation: OsmId, members: &[RelationMember]) {
        for member in members {
            unlink(&mut self.parents, member.key, relation);
        }
    }

    /// Relations listing `key` as a member, unordered.
    pub fn relations_for(&self, key: ElementKey) -> &[OsmId] {
        self.parents.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `key` of a member element changed.
    pub fn rehash_member(&mut self, old: ElementKey, new: ElementKey) {
        if let Some(relations) = self.parents.remove(&old) {
            let target = self.parents.entry(new).or_default();
            for relation in relations {
                link(target, relation);
            }
        }
    }

    /// A relation changed id: rewrite it in the parent lists of its members.
    pub fn rehash_relation(&mut self, old: OsmId, new: OsmId, members: &[RelationMember]) {
        for member in members {
            if let Some(relations) = self.parents.get_mut(&member.key) {
                replace(relations, old, new);
            }
        }
    }

    pub(crate) fn node_way_entries(&self) -> impl Iterator<Item = (OsmId, OsmId)> + '_ {
        self.node_ways.iter().flat_map(|(node, ways)| ways.iter().map(move |way| (*node, *way)))
    }

    pub(crate) fn parent_entries(&self) -> impl Iterator<Item = (ElementKey, OsmId)> + '_ {
        self.parents.iter().flat_map(|(key, relations)| relations.iter().map(move |relation| (*key, *relation)))
    }
}
