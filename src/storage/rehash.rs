use log::debug;

use crate::{
    data::osm::{ElementKey, ElementKind, OsmId},
    errors::StorageError,
};

use super::Storage;

impl Storage {
    /// Give an element a new id and rewrite every index and member list that referenced the
    /// old one. The work is bounded by the element's actual references, found through the
    /// topology index.
    ///
    /// Nothing is modified when an error is returned.
    pub fn rehash(&mut self, kind: ElementKind, old: OsmId, new: OsmId) -> Result<(), StorageError> {
        let old_key = ElementKey::new(kind, old);
        let new_key = ElementKey::new(kind, new);
        if !self.store.contains(old_key) {
            return Err(StorageError::NotFound(old_key));
        }
        if old == new {
            return Ok(());
        }
        if self.store.contains(new_key) {
            return Err(StorageError::Conflict(new_key));
        }

        match kind {
            ElementKind::Node => self.rehash_node(old, new),
            ElementKind::Way => self.rehash_way(old, new),
            ElementKind::Relation => self.rehash_relation(old, new),
        }
        self.rehash_parents(old_key, new_key);
        debug!(kind = kind.name(), old = old, new = new; "Rehashed element");
        Ok(())
    }

    fn rehash_node(&mut self, old: OsmId, new: OsmId) {
        if !self.store.nodes.rekey(old, new) {
            return;
        }
        if let Some(node) = self.store.nodes.get_mut(new) {
            node.id = new;
        }
        self.spatial.rehash_node(old, new);
        for &way_id in self.topology.ways_for_node(old) {
            if let Some(way) = self.store.ways.get_mut(way_id) {
                for member in way.nodes.iter_mut().filter(|member| **member == old) {
                    *member = new;
                }
            }
        }
        self.topology.rehash_node(old, new);
        // ways that referenced `new` before it existed now resolve it
        self.refresh_ways_of(new);
    }

    fn rehash_way(&mut self, old: OsmId, new: OsmId) {
        if !self.store.ways.rekey(old, new) {
            return;
        }
        if let Some(way) = self.store.ways.get_mut(new) {
            way.id = new;
            self.topology.rehash_way(old, new, &way.nodes);
        }
        self.spatial.rehash_way(old, new);
    }

    fn rehash_relation(&mut self, old: OsmId, new: OsmId) {
        if !self.store.relations.rekey(old, new) {
            return;
        }
        if let Some(relation) = self.store.relations.get_mut(new) {
            relation.id = new;
            self.topology.rehash_relation(old, new, &relation.members);
        }
    }

    /// Rewrite member lists of the relations containing the rehashed element.
    fn rehash_parents(&mut self, old_key: ElementKey, new_key: ElementKey) {
        self.topology.rehash_member(old_key, new_key);
        for &relation_id in self.topology.relations_for(new_key) {
            if let Some(relation) = self.store.relations.get_mut(relation_id) {
                for member in relation.members.iter_mut().filter(|member| member.key == old_key) {
                    member.key = new_key;
                }
            }
        }
    }
}
