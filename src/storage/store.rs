use std::collections::HashMap;

use crate::{
    data::osm::{Element, ElementKey, ElementKind, ElementRef, Node, OsmElement, OsmId, Relation, Way},
    errors::StorageError,
};

struct Slot<T> {
    seq: u64,
    value: T,
}

/// Primary key map for one element kind. Remembers the order in which ids were first
/// inserted so that enumeration is stable.
pub struct KindMap<T> {
    entries: HashMap<OsmId, Slot<T>>,
    next_seq: u64,
}

impl<T> Default for KindMap<T> {
    fn default() -> Self {
        KindMap {
            entries: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<T> KindMap<T> {
    pub fn get(&self, id: OsmId) -> Option<&T> {
        self.entries.get(&id).map(|slot| &slot.value)
    }

    pub(crate) fn get_mut(&mut self, id: OsmId) -> Option<&mut T> {
        self.entries.get_mut(&id).map(|slot| &mut slot.value)
    }

    pub fn contains(&self, id: OsmId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Insert or overwrite. An overwritten entry keeps its original position.
    pub fn insert(&mut self, id: OsmId, value: T) -> Option<T> {
        if let Some(slot) = self.entries.get_mut(&id) {
            return Some(std::mem::replace(&mut slot.value, value));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(id, Slot { seq, value });
        None
    }

    pub fn remove(&mut self, id: OsmId) -> Option<T> {
        self.entries.remove(&id).map(|slot| slot.value)
    }

    /// Move an entry to a new key, keeping its position. Fails if `old` is absent or `new` taken.
    pub(crate) fn rekey(&mut self, old: OsmId, new: OsmId) -> bool {
        if self.entries.contains_key(&new) {
            return false;
        }
        match self.entries.remove(&old) {
            Some(slot) => {
                self.entries.insert(new, slot);
                true
            },
            None => false,
        }
    }

    pub fn seq(&self, id: OsmId) -> Option<u64> {
        self.entries.get(&id).map(|slot| slot.seq)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unordered iteration.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values().map(|slot| &slot.value)
    }

    /// Values in insertion order.
    pub fn ordered(&self) -> Vec<&T> {
        let mut slots: Vec<&Slot<T>> = self.entries.values().collect();
        slots.sort_unstable_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| &slot.value).collect()
    }
}

/// Per kind primary key maps. Knows nothing about the derived indexes; keeping those in sync
/// is the job of [`super::Storage`].
#[derive(Default)]
pub struct ElementStore {
    pub(crate) nodes: KindMap<Node>,
    pub(crate) ways: KindMap<Way>,
    pub(crate) relations: KindMap<Relation>,
}

impl ElementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ElementKind, id: OsmId) -> Option<ElementRef<'_>> {
        match kind {
            ElementKind::Node => self.nodes.get(id).map(ElementRef::Node),
            ElementKind::Way => self.ways.get(id).map(ElementRef::Way),
            ElementKind::Relation => self.relations.get(id).map(ElementRef::Relation),
        }
    }

    pub fn contains(&self, key: ElementKey) -> bool {
        match key.kind {
            ElementKind::Node => self.nodes.contains(key.id),
            ElementKind::Way => self.ways.contains(key.id),
            ElementKind::Relation => self.relations.contains(key.id),
        }
    }

    /// Add or overwrite by (kind, id), returning the previous element.
    pub fn insert(&mut self, element: Element) -> Option<Element> {
        match element {
            Element::Node(node) => self.nodes.insert(node.id, node).map(Element::Node),
            Element::Way(way) => self.ways.insert(way.id, way).map(Element::Way),
            Element::Relation(relation) => self.relations.insert(relation.id, relation).map(Element::Relation),
        }
    }

    pub fn insert_new(&mut self, element: Element) -> Result<(), StorageError> {
        let key = element.key();
        if self.contains(key) {
            return Err(StorageError::DuplicateKey(key));
        }
        self.insert(element);
        Ok(())
    }

    pub fn remove(&mut self, kind: ElementKind, id: OsmId) -> Option<Element> {
        match kind {
            ElementKind::Node => self.nodes.remove(id).map(Element::Node),
            ElementKind::Way => self.ways.remove(id).map(Element::Way),
            ElementKind::Relation => self.relations.remove(id).map(Element::Relation),
        }
    }

    pub fn count(&self, kind: ElementKind) -> usize {
        match kind {
            ElementKind::Node => self.nodes.len(),
            ElementKind::Way => self.ways.len(),
            ElementKind::Relation => self.relations.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.ways.len() + self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every element: nodes, then ways, then relations, each in insertion order.
    pub fn all_elements(&self) -> Vec<ElementRef<'_>> {
        let mut elements = Vec::with_capacity(self.len());
        elements.extend(self.nodes.ordered().into_iter().map(ElementRef::Node));
        elements.extend(self.ways.ordered().into_iter().map(ElementRef::Way));
        elements.extend(self.relations.ordered().into_iter().map(ElementRef::Relation));
        elements
    }

    /// Resolvable nodes of every way, once per way they belong to.
    pub fn way_nodes(&self) -> Vec<&Node> {
        let mut result = Vec::new();
        for way in self.ways.ordered() {
            let mut seen: Vec<OsmId> = Vec::with_capacity(way.nodes.len());
            for &id in &way.nodes {
                if seen.contains(&id) {
                    continue;
                }
                seen.push(id);
                if let Some(node) = self.nodes.get(id) {
                    result.push(node);
                }
            }
        }
        result
    }

    pub fn nodes(&self) -> &KindMap<Node> {
        &self.nodes
    }

    pub fn ways(&self) -> &KindMap<Way> {
        &self.ways
    }

    pub fn relations(&self) -> &KindMap<Relation> {
        &self.relations
    }
}
