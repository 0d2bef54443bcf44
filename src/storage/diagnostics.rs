use std::io::{self, Write};

use log::info;

use crate::data::osm::{ElementKind, ElementRef, OsmElement};

use super::Storage;

impl Storage {
    /// Dump one line per resident element between a header and a footer line. Returns the
    /// number of lines written.
    pub fn log_storage<W: Write>(&self, out: &mut W) -> io::Result<usize> {
        let nodes = self.count(ElementKind::Node);
        let ways = self.count(ElementKind::Way);
        let relations = self.count(ElementKind::Relation);

        writeln!(out, "storage: {nodes} nodes, {ways} ways, {relations} relations")?;
        let mut lines = 1;
        for element in self.all_elements() {
            match element {
                ElementRef::Node(node) => writeln!(
                    out,
                    "node #{} v{} {:?} lat={} lon={} tags={}",
                    node.id, node.version, node.state, node.lat, node.lon, node.tags.len()
                )?,
                ElementRef::Way(way) => writeln!(
                    out,
                    "way #{} v{} {:?} nodes={:?} tags={}",
                    way.id, way.version, way.state, way.nodes, way.tags.len()
                )?,
                ElementRef::Relation(relation) => writeln!(
                    out,
                    "relation #{} v{} {:?} members={} tags={}",
                    relation.id, relation.version, relation.state, relation.members.len(), relation.tags.len()
                )?,
            }
            lines += 1;
        }
        writeln!(out, "bounding boxes: {} last={:?}", self.boxes.len(), self.boxes.last_box())?;
        lines += 1;

        info!(nodes = nodes, ways = ways, relations = relations, lines = lines; "Logged storage");
        Ok(lines)
    }

    /// Cross check every derived index against a full scan of the element maps. Returns a
    /// description of each inconsistency found.
    pub fn verify_integrity(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for node in self.store.nodes.values() {
            match self.spatial.position(node.id) {
                Some(position) if position.lat == node.lat && position.lon == node.lon => (),
                other => problems.push(format!("{} indexed at {other:?}", node.key())),
            }
        }
        let mut gridded = 0;
        for (cell, id) in self.spatial.cell_entries() {
            gridded += 1;
            match self.spatial.position(id) {
                Some(position) if self.spatial.cell_of(position.lat, position.lon) == cell => (),
                _ => problems.push(format!("node #{id} filed under wrong cell {cell:?}")),
            }
            if !self.store.nodes.contains(id) {
                problems.push(format!("grid references removed node #{id}"));
            }
        }
        if gridded != self.spatial.node_count() {
            problems.push(format!("{gridded} grid entries for {} positions", self.spatial.node_count()));
        }

        for way in self.store.ways.values() {
            for node in &way.nodes {
                if !self.topology.ways_for_node(*node).contains(&way.id) {
                    problems.push(format!("{} missing from reverse map of node #{node}", way.key()));
                }
            }
            if self.spatial.way_envelope(way.id) != self.spatial.envelope_of(&way.nodes) {
                problems.push(format!("{} has a stale envelope", way.key()));
            }
        }
        for (node, way_id) in self.topology.node_way_entries() {
            match self.store.ways.get(way_id) {
                Some(way) if way.has_node(node) => (),
                Some(_) => problems.push(format!("reverse map lists way #{way_id} for node #{node} it does not use")),
                None => problems.push(format!("reverse map references removed way #{way_id}")),
            }
        }
        for way_id in self.spatial.misclassified_ways() {
            problems.push(format!("way #{way_id} filed under the wrong size class"));
        }
        for way_id in self.spatial.way_ids() {
            if !self.store.ways.contains(way_id) {
                problems.push(format!("envelope cached for removed way #{way_id}"));
            }
        }

        for relation in self.store.relations.values() {
            for member in &relation.members {
                if !self.topology.relations_for(member.key).contains(&relation.id) {
                    problems.push(format!("{} missing from parents of {}", relation.key(), member.key));
                }
            }
        }
        for (key, relation_id) in self.topology.parent_entries() {
            match self.store.relations.get(relation_id) {
                Some(relation) if relation.has_member(key) => (),
                Some(_) => problems.push(format!("parents of {key} list relation #{relation_id} wrongly")),
                None => problems.push(format!("parents of {key} reference removed relation #{relation_id}")),
            }
        }

        problems
    }
}
