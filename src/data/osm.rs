use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Signed element identifier. Negative ids belong to elements created locally that have not
/// been uploaded yet.
pub type OsmId = i64;

pub type Tags = HashMap<String, String>;

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ElementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(ElementKind::Node),
            "way" => Ok(ElementKind::Way),
            "relation" => Ok(ElementKind::Relation),
            other => Err(format!("Unknown element type {other:?}")),
        }
    }
}

/// Identity of an element: ids are only unique within a kind.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementKey {
    pub kind: ElementKind,
    pub id: OsmId,
}

impl ElementKey {
    pub fn new(kind: ElementKind, id: OsmId) -> Self {
        ElementKey { kind, id }
    }

    pub fn node(id: OsmId) -> Self {
        ElementKey::new(ElementKind::Node, id)
    }

    pub fn way(id: OsmId) -> Self {
        ElementKey::new(ElementKind::Way, id)
    }

    pub fn relation(id: OsmId) -> Self {
        ElementKey::new(ElementKind::Relation, id)
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind, self.id)
    }
}

/// Editing state, carried along but never interpreted by the indexes.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    #[default]
    Unchanged,
    Created,
    Modified,
    Deleted,
}

/// Shared capability of nodes, ways and relations.
pub trait OsmElement {
    fn id(&self) -> OsmId;
    fn kind(&self) -> ElementKind;
    fn tags(&self) -> &Tags;

    fn key(&self) -> ElementKey {
        ElementKey::new(self.kind(), self.id())
    }

    /// Short human readable label, the `name` tag when there is one.
    fn description(&self) -> String {
        match self.tags().get("name") {
            Some(name) => format!("{} {}", self.kind(), name),
            None => format!("{} #{}", self.kind(), self.id()),
        }
    }
}

/// A point. Coordinates are stored in E7 fixed point (degrees * 10^7).
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: OsmId,
    pub version: i64,
    pub state: State,
    pub tags: Tags,
    pub lat: i32,
    pub lon: i32,
}

pub const MAX_LAT_E7: i32 = 900_000_000;
pub const MAX_LON_E7: i32 = 1_800_000_000;

impl Node {
    pub fn new(id: OsmId, lat: i32, lon: i32) -> Self {
        Node {
            id,
            version: 0,
            state: State::default(),
            tags: Tags::new(),
            lat,
            lon,
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn has_valid_position(&self) -> bool {
        valid_position(self.lat, self.lon)
    }
}

pub fn valid_position(lat: i32, lon: i32) -> bool {
    (-MAX_LAT_E7..=MAX_LAT_E7).contains(&lat) && (-MAX_LON_E7..=MAX_LON_E7).contains(&lon)
}

/// An ordered list of node references. The nodes themselves live in the storage.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Way {
    pub id: OsmId,
    pub version: i64,
    pub state: State,
    pub tags: Tags,
    pub nodes: Vec<OsmId>,
}

impl Way {
    pub fn new(id: OsmId, nodes: Vec<OsmId>) -> Self {
        Way {
            id,
            version: 0,
            state: State::default(),
            tags: Tags::new(),
            nodes,
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn first_node(&self) -> Option<OsmId> {
        self.nodes.first().copied()
    }

    pub fn last_node(&self) -> Option<OsmId> {
        self.nodes.last().copied()
    }

    pub fn is_end_node(&self, node: OsmId) -> bool {
        self.first_node() == Some(node) || self.last_node() == Some(node)
    }

    pub fn is_closed(&self) -> bool {
        self.nodes.len() > 1 && self.first_node() == self.last_node()
    }

    pub fn has_node(&self, node: OsmId) -> bool {
        self.nodes.contains(&node)
    }
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RelationMember {
    pub key: ElementKey,
    pub role: String,
}

impl RelationMember {
    pub fn new(key: ElementKey, role: &str) -> Self {
        RelationMember {
            key,
            role: role.to_string(),
        }
    }
}

/// Members may be of any kind, including the relation itself.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub id: OsmId,
    pub version: i64,
    pub state: State,
    pub tags: Tags,
    pub members: Vec<RelationMember>,
}

impl Relation {
    pub fn new(id: OsmId, members: Vec<RelationMember>) -> Self {
        Relation {
            id,
            version: 0,
            state: State::default(),
            tags: Tags::new(),
            members,
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn has_member(&self, key: ElementKey) -> bool {
        self.members.iter().any(|member| member.key == key)
    }
}

macro_rules! impl_osm_element {
    ($ty:ty, $kind:expr) => {
        impl OsmElement for $ty {
            fn id(&self) -> OsmId {
                self.id
            }

            fn kind(&self) -> ElementKind {
                $kind
            }

            fn tags(&self) -> &Tags {
                &self.tags
            }
        }
    };
}

impl_osm_element!(Node, ElementKind::Node);
impl_osm_element!(Way, ElementKind::Way);
impl_osm_element!(Relation, ElementKind::Relation);

/// Owned element as produced by a parser and consumed by the storage.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Element {
    pub fn borrowed(&self) -> ElementRef<'_> {
        match self {
            Element::Node(node) => ElementRef::Node(node),
            Element::Way(way) => ElementRef::Way(way),
            Element::Relation(relation) => ElementRef::Relation(relation),
        }
    }
}

impl From<Node> for Element {
    fn from(value: Node) -> Self {
        Element::Node(value)
    }
}

impl From<Way> for Element {
    fn from(value: Way) -> Self {
        Element::Way(value)
    }
}

impl From<Relation> for Element {
    fn from(value: Relation) -> Self {
        Element::Relation(value)
    }
}

impl OsmElement for Element {
    fn id(&self) -> OsmId {
        self.borrowed().id()
    }

    fn kind(&self) -> ElementKind {
        self.borrowed().kind()
    }

    fn tags(&self) -> &Tags {
        match self {
            Element::Node(node) => &node.tags,
            Element::Way(way) => &way.tags,
            Element::Relation(relation) => &relation.tags,
        }
    }
}

/// Borrowed view of an element resident in the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRef<'a> {
    Node(&'a Node),
    Way(&'a Way),
    Relation(&'a Relation),
}

impl<'a> ElementRef<'a> {
    pub fn to_element(&self) -> Element {
        match *self {
            ElementRef::Node(node) => Element::Node(node.clone()),
            ElementRef::Way(way) => Element::Way(way.clone()),
            ElementRef::Relation(relation) => Element::Relation(relation.clone()),
        }
    }

    pub fn as_node(&self) -> Option<&'a Node> {
        match *self {
            ElementRef::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_way(&self) -> Option<&'a Way> {
        match *self {
            ElementRef::Way(way) => Some(way),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&'a Relation> {
        match *self {
            ElementRef::Relation(relation) => Some(relation),
            _ => None,
        }
    }
}

impl OsmElement for ElementRef<'_> {
    fn id(&self) -> OsmId {
        match self {
            ElementRef::Node(node) => node.id,
            ElementRef::Way(way) => way.id,
            ElementRef::Relation(relation) => relation.id,
        }
    }

    fn kind(&self) -> ElementKind {
        match self {
            ElementRef::Node(_) => ElementKind::Node,
            ElementRef::Way(_) => ElementKind::Way,
            ElementRef::Relation(_) => ElementKind::Relation,
        }
    }

    fn tags(&self) -> &Tags {
        match self {
            ElementRef::Node(node) => &node.tags,
            ElementRef::Way(way) => &way.tags,
            ElementRef::Relation(relation) => &relation.tags,
        }
    }
}
