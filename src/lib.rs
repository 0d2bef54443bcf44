//! In-memory store for OpenStreetMap elements.
//!
//! [`storage::Storage`] keeps nodes, ways and relations keyed by id together with a spatial grid
//! over node positions, a reverse index from nodes to the ways using them and the list of
//! downloaded regions. Editing operations report per element outcomes through
//! [`edit_result::EditResult`].

pub mod config;
pub mod data;
pub mod edit_result;
pub mod errors;
pub mod etl;
pub mod storage;

pub use data::{bbox::{BoundingBox, BoundingBoxRegistry}, osm::{Element, ElementKey, ElementKind, ElementRef, Node, OsmElement, OsmId, Relation, RelationMember, Way}, OsmBatch};
pub use edit_result::{EditResult, Issue, SavedResult};
pub use errors::StorageError;
pub use storage::{SharedStorage, Storage};
