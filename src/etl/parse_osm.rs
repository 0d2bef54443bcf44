use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use log::{info, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use xz::bufread::XzDecoder;

use crate::config::UserConfig;
use crate::data::bbox::BoundingBox;
use crate::data::degrees_to_e7;
use crate::data::osm::{Element, ElementKey, Node, OsmId, Relation, RelationMember, State, Way};
use crate::data::OsmBatch;
use crate::errors::{Error, Result};
use crate::etl::Etl;

pub const ETL_NAME: &str = "parse_osm";
pub const OUTPUT_FILE_NAME: &str = "osm_elements.rkyv";

/// Attributes of one XML element, unescaped.
struct Attrs(Vec<(Vec<u8>, String)>);

impl Attrs {
    fn read(el: &BytesStart) -> Result<Self> {
        let mut attrs = Vec::new();
        for attribute in el.attributes() {
            let attribute = attribute?;
            let value = attribute.unescape_value()?.into_owned();
            attrs.push((attribute.key.as_ref().to_vec(), value));
        }
        Ok(Attrs(attrs))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name.as_slice() == key.as_bytes())
            .map(|(_, value)| value.as_str())
    }

    fn required(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| Error::from(format!("Missing attribute {key:?}")))
    }

    fn id(&self) -> Result<OsmId> {
        Ok(self.required("id")?.parse()?)
    }

    fn degrees(&self, key: &str) -> Result<i32> {
        let value: f64 = self.required(key)?.parse()?;
        if !value.is_finite() {
            return Err(format!("Attribute {key:?} is not a finite number: {value}").into());
        }
        Ok(degrees_to_e7(value))
    }

    fn version(&self) -> Result<i64> {
        match self.get("version") {
            Some(value) => Ok(value.parse()?),
            None => Ok(0),
        }
    }

    /// JOSM style `action` attribute; negative ids are new elements.
    fn state(&self, id: OsmId) -> State {
        match self.get("action") {
            Some("delete") => State::Deleted,
            Some("modify") if id < 0 => State::Created,
            Some("modify") => State::Modified,
            _ if id < 0 => State::Created,
            _ => State::Unchanged,
        }
    }
}

/// Element currently open in the document, children (`tag`, `nd`, `member`) attach to it.
enum Pending {
    Top,
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Pending {
    fn into_element(self) -> Option<Element> {
        match self {
            Pending::Top => None,
            Pending::Node(node) => Some(node.into()),
            Pending::Way(way) => Some(way.into()),
            Pending::Relation(relation) => Some(relation.into()),
        }
    }
}

fn parse_node(attrs: &Attrs) -> Result<Node> {
    let id = attrs.id()?;
    let mut node = Node::new(id, attrs.degrees("lat")?, attrs.degrees("lon")?);
    node.version = attrs.version()?;
    node.state = attrs.state(id);
    Ok(node)
}

fn parse_way(attrs: &Attrs) -> Result<Way> {
    let id = attrs.id()?;
    let mut way = Way::new(id, Vec::new());
    way.version = attrs.version()?;
    way.state = attrs.state(id);
    Ok(way)
}

fn parse_relation(attrs: &Attrs) -> Result<Relation> {
    let id = attrs.id()?;
    let mut relation = Relation::new(id, Vec::new());
    relation.version = attrs.version()?;
    relation.state = attrs.state(id);
    Ok(relation)
}

fn parse_bounds(attrs: &Attrs) -> Result<BoundingBox> {
    Ok(BoundingBox::new(
        attrs.degrees("minlon")?,
        attrs.degrees("minlat")?,
        attrs.degrees("maxlon")?,
        attrs.degrees("maxlat")?,
    )?)
}

fn open_element(name: &[u8], attrs: &Attrs, pending: &mut Pending, batch: &mut OsmBatch) -> Result<()> {
    match name {
        b"node" => *pending = Pending::Node(parse_node(attrs)?),
        b"way" => *pending = Pending::Way(parse_way(attrs)?),
        b"relation" => *pending = Pending::Relation(parse_relation(attrs)?),
        b"bounds" => batch.bounds = Some(parse_bounds(attrs)?),
        b"tag" => {
            let key = attrs.required("k")?.to_string();
            let value = attrs.required("v")?.to_string();
            match pending {
                Pending::Node(node) => { node.tags.insert(key, value); },
                Pending::Way(way) => { way.tags.insert(key, value); },
                Pending::Relation(relation) => { relation.tags.insert(key, value); },
                Pending::Top => warn!(key = key.as_str(); "Ignoring tag outside of an element"),
            }
        },
        b"nd" => {
            if let Pending::Way(way) = pending {
                way.nodes.push(attrs.required("ref")?.parse()?);
            }
        },
        b"member" => {
            if let Pending::Relation(relation) = pending {
                let kind = attrs.required("type")?.parse()?;
                let id: OsmId = attrs.required("ref")?.parse()?;
                let role = attrs.get("role").unwrap_or("");
                relation.members.push(RelationMember::new(ElementKey::new(kind, id), role));
            }
        },
        _ => (),
    }
    Ok(())
}

/// Parse an OSM XML document into a batch ready for [`crate::storage::Storage::ingest`].
pub fn parse_osm_xml<R: BufRead>(input: R) -> Result<OsmBatch> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut batch = OsmBatch::default();
    let mut pending = Pending::Top;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => {
                let attrs = Attrs::read(&e)?;
                open_element(e.name().as_ref(), &attrs, &mut pending, &mut batch)?;
            },
            Event::Empty(e) => {
                let attrs = Attrs::read(&e)?;
                open_element(e.name().as_ref(), &attrs, &mut pending, &mut batch)?;
                if matches!(e.name().as_ref(), b"node" | b"way" | b"relation") {
                    if let Some(element) = std::mem::replace(&mut pending, Pending::Top).into_element() {
                        batch.elements.push(element);
                    }
                }
            },
            Event::End(e) => {
                if matches!(e.name().as_ref(), b"node" | b"way" | b"relation") {
                    if let Some(element) = std::mem::replace(&mut pending, Pending::Top).into_element() {
                        batch.elements.push(element);
                    }
                }
            },
            _ => (),
        }
        buf.clear();
    }
    Ok(batch)
}

/// Read a batch written by [`ParseOsmEtl`].
pub fn read_cache(path: &Path) -> Result<OsmBatch> {
    let mut file = fs::File::open(path)?;
    let mut bytes: Vec<u8> = Vec::new();
    file.read_to_end(&mut bytes)?;
    let mut aligned = rkyv::AlignedVec::with_capacity(bytes.len());
    aligned.extend_from_slice(&bytes);

    // SAFETY: the cache file is only ever written by `ParseOsmEtl::load`.
    let batch: OsmBatch = unsafe {
        rkyv::from_bytes_unchecked(&aligned).map_err(|err| Error::from(format!("Could not deserialize batch: {err:?}")))?
    };
    Ok(batch)
}

pub struct ParseOsmEtl<'a> {
    config: &'a UserConfig,
}

impl ParseOsmEtl<'_> {
    pub fn new(config: &UserConfig) -> ParseOsmEtl {
        ParseOsmEtl {
            config
        }
    }

    fn output_path(dir: &Path) -> std::path::PathBuf {
        dir.join(OUTPUT_FILE_NAME)
    }
}

impl Etl for ParseOsmEtl<'_> {
    type Input = Box<dyn BufRead>;
    type Output = OsmBatch;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(Self::output_path(dir).try_exists()?)
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        if self.is_cached(dir)? {
            fs::remove_file(Self::output_path(dir))?;
        }
        Ok(())
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        let file_reader = BufReader::new(fs::File::open(&self.config.data_path)?);
        if self.config.data_path.ends_with(".xz") {
            Ok(Box::new(BufReader::new(XzDecoder::new(file_reader))))
        } else {
            Ok(Box::new(file_reader))
        }
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let batch = parse_osm_xml(input)?;
        info!(etl_name = ETL_NAME, elements = batch.elements.len(), has_bounds = batch.bounds.is_some(); "Parsed OSM data");
        Ok(batch)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        let bytes = rkyv::to_bytes::<_, 256>(&output)
            .map_err(|err| Error::from(format!("Could not serialize batch: {err:?}")))?;
        let mut output_file = fs::File::create(Self::output_path(dir))?;
        output_file.write_all(&bytes)?;
        Ok(())
    }
}
