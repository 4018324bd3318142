//! Middle store: node coordinates and way node lists needed to build
//! geometries for ways and relations.

use std::io::{Read, Seek};

use anyhow::Result;
use geo::Coord;
use hashbrown::{HashMap, HashSet};
use osmpbfreader::{OsmId, OsmObj, OsmPbfReader};
use sled::Db;
use tempfile::TempDir;
use tracing::info;

/// A way with its node coordinates resolved.
#[derive(Debug, Clone)]
pub struct ResolvedWay {
    pub id: i64,
    pub nodes: Vec<Coord<f64>>,
}

/// Lookup interface the place writer consumes.
///
/// Both calls return the subset that could be resolved, in input
/// order; missing ids are skipped silently.
pub trait MiddleStore {
    fn nodes_get_list(&self, ids: &[i64]) -> Vec<Coord<f64>>;
    fn ways_get_list(&self, ids: &[i64]) -> Vec<ResolvedWay>;
}

/// Disk-backed middle store built by scanning the PBF input.
///
/// Node coordinates go into a sled tree in a temporary directory
/// (16-byte big-endian lon/lat pairs); way node lists stay in memory.
pub struct SlimStore {
    node_db: Db,
    way_nodes: HashMap<i64, Vec<i64>>,
    _tempdir: TempDir,
}

impl SlimStore {
    /// Build the store in three passes over the input: relation
    /// members, way node lists, node coordinates.
    pub fn build<R: Read + Seek>(reader: &mut OsmPbfReader<R>) -> Result<Self> {
        info!("Pass 1/3: collecting relation member ways...");
        reader.rewind()?;

        let mut member_ways: HashSet<i64> = HashSet::new();
        for obj in reader.iter() {
            let obj = obj?;
            if let OsmObj::Relation(rel) = obj {
                if matches!(
                    rel.tags.get("type").map(|v| v.as_str()),
                    Some("boundary" | "multipolygon" | "waterway")
                ) {
                    for r in &rel.refs {
                        if let OsmId::Way(wid) = r.member {
                            member_ways.insert(wid.0);
                        }
                    }
                }
            }
        }

        info!("Pass 2/3: collecting way node lists...");
        reader.rewind()?;

        let mut way_nodes: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut needed_nodes: HashSet<i64> = HashSet::new();
        for obj in reader.iter() {
            let obj = obj?;
            if let OsmObj::Way(way) = obj {
                if !way.tags.is_empty() || member_ways.contains(&way.id.0) {
                    let nodes: Vec<i64> = way.nodes.iter().map(|n| n.0).collect();
                    needed_nodes.extend(nodes.iter().copied());
                    way_nodes.insert(way.id.0, nodes);
                }
            }
        }

        info!(
            "Tracking {} ways referencing {} nodes",
            way_nodes.len(),
            needed_nodes.len()
        );

        info!("Pass 3/3: storing node coordinates...");
        reader.rewind()?;

        let tempdir = tempfile::Builder::new().prefix("banyan-middle-").tempdir()?;
        let node_db = sled::open(tempdir.path())?;

        let mut stored = 0u64;
        for obj in reader.iter() {
            let obj = obj?;
            if let OsmObj::Node(node) = obj {
                if needed_nodes.contains(&node.id.0) {
                    node_db.insert(node.id.0.to_be_bytes(), &encode_coord(node.lon(), node.lat()))?;
                    stored += 1;
                }
            }
        }
        node_db.flush()?;

        info!("Stored {} node coordinates", stored);

        Ok(Self {
            node_db,
            way_nodes,
            _tempdir: tempdir,
        })
    }

    fn get_node(&self, id: i64) -> Option<Coord<f64>> {
        match self.node_db.get(id.to_be_bytes()) {
            Ok(Some(bytes)) if bytes.len() == 16 => {
                let lon = f64::from_be_bytes(bytes[0..8].try_into().ok()?);
                let lat = f64::from_be_bytes(bytes[8..16].try_into().ok()?);
                Some(Coord { x: lon, y: lat })
            }
            _ => None,
        }
    }
}

fn encode_coord(lon: f64, lat: f64) -> [u8; 16] {
    let mut value = [0u8; 16];
    value[0..8].copy_from_slice(&lon.to_be_bytes());
    value[8..16].copy_from_slice(&lat.to_be_bytes());
    value
}

impl MiddleStore for SlimStore {
    fn nodes_get_list(&self, ids: &[i64]) -> Vec<Coord<f64>> {
        ids.iter().filter_map(|&id| self.get_node(id)).collect()
    }

    fn ways_get_list(&self, ids: &[i64]) -> Vec<ResolvedWay> {
        ids.iter()
            .filter_map(|&id| {
                let nodes = self.way_nodes.get(&id)?;
                Some(ResolvedWay {
                    id,
                    nodes: nodes.iter().filter_map(|&n| self.get_node(n)).collect(),
                })
            })
            .collect()
    }
}
