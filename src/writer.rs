//! Place writer: classifies objects, builds geometry and streams rows
//! into the `place` table, with class-scoped deletes for diffs.

use std::sync::Arc;

use geo::Coord;
use tokio_postgres::Statement;
use tracing::debug;

use crate::classifier::classify;
use crate::db::{self, CopyBuffer, PgClient, TableSpaces};
use crate::error::{ImportError, Result};
use crate::geometry::{point_wkt, GeomBuilder, WktBuilder};
use crate::middle::MiddleStore;
use crate::models::{Classification, Member, OsmType, PlaceRow, PrimitiveKind, TagMap};

const DELETE_PLACE_SQL: &str = "DELETE FROM place WHERE osm_type = $1 AND osm_id = $2";

const DELETE_CLASSES_SQL: &str =
    "DELETE FROM place WHERE osm_type = $1 AND osm_id = $2 AND class = ANY($3)";

/// Connection and import-mode settings for a writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub conninfo: String,
    /// Append to an existing table instead of recreating it.
    pub append: bool,
    /// Slim mode retains per-object identity and allows diffs.
    pub slim: bool,
    pub srid: u32,
    pub tablespaces: TableSpaces,
    pub exclude_broken_polygons: bool,
}

/// Second connection holding the prepared class lookup, present in
/// append mode only.
struct ClassLookup {
    db: PgClient,
    get_classes: Statement,
}

/// Single-writer import pipeline over one bulk-load connection.
///
/// Worker pools get independent writers via [`PlaceWriter::clone_with`];
/// connections are never shared.
pub struct PlaceWriter<M: MiddleStore, G: GeomBuilder = WktBuilder> {
    middle: Arc<M>,
    config: WriterConfig,
    db: PgClient,
    copy: CopyBuffer,
    lookup: Option<ClassLookup>,
    builder: G,
}

impl<M: MiddleStore> PlaceWriter<M> {
    /// Connect with the default WKT geometry builder.
    pub async fn connect(config: WriterConfig, middle: Arc<M>) -> Result<Self> {
        let mut builder = WktBuilder::new();
        builder.set_exclude_broken_polygon(config.exclude_broken_polygons);
        Self::connect_with(config, middle, builder).await
    }
}

impl<M: MiddleStore, G: GeomBuilder> PlaceWriter<M, G> {
    /// Connect the bulk connection and, in append mode, the query
    /// connection with its prepared class lookup.
    pub async fn connect_with(config: WriterConfig, middle: Arc<M>, builder: G) -> Result<Self> {
        let db = PgClient::connect(&config.conninfo).await?;

        let lookup = if config.append {
            let query_db = PgClient::connect(&config.conninfo).await?;
            let get_classes = db::prepare_get_classes(&query_db).await?;
            Some(ClassLookup {
                db: query_db,
                get_classes,
            })
        } else {
            None
        };

        Ok(Self {
            middle,
            config,
            db,
            copy: CopyBuffer::new(),
            lookup,
            builder,
        })
    }

    /// Open the import transaction; on initial imports this also
    /// recreates the schema.
    pub async fn start(&mut self) -> Result<()> {
        self.db.batch_execute("BEGIN").await?;
        if !self.config.append {
            db::create_place_table(&self.db, self.config.srid, &self.config.tablespaces).await?;
        }
        Ok(())
    }

    /// Terminate any active COPY and commit. Returns the number of
    /// rows queued over the writer's lifetime.
    pub async fn stop(mut self) -> Result<u64> {
        self.copy.end_copy().await?;
        self.db.batch_execute("COMMIT").await?;
        Ok(self.copy.rows_queued())
    }

    /// Independent writer over fresh connections, bound to the given
    /// middle handle. For worker pools over disjoint id ranges.
    pub async fn clone_with(&self, middle: Arc<M>) -> Result<Self>
    where
        G: Clone,
    {
        Self::connect_with(self.config.clone(), middle, self.builder.clone()).await
    }

    pub async fn node_add(&mut self, id: i64, lat: f64, lon: f64, tags: &TagMap) -> Result<()> {
        self.process_node(id, lat, lon, tags, false).await
    }

    pub async fn node_modify(&mut self, id: i64, lat: f64, lon: f64, tags: &TagMap) -> Result<()> {
        self.require_slim()?;
        self.process_node(id, lat, lon, tags, true).await
    }

    pub async fn node_delete(&mut self, id: i64) -> Result<()> {
        self.require_slim()?;
        self.delete_place(OsmType::Node, id).await
    }

    pub async fn way_add(&mut self, id: i64, node_ids: &[i64], tags: &TagMap) -> Result<()> {
        self.process_way(id, node_ids, tags, false).await
    }

    pub async fn way_modify(&mut self, id: i64, node_ids: &[i64], tags: &TagMap) -> Result<()> {
        self.require_slim()?;
        self.process_way(id, node_ids, tags, true).await
    }

    pub async fn way_delete(&mut self, id: i64) -> Result<()> {
        self.require_slim()?;
        self.delete_place(OsmType::Way, id).await
    }

    pub async fn relation_add(&mut self, id: i64, members: &[Member], tags: &TagMap) -> Result<()> {
        self.process_relation(id, members, tags, false).await
    }

    pub async fn relation_modify(
        &mut self,
        id: i64,
        members: &[Member],
        tags: &TagMap,
    ) -> Result<()> {
        self.require_slim()?;
        self.process_relation(id, members, tags, true).await
    }

    pub async fn relation_delete(&mut self, id: i64) -> Result<()> {
        self.require_slim()?;
        self.delete_place(OsmType::Relation, id).await
    }

    /// Rows queued into the COPY stream so far.
    pub fn rows_queued(&self) -> u64 {
        self.copy.rows_queued()
    }

    fn require_slim(&self) -> Result<()> {
        if self.config.slim {
            Ok(())
        } else {
            Err(ImportError::RequiresSlimMode)
        }
    }

    async fn process_node(
        &mut self,
        id: i64,
        lat: f64,
        lon: f64,
        tags: &TagMap,
        delete_old: bool,
    ) -> Result<()> {
        let classification = classify(tags, PrimitiveKind::Node);

        if delete_old {
            self.delete_unused_classes(OsmType::Node, id, Some(&classification))
                .await?;
        }

        if classification.is_place() {
            let wkt = point_wkt(lon, lat);
            self.emit_rows(OsmType::Node, id, &classification, &wkt)
                .await?;
        }
        Ok(())
    }

    async fn process_way(
        &mut self,
        id: i64,
        node_ids: &[i64],
        tags: &TagMap,
        delete_old: bool,
    ) -> Result<()> {
        let classification = classify(tags, PrimitiveKind::Way);

        if delete_old {
            self.delete_unused_classes(OsmType::Way, id, Some(&classification))
                .await?;
        }

        if classification.is_place() {
            let nodes = self.middle.nodes_get_list(node_ids);
            // Closed ways are always promoted to areas.
            match self.builder.simple(&nodes, true) {
                Some(wkt) => {
                    self.emit_rows(OsmType::Way, id, &classification, &wkt)
                        .await?
                }
                None => debug!("way {}: no usable geometry, skipped", id),
            }
        }
        Ok(())
    }

    async fn process_relation(
        &mut self,
        id: i64,
        members: &[Member],
        tags: &TagMap,
        delete_old: bool,
    ) -> Result<()> {
        // associatedStreet, untyped and unknown relation types never
        // emit rows; in update mode their places are torn down.
        let rel_type = match tags.get("type") {
            Some(t @ ("boundary" | "multipolygon" | "waterway")) => t,
            _ => {
                if delete_old {
                    self.delete_unused_classes(OsmType::Relation, id, None)
                        .await?;
                }
                return Ok(());
            }
        };

        let classification = classify(tags, PrimitiveKind::AreaRelation);

        if delete_old {
            self.delete_unused_classes(OsmType::Relation, id, Some(&classification))
                .await?;
        }

        if !classification.is_place() {
            return Ok(());
        }

        let way_ids: Vec<i64> = members
            .iter()
            .filter(|m| m.osm_type == OsmType::Way)
            .map(|m| m.id)
            .collect();
        if way_ids.is_empty() {
            if delete_old {
                self.delete_unused_classes(OsmType::Relation, id, None)
                    .await?;
            }
            return Ok(());
        }

        let node_arrays: Vec<Vec<Coord<f64>>> = self
            .middle
            .ways_get_list(&way_ids)
            .into_iter()
            .map(|w| w.nodes)
            .collect();

        if rel_type == "waterway" {
            if let Some(wkt) = self.builder.build_multilines(&node_arrays, id) {
                self.emit_rows(OsmType::Relation, id, &classification, &wkt)
                    .await?;
            }
        } else {
            for wkt in self.builder.build_both(&node_arrays, id) {
                if is_area_wkt(&wkt) {
                    self.emit_rows(OsmType::Relation, id, &classification, &wkt)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn emit_rows(
        &mut self,
        osm_type: OsmType,
        id: i64,
        classification: &Classification,
        wkt: &str,
    ) -> Result<()> {
        for (class, type_name) in &classification.places {
            let geometry = format!("SRID={};{}", self.config.srid, wkt);
            let row = PlaceRow::new(osm_type, id, class, type_name, classification, geometry);
            self.copy.append(self.db.client(), &row.copy_line()).await?;
        }
        Ok(())
    }

    /// Class-diff delete: drop stored rows whose class the new
    /// classification no longer produces. Must run before the
    /// replacement rows are copied; any active COPY is flushed first.
    async fn delete_unused_classes(
        &mut self,
        osm_type: OsmType,
        id: i64,
        new: Option<&Classification>,
    ) -> Result<()> {
        let lookup = self.lookup.as_ref().ok_or(ImportError::RequiresSlimMode)?;
        let type_param = osm_type.as_char().to_string();

        let rows = lookup
            .db
            .client()
            .query(&lookup.get_classes, &[&type_param, &id])
            .await
            .map_err(ImportError::QueryFailed)?;
        if rows.is_empty() {
            return Ok(());
        }
        let existing: Vec<String> = rows.iter().map(|row| row.get(0)).collect();

        match new.filter(|c| c.is_place()) {
            None => {
                self.copy.end_copy().await?;
                self.db
                    .client()
                    .execute(DELETE_PLACE_SQL, &[&type_param, &id])
                    .await
                    .map_err(ImportError::QueryFailed)?;
            }
            Some(classification) => {
                let stale = stale_classes(existing, classification);
                if !stale.is_empty() {
                    self.copy.end_copy().await?;
                    self.db
                        .client()
                        .execute(DELETE_CLASSES_SQL, &[&type_param, &id, &stale])
                        .await
                        .map_err(ImportError::QueryFailed)?;
                }
            }
        }
        Ok(())
    }

    /// Remove every stored row for the object.
    async fn delete_place(&mut self, osm_type: OsmType, id: i64) -> Result<()> {
        self.copy.end_copy().await?;
        let type_param = osm_type.as_char().to_string();
        self.db
            .client()
            .execute(DELETE_PLACE_SQL, &[&type_param, &id])
            .await
            .map_err(ImportError::QueryFailed)?;
        Ok(())
    }
}

/// Stored classes the new classification no longer produces.
fn stale_classes(existing: Vec<String>, new: &Classification) -> Vec<String> {
    existing
        .into_iter()
        .filter(|cls| !new.classes().any(|k| k == cls.as_str()))
        .collect()
}

fn is_area_wkt(wkt: &str) -> bool {
    wkt.starts_with("POLYGON") || wkt.starts_with("MULTIPOLYGON")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification(classes: &[&str]) -> Classification {
        Classification {
            places: classes
                .iter()
                .map(|c| (c.to_string(), "x".to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_stale_classes_diff() {
        let existing = vec!["highway".to_string(), "amenity".to_string()];
        let stale = stale_classes(existing, &classification(&["highway"]));
        assert_eq!(stale, vec!["amenity".to_string()]);
    }

    #[test]
    fn test_no_stale_classes_when_all_survive() {
        let existing = vec!["highway".to_string()];
        let stale = stale_classes(existing, &classification(&["highway", "tourism"]));
        assert!(stale.is_empty());
    }

    #[test]
    fn test_area_wkt_filter() {
        assert!(is_area_wkt("POLYGON((0 0,1 0,1 1,0 0))"));
        assert!(is_area_wkt("MULTIPOLYGON(((0 0,1 0,1 1,0 0)))"));
        assert!(!is_area_wkt("LINESTRING(0 0,1 1)"));
        assert!(!is_area_wkt("MULTILINESTRING((0 0,1 1))"));
    }
}
