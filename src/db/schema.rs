//! Schema bootstrap for the `place` table.

use tokio_postgres::Statement;
use tracing::info;

use super::PgClient;
use crate::error::{ImportError, Result};

const CREATE_KEYVALUE_TYPE: &str = "CREATE TYPE keyvalue AS (key TEXT, value TEXT)";

const CREATE_WORDSCORE_TYPE: &str = "CREATE TYPE wordscore AS (word TEXT, score FLOAT)";

const GET_CLASSES_SQL: &str = "SELECT class FROM place WHERE osm_type = $1 AND osm_id = $2";

/// Optional tablespace placement for the table and its id index.
#[derive(Debug, Clone, Default)]
pub struct TableSpaces {
    pub data: Option<String>,
    pub index: Option<String>,
}

fn tablespace_clause(tablespace: &Option<String>) -> String {
    match tablespace {
        Some(name) => format!(" TABLESPACE {}", name),
        None => String::new(),
    }
}

/// Drop and recreate the `place` table, its supporting composite
/// types, the id index and the geometry column. Runs inside the
/// import transaction on initial (non-append) imports only.
pub async fn create_place_table(
    db: &PgClient,
    srid: u32,
    tablespaces: &TableSpaces,
) -> Result<()> {
    info!("Creating place table (SRID {})", srid);

    db.batch_execute("DROP TABLE IF EXISTS place").await?;
    db.batch_execute("DROP TYPE IF EXISTS keyvalue CASCADE").await?;
    db.batch_execute("DROP TYPE IF EXISTS wordscore CASCADE").await?;

    db.batch_execute(CREATE_KEYVALUE_TYPE).await?;
    db.batch_execute(CREATE_WORDSCORE_TYPE).await?;

    db.batch_execute(&format!(
        "CREATE TABLE place (\
           osm_type CHAR(1) NOT NULL,\
           osm_id INT8 NOT NULL,\
           class TEXT NOT NULL,\
           type TEXT NOT NULL,\
           name HSTORE,\
           admin_level INTEGER,\
           housenumber TEXT,\
           street TEXT,\
           addr_place TEXT,\
           isin TEXT,\
           country_code VARCHAR(2),\
           postcode TEXT,\
           extratags HSTORE\
         ){}",
        tablespace_clause(&tablespaces.data)
    ))
    .await?;

    db.batch_execute(&format!(
        "CREATE INDEX place_id_idx ON place USING BTREE (osm_type, osm_id){}",
        tablespace_clause(&tablespaces.index)
    ))
    .await?;

    db.batch_execute(&format!(
        "SELECT AddGeometryColumn('place', 'geometry', {}, 'GEOMETRY', 2)",
        srid
    ))
    .await?;
    db.batch_execute("ALTER TABLE place ALTER COLUMN geometry SET NOT NULL")
        .await?;

    Ok(())
}

/// Prepare the class-lookup statement used by the incremental update
/// protocol. Runs on the dedicated query connection in append mode.
pub async fn prepare_get_classes(db: &PgClient) -> Result<Statement> {
    db.client()
        .prepare(GET_CLASSES_SQL)
        .await
        .map_err(ImportError::QueryFailed)
}
