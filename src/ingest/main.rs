//! OSM PBF ingest pipeline.
//!
//! Parses OSM data, classifies objects into place rows and bulk-loads
//! them into the PostgreSQL `place` table.

mod config;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use osmpbfreader::{OsmId, OsmObj, OsmPbfReader};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use banyan::db::TableSpaces;
use banyan::middle::SlimStore;
use banyan::models::{Member, OsmType, TagMap};
use banyan::writer::{PlaceWriter, WriterConfig};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Import OSM PBF data into the place table")]
struct Args {
    /// OSM PBF file to import
    #[arg(short, long)]
    file: PathBuf,

    /// PostgreSQL connection string
    #[arg(long)]
    database_url: Option<String>,

    /// Append to an existing place table (diff mode)
    #[arg(long)]
    append: bool,

    /// Slim mode: retain object identity, allow modify/delete
    #[arg(long)]
    slim: bool,

    /// SRID of the geometry column
    #[arg(long)]
    srid: Option<u32>,

    /// Tablespace for the place table
    #[arg(long)]
    tablespace_data: Option<String>,

    /// Tablespace for the place id index
    #[arg(long)]
    tablespace_index: Option<String>,

    /// Skip polygons that do not assemble cleanly
    #[arg(long)]
    exclude_broken_polygons: bool,

    /// Path to TOML configuration file (flags override it)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let file_config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };

    if args.append && !args.slim {
        anyhow::bail!("cannot apply diffs unless in slim mode");
    }

    let writer_config = WriterConfig {
        conninfo: args
            .database_url
            .clone()
            .or(file_config.database_url)
            .unwrap_or_else(|| "host=localhost user=postgres".to_string()),
        append: args.append,
        slim: args.slim,
        srid: args.srid.or(file_config.srid).unwrap_or(4326),
        tablespaces: TableSpaces {
            data: args.tablespace_data.clone().or(file_config.tablespace_data),
            index: args
                .tablespace_index
                .clone()
                .or(file_config.tablespace_index),
        },
        exclude_broken_polygons: args.exclude_broken_polygons,
    };

    info!("Banyan Ingest Pipeline");
    info!("File: {}", args.file.display());

    let file = File::open(&args.file).context("Failed to open PBF file")?;
    let mut reader = OsmPbfReader::new(BufReader::new(file));
    let middle = Arc::new(SlimStore::build(&mut reader)?);

    let mut writer = PlaceWriter::connect(writer_config, middle)
        .await
        .context("Failed to connect to PostgreSQL")?;
    writer.start().await?;
    info!("Connected, transaction open");

    // Re-open for the processing pass.
    let file = File::open(&args.file)?;
    let mut reader = OsmPbfReader::new(BufReader::new(file));

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template(
        "{spinner:.green} [{elapsed_precise}] {pos} objects processed ({per_sec})",
    )?);

    info!("Processing OSM objects...");
    for obj_result in reader.iter() {
        pb.inc(1);

        let obj = match obj_result {
            Ok(o) => o,
            Err(e) => {
                warn!("Error reading OSM object: {}", e);
                continue;
            }
        };

        dispatch(&mut writer, &obj, args.append).await?;
    }
    pb.finish_with_message("Processing complete");

    let rows = writer.stop().await?;
    info!("Imported {} place rows", rows);

    Ok(())
}

/// Feed one object to the writer. In append mode every object comes
/// in as a modification, so stale classifications get torn down.
async fn dispatch(writer: &mut PlaceWriter<SlimStore>, obj: &OsmObj, append: bool) -> Result<()> {
    match obj {
        OsmObj::Node(node) => {
            let tags = TagMap::from(&node.tags);
            if append {
                writer
                    .node_modify(node.id.0, node.lat(), node.lon(), &tags)
                    .await?;
            } else {
                writer
                    .node_add(node.id.0, node.lat(), node.lon(), &tags)
                    .await?;
            }
        }
        OsmObj::Way(way) => {
            let tags = TagMap::from(&way.tags);
            let nodes: Vec<i64> = way.nodes.iter().map(|n| n.0).collect();
            if append {
                writer.way_modify(way.id.0, &nodes, &tags).await?;
            } else {
                writer.way_add(way.id.0, &nodes, &tags).await?;
            }
        }
        OsmObj::Relation(rel) => {
            let tags = TagMap::from(&rel.tags);
            let members: Vec<Member> = rel
                .refs
                .iter()
                .map(|r| Member {
                    osm_type: member_type(r.member),
                    id: r.member.inner_id(),
                })
                .collect();
            if append {
                writer.relation_modify(rel.id.0, &members, &tags).await?;
            } else {
                writer.relation_add(rel.id.0, &members, &tags).await?;
            }
        }
    }
    Ok(())
}

fn member_type(id: OsmId) -> OsmType {
    match id {
        OsmId::Node(_) => OsmType::Node,
        OsmId::Way(_) => OsmType::Way,
        OsmId::Relation(_) => OsmType::Relation,
    }
}
