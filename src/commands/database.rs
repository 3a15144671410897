use clap::{Args, Subcommand};
use common::Configuration;
use metadata::{
    CatalogLayout, EngineDeclaration, ObjectKind, parse_catalog_file, rewrite_engine_line,
};

use super::print_json;

#[derive(Subcommand)]
pub enum DatabaseAction {
    /// Print the parsed catalog file of a database
    Metadata {
        /// Database name
        database: String,
    },
    /// Rewrite the engine declaration in a database's catalog file
    SetEngine {
        /// Database name
        database: String,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct EngineArgs {
    /// ENGINE = Atomic
    #[arg(long)]
    atomic: bool,

    /// ENGINE = Replicated('<path>', '<shard>', '<replica>')
    #[arg(long, num_args = 3, value_names = ["PATH", "SHARD", "REPLICA"])]
    replicated: Option<Vec<String>>,
}

impl EngineArgs {
    fn declaration(self) -> anyhow::Result<EngineDeclaration> {
        if self.atomic {
            return Ok(EngineDeclaration::Atomic);
        }
        match self.replicated.map(<[String; 3]>::try_from) {
            Some(Ok([replica_path, shard, replica_name])) => Ok(EngineDeclaration::Replicated {
                replica_path,
                shard,
                replica_name,
            }),
            _ => anyhow::bail!("--replicated takes exactly three values: PATH SHARD REPLICA"),
        }
    }
}

impl DatabaseAction {
    pub fn run(self, config: &Configuration) -> anyhow::Result<()> {
        let layout = CatalogLayout::new(&config.paths.clickhouse);

        match self {
            DatabaseAction::Metadata { database } => {
                let path = layout.database_metadata_path(&database);
                let record = parse_catalog_file(&path)?;
                print_json(&serde_json::json!({
                    "database": database,
                    "path": path,
                    "record": record,
                }))?;
            }
            DatabaseAction::SetEngine { database, engine } => {
                let declaration = engine.declaration()?;
                let path = layout.database_metadata_path(&database);

                let record = parse_catalog_file(&path)?;
                if record.kind != ObjectKind::Database {
                    anyhow::bail!(
                        "{} describes a {}, not a database",
                        path.display(),
                        record.kind
                    );
                }

                rewrite_engine_line(&path, &declaration)?;
                log::info!(
                    "Database {database}: engine {} replaced with {declaration}",
                    record.engine_name
                );
            }
        }
        Ok(())
    }
}
