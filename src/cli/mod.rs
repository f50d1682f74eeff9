//! Command-line front end

mod commands;
pub mod dataset;

pub use commands::{Cli, Commands};
pub use dataset::{Dataset, DatasetFact};

use crate::core::temporal::{TimeInstant, TimeSpan};
use crate::db::TemporalDB;
use crate::entity::SchemaRegistry;
use crate::error::{Error, Result};

/// Execute one parsed command, printing its results to stdout
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Partitions { data } => {
            let store = Dataset::load(&data)?.into_store()?;
            println!("{}\t{}", store.universal_id(), TimeSpan::universal());
            for (id, span) in store.index().iter() {
                println!("{id}\t{span}");
            }
        }
        Commands::Snapshot { data, at } => {
            let instant: TimeInstant = at.parse()?;
            let store = Dataset::load(&data)?.into_store()?;
            let snapshot = store.snapshot_at(instant);
            println!("# valid {}", snapshot.validity()?);
            for fact in snapshot.facts().iter() {
                println!("{fact}");
            }
        }
        Commands::Entities { data, schema, at } => {
            let instant: TimeInstant = at.parse()?;
            let db = open(&data, &schema)?;
            for entity in db.materialize_at(instant).await? {
                println!("{entity}");
            }
        }
        Commands::Timeline {
            data,
            schema,
            entity,
            lifespan,
        } => {
            let lifespan = match lifespan {
                Some(lifespan) => lifespan.parse()?,
                None => TimeSpan::universal(),
            };
            let db = open(&data, &schema)?;
            let timeline = db
                .timeline(&entity, lifespan)
                .await?
                .ok_or_else(|| Error::NotFound(format!("{entity} is not in the dataset")))?;
            for stage in &timeline {
                println!("{stage}");
            }
        }
    }
    Ok(())
}

fn open(data: &std::path::Path, schema: &std::path::Path) -> Result<TemporalDB> {
    let registry = SchemaRegistry::from_path(schema)?;
    let store = Dataset::load(data)?.into_store()?;
    Ok(TemporalDB::with_store(store, registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const DATA: &str = r#"{
        "facts": [
            {"subject": "ex:alice", "predicate": "rdf:type", "object": {"resource": "ex:Person"}},
            {"span": "1900/1950", "subject": "ex:alice", "predicate": "ex:name", "object": {"literal": {"text": "Alice"}}}
        ]
    }"#;

    const SCHEMA: &str = r#"{"types": [
        {"id": "ex:Person", "properties": [{"id": "ex:name", "kind": "literal"}]}
    ]}"#;

    fn files() -> (tempfile::TempDir, String, String) {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data.json");
        let schema = dir.path().join("schema.json");
        std::fs::write(&data, DATA).unwrap();
        std::fs::write(&schema, SCHEMA).unwrap();
        (
            dir,
            data.display().to_string(),
            schema.display().to_string(),
        )
    }

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::parse_from([
            "temporal-graph",
            "-v",
            "timeline",
            "--data",
            "d.json",
            "--schema",
            "s.json",
            "--entity",
            "ex:alice",
        ]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Timeline { lifespan: None, ref entity, .. } if entity == "ex:alice"
        ));
    }

    #[tokio::test]
    async fn test_run_commands() {
        let (_dir, data, schema) = files();
        let (data, schema) = (data.as_str(), schema.as_str());
        for args in [
            vec!["temporal-graph", "partitions", "--data", data],
            vec!["temporal-graph", "snapshot", "--data", data, "--at", "1920"],
            vec!["temporal-graph", "entities", "--data", data, "--schema", schema, "--at", "1920"],
            vec!["temporal-graph", "timeline", "--data", data, "--schema", schema, "--entity", "ex:alice"],
        ] {
            run(Cli::parse_from(args)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_run_reports_missing_entity() {
        let (_dir, data, schema) = files();
        let (data, schema) = (data.as_str(), schema.as_str());
        let cli = Cli::parse_from([
            "temporal-graph",
            "timeline",
            "--data",
            data,
            "--schema",
            schema,
            "--entity",
            "ex:nobody",
        ]);
        assert!(run(cli).await.unwrap_err().is_not_found());
        let cli = Cli::parse_from(["temporal-graph", "snapshot", "--data", data, "--at", "19x"]);
        assert!(matches!(run(cli).await, Err(Error::Validation(_))));
    }
}
