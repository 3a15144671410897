use metadata::{
    CatalogLayout, Engine, EngineDeclaration, MetadataError, ObjectKind, ParseError, TableSelector,
    parse_catalog_file, rewrite_engine_line, rewrite_uuid,
};
use serde_json::json;
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use tempfile::TempDir;
use uuid::Uuid;

const DB_UUID: &str = "8a9e5c3d-51f2-4c6b-a7d8-3b2e1f0c9d4a";

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn mode(path: &Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_replicated_database_parameters_survive_parsing() {
    let dir = TempDir::new().unwrap();
    let cases = [
        ("/clickhouse/databases/analytics", "01", "replica-1"),
        ("/zk/{shard}/db with spaces", "{shard}", "{replica}"),
        ("p", "s", "r"),
    ];

    for (path, shard, replica) in cases {
        let file = write(
            &dir,
            "analytics.sql",
            &format!(
                "ATTACH DATABASE _ UUID '{DB_UUID}'\nENGINE = Replicated('{path}', '{shard}', '{replica}')\n"
            ),
        );
        let record = parse_catalog_file(&file).unwrap();

        assert_eq!(record.kind, ObjectKind::Database);
        let params = record.engine.replica().expect("replicated");
        assert_eq!(params.replica_path, path);
        assert_eq!(params.shard.as_deref(), Some(shard));
        assert_eq!(params.replica_name, replica);
    }
}

#[test]
fn test_non_replicated_database_parses() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "default.sql",
        &format!("ATTACH DATABASE _ UUID '{DB_UUID}'\nENGINE = Atomic\n"),
    );

    let record = parse_catalog_file(&file).unwrap();
    assert_eq!(record.uuid, Uuid::parse_str(DB_UUID).unwrap());
    assert_eq!(record.engine, Engine::NonReplicated);
}

#[test]
fn test_missing_file_is_io_error_with_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.sql");

    let err = parse_catalog_file(&path).unwrap_err();
    assert!(matches!(err, MetadataError::Io { .. }));
    assert_eq!(err.path(), path.as_path());
}

#[test]
fn test_malformed_file_reports_parse_error() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "broken.sql",
        &format!("ATTACH DATABASE _ UUID '{DB_UUID}'\nENGINE = Replicated('/p', 's')\n"),
    );

    match parse_catalog_file(&file) {
        Err(MetadataError::Parse { source, .. }) => assert_eq!(
            source,
            ParseError::ReplicatedArity {
                engine: "Replicated".to_string(),
                expected: "exactly 3",
                found: 2
            }
        ),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_engine_rewrite_changes_only_the_engine_line() {
    let dir = TempDir::new().unwrap();
    let original = format!(
        "ATTACH DATABASE _ UUID '{DB_UUID}'\r\nENGINE = Atomic\nCOMMENT 'kept as is'\n\n-- trailing\n"
    );
    let file = write(&dir, "analytics.sql", &original);

    rewrite_engine_line(
        &file,
        &EngineDeclaration::Replicated {
            replica_path: "/clickhouse/databases/analytics".to_string(),
            shard: "{shard}".to_string(),
            replica_name: "{replica}".to_string(),
        },
    )
    .unwrap();

    let rewritten = fs::read_to_string(&file).unwrap();
    let before: Vec<&str> = original.split_inclusive('\n').collect();
    let after: Vec<&str> = rewritten.split_inclusive('\n').collect();
    assert_eq!(before.len(), after.len());
    for (index, (old, new)) in before.iter().zip(&after).enumerate() {
        if index == 1 {
            assert_eq!(
                *new,
                "ENGINE = Replicated('/clickhouse/databases/analytics', '{shard}', '{replica}')\n"
            );
        } else {
            assert_eq!(old, new, "line {index} changed");
        }
    }

    // the rewritten declaration parses back
    let record = parse_catalog_file(&file).unwrap();
    assert_eq!(
        record.engine.replica().unwrap().replica_path,
        "/clickhouse/databases/analytics"
    );

    // and back to Atomic
    rewrite_engine_line(&file, &EngineDeclaration::Atomic).unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), original);
    assert_eq!(entries(dir.path()), vec!["analytics.sql"]);
}

#[test]
fn test_uuid_rewrite_keeps_the_rest_of_the_table_definition() {
    let dir = TempDir::new().unwrap();
    let layout = CatalogLayout::new(dir.path());
    let table = TableSelector::new("db", "events");
    let path = layout.table_metadata_path(&table);
    fs::create_dir_all(path.parent().unwrap()).unwrap();

    let old = "11111111-1111-4111-8111-111111111111";
    let new = Uuid::parse_str("22222222-2222-4222-8222-222222222222").unwrap();
    let original = format!(
        "ATTACH TABLE _ UUID '{old}'\n(\n    `id` UInt64,\n    `payload` String\n)\nENGINE = MergeTree\nORDER BY id\nSETTINGS index_granularity = 8192\n"
    );
    fs::write(&path, &original).unwrap();

    let previous = rewrite_uuid(&path, new).unwrap();

    assert_eq!(previous.to_string(), old);
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        original.replace(old, &new.to_string())
    );
    assert_eq!(parse_catalog_file(&path).unwrap().uuid, new);
}

#[test]
fn test_uuid_rewrite_keeps_mode_and_owner() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "events.sql",
        "ATTACH TABLE _ UUID '11111111-1111-4111-8111-111111111111'\nENGINE = MergeTree\n",
    );
    fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();
    let owner = fs::metadata(&file).unwrap();

    rewrite_uuid(&file, Uuid::parse_str(DB_UUID).unwrap()).unwrap();

    let rewritten = fs::metadata(&file).unwrap();
    assert_eq!(mode(&file), 0o600);
    assert_eq!(rewritten.uid(), owner.uid());
    assert_eq!(rewritten.gid(), owner.gid());
    assert_eq!(entries(dir.path()), vec!["events.sql"]);
}

#[test]
fn test_engine_rewrite_keeps_mode() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "analytics.sql",
        &format!("ATTACH DATABASE _ UUID '{DB_UUID}'\nENGINE = Atomic\n"),
    );
    fs::set_permissions(&file, fs::Permissions::from_mode(0o640)).unwrap();

    rewrite_engine_line(
        &file,
        &EngineDeclaration::Replicated {
            replica_path: "/clickhouse/databases/analytics".to_string(),
            shard: "01".to_string(),
            replica_name: "replica-1".to_string(),
        },
    )
    .unwrap();

    assert_eq!(mode(&file), 0o640);
    assert_eq!(parse_catalog_file(&file).unwrap().engine_name, "Replicated");
}

#[test]
fn test_parsed_record_serializes_for_display() {
    let dir = TempDir::new().unwrap();
    let database = write(
        &dir,
        "analytics.sql",
        &format!(
            "ATTACH DATABASE _ UUID '{DB_UUID}'\nENGINE = Replicated('/clickhouse/databases/analytics', '01', 'replica-1')\n"
        ),
    );
    let table = write(
        &dir,
        "events.sql",
        &format!("ATTACH TABLE _ UUID '{DB_UUID}'\nENGINE = MergeTree\nORDER BY id\n"),
    );

    assert_eq!(
        serde_json::to_value(parse_catalog_file(&database).unwrap()).unwrap(),
        json!({
            "kind": "database",
            "uuid": DB_UUID,
            "engine_name": "Replicated",
            "engine": {
                "type": "replicated",
                "replica_path": "/clickhouse/databases/analytics",
                "shard": "01",
                "replica_name": "replica-1",
            },
        })
    );
    assert_eq!(
        serde_json::to_value(parse_catalog_file(&table).unwrap()).unwrap(),
        json!({
            "kind": "table",
            "uuid": DB_UUID,
            "engine_name": "MergeTree",
            "engine": { "type": "non_replicated" },
        })
    );
}
