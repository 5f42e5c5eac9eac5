use tempfile::tempdir;

use super::*;
use crate::keys::KeyKind;

const FULL: &str = r#"{
    "name": "orders",
    "temp_directory": "/tmp/reduce-test",
    "logging": { "verbosity": "verbose" },
    "output": { "write_buffering": 2 },
    "processors": [
        { "type": "unique", "keys": [{ "path": "id" }] },
        {
            "type": "map_reduce",
            "id": "totals",
            "sort_keys": [{ "path": "k1", "kind": "int" }, { "path": "ts", "kind": "date", "reverse": true }],
            "hash_key_count": 1,
            "dedup_keys": [{ "field": "k1", "type": "int" }],
            "actions": [{ "type": "add", "source": "amount", "destination": "total" }],
            "fan_out": 8,
            "compress": true,
            "read_parallelism": 2,
            "max_null_key_index": 0
        },
        { "type": "top", "keys": [{ "path": "total", "kind": "long", "reverse": true }], "count": 3 },
        { "type": "repeat", "count": 2, "counter_field": "copy" }
    ]
}"#;

#[test]
fn test_full_config_parses() {
    let config = Config::from_json(FULL).unwrap();

    assert_eq!(config.name, "orders");
    assert_eq!(config.logging.verbosity, "verbose");
    assert_eq!(config.output.write_buffering, 2);
    assert_eq!(config.output.batch_size, crate::constants::DEFAULT_WRITE_BATCH_SIZE_RECORDS);
    assert_eq!(
        config.processors.iter().map(ProcessorConfig::kind).collect::<Vec<_>>(),
        vec!["unique", "map_reduce", "top", "repeat"]
    );

    match &config.processors[1] {
        ProcessorConfig::MapReduce(mr) => {
            assert_eq!(mr.fan_out, 8);
            assert!(mr.compress);
            assert_eq!(mr.sort_keys.len(), 2);
            assert_eq!(mr.sort_keys.keys()[1].kind, KeyKind::Date);
            assert!(mr.sort_keys.keys()[1].reverse);
            assert_eq!(mr.dedup_keys.as_ref().unwrap().keys()[0].kind, KeyKind::Int);
            assert_eq!(mr.actions.len(), 1);
            assert_eq!(mr.directory.as_deref(), Some(std::path::Path::new("/tmp/reduce-test")));
        }
        other => panic!("unexpected processor {:?}", other),
    }
}

#[test]
fn test_defaults_are_filled_in() {
    let config = Config::from_json(
        r#"{ "processors": [{ "type": "map_reduce", "id": "mr", "sort_keys": [{ "path": "a" }] }] }"#,
    )
    .unwrap();

    assert_eq!(config.name, "pipeline");
    assert_eq!(config.logging.verbosity, "normal");
    match &config.processors[0] {
        ProcessorConfig::MapReduce(mr) => {
            assert_eq!(mr.fan_out, crate::constants::DEFAULT_FAN_OUT);
            assert_eq!(mr.read_parallelism, 1);
            assert_eq!(mr.max_null_key_index, i32::MAX);
            assert_eq!(mr.sort_keys.keys()[0].kind, KeyKind::String);
            assert_eq!(mr.directory, Some(config.temp_directory()));
        }
        other => panic!("unexpected processor {:?}", other),
    }
}

#[test]
fn test_invalid_configs_are_rejected() {
    let cases = [
        r#"{ "processors": [] }"#,
        r#"{ "logging": { "verbosity": "loud" }, "processors": [{ "type": "unique", "keys": [{ "path": "a" }] }] }"#,
        r#"{ "processors": [{ "type": "map_reduce", "id": "x", "sort_keys": [] }] }"#,
        r#"{ "processors": [{ "type": "map_reduce", "id": "x", "sort_keys": [{ "path": "a" }], "fan_out": 0 }] }"#,
        r#"{ "processors": [{ "type": "map_reduce", "id": "x", "sort_keys": [{ "path": "a" }], "hash_key_count": 2 }] }"#,
        r#"{ "processors": [{ "type": "map_reduce", "id": "x", "sort_keys": [{ "path": "a" }],
             "actions": [{ "type": "count", "source": "a" }] }] }"#,
        r#"{ "processors": [{ "type": "map_reduce", "id": "../escape", "sort_keys": [{ "path": "a" }] }] }"#,
        r#"{ "processors": [{ "type": "top", "keys": [{ "path": "a" }], "count": 0 }] }"#,
        r#"{ "processors": [{ "type": "repeat", "count": 0 }] }"#,
        r#"{ "processors": [{ "type": "unique", "keys": [{ "path": "a" }] }, { "type": "unique", "keys": [{ "path": "b" }] }] }"#,
        r#"{ "processors": [{ "type": "shuffle" }] }"#,
        r#"{ "output": { "write_buffering": 0 }, "processors": [{ "type": "repeat", "count": 1 }] }"#,
    ];

    for case in cases {
        assert!(Config::from_json(case).is_err(), "accepted: {}", case);
    }
}

#[tokio::test]
async fn test_load_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pipeline.json");
    tokio::fs::write(&path, FULL).await.unwrap();

    let config = Config::load(&path).await.unwrap();
    assert_eq!(config.processors.len(), 4);

    let missing = Config::load(dir.path().join("missing.json")).await;
    assert!(missing.unwrap_err().to_string().contains("Failed to read config file"));
}
