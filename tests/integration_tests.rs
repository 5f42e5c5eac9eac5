use anyhow::Result;
use std::fs;
use std::io::Cursor;
use tempfile::TempDir;
use tuonella_reduce::actions::{ActionRegistry, ScriptArgs};
use tuonella_reduce::config::Config;
use tuonella_reduce::pipeline::{self, build_chain, feed};
use tuonella_reduce::sinks::CollectingEndpoint;
use tuonella_reduce::{PipelineContext, Record, ReduceError, Value};

/// Helper function to write an NDJSON input file
fn create_test_data(temp_dir: &TempDir) -> Result<std::path::PathBuf> {
    let input = temp_dir.path().join("orders.ndjson");
    let lines = [
        r#"{"order":1,"customer":"alice","amount":30,"ts":"2024-01-03T10:00:00Z"}"#,
        r#"{"order":2,"customer":"bob","amount":5,"ts":"2024-01-01T09:00:00Z"}"#,
        "",
        r#"{"order":3,"customer":"Alice","amount":12.5,"ts":"2024-01-02T08:00:00Z"}"#,
        r#"{"order":4,"customer":"","amount":99}"#,
        r#"{"order":5,"customer":"carol","amount":7,"ts":"2024-01-05T11:00:00Z"}"#,
        r#"{"order":1,"customer":"alice","amount":30,"ts":"2024-01-03T10:00:00Z"}"#,
        r#"{"order":6,"customer":"bob","amount":15,"ts":"2024-01-04T12:00:00Z"}"#,
    ];
    fs::write(&input, lines.join("\n"))?;
    Ok(input)
}

/// Helper function to create a test configuration
fn create_test_config(temp_dir: &TempDir) -> Result<Config> {
    let config_content = format!(
        r#"{{
        "name": "orders",
        "temp_directory": "{}",
        "logging": {{ "verbosity": "silent" }},
        "output": {{ "write_buffering": 2, "batch_size": 2 }},
        "processors": [
            {{ "type": "unique", "id": "orders", "keys": [{{ "path": "order", "kind": "int" }}] }},
            {{
                "type": "map_reduce",
                "id": "per_customer",
                "sort_keys": [
                    {{ "path": "customer", "case_insensitive": true }},
                    {{ "path": "ts", "kind": "date" }}
                ],
                "hash_key_count": 1,
                "dedup_keys": [{{ "path": "customer", "case_insensitive": true }}],
                "actions": [
                    {{ "type": "add", "source": "amount", "destination": "total" }},
                    {{ "type": "count", "destination": "orders" }},
                    {{ "type": "add", "source": "order", "destination": "order_ids", "mode": "string", "separator": "," }}
                ],
                "fan_out": 4,
                "compress": true,
                "read_parallelism": 2,
                "max_null_key_index": -1
            }},
            {{ "type": "top", "keys": [{{ "path": "total", "kind": "double", "reverse": true }}], "count": 2 }}
        ]
    }}"#,
        temp_dir.path().join("spill").display()
    );
    Ok(Config::from_json(&config_content)?)
}

fn read_output(path: &std::path::Path) -> Result<Vec<Record>> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .map(|line| Ok(Record::from_json_line(line)?))
        .collect()
}

#[test]
fn test_end_to_end_pipeline() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input = create_test_data(&temp_dir)?;
    let config = create_test_config(&temp_dir)?;
    let output = temp_dir.path().join("out.ndjson");

    let ctx = pipeline::run(&config, &ActionRegistry::new(), &input, Some(&output))?;

    // Record with an empty customer bypasses grouping and reaches top-k unreduced.
    let records = read_output(&output)?;
    assert_eq!(records.len(), 2);

    let alice = &records[0];
    assert_eq!(alice.get("total"), Some(&Value::Float(42.5)));
    assert_eq!(alice.get("orders"), Some(&Value::Int(2)));
    assert_eq!(alice.get("order_ids"), Some(&Value::from("3,1")));
    assert_eq!(alice.get("customer"), Some(&Value::from("Alice")));

    let bob = &records[1];
    assert_eq!(bob.get("total"), Some(&Value::Int(20)));
    assert_eq!(bob.get("order_ids"), Some(&Value::from("2,6")));

    assert_eq!(ctx.counter("input.records"), 7);
    assert_eq!(ctx.counter("orders.dropped"), 1);
    assert_eq!(ctx.counter("per_customer.pass_through"), 1);
    assert_eq!(ctx.counter("per_customer.after_dedup"), 3);
    assert_eq!(ctx.counter("output.records"), 2);

    // Spill files are cleaned up after the run.
    let spill = temp_dir.path().join("spill").join("per_customer");
    assert!(!spill.exists());

    Ok(())
}

#[tokio::test]
async fn test_config_file_round_trip_through_loader() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = create_test_config(&temp_dir)?;
    let path = temp_dir.path().join("pipeline.json");
    tokio::fs::write(&path, serde_json::to_string_pretty(&config)?).await?;

    let loaded = Config::load(&path).await?;
    assert_eq!(loaded.name, "orders");
    assert_eq!(loaded.processors.len(), 3);
    Ok(())
}

#[test]
fn test_script_action_in_chain() -> Result<()> {
    let mut registry = ActionRegistry::new();
    registry.register_fn("first_ts", |args: &ScriptArgs, group: &mut [Record]| {
        let source = args
            .source
            .as_ref()
            .ok_or_else(|| ReduceError::invalid_state("first_ts needs a source"))?;
        let earliest = group
            .iter()
            .filter_map(|r| r.get_path(source).and_then(Value::as_str))
            .min()
            .map(str::to_string);
        if let (Some(ts), Some(target)) = (earliest, args.destination.as_ref()) {
            group[0].set_path(target, Value::from(ts))?;
        }
        Ok(())
    });

    let config = Config::from_json(
        r#"{
        "processors": [{
            "type": "map_reduce",
            "id": "scripted",
            "sort_keys": [{ "path": "k", "kind": "int" }],
            "dedup_keys": [{ "path": "k", "kind": "int" }],
            "actions": [{ "type": "script", "name": "first_ts", "source": "ts", "destination": "since" }],
            "in_memory": true,
            "fan_out": 1
        }]
    }"#,
    )?;

    let sink = CollectingEndpoint::new();
    let mut head = build_chain(&config.processors, &registry, Box::new(sink.clone()))?;
    let mut ctx = PipelineContext::new("scripted");
    let input = "{\"k\":1,\"ts\":\"b\"}\n{\"k\":1,\"ts\":\"a\"}\n\n{\"k\":2,\"ts\":\"c\"}\n";
    let count = feed(Cursor::new(input), head.as_mut(), &mut ctx)?;
    head.finish(&mut ctx)?;

    assert_eq!(count, 3);
    let out = sink.take();
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].get("since"), Some(&Value::from("a")));
    assert_eq!(out[1].get("since"), Some(&Value::from("c")));
    Ok(())
}

#[test]
fn test_malformed_input_names_the_line() -> Result<()> {
    let config = Config::from_json(r#"{ "processors": [{ "type": "repeat", "count": 1 }] }"#)?;
    let sink = CollectingEndpoint::new();
    let mut head = build_chain(&config.processors, &ActionRegistry::new(), Box::new(sink.clone()))?;
    let mut ctx = PipelineContext::default();

    let err = feed(Cursor::new("{\"a\":1}\n\n{\"a\":\n"), head.as_mut(), &mut ctx).unwrap_err();
    assert!(err.to_string().contains("line 3"), "{}", err);
    assert_eq!(sink.len(), 1);
    Ok(())
}

#[test]
fn test_missing_input_file_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = create_test_config(&temp_dir)?;
    let result = pipeline::run(
        &config,
        &ActionRegistry::new(),
        &temp_dir.path().join("missing.ndjson"),
        Some(&temp_dir.path().join("out.ndjson")),
    );
    assert!(result.is_err());
    Ok(())
}
