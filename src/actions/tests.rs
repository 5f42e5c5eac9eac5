use super::*;
use crate::record::Value;

fn rec(json: &str) -> Record {
    Record::from_json_line(json).unwrap()
}

fn run(spec: ActionSpec, mut group: Vec<Record>) -> Record {
    let action = spec.build(&ActionRegistry::new()).unwrap();
    let mut ctx = PipelineContext::new("test");
    action.reduce(&mut ctx, &mut group).unwrap();
    group.into_iter().next().unwrap()
}

#[test]
fn test_add_into_destination() {
    let spec = ActionSpec::new(ActionKind::Add, "amount").unwrap().to("total").unwrap();
    let reduced = run(
        spec,
        vec![rec(r#"{"k1":1,"amount":3}"#), rec(r#"{"k1":1,"amount":4}"#)],
    );
    assert_eq!(reduced, rec(r#"{"k1":1,"amount":3,"total":7}"#));
}

#[test]
fn test_add_in_place_mixes_ints_and_floats() {
    let spec = ActionSpec::new(ActionKind::Add, "amount").unwrap();
    let reduced = run(
        spec,
        vec![
            rec(r#"{"amount":1}"#),
            rec(r#"{"amount":2.5}"#),
            rec(r#"{"amount":null}"#),
            rec(r#"{"other":true}"#),
        ],
    );
    assert_eq!(reduced.get("amount"), Some(&Value::Float(3.5)));
}

#[test]
fn test_add_accepts_numeric_strings_and_overflows_to_float() {
    let spec = ActionSpec::new(ActionKind::Add, "n").unwrap();
    let reduced = run(spec.clone(), vec![rec(r#"{"n":"10"}"#), rec(r#"{"n":5}"#)]);
    assert_eq!(reduced.get("n"), Some(&Value::Int(15)));

    let huge = format!(r#"{{"n":{}}}"#, i64::MAX);
    let reduced = run(spec, vec![rec(&huge), rec(r#"{"n":1}"#)]);
    assert!(matches!(reduced.get("n"), Some(Value::Float(_))));
}

#[test]
fn test_add_rejects_non_numeric() {
    let action = ActionSpec::new(ActionKind::Add, "n")
        .unwrap()
        .build(&ActionRegistry::new())
        .unwrap();
    let mut group = vec![rec(r#"{"n":1}"#), rec(r#"{"n":"abc"}"#)];
    let err = action
        .reduce(&mut PipelineContext::default(), &mut group)
        .unwrap_err();
    assert!(matches!(err, ReduceError::Action { ref action, .. } if action == "add"));
}

#[test]
fn test_add_string_mode_concatenates() {
    let spec = ActionSpec::new(ActionKind::Add, "tag")
        .unwrap()
        .to("tags")
        .unwrap()
        .with_mode(ActionMode::String)
        .with_separator("|");
    let reduced = run(
        spec,
        vec![rec(r#"{"tag":"a"}"#), rec(r#"{"tag":""}"#), rec(r#"{"tag":"b"}"#), rec(r#"{"tag":3}"#)],
    );
    assert_eq!(reduced.get("tags"), Some(&Value::from("a|b|3")));
}

#[test]
fn test_min_and_max() {
    let group = || vec![rec(r#"{"v":5}"#), rec(r#"{"v":-2}"#), rec(r#"{"v":9.5}"#)];

    let min = run(ActionSpec::new(ActionKind::Min, "v").unwrap().to("lo").unwrap(), group());
    assert_eq!(min.get("lo"), Some(&Value::Int(-2)));

    let max = run(ActionSpec::new(ActionKind::Max, "v").unwrap().to("hi").unwrap(), group());
    assert_eq!(max.get("hi"), Some(&Value::Float(9.5)));
    assert_eq!(max.get("v"), Some(&Value::Int(5)));
}

#[test]
fn test_min_string_mode() {
    let spec = ActionSpec::new(ActionKind::Min, "name")
        .unwrap()
        .with_mode(ActionMode::String);
    let reduced = run(
        spec,
        vec![rec(r#"{"name":"pear"}"#), rec(r#"{"name":"apple"}"#), rec(r#"{"name":"fig"}"#)],
    );
    assert_eq!(reduced.get("name"), Some(&Value::from("apple")));
}

#[test]
fn test_mean_and_count() {
    let group = || vec![rec(r#"{"v":1}"#), rec(r#"{"v":2}"#), rec(r#"{"w":0}"#), rec(r#"{"v":6}"#)];

    let mean = run(ActionSpec::new(ActionKind::Mean, "v").unwrap().to("avg").unwrap(), group());
    assert_eq!(mean.get("avg"), Some(&Value::Float(3.0)));

    let count = run(ActionSpec::new(ActionKind::Count, "v").unwrap().to("n").unwrap(), group());
    assert_eq!(count.get("n"), Some(&Value::Int(3)));

    let spec: ActionSpec = serde_json::from_str(r#"{"type":"count","destination":"size"}"#).unwrap();
    let size = run(spec, group());
    assert_eq!(size.get("size"), Some(&Value::Int(4)));
}

#[test]
fn test_group_without_values_leaves_target_alone() {
    let spec = ActionSpec::new(ActionKind::Add, "amount").unwrap().to("total").unwrap();
    let reduced = run(spec, vec![rec(r#"{"k":1}"#), rec(r#"{"k":1,"amount":null}"#)]);
    assert!(!reduced.contains("total"));
}

#[test]
fn test_nested_destination() {
    let spec = ActionSpec::new(ActionKind::Add, "amount")
        .unwrap()
        .to("stats.total")
        .unwrap();
    let reduced = run(spec, vec![rec(r#"{"amount":2}"#), rec(r#"{"amount":2}"#)]);
    assert_eq!(reduced.to_json_line().unwrap(), r#"{"amount":2,"stats":{"total":4}}"#);
}

#[test]
fn test_spec_validation() {
    let mean_text = ActionSpec::new(ActionKind::Mean, "v")
        .unwrap()
        .with_mode(ActionMode::String);
    assert!(matches!(mean_text.validate(), Err(ReduceError::Config { .. })));

    let no_source: ActionSpec = serde_json::from_str(r#"{"type":"max"}"#).unwrap();
    assert!(no_source.validate().is_err());

    let bad_separator = ActionSpec::new(ActionKind::Add, "v").unwrap().with_separator(",");
    assert!(bad_separator.validate().is_err());

    let unknown = serde_json::from_str::<ActionSpec>(r#"{"type":"median","source":"v"}"#);
    assert!(unknown.is_err());
}

#[test]
fn test_script_actions_come_from_registry() {
    let mut registry = ActionRegistry::new();
    registry.register_fn("longest", |args: &ScriptArgs, group: &mut [Record]| {
        let source = args.source.as_ref().ok_or_else(|| ReduceError::invalid_state("no source"))?;
        let longest = group
            .iter()
            .filter_map(|r| r.get_path(source).and_then(Value::as_str))
            .max_by_key(|s| s.len())
            .map(str::to_string);
        if let (Some(text), Some(target)) = (longest, args.destination.as_ref()) {
            group[0].set_path(target, Value::String(text))?;
        }
        Ok(())
    });
    assert_eq!(registry.names(), vec!["longest"]);

    let spec: ActionSpec =
        serde_json::from_str(r#"{"type":"script","name":"longest","source":"s","destination":"best"}"#)
            .unwrap();
    let action = spec.build(&registry).unwrap();
    assert_eq!(action.name(), "longest");

    let mut group = vec![rec(r#"{"s":"ab"}"#), rec(r#"{"s":"abcd"}"#), rec(r#"{"s":"abc"}"#)];
    action.reduce(&mut PipelineContext::default(), &mut group).unwrap();
    assert_eq!(group[0].get("best"), Some(&Value::from("abcd")));

    let missing = ActionSpec::script("nope").build(&registry);
    assert!(matches!(missing, Err(ReduceError::Config { .. })));
}

#[test]
fn test_script_errors_are_tagged_with_action_name() {
    let mut registry = ActionRegistry::new();
    registry.register_fn("fails", |_: &ScriptArgs, _: &mut [Record]| {
        Err(ReduceError::invalid_state("bad group"))
    });
    let action = ActionSpec::script("fails").build(&registry).unwrap();
    let err = action
        .reduce(&mut PipelineContext::default(), &mut [rec("{}")])
        .unwrap_err();
    assert!(matches!(err, ReduceError::Action { ref action, .. } if action == "fails"));
}

#[test]
fn test_apply_actions_runs_in_order() {
    let specs = vec![
        ActionSpec::new(ActionKind::Add, "v").unwrap(),
        ActionSpec::new(ActionKind::Count, "v").unwrap().to("n").unwrap(),
    ];
    let actions = build_actions(&specs, &ActionRegistry::new()).unwrap();
    let mut group = vec![rec(r#"{"v":1}"#), rec(r#"{"v":2}"#)];
    apply_actions(&actions, &mut PipelineContext::default(), &mut group).unwrap();
    assert_eq!(group[0], rec(r#"{"v":3,"n":2}"#));
}
