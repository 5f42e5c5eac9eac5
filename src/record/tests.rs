use chrono::{TimeZone, Utc};

use super::*;

#[test]
fn test_record_keeps_field_order() {
    let record = Record::from_json_line(r#"{"zeta":1,"alpha":"a","mid":null}"#).unwrap();
    let names: Vec<&str> = record.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    assert_eq!(record.to_json_line().unwrap(), r#"{"zeta":1,"alpha":"a","mid":null}"#);
}

#[test]
fn test_value_types_from_json() {
    let record =
        Record::from_json_line(r#"{"i":7,"f":1.5,"b":true,"s":"x","n":null,"a":[1,2],"o":{"k":"v"}}"#)
            .unwrap();
    assert_eq!(record.get("i"), Some(&Value::Int(7)));
    assert_eq!(record.get("f"), Some(&Value::Float(1.5)));
    assert_eq!(record.get("b"), Some(&Value::Bool(true)));
    assert_eq!(record.get("s"), Some(&Value::String("x".to_string())));
    assert_eq!(record.get("n"), Some(&Value::Null));
    assert_eq!(
        record.get("a"),
        Some(&Value::Array(vec![Value::Int(1), Value::Int(2)]))
    );
    assert!(matches!(record.get("o"), Some(Value::Object(_))));
}

#[test]
fn test_date_survives_serialization() {
    let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
    let mut record = Record::new();
    record.set("when", date);

    let line = record.to_json_line().unwrap();
    assert!(line.contains("$date"));

    let parsed = Record::from_json_line(&line).unwrap();
    assert_eq!(parsed.get("when"), Some(&Value::Date(date)));
}

#[test]
fn test_non_finite_floats_are_not_written_as_null() {
    for f in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
        let record = Record::from_iter([("sum", Value::Float(f))]);
        assert!(matches!(
            record.to_json_line(),
            Err(crate::error::ReduceError::Serialization(_))
        ));
    }
    let finite = Record::from_iter([("sum", Value::Float(1.5))]);
    assert_eq!(finite.to_json_line().unwrap(), r#"{"sum":1.5}"#);
}

#[test]
fn test_null_like_values() {
    assert!(Value::Null.is_null_like());
    assert!(Value::String(String::new()).is_null_like());
    assert!(!Value::String(" ".to_string()).is_null_like());
    assert!(!Value::Int(0).is_null_like());
}

#[test]
fn test_key_path_evaluation() {
    let record =
        Record::from_json_line(r#"{"customer":{"name":"Ann","orders":[{"id":10},{"id":11}]}}"#).unwrap();

    let name = KeyPath::parse("customer.name").unwrap();
    assert_eq!(name.evaluate(&record), Some(&Value::String("Ann".to_string())));

    let second_order = KeyPath::parse("customer.orders[1].id").unwrap();
    assert_eq!(second_order.evaluate(&record), Some(&Value::Int(11)));

    let missing = KeyPath::parse("customer.orders[5].id").unwrap();
    assert_eq!(missing.evaluate(&record), None);

    let wrong_shape = KeyPath::parse("customer.name.first").unwrap();
    assert_eq!(wrong_shape.evaluate(&record), None);
}

#[test]
fn test_key_path_parse_errors() {
    assert!(KeyPath::parse("").is_err());
    assert!(KeyPath::parse("a..b").is_err());
    assert!(KeyPath::parse("a[x]").is_err());
    assert!(KeyPath::parse("a[1").is_err());
    assert!(KeyPath::parse("a[1]b").is_err());
    assert!(KeyPath::parse(" a.b[2][3] ").is_ok());
}

#[test]
fn test_set_path_creates_objects() {
    let mut record = Record::from_json_line(r#"{"k":1}"#).unwrap();
    let path = KeyPath::parse("stats.total").unwrap();
    record.set_path(&path, Value::Int(9)).unwrap();
    assert_eq!(record.to_json_line().unwrap(), r#"{"k":1,"stats":{"total":9}}"#);

    let bad = KeyPath::parse("k.total").unwrap();
    assert!(record.set_path(&bad, Value::Int(1)).is_err());
}

#[test]
fn test_key_path_deserializes_from_string() {
    let path: KeyPath = serde_json::from_str(r#""a.b[0]""#).unwrap();
    assert_eq!(path.as_str(), "a.b[0]");
    assert!(serde_json::from_str::<KeyPath>(r#""a..b""#).is_err());
}
