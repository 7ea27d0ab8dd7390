// tests/kwargs_access.rs

use serde_json::{Value, json};

use modulebus::kwargs::Kwargs;

#[test]
fn typed_access() {
    let kwargs = Kwargs::new().with("x", 5).with("text", "hi").with("tags", vec!["a", "b"]);

    assert_eq!(kwargs.get::<i64>("x"), Some(5));
    assert_eq!(kwargs.get::<String>("text").as_deref(), Some("hi"));
    assert_eq!(kwargs.get::<Vec<String>>("tags").unwrap(), vec!["a", "b"]);
    assert_eq!(kwargs.get::<i64>("text"), None);
    assert_eq!(kwargs.len(), 3);
    assert!(kwargs.contains("tags"));
}

#[test]
fn require_names_the_argument() {
    let kwargs = Kwargs::new().with("x", "five");

    let missing = kwargs.require::<i64>("y").unwrap_err();
    assert!(missing.to_string().contains("missing argument `y`"));

    let mistyped = kwargs.require::<i64>("x").unwrap_err();
    assert!(mistyped.to_string().contains("argument `x` has unexpected type"));
}

#[test]
fn conversion_from_json_values() {
    let from_object = Kwargs::from(json!({"a": 1, "b": [true]}));
    assert_eq!(from_object.value("b"), Some(&json!([true])));

    assert!(Kwargs::from(Value::Null).is_empty());

    let scalar = Kwargs::from(json!(3.5));
    assert_eq!(scalar.get::<f64>("value"), Some(3.5));
    assert_eq!(scalar.to_string(), r#"{"value":3.5}"#);
}

#[test]
fn unserializable_values_are_reported_or_nulled() {
    use std::collections::BTreeMap;

    let mut tuple_keys = BTreeMap::new();
    tuple_keys.insert((1, 2), "pair");

    let err = Kwargs::new().try_with("map", &tuple_keys).unwrap_err();
    assert!(err.to_string().contains("key must be a string"), "{err}");

    let lenient = Kwargs::new().with("map", &tuple_keys).with("x", 1);
    assert_eq!(lenient.value("map"), Some(&Value::Null));
    assert_eq!(lenient.get::<i64>("x"), Some(1));
}
