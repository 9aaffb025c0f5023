use std::sync::Arc;

use test_case::test_case;

use super::{RECORDS, load, record};
use crate::{Extractor, LayoutError, Type, extract};

#[test]
fn test_field_order_and_nesting() {
    let interp = load(RECORDS);
    let descriptor = extract(&record(&interp, 1)).unwrap();

    assert_eq!(descriptor.name, "Record");
    let names: Vec<&str> = descriptor.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c", "inner"]);
    assert_eq!(descriptor.fields[0].ty, Type::INT);

    let inner = descriptor.fields[3].ty.class().expect("nested class");
    assert_eq!(inner.name, "Inner");
    assert_eq!(inner.fields[0].ty, Type::INT);
    assert_eq!(inner.fields[1].ty, Type::FLOAT);
}

#[test]
fn test_memoized_by_name() {
    let interp = load(RECORDS);
    let mut extractor = Extractor::new();
    let first = extractor.type_of(&record(&interp, 1)).unwrap();
    let second = extractor.type_of(&record(&interp, 5)).unwrap();
    assert!(Arc::ptr_eq(first.class().unwrap(), second.class().unwrap()));

    let order: Vec<&str> = extractor.classes().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(order, vec!["Inner", "Record"]);
}

#[test]
fn test_list_types() {
    let interp = load(RECORDS);
    let mut extractor = Extractor::new();
    let ints = interp.eval("[1, 2, 3]").unwrap();
    assert_eq!(extractor.type_of(&ints).unwrap(), Type::list_of(Type::INT));
    assert_eq!(extractor.type_of(&ints).unwrap().c_name(), "List<int>");

    let empty = interp.eval("[]").unwrap();
    assert!(matches!(extractor.type_of(&empty), Err(LayoutError::EmptyCollection { .. })));
}

#[test_case("class S:\n    def __init__(self):\n        self.label = 'x'\n", "str"; "text field")]
#[test_case("class S:\n    def __init__(self):\n        self.big = 10000000000\n", "bigint"; "arbitrary precision field")]
#[test_case("class S:\n    def __init__(self):\n        self.nothing = None\n", "NoneType"; "none field")]
#[test_case("class S:\n    def __init__(self):\n        self.items = [1]\n", "list"; "list field")]
fn test_unsupported_field(source: &str, expected: &str) {
    let interp = load(source);
    let err = extract(&interp.eval("S()").unwrap()).unwrap_err();
    let LayoutError::UnsupportedField { class, type_name, .. } = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(class, "S");
    assert_eq!(type_name, expected);
}

#[test]
fn test_self_containment_is_rejected() {
    let interp = load("class Node:\n    def __init__(self):\n        self.value = 1\n\ndef link(n):\n    n.next = n\n    return n\n");
    let node = interp.eval("link(Node())").unwrap();
    assert!(matches!(extract(&node), Err(LayoutError::RecursiveClass { .. })));
}
