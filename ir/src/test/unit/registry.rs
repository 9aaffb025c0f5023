use super::{RECORDS, load, record};
use crate::{ClosureParam, Error, LayoutError, Registry, TraceError, Type, trace};
use gpumap_host::Value;

fn registry_for(source: &str, entry: &str, arg: Value) -> Result<Registry, Error> {
    let interp = load(source);
    let func = interp.global(entry).unwrap();
    let traced = trace(&interp, &func, vec![arg]).unwrap();
    Registry::from_bindings(&traced.bindings)
}

#[test]
fn test_functions_and_methods() {
    let interp = load(RECORDS);
    let func = interp.global("total").unwrap();
    let traced = trace(&interp, &func, vec![record(&interp, 1)]).unwrap();
    let registry = Registry::from_bindings(&traced.bindings).unwrap();

    let total = registry.function("total").unwrap();
    assert_eq!(total.param_types[0].c_name(), "Record");
    assert_eq!(total.ret.as_ref().map(Type::c_name).as_deref(), Some("Record"));

    let bump = registry.method("Record", "bump").unwrap();
    assert_eq!(bump.receiver(), "self");
    assert_eq!(bump.args().map(|(n, t)| (n.to_string(), t.clone())).collect::<Vec<_>>(), vec![("n".to_string(), Type::INT)]);
    assert!(bump.function.ret.is_none());
    assert!(!bump.is_constructor);

    let init = registry.method("Record", "__init__").unwrap();
    assert!(init.is_constructor);
    assert_eq!(init.args().count(), 4);

    let classes: Vec<&str> = registry.classes().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(classes, vec!["Inner", "Record"]);
    assert_eq!(registry.methods_of("Inner").count(), 1);
}

#[test]
fn test_text_argument_is_a_layout_error() {
    let source = "def shout(s):\n    return 1\n";
    let err = registry_for(source, "shout", Value::str("hi")).unwrap_err();
    assert!(matches!(err, Error::Layout { source: LayoutError::UnsupportedArgument { .. } }), "{err}");
}

#[test]
fn test_text_return_is_a_trace_error() {
    let source = "def name(x):\n    return 'x'\n";
    let err = registry_for(source, "name", Value::Int(1)).unwrap_err();
    assert!(matches!(err, Error::Trace { source: TraceError::UntranslatableReturn { .. } }), "{err}");
}

#[test]
fn test_closure_params() {
    let mut registry = registry_for("def f(x):\n    return x\n", "f", Value::Int(1)).unwrap();
    registry.append_closure_params("f", vec![ClosureParam { name: "k".into(), ty: Type::FLOAT }]).unwrap();
    assert_eq!(registry.function("f").unwrap().closure_param("k").map(|c| &c.ty), Some(&Type::FLOAT));
    assert!(matches!(registry.append_closure_params("g", vec![]), Err(Error::UnknownFunction { .. })));
}
