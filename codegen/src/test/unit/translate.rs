use gpumap_ir::{ClosureParam, Type};
use test_case::test_case;

use super::{RECORD_ARG, RECORDS, convert_function, registry_for, translate};
use crate::cuda::function::{Callable, convert};
use crate::{Construct, Error};

#[test_case("return x + 1", "return (x + 1);" ; "addition")]
#[test_case("return 0 < x < 10", "return ((0 < x) && (x < 10));" ; "comparison chain")]
#[test_case("return x > 0 and x < 5 or x == 7", "return (((x > 0) && (x < 5)) || (x == 7));" ; "boolean operators")]
#[test_case("return x * 2.5", "return (x * 2.5f);" ; "float literal")]
#[test_case("return x // 2", "return int(x / 2);" ; "floor division")]
#[test_case("return x / 2", "return (float(x) / 2);" ; "true division")]
#[test_case("return x % 2", "return (x % 2);" ; "integer modulo")]
#[test_case("return x * 1.5 % 2", "return fmodf((x * 1.5f), 2);" ; "float modulo")]
#[test_case("return x ** 2", "return py_ipow(x, 2);" ; "integer power")]
#[test_case("return x ** 0.5", "return pow(float(x), float(0.5f));" ; "float power")]
#[test_case("return 1 if x > 0 else 2", "return ((x > 0) ? 1 : 2);" ; "conditional expression")]
#[test_case("return not x", "return (!x);" ; "negation")]
#[test_case("return -x", "return (-x);" ; "unary minus")]
#[test_case("return abs(x) + min(x, 2, 3)", "return (py_abs(x) + py_min(py_min(x, 2), 3));" ; "builtins")]
#[test_case("return math.sqrt(x) + math.pi", "return (sqrtf(x) + 3.1415927f);" ; "math module")]
#[test_case("return math.floor(x / 3)", "return int(floorf((float(x) / 3)));" ; "math floor is integral")]
#[test_case("return True", "return true;" ; "boolean literal")]
#[test_case("print('x =', x)\n    return x", "print(\"x =\", x);" ; "print")]
fn test_expression(body: &str, expected: &str) {
    let source = format!("import math\n\ndef f(x):\n    {body}\n");
    let code = translate(&source, "3").unwrap_or_else(|e| panic!("{e}"));
    assert!(code.contains(expected), "{code}");
}

#[test]
fn test_declarations_are_qualified_once() {
    let source = r#"
class P:
    def __init__(self, v):
        self.v = v

def f(x):
    """Docstrings are dropped."""
    y = x + 1
    y = y * 2
    p = P(y)
    q = p.v
    return q
"#;
    let expected = "\
__device__ int f(int x) {
    auto y = (x + 1);
    y = (y * 2);
    auto&& p = P(y);
    auto q = p.v;
    return q;
}";
    assert_eq!(translate(source, "3").unwrap(), expected);
}

#[test]
fn test_range_loop() {
    let source = "def f(n):\n    total = 0\n    for i in range(n):\n        total += i\n    return total\n";
    let expected = "\
__device__ int f(int n) {
    auto total = 0;
    auto __iterator_1 = RangeIterator(0, n, 1);
    while (__iterator_1.has_next()) {
        int i = __iterator_1.next();
        total = (total + i);
    }
    return total;
}";
    assert_eq!(translate(source, "4").unwrap(), expected);
}

#[test]
fn test_loop_variables_are_scoped_to_the_loop() {
    let source = r#"
def f(n):
    s = 0
    for i in range(n):
        s += i
    for i in range(0, n, 2):
        s -= i
    return s
"#;
    let code = translate(source, "4").unwrap();
    assert!(code.contains("auto __iterator_2 = RangeIterator(0, n, 2);"), "{code}");
    assert_eq!(code.matches("int i = ").count(), 2, "{code}");
}

#[test]
fn test_iterator_numbering_restarts_per_conversion() {
    let source = r#"
def g(n):
    t = 0
    for i in range(n):
        t += i
    return t

def f(n):
    t = 0
    for i in range(n):
        t += g(i)
    return t
"#;
    let registry = registry_for(source, "f", "3");
    for name in ["f", "g"] {
        let code = convert_function(&registry, name).unwrap();
        assert!(code.contains("auto __iterator_1 = "), "{code}");
        assert!(!code.contains("__iterator_2"), "{code}");
    }
}

#[test]
fn test_if_elif_else() {
    let source = "def f(x):\n    if x > 0:\n        return 1\n    elif x < 0:\n        return -1\n    else:\n        return 0\n";
    let expected = "\
__device__ int f(int x) {
    if ((x > 0)) {
        return 1;
    } else {
        if ((x < 0)) {
            return (-1);
        } else {
            return 0;
        }
    }
}";
    assert_eq!(translate(source, "5").unwrap(), expected);
}

#[test]
fn test_while_loop() {
    let source = r#"
def f(x):
    n = 0
    while x > 1:
        x = x // 2
        n += 1
        if n > 100:
            break
    return n
"#;
    let expected = "\
__device__ int f(int x) {
    auto n = 0;
    while ((x > 1)) {
        x = int(x / 2);
        n = (n + 1);
        if ((n > 100)) {
            break;
        }
    }
    return n;
}";
    assert_eq!(translate(source, "40").unwrap(), expected);
}

#[test]
fn test_method_receiver_is_rewritten() {
    let registry = registry_for(RECORDS, "total", RECORD_ARG);
    let bump = registry.method("Record", "bump").unwrap();
    let expected = "\
__device__ void Record::bump(int n) {
    (*this).a = ((*this).a + n);
    (*this).inner.x = ((*this).inner.x + n);
}";
    assert_eq!(convert(&registry, Callable::Method(bump), 0, &[]).unwrap(), expected);
}

#[test]
fn test_constructor_definition() {
    let registry = registry_for(RECORDS, "total", RECORD_ARG);
    let init = registry.method("Inner", "__init__").unwrap();
    let code = convert(&registry, Callable::Method(init), 0, &[]).unwrap();
    assert!(code.starts_with("__device__ Inner::Inner(int x, float y) {"), "{code}");
    assert!(code.contains("    (*this).x = x;"), "{code}");
}

#[test]
fn test_class_parameters_have_one_variant_per_qualifier() {
    let registry = registry_for(RECORDS, "total", RECORD_ARG);
    let total = registry.function("total").unwrap();
    let code = |variant| convert(&registry, Callable::Function(total), variant, &[]).unwrap();
    assert!(code(0).starts_with("__device__ Record total(Record&& r) {"));
    assert!(code(1).starts_with("__device__ Record total(Record& r) {"));
    assert!(code(0).contains("    r.bump(1);"));
    assert!(code(0).contains("return Record(r.a, (r.a + r.b), ((r.a + r.b) + r.c), Inner(r.inner.x, (r.inner.x + r.inner.y)));"));
}

#[test]
fn test_undeclared_field_assignment() {
    let source = r#"
class P:
    def __init__(self, x):
        self.x = x

    def tag(self, flag):
        if flag:
            self.y = 1
        return self.x

def f(p):
    return p.tag(False)
"#;
    let registry = registry_for(source, "f", "P(1)");
    let tag = registry.method("P", "tag").unwrap();
    let err = convert(&registry, Callable::Method(tag), 0, &[]).unwrap_err();
    assert!(matches!(&err, Error::UndeclaredField { class, field } if class == "P" && field == "y"), "{err}");
}

#[test]
fn test_captures_extend_signatures_and_call_sites() {
    let source = "K = 3\n\ndef g(y):\n    return y * K\n\ndef f(x):\n    return g(x) + K\n";
    let mut registry = registry_for(source, "f", "2");
    registry.append_closure_params("f", vec![ClosureParam { name: "K".into(), ty: Type::INT }]).unwrap();

    let f = convert_function(&registry, "f").unwrap();
    assert!(f.starts_with("__device__ int f(int x, int __cap_K) {"), "{f}");
    assert!(f.contains("return (g(x, __cap_K) + __cap_K);"), "{f}");

    let captures = registry.function("f").unwrap().closure.clone();
    let g = registry.function("g").unwrap();
    let g = convert(&registry, Callable::Function(g), 0, &captures).unwrap();
    assert!(g.starts_with("__device__ int g(int y, int __cap_K) {"), "{g}");
    assert!(g.contains("return (y * __cap_K);"), "{g}");
}

#[test]
fn test_constructors_and_methods_take_captures() {
    let source = r#"
K = 3

class P:
    def __init__(self, v):
        self.v = v * K

    def get(self):
        return self.v + K

def f(x):
    return P(x).get()
"#;
    let mut registry = registry_for(source, "f", "2");
    registry.append_closure_params("f", vec![ClosureParam { name: "K".into(), ty: Type::INT }]).unwrap();
    let captures = registry.function("f").unwrap().closure.clone();

    let f = convert_function(&registry, "f").unwrap();
    assert!(f.contains("return P(x, __cap_K).get(__cap_K);"), "{f}");

    let init = registry.method("P", "__init__").unwrap();
    let init = convert(&registry, Callable::Method(init), 0, &captures).unwrap();
    assert!(init.starts_with("__device__ P::P(int v, int __cap_K) {"), "{init}");
    assert!(init.contains("(*this).v = (v * __cap_K);"), "{init}");

    let get = registry.method("P", "get").unwrap();
    let get = convert(&registry, Callable::Method(get), 0, &captures).unwrap();
    assert!(get.starts_with("__device__ int P::get(int __cap_K) {"), "{get}");
}

#[test]
fn test_capture_spelling_avoids_locals() {
    let source = "n = 4\n\ndef f(x):\n    if x > 0:\n        return x + n\n    return x\n";
    let mut registry = registry_for(source, "f", "2");
    registry.append_closure_params("f", vec![ClosureParam { name: "n".into(), ty: Type::INT }]).unwrap();
    let code = convert_function(&registry, "f").unwrap();
    assert!(code.starts_with("__device__ int f(int x, int __cap_n) {"), "{code}");
    assert!(code.contains("return (x + __cap_n);"), "{code}");
}

#[test]
fn test_captured_collection_loop() {
    let source = "xs = [1, 2, 3]\n\ndef f(x):\n    s = 0\n    for v in xs:\n        s += v * x\n    return s\n";
    let mut registry = registry_for(source, "f", "2");
    registry
        .append_closure_params("f", vec![ClosureParam { name: "xs".into(), ty: Type::list_of(Type::INT) }])
        .unwrap();
    let code = convert_function(&registry, "f").unwrap();
    assert!(code.starts_with("__device__ int f(int x, List<int>& __cap_xs) {"), "{code}");
    assert!(code.contains("auto __iterator_1 = ListIterator<int>(__cap_xs);"), "{code}");
    assert!(code.contains("int &v = __iterator_1.next();"), "{code}");
}

#[test]
fn test_captured_assignment() {
    let source = "def f(x):\n    k = 2\n    return x * k\n";
    let mut registry = registry_for(source, "f", "2");
    registry.append_closure_params("f", vec![ClosureParam { name: "k".into(), ty: Type::INT }]).unwrap();
    let err = convert_function(&registry, "f").unwrap_err();
    assert!(matches!(&err, Error::CapturedAssignment { name, .. } if name == "k"), "{err}");
}

#[test]
fn test_untraced_callee() {
    let source = "def h(y):\n    return y\n\ndef f(x):\n    if x < 0:\n        return h(x)\n    return x\n";
    let err = translate(source, "1").unwrap_err();
    assert!(matches!(&err, Error::Untraced { name, .. } if name == "h"), "{err}");
}

#[test]
fn test_unknown_iterable() {
    let source = "def f(x):\n    s = 0\n    if x < 0:\n        for v in x:\n            s += v\n    return s\n";
    let err = translate(source, "1").unwrap_err();
    assert!(matches!(&err, Error::UnknownIterable { iterable, .. } if iterable == "x"), "{err}");
}

#[test]
fn test_range_loop_translates_but_comprehension_does_not() {
    let looped = "def f(x):\n    s = 0\n    for i in range(x):\n        s += i\n    return s\n";
    assert!(translate(looped, "3").is_ok());

    let comprehension = "def f(x):\n    return len([i for i in range(x)])\n";
    let err = translate(comprehension, "3").unwrap_err();
    assert!(matches!(err, Error::Unsupported { construct: Construct::ListComprehension, .. }), "{err}");
}

#[test_case("try:\n            pass\n        except Exception:\n            pass", Construct::Try ; "try")]
#[test_case("raise ValueError", Construct::Raise ; "raise")]
#[test_case("assert x", Construct::Assert ; "assert")]
#[test_case("del x", Construct::Delete ; "del")]
#[test_case("with x:\n            pass", Construct::With ; "with")]
#[test_case("global g", Construct::Global ; "global")]
#[test_case("nonlocal g", Construct::Nonlocal ; "nonlocal")]
#[test_case("def g():\n            pass", Construct::NestedFunction ; "nested def")]
#[test_case("class C:\n            pass", Construct::NestedClass ; "nested class")]
#[test_case("y = lambda z: z", Construct::Lambda ; "lambda")]
#[test_case("yield x", Construct::Yield ; "yield")]
#[test_case("yield from x", Construct::YieldFrom ; "yield from")]
#[test_case("y = await x", Construct::Await ; "await")]
#[test_case("import math", Construct::Import ; "import")]
#[test_case("from math import sqrt", Construct::ImportFrom ; "from import")]
#[test_case("y = [1, 2]", Construct::ListLiteral ; "list literal")]
#[test_case("y = (1, 2)", Construct::TupleLiteral ; "tuple literal")]
#[test_case("y = {1, 2}", Construct::SetLiteral ; "set literal")]
#[test_case("y = {1: 2}", Construct::DictLiteral ; "dict literal")]
#[test_case("y = [i for i in range(3)]", Construct::ListComprehension ; "list comprehension")]
#[test_case("y = {i for i in range(3)}", Construct::SetComprehension ; "set comprehension")]
#[test_case("y = {i: i for i in range(3)}", Construct::DictComprehension ; "dict comprehension")]
#[test_case("print(i for i in range(3))", Construct::GeneratorExpression ; "generator expression")]
#[test_case("y = z = x", Construct::MultipleAssignment ; "multiple assignment")]
#[test_case("y, z = x, x", Construct::UnpackingAssignment ; "unpacking assignment")]
#[test_case("y = x is None", Construct::Is ; "is")]
#[test_case("y = x is not None", Construct::IsNot ; "is not")]
#[test_case("y = 1 in x", Construct::In ; "in")]
#[test_case("y = 1 not in x", Construct::NotIn ; "not in")]
#[test_case("print(*x)", Construct::StarredArgument ; "starred argument")]
#[test_case("print(x, sep='')", Construct::KeywordArgument ; "keyword argument")]
#[test_case("y = x[1:2]", Construct::Slice ; "slice")]
#[test_case("y = x @ x", Construct::MatrixMultiplication ; "matrix multiplication")]
#[test_case("y = ...", Construct::Ellipsis ; "ellipsis")]
#[test_case("y = b'ab'", Construct::BytesLiteral ; "bytes literal")]
#[test_case("y = None", Construct::NoneLiteral ; "none value")]
#[test_case("for i in range(3):\n            pass\n        else:\n            pass", Construct::LoopElse ; "for else")]
#[test_case("while x:\n            pass\n        else:\n            pass", Construct::LoopElse ; "while else")]
#[test_case("y = range(3)", Construct::RangeValue ; "range value")]
fn test_unsupported_construct(statement: &str, construct: Construct) {
    // Placed on a branch the trace never takes, so only translation sees it.
    let source = format!("def f(x):\n    if x < 0:\n        {statement}\n    return x\n");
    match translate(&source, "1") {
        Err(Error::Unsupported { construct: found, function }) => {
            assert_eq!(found, construct);
            assert_eq!(function, "f");
        }
        other => panic!("expected {construct}, got {other:?}"),
    }
}
