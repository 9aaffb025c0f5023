//! Syntax tree for the host language.
//!
//! The tree covers more than the interpreter or the translator accept:
//! constructs such as `try`, `lambda` or comprehensions are parsed so that
//! each consumer can reject them by kind instead of failing in the parser.

use std::collections::HashSet;
use std::sync::Arc;

/// A parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub is_async: bool,
    /// 1-based source line of the `def` keyword.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub kind: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub context: Expr,
    pub target: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub conditions: Vec<Expr>,
    pub is_async: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ComprehensionKind {
    List,
    Set,
    Dict,
    Generator,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    /// `a = b = value` has two targets.
    Assign { targets: Vec<Expr>, value: Expr },
    AugAssign { target: Expr, op: BinOp, value: Expr },
    Return(Option<Expr>),
    Pass,
    Break,
    Continue,
    If { test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt> },
    While { test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt> },
    For { target: Expr, iter: Expr, body: Vec<Stmt>, orelse: Vec<Stmt>, is_async: bool },
    FunctionDef(Arc<FunctionDef>),
    ClassDef(Arc<ClassDef>),
    Try { body: Vec<Stmt>, handlers: Vec<ExceptHandler>, orelse: Vec<Stmt>, finalbody: Vec<Stmt> },
    Raise(Option<Expr>),
    Assert { test: Expr, msg: Option<Expr> },
    Delete(Vec<Expr>),
    With { items: Vec<WithItem>, body: Vec<Stmt>, is_async: bool },
    Global(Vec<String>),
    Nonlocal(Vec<String>),
    Import(Vec<String>),
    ImportFrom { module: String, names: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    Str(String),
    Bytes(Vec<u8>),
    Ellipsis,
    Attribute { value: Box<Expr>, attr: String },
    Subscript { value: Box<Expr>, index: Box<Expr> },
    Slice { lower: Option<Box<Expr>>, upper: Option<Box<Expr>>, step: Option<Box<Expr>> },
    Call { func: Box<Expr>, args: Vec<Expr>, keywords: Vec<Keyword> },
    Starred(Box<Expr>),
    BinOp { left: Box<Expr>, op: BinOp, right: Box<Expr> },
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
    BoolOp { op: BoolOp, values: Vec<Expr> },
    Compare { left: Box<Expr>, ops: Vec<CmpOp>, comparators: Vec<Expr> },
    IfExp { test: Box<Expr>, body: Box<Expr>, orelse: Box<Expr> },
    Lambda { params: Vec<String>, body: Box<Expr> },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Set(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Comprehension {
        kind: ComprehensionKind,
        element: Box<Expr>,
        /// Value expression of a dict comprehension.
        value: Option<Box<Expr>>,
        generators: Vec<Comprehension>,
    },
    Yield(Option<Box<Expr>>),
    YieldFrom(Box<Expr>),
    Await(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum BinOp {
    #[strum(to_string = "+")]
    Add,
    #[strum(to_string = "-")]
    Sub,
    #[strum(to_string = "*")]
    Mult,
    #[strum(to_string = "@")]
    MatMult,
    #[strum(to_string = "/")]
    Div,
    #[strum(to_string = "//")]
    FloorDiv,
    #[strum(to_string = "%")]
    Mod,
    #[strum(to_string = "**")]
    Pow,
    #[strum(to_string = "<<")]
    LShift,
    #[strum(to_string = ">>")]
    RShift,
    #[strum(to_string = "|")]
    BitOr,
    #[strum(to_string = "^")]
    BitXor,
    #[strum(to_string = "&")]
    BitAnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum UnaryOp {
    #[strum(to_string = "not")]
    Not,
    #[strum(to_string = "-")]
    USub,
    #[strum(to_string = "+")]
    UAdd,
    #[strum(to_string = "~")]
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum BoolOp {
    #[strum(to_string = "and")]
    And,
    #[strum(to_string = "or")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum CmpOp {
    #[strum(to_string = "==")]
    Eq,
    #[strum(to_string = "!=")]
    NotEq,
    #[strum(to_string = "<")]
    Lt,
    #[strum(to_string = "<=")]
    LtE,
    #[strum(to_string = ">")]
    Gt,
    #[strum(to_string = ">=")]
    GtE,
    #[strum(to_string = "is")]
    Is,
    #[strum(to_string = "is not")]
    IsNot,
    #[strum(to_string = "in")]
    In,
    #[strum(to_string = "not in")]
    NotIn,
}

impl FunctionDef {
    /// Names read by the body that are neither parameters nor assigned
    /// locally, in first-use order. These resolve to the enclosing scope.
    pub fn free_names(&self) -> Vec<String> {
        let mut bound: HashSet<String> = self.params.iter().cloned().collect();
        collect_bound(&self.body, &mut bound);

        let mut seen = HashSet::new();
        let mut free = Vec::new();
        let mut visit = |name: &str| {
            if !bound.contains(name) && seen.insert(name.to_string()) {
                free.push(name.to_string());
            }
        };
        for stmt in &self.body {
            stmt.walk_names(&mut visit);
        }
        free
    }
}

fn collect_bound(body: &[Stmt], bound: &mut HashSet<String>) {
    for stmt in body {
        match stmt {
            Stmt::Assign { targets, .. } => targets.iter().for_each(|t| bind_target(t, bound)),
            Stmt::AugAssign { target, .. } => bind_target(target, bound),
            Stmt::For { target, body, orelse, .. } => {
                bind_target(target, bound);
                collect_bound(body, bound);
                collect_bound(orelse, bound);
            }
            Stmt::If { body, orelse, .. } | Stmt::While { body, orelse, .. } => {
                collect_bound(body, bound);
                collect_bound(orelse, bound);
            }
            Stmt::FunctionDef(def) => {
                bound.insert(def.name.clone());
            }
            Stmt::ClassDef(def) => {
                bound.insert(def.name.clone());
            }
            Stmt::Import(names) => bound.extend(names.iter().cloned()),
            Stmt::ImportFrom { names, .. } => bound.extend(names.iter().cloned()),
            Stmt::With { items, body, .. } => {
                items.iter().filter_map(|i| i.target.as_ref()).for_each(|t| bind_target(t, bound));
                collect_bound(body, bound);
            }
            Stmt::Try { body, handlers, orelse, finalbody } => {
                collect_bound(body, bound);
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        bound.insert(name.clone());
                    }
                    collect_bound(&handler.body, bound);
                }
                collect_bound(orelse, bound);
                collect_bound(finalbody, bound);
            }
            _ => {}
        }
    }
}

fn bind_target(target: &Expr, bound: &mut HashSet<String>) {
    match target {
        Expr::Name(name) => {
            bound.insert(name.clone());
        }
        Expr::Tuple(items) | Expr::List(items) => items.iter().for_each(|t| bind_target(t, bound)),
        Expr::Starred(inner) => bind_target(inner, bound),
        _ => {}
    }
}

impl Stmt {
    /// Visit every name read anywhere inside this statement, including
    /// nested function bodies.
    pub fn walk_names(&self, visit: &mut impl FnMut(&str)) {
        self.walk_names_dyn(visit);
    }

    fn walk_names_dyn(&self, visit: &mut dyn FnMut(&str)) {
        fn walk_body(body: &[Stmt], visit: &mut dyn FnMut(&str)) {
            for stmt in body {
                stmt.walk_names_dyn(visit);
            }
        }
        match self {
            Stmt::Expr(e) | Stmt::Return(Some(e)) | Stmt::Raise(Some(e)) => e.walk_names_dyn(visit),
            Stmt::Assign { targets, value } => {
                targets.iter().for_each(|t| t.walk_target_names(visit));
                value.walk_names_dyn(visit);
            }
            Stmt::AugAssign { target, value, .. } => {
                target.walk_names_dyn(visit);
                value.walk_names_dyn(visit);
            }
            Stmt::If { test, body, orelse } | Stmt::While { test, body, orelse } => {
                test.walk_names_dyn(visit);
                walk_body(body, visit);
                walk_body(orelse, visit);
            }
            Stmt::For { target, iter, body, orelse, .. } => {
                target.walk_target_names(visit);
                iter.walk_names_dyn(visit);
                walk_body(body, visit);
                walk_body(orelse, visit);
            }
            Stmt::FunctionDef(def) => {
                for name in def.free_names() {
                    visit(&name);
                }
            }
            Stmt::Assert { test, msg } => {
                test.walk_names_dyn(visit);
                if let Some(msg) = msg {
                    msg.walk_names_dyn(visit);
                }
            }
            Stmt::Delete(targets) => targets.iter().for_each(|t| t.walk_names_dyn(visit)),
            Stmt::With { items, body, .. } => {
                for item in items {
                    item.context.walk_names_dyn(visit);
                }
                walk_body(body, visit);
            }
            Stmt::Try { body, handlers, orelse, finalbody } => {
                walk_body(body, visit);
                for handler in handlers {
                    walk_body(&handler.body, visit);
                }
                walk_body(orelse, visit);
                walk_body(finalbody, visit);
            }
            Stmt::Return(None)
            | Stmt::Raise(None)
            | Stmt::Pass
            | Stmt::Break
            | Stmt::Continue
            | Stmt::ClassDef(_)
            | Stmt::Global(_)
            | Stmt::Nonlocal(_)
            | Stmt::Import(_)
            | Stmt::ImportFrom { .. } => {}
        }
    }
}

impl Expr {
    pub fn walk_names(&self, visit: &mut impl FnMut(&str)) {
        self.walk_names_dyn(visit);
    }

    fn walk_names_dyn(&self, visit: &mut dyn FnMut(&str)) {
        match self {
            Expr::Name(name) => visit(name),
            Expr::Attribute { value, .. } | Expr::Starred(value) | Expr::YieldFrom(value) | Expr::Await(value) => {
                value.walk_names_dyn(visit)
            }
            Expr::Subscript { value, index } => {
                value.walk_names_dyn(visit);
                index.walk_names_dyn(visit);
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    part.walk_names_dyn(visit);
                }
            }
            Expr::Call { func, args, keywords } => {
                func.walk_names_dyn(visit);
                args.iter().for_each(|a| a.walk_names_dyn(visit));
                keywords.iter().for_each(|k| k.value.walk_names_dyn(visit));
            }
            Expr::BinOp { left, right, .. } => {
                left.walk_names_dyn(visit);
                right.walk_names_dyn(visit);
            }
            Expr::UnaryOp { operand, .. } => operand.walk_names_dyn(visit),
            Expr::BoolOp { values, .. } | Expr::List(values) | Expr::Tuple(values) | Expr::Set(values) => {
                values.iter().for_each(|v| v.walk_names_dyn(visit))
            }
            Expr::Compare { left, comparators, .. } => {
                left.walk_names_dyn(visit);
                comparators.iter().for_each(|c| c.walk_names_dyn(visit));
            }
            Expr::IfExp { test, body, orelse } => {
                test.walk_names_dyn(visit);
                body.walk_names_dyn(visit);
                orelse.walk_names_dyn(visit);
            }
            Expr::Lambda { params, body } => body.walk_names_dyn(&mut |n: &str| {
                if !params.iter().any(|p| p == n) {
                    visit(n)
                }
            }),
            Expr::Dict(pairs) => {
                for (k, v) in pairs {
                    k.walk_names_dyn(visit);
                    v.walk_names_dyn(visit);
                }
            }
            Expr::Comprehension { element, value, generators, .. } => {
                element.walk_names_dyn(visit);
                if let Some(value) = value {
                    value.walk_names_dyn(visit);
                }
                for generator in generators {
                    generator.iter.walk_names_dyn(visit);
                    generator.conditions.iter().for_each(|c| c.walk_names_dyn(visit));
                }
            }
            Expr::Yield(value) => {
                if let Some(value) = value {
                    value.walk_names_dyn(visit);
                }
            }
            Expr::Int(_)
            | Expr::Float(_)
            | Expr::Bool(_)
            | Expr::None
            | Expr::Str(_)
            | Expr::Bytes(_)
            | Expr::Ellipsis => {}
        }
    }

    /// Names read while evaluating an assignment target (the object of an
    /// attribute store, subscript operands), but not the bound names.
    fn walk_target_names(&self, visit: &mut dyn FnMut(&str)) {
        match self {
            Expr::Name(_) => {}
            Expr::Tuple(items) | Expr::List(items) => items.iter().for_each(|t| t.walk_target_names(visit)),
            Expr::Starred(inner) => inner.walk_target_names(visit),
            other => other.walk_names_dyn(visit),
        }
    }
}
