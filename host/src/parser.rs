//! Recursive-descent parser over the layout token stream.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::ast::*;
use crate::error::{Result, SyntaxSnafu};
use crate::lexer::{Token, TokenKind, tokenize};

/// Parse a whole source file.
pub fn parse_module(source: &str) -> Result<Module> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut body = Vec::new();
    while !parser.at(&TokenKind::Eof) {
        if parser.eat(&TokenKind::Newline) {
            continue;
        }
        parser.statement(&mut body)?;
    }
    Ok(Module { body })
}

/// Parse a single expression, e.g. for evaluation helpers and tests.
pub fn parse_expr(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.testlist()?;
    parser.eat(&TokenKind::Newline);
    parser.expect(&TokenKind::Eof, "end of input")?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statement(&mut self, out: &mut Vec<Stmt>) -> Result<()> {
        let line = self.line();
        match self.peek().clone() {
            TokenKind::Keyword("if") => out.push(self.if_stmt()?),
            TokenKind::Keyword("while") => {
                self.bump();
                let test = self.namedexpr()?;
                let body = self.suite()?;
                let orelse = self.else_suite()?;
                out.push(Stmt::While { test, body, orelse });
            }
            TokenKind::Keyword("for") => {
                self.bump();
                out.push(self.for_stmt(false)?);
            }
            TokenKind::Keyword("def") => {
                self.bump();
                out.push(self.function_def(false, line)?);
            }
            TokenKind::Keyword("class") => out.push(self.class_def()?),
            TokenKind::Keyword("try") => out.push(self.try_stmt()?),
            TokenKind::Keyword("with") => {
                self.bump();
                out.push(self.with_stmt(false)?);
            }
            TokenKind::Keyword("async") => {
                self.bump();
                let stmt = match self.peek() {
                    TokenKind::Keyword("def") => {
                        self.bump();
                        self.function_def(true, line)?
                    }
                    TokenKind::Keyword("for") => {
                        self.bump();
                        self.for_stmt(true)?
                    }
                    TokenKind::Keyword("with") => {
                        self.bump();
                        self.with_stmt(true)?
                    }
                    _ => return self.error("expected 'def', 'for' or 'with' after 'async'"),
                };
                out.push(stmt);
            }
            TokenKind::Op("@") => return self.error("decorators are not supported"),
            _ => self.simple_statements(out)?,
        }
        Ok(())
    }

    fn simple_statements(&mut self, out: &mut Vec<Stmt>) -> Result<()> {
        loop {
            out.push(self.small_statement()?);
            if !self.eat_op(";") || self.at(&TokenKind::Newline) {
                break;
            }
        }
        self.expect(&TokenKind::Newline, "end of line")
    }

    fn small_statement(&mut self) -> Result<Stmt> {
        match self.peek().clone() {
            TokenKind::Keyword("pass") => {
                self.bump();
                Ok(Stmt::Pass)
            }
            TokenKind::Keyword("break") => {
                self.bump();
                Ok(Stmt::Break)
            }
            TokenKind::Keyword("continue") => {
                self.bump();
                Ok(Stmt::Continue)
            }
            TokenKind::Keyword("return") => {
                self.bump();
                let value = if self.at_statement_end() { None } else { Some(self.testlist()?) };
                Ok(Stmt::Return(value))
            }
            TokenKind::Keyword("raise") => {
                self.bump();
                let value = if self.at_statement_end() { None } else { Some(self.test()?) };
                Ok(Stmt::Raise(value))
            }
            TokenKind::Keyword("assert") => {
                self.bump();
                let test = self.test()?;
                let msg = if self.eat_op(",") { Some(self.test()?) } else { None };
                Ok(Stmt::Assert { test, msg })
            }
            TokenKind::Keyword("del") => {
                self.bump();
                let mut targets = vec![self.expr()?];
                while self.eat_op(",") {
                    targets.push(self.expr()?);
                }
                Ok(Stmt::Delete(targets))
            }
            TokenKind::Keyword("global") => {
                self.bump();
                Ok(Stmt::Global(self.name_list()?))
            }
            TokenKind::Keyword("nonlocal") => {
                self.bump();
                Ok(Stmt::Nonlocal(self.name_list()?))
            }
            TokenKind::Keyword("import") => {
                self.bump();
                let mut names = vec![self.dotted_name()?];
                while self.eat_op(",") {
                    names.push(self.dotted_name()?);
                }
                Ok(Stmt::Import(names))
            }
            TokenKind::Keyword("from") => {
                self.bump();
                let module = self.dotted_name()?;
                self.expect_keyword("import")?;
                let names = if self.eat_op("*") { vec!["*".to_string()] } else { self.name_list()? };
                Ok(Stmt::ImportFrom { module, names })
            }
            TokenKind::Keyword("yield") => Ok(Stmt::Expr(self.yield_expr()?)),
            _ => self.expr_statement(),
        }
    }

    fn expr_statement(&mut self) -> Result<Stmt> {
        let first = self.testlist_star()?;

        if let TokenKind::Op(op) = self.peek().clone()
            && let Some(bin) = augmented_op(op)
        {
            self.bump();
            let value = if self.at_keyword("yield") { self.yield_expr()? } else { self.testlist()? };
            return Ok(Stmt::AugAssign { target: first, op: bin, value });
        }

        if !self.at_op("=") {
            return Ok(Stmt::Expr(first));
        }

        let mut chain: SmallVec<[Expr; 2]> = SmallVec::new();
        chain.push(first);
        while self.eat_op("=") {
            let next = if self.at_keyword("yield") { self.yield_expr()? } else { self.testlist_star()? };
            chain.push(next);
        }
        let value = chain.pop().unwrap_or(Expr::None);
        Ok(Stmt::Assign { targets: chain.into_vec(), value })
    }

    fn if_stmt(&mut self) -> Result<Stmt> {
        self.bump();
        let test = self.namedexpr()?;
        let body = self.suite()?;
        let orelse = if self.at_keyword("elif") {
            vec![self.if_stmt()?]
        } else {
            self.else_suite()?
        };
        Ok(Stmt::If { test, body, orelse })
    }

    fn else_suite(&mut self) -> Result<Vec<Stmt>> {
        if self.at_keyword("else") {
            self.bump();
            self.suite()
        } else {
            Ok(Vec::new())
        }
    }

    fn for_stmt(&mut self, is_async: bool) -> Result<Stmt> {
        let target = self.target_list()?;
        self.expect_keyword("in")?;
        let iter = self.testlist()?;
        let body = self.suite()?;
        let orelse = self.else_suite()?;
        Ok(Stmt::For { target, iter, body, orelse, is_async })
    }

    fn function_def(&mut self, is_async: bool, line: usize) -> Result<Stmt> {
        let name = self.name()?;
        self.expect_op("(")?;
        let mut params = Vec::new();
        while !self.at_op(")") {
            params.push(self.name()?);
            if self.at_op("=") {
                return self.error("default parameter values are not supported");
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.test()?;
        }
        let body = self.suite()?;
        Ok(Stmt::FunctionDef(Arc::new(FunctionDef { name, params, body, is_async, line })))
    }

    fn class_def(&mut self) -> Result<Stmt> {
        self.bump();
        let name = self.name()?;
        let mut bases = Vec::new();
        if self.eat_op("(") {
            while !self.at_op(")") {
                bases.push(self.test()?);
                if !self.eat_op(",") {
                    break;
                }
            }
            self.expect_op(")")?;
        }
        let body = self.suite()?;
        Ok(Stmt::ClassDef(Arc::new(ClassDef { name, bases, body })))
    }

    fn try_stmt(&mut self) -> Result<Stmt> {
        self.bump();
        let body = self.suite()?;
        let mut handlers = Vec::new();
        while self.at_keyword("except") {
            self.bump();
            let (kind, name) = if self.at_op(":") {
                (None, None)
            } else {
                let kind = self.test()?;
                let name = if self.at_keyword("as") {
                    self.bump();
                    Some(self.name()?)
                } else {
                    None
                };
                (Some(kind), name)
            };
            handlers.push(ExceptHandler { kind, name, body: self.suite()? });
        }
        let orelse = self.else_suite()?;
        let finalbody = if self.at_keyword("finally") {
            self.bump();
            self.suite()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return self.error("expected 'except' or 'finally' block");
        }
        Ok(Stmt::Try { body, handlers, orelse, finalbody })
    }

    fn with_stmt(&mut self, is_async: bool) -> Result<Stmt> {
        let mut items = Vec::new();
        loop {
            let context = self.test()?;
            let target = if self.at_keyword("as") {
                self.bump();
                Some(self.target_list()?)
            } else {
                None
            };
            items.push(WithItem { context, target });
            if !self.eat_op(",") {
                break;
            }
        }
        let body = self.suite()?;
        Ok(Stmt::With { items, body, is_async })
    }

    /// `: NEWLINE INDENT stmt+ DEDENT` or `: simple_stmt`.
    fn suite(&mut self) -> Result<Vec<Stmt>> {
        self.expect_op(":")?;
        let mut body = Vec::new();
        if !self.eat(&TokenKind::Newline) {
            self.simple_statements(&mut body)?;
            return Ok(body);
        }
        self.expect(&TokenKind::Indent, "an indented block")?;
        while !self.eat(&TokenKind::Dedent) {
            if self.at(&TokenKind::Eof) {
                break;
            }
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            self.statement(&mut body)?;
        }
        Ok(body)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Comma separated expressions; more than one builds a tuple.
    fn testlist(&mut self) -> Result<Expr> {
        self.sequence(Self::test)
    }

    fn testlist_star(&mut self) -> Result<Expr> {
        self.sequence(Self::star_or_test)
    }

    fn target_list(&mut self) -> Result<Expr> {
        self.sequence(Self::star_or_expr)
    }

    fn sequence(&mut self, mut item: impl FnMut(&mut Self) -> Result<Expr>) -> Result<Expr> {
        let first = item(self)?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_sequence_end() {
                break;
            }
            items.push(item(self)?);
        }
        Ok(Expr::Tuple(items))
    }

    fn star_or_test(&mut self) -> Result<Expr> {
        if self.eat_op("*") { Ok(Expr::Starred(Box::new(self.expr()?))) } else { self.test() }
    }

    fn star_or_expr(&mut self) -> Result<Expr> {
        if self.eat_op("*") { Ok(Expr::Starred(Box::new(self.expr()?))) } else { self.expr() }
    }

    fn namedexpr(&mut self) -> Result<Expr> {
        let expr = self.test()?;
        if self.at_op(":=") {
            return self.error("assignment expressions are not supported");
        }
        Ok(expr)
    }

    fn test(&mut self) -> Result<Expr> {
        if self.at_keyword("lambda") {
            return self.lambda();
        }
        let body = self.or_test()?;
        if self.at_keyword("if") {
            self.bump();
            let test = self.or_test()?;
            self.expect_keyword("else")?;
            let orelse = self.test()?;
            return Ok(Expr::IfExp { test: Box::new(test), body: Box::new(body), orelse: Box::new(orelse) });
        }
        Ok(body)
    }

    fn test_no_cond(&mut self) -> Result<Expr> {
        if self.at_keyword("lambda") { self.lambda() } else { self.or_test() }
    }

    fn lambda(&mut self) -> Result<Expr> {
        self.bump();
        let mut params = Vec::new();
        while !self.at_op(":") {
            params.push(self.name()?);
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(":")?;
        let body = self.test()?;
        Ok(Expr::Lambda { params, body: Box::new(body) })
    }

    fn or_test(&mut self) -> Result<Expr> {
        self.bool_chain("or", BoolOp::Or, Self::and_test)
    }

    fn and_test(&mut self) -> Result<Expr> {
        self.bool_chain("and", BoolOp::And, Self::not_test)
    }

    fn bool_chain(
        &mut self,
        keyword: &str,
        op: BoolOp,
        mut operand: impl FnMut(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let first = operand(self)?;
        if !self.at_keyword(keyword) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.at_keyword(keyword) {
            self.bump();
            values.push(operand(self)?);
        }
        Ok(Expr::BoolOp { op, values })
    }

    fn not_test(&mut self) -> Result<Expr> {
        if self.at_keyword("not") {
            self.bump();
            let operand = self.not_test()?;
            return Ok(Expr::UnaryOp { op: UnaryOp::Not, operand: Box::new(operand) });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.expr()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.comparison_op() {
            ops.push(op);
            comparators.push(self.expr()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare { left: Box::new(left), ops, comparators })
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            TokenKind::Op("==") => CmpOp::Eq,
            TokenKind::Op("!=") => CmpOp::NotEq,
            TokenKind::Op("<") => CmpOp::Lt,
            TokenKind::Op("<=") => CmpOp::LtE,
            TokenKind::Op(">") => CmpOp::Gt,
            TokenKind::Op(">=") => CmpOp::GtE,
            TokenKind::Keyword("in") => CmpOp::In,
            TokenKind::Keyword("is") => {
                self.bump();
                if self.at_keyword("not") {
                    self.bump();
                    return Some(CmpOp::IsNot);
                }
                return Some(CmpOp::Is);
            }
            TokenKind::Keyword("not") if self.peek_at(1) == &TokenKind::Keyword("in") => {
                self.pos += 2;
                return Some(CmpOp::NotIn);
            }
            _ => return None,
        };
        self.bump();
        Some(op)
    }

    fn expr(&mut self) -> Result<Expr> {
        self.binary_level(0)
    }

    /// Binary operator precedence climbing from `|` down to `*`.
    fn binary_level(&mut self, level: usize) -> Result<Expr> {
        const LEVELS: &[&[(&str, BinOp)]] = &[
            &[("|", BinOp::BitOr)],
            &[("^", BinOp::BitXor)],
            &[("&", BinOp::BitAnd)],
            &[("<<", BinOp::LShift), (">>", BinOp::RShift)],
            &[("+", BinOp::Add), ("-", BinOp::Sub)],
            &[("*", BinOp::Mult), ("/", BinOp::Div), ("//", BinOp::FloorDiv), ("%", BinOp::Mod), ("@", BinOp::MatMult)],
        ];

        let Some(ops) = LEVELS.get(level) else {
            return self.factor();
        };
        let mut left = self.binary_level(level + 1)?;
        loop {
            let found = match self.peek() {
                TokenKind::Op(tok) => ops.iter().find(|(sym, _)| sym == tok).map(|(_, op)| *op),
                _ => None,
            };
            let Some(op) = found else {
                return Ok(left);
            };
            self.bump();
            let right = self.binary_level(level + 1)?;
            left = Expr::BinOp { left: Box::new(left), op, right: Box::new(right) };
        }
    }

    fn factor(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            TokenKind::Op("-") => UnaryOp::USub,
            TokenKind::Op("+") => UnaryOp::UAdd,
            TokenKind::Op("~") => UnaryOp::Invert,
            _ => return self.power(),
        };
        self.bump();
        let operand = self.factor()?;
        Ok(Expr::UnaryOp { op, operand: Box::new(operand) })
    }

    fn power(&mut self) -> Result<Expr> {
        let base = if self.at_keyword("await") {
            self.bump();
            Expr::Await(Box::new(self.primary()?))
        } else {
            self.primary()?
        };
        if self.eat_op("**") {
            let exponent = self.factor()?;
            return Ok(Expr::BinOp { left: Box::new(base), op: BinOp::Pow, right: Box::new(exponent) });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op(".") {
                let attr = self.name()?;
                expr = Expr::Attribute { value: Box::new(expr), attr };
            } else if self.eat_op("(") {
                let (args, keywords) = self.call_args()?;
                expr = Expr::Call { func: Box::new(expr), args, keywords };
            } else if self.eat_op("[") {
                let index = self.subscript_list()?;
                self.expect_op("]")?;
                expr = Expr::Subscript { value: Box::new(expr), index: Box::new(index) };
            } else {
                return Ok(expr);
            }
        }
    }

    fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        while !self.at_op(")") {
            if self.eat_op("**") {
                keywords.push(Keyword { name: None, value: self.test()? });
            } else if self.eat_op("*") {
                args.push(Expr::Starred(Box::new(self.test()?)));
            } else if let TokenKind::Name(name) = self.peek().clone()
                && self.peek_at(1) == &TokenKind::Op("=")
            {
                self.pos += 2;
                keywords.push(Keyword { name: Some(name), value: self.test()? });
            } else {
                let arg = self.test()?;
                if self.at_keyword("for") || self.at_keyword("async") {
                    let generators = self.comprehension_clauses()?;
                    args.push(Expr::Comprehension {
                        kind: ComprehensionKind::Generator,
                        element: Box::new(arg),
                        value: None,
                        generators,
                    });
                } else {
                    args.push(arg);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok((args, keywords))
    }

    fn subscript_list(&mut self) -> Result<Expr> {
        let first = self.subscript()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op("]") {
                break;
            }
            items.push(self.subscript()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn subscript(&mut self) -> Result<Expr> {
        let lower = if self.at_op(":") { None } else { Some(Box::new(self.test()?)) };
        if !self.eat_op(":") {
            return lower.map(|b| *b).map_or_else(|| self.error("expected subscript"), Ok);
        }
        let upper = if self.at_op(":") || self.at_op("]") || self.at_op(",") { None } else { Some(Box::new(self.test()?)) };
        let step = if self.eat_op(":") && !self.at_op("]") && !self.at_op(",") {
            Some(Box::new(self.test()?))
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn atom(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        match token {
            TokenKind::Name(name) => {
                self.bump();
                Ok(Expr::Name(name))
            }
            TokenKind::Int(v) => {
                self.bump();
                Ok(Expr::Int(v))
            }
            TokenKind::Float(v) => {
                self.bump();
                Ok(Expr::Float(v))
            }
            TokenKind::Str(mut s) => {
                self.bump();
                // Adjacent literals concatenate.
                while let TokenKind::Str(next) = self.peek().clone() {
                    self.bump();
                    s.push_str(&next);
                }
                Ok(Expr::Str(s))
            }
            TokenKind::Bytes(b) => {
                self.bump();
                Ok(Expr::Bytes(b))
            }
            TokenKind::Keyword("True") => {
                self.bump();
                Ok(Expr::Bool(true))
            }
            TokenKind::Keyword("False") => {
                self.bump();
                Ok(Expr::Bool(false))
            }
            TokenKind::Keyword("None") => {
                self.bump();
                Ok(Expr::None)
            }
            TokenKind::Op("...") => {
                self.bump();
                Ok(Expr::Ellipsis)
            }
            TokenKind::Op("(") => {
                self.bump();
                self.paren_atom()
            }
            TokenKind::Op("[") => {
                self.bump();
                self.list_atom()
            }
            TokenKind::Op("{") => {
                self.bump();
                self.brace_atom()
            }
            TokenKind::Keyword("yield") => self.error("'yield' must be parenthesized or a statement"),
            other => self.error(&format!("unexpected token {other:?}")),
        }
    }

    fn paren_atom(&mut self) -> Result<Expr> {
        if self.eat_op(")") {
            return Ok(Expr::Tuple(Vec::new()));
        }
        if self.at_keyword("yield") {
            let expr = self.yield_expr()?;
            self.expect_op(")")?;
            return Ok(expr);
        }
        let first = self.star_or_test()?;
        if self.at_keyword("for") || self.at_keyword("async") {
            let generators = self.comprehension_clauses()?;
            self.expect_op(")")?;
            return Ok(Expr::Comprehension {
                kind: ComprehensionKind::Generator,
                element: Box::new(first),
                value: None,
                generators,
            });
        }
        if self.eat_op(")") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op(")") {
                break;
            }
            items.push(self.star_or_test()?);
        }
        self.expect_op(")")?;
        Ok(Expr::Tuple(items))
    }

    fn list_atom(&mut self) -> Result<Expr> {
        if self.eat_op("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.star_or_test()?;
        if self.at_keyword("for") || self.at_keyword("async") {
            let generators = self.comprehension_clauses()?;
            self.expect_op("]")?;
            return Ok(Expr::Comprehension {
                kind: ComprehensionKind::List,
                element: Box::new(first),
                value: None,
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op("]") {
                break;
            }
            items.push(self.star_or_test()?);
        }
        self.expect_op("]")?;
        Ok(Expr::List(items))
    }

    fn brace_atom(&mut self) -> Result<Expr> {
        if self.eat_op("}") {
            return Ok(Expr::Dict(Vec::new()));
        }
        let first = self.test()?;
        if self.eat_op(":") {
            let value = self.test()?;
            if self.at_keyword("for") || self.at_keyword("async") {
                let generators = self.comprehension_clauses()?;
                self.expect_op("}")?;
                return Ok(Expr::Comprehension {
                    kind: ComprehensionKind::Dict,
                    element: Box::new(first),
                    value: Some(Box::new(value)),
                    generators,
                });
            }
            let mut pairs = vec![(first, value)];
            while self.eat_op(",") {
                if self.at_op("}") {
                    break;
                }
                let key = self.test()?;
                self.expect_op(":")?;
                pairs.push((key, self.test()?));
            }
            self.expect_op("}")?;
            return Ok(Expr::Dict(pairs));
        }
        if self.at_keyword("for") || self.at_keyword("async") {
            let generators = self.comprehension_clauses()?;
            self.expect_op("}")?;
            return Ok(Expr::Comprehension {
                kind: ComprehensionKind::Set,
                element: Box::new(first),
                value: None,
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op("}") {
                break;
            }
            items.push(self.test()?);
        }
        self.expect_op("}")?;
        Ok(Expr::Set(items))
    }

    fn comprehension_clauses(&mut self) -> Result<Vec<Comprehension>> {
        let mut generators = Vec::new();
        loop {
            let is_async = self.at_keyword("async");
            if is_async {
                self.bump();
            }
            if !self.at_keyword("for") {
                break;
            }
            self.bump();
            let target = self.target_list()?;
            self.expect_keyword("in")?;
            let iter = self.or_test()?;
            let mut conditions = Vec::new();
            while self.at_keyword("if") {
                self.bump();
                conditions.push(self.test_no_cond()?);
            }
            generators.push(Comprehension { target, iter, conditions, is_async });
        }
        Ok(generators)
    }

    fn yield_expr(&mut self) -> Result<Expr> {
        self.expect_keyword("yield")?;
        if self.at_keyword("from") {
            self.bump();
            return Ok(Expr::YieldFrom(Box::new(self.test()?)));
        }
        if self.at_statement_end() || self.at_op(")") {
            return Ok(Expr::Yield(None));
        }
        Ok(Expr::Yield(Some(Box::new(self.testlist()?))))
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn name(&mut self) -> Result<String> {
        match self.peek().clone() {
            TokenKind::Name(name) => {
                self.bump();
                Ok(name)
            }
            other => self.error(&format!("expected a name, found {other:?}")),
        }
    }

    fn name_list(&mut self) -> Result<Vec<String>> {
        let mut names = vec![self.name()?];
        while self.eat_op(",") {
            names.push(self.name()?);
        }
        Ok(names)
    }

    fn dotted_name(&mut self) -> Result<String> {
        let mut name = self.name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.name()?);
        }
        if self.at_keyword("as") {
            self.bump();
            name = self.name()?;
        }
        Ok(name)
    }

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens.get(self.pos + offset).map(|t| &t.kind).unwrap_or(&TokenKind::Eof)
    }

    fn line(&self) -> usize {
        self.tokens.get(self.pos).or(self.tokens.last()).map(|t| t.line).unwrap_or(1)
    }

    fn bump(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), TokenKind::Op(o) if *o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), TokenKind::Keyword(k) if *k == keyword)
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek(), TokenKind::Newline | TokenKind::Eof | TokenKind::Op(";"))
    }

    fn at_sequence_end(&self) -> bool {
        self.at_statement_end() || matches!(self.peek(), TokenKind::Op("=" | ")" | "]" | "}" | ":"))
            || self.at_keyword("in")
            || augmented_op_token(self.peek())
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<()> {
        if self.eat(kind) { Ok(()) } else { self.error(&format!("expected {what}, found {:?}", self.peek())) }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) { Ok(()) } else { self.error(&format!("expected '{op}', found {:?}", self.peek())) }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.at_keyword(keyword) {
            self.bump();
            Ok(())
        } else {
            self.error(&format!("expected '{keyword}', found {:?}", self.peek()))
        }
    }

    fn error<T>(&self, message: &str) -> Result<T> {
        SyntaxSnafu { line: self.line(), message }.fail()
    }
}

fn augmented_op(op: &str) -> Option<BinOp> {
    Some(match op {
        "+=" => BinOp::Add,
        "-=" => BinOp::Sub,
        "*=" => BinOp::Mult,
        "@=" => BinOp::MatMult,
        "/=" => BinOp::Div,
        "//=" => BinOp::FloorDiv,
        "%=" => BinOp::Mod,
        "**=" => BinOp::Pow,
        "<<=" => BinOp::LShift,
        ">>=" => BinOp::RShift,
        "|=" => BinOp::BitOr,
        "^=" => BinOp::BitXor,
        "&=" => BinOp::BitAnd,
        _ => return None,
    })
}

fn augmented_op_token(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::Op(op) if augmented_op(op).is_some())
}
