// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashSet;

use crate::common::{canonicalize, Ident};
use crate::token::SourceLoc;

/// Loc is the span of source text an expression was parsed from.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Loc {
    pub start: SourceLoc,
    pub end: SourceLoc,
}

impl Loc {
    pub fn new(start: SourceLoc, end: SourceLoc) -> Self {
        Loc { start, end }
    }

    pub fn union(&self, rhs: &Self) -> Self {
        Loc {
            start: self.start,
            end: rhs.end,
        }
    }
}

impl Default for Loc {
    fn default() -> Self {
        Loc {
            start: SourceLoc::new(0, 0),
            end: SourceLoc::new(0, 0),
        }
    }
}

// we use Boxs here because we may walk and update ASTs a number of times,
// and we want to avoid copying and reallocating subexpressions all over
// the place.
#[derive(PartialEq, Clone, Debug)]
pub enum Expr {
    Const(String, f64, Loc),
    Var(Ident, Loc),
    Paren(Box<Expr>, Loc),
    App(Ident, Vec<Expr>, Loc),
    Op1(UnaryOp, Box<Expr>, Loc),
    Op2(BinaryOp, Box<Expr>, Box<Expr>, Loc),
    If(Box<Expr>, Box<Expr>, Box<Expr>, Loc),
}

impl Default for Expr {
    fn default() -> Self {
        Expr::Const("0.0".to_string(), 0.0, Loc::default())
    }
}

impl Expr {
    /// var builds an identifier reference, canonicalizing the name.
    pub fn var(name: &str, loc: Loc) -> Self {
        Expr::Var(canonicalize(name), loc)
    }

    pub fn get_loc(&self) -> Loc {
        match self {
            Expr::Const(_, _, loc) => *loc,
            Expr::Var(_, loc) => *loc,
            Expr::Paren(_, loc) => *loc,
            Expr::App(_, _, loc) => *loc,
            Expr::Op1(_, _, loc) => *loc,
            Expr::Op2(_, _, _, loc) => *loc,
            Expr::If(_, _, _, loc) => *loc,
        }
    }

    /// strip_loc resets every span in the tree, which makes
    /// structural comparisons independent of source layout.
    pub fn strip_loc(self) -> Self {
        let loc = Loc::default();
        match self {
            Expr::Const(s, n, _) => Expr::Const(s, n, loc),
            Expr::Var(v, _) => Expr::Var(v, loc),
            Expr::Paren(e, _) => Expr::Paren(Box::new(e.strip_loc()), loc),
            Expr::App(func, args, _) => Expr::App(
                func,
                args.into_iter().map(|arg| arg.strip_loc()).collect(),
                loc,
            ),
            Expr::Op1(op, r, _) => Expr::Op1(op, Box::new(r.strip_loc()), loc),
            Expr::Op2(op, l, r, _) => {
                Expr::Op2(op, Box::new(l.strip_loc()), Box::new(r.strip_loc()), loc)
            }
            Expr::If(cond, t, f, _) => Expr::If(
                Box::new(cond.strip_loc()),
                Box::new(t.strip_loc()),
                Box::new(f.strip_loc()),
                loc,
            ),
        }
    }

    /// constant returns the value of a bare numeric literal, looking
    /// through parens and unary signs.
    pub fn constant(&self) -> Option<f64> {
        match self {
            Expr::Const(_, n, _) => Some(*n),
            Expr::Paren(e, _) => e.constant(),
            Expr::Op1(UnaryOp::Negative, e, _) => e.constant().map(|n| -n),
            Expr::Op1(UnaryOp::Positive, e, _) => e.constant(),
            _ => None,
        }
    }
}

pub trait Visitor<T> {
    fn walk(&mut self, e: &Expr) -> T;
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Exp,
    Mul,
    Div,
    Mod,
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Neq,
    And,
    Or,
    // the `!` glyph is accepted between two operands by the grammar,
    // but has no arithmetic meaning.
    Bang,
}

impl BinaryOp {
    pub fn from_glyph(glyph: &str) -> Option<Self> {
        let op = match glyph {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "^" => BinaryOp::Exp,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            ">" => BinaryOp::Gt,
            "<" => BinaryOp::Lt,
            "≥" => BinaryOp::Gte,
            "≤" => BinaryOp::Lte,
            "=" => BinaryOp::Eq,
            "≠" => BinaryOp::Neq,
            "&" => BinaryOp::And,
            "|" => BinaryOp::Or,
            "!" => BinaryOp::Bang,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum UnaryOp {
    Positive,
    Negative,
    Not,
}

struct PrintVisitor {}

impl Visitor<String> for PrintVisitor {
    fn walk(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Const(s, _, _) => s.clone(),
            Expr::Var(id, _) => id.clone(),
            Expr::Paren(e, _) => format!("({})", self.walk(e)),
            Expr::App(func, args, _) => {
                let args: Vec<String> = args.iter().map(|e| self.walk(e)).collect();
                format!("{}({})", func, args.join(", "))
            }
            Expr::Op1(op, l, _) => {
                let l = self.walk(l);
                let op: &str = match op {
                    UnaryOp::Positive => "+",
                    UnaryOp::Negative => "-",
                    UnaryOp::Not => "not ",
                };
                format!("{}{}", op, l)
            }
            Expr::Op2(op, l, r, _) => {
                let l = self.walk(l);
                let r = self.walk(r);
                let op: &str = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Exp => "^",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                    BinaryOp::Mod => "mod",
                    BinaryOp::Gt => ">",
                    BinaryOp::Lt => "<",
                    BinaryOp::Gte => ">=",
                    BinaryOp::Lte => "<=",
                    BinaryOp::Eq => "=",
                    BinaryOp::Neq => "<>",
                    BinaryOp::And => "and",
                    BinaryOp::Or => "or",
                    BinaryOp::Bang => "!",
                };
                format!("({} {} {})", l, op, r)
            }
            Expr::If(cond, t, f, _) => {
                let cond = self.walk(cond);
                let t = self.walk(t);
                let f = self.walk(f);
                format!("if ({}) then ({}) else ({})", cond, t, f)
            }
        }
    }
}

/// print_eqn renders an expression back into equation text that
/// parses to the same tree.
pub fn print_eqn(expr: &Expr) -> String {
    let mut visitor = PrintVisitor {};
    visitor.walk(expr)
}

struct IdentifierSetVisitor {
    identifiers: HashSet<Ident>,
}

impl Visitor<()> for IdentifierSetVisitor {
    fn walk(&mut self, e: &Expr) {
        match e {
            Expr::Const(_, _, _) => (),
            Expr::Var(id, _) => {
                self.identifiers.insert(id.clone());
            }
            Expr::Paren(e, _) => self.walk(e),
            // the callee names a function, not a variable
            Expr::App(_, args, _) => {
                for arg in args.iter() {
                    self.walk(arg);
                }
            }
            Expr::Op1(_, l, _) => self.walk(l),
            Expr::Op2(_, l, r, _) => {
                self.walk(l);
                self.walk(r);
            }
            Expr::If(cond, t, f, _) => {
                self.walk(cond);
                self.walk(t);
                self.walk(f);
            }
        }
    }
}

pub fn identifier_set(e: &Expr) -> HashSet<Ident> {
    let mut id_visitor = IdentifierSetVisitor {
        identifiers: HashSet::new(),
    };
    id_visitor.walk(e);
    id_visitor.identifiers
}

#[cfg(test)]
fn var(name: &str) -> Expr {
    Expr::var(name, Loc::default())
}

#[test]
fn test_print_eqn() {
    let loc = Loc::default();
    assert_eq!(
        "(a + b)",
        print_eqn(&Expr::Op2(
            BinaryOp::Add,
            Box::new(var("a")),
            Box::new(var("b")),
            loc,
        ))
    );
    assert_eq!(
        "-a",
        print_eqn(&Expr::Op1(UnaryOp::Negative, Box::new(var("a")), loc))
    );
    assert_eq!(
        "not a",
        print_eqn(&Expr::Op1(UnaryOp::Not, Box::new(var("a")), loc))
    );
    assert_eq!(
        "+a",
        print_eqn(&Expr::Op1(UnaryOp::Positive, Box::new(var("a")), loc))
    );
    assert_eq!(
        "(a <> b)",
        print_eqn(&Expr::Op2(
            BinaryOp::Neq,
            Box::new(var("a")),
            Box::new(var("b")),
            loc,
        ))
    );
    assert_eq!("4.7", print_eqn(&Expr::Const("4.7".to_string(), 4.7, loc)));
    assert_eq!(
        "lookup(a, 1.0)",
        print_eqn(&Expr::App(
            "lookup".to_string(),
            vec![var("a"), Expr::Const("1.0".to_string(), 1.0, loc)],
            loc,
        ))
    );
}

#[test]
fn test_var_canonicalizes() {
    assert_eq!(
        Expr::Var("birth_fraction".to_owned(), Loc::default()),
        var("Birth Fraction")
    );
}

#[test]
fn test_constant() {
    let loc = Loc::default();
    let neg = Expr::Op1(
        UnaryOp::Negative,
        Box::new(Expr::Const("3".to_owned(), 3.0, loc)),
        loc,
    );
    assert_eq!(Some(-3.0), neg.constant());
    assert_eq!(None, var("a").constant());
}
