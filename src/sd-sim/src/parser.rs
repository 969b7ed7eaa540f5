// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::ast::{BinaryOp, Expr, Loc, UnaryOp};
use crate::common::canonicalize;
use crate::token::{Lexer, Token, TokenKind};

// binary operator precedence levels, tightest binding first
const BINARY_LEVELS: &[&[&str]] = &[
    &["^"],
    &["!"],
    &["*", "/", "%"],
    &["+", "-"],
    &[">", "<", "≥", "≤"],
    &["=", "≠"],
    &["&"],
    &["|"],
];

const UNARY_OPS: &[&str] = &["+", "-", "!"];

struct Parser {
    lexer: Lexer,
    errors: Vec<String>,
}

/// parse_equation turns equation text into an expression tree.  Empty
/// input is not an error and produces `Ok(None)`.
pub fn parse_equation(eqn: &str) -> Result<Option<Expr>, Vec<String>> {
    let mut parser = Parser {
        lexer: Lexer::new(eqn),
        errors: vec![],
    };

    let ast = parser.expr();
    if let Some(tok) = parser.lexer.next() {
        parser
            .errors
            .push(format!("unexpected \"{}\" after expression", tok.text));
    }

    if parser.errors.is_empty() {
        Ok(ast)
    } else {
        Err(parser.errors)
    }
}

fn token_loc(tok: &Token) -> Loc {
    Loc::new(tok.start_loc, tok.end_loc)
}

impl Parser {
    fn expr(&mut self) -> Option<Expr> {
        self.binary(BINARY_LEVELS.len() - 1)
    }

    fn peek_is_op(&mut self, ops: &[&str]) -> bool {
        match self.lexer.peek() {
            Some(tok) => tok.kind == TokenKind::Token && ops.contains(&tok.text.as_str()),
            None => false,
        }
    }

    fn operand(&mut self, level: usize) -> Option<Expr> {
        if level == 0 {
            self.factor()
        } else {
            self.binary(level - 1)
        }
    }

    fn binary(&mut self, level: usize) -> Option<Expr> {
        let mut lhs = self.operand(level)?;

        while self.peek_is_op(BINARY_LEVELS[level]) {
            let op_tok = self.lexer.next()?;
            let rhs = match self.operand(level) {
                Some(rhs) => rhs,
                None => {
                    self.errors
                        .push(format!("expected rhs of expr after \"{}\"", op_tok.text));
                    return None;
                }
            };
            let op = BinaryOp::from_glyph(&op_tok.text)?;
            let loc = lhs.get_loc().union(&rhs.get_loc());
            lhs = Expr::Op2(op, Box::new(lhs), Box::new(rhs), loc);
        }

        Some(lhs)
    }

    fn factor(&mut self) -> Option<Expr> {
        let (kind, text) = match self.lexer.peek() {
            Some(tok) => (tok.kind, tok.text.clone()),
            None => return None,
        };

        match kind {
            TokenKind::Token if text == "(" => self.paren(),
            TokenKind::Token if UNARY_OPS.contains(&text.as_str()) => self.unary(),
            TokenKind::Number => {
                let tok = self.lexer.next()?;
                let value = tok.value().unwrap_or(f64::NAN);
                Some(Expr::Const(tok.text.clone(), value, token_loc(&tok)))
            }
            TokenKind::Reserved if text == "if" => self.if_expr(),
            TokenKind::Ident => self.ident_or_call(),
            _ => None,
        }
    }

    fn paren(&mut self) -> Option<Expr> {
        let lparen = self.lexer.next()?;
        let inner = match self.expr() {
            Some(inner) => inner,
            None => {
                self.errors
                    .push("expected an expression after an opening paren".to_owned());
                return None;
            }
        };

        match self.lexer.next() {
            Some(tok) if tok.is_op(")") => {
                let loc = Loc::new(lparen.start_loc, tok.end_loc);
                Some(Expr::Paren(Box::new(inner), loc))
            }
            Some(tok) => {
                self.errors
                    .push(format!("expected \")\", not \"{}\"", tok.text));
                None
            }
            None => {
                self.errors
                    .push("expected \")\", not end-of-equation".to_owned());
                None
            }
        }
    }

    fn unary(&mut self) -> Option<Expr> {
        let op_tok = self.lexer.next()?;
        let op = match op_tok.text.as_str() {
            "+" => UnaryOp::Positive,
            "-" => UnaryOp::Negative,
            _ => UnaryOp::Not,
        };
        // the operand binds tighter than everything but `^`
        match self.binary(0) {
            Some(operand) => {
                let loc = token_loc(&op_tok).union(&operand.get_loc());
                Some(Expr::Op1(op, Box::new(operand), loc))
            }
            None => {
                self.errors.push(format!(
                    "unary operator \"{}\" without operand.",
                    op_tok.text
                ));
                None
            }
        }
    }

    fn expect_reserved(&mut self, word: &str) -> bool {
        match self.lexer.peek() {
            Some(tok) if tok.is_reserved(word) => {
                self.lexer.next();
                true
            }
            _ => false,
        }
    }

    fn if_expr(&mut self) -> Option<Expr> {
        let if_tok = self.lexer.next()?;

        let cond = match self.expr() {
            Some(cond) => cond,
            None => {
                self.errors
                    .push("expected an expr to follow \"IF\"".to_owned());
                return None;
            }
        };
        if !self.expect_reserved("then") {
            self.errors.push("expected \"THEN\"".to_owned());
            return None;
        }
        let t = match self.expr() {
            Some(t) => t,
            None => {
                self.errors
                    .push("expected an expr to follow \"THEN\"".to_owned());
                return None;
            }
        };
        if !self.expect_reserved("else") {
            self.errors.push("expected \"ELSE\"".to_owned());
            return None;
        }
        let f = match self.expr() {
            Some(f) => f,
            None => {
                self.errors
                    .push("expected an expr to follow \"ELSE\"".to_owned());
                return None;
            }
        };

        let loc = token_loc(&if_tok).union(&f.get_loc());
        Some(Expr::If(Box::new(cond), Box::new(t), Box::new(f), loc))
    }

    fn ident_or_call(&mut self) -> Option<Expr> {
        let ident = self.lexer.next()?;
        if !self.peek_is_op(&["("]) {
            return Some(Expr::var(&ident.text, token_loc(&ident)));
        }
        // consume the opening paren
        self.lexer.next();

        let mut args = vec![];
        if self.peek_is_op(&[")"]) {
            let rparen = self.lexer.next()?;
            let loc = Loc::new(ident.start_loc, rparen.end_loc);
            return Some(Expr::App(canonicalize(&ident.text), args, loc));
        }

        loop {
            match self.expr() {
                Some(arg) => args.push(arg),
                None => {
                    self.errors
                        .push("expected expression as arg in function call".to_owned());
                    return None;
                }
            }
            match self.lexer.next() {
                Some(tok) if tok.is_op(",") => continue,
                Some(tok) if tok.is_op(")") => {
                    let loc = Loc::new(ident.start_loc, tok.end_loc);
                    return Some(Expr::App(canonicalize(&ident.text), args, loc));
                }
                _ => {
                    self.errors
                        .push("call: expected \",\" or \")\"".to_owned());
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(eqn: &str) -> Expr {
        parse_equation(eqn)
            .unwrap_or_else(|errs| panic!("parse of {:?} failed: {:?}", eqn, errs))
            .unwrap_or_else(|| panic!("parse of {:?} produced no expression", eqn))
            .strip_loc()
    }

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Var(name.to_owned(), Loc::default()))
    }

    fn num(text: &str, n: f64) -> Box<Expr> {
        Box::new(Expr::Const(text.to_owned(), n, Loc::default()))
    }

    fn op2(op: BinaryOp, l: Box<Expr>, r: Box<Expr>) -> Box<Expr> {
        Box::new(Expr::Op2(op, l, r, Loc::default()))
    }

    #[test]
    fn test_parse_ok() {
        let cases: Vec<(&str, Box<Expr>)> = vec![
            ("3.2 <> åbc", op2(BinaryOp::Neq, num("3.2", 3.2), var("åbc"))),
            (
                "hares * birth_fraction",
                op2(BinaryOp::Mul, var("hares"), var("birth_fraction")),
            ),
            (
                "\"hares\" * \"birth fraction\"",
                op2(BinaryOp::Mul, var("hares"), var("birth_fraction")),
            ),
            (
                "a + b * c",
                op2(BinaryOp::Add, var("a"), op2(BinaryOp::Mul, var("b"), var("c"))),
            ),
            (
                "a - b - c",
                op2(BinaryOp::Sub, op2(BinaryOp::Sub, var("a"), var("b")), var("c")),
            ),
            (
                "a ^ 2 * b",
                op2(BinaryOp::Mul, op2(BinaryOp::Exp, var("a"), num("2", 2.0)), var("b")),
            ),
            (
                "a > 1 and b = 2 or c",
                op2(
                    BinaryOp::Or,
                    op2(
                        BinaryOp::And,
                        op2(BinaryOp::Gt, var("a"), num("1", 1.0)),
                        op2(BinaryOp::Eq, var("b"), num("2", 2.0)),
                    ),
                    var("c"),
                ),
            ),
            (
                "7 mod 2",
                op2(BinaryOp::Mod, num("7", 7.0), num("2", 2.0)),
            ),
            (
                "-a * 2",
                op2(
                    BinaryOp::Mul,
                    Box::new(Expr::Op1(UnaryOp::Negative, var("a"), Loc::default())),
                    num("2", 2.0),
                ),
            ),
            (
                "(a + b)",
                Box::new(Expr::Paren(
                    op2(BinaryOp::Add, var("a"), var("b")),
                    Loc::default(),
                )),
            ),
            (
                "IF value THEN MAX(flow, 0) ELSE flow",
                Box::new(Expr::If(
                    var("value"),
                    Box::new(Expr::App(
                        "max".to_owned(),
                        vec![*var("flow"), *num("0", 0.0)],
                        Loc::default(),
                    )),
                    var("flow"),
                    Loc::default(),
                )),
            ),
            (
                "pi()",
                Box::new(Expr::App("pi".to_owned(), vec![], Loc::default())),
            ),
        ];

        for (eqn, expected) in cases.into_iter() {
            assert_eq!(*expected, parse(eqn), "parsing {:?}", eqn);
        }
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Ok(None), parse_equation(""));
        assert_eq!(Ok(None), parse_equation("  {just a comment}\n"));
    }

    #[test]
    fn test_parse_failures() {
        let cases = [
            "(",
            "(3",
            "3 +",
            "3 *",
            "(3 +)",
            "call(a,",
            "call(a,1+",
            "if if",
            "if 1 then",
            "if then",
            "if 1 then 2 else",
            "a < 1 then 1 else 0",
            "-",
            "a b",
        ];

        for eqn in cases.iter() {
            let result = parse_equation(eqn);
            assert!(result.is_err(), "expected {:?} to fail, got {:?}", eqn, result);
        }
    }

    #[test]
    fn test_parse_error_messages() {
        assert_eq!(
            Err(vec!["expected \")\", not end-of-equation".to_owned()]),
            parse_equation("(3")
        );
        assert_eq!(
            Err(vec!["expected rhs of expr after \"+\"".to_owned()]),
            parse_equation("3 +")
        );
        assert_eq!(
            Err(vec!["expected \"ELSE\"".to_owned()]),
            parse_equation("if 1 then 2")
        );
        assert_eq!(
            Err(vec!["unary operator \"-\" without operand.".to_owned()]),
            parse_equation("-")
        );
    }
}
