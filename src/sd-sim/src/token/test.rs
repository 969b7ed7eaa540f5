// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use super::TokenKind::*;
use super::{Lexer, SourceLoc, TokenKind};

fn test(input: &str, expected: Vec<(&str, TokenKind)>) {
    let actual: Vec<(String, TokenKind)> = Lexer::new(input).map(|t| (t.text, t.kind)).collect();
    let expected: Vec<(String, TokenKind)> = expected
        .into_iter()
        .map(|(text, kind)| (text.to_owned(), kind))
        .collect();
    assert_eq!(expected, actual, "lexing {:?}", input);
}

#[test]
fn identifiers() {
    test("a", vec![("a", Ident)]);
    test("å", vec![("å", Ident)]);
    test("a1_åbc________", vec![("a1_åbc________", Ident)]);
    test(
        "hares * birth_fraction",
        vec![("hares", Ident), ("*", Token), ("birth_fraction", Ident)],
    );
    test("sector.output", vec![("sector.output", Ident)]);
    test(".root_var", vec![(".root_var", Ident)]);
    test(
        "$·x·0·smth1.output * 2",
        vec![("$·x·0·smth1.output", Ident), ("*", Token), ("2", Number)],
    );
}

#[test]
fn quoted_identifiers() {
    test(
        "\"hares\" * \"birth fraction\"",
        vec![("\"hares\"", Ident), ("*", Token), ("\"birth fraction\"", Ident)],
    );
    test("\"unterminated + 3", vec![("\"unterminated + 3", Ident)]);
}

#[test]
fn ifstmt() {
    test(
        "IF value THEN MAX(flow, 1) ELSE flow",
        vec![
            ("if", Reserved),
            ("value", Ident),
            ("then", Reserved),
            ("max", Ident),
            ("(", Token),
            ("flow", Ident),
            (",", Token),
            ("1", Number),
            (")", Token),
            ("else", Reserved),
            ("flow", Ident),
        ],
    );
    test(
        "if a < 1 then 1 else 0",
        vec![
            ("if", Reserved),
            ("a", Ident),
            ("<", Token),
            ("1", Number),
            ("then", Reserved),
            ("1", Number),
            ("else", Reserved),
            ("0", Number),
        ],
    );
}

#[test]
fn case_insensitive() {
    let upper: Vec<_> = Lexer::new("MAX(A, B)").collect();
    let lower: Vec<_> = Lexer::new("max(a, b)").collect();
    assert_eq!(upper, lower);
}

#[test]
fn numbers() {
    test("3", vec![("3", Number)]);
    test("5E4", vec![("5e4", Number)]);
    test("5e4", vec![("5e4", Number)]);
    test(
        "5.0000000000000e4.00000000000000",
        vec![("5.0000000000000e4.00000000000000", Number)],
    );
    test("5.3e4.", vec![("5.3e4.", Number)]);
    test(
        "3.1.1e.1.1e1e1",
        vec![
            ("3.1", Number),
            (".1e.1", Number),
            (".1e1", Number),
            ("e1", Ident),
        ],
    );
    test("-3.222\n", vec![("-", Token), ("3.222", Number)]);
    test("-30000.222", vec![("-", Token), ("30000.222", Number)]);
}

#[test]
fn number_values() {
    let value = |s: &str| Lexer::new(s).next().and_then(|t| t.value());
    assert_eq!(Some(3.0), value("3"));
    assert_eq!(Some(50000.0), value("5E4"));
    assert_eq!(Some(53000.0), value("5.3e4."));
    assert_eq!(Some(0.1), value(".1e.1"));
    assert_eq!(Some(1000.0), value("1e3"));
    assert_eq!(None, value("a"));
}

#[test]
fn operators() {
    test(
        "3 == 4 \n\n= 1",
        vec![
            ("3", Number),
            ("=", Token),
            ("4", Number),
            ("=", Token),
            ("1", Number),
        ],
    );
    test("3 <> 4", vec![("3", Number), ("≠", Token), ("4", Number)]);
    test(
        "3 >< 4",
        vec![("3", Number), (">", Token), ("<", Token), ("4", Number)],
    );
    test("3 <= 4", vec![("3", Number), ("≤", Token), ("4", Number)]);
    test("3 >= 4", vec![("3", Number), ("≥", Token), ("4", Number)]);
    test("3 AND 4", vec![("3", Number), ("&", Token), ("4", Number)]);
    test("3 OR 4", vec![("3", Number), ("|", Token), ("4", Number)]);
    test("NOT 0", vec![("!", Token), ("0", Number)]);
    test("7 MOD 2", vec![("7", Number), ("%", Token), ("2", Number)]);
}

#[test]
fn comments_and_whitespace() {
    test("", vec![]);
    test("\n", vec![]);
    test("{comment}", vec![]);
    test("{unclosed comment", vec![]);
    test("{}", vec![]);
    test("{comment before num}3", vec![("3", Number)]);
    test("{multi\nline}\n  x", vec![("x", Ident)]);
}

#[test]
fn builtin_call() {
    test(
        "pulse(size_of_1_time_lynx_harvest, 4, 1e3)\n",
        vec![
            ("pulse", Ident),
            ("(", Token),
            ("size_of_1_time_lynx_harvest", Ident),
            (",", Token),
            ("4", Number),
            (",", Token),
            ("1e3", Number),
            (")", Token),
        ],
    );
}

#[test]
fn locations() {
    let toks: Vec<_> = Lexer::new("a >= 10\n  b").collect();
    assert_eq!(SourceLoc::new(0, 0), toks[0].start_loc);
    assert_eq!(SourceLoc::new(0, 1), toks[0].end_loc);
    assert_eq!(SourceLoc::new(0, 2), toks[1].start_loc);
    assert_eq!(SourceLoc::new(0, 4), toks[1].end_loc);
    assert_eq!(SourceLoc::new(0, 5), toks[2].start_loc);
    assert_eq!(SourceLoc::new(0, 7), toks[2].end_loc);
    assert_eq!(SourceLoc::new(1, 2), toks[3].start_loc);
}

#[test]
fn locations_ignore_case_folding() {
    // 'İ' lowercases to two characters
    let toks: Vec<_> = Lexer::new("İ + Bé\n\"Ä Name\" * 2").collect();
    assert_eq!("i\u{307}", toks[0].text);
    assert_eq!(SourceLoc::new(0, 1), toks[0].end_loc);
    assert_eq!(SourceLoc::new(0, 2), toks[1].start_loc);
    assert_eq!("bé", toks[2].text);
    assert_eq!(SourceLoc::new(0, 4), toks[2].start_loc);
    assert_eq!(SourceLoc::new(0, 6), toks[2].end_loc);
    assert_eq!("\"ä name\"", toks[3].text);
    assert_eq!(SourceLoc::new(1, 0), toks[3].start_loc);
    assert_eq!(SourceLoc::new(1, 8), toks[3].end_loc);
    assert_eq!(SourceLoc::new(1, 9), toks[4].start_loc);
}

#[test]
fn peek_is_memoized() {
    let mut lexer = Lexer::new("a + b");
    assert_eq!(Some("a"), lexer.peek().map(|t| t.text.as_str()));
    assert_eq!(Some("a"), lexer.peek().map(|t| t.text.as_str()));
    assert_eq!(Some("a".to_owned()), lexer.next().map(|t| t.text));
    assert_eq!(Some("+".to_owned()), lexer.next().map(|t| t.text));
    assert_eq!(Some("b".to_owned()), lexer.next().map(|t| t.text));
    assert_eq!(None, lexer.peek());
    assert_eq!(None, lexer.next());
}
