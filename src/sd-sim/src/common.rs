// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

use lazy_static::lazy_static;
use regex::Regex;

pub type Ident = String;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    Version,
    BadTime,
    UnknownIntegrationMethod,
    UnknownBuiltin,
    BadBuiltinArgs,
    EmptyEquation,
    NotSimulatable,
    BadTable,
    BadSimSpecs,
    CircularDependency,
    BadModelName,
    DuplicateVariable,
    UnknownDependency,
    UnknownVariable,
    UnknownCommand,
    BadCommandArgs,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            Version => "version",
            BadTime => "bad_time",
            UnknownIntegrationMethod => "unknown_integration_method",
            UnknownBuiltin => "unknown_builtin",
            BadBuiltinArgs => "bad_builtin_args",
            EmptyEquation => "empty_equation",
            NotSimulatable => "not_simulatable",
            BadTable => "bad_table",
            BadSimSpecs => "bad_sim_specs",
            CircularDependency => "circular_dependency",
            BadModelName => "bad_model_name",
            DuplicateVariable => "duplicate_variable",
            UnknownDependency => "unknown_dependency",
            UnknownVariable => "unknown_variable",
            UnknownCommand => "unknown_command",
            BadCommandArgs => "bad_command_args",
            Generic => "generic",
        };

        write!(f, "{}", name)
    }
}

/// EquationError is a problem with a single variable's equation,
/// located by the character span it covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EquationError {
    pub start: u16,
    pub end: u16,
    pub code: ErrorCode,
}

impl fmt::Display for EquationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.end, self.code)
    }
}

#[macro_export]
macro_rules! eqn_err(
    ($code:tt, $start:expr, $end:expr) => {{
        use crate::common::{EquationError, ErrorCode};
        Err(EquationError{ start: $start, end: $end, code: ErrorCode::$code})
    }}
);

#[macro_export]
macro_rules! import_err(
    ($code:tt, $str:expr) => {{
        use crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error{
            kind: ErrorKind::Import,
            code: ErrorCode::$code,
            details: Some($str),
        })
    }}
);

#[macro_export]
macro_rules! model_err(
    ($code:tt, $str:expr) => {{
        use crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error{
            kind: ErrorKind::Model,
            code: ErrorCode::$code,
            details: Some($str),
        })
    }}
);

#[macro_export]
macro_rules! sim_err(
    ($code:tt, $str:expr) => {{
        use crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error{
            kind: ErrorKind::Simulation,
            code: ErrorCode::$code,
            details: Some($str),
        })
    }}
);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Import,
    Model,
    Simulation,
    Variable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub(crate) details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Import => "ImportError",
            ErrorKind::Model => "ModelError",
            ErrorKind::Simulation => "SimulationError",
            ErrorKind::Variable => "VariableError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Import,
            code: ErrorCode::Version,
            details: Some(err.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Simulation,
            code: ErrorCode::Generic,
            details: Some(err.to_string()),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error {
            kind: ErrorKind::Simulation,
            code: ErrorCode::Generic,
            details: Some(err.to_string()),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
pub type EquationResult<T> = result::Result<T, EquationError>;

/// Prefix of synthetic variables introduced when builtin calls are
/// expanded into module instances.
pub const HIDDEN_PREFIX: &str = "$·";

pub fn canonicalize(name: &str) -> String {
    // remove leading and trailing whitespace, do this before testing
    // for quotedness as we should treat a quoted string as sacrosanct
    let name = name.trim();

    let bytes = name.as_bytes();
    let quoted: bool = { bytes.len() >= 2 && bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"' };

    let name = if quoted {
        &name[1..bytes.len() - 1]
    } else {
        name
    };

    lazy_static! {
        static ref UNDERSCORE_RE: Regex =
            Regex::new(r"(\\n|\\r|[_\r\n\t \x{00A0}])+").unwrap();
    }
    let name = name.replace("\\\\", "\\");
    let name = UNDERSCORE_RE.replace_all(&name, "_");

    name.to_lowercase()
}

#[test]
fn test_error_code_names() {
    assert_eq!("circular_dependency", ErrorCode::CircularDependency.to_string());
    assert_eq!("bad_sim_specs", ErrorCode::BadSimSpecs.to_string());
    assert_eq!("unknown_command", ErrorCode::UnknownCommand.to_string());
    let err = EquationError {
        start: 2,
        end: 5,
        code: ErrorCode::UnknownBuiltin,
    };
    assert_eq!("2:5:unknown_builtin", err.to_string());
}

#[test]
fn test_canonicalize() {
    assert_eq!(canonicalize("\"quoted\""), "quoted");
    assert_eq!(canonicalize("   a b"), "a_b");
    assert_eq!(canonicalize("Å\nb"), "å_b");
    assert_eq!(canonicalize("Birth  Fraction"), "birth_fraction");
    assert_eq!(canonicalize("a__b"), "a_b");
    assert_eq!(canonicalize("\"birth\\nrate\""), "birth_rate");
}

#[test]
fn test_canonicalize_idempotent() {
    let cases = [
        "hares",
        "Hare Births",
        "a1_åbc____",
        "\"quoted name\"",
        "MAX",
        "x\u{00A0}y",
        "mixed_Case  spaces\tand_tabs",
    ];
    for s in cases.iter() {
        let once = canonicalize(s);
        assert_eq!(once, canonicalize(&once), "not idempotent for {:?}", s);
    }
}
