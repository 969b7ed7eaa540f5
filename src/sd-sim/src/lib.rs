// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

use std::convert::TryInto;

#[macro_use]
extern crate float_cmp;

#[macro_use]
pub mod common;
mod ast;
mod builtins;
mod builtins_visitor;
pub mod commands;
pub mod datamodel;
mod interpreter;
pub mod json;
mod model;
mod parser;
mod project;
mod results;
mod sim;
mod stdlib;
mod token;
mod variable;

pub use self::commands::{dispatch, handle, Command};
pub use self::common::{canonicalize, Error, ErrorCode, ErrorKind, Ident, Result};
pub use self::interpreter::{Series, SimOptions, Simulation};
pub use self::project::Project;
pub use self::results::Results;
pub use self::sim::{Method, Specs as SimSpecs};

/// simulate loads a JSON project and runs it to the end.
pub fn simulate<R: std::io::Read>(reader: R) -> Result<Results> {
    let project: datamodel::Project = json::Project::from_reader(reader)?.try_into()?;
    let project = Project::new(&project)?;
    let mut sim = Simulation::new(&project)?;
    sim.run_to_end();
    Ok(sim.results())
}
