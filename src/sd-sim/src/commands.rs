// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// The request surface a host uses to drive a simulation it owns.
// Requests arrive as `[id, "cmd", args...]` and every request gets
// exactly one `[id, [result, error]]` reply.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::common::{Ident, Result};
use crate::interpreter::Simulation;
use crate::sim_err;

#[derive(Clone, PartialEq, Debug)]
pub enum Command {
    Reset,
    SetVal { name: Ident, value: f64 },
    GetVal(Vec<Ident>),
    GetSeries(Vec<Ident>),
    RunTo(f64),
    RunToEnd,
    Dominance {
        overrides: BTreeMap<Ident, f64>,
        indicators: Vec<Ident>,
    },
    VarNames { include_hidden: bool },
}

fn bad_args<T>(cmd: &str) -> Result<T> {
    sim_err!(BadCommandArgs, format!("bad arguments for \"{}\"", cmd))
}

fn names(cmd: &str, args: &[Value]) -> Result<Vec<Ident>> {
    let mut names = Vec::with_capacity(args.len());
    for arg in args.iter() {
        match arg.as_str() {
            Some(name) => names.push(name.to_owned()),
            None => return bad_args(cmd),
        }
    }
    Ok(names)
}

impl Command {
    /// from_json parses a request envelope, returning the request's
    /// id alongside the command.
    pub fn from_json(msg: &Value) -> Result<(Value, Command)> {
        let msg = match msg.as_array() {
            Some(msg) if msg.len() >= 2 => msg,
            _ => return sim_err!(BadCommandArgs, format!("malformed request {}", msg)),
        };
        let id = msg[0].clone();
        let cmd = match msg[1].as_str() {
            Some(cmd) => cmd,
            None => return sim_err!(BadCommandArgs, format!("malformed request {}", msg[1])),
        };
        let args = &msg[2..];

        let command = match cmd {
            "reset" => Command::Reset,
            "set_val" => match (args.get(0).and_then(Value::as_str), args.get(1).and_then(Value::as_f64)) {
                (Some(name), Some(value)) => Command::SetVal {
                    name: name.to_owned(),
                    value,
                },
                _ => return bad_args(cmd),
            },
            "get_val" => Command::GetVal(names(cmd, args)?),
            "get_series" => Command::GetSeries(names(cmd, args)?),
            "run_to" => match args.get(0).and_then(Value::as_f64) {
                Some(time) => Command::RunTo(time),
                None => return bad_args(cmd),
            },
            "run_to_end" => Command::RunToEnd,
            "dominance" => {
                let overrides = match args.get(0).and_then(Value::as_object) {
                    Some(overrides) => overrides,
                    None => return bad_args(cmd),
                };
                let mut forced = BTreeMap::new();
                for (name, value) in overrides.iter() {
                    match value.as_f64() {
                        Some(value) => {
                            forced.insert(name.clone(), value);
                        }
                        None => return bad_args(cmd),
                    }
                }
                let indicators = match args.get(1).and_then(Value::as_array) {
                    Some(indicators) => names(cmd, indicators)?,
                    None => return bad_args(cmd),
                };
                Command::Dominance {
                    overrides: forced,
                    indicators,
                }
            }
            "var_names" => Command::VarNames {
                include_hidden: args.get(0).and_then(Value::as_bool).unwrap_or(false),
            },
            _ => {
                return sim_err!(UnknownCommand, format!("unknown command \"{}\"", cmd));
            }
        };

        Ok((id, command))
    }
}

fn values(sim: &Simulation, names: &[Ident]) -> Result<Value> {
    let mut result = Map::new();
    for name in names.iter() {
        result.insert(name.clone(), json!(sim.value(name)?));
    }
    Ok(Value::Object(result))
}

fn series(sim: &Simulation, names: &[Ident]) -> Result<Value> {
    let mut result = Map::new();
    for name in names.iter() {
        let series = sim.series(name)?;
        result.insert(name.clone(), serde_json::to_value(series)?);
    }
    Ok(Value::Object(result))
}

fn apply(sim: &mut Simulation, cmd: &Command) -> Result<Value> {
    let result = match cmd {
        Command::Reset => {
            sim.reset();
            json!("ok")
        }
        Command::SetVal { name, value } => {
            sim.set_value(name, *value)?;
            json!("ok")
        }
        Command::GetVal(names) => values(sim, names)?,
        Command::GetSeries(names) => series(sim, names)?,
        Command::RunTo(time) => {
            sim.run_to(*time);
            json!(sim.time())
        }
        Command::RunToEnd => {
            sim.run_to_end();
            json!(sim.time())
        }
        Command::Dominance {
            overrides,
            indicators,
        } => json!(sim.dominance(overrides, indicators)),
        Command::VarNames { include_hidden } => json!(sim.var_names(*include_hidden)),
    };
    Ok(result)
}

fn error_message(err: &crate::common::Error) -> String {
    err.get_details().unwrap_or_else(|| err.to_string())
}

/// handle runs a command against the simulation, yielding its
/// result or an error message.
pub fn handle(sim: &mut Simulation, cmd: &Command) -> (Option<Value>, Option<String>) {
    match apply(sim, cmd) {
        Ok(result) => (Some(result), None),
        Err(err) => (None, Some(error_message(&err))),
    }
}

/// dispatch handles a complete request envelope and builds the
/// reply for it.
pub fn dispatch(sim: &mut Simulation, msg: &Value) -> Value {
    let (id, (result, err)) = match Command::from_json(msg) {
        Ok((id, cmd)) => {
            log::debug!("dispatch {:?}", cmd);
            (id, handle(sim, &cmd))
        }
        Err(err) => {
            let id = msg.get(0).cloned().unwrap_or(Value::Null);
            (id, (None, Some(error_message(&err))))
        }
    };
    json!([id, [result, err]])
}
