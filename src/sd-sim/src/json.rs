// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! JSON form of a project, with separate arrays for
//! stocks/flows/auxiliaries/modules rather than a unified enum.
//!
//! ```no_run
//! use std::convert::TryInto;
//! use sd_sim::json;
//!
//! let json_str = r#"{"name": "test", "sim_specs": {...}, ...}"#;
//! let project: sd_sim::datamodel::Project = json_str.parse::<json::Project>()?.try_into()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::convert::{TryFrom, TryInto};

use serde::{Deserialize, Serialize};

use crate::common::{Error, ErrorCode, ErrorKind, Result};
use crate::datamodel;

fn is_empty_string(val: &str) -> bool {
    val.is_empty()
}

fn is_empty_vec<T>(val: &[T]) -> bool {
    val.is_empty()
}

fn is_zero_f64(val: &f64) -> bool {
    *val == 0.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicalFunctionScale {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicalFunction {
    #[serde(skip_serializing_if = "is_empty_vec", default)]
    pub x_points: Vec<f64>,
    #[serde(skip_serializing_if = "is_empty_vec", default)]
    pub y_points: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub x_scale: Option<GraphicalFunctionScale>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub y_scale: Option<GraphicalFunctionScale>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub name: String,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub initial_equation: String,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub units: String,
    #[serde(default)]
    pub inflows: Vec<String>,
    #[serde(default)]
    pub outflows: Vec<String>,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub documentation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub name: String,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub equation: String,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub units: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub graphical_function: Option<GraphicalFunction>,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub documentation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auxiliary {
    pub name: String,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub equation: String,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub units: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub graphical_function: Option<GraphicalFunction>,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub documentation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleReference {
    pub src: String,
    pub dst: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub model_name: String,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub units: String,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub documentation: String,
    #[serde(skip_serializing_if = "is_empty_vec", default)]
    pub references: Vec<ModuleReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSpecs {
    pub start_time: f64,
    pub end_time: f64,
    // either a number, or "1/N" for a reciprocal dt
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub dt: String,
    #[serde(skip_serializing_if = "is_zero_f64", default)]
    pub save_step: f64,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub method: String,
    #[serde(skip_serializing_if = "is_empty_string", default)]
    pub time_units: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    #[serde(default)]
    pub stocks: Vec<Stock>,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub auxiliaries: Vec<Auxiliary>,
    #[serde(skip_serializing_if = "is_empty_vec", default)]
    pub modules: Vec<Module>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sim_specs: Option<SimSpecs>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sim_specs: Option<SimSpecs>,
    pub models: Vec<Model>,
}

fn optional(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl From<GraphicalFunctionScale> for datamodel::GraphicalFunctionScale {
    fn from(scale: GraphicalFunctionScale) -> Self {
        datamodel::GraphicalFunctionScale {
            min: scale.min,
            max: scale.max,
        }
    }
}

impl From<GraphicalFunction> for datamodel::GraphicalFunction {
    fn from(gf: GraphicalFunction) -> Self {
        let x_points = if gf.x_points.is_empty() {
            None
        } else {
            Some(gf.x_points)
        };

        let x_scale = gf.x_scale.unwrap_or(GraphicalFunctionScale {
            min: 0.0,
            max: gf.y_points.len().saturating_sub(1) as f64,
        });
        let y_scale = gf
            .y_scale
            .unwrap_or(GraphicalFunctionScale { min: 0.0, max: 1.0 });

        datamodel::GraphicalFunction {
            x_points,
            y_points: gf.y_points,
            x_scale: x_scale.into(),
            y_scale: y_scale.into(),
        }
    }
}

impl From<Stock> for datamodel::Stock {
    fn from(stock: Stock) -> Self {
        datamodel::Stock {
            ident: stock.name,
            equation: stock.initial_equation,
            documentation: stock.documentation,
            units: optional(stock.units),
            inflows: stock.inflows,
            outflows: stock.outflows,
        }
    }
}

impl From<Flow> for datamodel::Flow {
    fn from(flow: Flow) -> Self {
        datamodel::Flow {
            ident: flow.name,
            equation: flow.equation,
            documentation: flow.documentation,
            units: optional(flow.units),
            gf: flow.graphical_function.map(|gf| gf.into()),
        }
    }
}

impl From<Auxiliary> for datamodel::Aux {
    fn from(aux: Auxiliary) -> Self {
        datamodel::Aux {
            ident: aux.name,
            equation: aux.equation,
            documentation: aux.documentation,
            units: optional(aux.units),
            gf: aux.graphical_function.map(|gf| gf.into()),
        }
    }
}

impl From<ModuleReference> for datamodel::ModuleReference {
    fn from(mr: ModuleReference) -> Self {
        datamodel::ModuleReference {
            src: mr.src,
            dst: mr.dst,
        }
    }
}

impl From<Module> for datamodel::Module {
    fn from(module: Module) -> Self {
        datamodel::Module {
            ident: module.name,
            model_name: optional(module.model_name),
            documentation: module.documentation,
            units: optional(module.units),
            references: module.references.into_iter().map(|r| r.into()).collect(),
        }
    }
}

fn parse_dt(dt: &str, n: &str) -> Result<f64> {
    match n.trim().parse::<f64>() {
        Ok(n) => Ok(n),
        Err(_) => import_err!(BadSimSpecs, format!("bad dt '{}'", dt)),
    }
}

impl TryFrom<SimSpecs> for datamodel::SimSpecs {
    type Error = Error;

    fn try_from(ss: SimSpecs) -> Result<Self> {
        let dt = if ss.dt.trim().is_empty() {
            datamodel::Dt::default()
        } else if let Some(reciprocal) = ss.dt.trim().strip_prefix("1/") {
            datamodel::Dt::Reciprocal(parse_dt(&ss.dt, reciprocal)?)
        } else {
            datamodel::Dt::Dt(parse_dt(&ss.dt, &ss.dt)?)
        };

        let save_step = if ss.save_step == 0.0 {
            None
        } else {
            Some(datamodel::Dt::Dt(ss.save_step))
        };

        let sim_method = if ss.method.is_empty() {
            "euler".to_owned()
        } else {
            ss.method
        };

        Ok(datamodel::SimSpecs {
            start: ss.start_time,
            stop: ss.end_time,
            dt,
            save_step,
            sim_method,
            time_units: optional(ss.time_units),
        })
    }
}

impl From<Model> for datamodel::Model {
    fn from(model: Model) -> Self {
        let mut variables = Vec::new();

        for stock in model.stocks {
            variables.push(datamodel::Variable::Stock(stock.into()));
        }
        for flow in model.flows {
            variables.push(datamodel::Variable::Flow(flow.into()));
        }
        for aux in model.auxiliaries {
            variables.push(datamodel::Variable::Aux(aux.into()));
        }
        for module in model.modules {
            variables.push(datamodel::Variable::Module(module.into()));
        }

        datamodel::Model {
            name: model.name,
            sim_specs: model.sim_specs.map(|ss| ss.into()),
            variables,
        }
    }
}

impl TryFrom<Project> for datamodel::Project {
    type Error = Error;

    fn try_from(project: Project) -> Result<Self> {
        let sim_specs = match project.sim_specs {
            Some(ss) => Some(ss.try_into()?),
            None => None,
        };
        Ok(datamodel::Project {
            name: project.name,
            sim_specs,
            models: project.models.into_iter().map(|m| m.into()).collect(),
        })
    }
}

fn import_error(err: serde_json::Error) -> Error {
    Error::new(
        ErrorKind::Import,
        ErrorCode::Version,
        Some(format!("failed to parse JSON project: {}", err)),
    )
}

impl std::str::FromStr for Project {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_json::from_str(s).map_err(import_error)
    }
}

impl Project {
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        serde_json::from_reader(reader).map_err(import_error)
    }
}
