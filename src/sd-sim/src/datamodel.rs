// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// the document-level description of a project, as handed to us by an
// importer.  Equations are still raw text here.

#[derive(Clone, PartialEq, Debug)]
pub struct GraphicalFunctionScale {
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, PartialEq, Debug)]
pub struct GraphicalFunction {
    pub x_points: Option<Vec<f64>>,
    pub y_points: Vec<f64>,
    pub x_scale: GraphicalFunctionScale,
    pub y_scale: GraphicalFunctionScale,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Stock {
    pub ident: String,
    pub equation: String,
    pub documentation: String,
    pub units: Option<String>,
    pub inflows: Vec<String>,
    pub outflows: Vec<String>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Flow {
    pub ident: String,
    pub equation: String,
    pub documentation: String,
    pub units: Option<String>,
    pub gf: Option<GraphicalFunction>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Aux {
    pub ident: String,
    pub equation: String,
    pub documentation: String,
    pub units: Option<String>,
    pub gf: Option<GraphicalFunction>,
}

/// ModuleReference connects `src`, a name in the instantiating
/// model, to `dst`, an input inside the module.
#[derive(Clone, PartialEq, Debug)]
pub struct ModuleReference {
    pub src: String,
    pub dst: String,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Module {
    pub ident: String,
    // None means the instantiated model shares the module's name
    pub model_name: Option<String>,
    pub documentation: String,
    pub units: Option<String>,
    pub references: Vec<ModuleReference>,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Variable {
    Stock(Stock),
    Flow(Flow),
    Aux(Aux),
    Module(Module),
}

impl Variable {
    pub fn get_ident(&self) -> &str {
        match self {
            Variable::Stock(stock) => stock.ident.as_str(),
            Variable::Flow(flow) => flow.ident.as_str(),
            Variable::Aux(aux) => aux.ident.as_str(),
            Variable::Module(module) => module.ident.as_str(),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Model {
    pub name: String,
    pub sim_specs: Option<SimSpecs>,
    pub variables: Vec<Variable>,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Dt {
    Dt(f64),
    Reciprocal(f64),
}

impl Default for Dt {
    fn default() -> Self {
        Dt::Dt(1.0)
    }
}

impl Dt {
    pub fn value(&self) -> f64 {
        match self {
            Dt::Dt(value) => *value,
            Dt::Reciprocal(value) => 1.0 / *value,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct SimSpecs {
    pub start: f64,
    pub stop: f64,
    pub dt: Dt,
    pub save_step: Option<Dt>,
    pub sim_method: String,
    pub time_units: Option<String>,
}

impl Default for SimSpecs {
    fn default() -> Self {
        SimSpecs {
            start: 0.0,
            stop: 10.0,
            dt: Dt::default(),
            save_step: None,
            sim_method: "euler".to_owned(),
            time_units: None,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Project {
    pub name: String,
    pub sim_specs: Option<SimSpecs>,
    pub models: Vec<Model>,
}

impl Project {
    pub fn get_model(&self, model_name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name == model_name)
    }
}

#[test]
fn test_dt_value() {
    assert_eq!(0.25, Dt::Dt(0.25).value());
    assert_eq!(0.25, Dt::Reciprocal(4.0).value());
    assert_eq!(1.0, Dt::default().value());
}
