// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// Models backing the builtin functions that need their own state:
// a call like `smth1(x, 3)` is rewritten into an instance of
// `stdlib·smth1` with `input` and `delay_time` wired to the
// arguments.  Every model here reads `input`, `delay_time` and
// `initial_value`, and exposes its result as `output`.

use crate::datamodel::{Aux, Flow, Model, Stock, Variable};

pub const MODEL_NAMES: [&str; 5] = ["delay1", "delay3", "smth1", "smth3", "trend"];

pub const MODEL_PREFIX: &str = "stdlib·";

fn aux(ident: &str, eqn: &str) -> Variable {
    Variable::Aux(Aux {
        ident: ident.to_owned(),
        equation: eqn.to_owned(),
        documentation: "".to_owned(),
        units: None,
        gf: None,
    })
}

fn flow(ident: &str, eqn: &str) -> Variable {
    Variable::Flow(Flow {
        ident: ident.to_owned(),
        equation: eqn.to_owned(),
        documentation: "".to_owned(),
        units: None,
        gf: None,
    })
}

fn stock(ident: &str, eqn: &str, inflows: &[&str], outflows: &[&str]) -> Variable {
    Variable::Stock(Stock {
        ident: ident.to_owned(),
        equation: eqn.to_owned(),
        documentation: "".to_owned(),
        units: None,
        inflows: inflows.iter().map(|s| s.to_string()).collect(),
        outflows: outflows.iter().map(|s| s.to_string()).collect(),
    })
}

fn inputs(initial_value: &str) -> Vec<Variable> {
    vec![
        aux("input", "0"),
        aux("delay_time", "1"),
        aux("initial_value", initial_value),
    ]
}

fn model(name: &str, mut variables: Vec<Variable>, initial_value: &str) -> Model {
    let mut all = inputs(initial_value);
    all.append(&mut variables);
    Model {
        name: format!("{}{}", MODEL_PREFIX, name),
        sim_specs: None,
        variables: all,
    }
}

fn smth1() -> Model {
    model(
        "smth1",
        vec![
            stock("output", "initial_value", &["flow"], &[]),
            flow("flow", "(input - output) / delay_time"),
        ],
        "input",
    )
}

fn smth3() -> Model {
    model(
        "smth3",
        vec![
            stock("stock_1", "initial_value", &["flow_1"], &[]),
            flow("flow_1", "(input - stock_1) / (delay_time / 3)"),
            stock("stock_2", "initial_value", &["flow_2"], &[]),
            flow("flow_2", "(stock_1 - stock_2) / (delay_time / 3)"),
            stock("output", "initial_value", &["flow_3"], &[]),
            flow("flow_3", "(stock_2 - output) / (delay_time / 3)"),
        ],
        "input",
    )
}

fn delay1() -> Model {
    model(
        "delay1",
        vec![
            stock("stock", "initial_value * delay_time", &["inflow"], &["output"]),
            flow("inflow", "input"),
            flow("output", "stock / delay_time"),
        ],
        "input",
    )
}

fn delay3() -> Model {
    model(
        "delay3",
        vec![
            stock(
                "stock_1",
                "initial_value * delay_time / 3",
                &["inflow"],
                &["flow_1"],
            ),
            flow("inflow", "input"),
            flow("flow_1", "stock_1 / (delay_time / 3)"),
            stock(
                "stock_2",
                "initial_value * delay_time / 3",
                &["flow_1"],
                &["flow_2"],
            ),
            flow("flow_2", "stock_2 / (delay_time / 3)"),
            stock(
                "stock_3",
                "initial_value * delay_time / 3",
                &["flow_2"],
                &["output"],
            ),
            flow("output", "stock_3 / (delay_time / 3)"),
        ],
        "input",
    )
}

fn trend() -> Model {
    model(
        "trend",
        vec![
            stock(
                "average_input",
                "input / (1 + initial_value * delay_time)",
                &["change_in_average"],
                &[],
            ),
            flow("change_in_average", "(input - average_input) / delay_time"),
            aux(
                "output",
                "(input - average_input) / (average_input * delay_time)",
            ),
        ],
        "0",
    )
}

/// get returns the datamodel for a stdlib function, where `name` is
/// the bare function name (`smth1`, not `stdlib·smth1`).
pub fn get(name: &str) -> Option<Model> {
    let model = match name {
        "delay1" => delay1(),
        "delay3" => delay3(),
        "smth1" => smth1(),
        "smth3" => smth3(),
        "trend" => trend(),
        _ => return None,
    };
    Some(model)
}

#[test]
fn test_stdlib_models() {
    for name in MODEL_NAMES.iter() {
        let model = get(name).unwrap();
        assert_eq!(format!("stdlib·{}", name), model.name);
        for input in ["input", "delay_time", "initial_value", "output"].iter() {
            assert!(
                model.variables.iter().any(|v| v.get_ident() == *input),
                "{} is missing {}",
                name,
                input
            );
        }
    }
    assert!(get("smth2").is_none());
}
