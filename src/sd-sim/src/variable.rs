// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeMap, HashSet};

use crate::ast::{identifier_set, Expr};
use crate::common::{canonicalize, EquationError, ErrorCode, Ident};
use crate::datamodel;
use crate::parser::parse_equation;

#[derive(Clone, PartialEq, Debug)]
pub struct Table {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    // false when the graphical function has no y-points
    pub ok: bool,
}

/// Reference binds an input inside a module to a value in the scope
/// that instantiates the module.
#[derive(Clone, PartialEq, Debug)]
pub struct Reference {
    // the variable inside the module that is overridden
    pub ident: Ident,
    // the value to read instead, named relative to the parent model
    // (or to the root model, if it starts with a '.')
    pub ptr: Ident,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Variable {
    Ordinary {
        ident: Ident,
        eqn: String,
        ast: Option<Expr>,
        deps: HashSet<Ident>,
        valid: bool,
        errors: Vec<String>,
    },
    Stock {
        ident: Ident,
        // the initial value equation
        eqn: String,
        ast: Option<Expr>,
        deps: HashSet<Ident>,
        valid: bool,
        errors: Vec<String>,
        inflows: Vec<Ident>,
        outflows: Vec<Ident>,
    },
    Table {
        ident: Ident,
        // the index into the table
        eqn: String,
        ast: Option<Expr>,
        deps: HashSet<Ident>,
        valid: bool,
        errors: Vec<String>,
        table: Table,
    },
    Module {
        ident: Ident,
        model_name: Ident,
        refs: BTreeMap<Ident, Reference>,
        deps: HashSet<Ident>,
    },
}

impl Variable {
    pub fn ident(&self) -> &str {
        match self {
            Variable::Ordinary { ident, .. } => ident.as_str(),
            Variable::Stock { ident, .. } => ident.as_str(),
            Variable::Table { ident, .. } => ident.as_str(),
            Variable::Module { ident, .. } => ident.as_str(),
        }
    }

    pub fn eqn(&self) -> Option<&str> {
        match self {
            Variable::Ordinary { eqn, .. } => Some(eqn.as_str()),
            Variable::Stock { eqn, .. } => Some(eqn.as_str()),
            Variable::Table { eqn, .. } => Some(eqn.as_str()),
            Variable::Module { .. } => None,
        }
    }

    pub fn ast(&self) -> Option<&Expr> {
        match self {
            Variable::Ordinary { ast, .. } => ast.as_ref(),
            Variable::Stock { ast, .. } => ast.as_ref(),
            Variable::Table { ast, .. } => ast.as_ref(),
            Variable::Module { .. } => None,
        }
    }

    /// deps is the set of identifiers this variable directly refers to.
    pub fn deps(&self) -> &HashSet<Ident> {
        match self {
            Variable::Ordinary { deps, .. } => deps,
            Variable::Stock { deps, .. } => deps,
            Variable::Table { deps, .. } => deps,
            Variable::Module { deps, .. } => deps,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Variable::Ordinary { valid, .. } => *valid,
            Variable::Stock { valid, .. } => *valid,
            Variable::Table { valid, .. } => *valid,
            Variable::Module { .. } => true,
        }
    }

    pub fn errors(&self) -> &[String] {
        match self {
            Variable::Ordinary { errors, .. } => errors,
            Variable::Stock { errors, .. } => errors,
            Variable::Table { errors, .. } => errors,
            Variable::Module { .. } => &[],
        }
    }

    pub fn is_stock(&self) -> bool {
        matches!(self, Variable::Stock { .. })
    }

    pub fn is_module(&self) -> bool {
        matches!(self, Variable::Module { .. })
    }

    pub fn table(&self) -> Option<&Table> {
        match self {
            Variable::Table { table, .. } => Some(table),
            _ => None,
        }
    }

    /// is_const is true for ordinary variables whose equation is
    /// just a finite number.
    pub fn is_const(&self) -> bool {
        match self {
            Variable::Ordinary {
                ast: Some(ast),
                valid: true,
                ..
            } => ast.constant().map(f64::is_finite).unwrap_or(false),
            _ => false,
        }
    }

    /// set_ast replaces the equation's expression tree, keeping the
    /// dependency set in sync with it.
    pub fn set_ast(&mut self, new_ast: Expr) {
        let new_deps = identifier_set(&new_ast);
        match self {
            Variable::Ordinary { ast, deps, .. }
            | Variable::Stock { ast, deps, .. }
            | Variable::Table { ast, deps, .. } => {
                *ast = Some(new_ast);
                *deps = new_deps;
            }
            Variable::Module { .. } => {}
        }
    }

    /// invalidate marks an equation as unusable, for problems found
    /// after parsing.
    pub fn invalidate(&mut self, err: EquationError) {
        match self {
            Variable::Ordinary {
                ast,
                deps,
                valid,
                errors,
                ..
            }
            | Variable::Stock {
                ast,
                deps,
                valid,
                errors,
                ..
            }
            | Variable::Table {
                ast,
                deps,
                valid,
                errors,
                ..
            } => {
                *ast = None;
                deps.clear();
                *valid = false;
                errors.push(err.to_string());
            }
            Variable::Module { .. } => {}
        }
    }

    pub fn new(v: &datamodel::Variable) -> Self {
        match v {
            datamodel::Variable::Stock(stock) => {
                let (ast, deps, valid, errors) = parse_eqn(&stock.equation);
                Variable::Stock {
                    ident: canonicalize(&stock.ident),
                    eqn: stock.equation.clone(),
                    ast,
                    deps,
                    valid,
                    errors,
                    inflows: stock.inflows.iter().map(|f| canonicalize(f)).collect(),
                    outflows: stock.outflows.iter().map(|f| canonicalize(f)).collect(),
                }
            }
            datamodel::Variable::Flow(datamodel::Flow {
                ident,
                equation,
                gf,
                ..
            })
            | datamodel::Variable::Aux(datamodel::Aux {
                ident,
                equation,
                gf,
                ..
            }) => {
                let (ast, deps, valid, errors) = parse_eqn(equation);
                let ident = canonicalize(ident);
                let eqn = equation.clone();
                match gf {
                    Some(gf) => Variable::Table {
                        ident,
                        eqn,
                        ast,
                        deps,
                        valid,
                        errors,
                        table: parse_table(gf),
                    },
                    None => Variable::Ordinary {
                        ident,
                        eqn,
                        ast,
                        deps,
                        valid,
                        errors,
                    },
                }
            }
            datamodel::Variable::Module(module) => {
                let ident = canonicalize(&module.ident);
                let model_name = match &module.model_name {
                    Some(name) => canonicalize(name),
                    None => ident.clone(),
                };
                let input_prefix = format!("{}.", ident);
                let refs: BTreeMap<Ident, Reference> = module
                    .references
                    .iter()
                    .map(|r| {
                        let dst = canonicalize(&r.dst);
                        let dst = match dst.strip_prefix(&input_prefix) {
                            Some(dst) => dst.to_owned(),
                            None => dst,
                        };
                        let reference = Reference {
                            ident: dst,
                            ptr: canonicalize(&r.src),
                        };
                        (reference.ident.clone(), reference)
                    })
                    .collect();
                let deps = refs.values().map(|r| r.ptr.clone()).collect();

                Variable::Module {
                    ident,
                    model_name,
                    refs,
                    deps,
                }
            }
        }
    }
}

fn parse_eqn(eqn: &str) -> (Option<Expr>, HashSet<Ident>, bool, Vec<String>) {
    match parse_equation(eqn) {
        Ok(Some(ast)) => {
            let deps = identifier_set(&ast);
            (Some(ast), deps, true, vec![])
        }
        Ok(None) => {
            let err = EquationError {
                start: 0,
                end: 0,
                code: ErrorCode::EmptyEquation,
            };
            (None, HashSet::new(), false, vec![err.to_string()])
        }
        Err(errors) => (None, HashSet::new(), false, errors),
    }
}

fn parse_table(gf: &datamodel::GraphicalFunction) -> Table {
    let y = gf.y_points.clone();
    // either the x points have been explicitly specified, or
    // it is a linear mapping of points between xmin and xmax,
    // inclusive
    let x: Vec<f64> = match &gf.x_points {
        Some(x_points) => x_points.iter().take(y.len()).cloned().collect(),
        // a single point has no spacing to spread over the scale
        None if y.len() == 1 => vec![gf.x_scale.min],
        None => {
            let x_min = gf.x_scale.min;
            let x_max = gf.x_scale.max;
            let size = y.len() as f64;
            (0..y.len())
                .map(|i| ((i as f64) / (size - 1.0)) * (x_max - x_min) + x_min)
                .collect()
        }
    };

    let ok = !y.is_empty() && x.len() == y.len();

    Table { x, y, ok }
}

#[cfg(test)]
fn x_aux(ident: &str, eqn: &str) -> datamodel::Variable {
    datamodel::Variable::Aux(datamodel::Aux {
        ident: ident.to_owned(),
        equation: eqn.to_owned(),
        documentation: "".to_owned(),
        units: None,
        gf: None,
    })
}

#[test]
fn test_identifier_sets() {
    let cases: &[(&str, &[&str])] = &[
        ("if a then b else c", &["a", "b", "c"]),
        ("a(1, b, c)", &["b", "c"]),
        ("-(a)", &["a"]),
        ("if a = 1 then -c else c(1, d, b)", &["a", "b", "c", "d"]),
        ("if a.d then b else c", &["a.d", "b", "c"]),
        ("IF value THEN MAX(flow, 0) ELSE flow", &["value", "flow"]),
    ];

    for (eqn, id_list) in cases.iter() {
        let var = Variable::new(&x_aux("x", eqn));
        assert!(var.is_valid());
        let expected: HashSet<Ident> = id_list.iter().map(|s| s.to_string()).collect();
        assert_eq!(&expected, var.deps(), "deps of {:?}", eqn);
    }
}

#[test]
fn test_invalid_equations() {
    let var = Variable::new(&x_aux("x", "3 +"));
    assert!(!var.is_valid());
    assert!(var.ast().is_none());
    assert!(var.deps().is_empty());
    assert_eq!(1, var.errors().len());

    let var = Variable::new(&x_aux("x", ""));
    assert!(!var.is_valid());
    assert_eq!("0:0:empty_equation", var.errors()[0]);
}

#[test]
fn test_is_const() {
    assert!(Variable::new(&x_aux("x", "9")).is_const());
    assert!(Variable::new(&x_aux("x", "-(0.25)")).is_const());
    assert!(!Variable::new(&x_aux("x", "9 * 2")).is_const());
    assert!(!Variable::new(&x_aux("x", "time")).is_const());
    assert!(!Variable::new(&x_aux("x", "inf")).is_const());
}

#[test]
fn test_tables() {
    let input = datamodel::Variable::Aux(datamodel::Aux {
        ident: "lookup function table".to_string(),
        equation: "time".to_string(),
        documentation: "".to_string(),
        units: None,
        gf: Some(datamodel::GraphicalFunction {
            x_scale: datamodel::GraphicalFunctionScale {
                min: 0.0,
                max: 45.0,
            },
            y_scale: datamodel::GraphicalFunctionScale {
                min: -1.0,
                max: 1.0,
            },
            x_points: None,
            y_points: vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0, -1.0, -1.0, 0.0, 0.0],
        }),
    });

    let var = Variable::new(&input);
    assert_eq!("lookup_function_table", var.ident());
    let table = var.table().unwrap();
    assert!(table.ok);
    assert_eq!(
        vec![0.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0],
        table.x
    );
    assert_eq!(table.x.len(), table.y.len());

    let empty = datamodel::GraphicalFunction {
        x_scale: datamodel::GraphicalFunctionScale { min: 0.0, max: 1.0 },
        y_scale: datamodel::GraphicalFunctionScale { min: 0.0, max: 1.0 },
        x_points: None,
        y_points: vec![],
    };
    assert!(!parse_table(&empty).ok);

    let single = datamodel::GraphicalFunction {
        y_points: vec![7.0],
        x_scale: datamodel::GraphicalFunctionScale { min: 2.0, max: 4.0 },
        ..empty
    };
    let table = parse_table(&single);
    assert!(table.ok);
    assert_eq!(vec![2.0], table.x);
    assert_eq!(7.0, crate::builtins::lookup(&table.x, &table.y, 3.0));
    assert_eq!(7.0, crate::builtins::lookup(&table.x, &table.y, -1.0));
}

#[test]
fn test_module_refs() {
    let input = datamodel::Variable::Module(datamodel::Module {
        ident: "Hares".to_owned(),
        model_name: None,
        documentation: "".to_owned(),
        units: None,
        references: vec![
            datamodel::ModuleReference {
                src: ".area".to_owned(),
                dst: "hares.area".to_owned(),
            },
            datamodel::ModuleReference {
                src: "lynxes.lynxes".to_owned(),
                dst: "hares.lynxes".to_owned(),
            },
        ],
    });

    let var = Variable::new(&input);
    if let Variable::Module {
        ident,
        model_name,
        refs,
        deps,
    } = &var
    {
        assert_eq!("hares", ident);
        assert_eq!("hares", model_name);
        assert_eq!(".area", refs["area"].ptr);
        assert_eq!("lynxes.lynxes", refs["lynxes"].ptr);
        let expected: HashSet<Ident> = vec![".area".to_owned(), "lynxes.lynxes".to_owned()]
            .into_iter()
            .collect();
        assert_eq!(&expected, deps);
    } else {
        panic!("expected a module, got {:?}", var);
    }
}
