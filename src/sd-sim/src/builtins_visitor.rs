// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;

use crate::ast::{print_eqn, Expr, Loc};
use crate::builtins::is_builtin_fn;
use crate::common::{EquationError, EquationResult, Ident, HIDDEN_PREFIX};
use crate::stdlib::{MODEL_NAMES, MODEL_PREFIX};
use crate::{datamodel, eqn_err};

fn stdlib_args(name: &str) -> Option<&'static [&'static str]> {
    let args: &'static [&'static str] = match name {
        "smth1" | "smth3" | "delay1" | "delay3" | "trend" => {
            &["input", "delay_time", "initial_value"]
        }
        _ => {
            return None;
        }
    };
    Some(args)
}

fn loc_err(loc: &Loc) -> EquationResult<Expr> {
    eqn_err!(UnknownBuiltin, loc.start.pos as u16, loc.end.pos as u16)
}

struct BuiltinVisitor<'a> {
    variable_name: &'a str,
    vars: BTreeMap<Ident, datamodel::Variable>,
    n: usize,
}

impl<'a> BuiltinVisitor<'a> {
    fn new(variable_name: &'a str) -> Self {
        Self {
            variable_name,
            vars: Default::default(),
            n: 0,
        }
    }

    fn walk(&mut self, expr: Expr) -> EquationResult<Expr> {
        use crate::ast::Expr::*;
        use std::mem;
        let result: Expr = match expr {
            Const(_, _, _) => expr,
            Var(_, _) => expr,
            Paren(mut e, loc) => {
                *e = self.walk(mem::take(&mut *e))?;
                Paren(e, loc)
            }
            App(func, args, loc) => {
                let args: EquationResult<Vec<Expr>> =
                    args.into_iter().map(|e| self.walk(e)).collect();
                let args = args?;
                if is_builtin_fn(&func) {
                    return Ok(App(func, args, loc));
                }

                if !MODEL_NAMES.contains(&func.as_str()) {
                    return loc_err(&loc);
                }
                let stdlib_model_inputs = match stdlib_args(&func) {
                    Some(inputs) => inputs,
                    None => return loc_err(&loc),
                };
                if args.len() > stdlib_model_inputs.len() {
                    return eqn_err!(
                        BadBuiltinArgs,
                        loc.start.pos as u16,
                        loc.end.pos as u16
                    );
                }

                let module_name = format!(
                    "{}{}·{}·{}",
                    HIDDEN_PREFIX, self.variable_name, self.n, func
                );

                let ident_args: Vec<Ident> = args
                    .into_iter()
                    .enumerate()
                    .map(|(i, arg)| {
                        if let Expr::Var(id, _) = arg {
                            id
                        } else {
                            let id = format!(
                                "{}{}·{}·arg{}",
                                HIDDEN_PREFIX, self.variable_name, self.n, i
                            );
                            let x_var = datamodel::Variable::Aux(datamodel::Aux {
                                ident: id.clone(),
                                equation: print_eqn(&arg),
                                documentation: "".to_string(),
                                units: None,
                                gf: None,
                            });
                            self.vars.insert(id.clone(), x_var);
                            id
                        }
                    })
                    .collect();

                let references: Vec<_> = ident_args
                    .into_iter()
                    .enumerate()
                    .map(|(i, src)| datamodel::ModuleReference {
                        src,
                        dst: format!("{}.{}", module_name, stdlib_model_inputs[i]),
                    })
                    .collect();
                let x_module = datamodel::Variable::Module(datamodel::Module {
                    ident: module_name.clone(),
                    model_name: Some(format!("{}{}", MODEL_PREFIX, func)),
                    documentation: "".to_string(),
                    units: None,
                    references,
                });
                let module_output_name = format!("{}.output", module_name);
                self.vars.insert(module_name, x_module);

                self.n += 1;
                Var(module_output_name, loc)
            }
            Op1(op, mut r, loc) => {
                *r = self.walk(mem::take(&mut *r))?;
                Op1(op, r, loc)
            }
            Op2(op, mut l, mut r, loc) => {
                *l = self.walk(mem::take(&mut *l))?;
                *r = self.walk(mem::take(&mut *r))?;
                Op2(op, l, r, loc)
            }
            If(mut cond, mut t, mut f, loc) => {
                *cond = self.walk(mem::take(&mut *cond))?;
                *t = self.walk(mem::take(&mut *t))?;
                *f = self.walk(mem::take(&mut *f))?;
                If(cond, t, f, loc)
            }
        };

        Ok(result)
    }
}

/// instantiate_implicit_modules rewrites calls to stdlib functions
/// in `variable_name`'s equation into references to the output of a
/// new module instance.  It returns the rewritten expression along
/// with the module and argument variables that need to be added to
/// the model.
pub fn instantiate_implicit_modules(
    variable_name: &str,
    ast: Expr,
) -> std::result::Result<(Expr, Vec<datamodel::Variable>), EquationError> {
    let mut builtin_visitor = BuiltinVisitor::new(variable_name);
    let ast = builtin_visitor.walk(ast)?;
    let vars: Vec<_> = builtin_visitor.vars.into_iter().map(|(_, v)| v).collect();
    Ok((ast, vars))
}

#[cfg(test)]
fn parse(eqn: &str) -> Expr {
    crate::parser::parse_equation(eqn).unwrap().unwrap()
}

#[test]
fn test_builtin_visitor() {
    // plain builtins are untouched
    let (ast, vars) = instantiate_implicit_modules("x", parse("max(a, 1) + 2")).unwrap();
    assert_eq!("(max(a, 1) + 2)", print_eqn(&ast));
    assert!(vars.is_empty());

    let (ast, vars) = instantiate_implicit_modules("x", parse("smth1(a, b * 2) + 1")).unwrap();
    assert_eq!("($·x·0·smth1.output + 1)", print_eqn(&ast));
    assert_eq!(2, vars.len());

    let mut found_module = false;
    for var in vars.iter() {
        match var {
            datamodel::Variable::Aux(aux) => {
                assert_eq!("$·x·0·arg1", aux.ident);
                assert_eq!("(b * 2)", aux.equation);
            }
            datamodel::Variable::Module(module) => {
                found_module = true;
                assert_eq!("$·x·0·smth1", module.ident);
                assert_eq!(Some("stdlib·smth1".to_owned()), module.model_name);
                let refs: Vec<(&str, &str)> = module
                    .references
                    .iter()
                    .map(|r| (r.src.as_str(), r.dst.as_str()))
                    .collect();
                assert_eq!(
                    vec![
                        ("a", "$·x·0·smth1.input"),
                        ("$·x·0·arg1", "$·x·0·smth1.delay_time")
                    ],
                    refs
                );
            }
            v => panic!("unexpected variable {:?}", v),
        }
    }
    assert!(found_module);
}

#[test]
fn test_nested_calls() {
    let (ast, vars) =
        instantiate_implicit_modules("y", parse("delay1(smth1(a, 2), 3)")).unwrap();
    // the inner call is rewritten first
    assert_eq!("$·y·1·delay1.output", print_eqn(&ast));
    assert!(vars
        .iter()
        .any(|v| v.get_ident() == "$·y·0·smth1"));
    assert!(vars
        .iter()
        .any(|v| v.get_ident() == "$·y·1·delay1"));

    // argument equations that mention a hidden module still parse
    let (_, vars) = instantiate_implicit_modules("z", parse("delay1(smth1(a, 2) * 2, 3)")).unwrap();
    let arg0 = vars
        .iter()
        .find_map(|v| match v {
            datamodel::Variable::Aux(aux) if aux.ident == "$·z·1·arg0" => Some(aux),
            _ => None,
        })
        .unwrap();
    assert_eq!("($·z·0·smth1.output * 2)", arg0.equation);
    assert!(crate::parser::parse_equation(&arg0.equation).is_ok());
}

#[test]
fn test_unknown_builtin() {
    let err = instantiate_implicit_modules("x", parse("nope(a)")).unwrap_err();
    assert_eq!(crate::common::ErrorCode::UnknownBuiltin, err.code);
}
