// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::ast;
use crate::builtins::is_time_ident;
use crate::common::{Ident, Result};
use crate::datamodel;
use crate::interpreter::{BinaryOp, UnaryOp};
use crate::model::{get_deps, Context as DepContext, Model};
use crate::project::Project;
use crate::sim_err;
use crate::variable::{Table, Variable};

pub const TIME_OFF: usize = 0;
// slots at the start of every row that don't belong to a model
pub const IMPLICIT_VAR_COUNT: usize = 1;

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum Method {
    Euler,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Specs {
    pub start: f64,
    pub stop: f64,
    pub dt: f64,
    pub save_step: f64,
    pub method: Method,
}

impl Specs {
    pub fn from_datamodel(specs: &datamodel::SimSpecs) -> Result<Self> {
        let dt = specs.dt.value();
        let save_step = match &specs.save_step {
            None => dt,
            Some(save_step) => save_step.value(),
        };

        let method = match specs.sim_method.trim().to_lowercase().as_str() {
            "" | "euler" => Method::Euler,
            "rk4" | "rk2" | "rk45" | "gear" => {
                log::warn!(
                    "simulation requested '{}', but only Euler is supported",
                    specs.sim_method
                );
                Method::Euler
            }
            _ => {
                return sim_err!(UnknownIntegrationMethod, specs.sim_method.clone());
            }
        };

        if !specs.start.is_finite() || !specs.stop.is_finite() {
            return sim_err!(
                BadTime,
                format!("start {} and stop {}", specs.start, specs.stop)
            );
        }
        // a non-positive step would never reach the stop time
        if !dt.is_finite() || dt <= 0.0 {
            return sim_err!(BadSimSpecs, format!("dt must be positive, not {}", dt));
        }
        if !save_step.is_finite() || save_step <= 0.0 {
            return sim_err!(
                BadSimSpecs,
                format!("save_step must be positive, not {}", save_step)
            );
        }

        Ok(Specs {
            start: specs.start,
            stop: specs.stop,
            dt,
            save_step,
            method,
        })
    }
}

type BuiltinFn = crate::builtins::BuiltinFn<Expr>;

#[derive(PartialEq, Clone, Debug)]
pub enum Expr {
    Const(f64),
    Var(usize),       // offset relative to the module instance
    GlobalVar(usize), // offset into the whole row
    Dt,
    App(BuiltinFn),
    EvalModule(Ident),
    // read through an incoming module reference when one is
    // connected, otherwise evaluate the fallback
    Override(Ident, Box<Expr>),
    Op2(BinaryOp, Box<Expr>, Box<Expr>),
    Op1(UnaryOp, Box<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    AssignCurr(usize, Box<Expr>),
    AssignNext(usize, Box<Expr>),
}

/// Layout is where each of a model's variables lives within the
/// block of a row belonging to one instance of that model.
#[derive(Clone, PartialEq, Debug)]
pub struct Layout {
    pub offsets: HashMap<Ident, usize>,
    // module ident -> (model name, start of the module's block)
    pub children: BTreeMap<Ident, (Ident, usize)>,
    // slots used by an instance, including nested modules
    pub size: usize,
}

impl Layout {
    /// offset resolves a possibly dotted identifier to a slot
    /// relative to the start of this model's block.
    pub fn offset(&self, layouts: &HashMap<Ident, Layout>, ident: &str) -> Option<usize> {
        if let Some(off) = self.offsets.get(ident) {
            return Some(*off);
        }
        let pos = ident.find('.')?;
        let (model_name, start) = self.children.get(&ident[..pos])?;
        let child = layouts.get(model_name)?;
        Some(start + child.offset(layouts, &ident[pos + 1..])?)
    }
}

fn build_layout(
    models: &HashMap<Ident, Model>,
    model_name: &str,
    layouts: &mut HashMap<Ident, Layout>,
    stack: &mut Vec<Ident>,
) -> Result<usize> {
    if let Some(layout) = layouts.get(model_name) {
        return Ok(layout.size);
    }
    if stack.iter().any(|name| name == model_name) {
        return sim_err!(
            NotSimulatable,
            format!("model '{}' instantiates itself", model_name)
        );
    }
    let model = match models.get(model_name) {
        Some(model) => model,
        None => return sim_err!(BadModelName, model_name.to_owned()),
    };
    stack.push(model_name.to_owned());

    let mut idents: Vec<&Ident> = model.vars.keys().collect();
    idents.sort_unstable();

    let offsets: HashMap<Ident, usize> = idents
        .iter()
        .filter(|id| !model.vars[id.as_str()].is_module())
        .enumerate()
        .map(|(i, id)| ((*id).clone(), i))
        .collect();

    let mut size = offsets.len();
    let mut children = BTreeMap::new();
    for id in idents {
        if let Variable::Module { model_name, .. } = &model.vars[id] {
            let child_size = build_layout(models, model_name, layouts, stack)?;
            children.insert(id.clone(), (model_name.clone(), size));
            size += child_size;
        }
    }

    stack.pop();
    layouts.insert(
        model_name.to_owned(),
        Layout {
            offsets,
            children,
            size,
        },
    );

    Ok(size)
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum RunlistPart {
    Initials,
    Flows,
    Stocks,
}

struct Context<'a> {
    model: &'a Model,
    models: &'a HashMap<Ident, Model>,
    layout: &'a Layout,
    layouts: &'a HashMap<Ident, Layout>,
    root: &'a str,
    specs: &'a Specs,
    // the variable being lowered, for error details
    ident: &'a str,
    overrides: &'a BTreeSet<Ident>,
}

impl<'a> Context<'a> {
    fn details(&self, what: &str) -> String {
        format!("{}.{}: {}", self.model.ident, self.ident, what)
    }

    fn get_offset(&self, ident: &str) -> Result<usize> {
        match self.layout.offset(self.layouts, ident) {
            Some(off) => Ok(off),
            None => sim_err!(UnknownDependency, self.details(ident)),
        }
    }

    fn lower_var(&self, id: &str) -> Result<Expr> {
        if is_time_ident(id) {
            let expr = match id {
                "time" => Expr::GlobalVar(TIME_OFF),
                "dt" => Expr::Dt,
                "initial_time" => Expr::Const(self.specs.start),
                _ => Expr::Const(self.specs.stop),
            };
            return Ok(expr);
        }

        if let Some(rest) = id.strip_prefix('.') {
            let off = self
                .layouts
                .get(self.root)
                .and_then(|root| root.offset(self.layouts, rest));
            return match off {
                Some(off) => Ok(Expr::GlobalVar(IMPLICIT_VAR_COUNT + off)),
                None => sim_err!(UnknownDependency, self.details(id)),
            };
        }

        if let Some(off) = self.layout.offset(self.layouts, id) {
            return Ok(Expr::Var(off));
        }

        // an input with no variable of its own only has a value
        // when a module reference connects it
        if self.overrides.contains(id) {
            return Ok(Expr::Override(
                id.to_owned(),
                Box::new(Expr::Const(f64::NAN)),
            ));
        }

        sim_err!(UnknownDependency, self.details(id))
    }

    fn lower(&self, expr: &ast::Expr) -> Result<Expr> {
        let expr = match expr {
            ast::Expr::Const(_, n, _) => Expr::Const(*n),
            ast::Expr::Var(id, _) => self.lower_var(id)?,
            ast::Expr::Paren(e, _) => self.lower(e)?,
            ast::Expr::App(id, orig_args, _) => {
                let args: Result<Vec<Expr>> = orig_args.iter().map(|e| self.lower(e)).collect();
                let mut args = args?;

                macro_rules! check_arity {
                    ($builtin_fn:tt, 0) => {{
                        if !args.is_empty() {
                            return sim_err!(BadBuiltinArgs, self.details(id));
                        }

                        BuiltinFn::$builtin_fn
                    }};
                    ($builtin_fn:tt, 1) => {{
                        if args.len() != 1 {
                            return sim_err!(BadBuiltinArgs, self.details(id));
                        }

                        let a = args.remove(0);
                        BuiltinFn::$builtin_fn(Box::new(a))
                    }};
                    ($builtin_fn:tt, 2) => {{
                        if args.len() != 2 {
                            return sim_err!(BadBuiltinArgs, self.details(id));
                        }

                        let b = args.remove(1);
                        let a = args.remove(0);
                        BuiltinFn::$builtin_fn(Box::new(a), Box::new(b))
                    }};
                    ($builtin_fn:tt, 2, 3) => {{
                        if args.len() == 2 {
                            let b = args.remove(1);
                            let a = args.remove(0);
                            BuiltinFn::$builtin_fn(Box::new(a), Box::new(b), None)
                        } else if args.len() == 3 {
                            let c = args.remove(2);
                            let b = args.remove(1);
                            let a = args.remove(0);
                            BuiltinFn::$builtin_fn(Box::new(a), Box::new(b), Some(Box::new(c)))
                        } else {
                            return sim_err!(BadBuiltinArgs, self.details(id));
                        }
                    }};
                }

                let builtin = match id.as_str() {
                    "lookup" => {
                        if args.len() != 2 {
                            return sim_err!(BadBuiltinArgs, self.details(id));
                        }
                        let table_ident = match &orig_args[0] {
                            ast::Expr::Var(ident, _) => ident,
                            _ => return sim_err!(BadTable, self.details(id)),
                        };
                        let is_table = self
                            .model
                            .vars
                            .get(table_ident)
                            .map(|v| v.table().is_some())
                            .unwrap_or(false);
                        if !is_table {
                            return sim_err!(BadTable, self.details(table_ident));
                        }
                        BuiltinFn::Lookup(table_ident.clone(), Box::new(args.remove(1)))
                    }
                    "abs" => check_arity!(Abs, 1),
                    "arccos" => check_arity!(Arccos, 1),
                    "arcsin" => check_arity!(Arcsin, 1),
                    "arctan" => check_arity!(Arctan, 1),
                    "cos" => check_arity!(Cos, 1),
                    "exp" => check_arity!(Exp, 1),
                    "inf" => check_arity!(Inf, 0),
                    "int" => check_arity!(Int, 1),
                    "ln" => check_arity!(Ln, 1),
                    "log10" => check_arity!(Log10, 1),
                    "max" => check_arity!(Max, 2),
                    "mean" => {
                        if args.is_empty() {
                            return sim_err!(BadBuiltinArgs, self.details(id));
                        }
                        BuiltinFn::Mean(args)
                    }
                    "min" => check_arity!(Min, 2),
                    "pi" => check_arity!(Pi, 0),
                    "pulse" => check_arity!(Pulse, 2, 3),
                    "ramp" => check_arity!(Ramp, 2, 3),
                    "safediv" => check_arity!(SafeDiv, 2, 3),
                    "sin" => check_arity!(Sin, 1),
                    "sqrt" => check_arity!(Sqrt, 1),
                    "step" => check_arity!(Step, 2),
                    "tan" => check_arity!(Tan, 1),
                    _ => {
                        return sim_err!(UnknownBuiltin, self.details(id));
                    }
                };
                Expr::App(builtin)
            }
            ast::Expr::Op1(op, l, _) => {
                let l = self.lower(l)?;
                match op {
                    ast::UnaryOp::Negative => {
                        Expr::Op2(BinaryOp::Sub, Box::new(Expr::Const(0.0)), Box::new(l))
                    }
                    ast::UnaryOp::Positive => l,
                    ast::UnaryOp::Not => Expr::Op1(UnaryOp::Not, Box::new(l)),
                }
            }
            ast::Expr::Op2(op, l, r, _) => {
                let l = self.lower(l)?;
                let r = self.lower(r)?;
                let op = match op {
                    ast::BinaryOp::Add => BinaryOp::Add,
                    ast::BinaryOp::Sub => BinaryOp::Sub,
                    ast::BinaryOp::Exp => BinaryOp::Exp,
                    ast::BinaryOp::Mul => BinaryOp::Mul,
                    ast::BinaryOp::Div => BinaryOp::Div,
                    ast::BinaryOp::Mod => BinaryOp::Mod,
                    ast::BinaryOp::Gt => BinaryOp::Gt,
                    ast::BinaryOp::Gte => BinaryOp::Gte,
                    ast::BinaryOp::Lt => BinaryOp::Lt,
                    ast::BinaryOp::Lte => BinaryOp::Lte,
                    ast::BinaryOp::Eq => BinaryOp::Eq,
                    ast::BinaryOp::Neq => BinaryOp::Neq,
                    ast::BinaryOp::And => BinaryOp::And,
                    ast::BinaryOp::Or => BinaryOp::Or,
                    ast::BinaryOp::Bang => {
                        return sim_err!(NotSimulatable, self.details("'!' between operands"));
                    }
                };
                Expr::Op2(op, Box::new(l), Box::new(r))
            }
            ast::Expr::If(cond, t, f, _) => {
                let cond = self.lower(cond)?;
                let t = self.lower(t)?;
                let f = self.lower(f)?;
                Expr::If(Box::new(cond), Box::new(t), Box::new(f))
            }
        };

        Ok(expr)
    }

    fn fold_flows(&self, flows: &[Ident]) -> Result<Option<Expr>> {
        let mut loads: Vec<Expr> = Vec::with_capacity(flows.len());
        for flow in flows.iter() {
            loads.push(Expr::Var(self.get_offset(flow)?));
        }

        let mut loads = loads.into_iter();
        let first = match loads.next() {
            Some(first) => first,
            None => return Ok(None),
        };
        Ok(Some(loads.fold(first, |acc, flow| {
            Expr::Op2(BinaryOp::Add, Box::new(acc), Box::new(flow))
        })))
    }

    fn build_stock_update_expr(
        &self,
        stock_off: usize,
        inflows: &[Ident],
        outflows: &[Ident],
    ) -> Result<Expr> {
        let inflows = self.fold_flows(inflows)?.unwrap_or(Expr::Const(0.0));
        let outflows = self.fold_flows(outflows)?.unwrap_or(Expr::Const(0.0));

        let dt_update = Expr::Op2(
            BinaryOp::Mul,
            Box::new(Expr::Op2(
                BinaryOp::Sub,
                Box::new(inflows),
                Box::new(outflows),
            )),
            Box::new(Expr::Dt),
        );

        Ok(Expr::Op2(
            BinaryOp::Add,
            Box::new(Expr::Var(stock_off)),
            Box::new(dt_update),
        ))
    }

    /// build_equation lowers a variable's equation to the value it
    /// assigns in the initials or flows phase.
    fn build_equation(&self, var: &Variable) -> Result<Expr> {
        let ast = match var.ast() {
            Some(ast) => ast,
            None => {
                return sim_err!(NotSimulatable, var.errors().join(", "));
            }
        };
        let expr = self.lower(ast)?;
        if var.table().is_some() {
            return Ok(Expr::App(BuiltinFn::Lookup(
                var.ident().to_owned(),
                Box::new(expr),
            )));
        }
        Ok(expr)
    }

    fn for_var(&self, ident: &'a str) -> Context<'a> {
        Context {
            model: self.model,
            models: self.models,
            layout: self.layout,
            layouts: self.layouts,
            root: self.root,
            specs: self.specs,
            ident,
            overrides: self.overrides,
        }
    }

    fn build_runlist(&self, vars: &[&'a Variable], part: RunlistPart) -> Vec<Expr> {
        let mut runlist = Vec::with_capacity(vars.len());
        let mut evaluated: HashSet<&str> = HashSet::new();
        for var in vars.iter().copied() {
            if part != RunlistPart::Stocks {
                for module_ident in self.early_reads(var, part, &evaluated) {
                    let expr = Expr::EvalModule(module_ident.to_owned());
                    if runlist.last() != Some(&expr) {
                        runlist.push(expr);
                    }
                }
            }
            let expr = match var {
                Variable::Module { ident, .. } => {
                    evaluated.insert(ident.as_str());
                    Some(Expr::EvalModule(ident.clone()))
                }
                _ if part == RunlistPart::Stocks => self.for_var(var.ident()).build_next(var),
                _ => self.for_var(var.ident()).build_assign(var),
            };
            runlist.extend(expr);
        }
        runlist
    }

    /// early_reads are the module instances `var` reads an output of
    /// before the instance itself has been evaluated in this part of
    /// the step.  Outputs are ordered by the module inputs they read
    /// rather than by the instance, so the instance gets evaluated an
    /// extra time right in front of such a reader.
    fn early_reads(
        &self,
        var: &Variable,
        part: RunlistPart,
        evaluated: &HashSet<&str>,
    ) -> BTreeSet<&'a str> {
        let model = self.model;
        let mut modules = BTreeSet::new();
        for dep in var.deps().iter() {
            let pos = match dep.find('.') {
                Some(pos) if pos > 0 => pos,
                _ => continue,
            };
            let module_ident = match model.vars.get_key_value(&dep[..pos]) {
                Some((ident, Variable::Module { .. })) => ident.as_str(),
                _ => continue,
            };
            if evaluated.contains(module_ident) {
                continue;
            }
            // stocks already hold this step's value in the flows part
            let is_stock = model
                .lookup(self.models, self.root, dep)
                .map(|v| v.is_stock())
                .unwrap_or(false);
            if part == RunlistPart::Flows && is_stock {
                continue;
            }
            modules.insert(module_ident);
        }
        modules
    }

    fn build_assign(&self, var: &Variable) -> Option<Expr> {
        let id = var.ident();
        let off = self.layout.offsets.get(id).copied()?;
        let overridden = self.overrides.contains(id);
        let rhs = match self.build_equation(var) {
            Ok(rhs) => rhs,
            Err(err) => {
                log::warn!("{}.{}: {}", self.model.ident, id, err);
                if !overridden {
                    return None;
                }
                Expr::Const(0.0)
            }
        };
        let rhs = if overridden {
            Expr::Override(id.to_owned(), Box::new(rhs))
        } else {
            rhs
        };
        Some(Expr::AssignCurr(off, Box::new(rhs)))
    }

    fn build_next(&self, var: &Variable) -> Option<Expr> {
        let off = self.layout.offsets.get(var.ident()).copied()?;
        let rhs = match var {
            Variable::Stock {
                inflows, outflows, ..
            } => match self.build_stock_update_expr(off, inflows, outflows) {
                Ok(rhs) => rhs,
                Err(err) => {
                    log::warn!("{}.{}: {}", self.model.ident, self.ident, err);
                    // hold the stock at its current value
                    Expr::Var(off)
                }
            },
            _ => Expr::Var(off),
        };
        Some(Expr::AssignNext(off, Box::new(rhs)))
    }
}

/// sort orders `vars` so every variable comes after the ones it
/// depends on.  The partition predicate is only a partial order, but
/// as dependency sets are transitively closed (and acyclic), each
/// partition keeps dependencies to the left of their dependents.
fn sort<'a>(ctx: &DepContext, vars: &mut [&'a Variable]) {
    let less = |a: &Variable, b: &Variable| -> bool {
        get_deps(ctx, b)
            .map(|deps| deps.contains(a.ident()))
            .unwrap_or(false)
    };

    fn quicksort<'a, F: Fn(&Variable, &Variable) -> bool>(vars: &mut [&'a Variable], less: &F) {
        if vars.len() < 2 {
            return;
        }
        let r = vars.len() - 1;
        let pivot = r / 2;
        vars.swap(pivot, r);
        let mut store = 0;
        for i in 0..r {
            if less(vars[i], vars[r]) {
                vars.swap(i, store);
                store += 1;
            }
        }
        vars.swap(store, r);
        let (left, right) = vars.split_at_mut(store);
        quicksort(left, less);
        quicksort(&mut right[1..], less);
    }

    quicksort(vars, &less);
}

/// Module is a model compiled to the run lists executed for every
/// instance of it.
#[derive(Clone, PartialEq, Debug)]
pub struct Module {
    pub ident: Ident,
    pub tables: HashMap<Ident, Table>,
    pub runlist_initials: Vec<Expr>,
    pub runlist_flows: Vec<Expr>,
    pub runlist_stocks: Vec<Expr>,
}

impl Module {
    fn new(
        model: &Model,
        models: &HashMap<Ident, Model>,
        layouts: &HashMap<Ident, Layout>,
        root: &str,
        specs: &Specs,
        overrides: &BTreeSet<Ident>,
    ) -> Result<Self> {
        let layout = match layouts.get(&model.ident) {
            Some(layout) => layout,
            None => return sim_err!(BadModelName, model.ident.clone()),
        };

        let mut idents: Vec<&Ident> = model.vars.keys().collect();
        idents.sort_unstable();

        let initial_ctx = DepContext::new(model, true);
        let flow_ctx = DepContext::new(model, false);
        let is_root = model.ident == root;

        let mut initials: Vec<&Variable> = vec![];
        let mut flows: Vec<&Variable> = vec![];
        let mut stocks: Vec<&Variable> = vec![];
        for id in idents {
            let var = &model.vars[id];
            let needs_initial_deps = var.is_module() || var.is_stock();
            if needs_initial_deps {
                // whatever the initial value reads has to be computed
                // in the initials phase too
                if let Some(deps) = get_deps(&initial_ctx, var) {
                    initials.extend(deps.iter().filter_map(|dep| model.vars.get(dep)));
                }
            }

            // a parent can read any output of a module while initializing
            if !is_root {
                initials.push(var);
            }

            if var.is_module() {
                initials.push(var);
                flows.push(var);
                stocks.push(var);
            } else if var.is_stock() {
                initials.push(var);
                stocks.push(var);
            } else if var.table().is_some() {
                flows.push(var);
            } else if var.is_const() {
                initials.push(var);
                stocks.push(var);
                // a connected input changes whenever its source does
                if overrides.contains(id) {
                    flows.push(var);
                }
            } else {
                flows.push(var);
            }
        }

        let mut seen: HashSet<Ident> = HashSet::new();
        initials.retain(|v| seen.insert(v.ident().to_owned()));

        sort(&initial_ctx, &mut initials);
        sort(&flow_ctx, &mut flows);

        let ctx = Context {
            model,
            models,
            layout,
            layouts,
            root,
            specs,
            ident: "",
            overrides,
        };
        let runlist_initials = ctx.build_runlist(&initials, RunlistPart::Initials);
        let runlist_flows = ctx.build_runlist(&flows, RunlistPart::Flows);
        let runlist_stocks = ctx.build_runlist(&stocks, RunlistPart::Stocks);

        let tables = model
            .tables()
            .filter_map(|var| Some((var.ident().to_owned(), var.table()?.clone())))
            .collect();

        Ok(Module {
            ident: model.ident.clone(),
            tables,
            runlist_initials,
            runlist_flows,
            runlist_stocks,
        })
    }
}

/// Compiled is every model reachable from the project's root,
/// lowered to run lists.
#[derive(Clone, PartialEq, Debug)]
pub struct Compiled {
    pub root: Ident,
    pub specs: Specs,
    pub layouts: HashMap<Ident, Layout>,
    pub modules: HashMap<Ident, Module>,
}

impl Compiled {
    /// n_vars is the width of a row of the simulation's data.
    pub fn n_vars(&self) -> usize {
        IMPLICIT_VAR_COUNT
            + self
                .layouts
                .get(&self.root)
                .map(|layout| layout.size)
                .unwrap_or(0)
    }
}

/// compile assigns offsets and builds the run lists for every model
/// instantiated, directly or through modules, by the root model.
pub fn compile(project: &Project) -> Result<Compiled> {
    let specs = Specs::from_datamodel(&project.sim_specs)?;
    let root = project.root_model_name().to_owned();

    let mut layouts: HashMap<Ident, Layout> = HashMap::new();
    build_layout(&project.models, &root, &mut layouts, &mut vec![])?;

    // the inputs of each model that some module instance connects
    let mut overrides: HashMap<Ident, BTreeSet<Ident>> = HashMap::new();
    for model in project.models.values() {
        for module in model.modules() {
            if let Variable::Module {
                model_name, refs, ..
            } = module
            {
                overrides
                    .entry(model_name.clone())
                    .or_default()
                    .extend(refs.keys().cloned());
            }
        }
    }

    let no_overrides = BTreeSet::new();
    let mut modules: HashMap<Ident, Module> = HashMap::new();
    for model_name in layouts.keys() {
        let model = match project.models.get(model_name) {
            Some(model) => model,
            None => return sim_err!(BadModelName, model_name.clone()),
        };
        let model_overrides = overrides.get(model_name).unwrap_or(&no_overrides);
        let module = Module::new(
            model,
            &project.models,
            &layouts,
            &root,
            &specs,
            model_overrides,
        )?;
        modules.insert(model_name.clone(), module);
    }

    Ok(Compiled {
        root,
        specs,
        layouts,
        modules,
    })
}

#[allow(dead_code)]
pub fn pretty(expr: &Expr) -> String {
    match expr {
        Expr::Const(n) => format!("{}", n),
        Expr::Var(off) => format!("curr[{}]", off),
        Expr::GlobalVar(off) => format!("global[{}]", off),
        Expr::Dt => "dt".to_string(),
        Expr::App(builtin) => match builtin {
            BuiltinFn::Lookup(table, idx) => format!("lookup({}, {})", table, pretty(idx)),
            BuiltinFn::Abs(l) => format!("abs({})", pretty(l)),
            BuiltinFn::Arccos(l) => format!("arccos({})", pretty(l)),
            BuiltinFn::Arcsin(l) => format!("arcsin({})", pretty(l)),
            BuiltinFn::Arctan(l) => format!("arctan({})", pretty(l)),
            BuiltinFn::Cos(l) => format!("cos({})", pretty(l)),
            BuiltinFn::Exp(l) => format!("exp({})", pretty(l)),
            BuiltinFn::Inf => "inf".to_string(),
            BuiltinFn::Int(l) => format!("int({})", pretty(l)),
            BuiltinFn::Ln(l) => format!("ln({})", pretty(l)),
            BuiltinFn::Log10(l) => format!("log10({})", pretty(l)),
            BuiltinFn::Max(l, r) => format!("max({}, {})", pretty(l), pretty(r)),
            BuiltinFn::Mean(args) => {
                let args: Vec<_> = args.iter().map(pretty).collect();
                format!("mean({})", args.join(", "))
            }
            BuiltinFn::Min(l, r) => format!("min({}, {})", pretty(l), pretty(r)),
            BuiltinFn::Pi => "pi".to_string(),
            BuiltinFn::Pulse(a, b, c) => format!(
                "pulse({}, {}, {})",
                pretty(a),
                pretty(b),
                c.as_ref()
                    .map(|expr| pretty(expr))
                    .unwrap_or_else(|| "<None>".to_string())
            ),
            BuiltinFn::Ramp(a, b, c) => format!(
                "ramp({}, {}, {})",
                pretty(a),
                pretty(b),
                c.as_ref()
                    .map(|expr| pretty(expr))
                    .unwrap_or_else(|| "<None>".to_string())
            ),
            BuiltinFn::SafeDiv(a, b, c) => format!(
                "safediv({}, {}, {})",
                pretty(a),
                pretty(b),
                c.as_ref()
                    .map(|expr| pretty(expr))
                    .unwrap_or_else(|| "<None>".to_string())
            ),
            BuiltinFn::Sin(l) => format!("sin({})", pretty(l)),
            BuiltinFn::Sqrt(l) => format!("sqrt({})", pretty(l)),
            BuiltinFn::Step(a, b) => format!("step({}, {})", pretty(a), pretty(b)),
            BuiltinFn::Tan(l) => format!("tan({})", pretty(l)),
        },
        Expr::EvalModule(module) => format!("eval<{}>", module),
        Expr::Override(ident, fallback) => format!("ref<{}>({})", ident, pretty(fallback)),
        Expr::Op2(op, l, r) => {
            let op: &str = match op {
                BinaryOp::Add => "+",
                BinaryOp::Sub => "-",
                BinaryOp::Exp => "^",
                BinaryOp::Mul => "*",
                BinaryOp::Div => "/",
                BinaryOp::Mod => "%",
                BinaryOp::Gt => ">",
                BinaryOp::Gte => ">=",
                BinaryOp::Lt => "<",
                BinaryOp::Lte => "<=",
                BinaryOp::Eq => "==",
                BinaryOp::Neq => "!=",
                BinaryOp::And => "&&",
                BinaryOp::Or => "||",
            };

            format!("({}{}{})", pretty(l), op, pretty(r))
        }
        Expr::Op1(op, l) => {
            let op: &str = match op {
                UnaryOp::Not => "!",
            };
            format!("{}{}", op, pretty(l))
        }
        Expr::If(cond, t, f) => {
            format!("if {} then {} else {}", pretty(cond), pretty(t), pretty(f))
        }
        Expr::AssignCurr(off, rhs) => format!("curr[{}] := {}", off, pretty(rhs)),
        Expr::AssignNext(off, rhs) => format!("next[{}] := {}", off, pretty(rhs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::model::testutil::*;

    fn x_project(models: Vec<datamodel::Model>) -> datamodel::Project {
        datamodel::Project {
            name: "test".to_owned(),
            sim_specs: Some(datamodel::SimSpecs::default()),
            models,
        }
    }

    fn compile_models(models: Vec<datamodel::Model>) -> Compiled {
        let project = Project::new(&x_project(models)).unwrap();
        compile(&project).unwrap()
    }

    fn position(runlist: &[Expr], off: usize) -> usize {
        runlist
            .iter()
            .position(|expr| match expr {
                Expr::AssignCurr(o, _) | Expr::AssignNext(o, _) => *o == off,
                _ => false,
            })
            .unwrap()
    }

    #[test]
    fn test_specs() {
        let specs = Specs::from_datamodel(&datamodel::SimSpecs {
            start: 1.0,
            stop: 2.0,
            dt: datamodel::Dt::Reciprocal(4.0),
            save_step: None,
            sim_method: "RK4".to_owned(),
            time_units: None,
        })
        .unwrap();
        assert_eq!(0.25, specs.dt);
        assert_eq!(0.25, specs.save_step);
        assert_eq!(Method::Euler, specs.method);

        let err = Specs::from_datamodel(&datamodel::SimSpecs {
            dt: datamodel::Dt::Dt(0.0),
            ..datamodel::SimSpecs::default()
        })
        .unwrap_err();
        assert_eq!(ErrorCode::BadSimSpecs, err.code);
    }

    #[test]
    fn test_lower() {
        let compiled = compile_models(vec![x_model(
            "main",
            vec![
                x_aux("false_input", "0"),
                x_aux("true_input", "1"),
                x_aux("result", "IF true_input AND false_input THEN 1 ELSE -dt"),
            ],
        )]);
        let main = &compiled.modules["main"];
        let offsets = &compiled.layouts["main"].offsets;
        // offsets are assigned in sorted order
        assert_eq!(0, offsets["false_input"]);
        assert_eq!(1, offsets["result"]);
        assert_eq!(2, offsets["true_input"]);

        let expected = Expr::AssignCurr(
            1,
            Box::new(Expr::If(
                Box::new(Expr::Op2(
                    BinaryOp::And,
                    Box::new(Expr::Var(2)),
                    Box::new(Expr::Var(0)),
                )),
                Box::new(Expr::Const(1.0)),
                Box::new(Expr::Op2(
                    BinaryOp::Sub,
                    Box::new(Expr::Const(0.0)),
                    Box::new(Expr::Dt),
                )),
            )),
        );
        assert_eq!(vec![expected], main.runlist_flows);
        assert_eq!(2, main.runlist_initials.len());
        assert_eq!(
            "next[0] := curr[0]",
            pretty(&main.runlist_stocks[0])
        );
    }

    #[test]
    fn test_runlist_order() {
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        let mut variables = vec![
            x_aux("aux_used_in_initial", "7 * 1"),
            x_aux("aux_2", "aux_used_in_initial"),
            x_aux("aux_3", "aux_2"),
            x_aux("aux_4", "aux_2 + aux_3"),
            x_flow("inflow", "aux_3 + aux_4"),
            x_flow("outflow", "stock_1"),
            x_stock("stock_1", "aux_used_in_initial", &["inflow"], &["outflow"]),
        ];

        let mut rng = thread_rng();
        for _ in 0..16 {
            variables.shuffle(&mut rng);
            let compiled = compile_models(vec![x_model("main", variables.clone())]);
            let main = &compiled.modules["main"];
            let off = |id: &str| compiled.layouts["main"].offsets[id];

            let flows = &main.runlist_flows;
            assert_eq!(6, flows.len());
            let order = [
                "aux_used_in_initial",
                "aux_2",
                "aux_3",
                "aux_4",
                "inflow",
            ];
            for pair in order.windows(2) {
                assert!(position(flows, off(pair[0])) < position(flows, off(pair[1])));
            }

            // the stock's initial value pulls in what it depends on
            let initials = &main.runlist_initials;
            assert_eq!(2, initials.len());
            assert!(
                position(initials, off("aux_used_in_initial")) < position(initials, off("stock_1"))
            );
        }
    }

    #[test]
    fn test_stock_update() {
        let compiled = compile_models(vec![x_model(
            "main",
            vec![
                x_stock("s", "9", &["a", "b"], &["c"]),
                x_flow("a", "1"),
                x_flow("b", "2"),
                x_flow("c", "3"),
                x_stock("empty", "1", &[], &[]),
            ],
        )]);
        let main = &compiled.modules["main"];
        let stocks: Vec<String> = main.runlist_stocks.iter().map(pretty).collect();
        assert!(stocks.contains(&"next[4] := (curr[4]+(((curr[0]+curr[1])-curr[2])*dt))".to_owned()));
        assert!(stocks.contains(&"next[3] := (curr[3]+((0-0)*dt))".to_owned()));
    }

    #[test]
    fn test_module_layout() {
        let compiled = compile_models(vec![
            x_model(
                "hares",
                vec![
                    x_aux("area", "1"),
                    x_stock("hares", "100", &[], &["deaths"]),
                    x_flow("deaths", "hares * area * 0.01"),
                ],
            ),
            x_model(
                "main",
                vec![
                    x_aux("area", "time"),
                    x_module("a_hares", "hares", &[("area", "a_hares.area")]),
                    x_module("b_hares", "hares", &[]),
                    x_flow("seen", "b_hares.deaths + .area"),
                ],
            ),
        ]);
        assert_eq!(1 + 2 + 3 + 3, compiled.n_vars());

        let main = &compiled.modules["main"];
        let layouts = &compiled.layouts;
        let layout = &layouts["main"];
        assert_eq!(("hares".to_owned(), 2), layout.children["a_hares"]);
        assert_eq!(("hares".to_owned(), 5), layout.children["b_hares"]);
        // area, deaths, hares inside b_hares
        assert_eq!(Some(6), layout.offset(layouts, "b_hares.deaths"));
        assert_eq!(None, layout.offset(layouts, "b_hares.nope"));

        assert_eq!(
            "curr[1] := (curr[6]+global[1])",
            pretty(&main.runlist_flows[position(&main.runlist_flows, 1)])
        );

        // connected inputs read through the reference
        let hares = &compiled.modules["hares"];
        let flows: Vec<String> = hares.runlist_flows.iter().map(pretty).collect();
        assert!(flows.contains(&"curr[0] := ref<area>(1)".to_owned()));
        // a parent may read any of a module's values while initializing
        assert_eq!(3, hares.runlist_initials.len());

        // modules run in every phase
        assert!(main.runlist_initials.contains(&Expr::EvalModule("a_hares".to_owned())));
        assert!(main.runlist_flows.contains(&Expr::EvalModule("b_hares".to_owned())));
        assert!(main.runlist_stocks.contains(&Expr::EvalModule("b_hares".to_owned())));
    }

    #[test]
    fn test_early_module_reads() {
        let compiled = compile_models(vec![x_model(
            "main",
            vec![
                x_aux("gap", "10 - delivered"),
                x_aux("delivered", "DELAY1(gap, 4, 0)"),
                x_aux("smoothed", "SMTH1(gap, 2)"),
            ],
        )]);
        let main = &compiled.modules["main"];
        let off = |id: &str| compiled.layouts["main"].offsets[id];
        let evals = |runlist: &[Expr], ident: &str| -> Vec<usize> {
            let module = Expr::EvalModule(ident.to_owned());
            runlist
                .iter()
                .enumerate()
                .filter(|(_, expr)| **expr == module)
                .map(|(i, _)| i)
                .collect()
        };

        // the delay is evaluated ahead of delivered, and again once
        // gap, its input, is known
        let flows = &main.runlist_flows;
        let delay = evals(flows, "$·delivered·0·delay1");
        assert_eq!(2, delay.len());
        assert!(delay[0] < position(flows, off("delivered")));
        assert!(position(flows, off("delivered")) < position(flows, off("gap")));
        assert!(position(flows, off("gap")) < delay[1]);

        // smoothed reads a stock, which needs no early evaluation
        assert_eq!(1, evals(flows, "$·smoothed·0·smth1").len());
        let initials = &main.runlist_initials;
        assert_eq!(2, evals(initials, "$·delivered·0·delay1").len());
    }

    #[test]
    fn test_invalid_variables_degrade() {
        let compiled = compile_models(vec![x_model(
            "main",
            vec![
                x_aux("ok", "time * 2"),
                x_aux("broken", "3 +"),
                x_aux("unknown", "nope * 2"),
                x_aux("bad_args", "max(1)"),
            ],
        )]);
        let main = &compiled.modules["main"];
        assert_eq!(1, main.runlist_flows.len());
        assert_eq!(
            "curr[2] := (global[0]*2)",
            pretty(&main.runlist_flows[0])
        );
    }

    #[test]
    fn test_recursive_module() {
        let project = Project::new(&x_project(vec![x_model(
            "main",
            vec![x_module("inner", "main", &[])],
        )]))
        .unwrap();
        let err = compile(&project).unwrap_err();
        assert_eq!(ErrorCode::NotSimulatable, err.code);
    }
}
