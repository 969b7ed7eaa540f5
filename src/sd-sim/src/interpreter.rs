// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::builtins;
use crate::common::{Ident, Result, HIDDEN_PREFIX};
use crate::project::Project;
use crate::results::Results;
use crate::sim::{compile, Compiled, Expr, Module, Specs, IMPLICIT_VAR_COUNT, TIME_OFF};
use crate::sim_err;
use crate::variable::Variable;

// simplified/lowered from ast::BinaryOp version
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Exp,
    Mul,
    Div,
    Mod,
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
    And,
    Or,
}

// simplified/lowered from ast::UnaryOp version
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum UnaryOp {
    Not,
}

type BuiltinFn = crate::builtins::BuiltinFn<Expr>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum StepPart {
    Initials,
    Flows,
    Stocks,
}

/// SimNode is one instance of a model in the tree of modules rooted
/// at the simulated model.  Every node addresses its own block of
/// each row, starting at `shift`.
#[derive(Clone, Debug)]
pub struct SimNode {
    pub ident: Ident,
    pub model_name: Ident,
    pub shift: usize,
    pub n_vars: usize,
    pub children: BTreeMap<Ident, SimNode>,
    // input -> the name it reads from, as written in the parent model
    sym_refs: BTreeMap<Ident, Ident>,
    // input -> the resolved offset into the row
    refs: HashMap<Ident, usize>,
}

fn resolve(compiled: &Compiled, scope: (&str, usize), ident: &str) -> Option<usize> {
    if ident == "time" {
        return Some(TIME_OFF);
    }
    let (model_name, shift) = scope;
    let layout = compiled.layouts.get(model_name)?;
    Some(shift + layout.offset(&compiled.layouts, ident)?)
}

impl SimNode {
    fn new(
        project: &Project,
        compiled: &Compiled,
        ident: &str,
        model_name: &str,
        shift: usize,
        sym_refs: BTreeMap<Ident, Ident>,
    ) -> Result<Self> {
        let layout = match compiled.layouts.get(model_name) {
            Some(layout) => layout,
            None => return sim_err!(NotSimulatable, model_name.to_owned()),
        };
        let model = match project.models.get(model_name) {
            Some(model) => model,
            None => return sim_err!(BadModelName, model_name.to_owned()),
        };

        let mut children = BTreeMap::new();
        for (child_ident, (child_model, start)) in layout.children.iter() {
            let child_refs: BTreeMap<Ident, Ident> = match model.vars.get(child_ident) {
                Some(Variable::Module { refs, .. }) => refs
                    .values()
                    .map(|r| (r.ident.clone(), r.ptr.clone()))
                    .collect(),
                _ => BTreeMap::new(),
            };
            let child = SimNode::new(
                project,
                compiled,
                child_ident,
                child_model,
                shift + start,
                child_refs,
            )?;
            children.insert(child_ident.clone(), child);
        }

        Ok(SimNode {
            ident: ident.to_owned(),
            model_name: model_name.to_owned(),
            shift,
            n_vars: layout.size,
            children,
            sym_refs,
            refs: HashMap::new(),
        })
    }

    /// resolve_all_symbolic_refs turns every incoming reference in
    /// the tree into an offset.  It has to run after the whole tree
    /// is built, as references can point into sibling modules.
    fn resolve_all_symbolic_refs(&mut self, compiled: &Compiled, parent: Option<(&str, usize)>) {
        let root = (compiled.root.as_str(), IMPLICIT_VAR_COUNT);
        for (input, ptr) in self.sym_refs.iter() {
            let (scope, ptr) = match ptr.strip_prefix('.') {
                Some(ptr) => (root, ptr),
                None => (parent.unwrap_or(root), ptr.as_str()),
            };
            match resolve(compiled, scope, ptr) {
                Some(off) => {
                    self.refs.insert(input.clone(), off);
                }
                None => {
                    log::warn!(
                        "{}: reference {} -> {} doesn't resolve",
                        self.ident,
                        ptr,
                        input
                    );
                }
            }
        }

        let scope = (self.model_name.as_str(), self.shift);
        for child in self.children.values_mut() {
            child.resolve_all_symbolic_refs(compiled, Some(scope));
        }
    }

    /// lookup_offset finds the row offset of a (possibly dotted)
    /// variable name relative to this node.
    pub fn lookup_offset(&self, compiled: &Compiled, ident: &str) -> Option<usize> {
        if ident == "time" {
            return Some(TIME_OFF);
        }
        if let Some(off) = compiled
            .layouts
            .get(&self.model_name)
            .and_then(|layout| layout.offsets.get(ident))
        {
            return Some(self.shift + off);
        }
        let pos = ident.find('.')?;
        self.children
            .get(&ident[..pos])?
            .lookup_offset(compiled, &ident[pos + 1..])
    }

    fn var_names(&self, compiled: &Compiled, prefix: &str, names: &mut Vec<Ident>) {
        if let Some(layout) = compiled.layouts.get(&self.model_name) {
            names.extend(layout.offsets.keys().map(|id| format!("{}{}", prefix, id)));
        }
        for (ident, child) in self.children.iter() {
            child.var_names(compiled, &format!("{}{}.", prefix, ident), names);
        }
    }
}

fn is_truthy(n: f64) -> bool {
    let is_false = approx_eq!(f64, n, 0.0);
    !is_false
}

fn is_equal(l: f64, r: f64) -> bool {
    if l.is_nan() || r.is_nan() {
        l.is_nan() && r.is_nan()
    } else {
        approx_eq!(f64, l, r)
    }
}

fn calc(
    step_part: StepPart,
    modules: &HashMap<Ident, Module>,
    node: &SimNode,
    dt: f64,
    curr: &mut [f64],
    next: &mut [f64],
) {
    let module = match modules.get(&node.model_name) {
        Some(module) => module,
        None => return,
    };
    let runlist = match step_part {
        StepPart::Initials => &module.runlist_initials,
        StepPart::Flows => &module.runlist_flows,
        StepPart::Stocks => &module.runlist_stocks,
    };

    let mut step = ModuleEvaluator {
        step_part,
        node,
        module,
        modules,
        dt,
        curr,
        next,
    };

    for expr in runlist.iter() {
        step.eval(expr);
    }
}

struct ModuleEvaluator<'a> {
    step_part: StepPart,
    node: &'a SimNode,
    module: &'a Module,
    modules: &'a HashMap<Ident, Module>,
    dt: f64,
    curr: &'a mut [f64],
    next: &'a mut [f64],
}

impl<'a> ModuleEvaluator<'a> {
    fn eval(&mut self, expr: &Expr) -> f64 {
        match expr {
            Expr::Const(n) => *n,
            Expr::Dt => self.dt,
            Expr::Var(off) => self.curr[self.node.shift + *off],
            Expr::GlobalVar(off) => self.curr[*off],
            Expr::Override(ident, fallback) => match self.node.refs.get(ident) {
                Some(off) => self.curr[*off],
                None => self.eval(fallback),
            },
            Expr::EvalModule(ident) => {
                let node = self.node;
                if let Some(child) = node.children.get(ident) {
                    calc(
                        self.step_part,
                        self.modules,
                        child,
                        self.dt,
                        self.curr,
                        self.next,
                    );
                }
                0.0
            }
            Expr::AssignCurr(off, r) => {
                let rhs = self.eval(r);
                self.curr[self.node.shift + *off] = rhs;
                0.0
            }
            Expr::AssignNext(off, r) => {
                let rhs = self.eval(r);
                self.next[self.node.shift + *off] = rhs;
                0.0
            }
            Expr::If(cond, t, f) => {
                let cond: f64 = self.eval(cond);
                if is_truthy(cond) {
                    self.eval(t)
                } else {
                    self.eval(f)
                }
            }
            Expr::Op1(op, l) => {
                let l = self.eval(l);
                match op {
                    UnaryOp::Not => (!is_truthy(l)) as i8 as f64,
                }
            }
            Expr::Op2(op, l, r) => {
                let l = self.eval(l);
                let r = self.eval(r);
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Exp => l.powf(r),
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    BinaryOp::Mod => l.rem_euclid(r),
                    BinaryOp::Gt => (l > r) as i8 as f64,
                    BinaryOp::Gte => (l >= r) as i8 as f64,
                    BinaryOp::Lt => (l < r) as i8 as f64,
                    BinaryOp::Lte => (l <= r) as i8 as f64,
                    BinaryOp::Eq => is_equal(l, r) as i8 as f64,
                    BinaryOp::Neq => !is_equal(l, r) as i8 as f64,
                    BinaryOp::And => (is_truthy(l) && is_truthy(r)) as i8 as f64,
                    BinaryOp::Or => (is_truthy(l) || is_truthy(r)) as i8 as f64,
                }
            }
            Expr::App(builtin) => self.apply(builtin),
        }
    }

    fn eval_opt(&mut self, expr: &Option<Box<Expr>>) -> Option<f64> {
        match expr {
            Some(expr) => Some(self.eval(expr)),
            None => None,
        }
    }

    fn apply(&mut self, builtin: &BuiltinFn) -> f64 {
        let time = self.curr[TIME_OFF];
        match builtin {
            BuiltinFn::Abs(a) => self.eval(a).abs(),
            BuiltinFn::Cos(a) => self.eval(a).cos(),
            BuiltinFn::Sin(a) => self.eval(a).sin(),
            BuiltinFn::Tan(a) => self.eval(a).tan(),
            BuiltinFn::Arccos(a) => self.eval(a).acos(),
            BuiltinFn::Arcsin(a) => self.eval(a).asin(),
            BuiltinFn::Arctan(a) => self.eval(a).atan(),
            BuiltinFn::Exp(a) => self.eval(a).exp(),
            BuiltinFn::Inf => std::f64::INFINITY,
            BuiltinFn::Pi => std::f64::consts::PI,
            BuiltinFn::Int(a) => self.eval(a).floor(),
            BuiltinFn::Ln(a) => self.eval(a).ln(),
            BuiltinFn::Log10(a) => self.eval(a).log10(),
            BuiltinFn::SafeDiv(a, b, c) => {
                let a = self.eval(a);
                let b = self.eval(b);
                let c = self.eval_opt(c);
                builtins::safediv(a, b, c)
            }
            BuiltinFn::Sqrt(a) => self.eval(a).sqrt(),
            BuiltinFn::Min(a, b) => {
                let a = self.eval(a);
                let b = self.eval(b);
                // we can't use std::cmp::min here, becuase f64 is only
                // PartialOrd
                if a < b {
                    a
                } else {
                    b
                }
            }
            BuiltinFn::Max(a, b) => {
                let a = self.eval(a);
                let b = self.eval(b);
                if a > b {
                    a
                } else {
                    b
                }
            }
            BuiltinFn::Mean(args) => {
                let count = args.len() as f64;
                let sum: f64 = args.iter().map(|arg| self.eval(arg)).sum();
                sum / count
            }
            BuiltinFn::Lookup(id, index) => {
                let index = self.eval(index);
                match self.module.tables.get(id) {
                    Some(table) => builtins::lookup(&table.x, &table.y, index),
                    None => f64::NAN,
                }
            }
            BuiltinFn::Pulse(a, b, c) => {
                let magnitude = self.eval(a);
                let first_pulse = self.eval(b);
                let interval = self.eval_opt(c).unwrap_or(0.0);
                builtins::pulse(self.dt, time, magnitude, first_pulse, interval)
            }
            BuiltinFn::Ramp(a, b, c) => {
                let slope = self.eval(a);
                let start_time = self.eval(b);
                let end_time = self.eval_opt(c);
                builtins::ramp(time, slope, start_time, end_time)
            }
            BuiltinFn::Step(a, b) => {
                let height = self.eval(a);
                let start_time = self.eval(b);
                builtins::step(time, height, start_time)
            }
        }
    }
}

// the adjacent rows `row` and `row + 1` of the slab
fn rows(slab: &mut [f64], n_vars: usize, row: usize) -> (&mut [f64], &mut [f64]) {
    let (head, tail) = slab.split_at_mut((row + 1) * n_vars);
    (&mut head[row * n_vars..], &mut tail[..n_vars])
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SimOptions {
    // report unknown variable names as errors rather than ignoring
    // them
    pub strict: bool,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct Series {
    pub name: Ident,
    pub time: Vec<f64>,
    pub values: Vec<f64>,
}

#[derive(Clone, Debug)]
pub struct Simulation {
    compiled: Compiled,
    root: SimNode,
    options: SimOptions,
    n_vars: usize,
    // one large allocation, with a row per saved step plus the one
    // currently being computed
    slab: Vec<f64>,
    curr_row: usize,
    step_num: usize,
    save_every: usize,
}

impl Simulation {
    pub fn new(project: &Project) -> Result<Self> {
        Simulation::with_options(project, SimOptions::default())
    }

    pub fn with_options(project: &Project, options: SimOptions) -> Result<Self> {
        let compiled = compile(project)?;
        let root_model = compiled.root.clone();
        let mut root = SimNode::new(
            project,
            &compiled,
            project.main.ident(),
            &root_model,
            IMPLICIT_VAR_COUNT,
            BTreeMap::new(),
        )?;
        root.resolve_all_symbolic_refs(&compiled, None);

        let n_vars = compiled.n_vars();
        let mut sim = Simulation {
            compiled,
            root,
            options,
            n_vars,
            slab: vec![],
            curr_row: 0,
            step_num: 0,
            save_every: 1,
        };
        sim.reset();

        Ok(sim)
    }

    pub fn specs(&self) -> &Specs {
        &self.compiled.specs
    }

    /// reset discards any results and computes the initial values.
    pub fn reset(&mut self) {
        let specs = &self.compiled.specs;
        let n_save_steps = ((specs.stop - specs.start) / specs.save_step + 1.0).max(1.0) as usize;

        self.slab = vec![0.0; self.n_vars * (n_save_steps + 1)];
        self.curr_row = 0;
        self.step_num = 0;
        self.save_every = std::cmp::max(1, (specs.save_step / specs.dt + 0.5) as usize);

        let (curr, next) = rows(&mut self.slab, self.n_vars, 0);
        curr[TIME_OFF] = specs.start;
        calc(
            StepPart::Initials,
            &self.compiled.modules,
            &self.root,
            specs.dt,
            curr,
            next,
        );
    }

    fn curr(&self) -> &[f64] {
        let start = self.curr_row * self.n_vars;
        &self.slab[start..start + self.n_vars]
    }

    pub fn time(&self) -> f64 {
        self.curr()[TIME_OFF]
    }

    /// run_to steps the simulation until the current time is past
    /// `end`.  Only every `save_every`th step gets its own row.
    pub fn run_to(&mut self, end: f64) {
        let dt = self.compiled.specs.dt;
        let n_vars = self.n_vars;

        while self.time() <= end {
            let needed = (self.curr_row + 2) * n_vars;
            if self.slab.len() < needed {
                let grow_to = std::cmp::max(needed, self.slab.len() * 2);
                self.slab.resize(grow_to, 0.0);
            }

            let (curr, next) = rows(&mut self.slab, n_vars, self.curr_row);
            calc(
                StepPart::Flows,
                &self.compiled.modules,
                &self.root,
                dt,
                curr,
                next,
            );
            next.copy_from_slice(curr);
            calc(
                StepPart::Stocks,
                &self.compiled.modules,
                &self.root,
                dt,
                curr,
                next,
            );
            next[TIME_OFF] = curr[TIME_OFF] + dt;

            let keep = self.step_num % self.save_every == 0;
            self.step_num += 1;
            if keep {
                self.curr_row += 1;
            } else {
                curr.copy_from_slice(next);
            }
        }
    }

    pub fn run_to_end(&mut self) {
        let specs = &self.compiled.specs;
        let end = specs.stop + 0.5 * specs.dt;
        self.run_to(end);
    }

    /// lookup_offset finds the row offset for a variable, where a
    /// leading '.' is explicitly relative to the root model.
    pub fn lookup_offset(&self, ident: &str) -> Option<usize> {
        let ident = ident.strip_prefix('.').unwrap_or(ident);
        self.root.lookup_offset(&self.compiled, ident)
    }

    fn offset_or_err(&self, ident: &str) -> Result<Option<usize>> {
        match self.lookup_offset(ident) {
            Some(off) => Ok(Some(off)),
            None if self.options.strict => sim_err!(UnknownVariable, ident.to_owned()),
            None => Ok(None),
        }
    }

    /// value is the current value of a variable, or NaN for names
    /// that don't resolve.
    pub fn value(&self, ident: &str) -> Result<f64> {
        let value = match self.offset_or_err(ident)? {
            Some(off) => self.curr()[off],
            None => f64::NAN,
        };
        Ok(value)
    }

    /// set_value overwrites a variable in the current row.  Unknown
    /// names are ignored.
    pub fn set_value(&mut self, ident: &str, value: f64) -> Result<()> {
        if let Some(off) = self.offset_or_err(ident)? {
            let start = self.curr_row * self.n_vars;
            self.slab[start + off] = value;
        }
        Ok(())
    }

    /// series is a variable's value at every saved step so far.
    pub fn series(&self, ident: &str) -> Result<Option<Series>> {
        let off = match self.offset_or_err(ident)? {
            Some(off) => off,
            None => return Ok(None),
        };
        let saved = &self.slab[..self.curr_row * self.n_vars];
        let time = saved.chunks(self.n_vars).map(|row| row[TIME_OFF]).collect();
        let values = saved.chunks(self.n_vars).map(|row| row[off]).collect();
        Ok(Some(Series {
            name: ident.to_owned(),
            time,
            values,
        }))
    }

    /// dominance computes a single step from the current state with
    /// some values replaced, returning the indicators' values after
    /// the step.  The simulation itself is left untouched.
    pub fn dominance(
        &self,
        overrides: &BTreeMap<Ident, f64>,
        indicators: &[Ident],
    ) -> HashMap<Ident, f64> {
        let n_vars = self.n_vars;
        let dt = self.compiled.specs.dt;

        let mut scratch = vec![0.0; n_vars * 2];
        scratch[..n_vars].copy_from_slice(self.curr());
        for (ident, value) in overrides.iter() {
            match self.lookup_offset(ident) {
                Some(off) => scratch[off] = *value,
                None => {
                    log::warn!("dominance: unknown variable '{}'", ident);
                    return HashMap::new();
                }
            }
        }

        let (curr, next) = rows(&mut scratch, n_vars, 0);
        calc(
            StepPart::Flows,
            &self.compiled.modules,
            &self.root,
            dt,
            curr,
            next,
        );
        next.copy_from_slice(curr);
        calc(
            StepPart::Stocks,
            &self.compiled.modules,
            &self.root,
            dt,
            curr,
            next,
        );
        next[TIME_OFF] = curr[TIME_OFF] + dt;

        let mut result = HashMap::new();
        for ident in indicators.iter() {
            match self.lookup_offset(ident) {
                Some(off) => {
                    result.insert(ident.clone(), next[off]);
                }
                None => log::warn!("dominance: unknown indicator '{}'", ident),
            }
        }
        result
    }

    /// var_names lists every variable in the module tree, with nested
    /// variables named by their dotted path.  Variables introduced
    /// for builtin calls are only included when asked for.
    pub fn var_names(&self, include_hidden: bool) -> Vec<Ident> {
        let mut names = vec![];
        self.root.var_names(&self.compiled, "", &mut names);
        names.push("time".to_owned());
        if !include_hidden {
            names.retain(|name| !name.split('.').any(|part| part.starts_with(HIDDEN_PREFIX)));
        }
        names.sort_unstable();
        names
    }

    /// results snapshots the saved rows for every visible variable.
    pub fn results(&self) -> Results {
        let offsets: HashMap<Ident, usize> = self
            .var_names(false)
            .into_iter()
            .filter_map(|name| {
                let off = self.lookup_offset(&name)?;
                Some((name, off))
            })
            .collect();

        Results {
            offsets,
            data: self.slab[..self.curr_row * self.n_vars]
                .to_vec()
                .into_boxed_slice(),
            step_size: self.n_vars,
            step_count: self.curr_row,
            specs: self.compiled.specs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel;
    use crate::model::testutil::*;

    fn simulation(
        specs: datamodel::SimSpecs,
        models: Vec<datamodel::Model>,
        options: SimOptions,
    ) -> Simulation {
        let project = Project::new(&datamodel::Project {
            name: "test".to_owned(),
            sim_specs: Some(specs),
            models,
        })
        .unwrap();
        Simulation::with_options(&project, options).unwrap()
    }

    #[test]
    fn test_is_equal() {
        assert!(is_equal(1.0, 1.0));
        assert!(is_equal(f64::NAN, f64::NAN));
        assert!(!is_equal(f64::NAN, 0.0));
        assert!(!is_equal(1.0, 2.0));
        assert!(is_truthy(-1.0));
        assert!(!is_truthy(0.0));
    }

    #[test]
    fn test_lookup_offset() {
        let sim = simulation(
            datamodel::SimSpecs::default(),
            vec![
                x_model("child", vec![x_aux("x", "1"), x_aux("y", "x * 2")]),
                x_model(
                    "main",
                    vec![
                        x_aux("p", "3"),
                        x_module("a", "child", &[("p", "a.x")]),
                        x_module("b", "child", &[]),
                    ],
                ),
            ],
            SimOptions::default(),
        );
        assert_eq!(Some(0), sim.lookup_offset("time"));
        assert_eq!(Some(1), sim.lookup_offset("p"));
        assert_eq!(Some(1), sim.lookup_offset(".p"));
        assert_eq!(Some(2), sim.lookup_offset("a.x"));
        assert_eq!(Some(3), sim.lookup_offset("a.y"));
        assert_eq!(Some(5), sim.lookup_offset("b.y"));
        assert_eq!(None, sim.lookup_offset("b"));
        assert_eq!(None, sim.lookup_offset("c.y"));

        assert_eq!(Some(&1), sim.root.children["a"].refs.get("x"));
        assert!(sim.root.children["b"].refs.is_empty());

        // the connected input follows its source
        assert!(approx_eq!(f64, 3.0, sim.value("a.x").unwrap()));
        assert!(approx_eq!(f64, 1.0, sim.value("b.x").unwrap()));
    }

    #[test]
    fn test_module_inputs() {
        let mut sim = simulation(
            datamodel::SimSpecs::default(),
            vec![
                x_model("child", vec![x_aux("x", "1"), x_aux("y", "x * 2")]),
                x_model(
                    "main",
                    vec![
                        x_aux("p", "time + 3"),
                        x_module("a", "child", &[("p", "a.x")]),
                        x_module("b", "child", &[]),
                    ],
                ),
            ],
            SimOptions::default(),
        );
        sim.run_to_end();
        let a_y = sim.series("a.y").unwrap().unwrap();
        let b_y = sim.series("b.y").unwrap().unwrap();
        assert_eq!(11, a_y.values.len());
        for (i, (a, b)) in a_y.values.iter().zip(b_y.values.iter()).enumerate() {
            assert!(approx_eq!(f64, (i as f64 + 3.0) * 2.0, *a));
            assert!(approx_eq!(f64, 2.0, *b));
        }
    }

    #[test]
    fn test_strict_names() {
        let models = vec![x_model("main", vec![x_aux("a", "1")])];
        let mut sim = simulation(
            datamodel::SimSpecs::default(),
            models.clone(),
            SimOptions::default(),
        );
        assert!(sim.value("nope").unwrap().is_nan());
        assert!(sim.set_value("nope", 1.0).is_ok());
        assert!(sim.series("nope").unwrap().is_none());

        let mut sim = simulation(
            datamodel::SimSpecs::default(),
            models,
            SimOptions { strict: true },
        );
        let err = sim.value("nope").unwrap_err();
        assert_eq!(crate::common::ErrorCode::UnknownVariable, err.code);
        assert!(sim.set_value("nope", 1.0).is_err());
        assert!(sim.series("nope").is_err());
        assert!(approx_eq!(f64, 1.0, sim.value("a").unwrap()));
    }

    #[test]
    fn test_var_names() {
        let sim = simulation(
            datamodel::SimSpecs::default(),
            vec![x_model(
                "main",
                vec![x_aux("input", "time"), x_aux("smoothed", "smth1(input, 2)")],
            )],
            SimOptions::default(),
        );
        assert_eq!(vec!["input", "smoothed", "time"], sim.var_names(false));
        let all = sim.var_names(true);
        assert!(all.contains(&"$·smoothed·0·smth1.output".to_owned()));
        assert!(all.contains(&"$·smoothed·0·smth1.flow".to_owned()));
    }

    #[test]
    fn test_slab_grows() {
        let mut sim = simulation(
            datamodel::SimSpecs {
                start: 0.0,
                stop: 2.0,
                ..datamodel::SimSpecs::default()
            },
            vec![x_model(
                "main",
                vec![x_stock("s", "0", &["f"], &[]), x_flow("f", "1")],
            )],
            SimOptions::default(),
        );
        // running past the stop time keeps saving rows
        sim.run_to(10.0);
        assert!(approx_eq!(f64, 11.0, sim.time()));
        assert!(approx_eq!(f64, 11.0, sim.value("s").unwrap()));
        assert_eq!(11, sim.series("s").unwrap().unwrap().values.len());
    }
}
