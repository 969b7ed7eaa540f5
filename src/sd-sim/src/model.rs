// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeSet, HashMap};

use crate::builtins::is_time_ident;
use crate::builtins_visitor::instantiate_implicit_modules;
use crate::common::{canonicalize, Ident, Result};
use crate::variable::Variable;
use crate::{datamodel, model_err};

pub type DepMap = HashMap<Ident, BTreeSet<Ident>>;

#[derive(Clone, PartialEq, Debug)]
pub struct Model {
    pub ident: Ident,
    pub vars: HashMap<Ident, Variable>,
    pub sim_specs: Option<datamodel::SimSpecs>,
    // transitive dependencies, filled in by set_dependencies once
    // every model in the project exists.
    initial_deps: DepMap,
    flow_deps: DepMap,
}

/// Context selects which phase dependencies are computed for: in the
/// initial phase stocks are ordinary variables whose value comes from
/// their initial equation, in the flow phase they are carried state.
#[derive(Copy, Clone, Debug)]
pub struct Context<'a> {
    pub model: &'a Model,
    pub is_initial: bool,
}

impl<'a> Context<'a> {
    pub fn new(model: &'a Model, is_initial: bool) -> Self {
        Context { model, is_initial }
    }

    fn deps(&self) -> &'a DepMap {
        if self.is_initial {
            &self.model.initial_deps
        } else {
            &self.model.flow_deps
        }
    }
}

/// get_deps returns the full set of variables `var` depends on,
/// directly or transitively, within the context's model.
pub fn get_deps<'a>(ctx: &Context<'a>, var: &Variable) -> Option<&'a BTreeSet<Ident>> {
    ctx.deps().get(var.ident())
}

impl Model {
    pub fn new(x_model: &datamodel::Model) -> Result<Self> {
        let ident = canonicalize(&x_model.name);
        let mut vars: HashMap<Ident, Variable> = HashMap::new();
        for x_var in x_model.variables.iter() {
            let var = Variable::new(x_var);
            if vars.contains_key(var.ident()) {
                return model_err!(
                    DuplicateVariable,
                    format!("{}.{}", ident, var.ident())
                );
            }
            vars.insert(var.ident().to_owned(), var);
        }

        for var in vars.values() {
            if let Some(table) = var.table() {
                if !table.ok {
                    return model_err!(BadTable, format!("{}.{}", ident, var.ident()));
                }
            }
        }

        let mut model = Model {
            ident,
            vars,
            sim_specs: x_model.sim_specs.clone(),
            initial_deps: HashMap::new(),
            flow_deps: HashMap::new(),
        };
        model.instantiate_implicit_modules()?;

        Ok(model)
    }

    /// instantiate_implicit_modules replaces calls to stdlib functions
    /// like `smth1` with references to new module instances.
    fn instantiate_implicit_modules(&mut self) -> Result<()> {
        let mut idents: Vec<Ident> = self.vars.keys().cloned().collect();
        idents.sort();

        let mut implicit_vars: Vec<datamodel::Variable> = vec![];
        for ident in idents.iter() {
            let var = match self.vars.get_mut(ident) {
                Some(var) => var,
                None => continue,
            };
            let ast = match var.ast() {
                Some(ast) => ast.clone(),
                None => continue,
            };
            match instantiate_implicit_modules(ident, ast) {
                Ok((ast, mut new_vars)) => {
                    if !new_vars.is_empty() {
                        var.set_ast(ast);
                        implicit_vars.append(&mut new_vars);
                    }
                }
                Err(err) => {
                    log::warn!("{}.{}: {}", self.ident, ident, err);
                    var.invalidate(err);
                }
            }
        }

        for x_var in implicit_vars.iter() {
            let var = Variable::new(x_var);
            if self.vars.contains_key(var.ident()) {
                return model_err!(
                    DuplicateVariable,
                    format!("{}.{}", self.ident, var.ident())
                );
            }
            self.vars.insert(var.ident().to_owned(), var);
        }

        Ok(())
    }

    pub fn modules(&self) -> impl Iterator<Item = &Variable> {
        self.vars.values().filter(|v| v.is_module())
    }

    pub fn tables(&self) -> impl Iterator<Item = &Variable> {
        self.vars.values().filter(|v| v.table().is_some())
    }

    /// lookup resolves a possibly dotted identifier, where `a.b`
    /// names the variable `b` inside the model instantiated by the
    /// module `a`, and a leading `.` starts from the root model.
    pub fn lookup<'a>(
        &'a self,
        models: &'a HashMap<Ident, Model>,
        root: &str,
        ident: &str,
    ) -> Option<&'a Variable> {
        if let Some(ident) = ident.strip_prefix('.') {
            return models.get(root)?.lookup(models, root, ident);
        }
        if let Some(var) = self.vars.get(ident) {
            return Some(var);
        }

        let pos = ident.find('.')?;
        let (module_ident, rest) = (&ident[..pos], &ident[pos + 1..]);
        match self.vars.get(module_ident)? {
            Variable::Module { model_name, .. } => {
                models.get(model_name)?.lookup(models, root, rest)
            }
            _ => None,
        }
    }
}

/// set_dependencies computes the transitive dependencies of every
/// variable in every model, in both the initial and flow contexts.
/// A dependency cycle within a model is an error.
pub fn set_dependencies(models: &mut HashMap<Ident, Model>, root: &str) -> Result<()> {
    let mut computed: Vec<(Ident, DepMap, DepMap)> = Vec::with_capacity(models.len());
    for (name, model) in models.iter() {
        let initial_deps = all_deps(model, models, root, true, vec![])?;
        let flow_deps = all_deps(model, models, root, false, vec![])?;
        computed.push((name.clone(), initial_deps, flow_deps));
    }

    for (name, initial_deps, flow_deps) in computed.into_iter() {
        if let Some(model) = models.get_mut(&name) {
            model.initial_deps = initial_deps;
            model.flow_deps = flow_deps;
        }
    }

    Ok(())
}

struct DepsBuilder<'a> {
    model: &'a Model,
    models: &'a HashMap<Ident, Model>,
    root: &'a str,
    is_initial: bool,
    // the models whose dependencies are being computed further up
    // the stack, as a model can (wrongly) instantiate itself
    enclosing: Vec<Ident>,
    // inputs connected by the module instance being looked into,
    // whose own equations are never evaluated
    inputs: BTreeSet<Ident>,
    processing: BTreeSet<&'a str>,
    all_var_deps: HashMap<&'a str, BTreeSet<Ident>>,
}

impl<'a> DepsBuilder<'a> {
    fn new(
        model: &'a Model,
        models: &'a HashMap<Ident, Model>,
        root: &'a str,
        is_initial: bool,
        enclosing: Vec<Ident>,
    ) -> Self {
        DepsBuilder {
            model,
            models,
            root,
            is_initial,
            enclosing,
            inputs: BTreeSet::new(),
            processing: BTreeSet::new(),
            all_var_deps: HashMap::new(),
        }
    }

    fn is_stock(&self, ident: &str) -> bool {
        self.model
            .vars
            .get(ident)
            .map(|v| v.is_stock())
            .unwrap_or(false)
    }

    /// local_deps maps a direct dependency onto the variables of this
    /// model it stands for.  References to the root model from inside
    /// a module are passed through untouched, for the model that
    /// instantiates us to resolve.
    fn local_deps(&self, dep: &str) -> Result<Vec<Ident>> {
        if is_time_ident(dep) {
            return Ok(vec![]);
        }

        let dep = match dep.strip_prefix('.') {
            Some(local) if self.model.ident == self.root => local,
            Some(_) => return Ok(vec![dep.to_owned()]),
            None => dep,
        };

        if self.model.vars.contains_key(dep) {
            return Ok(vec![dep.to_owned()]);
        }

        let pos = match dep.find('.') {
            Some(pos) => pos,
            None => return Ok(vec![]),
        };
        match self.model.vars.get(&dep[..pos]) {
            Some(module @ Variable::Module { .. }) => {
                self.module_output_deps(module, &dep[pos + 1..])
            }
            _ => Ok(vec![]),
        }
    }

    /// inner builds the dependencies of the model a module instance
    /// instantiates, as seen through that instance.
    fn inner(&self, module: &Variable) -> Option<DepsBuilder<'a>> {
        let (model_name, refs) = match module {
            Variable::Module {
                model_name, refs, ..
            } => (model_name, refs),
            _ => return None,
        };
        // a model instantiating itself is reported when the
        // simulation is laid out
        if *model_name == self.model.ident || self.enclosing.contains(model_name) {
            return None;
        }
        let model = self.models.get(model_name)?;
        let mut enclosing = self.enclosing.clone();
        enclosing.push(self.model.ident.clone());
        let mut inner =
            DepsBuilder::new(model, self.models, self.root, self.is_initial, enclosing);
        inner.inputs = refs.keys().cloned().collect();
        Some(inner)
    }

    /// module_output_deps is what reading `output` from a module
    /// instance depends on: the sources of the module inputs that
    /// `output` reaches without crossing a stock.  The instance
    /// itself isn't a dependency, as it is evaluated again in front
    /// of any reader that runs before it.
    fn module_output_deps(&self, module: &Variable, output: &str) -> Result<Vec<Ident>> {
        let refs = match module {
            Variable::Module { refs, .. } => refs,
            _ => return Ok(vec![]),
        };
        let mut inner = match self.inner(module) {
            Some(inner) => inner,
            None => return Ok(vec![]),
        };

        // a stock's value is carried over from the last step
        if !self.is_initial && inner.is_stock(output) {
            return Ok(vec![]);
        }

        let mut reached: BTreeSet<Ident> = BTreeSet::new();
        if inner.model.vars.contains_key(output) {
            inner.reach(output, &mut reached)?;
        } else {
            for dep in inner.local_deps(output)? {
                inner.reach(&dep, &mut reached)?;
            }
        }

        let mut deps = vec![];
        for ident in reached.iter() {
            if ident.starts_with('.') {
                deps.extend(self.local_deps(ident)?);
            } else if let Some(reference) = refs.get(ident) {
                deps.extend(self.local_deps(&reference.ptr)?);
            }
        }

        Ok(deps)
    }

    /// module_absolute_deps are the root model variables read from
    /// anywhere inside a module instance.
    fn module_absolute_deps(&self, module: &Variable) -> Result<Vec<Ident>> {
        let inner = match self.inner(module) {
            Some(inner) => inner,
            None => return Ok(vec![]),
        };
        let inner_deps = all_deps_of(inner)?;

        let mut deps = vec![];
        let absolute: BTreeSet<&Ident> = inner_deps
            .values()
            .flat_map(|deps| deps.iter())
            .filter(|dep| dep.starts_with('.'))
            .collect();
        for dep in absolute {
            deps.extend(self.local_deps(dep)?);
        }
        Ok(deps)
    }

    /// reach adds `ident` and everything it transitively depends on
    /// to `reached`.
    fn reach(&mut self, ident: &str, reached: &mut BTreeSet<Ident>) -> Result<()> {
        reached.insert(ident.to_owned());
        let model = self.model;
        let id = match model.vars.get_key_value(ident) {
            Some((id, _)) => id.as_str(),
            None => return Ok(()),
        };
        if !self.is_initial && self.is_stock(id) {
            return Ok(());
        }
        self.visit(id)?;
        if let Some(deps) = self.all_var_deps.get(id) {
            reached.extend(deps.iter().cloned());
        }
        Ok(())
    }

    fn visit(&mut self, id: &'a str) -> Result<()> {
        if self.all_var_deps.contains_key(id) {
            return Ok(());
        }
        let model = self.model;
        let var = match model.vars.get(id) {
            Some(var) => var,
            None => return Ok(()),
        };

        if self.inputs.contains(id) {
            self.all_var_deps.insert(id, BTreeSet::new());
            return Ok(());
        }

        self.processing.insert(id);

        let mut direct: Vec<Ident> = vec![];
        for dep in var.deps().iter() {
            direct.extend(self.local_deps(dep)?);
        }
        if var.is_module() {
            direct.extend(self.module_absolute_deps(var)?);
        }

        let mut all_deps: BTreeSet<Ident> = BTreeSet::new();
        for dep in direct.into_iter() {
            let dep = match model.vars.get_key_value(dep.as_str()) {
                Some((dep, _)) => dep.as_str(),
                None => {
                    // a root model reference, resolved by our parent
                    all_deps.insert(dep);
                    continue;
                }
            };
            all_deps.insert(dep.to_owned());

            // dependency chains break at stocks in the flow phase,
            // as we use their value from the last dt timestep.
            if !self.is_initial && self.is_stock(dep) {
                continue;
            }

            if self.processing.contains(dep) {
                let phase = if self.is_initial { " (initial values)" } else { "" };
                return model_err!(
                    CircularDependency,
                    format!("{}.{}{}", self.model.ident, id, phase)
                );
            }

            self.visit(dep)?;
            if let Some(dep_deps) = self.all_var_deps.get(dep) {
                all_deps.extend(dep_deps.iter().cloned());
            }
        }

        self.processing.remove(id);
        self.all_var_deps.insert(id, all_deps);

        Ok(())
    }
}

fn all_deps_of(mut builder: DepsBuilder) -> Result<DepMap> {
    let model = builder.model;
    for id in model.vars.keys() {
        builder.visit(id.as_str())?;
    }

    Ok(builder
        .all_var_deps
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect())
}

// computing each variable's transitive dependencies once up front
// keeps sorting the run lists at O(n*log(n)) lookups.
fn all_deps(
    model: &Model,
    models: &HashMap<Ident, Model>,
    root: &str,
    is_initial: bool,
    enclosing: Vec<Ident>,
) -> Result<DepMap> {
    all_deps_of(DepsBuilder::new(model, models, root, is_initial, enclosing))
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::common::ErrorCode;
    use crate::stdlib;

    fn build(x_models: &[datamodel::Model]) -> Result<HashMap<Ident, Model>> {
        let mut models = HashMap::new();
        for x_model in x_models.iter() {
            let model = Model::new(x_model)?;
            models.insert(model.ident.clone(), model);
        }
        set_dependencies(&mut models, "main")?;
        Ok(models)
    }

    fn deps_of(model: &Model, is_initial: bool, ident: &str) -> Vec<String> {
        let ctx = Context::new(model, is_initial);
        get_deps(&ctx, &model.vars[ident])
            .unwrap()
            .iter()
            .cloned()
            .collect()
    }

    #[test]
    fn test_all_deps() {
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        let mut variables = vec![
            x_aux("aux_used_in_initial", "7"),
            x_aux("aux_2", "aux_used_in_initial"),
            x_aux("aux_3", "aux_2"),
            x_aux("aux_4", "aux_2"),
            x_flow("inflow", "aux_3 + aux_4"),
            x_flow("outflow", "stock_1"),
            x_stock("stock_1", "aux_used_in_initial", &["inflow"], &["outflow"]),
        ];

        let flow_expected: &[(&str, &[&str])] = &[
            ("aux_used_in_initial", &[]),
            ("aux_2", &["aux_used_in_initial"]),
            ("aux_3", &["aux_2", "aux_used_in_initial"]),
            ("aux_4", &["aux_2", "aux_used_in_initial"]),
            (
                "inflow",
                &["aux_2", "aux_3", "aux_4", "aux_used_in_initial"],
            ),
            ("outflow", &["stock_1"]),
            ("stock_1", &["aux_used_in_initial"]),
        ];
        let initial_expected: &[(&str, &[&str])] = &[
            ("outflow", &["aux_used_in_initial", "stock_1"]),
            ("stock_1", &["aux_used_in_initial"]),
        ];

        let mut rng = thread_rng();
        // no matter the order of variables in the list, we should get
        // the same deps (even though the order of recursion might change)
        for _ in 0..16 {
            variables.shuffle(&mut rng);
            let models = build(&[x_model("main", variables.clone())]).unwrap();
            let main = &models["main"];
            for (ident, expected) in flow_expected.iter() {
                assert_eq!(*expected, deps_of(main, false, ident).as_slice(), "{}", ident);
            }
            for (ident, expected) in initial_expected.iter() {
                assert_eq!(*expected, deps_of(main, true, ident).as_slice(), "{}", ident);
            }
        }
    }

    #[test]
    fn test_circular_dependencies() {
        let err = build(&[x_model(
            "main",
            vec![x_aux("aux_a", "aux_b"), x_aux("aux_b", "aux_a")],
        )])
        .unwrap_err();
        assert_eq!(ErrorCode::CircularDependency, err.code);

        // self-references shouldn't blow the stack
        let err = build(&[x_model("main", vec![x_aux("aux_a", "aux_a + 1")])]).unwrap_err();
        assert_eq!(ErrorCode::CircularDependency, err.code);

        // feedback through a stock is fine
        let models = build(&[x_model(
            "main",
            vec![
                x_stock("s", "1", &["f"], &[]),
                x_flow("f", "s * rate"),
                x_aux("rate", "0.1"),
            ],
        )]);
        assert!(models.is_ok());
    }

    #[test]
    fn test_duplicate_variable() {
        let err = Model::new(&x_model(
            "main",
            vec![x_aux("Birth Rate", "1"), x_aux("birth_rate", "2")],
        ))
        .unwrap_err();
        assert_eq!(ErrorCode::DuplicateVariable, err.code);
    }

    #[test]
    fn test_module_deps() {
        let hares = x_model(
            "hares",
            vec![
                x_aux("area", "1"),
                x_stock("hares", "100", &[], &["deaths"]),
                x_flow("deaths", "hares * area * 0.01"),
            ],
        );
        let main = x_model(
            "main",
            vec![
                x_aux("area", "time"),
                x_module("hares", "hares", &[("area", "hares.area")]),
                x_flow("hunted", "hares.hares"),
                x_flow("deaths_seen", "hares.deaths"),
            ],
        );
        let models = build(&[hares, main]).unwrap();
        let main = &models["main"];

        assert_eq!(vec!["area"], deps_of(main, false, "hares"));
        // the module's stock is carried state in the flow phase, and
        // its initial value reads none of the module's inputs
        assert!(deps_of(main, false, "hunted").is_empty());
        assert!(deps_of(main, true, "hunted").is_empty());
        // deaths reads the connected area input, but not the module
        assert_eq!(vec!["area"], deps_of(main, false, "deaths_seen"));

        let var = main.lookup(&models, "main", "hares.deaths").unwrap();
        assert_eq!("deaths", var.ident());
        let var = models["hares"].lookup(&models, "main", ".area").unwrap();
        assert!(var.deps().is_empty());
        assert!(main.lookup(&models, "main", "hares.nope").is_none());
        assert!(main.lookup(&models, "main", "area.nope").is_none());

        assert_eq!(1, main.modules().count());
    }

    #[test]
    fn test_feedback_through_delay() {
        // the delay's stock breaks the loop between gap and delivered
        let models = build(&[
            stdlib::get("delay1").unwrap(),
            x_model(
                "main",
                vec![
                    x_aux("gap", "10 - delivered"),
                    x_aux("delivered", "DELAY1(gap, 2, 0)"),
                ],
            ),
        ])
        .unwrap();
        let main = &models["main"];
        let module = "$·delivered·0·delay1";
        assert!(!deps_of(main, false, "delivered").contains(&module.to_owned()));
        assert!(deps_of(main, false, module).contains(&"gap".to_owned()));
        assert!(!deps_of(main, true, "gap").contains(&module.to_owned()));

        // without an initial value the delay starts out at its input,
        // which is a cycle among the initial values
        let err = build(&[
            stdlib::get("delay1").unwrap(),
            x_model(
                "main",
                vec![
                    x_aux("gap", "10 - delivered"),
                    x_aux("delivered", "DELAY1(gap, 2)"),
                ],
            ),
        ])
        .unwrap_err();
        assert_eq!(ErrorCode::CircularDependency, err.code);
        assert!(err.get_details().unwrap().ends_with("(initial values)"));

        // reading an output that does depend on the input is still a cycle
        let err = build(&[
            stdlib::get("trend").unwrap(),
            x_model(
                "main",
                vec![
                    x_aux("gap", "10 - growth"),
                    x_aux("growth", "TREND(gap, 2, 0)"),
                ],
            ),
        ])
        .unwrap_err();
        assert_eq!(ErrorCode::CircularDependency, err.code);
    }

    #[test]
    fn test_root_references_inside_modules() {
        let inner = x_model("inner", vec![x_aux("y", ".rate * 2")]);
        let main = x_model(
            "main",
            vec![
                x_aux("rate", "time"),
                x_module("child", "inner", &[]),
                x_aux("seen", "child.y"),
            ],
        );
        let models = build(&[inner, main]).unwrap();
        let main = &models["main"];
        assert_eq!(vec!["rate"], deps_of(main, false, "child"));
        assert_eq!(vec!["rate"], deps_of(main, false, "seen"));
        assert_eq!(vec![".rate"], deps_of(&models["inner"], false, "y"));
    }

    #[test]
    fn test_implicit_modules() {
        let models = build(&[x_model(
            "main",
            vec![x_aux("input", "time"), x_aux("smoothed", "SMTH1(input, 2 * 3)")],
        )])
        .unwrap();
        let main = &models["main"];
        assert!(main.vars.contains_key("$·smoothed·0·smth1"));
        assert!(main.vars.contains_key("$·smoothed·0·arg1"));
        let expected: std::collections::HashSet<Ident> =
            vec!["$·smoothed·0·smth1.output".to_owned()].into_iter().collect();
        assert_eq!(&expected, main.vars["smoothed"].deps());

        let models = build(&[x_model("main", vec![x_aux("bad", "mystery(1)")])]).unwrap();
        assert!(!models["main"].vars["bad"].is_valid());
    }
}
