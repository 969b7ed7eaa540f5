// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use crate::common::{canonicalize, Ident, Result};
use crate::model::{set_dependencies, Model};
use crate::sim::Specs;
use crate::variable::Variable;
use crate::{datamodel, import_err, model_err, stdlib};

#[derive(Clone, PartialEq, Debug)]
pub struct Project {
    pub name: String,
    pub sim_specs: datamodel::SimSpecs,
    // a module instantiating the root model, so the root is
    // simulated the same way as any nested model
    pub main: Variable,
    pub models: HashMap<Ident, Model>,
}

impl Project {
    pub fn new(x_project: &datamodel::Project) -> Result<Self> {
        let x_root = match x_project
            .get_model("main")
            .or_else(|| x_project.models.first())
        {
            Some(x_root) => x_root,
            None => return import_err!(BadModelName, "project has no models".to_owned()),
        };

        let sim_specs = match x_project
            .sim_specs
            .as_ref()
            .or_else(|| x_root.sim_specs.as_ref())
        {
            Some(sim_specs) => sim_specs.clone(),
            None => return import_err!(BadTime, "missing sim_specs".to_owned()),
        };
        // fail early on specs we could never simulate
        Specs::from_datamodel(&sim_specs)?;

        // the stdlib models come first, so a project model with the
        // same name is reported as a duplicate
        let mut x_models: Vec<datamodel::Model> = stdlib::MODEL_NAMES
            .iter()
            .filter_map(|name| stdlib::get(name))
            .collect();
        x_models.extend(x_project.models.iter().cloned());

        let mut models: HashMap<Ident, Model> = HashMap::new();
        for x_model in x_models.iter() {
            let model = Model::new(x_model)?;
            if models.contains_key(&model.ident) {
                return model_err!(BadModelName, format!("duplicate model {}", model.ident));
            }
            models.insert(model.ident.clone(), model);
        }

        for model in models.values() {
            for module in model.modules() {
                if let Variable::Module { ident, model_name, .. } = module {
                    if !models.contains_key(model_name) {
                        return model_err!(BadModelName, format!("{}.{}", model.ident, ident));
                    }
                }
            }
        }

        let root = canonicalize(&x_root.name);
        set_dependencies(&mut models, &root)?;

        let main = Variable::new(&datamodel::Variable::Module(datamodel::Module {
            ident: root.clone(),
            model_name: Some(root),
            documentation: "".to_owned(),
            units: None,
            references: vec![],
        }));

        Ok(Project {
            name: x_project.name.clone(),
            sim_specs,
            main,
            models,
        })
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.get(&canonicalize(name))
    }

    /// root_model_name is the name of the model `main` instantiates.
    pub fn root_model_name(&self) -> &str {
        match &self.main {
            Variable::Module { model_name, .. } => model_name.as_str(),
            _ => self.main.ident(),
        }
    }

    pub fn root_model(&self) -> Option<&Model> {
        self.models.get(self.root_model_name())
    }
}
