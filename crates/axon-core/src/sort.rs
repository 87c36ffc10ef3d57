//! Topological ordering of components by their declared dependencies

use std::collections::{HashMap, HashSet};

use crate::component::Component;
use crate::error::ConfigError;

/// Sort components so that every component comes after everything it depends on.
///
/// Traversal is depth-first from each not yet visited component in input order,
/// following `depends_on` in declaration order, and emits components post-order.
/// Independent components therefore keep their relative input order.
pub fn sort_components(components: &[Component]) -> Result<Vec<Component>, ConfigError> {
    let mut by_name: HashMap<&str, &Component> = HashMap::with_capacity(components.len());
    for component in components {
        if by_name.insert(component.name.as_str(), component).is_some() {
            return Err(ConfigError::DuplicateName(component.name.clone()));
        }
    }

    for component in components {
        for dep in &component.depends_on {
            if !by_name.contains_key(dep.as_str()) {
                return Err(ConfigError::MissingDependency {
                    path: format!("components.{}", component.name),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut sorter = Sorter {
        by_name,
        visited: HashSet::with_capacity(components.len()),
        sorted: Vec::with_capacity(components.len()),
    };
    let mut path = Vec::new();
    for component in components {
        if !sorter.visited.contains(component.name.as_str()) {
            sorter.visit(&component.name, &mut path)?;
        }
    }

    Ok(sorter.sorted)
}

struct Sorter<'a> {
    by_name: HashMap<&'a str, &'a Component>,
    visited: HashSet<&'a str>,
    sorted: Vec<Component>,
}

impl<'a> Sorter<'a> {
    fn visit(&mut self, name: &str, path: &mut Vec<&'a str>) -> Result<(), ConfigError> {
        if let Some(idx) = path.iter().position(|p| *p == name) {
            return Err(ConfigError::CircularDependency(
                path[idx..].iter().map(|p| p.to_string()).collect(),
            ));
        }

        // Names were checked for existence before traversal started.
        let Some(&component) = self.by_name.get(name) else {
            return Ok(());
        };
        if !self.visited.insert(component.name.as_str()) {
            return Ok(());
        }

        path.push(component.name.as_str());
        for dep in &component.depends_on {
            self.visit(dep, path)?;
        }
        path.pop();

        self.sorted.push(component.clone());
        Ok(())
    }
}
