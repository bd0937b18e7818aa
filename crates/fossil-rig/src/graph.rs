//! Component graph: ownership, space references and generation order.
//!
//! Every mutation is validated against a scratch copy and committed only when
//! the result is consistent, so a failed call leaves the graph unchanged.

use std::collections::BTreeSet;

use crate::component::{Component, SpaceRef};
use crate::error::{RigError, RigResult};

/// Ordered set of components (insertion order is the display order).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentGraph {
    components: Vec<Component>,
}

impl ComponentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from stored components. References may point forward
    /// in the list; space candidates may name missing components.
    pub fn from_components(components: Vec<Component>) -> RigResult<Self> {
        let graph = Self { components };
        let mut seen = BTreeSet::new();
        for component in &graph.components {
            component.validate()?;
            if !seen.insert(component.name()) {
                return Err(RigError::validation(format!(
                    "duplicate component name '{}'",
                    component.name()
                )));
            }
        }
        for component in &graph.components {
            graph.check_space_refs(component, false)?;
        }
        graph.check_acyclic()?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name() == name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Component> {
        self.components.iter_mut().find(|c| c.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.components.iter().map(Component::name).collect()
    }

    fn index_of(&self, name: &str) -> RigResult<usize> {
        self.components
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| RigError::reference(format!("unknown component '{}'", name)))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Appends a component. Its space references and candidates must name
    /// existing components.
    pub fn add(&mut self, component: Component) -> RigResult<()> {
        component.validate()?;
        if self.contains(component.name()) {
            return Err(RigError::validation(format!(
                "duplicate component name '{}'",
                component.name()
            )));
        }
        let mut next = self.clone();
        next.components.push(component);
        let added = next.components.len() - 1;
        next.check_space_refs(&next.components[added], true)?;
        next.check_acyclic()?;
        tracing::debug!(component = %next.components[added].name(), "component added");
        *self = next;
        Ok(())
    }

    /// Removes a component. Fails while another component uses it as its
    /// parent or upright space; candidate references are left dangling.
    pub fn remove(&mut self, name: &str) -> RigResult<Component> {
        let index = self.index_of(name)?;
        let space = SpaceRef::component(name);
        if let Some(user) = self
            .components
            .iter()
            .find(|c| c.base.parent_space == space || c.base.upright_space == space)
        {
            return Err(RigError::reference(format!(
                "cannot remove '{}': it is a space of '{}'",
                name,
                user.name()
            )));
        }
        tracing::debug!(component = %name, "component removed");
        Ok(self.components.remove(index))
    }

    pub fn set_parent_space(&mut self, name: &str, space: SpaceRef) -> RigResult<()> {
        self.set_space_refs(name, |c| c.base.parent_space = space)
    }

    pub fn set_upright_space(&mut self, name: &str, space: SpaceRef) -> RigResult<()> {
        self.set_space_refs(name, |c| c.base.upright_space = space)
    }

    pub fn set_space_candidates(&mut self, name: &str, candidates: Vec<String>) -> RigResult<()> {
        self.set_space_refs(name, |c| c.base.space_candidates = candidates)
    }

    pub fn set_space_switch(&mut self, name: &str, enabled: bool) -> RigResult<()> {
        let index = self.index_of(name)?;
        self.components[index].base.space_switch_enabled = enabled;
        Ok(())
    }

    fn set_space_refs(&mut self, name: &str, apply: impl FnOnce(&mut Component)) -> RigResult<()> {
        let index = self.index_of(name)?;
        let mut next = self.clone();
        apply(&mut next.components[index]);
        next.check_space_refs(&next.components[index], true)?;
        next.check_acyclic()?;
        *self = next;
        Ok(())
    }

    /// Edits a component in place. The edit is validated like [`add`] and
    /// discarded on failure. Use [`rename`] to change the name.
    ///
    /// [`add`]: ComponentGraph::add
    /// [`rename`]: ComponentGraph::rename
    pub fn update(&mut self, name: &str, edit: impl FnOnce(&mut Component)) -> RigResult<()> {
        let index = self.index_of(name)?;
        let mut next = self.clone();
        edit(&mut next.components[index]);
        let edited = &next.components[index];
        if edited.name() != name {
            return Err(RigError::validation(format!(
                "component '{}' cannot be renamed through update",
                name
            )));
        }
        edited.validate()?;
        next.check_space_refs(edited, true)?;
        next.check_acyclic()?;
        *self = next;
        Ok(())
    }

    /// Renames a component and rewrites every reference to it.
    pub fn rename(&mut self, old: &str, new: &str) -> RigResult<()> {
        let index = self.index_of(old)?;
        if old == new {
            return Ok(());
        }
        if self.contains(new) {
            return Err(RigError::validation(format!(
                "duplicate component name '{}'",
                new
            )));
        }
        let mut next = self.clone();
        next.components[index].base.name = new.to_string();
        next.components[index].validate()?;
        let from = SpaceRef::component(old);
        for component in &mut next.components {
            let base = &mut component.base;
            if base.parent_space == from {
                base.parent_space = SpaceRef::component(new);
            }
            if base.upright_space == from {
                base.upright_space = SpaceRef::component(new);
            }
            for candidate in &mut base.space_candidates {
                if candidate == old {
                    *candidate = new.to_string();
                }
            }
        }
        tracing::debug!(from = %old, to = %new, "component renamed");
        *self = next;
        Ok(())
    }

    /// Moves a component one slot earlier in display order.
    pub fn move_up(&mut self, name: &str) -> RigResult<()> {
        let index = self.index_of(name)?;
        if index > 0 {
            self.components.swap(index, index - 1);
        }
        Ok(())
    }

    /// Moves a component one slot later in display order.
    pub fn move_down(&mut self, name: &str) -> RigResult<()> {
        let index = self.index_of(name)?;
        if index + 1 < self.components.len() {
            self.components.swap(index, index + 1);
        }
        Ok(())
    }

    /// Inserts a copy after the original, named `<name>_copy`, then
    /// `<name>_copy2`, `<name>_copy3`, ... Returns the new name. The copy is
    /// validated like [`add`](ComponentGraph::add).
    pub fn duplicate(&mut self, name: &str) -> RigResult<String> {
        let index = self.index_of(name)?;
        let mut copy_name = format!("{}_copy", name);
        let mut n = 2;
        while self.contains(&copy_name) {
            copy_name = format!("{}_copy{}", name, n);
            n += 1;
        }
        let mut copy = self.components[index].clone();
        copy.base.name = copy_name.clone();
        copy.validate()?;
        let mut next = self.clone();
        next.components.insert(index + 1, copy);
        next.check_space_refs(&next.components[index + 1], false)?;
        next.check_acyclic()?;
        tracing::debug!(from = %name, to = %copy_name, "component duplicated");
        *self = next;
        Ok(copy_name)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Components ordered so each comes after every component it depends on
    /// (parent space, upright space, existing candidates). Ties keep
    /// insertion order.
    pub fn topological_order(&self) -> RigResult<Vec<&Component>> {
        let mut emitted: BTreeSet<&str> = BTreeSet::new();
        let mut order = Vec::with_capacity(self.components.len());
        while order.len() < self.components.len() {
            let next = self.components.iter().find(|c| {
                !emitted.contains(c.name())
                    && self
                        .dependencies(c)
                        .iter()
                        .all(|dep| emitted.contains(dep))
            });
            match next {
                Some(component) => {
                    emitted.insert(component.name());
                    order.push(component);
                }
                None => {
                    let path = self.find_cycle().unwrap_or_default();
                    return Err(RigError::Cycle { path });
                }
            }
        }
        Ok(order)
    }

    /// Names of components whose spaces reference `name`.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.components
            .iter()
            .filter(|c| c.space_references().contains(&name))
            .map(Component::name)
            .collect()
    }

    /// Space references of `component` that exist in the graph.
    fn dependencies<'a>(&self, component: &'a Component) -> Vec<&'a str> {
        component
            .space_references()
            .into_iter()
            .filter(|name| self.contains(name))
            .collect()
    }

    fn check_space_refs(&self, component: &Component, candidates_must_exist: bool) -> RigResult<()> {
        let base = &component.base;
        for (label, space) in [("parent", &base.parent_space), ("upright", &base.upright_space)] {
            if let Some(name) = space.name() {
                if !self.contains(name) {
                    return Err(RigError::reference(format!(
                        "component '{}' {} space '{}' does not exist",
                        component.name(),
                        label,
                        name
                    )));
                }
            }
        }
        if candidates_must_exist {
            if let Some(missing) = base.space_candidates.iter().find(|c| !self.contains(c)) {
                return Err(RigError::reference(format!(
                    "component '{}' space candidate '{}' does not exist",
                    component.name(),
                    missing
                )));
            }
        }
        Ok(())
    }

    fn check_acyclic(&self) -> RigResult<()> {
        match self.find_cycle() {
            Some(path) => Err(RigError::Cycle { path }),
            None => Ok(()),
        }
    }

    /// Depth-first search for a cycle through space dependencies.
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Active,
            Done,
        }

        fn visit<'a>(
            graph: &'a ComponentGraph,
            index: usize,
            marks: &mut [Mark],
            stack: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            let component = &graph.components[index];
            marks[index] = Mark::Active;
            stack.push(component.name());
            for dep in graph.dependencies(component) {
                let Ok(dep_index) = graph.index_of(dep) else {
                    continue;
                };
                match marks[dep_index] {
                    Mark::Active => {
                        let start = stack.iter().position(|name| *name == dep).unwrap_or(0);
                        let mut path: Vec<String> =
                            stack[start..].iter().map(|s| s.to_string()).collect();
                        path.push(dep.to_string());
                        return Some(path);
                    }
                    Mark::Unvisited => {
                        if let Some(path) = visit(graph, dep_index, marks, stack) {
                            return Some(path);
                        }
                    }
                    Mark::Done => {}
                }
            }
            stack.pop();
            marks[index] = Mark::Done;
            None
        }

        let mut marks = vec![Mark::Unvisited; self.components.len()];
        let mut stack = Vec::new();
        for index in 0..self.components.len() {
            if marks[index] == Mark::Unvisited {
                if let Some(path) = visit(self, index, &mut marks, &mut stack) {
                    return Some(path);
                }
            }
        }
        None
    }
}
