//! Open rigs and the active-rig selection.

use std::sync::{Arc, Mutex};

use super::Rig;
use crate::error::{RigError, RigResult};
use crate::scene::Scene;

/// The rigs open in a session, in opening order.
#[derive(Debug, Default)]
pub struct RigRegistry {
    rigs: Vec<Rig>,
    active: Option<usize>,
}

impl RigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an empty rig and makes it active.
    pub fn create(&mut self, name: &str) -> RigResult<&mut Rig> {
        self.insert(Rig::new(name))
    }

    /// Adds an existing rig (e.g. one just loaded) and makes it active.
    pub fn insert(&mut self, rig: Rig) -> RigResult<&mut Rig> {
        if rig.name().is_empty() {
            return Err(RigError::validation("rig name must not be empty"));
        }
        if self.position(rig.name()).is_some() {
            return Err(RigError::validation(format!(
                "a rig named '{}' is already open",
                rig.name()
            )));
        }
        tracing::debug!(rig = %rig.name(), "rig opened");
        self.rigs.push(rig);
        let index = self.rigs.len() - 1;
        self.active = Some(index);
        Ok(&mut self.rigs[index])
    }

    pub fn switch_active(&mut self, name: &str) -> RigResult<()> {
        let index = self
            .position(name)
            .ok_or_else(|| RigError::reference(format!("no open rig named '{}'", name)))?;
        self.active = Some(index);
        Ok(())
    }

    /// Removes the rig's generated nodes from `scene` and closes it. The
    /// previous rig in opening order becomes active when the closed one was.
    pub fn close(&mut self, name: &str, scene: &mut dyn Scene) -> RigResult<Rig> {
        let index = self
            .position(name)
            .ok_or_else(|| RigError::reference(format!("no open rig named '{}'", name)))?;
        self.rigs[index].remove(scene)?;
        let rig = self.rigs.remove(index);
        self.active = match self.active {
            _ if self.rigs.is_empty() => None,
            Some(active) if active == index => Some(index.saturating_sub(1)),
            Some(active) if active > index => Some(active - 1),
            other => other,
        };
        Ok(rig)
    }

    pub fn active(&self) -> Option<&Rig> {
        self.active.map(|index| &self.rigs[index])
    }

    pub fn active_mut(&mut self) -> Option<&mut Rig> {
        self.active.map(|index| &mut self.rigs[index])
    }

    pub fn get(&self, name: &str) -> Option<&Rig> {
        self.rigs.iter().find(|rig| rig.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Rig> {
        self.rigs.iter_mut().find(|rig| rig.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.rigs.iter().map(Rig::name).collect()
    }

    pub fn len(&self) -> usize {
        self.rigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rigs.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.rigs.iter().position(|rig| rig.name() == name)
    }
}

/// A scene together with the rigs operating on it.
#[derive(Debug)]
pub struct Workspace<S: Scene> {
    pub scene: S,
    pub registry: RigRegistry,
}

/// Workspace shared between threads. Lock it for the duration of one
/// operation.
pub type SharedWorkspace<S> = Arc<Mutex<Workspace<S>>>;

impl<S: Scene> Workspace<S> {
    pub fn new(scene: S) -> Self {
        Self {
            scene,
            registry: RigRegistry::new(),
        }
    }

    /// Runs `f` on the active rig.
    pub fn with_active<T>(
        &mut self,
        f: impl FnOnce(&mut Rig, &mut S) -> RigResult<T>,
    ) -> RigResult<T> {
        let rig = self
            .registry
            .active_mut()
            .ok_or_else(|| RigError::reference("no active rig"))?;
        f(rig, &mut self.scene)
    }

    pub fn shared(self) -> SharedWorkspace<S> {
        Arc::new(Mutex::new(self))
    }
}
