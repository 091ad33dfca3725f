//! Resource bundle — the set of artifacts a job deploys.
//!
//! Keyed by resource name. Adding an identical resource twice is a no-op;
//! adding a different resource under a taken name is a conflict. The
//! bundle is frozen once deployment starts.

use std::collections::BTreeMap;

use gridjob_core::{
    CodeLoader, DeploymentResource, JobError, JobResult, ResourceError, ResourceType,
};
use tracing::debug;

#[derive(Debug)]
pub struct ResourceBundle {
    job: String,
    resources: BTreeMap<String, DeploymentResource>,
    frozen: bool,
}

impl ResourceBundle {
    pub fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            resources: BTreeMap::new(),
            frozen: false,
        }
    }

    /// Add one resource. Returns `false` when an identical one was already present.
    pub fn add(&mut self, resource: DeploymentResource) -> JobResult<bool> {
        self.ensure_open()?;
        if !self.check(&resource)? {
            return Ok(false);
        }
        debug!(
            job = %self.job,
            name = resource.name(),
            kind = %resource.kind(),
            size = resource.size(),
            "resource added"
        );
        self.resources.insert(resource.name().to_string(), resource);
        Ok(true)
    }

    /// Add several resources, all or nothing. Returns how many were new.
    pub fn add_all(&mut self, resources: Vec<DeploymentResource>) -> JobResult<usize> {
        self.ensure_open()?;
        let mut fresh: BTreeMap<String, DeploymentResource> = BTreeMap::new();
        for res in resources {
            if !self.check(&res)? {
                continue;
            }
            match fresh.get(res.name()) {
                Some(prev) if !prev.same_content(&res) => {
                    return Err(conflict(res.name()));
                }
                Some(_) => {}
                None => {
                    fresh.insert(res.name().to_string(), res);
                }
            }
        }
        let added = fresh.len();
        self.resources.extend(fresh);
        debug!(job = %self.job, added, total = self.resources.len(), "resources added");
        Ok(added)
    }

    /// Load each code unit through `loader` and add it under its identifier.
    ///
    /// Every identifier is loaded before any is inserted.
    pub fn add_code(&mut self, loader: &dyn CodeLoader, identifiers: &[&str]) -> JobResult<usize> {
        self.ensure_open()?;
        let mut loaded = Vec::with_capacity(identifiers.len());
        for id in identifiers {
            let bytes = loader.load(id).map_err(|source| ResourceError::Unreadable {
                locator: (*id).to_string(),
                source,
            })?;
            loaded.push(DeploymentResource::inline(id, ResourceType::Code, bytes)?);
        }
        self.add_all(loaded)
    }

    /// Register a code unit whose bytes the caller already holds.
    pub fn add_code_bytes(&mut self, identifier: &str, bytes: Vec<u8>) -> JobResult<bool> {
        self.ensure_open()?;
        self.add(DeploymentResource::inline(identifier, ResourceType::Code, bytes)?)
    }

    /// Register a code unit read from `locator` under `name`.
    pub fn add_code_from(&mut self, locator: &str, name: &str) -> JobResult<bool> {
        self.add_located(locator, Some(name), ResourceType::Code)
    }

    pub fn add_archive(&mut self, locator: &str, name: Option<&str>) -> JobResult<bool> {
        self.add_located(locator, name, ResourceType::Archive)
    }

    pub fn add_data(&mut self, locator: &str, name: Option<&str>) -> JobResult<bool> {
        self.add_located(locator, name, ResourceType::Data)
    }

    fn add_located(
        &mut self,
        locator: &str,
        name: Option<&str>,
        kind: ResourceType,
    ) -> JobResult<bool> {
        self.ensure_open()?;
        self.add(DeploymentResource::from_locator(locator, name, kind)?)
    }

    /// Reject further additions.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Reopen the bundle after a deployment the cluster refused.
    pub fn thaw(&mut self) {
        self.frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Drop all resources. The bundle stays frozen if it was.
    pub fn clear(&mut self) {
        self.resources.clear();
    }

    pub fn get(&self, name: &str) -> Option<&DeploymentResource> {
        self.resources.get(name)
    }

    /// Snapshot of the bundle, ordered by name.
    pub fn to_vec(&self) -> Vec<DeploymentResource> {
        self.resources.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn ensure_open(&self) -> JobResult<()> {
        if self.frozen {
            return Err(JobError::BundleFrozen {
                job: self.job.clone(),
            });
        }
        Ok(())
    }

    /// `Ok(true)` if `resource` is new, `Ok(false)` if an identical one exists.
    fn check(&self, resource: &DeploymentResource) -> JobResult<bool> {
        match self.resources.get(resource.name()) {
            None => Ok(true),
            Some(existing) if existing.same_content(resource) => Ok(false),
            Some(_) => Err(conflict(resource.name())),
        }
    }
}

fn conflict(name: &str) -> JobError {
    ResourceError::Conflict {
        name: name.to_string(),
    }
    .into()
}
