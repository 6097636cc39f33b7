use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::account::Account;
use crate::error::WorkflowError;
use crate::plugin::{ExecutionResult, PluginConfig, PluginRegistry};
use crate::session::Session;
use crate::workflow::condition::StepCondition;
use crate::workflow::engine::RunOptions;
use crate::workflow::store::{validate_workflow_name, WorkflowStore};
use crate::workflow::types::{Workflow, WorkflowSummary};

/// Named workflows over one storage root.
pub struct WorkflowManager {
    store: Arc<dyn WorkflowStore>,
    workflows: BTreeMap<String, Workflow>,
}

impl WorkflowManager {
    /// Load every workflow the store knows about. Unreadable records are skipped.
    pub fn open(store: Arc<dyn WorkflowStore>) -> anyhow::Result<Self> {
        let mut workflows = BTreeMap::new();
        for name in store.list_names()? {
            match store.load(&name) {
                Ok(Some(wf)) => {
                    workflows.insert(name, wf);
                }
                Ok(None) => {}
                Err(e) => warn!(workflow = %name, error = %format!("{e:#}"), "skipping unreadable workflow"),
            }
        }
        info!(count = workflows.len(), "loaded workflows");
        Ok(Self { store, workflows })
    }

    /// Backing store shared with every workflow this manager runs.
    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Create an empty workflow and save it. Fails with `AlreadyExists` if the
    /// name is taken; the existing workflow is left untouched.
    pub fn create(&mut self, name: &str, description: &str) -> Result<&Workflow, WorkflowError> {
        validate_workflow_name(name).map_err(|_| WorkflowError::InvalidName(name.to_string()))?;
        if self.workflows.contains_key(name) {
            return Err(WorkflowError::AlreadyExists(name.to_string()));
        }

        let workflow = Workflow::new(name, description);
        self.store.save(&workflow)?;
        info!(workflow = name, "created workflow");
        Ok(self.workflows.entry(name.to_string()).or_insert(workflow))
    }

    /// Loaded workflow by name.
    pub fn get(&self, name: &str) -> Option<&Workflow> {
        self.workflows.get(name)
    }

    /// Append a step and persist; returns the new step's index.
    pub fn add_step(
        &mut self,
        name: &str,
        plugin_name: &str,
        config: Option<PluginConfig>,
        condition: Option<StepCondition>,
    ) -> Result<usize, WorkflowError> {
        let workflow = self
            .workflows
            .get_mut(name)
            .ok_or_else(|| WorkflowError::NotFound(name.to_string()))?;
        let index = workflow.add_step(plugin_name, config, condition);
        self.store.save(workflow)?;
        Ok(index)
    }

    /// Summaries of every workflow, ordered by name.
    pub fn list(&self) -> Vec<WorkflowSummary> {
        self.workflows.values().map(Workflow::summary).collect()
    }

    /// `Ok(false)` when no such workflow exists.
    pub fn delete(&mut self, name: &str) -> Result<bool, WorkflowError> {
        let known = self.workflows.remove(name).is_some();
        let stored = match validate_workflow_name(name) {
            Ok(()) => self.store.delete(name)?,
            Err(_) => false,
        };
        if known || stored {
            info!(workflow = name, "deleted workflow");
        }
        Ok(known || stored)
    }

    /// Run `name`; with `resume` it continues from the persisted cursor,
    /// otherwise it starts over from step 0.
    pub async fn run(
        &mut self,
        name: &str,
        registry: &mut PluginRegistry,
        session: &mut dyn Session,
        account: &Account,
        resume: bool,
        opts: &RunOptions,
    ) -> Result<BTreeMap<String, ExecutionResult>, WorkflowError> {
        let workflow = self
            .workflows
            .get_mut(name)
            .ok_or_else(|| WorkflowError::NotFound(name.to_string()))?;
        let resume_from = resume.then_some(workflow.current_step);
        workflow
            .run(registry, session, account, self.store.as_ref(), resume_from, opts)
            .await
    }
}
