use std::collections::BTreeMap;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::account::Account;
use crate::error::{ErrorRecord, PluginError, WorkflowError};
use crate::plugin::{ExecutionResult, PluginRegistry};
use crate::retry::RetryPolicy;
use crate::session::Session;
use crate::workflow::store::WorkflowStore;
use crate::workflow::types::{StepStatus, Workflow, WorkflowStatus};

/// Per-run knobs for [`Workflow::run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Retry policy threaded into every step. `None` runs each step once.
    pub retry: Option<RetryPolicy>,
    /// Checked at step boundaries and while a step is in flight.
    pub cancel: Option<CancellationToken>,
}

impl RunOptions {
    /// Retry every step under `retry`.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Pause the run when `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|t| t.is_cancelled()).unwrap_or(false)
    }
}

enum StepOutcome {
    Finished(Result<ExecutionResult, PluginError>),
    Cancelled,
}

impl Workflow {
    /// Execute steps in order from step 0 (`resume_from == None`, resets every step)
    /// or from `resume_from` (keeps earlier steps and results).
    ///
    /// State is saved to `store` after every step transition. A failed step stops the
    /// run with the cursor left on that step.
    #[tracing::instrument(
        name = "workflow.run",
        skip_all,
        fields(workflow = %self.name, run_id = tracing::field::Empty)
    )]
    pub async fn run(
        &mut self,
        registry: &mut PluginRegistry,
        session: &mut dyn Session,
        account: &Account,
        store: &dyn WorkflowStore,
        resume_from: Option<usize>,
        opts: &RunOptions,
    ) -> Result<BTreeMap<String, ExecutionResult>, WorkflowError> {
        match resume_from {
            None => self.reset(),
            Some(index) if index > self.steps.len() => {
                return Err(WorkflowError::InvalidResume {
                    index,
                    len: self.steps.len(),
                });
            }
            Some(index) => self.current_step = index,
        }

        let run_id = uuid::Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        self.status = WorkflowStatus::Running;
        self.persist(store);
        info!(
            workflow = %self.name,
            account = %account.account_id,
            from_step = self.current_step,
            steps = self.steps.len(),
            "workflow started"
        );

        while self.current_step < self.steps.len() {
            let index = self.current_step;

            if opts.is_cancelled() {
                return Err(self.pause(store));
            }

            let step = &mut self.steps[index];
            if let Some(condition) = &step.condition {
                if !condition.evaluate(&self.results) {
                    debug!(workflow = %self.name, step = index, condition = %condition, "condition not met, skipping");
                    step.status = StepStatus::Skipped;
                    step.end_time = Some(Utc::now());
                    self.current_step += 1;
                    self.persist(store);
                    continue;
                }
            }

            step.status = StepStatus::Running;
            step.start_time = Some(Utc::now());
            step.end_time = None;
            step.error = None;
            let plugin_name = step.plugin_name.clone();
            let config = step.config.clone();
            info!(workflow = %self.name, step = index, plugin = %plugin_name, "running step");

            let run = registry.run(&plugin_name, session, account, config, opts.retry.as_ref());
            let outcome = match &opts.cancel {
                Some(token) => tokio::select! {
                    r = run => StepOutcome::Finished(r),
                    _ = token.cancelled() => StepOutcome::Cancelled,
                },
                None => StepOutcome::Finished(run.await),
            };

            let result = match outcome {
                StepOutcome::Cancelled => {
                    // Abandoned mid-flight; the step runs again on resume.
                    let step = &mut self.steps[index];
                    step.status = StepStatus::Pending;
                    step.start_time = None;
                    return Err(self.pause(store));
                }
                StepOutcome::Finished(Ok(result)) if result.success => result,
                StepOutcome::Finished(Ok(result)) => {
                    let record = result.error.clone().unwrap_or_else(|| {
                        PluginError::execution(&plugin_name, "plugin reported failure without an error")
                            .to_record()
                    });
                    return Err(self.fail_step(index, Some(result), record, store));
                }
                StepOutcome::Finished(Err(err)) => {
                    return Err(self.fail_step(index, None, err.to_record(), store));
                }
            };

            for (dep, dep_result) in result.flatten_dependencies() {
                self.results.insert(dep.to_string(), dep_result.clone());
            }
            self.results.insert(plugin_name.clone(), result.clone());

            let step = &mut self.steps[index];
            step.result = Some(result);
            step.status = StepStatus::Completed;
            step.end_time = Some(Utc::now());
            self.current_step += 1;
            self.persist(store);
            info!(workflow = %self.name, step = index, plugin = %plugin_name, "step completed");
        }

        self.status = WorkflowStatus::Completed;
        self.persist(store);
        info!(workflow = %self.name, "workflow completed");
        Ok(self.results.clone())
    }

    fn fail_step(
        &mut self,
        index: usize,
        result: Option<ExecutionResult>,
        record: ErrorRecord,
        store: &dyn WorkflowStore,
    ) -> WorkflowError {
        let step = &mut self.steps[index];
        step.result = result;
        step.error = Some(record.clone());
        step.status = StepStatus::Failed;
        step.end_time = Some(Utc::now());
        let plugin = step.plugin_name.clone();

        self.status = WorkflowStatus::Failed;
        self.persist(store);
        warn!(
            workflow = %self.name,
            step = index,
            plugin = %plugin,
            kind = %record.kind,
            error = %record.message,
            "step failed; workflow resumable from this step"
        );

        WorkflowError::StepFailed {
            index,
            plugin,
            error: record,
        }
    }

    fn pause(&mut self, store: &dyn WorkflowStore) -> WorkflowError {
        self.status = WorkflowStatus::Paused;
        self.persist(store);
        info!(workflow = %self.name, step = self.current_step, "workflow paused");
        WorkflowError::Cancelled {
            step: self.current_step,
        }
    }

    /// Save failures never change the run's outcome.
    fn persist(&mut self, store: &dyn WorkflowStore) {
        self.touch();
        if let Err(e) = store.save(self) {
            error!(workflow = %self.name, error = %format!("{e:#}"), "failed to save workflow state");
        }
    }
}
