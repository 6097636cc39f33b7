#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use famp_core::api::{
    Account, Cookie, ElementHandle, ErrorKind, Plugin, PluginConfig, PluginDependency,
    PluginError, PluginMetadata, PluginOutput, Selector, Session, SessionError, Workflow,
    WorkflowStore,
};
use serde_json::Value;

/// Shared, ordered record of plugin bodies that ran.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, name: &str) {
        self.0.lock().unwrap().push(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|n| *n == name).count()
    }
}

pub fn output(v: Value) -> PluginOutput {
    v.as_object().cloned().expect("output must be a JSON object")
}

pub fn account() -> Account {
    Account::new("acct1", "acct1@example.com").with_password("secret")
}

/// Plugin whose responses are scripted up front. Once the script runs out it keeps
/// returning the last response.
pub struct ScriptedPlugin {
    name: String,
    requires: Vec<PluginDependency>,
    responses: Mutex<VecDeque<Result<PluginOutput, PluginError>>>,
    last: Mutex<Result<PluginOutput, PluginError>>,
    log: CallLog,
    seen_configs: Mutex<Vec<PluginConfig>>,
    delay: Duration,
}

impl ScriptedPlugin {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            requires: Vec::new(),
            responses: Mutex::new(VecDeque::new()),
            last: Mutex::new(Ok(PluginOutput::new())),
            log: log.clone(),
            seen_configs: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn requires(mut self, dep: PluginDependency) -> Self {
        self.requires.push(dep);
        self
    }

    /// Sleep this long inside every run, after the call is logged.
    pub fn sleeps(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn returns(self, v: Value) -> Self {
        self.then(Ok(output(v)))
    }

    pub fn fails(self, kind: ErrorKind, message: &str) -> Self {
        let err = PluginError::new(kind, self.name.clone(), message);
        self.then(Err(err))
    }

    pub fn then(self, response: Result<PluginOutput, PluginError>) -> Self {
        *self.last.lock().unwrap() = response.clone();
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn seen_configs(&self) -> Vec<PluginConfig> {
        self.seen_configs.lock().unwrap().clone()
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Plugin for ScriptedPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(&self.name, "1.0.0").with_description("scripted test plugin")
    }

    fn requires(&self) -> Vec<PluginDependency> {
        self.requires.clone()
    }

    fn validate_config(&self, config: &PluginConfig) -> Result<(), PluginError> {
        if config.contains_key("invalid") {
            return Err(PluginError::config(&self.name, "'invalid' is not an option"));
        }
        Ok(())
    }

    async fn run(
        &self,
        _session: &mut dyn Session,
        _account: &Account,
        config: &PluginConfig,
    ) -> Result<PluginOutput, PluginError> {
        self.log.push(&self.name);
        self.seen_configs.lock().unwrap().push(config.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(r) => r,
            None => self.last.lock().unwrap().clone(),
        }
    }
}

/// Session that does nothing; for plugins that never touch it.
#[derive(Default)]
pub struct NullSession {
    url: String,
}

#[async_trait]
impl Session for NullSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.url = url.to_string();
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, SessionError> {
        Ok(self.url.clone())
    }

    async fn wait_for(
        &mut self,
        _selector: &Selector,
        _timeout: Duration,
    ) -> Result<Option<ElementHandle>, SessionError> {
        Ok(None)
    }

    async fn select_all(&mut self, _selector: &Selector) -> Result<Vec<ElementHandle>, SessionError> {
        Ok(Vec::new())
    }

    async fn text(&mut self, element: &ElementHandle) -> Result<String, SessionError> {
        Err(SessionError::ElementNotFound(element.0.clone()))
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        _name: &str,
    ) -> Result<Option<String>, SessionError> {
        Err(SessionError::ElementNotFound(element.0.clone()))
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError> {
        Err(SessionError::ElementNotFound(element.0.clone()))
    }

    async fn send_keys(&mut self, element: &ElementHandle, _text: &str) -> Result<(), SessionError> {
        Err(SessionError::ElementNotFound(element.0.clone()))
    }

    async fn evaluate(&mut self, _script: &str) -> Result<Value, SessionError> {
        Ok(Value::Null)
    }

    async fn cookies(&mut self) -> Result<Vec<Cookie>, SessionError> {
        Ok(Vec::new())
    }

    async fn set_cookies(&mut self, _cookies: Vec<Cookie>) -> Result<(), SessionError> {
        Ok(())
    }

    async fn clear_cookies(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// In-memory store that remembers every save.
#[derive(Default)]
pub struct RecordingStore {
    records: Mutex<BTreeMap<String, Workflow>>,
    saves: Mutex<Vec<Workflow>>,
}

impl RecordingStore {
    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }

    pub fn saves(&self) -> Vec<Workflow> {
        self.saves.lock().unwrap().clone()
    }
}

impl WorkflowStore for RecordingStore {
    fn save(&self, workflow: &Workflow) -> anyhow::Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(workflow.name.clone(), workflow.clone());
        self.saves.lock().unwrap().push(workflow.clone());
        Ok(())
    }

    fn load(&self, name: &str) -> anyhow::Result<Option<Workflow>> {
        Ok(self.records.lock().unwrap().get(name).cloned())
    }

    fn delete(&self, name: &str) -> anyhow::Result<bool> {
        Ok(self.records.lock().unwrap().remove(name).is_some())
    }

    fn list_names(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.records.lock().unwrap().keys().cloned().collect())
    }
}

/// Store whose writes always fail.
pub struct FailingStore;

impl WorkflowStore for FailingStore {
    fn save(&self, _workflow: &Workflow) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }

    fn load(&self, _name: &str) -> anyhow::Result<Option<Workflow>> {
        Ok(None)
    }

    fn delete(&self, _name: &str) -> anyhow::Result<bool> {
        Ok(false)
    }

    fn list_names(&self) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}
