//! Slash-command triggers.
//!
//! Input starting with `/` is resolved against a registry before it reaches
//! the conversation. Anything that does not resolve is sent as ordinary chat.

mod builtin;
mod params;

pub use builtin::builtin_registry;
pub use params::{FieldIssue, FormError, ParamType, ParamValue, ParameterForm, TriggerParameter};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResult {
    pub handled: bool,
    /// Stop the normal send entirely.
    #[serde(default)]
    pub prevent_default: bool,
    /// Synthetic assistant reply, shown without a network round trip.
    #[serde(default)]
    pub response: Option<String>,
    /// Send the message through the failure-simulation path.
    #[serde(default)]
    pub simulate_failure: bool,
    #[serde(default)]
    pub clear_history: bool,
    #[serde(default)]
    pub notice: Option<String>,
}

impl TriggerResult {
    pub fn respond(response: impl Into<String>) -> Self {
        Self {
            handled: true,
            prevent_default: true,
            response: Some(response.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSummary {
    pub command: String,
    pub description: String,
}

/// What a handler gets to see.
#[derive(Debug, Clone, Default)]
pub struct TriggerContext {
    pub command: String,
    pub args: String,
    pub params: BTreeMap<String, ParamValue>,
    pub dev_mode: bool,
    pub user_role: Option<String>,
    pub commands: Vec<CommandSummary>,
}

#[async_trait]
pub trait TriggerHandler: Send + Sync {
    async fn execute(&self, context: &TriggerContext) -> Result<TriggerResult>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> TriggerHandler for FnHandler<F>
where
    F: Fn(&TriggerContext) -> Result<TriggerResult> + Send + Sync,
{
    async fn execute(&self, context: &TriggerContext) -> Result<TriggerResult> {
        (self.0)(context)
    }
}

#[derive(Clone)]
pub struct Trigger {
    pub command: String,
    pub description: String,
    pub dev_only: bool,
    pub required_role: Option<String>,
    pub parameters: Vec<TriggerParameter>,
    handler: Arc<dyn TriggerHandler>,
}

impl Trigger {
    pub fn new(
        command: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn TriggerHandler>,
    ) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
            dev_only: false,
            required_role: None,
            parameters: Vec::new(),
            handler,
        }
    }

    /// Trigger backed by a synchronous closure.
    pub fn from_fn<F>(command: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(&TriggerContext) -> Result<TriggerResult> + Send + Sync + 'static,
    {
        Self::new(command, description, Arc::new(FnHandler(f)))
    }

    pub fn dev_only(mut self) -> Self {
        self.dev_only = true;
        self
    }

    pub fn requires_role(mut self, role: impl Into<String>) -> Self {
        self.required_role = Some(role.into());
        self
    }

    pub fn with_parameter(mut self, parameter: TriggerParameter) -> Self {
        self.parameters.push(parameter);
        self
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("command", &self.command)
            .field("dev_only", &self.dev_only)
            .field("required_role", &self.required_role)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Outcome of looking at one line of user input.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Not a registered command; send as chat.
    NotCommand,
    /// Required parameters are missing; collect them before executing.
    CollectParameters(ParameterForm),
    Executed(TriggerResult),
}

pub struct TriggerRegistry {
    triggers: Vec<Trigger>,
    dev_mode: bool,
    user_role: Option<String>,
}

impl TriggerRegistry {
    pub fn new(dev_mode: bool, user_role: Option<String>) -> Self {
        Self {
            triggers: Vec::new(),
            dev_mode,
            user_role,
        }
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Dev-only triggers are not registered at all outside development builds.
    pub fn register(&mut self, trigger: Trigger) {
        if trigger.dev_only && !self.dev_mode {
            tracing::debug!(command = %trigger.command, "skipping dev-only trigger");
            return;
        }
        self.triggers
            .retain(|existing| !existing.command.eq_ignore_ascii_case(&trigger.command));
        self.triggers.push(trigger);
    }

    /// Case-insensitive exact lookup of `/<command> [args]`.
    pub fn resolve<'a>(&self, input: &'a str) -> Option<(&Trigger, &'a str)> {
        let body = input.trim().strip_prefix('/')?;
        let (name, args) = body
            .split_once(char::is_whitespace)
            .unwrap_or((body, ""));
        if name.is_empty() {
            return None;
        }

        let trigger = self
            .triggers
            .iter()
            .find(|trigger| trigger.command.eq_ignore_ascii_case(name))?;

        if trigger.dev_only && !self.dev_mode {
            return None;
        }
        if let Some(role) = &trigger.required_role {
            if self.user_role.as_deref() != Some(role.as_str()) {
                tracing::debug!(command = %trigger.command, "trigger requires role {role}");
                return None;
            }
        }
        Some((trigger, args.trim()))
    }

    /// Commands listed by `/help`.
    pub fn summaries(&self) -> Vec<CommandSummary> {
        self.triggers
            .iter()
            .filter(|trigger| !trigger.dev_only)
            .map(|trigger| CommandSummary {
                command: trigger.command.clone(),
                description: trigger.description.clone(),
            })
            .collect()
    }

    pub async fn dispatch(&self, input: &str) -> Dispatch {
        let Some((trigger, args)) = self.resolve(input) else {
            return Dispatch::NotCommand;
        };

        let form = ParameterForm::new(trigger.command.clone(), trigger.parameters.clone())
            .with_positional_args(args);
        if !form.is_complete() {
            return Dispatch::CollectParameters(form);
        }

        match form.validate() {
            Ok(params) => Dispatch::Executed(self.run(trigger, args, params).await),
            Err(_) => Dispatch::CollectParameters(form),
        }
    }

    /// `None` means "not a command, send normally".
    pub async fn execute_trigger(&self, message: &str) -> Option<TriggerResult> {
        match self.dispatch(message).await {
            Dispatch::NotCommand => None,
            Dispatch::Executed(result) => Some(result),
            Dispatch::CollectParameters(_) => Some(TriggerResult {
                handled: true,
                prevent_default: true,
                ..TriggerResult::default()
            }),
        }
    }

    /// Validates a collected form and runs its command. Never partially submits.
    pub async fn submit_form(&self, form: &ParameterForm) -> Result<TriggerResult, FormError> {
        let params = form.validate()?;
        let trigger = self
            .resolve(&format!("/{}", form.command))
            .map(|(trigger, _)| trigger)
            .ok_or_else(|| FormError::UnknownCommand(form.command.clone()))?;
        Ok(self.run(trigger, "", params).await)
    }

    async fn run(
        &self,
        trigger: &Trigger,
        args: &str,
        params: BTreeMap<String, ParamValue>,
    ) -> TriggerResult {
        let context = TriggerContext {
            command: trigger.command.clone(),
            args: args.to_string(),
            params,
            dev_mode: self.dev_mode,
            user_role: self.user_role.clone(),
            commands: self.summaries(),
        };

        match trigger.handler.execute(&context).await {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(command = %trigger.command, error = %error, "trigger failed");
                TriggerResult::respond(format!("/{} failed: {error}", trigger.command))
            }
        }
    }
}
