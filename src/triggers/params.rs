use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

impl TriggerParameter {
    pub fn required(name: impl Into<String>, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            description: description.to_string(),
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(text) => Some(text),
            ParamValue::Number(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(number) => Some(*number),
            ParamValue::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldIssue {
    #[error("`{0}` is required")]
    Missing(String),
    #[error("`{name}` must be a number (got `{value}`)")]
    NotANumber { name: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("invalid parameters: {}", join_issues(.0))]
    Invalid(Vec<FieldIssue>),
    #[error("command /{0} is not available")]
    UnknownCommand(String),
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Client-side parameter collection for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterForm {
    pub command: String,
    pub parameters: Vec<TriggerParameter>,
    values: BTreeMap<String, String>,
}

impl ParameterForm {
    pub fn new(command: impl Into<String>, parameters: Vec<TriggerParameter>) -> Self {
        Self {
            command: command.into(),
            parameters,
            values: BTreeMap::new(),
        }
    }

    /// Pre-fills parameters from `/cmd a b rest...`; the last parameter takes
    /// the remainder of the line.
    pub fn with_positional_args(mut self, args: &str) -> Self {
        let mut rest = args.trim();
        let count = self.parameters.len();
        for index in 0..count {
            if rest.is_empty() {
                break;
            }
            let name = self.parameters[index].name.clone();
            if index + 1 == count {
                self.values.insert(name, rest.to_string());
                break;
            }
            let (token, tail) = rest
                .split_once(char::is_whitespace)
                .unwrap_or((rest, ""));
            self.values.insert(name, token.to_string());
            rest = tail.trim_start();
        }
        self
    }

    /// Returns false for a name the command does not declare.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        if !self.parameters.iter().any(|p| p.name == name) {
            return false;
        }
        self.values.insert(name.to_string(), value.into());
        true
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_complete(&self) -> bool {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .all(|p| self.filled(&p.name).is_some())
    }

    /// Checks every field and reports all problems together.
    pub fn validate(&self) -> Result<BTreeMap<String, ParamValue>, FormError> {
        let mut issues = Vec::new();
        let mut values = BTreeMap::new();

        for parameter in &self.parameters {
            let Some(raw) = self.filled(&parameter.name) else {
                if parameter.required {
                    issues.push(FieldIssue::Missing(parameter.name.clone()));
                }
                continue;
            };

            match parameter.param_type {
                ParamType::String => {
                    values.insert(parameter.name.clone(), ParamValue::Text(raw.to_string()));
                }
                ParamType::Number => match raw.parse::<f64>() {
                    Ok(number) if number.is_finite() => {
                        values.insert(parameter.name.clone(), ParamValue::Number(number));
                    }
                    _ => issues.push(FieldIssue::NotANumber {
                        name: parameter.name.clone(),
                        value: raw.to_string(),
                    }),
                },
            }
        }

        if issues.is_empty() {
            Ok(values)
        } else {
            Err(FormError::Invalid(issues))
        }
    }

    /// The command line this form stands for, values in declaration order.
    pub fn command_line(&self) -> String {
        let mut line = format!("/{}", self.command);
        for parameter in &self.parameters {
            if let Some(value) = self.filled(&parameter.name) {
                line.push(' ');
                line.push_str(value);
            }
        }
        line
    }

    fn filled(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> ParameterForm {
        ParameterForm::new(
            "chart",
            vec![
                TriggerParameter::required("metric", ParamType::String, "what to plot"),
                TriggerParameter::required("days", ParamType::Number, "window"),
                TriggerParameter::optional("note", ParamType::String, "free text"),
            ],
        )
    }

    #[test]
    fn test_positional_args_fill_in_order_with_remainder_last() {
        let form = form().with_positional_args("  latency 7 slow after deploy ");
        assert_eq!(form.value("metric"), Some("latency"));
        assert_eq!(form.value("days"), Some("7"));
        assert_eq!(form.value("note"), Some("slow after deploy"));
        assert!(form.is_complete());
    }

    #[test]
    fn test_command_line_keeps_collected_values() {
        let mut form = form();
        form.set("days", "7");
        form.set("metric", "latency");
        assert_eq!(form.command_line(), "/chart latency 7");
        form.set("note", "  ");
        assert_eq!(form.command_line(), "/chart latency 7");
    }

    #[test]
    fn test_validate_reports_every_issue() {
        let mut form = form();
        form.set("days", "a week");
        let error = form.validate().unwrap_err();
        assert_eq!(
            error,
            FormError::Invalid(vec![
                FieldIssue::Missing("metric".to_string()),
                FieldIssue::NotANumber {
                    name: "days".to_string(),
                    value: "a week".to_string(),
                },
            ])
        );
        assert!(error.to_string().contains("`metric` is required"));
    }

    #[test]
    fn test_whitespace_only_values_count_as_missing() {
        let mut form = form();
        form.set("metric", "   ");
        form.set("days", "3");
        assert!(!form.is_complete());
        form.set("metric", "errors");
        let values = form.validate().unwrap();
        assert_eq!(values["days"].as_f64(), Some(3.0));
        assert_eq!(values["metric"].as_str(), Some("errors"));
        assert!(!values.contains_key("note"));
    }

    #[test]
    fn test_set_rejects_undeclared_names() {
        let mut form = form();
        assert!(!form.set("colour", "red"));
        assert_eq!(form.value("colour"), None);
    }
}
