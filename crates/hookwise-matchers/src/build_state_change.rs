//! Recognises CI build state-change notifications.
//!
//! The build is expected to carry the tracking id in an environment variable
//! set when the build was started on behalf of a command.

use async_trait::async_trait;
use hookwise_core::ExecutionContext;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::matcher::{EventDelivery, Matcher, MatcherError, MatcherVerdict};

pub const ENTRY_ID_VARIABLE: &str = "HOOKWISE_ENTRY_ID";
const COMMAND_VARIABLE: &str = "HOOKWISE_COMMAND";
const THREAD_VARIABLE: &str = "HOOKWISE_THREAD";
const BUILD_STATE_DETAIL_TYPE: &str = "CodeBuild Build State Change";

#[derive(Debug, Deserialize)]
struct BuildStateChangeEvent {
    detail: BuildStateDetail,
}

#[derive(Debug, Deserialize)]
struct BuildStateDetail {
    #[serde(rename = "build-status", default)]
    build_status: Option<String>,
    #[serde(rename = "project-name", default)]
    project_name: Option<String>,
    #[serde(rename = "additional-information", default)]
    additional_information: Option<AdditionalInformation>,
}

#[derive(Debug, Deserialize)]
struct AdditionalInformation {
    #[serde(default)]
    environment: Option<BuildEnvironment>,
}

#[derive(Debug, Deserialize)]
struct BuildEnvironment {
    #[serde(rename = "environment-variables", default)]
    environment_variables: Vec<EnvironmentVariable>,
}

#[derive(Debug, Deserialize)]
struct EnvironmentVariable {
    name: String,
    #[serde(default)]
    value: String,
}

impl BuildStateDetail {
    fn variable(&self, name: &str) -> Option<&str> {
        self.additional_information
            .as_ref()?
            .environment
            .as_ref()?
            .environment_variables
            .iter()
            .find(|variable| variable.name == name)
            .map(|variable| variable.value.as_str())
            .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildStateChangeMatcher;

#[async_trait]
impl Matcher for BuildStateChangeMatcher {
    fn name(&self) -> &'static str {
        "build-state-change"
    }

    async fn handle(
        &self,
        _context: &ExecutionContext,
        event: &Value,
        _delivery: &EventDelivery,
    ) -> Result<MatcherVerdict, MatcherError> {
        if event.get("detail-type").and_then(Value::as_str) != Some(BUILD_STATE_DETAIL_TYPE) {
            return Ok(MatcherVerdict::not_applicable(
                "detail-type is not a build state change",
            ));
        }
        let parsed: BuildStateChangeEvent = serde_json::from_value(event.clone())?;
        let detail = parsed.detail;
        let Some(entry_id) = detail.variable(ENTRY_ID_VARIABLE) else {
            return Ok(MatcherVerdict::not_applicable(format!(
                "build carries no {ENTRY_ID_VARIABLE} variable"
            )));
        };

        let mut candidate = Map::new();
        candidate.insert("id".to_string(), Value::from(entry_id));
        if let Some(command) = detail.variable(COMMAND_VARIABLE) {
            candidate.insert("commandName".to_string(), Value::from(command));
        }
        if let Some(thread) = detail.variable(THREAD_VARIABLE) {
            candidate.insert("threadRef".to_string(), Value::from(thread));
        }
        if let Some(build_status) = detail.build_status.as_deref() {
            candidate.insert("buildStatus".to_string(), Value::from(build_status));
        }
        if let Some(project_name) = detail.project_name.as_deref() {
            candidate.insert("projectName".to_string(), Value::from(project_name));
        }
        Ok(MatcherVerdict::Matched(Value::Object(candidate)))
    }
}
