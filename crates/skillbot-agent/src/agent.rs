//! The reasoning-acting loop.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use skillbot_config::AgentSettings;
use skillbot_skills::{SkillStore, augment};
use skillbot_tools::{ToolError, ToolRegistry};
use skillbot_types::{AuthContext, ConversationState, ModelReply, ToolCall, Turn};

use crate::error::AgentError;
use crate::model::ChatModel;

/// Successful result of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutcome {
    pub request_id: String,
    pub answer: String,
    /// Cycles consumed, including failed tool dispatches and model timeouts.
    pub steps: usize,
    pub skills_injected: Vec<String>,
}

enum LoopState {
    AwaitingModel,
    AwaitingTool(ToolCall),
    Done(String),
    Failed(AgentError),
}

/// Shared, immutable agent configuration.
///
/// Every [`ReactAgent::call`] builds its own conversation state, so one
/// instance serves any number of concurrent requests.
pub struct ReactAgent {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    skills: Arc<SkillStore>,
    settings: AgentSettings,
}

impl ReactAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        skills: Arc<SkillStore>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            model,
            tools,
            skills,
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn model(&self) -> &Arc<dyn ChatModel> {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn skills(&self) -> &Arc<SkillStore> {
        &self.skills
    }

    /// Run one invocation to a final answer or a terminal failure.
    pub async fn call(
        &self,
        message: &str,
        auth: &AuthContext,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "agent_call",
            agent = %self.settings.name,
            request_id = %request_id,
            principal = auth.principal().unwrap_or("anonymous"),
        );
        self.run(request_id, message, cancel).instrument(span).await
    }

    async fn run(
        &self,
        request_id: String,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        // one snapshot for the whole invocation, even if a reload lands mid-call
        let snapshot = self.skills.snapshot();
        let definitions = self.tools.definitions();
        let max_steps = self.settings.max_steps;
        let model_timeout = self.settings.model_timeout();

        let mut state = ConversationState::new(self.settings.system_prompt.as_deref(), message);
        let mut last_unknown: Option<String> = None;
        let mut current = LoopState::AwaitingModel;

        tracing::info!(model = self.model.id(), max_steps, "Agent call started");

        loop {
            current = match current {
                LoopState::AwaitingModel => {
                    if cancel.is_cancelled() {
                        LoopState::Failed(AgentError::Cancelled)
                    } else if state.step_count >= max_steps {
                        LoopState::Failed(AgentError::BudgetExceeded { max_steps })
                    } else {
                        for name in augment(&mut state, &snapshot) {
                            tracing::info!(skill = %name, "Skill injected");
                        }

                        let reply = tokio::select! {
                            _ = cancel.cancelled() => None,
                            res = tokio::time::timeout(
                                model_timeout,
                                self.model.respond(&state, &definitions),
                            ) => Some(res),
                        };
                        match reply {
                            None => LoopState::Failed(AgentError::Cancelled),
                            Some(Err(_elapsed)) => {
                                state.step_count += 1;
                                tracing::warn!(
                                    step = state.step_count,
                                    timeout_secs = model_timeout.as_secs(),
                                    "Model call timed out, retrying"
                                );
                                LoopState::AwaitingModel
                            }
                            Some(Ok(Err(e))) => {
                                LoopState::Failed(AgentError::ModelUnavailable(e.to_string()))
                            }
                            Some(Ok(Ok(ModelReply::FinalAnswer(answer)))) => {
                                state.push(Turn::assistant(answer.clone()));
                                LoopState::Done(answer)
                            }
                            Some(Ok(Ok(ModelReply::ToolCall(call)))) => LoopState::AwaitingTool(call),
                        }
                    }
                }

                LoopState::AwaitingTool(call) => {
                    if cancel.is_cancelled() {
                        LoopState::Failed(AgentError::Cancelled)
                    } else {
                        state.push(Turn::tool_request(call.clone()));
                        let result = self
                            .tools
                            .dispatch(&call.name, call.arguments.clone(), cancel)
                            .await;
                        state.step_count += 1;

                        match result {
                            Ok(observation) => {
                                last_unknown = None;
                                tracing::debug!(tool = %call.name, step = state.step_count, "Tool succeeded");
                                state.push(Turn::observation(&call.id, observation.text));
                                LoopState::AwaitingModel
                            }
                            Err(ToolError::Cancelled) => LoopState::Failed(AgentError::Cancelled),
                            Err(ToolError::Unknown(name))
                                if last_unknown.as_deref() == Some(name.as_str()) =>
                            {
                                LoopState::Failed(AgentError::RepeatedUnknownTool(name))
                            }
                            Err(e) => {
                                last_unknown = match &e {
                                    ToolError::Unknown(name) => Some(name.clone()),
                                    _ => None,
                                };
                                tracing::info!(
                                    tool = %call.name,
                                    kind = e.kind(),
                                    step = state.step_count,
                                    "Tool failed, returning error to model"
                                );
                                state.push(Turn::observation(&call.id, format!("Error: {e}")));
                                LoopState::AwaitingModel
                            }
                        }
                    }
                }

                LoopState::Done(answer) => {
                    tracing::info!(steps = state.step_count, "Agent call finished");
                    return Ok(AgentOutcome {
                        request_id,
                        answer,
                        steps: state.step_count,
                        skills_injected: state.skills_injected.into_iter().collect(),
                    });
                }

                LoopState::Failed(err) => {
                    tracing::warn!(steps = state.step_count, kind = err.kind(), error = %err, "Agent call failed");
                    return Err(err);
                }
            };
        }
    }
}
