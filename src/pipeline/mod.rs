pub mod cleanup;

use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, FixedOffset};

use crate::agent::prompt::AnalysisWindow;
use cleanup::finalize;

/// Something that can turn a candidate name into a usable handle and then
/// generate text with it.
#[allow(async_fn_in_trait)]
pub trait Backend {
    type Handle;

    /// Try to activate a candidate. Success means it is usable for the rest of the run.
    async fn activate(&self, candidate: &str) -> anyhow::Result<Self::Handle>;

    async fn generate(
        &self,
        handle: &Self::Handle,
        request: &GenerationRequest,
    ) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub preamble: String,
    pub prompt: String,
}

/// Values fixed at pipeline start and visible to every stage.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub source_data: String,
    pub topic: Option<String>,
    pub window: AnalysisWindow,
    pub timestamp: DateTime<FixedOffset>,
}

pub struct StageInput<'a> {
    /// Source data for the first stage, the previous stage's raw output after that.
    pub prior: &'a str,
    pub context: &'a StageContext,
    pub model: &'a str,
}

#[derive(Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    pub build: fn(&StageInput<'_>) -> GenerationRequest,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationFailure {
    pub candidate: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct ActiveBackend<H> {
    pub candidate: String,
    pub handle: H,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub model: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No candidate available: {}", describe_failures(.failures))]
    NoCandidateAvailable { failures: Vec<ActivationFailure> },
    #[error("Stage {index} ({name}) failed: {source:#}")]
    Stage {
        index: usize,
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// 1-based index of the failed stage, if a stage failed.
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            PipelineError::Stage { index, .. } => Some(*index),
            PipelineError::NoCandidateAvailable { .. } => None,
        }
    }
}

fn describe_failures(failures: &[ActivationFailure]) -> String {
    if failures.is_empty() {
        return "no candidates configured".to_string();
    }
    failures
        .iter()
        .map(|f| format!("{} ({})", f.candidate, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    candidates: Vec<String>,
    stages: Vec<Stage>,
    candidate_delay: Duration,
    call_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(candidates: Vec<String>, stages: Vec<Stage>) -> Self {
        Self {
            candidates,
            stages,
            candidate_delay: Duration::ZERO,
            call_timeout: None,
        }
    }

    pub fn with_candidate_delay(mut self, delay: Duration) -> Self {
        self.candidate_delay = delay;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub async fn run<B: Backend>(
        &self,
        backend: &B,
        context: &StageContext,
    ) -> Result<Artifact, PipelineError> {
        let active = self.select_backend(backend).await?;
        let raw = self.run_stages(backend, &active, context).await?;
        Ok(Artifact {
            model: active.candidate,
            text: finalize(&raw),
        })
    }

    /// Try candidates in order and keep the first one that activates.
    pub async fn select_backend<B: Backend>(
        &self,
        backend: &B,
    ) -> Result<ActiveBackend<B::Handle>, PipelineError> {
        let mut failures = Vec::new();

        for (i, candidate) in self.candidates.iter().enumerate() {
            if i > 0 && !self.candidate_delay.is_zero() {
                tokio::time::sleep(self.candidate_delay).await;
            }
            log::info!("activating model {}...", candidate);
            match self.bounded(backend.activate(candidate)).await {
                Ok(handle) => {
                    log::info!("using model {}", candidate);
                    return Ok(ActiveBackend {
                        candidate: candidate.clone(),
                        handle,
                    });
                }
                Err(err) => {
                    log::warn!("model {} unavailable: {:#}", candidate, err);
                    failures.push(ActivationFailure {
                        candidate: candidate.clone(),
                        reason: format!("{:#}", err),
                    });
                }
            }
        }

        Err(PipelineError::NoCandidateAvailable { failures })
    }

    /// Run every stage in order, feeding each output into the next stage.
    /// Returns the final stage's raw output.
    pub async fn run_stages<B: Backend>(
        &self,
        backend: &B,
        active: &ActiveBackend<B::Handle>,
        context: &StageContext,
    ) -> Result<String, PipelineError> {
        let mut output = context.source_data.clone();

        for (i, stage) in self.stages.iter().enumerate() {
            let index = i + 1;
            let request = (stage.build)(&StageInput {
                prior: &output,
                context,
                model: &active.candidate,
            });
            log::info!("running stage {} ({})", index, stage.name);
            let text = self
                .bounded(backend.generate(&active.handle, &request))
                .await
                .and_then(check_sentinel)
                .map_err(|source| PipelineError::Stage {
                    index,
                    name: stage.name,
                    source,
                })?;
            log::debug!("stage {} produced {} chars", index, text.len());
            output = text;
        }

        Ok(output)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| anyhow!("timed out after {:?}", limit))?,
            None => call.await,
        }
    }
}

/// Models occasionally answer with an error message instead of content.
fn check_sentinel(text: String) -> anyhow::Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("empty response"));
    }
    if trimmed.starts_with("Error:") {
        let line = trimmed.lines().next().unwrap_or(trimmed);
        return Err(anyhow!("response is an error message: {}", line));
    }
    Ok(text)
}
