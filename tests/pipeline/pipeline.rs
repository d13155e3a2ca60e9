#[path = "../common/mod.rs"]
mod common;

use common::{candidates, context, FakeBackend};
use marketpost::agent::prompt::default_stages;
use marketpost::pipeline::cleanup::finalize;
use marketpost::pipeline::{
    Backend, GenerationRequest, Pipeline, PipelineError, Stage, StageInput,
};
use std::time::Duration;
use tokio::time::Instant;

fn echo_stage(input: &StageInput<'_>) -> GenerationRequest {
    GenerationRequest {
        preamble: "echo".to_string(),
        prompt: format!("[{}] {}", input.model, input.prior),
    }
}

#[tokio::test]
async fn selects_first_working_candidate_and_stops_trying() {
    let backend = FakeBackend::new(&["c", "d"], vec![]);
    let pipeline = Pipeline::new(candidates(&["a", "b", "c", "d"]), default_stages());

    let active = pipeline
        .select_backend(&backend)
        .await
        .expect("Expected a backend");

    assert_eq!(active.candidate, "c");
    assert_eq!(active.handle, "handle-c");
    assert_eq!(backend.activations(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn empty_candidate_list_fails_without_trying() {
    let backend = FakeBackend::new(&["a"], vec![Ok("never used")]);
    let pipeline = Pipeline::new(Vec::new(), default_stages());

    let err = pipeline
        .run(&backend, &context("data"))
        .await
        .expect_err("Expected failure");

    match err {
        PipelineError::NoCandidateAvailable { failures } => assert!(failures.is_empty()),
        other => panic!("Unexpected error: {other:?}"),
    }
    assert!(backend.activations().is_empty());
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn all_activations_failing_reports_every_reason_in_order() {
    let backend = FakeBackend::new(&[], vec![]);
    let pipeline = Pipeline::new(candidates(&["a", "b", "c"]), default_stages());

    let err = pipeline
        .run(&backend, &context("data"))
        .await
        .expect_err("Expected failure");

    match &err {
        PipelineError::NoCandidateAvailable { failures } => {
            let names: Vec<_> = failures.iter().map(|f| f.candidate.as_str()).collect();
            assert_eq!(names, vec!["a", "b", "c"]);
            assert_eq!(failures[1].reason, "model b not found");
        }
        other => panic!("Unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("a (model a not found)"));
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn duplicate_candidates_are_tried_as_given() {
    let backend = FakeBackend::new(&[], vec![]);
    let pipeline = Pipeline::new(candidates(&["a", "a"]), default_stages());

    let _ = pipeline.select_backend(&backend).await;

    assert_eq!(backend.activations(), vec!["a", "a"]);
}

#[tokio::test]
async fn falls_back_to_third_candidate_and_runs_both_stages() {
    let draft = "---\ntitle: Draft\n---\nStocks rose.";
    let revised = "```markdown\n---\ntitle: Final\n---\nStocks rose sharply.\n```";
    let backend = FakeBackend::new(&["c"], vec![Ok(draft), Ok(revised)]);
    let pipeline = Pipeline::new(candidates(&["a", "b", "c"]), default_stages());

    let artifact = pipeline
        .run(&backend, &context("- Dow Jones: 100.00 (+1.00%)"))
        .await
        .expect("Pipeline failed");

    assert_eq!(artifact.model, "c");
    assert_eq!(artifact.text, finalize(revised));
    assert!(artifact
        .text
        .starts_with("---\ntitle: Final\n---\nStocks rose sharply."));
    assert_eq!(backend.activations().len(), 3);
    assert_eq!(backend.requests().len(), 2);
}

#[tokio::test]
async fn second_stage_request_contains_first_stage_output_verbatim() {
    let draft = "DRAFT: the Nasdaq led while the VIX slipped.\n  keep spacing  ";
    let backend = FakeBackend::new(&["a"], vec![Ok(draft), Ok("final")]);
    let pipeline = Pipeline::new(candidates(&["a"]), default_stages());

    pipeline
        .run(&backend, &context("source numbers"))
        .await
        .expect("Pipeline failed");

    let requests = backend.requests();
    assert!(requests[0].prompt.contains("source numbers"));
    assert!(!requests[0].prompt.contains(draft));
    assert!(requests[1].prompt.contains(draft));
}

#[tokio::test]
async fn stages_thread_output_through_custom_builders() {
    let backend = FakeBackend::new(&["m"], vec![Ok("one"), Ok("two"), Ok("three")]);
    let stages = vec![
        Stage {
            name: "first",
            build: echo_stage,
        },
        Stage {
            name: "second",
            build: echo_stage,
        },
        Stage {
            name: "third",
            build: echo_stage,
        },
    ];
    let pipeline = Pipeline::new(candidates(&["m"]), stages);

    let artifact = pipeline
        .run(&backend, &context("input"))
        .await
        .expect("Pipeline failed");

    let prompts: Vec<_> = backend.requests().into_iter().map(|r| r.prompt).collect();
    assert_eq!(prompts, vec!["[m] input", "[m] one", "[m] two"]);
    assert_eq!(artifact.text, finalize("three"));
}

#[tokio::test]
async fn second_stage_failure_is_tagged_with_its_index() {
    let backend = FakeBackend::new(&["a"], vec![Ok("draft"), Err("quota exceeded")]);
    let pipeline = Pipeline::new(candidates(&["a", "b"]), default_stages());

    let err = pipeline
        .run(&backend, &context("data"))
        .await
        .expect_err("Expected failure");

    assert_eq!(err.stage_index(), Some(2));
    match &err {
        PipelineError::Stage { name, source, .. } => {
            assert_eq!(*name, "editor");
            assert!(source.to_string().contains("quota exceeded"));
        }
        other => panic!("Unexpected error: {other:?}"),
    }
    // No switch to another candidate after a stage failure.
    assert_eq!(backend.activations(), vec!["a"]);
}

#[tokio::test]
async fn error_text_from_a_stage_is_a_failure() {
    let backend = FakeBackend::new(&["a"], vec![Ok("Error: model overloaded"), Ok("unused")]);
    let pipeline = Pipeline::new(candidates(&["a"]), default_stages());

    let err = pipeline
        .run(&backend, &context("data"))
        .await
        .expect_err("Expected failure");

    assert_eq!(err.stage_index(), Some(1));
    assert_eq!(backend.requests().len(), 1);
}

struct SlowBackend;

impl Backend for SlowBackend {
    type Handle = ();

    async fn activate(&self, _candidate: &str) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }

    async fn generate(&self, _handle: &(), _request: &GenerationRequest) -> anyhow::Result<String> {
        Ok("unused".to_string())
    }
}

#[tokio::test]
async fn activation_timeout_counts_as_failure() {
    let pipeline = Pipeline::new(candidates(&["slow"]), default_stages())
        .with_call_timeout(Duration::from_millis(20));

    let err = pipeline
        .select_backend(&SlowBackend)
        .await
        .expect_err("Expected timeout");

    match err {
        PipelineError::NoCandidateAvailable { failures } => {
            assert!(failures[0].reason.contains("timed out"));
        }
        other => panic!("Unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn waits_between_candidates() {
    let backend = FakeBackend::new(&["c"], vec![]);
    let pipeline = Pipeline::new(candidates(&["a", "b", "c"]), default_stages())
        .with_candidate_delay(Duration::from_millis(40));

    let start = Instant::now();
    pipeline
        .select_backend(&backend)
        .await
        .expect("Expected a backend");

    assert!(start.elapsed() >= Duration::from_millis(80));
}
