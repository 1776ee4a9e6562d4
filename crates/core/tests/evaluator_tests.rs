//! Evaluator restart, memoization and retry policy.

mod common;

use common::{DownloadScript, FakeDecompressor, Harness, ScriptedDownloader, png_rule};
use repofetch_core::{
    ClientEnvironment, EnvironmentSource, Evaluator, RepositoryRule, RuleOutcome, WorkspaceError,
};
use repofetch_events::{EvaluationEvent, EventCategory, EventSender, RepofetchEvent};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

fn evaluator(harness: &Harness) -> (Evaluator, UnboundedReceiver<RepofetchEvent>) {
    let (events, receiver) = EventSender::channel();
    let evaluator = Evaluator::new(harness.node.clone(), events, CancellationToken::new())
        .with_environment_source(EnvironmentSource::Fixed(ClientEnvironment::new()));
    (evaluator, receiver)
}

#[tokio::test]
async fn test_restart_supplies_declared_environment() {
    let downloader = ScriptedDownloader::succeeding();
    let harness = Harness::new(downloader.clone(), FakeDecompressor::new(&["a.txt"]));
    let (events, mut receiver) = EventSender::channel();
    let evaluator = Evaluator::new(harness.node.clone(), events, CancellationToken::new())
        .with_environment_source(EnvironmentSource::Fixed(ClientEnvironment::from_pairs([
            ("HTTP_PROXY", "http://proxy:3128"),
            ("UNRELATED", "ignored"),
        ])));

    let report = evaluator.evaluate(&[png_rule()]).await.unwrap();

    assert!(report.is_success());
    let seen = downloader.seen_env.lock().unwrap().clone();
    assert_eq!(seen.len(), 1, "the download only runs once the environment is ready");
    assert_eq!(seen[0].get("HTTP_PROXY"), Some("http://proxy:3128"));
    assert_eq!(seen[0].get("UNRELATED"), None);
    assert_eq!(seen[0].get("NO_PROXY"), None);

    let mut restarted = false;
    while let Ok(event) = receiver.try_recv() {
        if let EventCategory::Evaluation(EvaluationEvent::Restarted { repository, attempt }) =
            event.category
        {
            assert_eq!(repository, "png");
            assert_eq!(attempt, 2);
            restarted = true;
        }
    }
    assert!(restarted);
}

#[tokio::test]
async fn test_done_values_are_memoized() {
    let downloader = ScriptedDownloader::succeeding();
    let harness = Harness::new(downloader.clone(), FakeDecompressor::new(&["a.txt"]));
    let (evaluator, _events) = evaluator(&harness);

    let first = evaluator.evaluate(&[png_rule()]).await.unwrap();
    let second = evaluator.evaluate(&[png_rule()]).await.unwrap();

    assert!(first.is_success() && second.is_success());
    assert_eq!(downloader.calls(), 1);
    assert_eq!(
        evaluator.memoized("png").unwrap().path(),
        harness.layout.repository_dir("png")
    );

    evaluator.invalidate("png");
    assert!(evaluator.memoized("png").is_none());
}

#[tokio::test]
async fn test_transient_failures_are_not_memoized() {
    let downloader = ScriptedDownloader::new(vec![DownloadScript::NetworkError, DownloadScript::Succeed]);
    let harness = Harness::new(downloader.clone(), FakeDecompressor::new(&["a.txt"]));
    let (evaluator, _events) = evaluator(&harness);

    let first = evaluator.evaluate(&[png_rule()]).await.unwrap();
    assert_eq!(first.retryable(), 1);
    assert!(matches!(first.outcome("png"), Some(RuleOutcome::Retryable(_))));

    let second = evaluator.evaluate(&[png_rule()]).await.unwrap();
    assert!(second.is_success());
    assert_eq!(downloader.calls(), 2);
}

#[tokio::test]
async fn test_retries_within_one_evaluation() {
    let downloader = ScriptedDownloader::new(vec![DownloadScript::NetworkError, DownloadScript::Succeed]);
    let harness = Harness::new(downloader.clone(), FakeDecompressor::new(&["a.txt"]));
    let (evaluator, _events) = evaluator(&harness);
    let evaluator = evaluator.with_max_transient_retries(1);

    let report = evaluator.evaluate(&[png_rule()]).await.unwrap();

    assert!(report.is_success());
    assert_eq!(downloader.calls(), 2);
}

#[tokio::test]
async fn test_persistent_failures_are_not_retried() {
    let downloader = ScriptedDownloader::new(vec![DownloadScript::ChecksumMismatch {
        actual: "f".repeat(64),
    }]);
    let harness = Harness::new(downloader.clone(), FakeDecompressor::new(&["a.txt"]));
    let (evaluator, _events) = evaluator(&harness);
    let evaluator = evaluator.with_max_transient_retries(3);

    let report = evaluator.evaluate(&[png_rule()]).await.unwrap();

    assert_eq!(report.failed(), 1);
    assert_eq!(downloader.calls(), 1);
    let error = report.outcome("png").and_then(RuleOutcome::error).unwrap();
    assert_eq!(error.rule(), "png");
}

#[tokio::test]
async fn test_duplicate_names_are_rejected() {
    let downloader = ScriptedDownloader::succeeding();
    let harness = Harness::new(downloader.clone(), FakeDecompressor::new(&["a.txt"]));
    let (evaluator, _events) = evaluator(&harness);

    let err = evaluator.evaluate(&[png_rule(), png_rule()]).await.unwrap_err();

    assert!(matches!(err, WorkspaceError::DuplicateName { ref name } if name == "png"));
    assert_eq!(downloader.calls(), 0);
}

#[tokio::test]
async fn test_rules_are_evaluated_together() {
    let downloader = ScriptedDownloader::succeeding();
    let harness = Harness::new(downloader.clone(), FakeDecompressor::new(&["a.txt"]));
    let (evaluator, mut events) = evaluator(&harness);
    let rules: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|name| RepositoryRule::http_archive(*name).with_attribute("url", "http://x/a.zip"))
        .collect();

    let report = evaluator.evaluate(&rules).await.unwrap();

    assert_eq!(report.succeeded(), 3);
    let names: Vec<_> = report.outcomes.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["a", "b", "c"]);
    for name in ["a", "b", "c"] {
        assert!(harness.layout.repository_dir(name).join("a.txt").exists());
    }

    let mut summary = None;
    while let Ok(event) = events.try_recv() {
        if let EventCategory::Evaluation(EvaluationEvent::Completed { succeeded, .. }) = event.category {
            summary = Some(succeeded);
        }
    }
    assert_eq!(summary, Some(3));
}

#[tokio::test]
async fn test_shared_node_across_evaluators() {
    let downloader = ScriptedDownloader::succeeding();
    let harness = Harness::new(downloader.clone(), FakeDecompressor::new(&["a.txt"]));
    let (first, _a) = evaluator(&harness);
    let (second, _b) = evaluator(&harness);

    first.evaluate(&[png_rule()]).await.unwrap();
    // A fresh evaluator has no memo, but the on-disk marker makes it a cache hit
    let report = second.evaluate(&[png_rule()]).await.unwrap();

    assert!(report.is_success());
    assert_eq!(downloader.calls(), 1);
}
