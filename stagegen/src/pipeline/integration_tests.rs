//! End-to-end run scenarios against scripted collaborators.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::config::GeneratorConfig;
    use crate::errors::{CompletionError, ErrorKind};
    use crate::events::{self, CollectingEventSink};
    use crate::llm::{Completion, Role};
    use crate::output::{FsOutputWriter, InMemoryOutputWriter, OutputWriter};
    use crate::pipeline::{Orchestrator, RetryConfig, RunOutcome};
    use crate::plans;
    use crate::stages::{Stage, StagePlan};
    use crate::testing::{
        assert_not_attempted, assert_stage_failed, assert_stage_succeeded, FailingOutputWriter,
        ScriptedCompletionClient,
    };
    use crate::usage::{TokenUsage, UsageCounts};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_config(max_attempts: u32) -> GeneratorConfig {
        GeneratorConfig::new().with_retry(
            RetryConfig::new()
                .with_max_attempts(max_attempts)
                .with_base_delay_ms(1)
                .with_max_delay_ms(5),
        )
    }

    fn three_stage_plan() -> StagePlan {
        StagePlan::builder("three")
            .system_prompt("SYS")
            .stage(Stage::new("one", "first"))
            .stage(Stage::new("two", "second").with_dependency("one"))
            .stage(Stage::new("three", "third").with_dependency("two"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_halts_after_invalid_request() {
        let client = Arc::new(ScriptedCompletionClient::new());
        client.push_text("ONE");
        client.push_error(CompletionError::InvalidRequest("context length exceeded".into()));
        let writer = Arc::new(InMemoryOutputWriter::new());

        let state = Orchestrator::new(client.clone(), writer.clone(), fast_config(3))
            .run(&three_stage_plan())
            .await
            .unwrap();

        assert_eq!(state.results().len(), 2);
        assert_stage_succeeded(&state, "one");
        assert_stage_failed(&state, "two", ErrorKind::InvalidRequestError);
        assert_not_attempted(&state, "three");
        assert_eq!(client.call_count(), 2);
        assert_eq!(writer.get("one").as_deref(), Some("ONE"));
        assert!(writer.get("two").is_none());
        assert!(matches!(state.outcome(), RunOutcome::Halted { stage, .. } if stage == "two"));
    }

    #[tokio::test]
    async fn test_retry_then_succeed() {
        let client = Arc::new(ScriptedCompletionClient::new());
        client.push_error(CompletionError::transient("503"));
        client.push_error(CompletionError::transient("429"));
        client.push_text("finally");
        let sink = Arc::new(CollectingEventSink::new());

        let plan = StagePlan::builder("p").stage(Stage::new("a", "A")).build().unwrap();
        let state = Orchestrator::new(client.clone(), Arc::new(InMemoryOutputWriter::new()), fast_config(3))
            .with_events(sink.clone())
            .run(&plan)
            .await
            .unwrap();

        assert_eq!(client.call_count(), 3);
        let result = assert_stage_succeeded(&state, "a");
        assert_eq!(result.attempts, 3);
        assert_eq!(result.generated_text, "finally");
        assert_eq!(sink.events_of_type(events::STAGE_RETRYING).len(), 2);
        assert!(state.is_complete());
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let client = Arc::new(ScriptedCompletionClient::new());
        for _ in 0..3 {
            client.push_error(CompletionError::transient("503"));
        }

        let state = Orchestrator::new(client.clone(), Arc::new(InMemoryOutputWriter::new()), fast_config(3))
            .run(&three_stage_plan())
            .await
            .unwrap();

        assert_eq!(client.call_count(), 3);
        let result = assert_stage_failed(&state, "one", ErrorKind::TransientServiceError);
        assert_eq!(result.attempts, 3);
        assert_not_attempted(&state, "two");
    }

    #[tokio::test]
    async fn test_schema_output_flows_into_code_stage() {
        let client = Arc::new(ScriptedCompletionClient::new());
        client.push_completion(Completion::new("TYPES", UsageCounts::new(12, 3, 15)));
        client.push_completion(Completion::new("IMPL uses TYPES", UsageCounts::new(40, 20, 60)));
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(FsOutputWriter::new(dir.path()));

        let plan = StagePlan::builder("api")
            .system_prompt("You write {lang}.")
            .stage(Stage::new("schema", "describe data model"))
            .stage(Stage::new("code", "Implement {app}").with_dependency("schema"))
            .build()
            .unwrap();

        let state = Orchestrator::new(client.clone(), writer.clone(), fast_config(3))
            .with_substitution("app", "a todo list")
            .with_substitution("lang", "Rust")
            .run(&plan)
            .await
            .unwrap();

        assert!(state.is_complete());

        let requests = client.requests();
        let first = &requests[0].messages;
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].role, Role::System);
        assert_eq!(first[0].content, "You write Rust.");
        assert_eq!(first[1].content, "describe data model");

        let second = &requests[1].messages;
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].role, Role::User);
        assert!(second[1].content.contains("TYPES"));
        assert!(second[1].content.contains("schema"));
        assert_eq!(second[2].content, "Implement a todo list");

        assert_eq!(writer.read("schema").await.unwrap().as_deref(), Some("TYPES"));
        assert_eq!(writer.read("code").await.unwrap().as_deref(), Some("IMPL uses TYPES"));
        assert_eq!(state.total_usage(), TokenUsage::new(52, 23, 75));
        assert_eq!(state.summary().get("code"), Some(&TokenUsage::new(40, 20, 60)));
    }

    #[tokio::test]
    async fn test_distinct_artifact_directories_keep_their_own_text() {
        let client = Arc::new(ScriptedCompletionClient::new());
        client.push_text("SCHEMA A");
        client.push_text("SCHEMA B");
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(FsOutputWriter::new(dir.path()));

        let plan = StagePlan::builder("api")
            .stage(Stage::new("api schema", "first"))
            .stage(Stage::new("api schema v2", "second"))
            .build()
            .unwrap();

        let state = Orchestrator::new(client, writer.clone(), fast_config(3))
            .run(&plan)
            .await
            .unwrap();

        assert!(state.is_complete());
        assert_eq!(writer.read("api schema").await.unwrap().as_deref(), Some("SCHEMA A"));
        assert_eq!(writer.read("api schema v2").await.unwrap().as_deref(), Some("SCHEMA B"));
        let first = state.result("api schema").unwrap().artifact.as_ref().unwrap();
        let second = state.result("api schema v2").unwrap().artifact.as_ref().unwrap();
        assert_ne!(first.location, second.location);
    }

    #[tokio::test]
    async fn test_authentication_error_aborts_without_retry() {
        let client = Arc::new(ScriptedCompletionClient::new());
        client.push_error(CompletionError::Authentication("invalid api key".into()));

        let state = Orchestrator::new(client.clone(), Arc::new(InMemoryOutputWriter::new()), fast_config(3))
            .run(&three_stage_plan())
            .await
            .unwrap();

        assert_eq!(client.call_count(), 1);
        assert!(matches!(state.outcome(), RunOutcome::Aborted { stage, .. } if stage == "one"));
        assert_stage_failed(&state, "one", ErrorKind::AuthenticationError);
        assert_eq!(state.not_attempted(), vec!["two", "three"]);
    }

    #[tokio::test]
    async fn test_empty_completion_fails_stage() {
        let client = Arc::new(ScriptedCompletionClient::new());
        client.push_text("  \n ");

        let state = Orchestrator::new(client.clone(), Arc::new(InMemoryOutputWriter::new()), fast_config(3))
            .run(&three_stage_plan())
            .await
            .unwrap();

        assert_eq!(client.call_count(), 1);
        assert_stage_failed(&state, "one", ErrorKind::EmptyCompletionError);
        assert!(state.total_usage().is_zero());
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_stage_succeeded() {
        let client = Arc::new(ScriptedCompletionClient::new());
        let sink = Arc::new(CollectingEventSink::new());

        let state = Orchestrator::new(
            client.clone(),
            Arc::new(FailingOutputWriter::new("disk full")),
            fast_config(3),
        )
        .with_events(sink.clone())
        .run(&three_stage_plan())
        .await
        .unwrap();

        assert!(state.is_complete());
        assert_eq!(state.unsaved_stages(), vec!["one", "two", "three"]);
        for name in ["one", "two", "three"] {
            let result = assert_stage_succeeded(&state, name);
            assert!(result.artifact.is_none());
            assert_eq!(
                result.persistence_error.as_ref().map(|e| e.kind),
                Some(ErrorKind::PersistenceError)
            );
        }
        assert_eq!(sink.events_of_type(events::ARTIFACT_PERSIST_FAILED).len(), 3);
    }

    #[tokio::test]
    async fn test_cancellation_between_stages() {
        let token = Arc::new(CancellationToken::new());
        let client = Arc::new(ScriptedCompletionClient::new());
        client.cancel_after(1, token.clone());

        let state = Orchestrator::new(client.clone(), Arc::new(InMemoryOutputWriter::new()), fast_config(3))
            .with_cancellation(token)
            .run(&three_stage_plan())
            .await
            .unwrap();

        assert_eq!(client.call_count(), 1);
        assert_stage_succeeded(&state, "one");
        assert_not_attempted(&state, "two");
        assert!(matches!(
            state.outcome(),
            RunOutcome::Cancelled { next_stage, .. } if next_stage == "two"
        ));
        assert!(state.clone().into_result().is_err());
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_retry_wait() {
        let token = Arc::new(CancellationToken::new());
        let client = Arc::new(ScriptedCompletionClient::new());
        client.push_error(CompletionError::Transient {
            message: "429".into(),
            retry_after: Some(Duration::from_secs(60)),
        });
        client.cancel_after(1, token.clone());

        let config = GeneratorConfig::new().with_retry(RetryConfig::new().with_max_delay_ms(60_000));
        let plan = three_stage_plan();
        let orchestrator = Orchestrator::new(client.clone(), Arc::new(InMemoryOutputWriter::new()), config)
            .with_cancellation(token);

        let state = tokio::time::timeout(Duration::from_secs(5), orchestrator.run(&plan))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(client.call_count(), 1);
        assert!(state.results().is_empty(), "no half-written stage result");
        assert!(matches!(state.outcome(), RunOutcome::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_event_sequence() {
        let client = Arc::new(ScriptedCompletionClient::new());
        let sink = Arc::new(CollectingEventSink::new());
        let plan = StagePlan::builder("p")
            .stage(Stage::new("a", "A"))
            .stage(Stage::new("b", "B"))
            .build()
            .unwrap();

        let state = Orchestrator::new(client, Arc::new(InMemoryOutputWriter::new()), fast_config(3))
            .with_events(sink.clone())
            .run(&plan)
            .await
            .unwrap();

        assert_eq!(
            sink.event_types(),
            vec![
                events::RUN_STARTED,
                events::STAGE_STARTED,
                events::STAGE_SUCCEEDED,
                events::STAGE_STARTED,
                events::STAGE_SUCCEEDED,
                events::RUN_FINISHED,
            ]
        );
        let finished = &sink.events_of_type(events::RUN_FINISHED)[0];
        assert_eq!(finished["run_id"], state.run_id().to_string());
        assert_eq!(finished["outcome"]["status"], "completed");
    }

    #[tokio::test]
    async fn test_builtin_staged_plan_end_to_end() {
        let client = Arc::new(ScriptedCompletionClient::new().with_default_text("CODE"));
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(FsOutputWriter::new(dir.path()));

        let state = Orchestrator::new(client.clone(), writer, fast_config(3))
            .with_substitution("base_prompt", "Build a note-taking app.")
            .run(&plans::staged().unwrap())
            .await
            .unwrap();

        assert!(state.is_complete());
        assert_eq!(client.call_count(), 4);
        // The last stage carries all three earlier outputs plus system and instruction.
        assert_eq!(client.last_request().unwrap().messages.len(), 5);
        assert!(dir.path().join("tests_documentation").join("code.txt").exists());
        assert_eq!(state.total_usage().total_tokens, 60);
    }

    #[tokio::test]
    async fn test_independent_runs_share_client() {
        let client = Arc::new(ScriptedCompletionClient::new());
        let plan = three_stage_plan();

        let first = Orchestrator::new(client.clone(), Arc::new(InMemoryOutputWriter::new()), fast_config(3));
        let second = Orchestrator::new(client.clone(), Arc::new(InMemoryOutputWriter::new()), fast_config(3));

        let (a, b) = tokio::join!(first.run(&plan), second.run(&plan));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(a.is_complete() && b.is_complete());
        assert_ne!(a.run_id(), b.run_id());
        assert_eq!(a.total_usage(), TokenUsage::new(30, 15, 45));
        assert_eq!(b.total_usage(), TokenUsage::new(30, 15, 45));
        assert_eq!(client.call_count(), 6);
    }
}
