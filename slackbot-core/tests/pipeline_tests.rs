// ABOUTME: Tests for SinkPipeline ordering, completion, fault isolation, and initialization.
// ABOUTME: Uses the recording sender/reporter and scripted sinks from slackbot_core::testing.

use std::sync::Arc;

use futures_util::FutureExt;
use slackbot_core::testing::{RecordingReporter, RecordingSender, ScriptedSink};
use slackbot_core::{
    DispatchOutcome, ErrorSource, Message, MessageSubtype, PendingSink, Sink, SinkPipeline,
    SinkResult,
};
use tokio_util::sync::CancellationToken;

fn user_message(text: &str) -> Message {
    Message {
        channel: "C100".to_string(),
        user: "U200".to_string(),
        text: text.to_string(),
        ts: Some("1700000000.000100".to_string()),
        ..Message::default()
    }
}

fn pipeline_of(sinks: &[(&str, ScriptedSink)], reporter: &RecordingReporter) -> SinkPipeline {
    let sinks = sinks
        .iter()
        .map(|(name, sink)| (name.to_string(), Arc::new(sink.clone()) as Arc<dyn Sink>))
        .collect();
    SinkPipeline::new(sinks, Arc::new(reporter.clone()))
}

#[tokio::test]
async fn test_complete_stops_pipeline() {
    let a = ScriptedSink::returning(SinkResult::Continue);
    let b = ScriptedSink::returning(SinkResult::Complete);
    let c = ScriptedSink::returning(SinkResult::Complete);
    let reporter = RecordingReporter::new();
    let pipeline = pipeline_of(&[("a", a.clone()), ("b", b.clone()), ("c", c.clone())], &reporter);

    let outcome = pipeline
        .dispatch(&RecordingSender::new(), &user_message("hi"), &CancellationToken::new())
        .await;

    assert_eq!(
        outcome,
        DispatchOutcome::Handled {
            sink: "b".to_string()
        }
    );
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
    assert_eq!(c.calls(), 0, "sink after a completing sink must not run");
}

#[tokio::test]
async fn test_all_continue_leaves_message_unhandled() {
    let a = ScriptedSink::returning(SinkResult::Continue);
    let b = ScriptedSink::returning(SinkResult::Continue);
    let reporter = RecordingReporter::new();
    let sender = RecordingSender::new();
    let pipeline = pipeline_of(&[("a", a.clone()), ("b", b.clone())], &reporter);

    let outcome = pipeline
        .dispatch(&sender, &user_message("hi"), &CancellationToken::new())
        .await;

    assert_eq!(outcome, DispatchOutcome::Unhandled);
    assert_eq!((a.calls(), b.calls()), (1, 1));
    assert!(sender.sent().is_empty(), "no default reply");
    assert!(reporter.entries().is_empty());
}

#[tokio::test]
async fn test_faulty_sink_does_not_block_next_sink() {
    let faulty = ScriptedSink::failing("work item service unreachable");
    let echo = ScriptedSink::echo("ping", "pong");
    let reporter = RecordingReporter::new();
    let sender = RecordingSender::new();
    let pipeline = pipeline_of(&[("faulty", faulty.clone()), ("echo", echo.clone())], &reporter);

    let outcome = pipeline
        .dispatch(&sender, &user_message("ping"), &CancellationToken::new())
        .await;

    assert_eq!(
        outcome,
        DispatchOutcome::Handled {
            sink: "echo".to_string()
        }
    );
    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, "pong");
    assert_eq!(sent[0].channel, "C100");

    let entries = reporter.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].0,
        ErrorSource::SinkProcessing {
            sink: "faulty".to_string()
        }
    );
    assert!(entries[0].1.contains("unreachable"));
}

#[tokio::test]
async fn test_bot_message_never_reaches_sinks() {
    let sink = ScriptedSink::returning(SinkResult::Complete);
    let reporter = RecordingReporter::new();
    let pipeline = pipeline_of(&[("only", sink.clone())], &reporter);

    let mut msg = user_message("tfs 1");
    msg.subtype = MessageSubtype::BotMessage;

    let outcome = pipeline
        .dispatch(&RecordingSender::new(), &msg, &CancellationToken::new())
        .await;

    assert_eq!(outcome, DispatchOutcome::Skipped);
    assert_eq!(sink.calls(), 0);
}

#[tokio::test]
async fn test_hidden_message_never_reaches_sinks() {
    let sink = ScriptedSink::returning(SinkResult::Complete);
    let reporter = RecordingReporter::new();
    let pipeline = pipeline_of(&[("only", sink.clone())], &reporter);

    let mut msg = user_message("tfs 1");
    msg.hidden = true;

    let outcome = pipeline
        .dispatch(&RecordingSender::new(), &msg, &CancellationToken::new())
        .await;

    assert_eq!(outcome, DispatchOutcome::Skipped);
    assert_eq!(sink.calls(), 0);
}

#[tokio::test]
async fn test_initialize_drops_failed_sinks_and_keeps_order() {
    let first = ScriptedSink::returning(SinkResult::Continue);
    let broken = ScriptedSink::returning(SinkResult::Complete).failing_init("bad credentials");
    let last = ScriptedSink::returning(SinkResult::Continue);
    let reporter = RecordingReporter::new();
    let cancel = CancellationToken::new();

    let pipeline = SinkPipeline::initialize(
        vec![
            PendingSink::from_sink("first", first.clone(), cancel.clone()),
            PendingSink::from_sink("broken", broken.clone(), cancel.clone()),
            PendingSink::from_sink("last", last.clone(), cancel.clone()),
        ],
        Arc::new(reporter.clone()),
    )
    .await;

    assert_eq!(pipeline.sink_names(), vec!["first", "last"]);
    assert_eq!(first.initialized_as().as_deref(), Some("first"));
    assert_eq!(last.initialized_as().as_deref(), Some("last"));

    let entries = reporter.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].0,
        ErrorSource::SinkInitialization {
            sink: "broken".to_string()
        }
    );

    // The dropped sink is never offered messages
    pipeline
        .dispatch(&RecordingSender::new(), &user_message("hi"), &CancellationToken::new())
        .await;
    assert_eq!(broken.calls(), 0);
    assert_eq!((first.calls(), last.calls()), (1, 1));
}

#[tokio::test]
async fn test_initialize_accepts_custom_futures() {
    let reporter = RecordingReporter::new();
    let ready = ScriptedSink::returning(SinkResult::Complete);
    let ready_clone = ready.clone();

    let pipeline = SinkPipeline::initialize(
        vec![
            PendingSink::new(
                "prebuilt",
                async move { Ok::<_, anyhow::Error>(Arc::new(ready_clone) as Arc<dyn Sink>) }.boxed(),
            ),
            PendingSink::new(
                "unreachable",
                async { Err::<Arc<dyn Sink>, _>(anyhow::anyhow!("connection refused")) }.boxed(),
            ),
        ],
        Arc::new(reporter.clone()),
    )
    .await;

    assert_eq!(pipeline.len(), 1);
    assert_eq!(pipeline.sink_names(), vec!["prebuilt"]);
    assert_eq!(reporter.entries().len(), 1);
}

#[tokio::test]
async fn test_empty_pipeline_is_unhandled() {
    let reporter = RecordingReporter::new();
    let pipeline = SinkPipeline::new(Vec::new(), Arc::new(reporter));
    assert!(pipeline.is_empty());

    let outcome = pipeline
        .dispatch(&RecordingSender::new(), &user_message("hi"), &CancellationToken::new())
        .await;
    assert_eq!(outcome, DispatchOutcome::Unhandled);
}
