//! Build notifier coalescing, isolation and failure handling.

use std::sync::Arc;

use build_ledger::fakes::MemoryBuildLedger;
use sitebuild_core::fakes::{RecordingMonitor, RecordingTransport};
use sitebuild_core::{
    BuildId, BuildNotifier, BuildServices, Delivery, DestinationConfig, Message, Messenger,
    StaticServerRegistry,
};

const FOO_HOOK: &str = "http://localhost:8000/__refresh";
const BAR_HOOK: &str = "http://localhost:9000/__refresh";
const PUBLISH_HOOK: &str = "https://builds.example.com/data_source/publish/site-1";

fn registry() -> StaticServerRegistry {
    StaticServerRegistry::default()
        .with_destination("foo", DestinationConfig::default().with_webhook(FOO_HOOK))
        .with_destination("bar", DestinationConfig::default().with_webhook(BAR_HOOK))
        .with_destination("live", DestinationConfig::default().with_webhook(PUBLISH_HOOK))
        .with_destination("shared", DestinationConfig::default().with_webhook(FOO_HOOK))
        .with_destination("quiet", DestinationConfig::default())
}

fn notifier(transport: &Arc<RecordingTransport>) -> BuildNotifier {
    BuildNotifier::new(Arc::new(registry()), transport.clone(), Messenger::new())
}

fn services(transport: &Arc<RecordingTransport>) -> BuildServices {
    BuildServices::new(
        Arc::new(MemoryBuildLedger::new()),
        Arc::new(registry()),
        transport.clone(),
    )
}

#[tokio::test]
async fn test_triggers_for_one_url_coalesce_to_the_last_id() {
    let transport = Arc::new(RecordingTransport::new());
    let notifier = notifier(&transport);

    notifier.trigger("foo", BuildId(1));
    notifier.trigger("foo", BuildId(2));

    let report = notifier.flush().await;
    assert_eq!(
        report.delivered,
        vec![Delivery {
            url: FOO_HOOK.to_string(),
            build_id: BuildId(2),
        }]
    );
    assert_eq!(transport.posts(), vec![(FOO_HOOK.to_string(), BuildId(2))]);
}

#[tokio::test]
async fn test_destinations_sharing_a_webhook_coalesce_too() {
    let transport = Arc::new(RecordingTransport::new());
    let notifier = notifier(&transport);

    notifier.trigger("foo", BuildId(3));
    notifier.trigger("shared", BuildId(5));

    notifier.flush().await;
    assert_eq!(transport.posts(), vec![(FOO_HOOK.to_string(), BuildId(5))]);
}

#[tokio::test]
async fn test_each_destination_gets_its_own_call() {
    let transport = Arc::new(RecordingTransport::new());
    let notifier = notifier(&transport);

    notifier.trigger("foo", BuildId(1));
    notifier.trigger("bar", BuildId(2));

    let report = notifier.flush().await;
    assert_eq!(report.attempted(), 2);
    assert_eq!(transport.posts_to(FOO_HOOK), vec![BuildId(1)]);
    assert_eq!(transport.posts_to(BAR_HOOK), vec![BuildId(2)]);
}

#[tokio::test]
async fn test_nothing_is_sent_before_the_unit_of_work_finishes() {
    let transport = Arc::new(RecordingTransport::new());
    let services = services(&transport);
    let work = services.begin();

    work.notifier().trigger("foo", BuildId(1));
    work.notifier().trigger("bar", BuildId(2));
    work.notifier().trigger("foo", BuildId(3));
    tokio::task::yield_now().await;

    assert!(transport.posts().is_empty());
    assert!(work.notifier().is_armed());
    assert_eq!(work.notifier().pending().len(), 2);

    let report = work.finish().await;
    assert_eq!(report.flush.attempted(), 2);
    assert_eq!(transport.posts_to(FOO_HOOK), vec![BuildId(3)]);
}

#[tokio::test]
async fn test_one_failure_does_not_block_other_destinations() {
    let transport = Arc::new(RecordingTransport::new());
    transport.fail(FOO_HOOK, "connection refused");
    let services = services(&transport);
    let work = services.begin();

    work.notifier().trigger("foo", BuildId(1));
    work.notifier().trigger("bar", BuildId(2));
    let report = work.finish().await;

    assert_eq!(report.flush.failed.len(), 1);
    assert_eq!(report.flush.failed[0].url, FOO_HOOK);
    assert_eq!(
        report.flush.delivered,
        vec![Delivery {
            url: BAR_HOOK.to_string(),
            build_id: BuildId(2),
        }]
    );

    let errors: Vec<Message> = report
        .messages
        .iter()
        .filter(|m| m.is_error())
        .cloned()
        .collect();
    assert_eq!(
        errors,
        vec![
            Message::error(format!(
                "Could not send build notification to server \"{FOO_HOOK}\"."
            )),
            Message::error("connection refused"),
        ]
    );
    assert!(report.has_errors());
}

#[tokio::test]
async fn test_destination_without_webhook_is_ignored() {
    let transport = Arc::new(RecordingTransport::new());
    let notifier = notifier(&transport);

    notifier.trigger("quiet", BuildId(4));
    notifier.trigger("unknown", BuildId(5));

    assert!(notifier.is_armed());
    assert!(notifier.pending().is_empty());
    assert!(notifier.flush().await.is_empty());
    assert!(transport.posts().is_empty());
}

#[tokio::test]
async fn test_flush_drains_the_queue() {
    let transport = Arc::new(RecordingTransport::new());
    let notifier = notifier(&transport);

    notifier.trigger("foo", BuildId(1));
    assert_eq!(notifier.flush().await.attempted(), 1);
    assert!(!notifier.is_armed());
    assert!(notifier.flush().await.is_empty());
    assert_eq!(transport.posts().len(), 1);
}

#[tokio::test]
async fn test_flush_without_trigger_sends_nothing() {
    let transport = Arc::new(RecordingTransport::new());
    let notifier = notifier(&transport);

    assert!(!notifier.is_armed());
    assert!(notifier.flush().await.is_empty());
}

#[tokio::test]
async fn test_publish_webhook_marks_build_started() {
    let transport = Arc::new(RecordingTransport::new());
    let monitor = Arc::new(RecordingMonitor::new());
    let notifier = notifier(&transport).with_monitor(monitor.clone());

    notifier.trigger("live", BuildId(1));
    notifier.trigger("foo", BuildId(1));
    notifier.flush().await;

    assert_eq!(monitor.builds(), 1);
}

#[tokio::test]
async fn test_failed_publish_webhook_does_not_mark_build() {
    let transport = Arc::new(RecordingTransport::new());
    transport.fail(PUBLISH_HOOK, "503 Service Unavailable");
    let monitor = Arc::new(RecordingMonitor::new());
    let services = services(&transport).with_monitor(monitor.clone());

    let work = services.begin();
    work.notifier().trigger("live", BuildId(9));
    let report = work.finish().await;

    assert_eq!(report.flush.failed.len(), 1);
    assert_eq!(monitor.builds(), 0);
}

#[tokio::test]
async fn test_units_of_work_have_separate_queues() {
    let transport = Arc::new(RecordingTransport::new());
    let services = services(&transport);

    let first = services.begin();
    let second = services.begin();
    first.notifier().trigger("foo", BuildId(1));
    second.notifier().trigger("bar", BuildId(2));

    assert_eq!(first.notifier().pending().len(), 1);
    assert!(first.notifier().pending().contains_key(FOO_HOOK));
    assert!(second.notifier().pending().contains_key(BAR_HOOK));

    second.finish().await;
    assert_eq!(transport.posts(), vec![(BAR_HOOK.to_string(), BuildId(2))]);
    first.finish().await;
    assert_eq!(transport.posts().len(), 2);
}
