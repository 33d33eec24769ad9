//! End-to-end conversation flows driven through the dispatcher

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tallybot::ledger::routing::FolderConfig;
use tallybot::ledger::store::LedgerStore;
use tallybot::ledger::uploads::AttachmentStore;
use tallybot::telegram::conversation::ConversationStore;
use tallybot::telegram::dispatcher::{Ack, DispatchError, UpdateDispatcher};
use tallybot::telegram::session::{BotSession, RunMode, WebhookApi};
use tallybot::telegram::transport::Messenger;
use tallybot::telegram::update::{InboundUpdate, UpdatePayload};
use tallybot::telegram::ConversationEngine;
use tallybot::testing::{CountingWebhookApi, MockAttachments, MockLedger, RecordingMessenger};

const SECRET: &str = "123456789:TESTTOKEN";

struct World {
    dispatcher: UpdateDispatcher,
    store: Arc<ConversationStore>,
    ledger: Arc<MockLedger>,
    attachments: Arc<MockAttachments>,
    messenger: Arc<RecordingMessenger>,
    api: Arc<CountingWebhookApi>,
}

fn world() -> World {
    world_with_timeout(Duration::from_secs(60))
}

fn world_with_timeout(timeout: Duration) -> World {
    let store = Arc::new(ConversationStore::new(timeout));
    let ledger = Arc::new(MockLedger::default());
    let attachments = Arc::new(MockAttachments::default());
    let messenger = Arc::new(RecordingMessenger::default());
    let folders = FolderConfig {
        purchasing: Some("f-purchasing".to_string()),
        electricity: Some("f-electricity".to_string()),
        default: Some("f-default".to_string()),
        ..FolderConfig::default()
    };
    let engine = Arc::new(ConversationEngine::new(
        Arc::clone(&store),
        Arc::clone(&ledger) as Arc<dyn LedgerStore>,
        Arc::clone(&attachments) as Arc<dyn AttachmentStore>,
        folders,
        Arc::clone(&messenger) as Arc<dyn Messenger>,
    ));
    let api = Arc::new(CountingWebhookApi::default());
    let session = Arc::new(BotSession::new(
        Arc::clone(&api) as Arc<dyn WebhookApi>,
        RunMode::Webhook,
        Some("https://bot.test".to_string()),
        SECRET.to_string(),
    ));
    World {
        dispatcher: UpdateDispatcher::new(SECRET.to_string(), session, engine),
        store,
        ledger,
        attachments,
        messenger,
        api,
    }
}

fn command(user: i64, name: &str, args: &[&str]) -> InboundUpdate {
    InboundUpdate {
        update_id: 1,
        user_id: user,
        chat_id: user,
        payload: UpdatePayload::Command {
            name: name.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        },
    }
}

fn text(user: i64, body: &str) -> InboundUpdate {
    InboundUpdate {
        update_id: 1,
        user_id: user,
        chat_id: user,
        payload: UpdatePayload::Text(body.to_string()),
    }
}

fn callback(user: i64, data: &str) -> InboundUpdate {
    InboundUpdate {
        update_id: 1,
        user_id: user,
        chat_id: user,
        payload: UpdatePayload::CallbackQuery {
            id: "cb-1".to_string(),
            data: data.to_string(),
        },
    }
}

fn photo(user: i64) -> InboundUpdate {
    InboundUpdate {
        update_id: 1,
        user_id: user,
        chat_id: user,
        payload: UpdatePayload::Photo {
            file_id: "photo-file-1".to_string(),
        },
    }
}

#[tokio::test]
async fn full_agent_creation_scenario() {
    let w = world();

    // /start, select "create agent", enter "Acme", enter "IC123"
    w.dispatcher.handle(SECRET, command(7, "start", &[])).await.unwrap();
    w.dispatcher
        .handle(SECRET, callback(7, "settings:agent"))
        .await
        .unwrap();
    w.dispatcher.handle(SECRET, text(7, "Acme")).await.unwrap();
    w.dispatcher.handle(SECRET, text(7, "IC123")).await.unwrap();

    let agents = w.ledger.agents.lock().unwrap();
    assert_eq!(agents.as_slice(), &[("Acme".to_string(), "IC123".to_string())]);
    assert_eq!(w.store.active_count().await, 0);
}

#[tokio::test]
async fn cancel_in_mid_flow_discards_progress() {
    let w = world();

    w.dispatcher.handle(SECRET, command(7, "start", &[])).await.unwrap();
    w.dispatcher
        .handle(SECRET, callback(7, "settings:agent"))
        .await
        .unwrap();
    w.dispatcher.handle(SECRET, text(7, "Acme")).await.unwrap();
    w.dispatcher.handle(SECRET, command(7, "cancel", &[])).await.unwrap();

    assert!(w.ledger.agents.lock().unwrap().is_empty());
    assert_eq!(w.store.active_count().await, 0);

    // Idempotent: a second /cancel is just another confirmation
    w.dispatcher.handle(SECRET, command(7, "cancel", &[])).await.unwrap();
    assert_eq!(w.store.active_count().await, 0);
}

#[tokio::test]
async fn supplier_and_person_flows_persist() {
    let w = world();

    w.dispatcher.handle(SECRET, command(7, "settings", &[])).await.unwrap();
    w.dispatcher
        .handle(SECRET, callback(7, "settings:supplier"))
        .await
        .unwrap();
    w.dispatcher.handle(SECRET, text(7, "Hardware Hub")).await.unwrap();
    w.dispatcher.handle(SECRET, text(7, "Purchasing")).await.unwrap();

    w.dispatcher.handle(SECRET, command(7, "settings", &[])).await.unwrap();
    w.dispatcher
        .handle(SECRET, callback(7, "settings:person"))
        .await
        .unwrap();
    w.dispatcher.handle(SECRET, text(7, "Dana")).await.unwrap();

    assert_eq!(
        w.ledger.suppliers.lock().unwrap().as_slice(),
        &[("Hardware Hub".to_string(), "Purchasing".to_string())]
    );
    assert_eq!(w.ledger.persons.lock().unwrap().as_slice(), &["Dana".to_string()]);
}

#[tokio::test]
async fn expense_with_receipt_routes_to_category_folder() {
    let w = world();

    w.dispatcher
        .handle(
            SECRET,
            command(7, "add_expense", &["2026-08-01", "Electricity Bill", "120.50", "July"]),
        )
        .await
        .unwrap();
    assert_eq!(w.ledger.expenses.lock().unwrap().len(), 1);

    w.dispatcher.handle(SECRET, photo(7)).await.unwrap();

    let uploads = w.attachments.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].folder_id.as_deref(), Some("f-electricity"));
    assert_eq!(uploads[0].category, "electricity");
}

#[tokio::test]
async fn wrong_token_is_rejected_without_side_effects() {
    let w = world();

    let result = w.dispatcher.handle("wrong", command(7, "start", &[])).await;
    assert_eq!(result, Err(DispatchError::Unauthorized));
    assert!(w.messenger.all_to(7).is_empty());
    assert_eq!(w.api.registrations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn first_valid_update_initializes_the_session_once() {
    let w = world();

    let (a, b) = tokio::join!(
        w.dispatcher.handle(SECRET, command(1, "help", &[])),
        w.dispatcher.handle(SECRET, command(2, "help", &[]))
    );
    assert_eq!(a, Ok(Ack::Handled));
    assert_eq!(b, Ok(Ack::Handled));
    // Concurrent first deliveries collapse onto one registration
    assert_eq!(w.api.registrations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn users_have_independent_conversations() {
    let w = world();

    w.dispatcher.handle(SECRET, command(1, "start", &[])).await.unwrap();
    w.dispatcher
        .handle(SECRET, callback(1, "settings:agent"))
        .await
        .unwrap();

    w.dispatcher.handle(SECRET, command(2, "start", &[])).await.unwrap();
    w.dispatcher
        .handle(SECRET, callback(2, "settings:person"))
        .await
        .unwrap();

    w.dispatcher.handle(SECRET, text(1, "Acme")).await.unwrap();
    w.dispatcher.handle(SECRET, text(2, "Dana")).await.unwrap();
    w.dispatcher.handle(SECRET, text(1, "IC999")).await.unwrap();

    assert_eq!(
        w.ledger.agents.lock().unwrap().as_slice(),
        &[("Acme".to_string(), "IC999".to_string())]
    );
    assert_eq!(w.ledger.persons.lock().unwrap().as_slice(), &["Dana".to_string()]);
}

#[tokio::test]
async fn idle_conversation_times_out_without_input() {
    let w = world_with_timeout(Duration::from_millis(20));

    w.dispatcher.handle(SECRET, command(7, "start", &[])).await.unwrap();
    w.dispatcher
        .handle(SECRET, callback(7, "settings:agent"))
        .await
        .unwrap();
    assert_eq!(w.store.active_count().await, 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let expired = w.store.expire_idle().await;
    assert_eq!(expired, vec![(7, 7)]);
    assert_eq!(w.store.active_count().await, 0);

    // Text after the timeout lands in Idle: no agent is created
    w.dispatcher.handle(SECRET, text(7, "Acme")).await.unwrap();
    assert!(w.ledger.agents.lock().unwrap().is_empty());
}
