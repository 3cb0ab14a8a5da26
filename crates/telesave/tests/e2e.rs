// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the complete sync pipeline and the CLI surface.
//!
//! Sync scenarios run the real orchestrator against a scripted service and
//! a temp archive. CLI scenarios run the built binary with an explicit
//! config file.

use std::path::Path;
use std::process::Command;

use telesave_core::{Chat, ChatId, ChatKind, MessageId, Watermark};
use telesave_sync::{ChatState, RunFlags};
use telesave_test_utils::{
    MockService, TestHarness, ephemeral_message, text_message, with_photo,
};

const C: ChatId = ChatId(77);

fn chat_c() -> Chat {
    Chat::new(C, "Chat C", ChatKind::User)
}

/// Five messages, the third one self-destructing.
fn five_with_ephemeral_third() -> Vec<telesave_core::RawMessage> {
    (1..=5)
        .map(|id| {
            if id == 3 {
                ephemeral_message(C, id, "burn after reading")
            } else {
                text_message(C, id, &format!("message {id}"))
            }
        })
        .collect()
}

async fn harness_at_watermark_two(flags: RunFlags) -> TestHarness {
    let harness = TestHarness::builder()
        .with_service(MockService::new().with_chat(chat_c(), five_with_ephemeral_third()))
        .with_flags(flags)
        .build()
        .await
        .unwrap();
    harness
        .seed_watermark(&chat_c(), Watermark::initial(C).after_commit(MessageId(2)))
        .await
        .unwrap();
    harness
}

// ---- Default mode resumes after the watermark and forwards ----

#[tokio::test]
async fn default_mode_archives_after_watermark_and_forwards_ephemeral() {
    let harness = harness_at_watermark_two(RunFlags {
        once: true,
        ..RunFlags::default()
    })
    .await;

    let report = harness.run().await.unwrap();

    assert_eq!(harness.archived_ids(C).await.unwrap(), vec![3, 4, 5]);

    let third = harness.record(C, 3).await.unwrap().unwrap();
    assert!(third.is_self_destructing);
    assert!(third.forwarded);

    let sent = harness.service.sent_messages().await;
    assert_eq!(sent.len(), 1);
    let text = sent[0].content.text.as_deref().unwrap();
    assert!(text.contains("burn after reading"));

    let watermark = harness.watermark(C).await.unwrap();
    assert_eq!(watermark.last_synced_message_id, MessageId(5));
    assert!(watermark.full_history_complete);

    let chat = report.chat(C).unwrap();
    assert_eq!(chat.state, ChatState::Live);
    assert_eq!(chat.archived, 3);
    assert_eq!(chat.forwarded, 1);
}

#[tokio::test]
async fn dont_save_self_destructing_archives_without_sending() {
    let harness = harness_at_watermark_two(RunFlags {
        once: true,
        dont_save_self_destructing: true,
        ..RunFlags::default()
    })
    .await;

    harness.run().await.unwrap();

    let third = harness.record(C, 3).await.unwrap().unwrap();
    assert!(third.is_self_destructing);
    assert!(!third.forwarded);
    assert_eq!(harness.service.sent_count().await, 0);
    assert_eq!(
        harness.watermark(C).await.unwrap().last_synced_message_id,
        MessageId(5)
    );
}

#[tokio::test]
async fn full_history_fills_the_messages_below_the_watermark() {
    let harness = harness_at_watermark_two(RunFlags {
        once: true,
        all: true,
        ..RunFlags::default()
    })
    .await;

    harness.run().await.unwrap();

    assert_eq!(harness.archived_ids(C).await.unwrap(), vec![1, 2, 3, 4, 5]);
    let watermark = harness.watermark(C).await.unwrap();
    assert!(watermark.full_history_complete);
    assert_eq!(watermark.last_synced_message_id, MessageId(5));
}

#[tokio::test]
async fn full_history_replays_after_a_completed_walk() {
    let harness = TestHarness::builder()
        .with_service(MockService::new().with_chat(chat_c(), five_with_ephemeral_third()))
        .with_flags(RunFlags {
            once: true,
            all: true,
            ..RunFlags::default()
        })
        .build()
        .await
        .unwrap();
    harness
        .seed_watermark(
            &chat_c(),
            Watermark::initial(C).after_commit(MessageId(5)).completed(),
        )
        .await
        .unwrap();

    harness.run().await.unwrap();

    assert_eq!(harness.archived_ids(C).await.unwrap(), vec![1, 2, 3, 4, 5]);
    let watermark = harness.watermark(C).await.unwrap();
    assert!(watermark.full_history_complete);
    assert_eq!(watermark.replay_epoch, 1);
    assert_eq!(watermark.last_synced_message_id, MessageId(5));
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let harness = harness_at_watermark_two(RunFlags {
        once: true,
        ..RunFlags::default()
    })
    .await;
    harness.run().await.unwrap();
    let before = harness.watermark(C).await.unwrap();

    let report = harness.run().await.unwrap();

    assert_eq!(report.total_archived(), 0);
    assert_eq!(harness.watermark(C).await.unwrap(), before);
    assert_eq!(harness.service.sent_count().await, 1);
}

#[tokio::test]
async fn ephemeral_photo_is_forwarded_with_its_blob() {
    let service = MockService::new()
        .with_chat(
            chat_c(),
            vec![
                text_message(C, 1, "hi"),
                with_photo(ephemeral_message(C, 2, "look"), "photo-1"),
            ],
        )
        .with_attachment("photo-1", b"jpeg bytes".to_vec());
    let harness = TestHarness::builder()
        .with_service(service)
        .with_forward_chat(-1000)
        .build()
        .await
        .unwrap();

    harness.run().await.unwrap();

    assert_eq!(harness.blob_files(), 1);
    let record = harness.record(C, 2).await.unwrap().unwrap();
    assert_eq!(record.media_refs.len(), 1);
    assert!(record.forwarded);

    let sent = harness.service.sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].destination,
        telesave_core::ForwardDestination::Chat(ChatId(-1000))
    );
    assert_eq!(sent[0].content.files.len(), 1);
    assert!(sent[0].content.files[0].path.exists());
}

// ---- CLI surface ----

fn write_config(dir: &Path, telegram: &str) -> std::path::PathBuf {
    let path = dir.join("telesave.toml");
    let content = format!(
        "{telegram}\n[storage]\ndb_path = \"{}\"\nstore_path = \"{}\"\n",
        dir.join("telesave.db").display(),
        dir.join("store").display()
    );
    std::fs::write(&path, content).unwrap();
    path
}

fn telesave(config: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_telesave"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("TELEGRAM_BOT_TOKEN")
        .env_remove("TELESAVE_TELEGRAM_BOT_TOKEN")
        .output()
        .unwrap()
}

#[test]
fn sync_without_credentials_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");

    let output = telesave(&config, &["--once"]);

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn unknown_config_key_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "[telegram]\nbot_tokn = \"1:x\"\n");

    let output = telesave(&config, &["log"]);

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn log_on_an_empty_archive_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");

    let output = telesave(&config, &["log", "-n", "5"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("no archived messages"));
}

#[test]
fn scan_reports_stray_blob_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");
    let stray = dir.path().join("store").join("ab").join("abcdef");
    std::fs::create_dir_all(stray.parent().unwrap()).unwrap();
    std::fs::write(&stray, b"orphan").unwrap();

    let output = telesave(&config, &["scan"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("abcdef"));
    assert!(stdout.contains("1 unreferenced blob files"));
}

#[test]
fn doctor_reports_each_adapter_without_a_token() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");

    let output = telesave(&config, &["doctor"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[warn] archive"));
    assert!(stdout.contains("[fail] telegram"));
    assert!(stdout.contains("bot_token"));
    assert!(stdout.contains("3 issues found"));
}
