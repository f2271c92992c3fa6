//! Integration tests for the control-surface contract.
//!
//! Drives the full workflow a presentation layer performs: prompt CRUD,
//! conversation creation, arming the chain head, ticking the scheduler,
//! and observing dispatch history, all through the public service handle.

use cadence::config::AgentConfig;
use cadence::{CadenceService, Dispatcher, PromptStore, ScheduleEngine};
use chrono::{DateTime, TimeZone, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn sh_service(dir: &tempfile::TempDir, script: &str) -> CadenceService {
    let store = Arc::new(PromptStore::open(dir.path().join("prompts.jsonl")).unwrap());
    let agent = AgentConfig {
        binary: PathBuf::from("/bin/sh"),
        args: vec!["-c".to_owned(), script.to_owned()],
        timeout_secs: 5,
    };
    let dispatcher = Dispatcher::new(Arc::clone(&store), &agent);
    CadenceService::new(store, dispatcher, Duration::from_secs(1))
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

#[test]
fn prompt_crud_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let service = sh_service(&dir, "true");

    let id = service.add_prompt("ping", "* * * * *", None, None).unwrap();
    let listed = service.list_prompts();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].text, "ping");
    assert_eq!(listed[0].schedule, "* * * * *");

    service.edit_prompt(&id, "pong", "0 9 * * *").unwrap();
    let edited = &service.list_prompts()[0];
    assert_eq!(edited.id, id, "edit preserves the id");
    assert_eq!(edited.text, "pong");

    service.delete_prompt(&id).unwrap();
    assert!(service.list_prompts().is_empty());
}

#[test]
fn store_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let service = sh_service(&dir, "true");
        service.add_prompt("persisted", "0 9 * * *", None, None).unwrap();
        service.create_conversation(["a", "b"]).unwrap();
    }

    // A fresh service over the same path sees the same records.
    let service = sh_service(&dir, "true");
    let records = service.list_prompts();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].text, "persisted");
    assert_eq!(records.iter().filter(|p| p.is_first).count(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn armed_conversation_dispatches_the_whole_chain() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("agent_calls.txt");
    // The fake agent appends each prompt text it receives.
    let script = format!("printf '%s\\n' \"$0\" >> {}", out_path.display());
    let service = sh_service(&dir, &script);

    service.create_conversation(["first", "second", "third"]).unwrap();
    let head = service
        .list_prompts()
        .into_iter()
        .find(|p| p.is_first)
        .unwrap();
    service.edit_prompt(&head.id, &head.text, "* * * * *").unwrap();

    let mut engine = ScheduleEngine::new();
    service.tick_once(&mut engine, t0()).await;
    assert_eq!(engine.armed().len(), 1, "only the head is armed");

    let later = t0() + chrono::Duration::seconds(61);
    service.tick_once(&mut engine, later).await;

    let calls = std::fs::read_to_string(&out_path).unwrap();
    assert_eq!(calls, "first\nsecond\nthird\n");

    let history = service.history();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|r| r.outcome == "success"));

    // The head re-armed itself for a future occurrence.
    assert_eq!(engine.armed().len(), 1);
    assert!(engine.armed()[0].fire_at > later);
}

#[cfg(unix)]
#[tokio::test]
async fn failed_head_never_reaches_its_successor() {
    let dir = tempfile::tempdir().unwrap();
    let service = sh_service(&dir, "exit 7");

    service.create_conversation(["first", "second"]).unwrap();
    let head = service
        .list_prompts()
        .into_iter()
        .find(|p| p.is_first)
        .unwrap();
    service.edit_prompt(&head.id, &head.text, "* * * * *").unwrap();

    let mut engine = ScheduleEngine::new();
    service.tick_once(&mut engine, t0()).await;
    service
        .tick_once(&mut engine, t0() + chrono::Duration::seconds(61))
        .await;

    let history = service.history();
    assert_eq!(history.len(), 1, "chain halted at the failing head");
    assert_eq!(history[0].outcome, "agent error");
    assert_eq!(history[0].prompt_id, head.id);
}

#[tokio::test]
async fn deleting_the_head_unarms_it_before_the_next_fire() {
    let dir = tempfile::tempdir().unwrap();
    let service = sh_service(&dir, "true");

    let id = service.add_prompt("doomed", "* * * * *", None, None).unwrap();
    let mut engine = ScheduleEngine::new();
    service.tick_once(&mut engine, t0()).await;
    assert_eq!(engine.armed().len(), 1);

    service.delete_prompt(&id).unwrap();
    service
        .tick_once(&mut engine, t0() + chrono::Duration::seconds(61))
        .await;

    assert!(engine.armed().is_empty());
    assert!(service.history().is_empty(), "nothing dispatched");
}

#[test]
fn upcoming_queue_orders_by_fire_time() {
    let dir = tempfile::tempdir().unwrap();
    let service = sh_service(&dir, "true");

    let soon = service.add_prompt("soon", "every minute", None, None).unwrap();
    service.add_prompt("gibberish", "whenever", None, None).unwrap();

    let queue = service.upcoming();
    assert_eq!(queue.len(), 1, "unrecognised schedules are not armed");
    assert_eq!(queue[0].1, soon);
    assert!(queue[0].0 > Utc::now());
}
