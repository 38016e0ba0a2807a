use super::*;
use std::time::Duration;

use serde_json::json;

use crate::activity::StaticIp;
use crate::identity::{ensure_anonymous, LocalBackendAuth, Role, SessionWriter};
use crate::model::Subject;
use crate::store::{Access, MemoryStore, Rules};

struct Fixture {
    store: MemoryStore,
    sync: ContentSync,
    writer: SessionWriter,
}

async fn fixture_with(store: MemoryStore, role: Role) -> Fixture {
    let auth = Arc::new(LocalBackendAuth::new());
    ensure_anonymous(auth.as_ref(), &store).await.unwrap();
    let (ctx, writer) = SessionContext::pair();
    writer.set(Session::new("editor", role));
    let logger = ActivityLogger::new(Arc::new(store.clone()), auth, Arc::new(StaticIp("unknown".into())), ctx.clone());
    let sync = ContentSync::new(Arc::new(store.clone()), ctx, logger);
    Fixture { store, sync, writer }
}

async fn fixture(role: Role) -> Fixture {
    fixture_with(MemoryStore::new(), role).await
}

fn p1() -> ContentPath { ContentPath::live(Subject::P1).unwrap() }

fn res(label: &str) -> Resource { Resource::new(label, Some("https://youtu.be/dQw4w9WgXcQ".into()), None) }

async fn eventually<F: Fn() -> bool>(f: F) {
    for _ in 0..100 {
        if f() { return; }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn save_then_read_is_deep_equal() {
    let fx = fixture(Role::Admin).await;
    fx.sync.open(p1()).await.unwrap();
    let chapters = vec![
        Chapter::new("Vectors", vec![res("Lecture 1"), res("Lecture 2")]),
        Chapter::new("Motion", vec![]),
    ];
    let saved = fx.sync.save(p1(), chapters.clone()).await.unwrap();
    assert_eq!(saved, chapters);
    assert_eq!(fx.sync.read(p1()), chapters);

    // The stored form decodes back to the same list.
    let raw = fx.store.get(&p1().doc_path()).await.unwrap();
    let decoded: Vec<Chapter> = decode_chapters(&raw).unwrap().into_iter().map(|(c, _)| c).collect();
    assert_eq!(decoded, chapters);
}

#[tokio::test]
async fn repeated_or_unusable_ids_are_replaced_on_save() {
    let fx = fixture(Role::Admin).await;
    fx.sync.open(p1()).await.unwrap();
    let a = Chapter::new("Vectors", vec![]);
    let mut b = Chapter::new("Motion", vec![]);
    b.id = a.id.clone();
    let mut c = Chapter::new("Waves", vec![]);
    c.id = "bad.id/part".into();

    let saved = fx.sync.save(p1(), vec![a.clone(), b, c]).await.unwrap();
    assert_eq!(saved[0].id, a.id);
    assert_ne!(saved[1].id, a.id);
    assert_ne!(saved[2].id, "bad.id/part");

    let raw = fx.store.get(&p1().doc_path()).await.unwrap();
    assert_eq!(raw.as_object().unwrap().len(), 3);
    let decoded: Vec<Chapter> = decode_chapters(&raw).unwrap().into_iter().map(|(c, _)| c).collect();
    assert_eq!(decoded, saved);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fx.sync.read(p1()), saved);
}

#[tokio::test]
async fn denied_delete_reports_the_delete_alert() {
    let fx = fixture(Role::Admin).await;
    fx.sync.open(p1()).await.unwrap();
    fx.sync.save(p1(), vec![Chapter::new("A", vec![])]).await.unwrap();
    fx.store.set_rules(Rules::default().with_rule("academyData", Access::Denied, Access::Denied).unwrap());

    let err = fx.sync.delete_chapter(p1(), 0).await.unwrap_err();
    assert_eq!(err.message(), crate::error::alerts::DELETE_DENIED);
}

#[tokio::test]
async fn delete_shifts_later_chapters() {
    let fx = fixture(Role::Admin).await;
    fx.sync.open(p1()).await.unwrap();
    let names = ["A", "B", "C", "D"];
    let chapters: Vec<Chapter> = names.iter().map(|n| Chapter::new(*n, vec![])).collect();
    fx.sync.save(p1(), chapters).await.unwrap();

    let removed = fx.sync.delete_chapter(p1(), 1).await.unwrap();
    assert_eq!(removed.name, "B");
    let now: Vec<String> = fx.sync.read(p1()).into_iter().map(|c| c.name).collect();
    assert_eq!(now, vec!["A", "C", "D"]);

    let raw = fx.store.get(&p1().doc_path()).await.unwrap();
    assert_eq!(raw.as_object().unwrap().len(), 3);
}

#[tokio::test]
async fn add_and_edit_write_single_chapters() {
    let fx = fixture(Role::Owner).await;
    fx.sync.open(p1()).await.unwrap();
    let a = fx.sync.add_chapter(p1(), "Vectors", vec![]).await.unwrap();
    let b = fx.sync.add_chapter(p1(), "Motion", vec![res("Intro")]).await.unwrap();
    assert_ne!(a.id, b.id);

    let edited = fx.sync.edit_chapter(p1(), 0, "Vectors (revised)", vec![res("New")]).await.unwrap();
    assert_eq!(edited.id, a.id);
    assert!(edited.updated_at > a.updated_at);

    let stored = fx.store.get(&p1().doc_path().child(&a.id).unwrap()).await.unwrap();
    assert_eq!(stored["name"], json!("Vectors (revised)"));
    assert_eq!(stored["order"], json!(0));
    let names: Vec<String> = fx.sync.read(p1()).into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["Vectors (revised)", "Motion"]);
}

#[tokio::test]
async fn legacy_lists_are_converted_on_first_edit() {
    let store = MemoryStore::with_rules(Rules::open());
    store
        .set(&p1().doc_path(), json!([{"name": "Old 1", "resources": []}, {"name": "Old 2"}]))
        .await
        .unwrap();
    let fx = fixture_with(store, Role::Admin).await;
    let opened = fx.sync.open(p1()).await.unwrap();
    assert_eq!(opened[0].id, "legacy-0");

    fx.sync.edit_chapter(p1(), 1, "Old 2 (edited)", vec![]).await.unwrap();
    let raw = fx.store.get(&p1().doc_path()).await.unwrap();
    assert!(raw.is_object());
    assert_eq!(raw["legacy-0"]["name"], json!("Old 1"));
    assert_eq!(raw["legacy-1"]["name"], json!("Old 2 (edited)"));
}

#[tokio::test]
async fn archive_moves_chapter_between_shelves() {
    let fx = fixture(Role::Admin).await;
    let archive = ContentPath::archived(Subject::P1).unwrap();
    fx.sync.open(p1()).await.unwrap();
    fx.sync.open(archive).await.unwrap();
    fx.sync.save(p1(), vec![Chapter::new("Keep", vec![]), Chapter::new("Retire", vec![])]).await.unwrap();

    let moved = fx.sync.archive_chapter(p1(), 1).await.unwrap();
    assert_eq!(moved.name, "Retire");
    assert_eq!(fx.sync.read(p1()).len(), 1);
    assert_eq!(fx.sync.read(archive)[0].id, moved.id);
    assert!(fx.store.get(&archive.doc_path().child(&moved.id).unwrap()).await.unwrap().is_object());
    assert!(fx.sync.archive_chapter(archive, 0).await.is_err());
}

#[tokio::test]
async fn remote_changes_replace_the_mirror() {
    let fx = fixture(Role::Student).await;
    fx.sync.open(p1()).await.unwrap();
    let mut changes = fx.sync.changes(p1()).unwrap();

    let other = fx.store.connect();
    other.set_credentials(fx.store.credentials());
    let ch = Chapter::new("Pushed", vec![]);
    other.set(&p1().doc_path(), encode_chapters(&[ch.clone()])).await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), changes.changed()).await.unwrap().unwrap();
    assert_eq!(changes.borrow().clone(), vec![ch.clone()]);
    eventually(|| fx.sync.read(p1()) == vec![ch.clone()]).await;
}

#[tokio::test]
async fn students_cannot_edit() {
    let fx = fixture(Role::Student).await;
    fx.sync.open(p1()).await.unwrap();
    let err = fx.sync.add_chapter(p1(), "Nope", vec![]).await.unwrap_err();
    assert!(err.is_permission_denied());
    fx.writer.clear();
    assert_eq!(fx.sync.save(p1(), vec![]).await.unwrap_err().code_str(), "not_signed_in");
}

#[tokio::test]
async fn denied_save_keeps_local_state_and_alerts() {
    let rules = Rules::default().with_rule("academyData", Access::Authenticated, Access::Denied).unwrap();
    let fx = fixture_with(MemoryStore::with_rules(rules), Role::Owner).await;
    fx.sync.open(p1()).await.unwrap();
    let chapters = vec![Chapter::new("Local only", vec![])];
    let err = fx.sync.save(p1(), chapters.clone()).await.unwrap_err();
    assert_eq!(err.message(), crate::error::alerts::SAVE_DENIED);
    assert_eq!(fx.sync.read(p1()), chapters);
}

#[tokio::test]
async fn missing_names_are_rejected_before_writing() {
    let fx = fixture(Role::Admin).await;
    fx.sync.open(p1()).await.unwrap();
    assert_eq!(fx.sync.add_chapter(p1(), "", vec![]).await.unwrap_err().code_str(), "missing_field");
    assert!(fx.sync.edit_chapter(p1(), 0, "x", vec![]).await.unwrap_err().code_str() == "no_chapter");
    assert!(fx.store.get(&p1().doc_path()).await.unwrap().is_null());
}

#[test]
fn stale_or_vanished_chapters_conflict() {
    let mut local = Chapter::new("A", vec![]);
    local.updated_at = 10;
    let mut newer = local.clone();
    newer.updated_at = 11;
    assert_eq!(ContentSync::check_fresh(&vec![(local.clone(), 3)], &local).unwrap(), 3);
    assert_eq!(ContentSync::check_fresh(&vec![(newer, 3)], &local).unwrap_err().code_str(), "stale_write");
    assert!(ContentSync::check_fresh(&Vec::new(), &local).is_err());
}

#[tokio::test]
async fn search_and_close() {
    let fx = fixture(Role::Admin).await;
    fx.sync.open(p1()).await.unwrap();
    fx.sync.save(p1(), vec![Chapter::new("Vectors", vec![]), Chapter::new("Gravitation", vec![])]).await.unwrap();
    let hits = fx.sync.search(p1(), "grav");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, 1);
    fx.sync.close(p1());
    assert!(!fx.sync.is_open(p1()));
    assert!(fx.sync.read(p1()).is_empty());
}
