//! REST backend against the emulator router on a loopback port.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use nexus::activity::StaticIp;
use nexus::assistant::GeminiBackend;
use nexus::config::{SeedAccount, DEFAULT_AI_MODEL, DEFAULT_AI_URL};
use nexus::content::ContentPath;
use nexus::identity::{ensure_anonymous, BackendAuth, LocalStorage, MemoryStorage, RestBackendAuth, Role};
use nexus::model::Subject;
use nexus::portal::{Backends, Portal};
use nexus::server::{self, EmulatorState};
use nexus::store::{Access, DocPath, DocumentStore, MemoryStore, RestStore, Rules, StoreError};

async fn emulator(rules: Rules) -> (String, MemoryStore) {
    let store = MemoryStore::with_rules(rules);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    server::spawn(listener, EmulatorState::new(store.clone()));
    (base, store)
}

fn path(p: &str) -> DocPath { DocPath::parse(p).unwrap() }

async fn signed_in(base: &str) -> RestStore {
    let rest = RestStore::new(base).unwrap();
    let auth = RestBackendAuth::new(base, Some("test-key".into()), Arc::new(MemoryStorage::new()));
    ensure_anonymous(&auth, &rest).await.unwrap();
    rest
}

#[tokio::test]
async fn signed_out_clients_are_refused() {
    let (base, _store) = emulator(Rules::default()).await;
    let rest = RestStore::new(&base).unwrap();
    assert!(matches!(rest.get(&path("academyData")).await, Err(StoreError::PermissionDenied { .. })));
    assert!(rest.set(&path("academyData/p1"), json!(1)).await.unwrap_err().is_permission_denied());
    assert!(rest.subscribe(&path("academyData")).await.unwrap_err().is_permission_denied());
}

#[tokio::test]
async fn reads_and_writes_reach_the_tree() {
    let (base, store) = emulator(Rules::default()).await;
    let rest = signed_in(&base).await;

    rest.set(&path("academyData/p1/c1"), json!({"name": "Vectors", "order": 0})).await.unwrap();
    assert_eq!(rest.get(&path("academyData/p1/c1/name")).await.unwrap(), json!("Vectors"));
    assert_eq!(rest.get(&path("academyData/p2")).await.unwrap(), Value::Null);

    let mut fields = Map::new();
    fields.insert("academyData/p1/c1".into(), Value::Null);
    fields.insert("archiveData/p1/c1".into(), json!({"name": "Vectors", "order": 0}));
    rest.update(&DocPath::root(), fields).await.unwrap();
    assert_eq!(store.dump(), json!({"archiveData": {"p1": {"c1": {"name": "Vectors", "order": 0}}}}));

    let k1 = rest.push(&path("activityLogs"), json!({"action": "LOGIN"})).await.unwrap();
    let k2 = rest.push(&path("activityLogs"), json!({"action": "LOGOUT"})).await.unwrap();
    assert!(k1 < k2);
    assert_eq!(store.dump()["activityLogs"][&k2]["action"], json!("LOGOUT"));

    rest.remove(&path("activityLogs")).await.unwrap();
    assert_eq!(rest.get(&path("activityLogs")).await.unwrap(), Value::Null);
}

#[tokio::test]
async fn rules_are_enforced_per_path() {
    let rules = Rules::default().with_rule("developerInfo", Access::Public, Access::Denied).unwrap();
    let (base, _store) = emulator(rules).await;
    let anon = RestStore::new(&base).unwrap();
    assert_eq!(anon.get(&path("developerInfo")).await.unwrap(), Value::Null);
    let rest = signed_in(&base).await;
    assert!(rest.set(&path("developerInfo/name"), json!("x")).await.unwrap_err().is_permission_denied());
}

#[tokio::test]
async fn subscriptions_follow_remote_writes() {
    let (base, store) = emulator(Rules::default()).await;
    let rest = signed_in(&base).await;
    let mut sub = rest.subscribe(&path("academyData/ict")).await.unwrap();
    assert_eq!(sub.current(), Value::Null);

    let writer = store.connect();
    writer.set_credentials(Some(nexus::identity::mint_identity()));
    writer.set(&path("academyData/ict/c1/name"), json!("Number systems")).await.unwrap();
    let seen = tokio::time::timeout(Duration::from_secs(5), sub.changed()).await.unwrap().unwrap();
    assert_eq!(seen, json!({"c1": {"name": "Number systems"}}));

    writer.set(&path("academyData/p1"), json!({"x": 1})).await.unwrap();
    writer.remove(&path("academyData/ict")).await.unwrap();
    let seen = tokio::time::timeout(Duration::from_secs(5), sub.changed()).await.unwrap().unwrap();
    assert_eq!(seen, Value::Null);
}

#[tokio::test]
async fn backend_identity_is_kept_in_device_storage() {
    let (base, _store) = emulator(Rules::default()).await;
    let storage = Arc::new(MemoryStorage::new());
    let auth = RestBackendAuth::new(&base, None, storage.clone());
    let id = auth.sign_in_anonymously().await.unwrap();
    assert!(storage.get(RestBackendAuth::STORAGE_KEY).is_some());

    let after_restart = RestBackendAuth::new(&base, None, storage.clone());
    assert_eq!(after_restart.current(), Some(id));
    after_restart.sign_out().await.unwrap();
    assert_eq!(storage.get(RestBackendAuth::STORAGE_KEY), None);
}

#[tokio::test]
async fn portal_runs_against_the_emulator() {
    let (base, _store) = emulator(Rules::default()).await;
    let seeds = vec![SeedAccount { identifier: "admin".into(), secret: "adm".into(), role: Role::Admin }];
    let device = |storage: Arc<MemoryStorage>| {
        Portal::assemble(
            Backends {
                store: Arc::new(RestStore::new(&base).unwrap()),
                auth: Arc::new(RestBackendAuth::new(&base, None, storage.clone())),
                storage,
                ip: Arc::new(StaticIp("unknown".into())),
                model: Arc::new(GeminiBackend::new(DEFAULT_AI_URL, DEFAULT_AI_MODEL, None)),
            },
            seeds.clone(),
        )
    };
    let ict = ContentPath::live(Subject::Ict).unwrap();

    let editor = device(Arc::new(MemoryStorage::new()));
    editor.login("admin", "adm").await.unwrap();
    editor.content().open(ict).await.unwrap();

    let watcher_storage = Arc::new(MemoryStorage::new());
    let watcher = device(watcher_storage.clone());
    watcher.login("admin", "adm").await.unwrap();
    let mut changes = {
        watcher.content().open(ict).await.unwrap();
        watcher.content().changes(ict).unwrap()
    };

    editor.content().add_chapter(ict, "Logic gates", Vec::new()).await.unwrap();
    let seen = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            changes.changed().await.unwrap();
            let names: Vec<String> = changes.borrow().iter().map(|c| c.name.clone()).collect();
            if names == ["Logic gates"] { return names; }
        }
    })
    .await
    .unwrap();
    assert_eq!(seen, ["Logic gates"]);

    // a restart with the same device storage comes back signed in
    let restarted = device(watcher_storage);
    assert_eq!(restarted.restore().map(|s| s.role), Some(Role::Admin));
    assert!(restarted.content().open(ict).await.is_ok());
}
