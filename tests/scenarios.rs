//! End-to-end scenarios against an in-process Registry/Session pair, no
//! real network socket, mirroring how this codebase tests its transport
//! layers against fixtures rather than live connections.

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use syncd::registry::Registry;
use syncd::session::protocol::ServerEvent;
use syncd::session::{next_session_id, Session};

fn init_repo_with_commit(dir: &Path, file: &str, content: &str) {
    let repo = git2::Repository::init(dir).unwrap();
    std::fs::write(dir.join(file), content).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(file)).unwrap();
    index.write().unwrap();
    let tree_oid = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let sig = git2::Signature::now("test", "test@test.com").unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[]).unwrap();
}

struct Client {
    session: Session,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Client {
    fn new(registry: &Registry) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = next_session_id();
        let (session, subscriber) = Session::new(id, registry.clone(), tx);
        registry.register_subscriber(subscriber);
        Client { session, rx }
    }

    async fn send(&mut self, raw: &str) {
        self.session.handle_frame(raw).await;
    }

    async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("event arrived within timeout")
            .expect("event channel still open")
    }

    async fn expect_no_event(&mut self) {
        let result = tokio::time::timeout(Duration::from_millis(100), self.rx.recv()).await;
        assert!(result.is_err(), "expected no further event on this session");
    }
}

#[tokio::test]
async fn happy_edit_round_trips_through_open_and_write() {
    let dir = TempDir::new().unwrap();
    init_repo_with_commit(dir.path(), "a.txt", "hello");
    let registry = Registry::start(dir.path().to_path_buf()).unwrap();

    let mut client = Client::new(&registry);
    client
        .send(r#"{"type":"open_file","path":"a.txt","handle":"h1"}"#)
        .await;
    match client.next_event().await {
        ServerEvent::FileOpened { path, handle, content } => {
            assert_eq!(path, "a.txt");
            assert_eq!(handle, "h1");
            assert_eq!(content, "hello");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    client
        .send(r#"{"type":"write_file","handle":"h1","last_content":"hello","new_content":"hello world"}"#)
        .await;
    match client.next_event().await {
        ServerEvent::FileWritten { handle, content } => {
            assert_eq!(handle, "h1");
            assert_eq!(content, "hello world");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    assert_eq!(
        tokio::fs::read_to_string(dir.path().join("a.txt")).await.unwrap(),
        "hello world"
    );
}

#[tokio::test]
async fn peer_session_is_notified_but_writer_is_not_self_notified() {
    let dir = TempDir::new().unwrap();
    init_repo_with_commit(dir.path(), "a.txt", "v1");
    let registry = Registry::start(dir.path().to_path_buf()).unwrap();

    let mut a = Client::new(&registry);
    let mut b = Client::new(&registry);

    a.send(r#"{"type":"open_file","path":"a.txt","handle":"hA"}"#).await;
    let _ = a.next_event().await; // file_opened
    b.send(r#"{"type":"open_file","path":"a.txt","handle":"hB"}"#).await;
    let _ = b.next_event().await; // file_opened

    a.send(r#"{"type":"write_file","handle":"hA","last_content":"v1","new_content":"v2"}"#)
        .await;

    match a.next_event().await {
        ServerEvent::FileWritten { handle, content } => {
            assert_eq!(handle, "hA");
            assert_eq!(content, "v2");
        }
        other => panic!("unexpected event on writer: {other:?}"),
    }
    a.expect_no_event().await;

    match b.next_event().await {
        ServerEvent::FileUpdated { handle, content } => {
            assert_eq!(handle, "hB");
            assert_eq!(content, "v2");
        }
        other => panic!("unexpected event on peer: {other:?}"),
    }
}

#[tokio::test]
async fn committed_namespace_is_independent_of_working_tree_edits() {
    let dir = TempDir::new().unwrap();
    init_repo_with_commit(dir.path(), "t.md", "committed");
    std::fs::write(dir.path().join("t.md"), "working").unwrap();
    let registry = Registry::start(dir.path().to_path_buf()).unwrap();

    let mut client = Client::new(&registry);
    client
        .send(r#"{"type":"open_file","path":"t.md","handle":"hw"}"#)
        .await;
    match client.next_event().await {
        ServerEvent::FileOpened { content, .. } => assert_eq!(content, "working"),
        other => panic!("unexpected event: {other:?}"),
    }

    client
        .send(r#"{"type":"open_file","path":"@t.md","handle":"hc"}"#)
        .await;
    match client.next_event().await {
        ServerEvent::FileOpened { path, content, .. } => {
            assert_eq!(path, "@t.md");
            assert_eq!(content, "committed");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn merge_best_effort_never_reverts_current_on_disk_content() {
    let dir = TempDir::new().unwrap();
    init_repo_with_commit(dir.path(), "f.txt", "The quick brown fox");
    let registry = Registry::start(dir.path().to_path_buf()).unwrap();

    std::fs::write(dir.path().join("f.txt"), "The quick red fox").unwrap();

    let mut client = Client::new(&registry);
    client
        .send(r#"{"type":"open_file","path":"f.txt","handle":"h1"}"#)
        .await;
    let _ = client.next_event().await; // file_opened sees "The quick red fox"

    client
        .send(
            r#"{"type":"write_file","handle":"h1","last_content":"The quick brown fox","new_content":"The quick blue fox"}"#,
        )
        .await;

    let written = match client.next_event().await {
        ServerEvent::FileWritten { content, .. } => content,
        other => panic!("unexpected event: {other:?}"),
    };

    assert_eq!(written, "The quick red fox");
    assert_eq!(
        tokio::fs::read_to_string(dir.path().join("f.txt")).await.unwrap(),
        "The quick red fox"
    );
}

#[tokio::test]
async fn path_traversal_is_rejected_without_creating_a_registry_entry() {
    let dir = TempDir::new().unwrap();
    init_repo_with_commit(dir.path(), "a.txt", "hello");
    let registry = Registry::start(dir.path().to_path_buf()).unwrap();

    let mut client = Client::new(&registry);

    client
        .send(r#"{"type":"open_file","path":"../etc/passwd","handle":"h"}"#)
        .await;
    match client.next_event().await {
        ServerEvent::Error { message, .. } => assert!(message.contains("invalid path")),
        other => panic!("unexpected event: {other:?}"),
    }

    client
        .send(r#"{"type":"open_file","path":"a/./b","handle":"h2"}"#)
        .await;
    match client.next_event().await {
        ServerEvent::Error { message, .. } => assert!(message.contains("invalid path")),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn session_teardown_releases_every_handle_it_held() {
    let dir = TempDir::new().unwrap();
    init_repo_with_commit(dir.path(), "a.txt", "hello");
    let registry = Registry::start(dir.path().to_path_buf()).unwrap();

    let mut client = Client::new(&registry);
    client
        .send(r#"{"type":"open_file","path":"a.txt","handle":"h1"}"#)
        .await;
    let _ = client.next_event().await;

    client.session.teardown();

    // A fresh session can immediately reopen the same file; if teardown had
    // leaked the ref count this would simply return the cached content,
    // which is indistinguishable here, so instead we confirm the external
    // write below is observed, proving the entry was actually reloaded.
    std::fs::write(dir.path().join("a.txt"), "changed after teardown").unwrap();
    let mut other = Client::new(&registry);
    other
        .send(r#"{"type":"open_file","path":"a.txt","handle":"h2"}"#)
        .await;
    match other.next_event().await {
        ServerEvent::FileOpened { content, .. } => assert_eq!(content, "changed after teardown"),
        other => panic!("unexpected event: {other:?}"),
    }
}
