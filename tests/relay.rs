use std::net::SocketAddr;
use std::sync::Arc;

use sqlrelay::{Config, Reply, Server, SqlClient, Store};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const INSERT_BOB: &str = "INSERT INTO users (username, password) VALUES ('bob', 'pw')";

struct Relay {
    addr: SocketAddr,
    store: Arc<Store>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Relay {
    async fn start(store: Arc<Store>, config: Config) -> Relay {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::new(listener, Arc::clone(&store), &config);
        let addr = server.local_addr().unwrap();

        let (shutdown, rx) = oneshot::channel();
        let task = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        Relay {
            addr,
            store,
            shutdown,
            task,
        }
    }

    fn client(&self) -> SqlClient {
        SqlClient::new(self.addr.to_string())
    }

    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.task.await.unwrap();
        self.store.close().unwrap();
    }
}

fn open_store(dir: &TempDir) -> Arc<Store> {
    Arc::new(Store::open(dir.path().join("data").join("db.sqlite")).unwrap())
}

#[tokio::test]
async fn test_insert_duplicate_select() {
    let dir = TempDir::new().unwrap();
    let relay = Relay::start(open_store(&dir), Config::default()).await;
    let client = relay.client();

    let reply = client.send(INSERT_BOB).await.unwrap();
    assert_eq!(reply.insert_id(), Some(1));

    assert_eq!(
        client.send(INSERT_BOB).await.unwrap(),
        Reply::Error("UNIQUE constraint failed: users.username".to_string())
    );

    assert_eq!(
        client
            .send("SELECT username FROM users WHERE username = 'bob'")
            .await
            .unwrap(),
        Reply::Success(vec!["('bob',)".to_string()])
    );

    relay.stop().await;
}

#[tokio::test]
async fn test_wire_bytes() {
    let dir = TempDir::new().unwrap();
    let relay = Relay::start(open_store(&dir), Config::default()).await;
    let client = relay.client();

    let raw = |sql: &'static str| {
        let client = client.clone();
        async move {
            let mut payload = sql.as_bytes().to_vec();
            payload.push(0);
            client.send_raw(&payload).await.unwrap()
        }
    };

    assert_eq!(raw(INSERT_BOB).await, "SUCCESS|1");
    assert_eq!(raw("SELECT id, username FROM users").await, "SUCCESS|(1, 'bob')");
    assert_eq!(raw("SELECT * FROM users WHERE id = 99").await, "SUCCESS");
    assert_eq!(raw("UPDATE users SET password = 'x'").await, "SUCCESS");
    assert_eq!(raw("SELECT NULL, 1.5, x'00ff'").await, "SUCCESS|(None, 1.5, b'\\x00\\xff')");
    assert_eq!(raw("SELEC nonsense").await, "ERROR:near \"SELEC\": syntax error");

    relay.stop().await;
}

#[tokio::test]
async fn test_empty_requests() {
    let dir = TempDir::new().unwrap();
    let relay = Relay::start(open_store(&dir), Config::default()).await;
    let client = relay.client();

    assert_eq!(
        client.send("").await.unwrap(),
        Reply::Error("Empty query".to_string())
    );
    assert_eq!(
        client.send(" \r\n\t").await.unwrap(),
        Reply::Error("Empty query".to_string())
    );

    relay.stop().await;
}

#[tokio::test]
async fn test_bytes_after_terminator_are_ignored() {
    let dir = TempDir::new().unwrap();
    let relay = Relay::start(open_store(&dir), Config::default()).await;

    let reply = relay
        .client()
        .send_raw(format!("{}\0DROP TABLE users\0", INSERT_BOB).as_bytes())
        .await
        .unwrap();
    assert_eq!(reply, "SUCCESS|1");

    assert_eq!(
        relay.client().send("SELECT count(*) FROM users").await.unwrap(),
        Reply::Success(vec!["(1,)".to_string()])
    );

    relay.stop().await;
}

#[tokio::test]
async fn test_one_reply_then_close() {
    let dir = TempDir::new().unwrap();
    let relay = Relay::start(open_store(&dir), Config::default()).await;

    let mut stream = TcpStream::connect(relay.addr).await.unwrap();
    stream.write_all(b"SELECT 'a'\0").await.unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply, b"SUCCESS|('a',)\0");

    relay.stop().await;
}

#[tokio::test]
async fn test_concurrent_conflicting_writers() {
    let dir = TempDir::new().unwrap();
    let relay = Relay::start(open_store(&dir), Config::default()).await;

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let client = relay.client();
            tokio::spawn(async move { client.send(INSERT_BOB).await.unwrap() })
        })
        .collect();

    let mut inserted = 0;
    let mut failed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Reply::Success(fields) => {
                assert_eq!(fields, vec!["1".to_string()]);
                inserted += 1;
            }
            Reply::Error(message) => {
                assert_eq!(message, "UNIQUE constraint failed: users.username");
                failed += 1;
            }
        }
    }
    assert_eq!(inserted, 1);
    assert_eq!(failed, 15);

    relay.stop().await;
}

#[tokio::test]
async fn test_concurrent_distinct_writers() {
    let dir = TempDir::new().unwrap();
    let relay = Relay::start(open_store(&dir), Config::default()).await;

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let client = relay.client();
            tokio::spawn(async move {
                let sql = format!(
                    "INSERT INTO file_tracking (username, filename) VALUES ('bob', 'file{}.txt')",
                    i
                );
                client.send(&sql).await.unwrap().insert_id().unwrap()
            })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }
    ids.sort_unstable();
    assert_eq!(ids, (1..=20).collect::<Vec<i64>>());

    relay.stop().await;
}

#[tokio::test]
async fn test_oversized_statement_gets_reply() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        max_frame_bytes: 1024,
        ..Config::default()
    };
    let relay = Relay::start(open_store(&dir), config).await;
    let client = relay.client();

    let sql = format!("SELECT '{}'", "x".repeat(4 * 1024 * 1024));
    assert_eq!(
        client.send(&sql).await.unwrap(),
        Reply::Error("Query too large".to_string())
    );

    // The relay keeps serving normal requests.
    assert_eq!(
        client.send("SELECT 1").await.unwrap(),
        Reply::Success(vec!["(1,)".to_string()])
    );

    relay.stop().await;
}

#[tokio::test]
async fn test_comment_only_request_succeeds() {
    let dir = TempDir::new().unwrap();
    let relay = Relay::start(open_store(&dir), Config::default()).await;
    let client = relay.client();

    assert_eq!(client.send(";").await.unwrap(), Reply::Success(vec![]));
    assert_eq!(client.send("-- c").await.unwrap(), Reply::Success(vec![]));

    relay.stop().await;
}

#[tokio::test]
async fn test_statement_timeout() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        statement_timeout_ms: 100,
        ..Config::default()
    };
    let relay = Relay::start(open_store(&dir), config).await;
    let client = relay.client();

    let reply = client
        .send(
            "SELECT (WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
             SELECT count(*) FROM c)",
        )
        .await
        .unwrap();
    assert_eq!(reply, Reply::Error("Statement timed out".to_string()));

    assert_eq!(
        client.send("SELECT 1").await.unwrap(),
        Reply::Success(vec!["(1,)".to_string()])
    );

    relay.stop().await;
}

#[tokio::test]
async fn test_writes_survive_restart() {
    let dir = TempDir::new().unwrap();

    let relay = Relay::start(open_store(&dir), Config::default()).await;
    assert_eq!(relay.client().send(INSERT_BOB).await.unwrap().insert_id(), Some(1));
    relay.stop().await;

    let relay = Relay::start(open_store(&dir), Config::default()).await;
    assert_eq!(
        relay.client().send("SELECT username FROM users").await.unwrap(),
        Reply::Success(vec!["('bob',)".to_string()])
    );
    assert_eq!(
        relay
            .client()
            .send("INSERT INTO users (username, password) VALUES ('alice', 'pw')")
            .await
            .unwrap()
            .insert_id(),
        Some(2)
    );
    relay.stop().await;
}
