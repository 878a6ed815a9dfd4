use bytes::Bytes;
use minikv::commands::CommandHandler;
use minikv::protocol::RespValue;
use minikv::storage::{AppendLog, StorageEngine};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start(handler: CommandHandler) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(minikv::server::run(listener, handler));
    addr
}

struct Client {
    stream: TcpStream,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Client {
        Client {
            stream: TcpStream::connect(addr).await.unwrap(),
        }
    }

    async fn send(&mut self, args: &[&str]) {
        let request = RespValue::array(
            args.iter()
                .map(|s| RespValue::bulk_string(Bytes::from(s.to_string())))
                .collect(),
        );
        self.stream.write_all(&request.serialize()).await.unwrap();
    }

    async fn expect(&mut self, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        tokio::time::timeout(Duration::from_secs(2), self.stream.read_exact(&mut buf))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&buf),
            String::from_utf8_lossy(expected)
        );
    }

    async fn call(&mut self, args: &[&str], expected: &[u8]) {
        self.send(args).await;
        self.expect(expected).await;
    }

    async fn expect_closed(&mut self) {
        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(Duration::from_secs(2), self.stream.read(&mut buf))
            .await
            .expect("timed out waiting for close");
        match read {
            Ok(0) | Err(_) => {}
            Ok(n) => panic!("unexpected reply: {:?}", String::from_utf8_lossy(&buf[..n])),
        }
    }
}

fn new_handler() -> CommandHandler {
    CommandHandler::new(Arc::new(StorageEngine::new()))
}

fn temp_log(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "minikv-it-{}-{}-{}.log",
        name,
        std::process::id(),
        nanos
    ))
}

#[tokio::test]
async fn ping_echo_set_get() {
    let addr = start(new_handler()).await;
    let mut client = Client::connect(addr).await;

    client.call(&["PING"], b"+PONG\r\n").await;
    client.call(&["ECHO", "hello"], b"$5\r\nhello\r\n").await;
    client.call(&["SET", "foo", "bar"], b"+OK\r\n").await;
    client.call(&["GET", "foo"], b"+bar\r\n").await;
    client.call(&["GET", "nope"], b"$-1\r\n").await;
}

#[tokio::test]
async fn simple_string_requests_are_accepted() {
    let addr = start(new_handler()).await;
    let mut client = Client::connect(addr).await;

    client.stream.write_all(b"*2\r\n+ECHO\r\n+hi\r\n").await.unwrap();
    client.expect(b"$2\r\nhi\r\n").await;
}

#[tokio::test]
async fn set_with_ttl_expires() {
    let storage = Arc::new(StorageEngine::new());
    let addr = start(CommandHandler::new(Arc::clone(&storage))).await;
    let mut client = Client::connect(addr).await;

    client
        .call(&["SET", "session", "abc", "PX", "50"], b"+OK\r\n")
        .await;
    client.call(&["GET", "session"], b"+abc\r\n").await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    client.call(&["GET", "session"], b"$-1\r\n").await;
    assert!(storage.is_empty());
}

#[tokio::test]
async fn unknown_command_then_valid_command() {
    let addr = start(new_handler()).await;
    let mut client = Client::connect(addr).await;

    client
        .call(&["FOO"], b"-ERR unknown command 'FOO'\r\n")
        .await;
    client.call(&["PING"], b"+PONG\r\n").await;
}

#[tokio::test]
async fn set_arity_error_ends_session() {
    let addr = start(new_handler()).await;
    let mut client = Client::connect(addr).await;

    client
        .call(&["SET", "foo"], b"-ERR handling command: 'SET'\r\n")
        .await;

    let _ = client.stream.write_all(b"*1\r\n$4\r\nPING\r\n").await;
    client.expect_closed().await;
}

#[tokio::test]
async fn malformed_request_ends_session_silently() {
    let addr = start(new_handler()).await;
    let mut client = Client::connect(addr).await;

    client.stream.write_all(b"-ERR not a request\r\n").await.unwrap();
    client.expect_closed().await;
}

#[tokio::test]
async fn concurrent_clients_share_the_store() {
    let storage = Arc::new(StorageEngine::new());
    let addr = start(CommandHandler::new(Arc::clone(&storage))).await;

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            tokio::spawn(async move {
                let mut client = Client::connect(addr).await;
                for j in 0..50 {
                    let key = format!("k:{}:{}", i, j);
                    let value = format!("v{}", j);
                    client
                        .call(&["SET", key.as_str(), value.as_str()], b"+OK\r\n")
                        .await;
                    let expected = format!("+{}\r\n", value);
                    client.call(&["GET", key.as_str()], expected.as_bytes()).await;
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(storage.len(), 8 * 50);
}

#[tokio::test]
async fn append_log_survives_restart() {
    let path = temp_log("restart");
    let _ = std::fs::remove_file(&path);

    {
        let log = Arc::new(AppendLog::open(&path).unwrap());
        let addr = start(new_handler().with_persistence(log)).await;
        let mut client = Client::connect(addr).await;

        client.call(&["SET", "name", "Ariz"], b"+OK\r\n").await;
        client.call(&["SET", "name", "Ariz v2"], b"+OK\r\n").await;
        client.call(&["SET", "user:101", "a:b"], b"+OK\r\n").await;
        client
            .call(&["SET", "session", "tok", "PX", "20"], b"+OK\r\n")
            .await;
        client
            .call(&["SET", "cart", "3", "EX", "60"], b"+OK\r\n")
            .await;
    }

    tokio::time::sleep(Duration::from_millis(50)).await;

    let storage = Arc::new(StorageEngine::new());
    let stats = AppendLog::replay(&path, &storage).unwrap();
    assert_eq!((stats.applied, stats.expired), (4, 1));
    let addr = start(CommandHandler::new(storage)).await;
    let mut client = Client::connect(addr).await;

    client.call(&["GET", "name"], b"+Ariz v2\r\n").await;
    client.call(&["GET", "user:101"], b"+a:b\r\n").await;
    client.call(&["GET", "session"], b"$-1\r\n").await;
    client.call(&["GET", "cart"], b"+3\r\n").await;

    std::fs::remove_file(&path).unwrap();
}
