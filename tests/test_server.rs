use std::collections::BTreeSet;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::bail;
use tuby::app::{self, SharedApp};
use tuby::config::Strategy;
use tuby::http::response::Response;
use tuby::server::{self, Listener};

const TESTED: [Strategy; 3] = [Strategy::Sequential, Strategy::Threaded, Strategy::Reactor];

fn start(strategy: Strategy, app: SharedApp) -> SocketAddr {
    let listener = Listener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let _ = server::run(strategy, 1, listener, app);
    });
    addr
}

/// Echoes the path, fails on `/boom`, and answers `/weird` with an unknown status.
fn test_app() -> (SharedApp, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = app::from_fn(move |env| {
        counter.fetch_add(1, Ordering::SeqCst);
        match env.path() {
            "/boom" => bail!("boom"),
            "/weird" => Ok(Response::builder(999).body("???").build()),
            path => {
                let body = format!("ok:{path}");
                Ok(Response::builder(200)
                    .header("Content-Length", body.len().to_string())
                    .body(body)
                    .build())
            }
        }
    });
    (app, calls)
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

/// Reads until the server closes. A reset counts as "nothing more".
fn read_all(mut stream: TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    match stream.read_to_end(&mut buf) {
        Ok(_) => buf,
        Err(e) if e.kind() == io::ErrorKind::ConnectionReset => buf,
        Err(e) => panic!("read failed: {e}"),
    }
}

fn exchange(addr: SocketAddr, raw: &[u8]) -> Vec<u8> {
    let mut stream = connect(addr);
    stream.write_all(raw).unwrap();
    read_all(stream)
}

fn get(addr: SocketAddr, path: &str) -> String {
    let raw = format!("GET {path} HTTP/1.1\r\nHost: test\r\n\r\n");
    String::from_utf8(exchange(addr, raw.as_bytes())).unwrap()
}

fn ok_response(path: &str) -> String {
    let body = format!("ok:{path}");
    format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body)
}

#[test]
fn test_every_strategy_serves_a_request() {
    for strategy in TESTED {
        let (app, _) = test_app();
        let addr = start(strategy, app);

        assert_eq!(get(addr, "/hello"), ok_response("/hello"), "{strategy}");
    }
}

#[test]
fn test_strategies_produce_the_same_pairs() {
    let paths: Vec<String> = (0..8).map(|i| format!("/r{i}")).collect();
    let mut results = Vec::new();

    for strategy in TESTED {
        let (app, _) = test_app();
        let addr = start(strategy, app);

        let clients: Vec<_> = paths
            .iter()
            .cloned()
            .map(|path| thread::spawn(move || (path.clone(), get(addr, &path))))
            .collect();
        let pairs: BTreeSet<(String, String)> = clients.into_iter().map(|c| c.join().unwrap()).collect();

        results.push((strategy, pairs));
    }

    let expected: BTreeSet<(String, String)> = paths.iter().map(|p| (p.clone(), ok_response(p))).collect();
    for (strategy, pairs) in results {
        assert_eq!(pairs, expected, "{strategy}");
    }
}

#[test]
fn test_failure_does_not_affect_in_flight_request() {
    for strategy in [Strategy::Threaded, Strategy::Reactor] {
        let (app, _) = test_app();
        let addr = start(strategy, app);

        let mut in_flight = connect(addr);
        in_flight.write_all(b"GET /ok HTTP/1.1\r\nHo").unwrap();
        thread::sleep(Duration::from_millis(50));

        let failed = exchange(addr, b"GET /boom HTTP/1.1\r\n\r\n");
        assert!(failed.is_empty(), "{strategy}: failed request got {:?}", failed);

        in_flight.write_all(b"st: test\r\n\r\n").unwrap();
        let answered = String::from_utf8(read_all(in_flight)).unwrap();
        assert_eq!(answered, ok_response("/ok"), "{strategy}");
    }
}

#[test]
fn test_empty_connection_does_not_reach_application() {
    for strategy in TESTED {
        let (app, calls) = test_app();
        let addr = start(strategy, app);

        let stream = connect(addr);
        stream.shutdown(Shutdown::Write).unwrap();
        assert!(read_all(stream).is_empty(), "{strategy}");
        assert_eq!(calls.load(Ordering::SeqCst), 0, "{strategy}");

        assert_eq!(get(addr, "/after"), ok_response("/after"), "{strategy}");
    }
}

#[test]
fn test_errors_close_without_response_and_server_keeps_going() {
    for strategy in TESTED {
        let (app, _) = test_app();
        let addr = start(strategy, app);

        assert!(exchange(addr, b"garbage\r\n\r\n").is_empty(), "{strategy}");
        assert!(exchange(addr, b"GET /weird HTTP/1.1\r\n\r\n").is_empty(), "{strategy}");
        assert!(exchange(addr, b"GET /boom HTTP/1.1\r\n\r\n").is_empty(), "{strategy}");

        assert_eq!(get(addr, "/still-up"), ok_response("/still-up"), "{strategy}");
    }
}

#[cfg(unix)]
#[test]
fn test_prefork_rejects_zero_workers() {
    let (app, _) = test_app();
    let listener = Listener::bind("127.0.0.1:0").unwrap();

    assert!(matches!(
        server::run(Strategy::Prefork, 0, listener, app),
        Err(server::ServerError::NoWorkers)
    ));
}

/// The server binary running in its own process group; the whole group is
/// killed on drop so forked workers do not outlive the test.
#[cfg(unix)]
struct ServerProcess(std::process::Child);

#[cfg(unix)]
impl ServerProcess {
    fn spawn(envs: &[(&str, &str)]) -> Self {
        use std::os::unix::process::CommandExt;
        use std::process::{Command, Stdio};

        let child = Command::new(env!("CARGO_BIN_EXE_tuby"))
            .env_remove("TUBY_CONFIG")
            .envs(envs.iter().copied())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .unwrap();
        Self(child)
    }
}

#[cfg(unix)]
impl Drop for ServerProcess {
    fn drop(&mut self) {
        // SAFETY: plain syscall; the group id is the child's pid.
        unsafe {
            libc::kill(-(self.0.id() as libc::pid_t), libc::SIGKILL);
        }
        let _ = self.0.wait();
    }
}

#[cfg(unix)]
fn wait_for_listener(addr: SocketAddr) {
    for _ in 0..100 {
        if TcpStream::connect(addr).is_ok() {
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
    panic!("nothing listening on {addr}");
}

#[cfg(unix)]
#[test]
fn test_prefork_workers_serve_requests() {
    let addr = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let listen = addr.to_string();
    let _server = ServerProcess::spawn(&[("STRATEGY", "prefork"), ("WORKERS", "2"), ("LISTEN", &listen)]);

    wait_for_listener(addr);

    let clients: Vec<_> = (0..4)
        .map(|_| thread::spawn(move || get(addr, "/")))
        .collect();
    for client in clients {
        assert_eq!(
            client.join().unwrap(),
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 6\r\n\r\nhello\n"
        );
    }
}
