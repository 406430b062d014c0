mod common;

use common::init_test_logging;
use paw_collect::executor::{ClickHouseExecutor, ExecutionError, Executor};
use paw_common::Settings;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

struct CapturedRequest {
    request_line: String,
    headers: Vec<String>,
    body: String,
}

/// Serve exactly one HTTP exchange with a canned response.
fn serve_once(response: String) -> (u16, mpsc::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();

        let mut headers = Vec::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end().to_string();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':')
                && name.eq_ignore_ascii_case("content-length")
            {
                content_length = value.trim().parse().unwrap();
            }
            headers.push(line.to_ascii_lowercase());
        }

        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).unwrap();

        let mut stream = stream;
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();

        let _ = tx.send(CapturedRequest {
            request_line: request_line.trim_end().to_string(),
            headers,
            body: String::from_utf8(body).unwrap(),
        });
    });

    (port, rx)
}

fn executor(port: u16, extra: &str) -> ClickHouseExecutor {
    let settings: Settings = toml::from_str(&format!(
        "host = \"127.0.0.1\"\nport = {port}\nuser = \"bench\"\n{extra}"
    ))
    .unwrap();
    ClickHouseExecutor::from_settings(&settings).unwrap()
}

#[test]
fn query_is_posted_and_progress_is_accumulated() {
    init_test_logging();
    let body = "1\n";
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         X-ClickHouse-Progress: {{\"read_rows\":\"0\",\"elapsed_ns\":\"1500\"}}\r\n\
         X-ClickHouse-Progress: {{\"read_rows\":\"1\",\"elapsed_ns\":\"3000\"}}\r\n\
         X-ClickHouse-Summary: {{\"read_rows\":\"1\",\"elapsed_ns\":\"2000\"}}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{body}",
        body.len()
    );
    let (port, requests) = serve_once(response);

    let mut executor = executor(port, "max_threads = 4");
    let sample = executor.run("SELECT 1").unwrap();

    assert_eq!(sample.server_duration, Duration::from_nanos(3000));
    assert!(sample.client_duration > Duration::ZERO);

    let request = requests.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(request.request_line.starts_with("POST /?"));
    assert!(request.request_line.contains("send_progress_in_http_headers=1"));
    assert!(request.request_line.contains("max_threads=4"));
    assert!(request.request_line.contains("wait_end_of_query=1"));
    assert!(request.headers.iter().any(|h| h == "x-clickhouse-user: bench"));
    assert_eq!(request.body, "SELECT 1");
}

#[test]
fn wait_end_of_query_can_be_overridden() {
    init_test_logging();
    let response =
        "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
    let (port, requests) = serve_once(response);

    let mut executor = executor(port, "wait_end_of_query = false");
    let sample = executor.run("SELECT 1").unwrap();
    assert_eq!(sample.server_duration, Duration::ZERO);

    let request = requests.recv_timeout(Duration::from_secs(5)).unwrap();
    let line = &request.request_line;
    assert!(line.contains("wait_end_of_query=0"));
    assert_eq!(line.matches("wait_end_of_query").count(), 1);
}

#[test]
fn server_error_is_reported_with_body() {
    init_test_logging();
    let body = "Code: 62. DB::Exception: Syntax error";
    let response = format!(
        "HTTP/1.1 500 Internal Server Error\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{body}",
        body.len()
    );
    let (port, _requests) = serve_once(response);

    let err = executor(port, "").run("SELEC 1").unwrap_err();
    match err {
        ExecutionError::Status { status, body, .. } => {
            assert_eq!(status, 500);
            assert!(body.contains("Syntax error"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn connection_refused_is_transport_error() {
    init_test_logging();
    // Bind and drop to find a port nobody listens on.
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let err = executor(port, "").run("SELECT 1").unwrap_err();
    assert!(matches!(err, ExecutionError::Transport { .. }));
}
