#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use emitprims::spark::{connect_with, EmitterConfig, Spark};
use serde_json::Value;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/emitcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("socket never appeared at {}", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn connect_with_retry(
    path: &Path,
    timeout: Duration,
    setup: impl Fn(&Spark),
) -> Spark {
    let start = Instant::now();
    loop {
        match connect_with(path, EmitterConfig::default(), &setup) {
            Ok(spark) => return spark,
            Err(err) if start.elapsed() >= timeout => panic!("connect timeout: {err}"),
            Err(_) => thread::sleep(Duration::from_millis(25)),
        }
    }
}

fn run_send(path: &Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_emitprims"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg(path)
        .args(extra)
        .output()
        .expect("send should run")
}

#[test]
fn send_with_ack_gets_listener_reply() {
    let dir = unique_temp_dir("ack");
    let sock_path = dir.join("news.sock");

    let child = Command::new(env!("CARGO_BIN_EXE_emitprims"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("listen")
        .arg(&sock_path)
        .arg("--event")
        .arg("news")
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen command should start");

    wait_for_socket(&sock_path, Duration::from_secs(3));

    let mut output = run_send(&sock_path, &["news", "--json", "\"hello\"", "--ack"]);
    for _ in 0..20 {
        if output.status.code() != Some(3) {
            break;
        }
        thread::sleep(Duration::from_millis(25));
        output = run_send(&sock_path, &["news", "--json", "\"hello\"", "--ack"]);
    }

    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ack-received.schema.json"));
    let ack: Value = serde_json::from_str(stdout.trim()).expect("ack output should be json");
    assert_eq!(ack["result"], "received");

    let listened = child.wait_with_output().expect("listen should exit");
    assert!(listened.status.success());
    let stdout = String::from_utf8_lossy(&listened.stdout);
    let event: Value = serde_json::from_str(stdout.trim()).expect("event output should be json");
    assert_eq!(event["event"], "news");
    assert_eq!(event["args"], serde_json::json!(["hello"]));
    assert!(event["ack_id"].is_u64());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn broadcast_reaches_every_peer() {
    let dir = unique_temp_dir("broadcast");
    let sock_path = dir.join("tick.sock");

    let child = Command::new(env!("CARGO_BIN_EXE_emitprims"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("broadcast")
        .arg(&sock_path)
        .arg("tick")
        .arg("--json")
        .arg("7")
        .arg("--peers")
        .arg("2")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("broadcast command should start");

    wait_for_socket(&sock_path, Duration::from_secs(3));

    let (tx, rx) = mpsc::channel();
    let mut peers = Vec::new();
    for _ in 0..2 {
        let spark = connect_with_retry(&sock_path, Duration::from_secs(3), |spark| {
            let tx = tx.clone();
            spark
                .on("tick", move |args, _reply| {
                    let _ = tx.send(args.to_vec());
                })
                .expect("listener should register");
        });
        peers.push(spark);
    }

    for _ in 0..2 {
        let args = rx
            .recv_timeout(Duration::from_secs(3))
            .expect("each peer should receive the broadcast");
        assert_eq!(args, vec![serde_json::json!(7)]);
    }

    let output = child.wait_with_output().expect("broadcast should exit");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let report: Value = serde_json::from_str(stdout.trim()).expect("report should be json");
    assert_eq!(report["delivered"].as_array().map(Vec::len), Some(2));
    assert_eq!(report["failed"], serde_json::json!([]));

    for peer in peers {
        peer.close();
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_to_missing_socket_is_transport_error() {
    let dir = unique_temp_dir("missing");
    let output = run_send(&dir.join("nobody.sock"), &["news"]);
    assert_eq!(output.status.code(), Some(3));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_reserved_event_is_usage_error() {
    let dir = unique_temp_dir("reserved");
    let output = run_send(&dir.join("nobody.sock"), &["ack"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("reserved"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_json_arg_is_usage_error() {
    let dir = unique_temp_dir("badjson");
    let output = run_send(&dir.join("nobody.sock"), &["news", "--json", "{oops"]);
    assert_eq!(output.status.code(), Some(64));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_emitprims"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("emitprims {}", env!("CARGO_PKG_VERSION"))
    );
}
