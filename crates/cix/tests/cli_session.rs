#![cfg(all(unix, feature = "cli"))]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "cix-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

struct Server {
    child: Child,
    stdout: BufReader<ChildStdout>,
    port: u16,
}

/// Start `cix serve` on an ephemeral port and read the port back from its
/// JSON announcement.
fn start_server(root: &Path) -> Server {
    let mut child = Command::new(env!("CARGO_BIN_EXE_cix"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("serve")
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg("0")
        .arg("--root")
        .arg(root)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve command should start");

    let mut stdout = BufReader::new(child.stdout.take().expect("piped stdout"));
    let mut line = String::new();
    stdout
        .read_line(&mut line)
        .expect("server should announce its address");
    let announcement: serde_json::Value =
        serde_json::from_str(line.trim()).expect("announcement should be json");
    assert_eq!(announcement["event"], "listening");
    let port = announcement["addr"]
        .as_str()
        .and_then(|addr| addr.rsplit(':').next())
        .and_then(|port| port.parse().ok())
        .expect("announcement should carry a port");

    Server {
        child,
        stdout,
        port,
    }
}

fn run_client(port: u16, local_dir: &Path, script: &str) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_cix"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("connect")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string())
        .arg("--local-dir")
        .arg(local_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("connect command should start");

    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(script.as_bytes())
        .expect("script should be written");

    child.wait_with_output().expect("client should finish")
}

fn interrupt(child: &Child) {
    let status = Command::new("kill")
        .arg("-INT")
        .arg(child.id().to_string())
        .status()
        .expect("kill should run");
    assert!(status.success());
}

/// Wait for `child` to exit, killing it and failing if it outlives `limit`.
fn wait_within(child: &mut Child, limit: Duration) -> ExitStatus {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait().expect("child status") {
            return status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            panic!("process did not exit within {limit:?}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn records(output: &std::process::Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect()
}

#[test]
fn put_get_rm_session_against_real_server() {
    let remote = unique_temp_dir("remote");
    let local = unique_temp_dir("local");
    let mut server = start_server(&remote);

    std::fs::write(local.join("upload.txt"), b"first line\nsecond line\n").expect("seed file");

    let output = run_client(server.port, &local, "put upload.txt\nls\nrm upload.txt\nget upload.txt\n");
    assert!(output.status.success());

    let records = records(&output);
    assert_eq!(records.len(), 4);
    assert_eq!(records[0]["command"], "put");
    assert_eq!(records[0]["status"], "ok");
    assert_eq!(records[0]["bytes"], 23);
    assert_eq!(records[1]["command"], "ls");
    assert!(records[1]["listing"]
        .as_str()
        .expect("listing text")
        .contains("upload.txt"));
    assert_eq!(records[2]["status"], "ok");
    assert_eq!(records[3]["status"], "failed");
    assert_eq!(records[3]["response"], "NAK");
    assert!(!remote.join("upload.txt").exists());

    let _ = server.child.kill();
    let _ = server.child.wait();
    let _ = std::fs::remove_dir_all(&remote);
    let _ = std::fs::remove_dir_all(&local);
}

#[test]
fn two_clients_share_one_server() {
    let remote = unique_temp_dir("shared");
    let local_a = unique_temp_dir("client-a");
    let local_b = unique_temp_dir("client-b");
    let mut server = start_server(&remote);

    std::fs::write(local_a.join("a.bin"), vec![1u8; 70_000]).expect("seed a");
    std::fs::write(local_b.join("b.bin"), vec![2u8; 10]).expect("seed b");

    let port = server.port;
    let (a_dir, b_dir) = (local_a.clone(), local_b.clone());
    let a = std::thread::spawn(move || run_client(port, &a_dir, "put a.bin\n"));
    let b = std::thread::spawn(move || run_client(port, &b_dir, "put b.bin\n"));
    let a = a.join().expect("client a thread");
    let b = b.join().expect("client b thread");

    assert_eq!(records(&a)[0]["status"], "ok");
    assert_eq!(records(&b)[0]["status"], "ok");
    assert_eq!(std::fs::read(remote.join("a.bin")).expect("a stored"), vec![1u8; 70_000]);
    assert_eq!(std::fs::read(remote.join("b.bin")).expect("b stored"), vec![2u8; 10]);

    let _ = server.child.kill();
    let _ = server.child.wait();
    let _ = std::fs::remove_dir_all(&remote);
    let _ = std::fs::remove_dir_all(&local_a);
    let _ = std::fs::remove_dir_all(&local_b);
}

#[test]
fn interrupt_stops_server_and_reports_reaped_handlers() {
    let remote = unique_temp_dir("sigint");
    let local = unique_temp_dir("sigint-local");
    let mut server = start_server(&remote);

    let output = run_client(server.port, &local, "ls\nexit\n");
    assert!(output.status.success());

    interrupt(&server.child);

    let exit = wait_within(&mut server.child, Duration::from_secs(5));
    assert!(exit.success());

    let mut line = String::new();
    server
        .stdout
        .read_line(&mut line)
        .expect("server should report stats");
    let stats: serde_json::Value = serde_json::from_str(line.trim()).expect("stats json");
    assert_eq!(stats["event"], "stopped");
    assert_eq!(stats["accepted"], stats["reaped"]);

    let _ = std::fs::remove_dir_all(&remote);
    let _ = std::fs::remove_dir_all(&local);
}

#[test]
fn second_interrupt_closes_idle_clients() {
    let remote = unique_temp_dir("idle");
    let mut server = start_server(&remote);

    let mut idle = cix_peer::connect("127.0.0.1", server.port).expect("client should connect");
    idle.ls().expect("handler should be serving");

    interrupt(&server.child);
    std::thread::sleep(Duration::from_millis(200));
    interrupt(&server.child);

    let exit = wait_within(&mut server.child, Duration::from_secs(5));
    assert!(exit.success());

    let mut line = String::new();
    server
        .stdout
        .read_line(&mut line)
        .expect("server should report stats");
    let stats: serde_json::Value = serde_json::from_str(line.trim()).expect("stats json");
    assert_eq!(stats["event"], "stopped");
    assert_eq!(stats["accepted"], 1);
    assert_eq!(stats["reaped"], 1);
    assert!(idle.ls().is_err());

    let _ = std::fs::remove_dir_all(&remote);
}

#[test]
fn interrupted_client_exits_successfully() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stand-in server");
    let port = listener.local_addr().expect("stand-in addr").port();
    let local = unique_temp_dir("interrupted-client");

    let mut client = Command::new(env!("CARGO_BIN_EXE_cix"))
        .arg("--log-level")
        .arg("error")
        .arg("connect")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string())
        .arg("--local-dir")
        .arg(&local)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("connect command should start");

    // The handler is installed before connecting, so an accepted connection
    // means the client is ready for the signal.
    let (mut server_side, _) = listener.accept().expect("client should connect");
    interrupt(&client);

    let exit = wait_within(&mut client, Duration::from_secs(5));
    assert_eq!(exit.code(), Some(0));

    let mut stderr = String::new();
    client
        .stderr
        .take()
        .expect("piped stderr")
        .read_to_string(&mut stderr)
        .expect("stderr should be readable");
    assert!(stderr.contains("interrupted"));

    let mut rest = Vec::new();
    let read = server_side.read_to_end(&mut rest).expect("read to eof");
    assert_eq!(read, 0);

    let _ = std::fs::remove_dir_all(&local);
}

#[test]
fn connect_to_closed_port_returns_transport_code() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind throwaway listener");
        listener.local_addr().expect("throwaway addr").port()
    };

    let output = Command::new(env!("CARGO_BIN_EXE_cix"))
        .arg("connect")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string())
        .stdin(Stdio::null())
        .output()
        .expect("connect should run");

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn serve_rejects_missing_root() {
    let parent = unique_temp_dir("missing-root");
    let missing = parent.join("nope");

    let output = Command::new(env!("CARGO_BIN_EXE_cix"))
        .arg("serve")
        .arg("--port")
        .arg("0")
        .arg("--root")
        .arg(&missing)
        .output()
        .expect("serve should run");

    assert_eq!(output.status.code(), Some(64));
    let _ = std::fs::remove_dir_all(&parent);
}

#[test]
fn version_reports_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_cix"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("cix {}", env!("CARGO_PKG_VERSION")));
}
