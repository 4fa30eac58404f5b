use clap::Parser;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tailpack::cli::{Cli, CliHandler, Outcome};
use tempfile::TempDir;

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

fn fixture(stylesheet: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "tailpack.config.json",
        r#"{
            "entry": { "main": "./src/main.js" },
            "output": { "path": "dist", "publicPath": "/static/bundles/" },
            "targets": ["safari 12"]
        }"#,
    );
    write(root, "src/main.js", "import '../css/main.css';\nconsole.log('app');\n");
    write(root, "css/main.css", stylesheet);
    dir
}

fn tailpack() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tailpack"))
}

#[tokio::test]
async fn test_execute_build_reports_completion() {
    let dir = fixture(".btn { @apply px-4; }\n");
    let root = dir.path().to_str().unwrap();

    let cli = Cli::try_parse_from(["tailpack", "build", "--root", root]).unwrap();
    let outcome = CliHandler::new().execute(cli).await.unwrap();

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(outcome.exit_code(), 0);
    assert!(dir.path().join("manifest.json").is_file());
}

#[tokio::test]
async fn test_execute_build_fails_on_transform_error() {
    let dir = fixture(".btn { @apply no-such-thing; }\n");
    let root = dir.path().to_str().unwrap();

    let cli = Cli::try_parse_from(["tailpack", "build", "--root", root]).unwrap();
    let err = CliHandler::new().execute(cli).await.unwrap_err();

    assert!(err.to_string().contains("no-such-thing"));
    assert!(!dir.path().join("manifest.json").exists());
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn test_build_exits_non_zero_on_transform_error() {
    let dir = fixture(".btn { @apply no-such-thing; }\n");

    let output = tailpack()
        .args(["build", "--root"])
        .arg(dir.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("tailpack failed"), "{}", stderr);
    assert!(stderr.contains("no-such-thing"), "{}", stderr);
}

#[test]
fn test_build_exits_zero_on_success() {
    let dir = fixture(".btn { @apply px-4; }\n");

    let status = tailpack()
        .args(["build", "--root"])
        .arg(dir.path())
        .stdout(Stdio::null())
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(0));
}

#[cfg(unix)]
#[test]
fn test_dev_exits_130_after_ctrl_c() {
    let dir = fixture(".btn { @apply px-4; }\n");
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let mut child = tailpack()
        .args(["dev", "--host", "127.0.0.1", "--backend", "http://127.0.0.1:9"])
        .args(["--port", &port.to_string(), "--root"])
        .arg(dir.path())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    // One full request/response so the server loop is running
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut stream = loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => break stream,
            Err(_) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(50)),
            Err(e) => {
                let _ = child.kill();
                panic!("dev server never came up: {}", e);
            }
        }
    };
    stream
        .write_all(b"GET /__tailpack/nothing HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    assert!(response.starts_with("HTTP/1.1 404"), "{}", response);
    std::thread::sleep(Duration::from_millis(300));

    let sent = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(sent.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("dev server ignored Ctrl+C");
        }
        std::thread::sleep(Duration::from_millis(50));
    };
    assert_eq!(status.code(), Some(130));
}
