use gate::{RequestSigner, SharedSecret};
use serde_json::{Value, json};
use std::{
    fs,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

#[cfg(test)]
use serial_test::serial;

const START_TIMEOUT: Duration = Duration::from_secs(15);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn choose_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
    listener.local_addr().expect("probe addr").port()
}

fn write_config(dir: &Path, port: u16, sqlite_path: &str) -> PathBuf {
    let config_path = dir.join("config.toml");
    fs::write(
        &config_path,
        format!(
            r#"
name = "addrbook-process-test"
env = "test"
sqlite_path = "{sqlite}"
pid = "{pid}"

[bind.http]
domain_name = "localhost"
ip = "127.0.0.1"
port = {port}

[auth]
secret = "czNjcjN0"
nonce_retention_secs = 600

[observability.log]
output = "console"
"#,
            sqlite = sqlite_path,
            pid = dir.join("addrbook.pid").display()
        ),
    )
    .expect("write config");
    config_path
}

fn spawn_addrbook(config: &Path, log_path: &Path) -> Child {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_addrbook"));
    let log_file = fs::File::create(log_path).expect("create log file");
    Command::new(bin)
        .arg("--config")
        .arg(config)
        .env_remove("RUST_LOG")
        .stdout(Stdio::from(log_file.try_clone().expect("dup log")))
        .stderr(Stdio::from(log_file))
        .spawn()
        .expect("spawn addrbook")
}

async fn wait_for_health(url: &str, child: &mut Child, log_path: &Path) {
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().unwrap_or(None) {
            let log = fs::read_to_string(log_path).unwrap_or_default();
            panic!("addrbook exited early: status={status:?}\nlogs:\n{log}");
        }

        if let Ok(resp) = client.get(url).send().await
            && resp.status().is_success()
        {
            return;
        }
        if start.elapsed() > START_TIMEOUT {
            let log = fs::read_to_string(log_path).unwrap_or_default();
            panic!("health check not ready at {url}\nlogs:\n{log}");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// 发送 SIGINT 并等待退出，超时则强杀；返回是否正常退出
fn graceful_shutdown(mut child: Child) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;
        let _ = kill(Pid::from_raw(child.id() as i32), Signal::SIGINT);
    }
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return status.success(),
            Ok(None) => {
                if start.elapsed() > SHUTDOWN_TIMEOUT {
                    let _ = child.kill();
                    return false;
                }
                thread::sleep(Duration::from_millis(100));
            }
            Err(_) => return false,
        }
    }
}

#[tokio::test]
#[serial]
async fn addrbook_serves_signed_flow_and_shuts_down() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let port = choose_port();
    let data_dir = tmp.path().join("data");
    let config_path = write_config(tmp.path(), port, &data_dir.display().to_string());
    let log_path = tmp.path().join("addrbook.log");
    let mut child = spawn_addrbook(&config_path, &log_path);

    let base_url = format!("http://127.0.0.1:{port}");
    wait_for_health(&format!("{base_url}/health"), &mut child, &log_path).await;
    assert!(data_dir.join("addrbook.db").exists());
    assert!(tmp.path().join("addrbook.pid").exists());

    let client = reqwest::Client::new();
    let created = client
        .post(format!("{base_url}/users/create"))
        .json(&json!({
            "user_name": "Maria Silva",
            "user_email": "maria@example.com",
            "user_password": "Secret123"
        }))
        .send()
        .await
        .expect("create user");
    assert_eq!(created.status(), reqwest::StatusCode::CREATED);

    let login: Value = client
        .post(format!("{base_url}/users/login"))
        .json(&json!({
            "user_email": "maria@example.com",
            "user_password": "Secret123"
        }))
        .send()
        .await
        .expect("login")
        .json()
        .await
        .expect("login json");
    let user_id = login["user_id"].as_i64().expect("user_id");

    let secret = SharedSecret::from_base64("czNjcjN0").expect("secret");
    let signer = RequestSigner::new(secret, user_id);
    let headers = signer.sign("POST", "/users/get", b"");
    let mut request = client.post(format!("{base_url}/users/get"));
    for (name, value) in headers.pairs() {
        request = request.header(name, value);
    }
    let resp = request.send().await.expect("signed get");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    // 未签名请求被拒绝
    let resp = client
        .post(format!("{base_url}/address/create"))
        .body("{}")
        .send()
        .await
        .expect("unsigned create");
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let metrics = client
        .get(format!("{base_url}/metrics"))
        .send()
        .await
        .expect("metrics")
        .text()
        .await
        .expect("metrics body");
    assert!(metrics.contains("addrbook_gate_admissions_total"), "metrics: {metrics}");
    assert!(metrics.contains("addrbook_build_info"), "metrics: {metrics}");

    let exited_cleanly = graceful_shutdown(child);
    let log = fs::read_to_string(&log_path).unwrap_or_default();
    assert!(exited_cleanly, "addrbook should exit cleanly on SIGINT\nlogs:\n{log}");
    assert!(
        !tmp.path().join("addrbook.pid").exists(),
        "PID file should be removed on shutdown"
    );
    assert!(log.contains("Nonce ledger reaper stopped"), "logs:\n{log}");
}

#[tokio::test]
#[serial]
async fn addrbook_exits_when_database_path_is_unavailable() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let port = choose_port();
    let config_path = write_config(tmp.path(), port, "/proc/addrbook-db-denied");
    let log_path = tmp.path().join("addrbook-invalid-db.log");
    let mut child = spawn_addrbook(&config_path, &log_path);

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("check child status") {
            assert!(
                !status.success(),
                "process should exit with non-zero status when db init fails"
            );
            let log = fs::read_to_string(&log_path).unwrap_or_default();
            let log_lower = log.to_lowercase();
            assert!(
                log_lower.contains("database")
                    || log.contains("数据库")
                    || log_lower.contains("sqlite"),
                "expected database failure hint in logs, got: {log}"
            );
            return;
        }

        if start.elapsed() > START_TIMEOUT {
            graceful_shutdown(child);
            panic!("addrbook should fail fast when database path is unavailable");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
