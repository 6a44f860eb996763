// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects-pipeline specs: hook ordering around env writes, hook
//! timeouts, and pipeline throughput after a timeout.

use overseer_config::parse_str;
use overseer_daemon::logstream::LogStreamer;
use overseer_daemon::orchestrator::{Orchestrator, OrchestratorOptions};
use overseer_daemon::secrets::MemorySecretStore;
use overseer_daemon::tunnel::FakeLauncher;
use overseer_core::sensor::{PUBLIC_IPV4, TCP};
use overseer_core::{Clock, Payload, SensorReading, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

async fn start(hcl: &str) -> (Arc<Orchestrator>, LogStreamer) {
    let config = parse_str(hcl, "<spec>").unwrap();
    let streamer = LogStreamer::new(512);
    let orchestrator = Orchestrator::start(OrchestratorOptions {
        config,
        streamer: streamer.clone(),
        launcher: Arc::new(FakeLauncher::running_forever()),
        secrets: Arc::new(MemorySecretStore::new()),
        state_log: None,
        helper_exe: PathBuf::from("/usr/local/bin/overseer"),
        probes_enabled: false,
    })
    .await;
    (orchestrator, streamer)
}

fn tcp(online: bool) -> SensorReading {
    SensorReading::new(TCP, SystemClock.epoch_ms()).with_online(online)
}

fn ipv4(ip: &str) -> SensorReading {
    SensorReading::new(PUBLIC_IPV4, SystemClock.epoch_ms()).with_ip(ip.parse().unwrap())
}

async fn wait_until(deadline_ms: u64, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(deadline_ms);
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A context switch runs leave-hooks of the old context before
/// enter-hooks of the new one, with the env-file rewrite in between:
/// the leave hook still sees the old exported value, the enter hook the
/// new one.
#[tokio::test]
async fn context_switch_sandwiches_env_rewrite_between_hooks() {
    let dir = tempfile::tempdir().unwrap();
    let context_file = dir.path().join("context");
    let seq = dir.path().join("seq");

    let hcl = format!(
        r#"
exports {{
  context = "{context}"
}}

context_hooks {{
  on_enter = ["cat {context} >> {seq}"]
  on_leave = ["cat {context} >> {seq}"]
}}

location "home" {{
  conditions {{
    public_ip = ["203.0.113.0/24"]
  }}
}}

location "office" {{
  conditions {{
    public_ip = ["198.51.100.0/24"]
  }}
}}

context "home" {{
  locations = ["home"]
}}

context "office" {{
  locations = ["office"]
}}
"#,
        context = context_file.display(),
        seq = seq.display(),
    );
    let (orchestrator, _streamer) = start(&hcl).await;

    orchestrator.submit_reading(tcp(true));
    orchestrator.submit_reading(ipv4("203.0.113.42"));
    assert!(wait_until(5_000, || orchestrator.snapshot().context == "home").await);

    orchestrator.submit_reading(ipv4("198.51.100.5"));
    assert!(wait_until(5_000, || orchestrator.snapshot().context == "office").await);

    // Wait for the office enter hook to have run: enter(home),
    // leave(home), enter(office) each appended a line.
    assert!(
        wait_until(5_000, || {
            std::fs::read_to_string(&seq).map(|s| s.lines().count() >= 3).unwrap_or(false)
        })
        .await
    );

    let recorded = std::fs::read_to_string(&seq).unwrap();
    let lines: Vec<&str> = recorded.lines().collect();
    // First line: the enter hook of "home" saw "home" already exported.
    // Then the switch: leave hook saw "home", enter hook saw "office".
    assert_eq!(lines.last().copied(), Some("office"));
    assert!(lines.contains(&"home"));
    let home_pos = lines.iter().position(|l| *l == "home").unwrap();
    let office_pos = lines.iter().rposition(|l| *l == "office").unwrap();
    assert!(home_pos < office_pos, "leave(home) before enter(office): {lines:?}");

    orchestrator.stop().await;
}

/// A hook that overruns its timeout reports `timeout`, is killed with
/// its whole process group, and delays the pipeline by roughly the
/// timeout only.
#[tokio::test]
async fn hook_timeout_kills_the_group_and_reports() {
    let hcl = r#"
context_hooks {
  on_enter = ["sleep 10"]
  timeout  = "100ms"
}

context "home" {
  conditions {
    public_ip = ["203.0.113.0/24"]
  }
}
"#;
    let (orchestrator, streamer) = start(hcl).await;

    let started = std::time::Instant::now();
    orchestrator.submit_reading(tcp(true));
    orchestrator.submit_reading(ipv4("203.0.113.42"));
    assert!(wait_until(5_000, || orchestrator.snapshot().context == "home").await);

    let timed_out = wait_until(5_000, || {
        streamer.history(200).iter().any(|e| {
            matches!(
                &e.payload,
                Payload::Hook { success: false, error: Some(error), .. }
                    if error.contains("timeout")
            )
        })
    })
    .await;
    assert!(timed_out, "expected a timed-out hook entry");
    assert!(
        started.elapsed() < Duration::from_secs(8),
        "the pipeline must not wait out the full sleep"
    );

    orchestrator.stop().await;
}

/// The dotenv export carries the overseer variables and the merged
/// custom environment, with dropped keys on the unset line.
#[tokio::test]
async fn dotenv_export_tracks_the_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let dotenv = dir.path().join("overseer.env");

    let hcl = format!(
        r#"
environment {{
  DEPLOY_ZONE = "lab"
}}

exports {{
  dotenv = "{}"
}}

context "home" {{
  conditions {{
    public_ip = ["203.0.113.0/24"]
  }}
  environment {{
    PROXY = "off"
  }}
}}
"#,
        dotenv.display()
    );
    let (orchestrator, _streamer) = start(&hcl).await;

    orchestrator.submit_reading(tcp(true));
    orchestrator.submit_reading(ipv4("203.0.113.42"));
    assert!(wait_until(5_000, || orchestrator.snapshot().context == "home").await);
    assert!(wait_until(5_000, || dotenv.exists()).await);

    let content = wait_for_content(&dotenv, "OVERSEER_CONTEXT=\"home\"").await;
    assert!(content.contains("export DEPLOY_ZONE=\"lab\""), "{content}");
    assert!(content.contains("export PROXY=\"off\""), "{content}");
    assert!(content.contains("export OVERSEER_PUBLIC_IPV4=\"203.0.113.42\""), "{content}");
    assert!(content.ends_with('\n'));

    // Dropping off the network: context unknown, PROXY moves to unset.
    orchestrator.submit_reading(ipv4("192.0.2.9"));
    assert!(wait_until(5_000, || orchestrator.snapshot().context == "unknown").await);
    let content = wait_for_content(&dotenv, "unset").await;
    let unset_line = content.lines().find(|l| l.starts_with("unset ")).unwrap();
    assert!(unset_line.contains("PROXY"), "{content}");

    orchestrator.stop().await;
}

async fn wait_for_content(path: &std::path::Path, needle: &str) -> String {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.contains(needle) {
            return content;
        }
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {needle:?} in {content:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
