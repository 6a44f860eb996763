// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    millis = { "500ms", Duration::from_millis(500) },
    bare_seconds = { "45", Duration::from_secs(45) },
    seconds = { "30s", Duration::from_secs(30) },
    minutes = { "5m", Duration::from_secs(300) },
    hours = { "2h", Duration::from_secs(7200) },
    days = { "1d", Duration::from_secs(86400) },
)]
fn parse_duration_forms(input: &str, expected: Duration) {
    assert_eq!(parse_duration(input).unwrap(), expected);
}

#[parameterized(
    empty = { "" },
    no_number = { "ms" },
    bad_suffix = { "10parsecs" },
)]
fn parse_duration_rejects(input: &str) {
    assert!(parse_duration(input).is_err());
}

#[test]
fn duration_value_accepts_bare_numbers() {
    let v: DurationValue = hcl::from_str::<IndexMap<String, DurationValue>>("t = 30")
        .unwrap()
        .shift_remove("t")
        .unwrap();
    assert_eq!(v.resolve().unwrap(), Duration::from_secs(30));
}

#[test]
fn config_file_parses_full_document() {
    let hcl = r#"
verbose = 1

environment {
  DEPLOY_ZONE = "none"
}

exports {
  dotenv       = "~/.config/overseer/overseer.env"
  context      = "~/.config/overseer/context"
  preferred_ip = "ipv6"
}

ssh {
  server_alive_interval = 15
  reconnect_enabled     = true
  initial_backoff       = "1s"
  max_backoff           = "5m"
  backoff_factor        = 2
  max_retries           = 10
}

companion {
  history_size = 50
}

location_hooks {
  on_enter = ["notify-send 'entered'"]
  timeout  = "10s"
}

location "home" {
  display_name = "Home"
  conditions {
    public_ip = ["203.0.113.0/24"]
  }
  environment {
    NETWORK = "trusted"
  }
}

context "home-lan" {
  display_name = "Home LAN"
  locations    = ["home"]
  actions {
    connect = ["nas"]
  }
  hooks {
    on_enter = ["echo hi"]
  }
}

tunnel "nas" {
  tags = ["storage"]
  companion "socks" {
    command   = "ssh -D 1080 -N bastion"
    wait_mode = "string"
    wait_for  = "Authenticated"
    timeout   = "20s"
  }
}
"#;
    let file: ConfigFile = hcl::from_str(hcl).unwrap();
    assert_eq!(file.verbose, Some(1));
    assert_eq!(file.environment.get("DEPLOY_ZONE").map(String::as_str), Some("none"));
    assert_eq!(file.exports.as_ref().unwrap().preferred_ip.as_deref(), Some("ipv6"));
    assert_eq!(file.ssh.as_ref().unwrap().server_alive_interval, Some(15));
    assert_eq!(file.companion.as_ref().unwrap().history_size, Some(50));
    assert_eq!(file.location_hooks.as_ref().unwrap().on_enter.len(), 1);

    let home = file.location.get("home").unwrap();
    assert!(home.conditions.as_ref().unwrap().public_ip.is_some());

    let ctx = file.context.get("home-lan").unwrap();
    assert_eq!(ctx.locations, vec!["home"]);
    assert_eq!(ctx.actions.as_ref().unwrap().connect, vec!["nas"]);

    let tunnel = file.tunnel.get("nas").unwrap();
    let socks = tunnel.companion.get("socks").unwrap();
    assert_eq!(socks.wait_mode.as_deref(), Some("string"));
    assert_eq!(socks.wait_for.as_deref(), Some("Authenticated"));
}

#[test]
fn contexts_preserve_declaration_order() {
    let hcl = r#"
context "c" {}
context "a" {}
context "b" {}
"#;
    let file: ConfigFile = hcl::from_str(hcl).unwrap();
    let names: Vec<&String> = file.context.keys().collect();
    assert_eq!(names, vec!["c", "a", "b"]);
}

#[test]
fn conditions_block_nests_any_and_all() {
    let hcl = r#"
location "campus" {
  conditions {
    all {
      online = true
      any {
        public_ip = ["203.0.113.0/24", "198.51.100.0/24"]
        env {
          SSID = "campus-*"
        }
      }
    }
  }
}
"#;
    let file: ConfigFile = hcl::from_str(hcl).unwrap();
    let conditions = file.location.get("campus").unwrap().conditions.as_ref().unwrap();
    assert!(!conditions.has_simple_entries());
    assert!(conditions.has_groups());
    let all = conditions.all.as_ref().unwrap();
    assert_eq!(all.online, Some(true));
    assert!(all.any.as_ref().unwrap().public_ip.is_some());
}

#[test]
fn one_or_many_accepts_bare_string() {
    let hcl = r#"
location "home" {
  conditions {
    public_ip = "203.0.113.42"
  }
}
"#;
    let file: ConfigFile = hcl::from_str(hcl).unwrap();
    let conditions = file.location.get("home").unwrap().conditions.clone().unwrap();
    assert_eq!(conditions.public_ip.unwrap().into_vec(), vec!["203.0.113.42"]);
}
