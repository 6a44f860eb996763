// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversion from the serde schema into the daemon-facing `Config`.
//!
//! This is where the two condition grammars meet: a conditions block
//! without `any`/`all` groups keeps the legacy simple-map semantics
//! (multiple patterns for one key OR together, and distinct keys OR at
//! the top level); a block with groups gets structured semantics
//! (attributes and groups AND together at that level). Mixing both forms
//! works but logs a deprecation warning; the semantics are never
//! changed silently.

use crate::parse::ParseError;
use crate::schema::{
    ActionsBlock, CompanionBlock, ConditionsBlock, ConfigFile, ContextBlock, HooksBlock,
    LocationBlock, TunnelBlock,
};
use indexmap::IndexMap;
use overseer_core::rules::DEFAULT_HOOK_TIMEOUT;
use overseer_core::sensor::{env_sensor, LOCAL_IPV4, PUBLIC_IPV4, PUBLIC_IPV6};
use overseer_core::{Actions, Condition, Hooks, Location, Rule, RuleEngine};
use std::path::PathBuf;
use std::time::Duration;

/// Fully resolved configuration consumed by the daemon.
#[derive(Debug, Clone)]
pub struct Config {
    pub verbose: i64,
    pub environment: IndexMap<String, String>,
    pub exports: ExportSettings,
    pub ssh: SshSettings,
    pub companions: CompanionSettings,
    pub log: LogSettings,
    pub probes: ProbeSettings,
    pub location_hooks: Hooks,
    pub context_hooks: Hooks,
    pub locations: Vec<Location>,
    pub rules: Vec<Rule>,
    pub tunnels: IndexMap<String, TunnelSpec>,
}

impl Config {
    /// Build a rule engine over this configuration's rules, locations
    /// and global environment.
    pub fn engine(&self) -> RuleEngine {
        RuleEngine::new(self.rules.clone(), self.locations.clone(), self.environment.clone())
    }

    pub fn tunnel(&self, alias: &str) -> Option<&TunnelSpec> {
        self.tunnels.get(alias)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpFamily {
    #[default]
    V4,
    V6,
}

#[derive(Debug, Clone, Default)]
pub struct ExportSettings {
    pub dotenv: Option<PathBuf>,
    pub context: Option<PathBuf>,
    pub location: Option<PathBuf>,
    pub public_ip: Option<PathBuf>,
    pub preferred_ip: IpFamily,
}

#[derive(Debug, Clone)]
pub struct SshSettings {
    pub server_alive_interval: u64,
    pub server_alive_count_max: u32,
    pub reconnect: ReconnectSettings,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            server_alive_interval: 30,
            server_alive_count_max: 3,
            reconnect: ReconnectSettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    pub enabled: bool,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_factor: f64,
    pub max_retries: u32,
    /// How long a spawned SSH child must survive to count as connected.
    pub connect_window: Duration,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            backoff_factor: 2.0,
            max_retries: 10,
            connect_window: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompanionSettings {
    /// Retained output lines per companion, used for `wait_for` scanning
    /// and status reporting.
    pub history_size: usize,
}

impl Default for CompanionSettings {
    fn default() -> Self {
        Self { history_size: 200 }
    }
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub ring_size: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { ring_size: 1000 }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub tcp_target: String,
    pub tcp_interval: Duration,
    pub tcp_timeout: Duration,
    pub ip_interval: Duration,
    pub ipv4_resolver: String,
    pub ipv6_resolver: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            tcp_target: "1.1.1.1:443".to_string(),
            tcp_interval: Duration::from_secs(30),
            tcp_timeout: Duration::from_secs(5),
            ip_interval: Duration::from_secs(300),
            ipv4_resolver: "https://api.ipify.org".to_string(),
            ipv6_resolver: "https://api6.ipify.org".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitMode {
    /// Wait for the companion to exit successfully.
    #[default]
    Completion,
    /// Wait until `wait_for` appears in the companion's output.
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnFailure {
    /// A failed companion aborts the tunnel startup.
    #[default]
    Block,
    /// Log and keep going.
    Continue,
}

#[derive(Debug, Clone)]
pub struct CompanionSpec {
    pub name: String,
    pub command: String,
    pub workdir: Option<PathBuf>,
    pub environment: IndexMap<String, String>,
    pub wait_mode: WaitMode,
    pub wait_for: Option<String>,
    pub timeout: Duration,
    pub ready_delay: Option<Duration>,
    pub on_failure: OnFailure,
    pub keep_alive: bool,
    pub auto_restart: bool,
    pub persistent: bool,
    /// Signal name without the SIG prefix, e.g. `INT`.
    pub stop_signal: String,
}

#[derive(Debug, Clone)]
pub struct TunnelSpec {
    pub alias: String,
    pub tags: Vec<String>,
    pub companions: Vec<CompanionSpec>,
    pub before_connect: Vec<String>,
    pub after_connect: Vec<String>,
    pub hook_timeout: Duration,
}

const KNOWN_SIGNALS: [&str; 7] = ["INT", "TERM", "KILL", "HUP", "QUIT", "USR1", "USR2"];

pub(crate) fn convert(file: ConfigFile) -> Result<Config, ParseError> {
    let exports = convert_exports(file.exports.unwrap_or_default())?;
    let ssh = convert_ssh(file.ssh.unwrap_or_default())?;

    let companions = CompanionSettings {
        history_size: file
            .companion
            .and_then(|c| c.history_size)
            .unwrap_or_else(|| CompanionSettings::default().history_size),
    };
    let log = LogSettings {
        ring_size: file
            .log
            .and_then(|l| l.ring_size)
            .unwrap_or_else(|| LogSettings::default().ring_size),
    };
    let probes = convert_probes(file.probes.unwrap_or_default())?;

    let location_hooks = convert_hooks(file.location_hooks, "location_hooks")?;
    let context_hooks = convert_hooks(file.context_hooks, "context_hooks")?;

    let locations = file
        .location
        .into_iter()
        .map(|(name, block)| convert_location(name, block))
        .collect::<Result<Vec<_>, _>>()?;

    let rules = file
        .context
        .into_iter()
        .map(|(name, block)| convert_context(name, block))
        .collect::<Result<Vec<_>, _>>()?;

    let tunnels = file
        .tunnel
        .into_iter()
        .map(|(alias, block)| {
            let spec = convert_tunnel(&alias, block)?;
            Ok((alias, spec))
        })
        .collect::<Result<IndexMap<_, _>, ParseError>>()?;

    Ok(Config {
        verbose: file.verbose.unwrap_or(0),
        environment: file.environment,
        exports,
        ssh,
        companions,
        log,
        probes,
        location_hooks,
        context_hooks,
        locations,
        rules,
        tunnels,
    })
}

fn invalid(location: impl Into<String>, message: impl Into<String>) -> ParseError {
    ParseError::Invalid { location: location.into(), message: message.into() }
}

fn convert_exports(block: crate::schema::ExportsBlock) -> Result<ExportSettings, ParseError> {
    let preferred_ip = match block.preferred_ip.as_deref() {
        None | Some("ipv4") => IpFamily::V4,
        Some("ipv6") => IpFamily::V6,
        Some(other) => {
            return Err(invalid(
                "exports",
                format!("preferred_ip must be \"ipv4\" or \"ipv6\", got \"{other}\""),
            ))
        }
    };
    let expand = |path: Option<String>| path.map(|p| crate::paths::expand_tilde(&p));
    Ok(ExportSettings {
        dotenv: expand(block.dotenv),
        context: expand(block.context),
        location: expand(block.location),
        public_ip: expand(block.public_ip),
        preferred_ip,
    })
}

fn convert_ssh(block: crate::schema::SshBlock) -> Result<SshSettings, ParseError> {
    let defaults = ReconnectSettings::default();
    let backoff_factor = block.backoff_factor.unwrap_or(defaults.backoff_factor);
    if backoff_factor < 1.0 {
        return Err(invalid("ssh", format!("backoff_factor must be >= 1, got {backoff_factor}")));
    }

    let resolve = |value: Option<crate::schema::DurationValue>, field: &str, default: Duration| {
        value
            .map(|v| v.resolve().map_err(|e| invalid("ssh", format!("{field}: {e}"))))
            .transpose()
            .map(|d| d.unwrap_or(default))
    };

    Ok(SshSettings {
        server_alive_interval: block.server_alive_interval.unwrap_or(30),
        server_alive_count_max: block.server_alive_count_max.unwrap_or(3),
        reconnect: ReconnectSettings {
            enabled: block.reconnect_enabled.unwrap_or(defaults.enabled),
            initial_backoff: resolve(
                block.initial_backoff,
                "initial_backoff",
                defaults.initial_backoff,
            )?,
            max_backoff: resolve(block.max_backoff, "max_backoff", defaults.max_backoff)?,
            backoff_factor,
            max_retries: block.max_retries.unwrap_or(defaults.max_retries),
            connect_window: resolve(
                block.connect_window,
                "connect_window",
                defaults.connect_window,
            )?,
        },
    })
}

fn convert_probes(block: crate::schema::ProbesBlock) -> Result<ProbeSettings, ParseError> {
    let defaults = ProbeSettings::default();
    let resolve = |value: Option<crate::schema::DurationValue>, field: &str, default: Duration| {
        value
            .map(|v| v.resolve().map_err(|e| invalid("probes", format!("{field}: {e}"))))
            .transpose()
            .map(|d| d.unwrap_or(default))
    };
    Ok(ProbeSettings {
        tcp_target: block.tcp_target.unwrap_or(defaults.tcp_target),
        tcp_interval: resolve(block.tcp_interval, "tcp_interval", defaults.tcp_interval)?,
        tcp_timeout: resolve(block.tcp_timeout, "tcp_timeout", defaults.tcp_timeout)?,
        ip_interval: resolve(block.ip_interval, "ip_interval", defaults.ip_interval)?,
        ipv4_resolver: block.ipv4_resolver.unwrap_or(defaults.ipv4_resolver),
        ipv6_resolver: block.ipv6_resolver.unwrap_or(defaults.ipv6_resolver),
    })
}

fn convert_hooks(block: Option<HooksBlock>, location: &str) -> Result<Hooks, ParseError> {
    let Some(block) = block else {
        return Ok(Hooks::default());
    };
    let timeout = match block.timeout {
        Some(value) => value
            .resolve()
            .map_err(|e| invalid(location, format!("timeout: {e}")))?,
        None => DEFAULT_HOOK_TIMEOUT,
    };
    Ok(Hooks { on_enter: block.on_enter, on_leave: block.on_leave, timeout })
}

fn convert_location(name: String, block: LocationBlock) -> Result<Location, ParseError> {
    let location = format!("location \"{name}\"");
    let condition = block.conditions.as_ref().map(|c| convert_conditions(c, &location));
    Ok(Location {
        name,
        display_name: block.display_name,
        condition: condition.flatten(),
        environment: block.environment,
        hooks: convert_hooks(block.hooks, &location)?,
    })
}

fn convert_context(name: String, block: ContextBlock) -> Result<Rule, ParseError> {
    let location = format!("context \"{name}\"");
    let condition = block.conditions.as_ref().map(|c| convert_conditions(c, &location));
    let actions = block.actions.unwrap_or_else(ActionsBlock::default);
    Ok(Rule {
        name,
        display_name: block.display_name,
        locations: block.locations,
        condition: condition.flatten(),
        actions: Actions { connect: actions.connect, disconnect: actions.disconnect },
        environment: block.environment,
        hooks: convert_hooks(block.hooks, &location)?,
    })
}

fn convert_tunnel(alias: &str, block: TunnelBlock) -> Result<TunnelSpec, ParseError> {
    let location = format!("tunnel \"{alias}\"");
    let companions = block
        .companion
        .into_iter()
        .map(|(name, companion)| convert_companion(alias, name, companion))
        .collect::<Result<Vec<_>, _>>()?;

    let hooks = block.hooks.unwrap_or_default();
    let hook_timeout = match hooks.timeout {
        Some(value) => value
            .resolve()
            .map_err(|e| invalid(&location, format!("hooks timeout: {e}")))?,
        None => DEFAULT_HOOK_TIMEOUT,
    };

    Ok(TunnelSpec {
        alias: alias.to_string(),
        tags: block.tags,
        companions,
        before_connect: hooks.before_connect,
        after_connect: hooks.after_connect,
        hook_timeout,
    })
}

fn convert_companion(
    alias: &str,
    name: String,
    block: CompanionBlock,
) -> Result<CompanionSpec, ParseError> {
    let location = format!("tunnel \"{alias}\" companion \"{name}\"");

    if block.command.trim().is_empty() {
        return Err(invalid(&location, "command must not be empty"));
    }

    let wait_mode = match block.wait_mode.as_deref() {
        None | Some("completion") => WaitMode::Completion,
        Some("string") => WaitMode::String,
        Some(other) => {
            return Err(invalid(
                &location,
                format!("wait_mode must be \"completion\" or \"string\", got \"{other}\""),
            ))
        }
    };
    if wait_mode == WaitMode::String && block.wait_for.as_deref().unwrap_or("").is_empty() {
        return Err(invalid(&location, "wait_mode = \"string\" requires wait_for"));
    }

    let on_failure = match block.on_failure.as_deref() {
        None | Some("block") => OnFailure::Block,
        Some("continue") => OnFailure::Continue,
        Some(other) => {
            return Err(invalid(
                &location,
                format!("on_failure must be \"block\" or \"continue\", got \"{other}\""),
            ))
        }
    };

    let stop_signal = block
        .stop_signal
        .as_deref()
        .map(|s| s.trim_start_matches("SIG").to_uppercase())
        .unwrap_or_else(|| "INT".to_string());
    if !KNOWN_SIGNALS.contains(&stop_signal.as_str()) {
        return Err(invalid(&location, format!("unknown stop_signal \"{stop_signal}\"")));
    }

    let timeout = match block.timeout {
        Some(value) => value
            .resolve()
            .map_err(|e| invalid(&location, format!("timeout: {e}")))?,
        None => Duration::from_secs(30),
    };
    let ready_delay = block
        .ready_delay
        .map(|value| value.resolve().map_err(|e| invalid(&location, format!("ready_delay: {e}"))))
        .transpose()?;

    Ok(CompanionSpec {
        name,
        command: block.command,
        workdir: block.workdir.map(PathBuf::from),
        environment: block.environment,
        wait_mode,
        wait_for: block.wait_for,
        timeout,
        ready_delay,
        on_failure,
        keep_alive: block.keep_alive.unwrap_or(false),
        auto_restart: block.auto_restart.unwrap_or(false),
        persistent: block.persistent.unwrap_or(false),
        stop_signal,
    })
}

/// Fold a conditions block into one `Condition` tree, or `None` for an
/// empty block.
fn convert_conditions(block: &ConditionsBlock, location: &str) -> Option<Condition> {
    let children = condition_children(block);
    if children.is_empty() {
        return None;
    }

    let structured = block.has_groups();
    if structured && block.has_simple_entries() {
        tracing::warn!(
            location,
            "conditions block mixes simple keys with any/all groups; \
             the simple-map OR semantics are deprecated in this form"
        );
    }

    Some(fold(children, structured))
}

/// Children of one grammar level, in declaration-ish order: sensor
/// attributes, online, env entries, then the nested groups.
fn condition_children(block: &ConditionsBlock) -> Vec<Condition> {
    let mut children = Vec::new();

    // Legacy `public_ip` normalises to the ipv4 sensor.
    let sensor_keys: [(&str, &Option<crate::schema::OneOrMany<String>>); 4] = [
        (PUBLIC_IPV4, &block.public_ip),
        (PUBLIC_IPV4, &block.public_ipv4),
        (PUBLIC_IPV6, &block.public_ipv6),
        (LOCAL_IPV4, &block.local_ipv4),
    ];
    for (sensor, patterns) in sensor_keys {
        if let Some(patterns) = patterns.clone() {
            children.push(patterns_condition(sensor, patterns.into_vec()));
        }
    }

    if let Some(value) = block.online {
        children.push(Condition::online(value));
    }

    for (var, pattern) in &block.env {
        children.push(Condition::Match { sensor: env_sensor(var), pattern: pattern.clone() });
    }

    if let Some(any) = &block.any {
        children.push(Condition::Any(condition_children(any)));
    }
    if let Some(all) = &block.all {
        children.push(Condition::All(condition_children(all)));
    }

    children
}

/// Multiple patterns for one key always OR together.
fn patterns_condition(sensor: &str, patterns: Vec<String>) -> Condition {
    let mut matches: Vec<Condition> = patterns
        .into_iter()
        .map(|pattern| Condition::Match { sensor: sensor.to_string(), pattern })
        .collect();
    if matches.len() == 1 {
        matches.remove(0)
    } else {
        Condition::Any(matches)
    }
}

fn fold(mut children: Vec<Condition>, structured: bool) -> Condition {
    if children.len() == 1 {
        return children.remove(0);
    }
    if structured {
        // Structured semantics: attributes and groups AND together.
        Condition::All(children)
    } else {
        // Legacy simple-map semantics: distinct keys OR at the top level.
        Condition::Any(children)
    }
}

#[cfg(test)]
#[path = "convert_tests.rs"]
mod tests;
