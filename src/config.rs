//! Ambient configuration loading: TOML on disk, overridable by
//! `CHERRY_*` environment variables. Follows `toml`'s own
//! deserialize-into-a-struct idiom, the way `airssys-wasm` loads its
//! `Component.toml` manifests.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CherryError, ErrorCode};

const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(60);
const DEFAULT_WRITE_BACKLOG: usize = 64;

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    cluster: RawCluster,
    #[serde(default, rename = "node")]
    nodes: HashMap<String, RawNode>,
    #[serde(default)]
    agent: RawAgent,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCluster {
    nats: RawNats,
}

#[derive(Debug, Clone, Deserialize)]
struct RawNats {
    master_node_id: String,
    address: String,
    #[serde(default)]
    reconnect_delay: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawNode {
    #[serde(rename = "type")]
    node_type: String,
    address: String,
    #[serde(flatten)]
    settings: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawAgent {
    heartbeat: Option<String>,
    write_backlog: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub master_node_id: String,
    pub address: String,
    pub reconnect_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_type: String,
    pub address: String,
    pub settings: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub heartbeat: Duration,
    pub write_backlog: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub cluster: NatsConfig,
    pub nodes: HashMap<String, NodeConfig>,
    pub agent: AgentConfig,
}

impl Config {
    /// Parses `toml_source`, then applies `CHERRY_*` environment
    /// overrides. Per-node settings are not env-overridable; there is no
    /// bounded set of env var names to assign them.
    pub fn load(toml_source: &str) -> Result<Self, CherryError> {
        let raw: RawConfig = toml::from_str(toml_source).map_err(|e| CherryError::with_source(ErrorCode::UnmarshalError, e))?;

        let mut master_node_id = raw.cluster.nats.master_node_id;
        let mut address = raw.cluster.nats.address;
        let mut reconnect_delay = match raw.cluster.nats.reconnect_delay {
            Some(s) => parse_duration(&s)?,
            None => Duration::from_secs(1),
        };

        if let Ok(v) = env::var("CHERRY_CLUSTER_NATS_MASTER_NODE_ID") {
            master_node_id = v;
        }
        if let Ok(v) = env::var("CHERRY_CLUSTER_NATS_ADDRESS") {
            address = v;
        }
        if let Ok(v) = env::var("CHERRY_CLUSTER_NATS_RECONNECT_DELAY") {
            reconnect_delay = parse_duration(&v)?;
        }

        let mut heartbeat = match raw.agent.heartbeat {
            Some(s) => parse_duration(&s)?,
            None => DEFAULT_HEARTBEAT,
        };
        if let Ok(v) = env::var("CHERRY_AGENT_HEARTBEAT") {
            heartbeat = parse_duration(&v)?;
        }
        // Clamp to a sane floor: sub-second heartbeats would make the
        // writer's staleness check race the ticker itself.
        if heartbeat < Duration::from_secs(1) {
            heartbeat = Duration::from_secs(1);
        }

        let mut write_backlog = raw.agent.write_backlog.unwrap_or(DEFAULT_WRITE_BACKLOG);
        if let Ok(v) = env::var("CHERRY_AGENT_WRITE_BACKLOG") {
            write_backlog = v.parse().map_err(|_| CherryError::new(ErrorCode::UnmarshalError))?;
        }

        let nodes = raw
            .nodes
            .into_iter()
            .map(|(id, node)| {
                (
                    id,
                    NodeConfig {
                        node_type: node.node_type,
                        address: node.address,
                        settings: node.settings,
                    },
                )
            })
            .collect();

        Ok(Config {
            cluster: NatsConfig {
                master_node_id,
                address,
                reconnect_delay,
            },
            nodes,
            agent: AgentConfig { heartbeat, write_backlog },
        })
    }
}

/// Parses a duration string with a single unit suffix: `ms`, `s`, `m`,
/// `h`. No crate in the pack offers this (no `humantime` precedent), so
/// it is hand-rolled rather than introducing an unused-elsewhere crate.
fn parse_duration(raw: &str) -> Result<Duration, CherryError> {
    let raw = raw.trim();
    let (digits, unit) = raw
        .find(|c: char| !c.is_ascii_digit())
        .map(|idx| raw.split_at(idx))
        .ok_or_else(|| CherryError::new(ErrorCode::UnmarshalError))?;

    let value: u64 = digits.parse().map_err(|_| CherryError::new(ErrorCode::UnmarshalError))?;
    let duration = match unit {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 3600),
        _ => return Err(CherryError::new(ErrorCode::UnmarshalError)),
    };
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [cluster.nats]
        master_node_id = "m1"
        address = "nats://127.0.0.1:4222"
        reconnect_delay = "2s"

        [node.m1]
        type = "center"
        address = "tcp://127.0.0.1:9000"

        [node.g1]
        type = "gate"
        address = "tcp://127.0.0.1:9001"
        region = "eu"

        [agent]
        heartbeat = "30s"
        write_backlog = 128
    "#;

    #[test]
    fn loads_all_sections() {
        let config = Config::load(SAMPLE).unwrap();
        assert_eq!(config.cluster.master_node_id, "m1");
        assert_eq!(config.cluster.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.nodes["g1"].settings["region"], "eu");
        assert_eq!(config.agent.heartbeat, Duration::from_secs(30));
        assert_eq!(config.agent.write_backlog, 128);
    }

    #[test]
    fn heartbeat_below_one_second_is_clamped() {
        let source = SAMPLE.replace(r#"heartbeat = "30s""#, r#"heartbeat = "200ms""#);
        let config = Config::load(&source).unwrap();
        assert_eq!(config.agent.heartbeat, Duration::from_secs(1));
    }

    #[test]
    fn missing_agent_section_uses_defaults() {
        let source = r#"
            [cluster.nats]
            master_node_id = "m1"
            address = "nats://127.0.0.1:4222"
        "#;
        let config = Config::load(source).unwrap();
        assert_eq!(config.agent.heartbeat, DEFAULT_HEARTBEAT);
        assert_eq!(config.agent.write_backlog, DEFAULT_WRITE_BACKLOG);
    }

    #[test]
    fn parses_duration_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("nonsense").is_err());
    }
}
