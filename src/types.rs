//! Data-transfer objects for the daemon API and explicit query mappings.
//!
//! Field names follow the daemon's JSON: PascalCase for most objects,
//! lowercase/snake_case for events and stats.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Filter map sent as a JSON-encoded `filters` query parameter.
pub type Filters = BTreeMap<String, Vec<String>>;

/// Container configuration used for create and returned by inspect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub domainname: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,
    pub image: String,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
    pub open_stdin: bool,
    pub stdin_once: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub working_dir: String,
    pub network_disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_config: Option<HostConfig>,
}

/// Host-side settings of a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HostConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binds: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_bindings: Option<HashMap<String, Vec<PortBinding>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
    pub privileged: bool,
    pub publish_all_ports: bool,
    pub auto_remove: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_shares: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

/// Result of `GET /containers/<id>/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub created: String,
    pub path: String,
    pub args: Option<Vec<String>>,
    pub image: String,
    pub config: ContainerConfig,
    pub state: ContainerState,
    pub host_config: Option<HostConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerState {
    pub status: String,
    pub running: bool,
    pub paused: bool,
    pub restarting: bool,
    pub pid: i64,
    pub exit_code: i64,
    pub started_at: String,
    pub finished_at: String,
}

/// Entry of `GET /containers/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Container {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub command: String,
    pub created: i64,
    pub state: String,
    pub status: String,
    pub ports: Vec<Port>,
    pub size_rw: Option<i64>,
    pub size_root_fs: Option<i64>,
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Port {
    #[serde(rename = "IP")]
    pub ip: Option<String>,
    pub private_port: u16,
    pub public_port: Option<u16>,
    #[serde(rename = "Type")]
    pub kind: String,
}

/// Record of the `/events` feed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Event {
    pub status: String,
    pub id: String,
    pub from: String,
    pub time: i64,
    #[serde(rename = "timeNano")]
    pub time_nano: i64,
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "Actor")]
    pub actor: EventActor,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EventActor {
    #[serde(rename = "ID")]
    pub id: String,
    pub attributes: HashMap<String, String>,
}

/// Record of the `/containers/<id>/stats` feed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub read: String,
    pub cpu_stats: CpuStats,
    pub precpu_stats: CpuStats,
    pub memory_stats: MemoryStats,
}

impl Stats {
    /// CPU usage in percent of one core, from the delta to the previous sample.
    pub fn cpu_percent(&self) -> f64 {
        let cpu_delta = self
            .cpu_stats
            .cpu_usage
            .total_usage
            .saturating_sub(self.precpu_stats.cpu_usage.total_usage) as f64;
        let system_delta = self
            .cpu_stats
            .system_cpu_usage
            .unwrap_or(0)
            .saturating_sub(self.precpu_stats.system_cpu_usage.unwrap_or(0))
            as f64;

        if cpu_delta <= 0.0 || system_delta <= 0.0 {
            return 0.0;
        }
        let cpus = f64::from(self.cpu_stats.online_cpus.unwrap_or(1).max(1));
        cpu_delta / system_delta * cpus * 100.0
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CpuStats {
    pub cpu_usage: CpuUsage,
    pub system_cpu_usage: Option<u64>,
    pub online_cpus: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CpuUsage {
    pub total_usage: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryStats {
    pub usage: Option<u64>,
    pub limit: Option<u64>,
}

/// Result of `GET /version`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Version {
    pub version: String,
    pub api_version: String,
    pub git_commit: String,
    pub go_version: String,
    pub os: String,
    pub arch: String,
    pub kernel_version: String,
}

/// Result of `GET /info`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Info {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub containers: i64,
    pub containers_running: i64,
    pub images: i64,
    pub driver: String,
    pub server_version: String,
    pub operating_system: String,
    #[serde(rename = "NCPU")]
    pub ncpu: i64,
    pub mem_total: i64,
}

/// Entry of `GET /images/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Image {
    pub id: String,
    pub parent_id: String,
    pub repo_tags: Option<Vec<String>>,
    pub created: i64,
    pub size: i64,
    pub virtual_size: Option<i64>,
    pub labels: Option<HashMap<String, String>>,
}

/// Result of `POST /containers/create`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateResponse {
    pub id: String,
    pub warnings: Option<Vec<String>>,
}

/// Result of `POST /containers/<id>/wait`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct WaitResponse {
    pub status_code: i64,
}

/// Query for `GET /containers/json`.
#[derive(Debug, Clone, Default)]
pub struct ListContainersOptions {
    pub all: bool,
    pub size: bool,
    pub filters: Filters,
}

impl ListContainersOptions {
    pub fn to_query(&self) -> String {
        let mut query = Query::new();
        query.flag("all", self.all);
        query.flag("size", self.size);
        query.filters(&self.filters);
        query.finish()
    }
}

/// Query for `GET /containers/<id>/logs`.
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub follow: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
    /// Number of lines from the end; `None` for all.
    pub tail: Option<u64>,
    /// Unix timestamp lower bound.
    pub since: Option<i64>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            follow: false,
            stdout: true,
            stderr: true,
            timestamps: false,
            tail: None,
            since: None,
        }
    }
}

impl LogOptions {
    pub fn to_query(&self) -> String {
        let mut query = Query::new();
        query.flag("follow", self.follow);
        query.flag("stdout", self.stdout);
        query.flag("stderr", self.stderr);
        query.flag("timestamps", self.timestamps);
        match self.tail {
            Some(tail) => query.pair("tail", &tail.to_string()),
            None => query.pair("tail", "all"),
        }
        if let Some(since) = self.since {
            query.pair("since", &since.to_string());
        }
        query.finish()
    }
}

/// Query for the `/events` feed.
#[derive(Debug, Clone, Default)]
pub struct EventsOptions {
    pub since: Option<String>,
    pub until: Option<String>,
    pub filters: Filters,
}

impl EventsOptions {
    pub fn to_query(&self) -> String {
        let mut query = Query::new();
        if let Some(since) = &self.since {
            query.pair("since", since);
        }
        if let Some(until) = &self.until {
            query.pair("until", until);
        }
        query.filters(&self.filters);
        query.finish()
    }
}

/// URL-encoded query builder.
struct Query(url::form_urlencoded::Serializer<'static, String>);

impl Query {
    fn new() -> Self {
        Self(url::form_urlencoded::Serializer::new(String::new()))
    }

    fn pair(&mut self, key: &str, value: &str) {
        self.0.append_pair(key, value);
    }

    fn flag(&mut self, key: &str, value: bool) {
        self.pair(key, if value { "1" } else { "0" });
    }

    fn filters(&mut self, filters: &Filters) {
        if filters.is_empty() {
            return;
        }
        if let Ok(encoded) = serde_json::to_string(filters) {
            self.pair("filters", &encoded);
        }
    }

    fn finish(mut self) -> String {
        self.0.finish()
    }
}

/// Append `query` to `path` when non-empty.
pub(crate) fn with_query(path: &str, query: &str) -> String {
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_containers_query() {
        let mut filters = Filters::new();
        filters.insert("status".into(), vec!["running".into()]);
        let opts = ListContainersOptions {
            all: true,
            size: false,
            filters,
        };
        assert_eq!(
            opts.to_query(),
            "all=1&size=0&filters=%7B%22status%22%3A%5B%22running%22%5D%7D"
        );
    }

    #[test]
    fn test_log_options_query() {
        let opts = LogOptions {
            tail: Some(10),
            since: Some(1700000000),
            ..Default::default()
        };
        assert_eq!(
            opts.to_query(),
            "follow=0&stdout=1&stderr=1&timestamps=0&tail=10&since=1700000000"
        );
    }

    #[test]
    fn test_events_options_empty_query() {
        assert_eq!(EventsOptions::default().to_query(), "");
        assert_eq!(with_query("/events", ""), "/events");
        assert_eq!(with_query("/events", "since=1"), "/events?since=1");
    }

    #[test]
    fn test_create_config_serializes_pascal_case() {
        let config = ContainerConfig {
            image: "busybox".into(),
            cmd: Some(vec!["echo".into(), "hi".into()]),
            tty: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["Image"], "busybox");
        assert_eq!(json["Cmd"][1], "hi");
        assert_eq!(json["Tty"], true);
        assert!(json.get("Hostname").is_none());
        assert!(json.get("Env").is_none());
    }

    #[test]
    fn test_inspect_tolerates_nulls_and_missing_fields() {
        let info: ContainerInfo = serde_json::from_str(
            r#"{"Id":"abc","Config":{"Tty":true,"Cmd":null},"State":{"Running":true}}"#,
        )
        .unwrap();
        assert_eq!(info.id, "abc");
        assert!(info.config.tty);
        assert!(info.config.cmd.is_none());
        assert!(info.state.running);
    }

    #[test]
    fn test_event_decoding() {
        let event: Event = serde_json::from_str(
            r#"{"status":"start","id":"c1","from":"busybox","time":42,
                "Type":"container","Action":"start",
                "Actor":{"ID":"c1","Attributes":{"name":"web"}},"timeNano":42000000000}"#,
        )
        .unwrap();
        assert_eq!(event.status, "start");
        assert_eq!(event.kind, "container");
        assert_eq!(event.actor.attributes["name"], "web");
        assert_eq!(event.time_nano, 42_000_000_000);
    }

    #[test]
    fn test_stats_cpu_percent() {
        let stats: Stats = serde_json::from_str(
            r#"{"read":"now",
                "cpu_stats":{"cpu_usage":{"total_usage":300},"system_cpu_usage":2000,"online_cpus":2},
                "precpu_stats":{"cpu_usage":{"total_usage":100},"system_cpu_usage":1000},
                "memory_stats":{"usage":1024,"limit":4096}}"#,
        )
        .unwrap();
        assert!((stats.cpu_percent() - 40.0).abs() < 1e-9);
        assert_eq!(stats.memory_stats.limit, Some(4096));
    }
}
