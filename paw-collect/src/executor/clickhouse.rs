//! ClickHouse over its HTTP interface.
//!
//! One `ureq::Agent` is kept for the executor's lifetime so connections are
//! reused between calls. Progress headers are requested on every query; the
//! server-side duration is taken from their `elapsed_ns` field, or from the
//! summary header when no progress header was sent.
//!
//! Queries are sent with `wait_end_of_query=1` unless the profile sets it.
//! ClickHouse stops sending headers once the body starts streaming, so
//! without it the server duration of a query with a large result is cut
//! short at the first result block.

use super::{ExecutionError, Executor};
use paw_common::DualDuration;
use paw_common::config::{Settings, SettingsError, setting_opt_str, setting_str, setting_u64};
use std::io;
use std::time::{Duration, Instant};
use tracing::debug;
use ureq::http::HeaderMap;

pub const NAME: &str = "clickhouse";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u64 = 8123;

const PROGRESS_HEADER: &str = "X-ClickHouse-Progress";
const SUMMARY_HEADER: &str = "X-ClickHouse-Summary";

const WAIT_END_OF_QUERY: &str = "wait_end_of_query";

/// Settings consumed by the executor itself; every other key is forwarded to
/// the server as a query setting.
const CONNECTION_KEYS: [&str; 5] = ["host", "port", "user", "password", "database"];

pub struct ClickHouseExecutor {
    agent: ureq::Agent,
    url: String,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    query_settings: Vec<(String, String)>,
}

impl ClickHouseExecutor {
    pub fn new(host: &str, port: u64) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            url: format!("http://{host}:{port}/"),
            user: None,
            password: None,
            database: None,
            query_settings: Vec::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let host = setting_str(settings, "host", DEFAULT_HOST)?;
        let port = setting_u64(settings, "port", DEFAULT_PORT)?;

        let mut executor = Self::new(&host, port);
        executor.user = setting_opt_str(settings, "user")?;
        executor.password = setting_opt_str(settings, "password")?;
        executor.database = setting_opt_str(settings, "database")?;

        for (key, value) in settings {
            if CONNECTION_KEYS.contains(&key.as_str()) {
                continue;
            }
            executor
                .query_settings
                .push((key.clone(), query_setting_value(key, value)?));
        }

        debug!(
            url = %executor.url,
            settings = executor.query_settings.len(),
            "Created ClickHouse executor"
        );
        Ok(executor)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn query_settings(&self) -> &[(String, String)] {
        &self.query_settings
    }
}

impl Executor for ClickHouseExecutor {
    fn name(&self) -> &str {
        NAME
    }

    fn run(&mut self, unit: &str) -> Result<DualDuration, ExecutionError> {
        let mut request = self
            .agent
            .post(self.url.as_str())
            .query("send_progress_in_http_headers", "1");
        if !self.query_settings.iter().any(|(key, _)| key == WAIT_END_OF_QUERY) {
            request = request.query(WAIT_END_OF_QUERY, "1");
        }
        if let Some(database) = &self.database {
            request = request.query("database", database);
        }
        for (key, value) in &self.query_settings {
            request = request.query(key, value);
        }
        if let Some(user) = &self.user {
            request = request.header("X-ClickHouse-User", user.as_str());
        }
        if let Some(password) = &self.password {
            request = request.header("X-ClickHouse-Key", password.as_str());
        }

        let started = Instant::now();
        let mut response = request.send(unit).map_err(|e| ExecutionError::Transport {
            executor: NAME,
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            return Err(ExecutionError::Status {
                executor: NAME,
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        // The client clock covers the full result transfer.
        {
            let mut reader = response.body_mut().as_reader();
            io::copy(&mut reader, &mut io::sink()).map_err(|source| ExecutionError::Io {
                action: "read ClickHouse response".into(),
                source,
            })?;
        }
        let client_duration = started.elapsed();
        let server_duration = server_duration(response.headers());

        Ok(DualDuration::new(client_duration, server_duration))
    }
}

fn query_setting_value(key: &str, value: &toml::Value) -> Result<String, SettingsError> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        _ => Err(SettingsError::WrongType {
            key: key.to_string(),
            expected: "a string, number or boolean",
        }),
    }
}

fn server_duration(headers: &HeaderMap) -> Duration {
    let progress = headers
        .get_all(PROGRESS_HEADER)
        .iter()
        .filter_map(|value| value.to_str().ok());
    let summary = headers
        .get(SUMMARY_HEADER)
        .and_then(|value| value.to_str().ok());
    server_duration_from(progress, summary)
}

/// Progress headers carry running totals, so the largest `elapsed_ns` seen is
/// the server time at the end of the query.
fn server_duration_from<'a>(
    progress: impl Iterator<Item = &'a str>,
    summary: Option<&str>,
) -> Duration {
    let nanos = progress
        .filter_map(elapsed_ns)
        .max()
        .or_else(|| summary.and_then(elapsed_ns))
        .unwrap_or(0);
    Duration::from_nanos(nanos)
}

/// ClickHouse quotes its counters, so both `"123"` and `123` are accepted.
fn elapsed_ns(header: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(header).ok()?;
    match value.get("elapsed_ns")? {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let executor = ClickHouseExecutor::from_settings(&Settings::new()).unwrap();
        assert_eq!(executor.url(), "http://127.0.0.1:8123/");
        assert!(executor.query_settings().is_empty());
        assert_eq!(executor.name(), "clickhouse");
    }

    #[test]
    fn test_extra_settings_are_forwarded() {
        let settings: Settings = toml::from_str(
            r#"
            host = "db.internal"
            port = 18123
            user = "bench"
            max_threads = 8
            use_uncompressed_cache = false
            "#,
        )
        .unwrap();
        let executor = ClickHouseExecutor::from_settings(&settings).unwrap();
        assert_eq!(executor.url(), "http://db.internal:18123/");
        assert_eq!(executor.user.as_deref(), Some("bench"));

        let mut forwarded = executor.query_settings().to_vec();
        forwarded.sort();
        assert_eq!(
            forwarded,
            vec![
                ("max_threads".to_string(), "8".to_string()),
                ("use_uncompressed_cache".to_string(), "0".to_string()),
            ]
        );
    }

    #[test]
    fn test_non_scalar_setting_is_rejected() {
        let settings: Settings = toml::from_str("profile_events = [1, 2]").unwrap();
        let err = ClickHouseExecutor::from_settings(&settings).err().unwrap();
        assert!(matches!(err, SettingsError::WrongType { ref key, .. } if key == "profile_events"));
    }

    #[test]
    fn test_wrong_port_type() {
        let settings: Settings = toml::from_str(r#"port = "8123""#).unwrap();
        assert!(ClickHouseExecutor::from_settings(&settings).is_err());
    }

    #[test]
    fn test_server_duration_uses_latest_progress() {
        let headers = [
            r#"{"read_rows":"10","elapsed_ns":"1000"}"#,
            r#"{"read_rows":"20","elapsed_ns":"2500"}"#,
        ];
        let duration = server_duration_from(headers.into_iter(), None);
        assert_eq!(duration, Duration::from_nanos(2500));
    }

    #[test]
    fn test_server_duration_falls_back_to_summary() {
        let duration =
            server_duration_from(std::iter::empty(), Some(r#"{"elapsed_ns":"4200"}"#));
        assert_eq!(duration, Duration::from_nanos(4200));
    }

    #[test]
    fn test_server_duration_is_zero_without_headers() {
        assert_eq!(server_duration_from(std::iter::empty(), None), Duration::ZERO);
        assert_eq!(
            server_duration_from(["not json"].into_iter(), Some("{}")),
            Duration::ZERO
        );
    }

    #[test]
    fn test_elapsed_ns_accepts_numbers() {
        assert_eq!(elapsed_ns(r#"{"elapsed_ns":77}"#), Some(77));
        assert_eq!(elapsed_ns(r#"{"elapsed_ns":true}"#), None);
    }
}
