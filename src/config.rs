use envconfig::Envconfig;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================
//
// Read once from the environment at startup. Values that a role cannot run
// without are optional here and checked by `validate`. Every role needs Kafka
// and both stores; only the gateway needs Postgres.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("unknown role {0:?}, expected gateway, dispatcher or all")]
    UnknownRole(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Gateway,
    Dispatcher,
    All,
}

impl Role {
    pub fn runs_gateway(self) -> bool {
        matches!(self, Role::Gateway | Role::All)
    }

    pub fn runs_dispatcher(self) -> bool {
        matches!(self, Role::Dispatcher | Role::All)
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gateway" => Ok(Role::Gateway),
            "dispatcher" => Ok(Role::Dispatcher),
            "all" => Ok(Role::All),
            other => Err(ConfigError::UnknownRole(other.to_string())),
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "LOGPIPE_ROLE", default = "all")]
    pub role: String,

    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,

    #[envconfig(from = "METRICS_PORT", default = "9090")]
    pub metrics_port: u16,

    #[envconfig(from = "KAFKA_BROKERS")]
    pub kafka_brokers: Option<String>,

    #[envconfig(from = "KAFKA_TOPIC", default = "logs")]
    pub kafka_topic: String,

    #[envconfig(from = "KAFKA_GROUP_ID", default = "log-processors")]
    pub kafka_group_id: String,

    #[envconfig(from = "PUBLISH_TIMEOUT_MS", default = "5000")]
    pub publish_timeout_ms: u64,

    #[envconfig(from = "CASSANDRA_HOSTS")]
    pub cassandra_hosts: Option<String>,

    #[envconfig(from = "CASSANDRA_KEYSPACE", default = "logs_ks")]
    pub cassandra_keyspace: String,

    #[envconfig(from = "CASSANDRA_USER")]
    pub cassandra_user: Option<String>,

    #[envconfig(from = "CASSANDRA_PASSWORD")]
    pub cassandra_password: Option<String>,

    #[envconfig(from = "CLICKHOUSE_HOST")]
    pub clickhouse_host: Option<String>,

    #[envconfig(from = "CLICKHOUSE_PORT", default = "8123")]
    pub clickhouse_port: u16,

    #[envconfig(from = "CLICKHOUSE_DATABASE", default = "default")]
    pub clickhouse_database: String,

    #[envconfig(from = "CLICKHOUSE_USER", default = "default")]
    pub clickhouse_user: String,

    #[envconfig(from = "CLICKHOUSE_PASSWORD", default = "")]
    pub clickhouse_password: String,

    #[envconfig(from = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[envconfig(from = "MAX_PG_CONNECTIONS", default = "4")]
    pub max_pg_connections: u32,

    #[envconfig(from = "SEARCHABLE_FIELD", default = "searchable_key_1")]
    pub searchable_field: String,

    /// 0 keeps fan-out unbounded.
    #[envconfig(from = "MAX_IN_FLIGHT_WRITES", default = "0")]
    pub max_in_flight_writes: usize,
}

pub struct KafkaSettings {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub publish_timeout: Duration,
}

pub struct ScyllaSettings {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

pub struct ClickHouseSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl ClickHouseSettings {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Split a comma-separated list, dropping blanks.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ConfigError::Missing(name))
}

impl Config {
    pub fn role(&self) -> Result<Role, ConfigError> {
        self.role.parse()
    }

    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn kafka(&self) -> Result<KafkaSettings, ConfigError> {
        let brokers = split_list(&required(&self.kafka_brokers, "KAFKA_BROKERS")?);
        if brokers.is_empty() {
            return Err(ConfigError::Missing("KAFKA_BROKERS"));
        }

        Ok(KafkaSettings {
            brokers: brokers.join(","),
            topic: self.kafka_topic.clone(),
            group_id: self.kafka_group_id.clone(),
            publish_timeout: Duration::from_millis(self.publish_timeout_ms),
        })
    }

    pub fn scylla(&self) -> Result<ScyllaSettings, ConfigError> {
        let hosts = split_list(&required(&self.cassandra_hosts, "CASSANDRA_HOSTS")?);
        if hosts.is_empty() {
            return Err(ConfigError::Missing("CASSANDRA_HOSTS"));
        }

        Ok(ScyllaSettings {
            hosts,
            keyspace: self.cassandra_keyspace.clone(),
            user: self.cassandra_user.clone().filter(|u| !u.is_empty()),
            password: self.cassandra_password.clone().filter(|p| !p.is_empty()),
        })
    }

    pub fn clickhouse(&self) -> Result<ClickHouseSettings, ConfigError> {
        Ok(ClickHouseSettings {
            host: required(&self.clickhouse_host, "CLICKHOUSE_HOST")?,
            port: self.clickhouse_port,
            database: self.clickhouse_database.clone(),
            user: self.clickhouse_user.clone(),
            password: self.clickhouse_password.clone(),
        })
    }

    pub fn database_url(&self) -> Result<String, ConfigError> {
        required(&self.database_url, "DATABASE_URL")
    }

    /// Check everything the configured role needs, before any connection is
    /// attempted.
    pub fn validate(&self) -> Result<Role, ConfigError> {
        let role = self.role()?;

        // Both roles touch the queue.
        self.kafka()?;

        if role.runs_gateway() {
            self.database_url()?;
        }
        // The gateway's read API also queries both stores.
        self.scylla()?;
        self.clickhouse()?;

        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::init_from_hashmap(&env).unwrap()
    }

    const FULL: &[(&str, &str)] = &[
        ("KAFKA_BROKERS", "k1:9092, k2:9092"),
        ("CASSANDRA_HOSTS", "c1:9042,,c2:9042"),
        ("CLICKHOUSE_HOST", "ch"),
        ("DATABASE_URL", "postgres://localhost/logs"),
    ];

    #[test]
    fn test_defaults() {
        let config = config(FULL);

        assert_eq!(config.role().unwrap(), Role::All);
        assert_eq!(config.bind(), "0.0.0.0:8080");
        assert_eq!(config.kafka_topic, "logs");
        assert_eq!(config.kafka_group_id, "log-processors");
        assert_eq!(config.searchable_field, "searchable_key_1");
        assert_eq!(config.max_in_flight_writes, 0);
        assert_eq!(config.clickhouse().unwrap().url(), "http://ch:8123");
    }

    #[test]
    fn test_host_lists_are_split_and_trimmed() {
        let config = config(FULL);

        assert_eq!(config.kafka().unwrap().brokers, "k1:9092,k2:9092");
        assert_eq!(config.scylla().unwrap().hosts, vec!["c1:9042", "c2:9042"]);
    }

    #[test]
    fn test_missing_required_values_fail_validation() {
        let no_kafka = config(&FULL[1..]);
        assert!(matches!(no_kafka.validate(), Err(ConfigError::Missing("KAFKA_BROKERS"))));

        let blank_hosts = config(&[
            ("KAFKA_BROKERS", "k1"),
            ("CASSANDRA_HOSTS", " , "),
            ("CLICKHOUSE_HOST", "ch"),
            ("DATABASE_URL", "postgres://x"),
        ]);
        assert!(matches!(blank_hosts.validate(), Err(ConfigError::Missing("CASSANDRA_HOSTS"))));
    }

    #[test]
    fn test_dispatcher_role_does_not_need_database_url() {
        let dispatcher = config(&[
            ("LOGPIPE_ROLE", "dispatcher"),
            ("KAFKA_BROKERS", "k1"),
            ("CASSANDRA_HOSTS", "c1"),
            ("CLICKHOUSE_HOST", "ch"),
        ]);
        assert_eq!(dispatcher.validate().unwrap(), Role::Dispatcher);

        let gateway = config(&[
            ("LOGPIPE_ROLE", "gateway"),
            ("KAFKA_BROKERS", "k1"),
            ("CASSANDRA_HOSTS", "c1"),
            ("CLICKHOUSE_HOST", "ch"),
        ]);
        assert!(matches!(gateway.validate(), Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn test_gateway_role_needs_both_stores() {
        let gateway = config(&[
            ("LOGPIPE_ROLE", "gateway"),
            ("KAFKA_BROKERS", "k1"),
            ("CASSANDRA_HOSTS", "c1"),
            ("DATABASE_URL", "postgres://x"),
        ]);
        assert!(matches!(gateway.validate(), Err(ConfigError::Missing("CLICKHOUSE_HOST"))));
    }

    #[test]
    fn test_unknown_role() {
        let config = config(&[("LOGPIPE_ROLE", "worker")]);
        assert!(matches!(config.validate(), Err(ConfigError::UnknownRole(_))));
    }

    #[test]
    fn test_cassandra_auth_only_when_set() {
        let config = config(FULL);
        let scylla = config.scylla().unwrap();
        assert!(scylla.user.is_none() && scylla.password.is_none());
    }
}
