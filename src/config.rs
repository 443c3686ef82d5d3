use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the writes of one batch are issued against its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// All writes are in flight at once.
    #[default]
    Concurrent,
    /// One write at a time; stops at the first failure.
    Sequential,
}

impl std::str::FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "concurrent" => Ok(Self::Concurrent),
            "sequential" => Ok(Self::Sequential),
            other => Err(format!("Unknown dispatch mode '{}'", other)),
        }
    }
}

impl std::fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Concurrent => write!(f, "concurrent"),
            Self::Sequential => write!(f, "sequential"),
        }
    }
}

/// Coordination settings
///
/// Loadable from JSON/TOML through serde, from a URL, or built in code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Store address (`host:port`), informational for in-process stores
    pub endpoint: Option<String>,

    /// Schema whose tables a snapshot covers
    pub schema: String,

    /// Maximum table reads in flight during one snapshot
    pub max_in_flight: usize,

    /// How batch writes are issued
    pub dispatch_mode: DispatchMode,

    /// Per store call deadline, if any
    pub query_timeout_ms: Option<u64>,
}

impl CoordinatorConfig {
    pub fn new(schema: &str) -> Self {
        Self {
            endpoint: None,
            schema: schema.to_string(),
            max_in_flight: 16,
            dispatch_mode: DispatchMode::Concurrent,
            query_timeout_ms: None,
        }
    }

    /// Set the store endpoint
    pub fn endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    /// Set the schema
    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    /// Set maximum in-flight reads
    pub fn max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    /// Set batch dispatch mode
    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    /// Set query timeout; saturates at `u64::MAX` milliseconds
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn query_timeout_duration(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    /// Parse from connection string
    ///
    /// Format: "fanstore://[host:port/]schema?max_in_flight=8&dispatch=sequential&timeout_ms=500"
    ///
    /// # Examples
    ///
    /// ```
    /// use fanstore::{CoordinatorConfig, DispatchMode};
    ///
    /// let config = CoordinatorConfig::from_url("fanstore://defaultdb?dispatch=sequential").unwrap();
    /// assert_eq!(config.schema, "defaultdb");
    /// assert_eq!(config.dispatch_mode, DispatchMode::Sequential);
    /// ```
    pub fn from_url(url: &str) -> Result<Self, String> {
        let Some(rest) = url.strip_prefix("fanstore://") else {
            return Err("URL must start with 'fanstore://'".to_string());
        };

        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };
        let path = path.trim_end_matches('/');
        let (endpoint, schema) = match path.rsplit_once('/') {
            Some((endpoint, schema)) => (Some(endpoint), schema),
            None => (None, path),
        };
        if schema.is_empty() {
            return Err("URL must name a schema".to_string());
        }

        let mut config = Self::new(schema);
        if let Some(endpoint) = endpoint {
            if endpoint.is_empty() {
                return Err("Endpoint cannot be empty".to_string());
            }
            config.endpoint = Some(endpoint.to_string());
        }
        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("Invalid parameter '{}'", pair))?;
            match key {
                "max_in_flight" => {
                    config.max_in_flight =
                        value.parse().map_err(|_| "Invalid max_in_flight".to_string())?;
                }
                "dispatch" => config.dispatch_mode = value.parse()?,
                "timeout_ms" => {
                    config.query_timeout_ms =
                        Some(value.parse().map_err(|_| "Invalid timeout_ms".to_string())?);
                }
                other => return Err(format!("Unknown parameter '{}'", other)),
            }
        }

        Ok(config)
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        let mut url = String::from("fanstore://");
        if let Some(endpoint) = &self.endpoint {
            url.push_str(endpoint);
            url.push('/');
        }
        url.push_str(&format!(
            "{}?max_in_flight={}&dispatch={}",
            self.schema, self.max_in_flight, self.dispatch_mode
        ));
        if let Some(timeout) = self.query_timeout_ms {
            url.push_str(&format!("&timeout_ms={}", timeout));
        }
        url
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.schema.trim().is_empty() {
            return Err("Schema cannot be empty".to_string());
        }

        if self.max_in_flight == 0 {
            return Err("max_in_flight must be > 0".to_string());
        }

        if self.query_timeout_ms == Some(0) {
            return Err("timeout must be > 0 when set".to_string());
        }

        Ok(())
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new("defaultdb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.schema, "defaultdb");
        assert_eq!(config.dispatch_mode, DispatchMode::Concurrent);
        assert!(config.query_timeout_duration().is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = CoordinatorConfig::new("app")
            .max_in_flight(4)
            .dispatch_mode(DispatchMode::Sequential)
            .query_timeout(Duration::from_millis(250));

        assert_eq!(config.max_in_flight, 4);
        assert_eq!(config.dispatch_mode, DispatchMode::Sequential);
        assert_eq!(config.query_timeout_duration(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_from_url() {
        let config = CoordinatorConfig::from_url(
            "fanstore://db.internal:3306/defaultdb?max_in_flight=8&dispatch=sequential&timeout_ms=500",
        )
        .unwrap();

        assert_eq!(config.endpoint.as_deref(), Some("db.internal:3306"));
        assert_eq!(config.schema, "defaultdb");
        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.dispatch_mode, DispatchMode::Sequential);
        assert_eq!(config.query_timeout_ms, Some(500));
    }

    #[test]
    fn test_url_round_trip() {
        let config = CoordinatorConfig::new("app")
            .endpoint("localhost:3306")
            .query_timeout(Duration::from_secs(1));
        assert_eq!(CoordinatorConfig::from_url(&config.to_url()).unwrap(), config);
    }

    #[test]
    fn test_invalid_url() {
        assert!(CoordinatorConfig::from_url("mysql://app").is_err());
        assert!(CoordinatorConfig::from_url("fanstore://").is_err());
        assert!(CoordinatorConfig::from_url("fanstore://app?dispatch=random").is_err());
        assert!(CoordinatorConfig::from_url("fanstore://app?color=blue").is_err());
        assert!(CoordinatorConfig::from_url("fanstore://app?permit_timeout_ms=100").is_err());
    }

    #[test]
    fn test_huge_query_timeout_saturates() {
        let config = CoordinatorConfig::new("app").query_timeout(Duration::MAX);
        assert_eq!(config.query_timeout_ms, Some(u64::MAX));

        let config = CoordinatorConfig::new("app").query_timeout(Duration::from_secs(90));
        assert_eq!(config.query_timeout_ms, Some(90_000));
    }

    #[test]
    fn test_validate() {
        assert!(CoordinatorConfig::new("app").validate().is_ok());
        assert!(CoordinatorConfig::new(" ").validate().is_err());
        assert!(CoordinatorConfig::new("app").max_in_flight(0).validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"schema": "app", "dispatch_mode": "sequential"}"#).unwrap();

        assert_eq!(config.schema, "app");
        assert_eq!(config.dispatch_mode, DispatchMode::Sequential);
        assert_eq!(config.max_in_flight, 16);
    }
}
