/// Connection settings for the HTTP driver.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_port() -> u16 {
    8123
}
fn default_user() -> String {
    "default".into()
}
fn default_database() -> String {
    "default".into()
}

impl Config {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            database: default_database(),
            tls: false,
            accept_invalid_certs: false,
        }
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Per-query store settings, sent alongside the statement
/// (`max_execution_time`, `insert_deduplicate`, ...). Kept opaque — the
/// core never interprets individual settings.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QueryOptions {
    entries: Vec<(String, serde_json::Value)>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == &name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overlay `overrides` on top of `self`, producing a new value.
    /// Neither input is touched — defaults stored on a client must survive
    /// any number of per-call merges unchanged.
    pub fn merged(&self, overrides: &QueryOptions) -> QueryOptions {
        let mut out = self.clone();
        for (name, value) in overrides.iter() {
            out.set(name, value.clone());
        }
        out
    }
}
