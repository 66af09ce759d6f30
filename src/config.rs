use std::env;
use std::time::Duration;

pub const DEFAULT_REPLICATE_BASE_URL: &str = "https://api.replicate.com/v1";
pub const DEFAULT_REPLICATE_MODEL: &str = "black-forest-labs/flux-dev";
pub const DEFAULT_BUCKET: &str = "bucket1";

#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: Option<String>,
    pub service_key: Option<String>,
    pub bucket: String,
}

/// Where a client session sends its generation requests.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub function_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: Option<u16>,
    pub use_memory_storage: bool,
    pub replicate: Option<ReplicateConfig>,
    pub supabase: Option<SupabaseConfig>,
    pub backend: Option<BackendConfig>,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        ReplicateConfig {
            api_key: None,
            model: DEFAULT_REPLICATE_MODEL.to_string(),
            base_url: DEFAULT_REPLICATE_BASE_URL.to_string(),
            poll_interval: Duration::from_millis(1000),
            max_polls: 300,
        }
    }
}

impl ReplicateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_key = env::var("REPLICATE_API_KEY").ok().filter(|k| !k.is_empty());
        let model = env::var("REPLICATE_MODEL").unwrap_or(defaults.model);
        let base_url = env::var("REPLICATE_BASE_URL").unwrap_or(defaults.base_url);
        let poll_interval = env::var("REPLICATE_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        let max_polls = env::var("REPLICATE_MAX_POLLS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_polls);

        ReplicateConfig {
            api_key,
            model,
            base_url,
            poll_interval,
            max_polls,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        SupabaseConfig {
            url: None,
            service_key: None,
            bucket: DEFAULT_BUCKET.to_string(),
        }
    }
}

impl SupabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let url = env::var("SUPABASE_URL").ok();
        let service_key = env::var("SUPABASE_SERVICE_ROLE_KEY").ok();
        let bucket = env::var("SUPABASE_BUCKET").unwrap_or_else(|_| DEFAULT_BUCKET.to_string());

        SupabaseConfig {
            url,
            service_key,
            bucket,
        }
    }

    pub fn with_credentials(mut self, url: impl Into<String>, service_key: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self.service_key = Some(service_key.into());
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.service_key.is_some()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            function_url: None,
            api_key: None,
        }
    }
}

impl BackendConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let function_url = env::var("ORAU_FUNCTION_URL").ok();
        let api_key = env::var("ORAU_FUNCTION_KEY").ok();

        BackendConfig {
            function_url,
            api_key,
        }
    }

    pub fn with_function_url(mut self, url: impl Into<String>) -> Self {
        self.function_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: None,
            use_memory_storage: false,
            replicate: None,
            supabase: None,
            backend: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Reads every section from the environment. Sections whose variables are
    /// all absent are left as `None`.
    pub fn from_env() -> Self {
        let port = env::var("PORT").ok().and_then(|port| port.parse().ok());
        let use_memory_storage = env::var("USE_MEMORY_STORAGE")
            .ok()
            .map_or(false, |val| val == "true");

        let replicate = Some(ReplicateConfig::from_env());
        let supabase = Some(SupabaseConfig::from_env()).filter(|s| s.url.is_some());
        let backend = Some(BackendConfig::from_env()).filter(|b| b.function_url.is_some());

        Config {
            port,
            use_memory_storage,
            replicate,
            supabase,
            backend,
        }
    }

    pub fn with_replicate(mut self, config: ReplicateConfig) -> Self {
        self.replicate = Some(config);
        self
    }

    pub fn with_supabase(mut self, config: SupabaseConfig) -> Self {
        self.supabase = Some(config);
        self
    }

    pub fn with_memory_storage(mut self) -> Self {
        self.use_memory_storage = true;
        self
    }

    pub fn with_backend(mut self, config: BackendConfig) -> Self {
        self.backend = Some(config);
        self
    }

    pub fn bucket(&self) -> &str {
        self.supabase
            .as_ref()
            .map(|s| s.bucket.as_str())
            .unwrap_or(DEFAULT_BUCKET)
    }
}
