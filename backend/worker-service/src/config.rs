use event_bus::BrokerConfig;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub env: String,
    pub log_format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub app: AppConfig,
    pub broker: BrokerConfig,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let log_format = match std::env::var("LOG_FORMAT")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_format,
            },
            broker: BrokerConfig::from_env().with_connection_name("worker-service"),
        }
    }
}
