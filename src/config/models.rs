use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub topology: TopologyConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

/// RabbitMQ connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    /// May also come from `RABBITMQ_PASSWORD`
    #[serde(default = "default_password", skip_serializing)]
    pub password: String,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    /// Period of the liveness log and of reconnect attempts
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: HumanDuration,
}

impl BrokerConfig {
    /// Build the `amqp://` URI used to dial the broker.
    ///
    /// The default vhost `/` is expressed by omitting the path.
    pub fn amqp_uri(&self) -> String {
        let mut uri = format!(
            "amqp://{}:{}@{}:{}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host,
            self.port
        );
        if self.vhost != "/" {
            uri.push('/');
            uri.push_str(&urlencoding::encode(&self.vhost));
        }
        uri
    }

    /// URI with the password masked, for logs
    pub fn redacted_uri(&self) -> String {
        format!("amqp://{}:***@{}:{}", self.username, self.host, self.port)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: default_username(),
            password: default_password(),
            vhost: default_vhost(),
            heartbeat_interval: default_heartbeat_interval(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5672
}

fn default_username() -> String {
    "guest".to_string()
}

fn default_password() -> String {
    "guest".to_string()
}

fn default_vhost() -> String {
    "/".to_string()
}

fn default_heartbeat_interval() -> HumanDuration {
    HumanDuration::from_secs(10)
}

/// Worker loop settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Broker prefetch per consumer channel
    #[serde(default = "default_number_of_workers")]
    pub number_of_workers: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            number_of_workers: default_number_of_workers(),
        }
    }
}

fn default_number_of_workers() -> u32 {
    1
}

/// AMQP exchange kinds understood by the publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeType {
    Direct,
    #[default]
    Topic,
    Fanout,
    Headers,
}

/// Exchange, queue and routing key names shared with the bot side
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopologyConfig {
    #[serde(default = "default_event_exchange")]
    pub event_exchange: String,
    #[serde(default)]
    pub event_exchange_type: ExchangeType,
    #[serde(default = "default_success_routing_key")]
    pub success_routing_key: String,
    #[serde(default = "default_queue_exchange")]
    pub queue_exchange: String,
    #[serde(default = "default_durable")]
    pub durable: bool,
    #[serde(default = "default_cobalt_queue")]
    pub cobalt_queue: String,
    #[serde(default = "default_cobalt_routing_key")]
    pub cobalt_routing_key: String,
    #[serde(default = "default_ytdl_queue")]
    pub ytdl_queue: String,
    #[serde(default = "default_ytdl_routing_key")]
    pub ytdl_routing_key: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            event_exchange: default_event_exchange(),
            event_exchange_type: ExchangeType::default(),
            success_routing_key: default_success_routing_key(),
            queue_exchange: default_queue_exchange(),
            durable: default_durable(),
            cobalt_queue: default_cobalt_queue(),
            cobalt_routing_key: default_cobalt_routing_key(),
            ytdl_queue: default_ytdl_queue(),
            ytdl_routing_key: default_ytdl_routing_key(),
        }
    }
}

fn default_event_exchange() -> String {
    "downly.worker.event.exchange".to_string()
}

fn default_success_routing_key() -> String {
    "downly.worker.event.success.routing.key".to_string()
}

fn default_queue_exchange() -> String {
    "downly.worker.queue.exchange".to_string()
}

fn default_durable() -> bool {
    true
}

fn default_cobalt_queue() -> String {
    "downly.worker.queue.cobalt.queue".to_string()
}

fn default_cobalt_routing_key() -> String {
    "downly.worker.queue.cobalt.routing.key".to_string()
}

fn default_ytdl_queue() -> String {
    "downly.worker.queue.ytdl.queue".to_string()
}

fn default_ytdl_routing_key() -> String {
    "downly.worker.queue.ytdl.routing.key".to_string()
}

/// Outbound HTTP client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(60)
}

fn default_user_agent() -> String {
    concat!("downly-worker/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Per-backend settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub cobalt: CobaltConfig,
    #[serde(default)]
    pub ytdl: YtdlConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CobaltConfig {
    #[serde(default = "default_enabled")]
    pub enable: bool,
    #[serde(default = "default_cobalt_api_url")]
    pub api_url: String,
}

impl Default for CobaltConfig {
    fn default() -> Self {
        Self {
            enable: default_enabled(),
            api_url: default_cobalt_api_url(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_cobalt_api_url() -> String {
    "http://localhost:9000/".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct YtdlConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_ytdl_bin")]
    pub bin: PathBuf,
    /// Arguments placed before the request URL
    #[serde(default = "default_ytdl_args")]
    pub args: Vec<String>,
    #[serde(default = "default_ytdl_timeout")]
    pub timeout: HumanDuration,
}

impl Default for YtdlConfig {
    fn default() -> Self {
        Self {
            enable: false,
            bin: default_ytdl_bin(),
            args: default_ytdl_args(),
            timeout: default_ytdl_timeout(),
        }
    }
}

fn default_ytdl_bin() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_ytdl_args() -> Vec<String> {
    vec!["--no-warnings".to_string(), "--get-url".to_string()]
}

fn default_ytdl_timeout() -> HumanDuration {
    HumanDuration::from_secs(120)
}
