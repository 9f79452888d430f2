use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use clap::{Args, Parser, Subcommand, ValueEnum};
use crate::gateway::circuit_breaker::CircuitBreakerConfig;
use crate::messaging::RESERVATIONS_DESTINATION;
use crate::service::processor::DeliveryPolicy;

pub const DEFAULT_HEALTH_STATUS: &str = "I <3 First Data!";

#[derive(Parser, Clone, Debug)]
#[clap(name = "reservations", version, about = "Reservation gateway and backing service")]
pub struct Config {
    #[clap(env, long, default_value = "development")]
    pub environment: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Backing service: store, write consumer and read API.
    Service(ServiceConfig),
    /// Public gateway: publishes writes, aggregates reads.
    Gateway(GatewayConfig),
    /// Both services in one process over an in-memory store and broker.
    Standalone(StandaloneConfig),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerKind {
    /// Only reaches subscribers in the same process; refused by `service`
    /// and `gateway`.
    Memory,
    Kafka,
}

#[derive(Args, Clone, Debug)]
pub struct BrokerConfig {
    #[clap(env, long, value_enum, default_value = "kafka")]
    pub broker: BrokerKind,

    #[clap(env, long, default_value = "localhost:9092")]
    pub kafka_brokers: String,

    #[clap(env, long, default_value = RESERVATIONS_DESTINATION)]
    pub destination: String,

    #[clap(env, long, default_value_t = 1024)]
    pub channel_capacity: usize,

    #[clap(env, long, default_value_t = 5000)]
    pub send_timeout_ms: u64,
}

impl BrokerConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Args, Clone, Debug)]
pub struct HttpConfig {
    #[clap(env, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind_address: IpAddr,

    /// Comma separated list of origins allowed by CORS.
    #[clap(env, long, default_value = "http://localhost:3000")]
    pub origin_urls: String,
}

#[derive(Args, Clone, Debug)]
pub struct MessageConfig {
    #[clap(env, long, default_value = "Hello")]
    pub message: String,

    /// Env file re-read by `POST /refresh`; defaults to the nearest `.env`.
    #[clap(env, long)]
    pub env_file: Option<PathBuf>,

    #[clap(env, long, default_value = DEFAULT_HEALTH_STATUS)]
    pub health_status: String,
}

#[derive(Args, Clone, Debug)]
pub struct SeedConfig {
    /// Names saved on startup. Defaults to the sample guest list.
    #[clap(env, long, value_delimiter = ',')]
    pub seed_names: Option<Vec<String>>,

    #[clap(env, long)]
    pub skip_seed: bool,
}

#[derive(Args, Clone, Debug)]
pub struct DeliveryConfig {
    #[clap(env, long, default_value_t = 5)]
    pub max_attempts: usize,

    #[clap(env, long, default_value_t = 200)]
    pub initial_backoff_ms: u64,

    #[clap(env, long, default_value_t = 5000)]
    pub max_backoff_ms: u64,

    #[clap(env, long)]
    pub disable_dead_letters: bool,
}

impl DeliveryConfig {
    pub fn policy(&self, dead_letter_destination: String) -> DeliveryPolicy {
        DeliveryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            dead_letter_destination: (!self.disable_dead_letters).then_some(dead_letter_destination),
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct BreakerConfig {
    #[clap(env, long, default_value_t = 2000)]
    pub read_timeout_ms: u64,

    #[clap(env, long, default_value_t = 5)]
    pub failure_threshold: usize,

    #[clap(env, long, default_value_t = 60)]
    pub open_timeout_secs: u64,

    #[clap(env, long, default_value_t = 2)]
    pub success_threshold: usize,
}

impl BreakerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::builder()
            .failure_threshold(self.failure_threshold)
            .timeout(Duration::from_secs(self.open_timeout_secs))
            .success_threshold(self.success_threshold)
            .build()
    }
}

#[derive(Args, Clone, Debug)]
pub struct ServiceConfig {
    #[clap(env, long, default_value_t = 8000)]
    pub port: u16,

    #[clap(env, long)]
    pub database_url: String,

    #[clap(env, long, default_value_t = 16)]
    pub database_pool_size: u32,

    #[clap(env, long, default_value = "reservation-service")]
    pub consumer_group: String,

    #[clap(flatten)]
    pub http: HttpConfig,

    #[clap(flatten)]
    pub broker: BrokerConfig,

    #[clap(flatten)]
    pub message: MessageConfig,

    #[clap(flatten)]
    pub seed: SeedConfig,

    #[clap(flatten)]
    pub delivery: DeliveryConfig,
}

#[derive(Args, Clone, Debug)]
pub struct GatewayConfig {
    #[clap(env, long, default_value_t = 9999)]
    pub port: u16,

    /// Comma separated base URLs of the reservation service instances.
    #[clap(env, long, value_delimiter = ',', default_value = "http://localhost:8000")]
    pub reservation_service_urls: Vec<String>,

    #[clap(flatten)]
    pub http: HttpConfig,

    #[clap(flatten)]
    pub broker: BrokerConfig,

    #[clap(flatten)]
    pub breaker: BreakerConfig,
}

#[derive(Args, Clone, Debug)]
pub struct StandaloneConfig {
    #[clap(env, long, default_value_t = 8000)]
    pub service_port: u16,

    #[clap(env, long, default_value_t = 9999)]
    pub gateway_port: u16,

    #[clap(env, long, default_value = RESERVATIONS_DESTINATION)]
    pub destination: String,

    #[clap(env, long, default_value_t = 1024)]
    pub channel_capacity: usize,

    #[clap(flatten)]
    pub http: HttpConfig,

    #[clap(flatten)]
    pub message: MessageConfig,

    #[clap(flatten)]
    pub seed: SeedConfig,

    #[clap(flatten)]
    pub delivery: DeliveryConfig,

    #[clap(flatten)]
    pub breaker: BreakerConfig,
}

impl HttpConfig {
    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.bind_address, port)
    }
}
