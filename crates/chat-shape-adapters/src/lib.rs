pub mod config;
pub mod explorer;
pub mod health;
pub mod rpc;
pub mod signatures;

pub use config::AdapterConfig;
pub use explorer::BlockscoutAdapter;
pub use health::{probe_health, HealthStatus, RpcHealth};
pub use rpc::RpcAdapter;
pub use signatures::SourcifyAdapter;
