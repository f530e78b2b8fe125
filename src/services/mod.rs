pub mod agents;
pub mod config;
pub mod context;
pub mod http_executor;
pub mod logger;
pub mod metrics;
pub mod profile;
pub mod request_config;
pub mod secret_ref;
pub mod status;
pub mod typed_value;
