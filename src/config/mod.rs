pub mod schema;

pub use schema::{
    ApiConfig, Config, GatewayConfig, ObservabilityConfig, SecurityConfig, StoreConfig,
    ToolsConfig, WeChatConfig,
};
