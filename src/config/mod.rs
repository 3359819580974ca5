pub mod schema;
pub mod traits;

pub use schema::{
    resolve_config_dir, ChannelsConfig, Config, ExchangeConfig, GatewayConfig, RemoteConfig,
    TelegramConfig,
};
pub use traits::ChannelConfig;
