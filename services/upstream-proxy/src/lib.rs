pub mod proxy;
pub mod reload;

pub use proxy::{
    Callbacks, ConfigError, ConfigReport, Failure, LifecycleState, Listener, ListenerConfig, Proxy,
    ProxyConfig, ProxyOptions,
};
pub use reload::ConfigWatcher;
