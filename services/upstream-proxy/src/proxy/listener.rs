//! TCP listener and accept loop.
//!
//! Accepts connections and spawns one task per connection that hands the
//! socket to [`Proxy::handle_connection`]. There is no connection limit and
//! no idle timeout; admission is controlled by the proxy's lifecycle gate.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, error, info, Instrument};

use super::service::{ConnectionEnd, Proxy};

/// Pause after a failed accept before retrying.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Disable Nagle's algorithm on accepted sockets.
    pub nodelay: bool,
}

impl ListenerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            nodelay: true,
        }
    }
}

/// A bound frontend listener.
pub struct Listener {
    config: ListenerConfig,
    listener: TcpListener,
    proxy: Proxy,
}

impl Listener {
    /// Bind the listener.
    pub async fn bind(config: ListenerConfig, proxy: Proxy) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        info!(bind_addr = %local_addr, "Listener bound");

        Ok(Self {
            config,
            listener,
            proxy,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is dropped.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(bind_addr = %local_addr, "Listener started");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    if self.config.nodelay {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(peer_addr = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
                        }
                    }

                    let proxy = self.proxy.clone();
                    tokio::spawn(
                        async move {
                            match proxy.handle_connection(stream).await {
                                ConnectionEnd::Relayed(outcome) => debug!(
                                    bytes_to_backend = outcome.bytes_to_backend,
                                    bytes_from_backend = outcome.bytes_from_backend,
                                    "Connection finished"
                                ),
                                ConnectionEnd::Rejected { status }
                                | ConnectionEnd::HandedOff { status } => {
                                    debug!(status, "Connection finished without relay")
                                }
                            }
                        }
                        .instrument(tracing::info_span!("connection", peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    // Brief sleep to avoid tight loop on persistent errors
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::gate::LifecycleState;
    use crate::proxy::service::ProxyOptions;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    #[test]
    fn test_listener_config_default() {
        let config = ListenerConfig::new("[::]:3000".parse().unwrap());
        assert!(config.nodelay);
        assert_eq!(config.bind_addr.port(), 3000);
    }

    #[tokio::test]
    async fn test_accepts_and_hands_off() {
        let proxy = Proxy::new(ProxyOptions::default());
        assert_eq!(proxy.status(), LifecycleState::Passive);

        let listener = Listener::bind(
            ListenerConfig::new("127.0.0.1:0".parse().unwrap()),
            proxy.clone(),
        )
        .await
        .unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(Arc::new(listener).run());

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert_eq!(response, "HTTP/1.1 503 Service Unavailable\r\n\r\n");

        task.abort();
    }
}
