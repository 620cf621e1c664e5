use std::time::Duration;

/// Runtime settings for the relay.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Size of the client pool. Client ids travel as u16, so the pool is
    /// capped below `u16::MAX`, which the protocol reserves.
    pub max_clients: usize,
    /// Accepted frames that may wait between the receive loop and the worker.
    pub queue_capacity: usize,
    pub sweep_interval: Duration,
    /// Silence after which a client becomes eligible for eviction.
    pub stale_after: Duration,
    pub winning_score: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: shared::DEFAULT_PORT,
            max_clients: 256,
            queue_capacity: 100_000,
            sweep_interval: Duration::from_secs(1),
            stale_after: Duration::from_secs(10),
            winning_score: 2,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn client_capacity(&self) -> usize {
        self.max_clients.min(u16::MAX as usize)
    }

    /// Sessions pair two clients, so the session pool is half the client pool.
    pub fn session_capacity(&self) -> usize {
        (self.client_capacity() / 2).max(1)
    }
}
