//! Server network layer: UDP socket, receive loop, worker, sender and sweep

use crate::config::ServerConfig;
use crate::pipeline::{packet_queue, EndpointFramers, Packet, PacketSender};
use crate::relay::{RelayState, Reply};
use log::{debug, error, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};

const RECV_BUFFER_SIZE: usize = 2048;

/// The relay server bound to one UDP endpoint
pub struct Server {
    socket: Arc<UdpSocket>,
    config: ServerConfig,
    state: Arc<Mutex<RelayState>>,
    local_addr: SocketAddr,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind(config.bind_addr()).await?;
        let local_addr = socket.local_addr()?;
        info!(
            "Server listening on {} ({} client slots, {} session slots)",
            local_addr,
            config.client_capacity(),
            config.session_capacity()
        );

        Ok(Server {
            socket: Arc::new(socket),
            state: Arc::new(Mutex::new(RelayState::from_config(&config))),
            config,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared handle to the pools, locked by the worker and the sweep.
    pub fn state(&self) -> Arc<Mutex<RelayState>> {
        Arc::clone(&self.state)
    }

    /// Runs until `signal` resolves, then notifies every connected client and
    /// waits for the background tasks to finish.
    pub async fn run_until<F>(self, signal: F) -> Result<(), JoinError>
    where
        F: Future<Output = ()>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue_tx, mut queue_rx) = packet_queue(self.config.queue_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.queue_capacity.max(1));

        let receiver = self.spawn_receiver(queue_tx, shutdown_rx.clone());
        let sweeper = self.spawn_sweeper(shutdown_rx);
        let sender = self.spawn_sender(outbound_rx);

        tokio::pin!(signal);
        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("Shutdown requested");
                    break;
                }
                next = queue_rx.next_message() => {
                    let Some((message, addr)) = next else {
                        warn!("Packet queue closed unexpectedly");
                        break;
                    };
                    if !message.packet_type().is_request() {
                        debug!("Ignoring {:?} from {}", message.packet_type(), addr);
                        continue;
                    }
                    let replies = self.state.lock().await.handle(message, addr, Instant::now());
                    forward(&outbound_tx, replies).await;
                }
            }
        }

        let _ = shutdown_tx.send(true);
        let dropped = queue_rx.dropped();
        drop(queue_rx);

        let farewells = self.state.lock().await.disconnect_all();
        info!("Notifying {} clients of shutdown", farewells.len());
        forward(&outbound_tx, farewells).await;
        drop(outbound_tx);

        receiver.await?;
        sweeper.await?;
        sender.await?;

        info!("Server stopped ({} malformed frames dropped)", dropped);
        Ok(())
    }

    /// Spawns task that frames incoming datagrams and feeds the packet queue
    fn spawn_receiver(
        &self,
        queue: PacketSender,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let max_partial = self.config.client_capacity();

        tokio::spawn(async move {
            let mut framers = EndpointFramers::new(max_partial);
            let mut buffer = [0u8; RECV_BUFFER_SIZE];

            loop {
                let received = tokio::select! {
                    _ = shutdown.changed() => break,
                    received = socket.recv_from(&mut buffer) => received,
                };

                match received {
                    Ok((len, addr)) => {
                        for frame in framers.push(addr, &buffer[..len], Instant::now()) {
                            debug!(
                                "Frame type {} ({} bytes) from {}",
                                frame.kind, frame.size, addr
                            );
                            if queue.enqueue(Packet { frame, addr }).await.is_err() {
                                debug!("Packet queue closed, receive loop exiting");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }

            debug!(
                "Receive loop stopped ({} frames accepted, {} rejected)",
                framers.accepted(),
                framers.rejected()
            );
        })
    }

    /// Spawns task that periodically marks idle clients for eviction
    fn spawn_sweeper(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let period = self.config.sweep_interval.max(Duration::from_millis(1));
        let stale_after = self.config.stale_after;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        let marked = state.lock().await.mark_stale(Instant::now(), stale_after);
                        if marked > 0 {
                            debug!("Sweep marked {} idle clients for eviction", marked);
                        }
                    }
                }
            }
        })
    }

    /// Spawns task that owns every write to the socket
    fn spawn_sender(&self, mut outbound: mpsc::Receiver<Reply>) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            while let Some(reply) = outbound.recv().await {
                if let Err(e) = send_reply(&socket, &reply).await {
                    warn!(
                        "Failed to send {:?} to {}: {}",
                        reply.message.packet_type(),
                        reply.addr,
                        e
                    );
                }
            }
        })
    }
}

/// Hands replies to the sender task, waiting while its queue is full.
async fn forward(outbound: &mpsc::Sender<Reply>, replies: Vec<Reply>) {
    for reply in replies {
        if outbound.send(reply).await.is_err() {
            warn!("Sender task is gone, dropping reply");
            return;
        }
    }
}

async fn send_reply(
    socket: &UdpSocket,
    reply: &Reply,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let data = reply.message.encode()?;
    socket.send_to(&data, reply.addr).await?;
    Ok(())
}
