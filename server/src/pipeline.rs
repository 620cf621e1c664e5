//! Framing and the bounded FIFO between the receive loop and the worker.
//!
//! The queue holds frames that passed the CRC check. Structural validation
//! (known type code, exact payload length) happens on the consumer side so the
//! receive loop does no work beyond framing.

use log::debug;
use shared::{Frame, FrameDecoder, Message};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;

/// An accepted frame and the endpoint it arrived from
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub frame: Frame,
    pub addr: SocketAddr,
}

/// One frame decoder per source endpoint.
///
/// A decoder is kept only while its endpoint has part of a frame buffered.
/// At most `capacity` are kept; the one fed least recently is discarded to
/// make room.
#[derive(Debug)]
pub struct EndpointFramers {
    decoders: HashMap<SocketAddr, (FrameDecoder, Instant)>,
    capacity: usize,
    accepted: u64,
    rejected: u64,
}

impl EndpointFramers {
    pub fn new(capacity: usize) -> Self {
        Self {
            decoders: HashMap::new(),
            capacity: capacity.max(1),
            accepted: 0,
            rejected: 0,
        }
    }

    /// Feeds one datagram from `addr` and returns the frames it completed.
    pub fn push(&mut self, addr: SocketAddr, input: &[u8], now: Instant) -> Vec<Frame> {
        let mut decoder = match self.decoders.remove(&addr) {
            Some((decoder, _)) => decoder,
            None => FrameDecoder::new(),
        };
        let frames = decoder.push(input);

        if decoder.is_idle() {
            self.retire(decoder);
        } else {
            if self.decoders.len() >= self.capacity {
                self.evict_oldest();
            }
            self.decoders.insert(addr, (decoder, now));
        }
        frames
    }

    /// Endpoints with a partial frame buffered.
    pub fn pending(&self) -> usize {
        self.decoders.len()
    }

    pub fn accepted(&self) -> u64 {
        self.accepted + self.decoders.values().map(|(d, _)| d.accepted()).sum::<u64>()
    }

    pub fn rejected(&self) -> u64 {
        self.rejected + self.decoders.values().map(|(d, _)| d.rejected()).sum::<u64>()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .decoders
            .iter()
            .min_by_key(|(_, (_, fed))| *fed)
            .map(|(addr, _)| *addr);

        if let Some((decoder, _)) = oldest.and_then(|addr| self.decoders.remove(&addr)) {
            debug!("Discarding a partial frame to make room");
            self.retire(decoder);
        }
    }

    fn retire(&mut self, decoder: FrameDecoder) {
        self.accepted += decoder.accepted();
        self.rejected += decoder.rejected();
    }
}

/// Creates a queue holding at most `capacity` packets.
pub fn packet_queue(capacity: usize) -> (PacketSender, PacketReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (PacketSender { tx }, PacketReceiver { rx, dropped: 0 })
}

#[derive(Debug, Clone)]
pub struct PacketSender {
    tx: mpsc::Sender<Packet>,
}

impl PacketSender {
    /// Waits for room when the queue is full. Fails only once the receiver is gone.
    pub async fn enqueue(&self, packet: Packet) -> Result<(), SendError<Packet>> {
        self.tx.send(packet).await
    }
}

#[derive(Debug)]
pub struct PacketReceiver {
    rx: mpsc::Receiver<Packet>,
    dropped: u64,
}

impl PacketReceiver {
    /// Waits for the oldest packet. `None` once every sender is dropped and the
    /// queue has drained.
    pub async fn dequeue(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    /// Waits for the next packet that decodes to a message, dropping the rest.
    pub async fn next_message(&mut self) -> Option<(Message, SocketAddr)> {
        while let Some(packet) = self.dequeue().await {
            match Message::from_frame(&packet.frame) {
                Ok(message) => return Some((message, packet.addr)),
                Err(e) => {
                    self.dropped += 1;
                    debug!("Dropping frame from {}: {}", packet.addr, e);
                }
            }
        }
        None
    }

    /// Frames discarded for an unknown type or a wrong payload length.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::PacketType;
    use std::time::Duration;
    use tokio_test::task;
    use tokio_test::{assert_pending, assert_ready, assert_ready_ok};

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn packet(message: &Message) -> Packet {
        let mut decoder = FrameDecoder::new();
        let mut frames = decoder.push(&message.encode().unwrap());
        Packet {
            frame: frames.remove(0),
            addr: addr(),
        }
    }

    fn raw_packet(kind: u8, data: Vec<u8>) -> Packet {
        Packet {
            frame: Frame {
                kind,
                size: data.len() as u16,
                data,
                crc: 0,
            },
            addr: addr(),
        }
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_partial_frame_stays_with_its_endpoint() {
        let now = Instant::now();
        let mut framers = EndpointFramers::new(8);

        // Header declaring a two-byte payload that never arrives
        let truncated = [0x01, 0x02, 0x03, PacketType::Connect.code(), 0x02, 0x00];
        assert!(framers.push(peer(1), &truncated, now).is_empty());
        assert_eq!(framers.pending(), 1);

        let frames = framers.push(peer(2), &Message::Connect.encode().unwrap(), now);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, PacketType::Connect.code());
        assert_eq!(framers.pending(), 1);
    }

    #[test]
    fn test_split_frame_reassembled_per_endpoint() {
        let now = Instant::now();
        let mut framers = EndpointFramers::new(8);
        let first = Message::CreateSession { client_id: 1 }.encode().unwrap();
        let second = Message::CreateSession { client_id: 2 }.encode().unwrap();

        assert!(framers.push(peer(1), &first[..4], now).is_empty());
        assert!(framers.push(peer(2), &second[..7], now).is_empty());
        assert_eq!(framers.pending(), 2);

        let frames = framers.push(peer(1), &first[4..], now);
        assert_eq!(
            Message::from_frame(&frames[0]).unwrap(),
            Message::CreateSession { client_id: 1 }
        );
        let frames = framers.push(peer(2), &second[7..], now);
        assert_eq!(
            Message::from_frame(&frames[0]).unwrap(),
            Message::CreateSession { client_id: 2 }
        );

        assert_eq!(framers.pending(), 0);
        assert_eq!(framers.accepted(), 2);
    }

    #[test]
    fn test_pending_endpoints_are_bounded() {
        let start = Instant::now();
        let mut framers = EndpointFramers::new(2);
        let bytes = Message::Connect.encode().unwrap();

        framers.push(peer(1), &bytes[..4], start);
        framers.push(peer(2), &bytes[..4], start + Duration::from_millis(1));
        framers.push(peer(3), &bytes[..4], start + Duration::from_millis(2));
        assert_eq!(framers.pending(), 2);

        // The least recently fed endpoint lost its partial frame
        assert!(framers.push(peer(1), &bytes[4..], start).is_empty());
        assert_eq!(framers.push(peer(3), &bytes[4..], start).len(), 1);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = packet_queue(8);
        for client_id in 0..5 {
            tx.enqueue(packet(&Message::CreateSession { client_id }))
                .await
                .unwrap();
        }

        for client_id in 0..5 {
            let (message, from) = rx.next_message().await.unwrap();
            assert_eq!(message, Message::CreateSession { client_id });
            assert_eq!(from, addr());
        }
    }

    #[tokio::test]
    async fn test_full_queue_suspends_producer() {
        let (tx, mut rx) = packet_queue(1);
        tx.enqueue(packet(&Message::Connect)).await.unwrap();

        let mut blocked = task::spawn(tx.enqueue(packet(&Message::ImAlive)));
        assert_pending!(blocked.poll());

        let first = rx.dequeue().await.unwrap();
        assert_eq!(first.frame.kind, PacketType::Connect.code());

        assert!(blocked.is_woken());
        assert_ready_ok!(blocked.poll());
        drop(blocked);

        let second = rx.dequeue().await.unwrap();
        assert_eq!(second.frame.kind, PacketType::ImAlive.code());
    }

    #[tokio::test]
    async fn test_empty_queue_suspends_consumer() {
        let (tx, mut rx) = packet_queue(4);

        let mut waiting = task::spawn(rx.dequeue());
        assert_pending!(waiting.poll());

        tx.enqueue(packet(&Message::Connect)).await.unwrap();
        assert!(waiting.is_woken());
        let received = assert_ready!(waiting.poll());
        assert!(received.is_some());
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (tx, mut rx) = packet_queue(8);
        tx.enqueue(raw_packet(200, Vec::new())).await.unwrap();
        tx.enqueue(raw_packet(PacketType::Connected.code(), vec![1]))
            .await
            .unwrap();
        tx.enqueue(packet(&Message::Connected { client_id: 3 }))
            .await
            .unwrap();

        let (message, _) = rx.next_message().await.unwrap();
        assert_eq!(message, Message::Connected { client_id: 3 });
        assert_eq!(rx.dropped(), 2);
    }

    #[tokio::test]
    async fn test_closed_queue_drains_then_ends() {
        let (tx, mut rx) = packet_queue(4);
        tx.enqueue(packet(&Message::Connect)).await.unwrap();
        drop(tx);

        assert!(rx.next_message().await.is_some());
        assert!(rx.next_message().await.is_none());
    }

    #[tokio::test]
    async fn test_enqueue_fails_without_receiver() {
        let (tx, rx) = packet_queue(4);
        drop(rx);
        assert!(tx.enqueue(packet(&Message::Connect)).await.is_err());
    }
}
