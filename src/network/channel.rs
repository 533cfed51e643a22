//! Reliable-Ordered Channels
//!
//! In-process transport between the authority and its clients. Every
//! packet is stamped with the tick it becomes visible at, so a channel
//! models a fixed one-way latency while keeping delivery reliable and in
//! order. Frames are bincode-encoded, the same as the production wire.

use std::collections::VecDeque;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The other end was dropped.
    #[error("Channel closed")]
    Closed,

    /// A frame could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// A frame in flight.
#[derive(Debug)]
struct Packet {
    deliver_at: u32,
    frame: Vec<u8>,
}

/// Sending half.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<Packet>,
    latency: u32,
}

/// Receiving half.
#[derive(Debug)]
pub struct ChannelReceiver {
    rx: mpsc::UnboundedReceiver<Packet>,
    in_flight: VecDeque<Packet>,
}

/// Create a reliable-ordered channel with `latency_ticks` of one-way delay.
pub fn reliable_channel(latency_ticks: u32) -> (ChannelSender, ChannelReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChannelSender { tx, latency: latency_ticks },
        ChannelReceiver { rx, in_flight: VecDeque::new() },
    )
}

impl ChannelSender {
    /// One-way latency in ticks.
    pub fn latency(&self) -> u32 {
        self.latency
    }

    /// Send a raw frame at tick `now`.
    pub fn send_frame(&self, now: u32, frame: Vec<u8>) -> Result<(), ChannelError> {
        let packet = Packet {
            deliver_at: now.saturating_add(self.latency),
            frame,
        };
        self.tx.send(packet).map_err(|_| ChannelError::Closed)
    }

    /// Encode and send a message at tick `now`.
    pub fn send<M: Serialize>(&self, now: u32, message: &M) -> Result<(), ChannelError> {
        let frame = bincode::serialize(message)?;
        self.send_frame(now, frame)
    }
}

impl ChannelReceiver {
    fn drain(&mut self) {
        while let Ok(packet) = self.rx.try_recv() {
            self.in_flight.push_back(packet);
        }
    }

    /// Frames visible at tick `now`, in send order.
    pub fn receive_frames(&mut self, now: u32) -> Vec<Vec<u8>> {
        self.drain();
        let mut ready = Vec::new();
        while self.in_flight.front().map(|p| p.deliver_at <= now).unwrap_or(false) {
            if let Some(packet) = self.in_flight.pop_front() {
                ready.push(packet.frame);
            }
        }
        ready
    }

    /// Decoded messages visible at tick `now`. Undecodable frames are
    /// logged and skipped.
    pub fn receive<M: DeserializeOwned>(&mut self, now: u32) -> Vec<M> {
        self.receive_frames(now)
            .into_iter()
            .filter_map(|frame| match bincode::deserialize(&frame) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!("dropping undecodable frame: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Frames sent but not yet visible.
    pub fn in_flight(&mut self) -> usize {
        self.drain();
        self.in_flight.len()
    }
}
