//! Fault-injecting network simulator.
//!
//! Real networks drop, reorder, duplicate, and corrupt packets.  To exercise
//! the reliability mechanisms without depending on actual network
//! conditions, [`Simulator`] runs a UDP relay between a sender and a
//! receiver and applies a configurable fault model to each direction:
//!
//! | Fault            | Description                                          |
//! |------------------|------------------------------------------------------|
//! | Packet loss      | Drop with probability `loss_rate`.                   |
//! | Periodic loss    | Drop every `drop_every`-th datagram.                 |
//! | Duplication      | Deliver a datagram twice.                            |
//! | Reordering       | Hold a datagram and release it after the next one.   |
//! | Corruption       | Flip one random bit.                                 |
//!
//! Randomness comes from a seeded [`StdRng`], so a failing run replays
//! exactly.  The sender talks to [`Simulator::local_addr`] instead of the
//! receiver; the relay forwards to the receiver from its own socket and
//! routes replies back to whoever sent last.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::packet::RECV_BUFFER;

/// A held (reordered) datagram is released after this much silence.
const HOLD_TIMEOUT: Duration = Duration::from_millis(20);

/// Faults applied to one direction of the link.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Faults {
    pub loss_rate: f64,
    /// Drop the k-th, 2k-th, ... datagram seen in this direction.
    pub drop_every: Option<u64>,
    pub duplicate_rate: f64,
    pub reorder_rate: f64,
    pub corrupt_rate: f64,
}

impl Faults {
    /// Deterministically drop every `k`-th datagram.
    pub fn drop_every(k: u64) -> Self {
        Self {
            drop_every: Some(k),
            ..Self::default()
        }
    }
}

/// Fault model for both directions.  The default injects no faults, so the
/// simulator is a transparent pass-through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatorConfig {
    /// Sender → receiver (START, DATA, END).
    pub forward: Faults,
    /// Receiver → sender (ACKs).
    pub backward: Faults,
    pub seed: u64,
}

/// Counters for one direction.
#[derive(Debug, Default)]
pub struct LaneStats {
    seen: AtomicU64,
    dropped: AtomicU64,
    duplicated: AtomicU64,
    reordered: AtomicU64,
    corrupted: AtomicU64,
}

impl LaneStats {
    /// Datagrams that entered the relay, before any fault.
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn duplicated(&self) -> u64 {
        self.duplicated.load(Ordering::Relaxed)
    }

    pub fn reordered(&self) -> u64 {
        self.reordered.load(Ordering::Relaxed)
    }

    pub fn corrupted(&self) -> u64 {
        self.corrupted.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
pub struct SimulatorStats {
    pub forward: LaneStats,
    pub backward: LaneStats,
}

/// A running relay.  Dropping it stops the relay task.
pub struct Simulator {
    local_addr: SocketAddr,
    stats: Arc<SimulatorStats>,
    handle: JoinHandle<()>,
}

impl Simulator {
    /// Start relaying between a loopback port and `upstream`.
    pub async fn spawn(upstream: SocketAddr, config: SimulatorConfig) -> std::io::Result<Self> {
        let client_side = UdpSocket::bind("127.0.0.1:0").await?;
        let upstream_side = UdpSocket::bind("127.0.0.1:0").await?;
        let local_addr = client_side.local_addr()?;
        let stats = Arc::new(SimulatorStats::default());

        let handle = tokio::spawn(relay(
            client_side,
            upstream_side,
            upstream,
            config,
            Arc::clone(&stats),
        ));

        Ok(Self {
            local_addr,
            stats,
            handle,
        })
    }

    /// Address the sender should target.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Per-direction fault state.
struct Lane {
    faults: Faults,
    count: u64,
    held: Option<Vec<u8>>,
}

impl Lane {
    fn new(faults: Faults) -> Self {
        Self {
            faults,
            count: 0,
            held: None,
        }
    }

    fn holding(&self) -> bool {
        self.held.is_some()
    }

    /// Apply the fault model to one datagram; return what goes on the wire
    /// now, in order.
    fn process(&mut self, datagram: &[u8], rng: &mut StdRng, stats: &LaneStats) -> Vec<Vec<u8>> {
        LaneStats::bump(&stats.seen);
        self.count += 1;

        let periodic = self
            .faults
            .drop_every
            .is_some_and(|k| k > 0 && self.count % k == 0);
        if periodic || rng.random_bool(self.faults.loss_rate) {
            LaneStats::bump(&stats.dropped);
            return Vec::new();
        }

        let mut datagram = datagram.to_vec();
        if !datagram.is_empty() && rng.random_bool(self.faults.corrupt_rate) {
            let bit = rng.random_range(0..datagram.len() * 8);
            datagram[bit / 8] ^= 1 << (bit % 8);
            LaneStats::bump(&stats.corrupted);
        }

        let mut out = vec![datagram.clone()];
        if rng.random_bool(self.faults.duplicate_rate) {
            out.push(datagram);
            LaneStats::bump(&stats.duplicated);
        }

        if self.held.is_none() && rng.random_bool(self.faults.reorder_rate) {
            self.held = out.pop();
            LaneStats::bump(&stats.reordered);
        } else if let Some(held) = self.held.take() {
            out.push(held);
        }
        out
    }
}

async fn relay_to(socket: &UdpSocket, datagram: &[u8], dest: SocketAddr) {
    if let Err(e) = socket.send_to(datagram, dest).await {
        log::debug!("[sim] send to {dest} failed: {e}");
    }
}

async fn relay(
    client_side: UdpSocket,
    upstream_side: UdpSocket,
    upstream: SocketAddr,
    config: SimulatorConfig,
    stats: Arc<SimulatorStats>,
) {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut forward = Lane::new(config.forward);
    let mut backward = Lane::new(config.backward);
    let mut client: Option<SocketAddr> = None;
    let mut from_client = [0u8; RECV_BUFFER];
    let mut from_upstream = [0u8; RECV_BUFFER];

    loop {
        tokio::select! {
            result = client_side.recv_from(&mut from_client) => {
                let (n, addr) = match result {
                    Ok(received) => received,
                    Err(e) => {
                        log::debug!("[sim] client side: {e}");
                        continue;
                    }
                };
                client = Some(addr);
                for datagram in forward.process(&from_client[..n], &mut rng, &stats.forward) {
                    relay_to(&upstream_side, &datagram, upstream).await;
                }
            }

            result = upstream_side.recv_from(&mut from_upstream) => {
                let n = match result {
                    Ok((n, _)) => n,
                    Err(e) => {
                        log::debug!("[sim] upstream side: {e}");
                        continue;
                    }
                };
                let Some(dest) = client else { continue };
                for datagram in backward.process(&from_upstream[..n], &mut rng, &stats.backward) {
                    relay_to(&client_side, &datagram, dest).await;
                }
            }

            _ = tokio::time::sleep(HOLD_TIMEOUT), if forward.holding() || backward.holding() => {
                if let Some(datagram) = forward.held.take() {
                    relay_to(&upstream_side, &datagram, upstream).await;
                }
                if let (Some(datagram), Some(dest)) = (backward.held.take(), client) {
                    relay_to(&client_side, &datagram, dest).await;
                }
            }
        }
    }
}
