//! End-to-end transfers over a clean loopback link.
//!
//! Each test binds a receiver on an OS-assigned loopback port and drives a
//! sender at it.  Both engines run as separate tokio tasks so they can make
//! progress concurrently.

use std::net::SocketAddr;
use std::time::Duration;

use rtp::simulator::{Simulator, SimulatorConfig};
use rtp::{
    Packet, PacketType, Receiver, ReceiverConfig, Sender, SenderConfig, Socket, TimerConfig,
    TransferError, TransferReport, Variant,
};

const DEADLINE: Duration = Duration::from_secs(20);

fn fast_timers() -> TimerConfig {
    TimerConfig {
        rto: Duration::from_millis(100),
        poll_interval: Duration::from_millis(10),
        max_retransmits: None,
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

async fn ephemeral() -> Socket {
    let addr = "127.0.0.1:0".parse().unwrap();
    Socket::bind(addr).await.expect("bind failed")
}

async fn spawn_receiver(
    window_size: u32,
    variant: Variant,
) -> (SocketAddr, tokio::task::JoinHandle<Vec<u8>>) {
    let receiver = Receiver::new(ephemeral().await, ReceiverConfig::new(window_size, variant));
    let addr = receiver.local_addr();
    let handle = tokio::spawn(async move { receiver.run().await.expect("receiver failed") });
    (addr, handle)
}

/// Send `data` to `peer` and return the sender's report.
async fn send(
    peer: SocketAddr,
    data: &[u8],
    window_size: u32,
    variant: Variant,
    timers: TimerConfig,
) -> Result<TransferReport, TransferError> {
    let mut config = SenderConfig::new(window_size, variant);
    config.timers = timers;
    Sender::new(ephemeral().await, peer, data, config).run().await
}

/// Full round trip: returns what the receiver wrote out.
async fn round_trip(data: &[u8], window_size: u32, variant: Variant) -> Vec<u8> {
    let (addr, receiver) = spawn_receiver(window_size, variant).await;
    let transfer = async {
        send(addr, data, window_size, variant, fast_timers())
            .await
            .expect("sender failed");
        receiver.await.expect("receiver task panicked")
    };
    tokio::time::timeout(DEADLINE, transfer)
        .await
        .expect("transfer timed out")
}

// ---------------------------------------------------------------------------
// Lossless round trips
// ---------------------------------------------------------------------------

#[tokio::test]
async fn round_trip_sizes_and_windows_base() {
    for &len in &[1, 100, 1456, 1457, 5000, 20_000] {
        for &w in &[1, 2, 5, 16] {
            let data = pattern(len);
            let out = round_trip(&data, w, Variant::Cumulative).await;
            assert_eq!(out, data, "len={len} window={w}");
        }
    }
}

#[tokio::test]
async fn round_trip_sizes_and_windows_opt() {
    for &len in &[1, 100, 1456, 1457, 5000, 20_000] {
        for &w in &[1, 2, 5, 16] {
            let data = pattern(len);
            let out = round_trip(&data, w, Variant::Selective).await;
            assert_eq!(out, data, "len={len} window={w}");
        }
    }
}

#[tokio::test]
async fn large_transfer_both_variants() {
    let data = pattern(200_000);
    for variant in [Variant::Cumulative, Variant::Selective] {
        assert_eq!(round_trip(&data, 32, variant).await, data, "{variant}");
    }
}

#[tokio::test]
async fn three_thousand_bytes_window_two() {
    let data = pattern(3000);
    for variant in [Variant::Cumulative, Variant::Selective] {
        let (addr, receiver) = spawn_receiver(2, variant).await;
        let report = tokio::time::timeout(DEADLINE, send(addr, &data, 2, variant, fast_timers()))
            .await
            .expect("transfer timed out")
            .expect("sender failed");

        // START, three DATA, END.
        assert_eq!(report.packets, 5);
        assert_eq!(report.bytes, 3000);
        assert_eq!(receiver.await.unwrap(), data);
    }
}

// ---------------------------------------------------------------------------
// Empty stream: exactly four datagrams cross the network
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_input_is_two_packets_and_two_acks() {
    for variant in [Variant::Cumulative, Variant::Selective] {
        let (addr, receiver) = spawn_receiver(4, variant).await;
        let sim = Simulator::spawn(addr, SimulatorConfig::default())
            .await
            .expect("simulator");

        let timers = TimerConfig::for_variant(variant);
        let report = tokio::time::timeout(DEADLINE, send(sim.local_addr(), b"", 4, variant, timers))
            .await
            .expect("transfer timed out")
            .expect("sender failed");

        assert!(receiver.await.unwrap().is_empty());
        assert_eq!(report.packets, 2);
        assert_eq!(report.retransmissions, 0);
        assert_eq!(sim.stats().forward.seen(), 2, "{variant}: START and END");
        assert_eq!(sim.stats().backward.seen(), 2, "{variant}: two ACKs");
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_link_needs_no_retransmission() {
    let data = pattern(10_000);
    let (addr, receiver) = spawn_receiver(8, Variant::Cumulative).await;
    let timers = TimerConfig::for_variant(Variant::Cumulative);
    let report = send(addr, &data, 8, Variant::Cumulative, timers)
        .await
        .expect("sender failed");
    receiver.await.unwrap();

    assert_eq!(report.packets, 9);
    assert_eq!(report.transmissions, 9);
    assert_eq!(report.retransmissions, 0);
    assert!(report.acks_received >= 1);
}

// ---------------------------------------------------------------------------
// Give-up cap
// ---------------------------------------------------------------------------

#[tokio::test]
async fn silent_peer_exhausts_retransmissions() {
    let silent = ephemeral().await;
    let timers = TimerConfig {
        rto: Duration::from_millis(20),
        poll_interval: Duration::from_millis(5),
        max_retransmits: Some(3),
    };

    let result = tokio::time::timeout(
        DEADLINE,
        send(silent.local_addr, b"hello", 4, Variant::Cumulative, timers),
    )
    .await
    .expect("sender did not give up");

    match result {
        Err(TransferError::PeerUnresponsive { seq, retransmits }) => {
            assert_eq!(seq, 0);
            assert_eq!(retransmits, 3);
        }
        other => panic!("expected PeerUnresponsive, got {other:?}"),
    }
}

#[tokio::test]
async fn selective_silent_peer_exhausts_retransmissions() {
    let silent = ephemeral().await;
    let timers = TimerConfig {
        rto: Duration::from_millis(20),
        poll_interval: Duration::from_millis(5),
        max_retransmits: Some(2),
    };

    let result = tokio::time::timeout(
        DEADLINE,
        send(silent.local_addr, b"hello", 4, Variant::Selective, timers),
    )
    .await
    .expect("sender did not give up");

    assert!(matches!(
        result,
        Err(TransferError::PeerUnresponsive { seq: 0, retransmits: 2 })
    ));
}

// ---------------------------------------------------------------------------
// Selective: START's ACK(1) duplicated
// ---------------------------------------------------------------------------

/// A selective receiver stand-in that answers every START with two ACK(1)s
/// and drops the first `lose_data_one` copies of DATA 1.  Everything else is
/// acknowledged with its own sequence number.
async fn doubled_start_ack_peer(socket: Socket, lose_data_one: u32) {
    let mut lost = 0;
    loop {
        let Ok((packet, from)) = socket.recv_from().await else {
            continue;
        };
        let seq = packet.header.seq_num;
        match packet.header.packet_type {
            PacketType::Start => {
                for _ in 0..2 {
                    socket.send_to(&Packet::ack(1), from).await.unwrap();
                }
            }
            PacketType::Data if seq == 1 && lost < lose_data_one => lost += 1,
            _ => socket.send_to(&Packet::ack(seq), from).await.unwrap(),
        }
    }
}

#[tokio::test]
async fn duplicated_start_ack_never_covers_lost_data_one() {
    let peer_socket = ephemeral().await;
    let peer_addr = peer_socket.local_addr;
    let peer = tokio::spawn(doubled_start_ack_peer(peer_socket, u32::MAX));

    let timers = TimerConfig {
        rto: Duration::from_millis(20),
        poll_interval: Duration::from_millis(5),
        max_retransmits: Some(3),
    };
    let data = pattern(3000);
    let result = tokio::time::timeout(DEADLINE, send(peer_addr, &data, 4, Variant::Selective, timers))
        .await
        .expect("sender hung");
    peer.abort();

    // DATA 1 never arrives, so the transfer must not report success.
    assert!(
        matches!(
            result,
            Err(TransferError::PeerUnresponsive { seq: 1, retransmits: 3 })
        ),
        "got {result:?}"
    );
}

#[tokio::test]
async fn duplicated_start_ack_then_data_one_retransmitted() {
    let peer_socket = ephemeral().await;
    let peer_addr = peer_socket.local_addr;
    let peer = tokio::spawn(doubled_start_ack_peer(peer_socket, 1));

    let data = pattern(3000);
    let report = tokio::time::timeout(
        DEADLINE,
        send(peer_addr, &data, 4, Variant::Selective, fast_timers()),
    )
    .await
    .expect("transfer timed out")
    .expect("sender failed");
    peer.abort();

    assert_eq!(report.packets, 5);
    assert!(report.retransmissions >= 1);
}

// ---------------------------------------------------------------------------
// ACK source address
// ---------------------------------------------------------------------------

/// The whole 127/8 block is local on Linux, so a second loopback address
/// stands in for another interface of a multihomed receiver.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn ack_from_other_local_address_same_port_is_accepted() {
    let listen = ephemeral().await;
    let target = listen.local_addr;
    let reply_addr = SocketAddr::from(([127, 0, 0, 2], target.port()));
    let reply = Socket::bind(reply_addr).await.expect("bind 127.0.0.2");

    // Cumulative answers for an empty stream: START → ACK(1), END(1) → ACK(2).
    let peer = tokio::spawn(async move {
        loop {
            let Ok((packet, from)) = listen.recv_from().await else {
                continue;
            };
            let ack = match packet.header.packet_type {
                PacketType::Start => 1,
                PacketType::End => 2,
                _ => continue,
            };
            reply.send_to(&Packet::ack(ack), from).await.unwrap();
        }
    });

    let report = tokio::time::timeout(
        DEADLINE,
        send(target, b"", 4, Variant::Cumulative, fast_timers()),
    )
    .await
    .expect("ACKs from the other address were dropped")
    .expect("sender failed");
    peer.abort();

    assert_eq!(report.packets, 2);
    assert_eq!(report.acks_received, 2);
}
