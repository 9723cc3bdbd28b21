//! Entry point for `rtp`.
//!
//! Parses CLI arguments and dispatches into either **sender** or **receiver**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, argument parsing, stdin/stdout).

use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use rtp::{send_stream, Receiver, ReceiverConfig, SenderConfig, Variant};

/// Reliable byte stream over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Read stdin and deliver it to a receiver.
    Sender {
        /// Receiver IP address.
        receiver_ip: IpAddr,
        /// Receiver UDP port.
        receiver_port: u16,
        /// Maximum packets in flight; must match the receiver.
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        window_size: u32,
        /// ARQ variant: `base` (Go-Back-N) or `opt` (selective repeat).
        #[arg(long, default_value = "base")]
        variant: Variant,
        /// Give up after retransmitting one packet this many times.
        #[arg(long)]
        max_retransmits: Option<u32>,
    },
    /// Receive one stream and write it to stdout.
    Receiver {
        /// Local IP address to bind.
        receiver_ip: IpAddr,
        /// Local UDP port to bind.
        receiver_port: u16,
        /// Maximum packets buffered; must match the sender.
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        window_size: u32,
        /// ARQ variant: `base` (Go-Back-N) or `opt` (selective repeat).
        #[arg(long, default_value = "base")]
        variant: Variant,
        /// Keep acknowledging retransmitted ENDs this long after completion.
        #[arg(long, default_value_t = 0)]
        linger_ms: u64,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Sender {
            receiver_ip,
            receiver_port,
            window_size,
            variant,
            max_retransmits,
        } => {
            let mut data = Vec::new();
            std::io::stdin()
                .read_to_end(&mut data)
                .context("failed to read stdin")?;

            let peer = SocketAddr::new(receiver_ip, receiver_port);
            let mut config = SenderConfig::new(window_size, variant);
            config.timers.max_retransmits = max_retransmits;

            let report = send_stream(peer, &data, config)
                .await
                .with_context(|| format!("transfer to {peer} failed"))?;
            log::info!("{report:?}");
        }
        Mode::Receiver {
            receiver_ip,
            receiver_port,
            window_size,
            variant,
            linger_ms,
        } => {
            let local = SocketAddr::new(receiver_ip, receiver_port);
            let mut config = ReceiverConfig::new(window_size, variant);
            config.linger = Duration::from_millis(linger_ms);

            let receiver = Receiver::bind(local, config)
                .await
                .with_context(|| format!("failed to bind {local}"))?;
            let output = receiver.run().await.context("receive failed")?;

            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&output).context("failed to write stdout")?;
            stdout.flush().context("failed to flush stdout")?;
        }
    }
    Ok(())
}
