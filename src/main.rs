//! covert-channel: hide a byte stream in lines of text or in replayed
//! packet captures, and read it back.
//!
//! Logs go to stderr (`RUST_LOG=debug` for per-chunk detail), so stdout
//! stays free for the line carrier.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use covert_channel::carrier::{
    packet::parse_mac, pcap, LineReceiveAdapter, LineSendAdapter, Rewrite,
};
use covert_channel::config::{ChannelConfig, StrategyConfig, DEFAULT_SLICE_SIZE};
use covert_channel::embed::{ReceiveHandler, SendHandler};
use covert_channel::protocol::SliceUnit;
use covert_channel::transform::{build_all, Direction, Secrets, TransformSpec};
use covert_channel::{Receiver, Sender};
use std::io::{self, Read, Write};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "covert-channel")]
#[command(author, version)]
#[command(
    about = "Hide data inside text lines or packet captures",
    long_about = "Slices data into fixed-size chunks, frames them with sentinel chunks and embeds one chunk per carrier unit."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hide data in a carrier
    Send {
        #[command(flatten)]
        channel: ChannelArgs,

        #[command(flatten)]
        carrier: CarrierArgs,

        #[command(flatten)]
        keys: KeyArgs,

        #[command(flatten)]
        rewrite: RewriteArgs,

        /// Input file (default: stdin)
        #[arg(long, conflicts_with = "data")]
        input: Option<PathBuf>,

        /// String data to send
        #[arg(long, conflicts_with = "input")]
        data: Option<String>,
    },

    /// Read hidden data back out of a carrier
    Receive {
        #[command(flatten)]
        channel: ChannelArgs,

        #[command(flatten)]
        carrier: CarrierArgs,

        #[command(flatten)]
        keys: KeyArgs,

        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CarrierKind {
    /// One chunk per line on stdout / stdin
    Lines,
    /// Packets of a capture file
    Pcap,
}

#[derive(Args)]
struct ChannelArgs {
    /// JSON channel configuration; replaces the slicing and strategy flags
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chunk size, in --unit
    #[arg(long, default_value_t = DEFAULT_SLICE_SIZE)]
    slice_size: usize,

    /// Unit of --slice-size and --start-index: bits or bytes
    #[arg(long, default_value = "bytes")]
    unit: SliceUnit,

    /// Padding bits for the last chunk, e.g. 0b0101 (default: zeros)
    #[arg(long)]
    padding: Option<String>,

    /// Send the data as a single chunk without sentinel framing
    #[arg(long)]
    no_framing: bool,

    /// Embed at this offset of each payload, in --unit
    #[arg(long, default_value_t = 0)]
    start_index: usize,

    /// Embed by replacing the first match of this regex
    #[arg(long, requires = "capture_pattern", conflicts_with = "whole_payload")]
    pattern: Option<String>,

    /// Extract capture group 1 of this regex
    #[arg(long, requires = "pattern")]
    capture_pattern: Option<String>,

    /// Replace the whole payload with each chunk
    #[arg(long)]
    whole_payload: bool,

    /// Payload transform, repeatable: base64, xor:<key>, aes-ctr, aes-gcm.
    /// Both ends apply their list front to back.
    #[arg(long = "transform", value_name = "NAME")]
    transforms: Vec<TransformSpec>,
}

impl ChannelArgs {
    fn channel_config(&self) -> Result<ChannelConfig> {
        if let Some(path) = &self.config {
            return ChannelConfig::load(path)
                .with_context(|| format!("loading {}", path.display()));
        }

        let strategy = match (&self.pattern, &self.capture_pattern, self.whole_payload) {
            (Some(pattern), Some(capture), _) => StrategyConfig::Pattern {
                pattern: pattern.clone(),
                capture: capture.clone(),
            },
            (_, _, true) => StrategyConfig::WholePayload,
            _ => StrategyConfig::FixedPosition {
                start_index: self.start_index,
            },
        };
        let config = ChannelConfig {
            slice_size: self.slice_size,
            unit: self.unit,
            padding: self.padding.clone(),
            framing: !self.no_framing,
            strategy,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args)]
struct CarrierArgs {
    /// Carrier to use
    #[arg(long, value_enum, default_value_t = CarrierKind::Lines)]
    carrier: CarrierKind,

    /// Cover capture whose packets are replayed (pcap send)
    #[arg(long)]
    cover: Option<PathBuf>,

    /// Capture written by send and read by receive (pcap)
    #[arg(long)]
    capture: Option<PathBuf>,
}

#[derive(Args)]
struct KeyArgs {
    /// AES key for aes-ctr, hex (16, 24 or 32 bytes)
    #[arg(long)]
    aes_key: Option<String>,

    /// Leading part of the AES-CTR counter block, hex
    #[arg(long, default_value = "")]
    aes_nonce: String,

    /// Trailing part of the AES-CTR counter block, hex
    #[arg(long, default_value = "")]
    aes_iv: String,
}

impl KeyArgs {
    fn secrets(&self, specs: &[TransformSpec]) -> Result<Secrets> {
        let aes_key = self
            .aes_key
            .as_deref()
            .map(hex::decode)
            .transpose()
            .context("--aes-key is not hex")?;
        let password = if specs.iter().any(TransformSpec::needs_password) {
            Some(prompt_password("Password: ")?)
        } else {
            None
        };
        Ok(Secrets {
            aes_key,
            aes_nonce: hex::decode(&self.aes_nonce).context("--aes-nonce is not hex")?,
            aes_iv: hex::decode(&self.aes_iv).context("--aes-iv is not hex")?,
            password,
        })
    }
}

#[derive(Args)]
struct RewriteArgs {
    /// Source MAC for replayed packets
    #[arg(long)]
    src_mac: Option<String>,

    /// Destination MAC for replayed packets
    #[arg(long)]
    dst_mac: Option<String>,

    /// Source IPv4 address for replayed packets
    #[arg(long)]
    src_ip: Option<Ipv4Addr>,

    /// Destination IPv4 address for replayed packets
    #[arg(long)]
    dst_ip: Option<Ipv4Addr>,

    /// Source port for replayed packets
    #[arg(long)]
    src_port: Option<u16>,

    /// Destination port for replayed packets
    #[arg(long)]
    dst_port: Option<u16>,
}

impl RewriteArgs {
    fn rewrite(&self) -> Result<Rewrite> {
        Ok(Rewrite {
            src_mac: self.src_mac.as_deref().map(parse_mac).transpose()?,
            dst_mac: self.dst_mac.as_deref().map(parse_mac).transpose()?,
            src_ip: self.src_ip,
            dst_ip: self.dst_ip,
            src_port: self.src_port,
            dst_port: self.dst_port,
        })
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Send {
            channel,
            carrier,
            keys,
            rewrite,
            input,
            data,
        } => cmd_send(&channel, &carrier, &keys, &rewrite, input, data),

        Commands::Receive {
            channel,
            carrier,
            keys,
            output,
        } => cmd_receive(&channel, &carrier, &keys, output),
    }
}

fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("reading password from the terminal")
}

fn cmd_send(
    channel: &ChannelArgs,
    carrier: &CarrierArgs,
    keys: &KeyArgs,
    rewrite: &RewriteArgs,
    input: Option<PathBuf>,
    data: Option<String>,
) -> Result<()> {
    let config = channel.channel_config()?;
    let transforms = build_all(
        &channel.transforms,
        Direction::Send,
        &keys.secrets(&channel.transforms)?,
    )?;

    let content = match (input, data) {
        (Some(path), None) => {
            std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?
        }
        (None, Some(s)) => s.into_bytes(),
        _ => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    match carrier.carrier {
        CarrierKind::Lines => {
            let adapter =
                LineSendAdapter::new(io::stdout().lock(), config.build_send_protocol()?);
            Sender::new(transforms, adapter).send(&content)?;
        }
        CarrierKind::Pcap => {
            let (Some(cover), Some(capture)) = (&carrier.cover, &carrier.capture) else {
                bail!("--carrier pcap needs --cover and --capture when sending");
            };
            let adapter = pcap::send_adapter(
                cover,
                capture,
                rewrite.rewrite()?,
                SendHandler::new(config.build_strategy()?),
                config.build_send_protocol()?,
            )?;
            let mut sender = Sender::new(transforms, adapter);
            sender.send(&content)?;

            let sink = sender.into_adapter().into_sink();
            let records = sink.records();
            sink.finish()?;
            info!(records, capture = %capture.display(), "wrote capture");
        }
    }
    Ok(())
}

fn cmd_receive(
    channel: &ChannelArgs,
    carrier: &CarrierArgs,
    keys: &KeyArgs,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = channel.channel_config()?;
    let transforms = build_all(
        &channel.transforms,
        Direction::Receive,
        &keys.secrets(&channel.transforms)?,
    )?;

    let received = match carrier.carrier {
        CarrierKind::Lines => {
            let adapter =
                LineReceiveAdapter::new(io::stdin().lock(), config.build_receive_protocol()?);
            Receiver::new(transforms, adapter).receive()?
        }
        CarrierKind::Pcap => {
            let Some(capture) = &carrier.capture else {
                bail!("--carrier pcap needs --capture when receiving");
            };
            let adapter = pcap::receive_adapter(
                capture,
                ReceiveHandler::new(config.build_strategy()?),
                config.build_receive_protocol()?,
            )?;
            Receiver::new(transforms, adapter).receive()?
        }
    };

    match output {
        Some(path) => {
            std::fs::write(&path, &received)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&received)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
