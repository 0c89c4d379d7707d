use clap::{Args, Parser, Subcommand};
use ringcap::capture::{Delay, FileOpener, FrameFilter, PortProtoFilter, StreamAddr};
use ringcap::config;
use ringcap::protocol::arp::ArpHeader;
use ringcap::protocol::ipv4::{Ipv4Header, Protocol};
use ringcap::protocol::tcp::TcpHeader;
use ringcap::protocol::udp::UdpHeader;
use ringcap::protocol::{Classified, Network, Transport, hexdump};
use ringcap::telemetry::init_logging;
use ringcap::{ConsumerEngine, EngineOptions, RawFrame};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const POLL_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "ringcap")]
#[command(about = "Buffers captured frames in a bounded ring and drains them in order")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine with the streams listed in a config file
    Run {
        /// Path to ringcap.toml
        #[arg(short, long, default_value = "ringcap.toml")]
        config: PathBuf,

        /// Stop after this many frames
        #[arg(short = 'n', long)]
        count: Option<u64>,

        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Replay pcap or pcapng files through the engine
    Replay {
        /// Capture files, one stream each (at most 4)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Ring slots
        #[arg(short, long, default_value_t = 1000)]
        capacity: usize,

        /// Delivery delay in seconds
        #[arg(short, long, default_value_t = 0.0)]
        delay: f64,

        /// Stop after this many frames
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// Interface name recorded in each frame header
        #[arg(short, long)]
        interface: Option<String>,

        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Validate a config file
    Validate {
        /// Path to ringcap.toml
        #[arg(short, long, default_value = "ringcap.toml")]
        config: PathBuf,
    },
}

/// Frame selection applied by each stream before ingest
#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Keep only TCP frames
    #[arg(long, conflicts_with = "udp")]
    tcp: bool,

    /// Keep only UDP frames
    #[arg(long)]
    udp: bool,

    /// Keep only frames with this TCP/UDP source or destination port
    #[arg(long)]
    port: Option<u16>,

    /// Keep only frames captured on this interface
    #[arg(long = "if", value_name = "NAME")]
    iface: Option<String>,
}

impl FilterArgs {
    fn build(&self) -> Option<Box<dyn FrameFilter>> {
        let mut filter = PortProtoFilter::new();
        if self.tcp {
            filter = filter.protocol(Protocol::Tcp);
        }
        if self.udp {
            filter = filter.protocol(Protocol::Udp);
        }
        if let Some(port) = self.port {
            filter = filter.port(port);
        }
        if let Some(name) = &self.iface {
            filter = filter.interface(name.as_str());
        }
        (!filter.is_empty()).then(|| Box::new(filter) as Box<dyn FrameFilter>)
    }
}

#[derive(Args, Debug, Default, Clone, Copy)]
struct OutputArgs {
    /// Hex dump frame contents: the application payload, or the whole frame
    /// when it cannot be classified
    #[arg(long)]
    content: bool,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            count,
            filter,
            output,
        } => cmd_run(&config, count, &filter, output),
        Commands::Replay {
            files,
            capacity,
            delay,
            count,
            interface,
            filter,
            output,
        } => {
            init_logging(None);
            let replay = ReplayArgs {
                capacity,
                delay,
                count,
                interface: interface.as_deref(),
            };
            cmd_replay(&files, &replay, &filter, output)
        }
        Commands::Validate { config } => {
            init_logging(None);
            cmd_validate(&config)
        }
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

struct ReplayArgs<'a> {
    capacity: usize,
    delay: f64,
    count: Option<u64>,
    interface: Option<&'a str>,
}

fn cmd_run(
    config_path: &Path,
    count: Option<u64>,
    filter: &FilterArgs,
    output: OutputArgs,
) -> Result<(), String> {
    let cfg = config::load(config_path).map_err(|e| format!("Failed to load config: {}", e))?;
    init_logging(Some(&cfg.logging));
    info!("Loading {}...", config_path.display());

    let validation = config::validate(&cfg);
    validation.log_diagnostics();
    if validation.has_errors() {
        return Err("Validation failed".to_string());
    }

    let options = cfg.engine.to_options().map_err(|e| e.to_string())?;
    let engine = ConsumerEngine::with_options(options).map_err(|e| e.to_string())?;

    for stream in &cfg.streams {
        let addr = stream.addr().map_err(|e| e.to_string())?;
        engine
            .attach_stream(
                &FileOpener,
                &addr,
                stream.interface.as_deref(),
                stream.port,
                filter.build(),
            )
            .map_err(|e| format!("Failed to attach {}: {}", addr, e))?;
    }

    drain(&engine, count, output);
    engine.shutdown();
    Ok(())
}

fn cmd_replay(
    files: &[PathBuf],
    replay: &ReplayArgs<'_>,
    filter: &FilterArgs,
    output: OutputArgs,
) -> Result<(), String> {
    let delay = Delay::from_secs_f64(replay.delay).map_err(|e| e.to_string())?;
    let engine = ConsumerEngine::with_options(EngineOptions {
        delay,
        ..EngineOptions::new(replay.capacity)
    })
    .map_err(|e| e.to_string())?;

    for path in files {
        let addr = StreamAddr::File(path.clone());
        engine
            .attach_stream(&FileOpener, &addr, replay.interface, None, filter.build())
            .map_err(|e| format!("Failed to attach {}: {}", path.display(), e))?;
    }

    drain(&engine, replay.count, output);
    engine.shutdown();
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<(), String> {
    info!("Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.log_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        info!("Configuration is valid");
        Ok(())
    }
}

/// Poll until every stream has ended and the ring is drained, or `limit`
/// frames were printed.
fn drain(engine: &ConsumerEngine, limit: Option<u64>, output: OutputArgs) {
    let mut delivered = 0u64;
    while limit.is_none_or(|n| delivered < n) {
        match engine.poll(POLL_TIMEOUT) {
            Some(frame) => {
                log_frame(&frame, output);
                delivered += 1;
            }
            None if engine.pending_count() > 0 => {
                // Front frame is still held back by the delay.
                if let Some(wait) = engine.time_until_due() {
                    thread::sleep(wait.min(POLL_TIMEOUT));
                }
            }
            None => {
                if engine.active_streams() == 0 {
                    break;
                }
            }
        }
    }

    let stats = engine.stats();
    info!(
        "Drained {} frames ({} ingested, {} evicted)",
        delivered,
        stats.ingested.get(),
        stats.evicted.get()
    );
    for (name, value) in stats.export() {
        debug!("{} = {}", name, value);
    }
    if stats.evicted.get() > 0 {
        warn!("Ring overflowed; increase capacity to keep every frame");
    }
}

fn log_frame(frame: &RawFrame, output: OutputArgs) {
    let header = &frame.header;
    let when = header
        .timestamp
        .to_datetime()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        .unwrap_or_else(|| header.timestamp.to_string());
    let classified = frame.classify();
    let summary = match &classified {
        Ok(classified) => describe(classified, frame.payload()),
        Err(e) => e.to_string(),
    };
    info!(
        "{} #{} stream={} iface={} len={}/{} {}",
        when,
        frame.sequence_id,
        frame.stream_id,
        header.interface(),
        header.captured_len,
        header.link_len,
        summary
    );

    let dumped = match &classified {
        Ok(c) => c
            .payload_offset()
            .and_then(|offset| frame.payload().get(offset..))
            .filter(|_| output.content),
        Err(_) => Some(frame.payload()),
    };
    if let Some(bytes) = dumped.filter(|b| !b.is_empty()) {
        if output.content {
            info!("\n{}", hexdump(bytes));
        } else {
            debug!("\n{}", hexdump(bytes));
        }
    }
}

/// Protocol stack plus endpoints, e.g. `IPv4/TCP 10.0.0.1:443 -> 10.0.0.2:40000 [A]`.
fn describe(classified: &Classified, data: &[u8]) -> String {
    match classified.network {
        Network::Arp { offset } => match ArpHeader::parse(data, offset) {
            Ok(arp) => format!("{} {} -> {}", classified, arp.sender_ip(), arp.target_ip()),
            Err(_) => classified.to_string(),
        },
        Network::Ipv4 {
            offset, transport, ..
        } => {
            let Ok(ip) = Ipv4Header::parse(data, offset) else {
                return classified.to_string();
            };
            let (src, dst) = (ip.src_addr(), ip.dst_addr());
            match transport {
                Transport::Tcp { offset, .. } => match TcpHeader::parse(data, offset) {
                    Ok(tcp) => format!(
                        "{} {}:{} -> {}:{} [{}]",
                        classified,
                        src,
                        tcp.src_port(),
                        dst,
                        tcp.dst_port(),
                        tcp.flags()
                    ),
                    Err(_) => format!("{} {} -> {}", classified, src, dst),
                },
                Transport::Udp { offset } => match UdpHeader::parse(data, offset) {
                    Ok(udp) => format!(
                        "{} {}:{} -> {}:{}",
                        classified,
                        src,
                        udp.src_port(),
                        dst,
                        udp.dst_port()
                    ),
                    Err(_) => format!("{} {} -> {}", classified, src, dst),
                },
                Transport::Icmp { .. } => format!("{} {} -> {}", classified, src, dst),
            }
        }
    }
}
