use std::{
    fs,
    path::PathBuf,
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam::channel::bounded;
use sensorvault::{PACKET_SIZE, SensorIngest, SensorPacket};
use sensorvault_core::{load_config, logs::init_logging};
use sensorvault_storage::{
    AppendOnlyLog, BlockTableConfig, BlockTableLog, OpenMode, StorageError, TailingReader, format::DEFAULT_MAX_BLOCK_COUNT,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "sensorvault")]
#[command(about = "Inspect and feed sensorvault storage files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append synthetic sensor packets to a packet log
    Write {
        #[arg(long)]
        log: PathBuf,
        /// Log capacity in bytes
        #[arg(long, default_value_t = 1 << 20)]
        size: u64,
        #[arg(long, default_value_t = 100)]
        count: u64,
    },
    /// Print the packets of a packet log
    Tail {
        #[arg(long)]
        log: PathBuf,
        /// Keep polling for new packets
        #[arg(long)]
        follow: bool,
    },
    /// List the blocks of a block table file
    Blocks {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        size: u64,
        #[arg(long, default_value_t = DEFAULT_MAX_BLOCK_COUNT)]
        max_blocks: u64,
    },
    /// Feed a file of raw packets through the ingest pipeline
    Ingest {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        packets: PathBuf,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Write { log, size, count } => write_packets(log, size, count),
        Commands::Tail { log, follow } => tail_packets(log, follow),
        Commands::Blocks { file, size, max_blocks } => list_blocks(file, size, max_blocks),
        Commands::Ingest { config, packets } => ingest_packets(config, packets),
    }
}

fn write_packets(path: PathBuf, size: u64, count: u64) -> Result<()> {
    let mut log = AppendOnlyLog::open(&path, size).with_context(|| format!("open {}", path.display()))?;
    for i in 0..count {
        let ticks = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as u64;
        let mac = [0xDE, 0xAD, 0xBE, 0xEF, 0x00, (i % 4) as u8 + 1];
        let packet = SensorPacket::new(ticks, mac, 1, (i % u64::from(u16::MAX)) as u16);
        log.append(&packet.encode())?;
    }
    log.flush()?;
    println!(
        "wrote {count} packets to {}, cursor {} of {}",
        path.display(),
        log.write_cursor(),
        log.capacity()
    );
    Ok(())
}

fn tail_packets(path: PathBuf, follow: bool) -> Result<()> {
    let mut reader = TailingReader::open(&path).with_context(|| format!("open {}", path.display()))?;
    let mut buf = [0u8; PACKET_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(()) => match SensorPacket::decode(&buf) {
                Ok(packet) => println!("{:>10} {packet}", reader.position() - PACKET_SIZE as u64),
                Err(e) => println!("{:>10} undecodable: {e}", reader.position() - PACKET_SIZE as u64),
            },
            Err(StorageError::NotEnoughData { .. }) if follow => thread::sleep(Duration::from_millis(100)),
            Err(StorageError::NotEnoughData { .. }) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

fn list_blocks(path: PathBuf, size: u64, max_blocks: u64) -> Result<()> {
    let config = BlockTableConfig::default().with_max_block_count(max_blocks);
    let table = BlockTableLog::open_with(&path, size, config, OpenMode::ReadOnly)
        .with_context(|| format!("open {}", path.display()))?;
    println!(
        "{} blocks, append cursor {} of {}",
        table.block_count(),
        table.append_cursor(),
        table.capacity()
    );
    for (id, info) in table.blocks() {
        println!("{:<32} offset={:<12} size={}", id.to_string(), info.offset, info.size);
    }
    Ok(())
}

fn ingest_packets(config: PathBuf, packets: PathBuf) -> Result<()> {
    let cfg = load_config(&config)?;
    let raw = fs::read(&packets).with_context(|| format!("read {}", packets.display()))?;
    let ingest = SensorIngest::open(&cfg)?;

    let (tx, rx) = bounded::<Vec<u8>>(1024);
    let feeder = thread::Builder::new()
        .name("packet-feeder".into())
        .spawn(move || {
            for chunk in raw.chunks(PACKET_SIZE) {
                if tx.send(chunk.to_vec()).is_err() {
                    break;
                }
            }
        })?;
    let stats = ingest.run(rx)?;
    if feeder.join().is_err() {
        anyhow::bail!("packet feeder panicked");
    }
    info!(?stats, "ingest complete");
    println!(
        "stored {} unknown {} malformed {} block failures {} dropped {}",
        stats.stored, stats.unknown, stats.malformed, stats.block_failures, stats.dropped
    );
    Ok(())
}
