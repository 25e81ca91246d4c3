use clap::{Parser, Subcommand};
use arstream::archive::{list, pack_dir, scan, unpack};
use arstream::decoder::{DecoderOptions, DEFAULT_ENTRY_BUFFER, DEFAULT_READ_CHUNK};
use arstream::EncoderOptions;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arstream", about = "Stream Unix ar archives")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack the regular files of a folder into an archive
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// Mode written into every header, as decimal text
        #[arg(short, long, default_value = "644")]
        mode: u32,
        #[arg(long, default_value = "0")]
        owner: u32,
        #[arg(long, default_value = "0")]
        group: u32,
        dir: PathBuf,
    },
    /// Extract every entry into a folder
    Unpack {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        /// Bytes buffered per entry before decoding pauses
        #[arg(long, default_value_t = DEFAULT_ENTRY_BUFFER)]
        entry_buffer: usize,
    },
    /// List archive contents
    List {
        input: PathBuf,
        /// Print one JSON object per entry
        #[arg(long)]
        json: bool,
    },
    /// Decode the whole archive and report skipped or truncated data
    Scan {
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, mode, owner, group, dir } => {
            let opts = EncoderOptions { owner_id: owner, group_id: group, mode };
            let mut ar = pack_dir(&dir, File::create(&output)?, opts)?;
            ar.close()?;
            println!("Created: {} ({} files)", output.display(), ar.files());
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir, entry_buffer } => {
            let opts = DecoderOptions { entry_buffer, read_chunk: DEFAULT_READ_CHUNK };
            let summary = unpack(BufReader::new(File::open(&input)?), &output_dir, &opts)?;
            println!("Unpacked {} entries to: {}", summary.entries, output_dir.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let headers = list(BufReader::new(File::open(&input)?), &DecoderOptions::default())?;
            if json {
                for h in &headers {
                    println!("{}", serde_json::to_string(h)?);
                }
            } else {
                println!("Archive: {}", input.display());
                println!("{:<16} {:>12} {:>7} {:>11}  Modified", "Name", "Size", "Mode", "Owner/Group");
                for h in &headers {
                    let modified = h.modified()
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".into());
                    println!("{:<16} {:>12} {:>7} {:>11}  {}",
                        h.name, h.size, h.mode, format!("{}/{}", h.owner_id, h.group_id), modified);
                }
            }
        }

        // ── Scan ─────────────────────────────────────────────────────────────
        Commands::Scan { input } => {
            let summary = scan(BufReader::new(File::open(&input)?), &DecoderOptions::default())?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
