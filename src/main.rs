use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use proxy_rank::endpoint::{
    BatchRanker, DescriptorCodec, Endpoint, Protocol, Publisher, RankerConfig,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A proxy endpoint latency tester and ranker
#[derive(Parser)]
#[command(name = "proxy-rank")]
#[command(about = "A proxy endpoint latency tester and ranker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe descriptors and publish the fastest per protocol
    Rank {
        /// Directory containing one descriptor file per protocol
        #[arg(short, long, default_value = "Splitted-By-Protocol")]
        input_dir: PathBuf,
        /// Output file for the ranked artifact
        #[arg(short, long, default_value = "tested/config_test.txt")]
        output: PathBuf,
        /// Max descriptors probed per protocol
        #[arg(long, default_value = "100")]
        sample_cap: usize,
        /// Max ranked results kept per protocol
        #[arg(long, default_value = "20")]
        success_cap: usize,
        /// Number of concurrent probes
        #[arg(short = 'n', long, default_value = "20")]
        concurrency: usize,
        /// Per-probe timeout in seconds
        #[arg(long, default_value = "1")]
        timeout: u64,
        /// Seed for sampling and display-name rewrites
        #[arg(long)]
        seed: Option<u64>,
        /// Display label for the artifact (defaults to the current time)
        #[arg(long)]
        label: Option<String>,
        /// Protocols to process, in output order (default: all)
        #[arg(short, long)]
        protocol: Vec<String>,
    },
    /// Parse descriptors from a file and print their targets
    Parse {
        /// Input file containing descriptors, one per line
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Rank {
            input_dir,
            output,
            sample_cap,
            success_cap,
            concurrency,
            timeout,
            seed,
            label,
            protocol,
        } => {
            let protocols = if protocol.is_empty() {
                Protocol::DEFAULT_ORDER.to_vec()
            } else {
                protocol
                    .iter()
                    .map(|s| parse_protocol(s))
                    .collect::<Result<Vec<_>>>()?
            };

            let mut config = RankerConfig::new()
                .with_sample_cap(sample_cap)
                .with_success_cap(success_cap)
                .with_concurrency(concurrency)
                .with_timeout(Duration::from_secs(timeout));
            if let Some(seed) = seed {
                config = config.with_seed(seed);
            }
            let ranker = BatchRanker::with_config(config);

            let label =
                label.unwrap_or_else(|| Local::now().format("%b-%d | %H:%M").to_string());

            let mut batches = Vec::new();
            for proto in &protocols {
                let path = input_dir.join(proto.input_file_name());
                let lines = read_descriptor_lines(&path);
                println!("{}: loaded {} descriptors from {:?}", proto, lines.len(), path);

                let batch = ranker.rank(*proto, &lines).await;
                println!("{}: {} reachable endpoints", proto, batch.len());
                batches.push(batch);
            }

            let mut publisher = match seed {
                Some(seed) => Publisher::with_seed(seed),
                None => Publisher::new(),
            };
            match publisher.render(&batches, &label) {
                Some(text) => {
                    if let Some(parent) = output.parent() {
                        fs::create_dir_all(parent)
                            .with_context(|| format!("creating {:?}", parent))?;
                    }
                    fs::write(&output, text)
                        .with_context(|| format!("writing {:?}", output))?;
                    println!("All results saved to {:?}", output);
                }
                None => println!("No reachable endpoints found for any protocol"),
            }
        }
        Commands::Parse { input } => {
            let content = fs::read_to_string(&input)
                .with_context(|| format!("reading {:?}", input))?;
            for line in content.lines() {
                let Some(endpoint) = Endpoint::parse(line) else {
                    continue;
                };
                match DescriptorCodec::extract_target(&endpoint) {
                    Ok(target) => println!("{} {}", endpoint.protocol, target),
                    Err(e) => eprintln!("skipping ({}): {}", e, line),
                }
            }
        }
    }

    Ok(())
}

/// Read descriptor lines from one protocol's input file.
///
/// A missing or unreadable file contributes zero descriptors; it never
/// aborts the run.
fn read_descriptor_lines(path: &Path) -> Vec<String> {
    if !path.exists() {
        return Vec::new();
    }
    match fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) => {
            log::warn!("could not read {:?}: {}", path, e);
            Vec::new()
        }
    }
}

fn parse_protocol(s: &str) -> Result<Protocol> {
    match s.to_lowercase().as_str() {
        "vless" => Ok(Protocol::Vless),
        "trojan" => Ok(Protocol::Trojan),
        "ss" | "shadowsocks" => Ok(Protocol::Shadowsocks),
        "hysteria2" | "hy2" => Ok(Protocol::Hysteria2),
        "vmess" => Ok(Protocol::Vmess),
        _ => Err(anyhow!(
            "Invalid protocol: {}. Use: vless, trojan, ss, hysteria2, vmess",
            s
        )),
    }
}
