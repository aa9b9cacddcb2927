use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Once;

use clap::{Parser, Subcommand};
use flakescope::assemble::FailureCluster;
use flakescope::cancel::CancellationToken;
use flakescope::config::{self, DetectorConfig, DistanceMetric};
use flakescope::detector::FlakeDetector;
use flakescope::error::{DetectError, Result};
use flakescope::gemini::{GeminiConfig, GeminiEmbedder};
use flakescope::store::{self, StoreKind};

fn init_parallelism() {
    static START: Once = Once::new();
    START.call_once(|| {
        let n = num_cpus::get();
        let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
    });
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("flakescope={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Parser, Debug)]
#[command(name = "flakescope", version, about = "Embedding-based flaky-test detection")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file whose fields merge under flags (flags win)
    #[arg(long, global = true, default_value = ".flakescope.json")]
    config: PathBuf,

    /// Storage adapter: memory | file
    #[arg(long, global = true, default_value = "file")]
    store: String,

    /// Data directory for the file store
    #[arg(long = "data-dir", global = true, default_value = ".flakescope")]
    data_dir: PathBuf,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a detection pass and persist the ranked clusters
    Detect {
        /// Time window in days
        #[arg(long)]
        days: Option<u32>,
        /// DBSCAN neighborhood radius
        #[arg(long)]
        epsilon: Option<f64>,
        #[arg(long = "min-points")]
        min_points: Option<usize>,
        #[arg(long = "min-cluster-size")]
        min_cluster_size: Option<usize>,
        /// Keep the N largest clusters (0 = all)
        #[arg(long = "max-clusters")]
        max_clusters: Option<usize>,
        /// Distance metric: cosine | euclidean
        #[arg(long)]
        distance: Option<String>,
        /// Embedding model name
        #[arg(long)]
        model: Option<String>,
        /// Output format: json | table
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Print persisted clusters from the last pass
    Report {
        #[arg(long)]
        limit: Option<usize>,
        /// Output format: json | table
        #[arg(long, default_value = "json")]
        format: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    init_parallelism();

    let cancel = CancellationToken::new();
    {
        let token = cancel.clone();
        let _ = ctrlc::set_handler(move || token.cancel());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    if let Err(err) = runtime.block_on(run(cli, cancel)) {
        eprintln!("flakescope: {} error: {err}", err.kind());
        std::process::exit(err.exit_code());
    }
    Ok(())
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let mut detector_config = DetectorConfig::default();
    if let Some(file) = config::load_config_file(&cli.config)? {
        file.apply(&mut detector_config);
    }

    let store_kind = StoreKind::from_str(&cli.store)?;
    let store = store::build_store(store_kind, &cli.data_dir);

    match cli.command {
        Command::Detect {
            days,
            epsilon,
            min_points,
            min_cluster_size,
            max_clusters,
            distance,
            model,
            format,
        } => {
            if let Some(v) = days {
                detector_config.time_window_days = v;
            }
            if let Some(v) = epsilon {
                detector_config.epsilon = v;
            }
            if let Some(v) = min_points {
                detector_config.min_points = v;
            }
            if let Some(v) = min_cluster_size {
                detector_config.min_cluster_size = v;
            }
            if let Some(v) = max_clusters {
                // zero on the flag surface means "return all"
                detector_config.max_clusters = if v == 0 { None } else { Some(v) };
            }
            if let Some(v) = distance.as_deref() {
                detector_config.distance = DistanceMetric::from_str(v)?;
            }

            let mut gemini = GeminiConfig::default();
            if let Some(m) = model {
                gemini.model = m;
            }
            let provider = std::sync::Arc::new(GeminiEmbedder::new(gemini)?);

            let detector = FlakeDetector::new(detector_config, store, provider)?;
            let clusters = detector.detect(&cancel).await?;
            print_clusters(&clusters, &format)?;
        }
        Command::Report { limit, format } => {
            let clusters = store.fetch_clusters(limit).await?;
            print_clusters(&clusters, &format)?;
        }
    }
    Ok(())
}

fn print_clusters(clusters: &[FailureCluster], format: &str) -> Result<()> {
    if format == "table" {
        print_clusters_table(clusters);
        return Ok(());
    }
    let rendered = serde_json::to_string_pretty(clusters)
        .map_err(|e| DetectError::Storage(format!("cannot serialize output: {e}")))?;
    println!("{rendered}");
    Ok(())
}

fn print_clusters_table(clusters: &[FailureCluster]) {
    println!(
        "{:<16} {:<6} {:<21} {:<21} {}",
        "Id", "Count", "First seen", "Last seen", "Pattern"
    );
    for c in clusters {
        println!(
            "{:<16} {:<6} {:<21} {:<21} {}",
            c.id,
            c.metadata.failure_count,
            c.metadata.first_seen.format("%Y-%m-%d %H:%M:%S"),
            c.metadata.last_seen.format("%Y-%m-%d %H:%M:%S"),
            c.failure_pattern
        );
        if let Some(assertion) = &c.assertion_pattern {
            println!("{:<16} {:<6} {:<21} {:<21} {assertion}", "", "", "", "");
        }
    }
}
