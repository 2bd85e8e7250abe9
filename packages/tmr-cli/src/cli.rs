use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tmr",
    version,
    about = "Real-time sleep staging and targeted memory reactivation",
    long_about = "Replay a 5-channel sleep recording as a live stream, score it through a\n\
                  remote real-time staging service and play cues during deep sleep.\n\
                  Set $TMR_TOKEN or use --token for the service token."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the closed loop on a recording
    Run(RunArgs),
    /// Score every epoch of a recording offline
    Score(ScoreArgs),
    /// Print the default session configuration
    Config(ConfigArgs),
}

/// Where the signal comes from
#[derive(Args, Clone)]
pub struct InputArgs {
    /// Recording file (CSV or whitespace-separated ASCII, one column per channel)
    #[arg(long, conflicts_with = "synthetic")]
    pub file: Option<String>,

    /// Generate a synthetic recording of this many seconds instead of reading a file
    #[arg(long)]
    pub synthetic: Option<f64>,

    /// Sampling rate in Hz
    #[arg(long, default_value_t = 100.0)]
    pub sr: f64,

    /// Source columns for C3, C4, EOGL, EOGR and EMG
    #[arg(long, value_delimiter = ',')]
    pub montage: Option<Vec<usize>>,
}

/// How windows are scored
#[derive(Args, Clone)]
pub struct ScorerArgs {
    /// Scoring service base URL
    #[arg(long)]
    pub server_url: Option<String>,

    /// Service authorization token
    #[arg(long, env = "TMR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Answer every request locally with this stage instead of calling the service
    #[arg(long)]
    pub stub_stage: Option<String>,

    /// Confidence reported by the stub scorer
    #[arg(long, default_value_t = 5.0)]
    pub stub_confidence: f64,

    /// Artificial latency of the stub scorer in milliseconds
    #[arg(long, default_value_t = 0)]
    pub stub_delay_ms: u64,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub scorer: ScorerArgs,

    /// Session configuration file (JSON)
    #[arg(long)]
    pub config: Option<String>,

    /// Read buffer duration in milliseconds
    #[arg(long)]
    pub buffer_ms: Option<u64>,

    /// Seconds between scoring requests
    #[arg(long)]
    pub scoring_period: Option<f64>,

    /// Minimum seconds between cues
    #[arg(long)]
    pub refractory: Option<f64>,

    /// Milliseconds between display updates
    #[arg(long)]
    pub telemetry_interval_ms: Option<u64>,

    /// Replay as fast as possible instead of at recording speed
    #[arg(long, default_value_t = false)]
    pub replay: bool,

    /// Write the scoring results as CSV
    #[arg(long)]
    pub results: Option<String>,

    /// Session report file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Do not show the live status line
    #[arg(long, default_value_t = false)]
    pub quiet: bool,

    /// Do not ring the terminal bell on cues
    #[arg(long, default_value_t = false)]
    pub no_bell: bool,
}

#[derive(Args)]
pub struct ScoreArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub scorer: ScorerArgs,

    /// Session configuration file (JSON); only the scorer section is used
    #[arg(long)]
    pub config: Option<String>,

    /// Expert hypnogram (CSV of stage codes) to compare against
    #[arg(long)]
    pub expert: Option<String>,

    /// Where to save the automatic scores
    #[arg(long, default_value = "auto_scores.csv")]
    pub auto_scores: String,

    /// Summary file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}
