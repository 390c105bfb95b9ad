use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "phishguard")]
#[command(about = "Check URLs for phishing against a remote scoring service.")]
#[command(version)]
pub struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Choose color theme
    #[arg(short = 'T', long, global = true)]
    pub theme: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check URLs right away (cache, then rate limiter, then remote)
    Check {
        #[arg(required = true, num_args = 1..)]
        urls: Vec<String>,
    },

    /// Scan URLs through the batching scheduler (reads stdin when no URL is given)
    Scan {
        urls: Vec<String>,
    },

    /// Report a URL to the community database
    Report { url: String },

    /// Tell the scoring service what a URL really is
    Feedback(FeedbackArgs),

    /// Show recent detections
    History {
        #[arg(short = 'l', long, default_value_t = 20)]
        limit: usize,
    },

    /// Show status
    Status,

    /// Generate config sample
    GenerateConfig,
}

#[derive(Args)]
pub struct FeedbackArgs {
    pub url: String,

    /// Mark as phishing
    #[arg(long, conflicts_with = "safe", required_unless_present = "safe")]
    pub phishing: bool,

    /// Mark as safe
    #[arg(long)]
    pub safe: bool,
}
