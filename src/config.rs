//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};

use clap::Parser;

/// CLI argument parsing structure
#[derive(Parser, Debug, Clone)]
#[command(name = "mindful-timer")]
#[command(about = "Keeps a mindful-break countdown in sync across popup and page overlays")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// JSON file holding the timer state and settings
    #[arg(long, default_value = "mindful-timer.json")]
    pub state_file: PathBuf,

    /// Reset a timer that is not counting down after this many idle seconds
    #[arg(long, default_value = "300")]
    pub idle_threshold_secs: u64,

    /// How often the idle check runs, in seconds
    #[arg(long, default_value = "30")]
    pub idle_check_secs: u64,

    /// Prefix for completion sound references
    #[arg(long, default_value = "sounds")]
    pub sound_base: String,

    /// Run an observer inside the daemon that logs what it would display
    #[arg(long)]
    pub console_observer: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn idle_check_period(&self) -> Duration {
        Duration::from_secs(self.idle_check_secs.max(1))
    }
}
