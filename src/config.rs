//! Command-line configuration and per-user paths.

use crate::app::ModelConfig;
use clap::Parser;
use directories::ProjectDirs;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const SAVE_FILE_NAME: &str = "timeclock.sav";

/// CLI argument parsing structure
#[derive(Parser, Debug)]
#[command(name = "timeclock")]
#[command(about = "A simple timeclock to help procrastinators budget their day")]
#[command(version)]
pub struct Config {
    /// Start in MODE ("help" lists the valid names)
    #[arg(short = 'm', long, default_value = "Asleep", value_name = "MODE")]
    pub initial_mode: String,

    /// Print the valid mode names and exit
    #[arg(long)]
    pub list_modes: bool,

    /// Use a separate save file so a development copy doesn't interfere
    /// with normal use
    #[arg(long)]
    pub develop: bool,

    /// Save file to use instead of the per-user default
    #[arg(long, value_name = "PATH")]
    pub save_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// True for `--list-modes` or `-m help`.
    pub fn wants_mode_list(&self) -> bool {
        self.list_modes || self.initial_mode.eq_ignore_ascii_case("help")
    }

    pub fn save_path(&self) -> PathBuf {
        let path = self.save_file.clone().unwrap_or_else(default_save_path);
        if self.develop {
            with_suffix(&path, ".dev")
        } else {
            path
        }
    }

    pub fn model_config(&self) -> ModelConfig {
        let config = ModelConfig::new(self.save_path());
        if self.wants_mode_list() {
            config
        } else {
            config.with_start_mode(self.initial_mode.as_str())
        }
    }
}

/// `timeclock.sav` in the user's data directory.
pub fn default_save_path() -> PathBuf {
    ProjectDirs::from("com", "timeclock", "Timeclock")
        .map(|dirs| dirs.data_dir().join(SAVE_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(SAVE_FILE_NAME))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from(SAVE_FILE_NAME));
    name.push(suffix);
    path.with_file_name(name)
}
