// Commandline argument parser using clap for UpperSense

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct UpperArgs {
    #[command(subcommand)]
    /// Which task to perform
    pub command: CommandTask,

    /// Path to the RON configuration file; defaults are used when absent
    #[arg(short = 'c', long = "config", default_value = "uppersense.ron")]
    pub config: PathBuf,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Serve the newline-delimited command protocol on stdin/stdout
    #[command(about)]
    Bridge(BridgeCommand),

    /// List the serial devices available on this machine
    #[command(about)]
    Ports,

    /// Build or update a patient workbook from per-exercise capture CSVs
    #[command(about)]
    FromCsv(FromCsvCommand),
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct BridgeCommand {
    /// Serial port to use, overriding the configuration file
    #[arg(short = 'p', long = "port")]
    pub port: Option<String>,

    /// Directory patient workbooks are stored under, overriding the
    /// configuration file
    #[arg(long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Also archive every completed capture as a CSV file in this directory
    #[arg(long = "csv-dir")]
    pub csv_dir: Option<PathBuf>,

    /// Capture from a simulated device instead of real hardware
    #[arg(long)]
    pub dummy: bool,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct FromCsvCommand {
    /// Patient identifier, 7-12 digits; separators are stripped
    #[arg(short = 'i', long = "patient")]
    pub patient: String,

    /// Capture CSV files, in exercise order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Directory patient workbooks are stored under, overriding the
    /// configuration file
    #[arg(long = "data-dir")]
    pub data_dir: Option<PathBuf>,
}
