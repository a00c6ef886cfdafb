use anyhow::Result;
use clap::{Parser, Subcommand};

mod preview;
mod probe;
mod transcode;

pub use preview::PreviewCommand;
pub use probe::ProbeCommand;
pub use transcode::TranscodeCommand;

#[derive(Parser, Debug)]
#[command(name = "vidtranscode")]
#[command(about = "Transcode media files with FFmpeg, with progress and preview frames")]
pub struct Args {
    /// Debug logging and FFmpeg's own messages
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the input's duration and tracks as JSON
    Probe(ProbeCommand),
    /// Transcode one file
    Transcode(TranscodeCommand),
    /// Save evenly spaced key frames as PNG files
    Preview(PreviewCommand),
}

impl Args {
    pub fn run(self) -> Result<()> {
        match self.command {
            Command::Probe(cmd) => cmd.run(),
            Command::Transcode(cmd) => cmd.run(),
            Command::Preview(cmd) => cmd.run(),
        }
    }
}
