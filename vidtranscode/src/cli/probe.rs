use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
pub struct ProbeCommand {
    /// Media file to inspect
    pub input: PathBuf,

    /// Single-line JSON
    #[arg(long)]
    pub compact: bool,
}

impl ProbeCommand {
    pub fn run(self) -> Result<()> {
        let info = ffmpeg_source::probe(&self.input)
            .with_context(|| format!("Failed to probe {}", self.input.display()))?;

        let json = if self.compact {
            serde_json::to_string(&info)?
        } else {
            serde_json::to_string_pretty(&info)?
        };
        println!("{json}");
        Ok(())
    }
}
