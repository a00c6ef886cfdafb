use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;

use vidtranscode::{PropertyChangeEvent, Transcoder};

const PREVIEW_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser, Debug)]
pub struct PreviewCommand {
    /// Media file to sample
    pub input: PathBuf,

    /// Number of frames
    #[arg(short, long, default_value_t = 5)]
    pub count: usize,

    /// Directory for the PNG files
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,
}

impl PreviewCommand {
    pub fn run(self) -> Result<()> {
        std::fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("Failed to create {}", self.out_dir.display()))?;

        let mut transcoder = Transcoder::new()?;
        transcoder.set_input_path(&self.input);
        transcoder.start_preview_frames(self.count);

        let deadline = Instant::now() + PREVIEW_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                bail!("Timed out waiting for preview frames");
            }
            match transcoder.wait_property_change_event(remaining) {
                Some(PropertyChangeEvent::PreviewFramesChanged(_)) => break,
                Some(PropertyChangeEvent::ErrorOccurred(message)) => bail!("Preview failed: {message}"),
                _ => {}
            }
        }

        let frames = transcoder.preview_frames();
        for (i, frame) in frames.iter().enumerate() {
            let path = self.out_dir.join(format!("preview-{i:03}.png"));
            frame
                .image
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{:>9.3}s  {}", frame.position.as_secs_f64(), path.display());
        }
        Ok(())
    }
}
