/*!
    vidtranscode: batch transcoder built on the workspace's FFmpeg crates.

    Usage:
      vidtranscode probe movie.mkv
      vidtranscode transcode movie.mkv movie.mp4 --video-encoder libx264 --crf 23 --size 1280x720
      vidtranscode transcode --job job.toml
      vidtranscode preview movie.mkv --count 8 --out-dir previews/
*/

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    init_logging(args.verbose);
    args.run()
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    // FFmpeg prints straight to stderr; keep it to real errors.
    let level = if verbose {
        ffmpeg_next::util::log::Level::Info
    } else {
        ffmpeg_next::util::log::Level::Error
    };
    ffmpeg_next::util::log::set_level(level);
}
