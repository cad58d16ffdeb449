use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use tsdemux::format::ts::StreamKind;
use tsdemux::{DemuxerConfig, TSDemuxer};

/// Extract H.264 video and AAC audio from an MPEG-2 transport stream
#[derive(Parser)]
#[clap(version)]
struct Opt {
    /// Transport stream to read
    input: PathBuf,

    /// Output file for the H.264 elementary stream
    video: PathBuf,

    /// Output file for the ADTS AAC elementary stream
    audio: PathBuf,
}

fn run(opt: Opt) -> tsdemux::Result<()> {
    let mut demuxer = TSDemuxer::open(&opt.input, DemuxerConfig::from_env())?;
    demuxer.add_output(StreamKind::Video, opt.video)?;
    demuxer.add_output(StreamKind::Audio, opt.audio)?;

    let summary = demuxer.run()?;
    info!(
        "Video: {} PES packets, {} bytes; audio: {} PES packets, {} bytes",
        summary.video.pes_packets,
        summary.video.bytes_written,
        summary.audio.pes_packets,
        summary.audio.bytes_written
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opt = Opt::parse();

    match run(opt) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Demuxing failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
