#![doc(html_root_url = "https://docs.rs/tsdemux/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsdemux - MPEG-2 Transport Stream demuxer
//!
//! `tsdemux` extracts the H.264 video and ADTS AAC audio elementary streams
//! of the first program in an MPEG-2 Transport Stream file and writes each
//! one, stripped of its transport and PES framing, to its own file.
//!
//! ## Features
//!
//! - Automatic packet size and start offset detection (188, 192, 204 bytes)
//! - PAT/PMT parsing with optional CRC-32/MPEG-2 verification
//! - PES header validation with PTS/DTS decoding
//! - PCR decoding from adaptation fields
//! - Per-PID continuity counter checking
//! - Fail-fast error reporting with the byte offset of the bad packet
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tsdemux::format::ts::StreamKind;
//! use tsdemux::{DemuxerConfig, TSDemuxer};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut demuxer = TSDemuxer::open("input.ts", DemuxerConfig::from_env())?;
//!
//!     demuxer.add_output(StreamKind::Video, "video.h264")?;
//!     demuxer.add_output(StreamKind::Audio, "audio.aac")?;
//!
//!     let summary = demuxer.run()?;
//!     println!("{} packets processed", summary.packets);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `format`: Transport stream parsing and demuxing
//!   - Packet sync detection
//!   - TS packet, PSI and PES parsing
//!   - Elementary stream outputs
//!
//! - `error`: Error handling types and utilities
//!   - Error kinds for each failure class
//!   - Result type alias for convenience
//!
//! - `config`: Run tunables with environment overrides
//!
//! - `utils`: Common utilities and helper functions
//!   - Bitstream reading
//!   - CRC calculations
//!
/// Error types and utilities
pub mod error;

/// Media format implementations (MPEG-TS)
pub mod format;

/// Common utilities and helper functions
pub mod utils;

/// Configuration module
pub mod config;

pub use config::DemuxerConfig;
pub use error::{DemuxError, ErrorKind, Result};
pub use format::ts::TSDemuxer;
