//! # MPEG Transport Stream (TS) Demuxing
//!
//! This module extracts elementary streams from MPEG-2 Transport Streams,
//! including support for:
//!
//! - Packet size detection for 188, 192 (M2TS) and 204 (FEC) byte packets
//! - TS packet header and adaptation field parsing, with PCR decoding
//! - Program Specific Information (PSI): PAT and PMT sections
//! - Packetized Elementary Stream (PES) header parsing with PTS/DTS
//! - Continuity checked elementary stream output
//!
//! ## Example Usage
//!
//! ### Extracting H.264 and AAC from a TS file
//!
//! ```rust,no_run
//! use tsdemux::format::ts::{StreamKind, TSDemuxer};
//! use tsdemux::DemuxerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut demuxer = TSDemuxer::open("input.ts", DemuxerConfig::default())?;
//! demuxer.add_output(StreamKind::Video, "video.h264")?;
//! demuxer.add_output(StreamKind::Audio, "audio.aac")?;
//!
//! let summary = demuxer.run()?;
//! println!("{} packets, {} video bytes", summary.packets, summary.video.bytes_written);
//! # Ok(())
//! # }
//! ```
//!
//! ### Parsing a single packet
//!
//! ```rust
//! use tsdemux::format::ts::{TSPacketParser, TS_PACKET_SIZE};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut data = vec![0xFFu8; TS_PACKET_SIZE];
//! data[..4].copy_from_slice(&[0x47, 0x41, 0x01, 0x10]);
//!
//! let packet = TSPacketParser::new(TS_PACKET_SIZE).parse_packet(&data, 0)?;
//! assert_eq!(packet.header.pid, 0x101);
//! assert_eq!(packet.payload.map(|p| p.len()), Some(184));
//! # Ok(())
//! # }
//! ```

/// TS demuxer driving the whole extraction
pub mod demuxer;

/// Low-level TS packet parsing utilities
pub mod parser;

/// PES header parsing and serialization
pub mod pes;

/// PAT/PMT section parsing
pub mod psi;

/// Elementary stream outputs
pub mod sink;

/// Packet size and offset detection
pub mod sync;

/// Core TS types and constants
pub mod types;

// Re-export commonly used types and constants
pub use demuxer::{DemuxSummary, StreamSummary, TSDemuxer};
pub use parser::{TSPacket, TSPacketParser};
pub use pes::PESHeader;
pub use psi::PsiParser;
pub use sink::{ElementaryStreamSink, FeedOutcome};
pub use sync::SyncInfo;
pub use types::{
    pcr_to_time,
    pts_to_time,
    Pcr,
    StreamKind,
    TSHeader,
    Timestamps,
    PID_PAT,
    STREAM_TYPE_AAC,
    STREAM_TYPE_H264,
    TS_PACKET_SIZE,
    TS_PACKET_SIZE_FEC,
    TS_PACKET_SIZE_M2TS,
};
