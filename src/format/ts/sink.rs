use super::pes::PESHeader;
use super::types::*;
use crate::error::{DemuxError, Result};
use log::debug;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Result of feeding one packet payload to a sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedOutcome {
    /// Timestamps of the PES header that started in this payload, if any.
    pub timestamps: Option<Timestamps>,
    /// Elementary stream bytes appended to the output.
    pub written: usize,
}

/// Writes the de-packetized elementary stream of one kind to a file.
///
/// Checks the continuity counter of every packet, strips PES headers from
/// unit-start payloads and appends what remains. The file is created on the
/// first non-empty write, so an output that never receives data is never
/// created.
#[derive(Debug)]
pub struct ElementaryStreamSink {
    kind: StreamKind,
    path: PathBuf,
    output: Option<BufWriter<File>>,
    packets: u64,
    continuity: u8,
    pes_packets: u64,
    bytes_written: u64,
}

impl ElementaryStreamSink {
    pub fn new(kind: StreamKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            output: None,
            packets: 0,
            continuity: 0,
            pes_packets: 0,
            bytes_written: 0,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Packets accepted so far.
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// PES headers parsed so far.
    pub fn pes_packets(&self) -> u64 {
        self.pes_packets
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Whether the output file has been created.
    pub fn is_open(&self) -> bool {
        self.output.is_some()
    }

    /// Consumes the payload of one packet on `pid`.
    ///
    /// A unit-start payload longer than the 9-byte PES prefix has its PES
    /// header parsed and stripped; a shorter one is written as it is.
    /// On any error nothing is written and the sink state is unchanged.
    pub fn feed(
        &mut self,
        payload: &[u8],
        pid: u16,
        unit_start: bool,
        continuity: u8,
    ) -> Result<FeedOutcome> {
        if self.packets > 0 {
            let expected = (self.continuity + 1) & 0x0F;
            if continuity != expected {
                return Err(DemuxError::Continuity {
                    pid,
                    expected,
                    actual: continuity,
                });
            }
        }

        let mut data = payload;
        let mut timestamps = None;
        let has_header = unit_start && payload.len() > PES_FIXED_HEADER_SIZE;
        if has_header {
            let header = PESHeader::parse(payload, self.kind, pid)?;
            timestamps = header.timestamps();
            if let Some(ts) = timestamps {
                debug!(
                    "PID {} ({}): PTS {} ({:?}), DTS {} ({:?})",
                    pid,
                    self.kind,
                    ts.pts,
                    pts_to_time(ts.pts),
                    ts.dts,
                    pts_to_time(ts.dts)
                );
            }
            data = &payload[header.payload_offset()..];
        }

        if !data.is_empty() {
            self.write(data)?;
        }

        if has_header {
            self.pes_packets += 1;
        }
        self.continuity = continuity & 0x0F;
        self.packets += 1;
        self.bytes_written += data.len() as u64;

        Ok(FeedOutcome {
            timestamps,
            written: data.len(),
        })
    }

    /// Flushes buffered output to disk.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(output) = self.output.as_mut() {
            output.flush()?;
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let output = match self.output.as_mut() {
            Some(output) => output,
            None => {
                let file = File::create(&self.path)?;
                debug!("Created {} output {}", self.kind, self.path.display());
                self.output.insert(BufWriter::new(file))
            }
        };
        output.write_all(data)?;
        Ok(())
    }
}
