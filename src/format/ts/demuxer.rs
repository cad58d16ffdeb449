use super::parser::TSPacketParser;
use super::psi::PsiParser;
use super::sink::ElementaryStreamSink;
use super::sync;
use super::types::*;
use crate::config::DemuxerConfig;
use crate::error::{DemuxError, Result};
use log::{debug, error, info};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

/// Per-kind totals of a demuxing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// PID carrying this kind, once the PMT announced it
    pub pid: Option<u16>,
    /// PES headers parsed
    pub pes_packets: u64,
    /// Elementary stream bytes written to the output
    pub bytes_written: u64,
}

/// Totals reported by [`TSDemuxer::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxSummary {
    /// Transport packets fully processed
    pub packets: u64,
    pub video: StreamSummary,
    pub audio: StreamSummary,
}

/// MPEG Transport Stream demuxer.
///
/// Extracts the H.264 video and AAC audio elementary streams of the first
/// program in a transport stream into two files. It handles:
/// - packet size and offset detection (188, 192 and 204 byte packets)
/// - PAT/PMT parsing to find the video and audio PIDs
/// - PES header stripping with PTS/DTS and PCR reporting
/// - continuity checking on the extracted PIDs
///
/// The first error stops the run. Output already written stays on disk.
pub struct TSDemuxer<R: Read + Seek> {
    reader: R,
    config: DemuxerConfig,
    parser: TSPacketParser,
    psi: PsiParser,
    initial_offset: u64,
    packets: u64,
    pmt_pid: Option<u16>,
    pcr_pid: Option<u16>,
    streams: HashMap<u16, StreamKind>,
    sinks: HashMap<StreamKind, ElementaryStreamSink>,
}

impl TSDemuxer<File> {
    /// Opens a transport stream file and synchronizes on it.
    pub fn open(path: impl AsRef<Path>, config: DemuxerConfig) -> Result<Self> {
        let path = path.as_ref();
        info!("Input file: {}", path.display());
        let file = File::open(path).map_err(|e| {
            error!("Cannot open {}: {}", path.display(), e);
            e
        })?;
        Self::new(file, config)
    }
}

impl<R: Read + Seek> TSDemuxer<R> {
    /// Creates a demuxer over `reader`, detecting the packet size and the
    /// offset of the first packet.
    pub fn new(mut reader: R, config: DemuxerConfig) -> Result<Self> {
        let probe_len = config.probe_packets * TS_PACKET_SIZE_MAX;
        let framing = sync::synchronize(&mut reader, probe_len).map_err(|e| {
            error!("{}", e);
            e
        })?;
        info!(
            "Packet size {} bytes, initial offset {:#010X}",
            framing.packet_size, framing.offset
        );

        Ok(Self {
            reader,
            psi: PsiParser::new(config.verify_crc),
            config,
            parser: TSPacketParser::new(framing.packet_size),
            initial_offset: framing.offset as u64,
            packets: 0,
            pmt_pid: None,
            pcr_pid: None,
            streams: HashMap::new(),
            sinks: HashMap::new(),
        })
    }

    /// Registers the output file for one stream kind.
    ///
    /// Fails if the kind already has an output; the first registration is
    /// kept.
    pub fn add_output(&mut self, kind: StreamKind, path: impl Into<PathBuf>) -> Result<()> {
        if self.sinks.contains_key(&kind) {
            let err = DemuxError::OutputExists(kind);
            error!("{}", err);
            return Err(err);
        }

        let sink = ElementaryStreamSink::new(kind, path);
        info!("Output {} file: {}", kind, sink.path().display());
        self.sinks.insert(kind, sink);
        Ok(())
    }

    /// Demuxes the input to the end.
    ///
    /// Outputs are flushed whether or not the run succeeds, and
    /// [`packets_processed`](Self::packets_processed) stays valid after an
    /// error.
    pub fn run(&mut self) -> Result<DemuxSummary> {
        let result = self.read_packets();
        let flushed = self.flush_outputs();
        info!("{} packets were processed", self.packets);

        result?;
        flushed?;
        Ok(self.summary())
    }

    fn read_packets(&mut self) -> Result<()> {
        let packet_size = self.parser.packet_size();
        let chunk_len = packet_size * self.config.chunk_packets;
        let mut chunk = Vec::with_capacity(chunk_len);

        loop {
            chunk.clear();
            let offset = self.current_offset();
            (&mut self.reader)
                .take(chunk_len as u64)
                .read_to_end(&mut chunk)
                .map_err(|e| {
                    error!("{:#010X}: read failed: {}", offset, e);
                    e
                })?;

            for packet in chunk.chunks_exact(packet_size) {
                self.process_packet(packet)?;
            }

            if chunk.len() < chunk_len {
                return Ok(());
            }
        }
    }

    fn flush_outputs(&mut self) -> Result<()> {
        for sink in self.sinks.values_mut() {
            sink.flush().map_err(|e| {
                error!("Cannot flush {}: {}", sink.path().display(), e);
                e
            })?;
        }
        Ok(())
    }

    /// Processes one transport packet of the detected size.
    ///
    /// Errors are logged with the packet's byte offset before they are
    /// returned. The packet count only advances on success.
    pub fn process_packet(&mut self, packet: &[u8]) -> Result<()> {
        let offset = self.current_offset();
        self.handle_packet(packet, offset).map_err(|e| {
            error!("{:#010X}: {}", offset, e);
            e
        })?;
        self.packets += 1;
        Ok(())
    }

    fn handle_packet(&mut self, packet: &[u8], offset: u64) -> Result<()> {
        let ts = self.parser.parse_packet(packet, offset)?;
        let pid = ts.header.pid;

        if let Some(pcr) = ts.adaptation_field.as_ref().and_then(|field| field.pcr) {
            debug!(
                "PID {}: PCR {} ({:?})",
                pid,
                pcr.base,
                pcr_to_time(pcr)
            );
        }

        let payload = match ts.payload {
            Some(payload) => payload,
            None => return Ok(()),
        };
        let unit_start = ts.header.payload_unit_start;

        if unit_start && pid == PID_PAT {
            self.handle_pat(payload, offset)
        } else if unit_start && Some(pid) == self.pmt_pid {
            self.handle_pmt(payload, offset)
        } else if let Some(kind) = self.streams.get(&pid).copied() {
            match self.sinks.get_mut(&kind) {
                Some(sink) => sink
                    .feed(payload, pid, unit_start, ts.header.continuity_counter)
                    .map(|_| ()),
                None => Ok(()),
            }
        } else {
            Ok(())
        }
    }

    fn handle_pat(&mut self, payload: &[u8], offset: u64) -> Result<()> {
        let pat = self.psi.parse_pat(payload, offset)?;

        if self.pmt_pid.is_none() {
            if let Some(entry) = pat.entries.first() {
                info!(
                    "Program {}: PMT PID {}",
                    entry.program_number, entry.program_map_pid
                );
                self.pmt_pid = Some(entry.program_map_pid);
            }
        }
        Ok(())
    }

    fn handle_pmt(&mut self, payload: &[u8], offset: u64) -> Result<()> {
        let pmt = self.psi.parse_pmt(payload, offset)?;

        if self.pcr_pid.is_none() {
            info!("PCR PID {}", pmt.pcr_pid);
            self.pcr_pid = Some(pmt.pcr_pid);
        }

        for info in &pmt.elementary_stream_infos {
            let kind = match StreamKind::from_stream_type(info.stream_type) {
                Some(kind) => kind,
                None => {
                    debug!(
                        "Ignoring stream type 0x{:02X} on PID {}",
                        info.stream_type, info.elementary_pid
                    );
                    continue;
                }
            };

            if self.stream_pid(kind).is_some() {
                continue;
            }
            if let Entry::Vacant(entry) = self.streams.entry(info.elementary_pid) {
                info!(
                    "Stream type 0x{:02X} ({}), PID {}",
                    info.stream_type, kind, info.elementary_pid
                );
                entry.insert(kind);
            }
        }
        Ok(())
    }

    fn current_offset(&self) -> u64 {
        self.initial_offset + self.packets * self.parser.packet_size() as u64
    }

    /// Packets fully processed so far.
    pub fn packets_processed(&self) -> u64 {
        self.packets
    }

    pub fn packet_size(&self) -> usize {
        self.parser.packet_size()
    }

    /// Offset of the first packet in the input.
    pub fn initial_offset(&self) -> u64 {
        self.initial_offset
    }

    pub fn pmt_pid(&self) -> Option<u16> {
        self.pmt_pid
    }

    pub fn pcr_pid(&self) -> Option<u16> {
        self.pcr_pid
    }

    /// PID mapped to `kind` by the PMT.
    pub fn stream_pid(&self, kind: StreamKind) -> Option<u16> {
        self.streams
            .iter()
            .find(|(_, mapped)| **mapped == kind)
            .map(|(pid, _)| *pid)
    }

    pub fn summary(&self) -> DemuxSummary {
        let stream = |kind: StreamKind| {
            let sink = self.sinks.get(&kind);
            StreamSummary {
                pid: self.stream_pid(kind),
                pes_packets: sink.map_or(0, |s| s.pes_packets()),
                bytes_written: sink.map_or(0, |s| s.bytes_written()),
            }
        };

        DemuxSummary {
            packets: self.packets,
            video: stream(StreamKind::Video),
            audio: stream(StreamKind::Audio),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::format::ts::pes::PESHeader;
    use crate::format::ts::psi::write_section;
    use bytes::{BufMut, BytesMut};
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::io::Cursor;

    const PMT_PID: u16 = 0x1000;
    const VIDEO_PID: u16 = 0x0101;
    const AUDIO_PID: u16 = 0x0102;

    /// Builds one packet whose payload ends the packet, padding with
    /// adaptation field stuffing.
    fn ts_packet(pid: u16, unit_start: bool, cc: u8, payload: &[u8]) -> Vec<u8> {
        let stuffing = TS_PACKET_SIZE - TS_HEADER_SIZE - payload.len();
        let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
        TSHeader {
            pid,
            payload_unit_start: unit_start,
            adaptation_field_exists: stuffing > 0,
            continuity_counter: cc,
            ..Default::default()
        }
        .write_to(&mut buf);
        if stuffing > 0 {
            buf.put_u8((stuffing - 1) as u8);
            if stuffing > 1 {
                buf.put_u8(0x00); // no flags
                buf.resize(TS_PACKET_SIZE - payload.len(), 0xFF);
            }
        }
        buf.extend_from_slice(payload);
        buf.to_vec()
    }

    fn pat_packet_for(program_map_pid: u16) -> Vec<u8> {
        let pat = PAT {
            entries: vec![PATEntry {
                program_number: 1,
                program_map_pid,
            }],
        };
        let mut body = BytesMut::new();
        pat.write_to(&mut body);
        let mut section = BytesMut::new();
        write_section(&mut section, TABLE_ID_PAT, 1, &body);
        ts_packet(PID_PAT, true, 0, &section)
    }

    fn pat_packet() -> Vec<u8> {
        pat_packet_for(PMT_PID)
    }

    fn pmt_packet_with(streams: &[(u8, u16)]) -> Vec<u8> {
        let pmt = PMT {
            pcr_pid: VIDEO_PID,
            elementary_stream_infos: streams
                .iter()
                .map(|&(stream_type, elementary_pid)| ElementaryStreamInfo {
                    stream_type,
                    elementary_pid,
                })
                .collect(),
        };
        let mut body = BytesMut::new();
        pmt.write_to(&mut body);
        let mut section = BytesMut::new();
        write_section(&mut section, TABLE_ID_PMT, 1, &body);
        ts_packet(PMT_PID, true, 0, &section)
    }

    fn pmt_packet() -> Vec<u8> {
        pmt_packet_with(&[(STREAM_TYPE_H264, VIDEO_PID), (STREAM_TYPE_AAC, AUDIO_PID)])
    }

    fn pes_packet(pid: u16, stream_id: u8, cc: u8, pts: u64, data: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        PESHeader::new(stream_id).with_pts(pts).write_to(&mut buf);
        buf.extend_from_slice(data);
        ts_packet(pid, true, cc, &buf)
    }

    fn demuxer(packets: &[Vec<u8>]) -> TSDemuxer<Cursor<Vec<u8>>> {
        TSDemuxer::new(Cursor::new(packets.concat()), DemuxerConfig::default()).unwrap()
    }

    #[test]
    fn test_tables_map_streams() {
        let mut demuxer = demuxer(&[pat_packet(), pmt_packet()]);
        assert_eq!(demuxer.packet_size(), TS_PACKET_SIZE);
        assert_eq!(demuxer.initial_offset(), 0);

        let summary = demuxer.run().unwrap();
        assert_eq!(summary.packets, 2);
        assert_eq!(demuxer.pmt_pid(), Some(PMT_PID));
        assert_eq!(demuxer.pcr_pid(), Some(VIDEO_PID));
        assert_eq!(demuxer.stream_pid(StreamKind::Video), Some(VIDEO_PID));
        assert_eq!(demuxer.stream_pid(StreamKind::Audio), Some(AUDIO_PID));
    }

    #[test]
    fn test_second_output_of_same_kind_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.h264");
        let mut demuxer = demuxer(&[
            pat_packet(),
            pmt_packet(),
            pes_packet(VIDEO_PID, 0xe0, 0, 0, &[1, 2, 3]),
        ]);

        demuxer.add_output(StreamKind::Video, &first).unwrap();
        let err = demuxer
            .add_output(StreamKind::Video, dir.path().join("second.h264"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutputExists);

        demuxer.run().unwrap();
        assert_eq!(fs::read(&first).unwrap(), vec![1, 2, 3]);
        assert!(!dir.path().join("second.h264").exists());
    }

    #[test]
    fn test_reserved_field_control_halts_run() {
        let mut bad = ts_packet(0x0200, false, 0, &[]);
        bad[3] &= 0xCF;
        let mut demuxer = demuxer(&[pat_packet(), pmt_packet(), bad, pat_packet()]);

        let err = demuxer.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructuralPacket);
        assert!(err.to_string().contains("0x00000178"));
        assert_eq!(demuxer.packets_processed(), 2);
    }

    #[test]
    fn test_unknown_pids_ignored() {
        let mut demuxer = demuxer(&[
            ts_packet(0x0777, true, 3, &[0x00, 0x00, 0x01, 0xe0]),
            ts_packet(PID_NULL, false, 0, &[]),
            pat_packet(),
        ]);
        assert_eq!(demuxer.run().unwrap().packets, 3);
    }

    #[test]
    fn test_pmt_pid_first_wins() {
        let mut demuxer = demuxer(&[pat_packet(), pat_packet_for(0x0200)]);
        demuxer.run().unwrap();
        assert_eq!(demuxer.pmt_pid(), Some(PMT_PID));
    }

    #[test]
    fn test_continuity_gap_halts_run() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio.aac");
        let mut demuxer = demuxer(&[
            pat_packet(),
            pmt_packet(),
            pes_packet(AUDIO_PID, 0xc0, 0, 0, &[0xAA]),
            ts_packet(AUDIO_PID, false, 2, &[0xBB]),
        ]);
        demuxer.add_output(StreamKind::Audio, &audio).unwrap();

        let err = demuxer.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Continuity);
        assert_eq!(demuxer.packets_processed(), 3);
        assert_eq!(fs::read(&audio).unwrap(), vec![0xAA]);
    }

    #[test]
    fn test_stream_pids_first_wins() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("video.h264");
        let mut demuxer = demuxer(&[
            pat_packet(),
            pmt_packet_with(&[
                (STREAM_TYPE_H264, VIDEO_PID),
                (STREAM_TYPE_H264, 0x0201),
                (STREAM_TYPE_AAC, AUDIO_PID),
            ]),
            pmt_packet_with(&[(STREAM_TYPE_H264, 0x0301), (STREAM_TYPE_AAC, 0x0302)]),
            pes_packet(0x0201, 0xe0, 0, 0, &[9, 9]),
            pes_packet(0x0301, 0xe0, 0, 0, &[8, 8]),
            pes_packet(VIDEO_PID, 0xe0, 0, 0, &[1, 2]),
        ]);
        demuxer.add_output(StreamKind::Video, &video).unwrap();

        assert_eq!(demuxer.run().unwrap().packets, 6);
        assert_eq!(demuxer.stream_pid(StreamKind::Video), Some(VIDEO_PID));
        assert_eq!(demuxer.stream_pid(StreamKind::Audio), Some(AUDIO_PID));
        assert_eq!(fs::read(&video).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_pid_listed_twice_keeps_first_kind() {
        let mut demuxer = demuxer(&[
            pat_packet(),
            pmt_packet_with(&[(STREAM_TYPE_H264, VIDEO_PID), (STREAM_TYPE_AAC, VIDEO_PID)]),
        ]);
        demuxer.run().unwrap();
        assert_eq!(demuxer.stream_pid(StreamKind::Video), Some(VIDEO_PID));
        assert_eq!(demuxer.stream_pid(StreamKind::Audio), None);
    }

    #[test]
    fn test_section_padded_in_payload_halts_run() {
        let mut padded = BytesMut::with_capacity(TS_PACKET_SIZE);
        TSHeader {
            pid: PID_PAT,
            payload_unit_start: true,
            ..Default::default()
        }
        .write_to(&mut padded);
        let body = [0x00, 0x01, 0xF0, 0x00];
        write_section(&mut padded, TABLE_ID_PAT, 1, &body);
        padded.resize(TS_PACKET_SIZE, 0xFF);

        let mut demuxer = demuxer(&[pat_packet(), padded.to_vec()]);
        let err = demuxer.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Psi);
        assert_eq!(demuxer.packets_processed(), 1);
    }

    #[test]
    fn test_trailing_partial_packet_ignored() {
        let mut data = [pat_packet(), pmt_packet()].concat();
        data.extend_from_slice(&[TS_SYNC_BYTE, 0x00, 0x00]);
        let config = DemuxerConfig::default().with_chunk_packets(1);
        let mut demuxer = TSDemuxer::new(Cursor::new(data), config).unwrap();
        assert_eq!(demuxer.run().unwrap().packets, 2);
    }
}
