use super::types::*;
use crate::error::{DemuxError, Result};
use crate::utils::{BitReader, BitsError};
use bytes::{BufMut, BytesMut};

const PTS_DTS_NONE: u8 = 0b00;
const PTS_ONLY: u8 = 0b10;
const PTS_AND_DTS: u8 = 0b11;
const TIMESTAMP_SIZE: usize = 5;

/// Packetized Elementary Stream (PES) header structure
///
/// Contains fields defined in the MPEG-TS specification for PES headers,
/// including timing information and various control flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PESHeader {
    /// Start code prefix, always 0x000001 for PES packets
    pub start_code_prefix: u32,
    /// Stream identifier indicating content type (video/audio/etc.)
    pub stream_id: u8,
    /// Length of the PES packet after this field (0 = unbounded video)
    pub packet_length: u16,
    /// Control field for scrambling mode
    pub scrambling_control: u8,
    /// Priority flag for the packet
    pub priority: bool,
    /// Data alignment indicator
    pub data_alignment: bool,
    /// Copyright indicator
    pub copyright: bool,
    /// Original/copy indicator
    pub original: bool,
    /// Two-bit PTS_DTS_flags field (`0b10` PTS only, `0b11` PTS and DTS)
    pub pts_dts_flags: u8,
    /// ESCR (Extended System Clock Reference) flag
    pub escr_flag: bool,
    /// Elementary Stream rate flag
    pub es_rate_flag: bool,
    /// DSM trick mode flag
    pub dsm_trick_mode_flag: bool,
    /// Additional copy info flag
    pub additional_copy_info_flag: bool,
    /// CRC flag
    pub crc_flag: bool,
    /// Extension flag
    pub extension_flag: bool,
    /// Length of the header data following this field
    pub header_data_length: u8,
    /// Presentation Time Stamp (33 bits)
    pub pts: Option<u64>,
    /// Decoding Time Stamp (33 bits)
    pub dts: Option<u64>,
}

impl Default for PESHeader {
    fn default() -> Self {
        Self {
            start_code_prefix: PES_START_CODE,
            stream_id: 0,
            packet_length: 0,
            scrambling_control: 0,
            priority: false,
            data_alignment: false,
            copyright: false,
            original: false,
            pts_dts_flags: PTS_DTS_NONE,
            escr_flag: false,
            es_rate_flag: false,
            dsm_trick_mode_flag: false,
            additional_copy_info_flag: false,
            crc_flag: false,
            extension_flag: false,
            header_data_length: 0,
            pts: None,
            dts: None,
        }
    }
}

impl PESHeader {
    /// Creates a new PES header with a specific stream ID.
    pub fn new(stream_id: u8) -> Self {
        Self {
            stream_id,
            ..Default::default()
        }
    }

    /// Sets the Presentation Time Stamp, in 90 kHz ticks.
    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = Some(pts & 0x1_FFFF_FFFF);
        self.pts_dts_flags |= 0b10;
        self.header_data_length = self.timestamp_bytes() as u8;
        self
    }

    /// Sets the Decoding Time Stamp, in 90 kHz ticks.
    pub fn with_dts(mut self, dts: u64) -> Self {
        self.dts = Some(dts & 0x1_FFFF_FFFF);
        self.pts_dts_flags |= 0b01;
        self.header_data_length = self.timestamp_bytes() as u8;
        self
    }

    fn timestamp_bytes(&self) -> usize {
        TIMESTAMP_SIZE * (self.pts.is_some() as usize + self.dts.is_some() as usize)
    }

    /// Parses the PES header at the start of `data` for a stream of `kind`.
    ///
    /// Checks the start code, that the stream ID belongs to `kind`, the `10`
    /// marker bits and that the optional header fits inside `data`. `pid` is
    /// only used in error reports.
    pub fn parse(data: &[u8], kind: StreamKind, pid: u16) -> Result<PESHeader> {
        let fail = |message: String| DemuxError::Pes { pid, message };

        if data.len() < PES_FIXED_HEADER_SIZE {
            return Err(fail(format!(
                "Truncated PES header ({} bytes)",
                data.len()
            )));
        }

        let start_code_prefix = u32::from_be_bytes([0, data[0], data[1], data[2]]);
        if start_code_prefix != PES_START_CODE {
            return Err(fail(format!(
                "Incorrect start code ({:02X} {:02X} {:02X})",
                data[0], data[1], data[2]
            )));
        }

        let stream_id = data[3];
        if !kind.accepts_stream_id(stream_id) {
            return Err(fail(format!(
                "Stream id 0x{:02X} is not a {} stream",
                stream_id, kind
            )));
        }

        let flags = data[6];
        if flags >> 6 != 0b10 {
            return Err(fail(format!("Incorrect marker bits (0x{:02X})", flags)));
        }

        let flags2 = data[7];
        let pts_dts_flags = flags2 >> 6;
        let header_data_length = data[8];
        let header_end = PES_FIXED_HEADER_SIZE + header_data_length as usize;
        if header_end > data.len() {
            return Err(fail(format!(
                "Incorrect header length ({} bytes, {} available)",
                header_data_length,
                data.len() - PES_FIXED_HEADER_SIZE
            )));
        }

        let optional = &data[PES_FIXED_HEADER_SIZE..header_end];
        let (pts, dts) = match pts_dts_flags {
            PTS_ONLY | PTS_AND_DTS => {
                let needed = if pts_dts_flags == PTS_AND_DTS {
                    2 * TIMESTAMP_SIZE
                } else {
                    TIMESTAMP_SIZE
                };
                if optional.len() < needed {
                    return Err(fail(format!(
                        "Incorrect header length ({} bytes) for PTS/DTS flags 0b{:02b}",
                        header_data_length, pts_dts_flags
                    )));
                }

                let mut reader = BitReader::new(optional);
                let pts = read_timestamp(&mut reader)
                    .map_err(|e| fail(format!("Bad PTS: {}", e)))?;
                let dts = if pts_dts_flags == PTS_AND_DTS {
                    Some(read_timestamp(&mut reader).map_err(|e| fail(format!("Bad DTS: {}", e)))?)
                } else {
                    None
                };
                (Some(pts), dts)
            }
            // 0b01 is forbidden; carries no usable timestamp
            _ => (None, None),
        };

        Ok(PESHeader {
            start_code_prefix,
            stream_id,
            packet_length: u16::from_be_bytes([data[4], data[5]]),
            scrambling_control: (flags >> 4) & 0x03,
            priority: (flags & 0x08) != 0,
            data_alignment: (flags & 0x04) != 0,
            copyright: (flags & 0x02) != 0,
            original: (flags & 0x01) != 0,
            pts_dts_flags,
            escr_flag: (flags2 & 0x20) != 0,
            es_rate_flag: (flags2 & 0x10) != 0,
            dsm_trick_mode_flag: (flags2 & 0x08) != 0,
            additional_copy_info_flag: (flags2 & 0x04) != 0,
            crc_flag: (flags2 & 0x02) != 0,
            extension_flag: (flags2 & 0x01) != 0,
            header_data_length,
            pts,
            dts,
        })
    }

    /// Offset of the elementary stream data following this header.
    pub fn payload_offset(&self) -> usize {
        PES_FIXED_HEADER_SIZE + self.header_data_length as usize
    }

    /// PTS and DTS, with the DTS defaulting to the PTS.
    pub fn timestamps(&self) -> Option<Timestamps> {
        self.pts.map(|pts| Timestamps {
            pts,
            dts: self.dts.unwrap_or(pts),
        })
    }

    /// Writes the PES header to a BytesMut buffer.
    ///
    /// `header_data_length` is written as stored, so stuffing can be
    /// described by raising it after the timestamps were set; the caller
    /// then appends the stuffing bytes.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8((self.start_code_prefix >> 16) as u8);
        buf.put_u8((self.start_code_prefix >> 8) as u8);
        buf.put_u8(self.start_code_prefix as u8);

        buf.put_u8(self.stream_id);
        buf.put_u16(self.packet_length);

        let mut flags = 0x80 | (self.scrambling_control & 0x03) << 4;
        if self.priority {
            flags |= 0x08;
        }
        if self.data_alignment {
            flags |= 0x04;
        }
        if self.copyright {
            flags |= 0x02;
        }
        if self.original {
            flags |= 0x01;
        }
        buf.put_u8(flags);

        let mut flags2 = (self.pts_dts_flags & 0x03) << 6;
        if self.escr_flag {
            flags2 |= 0x20;
        }
        if self.es_rate_flag {
            flags2 |= 0x10;
        }
        if self.dsm_trick_mode_flag {
            flags2 |= 0x08;
        }
        if self.additional_copy_info_flag {
            flags2 |= 0x04;
        }
        if self.crc_flag {
            flags2 |= 0x02;
        }
        if self.extension_flag {
            flags2 |= 0x01;
        }
        buf.put_u8(flags2);

        buf.put_u8(self.header_data_length);

        if let Some(pts) = self.pts {
            let marker = if self.dts.is_some() { 0x30 } else { 0x20 };
            write_timestamp(buf, marker, pts);
        }

        if let Some(dts) = self.dts {
            write_timestamp(buf, 0x10, dts);
        }
    }
}

// '00xx' prefix, 3 bits, marker, 15 bits, marker, 15 bits, marker
fn read_timestamp(reader: &mut BitReader<'_>) -> std::result::Result<u64, BitsError> {
    reader.skip_bits(4)?;
    let high = reader.read_bits(3)? as u64;
    reader.skip_bits(1)?;
    let mid = reader.read_bits(15)? as u64;
    reader.skip_bits(1)?;
    let low = reader.read_bits(15)? as u64;
    reader.skip_bits(1)?;
    Ok(high << 30 | mid << 15 | low)
}

fn write_timestamp(buf: &mut BytesMut, marker: u8, ts: u64) {
    let ts = ts & 0x1_FFFF_FFFF; // 33 bits

    // First byte: marker bits and 3 MSB of timestamp
    buf.put_u8(marker | ((ts >> 29) & 0x0E) as u8 | 0x01);

    // Middle 15 bits and marker
    buf.put_u16((((ts >> 14) & 0xFFFE) | 0x01) as u16);

    // Final 15 bits and marker
    buf.put_u16((((ts << 1) & 0xFFFE) | 0x01) as u16);
}
