use bytes::{BufMut, BytesMut};
use std::fmt;
use std::time::Duration;

// Packet framing
pub const TS_SYNC_BYTE: u8 = 0x47;
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_PACKET_SIZE_M2TS: usize = 192;
pub const TS_PACKET_SIZE_FEC: usize = 204;
pub const TS_PACKET_SIZES: [usize; 3] = [TS_PACKET_SIZE, TS_PACKET_SIZE_M2TS, TS_PACKET_SIZE_FEC];
pub const TS_PACKET_SIZE_MAX: usize = TS_PACKET_SIZE_FEC;
pub const TS_HEADER_SIZE: usize = 4;

// PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_NULL: u16 = 0x1FFF;
pub const PID_MAX: u16 = 0x1FFF;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;

// Elementary Stream Types
pub const STREAM_TYPE_H264: u8 = 0x1b;
pub const STREAM_TYPE_AAC: u8 = 0x0f;

// PES
pub const PES_START_CODE: u32 = 0x000001;
pub const PES_FIXED_HEADER_SIZE: usize = 9;
pub const STREAM_ID_PRIVATE_1: u8 = 0xbd;

// Clocks
pub const PTS_HZ: u64 = 90_000;
pub const PCR_HZ: u64 = 27_000_000;

/// Logical elementary stream carried to an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// H.264 video
    Video,
    /// ADTS AAC audio
    Audio,
}

impl StreamKind {
    /// Kind for a PMT stream type, if the demuxer extracts it.
    pub fn from_stream_type(stream_type: u8) -> Option<Self> {
        match stream_type {
            STREAM_TYPE_H264 => Some(StreamKind::Video),
            STREAM_TYPE_AAC => Some(StreamKind::Audio),
            _ => None,
        }
    }

    /// Whether a PES stream_id is legal for this kind.
    pub fn accepts_stream_id(self, stream_id: u8) -> bool {
        match self {
            StreamKind::Video => (0xe0..=0xef).contains(&stream_id),
            StreamKind::Audio => {
                (0xc0..=0xdf).contains(&stream_id) || stream_id == STREAM_ID_PRIVATE_1
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PATEntry {
    pub program_number: u16,
    pub program_map_pid: u16,
}

/// Program entries of one PAT section, in section order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PAT {
    pub entries: Vec<PATEntry>,
}

impl PAT {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Writes the program loop (without section header or CRC).
    pub fn write_to(&self, buf: &mut BytesMut) {
        for entry in &self.entries {
            buf.put_u16(entry.program_number);
            buf.put_u16(entry.program_map_pid & PID_MAX | 7 << 13);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementaryStreamInfo {
    pub stream_type: u8,
    pub elementary_pid: u16,
}

/// PCR PID and elementary stream entries of one PMT section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PMT {
    pub pcr_pid: u16,
    pub elementary_stream_infos: Vec<ElementaryStreamInfo>,
}

impl PMT {
    pub fn new() -> Self {
        Self {
            pcr_pid: 0,
            elementary_stream_infos: Vec::new(),
        }
    }

    /// Writes the PMT body (without section header or CRC), with empty
    /// descriptor loops.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u16(self.pcr_pid & PID_MAX | 7 << 13);
        buf.put_u16(0xf << 12);

        for info in &self.elementary_stream_infos {
            buf.put_u8(info.stream_type);
            buf.put_u16(info.elementary_pid & PID_MAX | 7 << 13);
            buf.put_u16(0xf << 12);
        }
    }
}

/// Program clock reference: 33-bit base at 90 kHz plus 9-bit 27 MHz extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pcr {
    pub base: u64,
    pub extension: u16,
}

impl Pcr {
    /// Full value in 27 MHz ticks.
    pub fn ticks_27mhz(&self) -> u64 {
        self.base * 300 + self.extension as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptationField {
    pub length: usize,
    pub discontinuity: bool,
    pub random_access: bool,
    pub es_priority: bool,
    pub pcr_flag: bool,
    pub opcr_flag: bool,
    pub splicing_point_flag: bool,
    pub private_data_flag: bool,
    pub extension_flag: bool,
    pub pcr: Option<Pcr>,
}

impl AdaptationField {
    /// An adaptation field holding only its length byte.
    pub fn empty() -> Self {
        Self {
            length: 0,
            discontinuity: false,
            random_access: false,
            es_priority: false,
            pcr_flag: false,
            opcr_flag: false,
            splicing_point_flag: false,
            private_data_flag: false,
            extension_flag: false,
            pcr: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TSHeader {
    pub sync_byte: u8, // Always 0x47
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_exists: bool,
    pub contains_payload: bool,
    pub continuity_counter: u8,
}

impl Default for TSHeader {
    fn default() -> Self {
        Self {
            sync_byte: TS_SYNC_BYTE,
            transport_error: false,
            payload_unit_start: false,
            transport_priority: false,
            pid: 0,
            scrambling_control: 0,
            adaptation_field_exists: false,
            contains_payload: true,
            continuity_counter: 0,
        }
    }
}

impl TSHeader {
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.sync_byte);

        let mut b1 = 0u8;
        if self.transport_error {
            b1 |= 0x80;
        }
        if self.payload_unit_start {
            b1 |= 0x40;
        }
        if self.transport_priority {
            b1 |= 0x20;
        }
        b1 |= ((self.pid >> 8) & 0x1f) as u8;
        buf.put_u8(b1);

        buf.put_u8((self.pid & 0xff) as u8);

        let mut b3 = (self.scrambling_control & 0x03) << 6;
        if self.adaptation_field_exists {
            b3 |= 0x20;
        }
        if self.contains_payload {
            b3 |= 0x10;
        }
        b3 |= self.continuity_counter & 0x0f;
        buf.put_u8(b3);
    }
}

/// Timestamps decoded from one PES header, in 90 kHz ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamps {
    pub pts: u64,
    /// Equal to `pts` when the header carries no DTS.
    pub dts: u64,
}

// Time conversion utilities
pub fn pts_to_time(pts: u64) -> Duration {
    Duration::from_nanos(pts * 1_000_000_000 / PTS_HZ)
}

pub fn pcr_to_time(pcr: Pcr) -> Duration {
    Duration::from_nanos((pcr.ticks_27mhz() as u128 * 1_000_000_000 / PCR_HZ as u128) as u64)
}
