use super::types::*;
use crate::error::{DemuxError, Result};
use crate::utils::{BitReader, BitsError};

/// One transport packet split into its parts. The payload borrows from the
/// packet buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TSPacket<'a> {
    pub header: TSHeader,
    pub adaptation_field: Option<AdaptationField>,
    pub payload: Option<&'a [u8]>,
}

/// Parser for fixed-size transport packets of one detected size.
#[derive(Debug, Clone, Copy)]
pub struct TSPacketParser {
    packet_size: usize,
}

impl TSPacketParser {
    pub fn new(packet_size: usize) -> Self {
        Self { packet_size }
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Parses the 4-byte header. `offset` is the packet's position in the
    /// input and only feeds error reports.
    pub fn parse_header(&self, data: &[u8], offset: u64) -> Result<TSHeader> {
        if data.len() < self.packet_size.max(TS_HEADER_SIZE) {
            return Err(packet_error(
                offset,
                format!("Truncated packet ({} bytes)", data.len()),
            ));
        }

        if data[0] != TS_SYNC_BYTE {
            return Err(packet_error(
                offset,
                format!("Sync byte was not found (0x{:02X})", data[0]),
            ));
        }

        let field_control = (data[3] & 0x30) >> 4;
        if field_control == 0 {
            return Err(packet_error(
                offset,
                format!(
                    "Incorrect adaptation field control value (0x{:02X})",
                    field_control
                ),
            ));
        }

        Ok(TSHeader {
            sync_byte: data[0],
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            contains_payload: (data[3] & 0x10) != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }

    /// Parses the adaptation field whose length byte sits at offset 4 of
    /// `data`.
    pub fn parse_adaptation_field(&self, data: &[u8], offset: u64) -> Result<AdaptationField> {
        let length = *data
            .get(TS_HEADER_SIZE)
            .ok_or_else(|| packet_error(offset, "Adaptation field length byte missing".into()))?
            as usize;

        if length + 5 > self.packet_size || length + 5 > data.len() {
            return Err(packet_error(
                offset,
                format!("Incorrect adaptation field length ({} bytes)", length),
            ));
        }

        if length == 0 {
            return Ok(AdaptationField::empty());
        }

        let field = &data[5..5 + length];
        let flags = field[0];
        let pcr_flag = (flags & 0x10) != 0;

        let pcr = if pcr_flag && length > 6 {
            let pcr = read_pcr(&field[1..7])
                .map_err(|e| packet_error(offset, format!("Bad PCR: {}", e)))?;
            Some(pcr)
        } else {
            None
        };

        Ok(AdaptationField {
            length,
            discontinuity: (flags & 0x80) != 0,
            random_access: (flags & 0x40) != 0,
            es_priority: (flags & 0x20) != 0,
            pcr_flag,
            opcr_flag: (flags & 0x08) != 0,
            splicing_point_flag: (flags & 0x04) != 0,
            private_data_flag: (flags & 0x02) != 0,
            extension_flag: (flags & 0x01) != 0,
            pcr,
        })
    }

    /// Splits one packet into header, adaptation field and payload.
    ///
    /// An adaptation field that fills the rest of the packet leaves no
    /// payload.
    pub fn parse_packet<'a>(&self, data: &'a [u8], offset: u64) -> Result<TSPacket<'a>> {
        let header = self.parse_header(data, offset)?;

        let adaptation_field = if header.adaptation_field_exists {
            Some(self.parse_adaptation_field(data, offset)?)
        } else {
            None
        };

        let payload_start = match &adaptation_field {
            Some(field) => 5 + field.length,
            None => TS_HEADER_SIZE,
        };

        let payload = if header.contains_payload && payload_start < self.packet_size {
            Some(&data[payload_start..self.packet_size])
        } else {
            None
        };

        Ok(TSPacket {
            header,
            adaptation_field,
            payload,
        })
    }
}

// 33-bit base, 6 reserved bits, 9-bit extension
fn read_pcr(data: &[u8]) -> std::result::Result<Pcr, BitsError> {
    let mut reader = BitReader::new(data);
    let base = reader.read_u33()?;
    reader.skip_bits(6)?;
    let extension = reader.read_bits(9)? as u16;
    Ok(Pcr { base, extension })
}

fn packet_error(offset: u64, message: String) -> DemuxError {
    DemuxError::Packet { offset, message }
}
