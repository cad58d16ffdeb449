use super::types::*;
use crate::error::{DemuxError, Result};
use crate::utils::{BitReader, BitsError, Crc32Mpeg2};
use bytes::{BufMut, BytesMut};

const CRC_SIZE: usize = 4;
// pointer_field, table_id and the 16 bits holding the section length
const SECTION_PREFIX_SIZE: usize = 4;
// table_id_extension, version/current_next, section_number, last_section_number
const SYNTAX_PROLOGUE_SIZE: usize = 5;

/// Parser for the PAT and PMT sections that open a payload unit.
///
/// The payload is expected to start with a zero pointer field, so the section
/// header sits at bytes 1..4.
#[derive(Debug, Clone, Copy, Default)]
pub struct PsiParser {
    verify_crc: bool,
}

impl PsiParser {
    pub fn new(verify_crc: bool) -> Self {
        Self { verify_crc }
    }

    /// Parses a PAT section. `offset` locates the carrying packet for error
    /// reports.
    ///
    /// Entries are read while the running section number is below
    /// `last_section_number`, so a single-section PAT yields its first entry
    /// only.
    pub fn parse_pat(&self, payload: &[u8], offset: u64) -> Result<PAT> {
        let (section_syntax, body) = self.parse_section(payload, TABLE_ID_PAT, "PAT", offset)?;
        let mut pat = PAT::new();

        if !section_syntax || body.len() <= SYNTAX_PROLOGUE_SIZE {
            return Ok(pat);
        }

        let mut section_number = body[3];
        let last_section_number = body[4];
        let mut rest = &body[SYNTAX_PROLOGUE_SIZE..];

        while rest.len() >= 4 {
            pat.entries.push(PATEntry {
                program_number: u16::from_be_bytes([rest[0], rest[1]]),
                program_map_pid: read_pid(rest[2], rest[3]),
            });

            if section_number >= last_section_number {
                break;
            }
            rest = &rest[4..];
            section_number += 1;
        }

        Ok(pat)
    }

    /// Parses a PMT section.
    ///
    /// An elementary stream entry whose ES info runs past the section is
    /// still reported, and ends the walk.
    pub fn parse_pmt(&self, payload: &[u8], offset: u64) -> Result<PMT> {
        let (section_syntax, body) = self.parse_section(payload, TABLE_ID_PMT, "PMT", offset)?;
        let mut pmt = PMT::new();

        if !section_syntax || body.len() <= SYNTAX_PROLOGUE_SIZE {
            return Ok(pmt);
        }

        let mut section_number = body[3];
        let last_section_number = body[4];
        let mut rest = &body[SYNTAX_PROLOGUE_SIZE..];
        let mut pcr_pid = None;

        'sections: while rest.len() >= 4 {
            pcr_pid.get_or_insert(read_pid(rest[0], rest[1]));
            let program_info_length = read_length(rest[2], rest[3]);

            if rest.len() < 4 + program_info_length {
                break;
            }
            rest = &rest[4 + program_info_length..];

            while rest.len() >= 5 {
                let es_info_length = read_length(rest[3], rest[4]);
                pmt.elementary_stream_infos.push(ElementaryStreamInfo {
                    stream_type: rest[0],
                    elementary_pid: read_pid(rest[1], rest[2]),
                });

                if rest.len() < 5 + es_info_length {
                    break 'sections;
                }
                rest = &rest[5 + es_info_length..];
            }

            if section_number >= last_section_number {
                break;
            }
            section_number += 1;
        }

        pmt.pcr_pid = pcr_pid.unwrap_or(PID_NULL);
        Ok(pmt)
    }

    /// Validates the section header and returns the section syntax flag with
    /// the section body (after the 3-byte header, before the CRC).
    ///
    /// The section must end exactly where the payload ends.
    pub fn parse_section<'a>(
        &self,
        payload: &'a [u8],
        expected_table_id: u8,
        table_name: &str,
        offset: u64,
    ) -> Result<(bool, &'a [u8])> {
        let bad_header = || {
            let shown: Vec<String> = payload.iter().take(3).map(|b| format!("{:02X}", b)).collect();
            DemuxError::Psi {
                offset,
                message: format!(
                    "Incorrect table header for {} ({})",
                    table_name,
                    shown.join(" ")
                ),
            }
        };

        if payload.len() < SECTION_PREFIX_SIZE {
            return Err(bad_header());
        }

        let table_id = payload[1];
        let (section_syntax, private_bit, reserved, section_length) =
            read_length_fields(&payload[2..4]).map_err(|_| bad_header())?;

        let section_end = SECTION_PREFIX_SIZE + section_length;
        if private_bit
            || table_id != expected_table_id
            || reserved != 0b11
            || section_length < CRC_SIZE
            || section_end != payload.len()
        {
            return Err(bad_header());
        }

        if self.verify_crc && !Crc32Mpeg2::verify(&payload[1..section_end]) {
            return Err(DemuxError::Psi {
                offset,
                message: format!("CRC mismatch in {} section", table_name),
            });
        }

        Ok((section_syntax, &payload[SECTION_PREFIX_SIZE..section_end - CRC_SIZE]))
    }
}

// section_syntax_indicator, private bit, 2 reserved bits, 12-bit section_length
fn read_length_fields(data: &[u8]) -> std::result::Result<(bool, bool, u32, usize), BitsError> {
    let mut reader = BitReader::new(data);
    Ok((
        reader.read_bit()?,
        reader.read_bit()?,
        reader.read_bits(2)?,
        reader.read_bits(12)? as usize,
    ))
}

fn read_pid(high: u8, low: u8) -> u16 {
    ((high as u16 & 0x1F) << 8) | low as u16
}

fn read_length(high: u8, low: u8) -> usize {
    ((high as usize & 0x0F) << 8) | low as usize
}

/// Writes a single-section PSI payload: zero pointer field, long-form
/// section header, `body` and its CRC-32.
pub fn write_section(buf: &mut BytesMut, table_id: u8, table_id_extension: u16, body: &[u8]) {
    let section_length = SYNTAX_PROLOGUE_SIZE + body.len() + CRC_SIZE;
    let start = buf.len() + 1;

    buf.put_u8(0x00); // pointer field
    buf.put_u8(table_id);
    buf.put_u16(0xB000 | (section_length as u16 & 0x0FFF));
    buf.put_u16(table_id_extension);
    buf.put_u8(0xC1); // version 0, current
    buf.put_u8(0x00); // section_number
    buf.put_u8(0x00); // last_section_number
    buf.put_slice(body);

    let crc = Crc32Mpeg2::calculate(&buf[start..]);
    buf.put_u32(crc);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn pat_payload(entries: &[(u16, u16)]) -> BytesMut {
        let pat = PAT {
            entries: entries
                .iter()
                .map(|&(program_number, program_map_pid)| PATEntry {
                    program_number,
                    program_map_pid,
                })
                .collect(),
        };
        let mut body = BytesMut::new();
        pat.write_to(&mut body);
        let mut buf = BytesMut::new();
        write_section(&mut buf, TABLE_ID_PAT, 1, &body);
        buf
    }

    fn pmt_payload(pmt: &PMT) -> BytesMut {
        let mut body = BytesMut::new();
        pmt.write_to(&mut body);
        let mut buf = BytesMut::new();
        write_section(&mut buf, TABLE_ID_PMT, 1, &body);
        buf
    }

    #[test]
    fn test_parse_pat() {
        let payload = pat_payload(&[(1, 0x1000)]);
        let pat = PsiParser::new(true).parse_pat(&payload, 0).unwrap();
        assert_eq!(
            pat.entries,
            vec![PATEntry {
                program_number: 1,
                program_map_pid: 0x1000
            }]
        );
    }

    #[test]
    fn test_single_section_pat_reads_first_entry_only() {
        let payload = pat_payload(&[(1, 0x1000), (2, 0x1100)]);
        let pat = PsiParser::default().parse_pat(&payload, 0).unwrap();
        assert_eq!(pat.entries.len(), 1);
        assert_eq!(pat.entries[0].program_map_pid, 0x1000);
    }

    #[test]
    fn test_pat_walks_up_to_last_section_number() {
        let mut payload = pat_payload(&[(1, 0x1000), (2, 0x1100), (3, 0x1200)]);
        payload[8] = 1; // last_section_number
        let pat = PsiParser::default().parse_pat(&payload, 0).unwrap();
        assert_eq!(pat.entries.len(), 2);
        assert_eq!(pat.entries[1].program_map_pid, 0x1100);
    }

    #[test]
    fn test_parse_pmt() {
        let pmt = PMT {
            pcr_pid: 0x0101,
            elementary_stream_infos: vec![
                ElementaryStreamInfo {
                    stream_type: STREAM_TYPE_H264,
                    elementary_pid: 0x0101,
                },
                ElementaryStreamInfo {
                    stream_type: 0x06,
                    elementary_pid: 0x0103,
                },
                ElementaryStreamInfo {
                    stream_type: STREAM_TYPE_AAC,
                    elementary_pid: 0x0102,
                },
            ],
        };
        let payload = pmt_payload(&pmt);
        assert_eq!(PsiParser::new(true).parse_pmt(&payload, 0).unwrap(), pmt);
    }

    #[test]
    fn test_pmt_skips_descriptors() {
        let body = [
            0xE1, 0x00, // PCR PID 0x100
            0xF0, 0x03, 0x0A, 0x01, 0x00, // program info with one descriptor
            0x1B, 0xE1, 0x00, 0xF0, 0x02, 0x52, 0x00, // H.264 with stream_identifier
            0x0F, 0xE1, 0x01, 0xF0, 0x00, // AAC
        ];
        let mut payload = BytesMut::new();
        write_section(&mut payload, TABLE_ID_PMT, 1, &body);

        let pmt = PsiParser::new(true).parse_pmt(&payload, 0).unwrap();
        assert_eq!(pmt.pcr_pid, 0x100);
        let pids: Vec<u16> = pmt
            .elementary_stream_infos
            .iter()
            .map(|info| info.elementary_pid)
            .collect();
        assert_eq!(pids, vec![0x100, 0x101]);
    }

    #[test]
    fn test_pmt_truncated_entry_stops_walk() {
        let body = [
            0xE1, 0x00, 0xF0, 0x00, // PCR PID, no program info
            0x1B, 0xE1, 0x00, 0xF0, 0x00, // H.264
            0x0F, 0xE1, 0x01, 0xF0, 0x20, // AAC claiming 32 bytes of ES info
            0x00, 0x00,
        ];
        let mut payload = BytesMut::new();
        write_section(&mut payload, TABLE_ID_PMT, 1, &body);

        let pmt = PsiParser::default().parse_pmt(&payload, 0).unwrap();
        assert_eq!(pmt.elementary_stream_infos.len(), 2);
        assert_eq!(pmt.elementary_stream_infos[1].stream_type, STREAM_TYPE_AAC);
    }

    #[test]
    fn test_section_must_fill_payload() {
        let mut payload = pat_payload(&[(1, 0x1000)]);
        assert_eq!(payload.len(), 17);
        payload.resize(184, 0xFF);

        let err = PsiParser::new(true).parse_pat(&payload, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Psi);
        assert!(PsiParser::default().parse_pat(&payload[..17], 0).is_ok());
    }

    #[test]
    fn test_bad_headers_rejected() {
        let parser = PsiParser::default();
        let good = pat_payload(&[(1, 0x1000)]);

        let mut wrong_table = good.clone();
        wrong_table[1] = TABLE_ID_PMT;
        let err = parser.parse_pat(&wrong_table, 188).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Psi);
        assert!(err.to_string().contains("(00 02 B0)"));

        let mut private = good.clone();
        private[2] |= 0x40;
        assert!(parser.parse_pat(&private, 0).is_err());

        let mut reserved = good.clone();
        reserved[2] &= !0x30;
        assert!(parser.parse_pat(&reserved, 0).is_err());

        let mut too_long = good.clone();
        too_long[3] += 1;
        assert!(parser.parse_pat(&too_long, 0).is_err());

        let mut too_short = good.clone();
        too_short[2] = 0xB0;
        too_short[3] = 0x03;
        assert!(parser.parse_pat(&too_short, 0).is_err());

        let mut trailing_garbage = good.clone();
        trailing_garbage.put_u8(0x00);
        assert!(parser.parse_pat(&trailing_garbage, 0).is_err());

        assert!(parser.parse_pat(&good[..3], 0).is_err());
        assert!(parser.parse_pmt(&good, 0).is_err());
    }

    #[test]
    fn test_crc_checked_only_when_enabled() {
        let mut payload = pat_payload(&[(1, 0x1000)]);
        let last = payload.len() - 1;
        payload[last] ^= 0xFF;

        assert!(PsiParser::new(false).parse_pat(&payload, 0).is_ok());
        let err = PsiParser::new(true).parse_pat(&payload, 0).unwrap_err();
        assert!(err.to_string().contains("CRC mismatch"));
    }
}
