//! CRC-32/MPEG-2 as carried at the end of every PSI section
//! (ITU-T H.222.0 / ISO/IEC 13818-1 Annex A).

const CRC32_MPEG2_POLY: u32 = 0x04C11DB7;

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ CRC32_MPEG2_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC32_MPEG2_TABLE: [u32; 256] = build_table();

/// MPEG-2 CRC32 calculator used for PSI section validation.
///
/// Initial value `0xFFFFFFFF`, no reflection, no final XOR.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32Mpeg2;

impl Crc32Mpeg2 {
    /// Calculates the checksum of `data`.
    ///
    /// ```
    /// use tsdemux::utils::Crc32Mpeg2;
    ///
    /// assert_eq!(Crc32Mpeg2::calculate(&[0x01, 0x01]), 0xD66FB816);
    /// ```
    pub fn calculate(data: &[u8]) -> u32 {
        data.iter().fold(0xFFFF_FFFF, |crc, &byte| {
            let index = ((crc >> 24) ^ byte as u32) & 0xFF;
            (crc << 8) ^ CRC32_MPEG2_TABLE[index as usize]
        })
    }

    /// Checks a complete section whose last four bytes hold its CRC.
    ///
    /// Running the CRC over data plus its own checksum yields zero.
    pub fn verify(section_with_crc: &[u8]) -> bool {
        section_with_crc.len() >= 4 && Self::calculate(section_with_crc) == 0
    }
}
