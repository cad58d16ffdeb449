//! # Utility Functions and Types
//!
//! Bit-level field reading for MPEG-2 system headers and the CRC-32/MPEG-2
//! checksum carried by PSI sections.
//!
//! ```rust
//! use tsdemux::utils::BitReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = vec![0b10110011u8];
//! let mut reader = BitReader::new(&data);
//!
//! // Read specific number of bits
//! let value = reader.read_bits(3)?; // Reads first 3 bits (101)
//! assert_eq!(value, 0b101);
//! # Ok(())
//! # }
//! ```

/// Bit manipulation and bitstream reading utilities
pub mod bits;

/// CRC calculation implementations
pub mod crc;

pub use bits::{BitReader, BitsError};
pub use crc::Crc32Mpeg2;
