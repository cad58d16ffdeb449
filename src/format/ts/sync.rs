use super::types::*;
use crate::error::{DemuxError, Result};
use std::io::{Read, Seek, SeekFrom};

/// Packet framing found at the start of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncInfo {
    /// Byte offset of the first sync byte.
    pub offset: usize,
    /// Detected packet size: 188, 192 or 204.
    pub packet_size: usize,
}

/// Finds the first offset in `[0, 204)` from which a sync byte recurs at a
/// fixed legal stride through the whole of `probe`.
///
/// For each candidate offset the sizes 188, 192 and 204 are tried in that
/// order. A size only qualifies if at least one further sync byte falls
/// inside the probe window.
pub fn detect(probe: &[u8]) -> Result<SyncInfo> {
    let candidates = probe.len().min(TS_PACKET_SIZE_MAX);

    for offset in (0..candidates).filter(|&i| probe[i] == TS_SYNC_BYTE) {
        let size = TS_PACKET_SIZES
            .iter()
            .copied()
            .find(|&size| is_consistent(probe, offset, size));

        if let Some(packet_size) = size {
            return Ok(SyncInfo {
                offset,
                packet_size,
            });
        }
    }

    Err(DemuxError::Sync(format!(
        "no consistent packet size found in the first {} bytes",
        probe.len()
    )))
}

fn is_consistent(probe: &[u8], offset: usize, size: usize) -> bool {
    let mut positions = (offset + size..probe.len()).step_by(size).peekable();
    positions.peek().is_some() && positions.all(|pos| probe[pos] == TS_SYNC_BYTE)
}

/// Reads up to `probe_len` bytes from the start of `reader`, detects the
/// framing and leaves the reader positioned on the first sync byte.
/// Input shorter than `probe_len` is detected on what is there, so two
/// whole packets are enough.
pub fn synchronize<R: Read + Seek>(reader: &mut R, probe_len: usize) -> Result<SyncInfo> {
    reader.seek(SeekFrom::Start(0))?;

    let mut probe = Vec::with_capacity(probe_len);
    reader.by_ref().take(probe_len as u64).read_to_end(&mut probe)?;

    let info = detect(&probe)?;
    reader.seek(SeekFrom::Start(info.offset as u64))?;
    Ok(info)
}
