//! Variable-width LZW as used by GIF image data
//!
//! Codes start one bit wider than the minimum code size, grow as the
//! dictionary fills, and top out at 12 bits. A full dictionary is reset by
//! emitting a clear code.

use std::collections::HashMap;
use std::io::{self, Write};

use crate::error::{ReelcapError, Result};

/// Widest code GIF allows
pub const MAX_CODE_BITS: u8 = 12;
const MAX_CODES: u16 = 1 << MAX_CODE_BITS;

/// Largest data sub-block
pub const MAX_SUB_BLOCK: usize = 255;

/// Minimum code size for a palette of `2^depth` entries (GIF requires at
/// least 2)
pub fn min_code_size(depth: u8) -> u8 {
    depth.clamp(2, 8)
}

/// LSB-first bit packer
#[derive(Default)]
struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    bits: u8,
}

impl BitWriter {
    fn write(&mut self, code: u16, width: u8) {
        self.acc |= (code as u32) << self.bits;
        self.bits += width;
        while self.bits >= 8 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.bits -= 8;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.bits > 0 {
            self.out.push(self.acc as u8);
        }
        self.out
    }
}

/// Compress palette indices into a raw code stream (not yet split into
/// sub-blocks).
///
/// Every index must be below `1 << min_code_size`.
pub fn compress(indices: &[u8], min_code_size: u8) -> Vec<u8> {
    let clear = 1u16 << min_code_size;
    let end = clear + 1;
    let first_free = clear + 2;

    let mut out = BitWriter::default();
    let mut width = min_code_size + 1;
    out.write(clear, width);

    let Some((&first, rest)) = indices.split_first() else {
        out.write(end, width);
        return out.finish();
    };

    // (prefix code, next index) -> code
    let mut dict: HashMap<u32, u16> = HashMap::with_capacity(MAX_CODES as usize);
    let mut next_code = first_free;
    let mut prefix = first as u16;

    for &k in rest {
        let key = ((prefix as u32) << 8) | k as u32;
        if let Some(&code) = dict.get(&key) {
            prefix = code;
            continue;
        }

        out.write(prefix, width);
        if next_code < MAX_CODES {
            dict.insert(key, next_code);
            next_code += 1;
            if next_code > (1 << width) && width < MAX_CODE_BITS {
                width += 1;
            }
        } else {
            out.write(clear, width);
            dict.clear();
            width = min_code_size + 1;
            next_code = first_free;
        }
        prefix = k as u16;
    }

    out.write(prefix, width);
    out.write(end, width);
    out.finish()
}

/// Write `data` as length-prefixed sub-blocks followed by the empty
/// terminator block
pub fn write_sub_blocks<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    for block in data.chunks(MAX_SUB_BLOCK) {
        writer.write_all(&[block.len() as u8])?;
        writer.write_all(block)?;
    }
    writer.write_all(&[0])
}

/// Join sub-blocks starting at `data[0]`. Returns the payload and the
/// number of bytes consumed including the terminator.
pub fn read_sub_blocks(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut payload = Vec::new();
    let mut pos = 0;
    loop {
        let len = *data
            .get(pos)
            .ok_or_else(|| ReelcapError::gif("sub-block chain is truncated"))? as usize;
        pos += 1;
        if len == 0 {
            return Ok((payload, pos));
        }
        let block = data
            .get(pos..pos + len)
            .ok_or_else(|| ReelcapError::gif("sub-block is truncated"))?;
        payload.extend_from_slice(block);
        pos += len;
    }
}

/// Expand a raw code stream back into palette indices
pub fn decompress(data: &[u8], min_code_size: u8) -> Result<Vec<u8>> {
    let clear = 1usize << min_code_size;
    let end = clear + 1;

    let reset = || -> Vec<Vec<u8>> {
        let mut table: Vec<Vec<u8>> = (0..clear).map(|i| vec![i as u8]).collect();
        table.push(Vec::new());
        table.push(Vec::new());
        table
    };

    let mut table = reset();
    let mut width = min_code_size + 1;
    let mut previous: Option<Vec<u8>> = None;
    let mut out = Vec::new();

    let mut acc: u32 = 0;
    let mut bits: u8 = 0;
    let mut bytes = data.iter();

    loop {
        while bits < width {
            let Some(&byte) = bytes.next() else {
                return Err(ReelcapError::gif("code stream ended without end code"));
            };
            acc |= (byte as u32) << bits;
            bits += 8;
        }
        let code = (acc & ((1 << width) - 1)) as usize;
        acc >>= width;
        bits -= width;

        if code == clear {
            table = reset();
            width = min_code_size + 1;
            previous = None;
            continue;
        }
        if code == end {
            return Ok(out);
        }

        let entry = match (table.get(code), &previous) {
            (Some(entry), _) => entry.clone(),
            (None, Some(prev)) if code == table.len() => {
                let mut entry = prev.clone();
                entry.push(prev[0]);
                entry
            }
            _ => return Err(ReelcapError::gif(format!("invalid code {}", code))),
        };
        out.extend_from_slice(&entry);

        if let Some(mut prev) = previous.take() {
            if table.len() < MAX_CODES as usize {
                prev.push(entry[0]);
                table.push(prev);
            }
        }
        if table.len() == (1 << width) && width < MAX_CODE_BITS {
            width += 1;
        }
        previous = Some(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_small_alphabet() {
        let indices: Vec<u8> = (0..5000u32).map(|i| ((i * 7 + i / 13) % 4) as u8).collect();
        let encoded = compress(&indices, 2);
        assert!(encoded.len() < indices.len());
        assert_eq!(decompress(&encoded, 2).unwrap(), indices);
    }

    #[test]
    fn test_round_trip_forces_table_reset() {
        // Pseudo-random bytes fill the 4096-entry table several times
        let mut state = 0x2545_f491u32;
        let indices: Vec<u8> = (0..60_000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        let encoded = compress(&indices, 8);
        assert_eq!(decompress(&encoded, 8).unwrap(), indices);
    }

    #[test]
    fn test_kwkwk_case() {
        let indices = [1u8, 1, 1, 1, 1, 1, 1, 0, 1, 1, 1];
        let encoded = compress(&indices, 2);
        assert_eq!(decompress(&encoded, 2).unwrap(), indices);
    }

    #[test]
    fn test_empty_input() {
        let encoded = compress(&[], 8);
        assert!(decompress(&encoded, 8).unwrap().is_empty());
    }

    #[test]
    fn test_sub_blocks() {
        let data: Vec<u8> = (0..600u32).map(|i| i as u8).collect();
        let mut framed = Vec::new();
        write_sub_blocks(&mut framed, &data).unwrap();

        // 255 + 255 + 90, each with a length byte, plus the terminator
        assert_eq!(framed.len(), 600 + 3 + 1);
        assert_eq!(framed[0], 255);
        assert_eq!(framed[256], 255);
        assert_eq!(framed[512], 90);
        assert_eq!(*framed.last().unwrap(), 0);

        let (payload, used) = read_sub_blocks(&framed).unwrap();
        assert_eq!(payload, data);
        assert_eq!(used, framed.len());
    }

    #[test]
    fn test_min_code_size() {
        assert_eq!(min_code_size(1), 2);
        assert_eq!(min_code_size(8), 8);
    }
}
