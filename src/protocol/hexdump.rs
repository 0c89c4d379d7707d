//! Hex and ASCII rendering of raw frame bytes

use std::fmt::Write;

const BYTES_PER_LINE: usize = 16;

/// One line per 16 bytes: offset, hex bytes in groups of four, then the
/// printable ASCII with `.` for everything else.
///
/// ```text
/// [0000]  45 00 00 1c   00 01 00 00   40 11 ...   |E.......@.......|
/// ```
pub fn hexdump(data: &[u8]) -> String {
    let mut out = String::new();
    for (line, chunk) in data.chunks(BYTES_PER_LINE).enumerate() {
        if line > 0 {
            out.push('\n');
        }
        let _ = write!(out, "[{:04x}]  ", line * BYTES_PER_LINE);
        for i in 0..BYTES_PER_LINE {
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, "{b:02x} ");
                }
                None => out.push_str("   "),
            }
            if i % 4 == 3 {
                out.push_str("  ");
            }
        }
        out.push('|');
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push('|');
    }
    out
}
