//! Single-byte I/O helpers shared by the standard streams and network links.

use std::io;

/// Reads one byte through `read`, retrying on interruption.
///
/// A zero-length read is end of stream and yields `None`; the buffer is only
/// indexed after a read reports at least one byte.
pub fn read_one(mut read: impl FnMut(&mut [u8]) -> io::Result<usize>) -> io::Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
