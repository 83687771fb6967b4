//! Input readers with transparent gzip decompression
//!
//! Authoritative dumps ship as gzip-compressed JSON lines, sometimes as
//! several concatenated gzip members. Compression is detected from the
//! gzip magic bytes rather than the file name.
//!
//! # Example
//!
//! ```rust,no_run
//! use geoforge::file_reader;
//! use std::io::BufRead;
//!
//! let reader = file_reader::open("records-000.json.gz")?;
//! for line in reader.lines() {
//!     println!("{}", line?);
//! }
//! # Ok::<(), std::io::Error>(())
//! ```

use flate2::bufread::MultiGzDecoder;
use std::fs::File;
use std::io::{self, stdin, BufRead, BufReader, Read};
use std::path::Path;

/// Buffer size for input reading (128KB)
const BUFFER_SIZE: usize = 128 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open a file for line reading, decompressing gzip input
///
/// Special case: path "-" reads from stdin.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();

    if path.to_str() == Some("-") {
        return from_reader(stdin());
    }

    from_reader(File::open(path)?)
}

/// Wrap any reader, decompressing if it starts with the gzip magic
pub fn from_reader<R: Read + Send + 'static>(reader: R) -> io::Result<Box<dyn BufRead + Send>> {
    let mut buffered = BufReader::with_capacity(BUFFER_SIZE, reader);
    if buffered.fill_buf()?.starts_with(&GZIP_MAGIC) {
        let decoder = MultiGzDecoder::new(buffered);
        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, decoder)))
    } else {
        Ok(Box::new(buffered))
    }
}
