//! Compression algorithms.
//!
//! The SSH protocol can compress packet payloads before they are encrypted (RFC 4253, section
//! 6.2). The zlib streams are stateful: one deflate stream per direction lives for the whole
//! connection and every packet ends with a partial flush.
//!
//! # Supported algorithms
//!
//! - "none" ([`NONE`])
//! - "zlib" ([`ZLIB`])
//! - "zlib@openssh.com" ([`ZLIB_OPENSSH`], compression starts only after the user has
//! authenticated)
use flate2::{Compress as ZlibDeflate, Decompress as ZlibInflate};
use flate2::{Compression, FlushCompress, FlushDecompress, Status};
use crate::error::{Error, Result};

/// Algorithm for compressing and decompressing payloads.
///
/// See the [module documentation][self] for details.
#[derive(Debug)]
pub struct CompressAlgo {
    /// Name of the algorithm.
    pub name: &'static str,
    /// Compression starts only after authentication (`@openssh.com` delayed compression).
    pub(crate) delayed: bool,
    pub(crate) make_compress: fn() -> Option<Box<dyn Compress + Send>>,
    pub(crate) make_decompress: fn() -> Option<Box<dyn Decompress + Send>>,
}

pub(crate) trait Compress {
    fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>>;
}

pub(crate) trait Decompress {
    fn decompress(&mut self, data: &[u8], len_max: usize) -> Result<Vec<u8>>;
}

/// "none" compression (payloads are passed through unchanged).
pub static NONE: CompressAlgo = CompressAlgo {
    name: "none",
    delayed: false,
    make_compress: || None,
    make_decompress: || None,
};

/// "zlib" compression from RFC 4253.
pub static ZLIB: CompressAlgo = CompressAlgo {
    name: "zlib",
    delayed: false,
    make_compress: || Some(Box::new(ZlibCompress::new())),
    make_decompress: || Some(Box::new(ZlibDecompress::new())),
};

/// "zlib@openssh.com" delayed compression as introduced by OpenSSH.
///
/// Same as ["zlib"][ZLIB], but the streams start only after `SSH_MSG_USERAUTH_SUCCESS`, so that
/// no attacker-controlled data is compressed before authentication.
pub static ZLIB_OPENSSH: CompressAlgo = CompressAlgo {
    name: "zlib@openssh.com",
    delayed: true,
    make_compress: || Some(Box::new(ZlibCompress::new())),
    make_decompress: || Some(Box::new(ZlibDecompress::new())),
};


struct ZlibCompress {
    stream: ZlibDeflate,
}

impl ZlibCompress {
    fn new() -> ZlibCompress {
        ZlibCompress { stream: ZlibDeflate::new(Compression::default(), true) }
    }
}

impl Compress for ZlibCompress {
    fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        // RFC 4253, section 6.2: each packet ends with a partial flush, so the peer can decode
        // it without waiting for more data
        let mut out = Vec::with_capacity(data.len() / 2 + 64);
        let mut pos = 0;
        loop {
            if out.len() == out.capacity() {
                out.reserve(4096);
            }

            let in_before = self.stream.total_in();
            let status = self.stream
                .compress_vec(&data[pos..], &mut out, FlushCompress::Partial)
                .map_err(|_| Error::Compress("zlib deflate failed"))?;
            pos += (self.stream.total_in() - in_before) as usize;

            match status {
                Status::Ok | Status::BufError => {
                    if pos == data.len() && out.len() < out.capacity() {
                        return Ok(out)
                    }
                },
                Status::StreamEnd => return Ok(out),
            }
        }
    }
}

struct ZlibDecompress {
    stream: ZlibInflate,
}

impl ZlibDecompress {
    fn new() -> ZlibDecompress {
        ZlibDecompress { stream: ZlibInflate::new(true) }
    }
}

impl Decompress for ZlibDecompress {
    fn decompress(&mut self, data: &[u8], len_max: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(usize::min(2 * data.len() + 64, len_max));
        let mut pos = 0;
        loop {
            if out.len() == out.capacity() {
                if out.len() >= len_max {
                    return Err(Error::Compress("decompressed payload is too long"))
                }
                out.reserve(usize::min(4096, len_max - out.len()));
            }

            let in_before = self.stream.total_in();
            let status = self.stream
                .decompress_vec(&data[pos..], &mut out, FlushDecompress::None)
                .map_err(|_| Error::Compress("zlib inflate failed"))?;
            pos += (self.stream.total_in() - in_before) as usize;

            match status {
                Status::Ok | Status::BufError => {
                    if pos == data.len() && out.len() < out.capacity() {
                        return Ok(out)
                    }
                },
                Status::StreamEnd => return Ok(out),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zlib_roundtrip() {
        let mut compress = ZlibCompress::new();
        let mut decompress = ZlibDecompress::new();

        // the streams are stateful, packets must decompress in order
        let payloads: &[&[u8]] = &[
            b"hello world",
            b"",
            b"hello world, again",
            &[0x55; 4000],
        ];

        for payload in payloads {
            let compressed = compress.compress(payload).unwrap();
            let decompressed = decompress.decompress(&compressed, 32768).unwrap();
            assert_eq!(&decompressed, payload);
        }
    }

    #[test]
    fn test_zlib_len_max() {
        let mut compress = ZlibCompress::new();
        let mut decompress = ZlibDecompress::new();

        let compressed = compress.compress(&[0x55; 4000]).unwrap();
        assert!(decompress.decompress(&compressed, 1000).is_err());
    }

    #[test]
    fn test_none_makes_nothing() {
        assert!((NONE.make_compress)().is_none());
        assert!((NONE.make_decompress)().is_none());
    }
}
