use std::io::{self, BufRead, Read};

use flate2::bufread::{DeflateDecoder, ZlibDecoder};
use log::debug;
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::{
    errors::{unsupported_err, Result},
    parsing_reader::BufReadParsing,
};

/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-9.3>
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CompressionAlgorithm {
    Uncompressed = 0,
    ZIP = 1,
    ZLIB = 2,
    BZip2 = 3,

    #[num_enum(catch_all)]
    Other(u8),
}

/// Streams the decompressed contents of a compressed data packet body.
#[derive(derive_more::Debug)]
pub enum Decompressor<R: BufRead> {
    Uncompressed(#[debug(skip)] R),
    Zip(#[debug(skip)] DeflateDecoder<R>),
    Zlib(#[debug(skip)] ZlibDecoder<R>),
}

impl<R: BufRead> Decompressor<R> {
    /// Reads the algorithm octet from `source` and sets up decompression of the rest.
    pub fn from_reader(mut source: R) -> Result<Self> {
        let alg = CompressionAlgorithm::from(source.read_u8()?);
        debug!("compressed data, {:?}", alg);

        match alg {
            CompressionAlgorithm::Uncompressed => Ok(Self::Uncompressed(source)),
            CompressionAlgorithm::ZIP => Ok(Self::Zip(DeflateDecoder::new(source))),
            CompressionAlgorithm::ZLIB => Ok(Self::Zlib(ZlibDecoder::new(source))),
            CompressionAlgorithm::BZip2 | CompressionAlgorithm::Other(_) => {
                unsupported_err!("compression algorithm {:?}", alg)
            }
        }
    }
}

impl<R: BufRead> Decompressor<R> {
    /// The compressed source.
    pub fn get_mut(&mut self) -> &mut R {
        match self {
            Self::Uncompressed(r) => r,
            Self::Zip(r) => r.get_mut(),
            Self::Zlib(r) => r.get_mut(),
        }
    }
}

impl<R: BufRead> Read for Decompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Uncompressed(r) => r.read(buf),
            Self::Zip(r) => r.read(buf),
            Self::Zlib(r) => r.read(buf),
        }
    }
}
