//! Ogg/Opus page source
//!
//! Wraps the webrtc media crate's `OggReader`, which validates the leading
//! `OpusHead` page and every page checksum. Each page's payload is forwarded
//! as one RTP payload, so segments are not reassembled into packets.
//!
//! `OggReader` reports a stream that ends on a page boundary the same way as
//! one cut off mid-page. [`OggPageReader`] counts the bytes it hands out to
//! tell the two apart: a clean end consumed nothing of the next page.

use crate::{Error, Result};
use bytes::Bytes;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use webrtc::media::io::ogg_reader::OggReader;

pub use webrtc::media::io::ogg_reader::OggHeader;

/// One audio page ready to be packetized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPage {
    /// Concatenated segment data of the page
    pub payload: Bytes,
    /// Granule position from the page header
    pub granule: u64,
}

/// Source of audio pages in file order
pub trait PageSource: Send {
    /// Next page, or `None` at a clean end of stream
    fn next_page(&mut self) -> Result<Option<AudioPage>>;
}

/// Read position shared between [`CountingReader`] and its owner
#[derive(Debug, Default)]
struct ReadProgress {
    consumed: AtomicU64,
    eof: AtomicBool,
}

/// Reader that records how many bytes went through it
struct CountingReader<R> {
    inner: R,
    progress: Arc<ReadProgress>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.progress.eof.store(true, Ordering::Release);
        }
        self.progress.consumed.fetch_add(n as u64, Ordering::AcqRel);
        Ok(n)
    }
}

/// Page-by-page Ogg/Opus reader
pub struct OggPageReader<R: Read> {
    reader: OggReader<CountingReader<R>>,
    header: OggHeader,
    progress: Arc<ReadProgress>,
}

impl OggPageReader<BufReader<File>> {
    /// Open an Ogg/Opus file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::AudioUnavailable(path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> OggPageReader<R> {
    /// Wrap a reader and consume the identification header page
    pub fn new(reader: R) -> Result<Self> {
        let progress = Arc::new(ReadProgress::default());
        let counting = CountingReader {
            inner: reader,
            progress: Arc::clone(&progress),
        };

        let (reader, header) = OggReader::new(counting, true)
            .map_err(|e| Error::DecodeError(format!("Invalid Ogg/Opus stream: {}", e)))?;

        debug!(
            "Opened Ogg stream: channels={}, sample_rate={}, pre_skip={}",
            header.channels, header.sample_rate, header.pre_skip
        );

        Ok(Self {
            reader,
            header,
            progress,
        })
    }

    /// Identification header parsed on open
    pub fn header(&self) -> &OggHeader {
        &self.header
    }
}

impl<R: Read + Send> PageSource for OggPageReader<R> {
    fn next_page(&mut self) -> Result<Option<AudioPage>> {
        let start = self.progress.consumed.load(Ordering::Acquire);

        match self.reader.parse_next_page() {
            Ok((payload, page_header)) => Ok(Some(AudioPage {
                payload: payload.freeze(),
                granule: page_header.granule_position,
            })),
            Err(e) => {
                let consumed = self.progress.consumed.load(Ordering::Acquire) - start;
                if consumed == 0 && self.progress.eof.load(Ordering::Acquire) {
                    Ok(None)
                } else {
                    Err(Error::DecodeError(format!("Invalid Ogg page: {}", e)))
                }
            }
        }
    }
}

/// Encode one Ogg page. Used to build fixtures.
#[cfg(test)]
pub(crate) fn encode_page(header_type: u8, granule: u64, sequence: u32, payload: &[u8]) -> Vec<u8> {
    let mut segments = vec![255u8; payload.len() / 255];
    segments.push((payload.len() % 255) as u8);

    let mut page = Vec::new();
    page.extend_from_slice(b"OggS");
    page.push(0);
    page.push(header_type);
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&1u32.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&[0; 4]);
    page.push(segments.len() as u8);
    page.extend_from_slice(&segments);
    page.extend_from_slice(payload);

    // Ogg CRC-32: polynomial 0x04c11db7, no reflection
    let mut crc = 0u32;
    for b in &page {
        crc ^= (*b as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04c1_1db7
            } else {
                crc << 1
            };
        }
    }
    page[22..26].copy_from_slice(&crc.to_le_bytes());
    page
}

#[cfg(test)]
pub(crate) fn opus_head(channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut head = Vec::new();
    head.extend_from_slice(b"OpusHead");
    head.push(1);
    head.push(channels);
    head.extend_from_slice(&312u16.to_le_bytes());
    head.extend_from_slice(&sample_rate.to_le_bytes());
    head.extend_from_slice(&0u16.to_le_bytes());
    head.push(0);
    head
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const BOS: u8 = 0x02;

    fn stream(pages: &[(u64, &[u8])]) -> Vec<u8> {
        let mut data = encode_page(BOS, 0, 0, &opus_head(2, 48000));
        for (i, (granule, payload)) in pages.iter().enumerate() {
            data.extend(encode_page(0, *granule, i as u32 + 1, payload));
        }
        data
    }

    #[test]
    fn test_reads_header_and_pages() {
        let data = stream(&[(960, b"first"), (1920, b"second")]);
        let mut reader = OggPageReader::new(Cursor::new(data)).unwrap();

        assert_eq!(reader.header().channels, 2);
        assert_eq!(reader.header().sample_rate, 48000);
        assert_eq!(reader.header().pre_skip, 312);

        let page = reader.next_page().unwrap().unwrap();
        assert_eq!(page.granule, 960);
        assert_eq!(&page.payload[..], b"first");

        let page = reader.next_page().unwrap().unwrap();
        assert_eq!(page.granule, 1920);
        assert_eq!(&page.payload[..], b"second");

        assert!(reader.next_page().unwrap().is_none());
        assert!(reader.next_page().unwrap().is_none());
    }

    #[test]
    fn test_large_payload_spans_segments() {
        let payload = vec![7u8; 600];
        let data = stream(&[(960, &payload)]);
        let mut reader = OggPageReader::new(Cursor::new(data)).unwrap();

        let page = reader.next_page().unwrap().unwrap();
        assert_eq!(page.payload.len(), 600);
    }

    #[test]
    fn test_checksum_mismatch_is_decode_error() {
        let mut data = stream(&[(960, b"payload")]);
        let last = data.len() - 1;
        data[last] ^= 0xff;

        let mut reader = OggPageReader::new(Cursor::new(data)).unwrap();
        assert!(matches!(reader.next_page(), Err(Error::DecodeError(_))));
    }

    #[test]
    fn test_truncated_page_is_decode_error() {
        let mut data = stream(&[(960, b"payload")]);
        data.truncate(data.len() - 3);

        let mut reader = OggPageReader::new(Cursor::new(data)).unwrap();
        assert!(matches!(reader.next_page(), Err(Error::DecodeError(_))));
    }

    #[test]
    fn test_truncated_page_header_is_decode_error() {
        let mut data = stream(&[]);
        data.extend_from_slice(b"OggS\0");

        let mut reader = OggPageReader::new(Cursor::new(data)).unwrap();
        assert!(matches!(reader.next_page(), Err(Error::DecodeError(_))));
    }

    #[test]
    fn test_missing_opus_head_is_rejected() {
        let data = encode_page(BOS, 0, 0, b"NotOpus-header-bytes");
        assert!(matches!(
            OggPageReader::new(Cursor::new(data)),
            Err(Error::DecodeError(_))
        ));
    }

    #[test]
    fn test_first_page_must_be_bos() {
        let data = encode_page(0, 0, 0, &opus_head(1, 48000));
        assert!(OggPageReader::new(Cursor::new(data)).is_err());
    }

    #[test]
    fn test_empty_stream_is_rejected() {
        assert!(OggPageReader::new(Cursor::new(Vec::new())).is_err());
    }

    #[test]
    fn test_bad_signature_is_rejected() {
        let mut data = stream(&[]);
        data[0] = b'X';
        assert!(OggPageReader::new(Cursor::new(data)).is_err());
    }

    #[test]
    fn test_open_missing_file() {
        let result = OggPageReader::open("/nonexistent/missing.ogg");
        assert!(matches!(result, Err(Error::AudioUnavailable(_))));
    }

    #[test]
    fn test_open_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.ogg");
        std::fs::write(&path, stream(&[(960, b"x")])).unwrap();

        let mut reader = OggPageReader::open(&path).unwrap();
        assert!(reader.next_page().unwrap().is_some());
        assert!(reader.next_page().unwrap().is_none());
    }
}
