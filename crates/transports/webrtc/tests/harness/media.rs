//! Synthetic Ogg/Opus media for tests

use audiolink_webrtc::media::{AudioPage, PageSource};
use audiolink_webrtc::{Error, Result};
use bytes::Bytes;
use std::collections::VecDeque;
use std::path::Path;

/// Samples per 20 ms Opus frame at 48 kHz
pub const SAMPLES_PER_PAGE: u64 = 960;

/// In-memory page source
pub struct VecPageSource {
    pages: VecDeque<Result<AudioPage>>,
}

impl VecPageSource {
    /// `count` pages with granules 960, 1920, ...
    pub fn sequential(count: usize) -> Self {
        let pages = (0..count as u64)
            .map(|i| {
                Ok(AudioPage {
                    payload: Bytes::from(vec![(i % 256) as u8; 8]),
                    granule: (i + 1) * SAMPLES_PER_PAGE,
                })
            })
            .collect();
        Self { pages }
    }

    /// `count` good pages followed by a decode error
    pub fn failing_after(count: usize) -> Self {
        let mut source = Self::sequential(count);
        source
            .pages
            .push_back(Err(Error::DecodeError("page checksum mismatch".to_string())));
        source
    }
}

impl PageSource for VecPageSource {
    fn next_page(&mut self) -> Result<Option<AudioPage>> {
        self.pages.pop_front().transpose()
    }
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for b in data {
        crc ^= (*b as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04c1_1db7
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn page(header_type: u8, granule: u64, sequence: u32, payload: &[u8]) -> Vec<u8> {
    let mut segments = vec![255u8; payload.len() / 255];
    segments.push((payload.len() % 255) as u8);

    let mut out = Vec::new();
    out.extend_from_slice(b"OggS");
    out.push(0);
    out.push(header_type);
    out.extend_from_slice(&granule.to_le_bytes());
    out.extend_from_slice(&0x5eed_u32.to_le_bytes());
    out.extend_from_slice(&sequence.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.push(segments.len() as u8);
    out.extend_from_slice(&segments);
    out.extend_from_slice(payload);

    let crc = crc32(&out);
    out[22..26].copy_from_slice(&crc.to_le_bytes());
    out
}

/// Ogg/Opus stream with an `OpusHead` page and `pages` audio pages
pub fn ogg_stream(pages: usize) -> Vec<u8> {
    let mut head = Vec::new();
    head.extend_from_slice(b"OpusHead");
    head.push(1);
    head.push(2);
    head.extend_from_slice(&312u16.to_le_bytes());
    head.extend_from_slice(&48000u32.to_le_bytes());
    head.extend_from_slice(&0u16.to_le_bytes());
    head.push(0);

    let mut data = page(0x02, 0, 0, &head);
    for i in 0..pages {
        let granule = (i as u64 + 1) * SAMPLES_PER_PAGE;
        data.extend(page(0, granule, i as u32 + 1, &[0xf8, 0xff, 0xfe, i as u8]));
    }
    data
}

/// Write an Ogg/Opus file with `pages` audio pages
pub fn write_ogg_file(path: &Path, pages: usize) {
    std::fs::write(path, ogg_stream(pages)).expect("write ogg fixture");
}
