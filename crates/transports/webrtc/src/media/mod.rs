//! Audio media: Ogg page reading, RTP packetizing and header-extension metadata

pub mod extension;
pub mod ogg;
pub mod packetizer;
pub mod receiver;

pub use extension::{extract_metadata, resolve_extension_id, ExtensionBinding, UNRESOLVED};
pub use ogg::{AudioPage, OggHeader, OggPageReader, PageSource};
pub use packetizer::{build_packet, Packetizer, PacketizerConfig};
pub use receiver::run_track_reader;
