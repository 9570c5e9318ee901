use std::path::Path;

use crate::{packet::RawPacket, stream::AvStream};

/// Demuxer over one input container. Streams are enumerated in container
/// order at open time; `read_packet` walks the interleaved packets until
/// end of stream.
pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    streams: Vec<AvStream>,
}

impl AvInput {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let input = ffmpeg_next::format::input(path)
            .map_err(|e| anyhow::anyhow!("cannot open input {}: {}", path.display(), e))?;

        let streams: Vec<AvStream> = input.streams().map(AvStream::from).collect();
        log::debug!(
            "opened {}: {} streams, format {}",
            path.display(),
            streams.len(),
            input.format().name()
        );

        Ok(Self {
            inner: input,
            streams,
        })
    }

    pub fn streams(&self) -> &[AvStream] {
        &self.streams
    }

    /// Next packet in container order, or `None` at end of stream.
    pub fn read_packet(&mut self) -> Option<RawPacket> {
        self.inner
            .packets()
            .next()
            .map(|(stream, packet)| (packet, stream.time_base()).into())
    }
}
