use std::path::Path;

use ffmpeg_next::Dictionary;

use crate::{
    encoder::{AudioEncoder, VideoEncoder},
    packet::RawPacket,
};

/// One output container. Streams are added from opened encoders before
/// the header is written; packets are rescaled from the encoder time base
/// to the muxer's stream time base on write. Header and trailer are each
/// written at most once.
pub struct Muxer {
    inner: ffmpeg_next::format::context::Output,
    have_written_header: bool,
    have_written_trailer: bool,
}

impl Muxer {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let output = ffmpeg_next::format::output(path)
            .map_err(|e| anyhow::anyhow!("cannot create output {}: {}", path.display(), e))?;
        Ok(Self {
            inner: output,
            have_written_header: false,
            have_written_trailer: false,
        })
    }

    /// Whether encoders feeding this container must produce global
    /// extradata instead of in-band headers.
    pub fn needs_global_header(&self) -> bool {
        self.inner
            .format()
            .flags()
            .contains(ffmpeg_next::format::flag::Flags::GLOBAL_HEADER)
    }

    pub fn add_video_stream(&mut self, encoder: &VideoEncoder) -> anyhow::Result<usize> {
        let mut stream = self.inner.add_stream(encoder.codec())?;
        stream.set_parameters(encoder.inner());
        Ok(stream.index())
    }

    pub fn add_audio_stream(&mut self, encoder: &AudioEncoder) -> anyhow::Result<usize> {
        let mut stream = self.inner.add_stream(encoder.codec())?;
        stream.set_parameters(encoder.inner());
        Ok(stream.index())
    }

    pub fn write_header(&mut self, options: Dictionary) -> anyhow::Result<()> {
        if self.have_written_header {
            return Ok(());
        }
        self.inner.write_header_with(options)?;
        self.have_written_header = true;
        Ok(())
    }

    pub fn write_packet(&mut self, stream_index: usize, mut packet: RawPacket) -> anyhow::Result<()> {
        if !self.have_written_header {
            return Err(anyhow::anyhow!("header not written"));
        }

        let time_base = packet.time_base();
        let out_time_base = self
            .inner
            .stream(stream_index)
            .ok_or(anyhow::anyhow!("stream not found: {}", stream_index))?
            .time_base();

        let p = packet.get_mut();
        p.set_stream(stream_index);
        p.set_position(-1);
        p.rescale_ts(time_base, out_time_base);
        p.write_interleaved(&mut self.inner)?;
        Ok(())
    }

    pub fn write_trailer(&mut self) -> anyhow::Result<()> {
        if self.have_written_header && !self.have_written_trailer {
            self.have_written_trailer = true;
            self.inner.write_trailer()?;
        }
        Ok(())
    }
}
