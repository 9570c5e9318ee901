use ffmpeg_next::{Dictionary, Rational};

use crate::packet::RawPacket;

/// Target video encoder configuration. Codec tuning strings (preset,
/// profile, level, codec-private options) travel separately as a
/// `Dictionary` passed to [`VideoEncoder::new`].
#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: ffmpeg_next::format::Pixel,
    pub bit_rate: usize,
    pub keyframe_interval: u32,
    pub frame_rate: Rational,
    pub global_header: bool,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            width: 1920,
            height: 1080,
            pixel_format: ffmpeg_next::format::Pixel::YUV420P,
            bit_rate: 4_000_000,
            keyframe_interval: 120,
            frame_rate: Rational::new(30, 1),
            global_header: false,
        }
    }
}

pub struct VideoEncoder {
    inner: ffmpeg_next::codec::encoder::Video,
    codec: ffmpeg_next::Codec,
    time_base: Rational,
}

impl VideoEncoder {
    pub fn new(settings: &VideoSettings, options: Option<Dictionary>) -> anyhow::Result<Self> {
        let codec = ffmpeg_next::encoder::find_by_name(&settings.codec)
            .ok_or(anyhow::anyhow!("codec not found: {}", settings.codec))?;
        let ctx = ffmpeg_next::codec::Context::new_with_codec(codec);

        let mut encoder = ctx.encoder().video()?;
        encoder.set_width(settings.width);
        encoder.set_height(settings.height);
        encoder.set_format(settings.pixel_format);
        encoder.set_bit_rate(settings.bit_rate);
        encoder.set_gop(settings.keyframe_interval);
        encoder.set_frame_rate(Some(settings.frame_rate));
        // One tick per frame; output packets are rescaled by the muxer.
        encoder.set_time_base(settings.frame_rate.invert());
        if settings.global_header {
            encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder.open_with(options.unwrap_or_default())?;
        let time_base: Rational = unsafe { (*encoder.0.as_ptr()).time_base.into() };

        Ok(Self {
            inner: encoder,
            codec,
            time_base,
        })
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn codec(&self) -> ffmpeg_next::Codec {
        self.codec
    }

    pub(crate) fn inner(&self) -> &ffmpeg_next::codec::encoder::Video {
        &self.inner
    }

    pub fn send_frame(&mut self, frame: &ffmpeg_next::frame::Video) -> anyhow::Result<()> {
        self.inner.send_frame(frame)?;
        Ok(())
    }

    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        match self.inner.send_eof() {
            Ok(()) => Ok(()),
            // Already draining; flush is idempotent.
            Err(ffmpeg_next::Error::Eof) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Next encoded packet, carrying the encoder's time base, or `None`
    /// when the encoder wants more input or is fully drained.
    pub fn receive_packet(&mut self) -> anyhow::Result<Option<RawPacket>> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        match self.inner.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(RawPacket::from((packet, self.time_base)))),
            Err(ffmpeg_next::Error::Other { errno })
                if errno == ffmpeg_next::util::error::EAGAIN =>
            {
                Ok(None)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioSettings {
    pub codec: String,
    pub sample_rate: u32,
    pub channel_layout: ffmpeg_next::ChannelLayout,
    pub bit_rate: usize,
    pub global_header: bool,
}

pub struct AudioEncoder {
    inner: ffmpeg_next::codec::encoder::Audio,
    codec: ffmpeg_next::Codec,
    time_base: Rational,
    sample_format: ffmpeg_next::format::Sample,
}

impl AudioEncoder {
    pub fn new(settings: &AudioSettings) -> anyhow::Result<Self> {
        let codec = ffmpeg_next::encoder::find_by_name(&settings.codec)
            .ok_or(anyhow::anyhow!("codec not found: {}", settings.codec))?;

        // The encoder dictates its input sample format; take the codec's
        // first supported one (FLTP for AAC).
        let sample_format = codec
            .audio()
            .ok()
            .and_then(|a| a.formats().and_then(|mut f| f.next()))
            .unwrap_or(ffmpeg_next::format::Sample::F32(
                ffmpeg_next::format::sample::Type::Planar,
            ));

        let ctx = ffmpeg_next::codec::Context::new_with_codec(codec);
        let mut encoder = ctx.encoder().audio()?;
        encoder.set_rate(settings.sample_rate as i32);
        encoder.set_channel_layout(settings.channel_layout);
        encoder.set_format(sample_format);
        encoder.set_bit_rate(settings.bit_rate);
        encoder.set_time_base(Rational::new(1, settings.sample_rate as i32));
        if settings.global_header {
            encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder.open_with(Dictionary::new())?;
        let time_base: Rational = unsafe { (*encoder.0.as_ptr()).time_base.into() };

        Ok(Self {
            inner: encoder,
            codec,
            time_base,
            sample_format,
        })
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn codec(&self) -> ffmpeg_next::Codec {
        self.codec
    }

    pub(crate) fn inner(&self) -> &ffmpeg_next::codec::encoder::Audio {
        &self.inner
    }

    /// Sample format the encoder requires on input.
    pub fn sample_format(&self) -> ffmpeg_next::format::Sample {
        self.sample_format
    }

    pub fn rate(&self) -> u32 {
        self.inner.rate()
    }

    pub fn channel_layout(&self) -> ffmpeg_next::ChannelLayout {
        self.inner.channel_layout()
    }

    /// Samples per input frame the codec expects (1024 for AAC).
    pub fn frame_size(&self) -> u32 {
        self.inner.frame_size()
    }

    pub fn send_frame(&mut self, frame: &ffmpeg_next::frame::Audio) -> anyhow::Result<()> {
        self.inner.send_frame(frame)?;
        Ok(())
    }

    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        match self.inner.send_eof() {
            Ok(()) => Ok(()),
            Err(ffmpeg_next::Error::Eof) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn receive_packet(&mut self) -> anyhow::Result<Option<RawPacket>> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        match self.inner.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(RawPacket::from((packet, self.time_base)))),
            Err(ffmpeg_next::Error::Other { errno })
                if errno == ffmpeg_next::util::error::EAGAIN =>
            {
                Ok(None)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
#[path = "encoder_test.rs"]
mod encoder_test;
