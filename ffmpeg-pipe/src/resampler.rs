use ffmpeg_next::{ChannelLayout, format::Sample, software::resampling};

/// Sample format/rate/layout converter. Unlike the scaler it is stateful:
/// a fractional-sample delay carries across calls, so each output is sized
/// from the current delay plus the input's sample count, rounded up.
pub struct Resampler {
    context: resampling::Context,
    src_rate: u32,
    dst_rate: u32,
    dst_format: Sample,
    dst_layout: ChannelLayout,
}

impl Resampler {
    pub fn new(
        src: (Sample, ChannelLayout, u32),
        dst: (Sample, ChannelLayout, u32),
    ) -> anyhow::Result<Self> {
        let context = resampling::Context::get(src.0, src.1, src.2, dst.0, dst.1, dst.2)?;
        Ok(Self {
            context,
            src_rate: src.2,
            dst_rate: dst.2,
            dst_format: dst.0,
            dst_layout: dst.1,
        })
    }

    /// Number of output samples the next conversion of `input_samples`
    /// may produce at most.
    fn output_capacity(&self, input_samples: usize) -> usize {
        let delay = self.context.delay().map(|d| d.input).unwrap_or(0);
        let pending = delay + input_samples as i64;
        ((pending * self.dst_rate as i64) as u64).div_ceil(self.src_rate as u64) as usize
    }

    /// Converts one frame; the returned frame's sample count is the number
    /// actually produced, which callers use to advance their PTS counter.
    pub fn convert(
        &mut self,
        src: &ffmpeg_next::frame::Audio,
    ) -> anyhow::Result<ffmpeg_next::frame::Audio> {
        let capacity = self.output_capacity(src.samples()).max(1);
        let mut dst = ffmpeg_next::frame::Audio::new(self.dst_format, capacity, self.dst_layout);
        dst.set_rate(self.dst_rate);
        self.context.run(src, &mut dst)?;
        Ok(dst)
    }
}
