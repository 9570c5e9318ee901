use ffmpeg_next::software::scaling;

/// Pixel geometry/format converter. Source and destination are fixed at
/// construction; each call converts one frame into a freshly owned
/// destination buffer.
pub struct Scaler {
    context: scaling::Context,
}

impl Scaler {
    pub fn new(
        src_format: ffmpeg_next::format::Pixel,
        src_width: u32,
        src_height: u32,
        dst_format: ffmpeg_next::format::Pixel,
        dst_width: u32,
        dst_height: u32,
    ) -> anyhow::Result<Self> {
        let context = scaling::Context::get(
            src_format,
            src_width,
            src_height,
            dst_format,
            dst_width,
            dst_height,
            scaling::Flags::BICUBIC,
        )?;
        Ok(Self { context })
    }

    pub fn convert(
        &mut self,
        src: &ffmpeg_next::frame::Video,
    ) -> anyhow::Result<ffmpeg_next::frame::Video> {
        let mut dst = ffmpeg_next::frame::Video::empty();
        self.context.run(src, &mut dst)?;
        Ok(dst)
    }
}
