/// Registers FFmpeg components (formats, codecs). Call once at startup
/// before opening inputs or building encoders.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod input;
pub mod output;
pub mod packet;
pub mod resampler;
pub mod scaler;
pub mod stream;
