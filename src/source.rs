use std::path::Path;

use ffmpeg_next::{ChannelLayout, Rational, format::Pixel, format::Sample};
use ffmpeg_pipe::{decoder::Decoder, input::AvInput, packet::RawPacket, stream::AvStream};

use crate::error::ConvertError;

/// Properties every video pipeline needs from the source.
#[derive(Debug, Clone, Copy)]
pub struct VideoSourceInfo {
    pub width: u32,
    pub height: u32,
    pub format: Pixel,
    pub frame_rate: Rational,
}

/// Properties every audio pipeline needs from the source.
#[derive(Debug, Clone, Copy)]
pub struct AudioSourceInfo {
    pub rate: u32,
    pub format: Sample,
    pub channel_layout: ChannelLayout,
}

struct SelectedStream {
    stream: AvStream,
    decoder: Decoder,
}

/// The opened input: demuxer plus one decoder per selected stream. The
/// first video stream is mandatory; the first audio stream is used when
/// present and decodable, otherwise the run continues video-only.
pub struct MediaSource {
    input: AvInput,
    video: SelectedStream,
    audio: Option<SelectedStream>,
}

impl MediaSource {
    pub fn open(path: &Path) -> Result<Self, ConvertError> {
        if !path.exists() {
            return Err(ConvertError::Open {
                path: path.to_path_buf(),
                source: anyhow::anyhow!("no such file"),
            });
        }

        let input = AvInput::open(path).map_err(|e| ConvertError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;

        let video_stream = input
            .streams()
            .iter()
            .find(|s| s.is_video())
            .cloned()
            .ok_or_else(|| ConvertError::Open {
                path: path.to_path_buf(),
                source: anyhow::anyhow!("no video stream"),
            })?;
        let video_decoder = Decoder::new(&video_stream).map_err(|e| ConvertError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;

        let audio = input.streams().iter().find(|s| s.is_audio()).cloned().and_then(
            |stream| match Decoder::new(&stream) {
                Ok(decoder) => Some(SelectedStream { stream, decoder }),
                Err(e) => {
                    log::warn!("audio decoder setup failed, continuing video-only: {:#}", e);
                    None
                }
            },
        );

        Ok(Self {
            input,
            video: SelectedStream {
                stream: video_stream,
                decoder: video_decoder,
            },
            audio,
        })
    }

    pub fn video_info(&self) -> VideoSourceInfo {
        let (width, height, format) = self
            .video
            .decoder
            .video_info()
            .unwrap_or((0, 0, Pixel::None));
        VideoSourceInfo {
            width,
            height,
            format,
            frame_rate: self.video.stream.frame_rate_or_default(),
        }
    }

    pub fn audio_info(&self) -> Option<AudioSourceInfo> {
        let selected = self.audio.as_ref()?;
        let (rate, format, channel_layout) = selected.decoder.audio_info()?;
        Some(AudioSourceInfo {
            rate,
            format,
            channel_layout,
        })
    }

    pub fn video_stream_index(&self) -> usize {
        self.video.stream.index()
    }

    pub fn audio_stream_index(&self) -> Option<usize> {
        self.audio.as_ref().map(|s| s.stream.index())
    }

    pub fn video_decoder_mut(&mut self) -> &mut Decoder {
        &mut self.video.decoder
    }

    pub fn audio_decoder_mut(&mut self) -> Option<&mut Decoder> {
        self.audio.as_mut().map(|s| &mut s.decoder)
    }

    /// Next packet in container order, or `None` at end of stream.
    pub fn read_packet(&mut self) -> Option<RawPacket> {
        self.input.read_packet()
    }
}
