use std::path::Path;

use ffmpeg_pipe::{frame::RawFrame, packet::RawPacket};
use tokio_util::sync::CancellationToken;

use crate::{
    error::ConvertError,
    pipeline::{Pipeline, PipelineStats},
    profile::Profile,
    source::MediaSource,
};

#[derive(Debug)]
pub struct PipelineReport {
    pub profile: String,
    pub output: std::path::PathBuf,
    pub stats: PipelineStats,
    pub dead: bool,
}

#[derive(Debug)]
pub struct ConvertReport {
    pub packets_read: u64,
    pub frames_decoded: u64,
    pub pipelines: Vec<PipelineReport>,
}

/// Hands one decoded frame to every live pipeline. A pipeline error is
/// its own problem: log, count the skip, move on to its siblings.
pub(crate) fn dispatch_frame(pipelines: &mut [Pipeline], frame: &RawFrame) {
    for pipeline in pipelines.iter_mut() {
        if !pipeline.is_alive() {
            continue;
        }
        let result = match frame {
            RawFrame::Video(v) => pipeline.push_video(v),
            RawFrame::Audio(a) => pipeline.push_audio(a),
        };
        if let Err(e) = result {
            pipeline.note_skip();
            log::warn!(
                "profile {}: frame skipped: {:#}",
                pipeline.profile().name,
                anyhow::Error::from(e)
            );
        }
    }
}

/// Decode-once, encode-many driver. One synchronous loop reads packets,
/// decodes on the shared decoders and fans each frame out to every
/// pipeline, checking for cancellation only between packets.
pub struct Converter {
    source: MediaSource,
    pipelines: Vec<Pipeline>,
    cancel: CancellationToken,
    packets_read: u64,
    frames_decoded: u64,
}

impl Converter {
    pub fn new(
        input: &Path,
        output_base: &Path,
        profiles: &[Profile],
        cancel: CancellationToken,
    ) -> Result<Self, ConvertError> {
        if profiles.is_empty() {
            return Err(ConvertError::NoPipelines);
        }

        let source = MediaSource::open(input)?;
        let video_info = source.video_info();
        let audio_info = source.audio_info();

        let mut pipelines = Vec::with_capacity(profiles.len());
        for profile in profiles {
            match Pipeline::build(profile, output_base, video_info, audio_info) {
                Ok(pipeline) => pipelines.push(pipeline),
                Err(e) => log::error!("skipping profile: {:#}", anyhow::Error::from(e)),
            }
        }
        if pipelines.is_empty() {
            return Err(ConvertError::NoPipelines);
        }

        log::info!(
            "input {}: {}x{} @ {:?}, audio: {}",
            input.display(),
            video_info.width,
            video_info.height,
            video_info.frame_rate,
            if audio_info.is_some() { "yes" } else { "no" }
        );

        Ok(Self {
            source,
            pipelines,
            cancel,
            packets_read: 0,
            frames_decoded: 0,
        })
    }

    pub fn run(mut self) -> Result<ConvertReport, ConvertError> {
        loop {
            if self.cancel.is_cancelled() {
                log::warn!("cancelled, finalizing partial outputs");
                break;
            }
            let Some(packet) = self.source.read_packet() else {
                break;
            };
            self.packets_read += 1;
            self.route_packet(packet);
        }

        self.drain();

        let pipelines = self
            .pipelines
            .iter()
            .map(|p| PipelineReport {
                profile: p.profile().name.clone(),
                output: p.path().to_path_buf(),
                stats: p.stats(),
                dead: !p.is_alive(),
            })
            .collect();

        Ok(ConvertReport {
            packets_read: self.packets_read,
            frames_decoded: self.frames_decoded,
            pipelines,
        })
    }

    fn route_packet(&mut self, packet: RawPacket) {
        let index = packet.index();
        if index == self.source.video_stream_index() {
            self.decode_video(Some(packet));
        } else if Some(index) == self.source.audio_stream_index() {
            self.decode_audio(Some(packet));
        }
        // Other streams (subtitles, data) are discarded.
    }

    fn decode_video(&mut self, packet: Option<RawPacket>) {
        let result = match packet {
            Some(packet) => self.source.video_decoder_mut().send_packet(packet),
            None => self.source.video_decoder_mut().send_eof(),
        };
        if let Err(e) = result {
            log::warn!("video decode error, packet dropped: {:#}", e);
            return;
        }

        loop {
            match self.source.video_decoder_mut().receive_frame() {
                Ok(Some(frame)) => {
                    self.frames_decoded += 1;
                    dispatch_frame(&mut self.pipelines, &frame);
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("video decode error: {:#}", e);
                    break;
                }
            }
        }
    }

    fn decode_audio(&mut self, packet: Option<RawPacket>) {
        let Some(decoder) = self.source.audio_decoder_mut() else {
            return;
        };
        let result = match packet {
            Some(packet) => decoder.send_packet(packet),
            None => decoder.send_eof(),
        };
        if let Err(e) = result {
            log::warn!("audio decode error, packet dropped: {:#}", e);
            return;
        }

        loop {
            let Some(decoder) = self.source.audio_decoder_mut() else {
                return;
            };
            match decoder.receive_frame() {
                Ok(Some(frame)) => {
                    self.frames_decoded += 1;
                    dispatch_frame(&mut self.pipelines, &frame);
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("audio decode error: {:#}", e);
                    break;
                }
            }
        }
    }

    /// Flushes decoders first so buffered frames reach every pipeline,
    /// then finalizes each pipeline, dead ones included.
    fn drain(&mut self) {
        self.decode_video(None);
        if self.source.audio_stream_index().is_some() {
            self.decode_audio(None);
        }

        for pipeline in &mut self.pipelines {
            if let Err(e) = pipeline.finish() {
                log::error!(
                    "profile {}: finalize failed: {:#}",
                    pipeline.profile().name,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "convert_test.rs"]
mod convert_test;
