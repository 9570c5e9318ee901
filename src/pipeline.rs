use std::path::{Path, PathBuf};

use ffmpeg_next::{Dictionary, format::Pixel};
use ffmpeg_pipe::{
    encoder::{AudioEncoder, AudioSettings, VideoEncoder, VideoSettings},
    frame::{RawAudioFrame, RawVideoFrame},
    output::Muxer,
    resampler::Resampler,
    scaler::Scaler,
};

use crate::{
    error::{ConvertError, FrameError},
    profile::Profile,
    source::{AudioSourceInfo, VideoSourceInfo},
};

/// Consecutive mux write failures after which a pipeline stops accepting
/// frames. It is still drained and finalized so partial output stays
/// playable.
const MAX_MUX_FAILURES: u32 = 8;

const OUTPUT_PIXEL_FORMAT: Pixel = Pixel::YUV420P;

/// `clip.mkv` + profile `high` becomes `clip_high.mp4` next to the
/// requested output base.
pub fn output_path(base: &Path, profile_name: &str) -> PathBuf {
    let stripped = base.with_extension("");
    let stem = stripped.to_string_lossy();
    PathBuf::from(format!("{}_{}.mp4", stem, profile_name))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineStats {
    pub video_frames: u64,
    pub audio_frames: u64,
    pub video_packets: u64,
    pub audio_packets: u64,
    pub frames_skipped: u64,
}

struct VideoLane {
    encoder: VideoEncoder,
    scaler: Scaler,
    stream_index: usize,
    next_pts: i64,
}

struct AudioLane {
    encoder: AudioEncoder,
    resampler: Option<Resampler>,
    stream_index: usize,
    next_pts: i64,
}

fn note_mux_failure(failures: &mut u32, dead: &mut bool, profile: &str, e: anyhow::Error) {
    *failures += 1;
    log::warn!(
        "profile {}: mux write failed ({}/{}): {:#}",
        profile,
        *failures,
        MAX_MUX_FAILURES,
        e
    );
    if *failures >= MAX_MUX_FAILURES {
        log::error!(
            "profile {}: giving up after {} consecutive mux failures",
            profile,
            *failures
        );
        *dead = true;
    }
}

fn x264_options(profile: &Profile) -> Dictionary<'static> {
    let mut options = Dictionary::new();
    options.set("preset", &profile.preset);
    options.set("profile", &profile.h264_profile);
    options.set("level", &profile.h264_level);
    options.set("tune", "film");
    // x264 rejects CBR without a VBV; size the buffer at two seconds.
    options.set("nal-hrd", "cbr");
    options.set("maxrate", &profile.video_bitrate.to_string());
    options.set("bufsize", &(profile.video_bitrate * 2).to_string());
    options.set(
        "x264opts",
        &format!(
            "keyint={}:min-keyint={}:no-scenecut:bframes=2",
            profile.keyframe_interval,
            profile.keyframe_interval / 2
        ),
    );
    options
}

/// One complete profile lane: scale, encode, mux, with its own PTS
/// counters starting at zero. Pipelines are fully independent; a failure
/// here never propagates to siblings.
pub struct Pipeline {
    profile: Profile,
    path: PathBuf,
    muxer: Muxer,
    video: VideoLane,
    audio: Option<AudioLane>,
    stats: PipelineStats,
    mux_failures: u32,
    dead: bool,
    #[cfg(test)]
    pub(crate) fail_video_at: Option<i64>,
    #[cfg(test)]
    pub(crate) fail_mux: bool,
}

impl Pipeline {
    pub fn build(
        profile: &Profile,
        output_base: &Path,
        video: VideoSourceInfo,
        audio: Option<AudioSourceInfo>,
    ) -> Result<Self, ConvertError> {
        let build = || -> anyhow::Result<Self> {
            let path = output_path(output_base, &profile.name);
            let mut muxer = Muxer::create(&path)?;
            let global_header = muxer.needs_global_header();

            let encoder = VideoEncoder::new(
                &VideoSettings {
                    codec: "libx264".to_string(),
                    width: profile.width,
                    height: profile.height,
                    pixel_format: OUTPUT_PIXEL_FORMAT,
                    bit_rate: profile.video_bitrate,
                    keyframe_interval: profile.keyframe_interval,
                    frame_rate: video.frame_rate,
                    global_header,
                },
                Some(x264_options(profile)),
            )?;
            let scaler = Scaler::new(
                video.format,
                video.width,
                video.height,
                OUTPUT_PIXEL_FORMAT,
                profile.width,
                profile.height,
            )?;
            let stream_index = muxer.add_video_stream(&encoder)?;
            let video_lane = VideoLane {
                encoder,
                scaler,
                stream_index,
                next_pts: 0,
            };

            // A failed audio lane degrades this profile to video-only
            // rather than losing the whole output.
            let audio_lane = match audio {
                Some(info) => {
                    match Self::build_audio(&mut muxer, profile, info, global_header) {
                        Ok(lane) => Some(lane),
                        Err(e) => {
                            log::warn!(
                                "profile {}: audio setup failed, output will be video-only: {:#}",
                                profile.name,
                                e
                            );
                            None
                        }
                    }
                }
                None => None,
            };

            let mut movflags = Dictionary::new();
            movflags.set("movflags", "frag_keyframe+empty_moov+default_base_moof");
            muxer.write_header(movflags)?;

            log::info!(
                "profile {}: {}x{} @ {} bps (bandwidth {}) -> {}",
                profile.name,
                profile.width,
                profile.height,
                profile.video_bitrate,
                profile.bandwidth(),
                path.display()
            );

            Ok(Self {
                profile: profile.clone(),
                path,
                muxer,
                video: video_lane,
                audio: audio_lane,
                stats: PipelineStats::default(),
                mux_failures: 0,
                dead: false,
                #[cfg(test)]
                fail_video_at: None,
                #[cfg(test)]
                fail_mux: false,
            })
        };

        build().map_err(|e| ConvertError::PipelineBuild {
            profile: profile.name.clone(),
            source: e,
        })
    }

    fn build_audio(
        muxer: &mut Muxer,
        profile: &Profile,
        info: AudioSourceInfo,
        global_header: bool,
    ) -> anyhow::Result<AudioLane> {
        let encoder = AudioEncoder::new(&AudioSettings {
            codec: "aac".to_string(),
            sample_rate: info.rate,
            channel_layout: info.channel_layout,
            bit_rate: profile.audio_bitrate,
            global_header,
        })?;

        // Resample only when the source does not already match what the
        // encoder accepts.
        let resampler = if info.format != encoder.sample_format()
            || info.rate != encoder.rate()
            || info.channel_layout != encoder.channel_layout()
        {
            Some(Resampler::new(
                (info.format, info.channel_layout, info.rate),
                (
                    encoder.sample_format(),
                    encoder.channel_layout(),
                    encoder.rate(),
                ),
            )?)
        } else {
            None
        };

        let stream_index = muxer.add_audio_stream(&encoder)?;
        Ok(AudioLane {
            encoder,
            resampler,
            stream_index,
            next_pts: 0,
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// A dead pipeline no longer accepts frames but is still finalized.
    pub fn is_alive(&self) -> bool {
        !self.dead
    }

    pub fn video_pts(&self) -> i64 {
        self.video.next_pts
    }

    pub fn audio_pts(&self) -> Option<i64> {
        self.audio.as_ref().map(|a| a.next_pts)
    }

    pub fn note_skip(&mut self) {
        self.stats.frames_skipped += 1;
    }

    pub fn push_video(&mut self, frame: &RawVideoFrame) -> Result<(), FrameError> {
        #[cfg(test)]
        if self.fail_video_at == Some(self.video.next_pts) {
            return Err(FrameError::Encode(anyhow::anyhow!("injected failure")));
        }

        let mut scaled = self
            .video
            .scaler
            .convert(frame.as_video())
            .map_err(FrameError::Transform)?;
        scaled.set_pts(Some(self.video.next_pts));
        self.video.next_pts += 1;

        self.video
            .encoder
            .send_frame(&scaled)
            .map_err(FrameError::Encode)?;
        self.stats.video_frames += 1;

        self.drain_video().map_err(FrameError::Encode)
    }

    pub fn push_audio(&mut self, frame: &RawAudioFrame) -> Result<(), FrameError> {
        let Some(lane) = self.audio.as_mut() else {
            return Ok(());
        };

        match lane.resampler.as_mut() {
            Some(resampler) => {
                let mut converted = resampler
                    .convert(frame.as_audio())
                    .map_err(FrameError::Transform)?;
                converted.set_pts(Some(lane.next_pts));
                lane.next_pts += converted.samples() as i64;
                lane.encoder
                    .send_frame(&converted)
                    .map_err(FrameError::Encode)?;
            }
            None => {
                let mut passthrough = frame.as_audio().clone();
                passthrough.set_pts(Some(lane.next_pts));
                lane.next_pts += passthrough.samples() as i64;
                lane.encoder
                    .send_frame(&passthrough)
                    .map_err(FrameError::Encode)?;
            }
        }
        self.stats.audio_frames += 1;

        self.drain_audio().map_err(FrameError::Encode)
    }

    fn drain_video(&mut self) -> anyhow::Result<()> {
        while let Some(packet) = self.video.encoder.receive_packet()? {
            #[cfg(test)]
            let written = if self.fail_mux {
                Err(anyhow::anyhow!("injected mux failure"))
            } else {
                self.muxer.write_packet(self.video.stream_index, packet)
            };
            #[cfg(not(test))]
            let written = self.muxer.write_packet(self.video.stream_index, packet);

            match written {
                Ok(()) => {
                    self.stats.video_packets += 1;
                    self.mux_failures = 0;
                }
                Err(e) => {
                    note_mux_failure(&mut self.mux_failures, &mut self.dead, &self.profile.name, e)
                }
            }
        }
        Ok(())
    }

    fn drain_audio(&mut self) -> anyhow::Result<()> {
        let Some(lane) = self.audio.as_mut() else {
            return Ok(());
        };
        while let Some(packet) = lane.encoder.receive_packet()? {
            match self.muxer.write_packet(lane.stream_index, packet) {
                Ok(()) => {
                    self.stats.audio_packets += 1;
                    self.mux_failures = 0;
                }
                Err(e) => {
                    note_mux_failure(&mut self.mux_failures, &mut self.dead, &self.profile.name, e)
                }
            }
        }
        Ok(())
    }

    /// Flushes both encoders, writes remaining packets and the trailer.
    /// Called exactly once per pipeline, dead or alive.
    pub fn finish(&mut self) -> anyhow::Result<()> {
        self.video.encoder.send_eof()?;
        self.drain_video()?;

        if let Some(lane) = self.audio.as_mut() {
            lane.encoder.send_eof()?;
        }
        self.drain_audio()?;

        self.muxer.write_trailer()?;

        log::info!(
            "completed: {} ({} video frames / {} packets, {} audio frames / {} packets, {} skipped)",
            self.path.display(),
            self.stats.video_frames,
            self.stats.video_packets,
            self.stats.audio_frames,
            self.stats.audio_packets,
            self.stats.frames_skipped
        );
        Ok(())
    }
}
