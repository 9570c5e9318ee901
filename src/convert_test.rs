use ffmpeg_next::{ChannelLayout, Rational, format::Pixel, format::Sample, format::sample::Type};
use ffmpeg_pipe::{
    encoder::{VideoEncoder, VideoSettings},
    frame::{RawAudioFrame, RawFrame, RawVideoFrame},
    output::Muxer,
};
use tokio_util::sync::CancellationToken;

use crate::{
    convert::{Converter, dispatch_frame},
    pipeline::Pipeline,
    profile::Profile,
    source::{AudioSourceInfo, VideoSourceInfo},
};

fn test_profile(name: &str, width: u32, height: u32) -> Profile {
    Profile {
        name: name.to_string(),
        width,
        height,
        video_bitrate: 300_000,
        audio_bitrate: 64_000,
        h264_profile: "baseline".to_string(),
        h264_level: "3.1".to_string(),
        keyframe_interval: 30,
        preset: "ultrafast".to_string(),
        bandwidth: None,
    }
}

fn video_source() -> VideoSourceInfo {
    VideoSourceInfo {
        width: 640,
        height: 480,
        format: Pixel::YUV420P,
        frame_rate: Rational::new(30, 1),
    }
}

fn black_frame() -> RawFrame {
    let mut frame = ffmpeg_next::frame::Video::new(Pixel::YUV420P, 640, 480);
    frame.data_mut(0).fill(16);
    frame.data_mut(1).fill(128);
    frame.data_mut(2).fill(128);
    RawFrame::Video(RawVideoFrame::from(frame))
}

fn silent_frame(samples: usize, rate: u32) -> RawFrame {
    let mut frame =
        ffmpeg_next::frame::Audio::new(Sample::F32(Type::Planar), samples, ChannelLayout::STEREO);
    frame.set_rate(rate);
    for plane in 0..frame.planes() {
        frame.data_mut(plane).fill(0);
    }
    RawFrame::Audio(RawAudioFrame::from(frame))
}

fn write_test_clip(path: &std::path::Path, frames: i64) -> anyhow::Result<()> {
    let mut muxer = Muxer::create(path)?;
    let mut opts = ffmpeg_next::Dictionary::new();
    opts.set("preset", "ultrafast");
    let mut encoder = VideoEncoder::new(
        &VideoSettings {
            codec: "libx264".to_string(),
            width: 640,
            height: 480,
            pixel_format: Pixel::YUV420P,
            bit_rate: 400_000,
            keyframe_interval: 30,
            frame_rate: Rational::new(30, 1),
            global_header: muxer.needs_global_header(),
        },
        Some(opts),
    )?;
    let index = muxer.add_video_stream(&encoder)?;
    muxer.write_header(ffmpeg_next::Dictionary::new())?;

    for pts in 0..frames {
        let mut frame = ffmpeg_next::frame::Video::new(Pixel::YUV420P, 640, 480);
        frame.data_mut(0).fill(16);
        frame.data_mut(1).fill(128);
        frame.data_mut(2).fill(128);
        frame.set_pts(Some(pts));
        encoder.send_frame(&frame)?;
        while let Some(packet) = encoder.receive_packet()? {
            muxer.write_packet(index, packet)?;
        }
    }
    encoder.send_eof()?;
    while let Some(packet) = encoder.receive_packet()? {
        muxer.write_packet(index, packet)?;
    }
    muxer.write_trailer()?;
    Ok(())
}

fn build_pipelines(
    dir: &std::path::Path,
    profiles: &[Profile],
    audio: Option<AudioSourceInfo>,
) -> anyhow::Result<Vec<Pipeline>> {
    let base = dir.join("clip.mp4");
    let video = video_source();
    profiles
        .iter()
        .map(|p| Ok(Pipeline::build(p, &base, video, audio)?))
        .collect()
}

#[test]
fn fan_out_is_lock_step_with_monotonic_pts() -> anyhow::Result<()> {
    ffmpeg_pipe::init()?;

    let dir = tempfile::tempdir()?;
    let profiles = [
        test_profile("big", 320, 240),
        test_profile("small", 160, 120),
    ];
    let mut pipelines = build_pipelines(dir.path(), &profiles, None)?;

    for _ in 0..60 {
        dispatch_frame(&mut pipelines, &black_frame());
    }

    for pipeline in &pipelines {
        assert_eq!(pipeline.stats().video_frames, 60);
        assert_eq!(pipeline.video_pts(), 60);
    }

    for pipeline in &mut pipelines {
        pipeline.finish()?;
    }

    // Every frame in yields exactly one packet out once flushed.
    assert_eq!(pipelines[0].stats().video_packets, 60);
    assert_eq!(
        pipelines[0].stats().video_packets,
        pipelines[1].stats().video_packets
    );

    for pipeline in &pipelines {
        let meta = std::fs::metadata(pipeline.path())?;
        assert!(meta.len() > 0);
    }
    assert!(dir.path().join("clip_big.mp4").exists());
    assert!(dir.path().join("clip_small.mp4").exists());

    Ok(())
}

#[test]
fn one_failing_pipeline_does_not_stop_the_others() -> anyhow::Result<()> {
    ffmpeg_pipe::init()?;

    let dir = tempfile::tempdir()?;
    let profiles = [
        test_profile("steady", 320, 240),
        test_profile("flaky", 160, 120),
    ];
    let mut pipelines = build_pipelines(dir.path(), &profiles, None)?;
    pipelines[1].fail_video_at = Some(50);

    for _ in 0..100 {
        dispatch_frame(&mut pipelines, &black_frame());
    }

    assert_eq!(pipelines[0].stats().video_frames, 100);
    assert_eq!(pipelines[0].stats().frames_skipped, 0);

    assert_eq!(pipelines[1].stats().video_frames, 99);
    assert_eq!(pipelines[1].stats().frames_skipped, 1);
    assert!(pipelines[1].is_alive());

    for pipeline in &mut pipelines {
        pipeline.finish()?;
    }
    assert_eq!(pipelines[0].stats().video_packets, 100);
    assert_eq!(pipelines[1].stats().video_packets, 99);

    Ok(())
}

#[test]
fn converts_a_real_container_end_to_end() -> anyhow::Result<()> {
    ffmpeg_pipe::init()?;

    let dir = tempfile::tempdir()?;
    let input = dir.path().join("input.mp4");
    write_test_clip(&input, 30)?;

    let profiles = [
        test_profile("big", 320, 240),
        test_profile("small", 160, 120),
    ];
    let converter = Converter::new(
        &input,
        &dir.path().join("out.mp4"),
        &profiles,
        CancellationToken::new(),
    )?;
    let report = converter.run()?;

    assert_eq!(report.packets_read, 30);
    assert_eq!(report.frames_decoded, 30);
    assert_eq!(report.pipelines.len(), 2);
    for pipeline in &report.pipelines {
        assert!(!pipeline.dead);
        assert_eq!(pipeline.stats.video_frames, 30);
        assert_eq!(pipeline.stats.video_packets, 30);
        assert_eq!(pipeline.stats.frames_skipped, 0);
        let meta = std::fs::metadata(&pipeline.output)?;
        assert!(meta.len() > 0);
    }
    assert!(dir.path().join("out_big.mp4").exists());
    assert!(dir.path().join("out_small.mp4").exists());

    Ok(())
}

#[test]
fn cancellation_stops_before_the_first_packet_and_still_finalizes() -> anyhow::Result<()> {
    ffmpeg_pipe::init()?;

    let dir = tempfile::tempdir()?;
    let input = dir.path().join("input.mp4");
    write_test_clip(&input, 30)?;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let profiles = [test_profile("solo", 160, 120)];
    let converter = Converter::new(&input, &dir.path().join("out.mp4"), &profiles, cancel)?;
    let report = converter.run()?;

    assert_eq!(report.packets_read, 0);
    assert_eq!(report.pipelines[0].stats.video_frames, 0);
    // Header and trailer were still written, leaving a valid empty file.
    let meta = std::fs::metadata(&report.pipelines[0].output)?;
    assert!(meta.len() > 0);

    Ok(())
}

#[test]
fn repeated_mux_failures_retire_the_pipeline_but_it_still_finalizes() -> anyhow::Result<()> {
    ffmpeg_pipe::init()?;

    let dir = tempfile::tempdir()?;
    let mut pipeline = Pipeline::build(
        &test_profile("doomed", 160, 120),
        &dir.path().join("clip.mp4"),
        video_source(),
        None,
    )?;
    pipeline.fail_mux = true;

    for _ in 0..60 {
        dispatch_frame(std::slice::from_mut(&mut pipeline), &black_frame());
        if !pipeline.is_alive() {
            break;
        }
    }

    assert!(!pipeline.is_alive());
    assert_eq!(pipeline.stats().video_packets, 0);
    // The dispatcher stops offering frames once the lane is dead.
    assert!(pipeline.stats().video_frames < 60);

    pipeline.finish()?;
    assert!(pipeline.path().exists());

    Ok(())
}

#[test]
fn audio_passthrough_advances_pts_by_sample_count() -> anyhow::Result<()> {
    ffmpeg_pipe::init()?;

    let dir = tempfile::tempdir()?;
    // Source already matches what the AAC encoder accepts, so no
    // resampler is constructed and frames pass through untouched.
    let audio = AudioSourceInfo {
        rate: 44100,
        format: Sample::F32(Type::Planar),
        channel_layout: ChannelLayout::STEREO,
    };
    let mut pipeline = Pipeline::build(
        &test_profile("solo", 320, 240),
        &dir.path().join("clip.mp4"),
        video_source(),
        Some(audio),
    )?;

    for _ in 0..10 {
        dispatch_frame(
            std::slice::from_mut(&mut pipeline),
            &silent_frame(1024, 44100),
        );
    }

    assert_eq!(pipeline.stats().audio_frames, 10);
    assert_eq!(pipeline.audio_pts(), Some(10240));

    pipeline.finish()?;
    assert!(pipeline.stats().audio_packets > 0);

    Ok(())
}

#[test]
fn resampled_audio_advances_pts_by_produced_samples() -> anyhow::Result<()> {
    ffmpeg_pipe::init()?;

    let dir = tempfile::tempdir()?;
    // Packed 16-bit source: the AAC encoder wants planar float, so the
    // pipeline builds a resampler for the format conversion.
    let audio = AudioSourceInfo {
        rate: 44100,
        format: Sample::I16(Type::Packed),
        channel_layout: ChannelLayout::STEREO,
    };
    let mut pipeline = Pipeline::build(
        &test_profile("solo", 320, 240),
        &dir.path().join("clip.mp4"),
        video_source(),
        Some(audio),
    )?;

    for _ in 0..10 {
        let mut frame = ffmpeg_next::frame::Audio::new(
            Sample::I16(Type::Packed),
            1024,
            ChannelLayout::STEREO,
        );
        frame.set_rate(44100);
        frame.data_mut(0).fill(0);
        dispatch_frame(
            std::slice::from_mut(&mut pipeline),
            &RawFrame::Audio(RawAudioFrame::from(frame)),
        );
    }

    assert_eq!(pipeline.stats().audio_frames, 10);
    // Same rate on both sides: format conversion is sample for sample.
    assert_eq!(pipeline.audio_pts(), Some(10240));

    pipeline.finish()?;
    assert!(pipeline.stats().audio_packets > 0);

    Ok(())
}
