use ffmpeg_next::Rational;

use super::{VideoEncoder, VideoSettings};

fn test_settings() -> VideoSettings {
    VideoSettings {
        codec: "libx264".to_string(),
        width: 160,
        height: 120,
        pixel_format: ffmpeg_next::format::Pixel::YUV420P,
        bit_rate: 200_000,
        keyframe_interval: 10,
        frame_rate: Rational::new(30, 1),
        global_header: false,
    }
}

fn black_frame(width: u32, height: u32, pts: i64) -> ffmpeg_next::frame::Video {
    let mut frame =
        ffmpeg_next::frame::Video::new(ffmpeg_next::format::Pixel::YUV420P, width, height);
    frame.data_mut(0).fill(0);
    frame.data_mut(1).fill(128);
    frame.data_mut(2).fill(128);
    frame.set_pts(Some(pts));
    frame
}

fn fast_options() -> ffmpeg_next::Dictionary<'static> {
    let mut opts = ffmpeg_next::Dictionary::new();
    opts.set("preset", "ultrafast");
    opts
}

#[test]
fn flush_is_idempotent_and_drains_all_frames() -> anyhow::Result<()> {
    crate::init()?;

    let mut encoder = VideoEncoder::new(&test_settings(), Some(fast_options()))?;

    let submitted = 5;
    let mut received = 0usize;
    for pts in 0..submitted {
        encoder.send_frame(&black_frame(160, 120, pts))?;
        while encoder.receive_packet()?.is_some() {
            received += 1;
        }
    }

    encoder.send_eof()?;
    while encoder.receive_packet()?.is_some() {
        received += 1;
    }
    assert_eq!(received, submitted as usize);

    // Second flush: still end-of-stream, no extra packets.
    encoder.send_eof()?;
    assert!(encoder.receive_packet()?.is_none());
    assert!(encoder.receive_packet()?.is_none());

    Ok(())
}

#[test]
fn encoded_packets_carry_encoder_time_base() -> anyhow::Result<()> {
    crate::init()?;

    let mut encoder = VideoEncoder::new(&test_settings(), Some(fast_options()))?;
    assert_eq!(encoder.time_base(), Rational::new(1, 30));

    for pts in 0..3 {
        encoder.send_frame(&black_frame(160, 120, pts))?;
    }
    encoder.send_eof()?;

    let packet = encoder.receive_packet()?.expect("flushed packet");
    assert_eq!(packet.time_base(), Rational::new(1, 30));
    assert!(packet.size() > 0);

    Ok(())
}
