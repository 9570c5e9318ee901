use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

mod convert;
mod error;
mod pipeline;
mod profile;
mod source;

use crate::{convert::Converter, profile::ProfileRegistry};

#[derive(Parser)]
#[command(name = "radiumvod", about = "ABR transcoder: decode once, encode many")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transcode one input into one MP4 per selected profile.
    Convert {
        /// Input media file.
        #[arg(short, long)]
        input: PathBuf,
        /// Output base path; each profile writes `<base>_<profile>.mp4`.
        #[arg(short, long)]
        output: PathBuf,
        /// Output format.
        #[arg(short, long, default_value = "h264")]
        format: String,
        /// Profile name, or `all` for the whole ladder.
        #[arg(short, long, default_value = "high")]
        profile: String,
        /// JSON file overriding the built-in profile ladder.
        #[arg(long)]
        profiles: Option<PathBuf>,
    },
}

fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let code = match cli.command {
        Command::Convert {
            input,
            output,
            format,
            profile,
            profiles,
        } => run_convert(input, output, &format, &profile, profiles),
    };
    std::process::exit(code);
}

fn run_convert(
    input: PathBuf,
    output: PathBuf,
    format: &str,
    profile: &str,
    profiles: Option<PathBuf>,
) -> i32 {
    if let Err(e) = ffmpeg_pipe::init() {
        log::error!("ffmpeg initialization failed: {:#}", e);
        return 1;
    }

    match format {
        "h264" => {}
        "hls" | "h265" => {
            log::error!("output format not supported: {}", format);
            return 1;
        }
        other => {
            log::error!("unknown output format: {}", other);
            return 1;
        }
    }

    let registry = match profiles {
        Some(path) => match ProfileRegistry::from_json_file(&path) {
            Ok(registry) => registry,
            Err(e) => {
                log::error!("{}", e);
                return 1;
            }
        },
        None => ProfileRegistry::builtin(),
    };

    let selected = match registry.select(profile) {
        Ok(selected) => selected,
        Err(e) => {
            log::error!("{}", e);
            return 1;
        }
    };

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::warn!("interrupt received, stopping after current packet");
        handler_token.cancel();
    }) {
        log::error!("cannot install interrupt handler: {}", e);
        return 1;
    }

    let converter = match Converter::new(&input, &output, &selected, cancel) {
        Ok(converter) => converter,
        Err(e) => {
            log::error!("{}", e);
            return 1;
        }
    };

    match converter.run() {
        Ok(report) => {
            log::info!(
                "done: {} packets read, {} frames decoded",
                report.packets_read,
                report.frames_decoded
            );
            report_outcome(&report)
        }
        Err(e) => {
            log::error!("{}", e);
            1
        }
    }
}

/// Per-pipeline failures were already recovered and logged during the
/// run; they never fail the process. Nonzero exits are reserved for
/// open, configuration and zero-surviving-pipeline errors.
fn report_outcome(report: &convert::ConvertReport) -> i32 {
    for pipeline in &report.pipelines {
        if pipeline.dead {
            log::error!(
                "profile {}: output incomplete at {}",
                pipeline.profile,
                pipeline.output.display()
            );
        } else {
            log::info!(
                "profile {}: {} ({} video / {} audio packets, {} skipped)",
                pipeline.profile,
                pipeline.output.display(),
                pipeline.stats.video_packets,
                pipeline.stats.audio_packets,
                pipeline.stats.frames_skipped
            );
        }
    }
    0
}
