//! ffmpeg command line for MP3 extraction

use std::ffi::OsString;
use std::path::Path;

use crate::config::AudioProfile;

/// MP3 encoder passed to `-acodec`
pub const MP3_ENCODER: &str = "libmp3lame";

/// Arguments that extract the audio of `source` into `output` as MP3.
///
/// The profile is applied verbatim; nothing is inferred from the input,
/// so a mono source still comes out with `profile.channels` channels.
pub fn mp3_args(source: &Path, output: &Path, profile: &AudioProfile) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(14);
    args.push("-y".into());
    args.push("-i".into());
    args.push(source.into());
    args.push("-vn".into());
    args.push("-acodec".into());
    args.push(MP3_ENCODER.into());
    args.push("-b:a".into());
    args.push(profile.bitrate.trim().into());
    args.push("-ar".into());
    args.push(profile.sample_rate.to_string().into());
    args.push("-ac".into());
    args.push(profile.channels.to_string().into());
    args.push(output.into());
    args
}
