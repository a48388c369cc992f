use crate::model::ClipId;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "cliploop",
    version,
    about = "Play a folder of video clips in order, resuming where the last run stopped"
)]
pub struct Cli {
    /// Directory holding config.json, playlist.json and progress.json
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Log at debug level (CLIPLOOP_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rescan the video folders and update the playlist
    Rebuild {
        /// Folder to scan; repeatable. Defaults to the folders in config.json
        #[arg(long = "folder", value_name = "DIR")]
        folders: Vec<PathBuf>,
        /// Store the given folders in config.json
        #[arg(long, requires = "folders")]
        save_folders: bool,
        /// Read clip durations with ffprobe
        #[arg(long)]
        probe: bool,
    },
    /// Play the clip after the last one played
    Next,
    /// Play a specific clip, then continue from it next time
    Play { id: ClipId },
    /// Keep playing clips until interrupted
    Run {
        /// Start at this clip instead of the resume position
        #[arg(long, value_name = "ID")]
        from: Option<ClipId>,
        /// Stop after this many clips
        #[arg(long)]
        count: Option<usize>,
    },
    /// Show the resume position and what plays next
    Status,
    /// List clips in playback order
    List {
        /// Include clips whose files are missing
        #[arg(long)]
        all: bool,
    },
    /// Forget the resume position so playback starts from the first clip
    Reset,
    /// Re-encode raw downloads to the target bitrate
    Normalize {
        /// Folder to process; repeatable. Defaults to the folders in config.json
        #[arg(long = "folder", value_name = "DIR")]
        folders: Vec<PathBuf>,
    },
    /// Download videos with the configured downloader
    Acquire {
        urls: Vec<String>,
        /// File with one URL per line
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
        /// Destination folder. Defaults to download_dir, then the first folder
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_play_with_id() {
        let cli = Cli::try_parse_from(["cliploop", "play", "42"]).expect("parse");
        assert!(matches!(cli.command, Command::Play { id: ClipId(42) }));
    }

    #[test]
    fn parses_repeated_folders_and_global_flags() {
        let cli = Cli::try_parse_from([
            "cliploop", "rebuild", "--folder", "/a", "--folder", "/b", "--config-dir", "/cfg",
        ])
        .expect("parse");
        assert_eq!(cli.config_dir, Some(PathBuf::from("/cfg")));
        match cli.command {
            Command::Rebuild { folders, .. } => {
                assert_eq!(folders, vec![PathBuf::from("/a"), PathBuf::from("/b")])
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_non_numeric_id() {
        assert!(Cli::try_parse_from(["cliploop", "play", "abc"]).is_err());
    }
}
