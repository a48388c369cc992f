use crate::model::Clip;
use crate::tools::command_from_template;
use anyhow::{Context, Result};
use std::process::ExitStatus;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackOutcome {
    pub success: bool,
    pub failure_detail: Option<String>,
}

impl PlaybackOutcome {
    pub fn completed() -> Self {
        Self {
            success: true,
            failure_detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            failure_detail: Some(detail.into()),
        }
    }
}

/// `Err` means the player could not be started at all. A player that ran but
/// did not finish cleanly is an `Ok` outcome with `success == false`.
pub trait Player {
    fn play(&mut self, clip: &Clip) -> Result<PlaybackOutcome>;
}

pub struct CommandPlayer {
    template: Vec<String>,
}

impl CommandPlayer {
    pub fn new(template: Vec<String>) -> Self {
        Self { template }
    }
}

impl Player for CommandPlayer {
    fn play(&mut self, clip: &Clip) -> Result<PlaybackOutcome> {
        let path = clip.file_path.display().to_string();
        let id = clip.id.to_string();
        let mut cmd = command_from_template(
            &self.template,
            &[("path", path.as_str()), ("name", clip.name.as_str()), ("id", id.as_str())],
        )?;
        debug!(program = ?cmd.get_program(), clip = %clip.id, "launching player");

        let status = cmd
            .status()
            .with_context(|| format!("failed to launch player for clip {}", clip.id))?;
        Ok(outcome_from_status(status))
    }
}

fn outcome_from_status(status: ExitStatus) -> PlaybackOutcome {
    if status.success() {
        return PlaybackOutcome::completed();
    }
    match status.code() {
        Some(code) => PlaybackOutcome::failed(format!("player exited with status {code}")),
        None => PlaybackOutcome::failed("player was terminated by a signal"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::model::ClipId;

    fn clip() -> Clip {
        Clip::new(ClipId(3), "Three", "/nonexistent/3.mp4")
    }

    #[test]
    fn zero_exit_is_success() {
        let mut player = CommandPlayer::new(vec![String::from("true")]);
        assert_eq!(player.play(&clip()).expect("run"), PlaybackOutcome::completed());
    }

    #[test]
    fn nonzero_exit_is_failure() {
        let mut player = CommandPlayer::new(vec![
            String::from("sh"),
            String::from("-c"),
            String::from("exit 3"),
        ]);
        let outcome = player.play(&clip()).expect("run");
        assert!(!outcome.success);
        assert_eq!(
            outcome.failure_detail.as_deref(),
            Some("player exited with status 3")
        );
    }

    #[test]
    fn placeholders_reach_the_player() {
        let mut player = CommandPlayer::new(vec![
            String::from("sh"),
            String::from("-c"),
            String::from("test \"$0\" = /nonexistent/3.mp4 && test \"$1\" = 3"),
            String::from("{path}"),
            String::from("{id}"),
        ]);
        assert!(player.play(&clip()).expect("run").success);
    }

    #[test]
    fn missing_binary_is_launch_error() {
        let mut player = CommandPlayer::new(vec![String::from("no-such-player-binary")]);
        assert!(player.play(&clip()).is_err());
    }
}
