//! # Admin Commands
//!
//! Text command surface for operators. The host checks permissions and
//! resolves player names; this module parses and executes.
//!
//! ```text
//! checksum <player>                     manual checksum violation
//! passkey <player>                      manual passkey violation
//! checksum refresh                      regenerate CheckSum_init
//! checksum|passkey step                 list ladder
//! checksum|passkey step <i>             show step i (0-29)
//! checksum|passkey step <i> <seconds>   set step i (-1 = permanent, 0 = warning)
//! ```

use crate::error::GuardError;
use crate::guard::Guard;
use crate::punishment::{
    format_duration, LadderError, ViolationCategory, MAX_LADDER_STEPS, PERMANENT,
};
use crate::verification::Player;
use thiserror::Error;

/// Optional root word in front of every command.
pub const COMMAND_ROOT: &str = "modsentry";

/// A parsed admin command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminCommand {
    /// Record a violation against a player.
    Violation {
        /// Category to count against.
        category: ViolationCategory,
        /// Player name as typed.
        player: String,
    },
    /// Regenerate the reference artifact.
    Refresh,
    /// Show a whole ladder.
    ListSteps(ViolationCategory),
    /// Show one step.
    GetStep {
        /// Ladder.
        category: ViolationCategory,
        /// Step index.
        index: usize,
    },
    /// Change one step.
    SetStep {
        /// Ladder.
        category: ViolationCategory,
        /// Step index.
        index: usize,
        /// New duration in seconds.
        duration: i64,
    },
}

/// Why a command failed.
#[derive(Error, Debug)]
pub enum AdminError {
    /// Unrecognized command shape.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// Index not a number in `[0, 29]`.
    #[error("invalid step index '{0}' (0-{})", MAX_LADDER_STEPS - 1)]
    InvalidIndex(String),

    /// Duration not a number `>= -1`.
    #[error("invalid duration '{0}' (-1 = permanent, 0 = warning, >0 = seconds)")]
    InvalidDuration(String),

    /// The host could not resolve the player.
    #[error("player not found: {0}")]
    PlayerNotFound(String),

    /// The guard rejected the operation.
    #[error(transparent)]
    Guard(#[from] GuardError),
}

impl From<LadderError> for AdminError {
    fn from(err: LadderError) -> Self {
        Self::Guard(GuardError::Ladder(err))
    }
}

const USAGE: &str = "checksum|passkey <player> | checksum refresh | checksum|passkey step [index [duration]]";

impl AdminCommand {
    /// Parses a command line.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError`] for unknown shapes or out-of-range numbers.
    pub fn parse(line: &str) -> Result<Self, AdminError> {
        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first() == Some(&COMMAND_ROOT) {
            tokens.remove(0);
        }

        let (category, rest) = match tokens.split_first() {
            Some((head, rest)) => (
                head.parse::<ViolationCategory>()
                    .map_err(|()| AdminError::Usage(USAGE))?,
                rest,
            ),
            None => return Err(AdminError::Usage(USAGE)),
        };

        match rest {
            ["refresh"] => match category {
                ViolationCategory::Checksum => Ok(Self::Refresh),
                ViolationCategory::Passkey => Err(AdminError::Usage(USAGE)),
            },
            ["step"] => Ok(Self::ListSteps(category)),
            ["step", index] => Ok(Self::GetStep {
                category,
                index: parse_index(index)?,
            }),
            ["step", index, duration] => Ok(Self::SetStep {
                category,
                index: parse_index(index)?,
                duration: parse_duration(duration)?,
            }),
            [player] => Ok(Self::Violation {
                category,
                player: (*player).to_string(),
            }),
            _ => Err(AdminError::Usage(USAGE)),
        }
    }

    /// Runs the command and returns the feedback line for the admin.
    ///
    /// `resolve` maps a typed player name to the host's player record.
    ///
    /// # Errors
    ///
    /// Fails if the player is unknown or the guard rejects the operation.
    pub fn execute(
        &self,
        guard: &Guard,
        admin: &str,
        resolve: impl Fn(&str) -> Option<Player>,
    ) -> Result<String, AdminError> {
        match self {
            Self::Violation { category, player } => {
                let target = resolve(player.as_str())
                    .ok_or_else(|| AdminError::PlayerNotFound(player.clone()))?;
                let (count, enforcement) = guard.record_manual_violation(&target, *category, admin);
                Ok(format!(
                    "{} violation recorded for {}. Total violations: {count}. Punishment: {enforcement}",
                    title(*category),
                    target.name
                ))
            }
            Self::Refresh => {
                guard.force_regenerate()?;
                tracing::info!(admin, "reference regenerated by admin");
                Ok("Reference checksum regenerated".to_string())
            }
            Self::ListSteps(category) => Ok(format!(
                "{} punishment steps: {}",
                title(*category),
                guard.ladder(*category)
            )),
            Self::GetStep { category, index } => {
                let duration = guard.get_step(*category, *index)?;
                Ok(format!(
                    "{} punishment step {index}: {}",
                    title(*category),
                    format_duration(duration)
                ))
            }
            Self::SetStep {
                category,
                index,
                duration,
            } => {
                guard.set_step(*category, *index, *duration)?;
                tracing::info!(admin, %category, index, duration, "admin set punishment step");
                Ok(format!(
                    "{} punishment step {index} set to: {}",
                    title(*category),
                    format_duration(*duration)
                ))
            }
        }
    }
}

fn title(category: ViolationCategory) -> &'static str {
    match category {
        ViolationCategory::Checksum => "Checksum",
        ViolationCategory::Passkey => "Passkey",
    }
}

fn parse_index(raw: &str) -> Result<usize, AdminError> {
    raw.parse::<usize>()
        .ok()
        .filter(|i| *i < MAX_LADDER_STEPS)
        .ok_or_else(|| AdminError::InvalidIndex(raw.to_string()))
}

fn parse_duration(raw: &str) -> Result<i64, AdminError> {
    raw.parse::<i64>()
        .ok()
        .filter(|d| *d >= PERMANENT)
        .ok_or_else(|| AdminError::InvalidDuration(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_tree() {
        assert_eq!(
            AdminCommand::parse("checksum Steve").unwrap(),
            AdminCommand::Violation {
                category: ViolationCategory::Checksum,
                player: "Steve".into()
            }
        );
        assert_eq!(
            AdminCommand::parse("modsentry passkey Alex").unwrap(),
            AdminCommand::Violation {
                category: ViolationCategory::Passkey,
                player: "Alex".into()
            }
        );
        assert_eq!(AdminCommand::parse("checksum refresh").unwrap(), AdminCommand::Refresh);
        assert_eq!(
            AdminCommand::parse("passkey step").unwrap(),
            AdminCommand::ListSteps(ViolationCategory::Passkey)
        );
        assert_eq!(
            AdminCommand::parse("checksum step 3").unwrap(),
            AdminCommand::GetStep {
                category: ViolationCategory::Checksum,
                index: 3
            }
        );
        assert_eq!(
            AdminCommand::parse("  checksum   step 29 -1 ").unwrap(),
            AdminCommand::SetStep {
                category: ViolationCategory::Checksum,
                index: 29,
                duration: -1
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(AdminCommand::parse(""), Err(AdminError::Usage(_))));
        assert!(matches!(AdminCommand::parse("ban Steve"), Err(AdminError::Usage(_))));
        assert!(matches!(AdminCommand::parse("passkey refresh"), Err(AdminError::Usage(_))));
        assert!(matches!(AdminCommand::parse("checksum a b"), Err(AdminError::Usage(_))));
        assert!(matches!(
            AdminCommand::parse("checksum step 30"),
            Err(AdminError::InvalidIndex(_))
        ));
        assert!(matches!(
            AdminCommand::parse("checksum step -1"),
            Err(AdminError::InvalidIndex(_))
        ));
        assert!(matches!(
            AdminCommand::parse("passkey step 0 -2"),
            Err(AdminError::InvalidDuration(_))
        ));
        assert!(matches!(
            AdminCommand::parse("passkey step 0 soon"),
            Err(AdminError::InvalidDuration(_))
        ));
    }
}
