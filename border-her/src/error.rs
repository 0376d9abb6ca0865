//! Errors in the library.
use thiserror::Error;

/// Errors raised by [`HerReplayBuffer`](crate::HerReplayBuffer).
#[derive(Error, Debug, PartialEq)]
pub enum HerError {
    /// The goal selection strategy given as a string is not known.
    #[error("Unknown goal selection strategy: {0}, expected one of future, final, episode, random")]
    UnknownGoalSelectionStrategy(String),

    /// Only a single environment is supported.
    #[error("Replay buffer only supports a single environment, got n_envs = {0}")]
    UnsupportedNumEnvs(usize),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An episode handed to the per-episode storage is malformed.
    #[error("Invalid episode shape: {0}")]
    InvalidEpisodeShape(String),

    /// Length of an observation, action or goal does not match.
    #[error("Dimension mismatch of {name}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Name of the mismatched quantity.
        name: &'static str,

        /// Expected length.
        expected: usize,

        /// Actual length.
        actual: usize,
    },

    /// Future goals cannot be sampled from the last transition of an episode.
    #[error("No future goal after transition {ix} in an episode of length {len}")]
    NoFutureGoal {
        /// Index of the source transition.
        ix: usize,

        /// Length of the episode.
        len: usize,
    },

    /// Sampling was requested before any transition was stored.
    #[error("Replay buffer is empty")]
    EmptyBuffer,
}
