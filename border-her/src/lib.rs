#![warn(missing_docs)]
//! Hindsight experience replay for goal-conditioned reinforcement learning.
pub mod error;
pub mod goal_env;
pub mod her_replay_buffer;
pub mod normalizer;

mod base;
pub use base::{
    ExperienceBufferBase, GoalEnv, GoalObsDict, Normalizer, ReplayBufferBase, Transition,
};
pub use error::HerError;
pub use goal_env::{ConcatGoalEnv, ConcatGoalEnvConfig};
pub use her_replay_buffer::{
    GoalSelectionStrategy, HerBatch, HerReplayBuffer, HerReplayBufferConfig,
};
pub use normalizer::{IdentityNormalizer, RunningMeanStdNormalizer};
