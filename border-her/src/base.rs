//! Core functionalities.
mod goal_env;
mod normalizer;
mod replay_buffer;
mod transition;
pub use goal_env::{GoalEnv, GoalObsDict};
pub use normalizer::Normalizer;
pub use replay_buffer::{ExperienceBufferBase, ReplayBufferBase};
pub use transition::Transition;
