//! Hindsight experience replay (HER) buffer.
//!
//! In goal-conditioned tasks with sparse rewards, most episodes end without reaching
//! the desired goal. HER turns them into useful training signal by replaying
//! transitions as if a goal that was actually achieved had been desired, recomputing
//! the reward accordingly.
//!
//! # Key Components
//!
//! - [`HerReplayBuffer`]: The replay buffer, built from a [`HerReplayBufferConfig`]
//! - [`GoalSelectionStrategy`]: How substitute goals are selected
//! - [`HerBatch`]: A batch of sampled transitions
//!
//! # Storage layouts
//!
//! With `add_her_while_sampling = false`, relabeled transitions are generated when an
//! episode ends and stored next to the real ones, one transition per slot. With
//! `add_her_while_sampling = true`, episodes are stored as a whole and a fraction of the
//! sampled transitions is relabeled on the fly.
mod base;
mod batch;
mod config;
mod episode;
mod relabel;
mod sampler;
mod storage;
pub use base::HerReplayBuffer;
pub use batch::HerBatch;
pub use config::{GoalSelectionStrategy, HerReplayBufferConfig};
pub use relabel::relabel_transition;
