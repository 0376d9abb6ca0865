//! Normalization of sampled batches.
use ndarray::Array2;

/// Normalizes observations and rewards of a sampled batch.
///
/// Applied by [`HerReplayBuffer`](crate::HerReplayBuffer) to every batch right before
/// it is returned. Stored data are never modified.
pub trait Normalizer {
    /// Normalizes a batch of observations, one observation per row.
    fn normalize_obs(&self, obs: Array2<f32>) -> Array2<f32>;

    /// Normalizes a batch of rewards.
    fn normalize_reward(&self, reward: Vec<f32>) -> Vec<f32>;
}
