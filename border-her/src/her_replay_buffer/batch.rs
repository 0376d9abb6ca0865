//! Batch of transitions sampled from [`HerReplayBuffer`](super::HerReplayBuffer).
use ndarray::Array2;

/// A batch of transitions, one transition per row.
///
/// Observations and rewards are already passed through the
/// [`Normalizer`](crate::Normalizer) of the replay buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct HerBatch {
    /// Observations `o_t`.
    pub obs: Array2<f32>,

    /// Actions `a_t`.
    pub act: Array2<f32>,

    /// Next observations `o_t+1`.
    pub next_obs: Array2<f32>,

    /// Rewards `r_t`, recomputed for relabeled transitions.
    pub reward: Vec<f32>,

    /// Episode termination flags.
    pub is_done: Vec<i8>,

    /// `1` if the desired goal of the row was substituted.
    pub is_relabeled: Vec<i8>,

    /// Indices of the sampled slots. Episode indices when goals are relabeled at sampling time.
    pub ix_sample: Vec<usize>,
}

impl HerBatch {
    /// Unpacks the data `(o_t, a_t, o_t+1, is_done_t, r_t)`.
    pub fn unpack(self) -> (Array2<f32>, Array2<f32>, Array2<f32>, Vec<i8>, Vec<f32>) {
        (self.obs, self.act, self.next_obs, self.is_done, self.reward)
    }

    /// Returns the number of transitions in the batch.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    /// Returns `true` if the batch has no transitions.
    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }

    /// Fraction of rows with a substituted desired goal.
    pub fn relabeled_ratio(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let n = self.is_relabeled.iter().map(|&f| f as usize).sum::<usize>();
        n as f32 / self.len() as f32
    }
}
