//! Transition.
use ndarray::Array1;

/// Represents a transition `(o_t, a_t, r_t, o_t+1, is_done_t)`.
///
/// Observations are flat arrays. Their decomposition into an observation,
/// an achieved goal and a desired goal is given by a [`GoalEnv`](crate::GoalEnv).
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// Observation `o_t`.
    pub obs: Array1<f32>,

    /// Next observation `o_t+1`.
    pub next_obs: Array1<f32>,

    /// Action `a_t`.
    pub act: Array1<f32>,

    /// Reward `r_t`.
    pub reward: f32,

    /// Flag denoting if the episode ends at this transition.
    pub is_done: bool,
}

impl Transition {
    /// Constructs a [`Transition`] object.
    pub fn new(
        obs: Array1<f32>,
        next_obs: Array1<f32>,
        act: Array1<f32>,
        reward: f32,
        is_done: bool,
    ) -> Self {
        Self {
            obs,
            next_obs,
            act,
            reward,
            is_done,
        }
    }
}
