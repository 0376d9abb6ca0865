//! Goal-conditioned environment interface.
use anyhow::Result;
use ndarray::{Array1, ArrayView1, ArrayView2};

/// Observation of a goal-conditioned environment decomposed into named fields.
#[derive(Clone, Debug, PartialEq)]
pub struct GoalObsDict {
    /// Observation part excluding goals.
    pub observation: Array1<f32>,

    /// Goal actually achieved at the timestep.
    pub achieved_goal: Array1<f32>,

    /// Goal the agent was trying to achieve at the timestep.
    pub desired_goal: Array1<f32>,
}

/// Capabilities of a goal-conditioned environment used by the HER replay buffer.
///
/// The replay buffer stores observations as flat arrays and never inspects their
/// structure by itself. Every access to the goals goes through this trait.
pub trait GoalEnv {
    /// Additional information passed to the reward function.
    ///
    /// The replay buffer always passes `None`.
    type Info;

    /// Decomposes a flat observation into a [`GoalObsDict`].
    fn convert_obs_to_dict(&self, obs: ArrayView1<f32>) -> Result<GoalObsDict>;

    /// Reassembles a flat observation from a [`GoalObsDict`].
    ///
    /// Fields are expected to have the lengths given by
    /// [`convert_obs_to_dict`](Self::convert_obs_to_dict). Other lengths yield a flat
    /// observation of another length, which the replay buffer rejects when storing it.
    fn convert_dict_to_obs(&self, dict: &GoalObsDict) -> Array1<f32>;

    /// Computes the reward for reaching `achieved_goal` when `desired_goal` is desired.
    fn compute_reward(
        &self,
        achieved_goal: ArrayView1<f32>,
        desired_goal: ArrayView1<f32>,
        info: Option<&Self::Info>,
    ) -> f32;

    /// Computes rewards row by row.
    fn compute_rewards(
        &self,
        achieved_goals: ArrayView2<f32>,
        desired_goals: ArrayView2<f32>,
        info: Option<&Self::Info>,
    ) -> Vec<f32> {
        achieved_goals
            .outer_iter()
            .zip(desired_goals.outer_iter())
            .map(|(ag, dg)| self.compute_reward(ag, dg, info))
            .collect()
    }
}
