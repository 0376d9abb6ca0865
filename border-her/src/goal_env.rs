//! Goal environment for flat observations made of concatenated fields.
use crate::{error::HerError, GoalEnv, GoalObsDict};
use anyhow::Result;
use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Configuration of [`ConcatGoalEnv`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ConcatGoalEnvConfig {
    /// Length of the observation part.
    pub obs_dim: usize,

    /// Length of a goal.
    pub goal_dim: usize,

    /// Goals closer than this distance are regarded as achieved.
    pub distance_threshold: f32,
}

impl Default for ConcatGoalEnvConfig {
    fn default() -> Self {
        Self {
            obs_dim: 10,
            goal_dim: 3,
            distance_threshold: 0.05,
        }
    }
}

impl ConcatGoalEnvConfig {
    /// Sets the length of the observation part.
    pub fn obs_dim(mut self, obs_dim: usize) -> Self {
        self.obs_dim = obs_dim;
        self
    }

    /// Sets the length of a goal.
    pub fn goal_dim(mut self, goal_dim: usize) -> Self {
        self.goal_dim = goal_dim;
        self
    }

    /// Sets the distance threshold.
    pub fn distance_threshold(mut self, distance_threshold: f32) -> Self {
        self.distance_threshold = distance_threshold;
        self
    }
}

/// A [`GoalEnv`] for flat observations laid out as
/// `[observation, achieved_goal, desired_goal]`.
///
/// The reward is sparse: `0` if the Euclidean distance between the achieved and the
/// desired goal is within the threshold, `-1` otherwise.
#[derive(Debug, Clone)]
pub struct ConcatGoalEnv {
    config: ConcatGoalEnvConfig,
}

impl ConcatGoalEnv {
    /// Builds the converter.
    pub fn build(config: &ConcatGoalEnvConfig) -> Result<Self> {
        if config.goal_dim == 0 {
            return Err(HerError::InvalidConfig("goal_dim must be positive".into()).into());
        }
        Ok(Self {
            config: config.clone(),
        })
    }

    /// Length of flat observations.
    pub fn flat_obs_dim(&self) -> usize {
        self.config.obs_dim + 2 * self.config.goal_dim
    }

    /// Length of a goal.
    pub fn goal_dim(&self) -> usize {
        self.config.goal_dim
    }
}

impl GoalEnv for ConcatGoalEnv {
    type Info = ();

    fn convert_obs_to_dict(&self, obs: ArrayView1<f32>) -> Result<GoalObsDict> {
        if obs.len() != self.flat_obs_dim() {
            return Err(HerError::DimensionMismatch {
                name: "obs",
                expected: self.flat_obs_dim(),
                actual: obs.len(),
            }
            .into());
        }
        let o = self.config.obs_dim;
        let g = self.config.goal_dim;
        Ok(GoalObsDict {
            observation: obs.slice(s![..o]).to_owned(),
            achieved_goal: obs.slice(s![o..o + g]).to_owned(),
            desired_goal: obs.slice(s![o + g..]).to_owned(),
        })
    }

    fn convert_dict_to_obs(&self, dict: &GoalObsDict) -> Array1<f32> {
        dict.observation
            .iter()
            .chain(dict.achieved_goal.iter())
            .chain(dict.desired_goal.iter())
            .cloned()
            .collect()
    }

    fn compute_reward(
        &self,
        achieved_goal: ArrayView1<f32>,
        desired_goal: ArrayView1<f32>,
        _info: Option<&Self::Info>,
    ) -> f32 {
        let d = achieved_goal
            .iter()
            .zip(desired_goal.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt();
        if d > self.config.distance_threshold {
            -1.0
        } else {
            0.0
        }
    }
}
