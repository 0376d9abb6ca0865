//! Configuration of [`HerReplayBuffer`](super::HerReplayBuffer).
use crate::error::HerError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fmt,
    fs::File,
    io::{BufReader, Write},
    path::Path,
    str::FromStr,
};

/// Strategies for selecting substitute goals when creating relabeled transitions.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum GoalSelectionStrategy {
    /// A goal achieved after the current step in the same episode.
    Future,

    /// The goal achieved at the end of the episode.
    Final,

    /// A goal achieved anywhere in the episode.
    Episode,

    /// A goal achieved anywhere in the replay buffer.
    Random,
}

impl FromStr for GoalSelectionStrategy {
    type Err = HerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "future" => Ok(Self::Future),
            "final" => Ok(Self::Final),
            "episode" => Ok(Self::Episode),
            "random" => Ok(Self::Random),
            _ => Err(HerError::UnknownGoalSelectionStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for GoalSelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Future => "future",
            Self::Final => "final",
            Self::Episode => "episode",
            Self::Random => "random",
        };
        write!(f, "{}", s)
    }
}

/// Configuration of [`HerReplayBuffer`](super::HerReplayBuffer).
///
/// # Examples
///
/// ```
/// use border_her::{GoalSelectionStrategy, HerReplayBufferConfig};
///
/// let config = HerReplayBufferConfig::default()
///     .buffer_size(100_000)
///     .max_episode_len(50)
///     .obs_dim(16)
///     .act_dim(4)
///     .add_her_while_sampling(true)
///     .goal_selection_strategy(GoalSelectionStrategy::Future)
///     .n_sampled_goal(4);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct HerReplayBufferConfig {
    /// Total number of transitions the buffer can hold.
    ///
    /// When episodes are stored as a whole, the buffer holds
    /// `buffer_size / max_episode_len` episodes.
    pub buffer_size: usize,

    /// Upper bound of the episode length.
    pub max_episode_len: usize,

    /// Number of environments. Must be 1.
    pub n_envs: usize,

    /// If `true`, episodes are stored as a whole and goals are relabeled at sampling time.
    /// Otherwise, relabeled transitions are generated and stored when an episode ends.
    pub add_her_while_sampling: bool,

    /// Strategy for selecting substitute goals.
    pub goal_selection_strategy: GoalSelectionStrategy,

    /// Number of relabeled transitions per real transition.
    pub n_sampled_goal: usize,

    /// Length of flat observations.
    pub obs_dim: usize,

    /// Length of actions.
    pub act_dim: usize,

    /// Random seed.
    pub seed: u64,
}

impl Default for HerReplayBufferConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1_000_000,
            max_episode_len: 50,
            n_envs: 1,
            add_her_while_sampling: false,
            goal_selection_strategy: GoalSelectionStrategy::Future,
            n_sampled_goal: 4,
            obs_dim: 0,
            act_dim: 0,
            seed: 42,
        }
    }
}

impl HerReplayBufferConfig {
    /// Sets the total capacity in transitions.
    ///
    /// # Arguments
    ///
    /// * `buffer_size` - Total number of transitions the buffer holds
    ///
    /// # Returns
    ///
    /// The modified configuration
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Sets the upper bound of the episode length.
    ///
    /// # Arguments
    ///
    /// * `max_episode_len` - Longest episode the buffer accepts
    ///
    /// # Returns
    ///
    /// The modified configuration
    pub fn max_episode_len(mut self, max_episode_len: usize) -> Self {
        self.max_episode_len = max_episode_len;
        self
    }

    /// Sets the number of environments.
    ///
    /// # Arguments
    ///
    /// * `n_envs` - Number of environments feeding the buffer, must be 1
    ///
    /// # Returns
    ///
    /// The modified configuration
    pub fn n_envs(mut self, n_envs: usize) -> Self {
        self.n_envs = n_envs;
        self
    }

    /// Selects relabeling at sampling time (`true`) or at storing time (`false`).
    ///
    /// # Arguments
    ///
    /// * `v` - `true` to relabel at sampling time, `false` to relabel at storing time
    ///
    /// # Returns
    ///
    /// The modified configuration
    pub fn add_her_while_sampling(mut self, v: bool) -> Self {
        self.add_her_while_sampling = v;
        self
    }

    /// Sets the goal selection strategy.
    ///
    /// # Arguments
    ///
    /// * `strategy` - How substitute goals are selected
    ///
    /// # Returns
    ///
    /// The modified configuration
    pub fn goal_selection_strategy(mut self, strategy: GoalSelectionStrategy) -> Self {
        self.goal_selection_strategy = strategy;
        self
    }

    /// Sets the number of relabeled transitions per real transition.
    ///
    /// # Arguments
    ///
    /// * `n_sampled_goal` - Number of relabeled transitions per real transition
    ///
    /// # Returns
    ///
    /// The modified configuration
    pub fn n_sampled_goal(mut self, n_sampled_goal: usize) -> Self {
        self.n_sampled_goal = n_sampled_goal;
        self
    }

    /// Sets the length of flat observations.
    ///
    /// # Arguments
    ///
    /// * `obs_dim` - Length of flat observations
    ///
    /// # Returns
    ///
    /// The modified configuration
    pub fn obs_dim(mut self, obs_dim: usize) -> Self {
        self.obs_dim = obs_dim;
        self
    }

    /// Sets the length of actions.
    ///
    /// # Arguments
    ///
    /// * `act_dim` - Length of actions
    ///
    /// # Returns
    ///
    /// The modified configuration
    pub fn act_dim(mut self, act_dim: usize) -> Self {
        self.act_dim = act_dim;
        self
    }

    /// Sets the random seed.
    ///
    /// # Arguments
    ///
    /// * `seed` - Seed of the random number generator used for relabeling and sampling
    ///
    /// # Returns
    ///
    /// The modified configuration
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of slots of the storage.
    ///
    /// It is the number of episodes if `add_her_while_sampling` is `true`,
    /// the number of transitions otherwise.
    pub fn n_slots(&self) -> usize {
        if self.add_her_while_sampling {
            self.buffer_size / self.max_episode_len.max(1)
        } else {
            self.buffer_size
        }
    }

    /// Checks the consistency of the configuration.
    pub fn validate(&self) -> Result<(), HerError> {
        if self.n_envs != 1 {
            return Err(HerError::UnsupportedNumEnvs(self.n_envs));
        }
        if self.max_episode_len == 0 {
            return Err(HerError::InvalidConfig("max_episode_len must be positive".into()));
        }
        if self.obs_dim == 0 || self.act_dim == 0 {
            return Err(HerError::InvalidConfig(format!(
                "obs_dim and act_dim must be positive, got {} and {}",
                self.obs_dim, self.act_dim
            )));
        }
        if self.n_slots() == 0 {
            return Err(HerError::InvalidConfig(format!(
                "buffer_size = {} holds no {} (max_episode_len = {})",
                self.buffer_size,
                if self.add_her_while_sampling { "episode" } else { "transition" },
                self.max_episode_len
            )));
        }
        Ok(())
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_her_replay_buffer_config() -> Result<()> {
        let config = HerReplayBufferConfig::default()
            .buffer_size(1000)
            .max_episode_len(10)
            .obs_dim(7)
            .act_dim(2)
            .add_her_while_sampling(true)
            .goal_selection_strategy(GoalSelectionStrategy::Episode);

        let dir = TempDir::new("her_replay_buffer_config")?;
        let path = dir.path().join("her_replay_buffer_config.yaml");
        config.save(&path)?;
        let config_ = HerReplayBufferConfig::load(&path)?;
        assert_eq!(config, config_);

        let yaml = std::fs::read_to_string(&path)?;
        assert!(yaml.contains("goal_selection_strategy: episode"));
        Ok(())
    }

    #[test]
    fn test_unknown_strategy_in_yaml() {
        let yaml = "---\n\
            buffer_size: 100\n\
            max_episode_len: 5\n\
            n_envs: 1\n\
            add_her_while_sampling: false\n\
            goal_selection_strategy: sometimes\n\
            n_sampled_goal: 4\n\
            obs_dim: 3\n\
            act_dim: 1\n\
            seed: 0\n";
        assert!(serde_yaml::from_str::<HerReplayBufferConfig>(yaml).is_err());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("future".parse(), Ok(GoalSelectionStrategy::Future));
        assert_eq!("final".parse(), Ok(GoalSelectionStrategy::Final));
        assert_eq!("episode".parse(), Ok(GoalSelectionStrategy::Episode));
        assert_eq!("random".parse(), Ok(GoalSelectionStrategy::Random));
        assert_eq!(
            "Future".parse::<GoalSelectionStrategy>(),
            Err(HerError::UnknownGoalSelectionStrategy("Future".into()))
        );
        assert_eq!(GoalSelectionStrategy::Final.to_string(), "final");
    }

    #[test]
    fn test_validate() {
        let config = HerReplayBufferConfig::default().obs_dim(3).act_dim(1);
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(
            config.clone().n_envs(2).validate(),
            Err(HerError::UnsupportedNumEnvs(2))
        );
        assert!(config.clone().obs_dim(0).validate().is_err());
        assert!(config.clone().max_episode_len(0).validate().is_err());
        assert!(config
            .clone()
            .buffer_size(4)
            .max_episode_len(5)
            .add_her_while_sampling(true)
            .validate()
            .is_err());
        assert_eq!(
            config
                .buffer_size(100)
                .max_episode_len(5)
                .add_her_while_sampling(true)
                .n_slots(),
            20
        );
    }
}
