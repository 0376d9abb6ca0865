//! Hindsight experience replay buffer.
use super::{
    episode::EpisodeAccumulator,
    relabel::GoalRelabeler,
    sampler,
    storage::{EpisodeStorage, FlatStorage, Storage},
    GoalSelectionStrategy, HerBatch, HerReplayBufferConfig,
};
use crate::{
    error::HerError, ExperienceBufferBase, GoalEnv, IdentityNormalizer, Normalizer,
    ReplayBufferBase, Transition,
};
use anyhow::Result;
use log::{debug, info, trace};
use ndarray::{stack, Array1, Array2, Axis};
use rand::{rngs::StdRng, SeedableRng};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// A replay buffer relabeling desired goals with achieved ones (HER).
///
/// Transitions are accumulated until the episode ends, then handed to the storage.
/// Relabeling happens either when an episode is stored or when a batch is sampled,
/// selected by [`HerReplayBufferConfig::add_her_while_sampling`].
///
/// ```mermaid
/// graph LR
///     add --> EpisodeAccumulator
///     EpisodeAccumulator -->|done| store_episode
///     store_episode -->|storing time| GoalRelabeler --> FlatStorage
///     store_episode -->|sampling time| EpisodeStorage
///     FlatStorage --> sample
///     EpisodeStorage --> GoalRelabeler2[GoalRelabeler] --> sample
///     sample --> Normalizer --> HerBatch
/// ```
///
/// * Storing time relabeling keeps one transition per slot. For each transition of
///   an episode, `n_sampled_goal` relabeled copies are stored right after it.
/// * Sampling time relabeling keeps one episode per slot and relabels each sampled
///   row with probability `1 - 1 / (1 + n_sampled_goal)`.
///
/// The buffer is single threaded. Wrap it in a lock to share it between a collector
/// and a learner.
///
/// # Examples
///
/// ```
/// use border_her::{
///     ConcatGoalEnv, ConcatGoalEnvConfig, ExperienceBufferBase, HerReplayBuffer,
///     HerReplayBufferConfig,
/// };
/// use ndarray::arr1;
///
/// # fn main() -> anyhow::Result<()> {
/// let env_config = ConcatGoalEnvConfig::default().obs_dim(1).goal_dim(1);
/// let env = ConcatGoalEnv::build(&env_config)?;
/// let config = HerReplayBufferConfig::default()
///     .buffer_size(100)
///     .max_episode_len(5)
///     .obs_dim(env.flat_obs_dim())
///     .act_dim(1);
/// let mut buffer = HerReplayBuffer::build(&config, env)?;
///
/// buffer.add(arr1(&[0., 0., 1.]), arr1(&[0., 1., 1.]), arr1(&[0.5]), 0., false)?;
/// buffer.add(arr1(&[0., 1., 1.]), arr1(&[0., 2., 1.]), arr1(&[0.5]), -1., true)?;
/// assert_eq!(buffer.len(), 2 + 4);
///
/// let batch = buffer.sample(8)?;
/// assert_eq!(batch.len(), 8);
/// # Ok(())
/// # }
/// ```
pub struct HerReplayBuffer<E, N = IdentityNormalizer>
where
    E: GoalEnv,
    N: Normalizer,
{
    config: HerReplayBufferConfig,

    /// Decomposes observations and computes rewards.
    env: E,

    normalizer: N,

    storage: Storage,

    /// Transitions of the episode in progress.
    episode: EpisodeAccumulator,

    relabeler: GoalRelabeler,

    rng: StdRng,
}

impl<E: GoalEnv> HerReplayBuffer<E, IdentityNormalizer> {
    /// Builds a replay buffer returning batches without normalization.
    pub fn build(config: &HerReplayBufferConfig, env: E) -> Result<Self> {
        Self::build_with_normalizer(config, env, IdentityNormalizer)
    }
}

impl<E, N> HerReplayBuffer<E, N>
where
    E: GoalEnv,
    N: Normalizer,
{
    /// Builds a replay buffer applying `normalizer` to sampled batches.
    ///
    /// All the storage is allocated here.
    pub fn build_with_normalizer(config: &HerReplayBufferConfig, env: E, normalizer: N) -> Result<Self> {
        config.validate()?;

        let n_slots = config.n_slots();
        let storage = if config.add_her_while_sampling {
            Storage::Episodic(EpisodeStorage::new(
                n_slots,
                config.max_episode_len,
                config.obs_dim,
                config.act_dim,
            ))
        } else {
            Storage::Flat(FlatStorage::new(n_slots, config.obs_dim, config.act_dim))
        };
        info!(
            "Build HER replay buffer: {} slots of {}, strategy = {}, n_sampled_goal = {}",
            n_slots,
            if config.add_her_while_sampling { "episodes" } else { "transitions" },
            config.goal_selection_strategy,
            config.n_sampled_goal,
        );

        Ok(Self {
            config: config.clone(),
            env,
            normalizer,
            storage,
            episode: EpisodeAccumulator::with_capacity(config.max_episode_len),
            relabeler: GoalRelabeler::new(config.goal_selection_strategy, config.n_sampled_goal),
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Adds a transition of the episode in progress.
    ///
    /// The episode is stored when `done` is `true`. Until then, none of its transitions
    /// can be sampled.
    ///
    /// # Arguments
    ///
    /// * `obs` - Flat observation `o_t`
    /// * `next_obs` - Flat observation `o_t+1`
    /// * `act` - Action `a_t`
    /// * `reward` - Reward `r_t`
    /// * `done` - Whether the episode ends at this step
    ///
    /// # Returns
    ///
    /// An error if a length does not match the configuration, or if storing the ended
    /// episode fails. A failed episode is dropped and nothing of it is stored.
    pub fn add(
        &mut self,
        obs: Array1<f32>,
        next_obs: Array1<f32>,
        act: Array1<f32>,
        reward: f32,
        done: bool,
    ) -> Result<()> {
        self.push(Transition::new(obs, next_obs, act, reward, done))
    }

    /// Stores the transitions of an episode.
    ///
    /// Called by [`add`](Self::add) at the end of an episode. Relabeled transitions are
    /// generated here if goals are relabeled at storing time.
    ///
    /// # Arguments
    ///
    /// * `episode` - Transitions of the episode in order
    ///
    /// # Returns
    ///
    /// An error if a goal cannot be extracted or the episode is malformed, in which case
    /// the storage is left as it was.
    pub fn store_episode(&mut self, episode: Vec<Transition>) -> Result<()> {
        if episode.is_empty() {
            return Ok(());
        }

        match &mut self.storage {
            Storage::Flat(storage) => {
                let n = self
                    .relabeler
                    .store_episode(&self.env, storage, &episode, &mut self.rng)?;
                debug!(
                    "Stored an episode of {} steps as {} transitions, pos = {}",
                    episode.len(),
                    n,
                    storage.pos()
                );
            }
            Storage::Episodic(storage) => {
                let (obs, act, reward, is_done) = episode_arrays(&episode)?;
                storage.write_episode(obs.view().into_dyn(), act.view(), &reward, &is_done)?;
                debug!(
                    "Stored an episode of {} steps, pos = {}",
                    episode.len(),
                    storage.pos()
                );
            }
        }
        Ok(())
    }

    /// Samples a batch of `batch_size` transitions with replacement.
    ///
    /// Slots are drawn from `[0, capacity)` if the buffer is full, `[0, pos)` otherwise.
    ///
    /// # Arguments
    ///
    /// * `batch_size` - Number of transitions in the batch
    ///
    /// # Returns
    ///
    /// A [`HerBatch`] passed through the normalizer, or [`HerError::EmptyBuffer`] if
    /// nothing has been stored yet.
    pub fn sample(&mut self, batch_size: usize) -> Result<HerBatch> {
        let upper_bound = self.storage.upper_bound();
        if upper_bound == 0 {
            return Err(HerError::EmptyBuffer.into());
        }
        let ixs = sampler::sample_indices(batch_size, upper_bound, &mut self.rng);

        let batch = match &self.storage {
            Storage::Flat(storage) => sampler::sample_transitions(storage, ixs),
            Storage::Episodic(storage) => sampler::sample_episodes(
                &self.env,
                &self.relabeler,
                storage,
                ixs,
                &mut self.rng,
            )?,
        };
        trace!(
            "Sampled {} transitions, {} relabeled",
            batch.len(),
            batch.is_relabeled.iter().filter(|&&f| f == 1).count()
        );

        Ok(HerBatch {
            obs: self.normalizer.normalize_obs(batch.obs),
            next_obs: self.normalizer.normalize_obs(batch.next_obs),
            reward: self.normalizer.normalize_reward(batch.reward),
            ..batch
        })
    }

    /// Drops the episode in progress without storing it.
    pub fn clear_episode(&mut self) {
        self.episode.clear();
    }

    /// Number of transitions of the episode in progress.
    pub fn episode_len_in_progress(&self) -> usize {
        self.episode.len()
    }

    /// Number of slots, transitions or episodes depending on the layout.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Next slot to be written.
    pub fn pos(&self) -> usize {
        self.storage.pos()
    }

    /// Whether the oldest slots are being overwritten.
    pub fn is_full(&self) -> bool {
        self.storage.is_full()
    }

    /// Length of the episode stored in slot `ep`.
    ///
    /// Returns `None` unless episodes are stored as a whole and `ep` holds one.
    pub fn n_episode_steps(&self, ep: usize) -> Option<usize> {
        match &self.storage {
            Storage::Episodic(storage) if ep < storage.upper_bound() => {
                Some(storage.n_episode_steps(ep))
            }
            _ => None,
        }
    }

    /// Copy of the transition in slot `slot` and whether it is relabeled.
    ///
    /// Returns `None` unless transitions are stored one per slot and `slot` holds one.
    pub fn transition(&self, slot: usize) -> Option<(Transition, bool)> {
        match &self.storage {
            Storage::Flat(storage) if slot < storage.upper_bound() => {
                Some((storage.transition(slot), storage.is_relabeled(slot)))
            }
            _ => None,
        }
    }

    /// Number of stored transitions, relabeled ones included.
    ///
    /// With sampling time relabeling, it counts the real transitions of all stored episodes.
    pub fn num_transitions(&self) -> usize {
        match &self.storage {
            Storage::Flat(storage) => storage.upper_bound(),
            Storage::Episodic(storage) => storage.num_transitions(),
        }
    }

    /// Number of stored relabeled transitions.
    ///
    /// Always zero with sampling time relabeling, as nothing relabeled is stored.
    pub fn num_relabeled(&self) -> usize {
        match &self.storage {
            Storage::Flat(storage) => storage.num_relabeled(),
            Storage::Episodic(_) => 0,
        }
    }

    /// Probability that a row is relabeled when goals are relabeled at sampling time.
    pub fn future_p(&self) -> f64 {
        self.relabeler.future_p()
    }

    /// Goal selection strategy.
    pub fn goal_selection_strategy(&self) -> GoalSelectionStrategy {
        self.relabeler.strategy()
    }

    /// Configuration of the buffer.
    pub fn config(&self) -> &HerReplayBufferConfig {
        &self.config
    }

    /// The goal environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// The normalizer, for updating its statistics.
    pub fn normalizer_mut(&mut self) -> &mut N {
        &mut self.normalizer
    }

    fn check_transition(&self, tr: &Transition) -> Result<(), HerError> {
        let dims = [
            ("obs", self.config.obs_dim, tr.obs.len()),
            ("next_obs", self.config.obs_dim, tr.next_obs.len()),
            ("act", self.config.act_dim, tr.act.len()),
        ];
        for &(name, expected, actual) in dims.iter() {
            if expected != actual {
                return Err(HerError::DimensionMismatch {
                    name,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl<E, N> ExperienceBufferBase for HerReplayBuffer<E, N>
where
    E: GoalEnv,
    N: Normalizer,
{
    type Item = Transition;

    /// Number of slots that can be sampled.
    fn len(&self) -> usize {
        self.storage.upper_bound()
    }

    /// Adds a transition to the episode in progress and stores the episode if it ends.
    fn push(&mut self, tr: Self::Item) -> Result<()> {
        self.check_transition(&tr)?;
        if let Some(episode) = self.episode.push(tr) {
            if episode.len() > self.config.max_episode_len {
                return Err(HerError::InvalidEpisodeShape(format!(
                    "episode length {} exceeds max_episode_len {}",
                    episode.len(),
                    self.config.max_episode_len
                ))
                .into());
            }
            self.store_episode(episode)?;
        }
        Ok(())
    }
}

impl<E, N> ReplayBufferBase for HerReplayBuffer<E, N>
where
    E: GoalEnv,
    N: Normalizer,
{
    type Config = HerReplayBufferConfig;
    type Batch = HerBatch;

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        self.sample(size)
    }
}

/// Stacks an episode into observations with the terminal observation appended,
/// actions, rewards and done flags.
fn episode_arrays(
    episode: &[Transition],
) -> Result<(Array2<f32>, Array2<f32>, Vec<f32>, Vec<i8>), HerError> {
    let shape_err = |e: ndarray::ShapeError| HerError::InvalidEpisodeShape(e.to_string());
    let mut obs = episode.iter().map(|tr| tr.obs.view()).collect::<Vec<_>>();
    if let Some(tr) = episode.last() {
        obs.push(tr.next_obs.view());
    }
    let obs = stack(Axis(0), &obs).map_err(shape_err)?;
    let act = episode.iter().map(|tr| tr.act.view()).collect::<Vec<_>>();
    let act = stack(Axis(0), &act).map_err(shape_err)?;
    let reward = episode.iter().map(|tr| tr.reward).collect();
    let is_done = episode.iter().map(|tr| tr.is_done as i8).collect();
    Ok((obs, act, reward, is_done))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ConcatGoalEnv, ConcatGoalEnvConfig};
    use ndarray::arr1;
    use test_log::test;

    // Flat observation is [x, achieved_goal, desired_goal]
    fn env() -> ConcatGoalEnv {
        let config = ConcatGoalEnvConfig::default()
            .obs_dim(1)
            .goal_dim(1)
            .distance_threshold(0.1);
        ConcatGoalEnv::build(&config).unwrap()
    }

    fn config(add_her_while_sampling: bool) -> HerReplayBufferConfig {
        HerReplayBufferConfig::default()
            .buffer_size(20)
            .max_episode_len(5)
            .obs_dim(3)
            .act_dim(1)
            .add_her_while_sampling(add_her_while_sampling)
            .n_sampled_goal(2)
    }

    fn add_episode<N: Normalizer>(
        buffer: &mut HerReplayBuffer<ConcatGoalEnv, N>,
        len: usize,
        offset: f32,
    ) -> Result<()> {
        for t in 0..len {
            let x = offset + t as f32;
            buffer.add(
                arr1(&[x, x, -1.]),
                arr1(&[x + 1., x + 1., -1.]),
                arr1(&[x]),
                -1.,
                t + 1 == len,
            )?;
        }
        Ok(())
    }

    #[test]
    fn test_nothing_stored_before_done() -> Result<()> {
        for &mode in [false, true].iter() {
            let mut buffer = HerReplayBuffer::build(&config(mode), env())?;
            add_episode(&mut buffer, 0, 0.)?;
            buffer.add(arr1(&[0., 0., -1.]), arr1(&[1., 1., -1.]), arr1(&[0.]), -1., false)?;
            assert_eq!(buffer.episode_len_in_progress(), 1);
            assert_eq!(buffer.len(), 0);
            assert!(buffer.is_empty());

            let err = buffer.sample(4).unwrap_err();
            assert_eq!(err.downcast_ref::<HerError>(), Some(&HerError::EmptyBuffer));

            buffer.clear_episode();
            assert_eq!(buffer.episode_len_in_progress(), 0);
        }
        Ok(())
    }

    #[test]
    fn test_dimension_mismatch() -> Result<()> {
        let mut buffer = HerReplayBuffer::build(&config(false), env())?;
        let err = buffer
            .add(arr1(&[0., 0.]), arr1(&[1., 1., -1.]), arr1(&[0.]), -1., true)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<HerError>(),
            Some(&HerError::DimensionMismatch {
                name: "obs",
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(buffer.episode_len_in_progress(), 0);
        Ok(())
    }

    #[test]
    fn test_episode_longer_than_max_episode_len() -> Result<()> {
        let mut buffer = HerReplayBuffer::build(&config(true), env())?;
        let err = add_episode(&mut buffer, 6, 0.).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HerError>(),
            Some(HerError::InvalidEpisodeShape(_))
        ));
        assert_eq!(buffer.len(), 0);
        Ok(())
    }

    #[test]
    fn test_flat_ring_buffer() -> Result<()> {
        // 3 steps with future strategy and n_sampled_goal = 2 yield 2 * 2 + 3 = 7 transitions
        let mut buffer = HerReplayBuffer::build(&config(false), env())?;
        add_episode(&mut buffer, 3, 0.)?;
        assert_eq!(buffer.len(), 7);
        assert_eq!(buffer.pos(), 7);
        add_episode(&mut buffer, 3, 10.)?;
        assert_eq!(buffer.len(), 14);
        assert!(!buffer.is_full());
        add_episode(&mut buffer, 3, 20.)?;
        assert!(buffer.is_full());
        assert_eq!(buffer.len(), 20);
        assert_eq!(buffer.pos(), 1);
        assert_eq!(buffer.num_transitions(), 20);
        assert!(buffer.num_relabeled() > 0);
        Ok(())
    }

    // Fails to decompose observations starting with a negative value
    struct PickyEnv(ConcatGoalEnv);

    impl GoalEnv for PickyEnv {
        type Info = ();

        fn convert_obs_to_dict(&self, obs: ndarray::ArrayView1<f32>) -> Result<crate::GoalObsDict> {
            if obs[0] < 0. {
                return Err(anyhow::anyhow!("negative observation"));
            }
            self.0.convert_obs_to_dict(obs)
        }

        fn convert_dict_to_obs(&self, dict: &crate::GoalObsDict) -> Array1<f32> {
            self.0.convert_dict_to_obs(dict)
        }

        fn compute_reward(
            &self,
            achieved_goal: ndarray::ArrayView1<f32>,
            desired_goal: ndarray::ArrayView1<f32>,
            _info: Option<&()>,
        ) -> f32 {
            self.0.compute_reward(achieved_goal, desired_goal, None)
        }
    }

    #[test]
    fn test_failed_store_writes_nothing() -> Result<()> {
        let mut buffer = HerReplayBuffer::build(&config(false), PickyEnv(env()))?;
        for t in 0..3 {
            let x = t as f32;
            buffer.add(
                arr1(&[x, x, -1.]),
                arr1(&[x + 1., x + 1., -1.]),
                arr1(&[x]),
                -1.,
                t == 2,
            )?;
        }
        assert_eq!(buffer.len(), 7);
        assert_eq!(buffer.pos(), 7);

        // Relabeling step 1 needs the observation of step 2, which cannot be decomposed
        buffer.add(arr1(&[0., 0., -1.]), arr1(&[1., 1., -1.]), arr1(&[0.]), -1., false)?;
        buffer.add(arr1(&[1., 1., -1.]), arr1(&[-1., 2., -1.]), arr1(&[1.]), -1., false)?;
        let res = buffer.add(arr1(&[-1., 2., -1.]), arr1(&[3., 3., -1.]), arr1(&[2.]), -1., true);
        assert!(res.is_err());
        assert_eq!(buffer.len(), 7);
        assert_eq!(buffer.pos(), 7);
        assert_eq!(buffer.num_relabeled(), 4);
        assert_eq!(buffer.episode_len_in_progress(), 0);

        // Observations the goal environment cannot decompose at all
        let env_config = ConcatGoalEnvConfig::default().obs_dim(2).goal_dim(1);
        let mut buffer = HerReplayBuffer::build(&config(false), ConcatGoalEnv::build(&env_config)?)?;
        buffer.add(arr1(&[0., 0., -1.]), arr1(&[1., 1., -1.]), arr1(&[0.]), -1., false)?;
        let err = buffer
            .add(arr1(&[1., 1., -1.]), arr1(&[2., 2., -1.]), arr1(&[1.]), -1., true)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HerError>(),
            Some(HerError::DimensionMismatch { name: "obs", .. })
        ));
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.pos(), 0);
        Ok(())
    }

    #[test]
    fn test_episodic_ring_buffer() -> Result<()> {
        let mut buffer = HerReplayBuffer::build(&config(true), env())?;
        assert_eq!(buffer.capacity(), 4);
        for (i, &len) in [5, 2, 3, 4, 1].iter().enumerate() {
            add_episode(&mut buffer, len, 10. * i as f32)?;
        }
        assert!(buffer.is_full());
        assert_eq!(buffer.pos(), 1);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.n_episode_steps(0), Some(1));
        assert_eq!(buffer.n_episode_steps(1), Some(2));
        assert_eq!(buffer.n_episode_steps(4), None);
        assert_eq!(buffer.num_transitions(), 1 + 2 + 3 + 4);
        Ok(())
    }

    #[test]
    fn test_normalizer_is_applied() -> Result<()> {
        struct Halve;
        impl Normalizer for Halve {
            fn normalize_obs(&self, obs: Array2<f32>) -> Array2<f32> {
                obs.mapv(|x| x * 0.5)
            }
            fn normalize_reward(&self, reward: Vec<f32>) -> Vec<f32> {
                reward.into_iter().map(|r| r * 0.5).collect()
            }
        }

        let config = config(false).n_sampled_goal(0);
        let mut buffer = HerReplayBuffer::build_with_normalizer(&config, env(), Halve)?;
        add_episode(&mut buffer, 1, 4.)?;
        let batch = buffer.sample(2)?;
        assert_eq!(batch.obs.row(0).to_vec(), vec![2., 2., -0.5]);
        assert_eq!(batch.next_obs.row(1).to_vec(), vec![2.5, 2.5, -0.5]);
        assert_eq!(batch.act.row(0).to_vec(), vec![4.]);
        assert_eq!(batch.reward, vec![-0.5, -0.5]);
        assert_eq!(batch.is_done, vec![1, 1]);
        Ok(())
    }

    #[test]
    fn test_build_errors() {
        let err = HerReplayBuffer::build(&config(false).n_envs(4), env())
            .err()
            .unwrap();
        assert_eq!(
            err.downcast_ref::<HerError>(),
            Some(&HerError::UnsupportedNumEnvs(4))
        );
    }
}
