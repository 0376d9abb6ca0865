//! Goal relabeling.
//!
//! Relabeling substitutes the desired goal of a transition with a goal that was actually
//! achieved and recomputes the reward. Which achieved goal is used is determined by the
//! [`GoalSelectionStrategy`].
use super::{
    storage::{EpisodeStorage, FlatStorage},
    GoalSelectionStrategy,
};
use crate::{error::HerError, GoalEnv, Transition};
use anyhow::Result;
use log::trace;
use ndarray::{Array1, ArrayView1};
use rand::Rng;

/// A row of [`EpisodeStorage`] providing a substitute goal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalSource {
    /// Episode slot.
    pub ep: usize,

    /// Observation row in the episode, in `[0, n_episode_steps]`.
    pub t: usize,
}

/// Output of relabeling a row sampled from [`EpisodeStorage`].
pub struct RelabeledRow {
    pub obs: Array1<f32>,
    pub next_obs: Array1<f32>,
    pub reward: f32,
    pub is_relabeled: bool,
}

/// Samples substitute goals and builds relabeled transitions.
#[derive(Debug, Clone)]
pub struct GoalRelabeler {
    strategy: GoalSelectionStrategy,
    n_sampled_goal: usize,
}

impl GoalRelabeler {
    /// Creates a relabeler.
    pub fn new(strategy: GoalSelectionStrategy, n_sampled_goal: usize) -> Self {
        Self {
            strategy,
            n_sampled_goal,
        }
    }

    /// Goal selection strategy.
    pub fn strategy(&self) -> GoalSelectionStrategy {
        self.strategy
    }

    /// Probability that a row sampled from [`EpisodeStorage`] is relabeled.
    ///
    /// Equal to the fraction of relabeled transitions that storing time relabeling yields,
    /// `n_sampled_goal / (1 + n_sampled_goal)`.
    pub fn future_p(&self) -> f64 {
        1.0 - 1.0 / (1.0 + self.n_sampled_goal as f64)
    }

    /// Whether a goal can be sampled for transition `ix` of an episode of length `len`.
    ///
    /// There is no future goal for the last transition.
    pub fn has_goal_for(&self, ix: usize, len: usize) -> bool {
        !(self.strategy == GoalSelectionStrategy::Future && ix + 1 >= len)
    }

    /// Samples an achieved goal for transition `ix` of `episode`.
    ///
    /// Goals are taken from the observation `o_t` of the selected transition.
    /// With [`GoalSelectionStrategy::Random`], the transition is drawn from the slots of
    /// `stored` and the transitions `0..=ix` of `episode`.
    pub fn sample_achieved_goal<E: GoalEnv, R: Rng>(
        &self,
        env: &E,
        episode: &[Transition],
        ix: usize,
        stored: &FlatStorage,
        rng: &mut R,
    ) -> Result<Array1<f32>> {
        let len = episode.len();
        let obs = match self.strategy {
            GoalSelectionStrategy::Future => {
                if ix + 1 >= len {
                    return Err(HerError::NoFutureGoal { ix, len }.into());
                }
                episode[rng.gen_range(ix + 1..len)].obs.view()
            }
            GoalSelectionStrategy::Final => match episode.last() {
                Some(tr) => tr.obs.view(),
                None => return Err(HerError::NoFutureGoal { ix, len }.into()),
            },
            GoalSelectionStrategy::Episode => {
                if len == 0 {
                    return Err(HerError::NoFutureGoal { ix, len }.into());
                }
                episode[rng.gen_range(0..len)].obs.view()
            }
            GoalSelectionStrategy::Random => {
                if ix >= len {
                    return Err(HerError::NoFutureGoal { ix, len }.into());
                }
                // Stored slots followed by the transitions of the episode up to `ix`
                let upper_bound = stored.upper_bound();
                let k = rng.gen_range(0..upper_bound + ix + 1);
                if k < upper_bound {
                    stored.obs(k)
                } else {
                    episode[k - upper_bound].obs.view()
                }
            }
        };
        Ok(env.convert_obs_to_dict(obs)?.achieved_goal)
    }

    /// Samples `n_sampled_goal` achieved goals for transition `ix` of `episode`.
    pub fn sample_achieved_goals<E: GoalEnv, R: Rng>(
        &self,
        env: &E,
        episode: &[Transition],
        ix: usize,
        stored: &FlatStorage,
        rng: &mut R,
    ) -> Result<Vec<Array1<f32>>> {
        (0..self.n_sampled_goal)
            .map(|_| self.sample_achieved_goal(env, episode, ix, stored, rng))
            .collect()
    }

    /// Writes the transitions of an episode and their relabeled copies into `storage`.
    ///
    /// Every transition is written followed by `n_sampled_goal` relabeled transitions,
    /// except the last transition under [`GoalSelectionStrategy::Future`].
    /// All of them are built and checked before the first write, so nothing is written
    /// on error. Returns the number of written transitions.
    pub fn store_episode<E: GoalEnv, R: Rng>(
        &self,
        env: &E,
        storage: &mut FlatStorage,
        episode: &[Transition],
        rng: &mut R,
    ) -> Result<usize> {
        let transitions = self.relabel_episode(env, storage, episode, rng)?;
        for (tr, _) in transitions.iter() {
            storage.check_transition(tr)?;
        }
        for (tr, is_relabeled) in transitions.iter() {
            storage.write_transition(tr, *is_relabeled)?;
        }
        Ok(transitions.len())
    }

    /// Builds the transitions [`store_episode`](Self::store_episode) writes, in order,
    /// paired with their relabeled flags. `storage` is left untouched.
    pub fn relabel_episode<E: GoalEnv, R: Rng>(
        &self,
        env: &E,
        storage: &FlatStorage,
        episode: &[Transition],
        rng: &mut R,
    ) -> Result<Vec<(Transition, bool)>> {
        let mut transitions = Vec::with_capacity(episode.len() * (1 + self.n_sampled_goal));
        for (ix, tr) in episode.iter().enumerate() {
            transitions.push((tr.clone(), false));

            if !self.has_goal_for(ix, episode.len()) {
                break;
            }

            let goals = self.sample_achieved_goals(env, episode, ix, storage, rng)?;
            for goal in goals.iter() {
                transitions.push((relabel_transition(env, tr, goal.view())?, true));
            }
        }
        Ok(transitions)
    }

    /// Selects the observation row providing a substitute goal for step `t` of episode `ep`.
    ///
    /// With `len = n_episode_steps(ep)`, the row is in `[t + 1, len]` for
    /// [`GoalSelectionStrategy::Future`], `len` for [`GoalSelectionStrategy::Final`],
    /// `[0, len]` for [`GoalSelectionStrategy::Episode`] and `[0, len']` of a uniformly
    /// drawn episode of length `len'` for [`GoalSelectionStrategy::Random`].
    pub fn sample_goal_source<R: Rng>(
        &self,
        storage: &EpisodeStorage,
        ep: usize,
        t: usize,
        rng: &mut R,
    ) -> GoalSource {
        let len = storage.n_episode_steps(ep);
        match self.strategy {
            GoalSelectionStrategy::Future => {
                let future_offset = (rng.gen::<f64>() * (len - t) as f64) as usize;
                GoalSource {
                    ep,
                    t: t + 1 + future_offset,
                }
            }
            GoalSelectionStrategy::Final => GoalSource { ep, t: len },
            GoalSelectionStrategy::Episode => GoalSource {
                ep,
                t: (rng.gen::<f64>() * (len + 1) as f64) as usize,
            },
            GoalSelectionStrategy::Random => {
                let ep = rng.gen_range(0..storage.upper_bound());
                let len = storage.n_episode_steps(ep);
                GoalSource {
                    ep,
                    t: (rng.gen::<f64>() * (len + 1) as f64) as usize,
                }
            }
        }
    }

    /// Builds the transition at step `t` of episode `ep`, relabeled with probability
    /// [`future_p`](Self::future_p).
    ///
    /// The reward is recomputed from the achieved goal of `o_t+1` and its desired goal
    /// whether the row is relabeled or not.
    pub fn relabel_row<E: GoalEnv, R: Rng>(
        &self,
        env: &E,
        storage: &EpisodeStorage,
        ep: usize,
        t: usize,
        rng: &mut R,
    ) -> Result<RelabeledRow> {
        let mut obs_dict = env.convert_obs_to_dict(storage.obs(ep, t))?;
        let mut next_obs_dict = env.convert_obs_to_dict(storage.obs(ep, t + 1))?;

        let is_relabeled = rng.gen::<f64>() < self.future_p();
        if is_relabeled {
            let src = self.sample_goal_source(storage, ep, t, rng);
            trace!("Relabel step {} of episode {} with row {:?}", t, ep, src);
            let goal = env
                .convert_obs_to_dict(storage.obs(src.ep, src.t))?
                .achieved_goal;
            check_goal_len(&obs_dict.desired_goal, &goal)?;
            obs_dict.desired_goal = goal.clone();
            next_obs_dict.desired_goal = goal;
        }

        let reward = env.compute_reward(
            next_obs_dict.achieved_goal.view(),
            next_obs_dict.desired_goal.view(),
            None,
        );

        Ok(RelabeledRow {
            obs: env.convert_dict_to_obs(&obs_dict),
            next_obs: env.convert_dict_to_obs(&next_obs_dict),
            reward,
            is_relabeled,
        })
    }
}

/// Returns a copy of `tr` with `goal` as the desired goal.
///
/// The reward is recomputed with the achieved goal of the next observation and
/// the relabeled transition is never terminal.
pub fn relabel_transition<E: GoalEnv>(
    env: &E,
    tr: &Transition,
    goal: ArrayView1<f32>,
) -> Result<Transition> {
    let mut obs_dict = env.convert_obs_to_dict(tr.obs.view())?;
    let mut next_obs_dict = env.convert_obs_to_dict(tr.next_obs.view())?;
    let goal = goal.to_owned();
    check_goal_len(&obs_dict.desired_goal, &goal)?;

    obs_dict.desired_goal = goal.clone();
    next_obs_dict.desired_goal = goal;
    let reward = env.compute_reward(
        next_obs_dict.achieved_goal.view(),
        next_obs_dict.desired_goal.view(),
        None,
    );

    Ok(Transition {
        obs: env.convert_dict_to_obs(&obs_dict),
        next_obs: env.convert_dict_to_obs(&next_obs_dict),
        act: tr.act.clone(),
        reward,
        is_done: false,
    })
}

fn check_goal_len(desired_goal: &Array1<f32>, goal: &Array1<f32>) -> Result<(), HerError> {
    if desired_goal.len() == goal.len() {
        Ok(())
    } else {
        Err(HerError::DimensionMismatch {
            name: "goal",
            expected: desired_goal.len(),
            actual: goal.len(),
        })
    }
}
