//! Construction of batches from sampled slot indices.
use super::{
    relabel::GoalRelabeler,
    storage::{EpisodeStorage, FlatStorage},
    HerBatch,
};
use crate::GoalEnv;
use anyhow::Result;
use ndarray::Array2;
use rand::Rng;

/// Draws `batch_size` indices uniformly with replacement from `[0, upper_bound)`.
pub fn sample_indices<R: Rng>(batch_size: usize, upper_bound: usize, rng: &mut R) -> Vec<usize> {
    (0..batch_size)
        .map(|_| rng.gen_range(0..upper_bound))
        .collect()
}

/// Reads the transitions at slots `ixs`. Goals were already relabeled when stored.
pub fn sample_transitions(storage: &FlatStorage, ixs: Vec<usize>) -> HerBatch {
    let sample = storage.sample(&ixs);
    HerBatch {
        obs: sample.obs,
        act: sample.act,
        next_obs: sample.next_obs,
        reward: sample.reward,
        is_done: sample.is_done,
        is_relabeled: sample.is_relabeled,
        ix_sample: ixs,
    }
}

/// Picks a timestep of each episode in `ixs` and relabels its goal.
///
/// The timestep of episode `ep` is drawn uniformly from `[0, n_episode_steps(ep))`.
pub fn sample_episodes<E: GoalEnv, R: Rng>(
    env: &E,
    relabeler: &GoalRelabeler,
    storage: &EpisodeStorage,
    ixs: Vec<usize>,
    rng: &mut R,
) -> Result<HerBatch> {
    let batch_size = ixs.len();
    let obs_dim = storage.obs(0, 0).len();
    let act_dim = storage.act(0, 0).len();
    let mut obs = Array2::zeros((batch_size, obs_dim));
    let mut act = Array2::zeros((batch_size, act_dim));
    let mut next_obs = Array2::zeros((batch_size, obs_dim));
    let mut reward = Vec::with_capacity(batch_size);
    let mut is_done = Vec::with_capacity(batch_size);
    let mut is_relabeled = Vec::with_capacity(batch_size);

    for (i, &ep) in ixs.iter().enumerate() {
        let len = storage.n_episode_steps(ep);
        let t = (rng.gen::<f64>() * len as f64) as usize;
        let row = relabeler.relabel_row(env, storage, ep, t, rng)?;

        obs.row_mut(i).assign(&row.obs);
        act.row_mut(i).assign(&storage.act(ep, t));
        next_obs.row_mut(i).assign(&row.next_obs);
        reward.push(row.reward);
        is_done.push(storage.is_done(ep, t));
        is_relabeled.push(row.is_relabeled as i8);
    }

    Ok(HerBatch {
        obs,
        act,
        next_obs,
        reward,
        is_done,
        is_relabeled,
        ix_sample: ixs,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_sample_indices_bound() {
        let mut rng = StdRng::seed_from_u64(42);
        let ixs = sample_indices(10_000, 7, &mut rng);
        assert_eq!(ixs.len(), 10_000);
        assert!(ixs.iter().all(|&ix| ix < 7));
        // Every valid slot is hit
        assert!((0..7).all(|i| ixs.contains(&i)));
    }
}
