//! Normalizers applied to sampled batches.
use crate::Normalizer;
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Returns observations and rewards as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNormalizer;

impl Normalizer for IdentityNormalizer {
    fn normalize_obs(&self, obs: Array2<f32>) -> Array2<f32> {
        obs
    }

    fn normalize_reward(&self, reward: Vec<f32>) -> Vec<f32> {
        reward
    }
}

/// Normalizes observations with running mean and variance.
///
/// Statistics are updated by the caller, typically with observations coming from the
/// environment. The statistics are merged with the parallel variant of Welford's
/// algorithm. Observations are clipped to `[-clip_obs, clip_obs]` after normalization.
/// Rewards are divided by `reward_scale`.
#[derive(Debug, Clone)]
pub struct RunningMeanStdNormalizer {
    mean: Array1<f64>,
    var: Array1<f64>,
    count: f64,
    epsilon: f64,
    clip_obs: f32,
    reward_scale: f32,
}

impl RunningMeanStdNormalizer {
    /// Creates a normalizer for observations of length `obs_dim`.
    pub fn new(obs_dim: usize) -> Self {
        Self {
            mean: Array1::zeros(obs_dim),
            var: Array1::ones(obs_dim),
            count: 1e-4,
            epsilon: 1e-8,
            clip_obs: 10.0,
            reward_scale: 1.0,
        }
    }

    /// Sets the clipping range of normalized observations.
    pub fn clip_obs(mut self, clip_obs: f32) -> Self {
        self.clip_obs = clip_obs;
        self
    }

    /// Sets the scale dividing rewards.
    pub fn reward_scale(mut self, reward_scale: f32) -> Self {
        self.reward_scale = reward_scale;
        self
    }

    /// Updates statistics with a batch of observations, one observation per row.
    pub fn update(&mut self, obs: ArrayView2<f32>) {
        if obs.nrows() == 0 {
            return;
        }
        let obs = obs.mapv(|x| x as f64);
        let batch_count = obs.nrows() as f64;
        let batch_mean = match obs.mean_axis(Axis(0)) {
            Some(m) => m,
            None => return,
        };
        let batch_var = obs.var_axis(Axis(0), 0.0);

        let delta = &batch_mean - &self.mean;
        let total_count = self.count + batch_count;
        self.mean = &self.mean + &(&delta * (batch_count / total_count));
        let m2 = &self.var * self.count
            + &batch_var * batch_count
            + &(&delta * &delta) * (self.count * batch_count / total_count);
        self.var = m2 / total_count;
        self.count = total_count;
    }

    /// Current mean.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Current variance.
    pub fn var(&self) -> &Array1<f64> {
        &self.var
    }
}

impl Normalizer for RunningMeanStdNormalizer {
    fn normalize_obs(&self, obs: Array2<f32>) -> Array2<f32> {
        let mut obs = obs;
        let clip = self.clip_obs;
        for mut row in obs.outer_iter_mut() {
            row.iter_mut()
                .zip(self.mean.iter().zip(self.var.iter()))
                .for_each(|(x, (&m, &v))| {
                    let y = (*x as f64 - m) / (v + self.epsilon).sqrt();
                    *x = (y as f32).max(-clip).min(clip);
                });
        }
        obs
    }

    fn normalize_reward(&self, reward: Vec<f32>) -> Vec<f32> {
        reward.into_iter().map(|r| r / self.reward_scale).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_running_mean_std() {
        let mut normalizer = RunningMeanStdNormalizer::new(2);
        let data = arr2(&[[1., 2.], [2., 4.], [3., 6.]]);
        normalizer.update(data.view());

        assert!((normalizer.mean()[0] - 2.0).abs() < 1e-3);
        assert!((normalizer.mean()[1] - 4.0).abs() < 1e-3);
        assert!((normalizer.var()[0] - 2.0 / 3.0).abs() < 1e-3);

        let normalized = normalizer.normalize_obs(arr2(&[[2., 4.], [3., 6.]]));
        assert!(normalized[[0, 0]].abs() < 1e-2);
        assert!(normalized[[0, 1]].abs() < 1e-2);
        assert!(normalized[[1, 0]] > 1.0);
    }

    #[test]
    fn test_clip_and_reward_scale() {
        let normalizer = RunningMeanStdNormalizer::new(1)
            .clip_obs(5.0)
            .reward_scale(2.0);
        let normalized = normalizer.normalize_obs(arr2(&[[100.], [-100.]]));
        assert_eq!(normalized, arr2(&[[5.], [-5.]]));
        assert_eq!(normalizer.normalize_reward(vec![-1., 0.]), vec![-0.5, 0.]);
    }

    #[test]
    fn test_identity() {
        let obs = arr2(&[[1., 2.]]);
        assert_eq!(IdentityNormalizer.normalize_obs(obs.clone()), obs);
        assert_eq!(IdentityNormalizer.normalize_reward(vec![3.]), vec![3.]);
    }
}
