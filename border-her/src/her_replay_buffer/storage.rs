//! Fixed-capacity storage of transitions.
//!
//! Two layouts are provided. [`FlatStorage`] keeps one transition per slot and is used
//! when relabeled transitions are generated at storing time. [`EpisodeStorage`] keeps
//! one whole episode per slot and is used when goals are relabeled at sampling time.
//! Both are ring buffers: `pos` is the next slot to write and the oldest slot is
//! overwritten once the storage is full.
use crate::{error::HerError, Transition};
use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, ArrayViewD, Axis, Ix2};

/// Storage holding one transition per slot.
#[derive(Debug)]
pub struct FlatStorage {
    capacity: usize,
    pos: usize,
    full: bool,
    obs: Array2<f32>,
    next_obs: Array2<f32>,
    act: Array2<f32>,
    reward: Vec<f32>,
    is_done: Vec<i8>,
    is_relabeled: Vec<i8>,
}

/// Data of the transitions at the given slots, in the order of the slot indices.
pub struct FlatSample {
    pub obs: Array2<f32>,
    pub act: Array2<f32>,
    pub next_obs: Array2<f32>,
    pub reward: Vec<f32>,
    pub is_done: Vec<i8>,
    pub is_relabeled: Vec<i8>,
}

impl FlatStorage {
    /// Allocates zero-filled storage for `capacity` transitions.
    pub fn new(capacity: usize, obs_dim: usize, act_dim: usize) -> Self {
        Self {
            capacity,
            pos: 0,
            full: false,
            obs: Array2::zeros((capacity, obs_dim)),
            next_obs: Array2::zeros((capacity, obs_dim)),
            act: Array2::zeros((capacity, act_dim)),
            reward: vec![0.; capacity],
            is_done: vec![0; capacity],
            is_relabeled: vec![0; capacity],
        }
    }

    /// Checks that `tr` fits the slots.
    pub fn check_transition(&self, tr: &Transition) -> Result<(), HerError> {
        check_len("obs", self.obs.ncols(), tr.obs.len())?;
        check_len("next_obs", self.obs.ncols(), tr.next_obs.len())?;
        check_len("act", self.act.ncols(), tr.act.len())
    }

    /// Writes a transition into slot `pos` and advances `pos`.
    pub fn write_transition(&mut self, tr: &Transition, is_relabeled: bool) -> Result<(), HerError> {
        self.check_transition(tr)?;

        let i = self.pos;
        self.obs.row_mut(i).assign(&tr.obs);
        self.next_obs.row_mut(i).assign(&tr.next_obs);
        self.act.row_mut(i).assign(&tr.act);
        self.reward[i] = tr.reward;
        self.is_done[i] = tr.is_done as i8;
        self.is_relabeled[i] = is_relabeled as i8;

        self.pos += 1;
        if self.pos == self.capacity {
            self.full = true;
            self.pos = 0;
        }
        Ok(())
    }

    /// Gathers the transitions at slots `ixs`.
    pub fn sample(&self, ixs: &[usize]) -> FlatSample {
        FlatSample {
            obs: self.obs.select(Axis(0), ixs),
            act: self.act.select(Axis(0), ixs),
            next_obs: self.next_obs.select(Axis(0), ixs),
            reward: ixs.iter().map(|&ix| self.reward[ix]).collect(),
            is_done: ixs.iter().map(|&ix| self.is_done[ix]).collect(),
            is_relabeled: ixs.iter().map(|&ix| self.is_relabeled[ix]).collect(),
        }
    }

    /// Observation stored in slot `ix`.
    pub fn obs(&self, ix: usize) -> ArrayView1<'_, f32> {
        self.obs.row(ix)
    }

    /// Copy of the transition stored in slot `ix`.
    pub fn transition(&self, ix: usize) -> Transition {
        Transition {
            obs: self.obs.row(ix).to_owned(),
            next_obs: self.next_obs.row(ix).to_owned(),
            act: self.act.row(ix).to_owned(),
            reward: self.reward[ix],
            is_done: self.is_done[ix] == 1,
        }
    }

    /// Whether the transition in slot `ix` is relabeled.
    pub fn is_relabeled(&self, ix: usize) -> bool {
        self.is_relabeled[ix] == 1
    }

    /// Slots `[0, upper_bound)` hold valid transitions.
    pub fn upper_bound(&self) -> usize {
        if self.full {
            self.capacity
        } else {
            self.pos
        }
    }

    /// Next slot to be written.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Whether `pos` has wrapped at least once.
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of valid relabeled transitions.
    pub fn num_relabeled(&self) -> usize {
        self.is_relabeled[..self.upper_bound()]
            .iter()
            .map(|&f| f as usize)
            .sum()
    }
}

/// Storage holding one episode per slot.
///
/// An episode of length `L` occupies `L + 1` observation rows (the terminal observation
/// is appended) and `L` rows of actions, rewards and done flags. The remaining rows are
/// zero. `n_episode_steps[slot]` records `L`.
#[derive(Debug)]
pub struct EpisodeStorage {
    capacity: usize,
    max_episode_len: usize,
    pos: usize,
    full: bool,
    obs: Array3<f32>,
    act: Array3<f32>,
    reward: Array2<f32>,
    is_done: Array2<i8>,
    n_episode_steps: Vec<usize>,
}

impl EpisodeStorage {
    /// Allocates zero-filled storage for `capacity` episodes.
    pub fn new(capacity: usize, max_episode_len: usize, obs_dim: usize, act_dim: usize) -> Self {
        Self {
            capacity,
            max_episode_len,
            pos: 0,
            full: false,
            obs: Array3::zeros((capacity, max_episode_len + 1, obs_dim)),
            act: Array3::zeros((capacity, max_episode_len, act_dim)),
            reward: Array2::zeros((capacity, max_episode_len)),
            is_done: Array2::zeros((capacity, max_episode_len)),
            n_episode_steps: vec![0; capacity],
        }
    }

    /// Writes an episode into slot `pos` and advances `pos`.
    ///
    /// `obs` must be two dimensional with `len + 1` rows, where `len` is the number of
    /// rows of `act`, `reward` and `is_done`. Nothing is written if the shapes are invalid.
    pub fn write_episode(
        &mut self,
        obs: ArrayViewD<f32>,
        act: ArrayView2<f32>,
        reward: &[f32],
        is_done: &[i8],
    ) -> Result<(), HerError> {
        let obs = obs.into_dimensionality::<Ix2>().map_err(|_| {
            HerError::InvalidEpisodeShape(
                "obs needs to be an episode of observations with 2 dimensions".into(),
            )
        })?;
        if obs.nrows() < 2 {
            return Err(HerError::InvalidEpisodeShape(format!(
                "obs needs at least 2 rows, got {}",
                obs.nrows()
            )));
        }
        let len = obs.nrows() - 1;
        if len > self.max_episode_len {
            return Err(HerError::InvalidEpisodeShape(format!(
                "episode length {} exceeds max_episode_len {}",
                len, self.max_episode_len
            )));
        }
        if act.nrows() != len || reward.len() != len || is_done.len() != len {
            return Err(HerError::InvalidEpisodeShape(format!(
                "expected {} actions, rewards and done flags, got {}, {} and {}",
                len,
                act.nrows(),
                reward.len(),
                is_done.len()
            )));
        }
        check_len("obs", self.obs.len_of(Axis(2)), obs.ncols())?;
        check_len("act", self.act.len_of(Axis(2)), act.ncols())?;

        let i = self.pos;
        self.obs.slice_mut(s![i, ..=len, ..]).assign(&obs);
        self.obs.slice_mut(s![i, len + 1.., ..]).fill(0.);
        self.act.slice_mut(s![i, ..len, ..]).assign(&act);
        self.act.slice_mut(s![i, len.., ..]).fill(0.);
        let mut reward_row = self.reward.row_mut(i);
        reward_row.fill(0.);
        reward_row
            .slice_mut(s![..len])
            .iter_mut()
            .zip(reward.iter())
            .for_each(|(d, &r)| *d = r);
        let mut is_done_row = self.is_done.row_mut(i);
        is_done_row.fill(0);
        is_done_row
            .slice_mut(s![..len])
            .iter_mut()
            .zip(is_done.iter())
            .for_each(|(d, &f)| *d = f);
        self.n_episode_steps[i] = len;

        self.pos += 1;
        if self.pos == self.capacity {
            self.full = true;
            self.pos = 0;
        }
        Ok(())
    }

    /// Observation at row `t` of the episode in slot `ep`, `t` in `[0, len]`.
    pub fn obs(&self, ep: usize, t: usize) -> ArrayView1<'_, f32> {
        self.obs.slice(s![ep, t, ..])
    }

    /// Action at step `t` of the episode in slot `ep`.
    pub fn act(&self, ep: usize, t: usize) -> ArrayView1<'_, f32> {
        self.act.slice(s![ep, t, ..])
    }

    /// Reward stored at step `t` of the episode in slot `ep`.
    #[cfg(test)]
    pub fn reward(&self, ep: usize, t: usize) -> f32 {
        self.reward[[ep, t]]
    }

    /// Done flag at step `t` of the episode in slot `ep`.
    pub fn is_done(&self, ep: usize, t: usize) -> i8 {
        self.is_done[[ep, t]]
    }

    /// Length of the episode in slot `ep`.
    pub fn n_episode_steps(&self, ep: usize) -> usize {
        self.n_episode_steps[ep]
    }

    /// Slots `[0, upper_bound)` hold valid episodes.
    pub fn upper_bound(&self) -> usize {
        if self.full {
            self.capacity
        } else {
            self.pos
        }
    }

    /// Next slot to be written.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Whether `pos` has wrapped at least once.
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of valid transitions over all stored episodes.
    pub fn num_transitions(&self) -> usize {
        self.n_episode_steps[..self.upper_bound()].iter().sum()
    }
}

/// Physical layout of the replay buffer.
#[derive(Debug)]
pub enum Storage {
    /// One transition per slot.
    Flat(FlatStorage),

    /// One episode per slot.
    Episodic(EpisodeStorage),
}

impl Storage {
    /// Slots `[0, upper_bound)` can be sampled.
    pub fn upper_bound(&self) -> usize {
        match self {
            Self::Flat(s) => s.upper_bound(),
            Self::Episodic(s) => s.upper_bound(),
        }
    }

    /// Next slot to be written.
    pub fn pos(&self) -> usize {
        match self {
            Self::Flat(s) => s.pos(),
            Self::Episodic(s) => s.pos(),
        }
    }

    /// Whether `pos` has wrapped at least once.
    pub fn is_full(&self) -> bool {
        match self {
            Self::Flat(s) => s.is_full(),
            Self::Episodic(s) => s.is_full(),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        match self {
            Self::Flat(s) => s.capacity(),
            Self::Episodic(s) => s.capacity(),
        }
    }
}

fn check_len(name: &'static str, expected: usize, actual: usize) -> Result<(), HerError> {
    if expected == actual {
        Ok(())
    } else {
        Err(HerError::DimensionMismatch {
            name,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{arr1, arr2, Array1};

    fn transition(i: usize) -> Transition {
        let x = i as f32;
        Transition::new(
            arr1(&[x, x]),
            arr1(&[x + 0.5, x + 0.5]),
            arr1(&[-x]),
            x,
            i % 2 == 0,
        )
    }

    #[test]
    fn test_flat_ring_invariant() -> Result<(), HerError> {
        let capacity = 4;
        let mut storage = FlatStorage::new(capacity, 2, 1);
        assert_eq!(storage.upper_bound(), 0);

        for k in 0..3 {
            storage.write_transition(&transition(k), false)?;
        }
        assert!(!storage.is_full());
        assert_eq!(storage.pos(), 3);
        assert_eq!(storage.upper_bound(), 3);
        for i in 0..3 {
            assert_eq!(storage.obs(i), arr1(&[i as f32, i as f32]));
        }

        // 7 writes in total into 4 slots
        for k in 3..7 {
            storage.write_transition(&transition(k), k == 6)?;
        }
        assert!(storage.is_full());
        assert_eq!(storage.pos(), 3);
        assert_eq!(storage.upper_bound(), capacity);
        // slot i holds the most recent write congruent to i
        let expected = [4, 5, 6, 3];
        for (slot, &k) in expected.iter().enumerate() {
            assert_eq!(storage.obs(slot)[0], k as f32);
            assert_eq!(storage.transition(slot).next_obs[0], k as f32 + 0.5);
        }
        assert_eq!(storage.num_relabeled(), 1);
        assert!(storage.is_relabeled(2));
        assert_eq!(storage.transition(1), transition(5));

        let sample = storage.sample(&[2, 0, 2]);
        assert_eq!(sample.reward, vec![6., 4., 6.]);
        assert_eq!(sample.is_done, vec![1, 1, 1]);
        assert_eq!(sample.is_relabeled, vec![1, 0, 1]);
        assert_eq!(sample.act.column(0).to_vec(), vec![-6., -4., -6.]);
        Ok(())
    }

    #[test]
    fn test_flat_dimension_mismatch() {
        let mut storage = FlatStorage::new(2, 3, 1);
        let res = storage.write_transition(&transition(0), false);
        assert_eq!(
            res,
            Err(HerError::DimensionMismatch {
                name: "obs",
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(storage.pos(), 0);
    }

    fn episode(len: usize, offset: f32) -> (Array2<f32>, Array2<f32>, Vec<f32>, Vec<i8>) {
        let obs = Array2::from_shape_fn((len + 1, 2), |(t, j)| offset + t as f32 + j as f32 * 0.5);
        let act = Array2::from_elem((len, 1), offset);
        let reward = vec![-1.; len];
        let mut is_done = vec![0; len];
        is_done[len - 1] = 1;
        (obs, act, reward, is_done)
    }

    #[test]
    fn test_episode_ring_invariant_and_padding() -> Result<(), HerError> {
        let mut storage = EpisodeStorage::new(2, 4, 2, 1);

        let (obs, act, reward, is_done) = episode(4, 0.);
        storage.write_episode(obs.view().into_dyn(), act.view(), &reward, &is_done)?;
        assert_eq!(storage.n_episode_steps(0), 4);
        assert_eq!(storage.pos(), 1);
        assert!(!storage.is_full());

        let (obs, act, reward, is_done) = episode(2, 10.);
        storage.write_episode(obs.view().into_dyn(), act.view(), &reward, &is_done)?;
        assert!(storage.is_full());
        assert_eq!(storage.pos(), 0);
        assert_eq!(storage.upper_bound(), 2);
        assert_eq!(storage.num_transitions(), 6);

        // A short episode overwrites the oldest slot, the rest of the slot is zero
        let (obs, act, reward, is_done) = episode(1, 20.);
        storage.write_episode(obs.view().into_dyn(), act.view(), &reward, &is_done)?;
        assert_eq!(storage.n_episode_steps(0), 1);
        assert_eq!(storage.obs(0, 0), arr1(&[20., 20.5]));
        assert_eq!(storage.obs(0, 1), arr1(&[21., 21.5]));
        assert_eq!(storage.obs(0, 2), Array1::<f32>::zeros(2));
        assert_eq!(storage.act(0, 1), Array1::<f32>::zeros(1));
        assert_eq!(storage.reward(0, 0), -1.);
        assert_eq!(storage.reward(0, 1), 0.);
        assert_eq!(storage.is_done(0, 0), 1);
        assert_eq!(storage.is_done(0, 3), 0);
        assert_eq!(storage.obs(1, 2), arr1(&[12., 12.5]));
        Ok(())
    }

    #[test]
    fn test_invalid_episode_shape() {
        let mut storage = EpisodeStorage::new(2, 4, 2, 1);
        let act = Array2::<f32>::zeros((1, 1));

        // One dimensional observation
        let obs = arr1(&[0., 1.]);
        let res = storage.write_episode(obs.view().into_dyn(), act.view(), &[0.], &[1]);
        assert!(matches!(res, Err(HerError::InvalidEpisodeShape(_))));

        // Too long
        let (obs, act5, reward, is_done) = episode(5, 0.);
        let res = storage.write_episode(obs.view().into_dyn(), act5.view(), &reward, &is_done);
        assert!(matches!(res, Err(HerError::InvalidEpisodeShape(_))));

        // Inconsistent lengths
        let obs = arr2(&[[0., 0.], [1., 1.], [2., 2.]]);
        let res = storage.write_episode(obs.view().into_dyn(), act.view(), &[0.], &[1]);
        assert!(matches!(res, Err(HerError::InvalidEpisodeShape(_))));

        assert_eq!(storage.pos(), 0);
        assert_eq!(storage.upper_bound(), 0);
    }
}
