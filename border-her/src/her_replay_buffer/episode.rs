//! Accumulation of the transitions of an in-progress episode.
use crate::Transition;
use std::mem;

/// Holds the transitions of the episode in progress.
///
/// Transitions are handed over only when the episode ends, so nothing of an
/// unfinished episode ever reaches the storage.
#[derive(Debug, Default)]
pub struct EpisodeAccumulator {
    transitions: Vec<Transition>,
}

impl EpisodeAccumulator {
    /// Creates an empty accumulator able to hold `max_episode_len` transitions without reallocation.
    pub fn with_capacity(max_episode_len: usize) -> Self {
        Self {
            transitions: Vec::with_capacity(max_episode_len),
        }
    }

    /// Appends a transition.
    ///
    /// Returns the whole episode and leaves the accumulator empty if `tr.is_done` is `true`.
    pub fn push(&mut self, tr: Transition) -> Option<Vec<Transition>> {
        let is_done = tr.is_done;
        self.transitions.push(tr);
        if is_done {
            let capacity = self.transitions.capacity();
            Some(mem::replace(
                &mut self.transitions,
                Vec::with_capacity(capacity),
            ))
        } else {
            None
        }
    }

    /// Number of transitions of the episode in progress.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Drops the episode in progress.
    pub fn clear(&mut self) {
        self.transitions.clear();
    }
}
