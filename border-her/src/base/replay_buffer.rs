//! Replay buffer interface.
//!
//! The two traits separate the side of a replay buffer that receives experiences
//! from an environment from the side that produces batches for an optimizer.
use anyhow::Result;

/// Interface for buffers that store experiences from environments.
///
/// # Examples
///
/// ```ignore
/// struct SimpleBuffer<T> {
///     items: Vec<T>,
/// }
///
/// impl<T> ExperienceBufferBase for SimpleBuffer<T> {
///     type Item = T;
///
///     fn push(&mut self, tr: T) -> Result<()> {
///         self.items.push(tr);
///         Ok(())
///     }
///
///     fn len(&self) -> usize {
///         self.items.len()
///     }
/// }
/// ```
pub trait ExperienceBufferBase {
    /// The type of items stored in the buffer.
    type Item;

    /// Pushes a new experience into the buffer.
    ///
    /// A buffer may hold the item back before it becomes visible for sampling,
    /// as episode based buffers do until the episode terminates.
    fn push(&mut self, tr: Self::Item) -> Result<()>;

    /// Returns the number of experiences available for sampling.
    fn len(&self) -> usize;

    /// Returns `true` if nothing can be sampled yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interface for replay buffers that generate batches for training.
pub trait ReplayBufferBase {
    /// Configuration parameters for the replay buffer.
    type Config: Clone;

    /// The type of batch generated for training.
    type Batch;

    /// Samples a batch of `size` experiences with replacement.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;
}
