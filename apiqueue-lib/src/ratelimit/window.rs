use std::collections::VecDeque;

/// Number of samples kept by [`Window::default`]
const DEFAULT_CAPACITY: usize = 100;

/// Bounded buffer of the most recent samples.
/// Once full, every push evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct Window<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T> Window<T> {
    /// Create an empty window holding at most `capacity` samples
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a sample
    pub fn push(&mut self, sample: T) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Number of samples currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if no sample was recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }

    /// The most recent sample
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.samples.back()
    }

    /// Samples in ascending order
    #[must_use]
    pub fn sorted(&self) -> Vec<T>
    where
        T: Clone + Ord,
    {
        let mut samples: Vec<T> = self.samples.iter().cloned().collect();
        samples.sort();
        samples
    }
}

impl<T> Default for Window<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
