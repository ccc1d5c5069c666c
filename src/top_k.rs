//! Bounded selection of the highest-scoring entries from a stream.
//!
//! Entries are buffered until the buffer is full, sorted once, and from then on only compared
//! against the current minimum. Ties keep the entry that arrived first, so the result is the
//! same as a stable sort of the whole stream truncated to `limit`.

pub trait Scored {
    fn score(&self) -> f64;
}

impl Scored for f64 {
    fn score(&self) -> f64 {
        *self
    }
}

fn descending<T: Scored>(a: &T, b: &T) -> std::cmp::Ordering {
    b.score().total_cmp(&a.score())
}

#[derive(Debug, Clone)]
pub struct TopK<T> {
    limit: usize,
    /// Sorted descending once `buffer.len() == limit`.
    buffer: Vec<T>,
}

impl<T: Scored> TopK<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            buffer: Vec::with_capacity(limit.min(1024)),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.limit
    }

    /// Lowest score still retained, once the buffer is full.
    pub fn threshold(&self) -> Option<f64> {
        if self.is_full() {
            self.buffer.last().map(Scored::score)
        } else {
            None
        }
    }

    /// Whether an entry with this score would currently be retained.
    pub fn would_admit(&self, score: f64) -> bool {
        self.limit > 0 && self.threshold().map_or(true, |threshold| score > threshold)
    }

    /// Offer an entry. Returns whether it was retained.
    pub fn offer(&mut self, entry: T) -> bool {
        if !self.would_admit(entry.score()) {
            return false;
        }

        if !self.is_full() {
            self.buffer.push(entry);
            if self.is_full() {
                self.buffer.sort_by(descending);
            }
            return true;
        }

        // evict the current minimum and insert after every entry scoring at least as much
        self.buffer.pop();
        let score = entry.score();
        let position = self.buffer.partition_point(|retained| retained.score() >= score);
        self.buffer.insert(position, entry);
        true
    }

    /// The retained entries, highest score first.
    pub fn into_sorted_vec(mut self) -> Vec<T> {
        if !self.is_full() {
            self.buffer.sort_by(descending);
        }
        self.buffer
    }
}

impl<T: Scored> Extend<T> for TopK<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for entry in iter {
            self.offer(entry);
        }
    }
}
