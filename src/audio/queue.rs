use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

/// A playable item resolved by the audio node.
///
/// Never mutated once created; `identifier` is the opaque handle the node
/// needs to start playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    pub identifier: String,
    pub author: Option<String>,
    pub uri: Option<String>,
    /// `None` for live streams.
    pub duration: Option<Duration>,
}

impl Track {
    pub fn new(title: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            identifier: identifier.into(),
            author: None,
            uri: None,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Per-guild play queue. Strict FIFO: insertion order is play order.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: VecDeque<Track>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the tail, returning the 1-based queue position.
    pub fn push(&mut self, track: Track) -> usize {
        info!("➕ Agregado a la cola: {}", track.title);
        self.items.push_back(track);
        self.items.len()
    }

    /// Takes the head of the queue.
    pub fn pop(&mut self) -> Option<Track> {
        let next = self.items.pop_front();
        match &next {
            Some(track) => debug!("➡️ Siguiente en cola: {}", track.title),
            None => debug!("📭 La cola está vacía"),
        }
        next
    }

    /// Empties the queue, returning how many tracks were dropped.
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        if removed > 0 {
            info!("🗑️ Eliminadas {} pistas de la cola", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    /// The first `limit` tracks plus how many more are waiting behind them.
    pub fn preview(&self, limit: usize) -> QueuePreview {
        QueuePreview {
            items: self.items.iter().take(limit).cloned().collect(),
            remaining: self.items.len().saturating_sub(limit),
            total: self.total_duration(),
        }
    }

    /// Sum of known durations; streams count as zero.
    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter_map(|track| track.duration).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePreview {
    pub items: Vec<Track>,
    pub remaining: usize,
    /// Known length of the whole queue, not just the shown part.
    pub total: Duration,
}

impl QueuePreview {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
