//! Latest-wins guard for overlapping requests
//!
//! When the same call site fires again before an earlier request finished,
//! only the newest result is kept. In-flight work is not cancelled, its
//! result is simply dropped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

/// Generation captured when a request starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    site: &'static str,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct LatestWins {
    generations: Mutex<HashMap<&'static str, u64>>,
}

impl LatestWins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request for `site`, superseding any earlier one.
    pub fn begin(&self, site: &'static str) -> Ticket {
        let mut generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        let generation = generations.entry(site).or_insert(0);
        *generation += 1;
        Ticket {
            site,
            generation: *generation,
        }
    }

    pub fn is_latest(&self, ticket: &Ticket) -> bool {
        let generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        generations.get(ticket.site).copied() == Some(ticket.generation)
    }

    /// Await `work` and return its output unless a newer request for the
    /// same site started in the meantime.
    pub async fn run<F, T>(&self, site: &'static str, work: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let ticket = self.begin(site);
        let output = work.await;
        self.is_latest(&ticket).then_some(output)
    }
}
