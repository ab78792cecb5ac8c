//! Generation tickets for last-write-wins result application.
//!
//! Every asynchronous cycle (a docking dispatch, a structure load) takes a
//! ticket from its owner's `Generation`. Starting a newer cycle advances the
//! counter, so results carrying an older ticket can be recognised on arrival
//! and dropped. In-flight work is never aborted, only ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic cycle counter shared between an owner and its tickets.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    current: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new cycle; every ticket handed out before is now stale.
    pub fn advance(&self) -> GenerationTicket {
        let id = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        GenerationTicket {
            id,
            current: Arc::clone(&self.current),
        }
    }

    /// Invalidate outstanding tickets without starting a tracked cycle.
    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

/// Tag attached to one asynchronous cycle.
#[derive(Debug, Clone)]
pub struct GenerationTicket {
    id: u64,
    current: Arc<AtomicU64>,
}

impl GenerationTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether no newer cycle has been started since this ticket was issued.
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_ticket_supersedes_older() {
        let gen = Generation::new();
        let first = gen.advance();
        assert!(first.is_current());

        let second = gen.advance();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(second.id() > first.id());
    }

    #[test]
    fn test_invalidate_stales_all_tickets() {
        let gen = Generation::new();
        let ticket = gen.advance();
        gen.invalidate();
        assert!(!ticket.is_current());
    }

    #[test]
    fn test_clones_share_the_counter() {
        let gen = Generation::new();
        let handle = gen.clone();
        let ticket = gen.advance();
        handle.advance();
        assert!(!ticket.is_current());
        assert_eq!(gen.current(), handle.current());
    }
}
