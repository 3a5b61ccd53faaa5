//! Per-path debouncing of filesystem events.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Longest supported window. Larger values are clamped so deadlines stay
/// representable as `Instant`s.
pub const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Token {
    deadline: Instant,
    seq: u64,
    path: PathBuf,
}

/// Pending reloads ordered by expiration, at most one live token per path.
///
/// Rescheduling a path supersedes its previous token. Superseded tokens stay
/// in the heap and are discarded when they reach the top.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    heap: BinaryHeap<Reverse<Token>>,
    live: HashMap<PathBuf, u64>,
    next_seq: u64,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.min(MAX_WINDOW),
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_seq: 0,
        }
    }

    /// (Re)schedule `path` to expire one window after `now`.
    pub fn schedule(&mut self, path: &Path, now: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(path.to_path_buf(), seq);
        self.heap.push(Reverse(Token {
            deadline: now + self.window,
            seq,
            path: path.to_path_buf(),
        }));
    }

    fn is_live(&self, token: &Token) -> bool {
        self.live.get(&token.path) == Some(&token.seq)
    }

    /// Expiration of the nearest live token.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse(top)) = self.heap.peek() {
            if self.is_live(top) {
                return Some(top.deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Remove and return every path whose token expired at or before `now`.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut expired = Vec::new();
        while let Some(Reverse(top)) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let Some(Reverse(token)) = self.heap.pop() else {
                break;
            };
            if self.is_live(&token) {
                self.live.remove(&token.path);
                expired.push(token.path);
            }
        }
        expired
    }

    /// Number of paths waiting to expire.
    pub fn pending(&self) -> usize {
        self.live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(1000);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn burst_on_one_path_expires_once_after_last_event() {
        let mut d = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        let a = Path::new("/t/a.txt");

        d.schedule(a, t0);
        d.schedule(a, t0 + ms(100));
        d.schedule(a, t0 + ms(200));
        assert_eq!(d.pending(), 1);
        assert_eq!(d.next_deadline(), Some(t0 + ms(1200)));

        assert!(d.drain_expired(t0 + ms(1100)).is_empty());
        assert_eq!(d.drain_expired(t0 + ms(1200)), vec![a.to_path_buf()]);
        assert!(d.drain_expired(t0 + ms(5000)).is_empty());
        assert_eq!(d.next_deadline(), None);
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn independent_paths_expire_on_their_own_windows() {
        let mut d = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        let a = Path::new("/t/a.txt");
        let b = Path::new("/t/b.txt");

        d.schedule(a, t0);
        d.schedule(b, t0 + ms(500));

        assert_eq!(d.drain_expired(t0 + ms(1000)), vec![a.to_path_buf()]);
        assert_eq!(d.next_deadline(), Some(t0 + ms(1500)));
        assert_eq!(d.drain_expired(t0 + ms(1500)), vec![b.to_path_buf()]);
    }

    #[test]
    fn drains_every_expired_token_at_once() {
        let mut d = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        for name in ["c", "a", "b"] {
            d.schedule(Path::new(name), t0);
        }
        let mut drained = d.drain_expired(t0 + ms(2000));
        drained.sort();
        assert_eq!(drained, vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]);
    }

    #[test]
    fn rescheduled_path_moves_behind_others() {
        let mut d = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        let a = Path::new("a");
        let b = Path::new("b");

        d.schedule(a, t0);
        d.schedule(b, t0 + ms(300));
        d.schedule(a, t0 + ms(600));

        assert_eq!(d.next_deadline(), Some(t0 + ms(1300)));
        assert_eq!(d.drain_expired(t0 + ms(1300)), vec![b.to_path_buf()]);
        assert_eq!(d.drain_expired(t0 + ms(1600)), vec![a.to_path_buf()]);
    }

    #[test]
    fn oversized_window_is_clamped() {
        let mut d = Debouncer::new(Duration::MAX);
        assert_eq!(d.window, MAX_WINDOW);

        let t0 = Instant::now();
        d.schedule(Path::new("a"), t0);
        assert_eq!(d.next_deadline(), Some(t0 + MAX_WINDOW));
        assert!(d.drain_expired(t0 + ms(5000)).is_empty());
    }
}
