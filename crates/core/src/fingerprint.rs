//! The URL Fingerprint Set (§4.1): a process-wide, concurrently-shared
//! de-duplication set. The only operation is `insert_if_absent`, which is
//! the sole admission point into the rest of the system — a `true` result
//! is a one-time ticket that obligates the caller to enqueue the URL
//! exactly once.

use dashmap::DashSet;

#[derive(Default)]
pub struct FingerprintSet {
    seen: DashSet<String>,
}

impl FingerprintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` iff this call is the first to register `url`.
    pub fn insert_if_absent(&self, url: &url::Url) -> bool {
        self.seen.insert(url.as_str().to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn first_insert_wins() {
        let set = FingerprintSet::new();
        let url = Url::parse("http://a.com/x").unwrap();
        assert!(set.insert_if_absent(&url));
        assert!(!set.insert_if_absent(&url));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn concurrent_admission_admits_exactly_once() {
        use std::sync::Arc;

        let set = Arc::new(FingerprintSet::new());
        let url = Url::parse("http://a.com/x").unwrap();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let set = Arc::clone(&set);
                let url = url.clone();
                std::thread::spawn(move || set.insert_if_absent(&url))
            })
            .collect();

        let winners: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();

        assert_eq!(winners, 1);
    }
}
