//! Byte budget for long-lived streaming responses.
//!
//! Browsers keep every chunk of an XHR/EventSource/htmlfile response in
//! memory until the request ends. Cutting the response after a fixed volume
//! forces the client to reconnect and release it; the session is untouched.

/// Tracks bytes written on the current streaming response.
#[derive(Debug)]
pub struct ByteBudget {
    limit: usize,
    sent: usize,
}

impl ByteBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, sent: 0 }
    }

    /// Account for `n` more bytes. Returns true once the response should be
    /// ended.
    pub fn record(&mut self, n: usize) -> bool {
        self.sent = self.sent.saturating_add(n);
        self.exhausted()
    }

    pub fn exhausted(&self) -> bool {
        self.sent >= self.limit
    }

    pub fn sent(&self) -> usize {
        self.sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_at_limit() {
        let mut budget = ByteBudget::new(4096);
        assert!(!budget.record(2));
        for _ in 0..30 {
            assert!(!budget.record(134));
        }
        assert_eq!(budget.sent(), 4022);
        assert!(budget.record(134));
    }

    #[test]
    fn single_oversized_frame_exhausts() {
        let mut budget = ByteBudget::new(4096);
        assert!(budget.record(4108));
    }
}
