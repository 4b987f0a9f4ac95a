//! Debounced search input.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Collapses bursts of input into their last value.
///
/// A value is released only after the input has been quiet for the debounce
/// window, so typing "one piece" letter by letter issues one search.
pub struct Debouncer<T> {
    input: mpsc::Receiver<T>,
    window: Duration,
}

impl<T> Debouncer<T> {
    pub fn new(input: mpsc::Receiver<T>, window: Duration) -> Self {
        Self { input, window }
    }

    /// Wait for the next settled value.
    ///
    /// Returns `None` once the input is closed and nothing is pending. A
    /// value still pending when the input closes is released immediately.
    pub async fn next(&mut self) -> Option<T> {
        let mut latest = self.input.recv().await?;
        loop {
            match timeout(self.window, self.input.recv()).await {
                Ok(Some(value)) => latest = value,
                Ok(None) | Err(_) => return Some(latest),
            }
        }
    }
}
