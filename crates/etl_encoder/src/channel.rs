//! The bounded line channel carrying encoded COPY lines from the transform
//! layer to the bulk loader.
//!
//! The in-flight byte budget is capped at `high_water_mark` via a
//! `tokio::sync::Semaphore`: a send that would exceed the budget blocks
//! until the receiver has drained enough bytes. This keeps one job's
//! in-flight memory O(highWaterMark), independent of total row count.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};

#[derive(Debug, Error)]
#[error("line receiver dropped")]
pub struct LineSendError;

pub struct LineSender {
    tx: mpsc::Sender<Vec<u8>>,
    backpressure: Arc<Semaphore>,
    high_water_mark: u32,
}

pub struct LineReceiver {
    rx: mpsc::Receiver<Vec<u8>>,
    backpressure: Arc<Semaphore>,
    high_water_mark: u32,
}

/// Create a paired sender/receiver whose in-flight byte budget is capped at
/// `high_water_mark`.
pub fn bounded_line_channel(high_water_mark: usize) -> (LineSender, LineReceiver) {
    let high_water_mark = high_water_mark.max(1) as u32;
    let backpressure = Arc::new(Semaphore::new(high_water_mark as usize));
    let (tx, rx) = mpsc::channel(64);
    (
        LineSender { tx, backpressure: backpressure.clone(), high_water_mark },
        LineReceiver { rx, backpressure, high_water_mark },
    )
}

impl LineSender {
    /// Send one encoded line, waiting for enough byte budget to free up.
    /// Lines longer than `high_water_mark` consume the entire budget rather
    /// than deadlocking.
    pub async fn send(&self, line: Vec<u8>) -> Result<(), LineSendError> {
        let cost = (line.len() as u32).min(self.high_water_mark).max(1);
        let permit = self.backpressure.clone().acquire_many_owned(cost).await.map_err(|_| LineSendError)?;
        permit.forget();
        self.tx.send(line).await.map_err(|_| LineSendError)
    }
}

impl LineReceiver {
    /// Receive the next line, if any remain, releasing its share of the
    /// byte budget back to waiting senders.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        let line = self.rx.recv().await?;
        let cost = (line.len() as u32).min(self.high_water_mark).max(1);
        self.backpressure.add_permits(cost as usize);
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_lines_in_order() {
        let (tx, mut rx) = bounded_line_channel(1024);
        tx.send(b"a\n".to_vec()).await.unwrap();
        tx.send(b"b\n".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await, Some(b"a\n".to_vec()));
        assert_eq!(rx.recv().await, Some(b"b\n".to_vec()));
    }

    #[tokio::test]
    async fn oversized_line_does_not_deadlock() {
        let (tx, mut rx) = bounded_line_channel(4);
        let big = vec![b'x'; 4096];
        tx.send(big.clone()).await.unwrap();
        assert_eq!(rx.recv().await, Some(big));
    }

    #[tokio::test]
    async fn send_after_receiver_drop_errors() {
        let (tx, rx) = bounded_line_channel(1024);
        drop(rx);
        assert!(tx.send(b"a\n".to_vec()).await.is_err());
    }
}
