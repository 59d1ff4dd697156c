use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A background task that delivers a message into a mailbox, once or on a
/// period. Cancelling is idempotent and dropping the handle cancels it.
#[derive(Debug)]
pub struct TimerHandle {
    handle: JoinHandle<()>,
}

impl TimerHandle {
    pub fn once<T: Send + 'static>(delay: Duration, sender: mpsc::Sender<T>, message: T) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(message).await;
        });
        TimerHandle { handle }
    }

    /// Ticks are offered with `try_send`; a full mailbox skips a tick and
    /// a closed one ends the task.
    pub fn every<T, F>(period: Duration, sender: mpsc::Sender<T>, message: F) -> Self
    where
        T: Send + 'static,
        F: Fn() -> T + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match sender.try_send(message()) {
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });
        TimerHandle { handle }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_once_fires_after_delay() {
        let (tx, mut rx) = mpsc::channel(4);
        let _timer = TimerHandle::once(Duration::from_secs(5), tx, "fired");

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.recv().await, Some("fired"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let (tx, mut rx) = mpsc::channel(4);
        let timer = TimerHandle::once(Duration::from_secs(1), tx, ());

        timer.cancel();
        timer.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_repeats_until_dropped() {
        let (tx, mut rx) = mpsc::channel(16);
        let timer = TimerHandle::every(Duration::from_secs(1), tx, || 1u8);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let mut ticks = 0;
        while rx.try_recv().is_ok() {
            ticks += 1;
        }
        assert_eq!(ticks, 3);

        drop(timer);
        assert!(rx.recv().await.is_none());
    }
}
