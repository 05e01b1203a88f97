use std::time::Duration;

use tokio::sync::mpsc;

/// A cancelable, optionally repeating scheduled callback
///
/// Construction arms the timer: a task is spawned that waits for `period`
/// to elapse and then invokes the callback, re-arming itself while `repeat`
/// is true. Must be called from within a Tokio runtime.
///
/// [`stop`] (or dropping the handle) cancels the timer. The shutdown branch
/// of the internal `select!` is polled before the sleep, so a firing that is
/// pending when the timer is stopped is aborted, never delivered.
///
/// [`stop`]: Self::stop
pub struct Timer {
    tx: Option<mpsc::Sender<()>>,
}

impl Timer {
    /// Arm a timer that invokes `callback` every `period`, or once if
    /// `repeat` is false
    pub fn start<F>(period: Duration, repeat: bool, mut callback: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = rx.recv() => return,
                    _ = tokio::time::sleep(period) => callback(),
                }
                if !repeat {
                    return;
                }
            }
        });
        Self { tx: Some(tx) }
    }

    /// Cancel any pending firing. Idempotent.
    pub fn stop(&mut self) {
        self.tx.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn one_shot_timer_fires_exactly_once() {
        let (tx, mut rx) = unbounded_channel();
        let _timer = Timer::start(Duration::from_millis(10), false, move || {
            tx.send(()).unwrap();
        });

        assert_eq!(rx.recv().await, Some(()));
        // the task ends after the single firing, dropping the callback
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn repeating_timer_fires_until_stopped() {
        let (tx, mut rx) = unbounded_channel();
        let mut timer = Timer::start(Duration::from_millis(5), true, move || {
            tx.send(()).unwrap();
        });

        for _ in 0..3 {
            assert_eq!(rx.recv().await, Some(()));
        }
        timer.stop();

        // drain anything that fired before the stop was observed, then
        // the sender must drop
        while rx.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn stop_before_the_duration_elapses_suppresses_the_callback() {
        let (tx, mut rx) = unbounded_channel();
        let mut timer = Timer::start(Duration::from_secs(60), false, move || {
            tx.send(()).unwrap();
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        timer.stop();

        // the task exits without firing, which drops the sender
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels_the_timer() {
        let (tx, mut rx) = unbounded_channel();
        let timer = Timer::start(Duration::from_secs(60), true, move || {
            tx.send(()).unwrap();
        });
        drop(timer);

        assert_eq!(rx.recv().await, None);
    }
}
