use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};

/// Stand-in deadline for durations too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Single-shot timer that has to be re-armed explicitly after it fires.
///
/// A disarmed deadline never completes, so it can sit in a `select!` next to live timers.
pub(crate) struct Deadline {
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl Deadline {
    pub fn disarmed() -> Self {
        Self {
            sleep: Box::pin(sleep(Duration::ZERO)),
            armed: false,
        }
    }

    pub fn after(dur: Duration) -> Self {
        let mut deadline = Self::disarmed();
        deadline.arm(dur);
        deadline
    }

    /// (Re)start the timer `dur` from now.
    pub fn arm(&mut self, dur: Duration) {
        let now = Instant::now();
        let deadline = now.checked_add(dur).unwrap_or(now + FAR_FUTURE);
        self.sleep.as_mut().reset(deadline);
        self.armed = true;
    }

    #[allow(unused)]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Completes when an armed deadline passes. Cancel safe.
    pub async fn fired(&mut self) {
        if !self.armed {
            pending::<()>().await;
        }
        self.sleep.as_mut().await;
        self.armed = false;
    }
}
