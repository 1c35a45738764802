use async_trait::async_trait;
use chrono::{DateTime, Duration, Local};
use std::sync::Mutex;

/// Time source for the scheduler loop.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    /// Return once `deadline` has passed.
    async fn sleep_until(&self, deadline: DateTime<Local>);
}

/// Wall clock backed by tokio timers.
#[derive(Debug, Default, Clone)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Local>) {
        let wait = (deadline - Local::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
    }
}

/// Clock that only moves when told to. Sleeping jumps straight to the deadline.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
    sleeps: Mutex<Vec<DateTime<Local>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    /// Deadlines passed to `sleep_until`, in call order.
    pub fn sleeps(&self) -> Vec<DateTime<Local>> {
        self.sleeps
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Local::now())
    }

    async fn sleep_until(&self, deadline: DateTime<Local>) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(deadline);
        }
        if let Ok(mut now) = self.now.lock() {
            if deadline > *now {
                *now = deadline;
            }
        }
    }
}
