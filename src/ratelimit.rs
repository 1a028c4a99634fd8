use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tokio::task::JoinHandle;

use crate::errors::ServerError;

/// Per-user request quotas, one limiter per limited route.
///
/// Each quota is a GCRA bucket: a user may burst `n` requests at once, then
/// one more becomes available every `60 / n` seconds.
#[derive(Clone)]
pub struct RateLimits {
    pub generate: Arc<DefaultKeyedRateLimiter<i64>>,
    pub chat: Arc<DefaultKeyedRateLimiter<i64>>,
    pub history: Arc<DefaultKeyedRateLimiter<i64>>,
}

impl RateLimits {
    pub fn new(generate_per_minute: u32, chat_per_minute: u32) -> Self {
        Self {
            generate: Arc::new(RateLimiter::keyed(quota(generate_per_minute))),
            chat: Arc::new(RateLimiter::keyed(quota(chat_per_minute))),
            history: Arc::new(RateLimiter::keyed(quota(chat_per_minute))),
        }
    }

    /// Drops users whose bucket has fully refilled.
    pub fn retain_recent(&self) {
        for limiter in [&self.generate, &self.chat, &self.history] {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    /// Runs `retain_recent` every `period` until the runtime shuts down.
    pub fn spawn_cleanup(&self, period: Duration) -> JoinHandle<()> {
        let limits = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                limits.retain_recent();
                tracing::debug!(
                    generate = limits.generate.len(),
                    chat = limits.chat.len(),
                    history = limits.history.len(),
                    "Rate limiter keys retained"
                );
            }
        })
    }
}

fn quota(per_minute: u32) -> Quota {
    let n = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    Quota::per_minute(n)
}

pub fn check(limiter: &DefaultKeyedRateLimiter<i64>, user_id: i64) -> Result<(), ServerError> {
    limiter.check_key(&user_id).map_err(|_| ServerError::RateLimited)
}
