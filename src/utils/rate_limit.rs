// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sliding-window rate limiting.
//!
//! The counter lives behind [`RateLimitStore`] and is injected into the
//! dispatcher, so tests can drive it with explicit instants and a
//! multi-instance deployment can swap in a shared backend.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

pub trait RateLimitStore: Send + Sync {
    /// Record one hit for `key` at `now` if capacity allows.
    fn try_acquire(&self, key: &str, now: Instant) -> RateDecision;
}

/// Fixed-capacity sliding window per key, held in process memory.
pub struct InMemoryRateLimitStore {
    capacity: u32,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl InMemoryRateLimitStore {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn try_acquire(&self, key: &str, now: Instant) -> RateDecision {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        let window = hits.entry(key.to_string()).or_default();

        while let Some(&oldest) = window.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if (window.len() as u32) < self.capacity {
            window.push_back(now);
            RateDecision::Allowed {
                remaining: self.capacity - window.len() as u32,
            }
        } else {
            let retry_after = window
                .front()
                .map(|&oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
                .unwrap_or_default();
            RateDecision::Limited { retry_after }
        }
    }
}
