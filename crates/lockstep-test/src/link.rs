//! In-memory link
//!
//! Models the transport the engine actually assumes: reliable and ordered,
//! but with real latency. Jitter is drawn from a seeded RNG so runs are
//! reproducible, and a frame's delivery never overtakes an earlier frame's.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lockstep_core::Event;

/// Link timing parameters
#[derive(Clone, Debug)]
pub struct LinkConfig {
    /// Fixed one-way latency
    pub base_latency: Duration,
    /// Uniform random extra latency in [0, jitter]
    pub jitter: Duration,
}

impl LinkConfig {
    /// Zero-latency delivery
    pub fn instant() -> Self {
        LinkConfig {
            base_latency: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Local-network conditions
    pub fn lan() -> Self {
        LinkConfig {
            base_latency: Duration::from_millis(2),
            jitter: Duration::from_millis(3),
        }
    }

    /// Cross-country conditions
    pub fn wan() -> Self {
        LinkConfig {
            base_latency: Duration::from_millis(60),
            jitter: Duration::from_millis(25),
        }
    }

    /// Fixed latency, no jitter
    pub fn fixed(latency: Duration) -> Self {
        LinkConfig {
            base_latency: latency,
            jitter: Duration::ZERO,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::lan()
    }
}

/// One direction of a connection
pub struct Link {
    config: LinkConfig,
    rng: StdRng,
    queue: VecDeque<(Instant, Event)>,
    last_scheduled: Option<Instant>,
}

impl Link {
    pub fn new(config: LinkConfig, seed: u64) -> Self {
        Link {
            config,
            rng: StdRng::seed_from_u64(seed),
            queue: VecDeque::new(),
            last_scheduled: None,
        }
    }

    /// Schedule a frame for future delivery
    pub fn offer(&mut self, now: Instant, frame: Event) {
        let jitter = if self.config.jitter.is_zero() {
            Duration::ZERO
        } else {
            let bound = self.config.jitter.as_micros() as u64;
            Duration::from_micros(self.rng.gen_range(0..=bound))
        };

        let mut at = now + self.config.base_latency + jitter;
        // ordered channel: never deliver ahead of an earlier frame
        if let Some(last) = self.last_scheduled {
            if at < last {
                at = last;
            }
        }
        self.last_scheduled = Some(at);
        self.queue.push_back((at, frame));
    }

    /// Pop every frame whose delivery time has arrived
    pub fn due(&mut self, now: Instant) -> Vec<Event> {
        let mut delivered = Vec::new();
        while self
            .queue
            .front()
            .is_some_and(|(at, _)| *at <= now)
        {
            if let Some((_, frame)) = self.queue.pop_front() {
                delivered.push(frame);
            }
        }
        delivered
    }

    /// Frames still in flight
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
