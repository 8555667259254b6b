//! 单调计时器
//!
//! `Instant` 在 Linux 上由 `clock_gettime(CLOCK_MONOTONIC)` 提供。

use std::time::{Duration, Instant};

/// 计时器刻度: 纳秒
pub const TIMER_FREQUENCY: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy)]
pub struct MonotonicTimer {
    offset: Instant,
}

impl MonotonicTimer {
    pub fn start() -> Self {
        Self { offset: Instant::now() }
    }

    /// 自初始化以来经过的刻度数
    pub fn value(&self) -> u64 {
        u64::try_from(self.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    pub fn frequency(&self) -> u64 {
        TIMER_FREQUENCY
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.elapsed()
    }
}
