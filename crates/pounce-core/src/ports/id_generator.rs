//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use ulid::Ulid;

use crate::domain::RunId;
use crate::ports::Clock;

/// IdGenerator は RunId を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（Scheduler の clone 間で共有）
pub trait IdGenerator: Send + Sync {
    fn generate_run_id(&self) -> RunId;
}

/// ULID generator whose timestamp part comes from the injected `Clock`, so a
/// `FixedClock` yields ids with a known timestamp.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_run_id(&self) -> RunId {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        RunId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn run_ids_are_unique() {
        let id_gen = UlidGenerator::new(SystemClock);
        let a = id_gen.generate_run_id();
        let b = id_gen.generate_run_id();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("run-"));
    }

    #[test]
    fn fixed_clock_pins_the_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2025, 1, 16, 13, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let a = id_gen.generate_run_id();
        let b = id_gen.generate_run_id();

        // ランダム部分があるので ID は異なるが、timestamp は同じ
        assert_ne!(a, b);
        assert_eq!(a.timestamp_ms(), b.timestamp_ms());
        assert_eq!(a.timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }
}
