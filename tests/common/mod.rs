//! 测试共用工具
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// 构造 UTC 时间戳
pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

/// 可拨动的测试时钟
///
/// 秒级精度足够：引擎只做日界比较和分钟级格式化。
#[derive(Clone)]
pub struct TestClock {
    instant: Arc<AtomicI64>,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            instant: Arc::new(AtomicI64::new(start.timestamp())),
        }
    }

    /// 拨到指定时刻
    pub fn set(&self, t: DateTime<Utc>) {
        self.instant.store(t.timestamp(), Ordering::SeqCst);
    }

    /// 生成可注入 Gatekeeper 的时钟闭包
    pub fn closure(&self) -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
        let instant = Arc::clone(&self.instant);
        move || {
            Utc.timestamp_opt(instant.load(Ordering::SeqCst), 0)
                .unwrap()
        }
    }
}
