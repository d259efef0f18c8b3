//! 配额引擎集成测试
//!
//! 覆盖时区边界、序列化往返和展示格式化的组合行为。

use crate::common::utc;
use chrono::FixedOffset;
use storygate::prelude::*;

/// 东西半球时区下的日界矩阵
#[test]
fn test_day_boundary_across_offsets() {
    let last_reset = utc(2024, 6, 15, 22, 30, 0);

    // UTC+9（东京）：22:30Z 已是次日 07:30，半夜后的任何时刻都算新的一天
    let tokyo = QuotaEngine::new(FixedOffset::east_opt(9 * 3600).unwrap());
    assert!(!tokyo.is_new_day(Some(last_reset), utc(2024, 6, 15, 23, 0, 0)));
    assert!(tokyo.is_new_day(Some(last_reset), utc(2024, 6, 16, 15, 0, 0)));

    // UTC-5（利马）：22:30Z 是当地 17:30，次日 04:59Z 仍是当地同一天
    let lima = QuotaEngine::new(FixedOffset::west_opt(5 * 3600).unwrap());
    assert!(!lima.is_new_day(Some(last_reset), utc(2024, 6, 16, 4, 59, 0)));
    assert!(lima.is_new_day(Some(last_reset), utc(2024, 6, 16, 5, 0, 0)));
}

/// 不同时区引擎对同一状态给出一致的套餐数学、不同的重置时刻
#[test]
fn test_reset_instant_follows_engine_timezone() {
    let now = utc(2024, 6, 15, 12, 0, 0);
    let state = QuotaState::new_account();

    let utc_engine = QuotaEngine::new(FixedOffset::east_opt(0).unwrap());
    let lima = QuotaEngine::new(FixedOffset::west_opt(5 * 3600).unwrap());

    let d1 = utc_engine.evaluate(&state, now);
    let d2 = lima.evaluate(&state, now);
    assert_eq!(d1.remaining, d2.remaining);

    assert_eq!(d1.reset_at, utc(2024, 6, 16, 0, 0, 0));
    // 利马的次日午夜是 UTC 05:00
    assert_eq!(d2.reset_at, utc(2024, 6, 16, 5, 0, 0));
}

/// 评估结果接上展示格式化
#[test]
fn test_decision_feeds_display_formatting() {
    let engine = QuotaEngine::new(FixedOffset::east_opt(0).unwrap());
    let now = utc(2024, 6, 15, 21, 30, 0);

    let decision = engine.evaluate(&QuotaState::new_account(), now);
    assert_eq!(format_remaining_time(decision.reset_at, now), "2h 30m");

    let near_midnight = utc(2024, 6, 15, 23, 40, 0);
    let decision = engine.evaluate(&QuotaState::new_account(), near_midnight);
    assert_eq!(
        format_remaining_time(decision.reset_at, near_midnight),
        "20m"
    );
}

/// 持久化往返经过 JSON 后套餐数学不变
#[test]
fn test_serde_round_trip_preserves_decisions() {
    let engine = QuotaEngine::new(FixedOffset::east_opt(0).unwrap());
    let now = utc(2024, 6, 15, 12, 0, 0);

    let state = QuotaState::new_account()
        .upgrade_to_premium(utc(2024, 6, 15, 8, 0, 0));
    let state = engine.apply_usage(&state, now);

    let json = serde_json::to_string(&state).unwrap();
    let restored: QuotaState = serde_json::from_str(&json).unwrap();

    assert_eq!(
        engine.evaluate(&restored, now),
        engine.evaluate(&state, now)
    );
}

/// 损坏的持久化时间戳退化为"从未重置"，评估照常工作
#[test]
fn test_corrupt_timestamp_degrades_gracefully() {
    let engine = QuotaEngine::new(FixedOffset::east_opt(0).unwrap());
    let raw = r#"{"tier":"premium","free_used":2,"daily_used":2,"last_reset":"2024-13-45T99:00:00Z"}"#;

    let state: QuotaState = serde_json::from_str(raw).unwrap();
    assert!(state.last_reset.is_none());

    let decision = engine.evaluate(&state, utc(2024, 6, 15, 12, 0, 0));
    assert!(decision.new_day);
    assert_eq!(decision.remaining, 3);
}

/// 套餐生命周期：免费 → 高级 → 撤销
#[test]
fn test_tier_lifecycle() {
    let engine = QuotaEngine::new(FixedOffset::east_opt(0).unwrap());
    let day1 = utc(2024, 6, 15, 10, 0, 0);

    // 免费用完
    let mut state = QuotaState::new_account();
    state = engine.apply_usage(&state, day1);
    state = engine.apply_usage(&state, day1);
    assert!(!engine.evaluate(&state, day1).can_act);

    // 升级当日即有完整额度
    let premium = state.upgrade_to_premium(day1);
    assert_eq!(engine.evaluate(&premium, day1).remaining, 3);

    // 高级用量不影响冻结的免费计数
    let premium = engine.apply_usage(&premium, day1);
    let revoked = premium.revoke_premium();
    assert_eq!(revoked.free_used, 2);
    assert!(!engine.evaluate(&revoked, day1).can_act);
}
