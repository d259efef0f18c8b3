//! 配额展示路径演示：评估不消费配额
//!
//! 运行: cargo run --example remaining_display

use chrono::Utc;
use storygate::prelude::*;

fn main() {
    let engine = QuotaEngine::server_local();
    let now = Utc::now();

    // 新注册的免费账号
    let free = QuotaState::new_account();
    let decision = engine.evaluate(&free, now);
    println!(
        "免费账号：剩余 {} 个（终身），can_act = {}",
        decision.remaining, decision.can_act
    );

    // 已用满当日额度的高级账号
    let premium = QuotaState {
        tier: PlanTier::Premium,
        free_used: 2,
        daily_used: 3,
        last_reset: Some(now),
    };
    let decision = engine.evaluate(&premium, now);
    println!(
        "高级账号：剩余 {} 个，{} 后重置",
        decision.remaining,
        format_remaining_time(decision.reset_at, now)
    );

    // 评估是幂等的，重复调用不改变状态
    let again = engine.evaluate(&premium, now);
    assert_eq!(decision, again);
    println!("重复评估结果一致：{:?}", again.remaining);
}
