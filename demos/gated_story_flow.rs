//! 受配额门控的故事生成流程演示
//!
//! 运行: cargo run --example gated_story_flow

use std::sync::Arc;
use storygate::prelude::*;

/// 模拟外部生成管线
async fn generate_story(theme: &str) -> Result<String, anyhow::Error> {
    // 真实系统里这里是对生成服务的调用
    Ok(format!("https://stories.example/{}", theme))
}

#[tokio::main]
async fn main() -> Result<(), QuotaError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("storygate=debug")),
        )
        .init();

    let gate = Gatekeeper::new(Arc::new(MemoryQuotaStore::new()));
    let user = "teacher_demo";

    gate.register(user).await?;

    // 免费账号有 2 个终身名额
    for theme in ["el-bosque", "la-luna", "el-mar"] {
        match gate.submit(user, || generate_story(theme)).await? {
            GateOutcome::Granted { output, decision } => {
                println!("已生成 {} （剩余 {} 个）", output, decision.remaining);
            }
            GateOutcome::Refused { decision } => {
                println!(
                    "额度已用完，{} 后重置（免费账号不重置，请升级）",
                    format_remaining_time(decision.reset_at, chrono::Utc::now())
                );
            }
        }
    }

    // 支付事件到达：开通高级套餐，当日立即有 3 个名额
    gate.activate_premium(user).await?;
    let decision = gate.check(user).await?;
    println!(
        "高级套餐已开通：今天还可生成 {} 个故事",
        decision.remaining
    );

    let outcome = gate.submit(user, || generate_story("el-mar")).await?;
    if let GateOutcome::Granted { output, .. } = outcome {
        println!("已生成 {}", output);
    }

    let stats = gate.stats();
    println!(
        "统计：放行 {} 次，拒绝 {} 次",
        stats.granted, stats.refused
    );

    Ok(())
}
