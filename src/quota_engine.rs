//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 配额引擎模块
//!
//! 纯决策函数族：基于用户的持久化配额状态和注入的时钟时刻，计算放行/拒绝
//! 决策。免费套餐按终身上限计数，高级套餐按自然日（服务器本地时区的午夜
//! 边界）计数，跨日重置在评估时惰性发生，不依赖后台任务。
//!
//! 引擎本身无副作用：[`QuotaEngine::evaluate`] 可重复调用用于展示，
//! [`QuotaEngine::apply_usage`] 只计算新状态，持久化由调用方负责。

use crate::constants::{FREE_TIER_LIFETIME_CAP, MINUTES_PER_HOUR, PREMIUM_DAILY_CAP};
use chrono::{DateTime, Days, Duration, Local, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 套餐层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// 免费套餐：终身上限，不重置
    Free,
    /// 高级套餐：按自然日计数，本地午夜重置
    Premium,
}

impl PlanTier {
    /// 从字符串解析套餐层级
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "free" => Some(PlanTier::Free),
            "premium" => Some(PlanTier::Premium),
            _ => None,
        }
    }

    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Premium => "premium",
        }
    }

    /// 是否为高级套餐
    pub fn is_premium(&self) -> bool {
        matches!(self, PlanTier::Premium)
    }
}

/// 用户配额状态
///
/// 持久层拥有的用户记录子集。引擎只读取和派生，从不就地修改，
/// 所有变更都以返回新值的方式表达。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    /// 套餐层级，由支付/管理事件在引擎外部设置
    pub tier: PlanTier,
    /// 免费套餐下的终身消费次数；升级后冻结为历史值
    pub free_used: u32,
    /// 自 `last_reset` 以来的当日消费次数；仅高级套餐有意义
    pub daily_used: u32,
    /// `daily_used` 上次清零的时刻；`None` 表示从未重置（视为无限陈旧）。
    /// 反序列化是宽松的：无法解析的持久化时间戳解码为 `None`。
    #[serde(default, with = "lenient_ts")]
    pub last_reset: Option<DateTime<Utc>>,
}

impl QuotaState {
    /// 账号创建时的初始状态
    pub fn new_account() -> Self {
        Self {
            tier: PlanTier::Free,
            free_used: 0,
            daily_used: 0,
            last_reset: None,
        }
    }

    /// 升级为高级套餐
    ///
    /// 立即重新初始化当日计数，保证新开通的用户当日即可使用完整额度。
    /// `free_used` 保留为历史值。
    pub fn upgrade_to_premium(&self, now: DateTime<Utc>) -> Self {
        Self {
            tier: PlanTier::Premium,
            free_used: self.free_used,
            daily_used: 0,
            last_reset: Some(now),
        }
    }

    /// 撤销高级套餐
    ///
    /// 回到免费套餐的终身上限计数；历史计数保留不动。
    pub fn revoke_premium(&self) -> Self {
        Self {
            tier: PlanTier::Free,
            ..self.clone()
        }
    }
}

impl Default for QuotaState {
    fn default() -> Self {
        Self::new_account()
    }
}

/// 配额评估结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaDecision {
    /// 是否允许执行消费配额的动作
    pub can_act: bool,
    /// 剩余额度
    pub remaining: u32,
    /// 下一个本地午夜（对免费套餐仅供展示，上限不随之重置）
    pub reset_at: DateTime<Utc>,
    /// 本次评估是否跨入了新的自然日
    pub new_day: bool,
}

/// 配额引擎
///
/// 对 `(state, now)` 的纯函数族。时区在构造时固定，"自然日"始终指
/// 该时区下的日历日；所有对外时刻统一使用 UTC 表达。
#[derive(Debug, Clone)]
pub struct QuotaEngine<Tz: TimeZone> {
    tz: Tz,
}

impl QuotaEngine<Local> {
    /// 使用服务器本地时区创建引擎
    pub fn server_local() -> Self {
        Self { tz: Local }
    }
}

impl Default for QuotaEngine<Local> {
    fn default() -> Self {
        Self::server_local()
    }
}

impl<Tz: TimeZone> QuotaEngine<Tz> {
    /// 使用指定时区创建引擎
    ///
    /// # 示例
    /// ```rust
    /// use storygate::quota_engine::{QuotaEngine, QuotaState};
    /// use chrono::Utc;
    ///
    /// let engine = QuotaEngine::new(Utc);
    /// let decision = engine.evaluate(&QuotaState::new_account(), Utc::now());
    /// assert!(decision.can_act);
    /// assert_eq!(decision.remaining, 2);
    /// ```
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    fn local_date(&self, instant: DateTime<Utc>) -> chrono::NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// 判断是否已跨入新的自然日
    ///
    /// `last_reset` 缺失时恒为 true。仅比较日历日期，丢弃时刻：
    /// 23:59 与次日 00:01 虽然相隔不足 24 小时，仍判定为新的一天。
    /// 相同日期（包括同日更早时刻）返回 false。对任何输入都不会 panic。
    pub fn is_new_day(&self, last_reset: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_reset {
            None => true,
            Some(last) => self.local_date(now) > self.local_date(last),
        }
    }

    /// 计算 `now` 之后最近的本地午夜（次日 00:00:00.000）
    ///
    /// 纯函数，无副作用。夏令时跳过或重复当地午夜时取最早的有效时刻，
    /// 不会 panic。
    pub fn next_reset_instant(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let next_day = match self.local_date(now).checked_add_days(Days::new(1)) {
            Some(d) => d,
            // 日期溢出（公元 262143 年）：退化为当前时刻
            None => return now,
        };
        let midnight = next_day.and_time(NaiveTime::MIN);
        let local = self
            .tz
            .from_local_datetime(&midnight)
            .earliest()
            // 当地午夜被夏令时跳过时，顺延到下一个有效整点
            .or_else(|| {
                self.tz
                    .from_local_datetime(&(midnight + Duration::hours(1)))
                    .earliest()
            })
            .unwrap_or_else(|| self.tz.from_utc_datetime(&midnight));
        local.with_timezone(&Utc)
    }

    /// 评估配额状态
    ///
    /// 无副作用且幂等，可安全地重复调用用于展示（"剩余 N 个"），
    /// 不消费配额。
    ///
    /// - 免费套餐：`remaining = max(0, 2 - free_used)`；跨日与否不影响
    ///   免费额度，`new_day` 仅作报告。
    /// - 高级套餐：跨日时有效计数按 0 处理，否则取 `daily_used`；
    ///   `remaining = max(0, 3 - 有效计数)`。
    pub fn evaluate(&self, state: &QuotaState, now: DateTime<Utc>) -> QuotaDecision {
        let new_day = self.is_new_day(state.last_reset, now);
        let reset_at = self.next_reset_instant(now);

        let remaining = match state.tier {
            PlanTier::Free => FREE_TIER_LIFETIME_CAP.saturating_sub(state.free_used),
            PlanTier::Premium => {
                let effective = if new_day { 0 } else { state.daily_used };
                PREMIUM_DAILY_CAP.saturating_sub(effective)
            }
        };

        QuotaDecision {
            can_act: remaining > 0,
            remaining,
            reset_at,
            new_day,
        }
    }

    /// 记账：计算消费一次配额后的新状态
    ///
    /// 只应在 [`evaluate`](Self::evaluate) 返回 `can_act = true` 后、提交
    /// 成功动作前调用；未经检查就调用属于调用方错误，引擎不做检测。
    /// 评估是幂等安全的，记账不是，必须由调用方把关。
    ///
    /// - 免费套餐：仅 `free_used + 1`，当日计数与重置时刻不动。
    /// - 高级套餐：跨日时 `daily_used = 1` 且 `last_reset = now`（无论
    ///   之前存储的计数是多少）；同日则 `daily_used + 1`。
    pub fn apply_usage(&self, state: &QuotaState, now: DateTime<Utc>) -> QuotaState {
        let mut next = state.clone();
        match state.tier {
            PlanTier::Free => {
                next.free_used = state.free_used.saturating_add(1);
            }
            PlanTier::Premium => {
                if self.is_new_day(state.last_reset, now) {
                    next.daily_used = 1;
                    next.last_reset = Some(now);
                } else {
                    next.daily_used = state.daily_used.saturating_add(1);
                }
            }
        }
        next
    }
}

/// 格式化距重置时刻的剩余时间
///
/// 纯展示辅助：`reset_at <= now` 时返回 "available now"；剩余不足一小时
/// 时返回 `"{M}m"`，否则返回 `"{H}h {M}m"`。
pub fn format_remaining_time(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = reset_at.signed_duration_since(now);
    if diff <= Duration::zero() {
        return "available now".to_string();
    }

    let hours = diff.num_hours();
    let minutes = diff.num_minutes() % MINUTES_PER_HOUR;
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// 宽松的时间戳编解码
///
/// 序列化为 RFC 3339 字符串；反序列化时无法解析的值一律解码为 `None`
/// （视为从未重置）。损坏的时间戳更可能是数据问题而非恶意，宽松处理
/// 的代价只是一次多余的重置，而拒绝访问对用户的伤害更大。
pub(crate) mod lenient_ts {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_some(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
        Ok(raw.and_then(|value| {
            value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
        }))
    }
}

// ============================================================================
// 单元测试
// ============================================================================
