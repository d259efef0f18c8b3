//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 配额门控器
//!
//! 核心编排：读取状态 → 评估 → 执行外部动作 → 记账 → 持久化。整个流程
//! 对同一用户是一个逻辑事务：进程内通过按用户互斥串行化，跨进程通过
//! 存储层的版本号 CAS 串行化。动作失败时不消费配额（只在成功后记账，
//! 绝不先记账再尝试）。
//!
//! 引擎层不强制"先评估后记账"的调用顺序，门控器是替调用方把关的封装，
//! 也是推荐的入口。

use crate::constants::{DEFAULT_MAX_CAS_RETRIES, MAX_USER_ID_LENGTH};
use crate::error::QuotaError;
use crate::quota_engine::{QuotaDecision, QuotaEngine, QuotaState};
use crate::storage::{QuotaStorage, VersionedQuota};
use chrono::{DateTime, Local, TimeZone, Utc};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// 门控结果
#[derive(Debug)]
pub enum GateOutcome<T> {
    /// 放行：动作已执行且配额已记账；`decision` 是记账后的评估结果，
    /// 可直接用于"剩余 N 个"展示
    Granted { output: T, decision: QuotaDecision },
    /// 拒绝：配额不足（或并发竞争中落败），配额未消费
    Refused { decision: QuotaDecision },
}

impl<T> GateOutcome<T> {
    /// 是否放行
    pub fn is_granted(&self) -> bool {
        matches!(self, GateOutcome::Granted { .. })
    }

    /// 取出评估结果
    pub fn decision(&self) -> &QuotaDecision {
        match self {
            GateOutcome::Granted { decision, .. } => decision,
            GateOutcome::Refused { decision } => decision,
        }
    }
}

/// 门控统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// 放行次数
    pub granted: u64,
    /// 拒绝次数
    pub refused: u64,
    /// CAS 版本冲突次数
    pub conflicts: u64,
}

#[derive(Debug, Default)]
struct GatekeeperStats {
    granted: AtomicU64,
    refused: AtomicU64,
    conflicts: AtomicU64,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// 配额门控器
pub struct Gatekeeper<S: QuotaStorage, Tz: TimeZone> {
    /// 存储后端
    storage: Arc<S>,
    /// 配额引擎
    engine: QuotaEngine<Tz>,
    /// 时钟源，可注入以便测试
    clock: Clock,
    /// 按用户互斥表（进程内单写者队列）
    user_locks: DashMap<String, Arc<Mutex<()>>, ahash::RandomState>,
    /// 统计计数
    stats: GatekeeperStats,
}

impl<S: QuotaStorage> Gatekeeper<S, Local> {
    /// 使用服务器本地时区创建门控器
    pub fn new(storage: Arc<S>) -> Self {
        Self::with_engine(storage, QuotaEngine::server_local())
    }
}

impl<S: QuotaStorage, Tz: TimeZone + Send + Sync> Gatekeeper<S, Tz> {
    /// 使用指定引擎创建门控器
    pub fn with_engine(storage: Arc<S>, engine: QuotaEngine<Tz>) -> Self {
        Self {
            storage,
            engine,
            clock: Arc::new(Utc::now),
            user_locks: DashMap::default(),
            stats: GatekeeperStats::default(),
        }
    }

    /// 替换时钟源
    pub fn with_clock(
        mut self,
        clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// 引擎引用
    pub fn engine(&self) -> &QuotaEngine<Tz> {
        &self.engine
    }

    /// 统计快照
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            granted: self.stats.granted.load(Ordering::Relaxed),
            refused: self.stats.refused.load(Ordering::Relaxed),
            conflicts: self.stats.conflicts.load(Ordering::Relaxed),
        }
    }

    /// 清理无人持有的用户锁
    pub fn cleanup_idle_locks(&self) {
        self.user_locks
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn validate_user_id(user_id: &str) -> Result<(), QuotaError> {
        if user_id.is_empty() {
            return Err(QuotaError::ValidationError("用户ID为空".to_string()));
        }
        if user_id.len() > MAX_USER_ID_LENGTH {
            return Err(QuotaError::ValidationError(format!(
                "用户ID超长: {}",
                user_id.len()
            )));
        }
        Ok(())
    }

    async fn load_or_create(&self, user_id: &str) -> Result<VersionedQuota, QuotaError> {
        if let Some(record) = self.storage.load(user_id).await? {
            return Ok(record);
        }

        let fresh = QuotaState::new_account();
        // 并发创建时以先写入者为准，创建后重读拿到带版本号的记录
        self.storage.create(user_id, &fresh).await?;
        self.storage.load(user_id).await?.ok_or_else(|| {
            QuotaError::StorageError(crate::error::StorageError::NotFound(user_id.to_string()))
        })
    }

    /// 注册账号：创建初始配额记录
    ///
    /// 返回是否新建；记录已存在时返回 false 且不覆盖。
    #[instrument(skip(self))]
    pub async fn register(&self, user_id: &str) -> Result<bool, QuotaError> {
        Self::validate_user_id(user_id)?;
        let created = self
            .storage
            .create(user_id, &QuotaState::new_account())
            .await?;
        if created {
            info!(user_id, "账号配额记录已创建");
        }
        Ok(created)
    }

    /// 查询配额：展示路径
    ///
    /// 幂等且不消费配额。记录不存在时按初始状态评估，不落库。
    #[instrument(skip(self))]
    pub async fn check(&self, user_id: &str) -> Result<QuotaDecision, QuotaError> {
        Self::validate_user_id(user_id)?;
        let now = self.now();
        let state = self
            .storage
            .load(user_id)
            .await?
            .map(|record| record.state)
            .unwrap_or_default();
        Ok(self.engine.evaluate(&state, now))
    }

    /// 提交受配额门控的动作
    ///
    /// 配额不足时直接拒绝，`action` 不会被调用。放行时先执行 `action`，
    /// 成功后才记账并以 CAS 持久化；动作失败则原样返回错误，配额不消费。
    /// CAS 冲突时重新读取并重新评估——并发写入者可能已占用最后一个名额，
    /// 此时计数上限优先于已执行的动作，本次提交按拒绝处理。
    #[instrument(skip(self, action))]
    pub async fn submit<T, F, Fut>(
        &self,
        user_id: &str,
        action: F,
    ) -> Result<GateOutcome<T>, QuotaError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        Self::validate_user_id(user_id)?;

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let record = self.load_or_create(user_id).await?;
        let decision = self.engine.evaluate(&record.state, self.now());
        if !decision.can_act {
            self.stats.refused.fetch_add(1, Ordering::Relaxed);
            debug!(user_id, tier = record.state.tier.as_str(), "配额不足，拒绝请求");
            return Ok(GateOutcome::Refused { decision });
        }

        let output = match action().await {
            Ok(value) => value,
            Err(err) => {
                debug!(user_id, "外部动作失败，配额未消费");
                return Err(QuotaError::ActionFailed(err));
            }
        };

        let mut current = record;
        for attempt in 0..DEFAULT_MAX_CAS_RETRIES {
            let now = self.now();
            let decision = self.engine.evaluate(&current.state, now);
            if !decision.can_act {
                self.stats.refused.fetch_add(1, Ordering::Relaxed);
                warn!(user_id, "并发竞争中落败，请求被拒绝");
                return Ok(GateOutcome::Refused { decision });
            }

            let next = self.engine.apply_usage(&current.state, now);
            if self
                .storage
                .compare_and_swap(user_id, current.version, &next)
                .await?
            {
                self.stats.granted.fetch_add(1, Ordering::Relaxed);
                let decision = self.engine.evaluate(&next, now);
                debug!(user_id, remaining = decision.remaining, "配额已记账");
                return Ok(GateOutcome::Granted { output, decision });
            }

            self.stats.conflicts.fetch_add(1, Ordering::Relaxed);
            debug!(user_id, attempt, "版本冲突，重新读取");
            current = self.load_or_create(user_id).await?;
        }

        Err(QuotaError::Contention(user_id.to_string()))
    }

    /// 开通高级套餐（外部支付/管理事件的入口）
    ///
    /// 立即重置当日计数，新开通的用户当日即可使用完整额度。
    #[instrument(skip(self))]
    pub async fn activate_premium(&self, user_id: &str) -> Result<(), QuotaError> {
        self.mutate(user_id, |state, now| state.upgrade_to_premium(now))
            .await?;
        info!(user_id, "高级套餐已开通");
        Ok(())
    }

    /// 撤销高级套餐
    ///
    /// 回到免费套餐的终身上限计数；历史计数保留。
    #[instrument(skip(self))]
    pub async fn revoke_premium(&self, user_id: &str) -> Result<(), QuotaError> {
        self.mutate(user_id, |state, _now| state.revoke_premium())
            .await?;
        info!(user_id, "高级套餐已撤销");
        Ok(())
    }

    /// 在用户锁内以 CAS 循环应用一次状态变换
    async fn mutate<F>(&self, user_id: &str, transform: F) -> Result<QuotaState, QuotaError>
    where
        F: Fn(&QuotaState, DateTime<Utc>) -> QuotaState,
    {
        Self::validate_user_id(user_id)?;

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        for _attempt in 0..DEFAULT_MAX_CAS_RETRIES {
            let record = self.load_or_create(user_id).await?;
            let next = transform(&record.state, self.now());
            if self
                .storage
                .compare_and_swap(user_id, record.version, &next)
                .await?
            {
                return Ok(next);
            }
            self.stats.conflicts.fetch_add(1, Ordering::Relaxed);
        }

        Err(QuotaError::Contention(user_id.to_string()))
    }
}

// ============================================================================
// 单元测试
// ============================================================================
