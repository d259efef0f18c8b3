//! 存储抽象层
//!
//! 定义配额状态的持久化接口和内存实现。每条记录携带单调递增的版本号，
//! 写入一律走比较并交换，保证同一用户的更新被串行化（丢失更新会让用户
//! 突破上限）。

use crate::error::StorageError;
use crate::quota_engine::QuotaState;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// 带版本号的配额记录
///
/// `version` 从 1 开始，每次成功写入递增，是 CAS 的令牌。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedQuota {
    /// 配额状态
    pub state: QuotaState,
    /// 记录版本号
    pub version: u64,
}

/// 配额存储接口
#[async_trait]
pub trait QuotaStorage: Send + Sync {
    /// 读取用户配额记录
    async fn load(&self, user_id: &str) -> Result<Option<VersionedQuota>, StorageError>;

    /// 创建用户配额记录；记录已存在时返回 false 且不覆盖
    async fn create(&self, user_id: &str, state: &QuotaState) -> Result<bool, StorageError>;

    /// 比较并交换
    ///
    /// 仅当记录存在且版本号等于 `expected_version` 时写入新状态并递增
    /// 版本号；否则返回 false，由调用方重新读取后重试。
    async fn compare_and_swap(
        &self,
        user_id: &str,
        expected_version: u64,
        state: &QuotaState,
    ) -> Result<bool, StorageError>;
}

/// 内存存储实现
pub struct MemoryQuotaStore {
    records: DashMap<String, VersionedQuota, ahash::RandomState>,
}

impl MemoryQuotaStore {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self {
            records: DashMap::default(),
        }
    }

    /// 当前记录条数
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryQuotaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuotaStorage for MemoryQuotaStore {
    async fn load(&self, user_id: &str) -> Result<Option<VersionedQuota>, StorageError> {
        Ok(self.records.get(user_id).map(|entry| entry.clone()))
    }

    async fn create(&self, user_id: &str, state: &QuotaState) -> Result<bool, StorageError> {
        // DashMap 的 entry 锁住单个 key，存在性判定和插入是原子的
        match self.records.entry(user_id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(VersionedQuota {
                    state: state.clone(),
                    version: 1,
                });
                Ok(true)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        user_id: &str,
        expected_version: u64,
        state: &QuotaState,
    ) -> Result<bool, StorageError> {
        match self.records.entry(user_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().version != expected_version {
                    return Ok(false);
                }
                occupied.insert(VersionedQuota {
                    state: state.clone(),
                    version: expected_version + 1,
                });
                Ok(true)
            }
            // 记录不存在时没有可交换的对象
            Entry::Vacant(_) => Ok(false),
        }
    }
}
