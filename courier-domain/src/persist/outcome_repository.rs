//! 投递结果仓储协议
//!
use super::DeliveryOutcome;
use crate::error::DomainResult as Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

#[async_trait]
pub trait DeliveryOutcomeRepository: Send + Sync {
    /// 保存投递结果并返回存储 id；按 id 幂等
    async fn save_delivery_outcome(&self, outcome: &DeliveryOutcome) -> Result<Uuid>;
}

#[async_trait]
impl<T> DeliveryOutcomeRepository for Arc<T>
where
    T: DeliveryOutcomeRepository + ?Sized,
{
    async fn save_delivery_outcome(&self, outcome: &DeliveryOutcome) -> Result<Uuid> {
        (**self).save_delivery_outcome(outcome).await
    }
}

/// 内存实现：按 id 覆盖写入，并统计调用次数
#[derive(Default)]
pub struct InMemoryOutcomeRepository {
    rows: DashMap<Uuid, DeliveryOutcome>,
    saves: AtomicUsize,
}

impl InMemoryOutcomeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Uuid) -> Option<DeliveryOutcome> {
        self.rows.get(id).map(|row| row.value().clone())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 累计保存调用次数（含重复保存）
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryOutcomeRepository for InMemoryOutcomeRepository {
    async fn save_delivery_outcome(&self, outcome: &DeliveryOutcome) -> Result<Uuid> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.rows.insert(outcome.id(), outcome.clone());
        Ok(outcome.id())
    }
}
