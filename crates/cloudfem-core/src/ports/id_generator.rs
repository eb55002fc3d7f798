//! IdGenerator port - ID 生成の抽象化
//!
//! 本物のサービスは自前で ID を払い出すので、これは開発用サービス
//! （`impls::InMemoryCompute`）が使う。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース。Clock を差し替えると timestamp 部分が決定的になる

use rand::random;
use ulid::Ulid;

use crate::domain::ids::{BucketId, RemoteTaskId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> RemoteTaskId;

    fn generate_bucket_id(&self) -> BucketId;
}

/// UlidGenerator は ULID ベースの ID 生成器（小文字表記）
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next(&self) -> String {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, random()).to_string().to_lowercase()
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> RemoteTaskId {
        RemoteTaskId::new(self.next())
    }

    fn generate_bucket_id(&self) -> BucketId {
        BucketId::new(self.next())
    }
}
