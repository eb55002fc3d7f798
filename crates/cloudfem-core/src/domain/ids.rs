//! Remote identifiers (strongly-typed IDs).
//!
//! リモートサービスが払い出す ID は文字列（uuid など）なので、
//! `Id<T>` は String を包み、`T` は PhantomData のマーカー型として
//! コンパイル時の型安全性だけを提供します。
//!
//! - `RemoteTaskId`: リモートタスクの ID（submit 時に確定）
//! - `BucketId`: 入出力バケットの ID

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// ログやエラーメッセージで使う種別名（例: "task", "bucket"）
    fn kind() -> &'static str;
}

/// ジェネリック ID 型
///
/// ```ignore
/// let task: RemoteTaskId = Id::new("5e3f...");
/// let bucket: BucketId = Id::new("input-resource-run1");
/// // task と bucket は異なる型なので、混同できない
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> &'static str {
        T::kind()
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Remote task のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn kind() -> &'static str {
        "task"
    }
}

/// Bucket のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {}

impl IdMarker for Bucket {
    fn kind() -> &'static str {
        "bucket"
    }
}

/// Identifier assigned by the compute service when a task is submitted.
pub type RemoteTaskId = Id<Task>;

/// Identifier of a storage bucket (input resources or output results).
pub type BucketId = Id<Bucket>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_keep_their_kind() {
        let task = RemoteTaskId::new("abc");
        let bucket = BucketId::new("abc");

        assert_eq!(task.kind(), "task");
        assert_eq!(bucket.kind(), "bucket");
        assert_eq!(task.as_str(), bucket.as_str());
        // let _: BucketId = task; // <- does not compile
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = RemoteTaskId::new("5e3f0b6c");
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, "\"5e3f0b6c\"");

        let back: RemoteTaskId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ids_are_ordered_by_value() {
        let a = RemoteTaskId::from("a");
        let b = RemoteTaskId::from("b".to_string());
        assert!(a < b);
    }
}
