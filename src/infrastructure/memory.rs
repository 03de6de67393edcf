//! 内存存储：未配置数据库时使用，也用于测试

use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// 以 id 为键的内存表
pub struct MemoryTable<T> {
    rows: RwLock<HashMap<Uuid, T>>,
}

impl<T: Clone> Default for MemoryTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> MemoryTable<T> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<T> {
        self.rows.read().await.get(&id).cloned()
    }

    /// 返回满足条件的所有行
    pub async fn filter<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.rows
            .read()
            .await
            .values()
            .filter(|row| predicate(row))
            .cloned()
            .collect()
    }

    pub async fn find<F>(&self, predicate: F) -> Option<T>
    where
        F: Fn(&T) -> bool,
    {
        self.rows.read().await.values().find(|row| predicate(row)).cloned()
    }

    /// 在写锁内检查冲突后插入，冲突时返回 false
    pub async fn insert_unique<F>(&self, id: Uuid, row: T, conflicts: F) -> bool
    where
        F: Fn(&T) -> bool,
    {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&id) || rows.values().any(|existing| conflicts(existing)) {
            return false;
        }
        rows.insert(id, row);
        true
    }

    /// 在写锁内用现有行做检查，通过后插入；检查失败时不插入
    pub async fn insert_checked<F, E>(&self, id: Uuid, row: T, check: F) -> Result<(), E>
    where
        F: FnOnce(Vec<&T>) -> Result<(), E>,
    {
        let mut rows = self.rows.write().await;
        check(rows.values().collect())?;
        rows.insert(id, row);
        Ok(())
    }

    /// 替换已存在的行；不存在或与其他行冲突时返回 false
    pub async fn replace_unique<F>(&self, id: Uuid, row: T, conflicts: F) -> bool
    where
        F: Fn(&Uuid, &T) -> bool,
    {
        let mut rows = self.rows.write().await;
        if !rows.contains_key(&id) {
            return false;
        }
        if rows
            .iter()
            .any(|(other_id, existing)| *other_id != id && conflicts(other_id, existing))
        {
            return false;
        }
        rows.insert(id, row);
        true
    }

    /// 在写锁内检查与其他行的冲突后原地修改
    ///
    /// 行不存在时返回 None，与其他行冲突时返回 `Some(false)` 且不修改。
    pub async fn modify_unique<C, F>(&self, id: Uuid, conflicts: C, f: F) -> Option<bool>
    where
        C: Fn(&T) -> bool,
        F: FnOnce(&mut T),
    {
        let mut rows = self.rows.write().await;
        if !rows.contains_key(&id) {
            return None;
        }
        if rows
            .iter()
            .any(|(other_id, existing)| *other_id != id && conflicts(existing))
        {
            return Some(false);
        }
        rows.get_mut(&id).map(|row| {
            f(row);
            true
        })
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.rows.write().await.remove(&id).is_some()
    }

    /// 在写锁内原地修改一行
    pub async fn update_with<F, R>(&self, id: Uuid, f: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        self.rows.write().await.get_mut(&id).map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Row {
        key: String,
        value: i32,
    }

    #[tokio::test]
    async fn test_insert_unique_rejects_conflicts() {
        let table = MemoryTable::new();
        let id = Uuid::new_v4();
        let row = Row { key: "a".into(), value: 1 };
        assert!(table.insert_unique(id, row.clone(), |r: &Row| r.key == "a").await);
        assert!(!table
            .insert_unique(Uuid::new_v4(), row, |r: &Row| r.key == "a")
            .await);
        assert_eq!(table.filter(|_| true).await.len(), 1);
    }

    #[tokio::test]
    async fn test_replace_ignores_self_conflict() {
        let table = MemoryTable::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        table.insert_unique(a, Row { key: "a".into(), value: 1 }, |_| false).await;
        table.insert_unique(b, Row { key: "b".into(), value: 2 }, |_| false).await;

        let same_key = Row { key: "a".into(), value: 10 };
        assert!(table.replace_unique(a, same_key, |_, r| r.key == "a").await);
        let taken_key = Row { key: "a".into(), value: 20 };
        assert!(!table.replace_unique(b, taken_key, |_, r| r.key == "a").await);
        assert_eq!(table.get(a).await.unwrap().value, 10);
    }

    #[tokio::test]
    async fn test_modify_unique_keeps_untouched_fields() {
        let table = MemoryTable::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        table.insert_unique(a, Row { key: "a".into(), value: 1 }, |_| false).await;
        table.insert_unique(b, Row { key: "b".into(), value: 2 }, |_| false).await;

        let changed = table
            .modify_unique(a, |r: &Row| r.key == "c", |r| r.key = "c".into())
            .await;
        assert_eq!(changed, Some(true));
        assert_eq!(table.get(a).await.unwrap(), Row { key: "c".into(), value: 1 });

        let clash = table
            .modify_unique(b, |r: &Row| r.key == "c", |r| r.key = "c".into())
            .await;
        assert_eq!(clash, Some(false));
        assert_eq!(table.get(b).await.unwrap().key, "b");

        assert_eq!(
            table.modify_unique(Uuid::new_v4(), |_| false, |_| {}).await,
            None
        );
    }

    #[tokio::test]
    async fn test_insert_checked_sees_existing_rows() {
        let table = MemoryTable::new();
        let check = |rows: Vec<&Row>| {
            if rows.iter().any(|r| r.key == "a") {
                Err("taken")
            } else {
                Ok(())
            }
        };
        assert_eq!(
            table
                .insert_checked(Uuid::new_v4(), Row { key: "a".into(), value: 1 }, check)
                .await,
            Ok(())
        );
        assert_eq!(
            table
                .insert_checked(Uuid::new_v4(), Row { key: "a".into(), value: 2 }, check)
                .await,
            Err("taken")
        );
        assert_eq!(table.filter(|_| true).await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_with_and_remove() {
        let table = MemoryTable::new();
        let id = Uuid::new_v4();
        table.insert_unique(id, Row { key: "a".into(), value: 1 }, |_| false).await;
        assert_eq!(table.update_with(id, |r| { r.value += 5; r.value }).await, Some(6));
        assert!(table.remove(id).await);
        assert!(!table.remove(id).await);
        assert_eq!(table.update_with(id, |r| r.value).await, None);
    }
}
