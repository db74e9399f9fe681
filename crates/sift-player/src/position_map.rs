//! 位置表: 帧序号到字节偏移的稀疏索引.
//!
//! 读循环在 GOP 起点追加条目, 定位逻辑并发读取. 表由独立的锁保护,
//! 每次只在一次插入或读取期间持锁.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

/// 位置表条目
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionMapEntry {
    /// 帧序号 (关键帧间隔为 1 时即帧号)
    pub index: i64,
    /// 调整后的帧序号
    pub adjusted: i64,
    /// 字节偏移
    pub pos: i64,
}

impl PositionMapEntry {
    /// 帧序号与调整序号相同的条目
    pub fn new(index: i64, pos: i64) -> Self {
        Self {
            index,
            adjusted: index,
            pos,
        }
    }
}

/// 外部维护的位置表 (录制数据库或直播环形缓冲)
pub trait PositionMapSource: Send {
    /// 读取当前的位置表, 没有时返回 `None`
    fn load(&mut self) -> Option<Vec<PositionMapEntry>>;

    /// 外部位置表是否已覆盖整个文件
    fn is_complete(&self) -> bool;
}

/// 线程安全的位置表, 帧序号严格递增
#[derive(Debug, Default)]
pub struct PositionMap {
    entries: Mutex<Vec<PositionMapEntry>>,
}

impl PositionMap {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PositionMapEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 帧序号大于末尾条目时追加, 返回是否追加
    pub fn push_if_after(&self, entry: PositionMapEntry) -> bool {
        let mut entries = self.lock();
        if entries.last().is_some_and(|last| entry.index <= last.index) {
            return false;
        }
        entries.push(entry);
        true
    }

    /// 整体替换, 按帧序号排序并去掉重复序号
    pub fn replace(&self, mut entries: Vec<PositionMapEntry>) {
        entries.sort_by_key(|e| e.index);
        entries.dedup_by_key(|e| e.index);
        *self.lock() = entries;
    }

    /// 复制当前内容
    pub fn snapshot(&self) -> Vec<PositionMapEntry> {
        self.lock().clone()
    }

    /// 条目数
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 末尾条目
    pub fn last(&self) -> Option<PositionMapEntry> {
        self.lock().last().copied()
    }

    /// 清空
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// 帧序号不大于 `index` 的最后一个条目
    pub fn find_at_or_before(&self, index: i64) -> Option<PositionMapEntry> {
        let entries = self.lock();
        let n = entries.partition_point(|e| e.index <= index);
        n.checked_sub(1).map(|i| entries[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_只追加递增条目() {
        let map = PositionMap::new();
        assert!(map.push_if_after(PositionMapEntry::new(1, 0)));
        assert!(map.push_if_after(PositionMapEntry::new(16, 18800)));
        assert!(!map.push_if_after(PositionMapEntry::new(16, 20000)));
        assert!(!map.push_if_after(PositionMapEntry::new(3, 100)));
        assert_eq!(map.len(), 2);
        assert_eq!(map.last().unwrap().pos, 18800);
    }

    #[test]
    fn test_替换时排序去重() {
        let map = PositionMap::new();
        map.replace(vec![
            PositionMapEntry::new(30, 300),
            PositionMapEntry::new(0, 0),
            PositionMapEntry::new(15, 150),
            PositionMapEntry::new(15, 151),
        ]);
        let idx: Vec<i64> = map.snapshot().iter().map(|e| e.index).collect();
        assert_eq!(idx, vec![0, 15, 30]);
    }

    #[test]
    fn test_查找不晚于目标的条目() {
        let map = PositionMap::new();
        assert!(map.find_at_or_before(10).is_none());
        for i in 0..4 {
            map.push_if_after(PositionMapEntry::new(i * 15, i * 1000));
        }
        assert_eq!(map.find_at_or_before(31).unwrap().index, 30);
        assert_eq!(map.find_at_or_before(30).unwrap().index, 30);
        assert_eq!(map.find_at_or_before(14).unwrap().index, 0);
        assert_eq!(map.find_at_or_before(-1), None);
        map.clear();
        assert!(map.is_empty());
    }
}
