//! 条目清洗与去重
//!
//! 两级去重的第一级：同一批次内按清洗后的 msgid 精确去重，
//! 首次出现的条目保留。跨文件的内容感知合并由 `Merger` 的
//! 按键折叠完成。

use std::collections::HashSet;

use crate::catalog::SharedEntry;

/// 条目清洗器
#[derive(Default)]
pub struct Deduplicator {
    seen_msgids: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清洗并去重一批条目
    ///
    /// 丢弃空键条目，修剪键和译文两端空白，并去掉本次调用内
    /// 重复出现的键（保留首个）。条目被原地修改。
    pub fn clean(&mut self, entries: Vec<SharedEntry>) -> Vec<SharedEntry> {
        self.seen_msgids.clear();
        let mut cleaned = Vec::with_capacity(entries.len());

        for shared in entries {
            {
                let mut entry = shared.write().unwrap_or_else(|e| e.into_inner());
                let msgid = entry.msgid.trim().to_string();
                if msgid.is_empty() {
                    continue;
                }
                if self.seen_msgids.contains(&msgid) {
                    continue;
                }
                self.seen_msgids.insert(msgid.clone());
                entry.msgid = msgid;
                entry.msgstr = entry.msgstr.trim().to_string();
            }
            cleaned.push(shared);
        }

        cleaned
    }

    /// 合并两个同键条目
    ///
    /// 用 `b` 补齐 `a` 缺失的译文和注释，拼接出处列表。总是修改并
    /// 保留 `a` 的身份；调用方此后必须丢弃 `b`。
    pub fn merge_two(a: &SharedEntry, b: &SharedEntry) {
        let mut a = a.write().unwrap_or_else(|e| e.into_inner());
        let b = b.read().unwrap_or_else(|e| e.into_inner());

        if a.msgstr.is_empty() && !b.msgstr.is_empty() {
            a.msgstr = b.msgstr.clone();
        }
        if a.comment.is_none() && b.comment.is_some() {
            a.comment = b.comment.clone();
        }
        if !b.occurrences.is_empty() {
            a.occurrences.extend(b.occurrences.iter().cloned());
        }
    }

    /// 过滤掉过时条目
    pub fn remove_obsolete(entries: Vec<SharedEntry>) -> Vec<SharedEntry> {
        entries
            .into_iter()
            .filter(|e| !e.read().unwrap_or_else(|p| p.into_inner()).obsolete)
            .collect()
    }

    /// 按键排序（忽略大小写）
    pub fn sort_by_key(mut entries: Vec<SharedEntry>) -> Vec<SharedEntry> {
        entries.sort_by_key(|e| {
            e.read()
                .unwrap_or_else(|p| p.into_inner())
                .msgid
                .to_lowercase()
        });
        entries
    }
}
