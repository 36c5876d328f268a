//! 目录数据模型
//!
//! 定义翻译条目的内存表示和目录文件的结构化形式：
//! - `Entry`: 单个 msgid/msgstr 条目，带出处注释和稳定代理ID
//! - `ParsedCatalog`: 一个已解析目录文件（元数据、头注释、条目列表）
//! - `po`: gettext PO 文件的读写实现

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, RwLock,
};

pub mod po;

/// 条目的稳定代理ID
///
/// 在条目创建时单调分配，生命周期内不变。所有按条目身份组织的
/// 集合（状态缓存、批次选择集）都以此为键，而不是内存地址。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

impl EntryId {
    fn next() -> Self {
        EntryId(NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// 一条翻译记录
///
/// `msgid` 是源文本，同时也是合并集合内的唯一键；`msgstr` 是译文。
/// 条目是可变记录：翻译和编辑都直接修改原对象，合并后的键重命名
/// 保留同一个 `EntryId`。
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: EntryId,
    pub msgid: String,
    pub msgstr: String,
    /// 提取注释（PO 文件中的 `#.` 行）
    pub comment: Option<String>,
    /// 出处引用（PO 文件中的 `#:` 行），(位置, 行号或空串)
    pub occurrences: Vec<(String, String)>,
    /// 标志（PO 文件中的 `#,` 行）
    pub flags: Vec<String>,
    pub obsolete: bool,
}

impl Entry {
    /// 创建新条目并分配代理ID
    pub fn new<S: Into<String>, T: Into<String>>(msgid: S, msgstr: T) -> Self {
        Self {
            id: EntryId::next(),
            msgid: msgid.into(),
            msgstr: msgstr.into(),
            comment: None,
            occurrences: Vec::new(),
            flags: Vec::new(),
            obsolete: false,
        }
    }

    /// 条目是否未翻译
    ///
    /// 译文为空白、或与源文本完全相同时视为未翻译。
    pub fn is_untranslated(&self) -> bool {
        let msgstr = self.msgstr.trim();
        msgstr.is_empty() || msgstr == self.msgid.trim()
    }

    /// 包装为共享句柄
    pub fn shared(self) -> SharedEntry {
        shared(self)
    }
}

/// 共享条目句柄
///
/// 批量翻译的工作线程并发写入不同条目，条目本身用读写锁保护；
/// 同一批次内不会有两个工作线程写同一个条目（批次来自去重后的集合）。
pub type SharedEntry = Arc<RwLock<Entry>>;

/// 包装条目为共享句柄
pub fn shared(entry: Entry) -> SharedEntry {
    Arc::new(RwLock::new(entry))
}

/// 目录级元数据
///
/// 保序的键值对（Project-Id-Version、Content-Type、Language 等），
/// 保持顺序以便导出时无损还原。
#[derive(Debug, Clone, Default)]
pub struct CatalogMetadata {
    fields: Vec<(String, String)>,
}

impl CatalogMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 设置字段值，已存在则覆盖，否则追加到末尾
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 导出时的默认元数据，没有任何源文件提供元数据时使用
    pub fn default_export(target_lang: &str) -> Self {
        let mut metadata = Self::new();
        metadata.set("Project-Id-Version", "ERP Server 17.0");
        metadata.set("Report-Msgid-Bugs-To", "");
        metadata.set("POT-Creation-Date", "");
        metadata.set("PO-Revision-Date", "");
        metadata.set("Language-Team", "");
        metadata.set("MIME-Version", "1.0");
        metadata.set("Content-Type", "text/plain; charset=UTF-8");
        metadata.set("Content-Transfer-Encoding", "");
        metadata.set("Plural-Forms", "");
        metadata.set("Language", target_lang);
        metadata
    }
}

/// 一个已解析的目录文件
#[derive(Debug, Default)]
pub struct ParsedCatalog {
    pub metadata: CatalogMetadata,
    /// 文件头注释块（首个 `msgid ""` 条目之前的 `#` 行）
    pub header: Option<String>,
    pub entries: Vec<SharedEntry>,
}

impl ParsedCatalog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_ids_are_unique_and_monotonic() {
        let a = Entry::new("One", "");
        let b = Entry::new("Two", "");
        assert!(b.id > a.id);
    }

    #[test]
    fn test_untranslated_predicate() {
        assert!(Entry::new("Hello", "").is_untranslated());
        assert!(Entry::new("Hello", "   ").is_untranslated());
        assert!(Entry::new("Hello", "Hello").is_untranslated());
        assert!(!Entry::new("Hello", "Bonjour").is_untranslated());
    }

    #[test]
    fn test_metadata_preserves_order() {
        let mut metadata = CatalogMetadata::new();
        metadata.set("Language", "fr");
        metadata.set("MIME-Version", "1.0");
        metadata.set("Language", "es");

        let fields: Vec<_> = metadata.iter().collect();
        assert_eq!(fields[0], ("Language", "es"));
        assert_eq!(fields.len(), 2);
    }
}
