//! 条目出处索引
//!
//! 记录每个键来自哪个模块/模型/字段。模块名优先取条目注释里的
//! `module: <名称>` 标注，其次从 `.../{addons|modules}/<名称>/i18n/...`
//! 文件路径模式推断；模型和字段从形如
//! `model:<模型>,field_description:<模块>.<字段路径>` 的出处引用解析。

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::catalog::Entry;

pub const UNKNOWN_MODULE: &str = "unknown";

fn comment_module_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"module:\s*(\w+)").unwrap())
}

fn path_module_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:addons|modules)[/\\]([^/\\]+)[/\\]i18n").unwrap())
}

/// 从文件路径提取模块名
pub fn extract_module_name(filepath: &str) -> String {
    path_module_re()
        .captures(filepath)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_MODULE.to_string())
}

/// 一条出处记录
#[derive(Debug, Clone)]
pub struct ProvenanceRecord {
    pub module: String,
    pub model: Option<String>,
    pub field: Option<String>,
    pub raw_occurrence: Option<String>,
}

impl Default for ProvenanceRecord {
    fn default() -> Self {
        Self {
            module: UNKNOWN_MODULE.to_string(),
            model: None,
            field: None,
            raw_occurrence: None,
        }
    }
}

/// 出处索引
///
/// 每个键一条记录，重复索引同键时后写覆盖。合并流程在去重之前
/// 索引，因此出现在多个文件里的键最终保留最后一个文件的出处
/// （接受的近似，按键折叠不会回头修正它）。
#[derive(Default)]
pub struct ProvenanceIndex {
    records: HashMap<String, ProvenanceRecord>,
    module_to_keys: HashMap<String, Vec<String>>,
}

impl ProvenanceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 索引一个条目
    ///
    /// `entry` 提供注释和出处引用；编辑改键后重建出处时为 `None`，
    /// 此时只能从路径恢复模块名。
    pub fn index(&mut self, msgid: &str, source_path: &str, entry: Option<&Entry>) {
        let mut record = ProvenanceRecord::default();

        if let Some(entry) = entry {
            if let Some(comment) = &entry.comment {
                if let Some(captures) = comment_module_re().captures(comment) {
                    record.module = captures[1].to_string();
                }
            }
        }
        if record.module == UNKNOWN_MODULE {
            record.module = extract_module_name(source_path);
        }

        if let Some(entry) = entry {
            for (location, _) in &entry.occurrences {
                if !location.contains("model:") {
                    continue;
                }
                record.raw_occurrence = Some(location.clone());
                let parts: Vec<&str> = location.split(':').collect();
                if parts.len() >= 2 {
                    if let Some(model) = parts[1].split(',').next() {
                        record.model = Some(model.to_string());
                    }
                }
                if parts.len() >= 3 {
                    record.field = Some(parts[2].to_string());
                }
                break;
            }
        }

        debug!(
            "索引条目 '{}' → 模块 {} (模型 {:?})",
            truncate(msgid),
            record.module,
            record.model
        );

        let keys = self.module_to_keys.entry(record.module.clone()).or_default();
        if !keys.iter().any(|k| k == msgid) {
            keys.push(msgid.to_string());
        }
        self.records.insert(msgid.to_string(), record);
    }

    /// 查询出处，未索引的键返回模块为 "unknown" 的默认记录
    pub fn lookup(&self, msgid: &str) -> ProvenanceRecord {
        self.records.get(msgid).cloned().unwrap_or_default()
    }

    /// 键所属模块名
    pub fn module_of(&self, msgid: &str) -> String {
        self.records
            .get(msgid)
            .map(|r| r.module.clone())
            .unwrap_or_else(|| UNKNOWN_MODULE.to_string())
    }

    pub fn entries_for_module(&self, module: &str) -> Vec<String> {
        self.module_to_keys.get(module).cloned().unwrap_or_default()
    }

    /// 全部模块名，按字典序
    pub fn all_modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = self.module_to_keys.keys().cloned().collect();
        modules.sort();
        modules
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.module_to_keys.clear();
    }
}

fn truncate(text: &str) -> &str {
    let mut end = text.len().min(40);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
