//! 目录合并
//!
//! 把多个可能互相重叠的 PO 文件合并为一个一致的条目集合：
//! 逐文件加载并建立出处索引，批内清洗去重，再按键做跨文件的
//! 内容感知折叠。合并结果是本对象的规范状态，供语言分析、
//! 翻译编排和导出使用。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::{po, CatalogMetadata, ParsedCatalog, SharedEntry};
use crate::error::TranslationResult;

pub mod dedup;
pub mod provenance;

pub use dedup::Deduplicator;
pub use provenance::{ProvenanceIndex, ProvenanceRecord, UNKNOWN_MODULE};

/// 一次合并的汇总结果
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    /// 清洗前载入的条目总数
    pub total_loaded: usize,
    /// 合并后的唯一键数量
    pub unique_entries: usize,
    /// 跨文件按键折叠掉的重复条目数
    pub duplicates_merged: usize,
    /// 加载失败被跳过的文件数
    pub failed_files: usize,
}

/// 目录合并器
pub struct Merger {
    provenance: ProvenanceIndex,
    entries: HashMap<String, SharedEntry>,
    /// 合并顺序，语言分析的上下文窗口按它取邻近条目
    order: Vec<SharedEntry>,
    original_metadata: Option<CatalogMetadata>,
    original_header: Option<String>,
    failed_files: usize,
}

impl Default for Merger {
    fn default() -> Self {
        Self::new()
    }
}

impl Merger {
    pub fn new() -> Self {
        Self {
            provenance: ProvenanceIndex::new(),
            entries: HashMap::new(),
            order: Vec::new(),
            original_metadata: None,
            original_header: None,
            failed_files: 0,
        }
    }

    /// 加载单个目录文件
    ///
    /// 首个成功加载的文件贡献元数据和头注释，后续文件不覆盖。
    pub fn load_source<P: AsRef<Path>>(&mut self, path: P) -> TranslationResult<ParsedCatalog> {
        let catalog = po::parse_file(path.as_ref())?;

        if self.original_metadata.is_none() && !catalog.metadata.is_empty() {
            info!("保留元数据: {} 个字段", catalog.metadata.len());
            self.original_metadata = Some(catalog.metadata.clone());
        }
        if self.original_header.is_none() && catalog.header.is_some() {
            self.original_header = catalog.header.clone();
        }
        Ok(catalog)
    }

    /// 合并多个目录文件
    ///
    /// 单个文件失败只记日志并跳过，失败数汇总在返回的报告里。
    /// 每次调用替换之前的合并状态。
    pub fn merge_sources<P: AsRef<Path>>(&mut self, paths: &[P]) -> MergeReport {
        info!("开始合并 {} 个文件", paths.len());
        self.entries.clear();
        self.order.clear();
        self.provenance.clear();
        self.failed_files = 0;

        let mut all_entries: Vec<SharedEntry> = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let catalog = match self.load_source(path) {
                Ok(catalog) => catalog,
                Err(e) => {
                    warn!("加载 {} 失败，跳过: {}", path.display(), e);
                    self.failed_files += 1;
                    continue;
                }
            };

            let path_str = path.to_string_lossy();
            let mut added = 0usize;
            for shared in catalog.entries {
                {
                    let entry = shared.read().unwrap_or_else(|e| e.into_inner());
                    if entry.obsolete {
                        continue;
                    }
                    // 去重前索引：重复键的出处由最后处理的文件决定
                    self.provenance.index(&entry.msgid, &path_str, Some(&entry));
                }
                all_entries.push(shared);
                added += 1;
            }
            info!("从 {} 载入 {} 个条目", path.display(), added);
        }

        let total_loaded = all_entries.len();
        let cleaned = Deduplicator::new().clean(all_entries);

        let mut duplicates = 0usize;
        for shared in cleaned {
            let msgid = shared
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .msgid
                .clone();
            match self.entries.get(&msgid) {
                Some(existing) => {
                    // 首见条目保留身份，后来的重复被并入后丢弃
                    Deduplicator::merge_two(existing, &shared);
                    duplicates += 1;
                }
                None => {
                    self.entries.insert(msgid, shared.clone());
                    self.order.push(shared);
                }
            }
        }

        let report = MergeReport {
            total_loaded,
            unique_entries: self.entries.len(),
            duplicates_merged: duplicates,
            failed_files: self.failed_files,
        };
        info!(
            "合并完成: {} 个唯一条目（折叠 {} 个重复，{} 个文件失败）",
            report.unique_entries, report.duplicates_merged, report.failed_files
        );
        report
    }

    /// 合并顺序的条目列表
    pub fn entries_list(&self) -> Vec<SharedEntry> {
        self.order.clone()
    }

    /// 按键取条目
    pub fn entry(&self, msgid: &str) -> Option<SharedEntry> {
        self.entries.get(msgid).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn provenance(&self) -> &ProvenanceIndex {
        &self.provenance
    }

    /// 更新条目
    ///
    /// 改键是保持身份的重挂：同一个条目对象换到新键下，并以
    /// 模块名重建一条近似的出处记录（编辑后完整上下文已不可得）。
    /// 新键已被占用时并入占用者（占用者保留身份），维持键的
    /// 唯一性。调用方负责让按旧文本键入的缓存失效。
    pub fn update_entry(
        &mut self,
        msgid: &str,
        new_msgid: Option<&str>,
        new_msgstr: Option<&str>,
    ) -> bool {
        let shared = match self.entries.get(msgid) {
            Some(shared) => shared.clone(),
            None => return false,
        };

        if let Some(new_msgstr) = new_msgstr {
            shared.write().unwrap_or_else(|e| e.into_inner()).msgstr = new_msgstr.to_string();
        }

        if let Some(new_msgid) = new_msgid {
            if new_msgid != msgid {
                let old_module = self.provenance.module_of(msgid);
                match self.entries.get(new_msgid).cloned() {
                    Some(existing) => {
                        warn!("改键目标 {:?} 已存在, 并入现有条目", new_msgid);
                        Deduplicator::merge_two(&existing, &shared);
                        self.entries.remove(msgid);
                        self.order.retain(|e| !Arc::ptr_eq(e, &shared));
                    }
                    None => {
                        shared.write().unwrap_or_else(|e| e.into_inner()).msgid =
                            new_msgid.to_string();
                        self.entries.remove(msgid);
                        self.entries.insert(new_msgid.to_string(), shared);
                    }
                }
                self.provenance.index(
                    new_msgid,
                    &format!("addons/{}/i18n/merged.po", old_module),
                    None,
                );
            }
        }

        true
    }

    /// 导出合并结果
    ///
    /// 写出全部非过时条目，按键字典序（忽略大小写）排列，元数据
    /// 依次取覆盖值、首文件捕获值、默认值。导出失败向调用方报告。
    pub fn export_to<P: AsRef<Path>>(
        &self,
        path: P,
        metadata_override: Option<CatalogMetadata>,
    ) -> TranslationResult<()> {
        let metadata = metadata_override
            .or_else(|| self.original_metadata.clone())
            .unwrap_or_else(|| CatalogMetadata::default_export("fr"));

        let entries = Deduplicator::sort_by_key(Deduplicator::remove_obsolete(self.entries_list()));
        info!(
            "导出 {} 个条目到 {}（元数据 {} 个字段）",
            entries.len(),
            path.as_ref().display(),
            metadata.len()
        );
        po::write_file(path, &metadata, self.original_header.as_deref(), &entries)
    }

    /// 编译 PO 为 MO
    ///
    /// 纯透传，目标路径缺省时替换扩展名。
    pub fn compile_binary<P: AsRef<Path>>(
        &self,
        po_path: P,
        mo_path: Option<&Path>,
    ) -> TranslationResult<()> {
        let po_path = po_path.as_ref();
        let default_path = po_path.with_extension("mo");
        let mo_path = mo_path.unwrap_or(&default_path);
        po::compile_mo(po_path, mo_path)
    }
}
