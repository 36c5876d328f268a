//! # PO Translator Library
//!
//! 合并 gettext 目录并用大模型批量翻译的工具库，面向 ERP 系统
//! 导出的多模块 .po 文件。
//!
//! ## 模块组织
//!
//! - `catalog` - PO/MO 目录的读写和条目模型
//! - `merge` - 多文件合并、去重和模块溯源
//! - `language` - 语言检测、条目状态分析
//! - `translator` - 翻译引擎、缓存和大模型后端
//! - `orchestrator` - 批量翻译的并发调度
//! - `config` - TOML 运行配置
//! - `error` - 统一错误类型

pub mod catalog;
pub mod config;
pub mod error;
pub mod language;
pub mod merge;
pub mod orchestrator;
pub mod translator;

// Re-export commonly used items for convenience
pub use catalog::{Entry, EntryId, ParsedCatalog, SharedEntry};
pub use config::AppConfig;
pub use error::{TranslationError, TranslationResult};
pub use language::{Classifier, LanguageStatus, StatusAnalyzer, StopwordModel};
pub use merge::{MergeReport, Merger};
pub use orchestrator::{BatchReport, MismatchPolicy, MismatchResolver, Orchestrator};
pub use translator::{TranslationCache, Translator, TranslatorStats};
