//! 翻译子系统
//!
//! - [`backend`]: 大模型后端边界和 Gemini 实现
//! - [`cache`]: 持久化翻译缓存
//! - [`engine`]: 限速、校验、自动翻译策略的引擎核心

pub mod backend;
pub mod cache;
pub mod engine;

pub use backend::TranslationBackend;
#[cfg(feature = "gemini")]
pub use backend::GeminiBackend;
pub use cache::{CacheStats, TranslationCache};
pub use engine::{extract_placeholders, BatchSummary, EntryOutcome, Translator, TranslatorStats};
