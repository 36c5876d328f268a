//! 条目语言状态分析
//!
//! 对每个条目回答三个问题：源文本是什么语言？译文是什么语言？
//! 它们是否和期望的语言对一致？结果按 (条目身份 + 文本 + 期望
//! 语言对) 缓存，文本或期望变化时自动失效。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::catalog::{EntryId, SharedEntry};
use crate::language::detect::Classifier;

/// 单个条目的语言状态
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageStatus {
    /// 源文本检测结果，无法判定时为 None
    pub source_language: Option<String>,
    /// 译文检测结果
    pub translation_language: Option<String>,
    /// 源文本是否匹配期望源语言；源无法判定时为 None（不算冲突）
    pub source_matches: Option<bool>,
    /// 译文是否匹配期望目标语言；译文无法判定视为不匹配
    pub translation_matches: Option<bool>,
    /// 译文是否缺失（为空或与源文本相同）
    pub missing_translation: bool,
    pub source_confidence: f64,
    pub translation_confidence: f64,
}

impl LanguageStatus {
    /// 条目是否需要处理（缺译或语言不符）
    pub fn needs_attention(&self) -> bool {
        self.missing_translation
            || self.source_matches == Some(false)
            || self.translation_matches == Some(false)
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct StatusKey {
    msgid: String,
    msgstr: String,
    expected_source: String,
    expected_target: String,
}

/// 上下文窗口：前 3 条 + 后 4 条，最多取 5 个非空样本
const CONTEXT_BEFORE: usize = 3;
const CONTEXT_AFTER: usize = 4;
const CONTEXT_SAMPLES: usize = 5;

/// 状态分析器
///
/// 持有分类器和按条目的状态缓存。同一目录反复查询状态（界面
/// 刷新、批量筛选）时只有文本变过的条目会重新检测。
pub struct StatusAnalyzer {
    classifier: Arc<Classifier>,
    cache: Mutex<HashMap<EntryId, (StatusKey, LanguageStatus)>>,
}

impl StatusAnalyzer {
    pub fn new(classifier: Arc<Classifier>) -> Self {
        Self {
            classifier,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// 分析单个条目
    ///
    /// `entries` 是条目所在目录的完整顺序，`index` 是该条目的位置，
    /// 用于取上下文窗口。
    pub fn analyze(
        &self,
        entries: &[SharedEntry],
        index: usize,
        expected_source: &str,
        expected_target: &str,
    ) -> LanguageStatus {
        let (id, msgid, msgstr, missing) = {
            let entry = entries[index].read().unwrap_or_else(|e| e.into_inner());
            (
                entry.id,
                entry.msgid.clone(),
                entry.msgstr.clone(),
                entry.is_untranslated(),
            )
        };

        let key = StatusKey {
            msgid: msgid.clone(),
            msgstr: msgstr.clone(),
            expected_source: expected_source.to_string(),
            expected_target: expected_target.to_string(),
        };
        if let Ok(cache) = self.cache.lock() {
            if let Some((cached_key, status)) = cache.get(&id) {
                if *cached_key == key {
                    return status.clone();
                }
            }
        }

        let status = self.compute(
            entries,
            index,
            &msgid,
            &msgstr,
            missing,
            expected_source,
            expected_target,
        );
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(id, (key, status.clone()));
        }
        status
    }

    #[allow(clippy::too_many_arguments)]
    fn compute(
        &self,
        entries: &[SharedEntry],
        index: usize,
        msgid: &str,
        msgstr: &str,
        missing: bool,
        expected_source: &str,
        expected_target: &str,
    ) -> LanguageStatus {
        let source_context = self.context_window(entries, index, ContextSide::Source);
        let (source_language, source_confidence) =
            self.classifier
                .detect_with_context(msgid, &source_context, Some(expected_source));

        let source_matches = source_language
            .as_deref()
            .map(|lang| lang == expected_source);

        let (translation_language, translation_confidence, translation_matches) = if missing {
            (None, 0.0, None)
        } else {
            // 译文上下文 = 源文本 + 邻近译文，短译文常靠它救回来
            let mut translation_context = vec![msgid.to_string()];
            translation_context
                .extend(self.context_window(entries, index, ContextSide::Translation));
            translation_context.truncate(CONTEXT_SAMPLES);
            let (lang, conf) = self.classifier.detect_with_context(
                msgstr,
                &translation_context,
                Some(expected_target),
            );
            // 无法判定的译文视为不匹配，交给后续流程复核
            let matches = Some(lang.as_deref() == Some(expected_target));
            (lang, conf, matches)
        };

        debug!(
            "状态: 源={:?}({:.2}) 译={:?}({:.2}) 缺={}",
            source_language, source_confidence, translation_language, translation_confidence,
            missing
        );

        LanguageStatus {
            source_language,
            translation_language,
            source_matches,
            translation_matches,
            missing_translation: missing,
            source_confidence,
            translation_confidence,
        }
    }

    fn context_window(
        &self,
        entries: &[SharedEntry],
        index: usize,
        side: ContextSide,
    ) -> Vec<String> {
        let start = index.saturating_sub(CONTEXT_BEFORE);
        let end = (index + 1 + CONTEXT_AFTER).min(entries.len());
        let mut samples = Vec::new();
        for (i, entry) in entries[start..end].iter().enumerate() {
            if start + i == index {
                continue;
            }
            let entry = entry.read().unwrap_or_else(|e| e.into_inner());
            let text = match side {
                ContextSide::Source => entry.msgid.trim(),
                ContextSide::Translation => entry.msgstr.trim(),
            };
            if !text.is_empty() {
                samples.push(text.to_string());
                if samples.len() >= CONTEXT_SAMPLES {
                    break;
                }
            }
        }
        samples
    }

    /// 批量分析整个目录，单条失败不影响其余条目
    pub fn analyze_all(
        &self,
        entries: &[SharedEntry],
        expected_source: &str,
        expected_target: &str,
    ) -> Vec<(EntryId, LanguageStatus)> {
        let mut results = Vec::with_capacity(entries.len());
        for index in 0..entries.len() {
            let id = {
                let entry = entries[index].read().unwrap_or_else(|e| e.into_inner());
                entry.id
            };
            let status = self.analyze(entries, index, expected_source, expected_target);
            results.push((id, status));
        }
        results
    }

    /// 按条目失效缓存（文本被外部改写后调用）
    pub fn invalidate(&self, ids: &[EntryId]) {
        match self.cache.lock() {
            Ok(mut cache) => {
                for id in ids {
                    cache.remove(id);
                }
            }
            Err(_) => warn!("状态缓存锁中毒，跳过失效"),
        }
    }

    /// 清空全部状态缓存
    pub fn invalidate_all(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// 缓存条目数（调试用）
    pub fn cached_count(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[derive(Clone, Copy)]
enum ContextSide {
    Source,
    Translation,
}
