//! 翻译引擎核心实现
//!
//! 引擎把单条 UI 文本交给大模型后端翻译，并在外面包好整个
//! 防护层：
//!
//! - **缓存优先**: 命中持久化缓存的文本不再调用 API
//! - **限速**: 全局请求间隔门闩，无论多少并发工作者都串行排队
//! - **占位符校验**: 译文必须保留源文本的全部格式占位符，否则重试
//! - **降级**: 重试耗尽后向调用方报错，批量流程保留原文继续
//! - **性能统计**: 原子计数器跟踪请求、命中、API 调用和自动纠正
//!
//! 按条目的自动翻译策略见 [`Translator::auto_translate_entry`]。

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use regex::Regex;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::catalog::SharedEntry;
use crate::error::{TranslationError, TranslationResult};
use crate::language::{is_supported, language_name};
use crate::translator::backend::TranslationBackend;
use crate::translator::cache::{CacheStats, TranslationCache};

/// 相邻 API 请求的最小间隔
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);
/// 默认的单条文本尝试次数上限（含占位符校验失败的重试）
const MAX_ATTEMPTS: usize = 3;

/// gettext/Python 风格的格式占位符
fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"%\([^)]+\)s|%s|\{[^}]+\}|\$\{[^}]+\}").unwrap()
    })
}

/// ERP 领域术语表，按目标语言给模型固定译法
fn glossary(target: &str) -> &'static [(&'static str, &'static str)] {
    match target {
        "fr" => &[
            ("Invoice", "Facture"),
            ("Quotation", "Devis"),
            ("Sales", "Ventes"),
            ("Purchase Order", "Bon de commande"),
            ("Delivery Order", "Livraison"),
            ("Partner", "Partenaire"),
            ("Customer", "Client"),
            ("Vendor", "Fournisseur"),
            ("Warehouse", "Entrepôt"),
            ("Payment", "Paiement"),
            ("Accounting", "Comptabilité"),
        ],
        _ => &[],
    }
}

// ============================================================================
// 统计
// ============================================================================

/// 引擎统计快照
#[derive(Debug, Clone, Default)]
pub struct TranslatorStats {
    pub total_requests: usize,
    pub cache_hits: usize,
    pub api_calls: usize,
    pub failures: usize,
    /// 首次之外的再尝试次数（校验失败或可重试错误触发）
    pub retries: usize,
    /// 源语言与配置不符时按检测结果自动切换的次数
    pub auto_corrections: usize,
    pub cache: CacheStats,
}

impl TranslatorStats {
    pub fn hit_rate(&self) -> f64 {
        self.cache_hits as f64 / self.total_requests.max(1) as f64
    }

    /// 落到 API 的请求占比，越低说明缓存越有效
    pub fn api_efficiency(&self) -> f64 {
        self.api_calls as f64 / self.total_requests.max(1) as f64
    }
}

#[derive(Default)]
struct Counters {
    total_requests: AtomicUsize,
    cache_hits: AtomicUsize,
    api_calls: AtomicUsize,
    failures: AtomicUsize,
    retries: AtomicUsize,
    auto_corrections: AtomicUsize,
}

// ============================================================================
// 引擎
// ============================================================================

/// 语言对配置
#[derive(Debug, Clone)]
struct LanguagePair {
    source: String,
    target: String,
    /// 允许按检测结果自动切换源语言
    auto_detect: bool,
}

/// 按条目自动翻译的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// 译文已写入条目
    Translated,
    /// 条目状态正常，无需处理
    Skipped,
}

/// 顺序批量翻译的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub translated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// 翻译引擎
pub struct Translator {
    backend: Arc<dyn TranslationBackend>,
    cache: Arc<TranslationCache>,
    languages: RwLock<LanguagePair>,
    /// 上一次 API 请求的时刻，持锁睡眠实现全局串行限速
    rate_gate: Mutex<Instant>,
    counters: Counters,
}

impl Translator {
    pub fn new(backend: Arc<dyn TranslationBackend>, cache: Arc<TranslationCache>) -> Self {
        Self {
            backend,
            cache,
            languages: RwLock::new(LanguagePair {
                source: "en".to_string(),
                target: "fr".to_string(),
                auto_detect: true,
            }),
            rate_gate: Mutex::new(
                Instant::now()
                    .checked_sub(MIN_REQUEST_INTERVAL)
                    .unwrap_or_else(Instant::now),
            ),
            counters: Counters::default(),
        }
    }

    /// 配置语言对，不支持的语言代码记警告但照常接受
    pub fn configure_languages(&self, source: &str, target: &str) {
        for lang in [source, target] {
            if !is_supported(lang) {
                warn!("语言代码不在支持列表中: {}", lang);
            }
        }
        let mut pair = self.languages.write().unwrap_or_else(|e| e.into_inner());
        pair.source = source.to_string();
        pair.target = target.to_string();
        info!("语言对已配置: {} → {}", source, target);
    }

    /// 开关按检测结果的源语言自动切换
    pub fn set_auto_detect(&self, enabled: bool) {
        self.languages
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .auto_detect = enabled;
    }

    pub fn source_language(&self) -> String {
        self.languages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .source
            .clone()
    }

    pub fn target_language(&self) -> String {
        self.languages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .target
            .clone()
    }

    // ------------------------------------------------------------------
    // 单条翻译
    // ------------------------------------------------------------------

    /// 翻译一条文本，尝试次数取默认值
    pub async fn translate_text(
        &self,
        text: &str,
        source: &str,
        target: &str,
        context: Option<&str>,
    ) -> TranslationResult<String> {
        self.translate_text_with_retries(text, source, target, context, MAX_ATTEMPTS)
            .await
    }

    /// 翻译一条文本
    ///
    /// 走缓存、限速、重试和占位符校验。`max_attempts` 是含首次在内
    /// 的尝试上限（最小取 1）。重试耗尽后返回错误，原文保持不动由
    /// 调用方决定。
    pub async fn translate_text_with_retries(
        &self,
        text: &str,
        source: &str,
        target: &str,
        context: Option<&str>,
        max_attempts: usize,
    ) -> TranslationResult<String> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }
        let max_attempts = max_attempts.max(1);
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);

        let key = TranslationCache::make_key(text, source, target, context);
        if let Some(cached) = self.cache.get(&key) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("缓存命中: '{}'", preview(text));
            return Ok(cached);
        }

        let prompt = self.build_prompt(text, source, target, context);
        let expected = extract_placeholders(text);

        let mut last_error: Option<TranslationError> = None;
        for attempt in 1..=max_attempts {
            if attempt > 1 {
                self.counters.retries.fetch_add(1, Ordering::Relaxed);
            }
            self.wait_for_rate_gate().await;

            match self.backend.generate(&prompt).await {
                Ok(reply) => {
                    self.counters.api_calls.fetch_add(1, Ordering::Relaxed);
                    let cleaned = clean_reply(&reply, text);
                    if cleaned.is_empty() {
                        last_error =
                            Some(TranslationError::Validation("模型返回空译文".to_string()));
                        continue;
                    }
                    if extract_placeholders(&cleaned) != expected {
                        warn!(
                            "占位符不一致 (第 {} 次): '{}' → '{}'",
                            attempt,
                            preview(text),
                            preview(&cleaned)
                        );
                        last_error = Some(TranslationError::Validation(format!(
                            "译文丢失或改写了占位符: {}",
                            preview(text)
                        )));
                        continue;
                    }
                    self.cache.insert(key, cleaned.clone());
                    return Ok(cleaned);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!("后端调用失败 (第 {} 次), 即将重试: {}", attempt, e);
                    sleep(MIN_REQUEST_INTERVAL * attempt as u32).await;
                    last_error = Some(e);
                }
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            }
        }

        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        Err(last_error
            .unwrap_or_else(|| TranslationError::Backend("翻译失败且无错误详情".to_string())))
    }

    /// 同上，失败时返回原文而不是错误
    pub async fn translate_text_or_original(
        &self,
        text: &str,
        source: &str,
        target: &str,
        context: Option<&str>,
    ) -> String {
        match self.translate_text(text, source, target, context).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!("翻译失败, 保留原文 '{}': {}", preview(text), e);
                text.to_string()
            }
        }
    }

    async fn wait_for_rate_gate(&self) {
        let mut last_request = self.rate_gate.lock().await;
        let elapsed = last_request.elapsed();
        if elapsed < MIN_REQUEST_INTERVAL {
            sleep(MIN_REQUEST_INTERVAL - elapsed).await;
        }
        *last_request = Instant::now();
    }

    // ------------------------------------------------------------------
    // 按条目的自动翻译策略
    // ------------------------------------------------------------------

    /// 根据语言状态决定条目如何翻译
    ///
    /// 1. 空键 → 跳过
    /// 2. 译文已存在且与键不同 → 跳过（除非 `force`）
    /// 3. 键被可信地检测为目标语言 → 跳过（`force` 时记日志后继续）
    /// 4. 检测到源语言与配置不符且可信 → 改用检测语言作为源（自动纠正）
    /// 5. 翻译 msgid，以 `module` 作为提示词和缓存键的上下文
    ///
    /// `force` 为真时对非缺失条目也强制重译（用于把误写入 msgstr 的
    /// 源语言文本规范化）。
    pub async fn auto_translate_entry(
        &self,
        entry: &SharedEntry,
        status: &crate::language::LanguageStatus,
        force: bool,
        module: Option<&str>,
    ) -> TranslationResult<EntryOutcome> {
        let (msgid, msgstr) = {
            let entry = entry.read().unwrap_or_else(|e| e.into_inner());
            (entry.msgid.clone(), entry.msgstr.clone())
        };
        if msgid.trim().is_empty() {
            return Ok(EntryOutcome::Skipped);
        }

        // 已有不同于键的译文不覆盖, 不符条目的重译由调用方通过 force 决定
        if !status.missing_translation && !force {
            return Ok(EntryOutcome::Skipped);
        }

        let pair = {
            let pair = self.languages.read().unwrap_or_else(|e| e.into_inner());
            pair.clone()
        };

        // 键本身已是目标语言就没有可译的内容
        let detected_as_target = matches!(
            &status.source_language,
            Some(detected) if detected == &pair.target && status.source_confidence >= 0.7
        );
        if detected_as_target {
            if force {
                warn!(
                    "检测语言与目标 {} 一致, 因强制重译继续: '{}'",
                    pair.target,
                    preview(&msgid)
                );
            } else {
                debug!("键已是目标语言, 跳过: '{}'", preview(&msgid));
                return Ok(EntryOutcome::Skipped);
            }
        }

        // 源语言检测与配置冲突且可信时改用检测结果
        let source = match &status.source_language {
            Some(detected)
                if pair.auto_detect
                    && !detected_as_target
                    && detected != &pair.source
                    && is_supported(detected)
                    && status.source_confidence >= 0.7 =>
            {
                self.counters.auto_corrections.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "自动纠正源语言: {} → {} ('{}')",
                    pair.source,
                    detected,
                    preview(&msgid)
                );
                detected.clone()
            }
            _ => pair.source.clone(),
        };

        let translated = self
            .translate_text(&msgid, &source, &pair.target, module)
            .await?;
        if translated == msgstr {
            return Ok(EntryOutcome::Skipped);
        }

        let mut entry = entry.write().unwrap_or_else(|e| e.into_inner());
        entry.msgstr = translated;
        Ok(EntryOutcome::Translated)
    }

    /// 顺序批量翻译（并发调度见 orchestrator 模块）
    ///
    /// 单条失败保留原文继续，`progress` 每处理一条回调一次。
    pub async fn batch_translate<F>(
        &self,
        items: &[(SharedEntry, crate::language::LanguageStatus)],
        module: Option<&str>,
        force: bool,
        mut progress: F,
    ) -> BatchSummary
    where
        F: FnMut(usize, usize),
    {
        let mut summary = BatchSummary {
            total: items.len(),
            ..BatchSummary::default()
        };
        for (done, (entry, status)) in items.iter().enumerate() {
            match self.auto_translate_entry(entry, status, force, module).await {
                Ok(EntryOutcome::Translated) => summary.translated += 1,
                Ok(EntryOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!("条目翻译失败: {}", e);
                }
            }
            progress(done + 1, summary.total);
        }
        if let Err(e) = self.cache.flush() {
            warn!("批量结束时缓存落盘失败: {}", e);
        }
        summary
    }

    // ------------------------------------------------------------------
    // 提示词
    // ------------------------------------------------------------------

    fn build_prompt(&self, text: &str, source: &str, target: &str, context: Option<&str>) -> String {
        let source_name = language_name(source);
        let target_name = language_name(target);

        let mut prompt = format!(
            "Translate the following text from {} to {}.\n\n\
             Rules:\n\
             - The text is a user interface string from business management software.\n\
             - Keep every placeholder exactly as written: %s, %(name)s, {{name}}, ${{name}}.\n\
             - Do not add quotes or explanations, reply with the translation only.\n",
            source_name, target_name
        );
        if let Some(context) = context.filter(|c| !c.is_empty()) {
            prompt.push_str(&format!("- The string belongs to the '{}' module.\n", context));
        }

        let lowered = text.to_lowercase();
        let matching: Vec<_> = glossary(target)
            .iter()
            .filter(|(term, _)| lowered.contains(&term.to_lowercase()))
            .collect();
        if !matching.is_empty() {
            prompt.push_str("- Use these standard translations:\n");
            for (term, translation) in matching {
                prompt.push_str(&format!("  {} → {}\n", term, translation));
            }
        }

        prompt.push_str(&format!("\nText: {}\nTranslation:", text));
        prompt
    }

    // ------------------------------------------------------------------
    // 统计与维护
    // ------------------------------------------------------------------

    pub fn get_stats(&self) -> TranslatorStats {
        TranslatorStats {
            total_requests: self.counters.total_requests.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            api_calls: self.counters.api_calls.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            auto_corrections: self.counters.auto_corrections.load(Ordering::Relaxed),
            cache: self.cache.stats(),
        }
    }

    pub fn reset_stats(&self) {
        self.counters.total_requests.store(0, Ordering::Relaxed);
        self.counters.cache_hits.store(0, Ordering::Relaxed);
        self.counters.api_calls.store(0, Ordering::Relaxed);
        self.counters.failures.store(0, Ordering::Relaxed);
        self.counters.retries.store(0, Ordering::Relaxed);
        self.counters.auto_corrections.store(0, Ordering::Relaxed);
        self.cache.reset_stats();
    }

    pub fn clear_cache(&self) -> TranslationResult<()> {
        self.cache.clear()
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }
}

// ============================================================================
// 纯函数工具
// ============================================================================

/// 提取文本里的格式占位符（去重）
pub fn extract_placeholders(text: &str) -> BTreeSet<String> {
    placeholder_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// 清理模型回复
///
/// 去掉首尾空白和包裹引号；单行源文本只取回复的第一个非空行，
/// 多行源文本保留整段。
fn clean_reply(reply: &str, source_text: &str) -> String {
    let mut cleaned = if source_text.contains('\n') {
        reply.trim().to_string()
    } else {
        reply
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("")
            .to_string()
    };

    if let Some(rest) = cleaned.strip_prefix("Translation:") {
        cleaned = rest.trim().to_string();
    }
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”'), ('«', '»')] {
        if cleaned.len() >= 2 && cleaned.starts_with(open) && cleaned.ends_with(close) {
            cleaned = cleaned[open.len_utf8()..cleaned.len() - close.len_utf8()]
                .trim()
                .to_string();
        }
    }
    cleaned
}

/// 日志里展示的文本片段（按字符边界截断）
fn preview(text: &str) -> &str {
    match text.char_indices().nth(40) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Entry;
    use crate::language::LanguageStatus;
    use crate::translator::backend::BackendFuture;
    use std::sync::Mutex as StdMutex;

    /// 脚本化后端桩：按序吐出预设回复并记录请求时刻和提示词
    pub struct ScriptedBackend {
        replies: StdMutex<Vec<TranslationResult<String>>>,
        pub timestamps: StdMutex<Vec<Instant>>,
        pub prompts: StdMutex<Vec<String>>,
    }

    impl ScriptedBackend {
        pub fn new(replies: Vec<TranslationResult<String>>) -> Self {
            Self {
                replies: StdMutex::new(replies),
                timestamps: StdMutex::new(Vec::new()),
                prompts: StdMutex::new(Vec::new()),
            }
        }

        pub fn echo() -> Self {
            Self::new(Vec::new())
        }
    }

    impl TranslationBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn generate<'a>(&'a self, prompt: &'a str) -> BackendFuture<'a> {
            Box::pin(async move {
                self.timestamps.lock().unwrap().push(Instant::now());
                self.prompts.lock().unwrap().push(prompt.to_string());
                let mut replies = self.replies.lock().unwrap();
                if replies.is_empty() {
                    // 回显提示词里的 Text 行, 加前缀模拟译文
                    let text = prompt
                        .lines()
                        .find_map(|l| l.strip_prefix("Text: "))
                        .unwrap_or("");
                    Ok(format!("[{}]", text))
                } else {
                    replies.remove(0)
                }
            })
        }
    }

    fn translator(backend: ScriptedBackend) -> Translator {
        Translator::new(Arc::new(backend), Arc::new(TranslationCache::in_memory()))
    }

    fn missing_status() -> LanguageStatus {
        LanguageStatus {
            source_language: Some("en".to_string()),
            translation_language: None,
            source_matches: Some(true),
            translation_matches: None,
            missing_translation: true,
            source_confidence: 0.9,
            translation_confidence: 0.0,
        }
    }

    #[test]
    fn test_extract_placeholders() {
        let found = extract_placeholders("Facture N° %(number)s du %(date)s: %s {amount} ${ref}");
        let expected: BTreeSet<String> =
            ["%(number)s", "%(date)s", "%s", "{amount}", "${ref}"]
                .iter()
                .map(|s| s.to_string())
                .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_clean_reply_strips_quotes_and_prefix() {
        assert_eq!(clean_reply("\"Facture\"", "Invoice"), "Facture");
        assert_eq!(clean_reply("Translation: «Devis»", "Quotation"), "Devis");
        assert_eq!(
            clean_reply("  Facture\nNote: ...", "Invoice"),
            "Facture"
        );
        // 多行源文本保留整段回复
        assert_eq!(
            clean_reply("Ligne un\nLigne deux", "Line one\nLine two"),
            "Ligne un\nLigne deux"
        );
    }

    #[tokio::test]
    async fn test_cache_short_circuits_backend() {
        let translator = translator(ScriptedBackend::echo());
        let first = translator
            .translate_text("Invoice", "en", "fr", None)
            .await
            .unwrap();
        let second = translator
            .translate_text("Invoice", "en", "fr", None)
            .await
            .unwrap();
        assert_eq!(first, second);

        let stats = translator.get_stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.api_calls, 1);
        assert_eq!(stats.cache_hits, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_placeholder_mismatch_retries_then_fails() {
        let backend = ScriptedBackend::new(vec![
            Ok("Facture de Total".to_string()),
            Ok("Facture de TOTAL".to_string()),
            Ok("Facture sans placeholder".to_string()),
        ]);
        let translator = translator(backend);
        let result = translator
            .translate_text("Invoice of %(total)s", "en", "fr", None)
            .await;
        assert!(matches!(result, Err(TranslationError::Validation(_))));
        assert_eq!(translator.get_stats().failures, 1);
    }

    #[tokio::test]
    async fn test_retryable_error_then_success() {
        let backend = ScriptedBackend::new(vec![
            Err(TranslationError::Backend("超时".to_string())),
            Ok("Facture".to_string()),
        ]);
        let translator = translator(backend);
        let result = translator
            .translate_text("Invoice", "en", "fr", None)
            .await
            .unwrap();
        assert_eq!(result, "Facture");
    }

    #[tokio::test]
    async fn test_or_original_keeps_source_on_failure() {
        let backend = ScriptedBackend::new(vec![
            Err(TranslationError::Config("密钥缺失".to_string())),
        ]);
        let translator = translator(backend);
        let result = translator
            .translate_text_or_original("Invoice", "en", "fr", None)
            .await;
        assert_eq!(result, "Invoice");
    }

    #[tokio::test]
    async fn test_auto_translate_missing_entry() {
        let translator = translator(ScriptedBackend::echo());
        let entry = Entry::new("Invoice", "").shared();
        let outcome = translator
            .auto_translate_entry(&entry, &missing_status(), false, None)
            .await
            .unwrap();
        assert_eq!(outcome, EntryOutcome::Translated);
        assert_eq!(entry.read().unwrap().msgstr, "[Invoice]");
    }

    #[tokio::test]
    async fn test_auto_translate_skips_healthy_entry() {
        let translator = translator(ScriptedBackend::echo());
        let entry = Entry::new("Invoice", "Facture").shared();
        let status = LanguageStatus {
            translation_language: Some("fr".to_string()),
            translation_matches: Some(true),
            missing_translation: false,
            translation_confidence: 0.9,
            ..missing_status()
        };
        let outcome = translator
            .auto_translate_entry(&entry, &status, false, None)
            .await
            .unwrap();
        assert_eq!(outcome, EntryOutcome::Skipped);
        assert_eq!(translator.get_stats().api_calls, 0);
    }

    #[tokio::test]
    async fn test_mismatched_translation_needs_force() {
        let translator = translator(ScriptedBackend::echo());
        let entry = Entry::new("Invoice", "Open invoice").shared();
        let status = LanguageStatus {
            translation_language: Some("en".to_string()),
            translation_matches: Some(false),
            missing_translation: false,
            translation_confidence: 0.9,
            ..missing_status()
        };

        // 译文已存在且与键不同, 不强制就不覆盖
        let outcome = translator
            .auto_translate_entry(&entry, &status, false, None)
            .await
            .unwrap();
        assert_eq!(outcome, EntryOutcome::Skipped);
        assert_eq!(translator.get_stats().api_calls, 0);
        assert_eq!(entry.read().unwrap().msgstr, "Open invoice");

        let outcome = translator
            .auto_translate_entry(&entry, &status, true, None)
            .await
            .unwrap();
        assert_eq!(outcome, EntryOutcome::Translated);
        assert_eq!(entry.read().unwrap().msgstr, "[Invoice]");
    }

    #[tokio::test]
    async fn test_target_language_key_skipped_unless_forced() {
        let translator = translator(ScriptedBackend::echo());
        translator.configure_languages("en", "fr");
        let entry = Entry::new("Facture client", "").shared();
        let status = LanguageStatus {
            source_language: Some("fr".to_string()),
            source_matches: Some(false),
            source_confidence: 0.9,
            ..missing_status()
        };

        // 键本身已是法语, 目标也是法语, 没有可译的内容
        let outcome = translator
            .auto_translate_entry(&entry, &status, false, None)
            .await
            .unwrap();
        assert_eq!(outcome, EntryOutcome::Skipped);
        let stats = translator.get_stats();
        assert_eq!(stats.api_calls, 0);
        assert_eq!(stats.auto_corrections, 0);

        // 强制时记日志后照常翻译, 源语言保持配置值
        let outcome = translator
            .auto_translate_entry(&entry, &status, true, None)
            .await
            .unwrap();
        assert_eq!(outcome, EntryOutcome::Translated);
        let stats = translator.get_stats();
        assert_eq!(stats.api_calls, 1);
        assert_eq!(stats.auto_corrections, 0);
    }

    #[tokio::test]
    async fn test_module_context_flows_into_prompt_and_cache_key() {
        let backend = Arc::new(ScriptedBackend::echo());
        let translator = Translator::new(backend.clone(), Arc::new(TranslationCache::in_memory()));
        let entry = Entry::new("Invoice", "").shared();

        translator
            .auto_translate_entry(&entry, &missing_status(), false, Some("sale"))
            .await
            .unwrap();
        let prompts = backend.prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("belongs to the 'sale' module"));

        // 换一个模块是不同的缓存键, 再次走 API
        entry.write().unwrap().msgstr.clear();
        translator
            .auto_translate_entry(&entry, &missing_status(), false, Some("stock"))
            .await
            .unwrap();
        assert_eq!(translator.get_stats().api_calls, 2);
    }

    #[tokio::test]
    async fn test_detected_source_switch_counts_correction() {
        let translator = translator(ScriptedBackend::echo());
        translator.configure_languages("en", "fr");
        let entry = Entry::new("Factura pendiente", "").shared();
        let status = LanguageStatus {
            source_language: Some("es".to_string()),
            source_matches: Some(false),
            source_confidence: 0.85,
            ..missing_status()
        };
        translator
            .auto_translate_entry(&entry, &status, false, None)
            .await
            .unwrap();
        assert_eq!(translator.get_stats().auto_corrections, 1);
    }

    #[tokio::test]
    async fn test_auto_detect_disabled_keeps_configured_source() {
        let translator = translator(ScriptedBackend::echo());
        translator.configure_languages("en", "fr");
        translator.set_auto_detect(false);
        let entry = Entry::new("Factura pendiente", "").shared();
        let status = LanguageStatus {
            source_language: Some("es".to_string()),
            source_matches: Some(false),
            source_confidence: 0.85,
            ..missing_status()
        };
        translator
            .auto_translate_entry(&entry, &status, false, None)
            .await
            .unwrap();
        assert_eq!(translator.get_stats().auto_corrections, 0);
    }

    #[tokio::test]
    async fn test_retry_counter_and_attempt_budget() {
        // 默认尝试次数: 一次可重试失败后成功, 计一次重试
        let backend = ScriptedBackend::new(vec![
            Err(TranslationError::Backend("超时".to_string())),
            Ok("Facture".to_string()),
        ]);
        let translator = translator(backend);
        translator
            .translate_text("Invoice", "en", "fr", None)
            .await
            .unwrap();
        let stats = translator.get_stats();
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.api_calls, 1);

        // 尝试上限 1: 同样的失败直接放弃, 不重试
        let backend = ScriptedBackend::new(vec![
            Err(TranslationError::Backend("超时".to_string())),
            Ok("Facture".to_string()),
        ]);
        let translator = self::translator(backend);
        let result = translator
            .translate_text_with_retries("Invoice", "en", "fr", None, 1)
            .await;
        assert!(result.is_err());
        let stats = translator.get_stats();
        assert_eq!(stats.retries, 0);
        assert_eq!(stats.failures, 1);
    }

    #[tokio::test]
    async fn test_batch_summary_accounts_every_entry() {
        let backend = ScriptedBackend::new(vec![
            Err(TranslationError::Config("密钥缺失".to_string())),
        ]);
        let translator = translator(backend);
        let items = vec![
            (Entry::new("Invoice", "").shared(), missing_status()),
            (
                Entry::new("Order", "Commande").shared(),
                LanguageStatus {
                    missing_translation: false,
                    ..missing_status()
                },
            ),
            (Entry::new("Delivery", "").shared(), missing_status()),
        ];
        let summary = translator.batch_translate(&items, None, false, |_, _| {}).await;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.translated, 1);
    }

    #[tokio::test]
    async fn test_api_efficiency_rate() {
        let translator = translator(ScriptedBackend::echo());
        translator
            .translate_text("Invoice", "en", "fr", None)
            .await
            .unwrap();
        translator
            .translate_text("Invoice", "en", "fr", None)
            .await
            .unwrap();
        let stats = translator.get_stats();
        // 两次请求一次落到 API
        assert!((stats.api_efficiency() - 0.5).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_gate_spaces_requests() {
        let translator = Arc::new(translator(ScriptedBackend::echo()));
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..5 {
            let translator = translator.clone();
            tasks.spawn(async move {
                translator
                    .translate_text(&format!("Text {}", i), "en", "fr", None)
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }
        assert_eq!(translator.get_stats().api_calls, 5);
        // 虚拟时钟下 5 个请求至少推进 4 个间隔
    }

    #[tokio::test]
    async fn test_stats_reset() {
        let translator = translator(ScriptedBackend::echo());
        translator
            .translate_text("Invoice", "en", "fr", None)
            .await
            .unwrap();
        assert!(translator.get_stats().total_requests > 0);
        translator.reset_stats();
        let stats = translator.get_stats();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.api_calls, 0);
    }
}
