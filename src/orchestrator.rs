//! 批量翻译调度
//!
//! 把目录级的批量翻译串起来：先做一遍完整的语言状态分析，把
//! 条目分成缺译和语言不符两组；不符组的处置交给外部决策钩子
//! （规范化重译 / 保留 / 取消），然后用固定大小的工作者池并发
//! 跑引擎。取消令牌随时可以从另一个线程拉下，已开始的条目会
//! 跑完，未开始的全部计入报告。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::catalog::{EntryId, SharedEntry};
use crate::error::{TranslationError, TranslationResult};
use crate::language::{LanguageStatus, StatusAnalyzer};
use crate::merge::{ProvenanceIndex, UNKNOWN_MODULE};
use crate::translator::{EntryOutcome, Translator};

/// 默认并发工作者数
pub const DEFAULT_WORKERS: usize = 4;

/// 对语言不符条目的处置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchPolicy {
    /// 重新翻译，把译文规范到目标语言
    Normalize,
    /// 保留现状，只处理缺译条目
    Keep,
    /// 放弃整个批次
    Cancel,
}

/// 语言不符的决策钩子
///
/// 批次里存在语言不符条目时调用一次，拿到样本决定处置。GUI 可以
/// 弹对话框，CLI 用 [`FixedPolicy`] 直接给定。
pub trait MismatchResolver: Send + Sync {
    fn resolve(&self, mismatched: &[(SharedEntry, LanguageStatus)]) -> MismatchPolicy;
}

/// 固定处置策略
pub struct FixedPolicy(pub MismatchPolicy);

impl MismatchResolver for FixedPolicy {
    fn resolve(&self, _mismatched: &[(SharedEntry, LanguageStatus)]) -> MismatchPolicy {
        self.0
    }
}

/// 批次执行报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// 选入批次的条目数
    pub selected: usize,
    /// 其中缺译条目数
    pub untranslated: usize,
    /// 其中语言不符条目数（Normalize 时才会被选入）
    pub mismatched: usize,
    pub translated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// 因取消而未开始的条目数
    pub not_started: usize,
    pub cancelled: bool,
}

impl BatchReport {
    /// 账目核对: 选入 = 已译 + 跳过 + 失败 + 未开始
    pub fn is_balanced(&self) -> bool {
        self.selected == self.translated + self.skipped + self.failed + self.not_started
    }
}

/// 批量翻译调度器
pub struct Orchestrator {
    translator: Arc<Translator>,
    analyzer: Arc<StatusAnalyzer>,
    workers: usize,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(translator: Arc<Translator>, analyzer: Arc<StatusAnalyzer>) -> Self {
        Self {
            translator,
            analyzer,
            workers: DEFAULT_WORKERS,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// 取消令牌，可以交给界面线程随时拉下
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// 执行一个批次
    ///
    /// 状态总是现算，不信任调用方缓存的旧状态。`provenance` 给出
    /// 时按键查所属模块，作为提示词和缓存键的上下文。`progress`
    /// 每完成一条回调 (已完成, 总数)。
    pub async fn run<F>(
        &self,
        entries: &[SharedEntry],
        provenance: Option<&ProvenanceIndex>,
        resolver: &dyn MismatchResolver,
        progress: F,
    ) -> TranslationResult<BatchReport>
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.cancel.store(false, Ordering::Relaxed);

        let source = self.translator.source_language();
        let target = self.translator.target_language();
        let statuses = self.analyzer.analyze_all(entries, &source, &target);

        // 状态向量与条目一一对应
        debug_assert_eq!(statuses.len(), entries.len());

        let mut untranslated: Vec<(SharedEntry, LanguageStatus)> = Vec::new();
        let mut mismatched: Vec<(SharedEntry, LanguageStatus)> = Vec::new();
        for (entry, (_, status)) in entries.iter().zip(&statuses) {
            let key_empty = {
                let entry = entry.read().unwrap_or_else(|e| e.into_inner());
                entry.msgid.trim().is_empty()
            };
            if key_empty {
                continue;
            }
            if status.missing_translation {
                untranslated.push((entry.clone(), status.clone()));
            } else if status.needs_attention() {
                mismatched.push((entry.clone(), status.clone()));
            }
        }

        let policy = if mismatched.is_empty() {
            MismatchPolicy::Keep
        } else {
            resolver.resolve(&mismatched)
        };
        if policy == MismatchPolicy::Cancel {
            info!("批次被决策钩子取消 (不符条目 {})", mismatched.len());
            return Ok(BatchReport {
                cancelled: true,
                ..BatchReport::default()
            });
        }

        // 按键查所属模块, 查不到或未知模块不给上下文
        let module_of = |entry: &SharedEntry| -> Option<String> {
            let provenance = provenance?;
            let msgid = entry.read().unwrap_or_else(|e| e.into_inner()).msgid.clone();
            let module = provenance.module_of(&msgid);
            (module != UNKNOWN_MODULE).then_some(module)
        };

        // 选入集合按条目身份去重, force 标记不符条目的强制重译
        let mut seen: std::collections::HashSet<EntryId> = std::collections::HashSet::new();
        let mut batch: Vec<(SharedEntry, LanguageStatus, bool, Option<String>)> = Vec::new();
        let mut report = BatchReport::default();
        for (entry, status) in &untranslated {
            let id = entry.read().unwrap_or_else(|e| e.into_inner()).id;
            if seen.insert(id) {
                report.untranslated += 1;
                batch.push((entry.clone(), status.clone(), false, module_of(entry)));
            }
        }
        if policy == MismatchPolicy::Normalize {
            for (entry, status) in &mismatched {
                let id = entry.read().unwrap_or_else(|e| e.into_inner()).id;
                if seen.insert(id) {
                    report.mismatched += 1;
                    batch.push((entry.clone(), status.clone(), true, module_of(entry)));
                }
            }
        }
        report.selected = batch.len();
        if batch.is_empty() {
            info!("没有需要翻译的条目");
            return Ok(report);
        }
        info!(
            "批次开始: {} 条 (缺译 {}, 不符 {}), {} 工作者",
            report.selected, report.untranslated, report.mismatched, self.workers
        );

        let total = batch.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let done = Arc::new(AtomicUsize::new(0));
        let progress = Arc::new(progress);
        let mut tasks: JoinSet<TranslationResult<EntryOutcome>> = JoinSet::new();
        let mut touched: Vec<EntryId> = Vec::with_capacity(total);

        for (entry, status, force, module) in batch {
            if self.cancel.load(Ordering::Relaxed) {
                report.not_started += 1;
                continue;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| TranslationError::Internal(format!("信号量已关闭: {}", e)))?;
            if self.cancel.load(Ordering::Relaxed) {
                drop(permit);
                report.not_started += 1;
                continue;
            }

            {
                let entry = entry.read().unwrap_or_else(|e| e.into_inner());
                touched.push(entry.id);
            }
            let translator = self.translator.clone();
            let done = done.clone();
            let progress = progress.clone();
            tasks.spawn(async move {
                let outcome = translator
                    .auto_translate_entry(&entry, &status, force, module.as_deref())
                    .await;
                drop(permit);
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress(finished, total);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(EntryOutcome::Translated)) => report.translated += 1,
                Ok(Ok(EntryOutcome::Skipped)) => report.skipped += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!("条目翻译失败: {}", e);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("工作者异常退出: {}", e);
                }
            }
        }

        // 写过的条目作废状态缓存, 下一轮分析重新检测
        self.analyzer.invalidate(&touched);
        if let Err(e) = self.translator.cache().flush() {
            warn!("批次结束时缓存落盘失败: {}", e);
        }

        report.cancelled = self.cancel.load(Ordering::Relaxed);
        info!(
            "批次结束: 已译 {} 跳过 {} 失败 {} 未开始 {}",
            report.translated, report.skipped, report.failed, report.not_started
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Entry;
    use crate::error::TranslationResult as TrResult;
    use crate::language::detect::{Classifier, LanguageModel};
    use crate::translator::backend::{BackendFuture, TranslationBackend};
    use crate::translator::TranslationCache;

    /// 英法分界的测试模型
    struct EnFrModel;

    impl LanguageModel for EnFrModel {
        fn confidence_values(&self, text: &str) -> TrResult<Vec<(String, f64)>> {
            let fr = text.chars().any(|c| "éèêàç".contains(c))
                || text.to_lowercase().contains("facture");
            Ok(vec![
                ("en".to_string(), if fr { 0.05 } else { 0.9 }),
                ("fr".to_string(), if fr { 0.9 } else { 0.05 }),
            ])
        }
    }

    /// 回显后端：译文 = "[msgid]"，并留存收到的提示词
    #[derive(Default)]
    struct EchoBackend {
        prompts: std::sync::Mutex<Vec<String>>,
    }

    impl TranslationBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        fn generate<'a>(&'a self, prompt: &'a str) -> BackendFuture<'a> {
            Box::pin(async move {
                self.prompts.lock().unwrap().push(prompt.to_string());
                let text = prompt
                    .lines()
                    .find_map(|l| l.strip_prefix("Text: "))
                    .unwrap_or("");
                Ok(format!("[{}]", text))
            })
        }
    }

    fn orchestrator() -> Orchestrator {
        orchestrator_with_backend(Arc::new(EchoBackend::default()))
    }

    fn orchestrator_with_backend(backend: Arc<EchoBackend>) -> Orchestrator {
        let translator = Arc::new(Translator::new(
            backend,
            Arc::new(TranslationCache::in_memory()),
        ));
        translator.configure_languages("en", "fr");
        let analyzer = Arc::new(StatusAnalyzer::new(Arc::new(Classifier::new(Arc::new(
            EnFrModel,
        )))));
        Orchestrator::new(translator, analyzer).with_workers(4)
    }

    fn catalog() -> Vec<SharedEntry> {
        let mut entries = Vec::new();
        // 5 条缺译
        for i in 0..5 {
            entries.push(Entry::new(&format!("New order {}", i), "").shared());
        }
        // 3 条译文仍是英文 (语言不符)
        for i in 0..3 {
            entries.push(
                Entry::new(&format!("Invoice {}", i), &format!("Open invoice {}", i)).shared(),
            );
        }
        // 2 条健康的法语译文
        entries.push(Entry::new("Invoice", "Facture numéro un").shared());
        entries.push(Entry::new("Order", "Commande validée").shared());
        entries
    }

    #[tokio::test]
    async fn test_keep_policy_only_translates_missing() {
        let orchestrator = orchestrator();
        let entries = catalog();
        let report = orchestrator
            .run(&entries, None, &FixedPolicy(MismatchPolicy::Keep), |_, _| {})
            .await
            .unwrap();

        assert_eq!(report.selected, 5);
        assert_eq!(report.untranslated, 5);
        assert_eq!(report.mismatched, 0);
        assert_eq!(report.translated, 5);
        assert!(report.is_balanced());
        assert!(!report.cancelled);

        // 不符条目原样保留
        assert_eq!(entries[5].read().unwrap().msgstr, "Open invoice 0");
        // 缺译条目已写入
        assert_eq!(entries[0].read().unwrap().msgstr, "[New order 0]");
    }

    #[tokio::test]
    async fn test_normalize_policy_includes_mismatched() {
        let orchestrator = orchestrator();
        let entries = catalog();
        let report = orchestrator
            .run(&entries, None, &FixedPolicy(MismatchPolicy::Normalize), |_, _| {})
            .await
            .unwrap();

        assert_eq!(report.selected, 8);
        assert_eq!(report.untranslated, 5);
        assert_eq!(report.mismatched, 3);
        assert_eq!(report.translated, 8);
        assert!(report.is_balanced());

        // 不符条目被规范化重译
        assert_eq!(entries[5].read().unwrap().msgstr, "[Invoice 0]");
    }

    #[tokio::test]
    async fn test_cancel_policy_aborts_batch() {
        let orchestrator = orchestrator();
        let entries = catalog();
        let report = orchestrator
            .run(&entries, None, &FixedPolicy(MismatchPolicy::Cancel), |_, _| {})
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.selected, 0);
        // 什么都没动
        assert_eq!(entries[0].read().unwrap().msgstr, "");
    }

    #[tokio::test]
    async fn test_progress_reaches_total() {
        let orchestrator = orchestrator();
        let entries = catalog();
        let max_seen = Arc::new(AtomicUsize::new(0));
        let max_clone = max_seen.clone();
        let report = orchestrator
            .run(&entries, None, &FixedPolicy(MismatchPolicy::Keep), move |done, total| {
                assert!(done <= total);
                max_clone.fetch_max(done, Ordering::Relaxed);
            })
            .await
            .unwrap();
        assert_eq!(max_seen.load(Ordering::Relaxed), report.selected);
    }

    #[tokio::test]
    async fn test_provenance_module_reaches_prompt() {
        let backend = Arc::new(EchoBackend::default());
        let orchestrator = orchestrator_with_backend(backend.clone());

        let mut provenance = ProvenanceIndex::new();
        provenance.index("New order", "addons/sale/i18n/fr.po", None);

        let entries = vec![
            Entry::new("New order", "").shared(),
            // 出处未知的条目不带模块上下文
            Entry::new("Unknown text", "").shared(),
        ];
        let report = orchestrator
            .run(
                &entries,
                Some(&provenance),
                &FixedPolicy(MismatchPolicy::Keep),
                |_, _| {},
            )
            .await
            .unwrap();
        assert_eq!(report.translated, 2);

        let prompts = backend.prompts.lock().unwrap().clone();
        let with_module: Vec<_> = prompts
            .iter()
            .filter(|p| p.contains("belongs to the 'sale' module"))
            .collect();
        assert_eq!(with_module.len(), 1);
        assert!(with_module[0].contains("Text: New order"));
    }

    #[tokio::test]
    async fn test_healthy_catalog_is_noop() {
        let orchestrator = orchestrator();
        let entries = vec![
            Entry::new("Invoice", "Facture numéro un").shared(),
            Entry::new("Order", "Commande validée").shared(),
        ];
        let report = orchestrator
            .run(&entries, None, &FixedPolicy(MismatchPolicy::Normalize), |_, _| {})
            .await
            .unwrap();
        assert_eq!(report.selected, 0);
        assert!(report.is_balanced());
    }
}
