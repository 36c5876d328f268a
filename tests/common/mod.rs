// 集成测试公共模块
//
// 提供 PO 文件构造、脚本化后端和语言模型桩

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use po_translator::error::TranslationResult;
use po_translator::language::detect::LanguageModel;
use po_translator::language::{Classifier, StatusAnalyzer};
use po_translator::translator::backend::{BackendFuture, TranslationBackend};
use po_translator::translator::{TranslationCache, Translator};

/// 在临时目录里写出一个 PO 文件
pub fn write_po(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).expect("写入测试 PO 文件失败");
    path
}

/// 构造标准的测试 PO 内容
pub fn po_body(entries: &[(&str, &str)]) -> String {
    let mut body = String::from(
        "msgid \"\"\nmsgstr \"\"\n\"Project-Id-Version: Test 1.0\\n\"\n\"Language: fr\\n\"\n\n",
    );
    for (msgid, msgstr) in entries {
        body.push_str(&format!("msgid \"{}\"\nmsgstr \"{}\"\n\n", msgid, msgstr));
    }
    body
}

/// 回显后端：译文 = "[源文本]"，并记录每次调用时刻
pub struct EchoBackend {
    pub timestamps: Mutex<Vec<Instant>>,
}

impl EchoBackend {
    pub fn new() -> Self {
        Self {
            timestamps: Mutex::new(Vec::new()),
        }
    }
}

impl TranslationBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    fn generate<'a>(&'a self, prompt: &'a str) -> BackendFuture<'a> {
        Box::pin(async move {
            self.timestamps.lock().unwrap().push(Instant::now());
            let text = prompt
                .lines()
                .find_map(|l| l.strip_prefix("Text: "))
                .unwrap_or("");
            Ok(format!("[{}]", text))
        })
    }
}

/// 英/法分界的语言模型桩：带重音符或常见法语词 → fr，否则 en
pub struct EnFrModel;

impl LanguageModel for EnFrModel {
    fn confidence_values(&self, text: &str) -> TranslationResult<Vec<(String, f64)>> {
        let lowered = text.to_lowercase();
        let french = lowered.chars().any(|c| "éèêàçû".contains(c))
            || ["facture", "commande", "livraison", "paiement"]
                .iter()
                .any(|w| lowered.contains(w));
        Ok(vec![
            ("en".to_string(), if french { 0.05 } else { 0.9 }),
            ("fr".to_string(), if french { 0.9 } else { 0.05 }),
        ])
    }
}

/// 固定返回值的语言模型桩
pub struct FixedModel(pub Vec<(String, f64)>);

impl LanguageModel for FixedModel {
    fn confidence_values(&self, _text: &str) -> TranslationResult<Vec<(String, f64)>> {
        Ok(self.0.clone())
    }
}

pub fn analyzer() -> Arc<StatusAnalyzer> {
    Arc::new(StatusAnalyzer::new(Arc::new(Classifier::new(Arc::new(
        EnFrModel,
    )))))
}

pub fn echo_translator() -> (Arc<Translator>, Arc<EchoBackend>) {
    let backend = Arc::new(EchoBackend::new());
    let translator = Arc::new(Translator::new(
        backend.clone(),
        Arc::new(TranslationCache::in_memory()),
    ));
    translator.configure_languages("en", "fr");
    (translator, backend)
}
