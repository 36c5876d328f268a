//! 语言分类器
//!
//! 把自由文本映射到支持语言集合里的最佳猜测加置信度，针对通用
//! 检测器表现不佳的短 UI 字符串做了调优：
//!
//! 1. 按词数自适应的置信度阈值（越短越宽松）
//! 2. 期望语言提示下的词典覆盖、容差匹配和近似决胜
//! 3. 利用邻近条目做上下文投票的增强检测
//!
//! 识别模型是注入的能力对象而不是进程级单例，测试可以替换。

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::debug;

use crate::error::TranslationResult;
use crate::language::{tolerance, ui_terms, PRIMARY_LANGUAGES};

/// 不透明的语言识别模型边界
///
/// 对固定的语言集合返回 (语言代码, 置信度) 序列，同一输入必须
/// 返回相同结果。
pub trait LanguageModel: Send + Sync {
    fn confidence_values(&self, text: &str) -> TranslationResult<Vec<(String, f64)>>;
}

/// 检测结果
pub type Detection = (Option<String>, f64);

const MEMO_CAPACITY: usize = 4096;

/// 语言分类器
pub struct Classifier {
    model: Arc<dyn LanguageModel>,
    /// 按 (文本, 阈值, 期望语言) 记忆的结果，纯函数可无限缓存
    memo: Mutex<LruCache<[u8; 32], Detection>>,
}

impl Classifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            memo: Mutex::new(LruCache::new(
                NonZeroUsize::new(MEMO_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// 检测单条文本
    ///
    /// 模型不可用或报错时退化为 (None, 0.0)，从不向调用方抛错。
    pub fn detect(&self, text: &str, expected_language: Option<&str>) -> Detection {
        if text.trim().is_empty() {
            return (None, 0.0);
        }

        let text_clean = text.replace('\n', " ");
        let text_clean = text_clean.trim();
        let word_count = text_clean.split_whitespace().count();
        let adaptive_threshold = if word_count <= 2 {
            0.25
        } else if word_count <= 5 {
            0.40
        } else {
            0.50
        };

        let memo_key = memo_key(text_clean, adaptive_threshold, expected_language);
        if let Ok(mut memo) = self.memo.lock() {
            if let Some(cached) = memo.get(&memo_key) {
                return cached.clone();
            }
        }

        let result = self.detect_uncached(text_clean, word_count, adaptive_threshold, expected_language);
        if let Ok(mut memo) = self.memo.lock() {
            memo.put(memo_key, result.clone());
        }
        result
    }

    fn detect_uncached(
        &self,
        text_clean: &str,
        word_count: usize,
        adaptive_threshold: f64,
        expected_language: Option<&str>,
    ) -> Detection {
        // 词典覆盖优先于模型：已知词汇的判定是确定性的
        if let Some(expected) = expected_language {
            if PRIMARY_LANGUAGES.contains(&expected) {
                let normalized = fold_diacritics(text_clean).to_lowercase();
                if ui_terms(expected).contains(&normalized.as_str()) {
                    debug!("词典命中: {} ← '{}'", expected, text_clean);
                    return (Some(expected.to_string()), 1.0);
                }
            }
        }

        let candidates = match self.model.confidence_values(text_clean) {
            Ok(values) => values,
            Err(e) => {
                debug!("识别模型不可用: {}", e);
                return (None, 0.0);
            }
        };

        let mut best: Option<(&str, f64)> = None;
        for (lang, conf) in &candidates {
            if !PRIMARY_LANGUAGES.contains(&lang.as_str()) {
                continue;
            }
            if best.map_or(true, |(_, b)| *conf > b) {
                best = Some((lang.as_str(), *conf));
            }
        }
        let (best_lang, best_conf) = match best {
            Some(found) => found,
            None => return (None, 0.0),
        };

        if let Some(expected) = expected_language {
            if PRIMARY_LANGUAGES.contains(&expected) {
                let expected_conf = candidates
                    .iter()
                    .find(|(lang, _)| lang == expected)
                    .map(|(_, conf)| *conf);
                if let Some(expected_conf) = expected_conf {
                    // 容差匹配：相近语言对给更宽的带宽
                    if (best_conf - expected_conf).abs() <= tolerance(expected) {
                        debug!(
                            "容差命中: {} ({:.3}) 距最佳 {:.3}",
                            expected, expected_conf, best_conf
                        );
                        return (Some(expected.to_string()), expected_conf);
                    }
                    // 近似决胜：期望语言达到最佳的九成即胜出
                    if expected_conf >= best_conf * 0.90 {
                        return (Some(expected.to_string()), expected_conf);
                    }
                }
            }
        }

        // 很短的文本总是给出猜测而不是“未知”
        if best_conf >= adaptive_threshold || word_count <= 3 {
            return (Some(best_lang.to_string()), best_conf);
        }
        (None, 0.0)
    }

    /// 上下文增强检测
    ///
    /// 目录里相邻的短 UI 字符串几乎必然同语言。单独检测已足够
    /// 可信（≥0.85）或没有上下文时直接返回；否则对上下文样本
    /// 投票：一致时按一致强度提升置信度（上限 0.99），主检测很弱
    /// 而上下文很强且不一致时用上下文语言折价覆盖。
    pub fn detect_with_context(
        &self,
        text: &str,
        context_texts: &[String],
        expected_language: Option<&str>,
    ) -> Detection {
        if text.trim().is_empty() {
            return (None, 0.0);
        }

        let (main_lang, main_conf) = self.detect(text, expected_language);
        if main_conf >= 0.85 || context_texts.is_empty() {
            return (main_lang, main_conf);
        }

        let mut votes: Vec<(String, usize, f64)> = Vec::new();
        let mut sampled = 0usize;
        for ctx_text in context_texts {
            if ctx_text.trim().is_empty() {
                continue;
            }
            sampled += 1;
            let (ctx_lang, ctx_conf) = self.detect(ctx_text, expected_language);
            let ctx_lang = match ctx_lang {
                Some(lang) if ctx_conf > 0.3 => lang,
                _ => continue,
            };
            match votes.iter_mut().find(|(lang, _, _)| *lang == ctx_lang) {
                Some(slot) => {
                    slot.1 += 1;
                    slot.2 += ctx_conf;
                }
                None => votes.push((ctx_lang, 1, ctx_conf)),
            }
        }

        let (context_lang, count, conf_sum) = match votes.into_iter().max_by_key(|(_, n, _)| *n) {
            Some(winner) => winner,
            None => return (main_lang, main_conf),
        };
        let context_strength = count as f64 / sampled.max(1) as f64;
        let context_avg_conf = conf_sum / count as f64;

        if main_lang.as_deref() == Some(context_lang.as_str()) {
            let boosted = (main_conf + context_strength * 0.3).min(0.99);
            debug!(
                "上下文确认 {}: {:.3} → {:.3}",
                context_lang, main_conf, boosted
            );
            return (main_lang, boosted);
        }

        if main_conf < 0.5 && context_strength >= 0.6 && context_avg_conf >= 0.5 {
            debug!(
                "上下文 {} 覆盖弱检测 {:?}",
                context_lang, main_lang
            );
            return (
                Some(context_lang),
                (context_avg_conf * 0.9).min(0.85),
            );
        }

        (main_lang, main_conf)
    }
}

fn memo_key(text: &str, threshold: f64, expected: Option<&str>) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(text.as_bytes());
    hasher.update(&threshold.to_le_bytes());
    hasher.update(expected.unwrap_or("").as_bytes());
    *hasher.finalize().as_bytes()
}

/// 去掉常见拉丁音符（词典查找用）
pub fn fold_diacritics(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            'ý' | 'ÿ' => 'y',
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
            'È' | 'É' | 'Ê' | 'Ë' => 'E',
            'Ì' | 'Í' | 'Î' | 'Ï' => 'I',
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'Ù' | 'Ú' | 'Û' | 'Ü' => 'U',
            'Ç' => 'C',
            'Ñ' => 'N',
            other => other,
        })
        .collect()
}

// ============================================================================
// 内置识别模型
// ============================================================================

/// 基于功能词和字符特征的轻量识别模型
///
/// 对 8 个主要语言用小词表加字符标记打分。准确率不及专用模型，
/// 但零依赖、确定性，足够让管线开箱即用；生产环境可以注入
/// 更强的 `LanguageModel` 实现替换它。
pub struct StopwordModel;

impl StopwordModel {
    pub fn new() -> Self {
        Self
    }

    fn wordlist(lang: &str) -> &'static [&'static str] {
        match lang {
            "en" => &[
                "the", "and", "of", "to", "in", "is", "for", "with", "this", "that", "from",
                "you", "your", "order", "invoice", "customer", "date", "amount", "new", "all",
            ],
            "fr" => &[
                "le", "la", "les", "de", "des", "du", "et", "est", "pour", "avec", "une", "un",
                "vous", "votre", "dans", "sur", "pas", "par", "commande", "facture", "date",
                "montant", "nouveau", "tous",
            ],
            "es" => &[
                "el", "la", "los", "las", "de", "del", "y", "es", "para", "con", "una", "un",
                "usted", "su", "en", "por", "pedido", "factura", "fecha", "importe", "nuevo",
                "todos",
            ],
            "de" => &[
                "der", "die", "das", "und", "ist", "für", "mit", "ein", "eine", "sie", "ihre",
                "von", "auf", "nicht", "bestellung", "rechnung", "datum", "betrag", "neu",
                "alle",
            ],
            "it" => &[
                "il", "lo", "la", "gli", "le", "di", "del", "e", "è", "per", "con", "una",
                "un", "voi", "ordine", "fattura", "data", "importo", "nuovo", "tutti",
            ],
            "pt" => &[
                "o", "a", "os", "as", "de", "do", "da", "e", "é", "para", "com", "uma", "um",
                "você", "seu", "em", "pedido", "fatura", "data", "valor", "novo", "todos",
            ],
            "nl" => &[
                "de", "het", "een", "en", "is", "voor", "met", "van", "op", "niet", "uw", "je",
                "bestelling", "factuur", "datum", "bedrag", "nieuw", "alle",
            ],
            _ => &[],
        }
    }

    fn marker_chars(lang: &str) -> &'static [char] {
        match lang {
            "fr" => &['é', 'è', 'ê', 'à', 'ç', 'ù', 'œ'],
            "es" => &['ñ', '¿', '¡', 'á', 'í', 'ó', 'ú'],
            "de" => &['ß', 'ä', 'ö', 'ü'],
            "pt" => &['ã', 'õ', 'ç', 'á', 'ê'],
            "it" => &['à', 'è', 'ì', 'ò', 'ù'],
            _ => &[],
        }
    }
}

impl Default for StopwordModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageModel for StopwordModel {
    fn confidence_values(&self, text: &str) -> TranslationResult<Vec<(String, f64)>> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphabetic() && c != '\'')
            .filter(|t| !t.is_empty())
            .collect();

        let alphabetic = text.chars().filter(|c| c.is_alphabetic()).count();
        let arabic = text
            .chars()
            .filter(|c| ('\u{0600}'..='\u{06FF}').contains(c))
            .count();

        let mut values = Vec::with_capacity(PRIMARY_LANGUAGES.len());
        for lang in PRIMARY_LANGUAGES {
            if lang == "ar" {
                let conf = if alphabetic == 0 {
                    0.0
                } else {
                    arabic as f64 / alphabetic as f64
                };
                values.push((lang.to_string(), conf.min(0.95)));
                continue;
            }

            let wordlist = Self::wordlist(lang);
            let hits = tokens.iter().filter(|t| wordlist.contains(*t)).count();
            let word_score = if tokens.is_empty() {
                0.0
            } else {
                hits as f64 / tokens.len() as f64
            };
            let markers = Self::marker_chars(lang);
            let marker_hits = lowered.chars().filter(|c| markers.contains(c)).count();
            let marker_score = (marker_hits as f64 * 0.15).min(0.3);

            values.push((lang.to_string(), (word_score + marker_score).min(0.95)));
        }
        Ok(values)
    }
}
