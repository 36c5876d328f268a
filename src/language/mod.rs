//! 语言识别与状态分析
//!
//! - `detect`: 语言分类器，封装不透明的识别模型，带词典覆盖、
//!   容差匹配和上下文投票
//! - `status`: 按条目的语言正确性分析（源/译文是否匹配配置语言）
//!
//! 识别范围固定为产品的 8 个主要语言；提示词用的语言名称表
//! 覆盖更多代码。

pub mod detect;
pub mod status;

pub use detect::{Classifier, LanguageModel, StopwordModel};
pub use status::{LanguageStatus, StatusAnalyzer};

/// 参与识别的主要语言
pub const PRIMARY_LANGUAGES: [&str; 8] = ["en", "fr", "es", "de", "it", "pt", "nl", "ar"];

/// 语言代码 → 英文名称（提示词和日志用）
pub const LANGUAGE_NAMES: [(&str, &str); 15] = [
    ("en", "English"),
    ("fr", "French"),
    ("es", "Spanish"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("nl", "Dutch"),
    ("ar", "Arabic"),
    ("ca", "Catalan"),
    ("ro", "Romanian"),
    ("da", "Danish"),
    ("sv", "Swedish"),
    ("no", "Norwegian"),
    ("fi", "Finnish"),
    ("gl", "Galician"),
];

/// 语言代码是否在名称表内（即可配置为源/目标语言）
pub fn is_supported(code: &str) -> bool {
    LANGUAGE_NAMES.iter().any(|(c, _)| *c == code)
}

pub fn language_name(code: &str) -> &'static str {
    LANGUAGE_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

/// 每语言的无歧义 UI 术语（去音符、小写形式）
///
/// 命中词典的文本跳过模型直接按期望语言判定，保证常见词汇
/// 不受分类器噪声影响。
pub fn ui_terms(lang: &str) -> &'static [&'static str] {
    match lang {
        "en" => &[
            "user", "cancel", "delete", "settings", "supplier", "validate", "customer",
            "invoice", "delivery",
        ],
        "fr" => &[
            "client", "article", "utilisateur", "devis", "facture", "livraison",
            "fournisseur", "partenaire", "annuler", "confirmer", "commande", "creer",
            "modifier", "supprimer", "parametres",
        ],
        "es" => &[
            "cliente", "articulo", "pedido", "entrega", "usuario", "proveedor", "factura",
            "cancelar", "eliminar", "configuracion", "socio", "presupuesto",
        ],
        "pt" => &[
            "cliente", "artigo", "pedido", "fatura", "usuario", "fornecedor", "parceiro",
            "orcamento", "configuracoes", "entrega", "cancelar",
        ],
        "it" => &[
            "cliente", "articolo", "utente", "annulla", "consegna", "fornitore", "fattura",
            "impostazioni",
        ],
        "de" => &[
            "artikel", "kunde", "benutzer", "rechnung", "lieferung", "lieferant",
            "einstellungen", "abbrechen",
        ],
        "nl" => &[
            "artikel", "klant", "gebruiker", "instellingen", "levering", "leverancier",
            "factuur", "annuleren",
        ],
        _ => &[],
    }
}

/// 期望语言的容差带宽
///
/// 相近语言（西/葡）放宽，差异大的语言收紧。
pub fn tolerance(lang: &str) -> f64 {
    match lang {
        "en" | "fr" | "ar" => 0.05,
        "es" | "pt" => 0.15,
        "it" | "de" | "nl" => 0.10,
        _ => 0.10,
    }
}
