//! 统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。翻译路径上的错误从不穿透到
//! 批次边界之外：单个条目最坏的结果是保持未翻译状态。

use thiserror::Error;

/// 翻译管线错误类型
#[derive(Error, Debug)]
pub enum TranslationError {
    /// 文件读写错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// 目录文件解析错误
    #[error("解析错误 ({path}:{line}): {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 语言识别模型不可用
    #[error("语言识别不可用: {0}")]
    ClassifierUnavailable(String),

    /// 翻译后端调用失败
    #[error("翻译后端错误: {0}")]
    Backend(String),

    /// 占位符校验失败
    #[error("翻译校验失败: {0}")]
    Validation(String),

    /// 缓存读写错误
    #[error("缓存错误: {0}")]
    Cache(String),

    /// 批量操作被用户取消
    #[error("操作已取消")]
    Cancelled,

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::Backend(_) => true,
            TranslationError::Validation(_) => true,
            TranslationError::Cache(_) => true,
            TranslationError::Io(_) => false,
            TranslationError::Parse { .. } => false,
            TranslationError::Config(_) => false,
            TranslationError::ClassifierUnavailable(_) => false,
            TranslationError::Cancelled => false,
            TranslationError::Serialization(_) => false,
            TranslationError::Internal(_) => false,
        }
    }

    /// 创建解析错误
    pub fn parse<P: Into<String>, M: Into<String>>(path: P, line: usize, message: M) -> Self {
        TranslationError::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::Serialization(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::Config(format!("TOML解析错误: {}", error))
    }
}

impl From<toml::ser::Error> for TranslationError {
    fn from(error: toml::ser::Error) -> Self {
        TranslationError::Serialization(format!("TOML序列化错误: {}", error))
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TranslationError::Backend("超时".into()).is_retryable());
        assert!(TranslationError::Validation("占位符缺失".into()).is_retryable());
        assert!(!TranslationError::Cancelled.is_retryable());
        assert!(!TranslationError::Config("坏配置".into()).is_retryable());
    }

    #[test]
    fn test_parse_error_message() {
        let err = TranslationError::parse("fr.po", 12, "未终止的字符串");
        assert!(err.to_string().contains("fr.po:12"));
    }
}
