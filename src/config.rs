//! 应用配置
//!
//! TOML 文件持久化的运行配置，路径支持 `~` 展开。缺失文件时
//! 使用默认值，保证首次运行开箱即用。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{TranslationError, TranslationResult};

/// 默认配置文件位置
pub const DEFAULT_CONFIG_PATH: &str = "~/.po-translator/config.toml";
/// 默认翻译缓存位置
pub const DEFAULT_CACHE_PATH: &str = "~/.po-translator/translation_cache.json";

/// 运行配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// 大模型 API 密钥，空串视为未配置
    pub api_key: String,
    /// 后端模型名
    pub model: String,
    /// 期望的源语言
    pub source_lang: String,
    /// 翻译目标语言
    pub target_lang: String,
    /// 是否允许按检测结果自动切换源语言
    pub auto_detect: bool,
    /// 翻译缓存文件路径
    pub cache_path: String,
    /// 批量翻译并发工作者数
    pub workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-1.5-flash".to_string(),
            source_lang: "en".to_string(),
            target_lang: "fr".to_string(),
            auto_detect: true,
            cache_path: DEFAULT_CACHE_PATH.to_string(),
            workers: 4,
        }
    }
}

impl AppConfig {
    /// 从 TOML 文件加载，文件不存在时返回默认配置
    pub fn load(path: impl AsRef<Path>) -> TranslationResult<Self> {
        let path = expand(path.as_ref());
        if !path.exists() {
            debug!("配置文件不存在, 使用默认值: {}", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        info!("已加载配置: {}", path.display());
        Ok(config)
    }

    /// 保存为 TOML，父目录自动创建
    pub fn save(&self, path: impl AsRef<Path>) -> TranslationResult<()> {
        self.validate()?;
        let path = expand(path.as_ref());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let toml = toml::to_string_pretty(self)?;
        std::fs::write(&path, toml)?;
        info!("配置已保存: {}", path.display());
        Ok(())
    }

    fn validate(&self) -> TranslationResult<()> {
        if self.source_lang.trim().is_empty() || self.target_lang.trim().is_empty() {
            return Err(TranslationError::Config(
                "源语言和目标语言不能为空".to_string(),
            ));
        }
        if self.source_lang == self.target_lang {
            return Err(TranslationError::Config(format!(
                "源语言和目标语言相同: {}",
                self.source_lang
            )));
        }
        if self.workers == 0 {
            return Err(TranslationError::Config(
                "工作者数必须大于 0".to_string(),
            ));
        }
        Ok(())
    }

    /// 展开后的缓存路径
    pub fn cache_path(&self) -> PathBuf {
        expand(Path::new(&self.cache_path))
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(!config.has_api_key());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");
        let config = AppConfig {
            api_key: "k-123".to_string(),
            target_lang: "es".to_string(),
            workers: 8,
            ..AppConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "target_lang = \"de\"\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.target_lang, "de");
        assert_eq!(config.source_lang, "en");
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn test_same_language_pair_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "source_lang = \"fr\"\ntarget_lang = \"fr\"\n").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(TranslationError::Config(_))
        ));
    }

    #[test]
    fn test_tilde_expansion() {
        let config = AppConfig::default();
        let cache = config.cache_path();
        assert!(!cache.to_string_lossy().contains('~'));
    }
}
