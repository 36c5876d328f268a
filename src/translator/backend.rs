//! 翻译后端
//!
//! 引擎通过 [`TranslationBackend`] 调用大模型：输入完整提示词，
//! 输出模型回复的原始文本。内置 Gemini 实现（`gemini` 特性），
//! 测试里用脚本化桩替换。

use std::future::Future;
use std::pin::Pin;

use crate::error::TranslationResult;

pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = TranslationResult<String>> + Send + 'a>>;

/// 大模型文本生成边界
pub trait TranslationBackend: Send + Sync {
    /// 后端名称（日志用）
    fn name(&self) -> &str;

    /// 对提示词生成一条回复
    fn generate<'a>(&'a self, prompt: &'a str) -> BackendFuture<'a>;
}

#[cfg(feature = "gemini")]
pub use gemini::GeminiBackend;

#[cfg(feature = "gemini")]
mod gemini {
    use serde::{Deserialize, Serialize};
    use tracing::debug;

    use super::{BackendFuture, TranslationBackend};
    use crate::error::TranslationError;

    const DEFAULT_MODEL: &str = "gemini-1.5-flash";
    const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

    /// Google Gemini generateContent 后端
    pub struct GeminiBackend {
        client: reqwest::Client,
        api_key: String,
        model: String,
    }

    #[derive(Serialize)]
    struct GenerateRequest<'a> {
        contents: Vec<Content<'a>>,
        #[serde(rename = "generationConfig")]
        generation_config: GenerationConfig,
    }

    #[derive(Serialize)]
    struct Content<'a> {
        parts: Vec<Part<'a>>,
    }

    #[derive(Serialize)]
    struct Part<'a> {
        text: &'a str,
    }

    #[derive(Serialize)]
    struct GenerationConfig {
        temperature: f64,
        #[serde(rename = "maxOutputTokens")]
        max_output_tokens: u32,
    }

    #[derive(Deserialize)]
    struct GenerateResponse {
        candidates: Option<Vec<Candidate>>,
    }

    #[derive(Deserialize)]
    struct Candidate {
        content: Option<ReplyContent>,
    }

    #[derive(Deserialize)]
    struct ReplyContent {
        parts: Option<Vec<ReplyPart>>,
    }

    #[derive(Deserialize)]
    struct ReplyPart {
        text: Option<String>,
    }

    impl GeminiBackend {
        pub fn new(api_key: impl Into<String>) -> Self {
            Self {
                client: reqwest::Client::new(),
                api_key: api_key.into(),
                model: DEFAULT_MODEL.to_string(),
            }
        }

        pub fn with_model(mut self, model: impl Into<String>) -> Self {
            self.model = model.into();
            self
        }

        async fn call(&self, prompt: &str) -> crate::error::TranslationResult<String> {
            let url = format!(
                "{}/{}:generateContent?key={}",
                API_BASE, self.model, self.api_key
            );
            let request = GenerateRequest {
                contents: vec![Content {
                    parts: vec![Part { text: prompt }],
                }],
                // 翻译要稳定输出，温度压到最低
                generation_config: GenerationConfig {
                    temperature: 0.1,
                    max_output_tokens: 1024,
                },
            };

            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| TranslationError::Backend(format!("请求失败: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TranslationError::Backend(format!(
                    "Gemini 返回 {}: {}",
                    status,
                    body.chars().take(200).collect::<String>()
                )));
            }

            let parsed: GenerateResponse = response
                .json()
                .await
                .map_err(|e| TranslationError::Backend(format!("响应解析失败: {}", e)))?;

            let text = parsed
                .candidates
                .and_then(|mut c| c.drain(..).next())
                .and_then(|c| c.content)
                .and_then(|c| c.parts)
                .and_then(|mut p| p.drain(..).next())
                .and_then(|p| p.text)
                .ok_or_else(|| TranslationError::Backend("响应中没有候选文本".to_string()))?;

            debug!("Gemini 回复 {} 字符", text.len());
            Ok(text)
        }
    }

    impl TranslationBackend for GeminiBackend {
        fn name(&self) -> &str {
            "gemini"
        }

        fn generate<'a>(&'a self, prompt: &'a str) -> BackendFuture<'a> {
            Box::pin(self.call(prompt))
        }
    }
}
