//! LibreTranslate 翻译网关
//!
//! 每条消息只尝试一次，不做内联重试：重试会阻塞消息投递，
//! 设计取舍偏向低延迟而非翻译完整度。调用带有界超时，
//! 单次外部调用卡死不会堆积无界的在途分发。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::TranslationSettings;
use crate::domain::repository::TranslationGateway;
use crate::error::{ChatError, ChatResult};

/// LibreTranslate 兼容服务的 HTTP 网关
pub struct LibreTranslateGateway {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

impl LibreTranslateGateway {
    pub fn new(settings: &TranslationSettings) -> ChatResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|err| ChatError::Configuration(format!("build http client: {}", err)))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn translate_url(&self) -> String {
        format!("{}/translate", self.endpoint)
    }

    fn languages_url(&self) -> String {
        format!("{}/languages", self.endpoint)
    }

    /// 启动探测：只记录可达性，不影响服务启动
    pub async fn probe(&self) {
        match self.client.get(self.languages_url()).send().await {
            Ok(response) if response.status().is_success() => {
                info!(endpoint = %self.endpoint, "translation service is up and reachable");
            }
            Ok(response) => {
                warn!(
                    endpoint = %self.endpoint,
                    status = %response.status(),
                    "translation service responded with unexpected status"
                );
            }
            Err(err) => {
                warn!(
                    endpoint = %self.endpoint,
                    error = %err,
                    "cannot connect to translation service, sends will fall back to original text"
                );
            }
        }
    }
}

#[async_trait]
impl TranslationGateway for LibreTranslateGateway {
    async fn translate(&self, text: &str, source: &str, target: &str) -> ChatResult<String> {
        let response = self
            .client
            .post(self.translate_url())
            .json(&TranslateRequest {
                q: text,
                source,
                target,
                format: "text",
            })
            .send()
            .await
            .map_err(|err| ChatError::TranslationUnavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::TranslationUnavailable(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let body: TranslateResponse = response
            .json()
            .await
            .map_err(|err| ChatError::TranslationUnavailable(format!("malformed response: {}", err)))?;
        Ok(body.translated_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_normalization() {
        let settings = TranslationSettings {
            endpoint: "http://localhost:5001/".to_string(),
            ..TranslationSettings::default()
        };
        let gateway = LibreTranslateGateway::new(&settings).unwrap();
        assert_eq!(gateway.translate_url(), "http://localhost:5001/translate");
        assert_eq!(gateway.languages_url(), "http://localhost:5001/languages");
    }

    #[test]
    fn test_request_wire_shape() {
        let request = TranslateRequest {
            q: "hello",
            source: "en",
            target: "hi",
            format: "text",
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["q"], "hello");
        assert_eq!(value["source"], "en");
        assert_eq!(value["target"], "hi");
        assert_eq!(value["format"], "text");
    }

    #[test]
    fn test_response_parsing() {
        let body: TranslateResponse =
            serde_json::from_str(r#"{"translatedText": "नमस्ते"}"#).unwrap();
        assert_eq!(body.translated_text, "नमस्ते");

        assert!(serde_json::from_str::<TranslateResponse>(r#"{"detected": "en"}"#).is_err());
    }
}
