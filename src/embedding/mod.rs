//! 임베딩 모듈 - Ollama 임베딩 API를 통한 텍스트 벡터화
//!
//! 텍스트를 고정 차원 벡터로 변환하는 프로바이더입니다.
//! 검색 저장소는 이 모듈을 외부 기능으로 취급하며,
//! 같은 모델 버전에 대해 결정적(deterministic)이라고 가정합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OllamaEmbedding::new(&RetrievalConfig::from_env()?)?;
//! let embedding = embedder.embed("How do I get a refund?").await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{parse_host, RetrievalConfig};
use crate::error::{Result, RetrievalError};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
/// 구현체는 동시 호출에 안전해야 합니다 (재진입 가능하거나 내부에서 직렬화).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 배치 임베딩 (입력 순서 유지, 텍스트당 벡터 하나)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// 단일 텍스트 임베딩 (기본 구현: 크기 1 배치)
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RetrievalError::EmbedderUnavailable("empty embedding response".into()))
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 모델 이름
    fn name(&self) -> &str;
}

/// 프로바이더 응답 검증
///
/// 입력 개수만큼 벡터가 왔는지, 모든 벡터가 기대 차원인지 확인합니다.
pub fn check_embeddings(
    expected_count: usize,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected_count {
        return Err(RetrievalError::EmbedderUnavailable(format!(
            "expected {} embeddings, got {}",
            expected_count,
            vectors.len()
        )));
    }

    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(RetrievalError::DimensionMismatch {
            expected: dimension,
            got: bad.len(),
        });
    }

    Ok(vectors)
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// 연결 실패 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 2;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 500;

/// Ollama 임베딩 구현체
///
/// ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-embeddings
#[derive(Debug)]
pub struct OllamaEmbedding {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    dimension: usize,
    max_retries: u32,
}

impl OllamaEmbedding {
    /// 설정으로 Ollama 임베딩 인스턴스 생성
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        let mut host = parse_host(&config.ollama_host)
            .map_err(|e| RetrievalError::EmbedderUnavailable(e.to_string()))?;
        // 프록시 경로 뒤에 붙도록 디렉토리 형태로 맞춤
        if !host.path().ends_with('/') {
            let path = format!("{}/", host.path());
            host.set_path(&path);
        }
        let endpoint = host
            .join("api/embed")
            .map_err(|e| RetrievalError::EmbedderUnavailable(e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                RetrievalError::EmbedderUnavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint,
            model: config.embed_model.clone(),
            dimension: config.embed_dimension,
            max_retries: MAX_RETRIES,
        })
    }

    /// 연결 실패 재시도 횟수 지정
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 요청 엔드포인트
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Ollama API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Ollama API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama API 에러 응답
#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        // 연결 실패만 재시도 (서버 응답 에러는 즉시 실패)
        let mut attempt = 0;
        let response = loop {
            match self
                .client
                .post(self.endpoint.clone())
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => break resp,
                Err(e) if attempt < self.max_retries => {
                    let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                    tracing::warn!(
                        "Embedding request failed, retrying in {:?} (attempt {}/{}): {}",
                        backoff,
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(RetrievalError::EmbedderUnavailable(format!(
                        "Failed to reach {}: {}",
                        self.endpoint, e
                    )));
                }
            }
        };

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            RetrievalError::EmbedderUnavailable(format!("Failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<OllamaError>(&body) {
                return Err(RetrievalError::EmbedderUnavailable(format!(
                    "Ollama error ({}): {}",
                    status, error.error
                )));
            }
            return Err(RetrievalError::EmbedderUnavailable(format!(
                "Ollama error ({}): {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
            RetrievalError::EmbedderUnavailable(format!("Failed to parse embedding response: {}", e))
        })?;

        tracing::debug!("Embedded {} texts with {}", texts.len(), self.model);
        check_embeddings(texts.len(), self.dimension, parsed.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(config: &RetrievalConfig) -> Result<OllamaEmbedding> {
    let embedder = OllamaEmbedding::new(config)?;
    tracing::info!(
        "Using Ollama embedding {} at {} (dimension: {})",
        embedder.name(),
        embedder.endpoint(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Test Support
// ============================================================================

/// 결정적 키워드 임베딩 (테스트용)
///
/// 어휘 단어마다 축 하나를 배정하고 등장 횟수를 센 뒤 L2 정규화합니다.
/// 어휘에 없는 단어는 무시합니다.
#[cfg(test)]
pub(crate) struct KeywordEmbedding {
    vocabulary: Vec<String>,
}

#[cfg(test)]
impl KeywordEmbedding {
    pub(crate) fn new(vocabulary: &[&str]) -> Self {
        Self {
            vocabulary: vocabulary.iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.vocabulary.len()];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            if let Some(axis) = self.vocabulary.iter().position(|v| *v == word) {
                vector[axis] += 1.0;
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[cfg(test)]
#[async_trait]
impl EmbeddingProvider for KeywordEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    fn name(&self) -> &str {
        "keyword-test"
    }
}

/// 항상 실패하는 임베딩 (테스트용)
#[cfg(test)]
pub(crate) struct FailingEmbedding;

#[cfg(test)]
#[async_trait]
impl EmbeddingProvider for FailingEmbedding {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RetrievalError::EmbedderUnavailable("model not loadable".into()))
    }

    fn dimension(&self) -> usize {
        3
    }

    fn name(&self) -> &str {
        "failing-test"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_embeddings_count_mismatch() {
        let result = check_embeddings(2, 3, vec![vec![0.0; 3]]);
        assert!(matches!(result, Err(RetrievalError::EmbedderUnavailable(_))));
    }

    #[test]
    fn test_check_embeddings_dimension_mismatch() {
        let result = check_embeddings(2, 3, vec![vec![0.0; 3], vec![0.0; 4]]);
        assert!(matches!(
            result,
            Err(RetrievalError::DimensionMismatch {
                expected: 3,
                got: 4
            })
        ));
    }

    #[test]
    fn test_endpoint_from_config() {
        let config = RetrievalConfig {
            ollama_host: "http://localhost:11434".to_string(),
            ..Default::default()
        };
        let embedder = OllamaEmbedding::new(&config).unwrap();
        assert_eq!(embedder.endpoint().as_str(), "http://localhost:11434/api/embed");
        assert_eq!(embedder.name(), "all-minilm");
        assert_eq!(embedder.dimension(), 384);

        let proxied = RetrievalConfig {
            ollama_host: "https://gateway.example.com/ollama/".to_string(),
            ..Default::default()
        };
        let embedder = OllamaEmbedding::new(&proxied).unwrap();
        assert_eq!(
            embedder.endpoint().as_str(),
            "https://gateway.example.com/ollama/api/embed"
        );
    }

    #[test]
    fn test_request_serialization() {
        let input = vec!["a".to_string(), "b".to_string()];
        let request = EmbedRequest {
            model: "all-minilm",
            input: &input,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"model":"all-minilm","input":["a","b"]}"#);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"model":"all-minilm","embeddings":[[0.1,0.2],[0.3,0.4]]}"#;
        let parsed: EmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.embeddings.len(), 2);
        assert_eq!(parsed.embeddings[1], vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_embedder_unavailable() {
        let config = RetrievalConfig {
            ollama_host: "http://127.0.0.1:9".to_string(),
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let embedder = OllamaEmbedding::new(&config).unwrap().with_max_retries(0);

        let result = embedder.embed("hello").await;
        assert!(matches!(result, Err(RetrievalError::EmbedderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let config = RetrievalConfig {
            ollama_host: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let embedder = OllamaEmbedding::new(&config).unwrap();
        let vectors = embedder.embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn test_keyword_embedding_normalized() {
        let embedder = KeywordEmbedding::new(&["refund", "artist"]);
        let v = embedder.embed("Refund refund artist").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!(v[0] > v[1]);

        let zero = embedder.embed("nothing known").await.unwrap();
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
