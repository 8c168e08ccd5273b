//! 설정 모듈
//!
//! 환경변수에서 검색 저장소 설정을 읽습니다.
//! CLI 플래그가 지정되면 환경변수보다 우선합니다.
//!
//! | 환경변수 | 기본값 |
//! |---|---|
//! | `MUSE_RAG_DATA_DIR` | `<로컬 데이터 디렉토리>/.muse-rag/index` |
//! | `OLLAMA_HOST` | `http://127.0.0.1:11434` |
//! | `MUSE_RAG_EMBED_MODEL` | `all-minilm` |
//! | `MUSE_RAG_EMBED_DIM` | `384` |
//! | `MUSE_RAG_BATCH_SIZE` | `32` |
//! | `MUSE_RAG_TIMEOUT_SECS` | `30` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

/// 기본 임베딩 모델 (all-MiniLM-L6-v2)
pub const DEFAULT_EMBED_MODEL: &str = "all-minilm";

/// 기본 임베딩 차원 (all-MiniLM-L6-v2 = 384)
pub const DEFAULT_EMBED_DIMENSION: usize = 384;

/// 기본 Ollama 서버 주소
pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

/// 기본 임베딩 배치 크기
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// 기본 지식베이스 소스 (순서 유지)
pub const DEFAULT_SOURCES: [&str; 3] = [
    "data/platform_kb.txt",
    "data/artist_kb.txt",
    "data/customer_kb.txt",
];

// ============================================================================
// Data Directory
// ============================================================================

/// 인덱스 저장 디렉토리 경로 (로컬 데이터 디렉토리/.muse-rag/index)
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MUSE_RAG_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".muse-rag")
        .join("index")
}

// ============================================================================
// RetrievalConfig
// ============================================================================

/// 검색 저장소 설정
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// 인덱스 저장 위치
    pub data_dir: PathBuf,
    /// 수집 대상 소스 파일 (순서대로 연결)
    pub sources: Vec<PathBuf>,
    /// 임베딩 서버 주소
    pub ollama_host: String,
    /// 임베딩 모델 이름
    pub embed_model: String,
    /// 임베딩 차원
    pub embed_dimension: usize,
    /// 임베딩 배치 크기
    pub batch_size: usize,
    /// 임베딩 요청 타임아웃
    pub request_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            sources: DEFAULT_SOURCES.iter().map(PathBuf::from).collect(),
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            embed_dimension: DEFAULT_EMBED_DIMENSION,
            batch_size: DEFAULT_BATCH_SIZE,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RetrievalConfig {
    /// 환경변수에서 설정 로드 (없는 값은 기본값)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(host) = env_var("OLLAMA_HOST") {
            config.ollama_host = parse_host(&host)?.to_string();
        }

        if let Some(model) = env_var("MUSE_RAG_EMBED_MODEL") {
            config.embed_model = model;
        }

        if let Some(dim) = env_parse::<usize>("MUSE_RAG_EMBED_DIM")? {
            config.embed_dimension = dim;
        }

        if let Some(size) = env_parse::<usize>("MUSE_RAG_BATCH_SIZE")? {
            config.batch_size = size;
        }

        if let Some(secs) = env_parse::<u64>("MUSE_RAG_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.embed_dimension == 0 {
            anyhow::bail!("Embedding dimension must be positive");
        }
        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be positive");
        }
        if self.embed_model.trim().is_empty() {
            anyhow::bail!("Embedding model name must not be empty");
        }
        parse_host(&self.ollama_host)?;
        Ok(())
    }
}

/// 서버 주소 파싱 (스킴이 없으면 http:// 추가)
pub fn parse_host(raw: &str) -> Result<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let url = Url::parse(&with_scheme)
        .with_context(|| format!("Invalid embedding server address: {}", raw))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("Unsupported scheme for embedding server: {}", url.scheme());
    }

    Ok(url)
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_var(name) {
        Some(raw) => {
            let value = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {}", name, raw))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetrievalConfig::default();
        assert_eq!(config.embed_model, "all-minilm");
        assert_eq!(config.embed_dimension, 384);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[0], PathBuf::from("data/platform_kb.txt"));
        assert_eq!(config.sources[2], PathBuf::from("data/customer_kb.txt"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_host() {
        let url = parse_host("localhost:11434").unwrap();
        assert_eq!(url.as_str(), "http://localhost:11434/");

        let url = parse_host("https://embed.example.com/").unwrap();
        assert_eq!(url.scheme(), "https");

        assert!(parse_host("ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = RetrievalConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
