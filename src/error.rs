//! 에러 타입 - 검색 저장소 공통 에러
//!
//! 수집(ingest), 로드(load), 질의(query) 단계에서 발생하는 실패를
//! 타입으로 구분합니다. 호출자가 치명적 실패인지 판단합니다.

use std::path::PathBuf;

use thiserror::Error;

/// 검색 저장소 에러
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// 지식베이스 소스 파일을 읽을 수 없음 (수집 중단, 아무것도 기록하지 않음)
    #[error("Source unreadable: {path:?}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    /// 임베딩 모델 로드 또는 호출 실패
    #[error("Embedder unavailable: {0}")]
    EmbedderUnavailable(String),

    /// 벡터 길이 불일치 (오래된 인덱스 또는 다른 모델)
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// 저장된 아티팩트가 없거나 손상됨
    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    /// 아티팩트 기록 중 I/O 실패
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RetrievalError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::IndexCorrupt(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
