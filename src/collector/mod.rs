//! 문서 로더 모듈
//!
//! 지식베이스 소스 파일을 지정된 순서로 읽어 줄 단위 문서로 나눕니다.
//!
//! 모든 파일 내용을 `\n`으로 연결한 뒤 `\n` 기준으로 분할합니다.
//! 빈 줄도 문서가 되며, 필터링/중복 제거/트림을 하지 않습니다.
//! 빈 줄을 걸러내면 문서 ID가 바뀌므로 기존 인덱스와 호환되지 않습니다.

use std::path::{Path, PathBuf};

use crate::error::{Result, RetrievalError};
use crate::knowledge::Corpus;

// ============================================================================
// Document Loader
// ============================================================================

/// 문서 로더
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    sources: Vec<PathBuf>,
}

impl DocumentLoader {
    /// 소스 파일 목록으로 로더 생성 (순서 유지)
    pub fn new(sources: Vec<PathBuf>) -> Self {
        Self { sources }
    }

    /// 소스 파일 목록
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// 모든 소스를 읽어 Corpus 생성
    ///
    /// 하나라도 읽지 못하면 `SourceUnreadable`로 전체 로드가 중단됩니다.
    pub fn load(&self) -> Result<Corpus> {
        let mut texts = Vec::with_capacity(self.sources.len());

        for path in &self.sources {
            let text = read_source(path)?;
            tracing::debug!("Read {:?} ({} bytes)", path, text.len());
            texts.push(text);
        }

        let corpus = split_documents(&texts);
        tracing::info!(
            "Loaded {} documents from {} sources",
            corpus.len(),
            self.sources.len()
        );

        Ok(corpus)
    }
}

/// 소스 파일 전체 읽기 (UTF-8, 줄바꿈 정규화)
pub fn read_source(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| RetrievalError::SourceUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let text = String::from_utf8(bytes).map_err(|e| RetrievalError::SourceUnreadable {
        path: path.to_path_buf(),
        reason: format!("invalid UTF-8: {}", e.utf8_error()),
    })?;

    Ok(normalize_newlines(&text))
}

/// `\r\n`과 단독 `\r`을 `\n`으로 변환 (텍스트 모드 읽기와 동일)
fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// 소스 텍스트를 연결 후 줄 단위로 분할
pub fn split_documents(texts: &[String]) -> Corpus {
    let joined = texts.join("\n");
    Corpus::from_texts(joined.split('\n'))
}

// ============================================================================
// Statistics
// ============================================================================

/// 로드 통계
#[derive(Debug, Default)]
pub struct LoadStats {
    pub total_documents: usize,
    pub blank_documents: usize,
    pub total_bytes: usize,
}

impl LoadStats {
    /// Corpus에서 통계 계산
    pub fn from_corpus(corpus: &Corpus) -> Self {
        let mut stats = Self::default();

        for doc in corpus.iter() {
            stats.total_documents += 1;
            stats.total_bytes += doc.text.len();
            if doc.text.trim().is_empty() {
                stats.blank_documents += 1;
            }
        }

        stats
    }
}

// ============================================================================
// Tests
// ============================================================================
