//! Corpus - 검색 가능한 문서 목록
//!
//! 문서 ID는 수집 순서의 위치(0부터)와 같습니다.
//! 인덱스의 i번째 벡터가 i번째 문서를 설명합니다.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

// ============================================================================
// Types
// ============================================================================

/// 검색 단위 문서
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// 문서 ID (0-based, 수집 시 부여)
    pub id: usize,
    /// 문서 텍스트
    pub text: String,
}

/// 순서가 있는 문서 목록 (ID는 0부터 연속)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    documents: Vec<Document>,
}

impl Corpus {
    /// 텍스트 목록에서 생성 (위치가 ID가 됨)
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let documents = texts
            .into_iter()
            .enumerate()
            .map(|(id, text)| Document {
                id,
                text: text.into(),
            })
            .collect();

        Self { documents }
    }

    /// 저장된 문서 목록에서 복원
    ///
    /// ID가 0부터 연속이 아니면 `IndexCorrupt`를 반환합니다.
    pub fn from_documents(documents: Vec<Document>) -> Result<Self> {
        if let Some((position, doc)) = documents
            .iter()
            .enumerate()
            .find(|(position, doc)| doc.id != *position)
        {
            return Err(RetrievalError::corrupt(format!(
                "document at position {} has id {}",
                position, doc.id
            )));
        }

        Ok(Self { documents })
    }

    /// ID로 문서 조회
    pub fn get(&self, id: usize) -> Option<&Document> {
        self.documents.get(id)
    }

    /// 문서 텍스트 목록
    pub fn texts(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.text.clone()).collect()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_texts_assigns_positional_ids() {
        let corpus = Corpus::from_texts(["a", "", "c"]);
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.get(1).map(|d| d.text.as_str()), Some(""));
        assert!(corpus.iter().enumerate().all(|(i, d)| d.id == i));
    }

    #[test]
    fn test_from_documents_rejects_gap() {
        let docs = vec![
            Document { id: 0, text: "a".into() },
            Document { id: 2, text: "b".into() },
        ];
        assert!(matches!(
            Corpus::from_documents(docs),
            Err(RetrievalError::IndexCorrupt(_))
        ));
    }

    #[test]
    fn test_empty_corpus() {
        let corpus = Corpus::from_texts(Vec::<String>::new());
        assert!(corpus.is_empty());
        assert!(corpus.get(0).is_none());
    }
}
