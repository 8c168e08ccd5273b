//! Flat Vector Index - 전수 비교 최근접 이웃 검색
//!
//! 근사나 압축 없이 모든 벡터와의 제곱 L2 거리를 계산합니다.
//! 지식베이스가 작으므로 전수 비교로 충분합니다.

use crate::error::{Result, RetrievalError};

use super::vector::{l2_squared, top_k, SearchResult, VectorIndex};

// ============================================================================
// FlatIndex
// ============================================================================

/// 전수 비교(brute-force) 벡터 인덱스
///
/// 벡터는 입력 순서 그대로 저장되며, 위치가 문서 ID입니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    /// 저장된 벡터 전체
    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }
}

impl VectorIndex for FlatIndex {
    fn build(vectors: Vec<Vec<f32>>) -> Result<Self> {
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);

        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(RetrievalError::DimensionMismatch {
                expected: dimension,
                got: bad.len(),
            });
        }

        tracing::debug!(
            "Built flat index: {} vectors, dimension {}",
            vectors.len(),
            dimension
        );

        Ok(Self { dimension, vectors })
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        // 빈 인덱스는 어떤 질의에도 빈 결과
        if self.vectors.is_empty() {
            return Ok(vec![]);
        }

        if query.len() != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }

        let scored = self
            .vectors
            .iter()
            .enumerate()
            .map(|(document_id, vector)| SearchResult {
                document_id,
                distance: l2_squared(query, vector),
            })
            .collect();

        Ok(top_k(scored, k))
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn vector(&self, position: usize) -> Option<&[f32]> {
        self.vectors.get(position).map(Vec::as_slice)
    }
}

// ============================================================================
// Tests
// ============================================================================
