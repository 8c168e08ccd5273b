//! Vector Index - 벡터 검색 트레이트 및 유틸리티
//!
//! 검색 백엔드를 트레이트로 표현하여, 근사(ANN) 또는 증분 갱신
//! 백엔드로 교체해도 질의 서비스 계약이 바뀌지 않도록 합니다.

use std::cmp::Ordering;

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// 문서 ID (인덱스 내 위치)
    pub document_id: usize,
    /// 제곱 L2 거리 (0 이상, 작을수록 유사)
    pub distance: f32,
}

impl SearchResult {
    /// 거리 오름차순, 같으면 문서 ID 오름차순
    pub fn rank_order(a: &Self, b: &Self) -> Ordering {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.document_id.cmp(&b.document_id))
    }
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// VectorIndex 트레이트
///
/// 위치가 곧 문서 ID입니다. 구축 후에는 읽기 전용이므로
/// 여러 질의가 잠금 없이 공유할 수 있습니다.
pub trait VectorIndex: Send + Sync {
    /// 벡터 목록으로 인덱스 구축 (입력 순서 유지)
    fn build(vectors: Vec<Vec<f32>>) -> Result<Self>
    where
        Self: Sized;

    /// 최근접 k개 검색 (거리 오름차순, 길이 ≤ k)
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// 저장된 벡터 개수
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 벡터 차원 (빈 인덱스는 0)
    fn dimension(&self) -> usize;

    /// 위치로 벡터 조회 (저장용)
    fn vector(&self, position: usize) -> Option<&[f32]>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 제곱 L2 거리 계산
///
/// 두 벡터 길이가 같아야 합니다.
#[inline]
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// 점수 목록에서 상위 k개 선택 후 정렬
///
/// k가 개수보다 크면 전체를 정렬해서 반환합니다.
pub fn top_k(mut scored: Vec<SearchResult>, k: usize) -> Vec<SearchResult> {
    if k == 0 {
        return vec![];
    }

    if k < scored.len() {
        scored.select_nth_unstable_by(k - 1, SearchResult::rank_order);
        scored.truncate(k);
    }

    scored.sort_by(SearchResult::rank_order);
    scored
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn result(document_id: usize, distance: f32) -> SearchResult {
        SearchResult {
            document_id,
            distance,
        }
    }

    #[test]
    fn test_l2_squared() {
        assert_eq!(l2_squared(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(l2_squared(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
        assert_eq!(l2_squared(&[], &[]), 0.0);
    }

    #[test]
    fn test_top_k_orders_ascending() {
        let scored = vec![result(0, 3.0), result(1, 1.0), result(2, 2.0), result(3, 0.5)];
        let top = top_k(scored, 2);
        assert_eq!(top, vec![result(3, 0.5), result(1, 1.0)]);
    }

    #[test]
    fn test_top_k_ties_by_document_id() {
        let scored = vec![result(2, 1.0), result(0, 1.0), result(1, 1.0), result(3, 0.0)];
        let top = top_k(scored, 3);
        let ids: Vec<usize> = top.iter().map(|r| r.document_id).collect();
        assert_eq!(ids, vec![3, 0, 1]);
    }

    #[test]
    fn test_top_k_overflow_returns_all() {
        let scored = vec![result(0, 2.0), result(1, 1.0)];
        let top = top_k(scored, 10);
        assert_eq!(top, vec![result(1, 1.0), result(0, 2.0)]);
    }

    #[test]
    fn test_top_k_zero() {
        assert!(top_k(vec![result(0, 1.0)], 0).is_empty());
    }
}
