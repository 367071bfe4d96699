use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rayon::prelude::*;

use crate::error::{Result, StoreError};

/// 少于这个数量的向量时不使用并行搜索
const PARALLEL_THRESHOLD: usize = 4096;

/// 搜索结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// 向量在索引中的位置
    pub position: usize,
    /// 与查询向量的欧氏距离平方
    pub distance: f32,
}

impl Neighbor {
    pub fn similarity(&self) -> f32 {
        similarity(self.distance)
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// 距离相同时位置靠前的更小，保证先插入的优先
impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance.total_cmp(&other.distance).then(self.position.cmp(&other.position))
    }
}

/// 只追加的平坦向量索引，使用欧氏距离进行精确 KNN 搜索
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "dimension must be positive");
        Self { dimension, data: vec![] }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 索引中的向量数量
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 追加一个向量，返回它的位置；失败时索引保持不变
    pub fn insert(&mut self, vector: &[f32]) -> Result<usize> {
        validate_vector(self.dimension, vector)?;
        let position = self.len();
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    pub fn get(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// 搜索距离最近的 k 个向量，按距离从小到大排列，结果数量为 `min(k, len)`
    pub fn search_k_nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        validate_vector(self.dimension, query)?;
        if k == 0 || self.is_empty() {
            return Ok(vec![]);
        }
        let k = k.min(self.len());

        let chunks = self.data.chunks_exact(self.dimension);
        let top = if self.len() < PARALLEL_THRESHOLD {
            let mut top = TopKNeighbors::new(k);
            top.extend(chunks.enumerate().map(|(i, v)| Neighbor {
                position: i,
                distance: l2_squared(query, v),
            }));
            top
        } else {
            self.data
                .par_chunks_exact(self.dimension)
                .enumerate()
                .fold(
                    || TopKNeighbors::new(k),
                    |mut top, (i, v)| {
                        top.push(Neighbor { position: i, distance: l2_squared(query, v) });
                        top
                    },
                )
                .reduce(
                    || TopKNeighbors::new(k),
                    |mut a, b| {
                        a.extend(b.heap);
                        a
                    },
                )
        };

        Ok(top.into_sorted_vec())
    }
}

/// 保留距离最小的 k 个邻居
struct TopKNeighbors {
    heap: BinaryHeap<Neighbor>,
    k: usize,
}

impl TopKNeighbors {
    fn new(k: usize) -> Self {
        Self { heap: BinaryHeap::with_capacity(k + 1), k }
    }

    fn push(&mut self, neighbor: Neighbor) {
        if self.heap.len() == self.k {
            match self.heap.peek() {
                Some(top) if neighbor < *top => {
                    self.heap.pop();
                }
                _ => return,
            }
        }
        self.heap.push(neighbor);
    }

    fn extend(&mut self, neighbors: impl IntoIterator<Item = Neighbor>) {
        for neighbor in neighbors {
            self.push(neighbor);
        }
    }

    fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.heap.into_sorted_vec()
    }
}

/// 检查向量维数，并拒绝 NaN / Inf
pub fn validate_vector(dimension: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != dimension {
        return Err(StoreError::DimensionMismatch { expected: dimension, actual: vector.len() });
    }
    if !vector.iter().all(|x| x.is_finite()) {
        return Err(StoreError::InvalidVector);
    }
    Ok(())
}

/// 欧氏距离的平方
#[inline]
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// 将距离转换为 (0, 1] 之间的相似度，距离越小相似度越高
#[inline]
pub fn similarity(distance: f32) -> f32 {
    // 分量很大时距离会溢出为 inf
    1. / (1. + distance.min(f32::MAX))
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;

    use super::*;

    fn index_with(vectors: &[[f32; 2]]) -> VectorIndex {
        let mut index = VectorIndex::new(2);
        for v in vectors {
            index.insert(v).unwrap();
        }
        index
    }

    #[test]
    fn test_insert_positions() {
        let mut index = VectorIndex::new(3);
        assert_eq!(index.insert(&[0., 0., 0.]).unwrap(), 0);
        assert_eq!(index.insert(&[1., 1., 1.]).unwrap(), 1);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(1), Some(&[1., 1., 1.][..]));
        assert_eq!(index.get(2), None);
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut index = VectorIndex::new(3);
        let err = index.insert(&[1., 2.]).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { expected: 3, actual: 2 }));
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_rejects_nan() {
        let mut index = VectorIndex::new(2);
        assert!(matches!(index.insert(&[f32::NAN, 0.]), Err(StoreError::InvalidVector)));
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_empty() {
        let index = VectorIndex::new(2);
        assert!(index.search_k_nearest(&[0., 0.], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_order() {
        let index = index_with(&[[3., 0.], [1., 0.], [2., 0.]]);
        let result = index.search_k_nearest(&[0., 0.], 2).unwrap();
        assert_eq!(result, vec![
            Neighbor { position: 1, distance: 1. },
            Neighbor { position: 2, distance: 4. },
        ]);
    }

    #[test]
    fn test_search_k_larger_than_len() {
        let index = index_with(&[[1., 0.], [0., 1.], [5., 5.]]);
        let result = index.search_k_nearest(&[0., 0.], 5).unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_search_ties_prefer_earlier() {
        let index = index_with(&[[1., 0.], [0., 1.], [-1., 0.], [0., -1.]]);
        let result = index.search_k_nearest(&[0., 0.], 2).unwrap();
        let positions = result.iter().map(|n| n.position).collect::<Vec<_>>();
        assert_eq!(positions, [0, 1]);
    }

    #[test]
    fn test_search_huge_k() {
        let index = index_with(&[[1., 0.], [0., 1.], [5., 5.]]);
        assert_eq!(index.search_k_nearest(&[0., 0.], usize::MAX).unwrap().len(), 3);
        assert_eq!(index.search_k_nearest(&[0., 0.], 1 << 40).unwrap().len(), 3);
    }

    #[test]
    fn test_search_query_dimension_mismatch() {
        let index = index_with(&[[1., 0.]]);
        assert!(index.search_k_nearest(&[0., 0., 0.], 1).is_err());
    }

    #[test]
    fn test_search_k_zero() {
        let index = index_with(&[[1., 0.]]);
        assert!(index.search_k_nearest(&[0., 0.], 0).unwrap().is_empty());
    }

    #[test]
    fn test_parallel_search_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);
        let dimension = 8;
        let mut index = VectorIndex::new(dimension);
        let mut vectors = vec![];
        for _ in 0..PARALLEL_THRESHOLD + 100 {
            let v = (0..dimension).map(|_| rng.random::<f32>()).collect::<Vec<_>>();
            index.insert(&v).unwrap();
            vectors.push(v);
        }
        let query = (0..dimension).map(|_| rng.random::<f32>()).collect::<Vec<_>>();

        let mut expected = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| Neighbor { position: i, distance: l2_squared(&query, v) })
            .collect::<Vec<_>>();
        expected.sort();
        expected.truncate(10);

        assert_eq!(index.search_k_nearest(&query, 10).unwrap(), expected);
    }

    #[test]
    fn test_similarity_range() {
        assert_eq!(similarity(0.), 1.);
        assert!(similarity(1e6) > 0.);
        assert!(similarity(1.) < similarity(0.5));
        assert!(similarity(f32::INFINITY) > 0.);
    }

    #[test]
    fn test_similarity_with_overflowing_distance() {
        let index = index_with(&[[f32::MAX, 0.]]);
        let result = index.search_k_nearest(&[-f32::MAX, 0.], 1).unwrap();
        assert_eq!(result[0].distance, f32::INFINITY);
        let similarity = result[0].similarity();
        assert!(similarity > 0. && similarity <= 1.);
    }
}
