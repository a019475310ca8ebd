//! Bipartite user-item interaction graph in CSR form.
//!
//! The graph is built from the training split only; held-out validation and
//! test interactions never become edges. Adjacency rows are kept sorted so
//! co-occurrence counts reduce to sorted-list intersections.

use std::sync::Arc;

use anyhow::Result;
use burn::tensor::Tensor;

use crate::backend::CpuBackend;
use crate::dataset::InteractionStore;

/// Compressed sparse row adjacency: `indices[indptr[i]..indptr[i+1]]` holds
/// the sorted neighbor list of node `i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Csr {
    pub indptr: Vec<usize>,
    pub indices: Vec<usize>,
}

impl Csr {
    /// Build from (source, target) edge pairs over `n_sources` source nodes.
    pub fn from_edges(n_sources: usize, edges: impl Iterator<Item = (usize, usize)>) -> Self {
        let mut rows: Vec<Vec<usize>> = vec![Vec::new(); n_sources];
        for (src, dst) in edges {
            rows[src].push(dst);
        }
        let mut indptr = Vec::with_capacity(n_sources + 1);
        let mut indices = Vec::new();
        indptr.push(0);
        for mut row in rows {
            row.sort_unstable();
            indices.extend_from_slice(&row);
            indptr.push(indices.len());
        }
        Self { indptr, indices }
    }

    pub fn n_rows(&self) -> usize {
        self.indptr.len() - 1
    }

    pub fn row(&self, i: usize) -> &[usize] {
        &self.indices[self.indptr[i]..self.indptr[i + 1]]
    }

    pub fn degree(&self, i: usize) -> usize {
        self.indptr[i + 1] - self.indptr[i]
    }
}

/// Count of shared elements between two sorted slices.
fn sorted_intersection_len(a: &[usize], b: &[usize]) -> usize {
    let (mut i, mut j, mut count) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}

/// Immutable training-split bipartite graph shared across sampler threads.
#[derive(Clone, Debug)]
pub struct BipartiteGraph {
    pub n_users: usize,
    pub n_items: usize,
    /// User -> items adjacency.
    pub user_items: Csr,
    /// Item -> users adjacency (transpose of `user_items`).
    pub item_users: Csr,
    /// Optional item feature matrix [n_items, feature_dim].
    pub item_features: Option<Tensor<CpuBackend, 2>>,
}

impl BipartiteGraph {
    /// Build both adjacency directions from the training split. When the
    /// store carries item features, materialize them as a CPU tensor.
    pub fn from_store(
        store: &InteractionStore,
        device: &burn::backend::ndarray::NdArrayDevice,
    ) -> Result<Arc<Self>> {
        anyhow::ensure!(!store.train.is_empty(), "training split is empty");
        let user_items = Csr::from_edges(store.n_users, store.train.pairs());
        let item_users = Csr::from_edges(store.n_items, store.train.pairs().map(|(u, i)| (i, u)));
        let item_features = store.item_features.as_ref().map(|f| {
            let flat: Tensor<CpuBackend, 1> = Tensor::from_data(f.data.as_slice(), device);
            flat.reshape([store.n_items as i32, f.dim as i32])
        });
        Ok(Arc::new(Self {
            n_users: store.n_users,
            n_items: store.n_items,
            user_items,
            item_users,
            item_features,
        }))
    }

    /// Sorted training items of one user.
    pub fn items_of(&self, user: usize) -> &[usize] {
        self.user_items.row(user)
    }

    /// Sorted training users of one item.
    pub fn users_of(&self, item: usize) -> &[usize] {
        self.item_users.row(item)
    }

    /// Number of users who interacted with both items in training.
    pub fn common_user_count(&self, item_a: usize, item_b: usize) -> usize {
        sorted_intersection_len(self.users_of(item_a), self.users_of(item_b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Event;

    fn graph() -> Arc<BipartiteGraph> {
        // users 0..3 over items 0..4; enough history that leave-latest-out
        // still leaves the edges below in train.
        let events = vec![
            Event { user: 0, item: 0, timestamp: 0 },
            Event { user: 0, item: 1, timestamp: 1 },
            Event { user: 0, item: 2, timestamp: 2 },
            Event { user: 0, item: 3, timestamp: 3 },
            Event { user: 1, item: 1, timestamp: 0 },
            Event { user: 1, item: 0, timestamp: 1 },
            Event { user: 1, item: 2, timestamp: 2 },
            Event { user: 1, item: 4, timestamp: 3 },
            Event { user: 2, item: 0, timestamp: 0 },
            Event { user: 2, item: 4, timestamp: 1 },
        ];
        let store = InteractionStore::from_events(&events, 2, 3).unwrap();
        BipartiteGraph::from_store(&store, &crate::backend::init_device()).unwrap()
    }

    #[test]
    fn test_csr_rows_sorted() {
        let csr = Csr::from_edges(2, vec![(0, 3), (0, 1), (1, 2), (0, 2)].into_iter());
        assert_eq!(csr.row(0), &[1, 2, 3]);
        assert_eq!(csr.row(1), &[2]);
        assert_eq!(csr.degree(0), 3);
    }

    #[test]
    fn test_held_out_interactions_are_not_edges() {
        let g = graph();
        // user 0's valid (2) and test (3) items must not appear as edges
        assert_eq!(g.items_of(0), &[0, 1]);
        // user 2 has only two events, both stay in train
        assert_eq!(g.items_of(2), &[0, 4]);
    }

    #[test]
    fn test_transpose_consistency() {
        let g = graph();
        for user in 0..g.n_users {
            for &item in g.items_of(user) {
                assert!(g.users_of(item).contains(&user));
            }
        }
    }

    #[test]
    fn test_common_user_count() {
        let g = graph();
        // item 0 train users: {0, 1, 2}; item 1 train users: {0, 1}
        assert_eq!(g.common_user_count(0, 1), 2);
        // item 4 train users: {1, 2}
        assert_eq!(g.common_user_count(0, 4), 2);
        assert_eq!(g.common_user_count(1, 4), 1);
        // an item shares all its users with itself
        assert_eq!(g.common_user_count(0, 0), 3);
    }

    #[test]
    fn test_sorted_intersection_len_edge_cases() {
        assert_eq!(sorted_intersection_len(&[], &[1, 2]), 0);
        assert_eq!(sorted_intersection_len(&[1, 3, 5], &[2, 4, 6]), 0);
        assert_eq!(sorted_intersection_len(&[1, 2, 3], &[1, 2, 3]), 3);
    }
}
