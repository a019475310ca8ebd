//! Interaction store: train/valid/test splits, per-user latest-item
//! pointers, held-out negative pools, and item popularity counts.
//!
//! The store is built once (leave-latest-out split over timestamped
//! events), serialized to a single bincode blob, and consumed read-only for
//! the rest of the run. Validation and test interactions never become graph
//! edges; they exist only as held-out query/positive pairs here.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// One raw interaction event. Timestamps only order a user's history; any
/// monotone surrogate (e.g. line number) works.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Event {
    pub user: usize,
    pub item: usize,
    pub timestamp: i64,
}

/// Parallel user/item id arrays for one split.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Split {
    pub users: Vec<usize>,
    pub items: Vec<usize>,
}

impl Split {
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Iterate (user, item) pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.users.iter().copied().zip(self.items.iter().copied())
    }

    fn push(&mut self, user: usize, item: usize) {
        self.users.push(user);
        self.items.push(item);
    }
}

/// Immutable interaction data for one run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InteractionStore {
    pub n_users: usize,
    pub n_items: usize,
    pub train: Split,
    pub valid: Split,
    pub test: Split,
    /// Last training item per user; `None` for users with no training
    /// interactions. Strictly prior to both held-out splits.
    pub user_latest_item: Vec<Option<usize>>,
    /// Fixed-size sampled negative pool per validation user (empty for
    /// users without a validation interaction).
    pub neg_valid: Vec<Vec<usize>>,
    /// Fixed-size sampled negative pool per test user.
    pub neg_test: Vec<Vec<usize>>,
    /// Complete pool per test user: every catalog item except the held-out
    /// positive (the positive is prepended at scoring time).
    pub neg_test_complete: Vec<Vec<usize>>,
    /// Training interaction count per item (popularity baseline scores).
    pub item_counts: Vec<f32>,
    /// Optional item feature matrix, row-major [n_items, feature_dim].
    pub item_features: Option<FeatureMatrix>,
}

/// Row-major dense feature matrix attached to item nodes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub data: Vec<f32>,
    pub dim: usize,
}

impl FeatureMatrix {
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }
}

impl InteractionStore {
    /// Leave-latest-out split: per user ordered by timestamp, the last
    /// interaction goes to test, the second-to-last to validation, the rest
    /// to train. Users with fewer than three interactions stay entirely in
    /// train. Sampled negative pools hold `n_negatives` distinct items
    /// disjoint from the held-out positive.
    pub fn from_events(events: &[Event], n_negatives: usize, seed: u64) -> Result<Self> {
        anyhow::ensure!(!events.is_empty(), "no interaction events");

        let n_users = events.iter().fold(0, |m, e| m.max(e.user)) + 1;
        let n_items = events.iter().fold(0, |m, e| m.max(e.item)) + 1;

        let mut histories: Vec<Vec<(i64, usize)>> = vec![Vec::new(); n_users];
        for e in events {
            histories[e.user].push((e.timestamp, e.item));
        }

        let mut train = Split::default();
        let mut valid = Split::default();
        let mut test = Split::default();
        let mut user_latest_item = vec![None; n_users];
        let mut valid_positive = vec![None; n_users];
        let mut test_positive = vec![None; n_users];

        for (user, history) in histories.iter_mut().enumerate() {
            // Stable sort keeps insertion order for equal timestamps.
            history.sort_by_key(|&(ts, _)| ts);
            let n = history.len();
            if n >= 3 {
                for &(_, item) in &history[..n - 2] {
                    train.push(user, item);
                }
                valid.push(user, history[n - 2].1);
                valid_positive[user] = Some(history[n - 2].1);
                test.push(user, history[n - 1].1);
                test_positive[user] = Some(history[n - 1].1);
                user_latest_item[user] = Some(history[n - 3].1);
            } else if n > 0 {
                for &(_, item) in history.iter() {
                    train.push(user, item);
                }
                user_latest_item[user] = Some(history[n - 1].1);
            }
        }

        let mut item_counts = vec![0.0f32; n_items];
        for &item in &train.items {
            item_counts[item] += 1.0;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let pool_size = n_negatives.min(n_items.saturating_sub(1));
        let sample_pool = |rng: &mut ChaCha8Rng, positive: usize| -> Vec<usize> {
            let mut pool = Vec::with_capacity(pool_size);
            while pool.len() < pool_size {
                let candidate = rng.gen_range(0..n_items);
                if candidate != positive && !pool.contains(&candidate) {
                    pool.push(candidate);
                }
            }
            pool
        };

        let mut neg_valid = vec![Vec::new(); n_users];
        let mut neg_test = vec![Vec::new(); n_users];
        let mut neg_test_complete = vec![Vec::new(); n_users];
        for user in 0..n_users {
            if let Some(positive) = valid_positive[user] {
                neg_valid[user] = sample_pool(&mut rng, positive);
            }
            if let Some(positive) = test_positive[user] {
                neg_test[user] = sample_pool(&mut rng, positive);
                neg_test_complete[user] = (0..n_items).filter(|&i| i != positive).collect();
            }
        }

        Ok(Self {
            n_users,
            n_items,
            train,
            valid,
            test,
            user_latest_item,
            neg_valid,
            neg_test,
            neg_test_complete,
            item_counts,
            item_features: None,
        })
    }

    /// Attach an item feature matrix (set once, before graph construction).
    pub fn with_item_features(mut self, features: FeatureMatrix) -> Result<Self> {
        anyhow::ensure!(
            features.data.len() == self.n_items * features.dim,
            "feature matrix shape mismatch: {} values for {} items x dim {}",
            features.data.len(),
            self.n_items,
            features.dim
        );
        self.item_features = Some(features);
        Ok(self)
    }

    /// Load the cached store, or build it from the raw event file and write
    /// the cache.
    pub fn load_or_build(
        cache_path: &Path,
        raw_path: &Path,
        n_negatives: usize,
        seed: u64,
    ) -> Result<Self> {
        if cache_path.exists() {
            return Self::load(cache_path);
        }
        let events = load_events(raw_path)?;
        let store = Self::from_events(&events, n_negatives, seed)?;
        store.save(cache_path)?;
        Ok(store)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let blob = fs::read(path)
            .with_context(|| format!("failed to read dataset cache {}", path.display()))?;
        let (store, _) = bincode::serde::decode_from_slice(&blob, bincode::config::standard())
            .with_context(|| format!("failed to decode dataset cache {}", path.display()))?;
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let blob = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .context("failed to encode dataset cache")?;
        fs::write(path, blob)
            .with_context(|| format!("failed to write dataset cache {}", path.display()))?;
        Ok(())
    }
}

/// Parse a whitespace-separated `user item [timestamp]` event file.
///
/// Lines starting with `#` and blank lines are skipped. When the timestamp
/// column is missing, the line number stands in (file order = time order).
pub fn load_events(path: &Path) -> Result<Vec<Event>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read event file {}", path.display()))?;
    let mut events = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let user: usize = fields
            .next()
            .context("missing user column")
            .and_then(|f| f.parse().map_err(anyhow::Error::from))
            .with_context(|| format!("{}:{}", path.display(), line_no + 1))?;
        let item: usize = fields
            .next()
            .context("missing item column")
            .and_then(|f| f.parse().map_err(anyhow::Error::from))
            .with_context(|| format!("{}:{}", path.display(), line_no + 1))?;
        let timestamp: i64 = match fields.next() {
            Some(f) => f
                .parse()
                .with_context(|| format!("{}:{}", path.display(), line_no + 1))?,
            None => line_no as i64,
        };
        events.push(Event {
            user,
            item,
            timestamp,
        });
    }
    anyhow::ensure!(
        !events.is_empty(),
        "event file {} holds no interactions",
        path.display()
    );
    Ok(events)
}
