//! Full-pipeline test: raw event file -> cached dataset -> graph -> short
//! training run -> checkpoint reload.

use std::sync::Arc;

use sagerec_core::{init_device, BipartiteGraph, InteractionStore};
use sagerec_models::load_checkpoint;
use sagerec_train::{TrainConfig, Trainer};

fn write_events(path: &std::path::Path) {
    let mut lines = String::new();
    // 8 users x 10 items, skipping one item per user for variety
    for user in 0..8usize {
        for (t, item) in (0..10usize).filter(|&i| (i + user) % 9 != 0).enumerate() {
            lines.push_str(&format!("{user} {item} {t}\n"));
        }
    }
    std::fs::write(path, lines).unwrap();
}

#[test]
fn test_pipeline_from_events_to_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let events_path = dir.path().join("events.txt");
    let cache_path = dir.path().join("dataset.bin");
    let checkpoint_path = dir.path().join("model.safetensors");
    write_events(&events_path);

    let store = Arc::new(
        InteractionStore::load_or_build(&cache_path, &events_path, 5, 17).unwrap(),
    );
    assert!(cache_path.exists(), "cache written on first build");

    // second load hits the cache and must agree with the first build
    let cached = InteractionStore::load_or_build(&cache_path, &events_path, 5, 17).unwrap();
    assert_eq!(cached.train.items, store.train.items);
    assert_eq!(cached.neg_test, store.neg_test);

    let device = init_device();
    let graph = BipartiteGraph::from_store(&store, &device).unwrap();

    let config = TrainConfig::default()
        .with_epochs(2, 5)
        .with_batch(4, 3)
        .with_model(4, 2)
        .with_walks(4, 2, 2)
        .with_optimizer(1e-2, 1e-5)
        .with_seed(17);
    let mut trainer = Trainer::new(config, store.clone(), graph, checkpoint_path.clone()).unwrap();
    let outcome = trainer.run().unwrap();

    assert!(outcome.last_epoch_loss.is_finite());
    for metrics in [
        &outcome.final_report.valid,
        &outcome.final_report.test_sampled,
        &outcome.final_report.test_complete,
    ] {
        assert!(metrics.n_queries > 0);
        assert!((0.0..=1.0).contains(&metrics.hits));
        assert!((0.0..=1.0).contains(&metrics.ndcg));
    }

    // checkpoint holds both towers at the trained shapes
    let tensors = load_checkpoint(&checkpoint_path, &device).unwrap();
    assert_eq!(tensors["p.base"].dims(), [store.n_items, 4]);
    assert_eq!(tensors["q.base"].dims(), [store.n_items, 4]);
    assert!(tensors.contains_key("p.layers.1.w_neigh"));
}
