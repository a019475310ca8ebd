//! Train the two-tower graph recommender on an interaction event file.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sagerec-train --release -- \
//!   --events interactions.txt \
//!   --cache dataset.bin \
//!   --checkpoint model.safetensors \
//!   --epochs 200 \
//!   --iters-per-epoch 20000
//!
//! # With external matrix-factorization warm start
//! cargo run --bin sagerec-train --release -- \
//!   --events interactions.txt \
//!   --mf-tool /usr/local/bin/mf-train \
//!   --mf-iterations 20
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use sagerec_core::{init_device, BipartiteGraph, InteractionStore};
use sagerec_train::{MfWarmStart, NoWarmStart, PretrainStrategy, TrainConfig, Trainer};

#[derive(Parser)]
#[command(name = "sagerec-train")]
#[command(author, version, about = "Train the two-tower graph recommender")]
struct Args {
    /// Raw interaction event file (`user item [timestamp]` per line)
    #[arg(long)]
    events: PathBuf,

    /// Dataset cache; built from --events when absent
    #[arg(long, default_value = "dataset.bin")]
    cache: PathBuf,

    /// Checkpoint file, overwritten after every epoch
    #[arg(long, default_value = "model.safetensors")]
    checkpoint: PathBuf,

    /// Number of training epochs
    #[arg(long, default_value = "200")]
    epochs: usize,

    /// Iterations per epoch
    #[arg(long, default_value = "20000")]
    iters_per_epoch: usize,

    /// Mini-batch size
    #[arg(long, default_value = "32")]
    batch_size: usize,

    /// Embedding dimensionality
    #[arg(long, default_value = "16")]
    embed_dim: usize,

    /// Number of aggregation layers
    #[arg(long, default_value = "2")]
    layers: usize,

    /// Random walks per node
    #[arg(long, default_value = "10")]
    traces: usize,

    /// Item hops per walk
    #[arg(long, default_value = "3")]
    trace_len: usize,

    /// Neighbors kept per node per hop
    #[arg(long, default_value = "3")]
    neighbors: usize,

    /// Negative samples per training pair
    #[arg(long, default_value = "4")]
    negatives: usize,

    /// Sampled negative pool size for valid/test evaluation
    #[arg(long, default_value = "99")]
    eval_negatives: usize,

    /// Learning rate
    #[arg(long, default_value = "0.0003")]
    lr: f32,

    /// Weight decay
    #[arg(long, default_value = "0.00001")]
    weight_decay: f32,

    /// Hinge margin
    #[arg(long, default_value = "1.0")]
    margin: f32,

    /// Clamp on importance weights (unset = no clamp)
    #[arg(long)]
    max_weight: Option<f32>,

    /// Prefetch worker threads (0 = build batches inline)
    #[arg(long, default_value = "0")]
    workers: usize,

    /// Prefetch buffer per worker
    #[arg(long, default_value = "4")]
    prefetch: usize,

    /// Restrict negatives to a training-popularity band
    #[arg(long)]
    neg_by_freq: bool,

    /// Lower bound of the popularity band
    #[arg(long, default_value = "0")]
    neg_freq_min: u32,

    /// Upper bound of the popularity band
    #[arg(long, default_value = "4294967295")]
    neg_freq_max: u32,

    /// Top-K cutoff for HITS/NDCG
    #[arg(long, default_value = "10")]
    eval_k: usize,

    /// External mf-train binary for warm starting base embeddings
    #[arg(long)]
    mf_tool: Option<PathBuf>,

    /// Iteration budget for the warm-start factorization
    #[arg(long, default_value = "20")]
    mf_iterations: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = TrainConfig::default()
        .with_epochs(args.epochs, args.iters_per_epoch)
        .with_batch(args.batch_size, args.negatives)
        .with_model(args.embed_dim, args.layers)
        .with_walks(args.traces, args.trace_len, args.neighbors)
        .with_optimizer(args.lr, args.weight_decay)
        .with_workers(args.workers, args.prefetch)
        .with_seed(args.seed);
    config.margin = args.margin;
    config.eval_k = args.eval_k;
    if let Some(max_weight) = args.max_weight {
        config.max_weight = max_weight;
    }
    if args.neg_by_freq {
        config = config.with_frequency_band(args.neg_freq_min, args.neg_freq_max);
    }

    let device = init_device();
    let store = Arc::new(InteractionStore::load_or_build(
        &args.cache,
        &args.events,
        args.eval_negatives,
        args.seed,
    )?);
    println!(
        "dataset: {} users, {} items, {} train / {} valid / {} test interactions",
        store.n_users,
        store.n_items,
        store.train.len(),
        store.valid.len(),
        store.test.len(),
    );
    let graph = BipartiteGraph::from_store(&store, &device)?;

    let mut trainer = Trainer::new(config, store, graph, args.checkpoint)?;

    let strategy: Box<dyn PretrainStrategy> = match args.mf_tool {
        Some(tool) => Box::new(MfWarmStart {
            tool,
            embed_dim: args.embed_dim,
            iterations: args.mf_iterations,
        }),
        None => Box::new(NoWarmStart),
    };
    trainer.warm_start(strategy.as_ref())?;

    let outcome = trainer.run()?;
    println!("=== Final ===");
    println!("{}", outcome.final_report);
    Ok(())
}
