//! Warm-start bridge to an external matrix-factorization tool.
//!
//! The item-item co-occurrence matrix M = UᵗU (U = user-item incidence over
//! the training split) is written as whitespace-separated `row col value`
//! triples to a temporary file, the external `mf-train` binary factorizes
//! it, and the resulting row/column factors seed both towers' base
//! embedding tables. Tool failure is fatal; there is no fallback
//! initialization. Factor rows the tool flags as non-numeric are logged and
//! used anyway.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use sagerec_core::{BipartiteGraph, InteractionStore};

/// Dense factor matrices parsed from the tool's model file.
#[derive(Clone, Debug, PartialEq)]
pub struct WarmStartFactors {
    /// Row factors, one per item (co-occurrence rows).
    pub p: Vec<Vec<f32>>,
    /// Column factors, one per item (co-occurrence columns).
    pub q: Vec<Vec<f32>>,
}

/// How initial base embeddings are produced before training.
pub trait PretrainStrategy {
    /// `None` means "keep the random initialization".
    fn initial_embeddings(
        &self,
        store: &InteractionStore,
        graph: &BipartiteGraph,
    ) -> Result<Option<WarmStartFactors>>;
}

/// Keep the random initialization.
pub struct NoWarmStart;

impl PretrainStrategy for NoWarmStart {
    fn initial_embeddings(
        &self,
        _store: &InteractionStore,
        _graph: &BipartiteGraph,
    ) -> Result<Option<WarmStartFactors>> {
        Ok(None)
    }
}

/// Factorize item co-occurrence with an external `mf-train` binary.
pub struct MfWarmStart {
    pub tool: PathBuf,
    pub embed_dim: usize,
    pub iterations: usize,
}

impl PretrainStrategy for MfWarmStart {
    fn initial_embeddings(
        &self,
        _store: &InteractionStore,
        graph: &BipartiteGraph,
    ) -> Result<Option<WarmStartFactors>> {
        let dir = tempfile::tempdir().context("creating warm-start scratch directory")?;
        let triples_path = dir.path().join("cooccurrence.txt");
        let model_path = dir.path().join("cooccurrence.model");

        let triples = cooccurrence_triples(graph);
        log::info!(
            "warm start: {} nonzero co-occurrence entries over {} items",
            triples.len(),
            graph.n_items
        );
        write_triples(&triples_path, &triples)?;

        // -f 0: squared-error loss; -k/-t: dimensionality and iterations
        let status = Command::new(&self.tool)
            .arg("-f")
            .arg("0")
            .arg("-k")
            .arg(self.embed_dim.to_string())
            .arg("-t")
            .arg(self.iterations.to_string())
            .arg(&triples_path)
            .arg(&model_path)
            .status()
            .with_context(|| format!("failed to launch {}", self.tool.display()))?;
        anyhow::ensure!(
            status.success(),
            "{} exited with {}",
            self.tool.display(),
            status
        );

        let model = std::fs::read_to_string(&model_path)
            .with_context(|| format!("failed to read model file {}", model_path.display()))?;
        let factors = parse_model_file(&model, self.embed_dim)?;
        Ok(Some(factors))
    }
}

/// Nonzero entries of M = UᵗU over training edges, sorted by (row, col).
pub fn cooccurrence_triples(graph: &BipartiteGraph) -> Vec<(usize, usize, u32)> {
    let mut counts: HashMap<(usize, usize), u32> = HashMap::new();
    for user in 0..graph.n_users {
        let items = graph.items_of(user);
        for &a in items {
            for &b in items {
                *counts.entry((a, b)).or_insert(0) += 1;
            }
        }
    }
    let mut triples: Vec<(usize, usize, u32)> =
        counts.into_iter().map(|((r, c), v)| (r, c, v)).collect();
    triples.sort_unstable();
    triples
}

fn write_triples(path: &Path, triples: &[(usize, usize, u32)]) -> Result<()> {
    let mut out = String::with_capacity(triples.len() * 12);
    for &(row, col, value) in triples {
        out.push_str(&format!("{row} {col} {value}\n"));
    }
    std::fs::write(path, out)
        .with_context(|| format!("failed to write triples file {}", path.display()))?;
    Ok(())
}

/// Parse the tool's model file into p/q factor matrices.
///
/// Factor lines look like `p12 T 0.1 0.2 ...` / `q3 F nan ...`: the label
/// carries the side and row index, the second token flags whether the row is
/// numeric. `F` rows are warned about and parsed anyway. Header lines
/// (`f`, `m`, `n`, `k`, `b`) are skipped.
pub fn parse_model_file(contents: &str, embed_dim: usize) -> Result<WarmStartFactors> {
    let mut p: Vec<(usize, Vec<f32>)> = Vec::new();
    let mut q: Vec<(usize, Vec<f32>)> = Vec::new();

    for (line_no, line) in contents.lines().enumerate() {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else {
            continue;
        };
        let side = match label.as_bytes().first() {
            Some(b'p') if label.len() > 1 => &mut p,
            Some(b'q') if label.len() > 1 => &mut q,
            _ => continue, // header line
        };
        let index: usize = label[1..]
            .parse()
            .with_context(|| format!("bad factor label {label:?} on line {}", line_no + 1))?;
        let flag = fields
            .next()
            .with_context(|| format!("missing numeric flag on line {}", line_no + 1))?;
        if flag != "T" {
            log::warn!("factor row {label} flagged non-numeric; using it anyway");
        }
        let row: Vec<f32> = fields
            .map(|f| {
                f.parse::<f32>()
                    .with_context(|| format!("bad factor value {f:?} on line {}", line_no + 1))
            })
            .collect::<Result<_>>()?;
        anyhow::ensure!(
            row.len() == embed_dim,
            "factor row {} has {} values, expected {}",
            label,
            row.len(),
            embed_dim
        );
        side.push((index, row));
    }

    anyhow::ensure!(
        !p.is_empty() && !q.is_empty(),
        "model file holds no factor rows"
    );
    p.sort_by_key(|&(i, _)| i);
    q.sort_by_key(|&(i, _)| i);
    Ok(WarmStartFactors {
        p: p.into_iter().map(|(_, row)| row).collect(),
        q: q.into_iter().map(|(_, row)| row).collect(),
    })
}
