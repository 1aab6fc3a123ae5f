//! Particle selection over the sorted store.
//!
//! A query combines `any(time, predicate)` and `all(time, predicate)` terms
//! with boolean operators. Columns are processed in chunks; each term keeps
//! one running mask per chunk, seeded false for `any` and true for `all`,
//! and only updated where the particle exists at that time.

mod eval;
mod lexer;
mod parser;

use fxhash::FxHashSet;
use track_core::{union_sorted, Axis, AxisData, BufferPool, Selection, TrackError, TrackResult};
use track_io::TrackSource;
use tracing::{debug, info};

pub use eval::{eval, Env, Value};
pub use lexer::{tokenize, Spanned, Token};
pub use parser::{BinaryOp, Expr, Func, QuantifiedTerm, Quantifier, UnaryOp, Var};

#[derive(Clone, Debug)]
pub struct Query {
    text: String,
    expr: Expr,
    terms: Vec<QuantifiedTerm>,
}

impl Query {
    pub fn parse(text: &str) -> TrackResult<Self> {
        let parsed = parser::parse(text)
            .map_err(|msg| TrackError::QuerySyntax(format!("{msg} in '{}'", text.trim())))?;
        Ok(Self {
            text: text.trim().to_string(),
            expr: parsed.expr,
            terms: parsed.terms,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn terms(&self) -> &[QuantifiedTerm] {
        &self.terms
    }

    /// Every particle property the predicates read.
    pub fn axes(&self) -> Vec<Axis> {
        let mut axes: Vec<Axis> = self
            .terms
            .iter()
            .flat_map(|term| term.predicate.axes())
            .collect();
        axes.sort();
        axes.dedup();
        axes
    }

    /// Timesteps of `times` picked by the time argument of `term`.
    pub fn term_times(&self, term: &QuantifiedTerm, times: &[u64]) -> TrackResult<Vec<u64>> {
        let values: Vec<f64> = times.iter().map(|&t| t as f64).collect();
        let env = Env {
            len: times.len(),
            time: Some(&values),
            axes: &[],
            quantified: &[],
        };
        let mask = eval(&term.time, &env)
            .map_err(TrackError::QuerySyntax)?
            .into_mask(times.len());
        Ok(times
            .iter()
            .zip(mask)
            .filter_map(|(&t, keep)| keep.then_some(t))
            .collect())
    }
}

/// Chunk count and chunk length covering `n` columns with at most `chunk_size` each.
pub fn select_chunks(n: usize, chunk_size: usize) -> (usize, usize) {
    if n == 0 {
        return (0, 0);
    }
    let chunk_size = chunk_size.clamp(1, n);
    let nchunks = n.div_ceil(chunk_size);
    (nchunks, n.div_ceil(nchunks))
}

/// Columns of `source` satisfying `query`. Time arguments range over every
/// timestep of the source.
pub fn select_query<S: TrackSource>(
    source: &mut S,
    query: &Query,
    chunk_size: usize,
) -> TrackResult<Selection> {
    let axes = query.axes();
    if let Some(axis) = axes.iter().find(|a| !source.has_axis(**a)) {
        return Err(TrackError::QuerySyntax(format!(
            "property '{axis}' is not recorded in this store"
        )));
    }
    let all_times = source.times().to_vec();
    let mut term_rows = Vec::with_capacity(query.terms.len());
    for term in &query.terms {
        let rows: Vec<(u64, usize)> = query
            .term_times(term, &all_times)?
            .into_iter()
            .filter_map(|t| source.row_of(t).map(|row| (t, row)))
            .collect();
        term_rows.push(rows);
    }

    let n = source.n_columns();
    let (nchunks, chunk) = select_chunks(n, chunk_size);
    let mut pool = BufferPool::new();
    let mut widened: Vec<(Axis, Vec<f64>)> = axes.iter().map(|&a| (a, Vec::new())).collect();
    let mut selected = Vec::new();
    info!(query = %query.text, nchunks, "selecting particles");
    for ichunk in 0..nchunks {
        let start = ichunk * chunk;
        let stop = (start + chunk).min(n);
        if start >= stop {
            break;
        }
        let len = stop - start;
        let mut masks = Vec::with_capacity(query.terms.len());
        for (term, rows) in query.terms.iter().zip(&term_rows) {
            let seed = term.kind == Quantifier::All;
            let mut mask = vec![seed; len];
            for &(time, row) in rows {
                debug!(timestep = time, chunk = ichunk, "selecting block");
                let ids = pool.acquire(Axis::Id, len);
                source.read_row(Axis::Id, row, start, ids)?;
                for (axis, values) in widened.iter_mut() {
                    let buf = pool.acquire(*axis, len);
                    if *axis != Axis::Id {
                        source.read_row(*axis, row, start, buf)?;
                    }
                    buf.widen_into(len, values);
                }
                let env = Env {
                    len,
                    time: None,
                    axes: &widened,
                    quantified: &[],
                };
                let now = eval(&term.predicate, &env)
                    .map_err(TrackError::QuerySyntax)?
                    .into_mask(len);
                let ids = pool
                    .get(Axis::Id)
                    .ok_or_else(|| TrackError::Mismatch("identity buffer missing".into()))?
                    .as_slice::<u64>()?;
                for k in 0..len {
                    if ids[k] > 0 {
                        match term.kind {
                            Quantifier::Any => mask[k] |= now[k],
                            Quantifier::All => mask[k] &= now[k],
                        }
                    }
                }
            }
            masks.push(mask);
        }
        let env = Env {
            len,
            time: None,
            axes: &[],
            quantified: &masks,
        };
        let keep = eval(&query.expr, &env)
            .map_err(TrackError::QuerySyntax)?
            .into_mask(len);
        let chunk_columns: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(k, &on)| on.then_some(start + k))
            .collect();
        selected = union_sorted(&selected, &chunk_columns);
    }
    Ok(Selection::from_columns(selected))
}

/// Columns whose identity appears in `ids`.
pub fn select_ids<S: TrackSource>(source: &mut S, ids: &[u64]) -> TrackResult<Selection> {
    let wanted: FxHashSet<u64> = ids.iter().copied().collect();
    let unique = source.unique_ids()?;
    let columns = unique
        .iter()
        .enumerate()
        .filter_map(|(col, id)| wanted.contains(id).then_some(col))
        .collect();
    Ok(Selection::from_columns(columns))
}

/// Drop selected columns with no live identity in any of `rows`.
pub fn prune_dead<S: TrackSource>(
    source: &mut S,
    selection: &mut Selection,
    rows: std::ops::RangeInclusive<usize>,
) -> TrackResult<()> {
    let Selection::Columns(columns) = &*selection else {
        return Ok(());
    };
    if columns.is_empty() {
        return Ok(());
    }
    let columns = columns.clone();
    let mut alive = vec![false; columns.len()];
    let mut ids = AxisData::U64(Vec::new());
    for row in rows {
        source.read_row_columns(Axis::Id, row, &columns, &mut ids)?;
        for (flag, &id) in alive.iter_mut().zip(ids.as_slice::<u64>()?) {
            *flag |= id > 0;
        }
    }
    let dead = alive.iter().filter(|a| !**a).count();
    if dead > 0 {
        debug!(dead, "removing particles absent from the requested timesteps");
        let keep: FxHashSet<usize> = columns
            .iter()
            .zip(&alive)
            .filter_map(|(&c, &a)| a.then_some(c))
            .collect();
        selection.retain(|c| keep.contains(&c));
    }
    Ok(())
}
