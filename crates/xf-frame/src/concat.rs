use xf_array::{ArrayBox, ExtensionArray, concat_arrays, missing_like};
use xf_index::{Index, IndexLabel};
use xf_runtime::{GuardLedger, RuntimePolicy};

use crate::flags::{Flags, finalize_with_policy};
use crate::{DataFrame, FrameError, Series};

/// One input to [`concat`].
#[derive(Debug, Clone, Copy)]
pub enum ConcatItem<'a> {
    Series(&'a Series),
    Frame(&'a DataFrame),
}

impl<'a> From<&'a Series> for ConcatItem<'a> {
    fn from(series: &'a Series) -> Self {
        Self::Series(series)
    }
}

impl<'a> From<&'a DataFrame> for ConcatItem<'a> {
    fn from(frame: &'a DataFrame) -> Self {
        Self::Frame(frame)
    }
}

/// Stacking direction: `Index` appends rows, `Columns` appends columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcatAxis {
    #[default]
    Index,
    Columns,
}

/// An input seen as a plain block of columns.
struct Block {
    index: Index,
    columns: Index,
    data: Vec<ArrayBox>,
    flags: Flags,
}

impl ConcatItem<'_> {
    fn block(&self) -> Block {
        match self {
            Self::Series(s) => Block {
                index: s.index().clone(),
                columns: Index::new(vec![IndexLabel::from(s.name())]),
                data: vec![s.array().clone_box()],
                flags: s.flags(),
            },
            Self::Frame(f) => Block {
                index: f.index().clone(),
                columns: f.columns().clone(),
                data: f.data().to_vec(),
                flags: f.flags(),
            },
        }
    }
}

fn no_objects() -> FrameError {
    FrameError::Unsupported("no objects to concatenate".to_owned())
}

pub fn concat_series(series: &[&Series], ignore_index: bool) -> Result<Series, FrameError> {
    let mut ledger = GuardLedger::new();
    concat_series_with_policy(series, ignore_index, &RuntimePolicy::default(), &mut ledger)
}

/// Stack series end to end. The name survives only when every input
/// shares it.
pub fn concat_series_with_policy(
    series: &[&Series],
    ignore_index: bool,
    policy: &RuntimePolicy,
    ledger: &mut GuardLedger,
) -> Result<Series, FrameError> {
    let Some(first) = series.first() else {
        return Err(no_objects());
    };
    let arrays: Vec<&dyn ExtensionArray> = series.iter().map(|s| s.array()).collect();
    let values = concat_arrays(&arrays)?;
    let index = if ignore_index {
        Index::range(values.len())
    } else {
        let indexes: Vec<&Index> = series.iter().map(|s| s.index()).collect();
        Index::concat(&indexes)
    };
    let name = if series.iter().all(|s| s.name() == first.name()) {
        first.name().to_owned()
    } else {
        String::new()
    };
    let flags: Vec<Flags> = series.iter().map(|s| s.flags()).collect();
    finalize_with_policy(Series::new(name, index, values)?, &flags, "concat", policy, ledger)
}

pub fn concat(items: &[ConcatItem<'_>], axis: ConcatAxis, ignore_index: bool) -> Result<DataFrame, FrameError> {
    let mut ledger = GuardLedger::new();
    concat_with_policy(items, axis, ignore_index, &RuntimePolicy::default(), &mut ledger)
}

/// Concatenate series and frames into one frame. The result disallows
/// duplicate labels when any input does, and is validated on both axes.
pub fn concat_with_policy(
    items: &[ConcatItem<'_>],
    axis: ConcatAxis,
    ignore_index: bool,
    policy: &RuntimePolicy,
    ledger: &mut GuardLedger,
) -> Result<DataFrame, FrameError> {
    if items.is_empty() {
        return Err(no_objects());
    }
    let blocks: Vec<Block> = items.iter().map(ConcatItem::block).collect();
    let flags: Vec<Flags> = blocks.iter().map(|b| b.flags).collect();
    let frame = match axis {
        ConcatAxis::Index => concat_rows(&blocks, ignore_index)?,
        ConcatAxis::Columns => concat_columns(&blocks, ignore_index)?,
    };
    finalize_with_policy(frame, &flags, "concat", policy, ledger)
}

/// Shared labels of one axis across blocks: kept as-is when every block
/// agrees, otherwise the first-seen union. Reindexing needs unique labels.
fn shared_axis<'a>(mut axes: impl Iterator<Item = &'a Index>) -> Result<(Index, bool), FrameError> {
    let Some(first) = axes.next() else {
        return Ok((Index::new(Vec::new()), true));
    };
    let rest: Vec<&Index> = axes.collect();
    if rest.iter().all(|axis| *axis == first) {
        return Ok((first.clone(), true));
    }
    if first.has_duplicates() || rest.iter().any(|axis| axis.has_duplicates()) {
        return Err(FrameError::ReindexDuplicates);
    }
    let union = rest.iter().fold(first.clone(), |acc, axis| acc.union_with(axis));
    Ok((union, false))
}

fn concat_rows(blocks: &[Block], ignore_index: bool) -> Result<DataFrame, FrameError> {
    let (columns, identical) = shared_axis(blocks.iter().map(|b| &b.columns))?;

    let mut data = Vec::with_capacity(columns.len());
    for (j, label) in columns.labels().iter().enumerate() {
        let pieces: Vec<ArrayBox> = if identical {
            blocks.iter().map(|b| b.data[j].clone()).collect()
        } else {
            let like = blocks
                .iter()
                .find_map(|b| b.columns.position(label).map(|c| &b.data[c]))
                .ok_or_else(|| FrameError::ColumnNotFound(label.clone()))?;
            blocks
                .iter()
                .map(|b| match b.columns.position(label) {
                    Some(c) => b.data[c].clone(),
                    None => missing_like(like.as_ref(), b.index.len()),
                })
                .collect()
        };
        let refs: Vec<&dyn ExtensionArray> = pieces.iter().map(|a| a.as_ref()).collect();
        data.push(concat_arrays(&refs)?);
    }

    let total: usize = blocks.iter().map(|b| b.index.len()).sum();
    let index = if ignore_index {
        Index::range(total)
    } else {
        let indexes: Vec<&Index> = blocks.iter().map(|b| &b.index).collect();
        Index::concat(&indexes)
    };
    DataFrame::new(index, columns, data)
}

fn concat_columns(blocks: &[Block], ignore_index: bool) -> Result<DataFrame, FrameError> {
    let (index, identical) = shared_axis(blocks.iter().map(|b| &b.index))?;

    let mut data = Vec::new();
    for block in blocks {
        if identical {
            data.extend(block.data.iter().cloned());
        } else {
            let slots = block.index.get_indexer(&index);
            data.extend(block.data.iter().map(|array| array.take(&slots)));
        }
    }

    let columns = if ignore_index {
        Index::range(data.len())
    } else {
        let columns: Vec<&Index> = blocks.iter().map(|b| &b.columns).collect();
        Index::concat(&columns)
    };
    DataFrame::new(index, columns, data)
}

#[cfg(test)]
mod tests {
    use xf_index::{Index, IndexLabel};
    use xf_runtime::{GuardLedger, GuardOutcome, RuntimePolicy};
    use xf_types::Scalar;

    use super::{ConcatAxis, ConcatItem, concat, concat_series, concat_with_policy};
    use crate::{DataFrame, FrameError, Series};

    fn series(name: &str, labels: &[&str]) -> Series {
        let values = (0..labels.len()).map(|i| Scalar::Int64(i as i64)).collect();
        Series::from_values(name, Index::from_strs(labels).labels().to_vec(), values).expect("series")
    }

    fn strict(s: Series) -> Series {
        s.with_allows_duplicate_labels(false).expect("strict")
    }

    #[test]
    fn row_concat_of_strict_series_with_overlap_fails() {
        let a = strict(series("x", &["a", "b"]));
        let b = series("x", &["b", "c"]);
        let err = concat_series(&[&a, &b], false).expect_err("overlap");
        let FrameError::DuplicateLabel(dup) = err else {
            panic!("expected duplicate label error");
        };
        assert_eq!(dup.labels, vec![IndexLabel::from("b")]);

        let out = concat_series(&[&a, &b], true).expect("ignore_index");
        assert_eq!(out.index(), &Index::range(4));
        assert!(!out.allows_duplicate_labels());
    }

    #[test]
    fn permissive_row_concat_keeps_duplicates() {
        let a = series("x", &["a", "b"]);
        let b = series("y", &["b"]);
        let out = concat_series(&[&a, &b], false).expect("concat");
        assert_eq!(out.index(), &Index::from_strs(&["a", "b", "b"]));
        assert_eq!(out.name(), "");
        assert!(out.allows_duplicate_labels());
    }

    #[test]
    fn column_concat_of_same_named_strict_series_fails() {
        let a = strict(series("x", &["a", "b"]));
        let b = strict(series("x", &["a", "b"]));
        let err = concat(&[(&a).into(), (&b).into()], ConcatAxis::Columns, false);
        assert!(matches!(err, Err(FrameError::DuplicateLabel(_))));

        let c = strict(series("y", &["a", "b"]));
        let out = concat(&[(&a).into(), (&c).into()], ConcatAxis::Columns, false).expect("concat");
        assert_eq!(out.columns(), &Index::from_strs(&["x", "y"]));
        assert!(!out.allows_duplicate_labels());
    }

    #[test]
    fn column_concat_aligns_unique_indexes() {
        let a = series("x", &["a", "b"]);
        let b = series("y", &["b", "c"]);
        let out = concat(&[(&a).into(), (&b).into()], ConcatAxis::Columns, false).expect("concat");
        assert_eq!(out.index(), &Index::from_strs(&["a", "b", "c"]));
        assert!(out.get(2, 0).expect("cell").is_missing());
        assert_eq!(out.get(1, 1), Some(Scalar::Int64(0)));
    }

    #[test]
    fn column_concat_with_differing_duplicated_index_cannot_reindex() {
        let a = series("x", &["a", "a"]);
        let b = series("y", &["a", "b"]);
        let err = concat(&[(&a).into(), (&b).into()], ConcatAxis::Columns, false);
        assert_eq!(err.expect_err("reindex"), FrameError::ReindexDuplicates);
    }

    #[test]
    fn mixed_series_and_frame_rows_union_columns() {
        let frame = DataFrame::from_columns(
            vec!["a".into()],
            vec![("A".into(), vec![Scalar::Int64(1)]), ("x".into(), vec![Scalar::Int64(2)])],
        )
        .expect("frame")
        .with_allows_duplicate_labels(false)
        .expect("strict");
        let s = series("x", &["b"]);

        let out = concat(&[ConcatItem::Frame(&frame), ConcatItem::Series(&s)], ConcatAxis::Index, false)
            .expect("concat");
        assert_eq!(out.columns(), &Index::from_strs(&["A", "x"]));
        assert!(out.get(1, 0).expect("cell").is_missing());
        assert_eq!(out.get(1, 1), Some(Scalar::Int64(0)));
        assert!(!out.allows_duplicate_labels());
    }

    #[test]
    fn policy_variant_records_rejection() {
        let a = strict(series("x", &["a"]));
        let mut ledger = GuardLedger::new();
        let result = concat_with_policy(
            &[(&a).into(), (&a).into()],
            ConcatAxis::Index,
            false,
            &RuntimePolicy::default(),
            &mut ledger,
        );
        assert!(result.is_err());
        assert_eq!(ledger.len(), 1);
        assert!(matches!(ledger.records()[0].outcome, GuardOutcome::Rejected { .. }));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(concat_series(&[], false).is_err());
        assert!(concat(&[], ConcatAxis::Columns, false).is_err());
    }
}
