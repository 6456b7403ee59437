use xf_array::{
    ArithmeticOp, ArrayBox, DenseArray, ExtensionArray, Locator, SetValue, SliceSpec,
    array_from_sequence, missing_like,
};
use xf_dtype::{Dtype, NumpyDtype};
use xf_index::{AlignMode, Index, IndexLabel, align, validate_alignment_plan};
use xf_runtime::{GuardLedger, RuntimePolicy};
use xf_types::{NullKind, Scalar};

use crate::arith::{abs_array, binary_arrays, scalar_array};
use crate::flags::{
    Axis, Flags, Guarded, finalize, finalize_with_policy, revalidate_on_read, sealed,
    set_allows_duplicate_labels,
};
use crate::series::{assign_into, op_name};
use crate::{
    ConcatAxis, ConcatItem, FrameError, Series, concat, normalize_head_take, normalize_position,
    normalize_tail_start,
};

/// Two-dimensional labelled table: one extension array per column.
///
/// Column labels may repeat while the frame is permissive.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    index: Index,
    columns: Index,
    data: Vec<ArrayBox>,
    flags: Flags,
}

impl sealed::FlagSlot for DataFrame {
    fn flags_slot(&mut self) -> &mut Flags {
        &mut self.flags
    }
}

impl Guarded for DataFrame {
    fn flags(&self) -> Flags {
        self.flags
    }

    fn labelled_axes(&self) -> Vec<(Axis, &Index)> {
        vec![(Axis::Index, &self.index), (Axis::Columns, &self.columns)]
    }
}

impl DataFrame {
    pub fn new(index: Index, columns: Index, data: Vec<ArrayBox>) -> Result<Self, FrameError> {
        if columns.len() != data.len() {
            return Err(FrameError::ColumnCountMismatch {
                columns: columns.len(),
                data: data.len(),
            });
        }
        if let Some(bad) = data.iter().find(|array| array.len() != index.len()) {
            return Err(FrameError::LengthMismatch {
                index_len: index.len(),
                values_len: bad.len(),
            });
        }
        Ok(Self {
            index,
            columns,
            data,
            flags: Flags::default(),
        })
    }

    /// Dense columns with inferred dtypes, in the given order.
    pub fn from_columns(
        index_labels: Vec<IndexLabel>,
        columns: Vec<(IndexLabel, Vec<Scalar>)>,
    ) -> Result<Self, FrameError> {
        let mut labels = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        for (label, values) in columns {
            labels.push(label);
            data.push(array_from_sequence(values, None)?);
        }
        Self::new(Index::new(index_labels), Index::new(labels), data)
    }

    pub fn with_allows_duplicate_labels(mut self, allows: bool) -> Result<Self, FrameError> {
        self.set_allows_duplicate_labels(allows)?;
        Ok(self)
    }

    #[must_use]
    pub fn allows_duplicate_labels(&self) -> bool {
        self.flags.allows_duplicate_labels()
    }

    /// Turning the guard on validates rows and columns first; on failure the
    /// flag keeps its previous value.
    pub fn set_allows_duplicate_labels(&mut self, allows: bool) -> Result<(), FrameError> {
        set_allows_duplicate_labels(self, allows)
    }

    #[must_use]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn columns(&self) -> &Index {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn dtypes(&self) -> Vec<Dtype> {
        self.data.iter().map(|array| array.dtype()).collect()
    }

    /// Array stored at column position `position`.
    #[must_use]
    pub fn column_array(&self, position: usize) -> Option<&dyn ExtensionArray> {
        self.data.get(position).map(|array| array.as_ref())
    }

    #[must_use]
    pub fn get(&self, row: usize, column: usize) -> Option<Scalar> {
        self.data.get(column).and_then(|array| array.get(row))
    }

    /// Value at the first occurrence of `row` and `column`.
    #[must_use]
    pub fn get_label(&self, row: &IndexLabel, column: &IndexLabel) -> Option<Scalar> {
        let col = self.columns.position(column)?;
        let row = self.index.position(row)?;
        self.get(row, col)
    }

    pub fn get_label_with_policy(
        &self,
        row: &IndexLabel,
        column: &IndexLabel,
        policy: &RuntimePolicy,
        ledger: &mut GuardLedger,
    ) -> Result<Option<Scalar>, FrameError> {
        revalidate_on_read(self, "frame.get", policy, ledger)?;
        Ok(self.get_label(row, column))
    }

    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        self.index == other.index
            && self.columns == other.columns
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(l, r)| l.equals(r.as_ref()))
    }

    fn with_parts(&self, index: Index, columns: Index, data: Vec<ArrayBox>) -> Self {
        Self {
            index,
            columns,
            data,
            flags: self.flags,
        }
    }

    pub(crate) fn data(&self) -> &[ArrayBox] {
        &self.data
    }

    fn take_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        let index = self.index.take(positions)?;
        let slots: Vec<Option<usize>> = positions.iter().copied().map(Some).collect();
        let data = self.data.iter().map(|array| array.take(&slots)).collect();
        Ok(self.with_parts(index, self.columns.clone(), data))
    }

    // ── Selection ──────────────────────────────────────────────────────

    /// Column `label` as a series. A repeated column label yields its first
    /// occurrence.
    pub fn column(&self, label: &IndexLabel) -> Result<Series, FrameError> {
        let position = self
            .columns
            .position(label)
            .ok_or_else(|| FrameError::ColumnNotFound(label.clone()))?;
        let series = Series::new(label.to_string(), self.index.clone(), self.data[position].clone())?;
        finalize(series, &[self.flags], "frame.column")
    }

    /// Columns for each label in order; repeated labels repeat columns.
    pub fn select_columns(&self, labels: &[IndexLabel]) -> Result<Self, FrameError> {
        let positions = self.columns.positions_for_labels(labels)?;
        let columns = self.columns.take(&positions)?;
        let data = positions.iter().map(|&p| self.data[p].clone()).collect();
        finalize(self.with_parts(self.index.clone(), columns, data), &[self.flags], "frame.getitem")
    }

    pub fn loc(&self, labels: &[IndexLabel]) -> Result<Self, FrameError> {
        let positions = self.index.positions_for_labels(labels)?;
        finalize(self.take_rows(&positions)?, &[self.flags], "frame.loc")
    }

    pub fn iloc(&self, positions: &[i64]) -> Result<Self, FrameError> {
        let positions = positions
            .iter()
            .map(|&p| normalize_position(p, self.len()))
            .collect::<Result<Vec<_>, _>>()?;
        finalize(self.take_rows(&positions)?, &[self.flags], "frame.iloc")
    }

    pub fn head(&self, n: i64) -> Result<Self, FrameError> {
        let positions: Vec<usize> = (0..normalize_head_take(n, self.len())).collect();
        finalize(self.take_rows(&positions)?, &[self.flags], "frame.head")
    }

    pub fn tail(&self, n: i64) -> Result<Self, FrameError> {
        let positions: Vec<usize> = (normalize_tail_start(n, self.len())..self.len()).collect();
        finalize(self.take_rows(&positions)?, &[self.flags], "frame.tail")
    }

    // ── Assignment ─────────────────────────────────────────────────────

    fn new_column_array(&self, value: SetValue) -> Result<ArrayBox, FrameError> {
        let array = match value {
            SetValue::Scalar(v) => array_from_sequence(vec![v; self.len()], None)?,
            SetValue::Sequence(values) => array_from_sequence(values, None)?,
            SetValue::Array(array) => array,
        };
        if array.len() != self.len() {
            return Err(FrameError::LengthMismatch {
                index_len: self.len(),
                values_len: array.len(),
            });
        }
        Ok(array)
    }

    /// `df[label] = value`. The column is replaced wholesale: an array keeps
    /// its own dtype, a scalar or sequence gets its inferred dense dtype. An
    /// unknown label appends a column.
    pub fn set_column(&mut self, label: IndexLabel, value: SetValue) -> Result<(), FrameError> {
        let array = self.new_column_array(value)?;
        let positions = self.columns.positions_of(&label);
        if positions.is_empty() {
            self.columns = self.columns.appended(label);
            self.data.push(array);
            return Ok(());
        }
        for position in positions {
            self.data[position] = array.clone();
        }
        Ok(())
    }

    /// `df.loc[:, label] = value`. Existing columns are written in place and
    /// keep their dtype unless it must widen.
    pub fn set_loc_column(&mut self, label: IndexLabel, value: SetValue) -> Result<(), FrameError> {
        let positions = self.columns.positions_of(&label);
        if positions.is_empty() {
            return self.set_column(label, value);
        }
        let mut updated = Vec::with_capacity(positions.len());
        for &position in &positions {
            let mut array = self.data[position].clone();
            assign_into(&mut array, Locator::Slice(SliceSpec::full()), value.clone())?;
            updated.push(array);
        }
        for (position, array) in positions.into_iter().zip(updated) {
            self.data[position] = array;
        }
        Ok(())
    }

    /// `df.loc[row, column] = value`. Unknown rows enlarge the frame with
    /// missing values in the other columns; unknown columns are created as
    /// all-missing float columns before the write.
    pub fn set_loc(&mut self, row: &IndexLabel, column: &IndexLabel, value: Scalar) -> Result<(), FrameError> {
        let mut work = self.clone();
        if !work.columns.contains(column) {
            let missing = nan_column(work.len())?;
            work.columns = work.columns.appended(column.clone());
            work.data.push(missing);
        }
        let mut rows = work.index.positions_of(row);
        if rows.is_empty() {
            let len = work.len();
            let mut slots: Vec<Option<usize>> = (0..len).map(Some).collect();
            slots.push(None);
            work.data = work.data.iter().map(|array| array.take(&slots)).collect();
            work.index = work.index.appended(row.clone());
            rows = vec![len];
        }

        let locator: Vec<i64> = rows.iter().map(|&r| r as i64).collect();
        for position in work.columns.positions_of(column) {
            assign_into(
                &mut work.data[position],
                Locator::Positions(locator.clone()),
                SetValue::Scalar(value.clone()),
            )?;
        }
        *self = finalize(work, &[self.flags], "frame.set_loc")?;
        Ok(())
    }

    pub fn set_iloc(&mut self, row: i64, column: i64, value: Scalar) -> Result<(), FrameError> {
        let column = normalize_position(column, self.num_columns())?;
        assign_into(&mut self.data[column], Locator::Position(row), SetValue::Scalar(value))
    }

    // ── Relabelling ────────────────────────────────────────────────────

    pub fn rename_columns(&self, mapper: impl Fn(&IndexLabel) -> IndexLabel) -> Result<Self, FrameError> {
        let out = self.with_parts(self.index.clone(), self.columns.map_labels(mapper), self.data.clone());
        finalize(out, &[self.flags], "frame.rename")
    }

    pub fn rename_index(&self, mapper: impl Fn(&IndexLabel) -> IndexLabel) -> Result<Self, FrameError> {
        let out = self.with_parts(self.index.map_labels(mapper), self.columns.clone(), self.data.clone());
        finalize(out, &[self.flags], "frame.rename")
    }

    pub fn append(&self, other: &Self) -> Result<Self, FrameError> {
        concat(&[ConcatItem::Frame(self), ConcatItem::Frame(other)], ConcatAxis::Index, false)
    }

    // ── Alignment and arithmetic ───────────────────────────────────────

    /// Re-lay both frames onto the rows and columns picked by `mode`.
    pub fn align(&self, other: &Self, mode: AlignMode) -> Result<(Self, Self), FrameError> {
        let mut ledger = GuardLedger::new();
        self.align_with_policy(other, mode, &RuntimePolicy::default(), &mut ledger)
    }

    pub fn align_with_policy(
        &self,
        other: &Self,
        mode: AlignMode,
        policy: &RuntimePolicy,
        ledger: &mut GuardLedger,
    ) -> Result<(Self, Self), FrameError> {
        let rows = align(&self.index, &other.index, mode);
        validate_alignment_plan(&rows)?;
        let cols = align(&self.columns, &other.columns, mode);
        validate_alignment_plan(&cols)?;

        let left_data = relayout(self, &rows.left_positions, &cols.left_positions, other, &cols.right_positions)?;
        let right_data = relayout(other, &rows.right_positions, &cols.right_positions, self, &cols.left_positions)?;
        let flags = [self.flags, other.flags];

        let left = self.with_parts(rows.index.clone(), cols.index.clone(), left_data);
        let right = other.with_parts(rows.index, cols.index, right_data);
        Ok((
            finalize_with_policy(left, &flags, "frame.align", policy, ledger)?,
            finalize_with_policy(right, &flags, "frame.align", policy, ledger)?,
        ))
    }

    fn binary_op_with_policy(
        &self,
        other: &Self,
        op: ArithmeticOp,
        policy: &RuntimePolicy,
        ledger: &mut GuardLedger,
    ) -> Result<Self, FrameError> {
        let rows = align(&self.index, &other.index, AlignMode::Outer);
        validate_alignment_plan(&rows)?;
        let cols = align(&self.columns, &other.columns, AlignMode::Outer);
        validate_alignment_plan(&cols)?;

        let left = relayout(self, &rows.left_positions, &cols.left_positions, other, &cols.right_positions)?;
        let right = relayout(other, &rows.right_positions, &cols.right_positions, self, &cols.left_positions)?;
        let data = left
            .iter()
            .zip(&right)
            .map(|(l, r)| binary_arrays(l.as_ref(), r.as_ref(), op, None, false))
            .collect::<Result<Vec<_>, _>>()?;

        let out = self.with_parts(rows.index, cols.index, data);
        finalize_with_policy(out, &[self.flags, other.flags], op_name(op), policy, ledger)
    }

    pub fn add_with_policy(
        &self,
        other: &Self,
        policy: &RuntimePolicy,
        ledger: &mut GuardLedger,
    ) -> Result<Self, FrameError> {
        self.binary_op_with_policy(other, ArithmeticOp::Add, policy, ledger)
    }

    pub fn add(&self, other: &Self) -> Result<Self, FrameError> {
        let mut ledger = GuardLedger::new();
        self.binary_op_with_policy(other, ArithmeticOp::Add, &RuntimePolicy::default(), &mut ledger)
    }

    pub fn sub(&self, other: &Self) -> Result<Self, FrameError> {
        let mut ledger = GuardLedger::new();
        self.binary_op_with_policy(other, ArithmeticOp::Sub, &RuntimePolicy::default(), &mut ledger)
    }

    pub fn mul(&self, other: &Self) -> Result<Self, FrameError> {
        let mut ledger = GuardLedger::new();
        self.binary_op_with_policy(other, ArithmeticOp::Mul, &RuntimePolicy::default(), &mut ledger)
    }

    pub fn div(&self, other: &Self) -> Result<Self, FrameError> {
        let mut ledger = GuardLedger::new();
        self.binary_op_with_policy(other, ArithmeticOp::Div, &RuntimePolicy::default(), &mut ledger)
    }

    /// Apply `op` between every column and `scalar`.
    pub fn scalar_op(&self, scalar: &Scalar, op: ArithmeticOp, reversed: bool) -> Result<Self, FrameError> {
        let data = self
            .data
            .iter()
            .map(|array| scalar_array(array.as_ref(), scalar, op, reversed))
            .collect::<Result<Vec<_>, _>>()?;
        let out = self.with_parts(self.index.clone(), self.columns.clone(), data);
        finalize(out, &[self.flags], op_name(op))
    }

    pub fn add_scalar(&self, scalar: &Scalar) -> Result<Self, FrameError> {
        self.scalar_op(scalar, ArithmeticOp::Add, false)
    }

    pub fn sub_scalar(&self, scalar: &Scalar) -> Result<Self, FrameError> {
        self.scalar_op(scalar, ArithmeticOp::Sub, false)
    }

    pub fn mul_scalar(&self, scalar: &Scalar) -> Result<Self, FrameError> {
        self.scalar_op(scalar, ArithmeticOp::Mul, false)
    }

    pub fn div_scalar(&self, scalar: &Scalar) -> Result<Self, FrameError> {
        self.scalar_op(scalar, ArithmeticOp::Div, false)
    }

    pub fn abs(&self) -> Result<Self, FrameError> {
        let data = self
            .data
            .iter()
            .map(|array| abs_array(array.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let out = self.with_parts(self.index.clone(), self.columns.clone(), data);
        finalize(out, &[self.flags], "abs")
    }
}

/// All-missing float column, used for columns that exist on neither side.
fn nan_column(len: usize) -> Result<ArrayBox, FrameError> {
    Ok(Box::new(DenseArray::new(
        NumpyDtype::Float64,
        vec![Scalar::Null(NullKind::NaN); len],
    )?))
}

/// Columns of `frame` laid out on aligned `rows` and `cols`. A column the
/// frame lacks becomes all-missing, typed after the counterpart column of
/// `other` at `other_cols`.
fn relayout(
    frame: &DataFrame,
    rows: &[Option<usize>],
    cols: &[Option<usize>],
    other: &DataFrame,
    other_cols: &[Option<usize>],
) -> Result<Vec<ArrayBox>, FrameError> {
    cols.iter()
        .zip(other_cols)
        .map(|(slot, other_slot)| match (slot, other_slot) {
            (Some(c), _) => Ok(frame.data[*c].take(rows)),
            (None, Some(c)) => Ok(missing_like(other.data[*c].as_ref(), rows.len())),
            (None, None) => nan_column(rows.len()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use xf_array::{ExtensionArray, SetValue, SparseArray, StringArray};
    use xf_dtype::{Dtype, NumpyDtype, SparseDtype, StringDtype};
    use xf_index::{AlignMode, Index, IndexLabel};
    use xf_types::Scalar;

    use super::DataFrame;
    use crate::FrameError;

    fn frame(rows: &[&str], cols: &[&str]) -> DataFrame {
        let columns = cols
            .iter()
            .enumerate()
            .map(|(j, c)| {
                let values = (0..rows.len()).map(|i| Scalar::Int64((i * 10 + j) as i64)).collect();
                (IndexLabel::from(*c), values)
            })
            .collect();
        DataFrame::from_columns(Index::from_strs(rows).labels().to_vec(), columns).expect("frame")
    }

    #[test]
    fn strict_construction_rejects_duplicate_columns() {
        let err = frame(&["a", "b"], &["A", "A"])
            .with_allows_duplicate_labels(false)
            .expect_err("duplicate columns");
        let FrameError::DuplicateLabel(dup) = err else {
            panic!("expected duplicate label error");
        };
        assert_eq!(dup.axis, crate::Axis::Columns);
        assert_eq!(dup.labels, vec![IndexLabel::from("A")]);
    }

    #[test]
    fn strict_selection_cannot_repeat_labels() {
        let df = frame(&["a", "b"], &["A", "B"])
            .with_allows_duplicate_labels(false)
            .expect("strict");
        assert!(df.loc(&["a".into(), "a".into()]).is_err());
        assert!(df.iloc(&[0, 0]).is_err());
        assert!(df.select_columns(&["A".into(), "A".into()]).is_err());

        let ok = df.loc(&["b".into()]).expect("single row");
        assert!(!ok.allows_duplicate_labels());
    }

    #[test]
    fn permissive_selection_keeps_repeats() {
        let df = frame(&["a", "b"], &["A"]);
        let out = df.iloc(&[0, 0, -1]).expect("iloc");
        assert_eq!(out.index(), &Index::from_strs(&["a", "a", "b"]));
        assert!(out.allows_duplicate_labels());
    }

    #[test]
    fn set_column_adopts_array_dtype() {
        let mut df = frame(&["a", "b", "c"], &["A"]);
        let sparse = SparseArray::from_sequence(
            vec![Scalar::Int64(0), Scalar::Int64(2), Scalar::Int64(0)],
            None,
        )
        .expect("sparse");
        df.set_column("S".into(), SetValue::Array(Box::new(sparse))).expect("set");
        assert_eq!(
            df.dtypes()[1],
            Dtype::Sparse(SparseDtype::new(NumpyDtype::Int64, None))
        );

        df.set_column("T".into(), SetValue::Array(Box::new(StringArray::from_strs([Some("x"), None, Some("z")]))))
            .expect("set strings");
        assert_eq!(df.dtypes()[2], Dtype::String(StringDtype));

        df.set_column("A".into(), Scalar::from(1.5).into()).expect("overwrite");
        assert_eq!(df.dtypes()[0], Dtype::Numpy(NumpyDtype::Float64));
        assert_eq!(df.num_columns(), 3);
    }

    #[test]
    fn set_column_rejects_wrong_length() {
        let mut df = frame(&["a", "b"], &["A"]);
        let err = df
            .set_column("B".into(), SetValue::Sequence(vec![Scalar::Int64(1)]))
            .expect_err("short");
        assert!(matches!(err, FrameError::LengthMismatch { .. }));
        assert_eq!(df.num_columns(), 1);
    }

    #[test]
    fn set_loc_enlarges_rows_and_columns() {
        let mut df = frame(&["a", "b"], &["A"]);
        df.set_loc(&"c".into(), &"A".into(), Scalar::Int64(7)).expect("new row");
        assert_eq!(df.len(), 3);
        assert_eq!(df.get(2, 0), Some(Scalar::Int64(7)));

        df.set_loc(&"a".into(), &"B".into(), Scalar::Float64(2.5)).expect("new column");
        assert_eq!(df.num_columns(), 2);
        assert_eq!(df.get(0, 1), Some(Scalar::Float64(2.5)));
        assert!(df.column_array(1).expect("B").is_missing(1));
    }

    #[test]
    fn set_loc_column_keeps_string_dtype() {
        let mut df = frame(&["a", "b"], &["A"]);
        df.set_column("S".into(), SetValue::Array(Box::new(StringArray::from_strs([Some("x"), Some("y")]))))
            .expect("strings");
        df.set_loc_column("S".into(), Scalar::from("q").into()).expect("broadcast");
        assert_eq!(df.dtypes()[1], Dtype::String(StringDtype));
        assert_eq!(df.get(1, 1), Some(Scalar::from("q")));

        let err = df.set_loc_column("S".into(), Scalar::Int64(1).into());
        assert!(err.is_err());
        assert_eq!(df.get(0, 1), Some(Scalar::from("q")));
    }

    #[test]
    fn set_iloc_writes_single_cell() {
        let mut df = frame(&["a", "b"], &["A", "B"]);
        df.set_iloc(-1, -1, Scalar::Int64(99)).expect("write");
        assert_eq!(df.get(1, 1), Some(Scalar::Int64(99)));
        assert!(df.set_iloc(5, 0, Scalar::Int64(1)).is_err());
    }

    #[test]
    fn frame_arithmetic_aligns_both_axes() {
        let left = frame(&["a", "b"], &["A", "B"]);
        let right = frame(&["b", "c"], &["B", "C"]);
        let out = left.add(&right).expect("add");
        assert_eq!(out.index(), &Index::from_strs(&["a", "b", "c"]));
        assert_eq!(out.columns(), &Index::from_strs(&["A", "B", "C"]));
        assert_eq!(out.get_label(&"b".into(), &"B".into()), Some(Scalar::Int64(11)));
        assert!(out.get_label(&"a".into(), &"A".into()).expect("cell").is_missing());
    }

    #[test]
    fn arithmetic_and_rename_propagate_strictness() {
        let strict = frame(&["a", "b"], &["A"]).with_allows_duplicate_labels(false).expect("strict");
        let loose = frame(&["a", "b"], &["A"]);
        assert!(!strict.add(&loose).expect("add").allows_duplicate_labels());
        assert!(!loose.add(&strict).expect("radd").allows_duplicate_labels());
        assert!(!strict.add_scalar(&Scalar::Int64(1)).expect("scalar").allows_duplicate_labels());
        assert!(!strict.abs().expect("abs").allows_duplicate_labels());

        let err = strict.rename_index(|_| IndexLabel::from("x"));
        assert!(matches!(err, Err(FrameError::DuplicateLabel(_))));
        let err = strict.rename_columns(|_| IndexLabel::from("x"));
        assert!(err.is_ok());
    }

    #[test]
    fn align_both_axes_propagates() {
        let strict = frame(&["a", "b"], &["A"]).with_allows_duplicate_labels(false).expect("strict");
        let loose = frame(&["b", "c"], &["B"]);
        let (l, r) = strict.align(&loose, AlignMode::Outer).expect("align");
        assert!(!l.allows_duplicate_labels());
        assert!(!r.allows_duplicate_labels());
        assert_eq!(l.columns(), r.columns());
        assert_eq!(l.len(), 3);
    }

    #[test]
    fn column_getitem_carries_flag() {
        let df = frame(&["a", "b"], &["A"]).with_allows_duplicate_labels(false).expect("strict");
        let col = df.column(&"A".into()).expect("column");
        assert_eq!(col.name(), "A");
        assert!(!col.allows_duplicate_labels());
        assert!(matches!(df.column(&"Z".into()), Err(FrameError::ColumnNotFound(_))));
    }

    #[test]
    fn head_and_tail_keep_flag() {
        let df = frame(&["a", "b", "c"], &["A"]).with_allows_duplicate_labels(false).expect("strict");
        assert_eq!(df.head(2).expect("head").len(), 2);
        assert_eq!(df.tail(-1).expect("tail").index(), &Index::from_strs(&["b", "c"]));
        assert!(!df.tail(1).expect("tail").allows_duplicate_labels());
    }
}
