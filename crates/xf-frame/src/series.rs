use xf_array::{
    ArithmeticOp, ArrayBox, ExtensionArray, Locator, SetValue, array_from_sequence, assign,
    expand_values, resolve_locator,
};
use xf_dtype::Dtype;
use xf_index::{AlignMode, Index, IndexLabel, align, validate_alignment_plan};
use xf_runtime::{GuardLedger, RuntimePolicy};
use xf_types::Scalar;

use crate::accessor::StringAccessor;
use crate::arith::{abs_array, binary_arrays, scalar_array};
use crate::flags::{
    Axis, Flags, Guarded, finalize, finalize_with_policy, revalidate_on_read, sealed,
    set_allows_duplicate_labels,
};
use crate::window::{Ewm, Expanding, Rolling};
use crate::{DataFrame, FrameError, normalize_head_take, normalize_position, normalize_tail_start};

/// One labelled column of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    name: String,
    index: Index,
    values: ArrayBox,
    flags: Flags,
}

impl sealed::FlagSlot for Series {
    fn flags_slot(&mut self) -> &mut Flags {
        &mut self.flags
    }
}

impl Guarded for Series {
    fn flags(&self) -> Flags {
        self.flags
    }

    fn labelled_axes(&self) -> Vec<(Axis, &Index)> {
        vec![(Axis::Index, &self.index)]
    }
}

/// Write `value` at `locator`, widening dense storage when needed. The
/// array is replaced only once every value has validated.
pub(crate) fn assign_into(array: &mut ArrayBox, locator: Locator<'_>, value: SetValue) -> Result<(), FrameError> {
    let targets = resolve_locator(array.as_ref(), locator)?;
    let values = expand_values(&targets, value)?;
    match array.promote_for(&values) {
        Some(mut widened) => {
            assign(widened.as_mut(), &targets.positions, &values)?;
            *array = widened;
        }
        None => assign(array.as_mut(), &targets.positions, &values)?,
    }
    Ok(())
}

impl Series {
    pub fn new(name: impl Into<String>, index: Index, values: ArrayBox) -> Result<Self, FrameError> {
        if index.len() != values.len() {
            return Err(FrameError::LengthMismatch {
                index_len: index.len(),
                values_len: values.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            index,
            values,
            flags: Flags::default(),
        })
    }

    /// Dense series with an inferred dtype.
    pub fn from_values(
        name: impl Into<String>,
        index_labels: Vec<IndexLabel>,
        values: Vec<Scalar>,
    ) -> Result<Self, FrameError> {
        Self::new(name, Index::new(index_labels), array_from_sequence(values, None)?)
    }

    pub fn with_dtype(
        name: impl Into<String>,
        index_labels: Vec<IndexLabel>,
        values: Vec<Scalar>,
        dtype: &Dtype,
    ) -> Result<Self, FrameError> {
        Self::new(name, Index::new(index_labels), array_from_sequence(values, Some(dtype))?)
    }

    /// `value` repeated once per label.
    pub fn broadcast(name: impl Into<String>, value: Scalar, index: Index) -> Result<Self, FrameError> {
        let values = vec![value; index.len()];
        Self::new(name, index, array_from_sequence(values, None)?)
    }

    /// Builder form of [`Series::set_allows_duplicate_labels`].
    pub fn with_allows_duplicate_labels(mut self, allows: bool) -> Result<Self, FrameError> {
        self.set_allows_duplicate_labels(allows)?;
        Ok(self)
    }

    #[must_use]
    pub fn allows_duplicate_labels(&self) -> bool {
        self.flags.allows_duplicate_labels()
    }

    /// Turning the guard on validates the index first; on failure the flag
    /// keeps its previous value.
    pub fn set_allows_duplicate_labels(&mut self, allows: bool) -> Result<(), FrameError> {
        set_allows_duplicate_labels(self, allows)
    }

    #[must_use]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn array(&self) -> &dyn ExtensionArray {
        self.values.as_ref()
    }

    #[must_use]
    pub fn dtype(&self) -> Dtype {
        self.values.dtype()
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
    pub fn values(&self) -> Vec<Scalar> {
        self.values.to_scalars()
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<Scalar> {
        self.values.get(position)
    }

    /// Value at the first occurrence of `label`.
    #[must_use]
    pub fn get_label(&self, label: &IndexLabel) -> Option<Scalar> {
        self.index.position(label).and_then(|pos| self.values.get(pos))
    }

    pub fn get_label_with_policy(
        &self,
        label: &IndexLabel,
        policy: &RuntimePolicy,
        ledger: &mut GuardLedger,
    ) -> Result<Option<Scalar>, FrameError> {
        revalidate_on_read(self, "series.get", policy, ledger)?;
        Ok(self.get_label(label))
    }

    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        self.index == other.index && self.values.equals(other.values.as_ref())
    }

    pub(crate) fn into_parts(self) -> (String, Index, ArrayBox, Flags) {
        (self.name, self.index, self.values, self.flags)
    }

    pub(crate) fn with_parts(&self, name: String, index: Index, values: ArrayBox) -> Self {
        Self {
            name,
            index,
            values,
            flags: self.flags,
        }
    }

    /// Rows at `positions`, unchecked; callers finalize.
    fn take_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        let index = self.index.take(positions)?;
        let slots: Vec<Option<usize>> = positions.iter().copied().map(Some).collect();
        Ok(self.with_parts(self.name.clone(), index, self.values.take(&slots)))
    }

    // ── Assignment ─────────────────────────────────────────────────────

    /// Positional assignment (`s[locator] = value`).
    pub fn setitem(&mut self, locator: Locator<'_>, value: SetValue) -> Result<(), FrameError> {
        assign_into(&mut self.values, locator, value)
    }

    pub fn set_iloc(&mut self, position: i64, value: Scalar) -> Result<(), FrameError> {
        self.setitem(Locator::Position(position), SetValue::Scalar(value))
    }

    /// Label assignment. Every occurrence of an existing label is written;
    /// an unknown label appends a new row.
    pub fn set_loc(&mut self, label: &IndexLabel, value: Scalar) -> Result<(), FrameError> {
        let positions = self.index.positions_of(label);
        if positions.is_empty() {
            return self.enlarge(label.clone(), value);
        }
        let locator = Locator::Positions(positions.iter().map(|&p| p as i64).collect());
        self.setitem(locator, SetValue::Scalar(value))
    }

    /// Assign through a list of existing labels.
    pub fn set_loc_labels(&mut self, labels: &[IndexLabel], value: SetValue) -> Result<(), FrameError> {
        let positions = self.index.positions_for_labels(labels)?;
        self.setitem(
            Locator::Positions(positions.iter().map(|&p| p as i64).collect()),
            value,
        )
    }

    fn enlarge(&mut self, label: IndexLabel, value: Scalar) -> Result<(), FrameError> {
        let len = self.len();
        let mut slots: Vec<Option<usize>> = (0..len).map(Some).collect();
        slots.push(None);
        let mut values = self.values.take(&slots);
        assign_into(&mut values, Locator::Position(len as i64), SetValue::Scalar(value))?;

        let grown = self.with_parts(self.name.clone(), self.index.appended(label), values);
        *self = finalize(grown, &[self.flags], "series.set_loc")?;
        Ok(())
    }

    // ── Selection ──────────────────────────────────────────────────────

    /// Rows for each label in order; a repeated label yields all its rows.
    pub fn loc(&self, labels: &[IndexLabel]) -> Result<Self, FrameError> {
        let positions = self.index.positions_for_labels(labels)?;
        finalize(self.take_rows(&positions)?, &[self.flags], "series.loc")
    }

    pub fn iloc(&self, positions: &[i64]) -> Result<Self, FrameError> {
        let positions = positions
            .iter()
            .map(|&p| normalize_position(p, self.len()))
            .collect::<Result<Vec<_>, _>>()?;
        finalize(self.take_rows(&positions)?, &[self.flags], "series.iloc")
    }

    /// First `n` rows; negative `n` drops the last `-n`.
    pub fn head(&self, n: i64) -> Result<Self, FrameError> {
        let take = normalize_head_take(n, self.len());
        let positions: Vec<usize> = (0..take).collect();
        finalize(self.take_rows(&positions)?, &[self.flags], "series.head")
    }

    /// Last `n` rows; negative `n` drops the first `-n`.
    pub fn tail(&self, n: i64) -> Result<Self, FrameError> {
        let start = normalize_tail_start(n, self.len());
        let positions: Vec<usize> = (start..self.len()).collect();
        finalize(self.take_rows(&positions)?, &[self.flags], "series.tail")
    }

    // ── Relabelling ────────────────────────────────────────────────────

    pub fn rename(&self, name: impl Into<String>) -> Result<Self, FrameError> {
        let out = self.with_parts(name.into(), self.index.clone(), self.values.clone());
        finalize(out, &[self.flags], "series.rename")
    }

    /// Relabel the index through `mapper`.
    pub fn rename_index(&self, mapper: impl Fn(&IndexLabel) -> IndexLabel) -> Result<Self, FrameError> {
        let out = self.with_parts(self.name.clone(), self.index.map_labels(mapper), self.values.clone());
        finalize(out, &[self.flags], "series.rename")
    }

    pub fn to_frame(&self, name: Option<&str>) -> Result<DataFrame, FrameError> {
        let column = IndexLabel::from(name.unwrap_or(self.name.as_str()));
        let frame = DataFrame::new(
            self.index.clone(),
            Index::new(vec![column]),
            vec![self.values.clone()],
        )?;
        finalize(frame, &[self.flags], "series.to_frame")
    }

    pub fn append(&self, other: &Self) -> Result<Self, FrameError> {
        crate::concat_series(&[self, other], false)
    }

    // ── Alignment and arithmetic ───────────────────────────────────────

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
        let plan = align(&self.index, &other.index, mode);
        validate_alignment_plan(&plan)?;
        let flags = [self.flags, other.flags];

        let left = self.with_parts(
            self.name.clone(),
            plan.index.clone(),
            self.values.take(&plan.left_positions),
        );
        let right = other.with_parts(
            other.name.clone(),
            plan.index,
            other.values.take(&plan.right_positions),
        );
        Ok((
            finalize_with_policy(left, &flags, "series.align", policy, ledger)?,
            finalize_with_policy(right, &flags, "series.align", policy, ledger)?,
        ))
    }

    fn binary_op_with_policy(
        &self,
        other: &Self,
        op: ArithmeticOp,
        fill: Option<&Scalar>,
        reversed: bool,
        policy: &RuntimePolicy,
        ledger: &mut GuardLedger,
    ) -> Result<Self, FrameError> {
        let plan = align(&self.index, &other.index, AlignMode::Outer);
        validate_alignment_plan(&plan)?;

        let left = self.values.take(&plan.left_positions);
        let right = other.values.take(&plan.right_positions);
        let values = binary_arrays(left.as_ref(), right.as_ref(), op, fill, reversed)?;

        let name = if self.name == other.name {
            self.name.clone()
        } else {
            String::new()
        };
        let out = self.with_parts(name, plan.index, values);
        finalize_with_policy(out, &[self.flags, other.flags], op_name(op), policy, ledger)
    }

    fn binary_op(&self, other: &Self, op: ArithmeticOp) -> Result<Self, FrameError> {
        let mut ledger = GuardLedger::new();
        self.binary_op_with_policy(other, op, None, false, &RuntimePolicy::default(), &mut ledger)
    }

    pub fn add_with_policy(
        &self,
        other: &Self,
        policy: &RuntimePolicy,
        ledger: &mut GuardLedger,
    ) -> Result<Self, FrameError> {
        self.binary_op_with_policy(other, ArithmeticOp::Add, None, false, policy, ledger)
    }

    pub fn add(&self, other: &Self) -> Result<Self, FrameError> {
        self.binary_op(other, ArithmeticOp::Add)
    }

    pub fn sub_with_policy(
        &self,
        other: &Self,
        policy: &RuntimePolicy,
        ledger: &mut GuardLedger,
    ) -> Result<Self, FrameError> {
        self.binary_op_with_policy(other, ArithmeticOp::Sub, None, false, policy, ledger)
    }

    pub fn sub(&self, other: &Self) -> Result<Self, FrameError> {
        self.binary_op(other, ArithmeticOp::Sub)
    }

    pub fn mul(&self, other: &Self) -> Result<Self, FrameError> {
        self.binary_op(other, ArithmeticOp::Mul)
    }

    pub fn div(&self, other: &Self) -> Result<Self, FrameError> {
        self.binary_op(other, ArithmeticOp::Div)
    }

    /// `self + other` where a value missing on exactly one side is replaced
    /// by `fill_value` first.
    pub fn add_with_fill_value(&self, other: &Self, fill_value: &Scalar) -> Result<Self, FrameError> {
        let mut ledger = GuardLedger::new();
        self.binary_op_with_policy(
            other,
            ArithmeticOp::Add,
            Some(fill_value),
            false,
            &RuntimePolicy::default(),
            &mut ledger,
        )
    }

    /// `other + self`.
    pub fn radd(&self, other: &Self) -> Result<Self, FrameError> {
        let mut ledger = GuardLedger::new();
        self.binary_op_with_policy(
            other,
            ArithmeticOp::Add,
            None,
            true,
            &RuntimePolicy::default(),
            &mut ledger,
        )
    }

    /// `self op scalar`, or `scalar op self` when `reversed`.
    pub fn scalar_op(&self, scalar: &Scalar, op: ArithmeticOp, reversed: bool) -> Result<Self, FrameError> {
        let values = scalar_array(self.values.as_ref(), scalar, op, reversed)?;
        let out = self.with_parts(self.name.clone(), self.index.clone(), values);
        finalize(out, &[self.flags], op_name(op))
    }

    pub fn add_scalar(&self, scalar: &Scalar) -> Result<Self, FrameError> {
        self.scalar_op(scalar, ArithmeticOp::Add, false)
    }

    pub fn sub_scalar(&self, scalar: &Scalar) -> Result<Self, FrameError> {
        self.scalar_op(scalar, ArithmeticOp::Sub, false)
    }

    pub fn radd_scalar(&self, scalar: &Scalar) -> Result<Self, FrameError> {
        self.scalar_op(scalar, ArithmeticOp::Add, true)
    }

    pub fn abs(&self) -> Result<Self, FrameError> {
        let out = self.with_parts(self.name.clone(), self.index.clone(), abs_array(self.values.as_ref())?);
        finalize(out, &[self.flags], "abs")
    }

    // ── Accessors and windows ──────────────────────────────────────────

    #[must_use]
    pub fn str(&self) -> StringAccessor<'_> {
        StringAccessor::new(self)
    }

    /// Sliding window of `window` rows; `min_periods` defaults to `window`.
    #[must_use]
    pub fn rolling(&self, window: usize, min_periods: Option<usize>) -> Rolling<'_> {
        Rolling::new(self, window, min_periods.unwrap_or(window))
    }

    #[must_use]
    pub fn expanding(&self, min_periods: Option<usize>) -> Expanding<'_> {
        Expanding::new(self, min_periods.unwrap_or(1))
    }

    /// Exponentially weighted window with smoothing factor `alpha`.
    pub fn ewm(&self, alpha: f64, adjust: bool) -> Result<Ewm<'_>, FrameError> {
        Ewm::new(self, alpha, adjust)
    }
}

pub(crate) fn op_name(op: ArithmeticOp) -> &'static str {
    match op {
        ArithmeticOp::Add => "add",
        ArithmeticOp::Sub => "sub",
        ArithmeticOp::Mul => "mul",
        ArithmeticOp::Div => "div",
    }
}

#[cfg(test)]
mod tests {
    use xf_array::{ArrayError, ExtensionArray, IndexerKind, Locator, SetValue, SliceSpec, SparseArray, StringArray};
    use xf_dtype::{Dtype, NumpyDtype, SparseDtype, StringDtype};
    use xf_index::{AlignMode, Index, IndexLabel};
    use xf_runtime::{GuardLedger, GuardOutcome, RuntimePolicy};
    use xf_types::{NullKind, Scalar};

    use super::Series;
    use crate::FrameError;

    fn ints(labels: &[&str]) -> Series {
        let values = (0..labels.len()).map(|i| Scalar::Int64(i as i64)).collect();
        Series::from_values("x", Index::from_strs(labels).labels().to_vec(), values).expect("series")
    }

    fn strings(values: &[Option<&str>]) -> Series {
        Series::new(
            "s",
            Index::range(values.len()),
            Box::new(StringArray::from_strs(values.iter().copied())),
        )
        .expect("series")
    }

    fn na() -> Scalar {
        Scalar::Null(NullKind::NaN)
    }

    #[test]
    fn length_mismatch_on_construction() {
        let err = Series::new("x", Index::range(2), Box::new(StringArray::from_strs([Some("a")])));
        assert_eq!(
            err.expect_err("short"),
            FrameError::LengthMismatch {
                index_len: 2,
                values_len: 1
            }
        );
    }

    #[test]
    fn setitem_broadcasts_and_checks_lengths() {
        let mut s = strings(&[Some("a"), Some("b"), Some("c")]);
        s.setitem(Locator::Mask(vec![true, false, true]), Scalar::from("z").into())
            .expect("mask");
        assert_eq!(s.values(), vec![Scalar::from("z"), Scalar::from("b"), Scalar::from("z")]);

        let err = s
            .setitem(
                Locator::Slice(SliceSpec::new(None, Some(2), None)),
                SetValue::Sequence(vec![Scalar::from("q")]),
            )
            .expect_err("short slice");
        assert_eq!(
            err,
            FrameError::Array(ArrayError::SetLengthMismatch {
                kind: IndexerKind::Slice,
                targets: 2,
                values: 1
            })
        );
        assert_eq!(s.get(0), Some(Scalar::from("z")));
    }

    #[test]
    fn setitem_with_callable_mask() {
        let mut s = strings(&[Some("a"), None, Some("c")]);
        s.setitem(
            Locator::MaskFn(Box::new(|values: &[Scalar]| values.iter().map(Scalar::is_missing).collect::<Vec<bool>>())),
            Scalar::from("filled").into(),
        )
        .expect("callable");
        assert_eq!(s.get(1), Some(Scalar::from("filled")));
    }

    #[test]
    fn rejected_write_keeps_string_dtype_and_values() {
        let mut s = strings(&[Some("a"), Some("b")]);
        let err = s.set_iloc(0, Scalar::Int64(1)).expect_err("non-string");
        assert!(matches!(err, FrameError::Array(ArrayError::Type(_))));
        assert_eq!(s.dtype(), Dtype::String(StringDtype));
        assert_eq!(s.get(0), Some(Scalar::from("a")));
    }

    #[test]
    fn dense_series_widen_on_write() {
        let mut s = ints(&["a", "b"]);
        s.set_iloc(-1, Scalar::Float64(2.5)).expect("widen");
        assert_eq!(s.dtype(), Dtype::Numpy(NumpyDtype::Float64));
        assert_eq!(s.values(), vec![Scalar::Float64(0.0), Scalar::Float64(2.5)]);
    }

    #[test]
    fn sparse_series_keep_sparse_dtype() {
        let arr = SparseArray::from_sequence(vec![Scalar::Int64(0), Scalar::Int64(0)], None).expect("sparse");
        let mut s = Series::new("sp", Index::range(2), Box::new(arr)).expect("series");
        s.setitem(Locator::Position(1), Scalar::Int64(4).into()).expect("write");
        assert_eq!(s.dtype(), Dtype::Sparse(SparseDtype::new(NumpyDtype::Int64, None)));
        assert_eq!(s.get(1), Some(Scalar::Int64(4)));
    }

    #[test]
    fn set_loc_writes_every_occurrence_and_enlarges() {
        let mut s = ints(&["a", "b", "a"]);
        s.set_loc(&"a".into(), Scalar::Int64(9)).expect("dup label");
        assert_eq!(s.values(), vec![Scalar::Int64(9), Scalar::Int64(1), Scalar::Int64(9)]);

        s.set_loc(&"z".into(), Scalar::Int64(5)).expect("enlarge");
        assert_eq!(s.len(), 4);
        assert_eq!(s.get_label(&"z".into()), Some(Scalar::Int64(5)));
    }

    #[test]
    fn strict_series_enlarges_with_new_label() {
        let mut s = ints(&["a", "b"]).with_allows_duplicate_labels(false).expect("strict");
        s.set_loc(&"c".into(), Scalar::Int64(2)).expect("enlarge");
        assert!(!s.allows_duplicate_labels());
        assert_eq!(s.index(), &Index::from_strs(&["a", "b", "c"]));
    }

    #[test]
    fn failed_guard_leaves_flag_permissive() {
        let mut s = ints(&["a", "a"]);
        let err = s.set_allows_duplicate_labels(false).expect_err("duplicates");
        assert_eq!(err.to_string(), "index has duplicates: [a]");
        assert!(s.allows_duplicate_labels());

        let mut strict = ints(&["a", "b"]).with_allows_duplicate_labels(false).expect("strict");
        strict.set_allows_duplicate_labels(true).expect("relax");
        assert!(strict.allows_duplicate_labels());
    }

    #[test]
    fn strict_selection_rejects_repeats() {
        let s = ints(&["a", "b"]).with_allows_duplicate_labels(false).expect("strict");
        assert!(matches!(s.loc(&["a".into(), "a".into()]), Err(FrameError::DuplicateLabel(_))));
        assert!(matches!(s.iloc(&[0, 0]), Err(FrameError::DuplicateLabel(_))));
        assert!(s.head(1).expect("head").flags().is_strict());

        let loose = ints(&["a", "b"]);
        assert_eq!(loose.iloc(&[0, 0]).expect("iloc").len(), 2);
    }

    #[test]
    fn strict_rename_cannot_collapse_labels() {
        let s = ints(&["a", "b"]).with_allows_duplicate_labels(false).expect("strict");
        assert!(s.rename_index(|_| IndexLabel::from("same")).is_err());
        let renamed = s.rename("y").expect("rename");
        assert_eq!(renamed.name(), "y");
        assert!(!renamed.allows_duplicate_labels());
    }

    #[test]
    fn string_add_with_fill_value() {
        let left = strings(&[Some("a"), Some("b"), Some("c"), None, None]);
        let right = strings(&[Some("x"), Some("y"), None, Some("z"), None]);
        let out = left.add_with_fill_value(&right, &Scalar::from("-")).expect("add");
        assert_eq!(
            out.values(),
            vec![Scalar::from("ax"), Scalar::from("by"), Scalar::from("c-"), Scalar::from("-z"), na()]
        );
        assert_eq!(out.dtype(), Dtype::String(StringDtype));

        let plain = left.add(&right).expect("add");
        assert!(plain.array().is_missing(2));
        let reversed = left.radd(&right).expect("radd");
        assert_eq!(reversed.get(0), Some(Scalar::from("xa")));
    }

    #[test]
    fn arithmetic_aligns_and_propagates() {
        let strict = ints(&["a", "b"]).with_allows_duplicate_labels(false).expect("strict");
        let dup = ints(&["a", "a"]);
        assert!(matches!(strict.add(&dup), Err(FrameError::DuplicateLabel(_))));
        assert!(matches!(dup.sub(&strict), Err(FrameError::DuplicateLabel(_))));

        let other = ints(&["b", "c"]);
        let out = strict.add(&other).expect("add");
        assert_eq!(out.index(), &Index::from_strs(&["a", "b", "c"]));
        assert_eq!(out.get(1), Some(Scalar::Int64(1)));
        assert!(out.array().is_missing(0));
        assert!(!out.allows_duplicate_labels());
    }

    #[test]
    fn scalar_ops_and_abs_propagate() {
        let s = ints(&["a", "b"]).with_allows_duplicate_labels(false).expect("strict");
        let out = s.sub_scalar(&Scalar::Int64(3)).expect("sub");
        assert_eq!(out.values(), vec![Scalar::Int64(-3), Scalar::Int64(-2)]);
        let out = out.abs().expect("abs");
        assert_eq!(out.values(), vec![Scalar::Int64(3), Scalar::Int64(2)]);
        assert!(!out.allows_duplicate_labels());
        assert_eq!(
            s.radd_scalar(&Scalar::Int64(1)).expect("radd").values(),
            vec![Scalar::Int64(1), Scalar::Int64(2)]
        );
    }

    #[test]
    fn align_pairs_duplicates_when_permissive() {
        let left = ints(&["a", "a", "b"]);
        let right = ints(&["a", "c"]);
        let (l, r) = left.align(&right, AlignMode::Outer).expect("align");
        assert_eq!(l.index(), &Index::from_strs(&["a", "a", "b", "c"]));
        assert_eq!(l.index(), r.index());

        let strict_right = right.with_allows_duplicate_labels(false).expect("strict");
        assert!(left.align(&strict_right, AlignMode::Outer).is_err());
    }

    #[test]
    fn to_frame_and_append_propagate() {
        let s = ints(&["a", "b"]).with_allows_duplicate_labels(false).expect("strict");
        let frame = s.to_frame(Some("col")).expect("to_frame");
        assert_eq!(frame.columns(), &Index::from_strs(&["col"]));
        assert!(!frame.allows_duplicate_labels());

        assert!(s.append(&ints(&["b"])).is_err());
        assert_eq!(s.append(&ints(&["c"])).expect("append").len(), 3);
    }

    #[test]
    fn read_revalidation_is_opt_in() {
        let s = ints(&["a", "b"]).with_allows_duplicate_labels(false).expect("strict");
        let mut ledger = GuardLedger::new();
        s.get_label_with_policy(&"a".into(), &RuntimePolicy::default(), &mut ledger)
            .expect("read");
        assert!(ledger.is_empty());

        let policy = RuntimePolicy {
            revalidate_strict_on_read: true,
            ..RuntimePolicy::default()
        };
        let value = s.get_label_with_policy(&"b".into(), &policy, &mut ledger).expect("read");
        assert_eq!(value, Some(Scalar::Int64(1)));
        assert_eq!(ledger.records()[0].outcome, GuardOutcome::StrictValidated);
    }

    #[test]
    fn policy_arithmetic_records_guard_outcome() {
        let strict = ints(&["a", "b"]).with_allows_duplicate_labels(false).expect("strict");
        let mut ledger = GuardLedger::new();
        strict
            .add_with_policy(&ints(&["a", "b"]), &RuntimePolicy::default(), &mut ledger)
            .expect("add");
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.records()[0].operation, "add");
        assert_eq!(ledger.records()[0].strict_inputs, 1);
    }
}
