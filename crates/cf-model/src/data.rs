//! N-dimensional data arrays with units and an optional mask.

use std::fmt;

use ndarray::{concatenate, Array1, ArrayD, Axis, IxDyn};

use crate::error::{ModelError, ModelResult};
use crate::units::Units;

/// Typed array storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Float(ArrayD<f64>),
    Int(ArrayD<i64>),
    Text(ArrayD<String>),
}

/// Apply a shape-generic array expression to whichever variant is held.
macro_rules! map_values {
    ($values:expr, $a:ident => $body:expr) => {
        match $values {
            Values::Float($a) => Values::Float($body),
            Values::Int($a) => Values::Int($body),
            Values::Text($a) => Values::Text($body),
        }
    };
}

impl Values {
    pub fn shape(&self) -> &[usize] {
        match self {
            Values::Float(a) => a.shape(),
            Values::Int(a) => a.shape(),
            Values::Text(a) => a.shape(),
        }
    }

    pub fn dtype_name(&self) -> &'static str {
        match self {
            Values::Float(_) => "float64",
            Values::Int(_) => "int64",
            Values::Text(_) => "str",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Values::Text(_))
    }

    /// Numeric values widened to `f64`; text is returned unchanged.
    pub fn to_float(&self) -> Values {
        match self {
            Values::Int(a) => Values::Float(a.mapv(|v| v as f64)),
            other => other.clone(),
        }
    }

    /// Element-wise closeness: `|a - b| <= atol + rtol * |b|` for numbers,
    /// exact equality for text. Values of different kinds never match.
    pub fn allclose(&self, other: &Values, rtol: f64, atol: f64) -> bool {
        if self.shape() != other.shape() {
            return false;
        }
        match (self, other) {
            (Values::Text(a), Values::Text(b)) => a == b,
            (Values::Text(_), _) | (_, Values::Text(_)) => false,
            (a, b) => match (a.to_float(), b.to_float()) {
                (Values::Float(a), Values::Float(b)) => a
                    .iter()
                    .zip(b.iter())
                    .all(|(x, y)| (x - y).abs() <= atol + rtol * y.abs()),
                _ => false,
            },
        }
    }

    fn permuted(&self, order: &[usize]) -> Values {
        map_values!(self, a => a.clone().permuted_axes(IxDyn(order)).as_standard_layout().into_owned())
    }

    fn reversed(&self, axis: usize) -> Values {
        map_values!(self, a => {
            let mut a = a.clone();
            a.invert_axis(Axis(axis));
            a.as_standard_layout().into_owned()
        })
    }

    fn selected(&self, axis: usize, indices: &[usize]) -> Values {
        map_values!(self, a => a.select(Axis(axis), indices))
    }

    fn with_axis(&self, position: usize) -> Values {
        map_values!(self, a => a.clone().insert_axis(Axis(position)))
    }
}

/// A single element read out of a data array.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(v) => write!(f, "{}", v),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// Opaque token identifying the on-disk source of a data array. Arrays
/// sharing a token are assumed to hold identical values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilePointer(pub String);

impl FilePointer {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

/// An array together with its units, optional mask and optional source.
#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    values: Values,
    mask: Option<ArrayD<bool>>,
    units: Units,
    file_pointer: Option<FilePointer>,
}

impl Data {
    pub fn new(values: Values, units: Units) -> Self {
        Self {
            values,
            mask: None,
            units,
            file_pointer: None,
        }
    }

    /// One-dimensional floating point data.
    pub fn from_vec(values: Vec<f64>, units: Units) -> Self {
        Self::new(Values::Float(Array1::from(values).into_dyn()), units)
    }

    pub fn from_shape_vec(shape: &[usize], values: Vec<f64>, units: Units) -> ModelResult<Self> {
        let array = ArrayD::from_shape_vec(IxDyn(shape), values)?;
        Ok(Self::new(Values::Float(array), units))
    }

    pub fn from_ints(shape: &[usize], values: Vec<i64>, units: Units) -> ModelResult<Self> {
        let array = ArrayD::from_shape_vec(IxDyn(shape), values)?;
        Ok(Self::new(Values::Int(array), units))
    }

    /// Text data carries no units.
    pub fn from_strings(shape: &[usize], values: Vec<String>) -> ModelResult<Self> {
        let array = ArrayD::from_shape_vec(IxDyn(shape), values)?;
        Ok(Self::new(Values::Text(array), Units::none()))
    }

    pub fn with_mask(mut self, mask: ArrayD<bool>) -> ModelResult<Self> {
        if mask.shape() != self.shape() {
            return Err(ModelError::shape_mismatch(format!(
                "mask shape {:?} does not match data shape {:?}",
                mask.shape(),
                self.shape()
            )));
        }
        self.mask = Some(mask);
        Ok(self)
    }

    pub fn with_file_pointer(mut self, pointer: FilePointer) -> Self {
        self.file_pointer = Some(pointer);
        self
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn mask(&self) -> Option<&ArrayD<bool>> {
        self.mask.as_ref()
    }

    pub fn units(&self) -> &Units {
        &self.units
    }

    pub fn set_units(&mut self, units: Units) {
        self.units = units;
    }

    pub fn file_pointer(&self) -> Option<&FilePointer> {
        self.file_pointer.as_ref()
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn size(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_text(&self) -> bool {
        self.values.is_text()
    }

    /// Integer data widened to float; float and text data are unchanged.
    pub fn to_float(&self) -> Data {
        Data {
            values: self.values.to_float(),
            ..self.clone()
        }
    }

    /// Return the data in the given equivalent units. Integer data is
    /// widened to float when a non-trivial conversion is needed. Text data
    /// and undefined target units are returned unchanged.
    pub fn convert_units(&self, to: &Units) -> ModelResult<Data> {
        if self.is_text() || !to.is_defined() || self.units == *to {
            return Ok(self.clone());
        }
        let (a, b) = self.units.conversion(to)?;
        let values = if a == 1.0 && b == 0.0 {
            self.values.clone()
        } else {
            match self.values.to_float() {
                Values::Float(array) => Values::Float(array.mapv(|v| v * a + b)),
                other => other,
            }
        };
        Ok(Data {
            values,
            mask: self.mask.clone(),
            units: to.clone(),
            file_pointer: None,
        })
    }

    /// Reorder dimensions; `order[i]` is the current dimension that becomes
    /// dimension `i`.
    pub fn permuted(&self, order: &[usize]) -> ModelResult<Data> {
        let mut seen = vec![false; self.ndim()];
        if order.len() != self.ndim() {
            return Err(ModelError::invalid_axis(format!(
                "permutation {:?} does not match {} dimensions",
                order,
                self.ndim()
            )));
        }
        for &i in order {
            if i >= seen.len() || seen[i] {
                return Err(ModelError::invalid_axis(format!(
                    "{:?} is not a permutation",
                    order
                )));
            }
            seen[i] = true;
        }
        if order.iter().enumerate().all(|(i, &j)| i == j) {
            return Ok(self.clone());
        }
        Ok(Data {
            values: self.values.permuted(order),
            mask: self
                .mask
                .as_ref()
                .map(|m| m.clone().permuted_axes(IxDyn(order)).as_standard_layout().into_owned()),
            units: self.units.clone(),
            file_pointer: None,
        })
    }

    /// Reverse the order of elements along one dimension.
    pub fn reversed(&self, axis: usize) -> ModelResult<Data> {
        self.check_axis(axis)?;
        Ok(Data {
            values: self.values.reversed(axis),
            mask: self.mask.as_ref().map(|m| {
                let mut m = m.clone();
                m.invert_axis(Axis(axis));
                m.as_standard_layout().into_owned()
            }),
            units: self.units.clone(),
            file_pointer: None,
        })
    }

    /// Gather the given indices along one dimension.
    pub fn select(&self, axis: usize, indices: &[usize]) -> ModelResult<Data> {
        self.check_axis(axis)?;
        let len = self.shape()[axis];
        if let Some(bad) = indices.iter().find(|&&i| i >= len) {
            return Err(ModelError::invalid_axis(format!(
                "index {} out of range for dimension of size {}",
                bad, len
            )));
        }
        Ok(Data {
            values: self.values.selected(axis, indices),
            mask: self.mask.as_ref().map(|m| m.select(Axis(axis), indices)),
            units: self.units.clone(),
            file_pointer: None,
        })
    }

    /// Insert a new size-1 dimension at `position`.
    pub fn insert_axis(&self, position: usize) -> ModelResult<Data> {
        if position > self.ndim() {
            return Err(ModelError::invalid_axis(format!(
                "cannot insert dimension at {} of {}-d data",
                position,
                self.ndim()
            )));
        }
        Ok(Data {
            values: self.values.with_axis(position),
            mask: self.mask.as_ref().map(|m| m.clone().insert_axis(Axis(position))),
            units: self.units.clone(),
            file_pointer: self.file_pointer.clone(),
        })
    }

    /// Join `other` after `self` along `axis`. `other` is first converted to
    /// the units of `self`; mixed integer and float data yields float.
    pub fn concatenate(&self, other: &Data, axis: usize) -> ModelResult<Data> {
        self.check_axis(axis)?;
        if self.ndim() != other.ndim() {
            return Err(ModelError::shape_mismatch(format!(
                "cannot concatenate {}-d and {}-d data",
                self.ndim(),
                other.ndim()
            )));
        }
        let other = other.convert_units(&self.units)?;
        let values = match (&self.values, &other.values) {
            (Values::Text(a), Values::Text(b)) => {
                Values::Text(concatenate(Axis(axis), &[a.view(), b.view()])?)
            }
            (Values::Int(a), Values::Int(b)) => {
                Values::Int(concatenate(Axis(axis), &[a.view(), b.view()])?)
            }
            (Values::Text(_), _) | (_, Values::Text(_)) => {
                return Err(ModelError::DtypeMismatch(format!(
                    "cannot concatenate {} and {} data",
                    self.values.dtype_name(),
                    other.values.dtype_name()
                )));
            }
            (a, b) => {
                let (Values::Float(a), Values::Float(b)) = (a.to_float(), b.to_float()) else {
                    return Err(ModelError::DtypeMismatch("numeric data did not widen to float".to_string()));
                };
                Values::Float(concatenate(Axis(axis), &[a.view(), b.view()])?)
            }
        };
        let mask = match (&self.mask, &other.mask) {
            (None, None) => None,
            (a, b) => {
                let a = a.clone().unwrap_or_else(|| ArrayD::from_elem(IxDyn(self.shape()), false));
                let b = b.clone().unwrap_or_else(|| ArrayD::from_elem(IxDyn(other.shape()), false));
                Some(concatenate(Axis(axis), &[a.view(), b.view()])?)
            }
        };
        Ok(Data {
            values,
            mask,
            units: self.units.clone(),
            file_pointer: None,
        })
    }

    /// First element in row-major order.
    pub fn first(&self) -> Option<Scalar> {
        self.element(|n| if n == 0 { None } else { Some(0) })
    }

    /// Last element in row-major order.
    pub fn last(&self) -> Option<Scalar> {
        self.element(|n| n.checked_sub(1))
    }

    fn element(&self, pick: impl Fn(usize) -> Option<usize>) -> Option<Scalar> {
        match &self.values {
            Values::Float(a) => a.iter().nth(pick(a.len())?).map(|&v| Scalar::Number(v)),
            Values::Int(a) => a.iter().nth(pick(a.len())?).map(|&v| Scalar::Number(v as f64)),
            Values::Text(a) => a.iter().nth(pick(a.len())?).map(|v| Scalar::Text(v.clone())),
        }
    }

    /// All elements in row-major order as floats, or `None` for text.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self.values.to_float() {
            Values::Float(a) => Some(a.iter().copied().collect()),
            _ => None,
        }
    }

    /// Whether a 1-d numeric array is non-decreasing from its first to its
    /// last element. Text and empty data count as increasing.
    pub fn is_increasing(&self) -> bool {
        match (self.first(), self.last()) {
            (Some(Scalar::Number(a)), Some(Scalar::Number(b))) => a <= b,
            _ => true,
        }
    }

    /// Tolerant comparison of values and masks. Units are not converted.
    pub fn allclose(&self, other: &Data, rtol: f64, atol: f64) -> bool {
        let masked = |d: &Data| -> Vec<bool> {
            match &d.mask {
                Some(m) => m.iter().copied().collect(),
                None => vec![false; d.size()],
            }
        };
        if masked(self) != masked(other) {
            return false;
        }
        self.values.allclose(&other.values, rtol, atol)
    }

    fn check_axis(&self, axis: usize) -> ModelResult<()> {
        if axis >= self.ndim() {
            return Err(ModelError::invalid_axis(format!(
                "dimension {} out of range for {}-d data",
                axis,
                self.ndim()
            )));
        }
        Ok(())
    }
}
