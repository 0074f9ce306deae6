//! Numpy arrays inside pickled shape records.
//!
//! Records are decoded with `keep_restore_state`, so an ndarray arrives as
//! the state numpy pickles it with rather than as an object. Two layouts are
//! recognised:
//!
//! - `_reconstruct` followed by BUILD: `(version, shape, dtype, is_fortran, data)`
//! - `_frombuffer` (protocol 5): `(data, dtype, shape, order)`
//!
//! The dtype is itself reduced to its state `(version, byteorder, ...)`. Its
//! type string does not survive BUILD, so the element width is taken from
//! the buffer length. Only `float32` and `float64` elements are accepted.

use serde_pickle::Value;

use super::loaders::{LoaderError, Result};

/// A decoded numeric array in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

/// Borrowed pieces of a pickled ndarray.
struct RawArray<'a> {
    shape: &'a [Value],
    dtype: &'a Value,
    fortran: bool,
    data: &'a [u8],
}

fn raw_array(value: &Value) -> Option<RawArray<'_>> {
    let Value::Tuple(items) = value else {
        return None;
    };
    match items.as_slice() {
        [Value::I64(_), Value::Tuple(shape), dtype, Value::Bool(fortran), Value::Bytes(data)] => {
            Some(RawArray {
                shape,
                dtype,
                fortran: *fortran,
                data,
            })
        }
        [Value::Bytes(data), dtype, Value::Tuple(shape), Value::String(order)] => Some(RawArray {
            shape,
            dtype,
            fortran: order == "F",
            data,
        }),
        _ => None,
    }
}

fn invalid(reason: impl Into<String>) -> LoaderError {
    LoaderError::InvalidArray(reason.into())
}

fn big_endian(dtype: &Value) -> bool {
    match dtype {
        Value::Tuple(state) => matches!(state.get(1), Some(Value::String(order)) if order == ">"),
        _ => false,
    }
}

/// Permute column-major values into row-major order.
fn fortran_to_c(values: &[f64], shape: &[usize]) -> Vec<f64> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut stride = 1;
    for &dim in shape {
        strides.push(stride);
        stride *= dim;
    }

    let mut index = vec![0usize; shape.len()];
    let mut out = Vec::with_capacity(values.len());
    for _ in 0..values.len() {
        let offset: usize = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
        out.push(values[offset]);
        for axis in (0..shape.len()).rev() {
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    out
}

impl NdArray {
    /// Returns true if `value` has the layout of a pickled ndarray.
    pub fn is_array(value: &Value) -> bool {
        raw_array(value).is_some()
    }

    /// Decode a pickled ndarray.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not an ndarray, its shape is not a
    /// tuple of non-negative integers, or its buffer does not hold `float32`
    /// or `float64` elements for that shape.
    pub fn from_value(value: &Value) -> Result<Self> {
        let raw = raw_array(value).ok_or_else(|| invalid("value is not a numpy array"))?;

        let shape = raw
            .shape
            .iter()
            .map(|dim| match dim {
                Value::I64(n) if *n >= 0 => Ok(*n as usize),
                other => Err(invalid(format!("bad array dimension {:?}", other))),
            })
            .collect::<Result<Vec<usize>>>()?;
        let count: usize = shape.iter().product();

        let big_endian = big_endian(raw.dtype);
        let values: Vec<f64> = if count == 0 {
            Vec::new()
        } else if raw.data.len() == count * 8 {
            raw.data
                .chunks_exact(8)
                .map(|c| {
                    let bytes = [c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]];
                    if big_endian {
                        f64::from_be_bytes(bytes)
                    } else {
                        f64::from_le_bytes(bytes)
                    }
                })
                .collect()
        } else if raw.data.len() == count * 4 {
            raw.data
                .chunks_exact(4)
                .map(|c| {
                    let bytes = [c[0], c[1], c[2], c[3]];
                    let value = if big_endian {
                        f32::from_be_bytes(bytes)
                    } else {
                        f32::from_le_bytes(bytes)
                    };
                    f64::from(value)
                })
                .collect()
        } else {
            return Err(invalid(format!(
                "{} bytes cannot hold {} float32 or float64 elements",
                raw.data.len(),
                count
            )));
        };

        let values = if raw.fortran && shape.len() > 1 {
            fortran_to_c(&values, &shape)
        } else {
            values
        };
        Ok(Self { shape, values })
    }

    /// Split along the first axis.
    pub fn into_rows(self) -> Result<Vec<Vec<f64>>> {
        let Some(&rows) = self.shape.first() else {
            return Err(invalid("cannot split a 0-d array into surfaces"));
        };
        if rows == 0 {
            return Ok(Vec::new());
        }
        let width = self.values.len() / rows;
        if width == 0 {
            return Ok(vec![Vec::new(); rows]);
        }
        Ok(self.values.chunks_exact(width).map(<[f64]>::to_vec).collect())
    }
}

fn flatten_into(value: &Value, out: &mut Vec<f64>) -> Result<()> {
    if NdArray::is_array(value) {
        out.extend(NdArray::from_value(value)?.values);
        return Ok(());
    }
    match value {
        Value::F64(v) => out.push(*v),
        Value::I64(v) => out.push(*v as f64),
        Value::List(items) | Value::Tuple(items) => {
            for item in items {
                flatten_into(item, out)?;
            }
        }
        other => return Err(invalid(format!("unexpected coordinate value {:?}", other))),
    }
    Ok(())
}

/// Flatten the `surf_wcs` entry of a pickled record into per-surface
/// coordinate lists.
///
/// Accepts a single stacked array (one row per surface) or a list of
/// per-surface arrays or nested lists.
pub fn surfaces_from_value(value: &Value) -> Result<Vec<Vec<f64>>> {
    if NdArray::is_array(value) {
        return NdArray::from_value(value)?.into_rows();
    }
    match value {
        Value::List(items) | Value::Tuple(items) => items
            .iter()
            .map(|surface| -> Result<Vec<f64>> {
                let mut coords = Vec::new();
                flatten_into(surface, &mut coords)?;
                Ok(coords)
            })
            .collect(),
        other => Err(invalid(format!("surf_wcs is not a sequence: {:?}", other))),
    }
}
