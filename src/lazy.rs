use ndarray::{ArrayD, Axis, IxDyn};
use zarrs::array::{DataType, ElementOwned};

use crate::error::{Error, Result};
use crate::store::SourceArray;

/// A lazily-evaluated n-dimensional array expression.
///
/// Opening a zarr array reads only its metadata, so a `Source` costs no
/// chunk I/O; `Zeros` placeholders, concatenation, and axis selection
/// compose such handles without reading anything either. Evaluation happens
/// only when a consumer calls [`LazyArray::materialize`]; the reader itself
/// never does.
#[derive(Clone)]
pub enum LazyArray {
    Source(SourceArray),
    Zeros {
        shape: Vec<u64>,
        data_type: DataType,
    },
    Concat {
        axis: usize,
        parts: Vec<LazyArray>,
    },
    Select {
        axis: usize,
        index: u64,
        inner: Box<LazyArray>,
    },
}

impl std::fmt::Debug for LazyArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(array) => write!(f, "Source({:?})", array.shape()),
            Self::Zeros { shape, .. } => write!(f, "Zeros({shape:?})"),
            Self::Concat { axis, parts } => {
                write!(f, "Concat(axis={axis}, {} parts, {:?})", parts.len(), self.shape())
            }
            Self::Select { axis, index, .. } => {
                write!(f, "Select(axis={axis}, index={index}, {:?})", self.shape())
            }
        }
    }
}

impl From<SourceArray> for LazyArray {
    fn from(array: SourceArray) -> Self {
        Self::Source(array)
    }
}

impl LazyArray {
    pub fn zeros(shape: Vec<u64>, data_type: DataType) -> Self {
        Self::Zeros { shape, data_type }
    }

    pub fn shape(&self) -> Vec<u64> {
        match self {
            Self::Source(array) => array.shape().to_vec(),
            Self::Zeros { shape, .. } => shape.clone(),
            Self::Concat { axis, parts } => {
                let mut shape = parts[0].shape();
                shape[*axis] = parts.iter().map(|p| p.shape()[*axis]).sum();
                shape
            }
            Self::Select { axis, inner, .. } => {
                let mut shape = inner.shape();
                shape.remove(*axis);
                shape
            }
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Source(array) => array.data_type().clone(),
            Self::Zeros { data_type, .. } => data_type.clone(),
            Self::Concat { parts, .. } => parts[0].data_type(),
            Self::Select { inner, .. } => inner.data_type(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Concatenate along `axis`. All parts must agree in rank and in every
    /// dimension other than `axis`.
    pub fn concat(parts: Vec<LazyArray>, axis: usize) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(Error::structure("cannot concatenate zero arrays"));
        };
        let reference = first.shape();
        if axis >= reference.len() {
            return Err(Error::structure(format!(
                "concat axis {axis} out of bounds for rank {}",
                reference.len()
            )));
        }
        for part in &parts[1..] {
            let shape = part.shape();
            let compatible = shape.len() == reference.len()
                && shape
                    .iter()
                    .zip(&reference)
                    .enumerate()
                    .all(|(dim, (a, b))| dim == axis || a == b);
            if !compatible {
                return Err(Error::structure(format!(
                    "cannot concatenate {shape:?} with {reference:?} along axis {axis}"
                )));
            }
        }
        Ok(Self::Concat { axis, parts })
    }

    /// Pick a single index along `axis`, dropping that axis.
    pub fn select(self, axis: usize, index: u64) -> Result<Self> {
        let shape = self.shape();
        if axis >= shape.len() || index >= shape[axis] {
            return Err(Error::structure(format!(
                "select index {index} on axis {axis} out of bounds for {shape:?}"
            )));
        }
        Ok(Self::Select {
            axis,
            index,
            inner: Box::new(self),
        })
    }

    /// Force evaluation, reading source chunks. Consumers and tests only.
    pub fn materialize<T>(&self) -> Result<ArrayD<T>>
    where
        T: ElementOwned + Clone + Default,
    {
        match self {
            Self::Source(array) => {
                let elements: Vec<T> = array.retrieve_array_subset(&array.subset_all())?;
                let shape: Vec<usize> = array.shape().iter().map(|&n| n as usize).collect();
                ArrayD::from_shape_vec(IxDyn(&shape), elements).map_err(Error::wrap)
            }
            Self::Zeros { shape, .. } => {
                let shape: Vec<usize> = shape.iter().map(|&n| n as usize).collect();
                Ok(ArrayD::from_elem(IxDyn(&shape), T::default()))
            }
            Self::Concat { axis, parts } => {
                let arrays = parts
                    .iter()
                    .map(|p| p.materialize())
                    .collect::<Result<Vec<ArrayD<T>>>>()?;
                let views: Vec<_> = arrays.iter().map(ArrayD::view).collect();
                ndarray::concatenate(Axis(*axis), &views).map_err(Error::wrap)
            }
            Self::Select { axis, index, inner } => Ok(inner
                .materialize()?
                .index_axis_move(Axis(*axis), *index as usize)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zarrs::array::data_type;

    #[test]
    fn test_concat_shape() {
        let a = LazyArray::zeros(vec![1, 4, 4], data_type::uint8());
        let b = LazyArray::zeros(vec![1, 4, 4], data_type::uint8());
        let cat = LazyArray::concat(vec![a, b], 2).unwrap();
        assert_eq!(cat.shape(), vec![1, 4, 8]);
    }

    #[test]
    fn test_concat_shape_mismatch() {
        let a = LazyArray::zeros(vec![4, 4], data_type::uint8());
        let b = LazyArray::zeros(vec![5, 4], data_type::uint8());
        assert!(LazyArray::concat(vec![a, b], 1).is_err());
    }

    #[test]
    fn test_select_drops_axis() {
        let a = LazyArray::zeros(vec![1, 3, 4], data_type::uint8());
        let sel = a.select(0, 0).unwrap();
        assert_eq!(sel.shape(), vec![3, 4]);
        let materialized: ArrayD<u8> = sel.materialize().unwrap();
        assert_eq!(materialized.shape(), &[3, 4]);
    }

    #[test]
    fn test_materialize_stitched_zeros() {
        let row = LazyArray::concat(
            vec![
                LazyArray::zeros(vec![2, 2], data_type::uint16()),
                LazyArray::zeros(vec![2, 2], data_type::uint16()),
            ],
            1,
        )
        .unwrap();
        let grid: ArrayD<u16> = row.materialize().unwrap();
        assert_eq!(grid.shape(), &[2, 4]);
        assert!(grid.iter().all(|&v| v == 0));
    }
}
