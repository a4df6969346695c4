//! Tensor API.
//!
//! Tensors are the inputs and outputs of the landmark networks: an input tensor holds the color
//! channels of a camera frame region, the output tensors hold landmark coordinates and confidence
//! values.
//!
//! Tensors are dense, row-major N-dimensional arrays of `f32`.

use std::fmt;

/// Returns the number of elements covered by one step along the outermost dimension of `shape`.
fn outer_stride(shape: &[usize]) -> usize {
    shape.iter().skip(1).product()
}

/// An owned, dynamically shaped tensor.
///
/// # Construction
///
/// A tensor can be created with [`Tensor::from_shape_fn`], from an iterator with
/// [`Tensor::from_iter`], or via the `From` impls for single values and 1-dimensional arrays.
///
/// # Data Access
///
/// [`Tensor::index`] returns a [`TensorView`] of a suffix of the dimensions. The data in
/// 1-dimensional tensors and views can be accessed with `as_slice`, single values in
/// 0-dimensional ones with `as_singular`.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: Box<[usize]>,
    data: Box<[f32]>,
}

/// A borrowed view into a [`Tensor`].
#[derive(Clone, Copy)]
pub struct TensorView<'a> {
    shape: &'a [usize],
    data: &'a [f32],
}

impl Tensor {
    /// Creates a tensor of the given shape by calling `f` for each element.
    ///
    /// `f` is invoked with successive indices in row-major order, starting with `[0, ..., 0, 0]`,
    /// then `[0, ..., 0, 1]` and so on.
    pub fn from_shape_fn<F: FnMut(&[usize]) -> f32>(shape: &[usize], mut f: F) -> Self {
        let len = shape.iter().product();
        let mut data = Vec::with_capacity(len);
        let mut index = vec![0; shape.len()];
        for _ in 0..len {
            data.push(f(&index));

            // Advance the index like an odometer.
            for (i, &size) in index.iter_mut().zip(shape).rev() {
                *i += 1;
                if *i < size {
                    break;
                }
                *i = 0;
            }
        }

        Self {
            shape: shape.into(),
            data: data.into_boxed_slice(),
        }
    }

    /// Creates a tensor of the given shape by pulling elements from an iterator.
    ///
    /// # Panics
    ///
    /// `iter` must yield exactly as many elements as `shape` describes, otherwise this method will
    /// panic.
    #[track_caller]
    pub fn from_iter<I: IntoIterator<Item = f32>>(shape: &[usize], iter: I) -> Self {
        let data: Box<[f32]> = iter.into_iter().collect();
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "element count does not match tensor shape {:?}",
            shape
        );
        Self {
            shape: shape.into(),
            data,
        }
    }

    pub(super) fn from_tract(tract: &tract_onnx::prelude::Tensor) -> anyhow::Result<Self> {
        let data = tract.as_slice::<f32>()?;
        Ok(Self {
            shape: tract.shape().into(),
            data: data.into(),
        })
    }

    pub(super) fn to_tract(&self) -> anyhow::Result<tract_onnx::prelude::Tensor> {
        Ok(tract_onnx::prelude::Tensor::from_shape(
            &self.shape,
            &self.data,
        )?)
    }

    /// Returns the shape of this tensor.
    ///
    /// A tensor's shape is the number of entries in each dimension.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions of this tensor.
    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Returns a view of the whole tensor.
    #[inline]
    pub fn as_view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            data: &self.data,
        }
    }

    /// Indexes a prefix of the tensor's dimensions with `indices`.
    ///
    /// Indexing a tensor of shape `[2, 3, 4, 5]` with `[a, b]` returns a view of shape `[4, 5]`,
    /// indexing it with `[a, b, c, d]` returns a view of a single value.
    ///
    /// # Panics
    ///
    /// This method will panic if `indices` has more entries than `self` has dimensions, or if any
    /// index is out of bounds.
    #[track_caller]
    pub fn index(&self, indices: &[usize]) -> TensorView<'_> {
        self.as_view().index(indices)
    }

    /// Returns the values stored in a 1-dimensional tensor as a slice.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 1 dimension, otherwise this method panics.
    #[track_caller]
    pub fn as_slice(&self) -> &[f32] {
        self.as_view().as_slice()
    }

    /// Returns the value stored in a 0-dimensional tensor.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 0 dimensions, otherwise this method will panic.
    #[track_caller]
    pub fn as_singular(&self) -> f32 {
        self.as_view().as_singular()
    }
}

impl From<f32> for Tensor {
    fn from(value: f32) -> Self {
        Self::from_iter(&[], [value])
    }
}

impl<const N: usize> From<[f32; N]> for Tensor {
    fn from(arr: [f32; N]) -> Self {
        Self::from_iter(&[N], arr)
    }
}

impl<'a> TensorView<'a> {
    #[inline]
    pub fn shape(&self) -> &'a [usize] {
        self.shape
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Indexes a prefix of the view's dimensions with `indices`.
    ///
    /// # Panics
    ///
    /// This method will panic if `indices` has more entries than `self` has dimensions, or if any
    /// index is out of bounds.
    #[track_caller]
    pub fn index(&self, indices: &[usize]) -> TensorView<'a> {
        assert!(
            indices.len() <= self.rank(),
            "attempted to index tensor of shape {:?} with {:?}",
            self.shape,
            indices
        );

        let mut shape = self.shape;
        let mut data = self.data;
        for &index in indices {
            assert!(
                index < shape[0],
                "attempted to index tensor of shape {:?} with {:?}",
                self.shape,
                indices
            );
            let stride = outer_stride(shape);
            data = &data[index * stride..(index + 1) * stride];
            shape = &shape[1..];
        }
        TensorView { shape, data }
    }

    /// Returns the values stored in a 1-dimensional view as a slice.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 1 dimension, otherwise this method panics.
    #[track_caller]
    pub fn as_slice(&self) -> &'a [f32] {
        assert_eq!(
            self.rank(),
            1,
            "attempted to access tensor of shape {:?} as slice",
            self.shape
        );
        self.data
    }

    /// Returns the value stored in a 0-dimensional view.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 0 dimensions, otherwise this method will panic.
    #[track_caller]
    pub fn as_singular(&self) -> f32 {
        assert_eq!(
            self.rank(),
            0,
            "attempted to access tensor of shape {:?} as singular element",
            self.shape,
        );
        self.data[0]
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .finish()
    }
}

impl fmt::Debug for TensorView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorView")
            .field("shape", &self.shape())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_fn_order() {
        let mut seen = Vec::new();
        let tensor = Tensor::from_shape_fn(&[1, 2, 3], |index| {
            seen.push(index.to_vec());
            seen.len() as f32
        });
        assert_eq!(tensor.shape(), &[1, 2, 3]);
        assert_eq!(
            seen,
            [
                [0, 0, 0],
                [0, 0, 1],
                [0, 0, 2],
                [0, 1, 0],
                [0, 1, 1],
                [0, 1, 2],
            ]
        );
        assert_eq!(tensor.index(&[0, 1]).as_slice(), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn empty_dimension() {
        let tensor = Tensor::from_shape_fn(&[1, 2, 0, 3], |idx| unreachable!("{idx:?}"));
        assert_eq!(tensor.shape(), &[1, 2, 0, 3]);

        let view = tensor.index(&[0, 1]);
        assert_eq!(view.shape(), &[0, 3]);
    }

    #[test]
    fn singular() {
        let tensor = Tensor::from(1.5f32);
        assert_eq!(tensor.rank(), 0);
        assert_eq!(tensor.as_singular(), 1.5);
        assert_eq!(tensor.index(&[]).as_singular(), 1.5);
    }

    #[test]
    fn index_landmark_output() {
        // Shaped like a hand landmark output: 1 batch, 21 landmarks with 3 coordinates each.
        let tensor = Tensor::from_iter(&[1, 63], (0..63).map(|i| i as f32));
        let coords = tensor.index(&[0]).as_slice();
        assert_eq!(coords.len(), 63);
        assert_eq!(coords[4 * 3 + 1], 13.0);

        let presence = Tensor::from_iter(&[1, 1], [0.75]);
        assert_eq!(presence.index(&[0, 0]).as_singular(), 0.75);
    }

    #[test]
    fn index_nested_views() {
        let tensor = Tensor::from_iter(&[2, 2, 2], (0..8).map(|i| i as f32));
        let plane = tensor.index(&[1]);
        assert_eq!(plane.shape(), &[2, 2]);
        assert_eq!(plane.index(&[0]).as_slice(), &[4.0, 5.0]);
        assert_eq!(plane.index(&[1, 1]).as_singular(), 7.0);
    }

    #[test]
    #[should_panic(expected = "attempted to index")]
    fn index_out_of_bounds() {
        Tensor::from([1.0f32, 2.0]).index(&[2]);
    }
}
