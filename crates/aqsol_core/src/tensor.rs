//! Conversions between host `ndarray` arrays and Burn tensors.
//!
//! Arrays read from `.npy`/`.npz` files live on the host as `ndarray`
//! values; the relevance engine and the heads work on Burn tensors. All
//! conversions go through `f32`.

use burn::prelude::*;
use ndarray::{Array1, Array2, Array4};

use crate::error::{CoreError, Result};

/// Upload a 1D array.
pub fn array1_to_tensor<B: Backend>(array: &Array1<f32>, device: &B::Device) -> Tensor<B, 1> {
    let data: Vec<f32> = array.iter().copied().collect();
    Tensor::<B, 1>::from_floats(data.as_slice(), device)
}

/// Upload a 2D array, keeping its `(rows, cols)` layout.
pub fn array2_to_tensor<B: Backend>(array: &Array2<f32>, device: &B::Device) -> Tensor<B, 2> {
    let (rows, cols) = array.dim();
    let data: Vec<f32> = array.iter().copied().collect();
    Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([rows, cols])
}

/// Upload an `(L, H, S, S)` attention or gradient stack.
pub fn array4_to_tensor<B: Backend>(array: &Array4<f32>, device: &B::Device) -> Tensor<B, 4> {
    let (layers, heads, queries, keys) = array.dim();
    let data: Vec<f32> = array.iter().copied().collect();
    Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([layers, heads, queries, keys])
}

/// Download any tensor as a flat row-major `Vec<f32>`.
///
/// # Errors
///
/// Returns [`CoreError::SerializationError`] if the backend data cannot be
/// read back as `f32`.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CoreError::SerializationError(format!("tensor readback failed: {e:?}")))
}

/// Download a 2D tensor into an `Array2<f32>`.
pub fn tensor_to_array2<B: Backend>(tensor: Tensor<B, 2>) -> Result<Array2<f32>> {
    let [rows, cols] = tensor.dims();
    let data = tensor_to_vec(tensor)?;
    Array2::from_shape_vec((rows, cols), data).map_err(|e| CoreError::shape(e.to_string()))
}
