//! Array and token file I/O.
//!
//! The embedding model runs outside this workspace and hands over its
//! outputs as NumPy files:
//!
//! - `.npy` embedding matrices `(N, D)` and label vectors `(N,)`
//! - `.npz` archives holding `attn` and `grad`, each `(L, H, S, S)`
//! - JSON arrays of tokenizer output

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::{Array, Array1, Array2, Array4, Dimension, Ix4, OwnedRepr};
use ndarray_npy::{NpzReader, ReadNpyError, ReadNpyExt, ReadNpzError, WriteNpyExt};

use crate::error::{DataError, Result};

fn read_npy_as_f32<D, P>(path: P) -> Result<Array<f32, D>>
where
    D: Dimension,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    match Array::<f32, D>::read_npy(reader) {
        Ok(array) => Ok(array),
        Err(f32_err) => {
            let reader = BufReader::new(File::open(path)?);
            let array = Array::<f64, D>::read_npy(reader).map_err(|_| {
                DataError::Npy(format!("failed to read {}: {f32_err}", path.display()))
            })?;
            Ok(array.mapv(|v| v as f32))
        }
    }
}

/// Read an `(N, D)` embedding matrix. `f64` files are narrowed to `f32`.
pub fn read_embeddings_npy<P: AsRef<Path>>(path: P) -> Result<Array2<f32>> {
    read_npy_as_f32(path)
}

/// Read an `(N,)` label vector. `f64` files are narrowed to `f32`.
pub fn read_labels_npy<P: AsRef<Path>>(path: P) -> Result<Array1<f32>> {
    read_npy_as_f32(path)
}

fn npz_array_f32<R>(npz: &mut NpzReader<R>, name: &str) -> Result<Array4<f32>>
where
    R: std::io::Read + std::io::Seek,
{
    let npz_err =
        |e: ReadNpzError| DataError::Npy(format!("failed to read '{name}' from npz archive: {e}"));

    // `names` strips the `.npy` suffix NumPy adds to every member.
    let names = npz.names().map_err(npz_err)?;
    if !names.iter().any(|n| n == name) {
        return Err(DataError::Npy(format!("missing array '{name}' in npz archive")));
    }

    match npz.by_name::<OwnedRepr<f32>, Ix4>(name) {
        Ok(array) => Ok(array),
        Err(ReadNpzError::Npy(ReadNpyError::WrongDescriptor(_))) => npz
            .by_name::<OwnedRepr<f64>, Ix4>(name)
            .map(|a| a.mapv(|v| v as f32))
            .map_err(npz_err),
        Err(e) => Err(npz_err(e)),
    }
}

/// Read attention weights and their gradients from an `.npz` archive.
///
/// Expects members `attn` and `grad`, both `(layers, heads, seq, seq)`.
///
/// # Errors
///
/// Returns an error if either member is missing or the shapes differ.
pub fn read_attention_npz<P: AsRef<Path>>(path: P) -> Result<(Array4<f32>, Array4<f32>)> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut npz = NpzReader::new(file)
        .map_err(|e| DataError::Npy(format!("failed to open {}: {e}", path.display())))?;

    let attn = npz_array_f32(&mut npz, "attn")?;
    let grad = npz_array_f32(&mut npz, "grad")?;

    if attn.shape() != grad.shape() {
        return Err(DataError::InvalidShape(format!(
            "attention {:?} and gradient {:?} differ",
            attn.shape(),
            grad.shape()
        )));
    }

    tracing::debug!(shape = ?attn.shape(), path = %path.display(), "loaded attention archive");
    Ok((attn, grad))
}

/// Read a JSON array of token strings.
pub fn read_tokens_json<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_json::from_reader(reader)?)
}

/// Write a 2D array as `.npy`.
pub fn write_array2_npy<P: AsRef<Path>>(path: P, array: &Array2<f32>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    array
        .write_npy(file)
        .map_err(|e| DataError::Npy(format!("failed to write {}: {e}", path.display())))
}

/// Write a 1D array as `.npy`.
pub fn write_array1_npy<P: AsRef<Path>>(path: P, array: &Array1<f32>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    array
        .write_npy(file)
        .map_err(|e| DataError::Npy(format!("failed to write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("aqsol-data-io-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn test_embeddings_roundtrip() {
        let path = scratch("emb.npy");
        let x = Array2::from_shape_fn((3, 5), |(i, j)| (i as f32) - (j as f32) * 0.5);
        write_array2_npy(&path, &x).unwrap();
        assert_eq!(read_embeddings_npy(&path).unwrap(), x);
    }

    #[test]
    fn test_labels_read_f64() {
        let path = scratch("labels64.npy");
        let y = Array1::from(vec![-1.5f64, 0.25, 2.0]);
        y.write_npy(File::create(&path).unwrap()).unwrap();
        assert_eq!(read_labels_npy(&path).unwrap().to_vec(), vec![-1.5f32, 0.25, 2.0]);
    }

    #[test]
    fn test_tokens_json() {
        let path = scratch("tokens.json");
        std::fs::write(&path, r#"["C", "c", "(", "[nH]"]"#).unwrap();
        assert_eq!(read_tokens_json(&path).unwrap(), ["C", "c", "(", "[nH]"]);
    }

    #[test]
    fn test_attention_npz() {
        use ndarray_npy::NpzWriter;

        let path = scratch("attn.npz");
        let attn = Array4::<f32>::from_elem((2, 4, 5, 5), 0.2);
        let grad = Array4::<f32>::ones((2, 4, 5, 5));
        {
            let mut npz = NpzWriter::new(File::create(&path).unwrap());
            npz.add_array("attn", &attn).unwrap();
            npz.add_array("grad", &grad).unwrap();
            npz.finish().unwrap();
        }

        let (a, g) = read_attention_npz(&path).unwrap();
        assert_eq!(a, attn);
        assert_eq!(g, grad);
    }

    #[test]
    fn test_attention_npz_shape_mismatch() {
        use ndarray_npy::NpzWriter;

        let path = scratch("attn_bad.npz");
        {
            let mut npz = NpzWriter::new(File::create(&path).unwrap());
            npz.add_array("attn", &Array4::<f32>::zeros((2, 4, 5, 5))).unwrap();
            npz.add_array("grad", &Array4::<f32>::zeros((2, 4, 6, 6))).unwrap();
            npz.finish().unwrap();
        }

        assert!(matches!(
            read_attention_npz(&path),
            Err(DataError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_attention_npz_reports_member_errors() {
        use ndarray::Array3;
        use ndarray_npy::NpzWriter;

        let path = scratch("attn_rank.npz");
        {
            let mut npz = NpzWriter::new(File::create(&path).unwrap());
            npz.add_array("attn", &Array3::<f32>::zeros((4, 5, 5))).unwrap();
            npz.add_array("grad", &Array4::<f32>::zeros((2, 4, 5, 5))).unwrap();
            npz.finish().unwrap();
        }
        match read_attention_npz(&path) {
            Err(DataError::Npy(msg)) => {
                assert!(msg.contains("'attn'"), "{msg}");
                assert!(!msg.contains("missing"), "{msg}");
            }
            other => panic!("expected npy error, got {other:?}"),
        }

        let path = scratch("attn_missing.npz");
        {
            let mut npz = NpzWriter::new(File::create(&path).unwrap());
            npz.add_array("attn", &Array4::<f32>::zeros((2, 4, 5, 5))).unwrap();
            npz.finish().unwrap();
        }
        match read_attention_npz(&path) {
            Err(DataError::Npy(msg)) => assert!(msg.contains("missing array 'grad'"), "{msg}"),
            other => panic!("expected npy error, got {other:?}"),
        }
    }

    #[test]
    fn test_attention_npz_f64_members() {
        use ndarray_npy::NpzWriter;

        let path = scratch("attn_f64.npz");
        {
            let mut npz = NpzWriter::new(File::create(&path).unwrap());
            npz.add_array("attn", &Array4::<f64>::from_elem((1, 2, 3, 3), 0.5)).unwrap();
            npz.add_array("grad", &Array4::<f64>::ones((1, 2, 3, 3))).unwrap();
            npz.finish().unwrap();
        }
        let (a, g) = read_attention_npz(&path).unwrap();
        assert!(a.iter().all(|&v| v == 0.5));
        assert!(g.iter().all(|&v| v == 1.0));
    }
}
