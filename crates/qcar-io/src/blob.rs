//! Binary tensor blobs
//!
//! All tensor files are flat little-endian IEEE-754 `float32` arrays:
//!
//! - Input tensors: `H*W*C` elements, row-major, channels innermost.
//! - Conv kernels: Keras `[filter_height, filter_width, in_channels,
//!   out_channels]` order on disk; the accelerator wants
//!   `[oc][fy][fx][ic]`, see [`repack_conv_kernel`].
//! - Dense kernels: stored `(out, in)` row-major, i.e. transposed relative
//!   to the in-memory `(in, out)` layout, see [`transpose_dense_kernel`].
//! - Biases: 1-D arrays of length `out_channels`.
//!
//! Regenerated layer outputs are written next to their inputs as
//! `layer_<N>_output_regen.bin`.

use std::fs;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: byte length {len} is not a multiple of 4")]
    NotFloatAligned { path: String, len: usize },

    #[error("{path}: expected {expected} elements, found {found}")]
    ElementCount {
        path: String,
        expected: usize,
        found: usize,
    },

    #[error("kernel has {found} elements, layout needs {expected}")]
    ShapeMismatch { expected: usize, found: usize },
}

fn path_string(path: &Path) -> String {
    path.display().to_string()
}

/// Read a flat little-endian `float32` array.
pub fn read_f32_tensor(path: &Path) -> Result<Vec<f32>, BlobError> {
    let bytes = fs::read(path).map_err(|source| BlobError::Io {
        path: path_string(path),
        source,
    })?;
    if bytes.len() % 4 != 0 {
        return Err(BlobError::NotFloatAligned {
            path: path_string(path),
            len: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Read a tensor and check its element count against the expected shape.
pub fn read_f32_tensor_expect(path: &Path, expected: usize) -> Result<Vec<f32>, BlobError> {
    let data = read_f32_tensor(path)?;
    if data.len() != expected {
        return Err(BlobError::ElementCount {
            path: path_string(path),
            expected,
            found: data.len(),
        });
    }
    Ok(data)
}

/// Write a flat little-endian `float32` array.
pub fn write_f32_tensor(path: &Path, data: &[f32]) -> Result<(), BlobError> {
    let mut bytes = Vec::with_capacity(data.len() * 4);
    for value in data {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    fs::write(path, bytes).map_err(|source| BlobError::Io {
        path: path_string(path),
        source,
    })
}

/// File name for a regenerated layer output.
pub fn layer_output_regen_filename(layer: usize) -> String {
    format!("layer_{}_output_regen.bin", layer)
}

/// Convert a dense kernel from its on-disk `(out, in)` row-major order to
/// the in-memory `(in, out)` layout.
pub fn transpose_dense_kernel(
    data: &[f32],
    inputs: usize,
    outputs: usize,
) -> Result<Vec<f32>, BlobError> {
    if data.len() != inputs * outputs {
        return Err(BlobError::ShapeMismatch {
            expected: inputs * outputs,
            found: data.len(),
        });
    }
    let mut result = vec![0.0f32; data.len()];
    for out in 0..outputs {
        for input in 0..inputs {
            result[input * outputs + out] = data[out * inputs + input];
        }
    }
    Ok(result)
}

/// Repack a conv kernel from the Keras on-disk order
/// `[fh][fw][ic][oc]` to the accelerator's weight-RAM order
/// `[oc][fy][fx][ic]`.
pub fn repack_conv_kernel(
    data: &[f32],
    filter_height: usize,
    filter_width: usize,
    in_channels: usize,
    out_channels: usize,
) -> Result<Vec<f32>, BlobError> {
    let expected = filter_height * filter_width * in_channels * out_channels;
    if data.len() != expected {
        return Err(BlobError::ShapeMismatch {
            expected,
            found: data.len(),
        });
    }
    let mut result = vec![0.0f32; data.len()];
    for fy in 0..filter_height {
        for fx in 0..filter_width {
            for ic in 0..in_channels {
                for oc in 0..out_channels {
                    let src = ((fy * filter_width + fx) * in_channels + ic) * out_channels + oc;
                    let dst = ((oc * filter_height + fy) * filter_width + fx) * in_channels + ic;
                    result[dst] = data[src];
                }
            }
        }
    }
    Ok(result)
}

/// Affine-quantize a float tensor into an unsigned byte RAM image:
/// `round(v / scale) + zero_point`, clamped to `0..=255`. The scale and
/// zero point come from the caller; calibration is out of scope.
pub fn quantize_f32(data: &[f32], scale: f32, zero_point: i32) -> Vec<u8> {
    data.iter()
        .map(|&value| {
            let q = (value / scale).round() as i64 + i64::from(zero_point);
            q.clamp(0, 255) as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("qcar-blob-{}-{}", std::process::id(), name))
    }

    #[test]
    fn tensor_round_trip() {
        let path = temp_path("roundtrip.bin");
        let data = vec![0.0f32, 1.5, -2.25, 1.0e-3, f32::MAX];
        write_f32_tensor(&path, &data).unwrap();
        let back = read_f32_tensor(&path).unwrap();
        assert_eq!(data, back);
        let checked = read_f32_tensor_expect(&path, 5).unwrap();
        assert_eq!(checked.len(), 5);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn misaligned_file_is_rejected() {
        let path = temp_path("misaligned.bin");
        fs::write(&path, [0u8, 1, 2, 3, 4, 5]).unwrap();
        let err = read_f32_tensor(&path).unwrap_err();
        assert!(matches!(err, BlobError::NotFloatAligned { len: 6, .. }));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn wrong_element_count_is_rejected() {
        let path = temp_path("count.bin");
        write_f32_tensor(&path, &[1.0, 2.0]).unwrap();
        let err = read_f32_tensor_expect(&path, 3).unwrap_err();
        assert!(matches!(
            err,
            BlobError::ElementCount {
                expected: 3,
                found: 2,
                ..
            }
        ));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_f32_tensor(Path::new("/nonexistent/qcar.bin")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/qcar.bin"));
    }

    #[test]
    fn regen_filename() {
        assert_eq!(layer_output_regen_filename(11), "layer_11_output_regen.bin");
    }

    #[test]
    fn dense_transpose() {
        // Disk (out=2, in=3): [[1,2,3],[4,5,6]] -> memory (in=3, out=2).
        let disk = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let memory = transpose_dense_kernel(&disk, 3, 2).unwrap();
        assert_eq!(memory, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        assert!(transpose_dense_kernel(&disk, 2, 2).is_err());
    }

    #[test]
    fn conv_kernel_repack() {
        // 1x2 filter, 2 in channels, 2 out channels; values encode their
        // (fx, ic, oc) source coordinates as fx*100 + ic*10 + oc.
        let mut keras = Vec::new();
        for fx in 0..2 {
            for ic in 0..2 {
                for oc in 0..2 {
                    keras.push((fx * 100 + ic * 10 + oc) as f32);
                }
            }
        }
        let packed = repack_conv_kernel(&keras, 1, 2, 2, 2).unwrap();
        // Accelerator order [oc][fy][fx][ic].
        let mut expected = Vec::new();
        for oc in 0..2 {
            for fx in 0..2 {
                for ic in 0..2 {
                    expected.push((fx * 100 + ic * 10 + oc) as f32);
                }
            }
        }
        assert_eq!(packed, expected);

        assert!(repack_conv_kernel(&keras, 3, 3, 2, 2).is_err());
    }

    #[test]
    fn quantize_rounds_and_clamps() {
        let data = [0.0f32, 0.5, 1.0, -1.0, 300.0, -300.0];
        assert_eq!(quantize_f32(&data, 1.0, 0), vec![0, 1, 1, 0, 255, 0]);
        assert_eq!(quantize_f32(&data, 0.5, 10), vec![10, 11, 12, 8, 255, 0]);
    }
}
