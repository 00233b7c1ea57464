use crate::error::NetError;
use crate::layers::AffineTransform;
use crate::math::Matrix;
use serde::{Deserialize, Serialize};
use std::{fs, io};

// JSON checkpointing of layer parameters. This is a convenience export for
// inspection and interop; the token-stream format in `io` is the
// authoritative full-state round-trip and also carries optimizer
// accumulators, which this path does not.

#[derive(Serialize, Deserialize)]
pub struct AffineJson {
    pub linearity: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

/// Convert a [`Matrix`] into a 2-D `Vec` for serialisation.
pub fn matrix_to_vec2(m: &Matrix) -> Vec<Vec<f32>> {
    (0..m.rows)
        .map(|r| (0..m.cols).map(|c| m.get(r, c)).collect())
        .collect()
}

/// Convert a 2-D `Vec` into a [`Matrix`].
pub fn vec2_to_matrix(rows: &[Vec<f32>]) -> Matrix {
    if rows.is_empty() || rows[0].is_empty() {
        return Matrix::zeros(0, 0);
    }
    let r = rows.len();
    let c = rows[0].len();
    let mut mat = Matrix::zeros(r, c);
    for (i, row) in rows.iter().enumerate() {
        for (j, &val) in row.iter().enumerate() {
            mat.set(i, j, val);
        }
    }
    mat
}

pub fn save_affine(path: &str, layer: &AffineTransform) -> Result<(), NetError> {
    let json = AffineJson {
        linearity: matrix_to_vec2(layer.linearity()),
        bias: layer.bias().to_vec(),
    };
    let txt = serde_json::to_string(&json).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    fs::write(path, txt)?;
    log::info!("saved affine weights to {path}");
    Ok(())
}

pub fn load_affine(path: &str, layer: &mut AffineTransform) -> Result<(), NetError> {
    let txt = fs::read_to_string(path)?;
    let json: AffineJson = serde_json::from_str(&txt).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let linearity = vec2_to_matrix(&json.linearity);
    if linearity.rows != layer.output_dim()
        || linearity.cols != layer.input_dim()
        || json.bias.len() != layer.output_dim()
    {
        return Err(NetError::CorruptState(format!(
            "checkpoint {path} does not match layer dims {}x{}",
            layer.output_dim(),
            layer.input_dim()
        )));
    }
    layer.set_linearity(&linearity);
    layer.set_bias(&json.bias);
    log::info!("loaded affine weights from {path}");
    Ok(())
}

/// Save an arbitrary checkpoint structure to `path` using JSON serialisation.
pub fn save_checkpoint<T: Serialize>(path: &str, state: &T) -> Result<(), NetError> {
    let txt = serde_json::to_string(state).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    if let Some(parent) = std::path::Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, txt)?;
    log::info!("saved checkpoint to {path}");
    Ok(())
}

/// Load a checkpoint from `path` that was saved with [`save_checkpoint`].
pub fn load_checkpoint<T: for<'de> Deserialize<'de>>(path: &str) -> Result<T, NetError> {
    let txt = fs::read_to_string(path)?;
    let state = serde_json::from_str(&txt).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    log::info!("loaded checkpoint from {path}");
    Ok(state)
}
