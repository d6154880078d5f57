//! Model serialization/deserialization.
//!
//! The on-disk format is a JSON object with exactly four fields:
//!
//! - `W1`: hidden_dim rows of input_dim numbers
//! - `b1`: hidden_dim numbers
//! - `W2`: output_dim rows of hidden_dim numbers
//! - `b2`: output_dim numbers
//!
//! Design notes:
//! - We do NOT directly serialize the internal `Mlp`/`Layer` structs; the
//!   nested-array layout stays stable even if internal storage changes.
//! - Deserialization is schema-driven: a missing or unknown field, or a
//!   non-numeric value, is rejected by serde before any shape check runs.
//! - After parsing, every row length, bias length and value is validated.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Layer, Mlp, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializedMlp {
    #[serde(rename = "W1")]
    pub w1: Vec<Vec<f64>>,
    pub b1: Vec<f64>,
    #[serde(rename = "W2")]
    pub w2: Vec<Vec<f64>>,
    pub b2: Vec<f64>,
}

impl SerializedMlp {
    /// Check that the four containers describe a consistent network.
    pub fn validate(&self) -> Result<()> {
        let hidden_dim = self.w1.len();
        let output_dim = self.w2.len();
        if hidden_dim == 0 {
            return Err(Error::InvalidModel("W1 must have at least one row".to_owned()));
        }
        if output_dim == 0 {
            return Err(Error::InvalidModel("W2 must have at least one row".to_owned()));
        }

        let input_dim = self.w1[0].len();
        if input_dim == 0 {
            return Err(Error::InvalidModel("W1 rows must not be empty".to_owned()));
        }
        check_rows("W1", &self.w1, input_dim)?;
        check_len("b1", &self.b1, hidden_dim)?;
        check_rows("W2", &self.w2, hidden_dim)?;
        check_len("b2", &self.b2, output_dim)?;

        let mut all = self
            .w1
            .iter()
            .flatten()
            .chain(&self.b1)
            .chain(self.w2.iter().flatten())
            .chain(&self.b2);
        if all.any(|v| !v.is_finite()) {
            return Err(Error::InvalidModel(
                "parameters must contain only finite values".to_owned(),
            ));
        }

        Ok(())
    }
}

fn check_rows(name: &str, rows: &[Vec<f64>], cols: usize) -> Result<()> {
    for (i, row) in rows.iter().enumerate() {
        if row.len() != cols {
            return Err(Error::InvalidModel(format!(
                "{name} row {i} has {} columns, expected {cols}",
                row.len()
            )));
        }
    }
    Ok(())
}

fn check_len(name: &str, v: &[f64], len: usize) -> Result<()> {
    if v.len() != len {
        return Err(Error::InvalidModel(format!(
            "{name} has length {}, expected {len}",
            v.len()
        )));
    }
    Ok(())
}

fn layer_rows(layer: &Layer) -> Vec<Vec<f64>> {
    layer
        .weights()
        .chunks(layer.in_dim())
        .map(<[f64]>::to_vec)
        .collect()
}

impl From<&Mlp> for SerializedMlp {
    fn from(model: &Mlp) -> Self {
        Self {
            w1: layer_rows(model.hidden()),
            b1: model.hidden().biases().to_vec(),
            w2: layer_rows(model.output()),
            b2: model.output().biases().to_vec(),
        }
    }
}

impl TryFrom<SerializedMlp> for Mlp {
    type Error = Error;

    fn try_from(value: SerializedMlp) -> std::result::Result<Self, Self::Error> {
        value.validate()?;

        let input_dim = value.w1[0].len();
        let hidden_dim = value.w1.len();
        let output_dim = value.w2.len();

        let to_model_err = |e: Error| Error::InvalidModel(e.to_string());
        let hidden = Layer::from_parts(input_dim, hidden_dim, value.w1.concat(), value.b1)
            .map_err(to_model_err)?;
        let output = Layer::from_parts(hidden_dim, output_dim, value.w2.concat(), value.b2)
            .map_err(to_model_err)?;

        Mlp::from_layers(hidden, output).map_err(to_model_err)
    }
}

impl Mlp {
    /// Serialize the model to a pretty-printed JSON string.
    ///
    /// Fails if any parameter is non-finite (JSON has no encoding for it).
    pub fn to_json_string_pretty(&self) -> Result<String> {
        let ser = SerializedMlp::from(self);
        ser.validate()?;
        serde_json::to_string_pretty(&ser)
            .map_err(|e| Error::InvalidModel(format!("failed to serialize model: {e}")))
    }

    /// Serialize the model to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        let ser = SerializedMlp::from(self);
        ser.validate()?;
        serde_json::to_string(&ser)
            .map_err(|e| Error::InvalidModel(format!("failed to serialize model: {e}")))
    }

    /// Parse a model from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedMlp = serde_json::from_str(s)
            .map_err(|e| Error::InvalidModel(format!("failed to parse model json: {e}")))?;
        ser.try_into()
    }

    /// Save the model to a JSON file (pretty-printed).
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s).map_err(|e| Error::io(p, e))?;
        debug!(path = %p.display(), "saved model");
        Ok(())
    }

    /// Load a model from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p).map_err(|e| Error::io(p, e))?;
        let mlp = Self::from_json_str(&s)?;
        debug!(
            path = %p.display(),
            input_dim = mlp.input_dim(),
            hidden_dim = mlp.hidden_dim(),
            output_dim = mlp.output_dim(),
            "loaded model"
        );
        Ok(mlp)
    }
}
