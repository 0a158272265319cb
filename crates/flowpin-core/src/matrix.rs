//! NUMA distance matrices: square N×N tables of round-trip latency (ns) and
//! bandwidth (GB/s), read once from a text file and immutable thereafter.
//!
//! File format: the first line holds the integer dimension N, followed by
//! N lines of N whitespace-separated floating-point values in row-major
//! order.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// A square matrix indexed by NUMA node id.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    dim: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    /// Build from row-major values. `values.len()` must equal `dim * dim`.
    pub fn new(dim: usize, values: Vec<f64>) -> Result<Self> {
        if values.len() != dim * dim {
            return Err(Error::Config(format!(
                "distance matrix expects {} values for dimension {dim}, got {}",
                dim * dim,
                values.len()
            )));
        }
        Ok(Self { dim, values })
    }

    /// Parse the text format described in the module docs.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&text).map_err(|reason| Error::Matrix {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn parse(text: &str) -> std::result::Result<Self, String> {
        let mut tokens = text.split_whitespace();
        let dim: usize = tokens
            .next()
            .ok_or("empty file")?
            .parse()
            .map_err(|_| "first token is not an integer dimension".to_string())?;
        if dim == 0 {
            return Err("dimension must be at least 1".into());
        }

        let mut values = Vec::with_capacity(dim * dim);
        for token in tokens.by_ref().take(dim * dim) {
            let value: f64 = token
                .parse()
                .map_err(|_| format!("unparseable value '{token}'"))?;
            values.push(value);
        }
        if values.len() != dim * dim {
            return Err(format!(
                "expected {} values, found {}",
                dim * dim,
                values.len()
            ));
        }
        if tokens.next().is_some() {
            return Err("trailing values after the matrix body".into());
        }

        Ok(Self { dim, values })
    }

    /// Serialize back to the text format. Parsing the result reproduces the
    /// original values bit-exactly.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.dim);
        for row in 0..self.dim {
            let line = self.values[row * self.dim..(row + 1) * self.dim]
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(out, "{line}");
        }
        out
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, src: usize, dst: usize) -> f64 {
        self.values[src * self.dim + dst]
    }

    /// Row slice, used by the report writer.
    pub fn row(&self, row: usize) -> &[f64] {
        &self.values[row * self.dim..(row + 1) * self.dim]
    }
}
