//! Additive share vectors and their on-disk text format.
//!
//! A secret x is stored as a pair (x0, x1) with x0 + x1 = x mod 2^32, one
//! component per party. Share files hold one decimal field element per line.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::ProtocolError;
use crate::field::{self, Field};

/// Split a secret into two uniformly distributed additive shares.
pub fn split_secret(secret: Field) -> (Field, Field) {
    let share0 = field::random();
    let share1 = field::sub(secret, share0);
    (share0, share1)
}

/// Recombine both parties' share vectors element-wise.
pub fn reconstruct(shares0: &[Field], shares1: &[Field]) -> Vec<Field> {
    shares0
        .iter()
        .zip(shares1.iter())
        .map(|(a, b)| field::add(*a, *b))
        .collect()
}

pub fn load_share_vector(path: &Path, expected_len: usize) -> Result<Vec<Field>, ProtocolError> {
    let text = fs::read_to_string(path).map_err(|e| malformed(path, e.to_string()))?;
    let mut shares = Vec::with_capacity(expected_len);
    for token in text.split_whitespace() {
        let value = token
            .parse::<Field>()
            .map_err(|_| malformed(path, format!("bad share element {:?}", token)))?;
        shares.push(value);
    }
    if shares.len() != expected_len {
        return Err(malformed(
            path,
            format!("expected {} share elements, found {}", expected_len, shares.len()),
        ));
    }
    Ok(shares)
}

pub fn save_share_vector(path: &Path, shares: &[Field]) -> std::io::Result<()> {
    let mut out = Vec::with_capacity(shares.len() * 12);
    for value in shares {
        writeln!(out, "{}", value)?;
    }
    fs::write(path, out)
}

fn malformed(path: &Path, detail: String) -> ProtocolError {
    ProtocolError::MalformedInput {
        path: path.display().to_string(),
        detail,
    }
}
