//! Query files: one DPF key share plus the querying user's id per record.

use std::fs;
use std::io::Write;
use std::path::Path;

use dpf_tree_lib::DpfKey;
use tracing::warn;

use crate::error::ProtocolError;

/// One private query as held by a single party. The key is this party's
/// share of a point function programming value 1 at the selected item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub user_id: u32,
    pub key: DpfKey,
}

/// Load a party's query file. Header is `count domain`, then `count`
/// records of a user id followed by the key text.
pub fn load_queries(path: &Path, expected_domain: u64) -> Result<Vec<Query>, ProtocolError> {
    let text = fs::read_to_string(path).map_err(|e| malformed(path, e.to_string()))?;
    let mut tokens = text.split_whitespace();

    let count = next_u64(&mut tokens, path, "query count")?;
    let domain = next_u64(&mut tokens, path, "query domain")?;
    if domain != expected_domain {
        warn!(
            "query file {} has domain {}, expected {}",
            path.display(),
            domain,
            expected_domain
        );
    }

    let mut queries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let user_id = next_u64(&mut tokens, path, "user id")? as u32;
        let key = DpfKey::read_text(&mut tokens)
            .map_err(|e| malformed(path, e.to_string()))?;
        queries.push(Query { user_id, key });
    }
    Ok(queries)
}

pub fn save_queries(path: &Path, queries: &[Query], domain: u64) -> std::io::Result<()> {
    let mut out = Vec::new();
    writeln!(out, "{} {}", queries.len(), domain)?;
    for query in queries {
        writeln!(out, "{}", query.user_id)?;
        query.key.write_text(&mut out)?;
        writeln!(out)?;
    }
    fs::write(path, out)
}

fn next_u64<'a, I>(tokens: &mut I, path: &Path, what: &str) -> Result<u64, ProtocolError>
where
    I: Iterator<Item = &'a str>,
{
    let tok = tokens
        .next()
        .ok_or_else(|| malformed(path, format!("missing {}", what)))?;
    tok.parse::<u64>()
        .map_err(|_| malformed(path, format!("bad {} token {:?}", what, tok)))
}

fn malformed(path: &Path, detail: String) -> ProtocolError {
    ProtocolError::MalformedInput {
        path: path.display().to_string(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn query_file_round_trip() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut queries = Vec::new();
        for (user, item) in [(0u32, 1u64), (3, 0), (1, 7)] {
            let (k0, _) = dpf_tree_lib::generate(8, item, 1, &mut rng).unwrap();
            queries.push(Query {
                user_id: user,
                key: k0,
            });
        }

        let path = std::env::temp_dir().join(format!("recshare-queries-{}", std::process::id()));
        save_queries(&path, &queries, 8).unwrap();
        let loaded = load_queries(&path, 8).unwrap();
        assert_eq!(loaded, queries);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn truncated_file_is_rejected() {
        let path = std::env::temp_dir().join(format!("recshare-badquery-{}", std::process::id()));
        std::fs::write(&path, "2 8\n0\n").unwrap();
        assert!(load_queries(&path, 8).is_err());
        std::fs::remove_file(&path).ok();
    }
}
