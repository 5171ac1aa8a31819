//! Offline setup: split fresh U and V secrets into per-party share files
//! and generate both parties' query files.

use std::error::Error;
use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::config::ProtocolConfig;
use crate::field;
use crate::query::{self, Query};
use crate::shares;

/// Generate `data/` from scratch: config, four share files, two query files.
/// Every query programs value 1 at a uniformly chosen item for a uniformly
/// chosen user.
pub fn run(
    data_dir: &Path,
    num_users: usize,
    num_items: usize,
    num_queries: usize,
) -> Result<(), Box<dyn Error>> {
    if num_users == 0 {
        return Err("num_users must be positive".into());
    }
    if !(num_items as u64).is_power_of_two() {
        return Err(format!("num_items {} must be a power of two", num_items).into());
    }

    fs::create_dir_all(data_dir)?;

    let mut u0 = Vec::with_capacity(num_users);
    let mut u1 = Vec::with_capacity(num_users);
    for _ in 0..num_users {
        let (s0, s1) = shares::split_secret(field::random());
        u0.push(s0);
        u1.push(s1);
    }
    let mut v0 = Vec::with_capacity(num_items);
    let mut v1 = Vec::with_capacity(num_items);
    for _ in 0..num_items {
        let (s0, s1) = shares::split_secret(field::random());
        v0.push(s0);
        v1.push(s1);
    }

    shares::save_share_vector(&data_dir.join("U0_shares.txt"), &u0)?;
    shares::save_share_vector(&data_dir.join("U1_shares.txt"), &u1)?;
    shares::save_share_vector(&data_dir.join("V0_shares.txt"), &v0)?;
    shares::save_share_vector(&data_dir.join("V1_shares.txt"), &v1)?;

    let config = ProtocolConfig {
        num_users,
        num_items,
        num_queries,
    };
    config.save(&data_dir.join("config.txt"))?;

    let mut rng = StdRng::from_os_rng();
    let mut queries_p0 = Vec::with_capacity(num_queries);
    let mut queries_p1 = Vec::with_capacity(num_queries);
    for _ in 0..num_queries {
        let user_id = rng.random_range(0..num_users) as u32;
        let item = rng.random_range(0..num_items as u64);
        let (k0, k1) = dpf_tree_lib::generate(num_items as u64, item, 1, &mut rng)?;
        queries_p0.push(Query {
            user_id,
            key: k0,
        });
        queries_p1.push(Query {
            user_id,
            key: k1,
        });
    }
    query::save_queries(&data_dir.join("queries_p0.txt"), &queries_p0, num_items as u64)?;
    query::save_queries(&data_dir.join("queries_p1.txt"), &queries_p1, num_items as u64)?;

    info!(
        "generated {} queries for {} users and {} items in {}",
        num_queries,
        num_users,
        num_items,
        data_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shares::{load_share_vector, reconstruct};

    #[test]
    fn setup_writes_consistent_state() {
        let dir = std::env::temp_dir().join(format!("recshare-setup-{}", std::process::id()));
        run(&dir, 3, 8, 2).unwrap();

        let config = ProtocolConfig::load(&dir.join("config.txt")).unwrap();
        assert_eq!(config.num_users, 3);
        assert_eq!(config.num_items, 8);
        assert_eq!(config.num_queries, 2);

        let u0 = load_share_vector(&dir.join("U0_shares.txt"), 3).unwrap();
        let u1 = load_share_vector(&dir.join("U1_shares.txt"), 3).unwrap();
        for value in reconstruct(&u0, &u1) {
            assert!(value < field::MODULUS);
        }

        let q0 = query::load_queries(&dir.join("queries_p0.txt"), 8).unwrap();
        let q1 = query::load_queries(&dir.join("queries_p1.txt"), 8).unwrap();
        assert_eq!(q0.len(), 2);
        assert_eq!(q1.len(), 2);
        for (a, b) in q0.iter().zip(q1.iter()) {
            assert_eq!(a.user_id, b.user_id);
            // The pair must share a one-hot point with value 1.
            let combined: Vec<u64> = a
                .key
                .eval_full()
                .iter()
                .zip(b.key.eval_full().iter())
                .map(|(x, y)| x ^ y)
                .collect();
            assert_eq!(combined.iter().filter(|v| **v != 0).count(), 1);
            assert!(combined.contains(&1));
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn setup_rejects_bad_dimensions() {
        let dir = std::env::temp_dir().join(format!("recshare-setup-bad-{}", std::process::id()));
        assert!(run(&dir, 3, 12, 1).is_err());
        assert!(run(&dir, 0, 8, 1).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
