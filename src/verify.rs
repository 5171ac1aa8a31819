//! Clear-text verification of a finished run.
//!
//! Reconstructs U and V from both parties' share files, recovers each
//! query's target slot by combining the two DPF key shares, replays the
//! update rule without any secret sharing, and compares the result against
//! the reconstructed updated V shares.

use std::error::Error;
use std::path::Path;

use tracing::{error, info, warn};

use crate::config::ProtocolConfig;
use crate::field;
use crate::query;
use crate::shares::{load_share_vector, reconstruct};

/// Returns Ok(true) when every slot of the updated V matches the replay.
pub fn run(data_dir: &Path) -> Result<bool, Box<dyn Error>> {
    let config = ProtocolConfig::load(&data_dir.join("config.txt"))?;

    let u0 = load_share_vector(&data_dir.join("U0_shares.txt"), config.num_users)?;
    let u1 = load_share_vector(&data_dir.join("U1_shares.txt"), config.num_users)?;
    let v0 = load_share_vector(&data_dir.join("V0_shares.txt"), config.num_items)?;
    let v1 = load_share_vector(&data_dir.join("V1_shares.txt"), config.num_items)?;
    let updated0 = load_share_vector(&data_dir.join("V0_shares_updated.txt"), config.num_items)?;
    let updated1 = load_share_vector(&data_dir.join("V1_shares_updated.txt"), config.num_items)?;

    let u = reconstruct(&u0, &u1);
    let mut v = reconstruct(&v0, &v1);
    let v_updated = reconstruct(&updated0, &updated1);

    let queries0 = query::load_queries(&data_dir.join("queries_p0.txt"), config.num_items as u64)?;
    let queries1 = query::load_queries(&data_dir.join("queries_p1.txt"), config.num_items as u64)?;
    if queries0.len() != queries1.len() {
        return Err(format!(
            "query files disagree on count: {} vs {}",
            queries0.len(),
            queries1.len()
        )
        .into());
    }

    for (index, (q0, q1)) in queries0.iter().zip(queries1.iter()).enumerate() {
        if q0.user_id != q1.user_id {
            warn!(
                "query {}: user id mismatch ({} vs {}), P0's id wins",
                index, q0.user_id, q1.user_id
            );
        }
        let (item, value) = recover_point(&q0.key.eval_full(), &q1.key.eval_full())
            .ok_or_else(|| format!("query {}: key pair does not share a one-hot point", index))?;
        if value != 1 {
            return Err(format!("query {}: programmed value {} instead of 1", index, value).into());
        }

        // V[j] += u_i * (1 - u_i * V[j])
        let ui = u[q0.user_id as usize % config.num_users];
        let delta = field::sub(1, field::mul(ui, v[item]));
        v[item] = field::add(v[item], field::mul(ui, delta));
    }

    let mut mismatches = 0;
    for i in 0..config.num_items {
        if v[i] != v_updated[i] {
            error!(
                "V[{}]: expected {}, parties produced {}",
                i, v[i], v_updated[i]
            );
            mismatches += 1;
        }
    }
    if mismatches == 0 {
        info!(
            "verification passed: {} items match after {} queries",
            config.num_items,
            queries0.len()
        );
        Ok(true)
    } else {
        error!("verification failed: {} mismatched items", mismatches);
        Ok(false)
    }
}

/// Combine both parties' full evaluations and locate the single nonzero
/// slot. Returns None when the combined vector is not one-hot.
fn recover_point(full0: &[u64], full1: &[u64]) -> Option<(usize, u64)> {
    let mut found = None;
    for (i, (a, b)) in full0.iter().zip(full1.iter()).enumerate() {
        let combined = a ^ b;
        if combined != 0 {
            if found.is_some() {
                return None;
            }
            found = Some((i, combined));
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn recovers_programmed_point() {
        let mut rng = StdRng::seed_from_u64(7);
        let (k0, k1) = dpf_tree_lib::generate(16, 11, 1, &mut rng).unwrap();
        assert_eq!(
            recover_point(&k0.eval_full(), &k1.eval_full()),
            Some((11, 1))
        );
    }

    #[test]
    fn rejects_matching_evaluations() {
        let mut rng = StdRng::seed_from_u64(8);
        let (k0, _) = dpf_tree_lib::generate(16, 3, 1, &mut rng).unwrap();
        let full = k0.eval_full();
        assert_eq!(recover_point(&full, &full), None);
    }
}
