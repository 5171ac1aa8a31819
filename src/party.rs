//! Per-query protocol driver for a compute party.
//!
//! Each query walks a fixed sequence: align the user id with the peer,
//! expand the DPF key into a boolean-shared indicator, lift it to additive
//! shares, privately select the item factor, form the residual
//! delta = 1 - <u, v_j>, compose the update scalar M = u * delta, and fold
//! indicator[i] * M into every slot of V. Off-slot updates carry additive
//! noise that cancels across the two parties, so in reconstruction only the
//! selected item moves.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::error::ProtocolError;
use crate::field::{self, Field};
use crate::mpc;
use crate::net;
use crate::query::Query;
use crate::Role;

/// Align the querying user's id with the peer. P0 speaks first and its id
/// wins on mismatch; the exchange only guards against the two query files
/// drifting out of step.
async fn sync_user_id<P>(peer: &mut P, role: Role, own_id: u32) -> std::io::Result<u32>
where
    P: AsyncRead + AsyncWrite + Unpin,
{
    match role {
        Role::P0 => {
            net::send_field(peer, own_id as Field).await?;
            let peer_id = net::recv_field(peer).await? as u32;
            if peer_id != own_id {
                warn!(
                    "user id mismatch (P0={}, P1={}), using P0's id",
                    own_id, peer_id
                );
            }
            Ok(own_id)
        }
        Role::P1 => {
            let peer_id = net::recv_field(peer).await? as u32;
            net::send_field(peer, own_id as Field).await?;
            if peer_id != own_id {
                warn!(
                    "user id mismatch (P1={}, P0={}), using P0's id",
                    own_id, peer_id
                );
            }
            Ok(peer_id)
        }
    }
}

/// Run every query against the shared state, mutating this party's V shares
/// in place. Any transport error aborts the whole computation; the caller
/// must not persist V unless this returns Ok.
pub async fn process_queries<P, D>(
    role: Role,
    peer: &mut P,
    dealer: &mut D,
    u_shares: &[Field],
    v_shares: &mut [Field],
    queries: &[Query],
) -> Result<(), ProtocolError>
where
    P: AsyncRead + AsyncWrite + Unpin,
    D: AsyncRead + AsyncWrite + Unpin,
{
    let num_items = v_shares.len() as u64;

    for (index, query) in queries.iter().enumerate() {
        let user_id = sync_user_id(peer, role, query.user_id).await?;
        let user_idx = user_id as usize % u_shares.len();
        let ui_share = u_shares[user_idx];

        if query.key.size != num_items {
            return Err(ProtocolError::DomainMismatch {
                expected: num_items,
                actual: query.key.size,
            });
        }
        let indicator_xor = query.key.eval_full();
        let indicator = mpc::convert_xor_to_additive(peer, &indicator_xor, role).await?;

        // v_j = <V, indicator>: the one-hot sharing selects the item factor
        // without revealing which slot was hit.
        let vj_share = mpc::secure_dot_product(peer, dealer, v_shares, &indicator).await?;
        let dot_share = mpc::secure_multiplication(peer, dealer, ui_share, vj_share).await?;

        // delta = 1 - <u, v_j>; the public constant 1 is P0's to contribute.
        let delta_share = if role.is_p0() {
            field::sub(1, dot_share)
        } else {
            field::sub(0, dot_share)
        };

        let m_share = mpc::secure_multiplication(peer, dealer, ui_share, delta_share).await?;

        for i in 0..v_shares.len() {
            let update = mpc::secure_multiplication(peer, dealer, indicator[i], m_share).await?;
            v_shares[i] = field::add(v_shares[i], update);
        }

        info!("{}: processed query {}/{}", role, index + 1, queries.len());
    }

    Ok(())
}
