//! Two-party secure arithmetic driven by dealer preprocessing.
//!
//! The dot-product protocol is one round trip with the peer plus one bundle
//! request to the dealer. Both parties mask their operands with the bundle's
//! X and Y vectors, exchange the masked values, and combine locally; the
//! dealer's correction terms cancel the cross terms so the two outputs form
//! an additive sharing of the true inner product.
//!
//! The algebra is kept in pure functions; the async wrappers only move bytes.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ProtocolError;
use crate::field::{self, Field};
use crate::net;
use crate::Role;

/// One party's view of a dealer bundle for dimension `x.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessing {
    pub correction: Field,
    pub x: Vec<Field>,
    pub y: Vec<Field>,
}

/// Request a bundle of the given dimension from the dealer. The exchange is
/// strict request-response; per-dimension FIFO pairing on the dealer side
/// relies on both parties issuing requests in the same logical order.
pub async fn request_preprocessing<S>(dealer: &mut S, dimension: usize) -> io::Result<Preprocessing>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    net::send_field(dealer, dimension as Field).await?;
    let correction = net::recv_field(dealer).await?;
    let x = net::recv_vector(dealer, dimension).await?;
    let y = net::recv_vector(dealer, dimension).await?;
    Ok(Preprocessing { correction, x, y })
}

/// Mask both operand vectors with the bundle, componentwise.
pub fn mask_operands(
    a_share: &[Field],
    b_share: &[Field],
    prep: &Preprocessing,
) -> (Vec<Field>, Vec<Field>) {
    let masked_a = a_share
        .iter()
        .zip(prep.x.iter())
        .map(|(a, x)| field::add(*a, *x))
        .collect();
    let masked_b = b_share
        .iter()
        .zip(prep.y.iter())
        .map(|(b, y)| field::add(*b, *y))
        .collect();
    (masked_a, masked_b)
}

/// Local combination step. Summing both parties' results recovers
/// `<a0 + a1, b0 + b1>`: the correction terms satisfy
/// `c0 + c1 = <X0, Y1> + <X1, Y0>` and cancel the mask cross terms.
pub fn combine_dot_shares(
    a_share: &[Field],
    b_share: &[Field],
    prep: &Preprocessing,
    peer_masked_a: &[Field],
    peer_masked_b: &[Field],
) -> Field {
    let mut result = 0;
    for i in 0..a_share.len() {
        let b_sum = field::add(b_share[i], peer_masked_b[i]);
        result = field::add(result, field::mul(a_share[i], b_sum));
    }
    for i in 0..a_share.len() {
        result = field::sub(result, field::mul(prep.y[i], peer_masked_a[i]));
    }
    field::add(result, prep.correction)
}

/// Secure dot product of two additively shared vectors. Returns this party's
/// additive share of `<a, b>`.
pub async fn secure_dot_product<P, D>(
    peer: &mut P,
    dealer: &mut D,
    a_share: &[Field],
    b_share: &[Field],
) -> Result<Field, ProtocolError>
where
    P: AsyncRead + AsyncWrite + Unpin,
    D: AsyncRead + AsyncWrite + Unpin,
{
    if a_share.len() != b_share.len() {
        return Err(ProtocolError::DimensionMismatch {
            left: a_share.len(),
            right: b_share.len(),
        });
    }
    let k = a_share.len();
    let prep = request_preprocessing(dealer, k).await?;

    let (masked_a, masked_b) = mask_operands(a_share, b_share, &prep);

    // Both sides send first, then receive; the symmetric order keeps the
    // round deadlock-free without a designated leader.
    net::send_vector(peer, &masked_a).await?;
    net::send_vector(peer, &masked_b).await?;
    let peer_masked_a = net::recv_vector(peer, k).await?;
    let peer_masked_b = net::recv_vector(peer, k).await?;

    Ok(combine_dot_shares(
        a_share,
        b_share,
        &prep,
        &peer_masked_a,
        &peer_masked_b,
    ))
}

/// k = 1 specialisation of [`secure_dot_product`].
pub async fn secure_multiplication<P, D>(
    peer: &mut P,
    dealer: &mut D,
    left: Field,
    right: Field,
) -> Result<Field, ProtocolError>
where
    P: AsyncRead + AsyncWrite + Unpin,
    D: AsyncRead + AsyncWrite + Unpin,
{
    secure_dot_product(peer, dealer, &[left], &[right]).await
}

/// Signed view of a boolean-shared vector: P1 negates so that, entrywise,
/// `term0[i] + term1[i]` equals the +/-1 difference of the two boolean
/// shares (0 everywhere except the programmed slot).
pub fn signed_indicator_terms(xor_values: &[u64], role: Role) -> Vec<i64> {
    xor_values
        .iter()
        .map(|v| {
            let signed = *v as i64;
            if role.is_p0() {
                signed
            } else {
                signed.wrapping_neg()
            }
        })
        .collect()
}

/// Lift a boolean-shared one-hot indicator into additive shares mod 2^32.
///
/// The single exchanged scalar is the sum of all signed terms, which for a
/// weight-1 indicator is exactly +/-1: it reveals the public Hamming weight
/// and nothing else. A negative total means the programmed slot would
/// reconstruct to -1, so both parties flip every term before lifting.
pub async fn convert_xor_to_additive<P>(
    peer: &mut P,
    xor_values: &[u64],
    role: Role,
) -> io::Result<Vec<Field>>
where
    P: AsyncRead + AsyncWrite + Unpin,
{
    let mut terms = signed_indicator_terms(xor_values, role);
    let local_sum = terms.iter().fold(0i64, |acc, t| acc.wrapping_add(*t));

    let peer_sum = if role.is_p0() {
        net::send_signed(peer, local_sum).await?;
        net::recv_signed(peer).await?
    } else {
        let sum = net::recv_signed(peer).await?;
        net::send_signed(peer, local_sum).await?;
        sum
    };

    let total = local_sum.wrapping_add(peer_sum);
    if total < 0 {
        for term in terms.iter_mut() {
            *term = term.wrapping_neg();
        }
    }

    Ok(terms.into_iter().map(field::from_signed).collect())
}
