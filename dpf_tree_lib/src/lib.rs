//! Tree-based distributed point function (DPF) over a power-of-two domain.
//!
//! A key pair compactly shares the indicator function of a single secret
//! index: for every `i` in `[0, size)`,
//! `eval(k0, i) ^ eval(k1, i) == if i == location { value } else { 0 }`.
//! Each key is `O(log size)` bytes and is evaluated independently by its
//! holder, so neither holder learns the programmed location.
//!
//! The PRG underneath is AES-128-CTR keyed from the first half of a 256-bit
//! seed, with a domain-separation constant XORed into the nonce so one seed
//! yields independent streams for the left child, right child, control bits
//! and leaf output.

use std::error::Error;
use std::fmt;
use std::io::{self, Write};

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;
use ctr::Ctr128BE;
use rand::RngCore;

type Aes128Ctr = Ctr128BE<Aes128>;

/// Words per seed: 8 x u32 = 256 bits.
pub const SEED_WORDS: usize = 8;

// Domain separation constants, fixed for interoperability with other
// implementations of this key format.
const DOMAIN_SL: u32 = 0xC001_5E5A;
const DOMAIN_SR: u32 = 0xC001_5255;
const DOMAIN_T: u32 = 0xC001_7455;
const DOMAIN_OUT: u32 = 0x0BAD_F00D;

/// A 256-bit PRG seed. The two least-significant bits of the first word are
/// reserved as control bits and cleared before every PRG call; the same
/// layout doubles as the per-level correction word in a [`DpfKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Seed256 {
    pub words: [u32; SEED_WORDS],
}

impl Seed256 {
    pub fn random(rng: &mut dyn RngCore) -> Self {
        let mut words = [0u32; SEED_WORDS];
        for w in words.iter_mut() {
            *w = rng.next_u32();
        }
        Seed256 { words }
    }

    #[inline]
    pub fn xor_assign(&mut self, other: &Seed256) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a ^= b;
        }
    }

    /// Clear the two reserved control bits.
    #[inline]
    fn clear_control_bits(&mut self) {
        self.words[0] &= !0x3;
    }
}

/// AES-128 key from the first four seed words, little-endian byte layout.
fn seed_to_key(seed: &Seed256) -> [u8; 16] {
    let mut key = [0u8; 16];
    for (i, w) in seed.words[..4].iter().enumerate() {
        key[4 * i..4 * i + 4].copy_from_slice(&w.to_le_bytes());
    }
    key
}

/// 96-bit nonce from words 4..7, with the domain constant folded into the
/// first nonce word.
fn make_nonce(seed: &Seed256, domain: u32) -> [u32; 3] {
    [seed.words[4] ^ domain, seed.words[5], seed.words[6]]
}

/// Fill `out` with keystream words: AES-128-CTR starting at counter 0 with
/// IV = little-endian [nonce0, nonce1, nonce2, counter]. Output words are
/// read back little-endian.
fn keystream_words(key: &[u8; 16], nonce: &[u32; 3], out: &mut [u32]) {
    let mut iv = [0u8; 16];
    iv[0..4].copy_from_slice(&nonce[0].to_le_bytes());
    iv[4..8].copy_from_slice(&nonce[1].to_le_bytes());
    iv[8..12].copy_from_slice(&nonce[2].to_le_bytes());
    // counter word starts at 0, already zeroed

    let mut cipher = Aes128Ctr::new(
        GenericArray::from_slice(key),
        GenericArray::from_slice(&iv),
    );
    let mut buf = vec![0u8; 4 * out.len()];
    cipher.apply_keystream(&mut buf);
    for (i, w) in out.iter_mut().enumerate() {
        *w = u32::from_le_bytes(buf[4 * i..4 * i + 4].try_into().unwrap());
    }
}

/// One level of tree expansion: derive both child seeds and their control
/// bits from a parent seed.
pub fn prg_expand(seed: &Seed256) -> (Seed256, u8, Seed256, u8) {
    let mut parent = *seed;
    parent.clear_control_bits();
    let key = seed_to_key(&parent);

    let mut left = Seed256::default();
    let mut right = Seed256::default();
    keystream_words(&key, &make_nonce(&parent, DOMAIN_SL), &mut left.words);
    keystream_words(&key, &make_nonce(&parent, DOMAIN_SR), &mut right.words);

    let mut t_words = [0u32; 2];
    keystream_words(&key, &make_nonce(&parent, DOMAIN_T), &mut t_words);
    let t_left = (t_words[0] & 1) as u8;
    let t_right = (t_words[1] & 1) as u8;

    left.clear_control_bits();
    right.clear_control_bits();
    (left, t_left, right, t_right)
}

/// Leaf output: two keystream words from the OUT domain, combined
/// little-endian into a u64.
pub fn prg_leaf(seed: &Seed256) -> u64 {
    let key = seed_to_key(seed);
    let mut w = [0u32; 2];
    keystream_words(&key, &make_nonce(seed, DOMAIN_OUT), &mut w);
    (w[0] as u64) | ((w[1] as u64) << 32)
}

#[derive(Debug)]
pub enum DpfError {
    DomainNotPowerOfTwo(u64),
    LocationOutOfRange { location: u64, size: u64 },
    IndexOutOfRange { index: u64, size: u64 },
    MalformedKey(String),
}

impl fmt::Display for DpfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DpfError::DomainNotPowerOfTwo(size) => {
                write!(f, "DPF domain size {} is not a power of two", size)
            }
            DpfError::LocationOutOfRange { location, size } => {
                write!(f, "location {} out of range for domain {}", location, size)
            }
            DpfError::IndexOutOfRange { index, size } => {
                write!(f, "index {} out of range for domain {}", index, size)
            }
            DpfError::MalformedKey(msg) => write!(f, "malformed DPF key: {}", msg),
        }
    }
}

impl Error for DpfError {}

/// One party's share of a point function. The correction words `cw_*` are
/// identical in both keys of a pair; only `root_seed` and `root_t` differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpfKey {
    pub root_seed: Seed256,
    pub root_t: u8,
    pub cw_seed: Vec<Seed256>,
    pub cw_tl: Vec<u8>,
    pub cw_tr: Vec<u8>,
    pub cw_out: u64,
    pub size: u64,
    pub depth: usize,
}

fn is_power_of_two(x: u64) -> bool {
    x != 0 && (x & (x - 1)) == 0
}

fn ilog2_size(size: u64) -> usize {
    let mut depth = 0;
    while (1u64 << depth) < size {
        depth += 1;
    }
    depth
}

/// Bit of `index` at tree level `level`, MSB-first: level 0 selects the most
/// significant of the `depth` index bits.
#[inline]
fn level_bit(index: u64, depth: usize, level: usize) -> u8 {
    ((index >> (depth - 1 - level)) & 1) as u8
}

/// Generate a key pair sharing the point function that maps `location` to
/// `value` over the domain `[0, size)`.
pub fn generate(
    size: u64,
    location: u64,
    value: u64,
    rng: &mut dyn RngCore,
) -> Result<(DpfKey, DpfKey), DpfError> {
    if !is_power_of_two(size) {
        return Err(DpfError::DomainNotPowerOfTwo(size));
    }
    if location >= size {
        return Err(DpfError::LocationOutOfRange { location, size });
    }
    let depth = ilog2_size(size);

    let root0 = Seed256::random(rng);
    let root1 = Seed256::random(rng);
    let root_t0 = (root0.words[0] & 1) as u8;
    let root_t1 = root_t0 ^ 1;

    let mut cw_seed = Vec::with_capacity(depth);
    let mut cw_tl = Vec::with_capacity(depth);
    let mut cw_tr = Vec::with_capacity(depth);

    let mut cur0 = root0;
    let mut cur1 = root1;
    let mut tau0 = root_t0;
    let mut tau1 = root_t1;

    for level in 0..depth {
        let (s0l, t0l, s0r, t0r) = prg_expand(&cur0);
        let (s1l, t1l, s1r, t1r) = prg_expand(&cur1);

        let bit = level_bit(location, depth, level);
        let keep = bit;

        let cwt_l = t0l ^ t1l ^ bit ^ 1;
        let cwt_r = t0r ^ t1r ^ bit;
        cw_tl.push(cwt_l);
        cw_tr.push(cwt_r);

        // The correction word is the XOR of both parties' seeds on the path
        // that loses the programmed point; applying it collapses the lose
        // branch to a shared (cancelling) state.
        let mut corr = if keep == 1 { s0l } else { s0r };
        corr.xor_assign(if keep == 1 { &s1l } else { &s1r });
        cw_seed.push(corr);

        let mut child0 = if keep == 0 { s0l } else { s0r };
        let tchild0 = if keep == 0 { t0l } else { t0r };
        if tau0 == 0 {
            child0.xor_assign(&corr);
        }
        tau0 = tchild0 ^ (tau0 & if keep == 0 { cwt_l } else { cwt_r });
        cur0 = child0;

        let mut child1 = if keep == 0 { s1l } else { s1r };
        let tchild1 = if keep == 0 { t1l } else { t1r };
        if tau1 == 0 {
            child1.xor_assign(&corr);
        }
        tau1 = tchild1 ^ (tau1 & if keep == 0 { cwt_l } else { cwt_r });
        cur1 = child1;
    }

    let cw_out = value ^ prg_leaf(&cur0) ^ prg_leaf(&cur1);

    let k0 = DpfKey {
        root_seed: root0,
        root_t: root_t0,
        cw_seed: cw_seed.clone(),
        cw_tl: cw_tl.clone(),
        cw_tr: cw_tr.clone(),
        cw_out,
        size,
        depth,
    };
    let k1 = DpfKey {
        root_seed: root1,
        root_t: root_t1,
        cw_seed,
        cw_tl,
        cw_tr,
        cw_out,
        size,
        depth,
    };
    Ok((k0, k1))
}

impl DpfKey {
    /// Evaluate this key share at a single index.
    pub fn eval(&self, index: u64) -> Result<u64, DpfError> {
        if index >= self.size {
            return Err(DpfError::IndexOutOfRange {
                index,
                size: self.size,
            });
        }
        Ok(self.eval_in_range(index))
    }

    fn eval_in_range(&self, index: u64) -> u64 {
        let mut seed = self.root_seed;
        let mut t = self.root_t;
        for level in 0..self.depth {
            let (sl, tl, sr, tr) = prg_expand(&seed);
            let bit = level_bit(index, self.depth, level);
            let mut child = if bit == 1 { sr } else { sl };
            let tau = if bit == 1 { tr } else { tl };
            let cwt = if bit == 1 {
                self.cw_tr[level]
            } else {
                self.cw_tl[level]
            };
            let next_t = tau ^ (t & cwt);
            if t == 0 {
                child.xor_assign(&self.cw_seed[level]);
            }
            seed = child;
            t = next_t;
        }
        let mut out = prg_leaf(&seed);
        if t == 1 {
            out ^= self.cw_out;
        }
        out
    }

    /// Evaluate this key share over the whole domain.
    pub fn eval_full(&self) -> Vec<u64> {
        (0..self.size).map(|i| self.eval_in_range(i)).collect()
    }

    /// Whitespace-separated text serialization, one key per block:
    /// `size depth`, root seed words, root t-bit, leaf correction, one line
    /// of seed words per level, then the left and right control-bit rows.
    pub fn write_text<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{} {}", self.size, self.depth)?;
        write_seed_line(out, &self.root_seed)?;
        writeln!(out, "{}", self.root_t)?;
        writeln!(out, "{}", self.cw_out)?;
        for seed in &self.cw_seed {
            write_seed_line(out, seed)?;
        }
        write_bit_line(out, &self.cw_tl)?;
        write_bit_line(out, &self.cw_tr)?;
        Ok(())
    }

    /// Parse a key from a whitespace token stream, the inverse of
    /// [`DpfKey::write_text`].
    pub fn read_text<'a, I>(tokens: &mut I) -> Result<DpfKey, DpfError>
    where
        I: Iterator<Item = &'a str>,
    {
        let size = next_u64(tokens, "size")?;
        let depth = next_u64(tokens, "depth")? as usize;
        if !is_power_of_two(size) {
            return Err(DpfError::DomainNotPowerOfTwo(size));
        }
        if depth != ilog2_size(size) {
            return Err(DpfError::MalformedKey(format!(
                "depth {} does not match domain size {}",
                depth, size
            )));
        }

        let root_seed = read_seed(tokens)?;
        let root_t = (next_u64(tokens, "root t-bit")? & 1) as u8;
        let cw_out = next_u64(tokens, "leaf correction")?;

        let mut cw_seed = Vec::with_capacity(depth);
        for _ in 0..depth {
            cw_seed.push(read_seed(tokens)?);
        }
        let mut cw_tl = Vec::with_capacity(depth);
        for _ in 0..depth {
            cw_tl.push((next_u64(tokens, "left control bit")? & 1) as u8);
        }
        let mut cw_tr = Vec::with_capacity(depth);
        for _ in 0..depth {
            cw_tr.push((next_u64(tokens, "right control bit")? & 1) as u8);
        }

        Ok(DpfKey {
            root_seed,
            root_t,
            cw_seed,
            cw_tl,
            cw_tr,
            cw_out,
            size,
            depth,
        })
    }
}

fn write_seed_line<W: Write>(out: &mut W, seed: &Seed256) -> io::Result<()> {
    for (i, w) in seed.words.iter().enumerate() {
        if i + 1 < SEED_WORDS {
            write!(out, "{} ", w)?;
        } else {
            writeln!(out, "{}", w)?;
        }
    }
    Ok(())
}

fn write_bit_line<W: Write>(out: &mut W, bits: &[u8]) -> io::Result<()> {
    for (i, b) in bits.iter().enumerate() {
        if i + 1 < bits.len() {
            write!(out, "{} ", b)?;
        } else {
            write!(out, "{}", b)?;
        }
    }
    writeln!(out)
}

fn next_u64<'a, I>(tokens: &mut I, what: &str) -> Result<u64, DpfError>
where
    I: Iterator<Item = &'a str>,
{
    let tok = tokens
        .next()
        .ok_or_else(|| DpfError::MalformedKey(format!("unexpected end of input, expected {}", what)))?;
    tok.parse::<u64>()
        .map_err(|_| DpfError::MalformedKey(format!("bad {} token {:?}", what, tok)))
}

fn read_seed<'a, I>(tokens: &mut I) -> Result<Seed256, DpfError>
where
    I: Iterator<Item = &'a str>,
{
    let mut seed = Seed256::default();
    for w in seed.words.iter_mut() {
        let v = next_u64(tokens, "seed word")?;
        if v > u32::MAX as u64 {
            return Err(DpfError::MalformedKey(format!("seed word {} exceeds 32 bits", v)));
        }
        *w = v as u32;
    }
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixed_rng() -> StdRng {
        StdRng::seed_from_u64(0x5EED_CAFE)
    }

    #[test]
    fn point_function_n4() {
        let mut rng = fixed_rng();
        let (k0, k1) = generate(4, 2, 0xDEAD_BEEF, &mut rng).unwrap();
        let full0 = k0.eval_full();
        let full1 = k1.eval_full();
        let combined: Vec<u64> = full0.iter().zip(full1.iter()).map(|(a, b)| a ^ b).collect();
        assert_eq!(combined, vec![0, 0, 0xDEAD_BEEF, 0]);
    }

    #[test]
    fn point_function_across_domains() {
        let mut rng = fixed_rng();
        for depth in 0..9usize {
            let size = 1u64 << depth;
            for location in [0, size / 2, size - 1] {
                let value = rng.next_u64();
                let (k0, k1) = generate(size, location, value, &mut rng).unwrap();
                for i in 0..size {
                    let expect = if i == location { value } else { 0 };
                    assert_eq!(
                        k0.eval(i).unwrap() ^ k1.eval(i).unwrap(),
                        expect,
                        "size {} location {} index {}",
                        size,
                        location,
                        i
                    );
                }
            }
        }
    }

    #[test]
    fn keys_share_correction_words() {
        let mut rng = fixed_rng();
        let (k0, k1) = generate(64, 17, 1, &mut rng).unwrap();
        assert_eq!(k0.cw_seed, k1.cw_seed);
        assert_eq!(k0.cw_tl, k1.cw_tl);
        assert_eq!(k0.cw_tr, k1.cw_tr);
        assert_eq!(k0.cw_out, k1.cw_out);
        assert_eq!(k0.root_t ^ k1.root_t, 1);
        assert_ne!(k0.root_seed, k1.root_seed);
    }

    #[test]
    fn eval_is_deterministic() {
        let mut rng = fixed_rng();
        let (k0, _) = generate(32, 9, 77, &mut rng).unwrap();
        for i in 0..32 {
            assert_eq!(k0.eval(i).unwrap(), k0.eval(i).unwrap());
        }
        assert_eq!(k0.eval_full(), k0.eval_full());
    }

    #[test]
    fn prg_domains_yield_distinct_streams() {
        let mut rng = fixed_rng();
        let seed = Seed256::random(&mut rng);
        let key = seed_to_key(&seed);
        let mut streams = Vec::new();
        for domain in [DOMAIN_SL, DOMAIN_SR, DOMAIN_T, DOMAIN_OUT] {
            let mut words = [0u32; 4];
            keystream_words(&key, &make_nonce(&seed, domain), &mut words);
            streams.push(words);
        }
        for i in 0..streams.len() {
            for j in i + 1..streams.len() {
                assert_ne!(streams[i], streams[j], "domains {} and {} collide", i, j);
            }
        }
    }

    #[test]
    fn expand_clears_control_bits() {
        let mut rng = fixed_rng();
        let seed = Seed256::random(&mut rng);
        let (left, _, right, _) = prg_expand(&seed);
        assert_eq!(left.words[0] & 0x3, 0);
        assert_eq!(right.words[0] & 0x3, 0);

        // Expansion must not depend on the reserved bits of the input.
        let mut dirty = seed;
        dirty.words[0] ^= 0x3;
        assert_eq!(prg_expand(&seed), prg_expand(&dirty));
    }

    #[test]
    fn text_round_trip_is_bit_exact() {
        let mut rng = fixed_rng();
        let (k0, k1) = generate(16, 5, 0x1234_5678_9ABC_DEF0, &mut rng).unwrap();
        for key in [&k0, &k1] {
            let mut buf = Vec::new();
            key.write_text(&mut buf).unwrap();
            let text = String::from_utf8(buf).unwrap();
            let parsed = DpfKey::read_text(&mut text.split_whitespace()).unwrap();
            assert_eq!(&parsed, key);
            assert_eq!(parsed.eval_full(), key.eval_full());
        }
    }

    #[test]
    fn rejects_bad_parameters() {
        let mut rng = fixed_rng();
        assert!(matches!(
            generate(3, 0, 1, &mut rng),
            Err(DpfError::DomainNotPowerOfTwo(3))
        ));
        assert!(matches!(
            generate(8, 8, 1, &mut rng),
            Err(DpfError::LocationOutOfRange { .. })
        ));
        let (k0, _) = generate(8, 3, 1, &mut rng).unwrap();
        assert!(matches!(
            k0.eval(8),
            Err(DpfError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_truncated_text() {
        let mut rng = fixed_rng();
        let (k0, _) = generate(8, 1, 1, &mut rng).unwrap();
        let mut buf = Vec::new();
        k0.write_text(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let truncated = tokens[..tokens.len() - 1].join(" ");
        assert!(DpfKey::read_text(&mut truncated.split_whitespace()).is_err());
    }
}
