//! Rate-1/2 LDPC forward error correction: deterministic parity-check
//! matrix construction, systematic encoding, and log-domain min-sum
//! belief-propagation decoding over the resulting Tanner graph.
//!
//! The parity-check matrix is `H = [A | I_m]` with `A` a sparse, seeded,
//! cycle-light `m x k` binary matrix (column weight `min(3, n/4)`),
//! giving a systematic generator `G = [I_k | A^T]` for free
//! (`H * G^T = A + A = 0` over GF(2)), with no Gaussian elimination needed
//! at encode time.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand::seq::SliceRandom;

use crate::types::{HardBit, Llr};

/// The four declared LDPC variants, all rate 1/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    N16,
    N32,
    N64,
    N128,
}

impl Variant {
    pub fn n(self) -> usize {
        match self {
            Variant::N16 => 16,
            Variant::N32 => 32,
            Variant::N64 => 64,
            Variant::N128 => 128,
        }
    }

    pub fn k(self) -> usize {
        self.n() / 2
    }

    /// Decode the 2-bit `ldpc_n_type` header field: MSB-first, values in
    /// variant declaration order.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0b11 {
            0 => Some(Variant::N16),
            1 => Some(Variant::N32),
            2 => Some(Variant::N64),
            3 => Some(Variant::N128),
            _ => unreachable!(),
        }
    }

    pub fn to_bits(self) -> u8 {
        match self {
            Variant::N16 => 0,
            Variant::N32 => 1,
            Variant::N64 => 2,
            Variant::N128 => 3,
        }
    }

    /// Per-variant seed for the deterministic matrix construction. Fixed so
    /// an encoder and decoder constructed independently always agree.
    fn seed(self) -> u64 {
        0xD55C_0DE0_0000_0000 ^ self.n() as u64
    }
}

/// A constructed LDPC code: parity-check matrix in sparse adjacency form,
/// plus the dense parity-generation matrix `A` used for systematic
/// encoding.
#[derive(Debug, Clone)]
pub struct Code {
    pub variant: Variant,
    n: usize,
    k: usize,
    m: usize,
    /// `A[check][..]`: the k variable-node indices (0..k) each parity check
    /// also depends on, alongside its own identity bit `k + check`.
    a_rows: Vec<Vec<usize>>,
    /// `check_of_var[v]`: checks that depend on message variable `v` (only
    /// for `v < k`; columns `k..n` each belong to exactly one check).
    var_checks: Vec<Vec<usize>>,
}

impl Code {
    /// Build the code for `variant`, deterministically.
    pub fn build(variant: Variant) -> Self {
        let n = variant.n();
        let k = variant.k();
        let m = n - k;
        let col_weight = (3usize).min(n / 4).max(1);

        let mut rng = StdRng::seed_from_u64(variant.seed());
        let mut var_checks: Vec<Vec<usize>> = vec![Vec::new(); k];
        let mut a_rows: Vec<Vec<usize>> = vec![Vec::new(); m];

        for v in 0..k {
            // Choose `col_weight` distinct checks for this message bit,
            // preferring checks that are currently lightest loaded to keep
            // row weights roughly balanced (cycle-light heuristic).
            let mut order: Vec<usize> = (0..m).collect();
            order.shuffle(&mut rng);
            order.sort_by_key(|&c| a_rows[c].len());
            for &c in order.iter().take(col_weight) {
                a_rows[c].push(v);
                var_checks[v].push(c);
            }
        }

        Self { variant, n, k, m, a_rows, var_checks }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Systematic encode: `message` (length `k`) becomes a codeword of
    /// length `n`, `[message | parity]`, with `parity[c] = XOR of message[v]
    /// for v in a_rows[c]`.
    pub fn encode(&self, message: &[HardBit]) -> Vec<HardBit> {
        assert_eq!(message.len(), self.k, "message length must equal k");
        let mut codeword = Vec::with_capacity(self.n);
        codeword.extend_from_slice(message);
        for row in &self.a_rows {
            let parity = row.iter().fold(0u8, |acc, &v| acc ^ message[v]);
            codeword.push(parity);
        }
        codeword
    }

    /// Syndrome of a hard-bit codeword: one entry per check, `0` iff every
    /// parity equation is satisfied.
    fn syndrome(&self, bits: &[HardBit]) -> Vec<u8> {
        (0..self.m)
            .map(|c| {
                let mut acc = bits[self.k + c];
                for &v in &self.a_rows[c] {
                    acc ^= bits[v];
                }
                acc
            })
            .collect()
    }

    /// Decode `llrs` (length `n`) via log-domain min-sum belief propagation.
    pub fn decode(&self, llrs: &[Llr], max_iterations: u32) -> Decoded {
        assert_eq!(llrs.len(), self.n, "llr vector length must equal n");
        let channel: Vec<f64> = llrs.iter().map(|&l| l as f64).collect();

        // check_vars[c]: every variable index (message or parity) check c touches.
        let check_vars: Vec<Vec<usize>> = self
            .a_rows
            .iter()
            .enumerate()
            .map(|(c, row)| {
                let mut vars = row.clone();
                vars.push(self.k + c);
                vars
            })
            .collect();

        // var_to_checks[v]: every check variable v participates in.
        let mut var_to_checks: Vec<Vec<usize>> = vec![Vec::new(); self.n];
        var_to_checks[..self.k].clone_from_slice(&self.var_checks[..self.k]);
        for c in 0..self.m {
            var_to_checks[self.k + c].push(c);
        }

        // Messages indexed [check][position in check_vars[check]].
        let mut v_to_c: Vec<Vec<f64>> = check_vars.iter().map(|vars| vec![0.0; vars.len()]).collect();
        for c in 0..self.m {
            for (pos, &v) in check_vars[c].iter().enumerate() {
                v_to_c[c][pos] = channel[v];
            }
        }

        let mut hard = vec![0u8; self.n];
        let mut converged = false;
        let mut iterations_used = 0;

        for iter in 1..=max_iterations {
            iterations_used = iter;

            // Check-node update (min-sum): message to each var is the
            // product of signs times the minimum magnitude of all *other*
            // incoming messages at that check.
            let mut c_to_v: Vec<Vec<f64>> = check_vars.iter().map(|vars| vec![0.0; vars.len()]).collect();
            for c in 0..self.m {
                let msgs = &v_to_c[c];
                for (pos, _) in check_vars[c].iter().enumerate() {
                    let mut sign = 1.0f64;
                    let mut min1 = f64::INFINITY;
                    for (other_pos, &m) in msgs.iter().enumerate() {
                        if other_pos == pos {
                            continue;
                        }
                        sign *= if m < 0.0 { -1.0 } else { 1.0 };
                        let abs = m.abs();
                        if abs < min1 {
                            min1 = abs;
                        }
                    }
                    c_to_v[c][pos] = sign * min1;
                }
            }

            // Variable-node update: total belief, then per-check outgoing
            // messages excluding that check's own contribution.
            let mut total = channel.clone();
            for v in 0..self.n {
                for &c in &var_to_checks[v] {
                    let pos = check_vars[c].iter().position(|&x| x == v).unwrap();
                    total[v] += c_to_v[c][pos];
                }
            }

            for v in 0..self.n {
                hard[v] = if total[v] < 0.0 { 1 } else { 0 };
            }

            if self.syndrome(&hard).iter().all(|&b| b == 0) {
                converged = true;
                break;
            }

            for c in 0..self.m {
                for (pos, &v) in check_vars[c].iter().enumerate() {
                    let own_pos = check_vars[c].iter().position(|&x| x == v).unwrap();
                    v_to_c[c][pos] = total[v] - c_to_v[c][own_pos];
                }
            }
        }

        Decoded {
            message: hard[..self.k].to_vec(),
            codeword: hard,
            converged,
            iterations: iterations_used,
        }
    }
}

/// Result of a belief-propagation decode attempt.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub message: Vec<HardBit>,
    pub codeword: Vec<HardBit>,
    pub converged: bool,
    pub iterations: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_of(k: usize, seed: u8) -> Vec<HardBit> {
        (0..k).map(|i| ((seed as usize + i * 7) % 2) as u8).collect()
    }

    #[test]
    fn encode_produces_zero_syndrome() {
        for &variant in &[Variant::N16, Variant::N32, Variant::N64, Variant::N128] {
            let code = Code::build(variant);
            let msg = message_of(code.k(), 3);
            let codeword = code.encode(&msg);
            assert_eq!(codeword.len(), code.n());
            assert!(code.syndrome(&codeword).iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn construction_is_deterministic_across_instances() {
        let a = Code::build(Variant::N32);
        let b = Code::build(Variant::N32);
        let msg = message_of(a.k(), 5);
        assert_eq!(a.encode(&msg), b.encode(&msg));
    }

    #[test]
    fn decode_noiseless_codeword_recovers_message() {
        for &variant in &[Variant::N16, Variant::N32, Variant::N64, Variant::N128] {
            let code = Code::build(variant);
            let msg = message_of(code.k(), 9);
            let codeword = code.encode(&msg);
            let llrs: Vec<Llr> = codeword.iter().map(|&b| if b == 0 { 100 } else { -100 }).collect();
            let decoded = code.decode(&llrs, 50);
            assert!(decoded.converged);
            assert_eq!(decoded.message, msg);
        }
    }

    #[test]
    fn decode_tolerates_a_few_bit_flips() {
        let code = Code::build(Variant::N64);
        let msg = message_of(code.k(), 11);
        let codeword = code.encode(&msg);
        let mut llrs: Vec<Llr> = codeword.iter().map(|&b| if b == 0 { 100 } else { -100 }).collect();
        // Flip two bits to weak-but-wrong confidence.
        llrs[2] = -llrs[2] / 4;
        llrs[10] = -llrs[10] / 4;
        let decoded = code.decode(&llrs, 50);
        assert!(decoded.converged);
        assert_eq!(decoded.message, msg);
    }

    #[test]
    fn ldpc_n_type_round_trips_through_bits() {
        for &v in &[Variant::N16, Variant::N32, Variant::N64, Variant::N128] {
            assert_eq!(Variant::from_bits(v.to_bits()), Some(v));
        }
    }

    #[test]
    fn variant_capacities_match_spec_table() {
        assert_eq!((Variant::N16.n(), Variant::N16.k()), (16, 8));
        assert_eq!((Variant::N32.n(), Variant::N32.k()), (32, 16));
        assert_eq!((Variant::N64.n(), Variant::N64.k()), (64, 32));
        assert_eq!((Variant::N128.n(), Variant::N128.k()), (128, 64));
    }
}
