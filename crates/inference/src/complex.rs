//! Elementwise complex-vector helpers.

use core_types::{ComplexEmbedding, Vector};

/// Unit-modulus rotation `cos(theta) + i*sin(theta)`, one factor per dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Rotation {
    cos: Vector,
    sin: Vector,
}

impl Rotation {
    pub fn from_angles(theta: &[f64]) -> Self {
        Self {
            cos: theta.iter().map(|t| t.cos()).collect(),
            sin: theta.iter().map(|t| t.sin()).collect(),
        }
    }

    pub fn dim(&self) -> usize {
        self.cos.len()
    }

    /// Complex product `(real + i*imag) * r`, returned as `out_real ++ out_imag`.
    ///
    /// The embedding must have the rotation's dimension.
    pub fn apply(&self, emb: &ComplexEmbedding) -> Vector {
        debug_assert_eq!(emb.dim(), self.dim());
        let d = self.dim();
        let mut out = vec![0.0; 2 * d];
        let (out_real, out_imag) = out.split_at_mut(d);
        for (i, (re, im)) in emb.real().iter().zip(emb.imag()).enumerate() {
            let (c, s) = (self.cos[i], self.sin[i]);
            out_real[i] = re * c - im * s;
            out_imag[i] = re * s + im * c;
        }
        out
    }
}

/// Per-dimension modulus `|real + i*imag|`.
pub fn modulus(real: &[f64], imag: &[f64]) -> Vector {
    real.iter().zip(imag).map(|(r, i)| r.hypot(*i)).collect()
}
