use std::hash::Hasher;

use twox_hash::XxHash64;

use mdrag_core::error::Result;
use mdrag_core::traits::Embedder;

/// Signed feature hashing of lowercase word tokens, L2-normalized.
///
/// Texts sharing words land close together; unrelated texts are near
/// orthogonal. Deterministic across runs and platforms.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(token.as_bytes());
        let h = hasher.finish();
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        ((h as usize) % self.dim, sign)
    }
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        let mut tokens = lower.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).peekable();
        let mut v = vec![0f32; self.dim];
        if tokens.peek().is_none() {
            let (idx, sign) = self.bucket(&lower);
            v[idx] = sign;
            return Ok(v);
        }
        for token in tokens {
            let (idx, sign) = self.bucket(token);
            v[idx] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        Ok(v)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_text(t)).collect()
    }
}
