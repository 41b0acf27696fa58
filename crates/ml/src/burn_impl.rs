use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;

use crate::embedding::{normalize, EmbeddingProvider};
use crate::tokenize::tokenize;

type Backend = NdArray<f32>;

/// Rolling-hash embedder that L2-normalizes on the Burn ndarray backend.
#[derive(Debug, Clone)]
pub struct BurnHashEmbeddingProvider {
    dims: usize,
}

impl BurnHashEmbeddingProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(32) }
    }
}

impl EmbeddingProvider for BurnHashEmbeddingProvider {
    fn model_name(&self) -> &str {
        "burn-hash-embed-v1"
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0_f32; self.dims];

        for token in tokenize(text) {
            let hash = rolling_hash(token.as_bytes());
            let index = (hash as usize) % self.dims;
            let value = (((hash >> 8) & 0xF) as f32 / 8.0) - 1.0;
            vec[index] += value;
        }

        let device = Default::default();
        let data = TensorData::new(vec.clone(), [self.dims]);
        let tensor = Tensor::<Backend, 1>::from_data(data, &device);
        let norm: f32 = tensor.clone().powf_scalar(2.0).sum().sqrt().into_scalar();
        if norm <= 0.0 {
            return vec;
        }

        match tensor.div_scalar(norm).into_data().to_vec::<f32>() {
            Ok(normalized) => normalized,
            Err(_) => {
                normalize(&mut vec);
                vec
            }
        }
    }
}

fn rolling_hash(bytes: &[u8]) -> u64 {
    let mut hash = 0_u64;
    for byte in bytes {
        hash = hash.wrapping_mul(131).wrapping_add(*byte as u64);
    }
    hash
}
