//! Candle-backed models: the client-part encoder and the offline fallback
//! classifier.
//!
//! The client part is the first half of a split network: it embeds the token
//! batch and emits the intermediate ("smashed") feature tensor that the
//! remote half completes. The offline model is a small standalone classifier
//! bundled with the app for the degraded no-connectivity path.

use candle_core::{DType, Device, Tensor};
use candle_nn::{embedding, layer_norm, linear, Embedding, LayerNorm, Linear, Module, VarBuilder};
use phishguard_core::{Error, Result, SmashedVector, TokenBatch, HIDDEN_DIM, SEQ_LEN};
use std::path::Path;

/// Vocabulary the client-part embedding table was exported with.
pub const CLIENT_VOCAB_SIZE: usize = 32128;

/// Hashed vocabulary of the offline word-hash tokenizer.
pub const OFFLINE_VOCAB_SIZE: usize = 1 << 15;

/// Embedding width of the offline fallback model.
pub const OFFLINE_HIDDEN: usize = 128;

fn load_err(e: candle_core::Error) -> Error {
    Error::model_load(e.to_string())
}

fn infer_err(e: candle_core::Error) -> Error {
    Error::inference(e.to_string())
}

/// Build a `[1, SEQ_LEN]` index tensor from clamped token ids.
fn ids_tensor(ids: &[i64], device: &Device) -> Result<Tensor> {
    // Ids are already clamped into [0, vocab); the cast cannot wrap.
    let ids: Vec<u32> = ids.iter().map(|&id| id as u32).collect();
    Tensor::new(ids.as_slice(), device)
        .and_then(|t| t.unsqueeze(0))
        .map_err(infer_err)
}

/// Build a `[1, SEQ_LEN, 1]` float mask tensor for broadcasting over the
/// hidden dimension.
fn mask_tensor(mask: &[i64], device: &Device) -> Result<Tensor> {
    let mask: Vec<f32> = mask.iter().map(|&m| m as f32).collect();
    Tensor::new(mask.as_slice(), device)
        .and_then(|t| t.reshape((1, SEQ_LEN, 1)))
        .map_err(infer_err)
}

/// The locally-executed first half of the split phishing classifier.
pub struct ClientModel {
    embeddings: Embedding,
    norm: LayerNorm,
    proj: Linear,
    device: Device,
}

impl ClientModel {
    /// Load weights from a downloaded PyTorch artifact.
    pub fn load(path: &Path, device: &Device) -> Result<Self> {
        let vb = VarBuilder::from_pth(path, DType::F32, device).map_err(load_err)?;
        Self::new(vb, device)
    }

    /// Build the model from a [`VarBuilder`]. Used by [`Self::load`] and by
    /// tests that run with zeroed weights.
    pub fn new(vb: VarBuilder, device: &Device) -> Result<Self> {
        let embeddings =
            embedding(CLIENT_VOCAB_SIZE, HIDDEN_DIM, vb.pp("embeddings")).map_err(load_err)?;
        let norm = layer_norm(HIDDEN_DIM, 1e-5, vb.pp("norm")).map_err(load_err)?;
        let proj = linear(HIDDEN_DIM, HIDDEN_DIM, vb.pp("proj")).map_err(load_err)?;
        Ok(Self {
            embeddings,
            norm,
            proj,
            device: device.clone(),
        })
    }

    /// Run the forward pass, producing the smashed feature vector.
    ///
    /// Errors here indicate a tensor-shape or runtime fault and are not
    /// retried; they propagate to the pipeline boundary unchanged.
    pub fn forward(&self, batch: &TokenBatch) -> Result<SmashedVector> {
        let input_ids = ids_tensor(&batch.input_ids, &self.device)?;
        let mask = mask_tensor(&batch.attention_mask, &self.device)?;

        let hidden = self.embeddings.forward(&input_ids).map_err(infer_err)?;
        let hidden = self.norm.forward(&hidden).map_err(infer_err)?;
        let hidden = self.proj.forward(&hidden).map_err(infer_err)?;
        // Zero out padding positions so the remote half never sees them.
        let hidden = hidden.broadcast_mul(&mask).map_err(infer_err)?;

        let flat = hidden
            .flatten_all()
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(infer_err)?;
        Ok(SmashedVector::new(flat))
    }
}

/// Bundled fallback classifier for the offline fork: embedding bag over
/// hashed word ids, masked mean pool, two-class head.
pub struct OfflineModel {
    embeddings: Embedding,
    classifier: Linear,
    device: Device,
}

impl OfflineModel {
    pub fn load(path: &Path, device: &Device) -> Result<Self> {
        let vb = VarBuilder::from_pth(path, DType::F32, device).map_err(load_err)?;
        Self::new(vb, device)
    }

    pub fn new(vb: VarBuilder, device: &Device) -> Result<Self> {
        let embeddings =
            embedding(OFFLINE_VOCAB_SIZE, OFFLINE_HIDDEN, vb.pp("embeddings")).map_err(load_err)?;
        let classifier = linear(OFFLINE_HIDDEN, 2, vb.pp("classifier")).map_err(load_err)?;
        Ok(Self {
            embeddings,
            classifier,
            device: device.clone(),
        })
    }

    /// Returns true when the batch is classified as phishing (argmax == 1).
    pub fn forward(&self, batch: &TokenBatch) -> Result<bool> {
        let input_ids = ids_tensor(&batch.input_ids, &self.device)?;
        let mask = mask_tensor(&batch.attention_mask, &self.device)?;

        let embedded = self.embeddings.forward(&input_ids).map_err(infer_err)?;
        let masked = embedded.broadcast_mul(&mask).map_err(infer_err)?;

        // Masked mean pool over the sequence dimension.
        let summed = masked.sum(1).map_err(infer_err)?;
        let attended = mask
            .sum_all()
            .and_then(|t| t.to_scalar::<f32>())
            .map_err(infer_err)?
            .max(1.0);
        let pooled = (summed / attended as f64).map_err(infer_err)?;

        let logits = self.classifier.forward(&pooled).map_err(infer_err)?;
        let scores = logits
            .flatten_all()
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(infer_err)?;
        if scores.len() != 2 {
            return Err(Error::inference(format!(
                "offline model produced {} logits, expected 2",
                scores.len()
            )));
        }
        Ok(scores[1] > scores[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed_vb(device: &Device) -> VarBuilder<'static> {
        VarBuilder::zeros(DType::F32, device)
    }

    #[test]
    fn test_client_forward_smashed_shape() {
        let device = Device::Cpu;
        let model = ClientModel::new(zeroed_vb(&device), &device).unwrap();
        let batch = TokenBatch::from_remote(&[5, 9, 12], &[1, 1, 1], 100);

        let smashed = model.forward(&batch).unwrap();
        assert_eq!(smashed.len(), SEQ_LEN * HIDDEN_DIM);
    }

    #[test]
    fn test_offline_forward_is_deterministic() {
        let device = Device::Cpu;
        let model = OfflineModel::new(zeroed_vb(&device), &device).unwrap();
        let batch = TokenBatch::from_remote(&[1, 2, 3], &[1, 1, 1], 1000);

        // Zeroed weights give equal logits; argmax must not flag phishing.
        assert!(!model.forward(&batch).unwrap());
        assert!(!model.forward(&batch).unwrap());
    }
}
