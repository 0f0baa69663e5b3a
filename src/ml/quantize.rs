// ============================================================
// Layer 5 - Int8 Quantized Export
// ============================================================
// Converts the trained float classifier into a compact read-only
// artifact for mobile/embedded runtimes, and runs it back in pure
// Rust to check the export is usable.
//
// Quantization (per matrix row, symmetric):
//   scale = max(|row|) / 127
//   q     = round(w / scale) clamped to [-127, 127]
//   w'    = q * scale
// Biases are small and stay f32.
//
// Container layout (all integers little-endian):
//
//   ┌──────┬────────────┬─────────────┬──────────────────────┐
//   │ SLQ8 │ header_len │ JSON header │ payload              │
//   │ 4 B  │ u32        │ header_len  │ sections, back to    │
//   │      │            │ bytes       │ back, see `sections` │
//   └──────┴────────────┴─────────────┴──────────────────────┘
//
// The header carries the classifier shape, the blake3 digest of
// the float weights it was made from, and one entry per payload
// section (name, dtype, shape, offset, length). Scales and biases
// live in the payload as raw f32 so they round-trip bit-exactly.
//
// Encoding is a pure function of the float weights, so converting
// the same model twice yields byte-identical files.

use serde::{Deserialize, Serialize};

use crate::data::encoder::{OOV_ID, PAD_ID};
use crate::domain::traits::Classifier;
use crate::error::{PipelineError, Result};
use crate::ml::model::{FloatWeights, TextClassifierConfig};

pub const MAGIC: &[u8; 4] = b"SLQ8";
pub const FORMAT_VERSION: u32 = 1;

/// Allowed distance of a probability sum from 1.
pub const PROBABILITY_TOLERANCE: f32 = 1e-3;

// ─── QuantizedMatrix ──────────────────────────────────────────────────────────

/// Row-major int8 matrix with one f32 scale per row.
#[derive(Clone, PartialEq)]
pub struct QuantizedMatrix {
    pub rows:   usize,
    pub cols:   usize,
    pub scales: Vec<f32>,
    pub values: Vec<i8>,
}

impl std::fmt::Debug for QuantizedMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantizedMatrix")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish_non_exhaustive()
    }
}

impl QuantizedMatrix {
    pub fn quantize(weights: &[f32], rows: usize, cols: usize) -> Result<Self> {
        if weights.len() != rows * cols {
            return Err(PipelineError::Serialization(format!(
                "expected {rows}x{cols} weights, got {}",
                weights.len()
            )));
        }

        let mut scales = Vec::with_capacity(rows);
        let mut values = Vec::with_capacity(rows * cols);
        for row in weights.chunks(cols.max(1)).take(rows) {
            let absmax = row.iter().fold(0.0f32, |m, w| m.max(w.abs()));
            let scale = if absmax > 0.0 { absmax / 127.0 } else { 0.0 };
            scales.push(scale);
            values.extend(row.iter().map(|&w| {
                if scale == 0.0 {
                    0
                } else {
                    (w / scale).round().clamp(-127.0, 127.0) as i8
                }
            }));
        }

        Ok(Self { rows, cols, scales, values })
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.values[row * self.cols + col] as f32 * self.scales[row]
    }

    pub fn dequantize(&self) -> Vec<f32> {
        (0..self.rows)
            .flat_map(|r| (0..self.cols).map(move |c| (r, c)))
            .map(|(r, c)| self.get(r, c))
            .collect()
    }

    /// Storage relative to f32: values plus per-row scales.
    pub fn compression_ratio(&self) -> f32 {
        let float_bytes = (self.rows * self.cols * 4) as f32;
        let quant_bytes = (self.values.len() + self.scales.len() * 4).max(1) as f32;
        float_bytes / quant_bytes
    }
}

// ─── Container Header ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Section {
    name:   String,
    dtype:  String,
    shape:  Vec<usize>,
    offset: usize,
    length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Header {
    format_version: u32,
    classifier:     TextClassifierConfig,
    source_digest:  String,
    sections:       Vec<Section>,
}

#[derive(Default)]
struct PayloadWriter {
    sections: Vec<Section>,
    payload:  Vec<u8>,
}

impl PayloadWriter {
    fn push_f32(&mut self, name: &str, shape: Vec<usize>, values: &[f32]) {
        let offset = self.payload.len();
        for v in values {
            self.payload.extend_from_slice(&v.to_le_bytes());
        }
        self.sections.push(Section {
            name: name.to_string(),
            dtype: "f32".to_string(),
            shape,
            offset,
            length: self.payload.len() - offset,
        });
    }

    fn push_i8(&mut self, name: &str, shape: Vec<usize>, values: &[i8]) {
        let offset = self.payload.len();
        self.payload.extend(values.iter().map(|&v| v as u8));
        self.sections.push(Section {
            name: name.to_string(),
            dtype: "i8".to_string(),
            shape,
            offset,
            length: values.len(),
        });
    }

    fn push_matrix(&mut self, name: &str, m: &QuantizedMatrix) {
        self.push_f32(&format!("{name}.scales"), vec![m.rows], &m.scales);
        self.push_i8(&format!("{name}.values"), vec![m.rows, m.cols], &m.values);
    }
}

struct PayloadReader<'a> {
    sections: &'a [Section],
    payload:  &'a [u8],
}

impl<'a> PayloadReader<'a> {
    fn section(&self, name: &str, dtype: &str, expected_len: usize) -> Result<&'a [u8]> {
        let section = self
            .sections
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| malformed(format!("missing section '{name}'")))?;
        let width: usize = if dtype == "f32" { 4 } else { 1 };
        let expected_bytes = expected_len
            .checked_mul(width)
            .ok_or_else(|| malformed(format!("section '{name}' is too large")))?;
        if section.dtype != dtype || section.length != expected_bytes {
            return Err(malformed(format!("section '{name}' has the wrong type or size")));
        }
        section
            .offset
            .checked_add(section.length)
            .and_then(|end| self.payload.get(section.offset..end))
            .ok_or_else(|| malformed(format!("section '{name}' runs past the end of the file")))
    }

    fn f32s(&self, name: &str, len: usize) -> Result<Vec<f32>> {
        let bytes = self.section(name, "f32", len)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    fn matrix(&self, name: &str, rows: usize, cols: usize) -> Result<QuantizedMatrix> {
        let len = rows
            .checked_mul(cols)
            .ok_or_else(|| malformed(format!("matrix '{name}' is too large")))?;
        let scales = self.f32s(&format!("{name}.scales"), rows)?;
        let values = self
            .section(&format!("{name}.values"), "i8", len)?
            .iter()
            .map(|&b| b as i8)
            .collect();
        Ok(QuantizedMatrix { rows, cols, scales, values })
    }
}

fn malformed(message: String) -> PipelineError {
    PipelineError::Serialization(format!("quantized model: {message}"))
}

/// `logits` reads the OOV row for out-of-range ids, so the embedding
/// needs at least the PAD and OOV rows.
fn check_dimensions(c: &TextClassifierConfig) -> Result<()> {
    if c.vocab_size <= OOV_ID as usize {
        return Err(malformed(format!("vocabulary of {} entries has no OOV row", c.vocab_size)));
    }
    if c.num_classes == 0 || c.max_len == 0 || c.embed_dim == 0 || c.hidden_dim == 0 {
        return Err(malformed("classifier shape has a zero dimension".to_string()));
    }
    Ok(())
}

// ─── QuantizedModel ───────────────────────────────────────────────────────────

/// The int8 export plus a pure-Rust forward pass over it.
#[derive(Debug, Clone)]
pub struct QuantizedModel {
    pub config:        TextClassifierConfig,
    pub source_digest: String,
    pub embedding:     QuantizedMatrix,
    pub hidden_weight: QuantizedMatrix,
    pub hidden_bias:   Vec<f32>,
    pub output_weight: QuantizedMatrix,
    pub output_bias:   Vec<f32>,
}

impl QuantizedModel {
    /// Quantize `weights`, shaped by `config`.
    pub fn from_weights(
        config:        &TextClassifierConfig,
        weights:       &FloatWeights,
        source_digest: impl Into<String>,
    ) -> Result<Self> {
        let c = config;
        check_dimensions(c)?;
        if weights.hidden_bias.len() != c.hidden_dim || weights.output_bias.len() != c.num_classes {
            return Err(PipelineError::Serialization(
                "bias lengths do not match the classifier shape".to_string(),
            ));
        }
        Ok(Self {
            config:        c.clone(),
            source_digest: source_digest.into(),
            embedding:     QuantizedMatrix::quantize(&weights.embedding, c.vocab_size, c.embed_dim)?,
            hidden_weight: QuantizedMatrix::quantize(&weights.hidden_weight, c.embed_dim, c.hidden_dim)?,
            hidden_bias:   weights.hidden_bias.clone(),
            output_weight: QuantizedMatrix::quantize(&weights.output_weight, c.hidden_dim, c.num_classes)?,
            output_bias:   weights.output_bias.clone(),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = PayloadWriter::default();
        writer.push_matrix("embedding", &self.embedding);
        writer.push_matrix("hidden_weight", &self.hidden_weight);
        writer.push_f32("hidden_bias", vec![self.hidden_bias.len()], &self.hidden_bias);
        writer.push_matrix("output_weight", &self.output_weight);
        writer.push_f32("output_bias", vec![self.output_bias.len()], &self.output_bias);

        let header = Header {
            format_version: FORMAT_VERSION,
            classifier:     self.config.clone(),
            source_digest:  self.source_digest.clone(),
            sections:       writer.sections,
        };
        let header = serde_json::to_vec(&header).map_err(|e| malformed(e.to_string()))?;
        let header_len = u32::try_from(header.len())
            .map_err(|_| malformed("header larger than 4 GiB".to_string()))?;

        let mut out = Vec::with_capacity(8 + header.len() + writer.payload.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&header_len.to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&writer.payload);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 || &bytes[..4] != MAGIC {
            return Err(malformed("not an SLQ8 file".to_string()));
        }
        let header_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let header_end = 8usize
            .checked_add(header_len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| malformed("truncated header".to_string()))?;

        let header: Header =
            serde_json::from_slice(&bytes[8..header_end]).map_err(|e| malformed(e.to_string()))?;
        if header.format_version != FORMAT_VERSION {
            return Err(malformed(format!(
                "unsupported format version {}",
                header.format_version
            )));
        }

        let c = &header.classifier;
        check_dimensions(c)?;
        let reader = PayloadReader { sections: &header.sections, payload: &bytes[header_end..] };
        Ok(Self {
            embedding:     reader.matrix("embedding", c.vocab_size, c.embed_dim)?,
            hidden_weight: reader.matrix("hidden_weight", c.embed_dim, c.hidden_dim)?,
            hidden_bias:   reader.f32s("hidden_bias", c.hidden_dim)?,
            output_weight: reader.matrix("output_weight", c.hidden_dim, c.num_classes)?,
            output_bias:   reader.f32s("output_bias", c.num_classes)?,
            config:        header.classifier.clone(),
            source_digest: header.source_digest,
        })
    }

    /// Dequantized forward pass for one padded sequence.
    fn logits(&self, token_ids: &[u32]) -> Vec<f32> {
        let c = &self.config;

        let mut pooled = vec![0.0f32; c.embed_dim];
        let mut count = 0usize;
        for &id in token_ids {
            if id == PAD_ID {
                continue;
            }
            let row = if (id as usize) < c.vocab_size { id as usize } else { OOV_ID as usize };
            for (d, p) in pooled.iter_mut().enumerate() {
                *p += self.embedding.get(row, d);
            }
            count += 1;
        }
        if count > 0 {
            pooled.iter_mut().for_each(|p| *p /= count as f32);
        }

        let hidden: Vec<f32> = (0..c.hidden_dim)
            .map(|j| {
                let z = pooled
                    .iter()
                    .enumerate()
                    .fold(self.hidden_bias[j], |acc, (i, x)| acc + x * self.hidden_weight.get(i, j));
                z.max(0.0)
            })
            .collect();

        (0..c.num_classes)
            .map(|k| {
                hidden
                    .iter()
                    .enumerate()
                    .fold(self.output_bias[k], |acc, (j, h)| acc + h * self.output_weight.get(j, k))
            })
            .collect()
    }

    /// Run `probes` and check every output is a proper distribution.
    pub fn verify(&self, probes: &[Vec<u32>]) -> Result<()> {
        for (i, probe) in probes.iter().enumerate() {
            let probs = self.predict_proba(probe)?;
            if probs.len() != self.config.num_classes {
                return Err(PipelineError::ConversionVerification(format!(
                    "probe {i}: expected {} classes, got {}",
                    self.config.num_classes,
                    probs.len()
                )));
            }
            if probs.iter().any(|p| !p.is_finite()) {
                return Err(PipelineError::ConversionVerification(format!(
                    "probe {i}: non-finite probability"
                )));
            }
            let sum: f32 = probs.iter().sum();
            if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
                return Err(PipelineError::ConversionVerification(format!(
                    "probe {i}: probabilities sum to {sum}"
                )));
            }
        }
        tracing::debug!("Verified quantized model on {} probes", probes.len());
        Ok(())
    }
}

impl Classifier for QuantizedModel {
    fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    fn max_len(&self) -> usize {
        self.config.max_len
    }

    fn predict_proba(&self, token_ids: &[u32]) -> Result<Vec<f32>> {
        if token_ids.len() != self.config.max_len {
            return Err(PipelineError::InvalidConfig(format!(
                "expected {} token ids, got {}",
                self.config.max_len,
                token_ids.len()
            )));
        }
        Ok(softmax(&self.logits(token_ids)))
    }
}

/// Numerically stable softmax. A non-finite logit yields non-finite output.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&z| (z - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Deterministic probe inputs of length `max_len`:
/// all padding, all OOV, and a run over the first vocabulary words.
pub fn probe_inputs(config: &TextClassifierConfig) -> Vec<Vec<u32>> {
    let len = config.max_len.max(1);
    let all_pad = vec![PAD_ID; len];
    let all_oov = vec![OOV_ID; len];
    let first_words: Vec<u32> = (0..len)
        .map(|i| {
            let id = 2 + i as u32;
            if (id as usize) < config.vocab_size { id } else { PAD_ID }
        })
        .collect();
    vec![all_pad, all_oov, first_words]
}
