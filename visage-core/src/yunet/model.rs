use std::path::Path;

use anyhow::{Context, Result, anyhow, bail, ensure};
use log::{debug, warn};
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, Tensor, TypedFact, TypedOp, tvec,
};

type Runnable = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

const STRIDES: [usize; 3] = [8, 16, 32];
/// cls, obj, bbox, kps per stride.
const HEADS: usize = 4;
/// x, y, w, h, five landmark pairs, score.
pub(crate) const ROW_LEN: usize = 15;

/// The YuNet ONNX graph, ready to run at a fixed input size.
#[derive(Debug)]
pub struct YuNetModel {
    runnable: Runnable,
    input: (u32, u32),
}

impl YuNetModel {
    /// Load the graph, preferring the optimized plan and falling back to the decluttered one.
    pub fn load<P: AsRef<Path>>(path: P, input: (u32, u32)) -> Result<Self> {
        let path = path.as_ref();
        ensure!(path.exists(), "model file not found: {}", path.display());

        let runnable = match build_plan(path, true) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(
                    "optimized load of {} failed ({err:#}); using the decluttered graph",
                    path.display()
                );
                build_plan(path, false).context("decluttered YuNet graph failed as well")?
            }
        };
        debug!("YuNet model {} ready ({}x{})", path.display(), input.0, input.1);
        Ok(Self { runnable, input })
    }

    pub fn input_size(&self) -> (u32, u32) {
        self.input
    }

    /// Run the network and return an `[N, 15]` tensor of candidate rows in input pixels.
    pub fn run(&self, input: Tensor) -> Result<Tensor> {
        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .map_err(|e| anyhow!("YuNet execution failed: {e}"))?;
        let mut tensors: Vec<Tensor> = outputs.into_iter().map(|v| v.into_tensor()).collect();

        match tensors.len() {
            1 => tensors.pop().context("YuNet produced no outputs"),
            n if n == STRIDES.len() * HEADS => decode_heads(&tensors, self.input),
            n => bail!(
                "unexpected number of YuNet outputs: expected 1 or {}, got {n}",
                STRIDES.len() * HEADS
            ),
        }
    }
}

fn build_plan(path: &Path, optimized: bool) -> Result<Runnable> {
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?;
    let typed = if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow!("unable to optimize YuNet graph: {e}"))?
    } else {
        model
            .into_typed()
            .map_err(|e| anyhow!("unable to type-check YuNet graph: {e}"))?
            .into_decluttered()
            .map_err(|e| anyhow!("unable to declutter YuNet graph: {e}"))?
    };
    typed
        .into_runnable()
        .map_err(|e| anyhow!("unable to make YuNet graph runnable: {e}"))
}

fn head<'a>(outputs: &'a [Tensor], index: usize, name: &str, expected: usize) -> Result<&'a [f32]> {
    let slice = outputs[index]
        .as_slice::<f32>()
        .map_err(|e| anyhow!("{name} output is not f32: {e}"))?;
    ensure!(
        slice.len() == expected,
        "{name} length mismatch: expected {expected}, got {}",
        slice.len()
    );
    Ok(slice)
}

/// Fuse the twelve per-stride heads into one row per anchor cell.
pub(crate) fn decode_heads(outputs: &[Tensor], input: (u32, u32)) -> Result<Tensor> {
    ensure!(
        outputs.len() == STRIDES.len() * HEADS,
        "YuNet decode expects {} tensors, got {}",
        STRIDES.len() * HEADS,
        outputs.len()
    );
    let pad_w = (input.0 as usize).div_ceil(32) * 32;
    let pad_h = (input.1 as usize).div_ceil(32) * 32;

    let mut rows = Vec::new();
    for (si, &stride) in STRIDES.iter().enumerate() {
        let (cols, lines) = (pad_w / stride, pad_h / stride);
        let cells = cols * lines;
        let cls = head(outputs, si, "cls", cells)?;
        let obj = head(outputs, si + STRIDES.len(), "obj", cells)?;
        let bbox = head(outputs, si + STRIDES.len() * 2, "bbox", cells * 4)?;
        let kps = head(outputs, si + STRIDES.len() * 3, "kps", cells * 10)?;
        let s = stride as f32;

        for line in 0..lines {
            for col in 0..cols {
                let idx = line * cols + col;
                let score = (cls[idx].clamp(0.0, 1.0) * obj[idx].clamp(0.0, 1.0)).sqrt();
                let b = &bbox[idx * 4..idx * 4 + 4];
                let cx = (col as f32 + b[0]) * s;
                let cy = (line as f32 + b[1]) * s;
                let w = b[2].exp() * s;
                let h = b[3].exp() * s;
                rows.extend_from_slice(&[cx - 0.5 * w, cy - 0.5 * h, w, h]);
                for lm in 0..5 {
                    rows.push((kps[idx * 10 + lm * 2] + col as f32) * s);
                    rows.push((kps[idx * 10 + lm * 2 + 1] + line as f32) * s);
                }
                rows.push(if score.is_finite() { score } else { 0.0 });
            }
        }
    }

    let count = rows.len() / ROW_LEN;
    Tensor::from_shape(&[count, ROW_LEN], &rows)
        .map_err(|e| anyhow!("failed to build fused YuNet tensor: {e}"))
}
