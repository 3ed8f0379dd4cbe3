use burn::prelude::*;
use color_eyre::{Result, eyre::eyre};
use std::collections::HashMap;

// Stand-in for -inf that survives max/exp arithmetic without producing NaN.
const LOG_ZERO: f32 = -1.0e30;

/// Connectionist temporal classification loss.
///
/// Log-space forward algorithm over the blank-extended label sequence,
/// expressed in tensor ops so gradients flow on an autodiff backend. The
/// blank symbol sits at the last class index.
#[derive(Debug, Clone, Copy)]
pub struct CtcLoss {
    blank: usize,
}

impl CtcLoss {
    pub fn new(blank: usize) -> Self {
        CtcLoss { blank }
    }

    /// Mean negative log-likelihood over the batch.
    ///
    /// `log_probs` is `[batch, steps, classes]` (log-softmax already applied),
    /// `labels` the unpadded target indices per sample, `lengths` the number
    /// of valid timesteps per sample.
    pub fn forward<B: Backend>(
        &self,
        log_probs: Tensor<B, 3>,
        labels: &[Vec<u32>],
        lengths: &[usize],
    ) -> Tensor<B, 1> {
        let [batch, steps, classes] = log_probs.dims();
        let device = log_probs.device();
        let mut losses = Vec::with_capacity(batch);

        for b in 0..batch {
            let sample = log_probs
                .clone()
                .slice([b..b + 1])
                .reshape([steps, classes]);
            let valid_steps = lengths.get(b).copied().unwrap_or(steps).min(steps).max(1);

            // Blank-extended label sequence: - l1 - l2 - ... - ln -
            // A missing label entry degrades to an empty target, like the
            // lengths path.
            let label: &[u32] = labels.get(b).map(Vec::as_slice).unwrap_or_default();
            let extended_len = 2 * label.len() + 1;
            let mut extended = vec![self.blank as i64; extended_len];
            for (i, &l) in label.iter().enumerate() {
                extended[2 * i + 1] = l as i64;
            }

            let indices = Tensor::<B, 1, Int>::from_data(
                TensorData::new(extended.clone(), [extended_len]).convert::<B::IntElem>(),
                &device,
            );

            // A path may skip over a blank only between distinct labels.
            let skip_values: Vec<f32> = (0..extended_len)
                .map(|i| {
                    if i >= 2 && extended[i] != self.blank as i64 && extended[i] != extended[i - 2]
                    {
                        0.0
                    } else {
                        LOG_ZERO
                    }
                })
                .collect();
            let skip_mask = Tensor::<B, 1>::from_data(
                TensorData::new(skip_values, [extended_len]).convert::<B::FloatElem>(),
                &device,
            );

            // alpha_0: paths may start on the leading blank or the first label.
            let start: Vec<f32> = (0..extended_len)
                .map(|i| if i < 2 { 0.0 } else { LOG_ZERO })
                .collect();
            let start_mask = Tensor::<B, 1>::from_data(
                TensorData::new(start, [extended_len]).convert::<B::FloatElem>(),
                &device,
            );

            let row = |t: usize| {
                sample
                    .clone()
                    .slice([t..t + 1])
                    .reshape([classes])
                    .select(0, indices.clone())
            };

            let mut alpha = row(0) + start_mask;

            for t in 1..valid_steps {
                let stay = alpha.clone();
                let step = shift(alpha.clone(), 1, &device);
                let skip = shift(alpha, 2, &device) + skip_mask.clone();

                let stacked = Tensor::stack::<2>(vec![stay, step, skip], 0);
                alpha = log_sum_exp_rows(stacked) + row(t);
            }

            // Valid endings: final blank or final label.
            let tail_start = extended_len.saturating_sub(2);
            let tail = alpha.slice([tail_start..extended_len]);
            losses.push(log_sum_exp(tail).neg());
        }

        Tensor::cat(losses, 0).mean()
    }
}

fn shift<B: Backend>(alpha: Tensor<B, 1>, by: usize, device: &Device<B>) -> Tensor<B, 1> {
    let len = alpha.dims()[0];
    if by >= len {
        return Tensor::full([len], LOG_ZERO, device);
    }
    let pad = Tensor::full([by], LOG_ZERO, device);
    Tensor::cat(vec![pad, alpha.slice([0..len - by])], 0)
}

/// Row-wise log-sum-exp over a `[rows, len]` stack, returning `[len]`.
fn log_sum_exp_rows<B: Backend>(stacked: Tensor<B, 2>) -> Tensor<B, 1> {
    let [_, len] = stacked.dims();
    let max = stacked.clone().max_dim(0);
    let summed = (stacked - max.clone()).exp().sum_dim(0).log() + max;
    summed.reshape([len])
}

fn log_sum_exp<B: Backend>(values: Tensor<B, 1>) -> Tensor<B, 1> {
    let max = values.clone().max();
    (values - max.clone()).exp().sum().log() + max
}

/// Best-path decoding: argmax per timestep, collapse repeats, drop blanks.
pub fn greedy_decode<B: Backend>(probs: Tensor<B, 3>, blank: usize) -> Result<Vec<Vec<u32>>> {
    let [batch, steps, _classes] = probs.dims();
    let best: Vec<i64> = probs
        .argmax(2)
        .reshape([batch, steps])
        .into_data()
        .convert::<i64>()
        .to_vec()
        .map_err(|e| eyre!("failed to read argmax output: {e:?}"))?;

    Ok(best.chunks(steps).map(|path| collapse(path, blank)).collect())
}

fn collapse(path: &[i64], blank: usize) -> Vec<u32> {
    let mut decoded = Vec::new();
    let mut previous = blank as i64;
    for &class in path {
        if class != previous && class != blank as i64 {
            decoded.push(class as u32);
        }
        previous = class;
    }
    decoded
}

/// Prefix beam search over per-timestep probabilities.
///
/// Keeps `beam_width` candidate prefixes per step and returns the
/// `top_paths` best label sequences per sample, best first.
pub fn beam_search_decode<B: Backend>(
    probs: Tensor<B, 3>,
    blank: usize,
    beam_width: usize,
    top_paths: usize,
) -> Result<Vec<Vec<Vec<u32>>>> {
    let [batch, steps, classes] = probs.dims();
    let data: Vec<f32> = probs
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| eyre!("failed to read probabilities: {e:?}"))?;

    Ok((0..batch)
        .map(|b| {
            let frames = &data[b * steps * classes..(b + 1) * steps * classes];
            beam_search_sample(frames, steps, classes, blank, beam_width, top_paths)
        })
        .collect())
}

fn beam_search_sample(
    frames: &[f32],
    steps: usize,
    classes: usize,
    blank: usize,
    beam_width: usize,
    top_paths: usize,
) -> Vec<Vec<u32>> {
    // Prefix -> (log p ending in blank, log p ending in non-blank).
    let mut beams: Vec<(Vec<u32>, (f64, f64))> =
        vec![(Vec::new(), (0.0, f64::NEG_INFINITY))];

    for t in 0..steps {
        let frame = &frames[t * classes..(t + 1) * classes];
        let mut next: HashMap<Vec<u32>, (f64, f64)> = HashMap::new();

        for (prefix, (p_blank, p_label)) in &beams {
            let total = lse(*p_blank, *p_label);

            for (class, &prob) in frame.iter().enumerate() {
                let lp = (prob.max(f32::MIN_POSITIVE) as f64).ln();

                if class == blank {
                    let entry = next.entry(prefix.clone()).or_insert(EMPTY_BEAM);
                    entry.0 = lse(entry.0, total + lp);
                    continue;
                }

                let class = class as u32;
                let mut extended = prefix.clone();
                extended.push(class);

                if prefix.last() == Some(&class) {
                    // Repeat: extending requires an intervening blank.
                    let entry = next.entry(extended).or_insert(EMPTY_BEAM);
                    entry.1 = lse(entry.1, p_blank + lp);

                    let entry = next.entry(prefix.clone()).or_insert(EMPTY_BEAM);
                    entry.1 = lse(entry.1, p_label + lp);
                } else {
                    let entry = next.entry(extended).or_insert(EMPTY_BEAM);
                    entry.1 = lse(entry.1, total + lp);
                }
            }
        }

        let mut ranked: Vec<_> = next.into_iter().collect();
        ranked.sort_by(|a, b| {
            let pa = lse(a.1.0, a.1.1);
            let pb = lse(b.1.0, b.1.1);
            pb.partial_cmp(&pa).unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(beam_width.max(1));
        beams = ranked;
    }

    beams
        .into_iter()
        .take(top_paths.max(1))
        .map(|(prefix, _)| prefix)
        .collect()
}

const EMPTY_BEAM: (f64, f64) = (f64::NEG_INFINITY, f64::NEG_INFINITY);

fn lse(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        b
    } else if b == f64::NEG_INFINITY {
        a
    } else {
        let m = a.max(b);
        m + ((a - m).exp() + (b - m).exp()).ln()
    }
}
