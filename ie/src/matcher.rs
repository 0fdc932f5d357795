//! Normalized cross-correlation template matching.
//!
//! Score at an alignment is the zero-mean normalized cross-correlation of the
//! template against the frame window (OpenCV's `TM_CCOEFF_NORMED`). For color
//! frames the channel terms are summed before normalizing, so a single score
//! covers all three channels.
//!
//! Window sums come from summed-area tables in exact integer arithmetic. The
//! correlation numerator is computed directly for small workloads and with a
//! flattened 1-D FFT for large ones, the latter based on J.P. Lewis,
//! "Fast Normalized Cross-Correlation". Spectral scores are approximate, so the
//! best candidates are re-scored exactly before the winner is chosen: a
//! byte-identical crop scores exactly 1.0 on either path.

use rayon::prelude::*;
use rustfft::{FftPlanner, num_complex::Complex};

use crate::{Error, Frame, Result};

/// Above this many multiply-adds the spectral path is used.
const DIRECT_LIMIT: u64 = 1 << 24;

/// Spectral candidates within this distance of the best approximation are re-scored.
const REFINE_EPSILON: f64 = 1e-6;
const REFINE_MAX: usize = 256;

/// Best alignment of a template inside a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    /// Top-left corner of the template, in frame pixels.
    pub x: u32,
    pub y: u32,
    /// Normalized correlation, 1.0 for a perfect match. Not clamped.
    pub score: f64,
}

/// Score for every valid alignment, row-major.
#[derive(Debug, Clone)]
pub struct ScoreMap {
    width: u32,
    height: u32,
    scores: Vec<f64>,
}

impl ScoreMap {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> f64 {
        self.scores[(y * self.width + x) as usize]
    }

    /// Highest score, first in raster order on ties.
    pub fn best(&self) -> Alignment {
        let mut best = 0usize;
        for (i, &s) in self.scores.iter().enumerate() {
            if s > self.scores[best] {
                best = i;
            }
        }
        Alignment {
            x: best as u32 % self.width,
            y: best as u32 / self.width,
            score: self.scores[best],
        }
    }

    /// Number of alignments scoring at least `threshold`.
    pub fn count_at_least(&self, threshold: f64) -> usize {
        self.scores.iter().filter(|&&s| s >= threshold).count()
    }

    /// Non-overlapping alignments scoring at least `threshold`, best first.
    ///
    /// Accepting an alignment suppresses every other alignment whose
    /// `tw` x `th` window would overlap it.
    pub fn occurrences(&self, threshold: f64, tw: u32, th: u32) -> Vec<Alignment> {
        let mut candidates: Vec<usize> = (0..self.scores.len()).filter(|&i| self.scores[i] >= threshold).collect();
        candidates.sort_by(|&a, &b| self.scores[b].total_cmp(&self.scores[a]).then(a.cmp(&b)));

        let (w, h) = (self.width as i64, self.height as i64);
        let mut blocked = vec![false; self.scores.len()];
        let mut found = Vec::new();
        for i in candidates {
            if blocked[i] {
                continue;
            }
            let x = (i as i64) % w;
            let y = (i as i64) / w;
            found.push(Alignment {
                x: x as u32,
                y: y as u32,
                score: self.scores[i],
            });

            let (x0, x1) = ((x - tw as i64 + 1).max(0), (x + tw as i64 - 1).min(w - 1));
            let (y0, y1) = ((y - th as i64 + 1).max(0), (y + th as i64 - 1).min(h - 1));
            for by in y0..=y1 {
                for bx in x0..=x1 {
                    blocked[(by * w + bx) as usize] = true;
                }
            }
        }
        found
    }
}

/// Find the best alignment of `template` inside `frame`.
///
/// Both buffers must share a color mode and the frame must be at least as
/// large as the template in both axes.
pub fn match_template(frame: &Frame, template: &Frame) -> Result<Alignment> {
    let ctx = Context::new(frame, template)?;
    if ctx.use_direct() {
        return Ok(ctx.direct().best());
    }

    let map = ctx.spectral();
    Ok(ctx.refine(&map))
}

/// Score every alignment of `template` inside `frame`.
pub fn score_map(frame: &Frame, template: &Frame) -> Result<ScoreMap> {
    let ctx = Context::new(frame, template)?;
    if ctx.use_direct() { Ok(ctx.direct()) } else { Ok(ctx.spectral()) }
}

// ----------

struct Context<'a> {
    frame: &'a [u8],
    template: &'a [u8],
    fw: usize,
    fh: usize,
    tw: usize,
    th: usize,
    channels: usize,
    stats: WindowStats,
    /// Per-channel template sums.
    t_sums: Vec<i128>,
    /// `n * sum(T^2) - sum_c(sum(T_c)^2)`, i.e. `n^2` times the template variance.
    t_var: i128,
}

impl<'a> Context<'a> {
    fn new(frame: &'a Frame, template: &'a Frame) -> Result<Self> {
        if frame.mode() != template.mode() {
            return Err(Error::ColorModeMismatch {
                frame: frame.mode(),
                template: template.mode(),
            });
        }
        let (fw, fh) = frame.dimensions();
        let (tw, th) = template.dimensions();
        if tw > fw || th > fh || tw == 0 || th == 0 {
            return Err(Error::RegionTooSmall {
                target: "template".to_string(),
                region_w: fw,
                region_h: fh,
                target_w: tw,
                target_h: th,
            });
        }

        let channels = frame.mode().channels();
        let template_px = template.samples();
        let n = (tw * th) as i128;

        let mut t_sums = vec![0i128; channels];
        let mut t_sq = 0i128;
        for px in template_px.chunks_exact(channels) {
            for (c, &v) in px.iter().enumerate() {
                t_sums[c] += v as i128;
                t_sq += (v as i128) * (v as i128);
            }
        }
        let t_var = n * t_sq - t_sums.iter().map(|s| s * s).sum::<i128>();

        Ok(Self {
            frame: frame.samples(),
            template: template_px,
            fw: fw as usize,
            fh: fh as usize,
            tw: tw as usize,
            th: th as usize,
            channels,
            stats: WindowStats::new(frame.samples(), fw as usize, fh as usize, channels),
            t_sums,
            t_var,
        })
    }

    #[inline]
    fn out_dims(&self) -> (usize, usize) {
        (self.fw - self.tw + 1, self.fh - self.th + 1)
    }

    #[inline]
    fn n(&self) -> i128 {
        (self.tw * self.th) as i128
    }

    fn use_direct(&self) -> bool {
        let (ow, oh) = self.out_dims();
        let work = (ow * oh) as u64 * (self.tw * self.th * self.channels) as u64;
        work <= DIRECT_LIMIT || self.t_var == 0
    }

    /// `n^2` times the window variance at `(x, y)`, plus per-channel window sums.
    fn window(&self, x: usize, y: usize, sums: &mut [i128]) -> i128 {
        let mut sq_of_sums = 0i128;
        for (c, s) in sums.iter_mut().enumerate() {
            *s = self.stats.sum(c, x, y, self.tw, self.th) as i128;
            sq_of_sums += *s * *s;
        }
        self.n() * self.stats.sum_sq(x, y, self.tw, self.th) as i128 - sq_of_sums
    }

    /// Exact `sum(I * T)` over the window at `(x, y)`, all channels.
    fn dot(&self, x: usize, y: usize) -> i128 {
        let row_len = self.tw * self.channels;
        let mut acc = 0u64;
        for j in 0..self.th {
            let f_start = ((y + j) * self.fw + x) * self.channels;
            let frow = &self.frame[f_start..f_start + row_len];
            let trow = &self.template[j * row_len..(j + 1) * row_len];
            acc += frow
                .iter()
                .zip(trow)
                .map(|(&a, &b)| a as u64 * b as u64)
                .sum::<u64>();
        }
        acc as i128
    }

    fn score_with(&self, numerator: ScoreNumerator, window_var: i128, window_sums: &[i128]) -> f64 {
        if self.t_var == 0 || window_var == 0 {
            // A flat window or template has no correlation; two flat patches
            // of the same color are the only perfect pairing.
            let same = self.t_var == 0 && window_var == 0 && window_sums == self.t_sums.as_slice();
            return if same { 1.0 } else { 0.0 };
        }
        let num = match numerator {
            ScoreNumerator::Exact(dot) => {
                let cross: i128 = window_sums.iter().zip(&self.t_sums).map(|(a, b)| a * b).sum();
                (self.n() * dot - cross) as f64
            }
            ScoreNumerator::Approx(v) => v,
        };
        num / ((window_var as f64) * (self.t_var as f64)).sqrt()
    }

    fn exact_score(&self, x: usize, y: usize, sums: &mut [i128]) -> f64 {
        let var = self.window(x, y, sums);
        let dot = if self.t_var == 0 || var == 0 { 0 } else { self.dot(x, y) };
        self.score_with(ScoreNumerator::Exact(dot), var, sums)
    }

    fn direct(&self) -> ScoreMap {
        let (ow, oh) = self.out_dims();
        let mut scores = vec![0f64; ow * oh];
        scores.par_chunks_mut(ow).enumerate().for_each(|(y, row)| {
            let mut sums = vec![0i128; self.channels];
            for (x, out) in row.iter_mut().enumerate() {
                *out = self.exact_score(x, y, &mut sums);
            }
        });
        ScoreMap {
            width: ow as u32,
            height: oh as u32,
            scores,
        }
    }

    /// Compute `n * sum((I - mean_I) * (T - mean_T))` for every alignment via FFT.
    ///
    /// Planes are flattened with the frame width as stride. Since the template
    /// never extends past the right edge for valid alignments, the circular
    /// 1-D correlation of length `fw * fh` equals the 2-D one there.
    fn spectral_numerators(&self) -> Vec<f64> {
        let len = self.fw * self.fh;
        let area = (self.fw * self.fh) as f64;
        let n = (self.tw * self.th) as f64;

        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);

        let mut acc = vec![Complex::new(0.0, 0.0); len];
        let mut img = vec![Complex::new(0.0, 0.0); len];
        let mut tpl = vec![Complex::new(0.0, 0.0); len];

        for c in 0..self.channels {
            let f_mean = self.stats.sum(c, 0, 0, self.fw, self.fh) as f64 / area;
            for (dst, px) in img.iter_mut().zip(self.frame.chunks_exact(self.channels)) {
                *dst = Complex::new(px[c] as f64 - f_mean, 0.0);
            }

            let t_mean = self.t_sums[c] as f64 / n;
            tpl.iter_mut().for_each(|v| *v = Complex::new(0.0, 0.0));
            for j in 0..self.th {
                for i in 0..self.tw {
                    let v = self.template[(j * self.tw + i) * self.channels + c] as f64;
                    tpl[j * self.fw + i] = Complex::new(v - t_mean, 0.0);
                }
            }

            forward.process(&mut img);
            forward.process(&mut tpl);
            for ((a, f), t) in acc.iter_mut().zip(&img).zip(&tpl) {
                *a += f * t.conj();
            }
        }

        inverse.process(&mut acc);
        acc.iter().map(|v| v.re / len as f64 * n).collect()
    }

    fn spectral(&self) -> ScoreMap {
        let (ow, oh) = self.out_dims();
        let numerators = self.spectral_numerators();
        let mut scores = vec![0f64; ow * oh];
        scores.par_chunks_mut(ow).enumerate().for_each(|(y, row)| {
            let mut sums = vec![0i128; self.channels];
            for (x, out) in row.iter_mut().enumerate() {
                let var = self.window(x, y, &mut sums);
                let num = numerators[y * self.fw + x];
                *out = self.score_with(ScoreNumerator::Approx(num), var, &sums);
            }
        });
        ScoreMap {
            width: ow as u32,
            height: oh as u32,
            scores,
        }
    }

    /// Re-score the top spectral candidates exactly and pick the winner.
    fn refine(&self, map: &ScoreMap) -> Alignment {
        let approx_best = map.best().score;
        let mut sums = vec![0i128; self.channels];
        let mut best: Option<Alignment> = None;
        let candidates = map
            .scores
            .iter()
            .enumerate()
            .filter(|(_, s)| **s >= approx_best - REFINE_EPSILON)
            .take(REFINE_MAX);

        for (i, _) in candidates {
            let x = i % map.width as usize;
            let y = i / map.width as usize;
            let score = self.exact_score(x, y, &mut sums);
            if best.is_none_or(|b| score > b.score) {
                best = Some(Alignment {
                    x: x as u32,
                    y: y as u32,
                    score,
                });
            }
        }
        best.unwrap_or_else(|| map.best())
    }
}

#[derive(Clone, Copy)]
enum ScoreNumerator {
    Exact(i128),
    Approx(f64),
}

/// Summed-area tables over a frame: one per channel plus one of squares
/// summed across channels.
struct WindowStats {
    stride: usize,
    sums: Vec<Vec<u64>>,
    sum_sq: Vec<u64>,
}

impl WindowStats {
    fn new(samples: &[u8], width: usize, height: usize, channels: usize) -> Self {
        let stride = width + 1;
        let mut sums = vec![vec![0u64; stride * (height + 1)]; channels];
        let mut sum_sq = vec![0u64; stride * (height + 1)];

        for y in 0..height {
            let mut row_sums = vec![0u64; channels];
            let mut row_sq = 0u64;
            for x in 0..width {
                let px = &samples[(y * width + x) * channels..(y * width + x + 1) * channels];
                for (c, &v) in px.iter().enumerate() {
                    row_sums[c] += v as u64;
                    row_sq += v as u64 * v as u64;
                }
                let at = (y + 1) * stride + x + 1;
                let above = y * stride + x + 1;
                for c in 0..channels {
                    sums[c][at] = sums[c][above] + row_sums[c];
                }
                sum_sq[at] = sum_sq[above] + row_sq;
            }
        }

        Self { stride, sums, sum_sq }
    }

    #[inline]
    fn rect(&self, table: &[u64], x: usize, y: usize, w: usize, h: usize) -> u64 {
        let s = self.stride;
        (table[(y + h) * s + x + w] + table[y * s + x]) - (table[y * s + x + w] + table[(y + h) * s + x])
    }

    #[inline]
    fn sum(&self, channel: usize, x: usize, y: usize, w: usize, h: usize) -> u64 {
        self.rect(&self.sums[channel], x, y, w, h)
    }

    #[inline]
    fn sum_sq(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        self.rect(&self.sum_sq, x, y, w, h)
    }
}
