//! Adaptive grid walking from a single seed dot.
//!
//! Tracking runs in two phases. The center row is walked outward by two
//! workers (left and right). Once both have joined, every column is walked up
//! and down from its center-row cell by four workers, each owning a disjoint
//! set of column halves. Walkers predict the next dot from the last accepted
//! one, refine the prediction by center of mass and accept it only when the
//! measured displacement is consistent with the running step.

use crate::frame::{ChrominanceFilter, Frame};

use super::search::{refine_dot, step_is_plausible, SearchConfig, StepBand};
use super::{Grid, GridDot};

/// Tracker parameters.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub search: SearchConfig,
    /// Accepted displacement range relative to `|step| × cells since last accept`.
    pub band: StepBand,
    /// Luma jump between consecutive edge probes that ends a walk.
    pub edge_luma_threshold: f32,
    /// Box radius (pixels) of each luma probe.
    pub edge_probe_radius: i32,
    /// Probe spacing as a fraction of the step.
    pub edge_probe_spacing: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            band: StepBand::default(),
            edge_luma_threshold: 48.0,
            edge_probe_radius: 1,
            edge_probe_spacing: 0.25,
        }
    }
}

/// Externally pinned cell position.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Anchor {
    pub row: usize,
    pub col: usize,
    pub position: [f32; 2],
}

struct Ctx<'a, 'f> {
    frame: &'a Frame<'f>,
    filter: &'a ChrominanceFilter,
    cfg: &'a TrackerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Running state of one walk direction.
#[derive(Debug, Clone, Copy)]
struct Walk {
    /// Last accepted (or anchored) position.
    reference: [f32; 2],
    /// Last predicted or accepted position.
    cursor: [f32; 2],
    step: [f32; 2],
    /// Cells since `reference`.
    gap: usize,
}

impl Walk {
    fn start(at: [f32; 2], step: [f32; 2]) -> Self {
        Self {
            reference: at,
            cursor: at,
            step,
            gap: 0,
        }
    }

    fn rebase(&mut self, at: [f32; 2]) {
        self.reference = at;
        self.cursor = at;
        self.gap = 0;
    }

    fn visit(&mut self, cell: &mut GridDot, anchored: bool, ctx: &Ctx<'_, '_>) -> Flow {
        if anchored {
            if let Some(p) = cell.position() {
                self.rebase(p);
            }
            return Flow::Continue;
        }

        let predicted = add(self.cursor, self.step);
        self.gap += 1;
        let step_len = norm(self.step);
        let expected = step_len * self.gap as f32;

        let accepted = refine_dot(ctx.frame, ctx.filter, predicted, step_len, &ctx.cfg.search)
            .filter(|p| step_is_plausible(norm(sub(*p, self.reference)), expected, ctx.cfg.band));

        if let Some(p) = accepted {
            let d = sub(p, self.reference);
            let n = self.gap as f32;
            self.step = [d[0] / n, d[1] / n];
            self.rebase(p);
            *cell = GridDot::at(p);
            tracing::trace!(x = p[0], y = p[1], "dot accepted");
            return Flow::Continue;
        }

        // Keep extrapolating with the last accepted step; only a lens edge
        // ends the walk.
        *cell = GridDot::Invalid;
        self.cursor = predicted;
        tracing::trace!(x = predicted[0], y = predicted[1], gap = self.gap, "dot rejected");
        if self.edge_ahead(ctx) {
            return Flow::Stop;
        }
        Flow::Continue
    }

    /// Probe luma on both sides of the walk, half a step off its axis, from the
    /// reference to just past the cursor.
    fn edge_ahead(&self, ctx: &Ctx<'_, '_>) -> bool {
        let half_perp = [-self.step[1] * 0.5, self.step[0] * 0.5];
        let spacing = ctx.cfg.edge_probe_spacing.max(0.05);
        let reach = self.gap as f32 + 0.5;
        let samples = (reach / spacing).ceil() as usize;

        [1.0f32, -1.0].iter().any(|&side| {
            let mut prev: Option<f32> = None;
            (0..=samples).any(|i| {
                let t = i as f32 * spacing;
                let x = self.reference[0] + self.step[0] * t + side * half_perp[0];
                let y = self.reference[1] + self.step[1] * t + side * half_perp[1];
                let luma = ctx.frame.mean_luma(x, y, ctx.cfg.edge_probe_radius);
                let jump = prev.is_some_and(|p| (luma - p).abs() >= ctx.cfg.edge_luma_threshold);
                prev = Some(luma);
                jump
            })
        })
    }
}

/// One center-row cell plus what the column walkers need from it.
#[derive(Debug, Clone, Copy, Default)]
struct RowSlot {
    dot: GridDot,
    anchored: bool,
    /// `(position, row step)` to start the column walk from; `None` past an
    /// edge termination.
    start: Option<([f32; 2], [f32; 2])>,
}

/// Walk one half of the center row. `orient` is `-1` for the leftward walk so
/// that recorded steps always point along increasing column index.
fn walk_row<'s>(
    slots: impl Iterator<Item = &'s mut RowSlot>,
    origin: [f32; 2],
    step: [f32; 2],
    orient: f32,
    ctx: &Ctx<'_, '_>,
) {
    let mut walk = Walk::start(origin, [step[0] * orient, step[1] * orient]);
    for slot in slots {
        if walk.visit(&mut slot.dot, slot.anchored, ctx) == Flow::Stop {
            break;
        }
        let pos = slot.dot.position().unwrap_or(walk.cursor);
        slot.start = Some((pos, [walk.step[0] * orient, walk.step[1] * orient]));
    }
}

/// Half of one column, walked away from the center row.
struct ColumnJob<'g> {
    /// Cells ordered from the center row outward.
    cells: Vec<&'g mut GridDot>,
    anchored: Vec<bool>,
    start: Option<([f32; 2], [f32; 2])>,
}

impl ColumnJob<'_> {
    fn run(&mut self, ctx: &Ctx<'_, '_>) {
        let Some((origin, step)) = self.start else {
            return;
        };
        let mut walk = Walk::start(origin, step);
        for (cell, &anchored) in self.cells.iter_mut().zip(&self.anchored) {
            if walk.visit(cell, anchored, ctx) == Flow::Stop {
                break;
            }
        }
    }
}

/// Populate `grid` from its center position.
///
/// `pitch_px` is the expected horizontal step at the seed. Anchors are written
/// before tracking and are never overwritten; a walk that reaches one
/// continues from the anchored position. Cells that cannot be tracked end up
/// [`GridDot::Invalid`].
pub fn track_grid(
    frame: &Frame<'_>,
    filter: &ChrominanceFilter,
    grid: &mut Grid,
    pitch_px: f32,
    anchors: &[Anchor],
    cfg: &TrackerConfig,
) {
    let (rows, cols) = (grid.rows(), grid.cols());
    let (r0, c0) = grid.center_cell();
    let ctx = Ctx { frame, filter, cfg };

    grid.clear();

    let mut anchored = vec![false; rows * cols];
    for a in anchors {
        if a.row < rows && a.col < cols {
            grid.set(a.row, a.col, GridDot::at(a.position));
            anchored[a.col * rows + a.row] = true;
        }
    }

    let seed = grid.center_position();
    if !anchored[c0 * rows + r0] {
        grid.set(r0, c0, GridDot::at(seed));
        anchored[c0 * rows + r0] = true;
    }
    let origin = grid.get(r0, c0).position().unwrap_or(seed);
    let step = [pitch_px, 0.0];

    // Phase 1: center row.
    let mut row: Vec<RowSlot> = (0..cols)
        .map(|c| RowSlot {
            dot: grid.get(r0, c),
            anchored: anchored[c * rows + r0],
            start: None,
        })
        .collect();
    row[c0].start = Some((origin, step));
    {
        let (left, right) = row.split_at_mut(c0);
        let right = &mut right[1..];
        rayon::join(
            || walk_row(left.iter_mut().rev(), origin, step, -1.0, &ctx),
            || walk_row(right.iter_mut(), origin, step, 1.0, &ctx),
        );
    }
    // The seed column starts with the step measured next to it.
    if let Some(s) = [c0.checked_sub(1), Some(c0 + 1)]
        .into_iter()
        .flatten()
        .filter_map(|c| row.get(c))
        .filter(|slot| slot.dot.is_valid())
        .find_map(|slot| slot.start.map(|(_, s)| s))
    {
        row[c0].start = Some((origin, s));
    }
    for (c, slot) in row.iter().enumerate() {
        grid.set(r0, c, slot.dot);
    }
    tracing::debug!(
        valid = row.iter().filter(|s| s.dot.is_valid()).count(),
        cols,
        "center row tracked"
    );

    // Phase 2: column halves. The center row stays read-only.
    {
        let mut jobs: [Vec<ColumnJob<'_>>; 4] = Default::default();
        for (c, (column, mask)) in grid.columns_mut().zip(anchored.chunks(rows)).enumerate() {
            let (upper, rest) = column.split_at_mut(r0);
            let lower = &mut rest[1..];
            let (up_start, down_start) = match row[c].start {
                Some((p, s)) => (Some((p, [s[1], -s[0]])), Some((p, [-s[1], s[0]]))),
                None => (None, None),
            };
            let up = ColumnJob {
                cells: upper.iter_mut().rev().collect(),
                anchored: mask[..r0].iter().rev().copied().collect(),
                start: up_start,
            };
            let down = ColumnJob {
                cells: lower.iter_mut().collect(),
                anchored: mask[r0 + 1..].to_vec(),
                start: down_start,
            };
            let side = if c < c0 { 0 } else { 1 };
            jobs[side].push(up);
            jobs[side + 2].push(down);
        }
        rayon::scope(|s| {
            for worker in jobs.iter_mut() {
                let ctx = &ctx;
                s.spawn(move |_| {
                    for job in worker.iter_mut() {
                        job.run(ctx);
                    }
                });
            }
        });
    }

    tracing::debug!(valid = grid.valid_count(), total = rows * cols, "grid tracked");
}

#[inline]
fn add(a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    [a[0] + b[0], a[1] + b[1]]
}

#[inline]
fn sub(a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

#[inline]
fn norm(v: [f32; 2]) -> f32 {
    (v[0] * v[0] + v[1] * v[1]).sqrt()
}
