//! Accumulator grids
//!
//! An [`Accumulator`] receives every contribution of the trajectories it is
//! handed. Parallel drivers give each worker chunk a private accumulator and
//! merge them afterwards, so no grid is ever written concurrently.
//!
//! Raw sums are kept in the units they are accumulated in:
//!
//! - concentration and odour bands: Σ mass·dt per cell (mass·s)
//! - deposition: deposited mass per cell
//! - receptors: Σ mass·dt per receptor window, plus the largest single-trajectory sum
//! - transient grid: Σ mass·dt / cell volume (mass·s/m³)
//!
//! The `*_concentration` accessors normalise by volume and averaging time.

use crate::accumulation::receptors::{ReceptorSet, ReceptorTally};
use crate::accumulation::{odour, Diagnostics, GridLayout};
use crate::core_types::Vec3;
use crate::simulation::TrajectoryOutcome;

/// One evaluation of a particle's position for accumulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Presence {
    pub group: usize,
    pub position: Vec3,
    pub height_above_surface: f64,
    /// mass × step duration (mass·s)
    pub weight: f64,
    /// Contribute to concentration grids and receptors
    pub concentration: bool,
}

#[derive(Debug, Clone)]
pub struct Accumulator {
    layout: GridLayout,
    /// Stored as `[group][slice][iy][ix]`
    concentration: Vec<f64>,
    odour_upper: Vec<f64>,
    odour_lower: Vec<f64>,
    /// Stored as `[group][iy][ix]`
    deposition: Vec<f64>,
    deposited_total: Vec<f64>,
    /// Stored as `[receptor][group]`
    receptor_sum: Vec<f64>,
    receptor_max: Vec<f64>,
    /// Stored as `[group][k][iy][ix]`
    transient: Vec<f64>,
    emitted_mass: Vec<f64>,
    diagnostics: Diagnostics,
}

impl Accumulator {
    /// Zeroed grids sized for `layout`
    pub fn new(layout: &GridLayout) -> Self {
        let groups = layout.groups;
        let cells = layout.raster.cells();
        let slice_cells = groups * layout.raster.slice_count() * cells;
        let odour_cells = if layout.odour { slice_cells } else { 0 };
        let transient_cells = layout
            .transient
            .as_ref()
            .map_or(0, |t| groups * t.cell_count());
        Self {
            layout: layout.clone(),
            concentration: vec![0.0; slice_cells],
            odour_upper: vec![0.0; odour_cells],
            odour_lower: vec![0.0; odour_cells],
            deposition: vec![0.0; groups * cells],
            deposited_total: vec![0.0; groups],
            receptor_sum: vec![0.0; layout.receptors * groups],
            receptor_max: vec![0.0; layout.receptors * groups],
            transient: vec![0.0; transient_cells],
            emitted_mass: vec![0.0; groups],
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    #[inline]
    fn slice_index(&self, group: usize, slice: usize, ix: usize, iy: usize) -> usize {
        let r = &self.layout.raster;
        ((group * r.slice_count() + slice) * r.ny + iy) * r.nx + ix
    }

    #[inline]
    fn slice_range(&self, group: usize, slice: usize) -> std::ops::Range<usize> {
        let start = self.slice_index(group, slice, 0, 0);
        start..start + self.layout.raster.cells()
    }

    /// Add one step's contribution of a particle
    pub fn add_presence(&mut self, presence: &Presence, receptors: &ReceptorSet, tally: &mut ReceptorTally) {
        let group = presence.group.min(self.layout.groups - 1);
        let (x, y, h) = (presence.position.x, presence.position.y, presence.height_above_surface);

        if presence.concentration {
            let raster = &self.layout.raster;
            let cell = raster.cell_of(x, y);
            let mut raster_hit = None;
            if let Some((ix, iy)) = cell {
                if let Some(slice) = raster.slice_of(h) {
                    let idx = self.slice_index(group, slice, ix, iy);
                    self.concentration[idx] += presence.weight;
                    raster_hit = Some((ix, iy, slice));
                }
                if self.layout.odour {
                    let shift = self.layout.raster.slice_thickness;
                    if let Some(slice) = self.layout.raster.shifted_slice_of(h, shift) {
                        let idx = self.slice_index(group, slice, ix, iy);
                        self.odour_upper[idx] += presence.weight;
                    }
                    if let Some(slice) = self.layout.raster.shifted_slice_of(h, -shift) {
                        let idx = self.slice_index(group, slice, ix, iy);
                        self.odour_lower[idx] += presence.weight;
                    }
                }
            }
            receptors.for_each_containing(raster_hit, x, y, h, |r| tally.add(r, presence.weight));
        }

        if let Some(layout) = &self.layout.transient {
            if let Some(idx) = layout.index_of(x, y, h) {
                let (_, _, k) = layout.unflatten(idx);
                let offset = group * layout.cell_count();
                self.transient[offset + idx] += presence.weight / layout.cell_volume(k);
            }
        }
    }

    /// Deposit mass at a horizontal position
    ///
    /// The domain-wide total is always recorded; the grid only inside the raster.
    pub fn add_deposition(&mut self, group: usize, x: f64, y: f64, mass: f64) {
        let group = group.min(self.layout.groups - 1);
        self.deposited_total[group] += mass;
        if let Some((ix, iy)) = self.layout.raster.cell_of(x, y) {
            let r = &self.layout.raster;
            self.deposition[(group * r.ny + iy) * r.nx + ix] += mass;
        }
    }

    /// Count emitted mass of a source group
    pub fn record_emission(&mut self, group: usize, mass: f64) {
        let group = group.min(self.layout.groups - 1);
        self.emitted_mass[group] += mass;
    }

    /// Close a trajectory: fold its receptor tally into sums and maxima
    pub fn finish_trajectory(&mut self, group: usize, tally: &ReceptorTally, outcome: &TrajectoryOutcome) {
        let groups = self.layout.groups;
        let group = group.min(groups - 1);
        for (receptor, value) in tally.contributions() {
            let idx = receptor * groups + group;
            self.receptor_sum[idx] += value;
            self.receptor_max[idx] = self.receptor_max[idx].max(value);
        }
        self.diagnostics.record(outcome);
    }

    /// Add another accumulator of the same layout
    pub fn merge(&mut self, other: &Accumulator) {
        fn add(a: &mut [f64], b: &[f64]) {
            for (x, y) in a.iter_mut().zip(b) {
                *x += y;
            }
        }
        debug_assert_eq!(self.layout, other.layout, "merging accumulators of different layouts");
        add(&mut self.concentration, &other.concentration);
        add(&mut self.odour_upper, &other.odour_upper);
        add(&mut self.odour_lower, &other.odour_lower);
        add(&mut self.deposition, &other.deposition);
        add(&mut self.deposited_total, &other.deposited_total);
        add(&mut self.receptor_sum, &other.receptor_sum);
        add(&mut self.transient, &other.transient);
        add(&mut self.emitted_mass, &other.emitted_mass);
        for (a, b) in self.receptor_max.iter_mut().zip(&other.receptor_max) {
            *a = a.max(*b);
        }
        self.diagnostics.merge(&other.diagnostics);
    }

    /// Raw Σ mass·dt of one slice
    pub fn raw_concentration(&self, group: usize, slice: usize) -> &[f64] {
        &self.concentration[self.slice_range(group, slice)]
    }

    /// Mean concentration of one slice over `total_time` (mass/m³)
    pub fn concentration(&self, group: usize, slice: usize, total_time: f64) -> Vec<f64> {
        let norm = 1.0 / (self.layout.raster.cell_volume() * total_time);
        self.raw_concentration(group, slice)
            .iter()
            .map(|v| v * norm)
            .collect()
    }

    /// Mean concentrations of the upper and lower odour bands of a slice
    pub fn odour_bands(&self, group: usize, slice: usize, total_time: f64) -> Option<(Vec<f64>, Vec<f64>)> {
        if !self.layout.odour {
            return None;
        }
        let norm = 1.0 / (self.layout.raster.cell_volume() * total_time);
        let range = self.slice_range(group, slice);
        let upper = self.odour_upper[range.clone()].iter().map(|v| v * norm).collect();
        let lower = self.odour_lower[range].iter().map(|v| v * norm).collect();
        Some((upper, lower))
    }

    /// Concentration-variance production term of a slice (odour mode only)
    pub fn odour_variance_source(
        &self,
        group: usize,
        slice: usize,
        total_time: f64,
        sigma_w: f64,
        time_scale: f64,
    ) -> Option<Vec<f64>> {
        let (upper, lower) = self.odour_bands(group, slice, total_time)?;
        Some(odour::variance_source_field(
            &upper,
            &lower,
            self.layout.raster.slice_thickness,
            sigma_w,
            time_scale,
        ))
    }

    /// Deposited mass per raster cell
    pub fn deposition(&self, group: usize) -> &[f64] {
        let cells = self.layout.raster.cells();
        &self.deposition[group * cells..(group + 1) * cells]
    }

    /// Deposition flux per raster cell over `total_time` (mass/(m²·s))
    pub fn deposition_flux(&self, group: usize, total_time: f64) -> Vec<f64> {
        let norm = 1.0 / (self.layout.raster.cell_area() * total_time);
        self.deposition(group).iter().map(|v| v * norm).collect()
    }

    /// Total deposited mass of a group, including deposition outside the raster
    pub fn deposited_mass(&self, group: usize) -> f64 {
        self.deposited_total[group]
    }

    /// Mean concentration at a receptor (mass/m³)
    pub fn receptor_concentration(&self, receptor: usize, group: usize, total_time: f64) -> f64 {
        self.receptor_sum[receptor * self.layout.groups + group]
            / (self.layout.raster.cell_volume() * total_time)
    }

    /// Largest single-particle contribution to a receptor's concentration (mass/m³)
    pub fn receptor_max_concentration(&self, receptor: usize, group: usize, total_time: f64) -> f64 {
        self.receptor_max[receptor * self.layout.groups + group]
            / (self.layout.raster.cell_volume() * total_time)
    }

    /// Raw transient grid of a group (mass·s/m³)
    pub fn transient(&self, group: usize) -> &[f64] {
        let Some(layout) = &self.layout.transient else {
            return &[];
        };
        let cells = layout.cell_count();
        &self.transient[group * cells..(group + 1) * cells]
    }

    /// Time-mean mass per transient cell over `total_time`
    pub fn transient_mass(&self, group: usize, total_time: f64) -> Vec<f64> {
        let Some(layout) = &self.layout.transient else {
            return Vec::new();
        };
        self.transient(group)
            .iter()
            .enumerate()
            .map(|(idx, v)| {
                let (_, _, k) = layout.unflatten(idx);
                v * layout.cell_volume(k) / total_time
            })
            .collect()
    }

    pub fn emitted_mass(&self, group: usize) -> f64 {
        self.emitted_mass[group]
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulation::{ConcentrationRaster, TransientLayout};
    use approx::assert_relative_eq;

    fn layout(odour: bool) -> GridLayout {
        GridLayout {
            raster: ConcentrationRaster {
                origin_x: 0.0,
                origin_y: 0.0,
                dx: 10.0,
                dy: 10.0,
                nx: 4,
                ny: 3,
                slice_heights: vec![2.0, 10.0],
                slice_thickness: 2.0,
            },
            groups: 2,
            receptors: 0,
            transient: Some(TransientLayout {
                origin_x: 0.0,
                origin_y: 0.0,
                dx: 20.0,
                dy: 15.0,
                nx: 2,
                ny: 2,
                level_faces: vec![0.0, 5.0, 50.0],
            }),
            odour,
        }
    }

    fn presence(x: f64, y: f64, h: f64, weight: f64) -> Presence {
        Presence {
            group: 1,
            position: Vec3::new(x, y, h),
            height_above_surface: h,
            weight,
            concentration: true,
        }
    }

    #[test]
    fn test_presence_lands_in_one_slice() {
        let mut acc = Accumulator::new(&layout(false));
        let receptors = ReceptorSet::none();
        let mut tally = ReceptorTally::new(0);
        acc.add_presence(&presence(15.0, 5.0, 2.5, 3.0), &receptors, &mut tally);
        acc.add_presence(&presence(15.0, 5.0, 6.0, 3.0), &receptors, &mut tally);
        assert_eq!(acc.raw_concentration(1, 0)[1], 3.0);
        assert_eq!(acc.raw_concentration(1, 0).iter().sum::<f64>(), 3.0);
        assert_eq!(acc.raw_concentration(1, 1).iter().sum::<f64>(), 0.0);
        assert_eq!(acc.raw_concentration(0, 0).iter().sum::<f64>(), 0.0);

        let c = acc.concentration(1, 0, 100.0);
        assert_relative_eq!(c[1], 3.0 / (200.0 * 100.0), epsilon = 1e-15);
    }

    #[test]
    fn test_transient_grid_stores_volume_weighted_sum() {
        let mut acc = Accumulator::new(&layout(false));
        let receptors = ReceptorSet::none();
        let mut tally = ReceptorTally::new(0);
        acc.add_presence(&presence(5.0, 5.0, 1.0, 10.0), &receptors, &mut tally);
        assert_relative_eq!(acc.transient(1)[0], 10.0 / 1500.0, epsilon = 1e-15);
        let mass = acc.transient_mass(1, 10.0);
        assert_relative_eq!(mass[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_odour_bands() {
        let mut acc = Accumulator::new(&layout(true));
        let receptors = ReceptorSet::none();
        let mut tally = ReceptorTally::new(0);
        // 4.0 is in the upper band of slice 0 (centre 4, thickness 2)
        acc.add_presence(&presence(5.0, 5.0, 4.0, 1.0), &receptors, &mut tally);
        let (upper, lower) = acc.odour_bands(1, 0, 1.0).unwrap();
        assert!(upper[0] > 0.0);
        assert_eq!(lower[0], 0.0);
        let source = acc.odour_variance_source(1, 0, 1.0, 0.5, 10.0).unwrap();
        assert!(source[0] > 0.0);
        assert!(Accumulator::new(&layout(false)).odour_bands(0, 0, 1.0).is_none());
    }

    #[test]
    fn test_deposition_outside_raster_counts_in_total() {
        let mut acc = Accumulator::new(&layout(false));
        acc.add_deposition(0, 5.0, 5.0, 0.25);
        acc.add_deposition(0, 500.0, 5.0, 0.5);
        assert_eq!(acc.deposition(0)[0], 0.25);
        assert_eq!(acc.deposited_mass(0), 0.75);
        assert_relative_eq!(acc.deposition_flux(0, 10.0)[0], 0.25 / 1000.0, epsilon = 1e-15);
    }

    #[test]
    fn test_merge_sums_and_keeps_max() {
        let l = GridLayout {
            receptors: 1,
            ..layout(false)
        };
        let outcome = TrajectoryOutcome {
            reason: crate::simulation::RemovalReason::TimeExhausted,
            steps: 1,
            reflections: 0,
            elapsed: 1.0,
            initial_mass: 1.0,
            final_mass: 1.0,
            deposited_mass: 0.0,
            washed_out_mass: 0.0,
            decayed_mass: 0.0,
            exposure: 1.0,
            reflected_exposure: 0.0,
            unrealistic_wind: 0,
            final_position: Vec3::zeros(),
        };
        let mut a = Accumulator::new(&l);
        let mut b = Accumulator::new(&l);
        let mut tally = ReceptorTally::new(1);
        tally.add(0, 2.0);
        a.finish_trajectory(0, &tally, &outcome);
        tally.reset();
        tally.add(0, 5.0);
        b.finish_trajectory(0, &tally, &outcome);
        b.record_emission(0, 3.0);
        a.merge(&b);
        assert_relative_eq!(a.receptor_concentration(0, 0, 1.0), 7.0 / 200.0, epsilon = 1e-15);
        assert_relative_eq!(a.receptor_max_concentration(0, 0, 1.0), 5.0 / 200.0, epsilon = 1e-15);
        assert_eq!(a.emitted_mass(0), 3.0);
        assert_eq!(a.diagnostics().particles, 2);
    }
}
