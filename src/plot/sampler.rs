use crate::analysis::critical_points_within;
use crate::ast::{ASTNode, Bindings, Evaluator};
use log::{debug, trace, warn};
use rayon::prelude::*;

/// Guard bands are measured against this many steps over the full range, so
/// the sub-intervals do not depend on the sampling resolution.
const REFERENCE_STEPS: f64 = 1000.0;

/// A run of consecutive valid samples.
pub type Segment = Vec<(f64, f64)>;

/// Plottable curve: segments in ascending x order, never spanning a
/// discontinuity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleSeries {
    pub segments: Vec<Segment>,
}

impl SampleSeries {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total number of points over all segments.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    pub fn points(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.segments.iter().flatten()
    }

    /// Smallest and largest sampled y.
    pub fn y_bounds(&self) -> Option<(f64, f64)> {
        self.points().fold(None, |bounds, (_, y)| match bounds {
            None => Some((*y, *y)),
            Some((low, high)) => Some((low.min(*y), high.max(*y))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    /// Steps per sub-interval. Both ends of a sub-interval are sampled, so it
    /// yields `resolution + 1` points.
    pub resolution: usize,
    /// Guard band half-width, as a fraction of the reference step.
    pub gap_fraction: f64,
    /// Values above this magnitude break the curve.
    pub cutoff: f64,
    pub parallel: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            resolution: 1000,
            gap_fraction: 0.01,
            cutoff: 1e6,
            parallel: true,
        }
    }
}

impl SamplerConfig {
    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Half-width of the excluded neighbourhood around a critical point.
    pub fn guard_band(&self, low: f64, high: f64) -> f64 {
        self.gap_fraction * (high - low) / REFERENCE_STEPS
    }
}

/// Turns an expression into plottable segments.
pub struct Sampler<'a> {
    evaluator: &'a Evaluator,
    config: SamplerConfig,
}

impl<'a> Sampler<'a> {
    pub fn new(evaluator: &'a Evaluator, config: SamplerConfig) -> Self {
        Self { evaluator, config }
    }

    /// Splits `[low, high]` at the critical points of `ast`, leaving out a
    /// guard band around each one. Also returns the critical points.
    pub fn intervals(
        &self,
        ast: &ASTNode,
        variable: &str,
        low: f64,
        high: f64,
    ) -> (Vec<(f64, f64)>, Vec<f64>) {
        if !(low < high) || !low.is_finite() || !high.is_finite() {
            return (Vec::new(), Vec::new());
        }

        let gap = self.config.guard_band(low, high);
        let critical = critical_points_within(ast, variable, low, high, self.evaluator);
        trace!("Critical points in [{}, {}]: {:?}", low, high, critical);

        let mut intervals = Vec::new();
        let mut start = low;
        for point in &critical {
            let end = point - gap;
            if end > start {
                intervals.push((start, end));
            }
            start = start.max(point + gap);
        }
        if high > start {
            intervals.push((start, high));
        }

        (intervals, critical)
    }

    pub fn sample(&self, ast: &ASTNode, variable: &str, low: f64, high: f64) -> SampleSeries {
        let foreign: Vec<String> = ast
            .free_variables()
            .into_iter()
            .filter(|name| name != variable)
            .collect();
        if !foreign.is_empty() {
            warn!("Cannot sample '{}' over {}: unbound {:?}", ast, variable, foreign);
            return SampleSeries::default();
        }

        let (intervals, critical) = self.intervals(ast, variable, low, high);
        let gap = self.config.guard_band(low, high);
        let outside_guard = |x: f64| critical.iter().all(|c| (x - c).abs() > gap);

        let mut segments = Vec::new();
        for (start, end) in intervals {
            let mut current = Segment::new();
            for (x, y) in self.sample_interval(ast, variable, start, end) {
                match y {
                    Some(y) if outside_guard(x) => current.push((x, y)),
                    _ => {
                        if !current.is_empty() {
                            segments.push(std::mem::take(&mut current));
                        }
                    }
                }
            }
            if !current.is_empty() {
                segments.push(current);
            }
        }

        debug!(
            "Sampled '{}' over [{}, {}]: {} segments",
            ast,
            low,
            high,
            segments.len()
        );
        SampleSeries { segments }
    }

    /// Evaluates `resolution + 1` uniform points of `[start, end]`, both ends
    /// included, in ascending x order.
    fn sample_interval(
        &self,
        ast: &ASTNode,
        variable: &str,
        start: f64,
        end: f64,
    ) -> Vec<(f64, Option<f64>)> {
        let resolution = self.config.resolution.max(1);
        let step = (end - start) / resolution as f64;
        let cutoff = self.config.cutoff;

        let point = |i: usize| {
            let x = if i == resolution {
                end
            } else {
                start + i as f64 * step
            };
            let bindings = Bindings::from([(variable.to_string(), x)]);
            let y = self
                .evaluator
                .evaluate_unchecked(ast, &bindings)
                .ok()
                .filter(|y| y.abs() <= cutoff);
            (x, y)
        };

        if self.config.parallel {
            (0..=resolution).into_par_iter().map(point).collect()
        } else {
            (0..=resolution).map(point).collect()
        }
    }
}

/// Samples with the default function table and guard band.
pub fn sample(
    ast: &ASTNode,
    variable: &str,
    low: f64,
    high: f64,
    resolution: usize,
) -> SampleSeries {
    let evaluator = Evaluator::new(0);
    let config = SamplerConfig::default().with_resolution(resolution);
    Sampler::new(&evaluator, config).sample(ast, variable, low, high)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{parse, ParseOptions};
    use std::f64::consts::FRAC_PI_2;

    fn ast_of(input: &str) -> ASTNode {
        parse(input, &ParseOptions::default()).unwrap().ast
    }

    #[test]
    fn test_pole_splits_the_curve() {
        let ast = ast_of("1/(x-2)");
        let series = sample(&ast, "x", -5.0, 5.0, 1000);
        let gap = SamplerConfig::default().guard_band(-5.0, 5.0);

        assert!(series.segments.len() >= 2);
        assert!(series.points().all(|(x, _)| (x - 2.0).abs() > gap));
        assert!(series.segments[0].iter().all(|(x, _)| *x < 2.0));
        assert!(series.segments.last().unwrap().iter().all(|(x, _)| *x > 2.0));
    }

    #[test]
    fn test_endpoints_included() {
        let series = sample(&ast_of("x^2"), "x", -1.0, 1.0, 10);
        assert_eq!(series.segments.len(), 1);
        assert_eq!(series.len(), 11);
        assert_eq!(series.segments[0][0], (-1.0, 1.0));
        assert_eq!(series.segments[0][10], (1.0, 1.0));
    }

    #[test]
    fn test_intervals_do_not_depend_on_resolution() {
        let evaluator = Evaluator::new(0);
        let ast = ast_of("1/(x^2 - 1) + tan(x)");
        let coarse = Sampler::new(&evaluator, SamplerConfig::default().with_resolution(500));
        let fine = Sampler::new(&evaluator, SamplerConfig::default().with_resolution(1000));

        assert_eq!(
            coarse.intervals(&ast, "x", -3.0, 3.0),
            fine.intervals(&ast, "x", -3.0, 3.0)
        );
        assert_eq!(coarse.intervals(&ast, "x", -3.0, 3.0).0.len(), 5);
    }

    #[test]
    fn test_empty_or_reversed_range() {
        let ast = ast_of("x");
        assert!(sample(&ast, "x", 1.0, 1.0, 100).is_empty());
        assert!(sample(&ast, "x", 2.0, -2.0, 100).is_empty());
        assert!(sample(&ast, "x", f64::NAN, 2.0, 100).is_empty());
    }

    #[test]
    fn test_tangent_breaks_at_poles() {
        let series = sample(&ast_of("tan(x)"), "x", -3.0, 3.0, 1000);
        assert_eq!(series.segments.len(), 3);
        for segment in &series.segments {
            assert!(segment.iter().all(|(x, _)| (x.abs() - FRAC_PI_2).abs() > 1e-6));
        }
    }

    #[test]
    fn test_undefined_region_is_skipped() {
        let series = sample(&ast_of("sqrt(x)"), "x", -1.0, 1.0, 200);
        assert_eq!(series.segments.len(), 1);
        assert!(series.points().all(|(x, _)| *x > 0.0));
        assert_eq!(series.segments[0].last(), Some(&(1.0, 1.0)));
    }

    #[test]
    fn test_cutoff_breaks_segment() {
        let evaluator = Evaluator::new(0);
        let sampler = Sampler::new(&evaluator, SamplerConfig::default().with_cutoff(100.0));
        let series = sampler.sample(&ast_of("exp(x)"), "x", 0.0, 10.0);

        assert_eq!(series.segments.len(), 1);
        assert!(series.points().all(|(_, y)| *y <= 100.0));
        let (_, max) = series.y_bounds().unwrap();
        assert!(max > 99.0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let evaluator = Evaluator::new(0);
        let ast = ast_of("sin(x)/x + 1/(x - 1)");
        let parallel = Sampler::new(&evaluator, SamplerConfig::default());
        let sequential = Sampler::new(&evaluator, SamplerConfig::default().with_parallel(false));

        assert_eq!(
            parallel.sample(&ast, "x", -10.0, 10.0),
            sequential.sample(&ast, "x", -10.0, 10.0)
        );
    }

    #[test]
    fn test_other_variables_give_empty_series() {
        assert!(sample(&ast_of("x + y"), "x", -1.0, 1.0, 100).is_empty());
    }

    #[test]
    fn test_constant_expression() {
        let series = sample(&ast_of("3"), "x", 0.0, 1.0, 4);
        assert_eq!(
            series.segments,
            vec![vec![(0.0, 3.0), (0.25, 3.0), (0.5, 3.0), (0.75, 3.0), (1.0, 3.0)]]
        );
    }
}
