//! Chart geometry for the dashboard: scaled line-chart points with a rounded
//! y axis, donut arc angles and sparkline points. Nothing here renders; the
//! client draws what these functions return.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::f64::consts::TAU;

pub const DEFAULT_TICK_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimePoint {
    pub date: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedValue {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Default for Margin {
    fn default() -> Self {
        Margin { top: 20.0, right: 20.0, bottom: 30.0, left: 40.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: DateTime<Utc>,
    pub value: f64,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineChart {
    pub width: f64,
    pub height: f64,
    pub margin: Margin,
    pub x_domain: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub y_domain: (f64, f64),
    pub y_ticks: Vec<f64>,
    pub points: Vec<ChartPoint>,
    /// SVG path data through `points`.
    pub path: String,
}

impl LineChart {
    pub fn new(series: &[TimePoint], width: f64, height: f64, margin: Margin) -> Self {
        let inner_width = (width - margin.left - margin.right).max(0.0);
        let inner_height = (height - margin.top - margin.bottom).max(0.0);

        let x_domain = series.iter().map(|p| p.date).min()
            .zip(series.iter().map(|p| p.date).max());
        let max_value = series.iter().map(|p| p.value).fold(0.0, f64::max);
        let y_max = nice_upper_bound(max_value, DEFAULT_TICK_COUNT);

        let points: Vec<ChartPoint> = series.iter()
            .map(|p| {
                let x = match x_domain {
                    Some((start, end)) if end > start => {
                        let span = (end - start).num_milliseconds() as f64;
                        let offset = (p.date - start).num_milliseconds() as f64;
                        margin.left + inner_width * offset / span
                    }
                    _ => margin.left + inner_width / 2.0,
                };
                let clamped = p.value.clamp(0.0, y_max);
                let y = margin.top + inner_height * (1.0 - clamped / y_max);
                ChartPoint { date: p.date, value: p.value, x, y }
            })
            .collect();

        LineChart {
            width,
            height,
            margin,
            x_domain,
            y_domain: (0.0, y_max),
            y_ticks: ticks(y_max, DEFAULT_TICK_COUNT),
            path: svg_path(points.iter().map(|p| (p.x, p.y))),
            points,
        }
    }
}

/// Step between ticks so that roughly `count` ticks cover `[0, max]`, snapped
/// to 1, 2 or 5 times a power of ten.
pub fn tick_step(max: f64, count: usize) -> f64 {
    if max <= 0.0 || count == 0 || !max.is_finite() {
        return 1.0;
    }
    let raw = max / count as f64;
    let power = 10f64.powf(raw.log10().floor());
    let error = raw / power;
    let factor = if error >= 50f64.sqrt() {
        10.0
    } else if error >= 10f64.sqrt() {
        5.0
    } else if error >= 2f64.sqrt() {
        2.0
    } else {
        1.0
    };
    power * factor
}

/// Rounds `max` up to the next tick. An all-zero series still gets `[0, 1]`.
pub fn nice_upper_bound(max: f64, count: usize) -> f64 {
    if max <= 0.0 || !max.is_finite() {
        return 1.0;
    }
    let step = tick_step(max, count);
    (max / step).ceil() * step
}

pub fn ticks(upper: f64, count: usize) -> Vec<f64> {
    let step = tick_step(upper, count);
    let steps = (upper / step).round() as usize;
    (0..=steps).map(|i| i as f64 * step).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonutArc {
    pub label: String,
    pub value: f64,
    /// Radians, clockwise from twelve o'clock.
    pub start_angle: f64,
    pub end_angle: f64,
    pub percentage: f64,
}

/// Negative values count as zero.
pub fn donut_arcs(slices: &[NamedValue]) -> Vec<DonutArc> {
    let total: f64 = slices.iter().map(|s| s.value.max(0.0)).sum();
    let mut angle = 0.0;
    slices.iter()
        .map(|slice| {
            let value = slice.value.max(0.0);
            let share = if total > 0.0 { value / total } else { 0.0 };
            let start_angle = angle;
            angle += share * TAU;
            DonutArc {
                label: slice.label.clone(),
                value,
                start_angle,
                end_angle: angle,
                percentage: share * 100.0,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SparkPoint {
    pub x: f64,
    pub y: f64,
}

/// Normalizes `values` into a `width` x `height` box, higher values nearer the
/// top. A flat series sits on the middle line.
pub fn sparkline(values: &[f64], width: f64, height: f64) -> Vec<SparkPoint> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let last = values.len().saturating_sub(1);

    values.iter()
        .enumerate()
        .map(|(i, value)| {
            let x = if last == 0 { width / 2.0 } else { width * i as f64 / last as f64 };
            let y = if max > min {
                height * (1.0 - (value - min) / (max - min))
            } else {
                height / 2.0
            };
            SparkPoint { x, y }
        })
        .collect()
}

pub fn sparkline_path(points: &[SparkPoint]) -> String {
    svg_path(points.iter().map(|p| (p.x, p.y)))
}

fn svg_path(coords: impl Iterator<Item = (f64, f64)>) -> String {
    coords
        .enumerate()
        .map(|(i, (x, y))| format!("{}{:.2},{:.2}", if i == 0 { "M" } else { "L" }, x, y))
        .collect::<Vec<_>>()
        .join("")
}
