//! SVG chart rendering on top of `plotters`.
//!
//! Every function draws one complete chart file and returns once it has been
//! written. Inputs are already aggregated; nothing here looks at tables.

use crate::data::stats::{CorrelationMatrix, quantile};
use crate::error::PipelineError;
use plotters::coord::Shift;
use plotters::element::Polygon;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::ops::Range;
use std::path::Path;

pub const CHART_SIZE: (u32, u32) = (1400, 800);
const WIDE_CHART_SIZE: (u32, u32) = (1600, 700);
const FONT: &str = "sans-serif";

pub const STEEL_BLUE: RGBColor = RGBColor(70, 130, 180);
pub const CORAL: RGBColor = RGBColor(255, 127, 80);
pub const SEA_GREEN: RGBColor = RGBColor(60, 179, 113);

/// Title and axis descriptions of a chart.
#[derive(Debug, Clone, Copy)]
pub struct Labels<'a> {
    pub title: &'a str,
    pub x: &'a str,
    pub y: &'a str,
}

/// A named polyline.
#[derive(Debug, Clone)]
pub struct LineSpec {
    pub label: String,
    pub points: Vec<(f64, f64)>,
    pub color: RGBColor,
}

/// A shaded region between a lower and an upper bound at each x.
#[derive(Debug, Clone)]
pub struct Band {
    pub label: String,
    pub lower: Vec<(f64, f64)>,
    pub upper: Vec<(f64, f64)>,
    pub color: RGBColor,
}

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

fn open(path: &Path, size: (u32, u32)) -> Result<Area<'_>, PipelineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    Ok(root)
}

/// Widen a degenerate or empty range so plotters has something to map.
fn padded(lo: f64, hi: f64, pad_fraction: f64) -> Range<f64> {
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    if lo == hi {
        return (lo - 0.5)..(hi + 0.5);
    }
    let pad = (hi - lo) * pad_fraction;
    (lo - pad)..(hi + pad)
}

fn bounds(values: impl IntoIterator<Item = f64>) -> (f64, f64) {
    values
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

/// Range from zero (or the smallest negative value) to a little past the largest value.
fn bar_range(values: impl IntoIterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = bounds(values);
    let lo = if lo.is_finite() { lo.min(0.0) } else { 0.0 };
    let hi = if hi.is_finite() && hi > 0.0 { hi * 1.1 } else { 1.0 };
    lo..hi
}

fn segment_label(names: &[String], v: &SegmentValue<usize>) -> String {
    match v {
        SegmentValue::CenterOf(i) => names.get(*i).cloned().unwrap_or_default(),
        _ => String::new(),
    }
}

/// Horizontal bars, first entry at the top, with a value label past each bar.
pub fn horizontal_bars(
    path: &Path,
    labels: Labels<'_>,
    bars: &[(String, f64)],
    color: RGBColor,
    value_label: fn(f64) -> String,
) -> Result<(), PipelineError> {
    let root = open(path, CHART_SIZE)?;
    let n = bars.len();
    // Reverse so the first bar lands on the topmost segment.
    let names: Vec<String> = bars.iter().rev().map(|(name, _)| name.clone()).collect();
    let x_range = bar_range(bars.iter().map(|(_, v)| *v));
    let offset = (x_range.end - x_range.start) * 0.01;

    let mut chart = ChartBuilder::on(&root)
        .caption(labels.title, (FONT, 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(260)
        .build_cartesian_2d(x_range, (0..n).into_segmented())?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(n * 2 + 2)
        .y_label_formatter(&|v| segment_label(&names, v))
        .x_desc(labels.x)
        .y_desc(labels.y)
        .draw()?;

    chart.draw_series(bars.iter().enumerate().map(|(k, (_, v))| {
        let slot = n - 1 - k;
        let mut bar = Rectangle::new(
            [(0.0, SegmentValue::Exact(slot)), (*v, SegmentValue::Exact(slot + 1))],
            color.filled(),
        );
        bar.set_margin(4, 4, 0, 0);
        bar
    }))?;

    let style = TextStyle::from((FONT, 14).into_font()).pos(Pos::new(HPos::Left, VPos::Center));
    chart.draw_series(bars.iter().enumerate().map(|(k, (_, v))| {
        Text::new(
            value_label(*v),
            (*v + offset, SegmentValue::CenterOf(n - 1 - k)),
            style.clone(),
        )
    }))?;

    root.present()?;
    Ok(())
}

/// Vertical bars in the given order, with the value above each bar.
pub fn vertical_bars(
    path: &Path,
    labels: Labels<'_>,
    bars: &[(String, f64)],
    color: RGBColor,
    value_label: fn(f64) -> String,
) -> Result<(), PipelineError> {
    let root = open(path, CHART_SIZE)?;
    let n = bars.len();
    let names: Vec<String> = bars.iter().map(|(name, _)| name.clone()).collect();
    let y_range = bar_range(bars.iter().map(|(_, v)| *v));

    let mut chart = ChartBuilder::on(&root)
        .caption(labels.title, (FONT, 28))
        .margin(20)
        .x_label_area_size(80)
        .y_label_area_size(80)
        .build_cartesian_2d((0..n).into_segmented(), y_range)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n * 2 + 2)
        .x_label_formatter(&|v| segment_label(&names, v))
        .x_label_style((FONT, 12).into_font())
        .x_desc(labels.x)
        .y_desc(labels.y)
        .draw()?;

    chart.draw_series(bars.iter().enumerate().map(|(i, (_, v))| {
        let mut bar = Rectangle::new(
            [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *v)],
            color.filled(),
        );
        bar.set_margin(0, 0, 8, 8);
        bar
    }))?;

    let style = TextStyle::from((FONT, 14).into_font()).pos(Pos::new(HPos::Center, VPos::Bottom));
    chart.draw_series(bars.iter().enumerate().map(|(i, (_, v))| {
        Text::new(value_label(*v), (SegmentValue::CenterOf(i), *v), style.clone())
    }))?;

    root.present()?;
    Ok(())
}

/// Pie chart starting at twelve o'clock, counter-clockwise, with a label and
/// percentage per slice.
pub fn pie(path: &Path, title: &str, slices: &[(String, f64)]) -> Result<(), PipelineError> {
    let root = open(path, CHART_SIZE)?;
    let area = root.titled(title, (FONT, 28))?;
    let (w, h) = area.dim_in_pixel();
    let center = (w as f64 / 2.0, h as f64 / 2.0);
    let radius = (w.min(h) as f64) * 0.36;
    let total: f64 = slices.iter().map(|(_, v)| v.max(0.0)).sum();
    if total <= 0.0 {
        root.present()?;
        return Ok(());
    }

    let at = |angle: f64, r: f64| -> (i32, i32) {
        (
            (center.0 + r * angle.cos()).round() as i32,
            (center.1 - r * angle.sin()).round() as i32,
        )
    };

    let label_style = TextStyle::from((FONT, 15).into_font()).pos(Pos::new(HPos::Center, VPos::Center));
    let mut start = std::f64::consts::FRAC_PI_2;
    for (i, (name, value)) in slices.iter().enumerate() {
        let share = value.max(0.0) / total;
        let sweep = share * std::f64::consts::TAU;
        let steps = ((sweep.to_degrees()).ceil() as usize).max(2);
        let mut points = vec![at(0.0, 0.0)];
        for s in 0..=steps {
            points.push(at(start + sweep * s as f64 / steps as f64, radius));
        }
        let color = Palette99::pick(i);
        area.draw(&Polygon::new(points, color.filled()))?;

        let mid = start + sweep / 2.0;
        area.draw(&Text::new(name.clone(), at(mid, radius * 1.15), label_style.clone()))?;
        area.draw(&Text::new(
            format!("{:.1}%", share * 100.0),
            at(mid, radius * 0.65),
            label_style.clone(),
        ))?;
        start += sweep;
    }

    root.present()?;
    Ok(())
}

/// Diverging blue-white-red for a value in [-1, 1].
fn diverging_color(value: f64) -> RGBColor {
    let cold = (59.0, 76.0, 192.0);
    let mid = (221.0, 221.0, 221.0);
    let hot = (180.0, 4.0, 38.0);
    let t = value.clamp(-1.0, 1.0);
    let (from, to, f) = if t < 0.0 { (mid, cold, -t) } else { (mid, hot, t) };
    let lerp = |a: f64, b: f64| (a + (b - a) * f).round() as u8;
    RGBColor(lerp(from.0, to.0), lerp(from.1, to.1), lerp(from.2, to.2))
}

/// Annotated correlation heat map; the first column is the top row.
pub fn heatmap(path: &Path, title: &str, matrix: &CorrelationMatrix) -> Result<(), PipelineError> {
    let root = open(path, (1000, 900))?;
    let n = matrix.columns.len();
    let rows: Vec<String> = matrix.columns.iter().rev().cloned().collect();

    let mut chart = ChartBuilder::on(&root)
        .caption(title, (FONT, 28))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(200)
        .build_cartesian_2d((0..n).into_segmented(), (0..n).into_segmented())?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n * 2 + 2)
        .y_labels(n * 2 + 2)
        .x_label_formatter(&|v| segment_label(&matrix.columns, v))
        .y_label_formatter(&|v| segment_label(&rows, v))
        .x_label_style((FONT, 12).into_font())
        .draw()?;

    let cells: Vec<(usize, usize, Option<f64>)> = (0..n)
        .flat_map(|r| (0..n).map(move |c| (r, c)))
        .map(|(r, c)| (r, c, matrix.values[r][c]))
        .collect();

    chart.draw_series(cells.iter().map(|&(r, c, v)| {
        let slot = n - 1 - r;
        let fill = v.map(diverging_color).unwrap_or(WHITE);
        let mut cell = Rectangle::new(
            [
                (SegmentValue::Exact(c), SegmentValue::Exact(slot)),
                (SegmentValue::Exact(c + 1), SegmentValue::Exact(slot + 1)),
            ],
            fill.filled(),
        );
        cell.set_margin(1, 1, 1, 1);
        cell
    }))?;

    let style = TextStyle::from((FONT, 16).into_font()).pos(Pos::new(HPos::Center, VPos::Center));
    chart.draw_series(cells.iter().map(|&(r, c, v)| {
        let text = v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "nan".to_string());
        Text::new(
            text,
            (SegmentValue::CenterOf(c), SegmentValue::CenterOf(n - 1 - r)),
            style.clone(),
        )
    }))?;

    root.present()?;
    Ok(())
}

/// Lines with circle markers, an optional shaded band drawn underneath, and a
/// legend when there is more than one named element.
pub fn line_chart(
    path: &Path,
    labels: Labels<'_>,
    lines: &[LineSpec],
    band: Option<&Band>,
) -> Result<(), PipelineError> {
    let root = open(path, CHART_SIZE)?;

    let band_points = band
        .map(|b| b.lower.iter().chain(&b.upper).copied().collect::<Vec<_>>())
        .unwrap_or_default();
    let all = lines
        .iter()
        .flat_map(|l| l.points.iter().copied())
        .chain(band_points);
    let (x_lo, x_hi, y_lo, y_hi) = all.fold(
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
        |(a, b, c, d), (x, y)| (a.min(x), b.max(x), c.min(y), d.max(y)),
    );

    let mut chart = ChartBuilder::on(&root)
        .caption(labels.title, (FONT, 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(padded(x_lo, x_hi, 0.03), padded(y_lo, y_hi, 0.08))?;

    chart
        .configure_mesh()
        .light_line_style(BLACK.mix(0.05).stroke_width(1))
        .x_label_formatter(&|x| format!("{x:.0}"))
        .x_desc(labels.x)
        .y_desc(labels.y)
        .draw()?;

    if let Some(b) = band {
        let mut outline = b.lower.clone();
        outline.extend(b.upper.iter().rev().copied());
        let color = b.color;
        chart
            .draw_series(std::iter::once(Polygon::new(outline, color.mix(0.2).filled())))?
            .label(b.label.clone())
            .legend(move |(x, y)| {
                Rectangle::new([(x, y - 5), (x + 20, y + 5)], color.mix(0.2).filled())
            });
    }

    for line in lines {
        let color = line.color;
        chart
            .draw_series(LineSeries::new(line.points.clone(), color.stroke_width(3)))?
            .label(line.label.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(3)));
        chart.draw_series(
            line.points
                .iter()
                .map(|&p| Circle::new(p, 5, color.filled())),
        )?;
    }

    if lines.len() + usize::from(band.is_some()) > 1 {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8).filled())
            .border_style(BLACK.stroke_width(1))
            .draw()?;
    }

    root.present()?;
    Ok(())
}

/// Semi-transparent scatter plot.
pub fn scatter(
    path: &Path,
    labels: Labels<'_>,
    points: &[(f64, f64)],
    color: RGBColor,
) -> Result<(), PipelineError> {
    let root = open(path, CHART_SIZE)?;
    let (x_lo, x_hi) = bounds(points.iter().map(|p| p.0));
    let (y_lo, y_hi) = bounds(points.iter().map(|p| p.1));

    let mut chart = ChartBuilder::on(&root)
        .caption(labels.title, (FONT, 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(padded(x_lo, x_hi, 0.03), padded(y_lo, y_hi, 0.05))?;

    chart
        .configure_mesh()
        .light_line_style(BLACK.mix(0.05).stroke_width(1))
        .x_desc(labels.x)
        .y_desc(labels.y)
        .draw()?;

    chart.draw_series(
        points
            .iter()
            .map(|&p| Circle::new(p, 3, color.mix(0.5).filled())),
    )?;

    root.present()?;
    Ok(())
}

/// Side-by-side panels: an equal-width histogram of `values`, and a box plot
/// per group (whiskers at 1.5 IQR, outliers as points).
pub fn histogram_and_boxplot(
    path: &Path,
    histogram: Labels<'_>,
    values: &[f64],
    bins: &[(f64, f64, usize)],
    boxes: Labels<'_>,
    groups: &[(String, Vec<f64>)],
) -> Result<(), PipelineError> {
    let root = open(path, WIDE_CHART_SIZE)?;
    let panels = root.split_evenly((1, 2));

    {
        let (lo, hi) = bounds(values.iter().copied());
        let max_count = bins.iter().map(|b| b.2).max().unwrap_or(0) as f64;
        let mut chart = ChartBuilder::on(&panels[0])
            .caption(histogram.title, (FONT, 22))
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(padded(lo, hi, 0.02), 0.0..(max_count * 1.1).max(1.0))?;
        chart
            .configure_mesh()
            .light_line_style(BLACK.mix(0.05).stroke_width(1))
            .x_desc(histogram.x)
            .y_desc(histogram.y)
            .draw()?;
        chart.draw_series(bins.iter().map(|&(start, end, count)| {
            Rectangle::new([(start, 0.0), (end, count as f64)], STEEL_BLUE.mix(0.7).filled())
        }))?;
        chart.draw_series(bins.iter().map(|&(start, end, count)| {
            Rectangle::new([(start, 0.0), (end, count as f64)], BLACK.stroke_width(1))
        }))?;
    }

    {
        let n = groups.len();
        let names: Vec<String> = groups.iter().map(|(name, _)| name.clone()).collect();
        let (lo, hi) = bounds(groups.iter().flat_map(|(_, v)| v.iter().copied()));
        let mut chart = ChartBuilder::on(&panels[1])
            .caption(boxes.title, (FONT, 22))
            .margin(15)
            .x_label_area_size(60)
            .y_label_area_size(60)
            .build_cartesian_2d((0..n).into_segmented(), padded(lo, hi, 0.05))?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(n * 2 + 2)
            .x_label_formatter(&|v| segment_label(&names, v))
            .x_label_style((FONT, 11).into_font())
            .x_desc(boxes.x)
            .y_desc(boxes.y)
            .draw()?;

        for (i, (_, group)) in groups.iter().enumerate() {
            let Some(summary) = BoxSummary::of(group) else {
                continue;
            };
            let mut body = Rectangle::new(
                [
                    (SegmentValue::Exact(i), summary.q1),
                    (SegmentValue::Exact(i + 1), summary.q3),
                ],
                STEEL_BLUE.mix(0.3).filled(),
            );
            body.set_margin(0, 0, 30, 30);
            let mut outline = Rectangle::new(
                [
                    (SegmentValue::Exact(i), summary.q1),
                    (SegmentValue::Exact(i + 1), summary.q3),
                ],
                BLACK.stroke_width(1),
            );
            outline.set_margin(0, 0, 30, 30);
            let mut median = Rectangle::new(
                [
                    (SegmentValue::Exact(i), summary.median),
                    (SegmentValue::Exact(i + 1), summary.median),
                ],
                CORAL.stroke_width(3),
            );
            median.set_margin(0, 0, 30, 30);
            chart.draw_series([body, outline, median])?;

            let center = SegmentValue::CenterOf(i);
            chart.draw_series([
                PathElement::new(
                    vec![(center.clone(), summary.low), (center.clone(), summary.q1)],
                    BLACK.stroke_width(1),
                ),
                PathElement::new(
                    vec![(center.clone(), summary.q3), (center.clone(), summary.high)],
                    BLACK.stroke_width(1),
                ),
            ])?;
            chart.draw_series(
                summary
                    .outliers
                    .iter()
                    .map(|&v| Circle::new((SegmentValue::CenterOf(i), v), 3, BLACK.stroke_width(1))),
            )?;
        }
    }

    root.present()?;
    Ok(())
}

/// Five-number summary used for one box of a box plot.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSummary {
    pub low: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub high: f64,
    pub outliers: Vec<f64>,
}

impl BoxSummary {
    /// Whiskers reach the most extreme values within 1.5 IQR of the box.
    pub fn of(values: &[f64]) -> Option<Self> {
        let q1 = quantile(values, 0.25)?;
        let median = quantile(values, 0.5)?;
        let q3 = quantile(values, 0.75)?;
        let iqr = q3 - q1;
        let (fence_lo, fence_hi) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
        let inside = values.iter().copied().filter(|v| *v >= fence_lo && *v <= fence_hi);
        let (low, high) = bounds(inside);
        let outliers = values
            .iter()
            .copied()
            .filter(|v| *v < fence_lo || *v > fence_hi)
            .collect();
        Some(Self {
            low: if low.is_finite() { low } else { q1 },
            q1,
            median,
            q3,
            high: if high.is_finite() { high } else { q3 },
            outliers,
        })
    }
}
