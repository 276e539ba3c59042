#![cfg(feature = "web")]
//! SVG charts of a user's results, drawn with plotters.

use std::ops::Range;
use std::str::FromStr;

use plotters::coord::ranged1d::SegmentValue;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use plotters::style::full_palette::LIGHTBLUE;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::error::ChartError;
use crate::metrics::MetricsEngine;
use crate::ml::{self, ClusterOptions};
use crate::record::Column;
use crate::table::CombinedTable;

/// Result type for chart rendering: the SVG document as a string.
pub type ChartResult = Result<String, ChartError>;

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for ChartError {
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        ChartError::Drawing(err.to_string())
    }
}

const HISTOGRAM_BINS: usize = 20;
const MAX_GRADE_POINT: f64 = 10.0;

/// Charts offered on the dashboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChartKind {
    SgpaTrend,
    SubjectPerformance,
    CaEseScatter,
    SemesterComparison,
    MarksHistogram,
    PerformanceCategories,
    Forecast,
    Clusters,
    Pca,
}

impl ChartKind {
    pub const ALL: [ChartKind; 9] = [
        ChartKind::SgpaTrend,
        ChartKind::SubjectPerformance,
        ChartKind::CaEseScatter,
        ChartKind::SemesterComparison,
        ChartKind::MarksHistogram,
        ChartKind::PerformanceCategories,
        ChartKind::Forecast,
        ChartKind::Clusters,
        ChartKind::Pca,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            ChartKind::SgpaTrend => "sgpa-trend",
            ChartKind::SubjectPerformance => "subject-performance",
            ChartKind::CaEseScatter => "ca-ese",
            ChartKind::SemesterComparison => "semester-comparison",
            ChartKind::MarksHistogram => "marks-histogram",
            ChartKind::PerformanceCategories => "categories",
            ChartKind::Forecast => "forecast",
            ChartKind::Clusters => "clusters",
            ChartKind::Pca => "pca",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ChartKind::SgpaTrend => "SGPA Trend Over Semesters",
            ChartKind::SubjectPerformance => "Average Performance by Subject",
            ChartKind::CaEseScatter => "CA vs ESE Performance",
            ChartKind::SemesterComparison => "Semester-wise SGPA Comparison",
            ChartKind::MarksHistogram => "Distribution of Total Marks",
            ChartKind::PerformanceCategories => "Performance Category Distribution",
            ChartKind::Forecast => "SGPA Prediction Using Linear Regression",
            ChartKind::Clusters => "Subject Performance Clusters",
            ChartKind::Pca => "PCA Analysis - Feature Importance",
        }
    }
}

impl FromStr for ChartKind {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChartKind::ALL
            .into_iter()
            .find(|kind| kind.slug() == s)
            .ok_or_else(|| ChartError::UnknownKind(s.to_string()))
    }
}

/// Size of the generated SVG
#[derive(Clone, Debug)]
pub struct ChartOptions {
    /// Width of the chart in pixels
    pub width: u32,

    /// Height of the chart in pixels
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 500,
        }
    }
}

/// Draws one chart for the given table
///
/// Tables without the data a chart needs produce a placeholder chart with a
/// short message. The clustering, PCA and forecast charts propagate the
/// analysis error instead, so callers can tell the user more data is needed.
///
/// # Arguments
/// * `kind` - Which chart to draw
/// * `table` - The user's combined rows
/// * `options` - Output dimensions
///
/// # Returns
/// * `ChartResult` - SVG markup or a chart error
///
/// # Examples
/// ```
/// use student_analytics::graph::{ChartKind, ChartOptions, render_chart};
/// use student_analytics::table::CombinedTable;
///
/// let table = CombinedTable::from_records(Vec::new());
/// let svg = render_chart(ChartKind::SgpaTrend, &table, &ChartOptions::default()).unwrap();
/// assert!(svg.contains("No SGPA data available"));
/// ```
pub fn render_chart(kind: ChartKind, table: &CombinedTable, options: &ChartOptions) -> ChartResult {
    let metrics = MetricsEngine::new(table);
    match kind {
        ChartKind::SgpaTrend | ChartKind::SemesterComparison => {
            let points = table.semester_grade_points();
            if points.is_empty() {
                return placeholder(kind.title(), "No SGPA data available", options);
            }
            let labels: Vec<String> = points
                .iter()
                .map(|p| crate::record::semester_label(&p.academic_year, &p.term))
                .collect();
            let values: Vec<f64> = points.iter().map(|p| p.sgpa).collect();
            if kind == ChartKind::SgpaTrend {
                sgpa_line(&labels, &values, options)
            } else {
                category_bars(kind.title(), "Semester", "SGPA", &labels, &values, options)
            }
        }
        ChartKind::SubjectPerformance => {
            let averages = metrics.subject_wise_average();
            if averages.is_empty() {
                return placeholder(kind.title(), "No subject data available", options);
            }
            let labels: Vec<String> = averages.iter().map(|a| a.subject.clone()).collect();
            let values: Vec<f64> = averages.iter().map(|a| a.total).collect();
            category_bars(kind.title(), "Subject", "Average Marks", &labels, &values, options)
        }
        ChartKind::CaEseScatter => {
            if table.is_empty() {
                return placeholder(kind.title(), "No CA/ESE data available", options);
            }
            let points: Vec<(f64, f64)> = table
                .column(Column::CaMarks)
                .into_iter()
                .zip(table.column(Column::EseMarks))
                .collect();
            scatter(kind.title(), &points, options)
        }
        ChartKind::MarksHistogram => {
            let totals = table.column(Column::Total);
            if totals.is_empty() {
                return placeholder(kind.title(), "No marks data available for histogram", options);
            }
            histogram(&totals, options)
        }
        ChartKind::PerformanceCategories => {
            let categories = metrics.performance_categories();
            if categories.total() == 0 {
                return placeholder(kind.title(), "No performance data available", options);
            }
            let entries = categories.entries();
            let labels: Vec<String> = entries.iter().map(|(name, _)| name.to_string()).collect();
            let values: Vec<f64> = entries.iter().map(|(_, n)| *n as f64).collect();
            category_bars(kind.title(), "Category", "Subjects", &labels, &values, options)
        }
        ChartKind::Forecast => forecast(table, options),
        ChartKind::Clusters => clusters(table, options),
        ChartKind::Pca => pca(table, options),
    }
}

fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if min > max {
        return 0.0..1.0;
    }
    let pad = if max > min { (max - min) * 0.1 } else { 1.0 };
    (min - pad)..(max + pad)
}

fn segment_label(labels: &[String], value: &SegmentValue<i32>) -> String {
    match value {
        SegmentValue::CenterOf(i) => labels.get(*i as usize).cloned().unwrap_or_default(),
        _ => String::new(),
    }
}

fn placeholder(title: &str, message: &str, options: &ChartOptions) -> ChartResult {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE)?;
        let root = root.titled(title, ("sans-serif", 26))?;
        let (w, h) = root.dim_in_pixel();
        let style = TextStyle::from(("sans-serif", 18).into_font())
            .pos(Pos::new(HPos::Center, VPos::Center));
        root.draw(&Text::new(message.to_string(), (w as i32 / 2, h as i32 / 2), style))?;
        root.present()?;
    }
    Ok(svg)
}

fn sgpa_line(labels: &[String], values: &[f64], options: &ChartOptions) -> ChartResult {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE)?;

        let n = labels.len() as i32;
        let mut chart = ChartBuilder::on(&root)
            .caption(ChartKind::SgpaTrend.title(), ("sans-serif", 26).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d((0..n).into_segmented(), 0.0..MAX_GRADE_POINT)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(labels.len())
            .x_label_formatter(&|v| segment_label(labels, v))
            .x_desc("Semester")
            .y_desc("SGPA")
            .draw()?;

        let points: Vec<(SegmentValue<i32>, f64)> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (SegmentValue::CenterOf(i as i32), *v))
            .collect();
        chart.draw_series(LineSeries::new(points.clone(), BLUE.stroke_width(3)))?;
        chart.draw_series(
            points
                .iter()
                .map(|(x, y)| Circle::new((x.clone(), *y), 5, BLUE.filled())),
        )?;

        root.present()?;
    }
    Ok(svg)
}

fn category_bars(
    title: &str,
    x_desc: &str,
    y_desc: &str,
    labels: &[String],
    values: &[f64],
    options: &ChartOptions,
) -> ChartResult {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE)?;

        let n = labels.len() as i32;
        let top = values.iter().copied().fold(0.0, f64::max);
        let top = if top > 0.0 { top * 1.15 } else { 1.0 };
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 26).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d((0..n).into_segmented(), 0.0..top)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(labels.len())
            .x_label_formatter(&|v| segment_label(labels, v))
            .x_desc(x_desc)
            .y_desc(y_desc)
            .draw()?;

        chart.draw_series(values.iter().enumerate().map(|(i, v)| {
            let i = i as i32;
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *v)],
                Palette99::pick(i as usize).filled(),
            );
            bar.set_margin(0, 0, 8, 8);
            bar
        }))?;

        chart.draw_series(values.iter().enumerate().map(|(i, v)| {
            Text::new(
                format!("{:.2}", v),
                (SegmentValue::CenterOf(i as i32), *v),
                TextStyle::from(("sans-serif", 13).into_font())
                    .pos(Pos::new(HPos::Center, VPos::Bottom)),
            )
        }))?;

        root.present()?;
    }
    Ok(svg)
}

fn scatter(title: &str, points: &[(f64, f64)], options: &ChartOptions) -> ChartResult {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 26).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(
                padded_range(points.iter().map(|p| p.0)),
                padded_range(points.iter().map(|p| p.1)),
            )?;

        chart
            .configure_mesh()
            .x_desc("CA Marks")
            .y_desc("ESE Marks")
            .draw()?;

        chart.draw_series(
            points
                .iter()
                .map(|&(x, y)| Circle::new((x, y), 5, GREEN.mix(0.8).filled())),
        )?;

        root.present()?;
    }
    Ok(svg)
}

fn histogram(totals: &[f64], options: &ChartOptions) -> ChartResult {
    let min = totals.iter().copied().fold(f64::MAX, f64::min);
    let max = totals.iter().copied().fold(f64::MIN, f64::max);
    let width = if max > min {
        (max - min) / HISTOGRAM_BINS as f64
    } else {
        1.0
    };

    let mut counts = vec![0usize; HISTOGRAM_BINS];
    for total in totals {
        let bin = (((total - min) / width) as usize).min(HISTOGRAM_BINS - 1);
        counts[bin] += 1;
    }
    let peak = counts.iter().copied().max().unwrap_or(0);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(ChartKind::MarksHistogram.title(), ("sans-serif", 26).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(
                min..(min + width * HISTOGRAM_BINS as f64),
                0.0..(peak as f64 + 1.0),
            )?;

        chart
            .configure_mesh()
            .x_desc("Total Marks")
            .y_desc("Frequency")
            .draw()?;

        chart.draw_series(counts.iter().enumerate().filter(|(_, n)| **n > 0).map(|(i, n)| {
            let left = min + width * i as f64;
            Rectangle::new(
                [(left, 0.0), (left + width, *n as f64)],
                LIGHTBLUE.filled(),
            )
        }))?;

        root.present()?;
    }
    Ok(svg)
}

fn forecast(table: &CombinedTable, options: &ChartOptions) -> ChartResult {
    let forecast = ml::forecast_grade_point(table)?;

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE)?;

        let x_range = padded_range(
            forecast
                .history
                .iter()
                .map(|p| p.term_number as f64)
                .chain(std::iter::once(forecast.next_term as f64)),
        );
        let mut chart = ChartBuilder::on(&root)
            .caption(ChartKind::Forecast.title(), ("sans-serif", 26).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(x_range, 0.0..MAX_GRADE_POINT)?;

        chart
            .configure_mesh()
            .x_desc("Semester")
            .y_desc("SGPA")
            .draw()?;

        let history: Vec<(f64, f64)> = forecast
            .history
            .iter()
            .map(|p| (p.term_number as f64, p.sgpa))
            .collect();
        chart
            .draw_series(LineSeries::new(history.clone(), BLUE.stroke_width(2)))?
            .label("Actual SGPA")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));
        chart.draw_series(history.iter().map(|&p| Circle::new(p, 5, BLUE.filled())))?;

        chart
            .draw_series(LineSeries::new(
                forecast
                    .fitted
                    .iter()
                    .map(|p| (p.term_number as f64, p.sgpa)),
                RED.stroke_width(2),
            ))?
            .label("Trend Line")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

        chart
            .draw_series(std::iter::once(Circle::new(
                (forecast.next_term as f64, forecast.predicted_sgpa),
                8,
                GREEN.filled(),
            )))?
            .label(format!("Predicted: {:.2}", forecast.predicted_sgpa))
            .legend(|(x, y)| Circle::new((x + 10, y), 5, GREEN.filled()));

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;

        root.present()?;
    }
    Ok(svg)
}

fn clusters(table: &CombinedTable, options: &ChartOptions) -> ChartResult {
    let result = ml::cluster_subjects(table, &ClusterOptions::default())?;

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(ChartKind::Clusters.title(), ("sans-serif", 26).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(
                padded_range(result.subjects.iter().map(|s| s.x)),
                padded_range(result.subjects.iter().map(|s| s.y)),
            )?;

        chart
            .configure_mesh()
            .x_desc(result.x_label.as_str())
            .y_desc(result.y_label.as_str())
            .draw()?;

        for summary in &result.clusters {
            let color = Palette99::pick(summary.cluster);
            let members = result.subjects.iter().filter(|s| s.cluster == summary.cluster);
            chart
                .draw_series(members.map(|s| {
                    EmptyElement::at((s.x, s.y))
                        + Circle::new((0, 0), 6, color.filled())
                        + Text::new(s.subject.clone(), (8, -8), ("sans-serif", 12).into_font())
                }))?
                .label(summary.label.clone())
                .legend(move |(x, y)| Circle::new((x + 10, y), 5, color.filled()));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;

        root.present()?;
    }
    Ok(svg)
}

fn pca(table: &CombinedTable, options: &ChartOptions) -> ChartResult {
    let result = ml::pca_analysis(table, &Column::MARKS)?;

    let xs = result
        .coordinates
        .iter()
        .map(|c| c.0)
        .chain(result.loadings.iter().map(|l| l.pc1))
        .chain(std::iter::once(0.0));
    let ys = result
        .coordinates
        .iter()
        .map(|c| c.1)
        .chain(result.loadings.iter().map(|l| l.pc2))
        .chain(std::iter::once(0.0));
    let x_range = padded_range(xs);
    let y_range = padded_range(ys);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(ChartKind::Pca.title(), ("sans-serif", 26).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(x_range, y_range)?;

        chart
            .configure_mesh()
            .x_desc(result.pc_label(0))
            .y_desc(result.pc_label(1))
            .draw()?;

        chart.draw_series(result.subjects.iter().zip(&result.coordinates).map(
            |(subject, &(x, y))| {
                EmptyElement::at((x, y))
                    + Circle::new((0, 0), 6, BLUE.mix(0.7).filled())
                    + Text::new(subject.clone(), (8, -8), ("sans-serif", 12).into_font())
            },
        ))?;

        for loading in &result.loadings {
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(0.0, 0.0), (loading.pc1, loading.pc2)],
                RED.stroke_width(2),
            )))?;
            chart.draw_series(std::iter::once(Text::new(
                loading.feature.clone(),
                (loading.pc1, loading.pc2),
                ("sans-serif", 13).into_font().color(&RED),
            )))?;
        }

        root.present()?;
    }
    Ok(svg)
}
