//! Predictive and exploratory analyses: subject clustering, grade-point
//! forecasting and principal component analysis.
//!
//! Unlike [`crate::metrics`], these operations have preconditions on the
//! amount of data and report a typed [`AnalyticsError`] when unmet.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::error::AnalyticsError;
use crate::record::Column;
use crate::stats::{self, LinearFit};
use crate::table::CombinedTable;

pub const CLUSTER_LABELS: [&str; 3] = ["High Performers", "Average Performers", "Needs Improvement"];

const KMEANS_SEED: u64 = 42;
const KMEANS_INITS: usize = 10;
const KMEANS_MAX_ITER: usize = 300;
const MIN_SUBJECTS: usize = 3;
const MIN_FEATURES: usize = 2;
const MIN_SEMESTERS: usize = 2;
const MAX_GRADE_POINT: f64 = 10.0;

/// How cluster indices are mapped onto [`CLUSTER_LABELS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ClusterLabeling {
    /// Clusters are ranked by mean Total, best first, before labelling.
    #[default]
    ByMeanTotal,
    /// Cluster index i gets label i, whatever its members' marks.
    Positional,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOptions {
    pub features: Vec<Column>,
    pub labeling: ClusterLabeling,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        ClusterOptions {
            features: Column::MARKS.to_vec(),
            labeling: ClusterLabeling::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClusteredSubject {
    pub subject: String,
    pub cluster: usize,
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub mean_total: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub label: String,
    pub subjects: Vec<String>,
    pub mean_total: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClusterResult {
    pub subjects: Vec<ClusteredSubject>,
    pub clusters: Vec<ClusterSummary>,
    pub x_label: String,
    pub y_label: String,
    /// True when coordinates are principal components rather than raw marks.
    pub projected: bool,
    pub inertia: f64,
}

impl ClusterResult {
    /// One line per cluster, e.g. `Cluster 1: Math, Physics (Avg: 81.5)`.
    pub fn describe(&self) -> Vec<String> {
        self.clusters
            .iter()
            .map(|c| {
                format!(
                    "Cluster {}: {} (Avg: {:.1})",
                    c.cluster + 1,
                    c.subjects.join(", "),
                    c.mean_total
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ForecastPoint {
    pub term_number: i64,
    pub sgpa: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Forecast {
    /// Observed grade points ordered by term number.
    pub history: Vec<ForecastPoint>,
    pub next_term: i64,
    /// Clamped to [0, 10].
    pub predicted_sgpa: f64,
    /// The fitted line over terms `1..=next_term`, unclamped.
    pub fitted: Vec<ForecastPoint>,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeatureLoading {
    pub feature: String,
    pub pc1: f64,
    pub pc2: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PcaResult {
    pub subjects: Vec<String>,
    /// (PC1, PC2) coordinates, one per subject.
    pub coordinates: Vec<(f64, f64)>,
    pub loadings: Vec<FeatureLoading>,
    /// Variance of every component, largest first.
    pub explained_variance: Vec<f64>,
    pub explained_variance_ratio: Vec<f64>,
}

impl PcaResult {
    pub fn pc_label(&self, index: usize) -> String {
        pc_label(&self.explained_variance_ratio, index)
    }
}

fn pc_label(ratios: &[f64], index: usize) -> String {
    let ratio = ratios.get(index).copied().unwrap_or(0.0);
    format!("PC{} ({:.1}% variance)", index + 1, ratio * 100.0)
}

// Per-subject mean of the selected features, subjects sorted by name.
struct SubjectFeatures {
    subjects: Vec<String>,
    features: Vec<Column>,
    values: Vec<Vec<f64>>,
    totals: Vec<f64>,
}

fn subject_features(
    table: &CombinedTable,
    features: &[Column],
) -> Result<SubjectFeatures, AnalyticsError> {
    if let Some(bad) = features.iter().find(|c| !Column::MARKS.contains(c)) {
        return Err(AnalyticsError::invalid(format!(
            "{} is not a mark column",
            bad.header()
        )));
    }
    let mut distinct = features.to_vec();
    distinct.sort();
    distinct.dedup();
    if distinct.len() != features.len() {
        return Err(AnalyticsError::invalid("Feature columns must be distinct"));
    }
    if features.len() < MIN_FEATURES {
        return Err(AnalyticsError::invalid(format!(
            "Need at least {} feature columns",
            MIN_FEATURES
        )));
    }

    let groups = table.subject_groups();
    if groups.len() < MIN_SUBJECTS {
        return Err(AnalyticsError::insufficient(format!(
            "Need at least {} subjects, found {}",
            MIN_SUBJECTS,
            groups.len()
        )));
    }

    let mut result = SubjectFeatures {
        subjects: Vec::with_capacity(groups.len()),
        features: features.to_vec(),
        values: Vec::with_capacity(groups.len()),
        totals: Vec::with_capacity(groups.len()),
    };
    for (subject, rows) in groups {
        let column_mean = |column: Column| {
            let values: Vec<f64> = rows.iter().filter_map(|r| r.value(column)).collect();
            stats::mean(&values).unwrap_or(0.0)
        };
        result.subjects.push(subject.to_string());
        result
            .values
            .push(features.iter().map(|c| column_mean(*c)).collect());
        result.totals.push(column_mean(Column::Total));
    }
    Ok(result)
}

/// Zero mean, unit population variance per column; constant columns are
/// only centred.
fn standardize(values: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let cols = values.first().map(|row| row.len()).unwrap_or(0);
    let mut scaled = values.to_vec();
    for j in 0..cols {
        let column: Vec<f64> = values.iter().map(|row| row[j]).collect();
        let mean = stats::mean(&column).unwrap_or(0.0);
        let std = stats::population_std(&column).unwrap_or(0.0);
        let scale = if std > 0.0 { std } else { 1.0 };
        for row in scaled.iter_mut() {
            row[j] = (row[j] - mean) / scale;
        }
    }
    scaled
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (index, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(point, centroid);
        if d < best.1 {
            best = (index, d);
        }
    }
    best
}

struct KMeansFit {
    assignments: Vec<usize>,
    inertia: f64,
}

fn kmeans_plus_plus(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[rng.gen_range(0..points.len())].clone()];
    while centroids.len() < k {
        let weights: Vec<f64> = points.iter().map(|p| nearest(p, &centroids).1).collect();
        let total: f64 = weights.iter().sum();

        let index = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = points.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                if target < *w {
                    chosen = i;
                    break;
                }
                target -= w;
            }
            chosen
        } else {
            rng.gen_range(0..points.len())
        };
        centroids.push(points[index].clone());
    }
    centroids
}

fn lloyd(points: &[Vec<f64>], mut centroids: Vec<Vec<f64>>) -> KMeansFit {
    let dims = points[0].len();
    let mut assignments = vec![usize::MAX; points.len()];

    for _ in 0..KMEANS_MAX_ITER {
        let mut changed = false;
        for (i, point) in points.iter().enumerate() {
            let (cluster, _) = nearest(point, &centroids);
            if assignments[i] != cluster {
                assignments[i] = cluster;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        for (c, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&Vec<f64>> = points
                .iter()
                .zip(&assignments)
                .filter(|(_, a)| **a == c)
                .map(|(p, _)| p)
                .collect();
            // An empty cluster keeps its previous centroid.
            if members.is_empty() {
                continue;
            }
            for d in 0..dims {
                centroid[d] = members.iter().map(|p| p[d]).sum::<f64>() / members.len() as f64;
            }
        }
    }

    let inertia = points
        .iter()
        .zip(&assignments)
        .map(|(p, a)| squared_distance(p, &centroids[*a]))
        .sum();
    KMeansFit {
        assignments,
        inertia,
    }
}

fn kmeans(points: &[Vec<f64>], k: usize) -> KMeansFit {
    let mut rng = StdRng::seed_from_u64(KMEANS_SEED);
    let mut best: Option<KMeansFit> = None;
    for run in 0..KMEANS_INITS {
        let fit = lloyd(points, kmeans_plus_plus(points, k, &mut rng));
        debug!("k-means run {} inertia {:.4}", run, fit.inertia);
        if best.as_ref().is_none_or(|b| fit.inertia < b.inertia) {
            best = Some(fit);
        }
    }
    // KMEANS_INITS > 0, so a fit always exists.
    best.unwrap_or(KMeansFit {
        assignments: vec![0; points.len()],
        inertia: 0.0,
    })
}

/// Group subjects by their performance profile.
///
/// # Arguments
/// * `table` - Combined results of one user
/// * `options` - Feature columns (at least two) and labelling policy
///
/// # Returns
/// * `Ok(ClusterResult)` - Subject assignments, cluster summaries and 2-D coordinates
/// * `Err(AnalyticsError::InvalidInput)` - Fewer than two distinct mark columns
/// * `Err(AnalyticsError::InsufficientData)` - Fewer than three subjects
pub fn cluster_subjects(
    table: &CombinedTable,
    options: &ClusterOptions,
) -> Result<ClusterResult, AnalyticsError> {
    let data = subject_features(table, &options.features)?;
    let scaled = standardize(&data.values);
    let k = MIN_SUBJECTS.min(data.subjects.len());
    let fit = kmeans(&scaled, k);

    let mean_total = |cluster: usize| {
        let totals: Vec<f64> = data
            .totals
            .iter()
            .zip(&fit.assignments)
            .filter(|(_, a)| **a == cluster)
            .map(|(t, _)| *t)
            .collect();
        stats::mean(&totals)
    };

    // rank[raw cluster] = reported cluster
    let rank: Vec<usize> = match options.labeling {
        ClusterLabeling::Positional => (0..k).collect(),
        ClusterLabeling::ByMeanTotal => {
            let mut order: Vec<usize> = (0..k).collect();
            let score = |c: usize| mean_total(c).unwrap_or(f64::NEG_INFINITY);
            order.sort_by(|a, b| score(*b).total_cmp(&score(*a)));
            let mut rank = vec![0; k];
            for (position, cluster) in order.into_iter().enumerate() {
                rank[cluster] = position;
            }
            rank
        }
    };

    let (coordinates, x_label, y_label, projected) = if data.features.len() > 2 {
        let pca = principal_components(&scaled);
        (
            pca.coordinates,
            pc_label(&pca.ratio, 0),
            pc_label(&pca.ratio, 1),
            true,
        )
    } else {
        (
            data.values.iter().map(|v| (v[0], v[1])).collect(),
            data.features[0].display_name().to_string(),
            data.features[1].display_name().to_string(),
            false,
        )
    };

    let subjects: Vec<ClusteredSubject> = data
        .subjects
        .iter()
        .enumerate()
        .map(|(i, subject)| {
            let cluster = rank[fit.assignments[i]];
            ClusteredSubject {
                subject: subject.clone(),
                cluster,
                label: CLUSTER_LABELS[cluster].to_string(),
                x: coordinates[i].0,
                y: coordinates[i].1,
                mean_total: data.totals[i],
            }
        })
        .collect();

    let mut clusters = Vec::new();
    for raw in 0..k {
        let members: Vec<String> = subjects
            .iter()
            .zip(&fit.assignments)
            .filter(|(_, a)| **a == raw)
            .map(|(s, _)| s.subject.clone())
            .collect();
        if let Some(mean) = mean_total(raw) {
            clusters.push(ClusterSummary {
                cluster: rank[raw],
                label: CLUSTER_LABELS[rank[raw]].to_string(),
                subjects: members,
                mean_total: mean,
            });
        }
    }
    clusters.sort_by_key(|c| c.cluster);

    Ok(ClusterResult {
        subjects,
        clusters,
        x_label,
        y_label,
        projected,
        inertia: fit.inertia,
    })
}

/// Fit a straight line through the per-semester grade points and forecast
/// the next term.
///
/// # Examples
/// ```
/// use student_analytics::ml::forecast_grade_point;
/// use student_analytics::record::{SemesterRecord, SubjectRow};
/// use student_analytics::table::CombinedTable;
///
/// let table = CombinedTable::from_records(vec![
///     SemesterRecord::create("2023-24", "Semester 1", vec![SubjectRow::create("A").with_sgpa(7.0)]),
///     SemesterRecord::create("2023-24", "Semester 2", vec![SubjectRow::create("B").with_sgpa(7.5)]),
/// ]);
/// let forecast = forecast_grade_point(&table).unwrap();
/// assert_eq!(forecast.next_term, 3);
/// assert!((forecast.predicted_sgpa - 8.0).abs() < 1e-9);
/// ```
pub fn forecast_grade_point(table: &CombinedTable) -> Result<Forecast, AnalyticsError> {
    let mut points = table.semester_grade_points();
    if points.len() < MIN_SEMESTERS {
        return Err(AnalyticsError::insufficient(format!(
            "Need at least {} semesters for prediction",
            MIN_SEMESTERS
        )));
    }
    points.sort_by_key(|p| p.term_number);

    let xs: Vec<f64> = points.iter().map(|p| p.term_number as f64).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.sgpa).collect();
    let fit = LinearFit::fit(&xs, &ys)
        .ok_or_else(|| AnalyticsError::insufficient("No grade points to fit"))?;

    let next_term = points.iter().map(|p| p.term_number).max().unwrap_or(0) + 1;
    let predicted_sgpa = fit.predict(next_term as f64).clamp(0.0, MAX_GRADE_POINT);

    Ok(Forecast {
        history: points
            .iter()
            .map(|p| ForecastPoint {
                term_number: p.term_number,
                sgpa: p.sgpa,
            })
            .collect(),
        next_term,
        predicted_sgpa,
        fitted: (1..=next_term)
            .map(|term| ForecastPoint {
                term_number: term,
                sgpa: fit.predict(term as f64),
            })
            .collect(),
        slope: fit.slope,
        intercept: fit.intercept,
        r_squared: fit.r_squared(&xs, &ys),
    })
}

struct Components {
    coordinates: Vec<(f64, f64)>,
    // vectors[c][j]: weight of feature j in component c
    vectors: Vec<Vec<f64>>,
    variance: Vec<f64>,
    ratio: Vec<f64>,
}

fn principal_components(scaled: &[Vec<f64>]) -> Components {
    let n = scaled.len();
    let p = scaled.first().map(|row| row.len()).unwrap_or(0);
    let denom = (n.max(2) - 1) as f64;

    let mut covariance = vec![vec![0.0; p]; p];
    for (i, row) in covariance.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = scaled.iter().map(|x| x[i] * x[j]).sum::<f64>() / denom;
        }
    }

    let (values, vectors) = jacobi_eigen(covariance);
    let mut order: Vec<usize> = (0..p).collect();
    order.sort_by(|a, b| values[*b].total_cmp(&values[*a]));

    let variance: Vec<f64> = order.iter().map(|c| values[*c].max(0.0)).collect();
    let total: f64 = variance.iter().sum();
    let ratio = variance
        .iter()
        .map(|v| if total > 0.0 { v / total } else { 0.0 })
        .collect();

    let components: Vec<Vec<f64>> = order
        .iter()
        .map(|c| {
            let mut component: Vec<f64> = (0..p).map(|j| vectors[j][*c]).collect();
            let pivot = component
                .iter()
                .copied()
                .fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
            if pivot < 0.0 {
                component.iter_mut().for_each(|v| *v = -*v);
            }
            component
        })
        .collect();

    let project = |x: &Vec<f64>, c: usize| -> f64 {
        components
            .get(c)
            .map(|comp| comp.iter().zip(x).map(|(w, v)| w * v).sum())
            .unwrap_or(0.0)
    };
    let coordinates = scaled.iter().map(|x| (project(x, 0), project(x, 1))).collect();

    Components {
        coordinates,
        vectors: components,
        variance,
        ratio,
    }
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
/// Returns eigenvalues and a matrix whose columns are the eigenvectors.
fn jacobi_eigen(mut a: Vec<Vec<f64>>) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = a.len();
    let mut v: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for _ in 0..100 {
        let off: f64 = (0..n)
            .flat_map(|i| (0..n).filter(move |j| *j != i).map(move |j| (i, j)))
            .map(|(i, j)| a[i][j].powi(2))
            .sum();
        if off < 1e-22 {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                if a[p][q].abs() < 1e-300 {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let (akp, akq) = (a[k][p], a[k][q]);
                    a[k][p] = c * akp - s * akq;
                    a[k][q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[p][k], a[q][k]);
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                for row in v.iter_mut() {
                    let (vkp, vkq) = (row[p], row[q]);
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    ((0..n).map(|i| a[i][i]).collect(), v)
}

/// Principal component analysis of the per-subject mark profile.
///
/// Loadings are the component weights scaled by the square root of the
/// component's variance. Preconditions match [`cluster_subjects`].
pub fn pca_analysis(table: &CombinedTable, features: &[Column]) -> Result<PcaResult, AnalyticsError> {
    let data = subject_features(table, features)?;
    let scaled = standardize(&data.values);
    let components = principal_components(&scaled);

    let loading = |c: usize, j: usize| {
        let weight = components.vectors.get(c).map(|v| v[j]).unwrap_or(0.0);
        let variance = components.variance.get(c).copied().unwrap_or(0.0);
        weight * variance.sqrt()
    };
    let loadings = data
        .features
        .iter()
        .enumerate()
        .map(|(j, feature)| FeatureLoading {
            feature: feature.display_name().to_string(),
            pc1: loading(0, j),
            pc2: loading(1, j),
        })
        .collect();

    Ok(PcaResult {
        subjects: data.subjects,
        coordinates: components.coordinates,
        loadings,
        explained_variance: components.variance,
        explained_variance_ratio: components.ratio,
    })
}
