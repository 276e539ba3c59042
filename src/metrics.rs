//! Aggregate statistics over a user's combined results.
//!
//! Every operation here returns a plain value. Empty or degenerate input
//! produces the documented default (0.0, "N/A", an empty list) instead of an
//! error so the dashboard always renders.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::record::{Column, semester_label};
use crate::stats::{self, LinearFit};
use crate::table::{CombinedTable, SemesterGradePoint};

/// Totals at or above this are "High".
pub const HIGH_THRESHOLD: f64 = 75.0;
/// Totals at or above this (and below [`HIGH_THRESHOLD`]) are "Medium".
pub const MEDIUM_THRESHOLD: f64 = 50.0;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubjectAverage {
    pub subject: String,
    pub ca_marks: f64,
    pub ese_marks: f64,
    pub lab_marks: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SemesterPerformance {
    pub academic_year: String,
    pub term: String,
    pub total_subjects: usize,
    pub average_ca: f64,
    pub average_ese: f64,
    pub average_lab: f64,
    pub average_total: f64,
    pub sgpa: f64,
}

/// Descriptive statistics of one mark column.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct PerformanceCategories {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl PerformanceCategories {
    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }

    /// (label, count) pairs in display order.
    pub fn entries(&self) -> [(&'static str, usize); 3] {
        [
            ("High", self.high),
            ("Medium", self.medium),
            ("Low", self.low),
        ]
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Declining => "declining",
            TrendDirection::Stable => "stable",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrendAnalysis {
    pub sgpa_values: Vec<f64>,
    pub recent_trend: TrendDirection,
    pub overall_trend: TrendDirection,
    pub best_sgpa: f64,
    pub worst_sgpa: f64,
    pub average_sgpa: f64,
}

/// Qualitative observations about how a student performs.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct PerformancePatterns {
    pub assessment_pattern: Option<String>,
    pub consistency: Option<String>,
    pub trend: Option<String>,
}

/// Headline numbers shown at the top of the dashboard.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DashboardSummary {
    pub average_sgpa: f64,
    pub cgpa: f64,
    pub best_semester: String,
    pub worst_semester: String,
    pub total_subjects: usize,
    pub total_semesters: usize,
}

/// Read-only analytics over a [`CombinedTable`].
///
/// # Examples
/// ```
/// use student_analytics::metrics::MetricsEngine;
/// use student_analytics::record::{SemesterRecord, SubjectRow};
/// use student_analytics::table::CombinedTable;
///
/// let table = CombinedTable::from_records(vec![SemesterRecord::create(
///     "2024-25",
///     "Semester 1",
///     vec![SubjectRow::create("Math").with_marks(20.0, 50.0, 0.0, 70.0).with_sgpa(7.5)],
/// )]);
/// let metrics = MetricsEngine::new(&table);
/// assert_eq!(metrics.average_grade_point(), 7.5);
/// assert_eq!(metrics.best_semester(), "2024-25 - Semester 1");
/// ```
pub struct MetricsEngine<'a> {
    table: &'a CombinedTable,
}

impl<'a> MetricsEngine<'a> {
    pub fn new(table: &'a CombinedTable) -> Self {
        MetricsEngine { table }
    }

    // Semester grade points that count: values <= 0 mean "not recorded".
    fn valid_grade_points(&self) -> Vec<SemesterGradePoint> {
        self.table
            .semester_grade_points()
            .into_iter()
            .filter(|point| point.sgpa > 0.0)
            .collect()
    }

    /// Mean of the per-semester grade points above zero, or 0.0.
    pub fn average_grade_point(&self) -> f64 {
        let values: Vec<f64> = self.valid_grade_points().iter().map(|p| p.sgpa).collect();
        stats::mean(&values).unwrap_or(0.0)
    }

    /// Unweighted, so identical to [`Self::average_grade_point`].
    pub fn cgpa(&self) -> f64 {
        self.average_grade_point()
    }

    /// Semester with the highest grade point, or "N/A".
    pub fn best_semester(&self) -> String {
        self.select_semester(|candidate, current| candidate > current)
    }

    /// Semester with the lowest grade point, or "N/A".
    pub fn worst_semester(&self) -> String {
        self.select_semester(|candidate, current| candidate < current)
    }

    // Candidates arrive in (year, term) order and only a strict improvement
    // replaces the current pick, so ties keep the first key.
    fn select_semester(&self, better: impl Fn(f64, f64) -> bool) -> String {
        let mut chosen: Option<SemesterGradePoint> = None;
        for point in self.valid_grade_points() {
            let replace = match &chosen {
                Some(current) => better(point.sgpa, current.sgpa),
                None => true,
            };
            if replace {
                chosen = Some(point);
            }
        }

        chosen
            .map(|p| semester_label(&p.academic_year, &p.term))
            .unwrap_or_else(|| "N/A".to_string())
    }

    /// Number of distinct subject names.
    pub fn total_subjects(&self) -> usize {
        self.table
            .rows()
            .iter()
            .map(|r| r.row.subject.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Mean marks per subject, rounded to two decimals and sorted by name.
    pub fn subject_wise_average(&self) -> Vec<SubjectAverage> {
        self.table
            .subject_groups()
            .into_iter()
            .map(|(subject, rows)| {
                let avg = |column: Column| {
                    let values: Vec<f64> = rows.iter().filter_map(|r| r.value(column)).collect();
                    stats::round2(stats::mean(&values).unwrap_or(0.0))
                };
                SubjectAverage {
                    subject: subject.to_string(),
                    ca_marks: avg(Column::CaMarks),
                    ese_marks: avg(Column::EseMarks),
                    lab_marks: avg(Column::LabMarks),
                    total: avg(Column::Total),
                }
            })
            .collect()
    }

    /// One summary per stored semester, in store order.
    pub fn semester_wise_performance(&self) -> Vec<SemesterPerformance> {
        if self.table.is_empty() {
            return Vec::new();
        }

        self.table
            .records()
            .iter()
            .map(|record| {
                let avg = |column: Column| {
                    let values: Vec<f64> = record
                        .rows
                        .iter()
                        .filter_map(|r| r.value(column))
                        .collect();
                    stats::mean(&values).unwrap_or(0.0)
                };
                SemesterPerformance {
                    academic_year: record.academic_year.clone(),
                    term: record.term.clone(),
                    total_subjects: record.rows.len(),
                    average_ca: avg(Column::CaMarks),
                    average_ese: avg(Column::EseMarks),
                    average_lab: avg(Column::LabMarks),
                    average_total: avg(Column::Total),
                    sgpa: record.sgpa(),
                }
            })
            .collect()
    }

    /// count, mean, std, min, quartiles and max of each mark column.
    pub fn statistical_summary(&self) -> Vec<ColumnSummary> {
        if self.table.is_empty() {
            return Vec::new();
        }

        Column::MARKS
            .iter()
            .map(|&column| {
                let values = self.table.column(column);
                let q = |p: f64| stats::round2(stats::quantile(&values, p).unwrap_or(0.0));
                ColumnSummary {
                    column: column.header().to_string(),
                    count: values.len(),
                    mean: stats::round2(stats::mean(&values).unwrap_or(0.0)),
                    std: stats::round2(stats::sample_std(&values).unwrap_or(0.0)),
                    min: q(0.0),
                    q25: q(0.25),
                    median: q(0.5),
                    q75: q(0.75),
                    max: q(1.0),
                }
            })
            .collect()
    }

    /// Bucket every row by Total.
    pub fn performance_categories(&self) -> PerformanceCategories {
        let mut categories = PerformanceCategories::default();
        for total in self.table.column(Column::Total) {
            if total >= HIGH_THRESHOLD {
                categories.high += 1;
            } else if total >= MEDIUM_THRESHOLD {
                categories.medium += 1;
            } else {
                categories.low += 1;
            }
        }
        categories
    }

    /// Pearson correlation between CA and ESE marks; 0.0 when undefined.
    pub fn ca_ese_correlation(&self) -> f64 {
        let ca = self.table.column(Column::CaMarks);
        let ese = self.table.column(Column::EseMarks);
        stats::pearson(&ca, &ese).unwrap_or(0.0)
    }

    /// Short, ordered list of study suggestions.
    ///
    /// Heuristics run in a fixed order: assessment balance, weak subjects
    /// (up to three below the mean subject Total), then grade-point tier.
    pub fn improvement_suggestions(&self) -> Vec<String> {
        if self.table.is_empty() {
            return vec!["Upload more data to get personalized suggestions".to_string()];
        }

        let mut suggestions = Vec::new();

        let avg_ca = stats::mean(&self.table.column(Column::CaMarks)).unwrap_or(0.0);
        let avg_ese = stats::mean(&self.table.column(Column::EseMarks)).unwrap_or(0.0);
        if avg_ca < avg_ese {
            suggestions.push(
                "Focus on continuous assessment - your ESE performance is better than CA"
                    .to_string(),
            );
        } else if avg_ese < avg_ca {
            suggestions.push(
                "Prepare more for end semester exams - your CA performance is strong".to_string(),
            );
        }

        let subject_avg = self.subject_wise_average();
        let totals: Vec<f64> = subject_avg.iter().map(|s| s.total).collect();
        if let Some(mean_total) = stats::mean(&totals) {
            let weak: Vec<&str> = subject_avg
                .iter()
                .filter(|s| s.total < mean_total)
                .take(3)
                .map(|s| s.subject.as_str())
                .collect();
            if !weak.is_empty() {
                suggestions.push(format!("Focus on improving: {}", weak.join(", ")));
            }
        }

        let avg_sgpa = self.average_grade_point();
        if avg_sgpa > 0.0 {
            if avg_sgpa < 6.0 {
                suggestions.push("Consider studying strategies to improve overall SGPA".to_string());
            } else if avg_sgpa >= 8.0 {
                suggestions.push(
                    "Excellent performance! Maintain consistency across all subjects".to_string(),
                );
            }
        }

        if suggestions.is_empty() {
            suggestions.push(
                "Keep up the good work! Continue consistent performance across all subjects"
                    .to_string(),
            );
        }
        suggestions
    }

    /// Grade-point trajectory ordered by term number; `None` for no data.
    pub fn trend_analysis(&self) -> Option<TrendAnalysis> {
        let mut semesters = self.semester_wise_performance();
        if semesters.is_empty() {
            return None;
        }
        semesters.sort_by_key(|s| crate::record::term_number(&s.term));

        let values: Vec<f64> = semesters.iter().map(|s| s.sgpa).collect();
        let direction = |later: f64, earlier: f64| {
            if later > earlier {
                TrendDirection::Improving
            } else {
                TrendDirection::Declining
            }
        };

        let (recent_trend, overall_trend) = match values.as_slice() {
            [first, .., previous, last] => (direction(*last, *previous), direction(*last, *first)),
            [first, last] => (direction(*last, *first), direction(*last, *first)),
            _ => (TrendDirection::Stable, TrendDirection::Stable),
        };

        Some(TrendAnalysis {
            best_sgpa: values.iter().copied().fold(f64::MIN, f64::max),
            worst_sgpa: values.iter().copied().fold(f64::MAX, f64::min),
            average_sgpa: stats::mean(&values).unwrap_or(0.0),
            sgpa_values: values,
            recent_trend,
            overall_trend,
        })
    }

    /// Assessment balance, consistency of totals and the grade-point slope.
    pub fn performance_patterns(&self) -> PerformancePatterns {
        if self.table.is_empty() {
            return PerformancePatterns::default();
        }

        let ca = stats::mean(&self.table.column(Column::CaMarks)).unwrap_or(0.0);
        let ese = stats::mean(&self.table.column(Column::EseMarks)).unwrap_or(0.0);
        let assessment = if ca > ese * 1.1 {
            "Strong in continuous assessment"
        } else if ese > ca * 1.1 {
            "Better at end-semester exams"
        } else {
            "Balanced performance"
        };

        let totals = self.table.column(Column::Total);
        let total_mean = stats::mean(&totals).unwrap_or(0.0);
        let total_std = stats::sample_std(&totals).unwrap_or(0.0);
        let cv = if total_mean > 0.0 { total_std / total_mean } else { 0.0 };
        let consistency = if cv < 0.15 {
            "Very consistent performance"
        } else if cv < 0.25 {
            "Moderately consistent"
        } else {
            "Variable performance across subjects"
        };

        // First grade point per term number, ascending.
        let mut by_term: BTreeMap<i64, f64> = BTreeMap::new();
        for r in self.table.rows() {
            by_term.entry(r.term_number).or_insert(r.row.sgpa);
        }
        let trend = if by_term.len() >= 2 {
            let xs: Vec<f64> = by_term.keys().map(|k| *k as f64).collect();
            let ys: Vec<f64> = by_term.values().copied().collect();
            LinearFit::fit(&xs, &ys).map(|fit| {
                if fit.slope > 0.1 {
                    "Improving over time"
                } else if fit.slope < -0.1 {
                    "Declining trend"
                } else {
                    "Stable performance"
                }
                .to_string()
            })
        } else {
            None
        };

        PerformancePatterns {
            assessment_pattern: Some(assessment.to_string()),
            consistency: Some(consistency.to_string()),
            trend,
        }
    }

    /// Headline numbers for the dashboard.
    pub fn summary(&self) -> DashboardSummary {
        DashboardSummary {
            average_sgpa: self.average_grade_point(),
            cgpa: self.cgpa(),
            best_semester: self.best_semester(),
            worst_semester: self.worst_semester(),
            total_subjects: self.total_subjects(),
            total_semesters: self.table.records().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{SemesterRecord, SubjectRow};

    fn worked_example() -> CombinedTable {
        CombinedTable::from_records(vec![
            SemesterRecord::create(
                "2024-25",
                "Semester 1",
                vec![
                    SubjectRow::create("Math")
                        .with_marks(20.0, 50.0, 0.0, 70.0)
                        .with_sgpa(7.5),
                    SubjectRow::create("Phys")
                        .with_marks(10.0, 40.0, 0.0, 50.0)
                        .with_sgpa(7.5),
                ],
            ),
            SemesterRecord::create("2024-25", "Semester 2", vec![
                SubjectRow::create("Chem").with_sgpa(8.5),
            ]),
        ])
    }

    fn totals_table(totals: &[f64]) -> CombinedTable {
        let rows = totals
            .iter()
            .enumerate()
            .map(|(i, t)| SubjectRow::create(&format!("S{}", i)).with_marks(0.0, 0.0, 0.0, *t))
            .collect();
        CombinedTable::from_records(vec![SemesterRecord::create("2024-25", "Semester 1", rows)])
    }

    #[test]
    fn test_worked_example() {
        let table = worked_example();
        let metrics = MetricsEngine::new(&table);
        assert_eq!(metrics.average_grade_point(), 8.0);
        assert_eq!(metrics.cgpa(), 8.0);
        assert_eq!(metrics.best_semester(), "2024-25 - Semester 2");
        assert_eq!(metrics.worst_semester(), "2024-25 - Semester 1");

        let first_semester = CombinedTable::from_records(vec![table.records()[0].clone()]);
        assert_eq!(
            MetricsEngine::new(&first_semester).performance_categories(),
            PerformanceCategories {
                high: 0,
                medium: 2,
                low: 0
            }
        );
    }

    #[test]
    fn test_category_boundaries() {
        let table = totals_table(&[75.0, 74.9, 50.0, 49.9]);
        let categories = MetricsEngine::new(&table).performance_categories();
        assert_eq!(categories.high, 1);
        assert_eq!(categories.medium, 2);
        assert_eq!(categories.low, 1);
        assert_eq!(categories.total(), 4);
    }

    #[test]
    fn test_empty_table_defaults() {
        let table = CombinedTable::default();
        let metrics = MetricsEngine::new(&table);
        assert_eq!(metrics.average_grade_point(), 0.0);
        assert_eq!(metrics.best_semester(), "N/A");
        assert_eq!(metrics.worst_semester(), "N/A");
        assert_eq!(metrics.total_subjects(), 0);
        assert!(metrics.subject_wise_average().is_empty());
        assert!(metrics.semester_wise_performance().is_empty());
        assert!(metrics.statistical_summary().is_empty());
        assert_eq!(metrics.ca_ese_correlation(), 0.0);
        assert_eq!(metrics.trend_analysis(), None);
        assert_eq!(
            metrics.improvement_suggestions(),
            vec!["Upload more data to get personalized suggestions"]
        );
    }

    #[test]
    fn test_zero_grade_points_are_ignored() {
        let table = CombinedTable::from_records(vec![
            SemesterRecord::create("2023-24", "Semester 1", vec![SubjectRow::create("A")]),
            SemesterRecord::create("2023-24", "Semester 2", vec![
                SubjectRow::create("B").with_sgpa(6.0),
            ]),
        ]);
        let metrics = MetricsEngine::new(&table);
        assert_eq!(metrics.average_grade_point(), 6.0);
        assert_eq!(metrics.worst_semester(), "2023-24 - Semester 2");

        let all_zero = totals_table(&[60.0]);
        assert_eq!(MetricsEngine::new(&all_zero).average_grade_point(), 0.0);
        assert_eq!(MetricsEngine::new(&all_zero).best_semester(), "N/A");
    }

    #[test]
    fn test_ties_resolve_to_first_key() {
        let table = CombinedTable::from_records(vec![
            SemesterRecord::create("2024-25", "Semester 2", vec![
                SubjectRow::create("A").with_sgpa(8.0),
            ]),
            SemesterRecord::create("2023-24", "Semester 1", vec![
                SubjectRow::create("B").with_sgpa(8.0),
            ]),
        ]);
        let metrics = MetricsEngine::new(&table);
        assert_eq!(metrics.best_semester(), "2023-24 - Semester 1");
        assert_eq!(metrics.worst_semester(), "2023-24 - Semester 1");
    }

    #[test]
    fn test_subject_wise_average_rounds() {
        let table = CombinedTable::from_records(vec![
            SemesterRecord::create("2023-24", "Semester 1", vec![
                SubjectRow::create("Math").with_marks(10.0, 0.0, 0.0, 70.0),
            ]),
            SemesterRecord::create("2023-24", "Semester 2", vec![
                SubjectRow::create("Math").with_marks(11.0, 0.0, 0.0, 71.0),
                SubjectRow::create("Math").with_marks(11.0, 0.0, 0.0, 71.0),
                SubjectRow::create("Art").with_marks(5.0, 5.0, 5.0, 15.0),
            ]),
        ]);
        let averages = MetricsEngine::new(&table).subject_wise_average();
        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].subject, "Art");
        assert_eq!(averages[1].ca_marks, 10.67);
        assert_eq!(averages[1].total, 70.67);
        assert_eq!(MetricsEngine::new(&table).total_subjects(), 2);
    }

    #[test]
    fn test_statistical_summary() {
        let table = totals_table(&[40.0, 60.0, 80.0, 100.0]);
        let summary = MetricsEngine::new(&table).statistical_summary();
        assert_eq!(summary.len(), 4);
        let total = summary.iter().find(|s| s.column == "Total").unwrap();
        assert_eq!(total.count, 4);
        assert_eq!(total.mean, 70.0);
        assert_eq!(total.std, 25.82);
        assert_eq!(total.q25, 55.0);
        assert_eq!(total.median, 70.0);
        assert_eq!(total.q75, 85.0);
        assert_eq!((total.min, total.max), (40.0, 100.0));

        let single = totals_table(&[55.0]);
        let summary = MetricsEngine::new(&single).statistical_summary();
        assert_eq!(summary[3].std, 0.0);
    }

    #[test]
    fn test_semester_wise_performance() {
        let table = worked_example();
        let semesters = MetricsEngine::new(&table).semester_wise_performance();
        assert_eq!(semesters.len(), 2);
        assert_eq!(semesters[0].total_subjects, 2);
        assert_eq!(semesters[0].average_total, 60.0);
        assert_eq!(semesters[0].average_ca, 15.0);
        assert_eq!(semesters[1].sgpa, 8.5);
    }

    #[test]
    fn test_correlation() {
        let table = CombinedTable::from_records(vec![SemesterRecord::create(
            "2023-24",
            "Semester 1",
            vec![
                SubjectRow::create("A").with_marks(10.0, 20.0, 0.0, 30.0),
                SubjectRow::create("B").with_marks(20.0, 40.0, 0.0, 60.0),
                SubjectRow::create("C").with_marks(30.0, 60.0, 0.0, 90.0),
            ],
        )]);
        let r = MetricsEngine::new(&table).ca_ese_correlation();
        assert!((r - 1.0).abs() < 1e-9);

        let flat = totals_table(&[10.0, 20.0]);
        assert_eq!(MetricsEngine::new(&flat).ca_ese_correlation(), 0.0);
    }

    #[test]
    fn test_improvement_suggestions_order() {
        let table = worked_example();
        let suggestions = MetricsEngine::new(&table).improvement_suggestions();
        assert_eq!(
            suggestions,
            vec![
                "Focus on continuous assessment - your ESE performance is better than CA",
                "Focus on improving: Chem",
                "Excellent performance! Maintain consistency across all subjects",
            ]
        );
    }

    #[test]
    fn test_weak_subjects_limited_to_three() {
        let table = CombinedTable::from_records(vec![SemesterRecord::create(
            "2023-24",
            "Semester 1",
            vec![
                SubjectRow::create("A").with_marks(5.0, 5.0, 0.0, 10.0).with_sgpa(5.0),
                SubjectRow::create("B").with_marks(5.0, 5.0, 0.0, 10.0),
                SubjectRow::create("C").with_marks(5.0, 5.0, 0.0, 10.0),
                SubjectRow::create("D").with_marks(5.0, 5.0, 0.0, 10.0),
                SubjectRow::create("E").with_marks(5.0, 5.0, 0.0, 100.0),
            ],
        )]);
        let suggestions = MetricsEngine::new(&table).improvement_suggestions();
        assert_eq!(
            suggestions,
            vec![
                "Focus on improving: A, B, C",
                "Consider studying strategies to improve overall SGPA",
            ]
        );
    }

    #[test]
    fn test_generic_encouragement() {
        let table = CombinedTable::from_records(vec![SemesterRecord::create(
            "2023-24",
            "Semester 1",
            vec![SubjectRow::create("A")
                .with_marks(10.0, 10.0, 0.0, 20.0)
                .with_sgpa(7.0)],
        )]);
        assert_eq!(
            MetricsEngine::new(&table).improvement_suggestions(),
            vec!["Keep up the good work! Continue consistent performance across all subjects"]
        );
    }

    #[test]
    fn test_trend_analysis() {
        let table = CombinedTable::from_records(vec![
            SemesterRecord::create("2024-25", "Semester 3", vec![
                SubjectRow::create("A").with_sgpa(7.0),
            ]),
            SemesterRecord::create("2023-24", "Semester 1", vec![
                SubjectRow::create("B").with_sgpa(6.0),
            ]),
            SemesterRecord::create("2023-24", "Semester 2", vec![
                SubjectRow::create("C").with_sgpa(8.0),
            ]),
        ]);
        let trend = MetricsEngine::new(&table).trend_analysis().unwrap();
        assert_eq!(trend.sgpa_values, vec![6.0, 8.0, 7.0]);
        assert_eq!(trend.recent_trend, TrendDirection::Declining);
        assert_eq!(trend.overall_trend, TrendDirection::Improving);
        assert_eq!((trend.worst_sgpa, trend.best_sgpa), (6.0, 8.0));
        assert_eq!(trend.average_sgpa, 7.0);
    }

    #[test]
    fn test_trend_ties_decline_and_single_point_is_stable() {
        let table = CombinedTable::from_records(vec![
            SemesterRecord::create("2023-24", "Semester 1", vec![
                SubjectRow::create("A").with_sgpa(7.0),
            ]),
            SemesterRecord::create("2023-24", "Semester 2", vec![
                SubjectRow::create("B").with_sgpa(7.0),
            ]),
        ]);
        let trend = MetricsEngine::new(&table).trend_analysis().unwrap();
        assert_eq!(trend.recent_trend, TrendDirection::Declining);
        assert_eq!(trend.overall_trend, TrendDirection::Declining);

        let single = totals_table(&[60.0]);
        let trend = MetricsEngine::new(&single).trend_analysis().unwrap();
        assert_eq!(trend.recent_trend, TrendDirection::Stable);
        assert_eq!(trend.sgpa_values, vec![0.0]);
    }

    #[test]
    fn test_performance_patterns() {
        let table = CombinedTable::from_records(vec![
            SemesterRecord::create("2023-24", "Semester 1", vec![
                SubjectRow::create("A")
                    .with_marks(30.0, 40.0, 0.0, 70.0)
                    .with_sgpa(6.0),
            ]),
            SemesterRecord::create("2023-24", "Semester 2", vec![
                SubjectRow::create("B")
                    .with_marks(30.0, 42.0, 0.0, 72.0)
                    .with_sgpa(7.0),
            ]),
        ]);
        let patterns = MetricsEngine::new(&table).performance_patterns();
        assert_eq!(
            patterns.assessment_pattern.as_deref(),
            Some("Better at end-semester exams")
        );
        assert_eq!(
            patterns.consistency.as_deref(),
            Some("Very consistent performance")
        );
        assert_eq!(patterns.trend.as_deref(), Some("Improving over time"));

        let single = totals_table(&[60.0]);
        let patterns = MetricsEngine::new(&single).performance_patterns();
        assert_eq!(patterns.trend, None);
        assert_eq!(patterns.assessment_pattern.as_deref(), Some("Balanced performance"));
    }
}
