use thiserror::Error;

use crate::models::{AccumulatorSnapshot, FacultyReport, Report, ReportOutcome, KEY_SEPARATOR};

pub const DEFAULT_RATING_SCALE_MAX: f64 = 5.0;

#[derive(Debug, Error, PartialEq)]
pub enum AggregationError {
    #[error("malformed faculty key: {0:?}")]
    MalformedKey(String),
    #[error("entry {key:?} has {actual} question sums, expected {expected}")]
    ShapeMismatch {
        key: String,
        expected: usize,
        actual: usize,
    },
}

/// Upper bound of the rating scale individual ratings are drawn from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingScale(f64);

impl RatingScale {
    pub fn new(max: f64) -> Option<Self> {
        (max.is_finite() && max > 0.0).then_some(Self(max))
    }

    pub fn max(self) -> f64 {
        self.0
    }

    pub fn to_percentage(self, average: f64) -> f64 {
        average / self.0 * 100.0
    }
}

impl Default for RatingScale {
    fn default() -> Self {
        Self(DEFAULT_RATING_SCALE_MAX)
    }
}

pub struct Aggregator {
    question_count: usize,
    scale: RatingScale,
}

impl Aggregator {
    pub fn new(question_count: usize, scale: RatingScale) -> Self {
        Self {
            question_count,
            scale,
        }
    }

    /// Turns running sums into per-question averages. Nothing is rounded here.
    pub fn compute_report(
        &self,
        snapshot: &AccumulatorSnapshot,
    ) -> Result<ReportOutcome, AggregationError> {
        if snapshot.total_submissions == 0 {
            tracing::debug!(
                entries = snapshot.entries.len(),
                "no submissions in accumulator"
            );
            return Ok(ReportOutcome::NoSubmissions);
        }

        let total = snapshot.total_submissions as f64;
        let mut faculties = Vec::with_capacity(snapshot.entries.len());

        for (key, sums) in &snapshot.entries {
            let (faculty_name, subject) = parse_faculty_key(key)?;

            if sums.len() != self.question_count {
                return Err(AggregationError::ShapeMismatch {
                    key: key.clone(),
                    expected: self.question_count,
                    actual: sums.len(),
                });
            }

            let question_averages: Vec<f64> = sums.iter().map(|sum| sum / total).collect();
            let overall_average = mean(&question_averages);

            faculties.push(FacultyReport {
                faculty_name,
                subject,
                question_averages,
                overall_average,
                percentage_score: self.scale.to_percentage(overall_average),
            });
        }

        tracing::debug!(
            faculties = faculties.len(),
            total_submissions = snapshot.total_submissions,
            "computed feedback report"
        );

        Ok(ReportOutcome::Ready(Report {
            total_submissions: snapshot.total_submissions,
            faculties,
        }))
    }
}

/// Splits `"<faculty> - <subject>"` on the first separator and drops a
/// trailing course code such as `"(CS201)"` from the subject.
pub fn parse_faculty_key(key: &str) -> Result<(String, String), AggregationError> {
    let malformed = || AggregationError::MalformedKey(key.to_string());

    let (faculty, subject) = key.split_once(KEY_SEPARATOR).ok_or_else(malformed)?;
    let faculty = faculty.trim();
    let subject = strip_course_code(subject);

    if faculty.is_empty() || subject.is_empty() {
        return Err(malformed());
    }

    Ok((faculty.to_string(), subject.to_string()))
}

/// Removes the bracket group that closes the subject, nested groups included.
/// A subject whose brackets do not balance is returned as is.
fn strip_course_code(subject: &str) -> &str {
    let subject = subject.trim();
    if !subject.ends_with(')') {
        return subject;
    }

    let mut depth = 0usize;
    for (idx, ch) in subject.char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    return subject[..idx].trim_end();
                }
            }
            _ => {}
        }
    }

    subject
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
