use std::collections::HashSet;
use std::io::Read;

use serde::Deserialize;
use thiserror::Error;

use crate::aggregate::RatingScale;
use crate::models::{AccumulatorSnapshot, FacultyAssignment, KEY_SEPARATOR};

/// One respondent's ratings, keyed by faculty key, one rating per question.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub form_id: String,
    pub source_key: String,
    pub respondent_name: String,
    pub roll_no: String,
    pub ratings: Vec<(String, Vec<u8>)>,
}

#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("{0:?} is not on the form's faculty roster")]
    UnknownFaculty(String),
    #[error("no ratings given for {0:?}")]
    MissingFaculty(String),
    #[error("{0:?} was rated more than once")]
    DuplicateFaculty(String),
    #[error("{key:?} has {actual} ratings, expected {expected}")]
    WrongQuestionCount {
        key: String,
        expected: usize,
        actual: usize,
    },
    #[error("rating {rating} for {key:?} is outside 1..={max}")]
    RatingOutOfRange { key: String, rating: u8, max: f64 },
    #[error("stored sums for {key:?} have {actual} slots, expected {expected}")]
    CorruptAccumulator {
        key: String,
        expected: usize,
        actual: usize,
    },
    #[error("invalid rating {value:?} in row {source_key}")]
    InvalidRating { source_key: String, value: String },
    #[error("rows for {source_key} name more than one respondent")]
    InconsistentRespondent { source_key: String },
}

/// Adds one submission to the running sums. Either every slot and the
/// counter move together or nothing changes.
pub fn fold_submission(
    snapshot: &mut AccumulatorSnapshot,
    roster: &[FacultyAssignment],
    submission: &Submission,
    question_count: usize,
    scale: RatingScale,
) -> Result<(), IngestError> {
    let roster_keys: Vec<String> = roster.iter().map(FacultyAssignment::key).collect();
    let mut seen = HashSet::new();

    for (key, ratings) in &submission.ratings {
        if !roster_keys.contains(key) {
            return Err(IngestError::UnknownFaculty(key.clone()));
        }
        if !seen.insert(key.as_str()) {
            return Err(IngestError::DuplicateFaculty(key.clone()));
        }
        if ratings.len() != question_count {
            return Err(IngestError::WrongQuestionCount {
                key: key.clone(),
                expected: question_count,
                actual: ratings.len(),
            });
        }
        if let Some(stored) = snapshot
            .entry(key)
            .filter(|sums| sums.len() != question_count)
        {
            return Err(IngestError::CorruptAccumulator {
                key: key.clone(),
                expected: question_count,
                actual: stored.len(),
            });
        }
        if let Some(rating) = ratings
            .iter()
            .copied()
            .find(|rating| *rating < 1 || f64::from(*rating) > scale.max())
        {
            return Err(IngestError::RatingOutOfRange {
                key: key.clone(),
                rating,
                max: scale.max(),
            });
        }
    }

    if let Some(missing) = roster_keys.iter().find(|key| !seen.contains(key.as_str())) {
        return Err(IngestError::MissingFaculty(missing.clone()));
    }

    // New faculty take their slot in roster order, not rating order.
    for key in &roster_keys {
        if snapshot.entry(key).is_none() {
            snapshot.entries.push((key.clone(), vec![0.0; question_count]));
        }
    }

    for (key, ratings) in &submission.ratings {
        let slot = snapshot
            .entries
            .iter_mut()
            .find(|(existing, _)| existing == key);
        if let Some((_, sums)) = slot {
            for (sum, rating) in sums.iter_mut().zip(ratings) {
                *sum += f64::from(*rating);
            }
        }
    }
    snapshot.total_submissions += 1;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    form_id: String,
    source_key: String,
    respondent_name: String,
    roll_no: String,
    faculty_name: String,
    subject: String,
    ratings: String,
}

/// Reads `form_id,source_key,respondent_name,roll_no,faculty_name,subject,ratings`
/// rows, where `ratings` is `|` separated, and groups them into submissions in
/// the order each `(form_id, source_key)` first appears. Every row of one
/// submission must name the same respondent.
pub fn submissions_from_csv<R: Read>(reader: R) -> anyhow::Result<Vec<Submission>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut submissions: Vec<Submission> = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let ratings = row
            .ratings
            .split('|')
            .map(|value| {
                value
                    .trim()
                    .parse::<u8>()
                    .map_err(|_| IngestError::InvalidRating {
                        source_key: row.source_key.clone(),
                        value: value.to_string(),
                    })
            })
            .collect::<Result<Vec<u8>, _>>()?;
        let key = format!(
            "{}{}{}",
            row.faculty_name.trim(),
            KEY_SEPARATOR,
            row.subject.trim()
        );
        let respondent_name = row.respondent_name.trim();
        let roll_no = row.roll_no.trim();

        let existing = submissions.iter_mut().find(|existing| {
            existing.form_id == row.form_id && existing.source_key == row.source_key
        });
        match existing {
            Some(existing) => {
                if existing.respondent_name != respondent_name || existing.roll_no != roll_no {
                    return Err(IngestError::InconsistentRespondent {
                        source_key: row.source_key,
                    }
                    .into());
                }
                existing.ratings.push((key, ratings));
            }
            None => submissions.push(Submission {
                respondent_name: respondent_name.to_string(),
                roll_no: roll_no.to_string(),
                form_id: row.form_id,
                source_key: row.source_key,
                ratings: vec![(key, ratings)],
            }),
        }
    }

    Ok(submissions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "form_id,source_key,respondent_name,roll_no,faculty_name,subject,ratings";

    fn roster() -> Vec<FacultyAssignment> {
        vec![
            FacultyAssignment {
                faculty_name: "A".to_string(),
                subject: "Math".to_string(),
            },
            FacultyAssignment {
                faculty_name: "B".to_string(),
                subject: "Chem".to_string(),
            },
        ]
    }

    fn submission(ratings: &[(&str, &[u8])]) -> Submission {
        Submission {
            form_id: "F1".to_string(),
            source_key: "s-1".to_string(),
            respondent_name: "Asha Patil".to_string(),
            roll_no: "21CS001".to_string(),
            ratings: ratings
                .iter()
                .map(|(key, r)| (key.to_string(), r.to_vec()))
                .collect(),
        }
    }

    #[test]
    fn folding_adds_sums_and_counts_once() {
        let mut snapshot = AccumulatorSnapshot::default();
        let scale = RatingScale::default();
        let first = submission(&[("B - Chem", &[3, 3]), ("A - Math", &[4, 5])]);
        let second = submission(&[("B - Chem", &[5, 1]), ("A - Math", &[4, 4])]);

        fold_submission(&mut snapshot, &roster(), &first, 2, scale).unwrap();
        fold_submission(&mut snapshot, &roster(), &second, 2, scale).unwrap();

        assert_eq!(snapshot.total_submissions, 2);
        assert_eq!(snapshot.entries[0], ("A - Math".to_string(), vec![8.0, 9.0]));
        assert_eq!(snapshot.entries[1], ("B - Chem".to_string(), vec![8.0, 4.0]));
    }

    #[test]
    fn rejected_submission_leaves_snapshot_untouched() {
        let mut snapshot = AccumulatorSnapshot {
            entries: vec![
                ("A - Math".to_string(), vec![4.0, 4.0]),
                ("B - Chem".to_string(), vec![3.0, 3.0]),
            ],
            total_submissions: 1,
        };
        let before = snapshot.clone();
        let scale = RatingScale::default();

        let out_of_range = submission(&[("A - Math", &[4, 6]), ("B - Chem", &[3, 3])]);
        assert!(matches!(
            fold_submission(&mut snapshot, &roster(), &out_of_range, 2, scale),
            Err(IngestError::RatingOutOfRange { rating: 6, .. })
        ));

        let missing = submission(&[("A - Math", &[4, 4])]);
        assert_eq!(
            fold_submission(&mut snapshot, &roster(), &missing, 2, scale),
            Err(IngestError::MissingFaculty("B - Chem".to_string()))
        );

        let unknown = submission(&[("A - Math", &[4, 4]), ("C - Bio", &[3, 3])]);
        assert_eq!(
            fold_submission(&mut snapshot, &roster(), &unknown, 2, scale),
            Err(IngestError::UnknownFaculty("C - Bio".to_string()))
        );

        let short = submission(&[("A - Math", &[4]), ("B - Chem", &[3, 3])]);
        assert!(matches!(
            fold_submission(&mut snapshot, &roster(), &short, 2, scale),
            Err(IngestError::WrongQuestionCount {
                expected: 2,
                actual: 1,
                ..
            })
        ));

        let mut corrupt = AccumulatorSnapshot {
            entries: vec![("A - Math".to_string(), vec![4.0, 4.0, 4.0])],
            total_submissions: 1,
        };
        let valid = submission(&[("A - Math", &[4, 4]), ("B - Chem", &[3, 3])]);
        assert!(matches!(
            fold_submission(&mut corrupt, &roster(), &valid, 2, scale),
            Err(IngestError::CorruptAccumulator {
                expected: 2,
                actual: 3,
                ..
            })
        ));
        assert_eq!(corrupt.total_submissions, 1);

        let zero = submission(&[("A - Math", &[0, 4]), ("B - Chem", &[3, 3])]);
        assert!(fold_submission(&mut snapshot, &roster(), &zero, 2, scale).is_err());

        assert_eq!(snapshot, before);
    }

    #[test]
    fn csv_rows_group_into_submissions() {
        let data = format!(
            "{HEADER}
F1,s-1,Asha Patil,21CS001,A,Math,4|5
F1,s-1,Asha Patil,21CS001,B,Chem,3|3
F1,s-2, Rohan Mehta ,21CS014,A,Math,5|5
F1,s-2,Rohan Mehta,21CS014,B,Chem,2|4
"
        );
        let submissions = submissions_from_csv(data.as_bytes()).unwrap();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].source_key, "s-1");
        assert_eq!(submissions[0].respondent_name, "Asha Patil");
        assert_eq!(submissions[0].roll_no, "21CS001");
        assert_eq!(
            submissions[0].ratings,
            vec![
                ("A - Math".to_string(), vec![4, 5]),
                ("B - Chem".to_string(), vec![3, 3]),
            ]
        );
        assert_eq!(submissions[1].respondent_name, "Rohan Mehta");
        assert_eq!(submissions[1].roll_no, "21CS014");
        assert_eq!(submissions[1].ratings[1], ("B - Chem".to_string(), vec![2, 4]));
    }

    #[test]
    fn csv_respondent_columns_may_be_blank() {
        let data = format!("{HEADER}\nF1,s-9,,,A,Math,4|4\n");
        let submissions = submissions_from_csv(data.as_bytes()).unwrap();
        assert_eq!(submissions[0].respondent_name, "");
        assert_eq!(submissions[0].roll_no, "");
    }

    #[test]
    fn csv_rejects_conflicting_respondents_for_one_submission() {
        let data = format!(
            "{HEADER}
F1,s-1,Asha Patil,21CS001,A,Math,4|5
F1,s-1,Asha Patil,21CS002,B,Chem,3|3
"
        );
        let err = submissions_from_csv(data.as_bytes()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<IngestError>(),
            Some(&IngestError::InconsistentRespondent {
                source_key: "s-1".to_string()
            })
        );
    }

    #[test]
    fn csv_without_respondent_columns_is_rejected() {
        let data = "form_id,source_key,faculty_name,subject,ratings\nF1,s-1,A,Math,4|5\n";
        assert!(submissions_from_csv(data.as_bytes()).is_err());
    }

    #[test]
    fn csv_rejects_non_numeric_ratings() {
        let data = format!("{HEADER}\nF1,s-1,Asha Patil,21CS001,A,Math,4|great\n");
        let err = submissions_from_csv(data.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("great"));
    }
}
