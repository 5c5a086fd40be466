use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::aggregate::RatingScale;
use crate::cache::{FetchError, FormFetcher};
use crate::ingest::{fold_submission, IngestError, Submission};
use crate::models::{
    AccumulatorSnapshot, FacultyAssignment, FormListing, FormPayload, FormType, SubmissionRecord,
};
use crate::templates::QuestionTemplate;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub const SEED_FORM_ID: &str = "seed-se-cse-ds-theory";

pub async fn seed(pool: &PgPool, scale: RatingScale) -> anyhow::Result<()> {
    let faculties = vec![
        FacultyAssignment {
            faculty_name: "Dr. Rao".to_string(),
            subject: "Data Structures (CS201)".to_string(),
        },
        FacultyAssignment {
            faculty_name: "Prof. Iyer".to_string(),
            subject: "Discrete Mathematics (MA203)".to_string(),
        },
        FacultyAssignment {
            faculty_name: "Dr. Kulkarni".to_string(),
            subject: "Computer Networks (CS205)".to_string(),
        },
    ];

    sqlx::query(
        r#"
        INSERT INTO faculty_feedback.forms (id, name, branch, form_type, faculties)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name, branch = EXCLUDED.branch,
            form_type = EXCLUDED.form_type, faculties = EXCLUDED.faculties
        "#,
    )
    .bind(SEED_FORM_ID)
    .bind("SE Semester 3 Feedback")
    .bind("CSE-DS")
    .bind(FormType::Theory.as_str())
    .bind(Json(&faculties))
    .execute(pool)
    .await?;

    let form = FormPayload {
        id: SEED_FORM_ID.to_string(),
        name: "SE Semester 3 Feedback".to_string(),
        branch: "CSE-DS".to_string(),
        form_type: FormType::Theory,
        faculties,
    };

    let respondents = [
        ("seed-001", "Asha Patil", "21CS001"),
        ("seed-002", "Rohan Mehta", "21CS014"),
        ("seed-003", "Sneha Joshi", "21CS027"),
        ("seed-004", "Vikram Nair", "21CS033"),
    ];
    let responses: [[[u8; 8]; 3]; 4] = [
        [
            [5, 4, 5, 4, 4, 5, 4, 5],
            [3, 4, 3, 3, 4, 3, 4, 3],
            [4, 4, 5, 5, 4, 4, 4, 4],
        ],
        [
            [4, 4, 4, 5, 5, 4, 4, 4],
            [4, 3, 3, 4, 3, 3, 3, 4],
            [5, 5, 4, 4, 5, 5, 4, 5],
        ],
        [
            [5, 5, 5, 4, 5, 4, 5, 5],
            [2, 3, 3, 3, 2, 4, 3, 3],
            [4, 3, 4, 4, 4, 4, 5, 4],
        ],
        [
            [4, 5, 4, 4, 4, 5, 5, 4],
            [3, 3, 4, 3, 3, 3, 4, 3],
            [5, 4, 4, 5, 4, 5, 4, 4],
        ],
    ];

    let seeded = respondents.into_iter().zip(responses);
    for ((source_key, respondent_name, roll_no), ratings) in seeded {
        let submission = Submission {
            form_id: form.id.clone(),
            source_key: source_key.to_string(),
            respondent_name: respondent_name.to_string(),
            roll_no: roll_no.to_string(),
            ratings: form
                .faculties
                .iter()
                .zip(ratings)
                .map(|(faculty, ratings)| (faculty.key(), ratings.to_vec()))
                .collect(),
        };
        let outcome = record_submission(pool, &form, &submission, scale).await?;
        if let RecordOutcome::Rejected(err) = outcome {
            anyhow::bail!("seed submission {source_key} rejected: {err}");
        }
    }

    Ok(())
}

fn transient(err: impl std::fmt::Display) -> FetchError {
    FetchError::Transient(err.to_string())
}

fn form_from_row(row: &PgRow) -> Result<FormPayload, FetchError> {
    let form_type: String = row.try_get("form_type").map_err(transient)?;
    let form_type = form_type.parse::<FormType>().map_err(transient)?;
    let faculties: Json<Vec<FacultyAssignment>> = row.try_get("faculties").map_err(transient)?;

    Ok(FormPayload {
        id: row.get("id"),
        name: row.get("name"),
        branch: row.get("branch"),
        form_type,
        faculties: faculties.0,
    })
}

pub async fn fetch_form(pool: &PgPool, form_id: &str) -> Result<Option<FormPayload>, FetchError> {
    let row = sqlx::query(
        "SELECT id, name, branch, form_type, faculties FROM faculty_feedback.forms WHERE id = $1",
    )
    .bind(form_id)
    .fetch_optional(pool)
    .await
    .map_err(transient)?;

    row.as_ref().map(form_from_row).transpose()
}

/// Every stored form, newest first.
pub async fn list_forms(pool: &PgPool) -> anyhow::Result<Vec<FormListing>> {
    let records = sqlx::query(
        r#"
        SELECT id, name, branch, form_type, faculties, created_at
        FROM faculty_feedback.forms
        ORDER BY created_at DESC, id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut forms = Vec::with_capacity(records.len());
    for row in records {
        let form = form_from_row(&row)
            .with_context(|| format!("invalid form row {}", row.get::<String, _>("id")))?;
        forms.push(FormListing {
            form,
            created_at: row.get("created_at"),
        });
    }

    tracing::debug!(forms = forms.len(), "listed forms");
    Ok(forms)
}

/// The respondents who submitted a form, oldest first.
pub async fn list_submissions(
    pool: &PgPool,
    form_id: &str,
) -> anyhow::Result<Vec<SubmissionRecord>> {
    let records = sqlx::query(
        r#"
        SELECT source_key, respondent_name, roll_no, submitted_at
        FROM faculty_feedback.submissions
        WHERE form_id = $1
        ORDER BY submitted_at, source_key
        "#,
    )
    .bind(form_id)
    .fetch_all(pool)
    .await?;

    let mut submissions = Vec::with_capacity(records.len());
    for row in records {
        submissions.push(SubmissionRecord {
            source_key: row.get("source_key"),
            respondent_name: row.get("respondent_name"),
            roll_no: row.get("roll_no"),
            submitted_at: row.get("submitted_at"),
        });
    }

    Ok(submissions)
}

pub struct PgFormFetcher {
    pool: PgPool,
}

impl PgFormFetcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FormFetcher for PgFormFetcher {
    async fn fetch(&self, form_id: &str) -> Result<FormPayload, FetchError> {
        fetch_form(&self.pool, form_id)
            .await?
            .ok_or(FetchError::NotFound)
    }
}

pub async fn fetch_accumulator(
    pool: &PgPool,
    form_id: &str,
) -> anyhow::Result<AccumulatorSnapshot> {
    let row = sqlx::query(
        "SELECT report, total_submissions FROM faculty_feedback.reports WHERE form_id = $1",
    )
    .bind(form_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(AccumulatorSnapshot::default());
    };

    let report: Option<String> = row.get("report");
    let total: Option<i32> = row.get("total_submissions");
    AccumulatorSnapshot::from_store(report.as_deref(), total.map(i64::from))
        .with_context(|| format!("invalid accumulator row for form {form_id}"))
}

#[derive(Debug, PartialEq)]
pub enum RecordOutcome {
    Recorded,
    Duplicate,
    Rejected(IngestError),
}

/// Folds one submission into the form's accumulator. The report row is locked
/// for the duration so sums and the counter are written together.
pub async fn record_submission(
    pool: &PgPool,
    form: &FormPayload,
    submission: &Submission,
    scale: RatingScale,
) -> anyhow::Result<RecordOutcome> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO faculty_feedback.submissions
            (id, form_id, source_key, respondent_name, roll_no)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (form_id, source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&form.id)
    .bind(&submission.source_key)
    .bind(&submission.respondent_name)
    .bind(&submission.roll_no)
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(RecordOutcome::Duplicate);
    }

    sqlx::query(
        r#"
        INSERT INTO faculty_feedback.reports (form_id) VALUES ($1)
        ON CONFLICT (form_id) DO NOTHING
        "#,
    )
    .bind(&form.id)
    .execute(&mut *tx)
    .await?;

    let row = sqlx::query(
        r#"
        SELECT report, total_submissions FROM faculty_feedback.reports
        WHERE form_id = $1
        FOR UPDATE
        "#,
    )
    .bind(&form.id)
    .fetch_one(&mut *tx)
    .await?;

    let report: String = row.get("report");
    let total: i32 = row.get("total_submissions");
    let mut snapshot = AccumulatorSnapshot::from_store(Some(&report), Some(i64::from(total)))?;

    let question_count = QuestionTemplate::for_form_type(form.form_type).len();
    let folded = fold_submission(
        &mut snapshot,
        &form.faculties,
        submission,
        question_count,
        scale,
    );
    if let Err(err) = folded {
        tx.rollback().await?;
        return Ok(RecordOutcome::Rejected(err));
    }

    let total = i32::try_from(snapshot.total_submissions)
        .context("submission counter overflow")?;
    sqlx::query(
        r#"
        UPDATE faculty_feedback.reports
        SET report = $2, total_submissions = $3, updated_at = now()
        WHERE form_id = $1
        "#,
    )
    .bind(&form.id)
    .bind(snapshot.entries_json())
    .bind(total)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(RecordOutcome::Recorded)
}

/// Removes a form; its report and submission log go with it.
pub async fn delete_form(pool: &PgPool, form_id: &str) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM faculty_feedback.forms WHERE id = $1")
        .bind(form_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
