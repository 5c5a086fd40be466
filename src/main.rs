use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod aggregate;
mod cache;
mod config;
mod db;
mod ingest;
mod models;
mod report;
mod telemetry;
mod templates;

use crate::aggregate::{Aggregator, RatingScale};
use crate::cache::{FormLookupCache, LookupError};
use crate::config::Settings;
use crate::db::{PgFormFetcher, RecordOutcome};
use crate::models::{FormPayload, ReportOutcome};
use crate::templates::QuestionTemplate;

type FormCache = FormLookupCache<PgFormFetcher>;

#[derive(Parser)]
#[command(name = "faculty-feedback")]
#[command(about = "Faculty feedback aggregation and reporting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a sample form with submissions
    Seed,
    /// Fold submissions from a CSV file into form accumulators
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show a form's metadata and faculty roster
    Form {
        form_id: String,
        /// Drop any cached copy before looking the form up
        #[arg(long)]
        refresh: bool,
    },
    /// Print per-faculty averages
    Summary { form_id: String },
    /// Generate a markdown report
    Report {
        form_id: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// List every form, newest first
    List,
    /// List the respondents who submitted a form
    Submissions { form_id: String },
    /// Delete a form together with its report and submissions
    Delete { form_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load settings")?;
    telemetry::init_tracing(&settings)?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let forms = FormLookupCache::new(PgFormFetcher::new(pool.clone()), settings.cache_ttl);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool, settings.rating_scale).await?;
            println!("Seed form {} ready.", db::SEED_FORM_ID);
        }
        Commands::Import { csv } => {
            let file = std::fs::File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let submissions = ingest::submissions_from_csv(file)?;

            let mut recorded = 0usize;
            let mut duplicates = 0usize;
            let mut rejected = 0usize;

            for submission in &submissions {
                let form = match forms.resolve(&submission.form_id).await {
                    Ok(form) => form,
                    Err(LookupError::NotFound(form_id)) => {
                        tracing::warn!(
                            form_id = %form_id,
                            source_key = %submission.source_key,
                            "skipping submission for unknown form"
                        );
                        rejected += 1;
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                };

                let outcome =
                    db::record_submission(&pool, &form, submission, settings.rating_scale).await?;
                match outcome {
                    RecordOutcome::Recorded => recorded += 1,
                    RecordOutcome::Duplicate => duplicates += 1,
                    RecordOutcome::Rejected(err) => {
                        tracing::warn!(
                            form_id = %form.id,
                            source_key = %submission.source_key,
                            error = %err,
                            "submission rejected"
                        );
                        rejected += 1;
                    }
                }
            }

            println!(
                "Recorded {recorded} submissions from {} \
                 ({duplicates} already imported, {rejected} rejected).",
                csv.display()
            );
        }
        Commands::Form { form_id, refresh } => {
            if refresh {
                forms.invalidate(&form_id).await;
            }
            let form = forms.resolve(&form_id).await?;
            println!(
                "{} ({}, {})",
                form.name,
                form.form_type,
                form.branch.to_uppercase()
            );
            for faculty in &form.faculties {
                println!("- {} - {}", faculty.faculty_name, faculty.subject);
            }
        }
        Commands::Summary { form_id } => {
            let (form, _, outcome) =
                load_report(&pool, &forms, settings.rating_scale, &form_id).await?;
            match outcome {
                ReportOutcome::NoSubmissions => {
                    println!("No feedback submitted yet for {}.", form.name)
                }
                ReportOutcome::Ready(summary) => {
                    println!("{} ({} submissions):", form.name, summary.total_submissions);
                    for faculty in &summary.faculties {
                        println!(
                            "- {} ({}) average {} ({}%)",
                            faculty.faculty_name,
                            faculty.subject,
                            report::format_score(faculty.overall_average),
                            report::format_score(faculty.percentage_score)
                        );
                    }
                }
            }
        }
        Commands::Report { form_id, out } => {
            let (form, template, outcome) =
                load_report(&pool, &forms, settings.rating_scale, &form_id).await?;
            let generated_on = Utc::now().date_naive();
            let report = report::build_report(&form, template, &outcome, generated_on);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::List => {
            let listings = db::list_forms(&pool).await?;
            print!("{}", report::forms_listing(&listings));
        }
        Commands::Submissions { form_id } => {
            let form = forms.resolve(&form_id).await?;
            let submissions = db::list_submissions(&pool, &form.id).await?;
            print!("{}", report::submissions_listing(&form, &submissions));
        }
        Commands::Delete { form_id } => {
            if db::delete_form(&pool, &form_id).await? {
                forms.invalidate(&form_id).await;
                println!("Deleted form {form_id}.");
            } else {
                println!("No form with id {form_id}.");
            }
        }
    }

    Ok(())
}

async fn load_report(
    pool: &PgPool,
    forms: &FormCache,
    scale: RatingScale,
    form_id: &str,
) -> anyhow::Result<(FormPayload, QuestionTemplate, ReportOutcome)> {
    let form = forms.resolve(form_id).await?;
    let template = QuestionTemplate::for_form_type(form.form_type);
    let snapshot = db::fetch_accumulator(pool, form_id).await?;

    let outcome = Aggregator::new(template.len(), scale)
        .compute_report(&snapshot)
        .with_context(|| format!("accumulator for form {form_id} failed integrity checks"))?;

    Ok((form, template, outcome))
}
