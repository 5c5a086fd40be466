use std::fmt::Write;

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{FormListing, FormPayload, FormType, Report, ReportOutcome, SubmissionRecord};
use crate::templates::QuestionTemplate;

/// Two decimals; the only place report numbers are rounded.
pub fn format_score(value: f64) -> String {
    format!("{value:.2}")
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn or_dash(value: &str) -> &str {
    Some(value).filter(|v| !v.trim().is_empty()).unwrap_or("-")
}

fn report_title(form_type: FormType) -> &'static str {
    match form_type {
        FormType::Theory => "THEORY REPORT",
        FormType::Practical => "PRACTICAL REPORT",
    }
}

pub fn build_report(
    form: &FormPayload,
    template: QuestionTemplate,
    outcome: &ReportOutcome,
    generated_on: NaiveDate,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {}", form.name);
    let _ = writeln!(
        output,
        "{} - {}",
        report_title(form.form_type),
        form.branch.to_uppercase()
    );
    let _ = writeln!(output);

    let report = match outcome {
        ReportOutcome::NoSubmissions => {
            let _ = writeln!(output, "Generated on {generated_on}");
            let _ = writeln!(output);
            let _ = writeln!(output, "No feedback submitted yet.");
            return output;
        }
        ReportOutcome::Ready(report) => report,
    };

    let _ = writeln!(
        output,
        "Generated on {} from {} submissions",
        generated_on, report.total_submissions
    );
    let _ = writeln!(output);

    write_summary(&mut output, template, report);
    write_question_key(&mut output, template);
    write_faculty_sections(&mut output, template, report);

    output
}

fn write_summary(output: &mut String, template: QuestionTemplate, report: &Report) {
    let _ = writeln!(output, "## Summary");

    if report.faculties.is_empty() {
        let _ = writeln!(output, "No faculty listed on this form.");
        let _ = writeln!(output);
        return;
    }

    let question_headers: Vec<String> = (1..=template.len()).map(|idx| format!("Q{idx}")).collect();
    let _ = writeln!(
        output,
        "| Faculty | Subject | {} | Total Avg | Avg Feedback (%) |",
        question_headers.join(" | ")
    );
    let _ = writeln!(output, "|{}", "---|".repeat(template.len() + 4));

    for faculty in &report.faculties {
        let averages: Vec<String> = faculty
            .question_averages
            .iter()
            .copied()
            .map(format_score)
            .collect();
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} |",
            faculty.faculty_name,
            faculty.subject,
            averages.join(" | "),
            format_score(faculty.overall_average),
            format_score(faculty.percentage_score)
        );
    }
    let _ = writeln!(output);
}

fn write_question_key(output: &mut String, template: QuestionTemplate) {
    let _ = writeln!(output, "## Questions");
    for (idx, text) in template.texts().enumerate() {
        let _ = writeln!(output, "- Q{}: {}", idx + 1, text);
    }
    let _ = writeln!(output);
}

fn write_faculty_sections(output: &mut String, template: QuestionTemplate, report: &Report) {
    if report.faculties.is_empty() {
        return;
    }

    let _ = writeln!(output, "## Faculty-wise Feedback");
    for faculty in &report.faculties {
        let _ = writeln!(output);
        let _ = writeln!(output, "### {} - {}", faculty.faculty_name, faculty.subject);
        let _ = writeln!(output, "| Question | Rating |");
        let _ = writeln!(output, "|---|---|");
        for (text, average) in template.texts().zip(&faculty.question_averages) {
            let _ = writeln!(output, "| {} | {} |", text, format_score(*average));
        }
        let _ = writeln!(
            output,
            "| **Average Rating** | {} |",
            format_score(faculty.overall_average)
        );
        let _ = writeln!(
            output,
            "| **Avg Feedback (%)** | {} |",
            format_score(faculty.percentage_score)
        );
    }
}

/// One row per form with its roster, in the order given.
pub fn forms_listing(forms: &[FormListing]) -> String {
    let mut output = String::new();

    if forms.is_empty() {
        let _ = writeln!(output, "No forms yet.");
        return output;
    }

    let _ = writeln!(output, "| ID | Name | Type | Branch | Faculty | Created |");
    let _ = writeln!(output, "|---|---|---|---|---|---|");
    for listing in forms {
        let form = &listing.form;
        let roster: Vec<String> = form.faculties.iter().map(|f| f.key()).collect();
        let roster = if roster.is_empty() {
            "-".to_string()
        } else {
            roster.join("; ")
        };
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {} |",
            form.id,
            form.name,
            form.form_type,
            form.branch.to_uppercase(),
            roster,
            format_timestamp(listing.created_at)
        );
    }

    output
}

/// The respondents recorded for `form`, with the form's branch on each row.
pub fn submissions_listing(form: &FormPayload, submissions: &[SubmissionRecord]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {} - Student Submissions", form.name);
    let _ = writeln!(output);

    if submissions.is_empty() {
        let _ = writeln!(output, "No submissions yet");
        return output;
    }

    let branch = form.branch.to_uppercase();
    let _ = writeln!(output, "| Name | Branch | Roll No | Submitted |");
    let _ = writeln!(output, "|---|---|---|---|");
    for submission in submissions {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} |",
            or_dash(&submission.respondent_name),
            branch,
            or_dash(&submission.roll_no),
            format_timestamp(submission.submitted_at)
        );
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "{} submissions", submissions.len());

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FacultyAssignment, FacultyReport};
    use chrono::TimeZone;

    fn form(form_type: FormType) -> FormPayload {
        FormPayload {
            id: "F1".to_string(),
            name: "SE Semester 3 Feedback".to_string(),
            branch: "cse-ds".to_string(),
            form_type,
            faculties: vec![FacultyAssignment {
                faculty_name: "Dr. Rao".to_string(),
                subject: "Data Structures (CS201)".to_string(),
            }],
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
    }

    #[test]
    fn no_submissions_renders_notice_without_numbers() {
        let template = QuestionTemplate::for_form_type(FormType::Theory);
        let output = build_report(
            &form(FormType::Theory),
            template,
            &ReportOutcome::NoSubmissions,
            date(),
        );

        assert!(output.contains("THEORY REPORT - CSE-DS"));
        assert!(output.contains("No feedback submitted yet."));
        assert!(!output.contains("NaN"));
        assert!(!output.contains("## Summary"));
    }

    #[test]
    fn ready_report_rounds_only_for_display() {
        let template = QuestionTemplate::for_form_type(FormType::Practical);
        let averages = vec![10.0 / 3.0, 4.0, 4.5, 5.0, 3.0];
        let overall = averages.iter().sum::<f64>() / averages.len() as f64;
        let report = Report {
            total_submissions: 3,
            faculties: vec![FacultyReport {
                faculty_name: "Dr. Rao".to_string(),
                subject: "Data Structures".to_string(),
                question_averages: averages,
                overall_average: overall,
                percentage_score: overall * 20.0,
            }],
        };

        let output = build_report(
            &form(FormType::Practical),
            template,
            &ReportOutcome::Ready(report),
            date(),
        );

        assert!(output.contains("PRACTICAL REPORT - CSE-DS"));
        assert!(output.contains("Generated on 2026-03-02 from 3 submissions"));
        assert!(output.contains(
            "| Faculty | Subject | Q1 | Q2 | Q3 | Q4 | Q5 | Total Avg | Avg Feedback (%) |"
        ));
        assert!(output.contains(
            "| Dr. Rao | Data Structures | 3.33 | 4.00 | 4.50 | 5.00 | 3.00 | 3.97 | 79.33 |"
        ));
        assert!(output.contains("### Dr. Rao - Data Structures"));
        assert!(output.contains("| **Avg Feedback (%)** | 79.33 |"));
    }

    #[test]
    fn empty_roster_is_called_out() {
        let template = QuestionTemplate::for_form_type(FormType::Theory);
        let report = Report {
            total_submissions: 2,
            faculties: Vec::new(),
        };
        let output = build_report(
            &form(FormType::Theory),
            template,
            &ReportOutcome::Ready(report),
            date(),
        );

        assert!(output.contains("No faculty listed on this form."));
        assert!(!output.contains("## Faculty-wise Feedback"));
    }

    #[test]
    fn format_score_uses_two_decimals() {
        assert_eq!(format_score(85.0), "85.00");
        assert_eq!(format_score(4.2567), "4.26");
    }

    #[test]
    fn forms_listing_shows_roster_and_creation_time() {
        let mut lab = form(FormType::Practical);
        lab.id = "F2".to_string();
        lab.name = "DS Lab Feedback".to_string();
        lab.faculties.push(FacultyAssignment {
            faculty_name: "Prof. Iyer".to_string(),
            subject: "Networks Lab".to_string(),
        });
        let forms = vec![
            FormListing {
                form: lab,
                created_at: at(14, 5),
            },
            FormListing {
                form: form(FormType::Theory),
                created_at: at(9, 30),
            },
        ];

        let output = forms_listing(&forms);
        let rows: Vec<&str> = output.lines().skip(2).collect();

        assert!(output.starts_with("| ID | Name | Type | Branch | Faculty | Created |"));
        assert_eq!(
            rows[0],
            "| F2 | DS Lab Feedback | Practical | CSE-DS | \
             Dr. Rao - Data Structures (CS201); Prof. Iyer - Networks Lab | 2026-03-02 14:05 UTC |"
        );
        assert!(rows[1].starts_with("| F1 | SE Semester 3 Feedback | Theory | CSE-DS |"));
        assert!(rows[1].ends_with("| 2026-03-02 09:30 UTC |"));
    }

    #[test]
    fn forms_listing_handles_empty_store_and_roster() {
        assert_eq!(forms_listing(&[]), "No forms yet.\n");

        let mut bare = form(FormType::Theory);
        bare.faculties.clear();
        let output = forms_listing(&[FormListing {
            form: bare,
            created_at: at(8, 0),
        }]);
        assert!(output.contains("| CSE-DS | - | 2026-03-02 08:00 UTC |"));
    }

    #[test]
    fn submissions_listing_reports_empty_form() {
        let output = submissions_listing(&form(FormType::Theory), &[]);

        assert!(output.contains("# SE Semester 3 Feedback - Student Submissions"));
        assert!(output.contains("No submissions yet"));
        assert!(!output.contains("| Name |"));
    }

    #[test]
    fn submissions_listing_shows_respondents() {
        let submissions = vec![
            SubmissionRecord {
                source_key: "s-1".to_string(),
                respondent_name: "Asha Patil".to_string(),
                roll_no: "21CS001".to_string(),
                submitted_at: at(10, 0),
            },
            SubmissionRecord {
                source_key: "s-2".to_string(),
                respondent_name: String::new(),
                roll_no: String::new(),
                submitted_at: at(10, 45),
            },
        ];

        let output = submissions_listing(&form(FormType::Theory), &submissions);

        assert!(output.contains("| Name | Branch | Roll No | Submitted |"));
        assert!(output.contains("| Asha Patil | CSE-DS | 21CS001 | 2026-03-02 10:00 UTC |"));
        assert!(output.contains("| - | CSE-DS | - | 2026-03-02 10:45 UTC |"));
        assert!(output.contains("2 submissions"));
        assert!(!output.contains("No submissions yet"));
    }
}
