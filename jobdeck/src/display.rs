//! Shared formatting helpers for terminal output.

use jobdeck_core::format::{format_duration, format_relative_time, format_span};
use jobdeck_core::{JobResult, ProjectRunResult, ProjectStatus, ResultStatus};

/// Badge for a project row.
pub fn project_badge(status: ProjectStatus, needs_human: bool) -> &'static str {
    match status {
        ProjectStatus::Complete if needs_human => "!",
        ProjectStatus::Pending => "·",
        ProjectStatus::PreCheck => "?",
        ProjectStatus::Running => ">",
        ProjectStatus::Skipped => "-",
        ProjectStatus::Complete => "✓",
        ProjectStatus::Error => "✗",
    }
}

/// Badge for an overall result.
pub fn result_badge(status: ResultStatus) -> &'static str {
    match status {
        ResultStatus::Complete => "✓",
        ResultStatus::NeedsHuman => "!",
        ResultStatus::Error => "✗",
    }
}

/// Label shown next to a project, including the review flag.
pub fn project_label(status: ProjectStatus, needs_human: bool) -> String {
    if needs_human {
        format!("{} (needs review)", status)
    } else {
        status.to_string()
    }
}

/// One inbox line: unread marker, badge, id, job, summary, age.
pub fn inbox_row(result: &JobResult) -> String {
    let marker = if result.is_read { " " } else { "●" };
    format!(
        "{} {} {}  {}  {}  ({})",
        marker,
        result_badge(result.status()),
        result.id(),
        result.record.job_name,
        result.summary,
        format_relative_time(result.record.completed_at)
    )
}

/// Full report of one result, with each project's transcript.
pub fn result_details(result: &JobResult) -> String {
    let record = &result.record;
    let mut out = String::new();

    out.push_str(&format!("Result:   {}\n", record.id));
    out.push_str(&format!("Job:      {} ({})\n", record.job_name, record.job_id));
    out.push_str(&format!(
        "Status:   {} {}\n",
        result_badge(record.status),
        record.status
    ));
    out.push_str(&format!("Summary:  {}\n", result.summary));
    out.push_str(&format!(
        "Started:  {} ({})\n",
        record.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        format_relative_time(record.started_at)
    ));
    out.push_str(&format!(
        "Duration: {}\n",
        format_duration(record.completed_at - record.started_at)
    ));
    out.push_str(&format!(
        "Read:     {}\n",
        if result.is_read { "yes" } else { "no" }
    ));

    for project in &record.projects {
        out.push('\n');
        out.push_str(&project_section(project));
    }
    out
}

fn project_section(project: &ProjectRunResult) -> String {
    let mut out = format!(
        "{} {}  {}  [{}]  {}\n",
        project_badge(project.status, project.needs_human),
        project.name,
        project.path,
        project_label(project.status, project.needs_human),
        format_span(project.started_at, project.completed_at)
    );
    if let Some(error) = &project.error {
        out.push_str(&format!("  error: {}\n", error));
    }
    for line in project.output.lines() {
        out.push_str("  | ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jobdeck_core::{ProjectProgress, RunRecord};

    fn result() -> JobResult {
        let mut api = ProjectProgress::new("/code/api");
        api.status = ProjectStatus::Complete;
        api.needs_human = true;
        api.output = "line one\nline two".to_string();
        let mut web = ProjectProgress::new("/code/web");
        web.status = ProjectStatus::Error;
        web.error = Some("exit code 1".to_string());

        let now = Utc::now();
        JobResult {
            record: RunRecord::new(
                "run-1".to_string(),
                "lint".to_string(),
                "Lint".to_string(),
                now,
                now,
                vec![api.snapshot(), web.snapshot()],
            ),
            is_read: false,
            summary: "2 projects: 1 need review, 1 failed".to_string(),
        }
    }

    #[test]
    fn test_badges() {
        assert_eq!(project_badge(ProjectStatus::Complete, false), "✓");
        assert_eq!(project_badge(ProjectStatus::Complete, true), "!");
        assert_eq!(project_badge(ProjectStatus::Error, true), "✗");
        assert_eq!(result_badge(ResultStatus::NeedsHuman), "!");
    }

    #[test]
    fn test_inbox_row_marks_unread() {
        let row = inbox_row(&result());
        assert!(row.starts_with("● ✗ run-1"));
        assert!(row.contains("2 projects: 1 need review, 1 failed"));
    }

    #[test]
    fn test_details_include_transcripts_and_errors() {
        let details = result_details(&result());
        assert!(details.contains("Job:      Lint (lint)"));
        assert!(details.contains("! api  /code/api  [complete (needs review)]"));
        assert!(details.contains("  | line two\n"));
        assert!(details.contains("  error: exit code 1"));
    }
}
