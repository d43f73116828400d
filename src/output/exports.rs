use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::flow::stages::ComputedIssue;
use crate::flow::timeseries::{
    BoardStock, ChangeRequestStats, MonthlySummary, StockCounts, ThroughputWeek, WeeklyStock,
};
use crate::flow::FlowReport;
use crate::insights::{ImportSnapshot, IssueReport, PullRequestRecord, Repository, ReviewRecord};

pub const SNAPSHOT_FILE: &str = "import.json";

/// Writes every import artifact into `dir`.
///
/// Each file is rendered to a temporary sibling and renamed into place, so a
/// failed run leaves the previous file untouched.
pub fn export_import(dir: &Path, snapshot: &ImportSnapshot, pretty: bool) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create data directory {}", dir.display()))?;

    let written = vec![
        write_atomic(&dir.join("repository.csv"), |out| {
            write_repositories(&snapshot.repositories, out)
        })?,
        write_atomic(&dir.join("issue.csv"), |out| write_issues(&snapshot.issues, out))?,
        write_atomic(&dir.join("issue_status_event.csv"), |out| {
            write_status_events(&snapshot.issues, out)
        })?,
        write_atomic(&dir.join("issue_board_event.csv"), |out| {
            write_board_events(&snapshot.issues, out)
        })?,
        write_atomic(&dir.join("pr.csv"), |out| {
            write_pull_requests(&snapshot.pull_requests, out)
        })?,
        write_atomic(&dir.join("pr_review.csv"), |out| {
            write_reviews(&snapshot.reviews, out)
        })?,
        write_atomic(&dir.join(SNAPSHOT_FILE), |out| {
            if pretty {
                serde_json::to_writer_pretty(&mut *out, snapshot)?;
            } else {
                serde_json::to_writer(&mut *out, snapshot)?;
            }
            writeln!(out)?;
            Ok(())
        })?,
    ];
    Ok(written)
}

pub fn read_snapshot(dir: &Path) -> Result<ImportSnapshot> {
    let path = dir.join(SNAPSHOT_FILE);
    let content = fs::read_to_string(&path).with_context(|| {
        format!(
            "Failed to read {} (run `flowlens import` first)",
            path.display()
        )
    })?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Writes every calculated metric into `dir`.
pub fn export_report(dir: &Path, report: &FlowReport) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create data directory {}", dir.display()))?;

    Ok(vec![
        write_atomic(&dir.join("calculated_issue.csv"), |out| {
            write_computed_issues(&report.issues, out)
        })?,
        write_atomic(&dir.join("cycle_time.csv"), |out| {
            write_monthly(&report.monthly, out)
        })?,
        write_atomic(&dir.join("throughput_week.csv"), |out| {
            write_throughput(&report.throughput, out)
        })?,
        write_atomic(&dir.join("stocks.csv"), |out| write_stocks(&report.stocks, out))?,
        write_atomic(&dir.join("stocks_week.csv"), |out| {
            write_weekly_stocks(&report.weekly_stocks, out)
        })?,
        write_atomic(&dir.join("pr_change_requests_week.csv"), |out| {
            write_change_requests(&report.change_requests, out)
        })?,
    ])
}

fn write_atomic<F>(path: &Path, render: F) -> Result<PathBuf>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let tmp = path.with_extension("tmp");
    let file =
        File::create(&tmp).with_context(|| format!("Failed to create {}", tmp.display()))?;
    let written = write_through(file, render)
        .and_then(|()| {
            fs::rename(&tmp, path)
                .with_context(|| format!("Failed to move {} into place", path.display()))
        })
        .with_context(|| format!("Failed to write {}", path.display()));

    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written.map(|()| path.to_path_buf())
}

fn write_through<F>(file: File, render: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let mut out = BufWriter::new(file);
    render(&mut out)?;
    out.flush()?;
    Ok(())
}

/// Quotes a field when it contains a separator, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(String::new, |t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn ts(value: DateTime<Utc>) -> String {
    timestamp(Some(value))
}

fn write_repositories(repositories: &[Repository], out: &mut dyn Write) -> Result<()> {
    writeln!(out, "org,repo,owner,private")?;
    for repo in repositories {
        writeln!(
            out,
            "{},{},{},{}",
            csv_field(&repo.org),
            csv_field(&repo.name),
            csv_field(&repo.owner),
            repo.private
        )?;
    }
    Ok(())
}

fn write_issues(issues: &[IssueReport], out: &mut dyn Write) -> Result<()> {
    writeln!(
        out,
        "org,repo,number,title,url,state,is_bug,creator,assignees,created_at,closed_at,committer,type"
    )?;
    for issue in issues {
        let record = &issue.record;
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{}",
            csv_field(&record.org),
            csv_field(&record.repo),
            record.number,
            csv_field(&record.title),
            csv_field(&record.url),
            record.state.as_str(),
            issue.is_bug,
            csv_field(&record.creator),
            csv_field(&record.assignees.join(";")),
            ts(record.created_at),
            timestamp(record.closed_at),
            csv_field(issue.lifecycle.completer.as_deref().unwrap_or_default()),
            csv_field(&issue.issue_type),
        )?;
    }
    Ok(())
}

fn write_status_events(issues: &[IssueReport], out: &mut dyn Write) -> Result<()> {
    writeln!(out, "org,repo,number,type,at,by")?;
    for issue in issues {
        for event in &issue.lifecycle.status_history {
            writeln!(
                out,
                "{},{},{},{},{},{}",
                csv_field(&issue.record.org),
                csv_field(&issue.record.repo),
                issue.record.number,
                event.kind.as_str(),
                ts(event.at),
                csv_field(&event.actor),
            )?;
        }
    }
    Ok(())
}

fn write_board_events(issues: &[IssueReport], out: &mut dyn Write) -> Result<()> {
    writeln!(
        out,
        "org,repo,number,board_id,board_name,from_stage,to_stage,at,by,kind"
    )?;
    for issue in issues {
        for event in &issue.lifecycle.board_history {
            writeln!(
                out,
                "{},{},{},{},{},{},{},{},{},{}",
                csv_field(&issue.record.org),
                csv_field(&issue.record.repo),
                issue.record.number,
                csv_field(&event.board_id),
                csv_field(&event.board_name),
                csv_field(&event.from_stage),
                csv_field(&event.to_stage),
                ts(event.at),
                csv_field(&event.actor),
                event.kind.as_str(),
            )?;
        }
    }
    Ok(())
}

fn write_pull_requests(pull_requests: &[PullRequestRecord], out: &mut dyn Write) -> Result<()> {
    writeln!(
        out,
        "org,repo,number,title,url,state,created_at,closed_at,merged_at,creator"
    )?;
    for pr in pull_requests {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{}",
            csv_field(&pr.org),
            csv_field(&pr.repo),
            pr.number,
            csv_field(&pr.title),
            csv_field(&pr.url),
            csv_field(&pr.state),
            ts(pr.created_at),
            timestamp(pr.closed_at),
            timestamp(pr.merged_at),
            csv_field(&pr.creator),
        )?;
    }
    Ok(())
}

fn write_reviews(reviews: &[ReviewRecord], out: &mut dyn Write) -> Result<()> {
    writeln!(out, "org,repo,number,state,submitted_at,user")?;
    for review in reviews {
        writeln!(
            out,
            "{},{},{},{},{},{}",
            csv_field(&review.org),
            csv_field(&review.repo),
            review.number,
            csv_field(&review.state),
            timestamp(review.submitted_at),
            csv_field(&review.reviewer),
        )?;
    }
    Ok(())
}

fn write_computed_issues(issues: &[ComputedIssue], out: &mut dyn Write) -> Result<()> {
    writeln!(
        out,
        "id,name,board_id,board_name,created_at,lead_time_start,cycle_time_start,dev_start,review_start,qa_start,ready_start,waiting_to_prod_start,end,is_bug,type"
    )?;
    for issue in issues {
        let s = &issue.stages;
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            csv_field(&issue.id),
            csv_field(&issue.name),
            csv_field(&issue.board_id),
            csv_field(&issue.board_name),
            ts(issue.created_at),
            timestamp(s.lead_start),
            timestamp(s.cycle_start),
            timestamp(s.dev_start),
            timestamp(s.review_start),
            timestamp(s.qa_start),
            timestamp(s.ready_start),
            timestamp(s.waiting_to_prod_start),
            timestamp(s.end),
            issue.is_bug,
            csv_field(&issue.issue_type),
        )?;
    }
    Ok(())
}

fn write_monthly(months: &[MonthlySummary], out: &mut dyn Write) -> Result<()> {
    writeln!(
        out,
        "month,issue_count,lead_avg_days,lead_count,cycle_avg_days,cycle_count,time_to_review_avg"
    )?;
    for m in months {
        writeln!(
            out,
            "{},{},{:.6},{},{:.6},{},{:.6}",
            m.month,
            m.issue_count,
            m.lead_avg_days,
            m.lead_count,
            m.cycle_avg_days,
            m.cycle_count,
            m.time_to_review_avg
        )?;
    }
    Ok(())
}

fn write_throughput(weeks: &[ThroughputWeek], out: &mut dyn Write) -> Result<()> {
    writeln!(out, "iso_year,iso_week,count,center,ucl,lcl")?;
    for w in weeks {
        writeln!(
            out,
            "{},{:02},{},{:.6},{:.6},{:.6}",
            w.bucket.iso_year, w.bucket.iso_week, w.count, w.limits.center, w.limits.ucl, w.limits.lcl
        )?;
    }
    Ok(())
}

const STOCK_COLUMNS: &str = "defects,backlog,ready,dev,review,qa,waiting_to_prod";

fn stock_fields(c: &StockCounts) -> String {
    format!(
        "{},{},{},{},{},{},{}",
        c.defects, c.backlog, c.ready, c.dev, c.review, c.qa, c.waiting_to_prod
    )
}

fn write_stocks(stocks: &[BoardStock], out: &mut dyn Write) -> Result<()> {
    writeln!(out, "board_id,board_name,{STOCK_COLUMNS}")?;
    for s in stocks {
        writeln!(
            out,
            "{},{},{}",
            csv_field(&s.board_id),
            csv_field(&s.board_name),
            stock_fields(&s.counts)
        )?;
    }
    Ok(())
}

fn write_weekly_stocks(stocks: &[WeeklyStock], out: &mut dyn Write) -> Result<()> {
    writeln!(out, "iso_year,iso_week,board_id,board_name,{STOCK_COLUMNS}")?;
    for s in stocks {
        writeln!(
            out,
            "{},{:02},{},{},{}",
            s.bucket.iso_year,
            s.bucket.iso_week,
            csv_field(&s.board_id),
            csv_field(&s.board_name),
            stock_fields(&s.counts)
        )?;
    }
    Ok(())
}

fn write_change_requests(stats: &[ChangeRequestStats], out: &mut dyn Write) -> Result<()> {
    writeln!(
        out,
        "iso_year,iso_week,repo,mean,median,p90,pr_count,total_change_requests"
    )?;
    for s in stats {
        writeln!(
            out,
            "{},{:02},{},{:.6},{:.6},{:.6},{},{}",
            s.bucket.iso_year,
            s.bucket.iso_week,
            csv_field(&s.repo),
            s.mean,
            s.median,
            s.p90,
            s.pr_count,
            s.total_change_requests
        )?;
    }
    Ok(())
}
