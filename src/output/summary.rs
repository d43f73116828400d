use std::fmt::Write;

use comfy_table::Cell;

use crate::flow::FlowReport;

use super::styling::{bright, bright_red, bright_yellow, cyan, dim};
use super::tables::{count_cell, create_table, cyan_header, days_cell, throughput_cell};

const RECENT_WEEKS: usize = 12;
const RECENT_MONTHS: usize = 6;

/// Prints a human-readable summary of the calculated flow metrics to stdout.
///
/// Shows the current work in progress per board, the most recent monthly
/// lead and cycle times, and the latest throughput weeks with weeks outside
/// their control limits highlighted.
pub fn print_summary(org: &str, report: &FlowReport) {
    println!("{}", render_summary(org, report));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn render_summary(org: &str, report: &FlowReport) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");
    let completed = report.issues.iter().filter(|i| i.stages.end.is_some()).count();
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n",
        dim("Organization:"),
        cyan(org),
        dim("Issues on boards:"),
        bright_yellow(report.issues.len()),
        dim("Completed:"),
        bright_yellow(completed),
    );

    if report.issues.is_empty() {
        let _ = writeln!(output, "{}", bright_yellow("No issues with board history found."));
        return output;
    }

    render_stocks(&mut output, report);
    render_monthly(&mut output, report);
    render_throughput(&mut output, report);

    output
}

fn render_stocks(output: &mut String, report: &FlowReport) {
    add_section_header(output, "📦", "Work in Progress");
    if report.stocks.is_empty() {
        let _ = writeln!(output, "  {}\n", dim("No open issues."));
        return;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&[
        "Board", "Defects", "Backlog", "Ready", "Dev", "Review", "QA", "To Prod", "Total",
    ]));
    for stock in &report.stocks {
        let c = &stock.counts;
        let board = if stock.board_name.is_empty() {
            stock.board_id.clone()
        } else {
            stock.board_name.clone()
        };
        table.add_row(vec![
            Cell::new(board),
            count_cell(c.defects),
            count_cell(c.backlog),
            count_cell(c.ready),
            count_cell(c.dev),
            count_cell(c.review),
            count_cell(c.qa),
            count_cell(c.waiting_to_prod),
            count_cell(c.total()),
        ]);
    }
    let _ = writeln!(output, "{table}\n");
}

fn render_monthly(output: &mut String, report: &FlowReport) {
    if report.monthly.is_empty() {
        return;
    }
    add_section_header(output, "⏱️", "Lead & Cycle Time");

    let mut table = create_table();
    table.set_header(cyan_header(&["Month", "Completed", "Lead", "Cycle", "To Review"]));
    let skip = report.monthly.len().saturating_sub(RECENT_MONTHS);
    for month in report.monthly.iter().skip(skip) {
        table.add_row(vec![
            Cell::new(&month.month),
            count_cell(month.issue_count),
            days_cell(month.lead_avg_days, month.lead_count),
            days_cell(month.cycle_avg_days, month.cycle_count),
            Cell::new(format!("{:.1}d", month.time_to_review_avg)),
        ]);
    }
    let _ = writeln!(output, "{table}\n");
}

fn render_throughput(output: &mut String, report: &FlowReport) {
    if report.throughput.is_empty() {
        return;
    }
    add_section_header(output, "📈", "Weekly Throughput");

    let mut table = create_table();
    table.set_header(cyan_header(&["Week", "Completed", "Center", "UCL", "LCL"]));
    let skip = report.throughput.len().saturating_sub(RECENT_WEEKS);
    let recent = &report.throughput[skip..];
    for week in recent {
        table.add_row(vec![
            Cell::new(format!("{}-W{:02}", week.bucket.iso_year, week.bucket.iso_week)),
            throughput_cell(week),
            Cell::new(format!("{:.1}", week.limits.center)),
            Cell::new(format!("{:.1}", week.limits.ucl)),
            Cell::new(format!("{:.1}", week.limits.lcl)),
        ]);
    }
    let _ = writeln!(output, "{table}");

    let flagged = recent.iter().filter(|w| w.out_of_control()).count();
    if flagged > 0 {
        let _ = writeln!(
            output,
            "  {}",
            bright_red(format!("{flagged} week(s) outside control limits"))
        );
    }
    let _ = writeln!(output);
}
