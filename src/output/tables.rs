use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, Color as TableColor, ContentArrangement, Table};

use crate::flow::timeseries::ThroughputWeek;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn count_cell(count: usize) -> Cell {
    let cell = Cell::new(count).set_alignment(CellAlignment::Right);
    if count == 0 {
        cell.fg(TableColor::DarkGrey)
    } else {
        cell
    }
}

/// Throughput count, red above the upper limit and yellow below the lower one.
#[allow(clippy::cast_precision_loss)]
pub fn throughput_cell(week: &ThroughputWeek) -> Cell {
    let cell = Cell::new(week.count).set_alignment(CellAlignment::Right);
    let count = week.count as f64;
    if count > week.limits.ucl {
        cell.fg(TableColor::Red)
    } else if count < week.limits.lcl {
        cell.fg(TableColor::Yellow)
    } else {
        cell.fg(TableColor::Green)
    }
}

/// Average in days, dimmed when nothing contributed to it.
pub fn days_cell(days: f64, samples: usize) -> Cell {
    if samples == 0 {
        Cell::new("-").fg(TableColor::DarkGrey)
    } else {
        Cell::new(format!("{days:.1}d")).set_alignment(CellAlignment::Right)
    }
}
