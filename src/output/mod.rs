mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::{export_import, export_report, read_snapshot};
pub use progress::PhaseProgress;
pub use styling::{dim, magenta_bold};
pub use summary::print_summary;

/// Prints the `FlowLens` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🌊 FlowLens"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Issue flow metrics for GitHub organizations")
    );
}
