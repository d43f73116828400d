use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_yellow};

/// Spinner for the three import phases: repositories, issues, pull requests.
pub struct PhaseProgress {
    pb: ProgressBar,
}

impl PhaseProgress {
    pub fn start_phase_1(org: &str) -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Import").underlined());
        let pb = create_spinner(
            bright_yellow(format!("Phase 1/3: Listing repositories of {org}")).to_string(),
        );
        Self { pb }
    }

    pub fn finish_phase_1_start_phase_2(self, repositories: usize) -> Self {
        self.pb.finish_with_message(
            bright_green(format!("Phase 1/3: Found {repositories} repositories ✓")).to_string(),
        );
        let pb = create_spinner(bright_yellow("Phase 2/3: Fetching issues").to_string());
        Self { pb }
    }

    pub fn finish_phase_2_start_phase_3(self, issues: usize) -> Self {
        self.pb.finish_with_message(
            bright_green(format!("Phase 2/3: Fetched {issues} issues ✓")).to_string(),
        );
        let pb = create_spinner(bright_yellow("Phase 3/3: Fetching pull requests").to_string());
        Self { pb }
    }

    pub fn finish_phase_3(self, pull_requests: usize, failures: usize) {
        let message = if failures == 0 {
            bright_green(format!("Phase 3/3: Fetched {pull_requests} pull requests ✓"))
        } else {
            bright_yellow(format!(
                "Phase 3/3: Fetched {pull_requests} pull requests ({failures} repository failures)"
            ))
        };
        self.pb.finish_with_message(message.to_string());
        eprintln!();
    }

    /// Replaces the running phase's detail text, e.g. the repository in flight.
    pub fn detail(&self, text: &str) {
        let current = self.pb.message();
        let head = current.split(" · ").next().unwrap_or_default().to_string();
        self.pb.set_message(format!("{head} · {text}"));
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
