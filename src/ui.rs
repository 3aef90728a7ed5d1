//! Terminal UI for workflow runs, rendered via an `indicatif` spinner.
//!
//! The spinner tracks the current phase while narration messages stream
//! above it; suspension and terminal banners close the run out.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::state::{WorkflowPhase, WorkflowState};

pub struct RunUi {
    spinner: ProgressBar,
    verbose: bool,
}

impl RunUi {
    pub fn new(verbose: bool) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg}")
                .expect("spinner template is a valid static string"),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        Self { spinner, verbose }
    }

    /// Print a line above the spinner without disturbing it.
    ///
    /// A hidden draw target (stderr is not a terminal) swallows
    /// `ProgressBar::println`, so fall back to plain stdout there.
    fn print_line(&self, line: impl AsRef<str>) {
        if self.spinner.is_hidden() {
            println!("{}", line.as_ref());
        } else {
            self.spinner.println(line.as_ref());
        }
    }

    pub fn phase(&self, phase: WorkflowPhase) {
        self.spinner
            .set_message(format!("Phase: {}", style(phase).yellow()));
    }

    pub fn message(&self, text: &str) {
        self.print_line("");
        for line in text.lines() {
            self.print_line(line);
        }
    }

    pub fn warning(&self, text: &str) {
        self.print_line(format!("{} {}", style("warning:").yellow().bold(), text));
    }

    /// Render any messages and warnings of a snapshot that have not been
    /// shown yet. Returns the new printed counts.
    pub fn render_new(&self, state: &WorkflowState, printed: (usize, usize)) -> (usize, usize) {
        let (messages_seen, warnings_seen) = printed;
        for message in state.messages.iter().skip(messages_seen) {
            self.message(message);
        }
        if self.verbose {
            for warning in state.warnings.iter().skip(warnings_seen) {
                self.warning(warning);
            }
        }
        (state.messages.len(), state.warnings.len())
    }

    pub fn suspended(&self, workflow_id: &str) {
        self.spinner.finish_and_clear();
        println!(
            "\n{}",
            style("Workflow paused for human approval").yellow().bold()
        );
        println!(
            "{}",
            style(format!(
                "Resume with: pipewright resume {workflow_id} --approve"
            ))
            .dim()
        );
    }

    pub fn completed(&self, state: &WorkflowState) {
        self.spinner.finish_and_clear();
        let duration = state
            .total_duration_seconds
            .map(|secs| format!(" in {secs:.2}s"))
            .unwrap_or_default();
        println!(
            "\n{}",
            style(format!("Orchestration complete{duration}"))
                .green()
                .bold()
        );
        if let Some(setup) = &state.platform_setup
            && let Some(url) = setup.platform_urls.get("pipeline")
        {
            println!("{}", style(format!("Pipeline: {url}")).dim());
        }
    }

    pub fn failed(&self, state: &WorkflowState) {
        self.spinner.finish_and_clear();
        println!("\n{}", style("Orchestration failed").red().bold());
        for error in &state.errors {
            println!("  {} {}", style("error:").red(), error);
        }
    }
}
