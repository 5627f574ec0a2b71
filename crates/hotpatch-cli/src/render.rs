use std::io::IsTerminal;
use std::time::Duration;

use anstyle::{AnsiColor, Style};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    if std::io::stdout().is_terminal() {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn print_status(style: OutputStyle, status: &str, message: &str) {
    println!("{}", render_status_line(style, status, message));
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => format!("{status:>10} {message}"),
        OutputStyle::Rich => {
            let accent = Style::new().bold().fg_color(Some(AnsiColor::Green.into()));
            format!(
                "{}{status:>10}{} {message}",
                accent.render(),
                accent.render_reset()
            )
        }
    }
}

pub(crate) fn render_warning_line(style: OutputStyle, message: &str) -> String {
    match style {
        OutputStyle::Plain => format!("{:>10} {message}", "warning"),
        OutputStyle::Rich => {
            let accent = Style::new().bold().fg_color(Some(AnsiColor::Yellow.into()));
            format!(
                "{}{:>10}{} {message}",
                accent.render(),
                "warning",
                accent.render_reset()
            )
        }
    }
}

/// A byte-granular progress bar for the download stream. The declared
/// total is unknown until the first progress callback, so the caller sets
/// the length as it learns it.
pub(crate) fn download_progress_bar(style: OutputStyle) -> ProgressBar {
    if style == OutputStyle::Plain {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template(
        "{spinner:.cyan.bold} downloading [{bar:20.cyan/blue}] {bytes}/{total_bytes}",
    ) {
        bar.set_style(template.progress_chars("=>-"));
    }
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    HumanBytes(bytes).to_string()
}
