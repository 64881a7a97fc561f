//! Terminal rendering of validation feedback.

use colored::Colorize;
use vigil_runtime::FeedbackSink;
use vigil_types::{BannerState, BoundingBox, NotificationKind, Notice};

/// [`FeedbackSink`] that prints each verdict to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

pub(crate) fn banner_line(state: BannerState) -> String {
    match state {
        BannerState::Granted => format!("  {}", " ACCESS GRANTED ".on_green().black().bold()),
        BannerState::Denied => format!("  {}", " ACCESS DENIED ".on_red().white().bold()),
        BannerState::Retry => format!("  {}", " TRY AGAIN ".on_yellow().black().bold()),
    }
}

pub(crate) fn notice_line(kind: NotificationKind, notice: &Notice) -> String {
    let text = notice.summary();
    match kind {
        NotificationKind::Success => format!("  {} {}", "✓".green().bold(), text),
        NotificationKind::Failure => format!("  {} {}", "✗".red().bold(), text),
        NotificationKind::Retry => format!("  {} {}", "↻".yellow().bold(), text),
    }
}

pub(crate) fn overlay_line(bounding_box: Option<BoundingBox>, label: &str) -> String {
    match bounding_box {
        Some(b) => format!(
            "  {} {} at ({:.0},{:.0})–({:.0},{:.0})",
            "▣".cyan(),
            label.bold(),
            b.x1,
            b.y1,
            b.x2,
            b.y2
        ),
        None => format!("  {} {}", "▣".cyan(), label.bold()),
    }
}

impl FeedbackSink for ConsoleSink {
    fn draw_overlay(&self, bounding_box: Option<BoundingBox>, label: &str) {
        println!("{}", overlay_line(bounding_box, label));
    }

    // Nothing persists on a terminal.
    fn clear_overlay(&self) {}

    fn set_banner_state(&self, state: BannerState) {
        println!();
        println!("{}", banner_line(state));
    }

    fn notify(&self, kind: NotificationKind, notice: &Notice) {
        println!("{}", notice_line(kind, notice));
    }

    fn show_intrusion_alert(&self) {
        println!();
        println!("{}", "  ⚠  INTRUSION ALERT: repeated zone-permission denials".red().bold());
    }

    fn hide_intrusion_alert(&self) {
        println!("{}", "  intrusion alert cleared".dimmed());
    }
}
