use std::io::Write;

const BAR_LENGTH: usize = 40;

/// `[.....     ] 12.50%` for `completed` out of `total`
pub fn render(completed: usize, total: usize) -> String {
    let progress = if total == 0 {
        1.0
    } else {
        completed as f64 / total as f64
    };
    let dots = (progress * BAR_LENGTH as f64).round() as usize;
    let empty = BAR_LENGTH.saturating_sub(dots);
    format!(
        "[{}{}] {:.2}%",
        ".".repeat(dots),
        " ".repeat(empty),
        progress * 100.0
    )
}

/// Redraws the bar in place on stderr
pub fn show(completed: usize, total: usize) {
    let mut stderr = std::io::stderr().lock();
    let _ = write!(stderr, "\r{}", render(completed, total));
    if completed >= total {
        let _ = writeln!(stderr);
    }
    let _ = stderr.flush();
}
