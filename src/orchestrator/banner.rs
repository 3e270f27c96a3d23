//! The "server ready" box printed once the session is up

use colored::Colorize;

/// Widest line inside the box
pub const WRAP_WIDTH: usize = 70;
const PADDING: usize = 1;

/// Word-wrap `text` to at most `width` columns. Words longer than `width`
/// are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..width).collect());
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }

        let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Uncolored box lines announcing `url`
pub fn banner_lines(url: &str) -> Vec<String> {
    let text = wrap(&format!("◈ Server now ready on {}", url), WRAP_WIDTH);
    let inner = text.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 2 * PADDING;

    let blank = format!("│{}│", " ".repeat(inner));
    let mut lines = vec![format!("┌{}┐", "─".repeat(inner)), blank.clone()];
    for line in &text {
        let free = inner - line.chars().count();
        let left = free / 2;
        lines.push(format!(
            "│{}{}{}│",
            " ".repeat(left),
            line,
            " ".repeat(free - left)
        ));
    }
    lines.push(blank);
    lines.push(format!("└{}┘", "─".repeat(inner)));
    lines
}

pub fn print_banner(url: &str) {
    println!();
    for line in banner_lines(url) {
        println!("   {}", line.truecolor(0, 199, 183).bold());
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_respects_width() {
        let lines = wrap("aaa bbb ccc", 7);
        assert_eq!(lines, vec!["aaa bbb", "ccc"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert!(wrap("", 10).is_empty());
    }

    #[test]
    fn test_banner_is_a_closed_box() {
        let lines = banner_lines("http://localhost:8888");
        assert_eq!(lines.len(), 5);
        assert!(lines[2].contains("◈ Server now ready on http://localhost:8888"));

        let width = lines[0].chars().count();
        assert!(lines.iter().all(|l| l.chars().count() == width));
        assert!(lines[0].starts_with('┌') && lines[4].starts_with('└'));
    }

    #[test]
    fn test_long_url_wraps_inside_box() {
        let url = format!("https://{}.netlify.live", "a".repeat(90));
        let lines = banner_lines(&url);
        assert!(lines.len() > 5);
        assert!(lines.iter().all(|l| l.chars().count() <= WRAP_WIDTH + 2 * PADDING + 2));
    }
}
