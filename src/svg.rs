use std::fmt::Write;

pub const FONT: &str = "'Segoe UI', Ubuntu, Sans-Serif";

pub const CARD_BG: &str = "#161b22";
pub const TEXT: &str = "#c9d1d9";
pub const GRID: &str = "#21262d";
pub const BLUE: &str = "#58a6ff";
pub const GOLD: &str = "#e3b341";
pub const SILVER: &str = "#c0c0c0";
pub const BRONZE: &str = "#cd7f32";
pub const GREEN: &str = "#3fb950";
pub const RED: &str = "#f85149";
pub const PURPLE: &str = "#bc8cff";

pub fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Short form for axis labels, e.g. 2_836_638 -> "2.8M".
pub fn compact_number(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if magnitude >= 10_000.0 {
        format!("{:.0}K", value / 1_000.0)
    } else if magnitude >= 1_000.0 {
        format!("{:.1}K", value / 1_000.0)
    } else {
        format!("{value:.0}")
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Cuts `text` to at most `max_chars` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn open(out: &mut String, width: u32, height: u32) {
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" style="max-width: 100%;" viewBox="0 0 {width} {height}">"#
    );
}

pub fn card_background(out: &mut String, width: u32, height: u32) {
    let _ = writeln!(
        out,
        r#"<rect x="0.5" y="0.5" rx="4.5" width="{}" height="{}" fill="{CARD_BG}" stroke="{GRID}"/>"#,
        width - 1,
        height - 1
    );
}

pub fn close(out: &mut String) {
    out.push_str("</svg>\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_groups_digits() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1_000), "1,000");
        assert_eq!(thousands(2_836_638), "2,836,638");
    }

    #[test]
    fn compact_numbers_pick_a_unit() {
        assert_eq!(compact_number(512.0), "512");
        assert_eq!(compact_number(1_500.0), "1.5K");
        assert_eq!(compact_number(45_000.0), "45K");
        assert_eq!(compact_number(2_836_638.0), "2.8M");
    }

    #[test]
    fn escape_and_truncate() {
        assert_eq!(escape("C++ & <Lisp>"), "C++ &amp; &lt;Lisp&gt;");
        assert_eq!(truncate("short", 22), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }
}
