use terminal_size::{terminal_size, Width};

/// Plain rows-and-columns listing rendered as an ASCII box table.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self { columns: columns.into_iter().map(Into::into).collect(), rows: Vec::new() }
    }

    pub fn row<S: Into<String>>(&mut self, cells: impl IntoIterator<Item = S>) {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Lines of the table, each at most `termw` visible characters wide. With
    /// `color` the header is green.
    pub fn render(&self, termw: usize, color: bool) -> Vec<String> {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| visible_len(c).min(termw)).collect();
        for r in &self.rows {
            for (i, cell) in r.iter().enumerate().take(widths.len()) {
                let w = visible_len(cell);
                if w > widths[i] { widths[i] = w.min(termw); }
            }
        }

        let sep = build_separator(&widths);
        let mut out = Vec::with_capacity(self.rows.len() + 5);
        out.push(fit_line_to_width(&sep, termw));
        out.push(fit_line_to_width(&build_header(&self.columns, &widths, color), termw));
        out.push(fit_line_to_width(&sep, termw));
        for r in &self.rows {
            out.push(fit_line_to_width(&build_row(r, &widths), termw));
        }
        out.push(fit_line_to_width(&sep, termw));
        out.push(format!("rows: {}", self.rows.len()));
        out
    }
}

/// Usable terminal width, or 80 when stdout is not a terminal.
pub fn terminal_width() -> usize {
    match terminal_size() {
        Some((Width(w), _)) if w > 4 => (w - 4) as usize,
        _ => 80,
    }
}

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::from("+");
    for w in widths {
        s.push_str(&"-".repeat(*w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        let text = truncate(cell, *w);
        let pad = " ".repeat(w.saturating_sub(visible_len(&text)));
        s.push(' ');
        // numbers line up on the right
        if is_numeric_like(cell) {
            s.push_str(&pad);
            s.push_str(&text);
        } else {
            s.push_str(&text);
            s.push_str(&pad);
        }
        s.push_str(" |");
    }
    s
}

fn build_header(cells: &[String], widths: &[usize], color: bool) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        let text = truncate(cell, *w);
        let pad = " ".repeat(w.saturating_sub(visible_len(&text)));
        s.push(' ');
        if color {
            s.push_str(&format!("\x1b[32m{text}\x1b[0m"));
        } else {
            s.push_str(&text);
        }
        s.push_str(&pad);
        s.push_str(" |");
    }
    s
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

fn is_numeric_like(s: &str) -> bool {
    let st = s.trim();
    let mut has_digit = false;
    for ch in st.chars() {
        if ch.is_ascii_digit() { has_digit = true; continue; }
        if ".-+,_".contains(ch) { continue; }
        return false;
    }
    has_digit
}

fn fit_line_to_width(s: &str, maxw: usize) -> String {
    if visible_len(s) <= maxw { return s.to_string(); }
    elide_middle(s, maxw)
}

/// Byte length of the ANSI CSI sequence starting at `i`, if any.
fn ansi_len(bytes: &[u8], i: usize) -> Option<usize> {
    if bytes.get(i) != Some(&0x1B) { return None; }
    let mut j = i + 1;
    if bytes.get(j) == Some(&b'[') {
        j += 1;
        while j < bytes.len() {
            let b = bytes[j];
            j += 1;
            if b.is_ascii_alphabetic() { break; }
        }
    }
    Some(j - i)
}

/// Visible characters, not counting ANSI escapes.
fn visible_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut count = 0;
    while i < bytes.len() {
        if let Some(n) = ansi_len(bytes, i) {
            i += n;
            continue;
        }
        let ch_len = s[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        count += 1;
        i += ch_len;
    }
    count
}

/// Keep the head and tail of `s` around a `...`, escapes included.
fn elide_middle(s: &str, maxw: usize) -> String {
    if maxw <= 3 { return "…".repeat(maxw.min(1)); }
    let budget = maxw - 3;
    let front_keep = budget / 2;
    let back_keep = budget - front_keep;

    // (text, visible) runs; escapes have zero width
    let mut toks: Vec<(&str, usize)> = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if let Some(n) = ansi_len(bytes, i) {
            toks.push((&s[i..i + n], 0));
            i += n;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i] != 0x1B {
            i += s[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        }
        toks.push((&s[start..i], s[start..i].chars().count()));
    }

    let mut front = String::new();
    let mut taken = 0usize;
    for (text, vis) in &toks {
        if *vis == 0 {
            front.push_str(text);
        } else if taken + vis <= front_keep {
            front.push_str(text);
            taken += vis;
        } else {
            front.extend(text.chars().take(front_keep - taken));
            break;
        }
    }

    let mut back: Vec<String> = Vec::new();
    let mut taken = 0usize;
    for (text, vis) in toks.iter().rev() {
        if *vis == 0 {
            back.push(text.to_string());
        } else if taken + vis <= back_keep {
            back.push(text.to_string());
            taken += vis;
        } else {
            let need = back_keep - taken;
            back.push(text.chars().skip(vis - need).collect());
            break;
        }
    }
    back.reverse();

    let mut out = front;
    out.push_str("...");
    out.push_str(&back.concat());
    out.push_str("\x1b[0m");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_boxed_rows() {
        let mut t = Table::new(["#", "Chapter"]);
        t.row(["1", "Vectors"]);
        t.row(["12", "Motion"]);
        let lines = t.render(80, false);
        assert_eq!(lines, vec![
            "+----+---------+",
            "| #  | Chapter |",
            "+----+---------+",
            "|  1 | Vectors |",
            "| 12 | Motion  |",
            "+----+---------+",
            "rows: 2",
        ]);
    }

    #[test]
    fn lines_fit_narrow_terminals() {
        let mut t = Table::new(["Label"]);
        t.row(["A very long resource label that does not fit"]);
        for line in t.render(20, true) {
            assert!(visible_len(&line) <= 20, "{line}");
        }
    }

    #[test]
    fn escapes_have_no_width() {
        assert_eq!(visible_len("\x1b[32mabc\x1b[0m"), 3);
        assert_eq!(visible_len("অধ্যায়"), "অধ্যায়".chars().count());
        let elided = elide_middle("\x1b[32mabcdefghij\x1b[0m", 7);
        assert_eq!(visible_len(&elided), 7);
        assert!(elided.starts_with("\x1b[32mab"));
    }
}
