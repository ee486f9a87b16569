/// Inclusive 1-based line span around a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

impl Window {
    /// Window of `radius` lines either side of `line`, clipped to `[1, total]`.
    ///
    /// `line` is clamped into the file as well, so the result is valid for
    /// any input. An empty file yields the degenerate `1..=0` span.
    pub fn around(total: usize, line: usize, radius: usize) -> Self {
        if total == 0 {
            return Self { start: 1, end: 0 };
        }
        let line = line.clamp(1, total);
        Self {
            start: line.saturating_sub(radius).max(1),
            end: line.saturating_add(radius).min(total),
        }
    }

    pub fn len(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The lines inside the window.
    pub fn slice<'a, S: AsRef<str>>(&self, lines: &'a [S]) -> &'a [S] {
        if self.is_empty() {
            return &lines[0..0];
        }
        let end = self.end.min(lines.len());
        let start = (self.start - 1).min(end);
        &lines[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clips_at_both_edges() {
        assert_eq!(Window::around(10, 2, 3), Window { start: 1, end: 5 });
        assert_eq!(Window::around(10, 9, 3), Window { start: 6, end: 10 });
        assert_eq!(Window::around(4, 2, 100), Window { start: 1, end: 4 });
    }

    #[test]
    fn zero_radius_is_the_matched_line() {
        let lines = ["a", "b", "c"];
        let w = Window::around(3, 2, 0);
        assert_eq!(w, Window { start: 2, end: 2 });
        assert_eq!(w.slice(&lines), &["b"]);
    }

    #[test]
    fn never_leaves_file_bounds() {
        for total in 1..8usize {
            for line in 0..12usize {
                for radius in 0..6usize {
                    let w = Window::around(total, line, radius);
                    assert!(w.start >= 1);
                    assert!(w.end <= total);
                    assert!(w.start <= w.end);
                }
            }
        }
    }

    #[test]
    fn empty_file_gives_empty_slice() {
        let lines: [&str; 0] = [];
        let w = Window::around(0, 1, 3);
        assert!(w.is_empty());
        assert!(w.slice(&lines).is_empty());
    }
}
