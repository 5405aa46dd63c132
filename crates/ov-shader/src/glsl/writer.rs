//! Indented GLSL source writer

const INDENT: &str = "    ";

/// Accumulates GLSL lines at the current indentation depth
#[derive(Debug, Default)]
pub struct CodeWriter {
    out: String,
    depth: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one line at the current depth
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(INDENT);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn lines<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for l in lines {
            self.line(l);
        }
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Write `header {` and indent what follows
    pub fn open(&mut self, header: impl AsRef<str>) {
        self.line(format!("{} {{", header.as_ref()));
        self.depth += 1;
    }

    /// Dedent and close the innermost block
    pub fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    /// Append everything written to `other`, as is
    pub fn append(&mut self, other: CodeWriter) {
        self.out.push_str(&other.out);
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_blocks() {
        let mut w = CodeWriter::new();
        w.open("void main()");
        w.open("if (p0)");
        w.line("r0 = 1.0;");
        w.close();
        w.close();
        assert_eq!(w.depth(), 0);
        assert_eq!(w.finish(), "void main() {\n    if (p0) {\n        r0 = 1.0;\n    }\n}\n");
    }

    #[test]
    fn test_blank_lines_carry_no_indent() {
        let mut w = CodeWriter::new();
        w.indent();
        w.line("");
        w.blank();
        w.dedent();
        w.dedent();
        assert_eq!(w.finish(), "\n\n");
    }
}
