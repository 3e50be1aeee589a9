//! Structured view of a solver parameter file.
//!
//! The grammar is line oriented: `subsection <Name>` ... `end` blocks nest,
//! `set <Key> = <value>` assigns a value, `#` starts a comment and a trailing
//! backslash continues a value on the next line. Untouched lines are written
//! back exactly as they were read.

use std::fmt::Display;
use std::path::Path;

use crate::error::{Result, VeBenchError};

/// A single `set` entry and the subsections that enclose it
#[derive(Debug, Clone)]
pub struct Entry {
    path: Vec<String>,
    key: String,
    value: String,
    indent: String,
    // Source lines, kept until the entry is modified
    source: Option<Vec<String>>,
}

impl Entry {
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    fn matches(&self, selector: &[String]) -> bool {
        if selector.is_empty() || selector.len() > self.path.len() + 1 {
            return false;
        }
        let (key, sections) = match selector.split_last() {
            Some(parts) => parts,
            None => return false,
        };
        key == &self.key && self.path.ends_with(sections)
    }
}

#[derive(Debug, Clone)]
enum Line {
    Verbatim(String),
    Entry(Entry),
}

#[derive(Debug, Clone)]
pub struct ParameterFile {
    lines: Vec<Line>,
    trailing_newline: bool,
    /// `"\r\n"` when the source used CRLF line endings, `"\n"` otherwise
    line_ending: &'static str,
}

/// Collapses runs of whitespace the way the solver compares names
fn normalize(name: &str) -> String {
    name.split_whitespace().collect::<Vec<&str>>().join(" ")
}

fn strip_comment(text: &str) -> &str {
    match text.find('#') {
        Some(idx) => &text[..idx],
        None => text,
    }
}

/// Line ending to write back: CRLF when the text contains any
pub(crate) fn line_ending(contents: &str) -> &'static str {
    if contents.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// Splits a `Sub/Sub/Key` selector into normalized segments
fn parse_selector(selector: &str) -> Vec<String> {
    selector
        .split('/')
        .map(normalize)
        .filter(|s| !s.is_empty())
        .collect()
}

impl ParameterFile {
    /// Parses parameter-file text
    ///
    /// # Arguments
    /// * `contents` - The file contents
    /// * `source` - A name for the contents, used in error messages
    ///
    /// # Returns
    /// A ParameterFile preserving every line of the input
    pub fn parse(contents: &str, source: &str) -> Result<ParameterFile> {
        let mut lines: Vec<Line> = Vec::new();
        let mut sections: Vec<String> = Vec::new();
        let mut pending: Option<Entry> = None;

        for (line_no, line) in contents.lines().enumerate() {
            // Continuation of the previous `set` value
            if let Some(mut entry) = pending.take() {
                let piece = strip_comment(line).trim();
                let (piece, continues) = match piece.strip_suffix('\\') {
                    Some(p) => (p.trim_end(), true),
                    None => (piece, false),
                };
                if !piece.is_empty() {
                    if !entry.value.is_empty() {
                        entry.value.push(' ');
                    }
                    entry.value.push_str(piece);
                }
                if let Some(source) = entry.source.as_mut() {
                    source.push(line.to_string());
                }
                if continues {
                    pending = Some(entry);
                } else {
                    lines.push(Line::Entry(entry));
                }
                continue;
            }

            let trimmed = line.trim_start();
            let content = strip_comment(trimmed).trim_end();
            let mut words = content.split_whitespace();

            match words.next() {
                Some("subsection") => {
                    let name = normalize(&content["subsection".len()..]);
                    if name.is_empty() {
                        return Err(VeBenchError::Template(format!(
                            "{source} line {}: subsection without a name",
                            line_no + 1
                        )));
                    }
                    sections.push(name);
                    lines.push(Line::Verbatim(line.to_string()));
                }
                Some("end") if words.next().is_none() => {
                    if sections.pop().is_none() {
                        return Err(VeBenchError::Template(format!(
                            "{source} line {}: 'end' without an open subsection",
                            line_no + 1
                        )));
                    }
                    lines.push(Line::Verbatim(line.to_string()));
                }
                Some("set") => {
                    let assignment = &content["set".len()..];
                    let (key, value) = match assignment.split_once('=') {
                        Some(kv) => kv,
                        None => {
                            return Err(VeBenchError::Template(format!(
                                "{source} line {}: 'set' without '='",
                                line_no + 1
                            )))
                        }
                    };
                    let value = value.trim();
                    let (value, continues) = match value.strip_suffix('\\') {
                        Some(v) => (v.trim_end(), true),
                        None => (value, false),
                    };
                    let entry = Entry {
                        path: sections.clone(),
                        key: normalize(key),
                        value: value.to_string(),
                        indent: line[..line.len() - trimmed.len()].to_string(),
                        source: Some(vec![line.to_string()]),
                    };
                    if continues {
                        pending = Some(entry);
                    } else {
                        lines.push(Line::Entry(entry));
                    }
                }
                _ => lines.push(Line::Verbatim(line.to_string())),
            }
        }

        if let Some(entry) = pending {
            // A continuation on the last line; keep what was read
            lines.push(Line::Entry(entry));
        }
        if let Some(open) = sections.last() {
            return Err(VeBenchError::Template(format!(
                "{source}: subsection '{open}' is never closed"
            )));
        }

        Ok(ParameterFile {
            lines,
            trailing_newline: contents.ends_with('\n'),
            line_ending: line_ending(contents),
        })
    }

    /// Reads and parses a parameter file from disk
    pub fn read(path: &Path) -> Result<ParameterFile> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(VeBenchError::MissingTemplate(path.to_path_buf()))
            }
            Err(err) => return Err(VeBenchError::Io(err)),
        };
        ParameterFile::parse(&contents, &path.display().to_string())
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.lines.iter().filter_map(|l| match l {
            Line::Entry(e) => Some(e),
            Line::Verbatim(_) => None,
        })
    }

    fn find_index(&self, selector: &str) -> Result<usize> {
        let segments = parse_selector(selector);
        let matches: Vec<usize> = self
            .lines
            .iter()
            .enumerate()
            .filter_map(|(i, l)| match l {
                Line::Entry(e) if e.matches(&segments) => Some(i),
                _ => None,
            })
            .collect();

        match matches.len() {
            0 => Err(VeBenchError::MissingKey(selector.to_string())),
            1 => Ok(matches[0]),
            n => Err(VeBenchError::AmbiguousKey {
                selector: selector.to_string(),
                matches: n,
            }),
        }
    }

    /// Looks up the value of exactly one entry
    ///
    /// # Arguments
    /// * `selector` - A key, optionally prefixed by enclosing subsections
    ///   (`Material model/Viscoelastic/Fixed elastic time step`)
    pub fn get(&self, selector: &str) -> Result<&str> {
        match &self.lines[self.find_index(selector)?] {
            Line::Entry(e) => Ok(e.value.as_str()),
            Line::Verbatim(_) => Err(VeBenchError::MissingKey(selector.to_string())),
        }
    }

    /// Replaces the value of exactly one entry
    ///
    /// # Arguments
    /// * `selector` - A key, optionally prefixed by enclosing subsections
    /// * `value` - The new value
    pub fn set(&mut self, selector: &str, value: impl Display) -> Result<()> {
        let idx = self.find_index(selector)?;
        if let Line::Entry(entry) = &mut self.lines[idx] {
            entry.value = value.to_string();
            entry.source = None;
        }
        Ok(())
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.find_index(selector).is_ok()
    }
}

impl Display for ParameterFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut rendered: Vec<String> = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            match line {
                Line::Verbatim(text) => rendered.push(text.clone()),
                Line::Entry(entry) => match &entry.source {
                    Some(source) => rendered.extend(source.iter().cloned()),
                    None => rendered.push(format!(
                        "{}set {} = {}",
                        entry.indent, entry.key, entry.value
                    )),
                },
            }
        }
        write!(f, "{}", rendered.join(self.line_ending))?;
        if self.trailing_newline {
            write!(f, "{}", self.line_ending)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "\
# Viscoelastic stress relaxation
set Dimension = 2
set Output directory   = output
set Maximum time step                      = 125

subsection Mesh refinement
  set Initial global refinement          = 1
end

subsection Material model
  subsection Viscoelastic
    set Fixed elastic time step     = 125
    set Use fixed elastic time step = false
  end
end

subsection Initial composition model
  subsection Function
    set Function expression = 20e6; -20e6; 0; \\
                              0; 0; 0
  end
end

subsection Boundary composition model
  subsection Function
    set Function expression = 0; 0; 0; 0; 0; 0
  end
end
";

    #[test]
    fn untouched_file_is_reproduced_exactly() {
        let prm = ParameterFile::parse(TEMPLATE, "test.prm").unwrap();
        assert_eq!(prm.to_string(), TEMPLATE);
    }

    #[test]
    fn crlf_line_endings_are_kept() {
        let crlf = TEMPLATE.replace('\n', "\r\n");
        let mut prm = ParameterFile::parse(&crlf, "dos.prm").unwrap();
        assert_eq!(prm.to_string(), crlf);
        assert_eq!(prm.get("Initial global refinement").unwrap(), "1");

        prm.set("Initial global refinement", 4).unwrap();
        let rendered = prm.to_string();
        assert!(rendered.contains("set Initial global refinement = 4\r\n"));
        assert_eq!(rendered.matches('\n').count(), rendered.matches("\r\n").count());
    }

    #[test]
    fn keys_are_addressed_by_path() {
        let prm = ParameterFile::parse(TEMPLATE, "test.prm").unwrap();
        assert_eq!(prm.get("Initial global refinement").unwrap(), "1");
        assert_eq!(
            prm.get("Material model/Viscoelastic/Fixed elastic time step")
                .unwrap(),
            "125"
        );
        assert_eq!(
            prm.get("Initial composition model/Function/Function expression")
                .unwrap(),
            "20e6; -20e6; 0; 0; 0; 0"
        );
    }

    #[test]
    fn entries_carry_their_section_path() {
        let prm = ParameterFile::parse(TEMPLATE, "test.prm").unwrap();
        assert_eq!(prm.entries().count(), 8);

        let flag = prm
            .entries()
            .find(|e| e.key() == "Use fixed elastic time step")
            .unwrap();
        assert_eq!(flag.path(), ["Material model", "Viscoelastic"]);
        assert_eq!(flag.value(), "false");

        assert!(prm.contains("Viscoelastic/Use fixed elastic time step"));
        assert!(!prm.contains("Mesh refinement/Use fixed elastic time step"));
    }

    #[test]
    fn whitespace_in_keys_is_insignificant() {
        let prm = ParameterFile::parse(TEMPLATE, "test.prm").unwrap();
        assert_eq!(prm.get("Output   directory").unwrap(), "output");
    }

    #[test]
    fn ambiguous_and_missing_selectors_are_errors() {
        let prm = ParameterFile::parse(TEMPLATE, "test.prm").unwrap();
        assert!(matches!(
            prm.get("Function expression"),
            Err(VeBenchError::AmbiguousKey { matches: 2, .. })
        ));
        assert!(matches!(
            prm.get("Number of particles per cell per direction"),
            Err(VeBenchError::MissingKey(_))
        ));
    }

    #[test]
    fn set_rewrites_only_the_selected_line() {
        let mut prm = ParameterFile::parse(TEMPLATE, "test.prm").unwrap();
        prm.set("Initial global refinement", 4).unwrap();
        prm.set(
            "Initial composition model/Function/Function expression",
            "20e6; -20e6; 0; 1; -1; 0",
        )
        .unwrap();

        let rendered = prm.to_string();
        assert!(rendered.contains("  set Initial global refinement = 4\n"));
        assert!(rendered.contains("    set Function expression = 20e6; -20e6; 0; 1; -1; 0\n"));
        assert!(!rendered.contains("\\"));
        assert!(rendered.contains("    set Function expression = 0; 0; 0; 0; 0; 0\n"));
        assert!(rendered.contains("set Output directory   = output\n"));

        let reparsed = ParameterFile::parse(&rendered, "rendered.prm").unwrap();
        assert_eq!(reparsed.get("Initial global refinement").unwrap(), "4");
    }

    #[test]
    fn unbalanced_sections_are_rejected() {
        assert!(ParameterFile::parse("end\n", "bad.prm").is_err());
        assert!(ParameterFile::parse("subsection Mesh\nset A = 1\n", "bad.prm").is_err());
    }

    #[test]
    fn comments_are_not_part_of_values() {
        let prm = ParameterFile::parse("set End time = 250e3 # years\n", "c.prm").unwrap();
        assert_eq!(prm.get("End time").unwrap(), "250e3");
    }
}
