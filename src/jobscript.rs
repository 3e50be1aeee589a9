//! Batch job scripts: scheduler directives plus the solver invocation.

use std::fmt::Display;
use std::path::Path;

use crate::error::{Result, VeBenchError};
use crate::parameters::line_ending;

#[derive(Debug, Clone)]
struct Directive {
    flag: String,
    value: String,
    separator: char,
    source: Option<String>,
}

#[derive(Debug, Clone)]
enum JobLine {
    Verbatim(String),
    Directive(Directive),
}

#[derive(Debug, Clone)]
pub struct JobScript {
    prefix: String,
    lines: Vec<JobLine>,
    trailing_newline: bool,
    /// `"\r\n"` when the source used CRLF line endings, `"\n"` otherwise
    line_ending: &'static str,
}

/// Parses the part of a directive line after the prefix
fn parse_directive(rest: &str, line: &str) -> Option<Directive> {
    let rest = rest.trim();
    let first = rest.split_whitespace().next()?;

    let (flag, value, separator) = match first.split_once('=') {
        Some((flag, value)) => {
            let tail = rest[first.len()..].trim();
            let value = if tail.is_empty() {
                value.to_string()
            } else {
                format!("{value} {tail}")
            };
            (flag.to_string(), value, '=')
        }
        None => (first.to_string(), rest[first.len()..].trim().to_string(), ' '),
    };

    Some(Directive {
        flag,
        value,
        separator,
        source: Some(line.to_string()),
    })
}

impl JobScript {
    /// Parses a job script
    ///
    /// # Arguments
    /// * `contents` - The script text
    /// * `prefix` - The scheduler directive prefix, e.g. `#SBATCH`
    pub fn parse(contents: &str, prefix: &str) -> JobScript {
        let lines = contents
            .lines()
            .map(|line| {
                let directive = line
                    .trim_start()
                    .strip_prefix(prefix)
                    .filter(|rest| rest.starts_with(char::is_whitespace))
                    .and_then(|rest| parse_directive(rest, line));
                match directive {
                    Some(d) => JobLine::Directive(d),
                    None => JobLine::Verbatim(line.to_string()),
                }
            })
            .collect();

        JobScript {
            prefix: prefix.to_string(),
            lines,
            trailing_newline: contents.ends_with('\n'),
            line_ending: line_ending(contents),
        }
    }

    /// Reads a job script template from disk
    pub fn read(path: &Path, prefix: &str) -> Result<JobScript> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(JobScript::parse(&contents, prefix)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(VeBenchError::MissingTemplate(path.to_path_buf()))
            }
            Err(err) => Err(VeBenchError::Io(err)),
        }
    }

    pub fn directive(&self, flag: &str) -> Option<&str> {
        self.lines.iter().find_map(|l| match l {
            JobLine::Directive(d) if d.flag == flag => Some(d.value.as_str()),
            _ => None,
        })
    }

    /// Sets a scheduler directive, adding it after the existing directives
    /// when the template does not carry it yet.
    pub fn set_directive(&mut self, flag: &str, value: impl Display) {
        let value = value.to_string();

        for line in self.lines.iter_mut() {
            if let JobLine::Directive(d) = line {
                if d.flag == flag {
                    d.value = value;
                    d.source = None;
                    return;
                }
            }
        }

        let last_directive = self
            .lines
            .iter()
            .rposition(|l| matches!(l, JobLine::Directive(_)));
        let insert_at = match last_directive {
            Some(idx) => idx + 1,
            None => match self.lines.first() {
                Some(JobLine::Verbatim(first)) if first.starts_with("#!") => 1,
                _ => 0,
            },
        };

        self.lines.insert(
            insert_at,
            JobLine::Directive(Directive {
                flag: flag.to_string(),
                value,
                separator: ' ',
                source: None,
            }),
        );
    }

    /// Replaces the first non-comment line containing `trigger`
    ///
    /// # Arguments
    /// * `trigger` - A word identifying the command line, e.g. `mpirun`
    /// * `command` - The full replacement line
    pub fn replace_command(&mut self, trigger: &str, command: &str) -> Result<()> {
        for line in self.lines.iter_mut() {
            if let JobLine::Verbatim(text) = line {
                if !text.trim_start().starts_with('#') && text.contains(trigger) {
                    *text = command.to_string();
                    return Ok(());
                }
            }
        }

        Err(VeBenchError::Template(format!(
            "job script has no command line containing '{trigger}'"
        )))
    }
}

impl Display for JobScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self
            .lines
            .iter()
            .map(|line| match line {
                JobLine::Verbatim(text) => text.clone(),
                JobLine::Directive(d) => match &d.source {
                    Some(source) => source.clone(),
                    None if d.value.is_empty() => format!("{} {}", self.prefix, d.flag),
                    None => format!("{} {}{}{}", self.prefix, d.flag, d.separator, d.value),
                },
            })
            .collect();

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

    const JOBSCRIPT: &str = "\
#!/bin/bash
#SBATCH -J ve_relaxation
#SBATCH -t 01:00:00
#SBATCH --nodes=1
#SBATCH --tasks-per-node 48
#SBATCH -p standard96:test

export OMP_NUM_THREADS=1
# launched with mpirun below
mpirun ./aspect input.prm > opla
";

    #[test]
    fn untouched_script_is_reproduced() {
        let job = JobScript::parse(JOBSCRIPT, "#SBATCH");
        assert_eq!(job.to_string(), JOBSCRIPT);
    }

    #[test]
    fn crlf_script_keeps_its_line_endings() {
        let crlf = JOBSCRIPT.replace('\n', "\r\n");
        let mut job = JobScript::parse(&crlf, "#SBATCH");
        assert_eq!(job.to_string(), crlf);
        assert_eq!(job.directive("-J"), Some("ve_relaxation"));

        job.set_directive("--mem", "4G");
        let rendered = job.to_string();
        assert!(rendered.contains("#SBATCH --mem 4G\r\n"));
        assert!(rendered.ends_with("> opla\r\n"));
        assert_eq!(rendered.matches('\n').count(), rendered.matches("\r\n").count());
    }

    #[test]
    fn directives_are_parsed_with_both_separators() {
        let job = JobScript::parse(JOBSCRIPT, "#SBATCH");
        assert_eq!(job.directive("-J"), Some("ve_relaxation"));
        assert_eq!(job.directive("--nodes"), Some("1"));
        assert_eq!(job.directive("--tasks-per-node"), Some("48"));
        assert_eq!(job.directive("--mem"), None);
    }

    #[test]
    fn set_directive_updates_in_place_and_keeps_separator() {
        let mut job = JobScript::parse(JOBSCRIPT, "#SBATCH");
        job.set_directive("-J", "ve_relaxation_dtc250_dte500_GR2");
        job.set_directive("--nodes", 2);

        let rendered = job.to_string();
        assert!(rendered.contains("#SBATCH -J ve_relaxation_dtc250_dte500_GR2\n"));
        assert!(rendered.contains("#SBATCH --nodes=2\n"));
        assert!(rendered.contains("#SBATCH -t 01:00:00\n"));
    }

    #[test]
    fn missing_directive_is_inserted_after_the_last_one() {
        let mut job = JobScript::parse(JOBSCRIPT, "#SBATCH");
        job.set_directive("--mem", "4G");
        let rendered = job.to_string();
        assert!(rendered.contains("#SBATCH -p standard96:test\n#SBATCH --mem 4G\n"));

        let mut bare = JobScript::parse("#!/bin/bash\nmpirun x\n", "#SBATCH");
        bare.set_directive("-J", "name");
        assert_eq!(bare.to_string(), "#!/bin/bash\n#SBATCH -J name\nmpirun x\n");
    }

    #[test]
    fn command_line_is_replaced_but_comments_are_not() {
        let mut job = JobScript::parse(JOBSCRIPT, "#SBATCH");
        job.replace_command("mpirun", "mpirun /opt/aspect run.prm > out/opla")
            .unwrap();
        let rendered = job.to_string();
        assert!(rendered.contains("# launched with mpirun below\n"));
        assert!(rendered.contains("\nmpirun /opt/aspect run.prm > out/opla\n"));

        let mut no_command = JobScript::parse("#!/bin/bash\n", "#SBATCH");
        assert!(no_command.replace_command("mpirun", "x").is_err());
    }
}
