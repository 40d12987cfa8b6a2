use std::fmt::{self, Write as _};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Info,
    Warn,
    Fail,
}

impl Status {
    fn tag(&self) -> &'static str {
        match self {
            Status::Ok => "[ok]  ",
            Status::Info => "[..]  ",
            Status::Warn => "[warn]",
            Status::Fail => "[FAIL]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub status: Status,
    pub text: String,
}

/// Human-readable run summary for the operator's console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub title: String,
    pub lines: Vec<ReportLine>,
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            lines: Vec::new(),
        }
    }

    pub fn push(&mut self, status: Status, text: impl Into<String>) {
        let text = text.into();
        match status {
            Status::Ok | Status::Info => info!(target = "report", report = %self.title, "{text}"),
            Status::Warn => warn!(target = "report", report = %self.title, "{text}"),
            Status::Fail => error!(target = "report", report = %self.title, "{text}"),
        }
        self.lines.push(ReportLine { status, text });
    }

    pub fn ok(&mut self, text: impl Into<String>) {
        self.push(Status::Ok, text);
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.push(Status::Info, text);
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        self.push(Status::Warn, text);
    }

    pub fn fail(&mut self, text: impl Into<String>) {
        self.push(Status::Fail, text);
    }

    /// Multi-line remediation text, printed verbatim under the line that needs it.
    pub fn remediation(&mut self, block: &str) {
        for line in block.lines() {
            self.lines.push(ReportLine {
                status: Status::Info,
                text: format!("    {line}"),
            });
        }
    }

    pub fn count(&self, status: Status) -> usize {
        self.lines.iter().filter(|l| l.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(Status::Fail) > 0
    }

    pub fn print(&self) {
        println!("{self}");
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        writeln!(out, "== {} ==", self.title)?;
        for line in &self.lines {
            writeln!(out, "{} {}", line.status.tag(), line.text)?;
        }
        write!(
            out,
            "-- {} ok, {} warn, {} failed",
            self.count(Status::Ok),
            self.count(Status::Warn),
            self.count(Status::Fail)
        )?;
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_lines_and_tally() {
        let mut r = Report::new("probe");
        r.ok("planning_cuisine: 3 rows");
        r.warn("absences_cuisine: empty");
        r.fail("creneaux_cuisine: permission denied");
        r.remediation("open the dashboard\nrun the SQL");
        let text = r.to_string();
        assert!(text.starts_with("== probe =="));
        assert!(text.contains("[FAIL] creneaux_cuisine: permission denied"));
        assert!(text.contains("    run the SQL"));
        assert!(text.ends_with("-- 1 ok, 1 warn, 1 failed"));
        assert!(r.has_failures());
    }
}
