//! `msav scan`: walk files and directories and scan each file.

use std::fs::{self, File};
use std::io::{IsTerminal, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use msav_client::{Antivirus, Transport};
use msav_core::{EngineVersion, Verdict};

use super::ConnectArgs;

/// Arguments for `msav scan`.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Files or directories to scan (default: current directory).
    pub paths: Vec<PathBuf>,

    /// Do not display the names of scanned files.
    #[arg(short = 'f', long)]
    pub no_file_names: bool,

    /// Emit a machine-readable JSON report instead of console output.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub connect: ConnectArgs,
}

impl ScanArgs {
    pub fn run(self) -> Result<()> {
        let mut av = self.connect.connect()?;

        let Some(version) = av.version() else {
            av.end_session();
            bail!("{} engine not available.", av.engine_name());
        };

        if !self.json {
            println!("\n{}\n", "Anti-Virus Scanner".bold());
            println!("    Detection engine     : {}", version.engine);
            println!("    Database revision    : {}\n", version.database);
        }

        let roots = resolve_roots(&self.paths)?;
        let output = if self.json {
            Output::Quiet
        } else if self.no_file_names {
            Output::FindingsOnly
        } else if std::io::stdout().is_terminal() {
            Output::Progress
        } else {
            Output::FindingsOnly
        };

        let mut walker = Walker::new(&mut av, output);
        let flow = walker.scan_roots(&roots);
        let report = walker.report;
        av.end_session();

        let aborted = match flow {
            ControlFlow::Break(verdict) => Some(verdict),
            ControlFlow::Continue(()) => None,
        };

        if self.json {
            print_json(av.engine_name(), &version, &report, aborted.as_ref())?;
        } else if aborted.is_none() {
            print_summary(&report);
        }

        if let Some(verdict) = aborted {
            bail!("scan aborted: {verdict}");
        }
        Ok(())
    }
}

/// Canonical, sorted, de-duplicated scan roots. Paths that do not exist are
/// reported and skipped.
fn resolve_roots(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if paths.is_empty() {
        let cwd = std::env::current_dir().context("could not determine current directory")?;
        return Ok(vec![cwd]);
    }

    let mut roots: Vec<PathBuf> = paths
        .iter()
        .filter_map(|path| match path.canonicalize() {
            Ok(root) => Some(root),
            Err(err) => {
                eprintln!("illegal path: {} ({err})", path.display());
                None
            }
        })
        .collect();
    roots.sort();
    roots.dedup();
    Ok(roots)
}

// ---------------------------------------------------------------------------
// Walk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    /// Current file name on one line, erased again when the file is clean.
    Progress,
    FindingsOnly,
    Quiet,
}

#[derive(Debug, Default, Clone, Serialize)]
struct ScanSummary {
    directories: usize,
    files: usize,
    total_size: u64,
    infected: usize,
    skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
struct Finding {
    path: String,
    result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    malware: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize)]
struct ScanReport {
    summary: ScanSummary,
    findings: Vec<Finding>,
}

struct Walker<'a, T: Transport> {
    av: &'a mut Antivirus<T>,
    output: Output,
    report: ScanReport,
}

impl<'a, T: Transport> Walker<'a, T> {
    fn new(av: &'a mut Antivirus<T>, output: Output) -> Self {
        Self {
            av,
            output,
            report: ScanReport::default(),
        }
    }

    fn scan_roots(&mut self, roots: &[PathBuf]) -> ControlFlow<Verdict> {
        for root in roots {
            if root.is_dir() {
                if self.output != Output::Quiet {
                    println!("{}\n", format!("Scanning {}", root.display()).bold());
                }
                self.scan_dir(root)?;
            } else {
                let size = fs::metadata(root).map(|m| m.len()).unwrap_or(0);
                self.scan_file(root, size)?;
            }
        }
        ControlFlow::Continue(())
    }

    fn scan_dir(&mut self, dir: &Path) -> ControlFlow<Verdict> {
        self.report.summary.directories += 1;

        let mut entries: Vec<_> = match fs::read_dir(dir) {
            Ok(read_dir) => read_dir.filter_map(|e| e.ok()).collect(),
            Err(err) => {
                tracing::warn!(path = %dir.display(), error = %err, "cannot list directory");
                return ControlFlow::Continue(());
            }
        };
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                self.scan_dir(&path)?;
            } else if let Ok(meta) = fs::metadata(&path) {
                if meta.is_file() {
                    self.scan_file(&path, meta.len())?;
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn scan_file(&mut self, path: &Path, size: u64) -> ControlFlow<Verdict> {
        self.report.summary.files += 1;
        self.report.summary.total_size += size;

        let shown = path.display().to_string();
        if self.output == Output::Progress {
            print!("    {shown}");
            let _ = std::io::stdout().flush();
        }

        let verdict = match File::open(path) {
            Ok(mut file) => self.av.scan(&mut file, &shown),
            Err(err) => {
                tracing::debug!(path = %shown, error = %err, "cannot open file");
                self.report.summary.skipped += 1;
                self.print_finding(&shown, "error opening file".to_string());
                self.report.findings.push(Finding {
                    path: shown,
                    result: "open_error",
                    malware: None,
                });
                return ControlFlow::Continue(());
            }
        };

        if verdict.is_clean() {
            if self.output == Output::Progress {
                print!("\r\x1b[K");
                let _ = std::io::stdout().flush();
            }
            return ControlFlow::Continue(());
        }

        if verdict.is_infected() {
            self.report.summary.infected += 1;
        } else {
            self.report.summary.skipped += 1;
        }

        let message = match verdict.name() {
            Some(name) => format!("detected {}", name.red()),
            None => verdict.to_string(),
        };
        self.print_finding(&shown, message);
        self.report.findings.push(Finding {
            path: shown,
            result: verdict_key(&verdict),
            malware: verdict.name().map(str::to_owned),
        });

        if verdict.should_continue() {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(verdict)
        }
    }

    fn print_finding(&self, shown: &str, message: String) {
        match self.output {
            Output::Progress => println!("\n    - {message}\n"),
            Output::FindingsOnly => println!("    {shown}\n    - {message}\n"),
            Output::Quiet => {}
        }
    }
}

fn verdict_key(verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::Clean => "clean",
        Verdict::Infected { .. } => "infected",
        Verdict::ReadError => "read_error",
        Verdict::FileTooLarge => "file_too_large",
        Verdict::ConnectionLost => "connection_lost",
        Verdict::ScannerError => "scanner_error",
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "file")]
    path: String,
    #[tabled(rename = "result")]
    result: String,
}

fn print_summary(report: &ScanReport) {
    let summary = &report.summary;
    println!("{}\n", "Summary".bold());
    println!("    Directories    : {}", summary.directories);
    println!(
        "    Files          : {} ({})",
        summary.files,
        format_size(summary.total_size)
    );
    if summary.infected > 0 {
        println!(
            "    - infected     : {}",
            summary.infected.to_string().red().bold()
        );
    } else {
        println!("    - infected     : 0");
    }
    println!("    - skipped      : {}", summary.skipped);
    println!();

    if report.findings.is_empty() {
        return;
    }

    let rows: Vec<FindingRow> = report
        .findings
        .iter()
        .map(|finding| FindingRow {
            path: finding.path.clone(),
            result: match &finding.malware {
                Some(name) => format!("{} ({name})", finding.result),
                None => finding.result.to_string(),
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

#[derive(Serialize)]
struct ScanReportJson<'a> {
    engine_name: &'a str,
    engine: &'a EngineVersion,
    summary: &'a ScanSummary,
    findings: &'a [Finding],
    #[serde(skip_serializing_if = "Option::is_none")]
    aborted: Option<&'static str>,
}

fn print_json(
    engine_name: &str,
    version: &EngineVersion,
    report: &ScanReport,
    aborted: Option<&Verdict>,
) -> Result<()> {
    let payload = ScanReportJson {
        engine_name,
        engine: version,
        summary: &report.summary,
        findings: &report.findings,
        aborted: aborted.map(verdict_key),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize scan JSON")?
    );
    Ok(())
}

/// Human-readable byte count with binary units.
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
