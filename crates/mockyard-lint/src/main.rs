//! Mockyard project linter CLI.
//!
//! Usage:
//!   mockyard-lint <directory_or_file> [OPTIONS]

use clap::{Parser, ValueEnum};
use mockyard_lint::{is_project_file, lint_file, load_value, LintIssue, LintOptions, LintResult, Severity};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Mockyard project linter
#[derive(Parser, Debug)]
#[command(name = "mockyard-lint")]
#[command(author, version, about = "Validate Mockyard project files before loading them")]
struct Args {
    /// Project file or directory of project files
    #[arg(required = true)]
    path: PathBuf,

    /// Rewrite non-string header values as strings
    #[arg(short, long)]
    fix: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Only show errors (hide warnings)
    #[arg(short = 'e', long)]
    errors_only: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Treat warnings as errors
    #[arg(short, long)]
    strict: bool,

    /// Skip preset binding checks
    #[arg(long)]
    skip_presets: bool,
}

fn main() {
    let args = Args::parse();
    let text = args.output == OutputFormat::Text;

    if text {
        println!("{BOLD}{CYAN}Mockyard Project Linter{RESET}");
        println!("{DIM}{RULE}{RESET}");
    }

    let options = LintOptions {
        verbose: args.verbose,
        skip_presets: args.skip_presets,
    };

    let files = collect_project_files(&args.path);
    if files.is_empty() {
        if text {
            println!(
                "{YELLOW}Warning:{RESET} No project files found in {}",
                args.path.display()
            );
        }
        std::process::exit(0);
    }

    if text {
        println!("{DIM}Scanning:{RESET} {CYAN}{}{RESET}", args.path.display());
        println!("{DIM}Found:{RESET}    {BOLD}{}{RESET} project file(s)\n", files.len());
    }

    let mut result = LintResult::new();
    for file in &files {
        result.merge(lint_file(file, &options));
    }

    match args.output {
        OutputFormat::Json => print_results_json(&result),
        OutputFormat::Text => print_results(&result, &args),
    }

    if args.fix {
        let fixed = apply_fixes(&files);
        if text {
            println!("\n{GREEN}Applied {fixed} fixes{RESET}");
        }
    }

    let failed = result.has_errors() || (args.strict && result.has_warnings());
    std::process::exit(if failed { 1 } else { 0 });
}

fn collect_project_files(path: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if path.is_file() {
        if is_project_file(path) {
            files.push(path.to_path_buf());
        }
    } else if path.is_dir() {
        if let Ok(entries) = std::fs::read_dir(path) {
            files.extend(
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| p.is_file() && is_project_file(p)),
            );
        }
    }

    files.sort();
    files
}

fn print_results_json(result: &LintResult) {
    match serde_json::to_string_pretty(result) {
        Ok(output) => println!("{output}"),
        Err(e) => eprintln!("Failed to serialize results: {e}"),
    }
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => RED,
        Severity::Warning => YELLOW,
        Severity::Info => CYAN,
    }
}

fn print_issue(issue: &LintIssue) {
    let color = severity_color(issue.severity);
    let marker = format!("{color}|{RESET}");
    let location = issue
        .location
        .as_ref()
        .map(|l| format!("{DIM}[{RESET}{CYAN}{l}{RESET}{DIM}]{RESET} "))
        .unwrap_or_default();

    println!(
        "  {marker} {location}{BOLD}{color}{}{RESET}: {} {DIM}({color}{}{DIM}){RESET}",
        issue.severity.label(),
        issue.message,
        issue.code
    );
    if let Some(suggestion) = &issue.suggestion {
        println!("  {marker}   {GREEN}-> {suggestion}{RESET}");
    }
}

fn print_results(result: &LintResult, args: &Args) {
    if result.issues.is_empty() {
        println!("{GREEN}{BOLD}No issues found!{RESET}");
    }

    let mut by_file: BTreeMap<&PathBuf, Vec<&LintIssue>> = BTreeMap::new();
    for issue in &result.issues {
        if args.errors_only && issue.severity != Severity::Error {
            continue;
        }
        if issue.severity == Severity::Info && !args.verbose {
            continue;
        }
        by_file.entry(&issue.file).or_default().push(issue);
    }

    for (file, issues) in by_file {
        let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
        let warnings = issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count();
        let status = if errors > 0 {
            format!("{RED}FAIL{RESET}")
        } else {
            format!("{YELLOW}WARN{RESET}")
        };
        let file_name = file.file_name().unwrap_or_default().to_string_lossy();
        println!(
            "{status} {BOLD}{CYAN}{file_name}{RESET} {DIM}({errors} error(s), {warnings} warning(s)){RESET}"
        );
        for issue in issues {
            print_issue(issue);
        }
        println!();
    }

    println!("{DIM}{RULE}{RESET}");
    println!("{BOLD}{CYAN}Summary{RESET}");
    println!("{DIM}{RULE}{RESET}");
    println!("  {DIM}Files checked:{RESET} {BOLD}{}{RESET}", result.files_checked);
    let error_color = if result.errors > 0 { RED } else { GREEN };
    println!("  {error_color}Errors:{RESET}    {BOLD}{}{RESET}", result.errors);
    let warning_color = if result.warnings > 0 { YELLOW } else { DIM };
    println!("  {warning_color}Warnings:{RESET}  {BOLD}{}{RESET}", result.warnings);
    println!();

    if result.is_valid() && !result.has_warnings() {
        println!("{GREEN}{BOLD}All checks passed!{RESET}");
    } else if result.is_valid() {
        println!("{YELLOW}{BOLD}Passed with warnings{RESET}");
    } else {
        println!("{RED}{BOLD}Linting failed with errors{RESET}");
    }
}

/// Stringify numeric and boolean header values, and join arrays.
fn fix_headers(headers: &mut serde_json::Map<String, Value>) -> usize {
    let mut fixed = 0;
    for value in headers.values_mut() {
        let replacement = match value {
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        *value = Value::String(replacement);
        fixed += 1;
    }
    fixed
}

/// Walk every object in the tree and fix any `res.headers` found.
fn fix_value(value: &mut Value) -> usize {
    match value {
        Value::Object(map) => {
            let mut fixed = 0;
            if let Some(Value::Object(res)) = map.get_mut("res") {
                if let Some(Value::Object(headers)) = res.get_mut("headers") {
                    fixed += fix_headers(headers);
                }
            }
            for child in map.values_mut() {
                fixed += fix_value(child);
            }
            fixed
        }
        Value::Array(items) => items.iter_mut().map(fix_value).sum(),
        _ => 0,
    }
}

fn apply_fixes(files: &[PathBuf]) -> usize {
    let mut total = 0;
    for file in files {
        // YAML is reformatted on write, which loses comments, so only JSON is fixed.
        if file.extension().is_some_and(|e| e != "json") {
            continue;
        }
        let Ok(mut value) = load_value(file) else {
            continue;
        };
        let fixed = fix_value(&mut value);
        if fixed == 0 {
            continue;
        }
        match serde_json::to_string_pretty(&value) {
            Ok(content) => match std::fs::write(file, content) {
                Ok(()) => println!("{GREEN}Fixed: {}{RESET}", file.display()),
                Err(e) => println!("{RED}Error writing {}: {e}{RESET}", file.display()),
            },
            Err(e) => println!("{RED}Error serializing {}: {e}{RESET}", file.display()),
        }
        total += fixed;
    }
    total
}
