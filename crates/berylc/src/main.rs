//! The `berylc` command line.
//!
//! Batch mode typechecks the given paths and exits nonzero when any
//! diagnostic at or above the configured severity was reported. The `lsp`
//! subcommand runs the editor service over stdio.

use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use beryl_ast::ParsedFile;
use beryl_core::diag::{Diagnostic, Severity};
use beryl_core::files::FileType;
use beryl_core::{GlobalState, SymbolRef};
use beryl_lsp::msg::Message;
use beryl_lsp::server::{Connection, run_server};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "berylc", version, about = "The Beryl type checker.")]
struct Cli {
    /// Source files to typecheck.
    paths: Vec<PathBuf>,

    /// The minimum severity that fails the run.
    #[arg(long, value_enum, default_value_t = SeverityArg::Error)]
    severity: SeverityArg,

    /// Extra output for debugging.
    #[arg(long, value_enum)]
    print: Option<PrintKind>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the editor service over stdio.
    Lsp,
}

#[derive(Clone, Copy, ValueEnum)]
enum SeverityArg {
    Error,
    Warning,
    Information,
    Hint,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Severity {
        match arg {
            SeverityArg::Error => Severity::Error,
            SeverityArg::Warning => Severity::Warning,
            SeverityArg::Information => Severity::Information,
            SeverityArg::Hint => Severity::Hint,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PrintKind {
    /// Diagnostics as JSON lines.
    Diagnostics,
    /// The symbol table after resolution.
    SymbolTable,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Some(Command::Lsp) => {
            run_stdio_server();
            ExitCode::SUCCESS
        }
        None => match batch_check(&cli) {
            Ok(failed) => {
                if failed {
                    ExitCode::FAILURE
                } else {
                    ExitCode::SUCCESS
                }
            }
            Err(err) => {
                eprintln!("berylc: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}

/// Typechecks the given paths; returns whether any diagnostic reached the
/// configured severity.
fn batch_check(cli: &Cli) -> anyhow::Result<bool> {
    let mut gs = GlobalState::new();
    let mut frefs = Vec::with_capacity(cli.paths.len());
    {
        let mut unfrozen = gs.unfreeze_file_table();
        for path in &cli.paths {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let shown = path.display().to_string();
            frefs.push(unfrozen.enter_file(shown, text, FileType::Normal));
        }
    }

    let indexed = {
        let mut unfrozen = gs.unfreeze_for_indexing();
        beryl_pipeline::index(&mut unfrozen, &frefs, false).expect("batch runs are not cancellable")
    };
    let resolved = beryl_pipeline::name_and_resolve(&mut gs, indexed, false)
        .expect("batch runs are not cancellable");
    let refs: Vec<&ParsedFile> = resolved.iter().collect();
    beryl_pipeline::run_typecheck(&gs, &refs, false).expect("batch runs are not cancellable");

    let (mut diags, _) = gs.errors.drain();
    diags.sort_by_key(|diag| (diag.loc.file, diag.loc.offsets.begin));

    match cli.print {
        Some(PrintKind::Diagnostics) => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for diag in &diags {
                let line = serde_json_line(&gs, diag);
                let _ = writeln!(out, "{line}");
            }
        }
        Some(PrintKind::SymbolTable) => print_symbol_table(&gs),
        None => {
            for diag in &diags {
                eprintln!("{}", render_diagnostic(&gs, diag));
            }
        }
    }

    let threshold: Severity = cli.severity.into();
    let failed = diags.iter().any(|diag| diag.severity <= threshold);
    if !diags.is_empty() {
        eprintln!("{} diagnostic(s)", diags.len());
    }
    Ok(failed)
}

fn render_diagnostic(gs: &GlobalState, diag: &Diagnostic) -> String {
    let mut out = String::new();
    if diag.loc.exists() {
        let file = gs.file(diag.loc.file);
        let (line, col) = file.line_col(diag.loc.offsets.begin);
        out.push_str(&format!("{}:{}:{}: ", file.path, line + 1, col + 1));
    }
    out.push_str(&format!(
        "{}: {} [{}]",
        diag.severity,
        diag.header,
        diag.code.code()
    ));
    for section in &diag.sections {
        out.push_str(&format!("\n  {}", section.header));
        for (loc, message) in &section.locs {
            if loc.exists() {
                let file = gs.file(loc.file);
                let (line, col) = file.line_col(loc.offsets.begin);
                out.push_str(&format!(
                    "\n    {}:{}:{}: {}",
                    file.path,
                    line + 1,
                    col + 1,
                    message
                ));
            }
        }
    }
    out
}

fn serde_json_line(gs: &GlobalState, diag: &Diagnostic) -> String {
    let rendered = render_diagnostic(gs, diag);
    serde_json::to_string(&serde_json::json!({
        "code": diag.code.code(),
        "severity": diag.severity.to_string(),
        "message": diag.header,
        "rendered": rendered,
    }))
    .unwrap_or_default()
}

fn print_symbol_table(gs: &GlobalState) {
    for class in gs.symbols().class_refs() {
        let data = gs.symbols().class_data(class);
        println!("{} ({:?})", gs.show_class(class), data.kind);
        if let Some(superclass) = data.superclass {
            println!("  superclass {}", gs.show_class(superclass));
        }
        for mixin in &data.mixins {
            println!("  include {}", gs.show_class(*mixin));
        }
        for (_, member) in data.members.iter().chain(data.self_members.iter()) {
            if let SymbolRef::Method(method) = member {
                let info = gs.symbols().method_data(*method);
                let args = info
                    .arguments
                    .iter()
                    .map(|arg| gs.show_name(arg.name).to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "  {}({args}) -> {}",
                    gs.show_symbol(SymbolRef::Method(*method)),
                    info.result_type.show(gs)
                );
            } else {
                println!("  {}", gs.show_symbol(*member));
            }
        }
    }
}

/// Bridges stdio to the channel-backed connection the service core uses.
fn run_stdio_server() {
    let (server_side, client_side) = Connection::memory();

    // Reader: stdin → server.
    let inbound = client_side.sender;
    let reader = std::thread::Builder::new()
        .name("lsp-reader".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            let mut reader = BufReader::new(stdin.lock());
            while let Ok(Some(msg)) = Message::read(&mut reader) {
                if inbound.send(msg).is_err() {
                    break;
                }
            }
        })
        .expect("failed to spawn the reader thread");

    // Writer: server → stdout.
    let outbound = client_side.receiver;
    let writer = std::thread::Builder::new()
        .name("lsp-writer".to_string())
        .spawn(move || {
            let stdout = std::io::stdout();
            let mut stdout = stdout.lock();
            for msg in outbound {
                if msg.write(&mut stdout).is_err() {
                    break;
                }
            }
        })
        .expect("failed to spawn the writer thread");

    run_server(server_side);
    // The server dropped its sender, so the writer drains and exits; the
    // reader may still be blocked on stdin and is left detached.
    drop(reader);
    let _ = writer.join();
}
