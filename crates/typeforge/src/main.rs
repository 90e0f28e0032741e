use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use typeforge_core::export::{name_pattern, write_outputs};
use typeforge_core::prelude::*;
use typeforge_utils::{LogFormat, LogLevel, info, init_logging, init_logging_with_level, warn};

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Generate strongly-typed accessors for native process memory from debug metadata.
#[derive(Parser, Debug)]
#[command(name = "typeforge")]
#[command(version)]
#[command(about = "Generate strongly-typed accessors for native types from debug metadata", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log format: pretty or json (overrides TYPEFORGE_LOG_FORMAT)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Generate accessor code for the requested root types
    Export
    {
        /// Binaries with DWARF debug information; each one is a module
        #[arg(required = true)]
        binaries: Vec<PathBuf>,
        /// Root type: qualified name, glob pattern (`ns::*`) or 0x offset
        #[arg(short, long = "root", required = true)]
        roots: Vec<String>,
        /// Only export this module (defaults to every binary given)
        #[arg(short, long)]
        module: Option<String>,
        /// Output language
        #[arg(short, long, default_value_t = WriterStyle::Rust)]
        style: WriterStyle,
        /// Emit every declaration at the top level with unqualified references
        #[arg(long, default_value_t = false)]
        truncate_namespace: bool,
        /// Directory to write `<module>.<ext>` files to (prints to stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Number of modules processed in parallel
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// List the named types of a binary
    List
    {
        /// Binary with DWARF debug information
        binary: PathBuf,
        /// Only show names matching this glob
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Resolve one type and print its layout and dependencies
    Show
    {
        /// Binary with DWARF debug information
        binary: PathBuf,
        /// Qualified type name or 0x offset
        type_name: String,
    },
}

fn main()
{
    let cli = Cli::parse();

    let logging = match (cli.log_level, cli.log_format) {
        (None, None) => init_logging(),
        (level, format) => {
            init_logging_with_level(level.unwrap_or(LogLevel::Info), format.unwrap_or(LogFormat::Pretty))
        }
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Commands) -> CliResult<()>
{
    match command {
        Commands::Export {
            binaries,
            roots,
            module,
            style,
            truncate_namespace,
            out,
            jobs,
        } => export(binaries, &roots, module, style, truncate_namespace, out, jobs),
        Commands::List { binary, filter } => list(&binary, filter.as_deref()),
        Commands::Show { binary, type_name } => show(&binary, &type_name),
    }
}

fn export(
    binaries: Vec<PathBuf>,
    roots: &[String],
    module: Option<String>,
    style: WriterStyle,
    truncate_namespace: bool,
    out: Option<PathBuf>,
    jobs: Option<usize>,
) -> CliResult<()>
{
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let mut config = ExportConfig {
        truncate_namespace,
        ..ExportConfig::default()
    };
    if let Some(jobs) = jobs {
        config.jobs = jobs.max(1);
    }

    // The provider lives on its own thread; workers talk to it through handles.
    let actor = ProviderActor::spawn(move || DwarfProvider::open(&binaries))?;
    let mut handle = actor.handle();

    let roots: Vec<RootRequest> = roots.iter().map(|root| RootRequest::parse(root)).collect();
    let modules = handle.modules()?;
    let requests: Vec<ModuleRequest> = modules
        .into_iter()
        .filter(|name| module.as_ref().is_none_or(|wanted| wanted == name))
        .map(|name| ModuleRequest::new(name, roots.clone()))
        .collect();
    if requests.is_empty() {
        return Err(format!("module {} not found", module.unwrap_or_default()).into());
    }

    info!("Exporting {} module(s) as {}", requests.len(), style);
    let driver = ExportDriver::new(style.writer(), config).with_cancellation(cancel);
    let report = driver.export_modules(&handle, &requests)?;
    actor.shutdown();

    for diagnostic in report.diagnostics() {
        warn!("{}", diagnostic);
    }
    for module in &report.cancelled {
        warn!("Module {} was not exported: run cancelled", module);
    }

    match out {
        Some(dir) => {
            for path in write_outputs(&report, &dir)? {
                println!("{}", path.display());
            }
        }
        None => {
            for output in &report.outputs {
                print!("{}", output.source);
            }
        }
    }

    if report.cancelled.is_empty() {
        Ok(())
    } else {
        Err("generation cancelled".into())
    }
}

fn list(binary: &Path, filter: Option<&str>) -> CliResult<()>
{
    let filter = filter.map(name_pattern).transpose()?;
    let mut provider = DwarfProvider::open(&[binary])?;
    for module in provider.modules()? {
        for name in provider.type_names(&module)? {
            if filter.as_ref().is_none_or(|pattern| pattern.matches(&name)) {
                println!("{name}");
            }
        }
    }
    Ok(())
}

fn show(binary: &Path, type_name: &str) -> CliResult<()>
{
    let mut provider = DwarfProvider::open(&[binary])?;
    let module = provider
        .modules()?
        .into_iter()
        .next()
        .ok_or("binary has no module")?;
    let query = match RootRequest::parse(type_name) {
        RootRequest::Name(name) => TypeQuery::Name(name),
        RootRequest::Offset(offset) => TypeQuery::Offset(offset),
        RootRequest::Pattern(pattern) => {
            return Err(format!("show takes a single type, not a pattern: {pattern}").into());
        }
    };

    let mut resolver = Resolver::new(&mut provider, module.as_str());
    let root = resolver.resolve_root(&query)?;
    let graph = resolver.finish();

    println!("{} ({})", graph.display_name(root), module);
    if let Some(user) = graph.get(root).user_type() {
        println!("  size: {} bytes", user.size);
        for base in &user.bases {
            println!("  base {}", graph.display_name(*base));
        }
        for field in &user.fields {
            let bits = field
                .bit_field
                .map(|bits| format!(" bits {}..{}", bits.bit_offset, bits.bit_offset + bits.bit_width))
                .unwrap_or_default();
            println!(
                "  +{:<6} {:<24} {}{}",
                field.byte_offset,
                field.name,
                graph.display_name(field.ty),
                bits
            );
        }
    }

    println!("\n{} type(s) reachable:", graph.len());
    for id in graph.ids_by_key() {
        let marker = if graph.is_illegal(id) {
            " (excluded: value cycle)"
        } else if graph.get(id).is_undefined() {
            " (undefined)"
        } else {
            ""
        };
        println!("  {}{}", graph.display_name(id), marker);
    }
    for diagnostic in graph.diagnostics() {
        println!("{diagnostic}");
    }
    Ok(())
}
