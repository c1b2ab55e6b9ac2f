//! Turbo Specialize CLI
//!
//! Usage:
//!   turbogen kernels.py --bind tsum:T=float32
//!   turbogen kernels.py --bind Buffers:T=int16 --out build --json
//!   turbogen kernels.py --bind fill:X=7 --emit

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser as ClapParser;
use colored::Colorize;
use serde::Serialize;

use turbo_specialize::native::{CompileRequest, Signature};
use turbo_specialize::{
    declare_file, CompileContext, ConstValue, Placeholder, ScalarType, Specialized, TurboConfig, TurboError,
    TurboResult, TypeArg, UnavailableCompiler,
};

#[derive(ClapParser, Debug)]
#[command(name = "turbogen")]
#[command(version = "0.1.0")]
#[command(about = "Generates specialized Cython units from @turbo kernels")]
struct Args {
    /// Source file holding the annotated kernels
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Module name the kernels are declared in (defaults to the file stem)
    #[arg(short = 'm', long = "module")]
    module: Option<String>,

    /// Bind a placeholder on a function or class (e.g., "tsum:T=float32")
    #[arg(short = 'b', long = "bind", value_parser = parse_binding)]
    bindings: Vec<Binding>,

    /// Output root for generated packages
    #[arg(short = 'o', long = "out")]
    output_root: Option<PathBuf>,

    /// JSON config file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Output a JSON manifest
    #[arg(short = 'j', long = "json")]
    json_output: bool,

    /// Print generated sources
    #[arg(short = 'e', long = "emit")]
    emit: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[derive(Debug, Clone)]
struct Binding {
    target: String,
    placeholder: Placeholder,
    arg: TypeArg,
}

fn parse_binding(s: &str) -> Result<Binding, String> {
    let (target, rest) = s
        .split_once(':')
        .ok_or_else(|| format!("Invalid binding format: {}", s))?;
    let (name, value) = rest
        .split_once('=')
        .ok_or_else(|| format!("Invalid binding format: {}", s))?;
    let placeholder = Placeholder::parse(name.trim()).ok_or_else(|| format!("Invalid placeholder: {}", name))?;
    Ok(Binding {
        target: target.trim().to_string(),
        placeholder,
        arg: parse_arg(value.trim()),
    })
}

/// Type names first, then numbers and booleans, anything else is a string
fn parse_arg(value: &str) -> TypeArg {
    let name = value.strip_prefix("np.").unwrap_or(value);
    if let Some(ty) = ScalarType::from_name(name) {
        return ty.into();
    }
    if let Ok(n) = value.parse::<i64>() {
        return n.into();
    }
    if let Ok(x) = value.parse::<f64>() {
        return x.into();
    }
    match value {
        "True" | "true" => true.into(),
        "False" | "false" => false.into(),
        _ => TypeArg::Obj(ConstValue::Str(value.to_string())),
    }
}

#[derive(Debug, Serialize)]
struct ManifestEntry {
    target: String,
    function: String,
    complete: bool,
    bindings: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<CompileRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<Signature>,
}

fn manifest_entry(target: &str, specialized: &Specialized) -> ManifestEntry {
    let bindings = specialized
        .variant()
        .bindings()
        .iter()
        .map(|(p, arg)| (p.to_string(), arg.to_string()))
        .collect();
    let entry = specialized.as_complete().map(|complete| complete.entry().clone());
    ManifestEntry {
        target: target.to_string(),
        function: entry
            .as_ref()
            .map_or_else(|| specialized.name().to_string(), |e| e.function_name().to_string()),
        complete: specialized.is_complete(),
        bindings,
        request: entry.as_ref().map(|e| e.request().clone()),
        signature: entry.as_ref().map(|e| e.signature().clone()),
    }
}

fn load_config(args: &Args) -> TurboResult<TurboConfig> {
    let config = match &args.config {
        Some(path) => TurboConfig::load(path)?,
        None => TurboConfig::default(),
    };
    Ok(match &args.output_root {
        Some(root) => config.with_output_root(root),
        None => config,
    })
}

fn module_name(args: &Args) -> String {
    args.module.clone().unwrap_or_else(|| {
        args.input
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("module")
            .to_string()
    })
}

fn run(args: &Args) -> TurboResult<Vec<(ManifestEntry, Option<String>)>> {
    let config = load_config(args)?;
    let module = module_name(args);
    let ctx = CompileContext::new();
    let _scope = ctx.no_compile();
    let (_engine, mut declared) = declare_file(&args.input, &module, config, Arc::new(UnavailableCompiler), &ctx)?;

    for binding in &args.bindings {
        if let Some(function) = declared.functions.get_mut(&binding.target) {
            *function = function.bind(&ctx, binding.placeholder, binding.arg.clone())?;
        } else if let Some(class) = declared.classes.get_mut(&binding.target) {
            *class = class.bind(&ctx, binding.placeholder, binding.arg.clone())?;
        } else {
            return Err(TurboError::no_such_variable(binding.target.as_str()));
        }
    }

    let mut report = Vec::new();
    let members = declared.functions.iter().map(|(name, f)| (name.clone(), f)).chain(
        declared
            .classes
            .iter()
            .flat_map(|(class, g)| g.members().iter().map(move |(name, m)| (format!("{}.{}", class, name), m))),
    );
    for (target, specialized) in members {
        let text = match specialized.as_complete() {
            Some(complete) if args.emit => Some(complete.unit_text()?),
            _ => None,
        };
        report.push((manifest_entry(&target, specialized), text));
    }
    Ok(report)
}

fn main() {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    if args.verbose {
        println!("{}", "Turbo Specialize".bold().blue());
        println!("{}", "=".repeat(35));
        println!("{}: {}", "Input".green(), args.input.display());
        println!();
    }

    let report = match run(&args) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };

    if args.json_output {
        let entries: Vec<&ManifestEntry> = report.iter().map(|(entry, _)| entry).collect();
        match serde_json::to_string_pretty(&entries) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{}: Failed to serialize to JSON: {}", "Error".red(), e);
                std::process::exit(1);
            }
        }
    } else if args.emit {
        for (entry, text) in &report {
            if let Some(text) = text {
                println!("{} {}", "#".dimmed(), entry.function.bold());
                println!("{}", text);
            }
        }
    } else {
        print_report(&report);
    }
}

fn print_report(report: &[(ManifestEntry, Option<String>)]) {
    println!("{}", "Declared Kernels".bold().green());
    println!("{}", "=".repeat(50));
    for (entry, _) in report {
        println!();
        let status = if entry.complete {
            "complete".green()
        } else {
            "partial".yellow()
        };
        println!("{} {} ({})", "Kernel".bold(), entry.target.bold(), status);
        println!("  {}: {}", "Function".cyan(), entry.function);
        if !entry.bindings.is_empty() {
            let bindings: Vec<String> = entry.bindings.iter().map(|(p, arg)| format!("{}={}", p, arg)).collect();
            println!("  {}: {}", "Bindings".cyan(), bindings.join(", "));
        }
        if let Some(request) = &entry.request {
            println!("  {}: {}", "Unit".cyan(), request.source_path.display());
            println!("  {}: {}", "Module".cyan(), request.module);
        }
    }
}
