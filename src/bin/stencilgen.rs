//! CLI driver: the "out-of-scope... driver glue" from spec.md §1, made
//! concrete per the contract in spec.md §6.
//!
//! ```text
//! stencilgen [--windows <Config>|<Arch>] [-v|-q]... [--tos-cache N] [--ghccc]
//!            [--cases PATH] [--template PATH] [--trampoline PATH]
//!            [--emit-json PATH] <output-header-path>
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use stencilgen::compiler::Compiler;
use stencilgen::config::{PlatformConfig, StencilConfig, TosCacheDepth};
use stencilgen::toolchain::Toolchain;
use stencilgen::{cases, error::Error, header, json_emit};

struct Args {
    output: PathBuf,
    windows: Option<String>,
    verbosity: usize,
    quiet: bool,
    tos_cache: u8,
    ghccc: bool,
    cases_path: PathBuf,
    template_path: PathBuf,
    trampoline_path: PathBuf,
    emit_json: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut raw = std::env::args().skip(1).peekable();
    let mut windows = None;
    let mut verbosity = 0usize;
    let mut quiet = false;
    let mut tos_cache = 0u8;
    let mut ghccc = false;
    let mut cases_path = PathBuf::from("generated_cases.c.h");
    let mut template_path = PathBuf::from("template.c");
    let mut trampoline_path = PathBuf::from("trampoline.c");
    let mut emit_json = None;
    let mut output = None;

    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--windows" => {
                let value = raw.next().ok_or("--windows requires a <Config>|<Arch> argument")?;
                windows = Some(value);
            }
            "-v" => verbosity += 1,
            "-q" => quiet = true,
            "--tos-cache" => {
                let value = raw.next().ok_or("--tos-cache requires a number")?;
                tos_cache = value.parse().map_err(|_| "invalid --tos-cache value".to_string())?;
            }
            "--ghccc" => ghccc = true,
            "--cases" => cases_path = PathBuf::from(raw.next().ok_or("--cases requires a path")?),
            "--template" => template_path = PathBuf::from(raw.next().ok_or("--template requires a path")?),
            "--trampoline" => trampoline_path = PathBuf::from(raw.next().ok_or("--trampoline requires a path")?),
            "--emit-json" => emit_json = Some(PathBuf::from(raw.next().ok_or("--emit-json requires a path")?)),
            other if output.is_none() => output = Some(PathBuf::from(other)),
            other => return Err(format!("unexpected argument: {other}")),
        }
    }

    Ok(Args {
        output: output.ok_or("missing required <output-header-path>")?,
        windows,
        verbosity,
        quiet,
        tos_cache,
        ghccc,
        cases_path,
        template_path,
        trampoline_path,
        emit_json,
    })
}

fn platform_config(windows: Option<&str>) -> Result<PlatformConfig, Error> {
    if cfg!(windows) {
        let raw = windows.ok_or_else(|| {
            Error::PlatformConfigMissing("--windows <Config>|<Arch> is required on Windows".into())
        })?;
        PlatformConfig::parse_windows_config(raw)
    } else if windows.is_some() {
        Err(Error::PlatformConfigMissing(
            "--windows is only accepted when built for Windows".into(),
        ))
    } else if cfg!(target_os = "macos") {
        Ok(PlatformConfig::MachO)
    } else {
        Ok(PlatformConfig::Elf)
    }
}

async fn run() -> Result<(), Error> {
    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("stencilgen: {msg}");
            std::process::exit(2);
        }
    };

    stderrlog::new()
        .verbosity(if args.quiet { 0 } else { args.verbosity + 2 })
        .init()
        .unwrap();

    let platform = platform_config(args.windows.as_deref())?;
    let mut config = StencilConfig::for_host(platform);
    config.tos_cache_depth = TosCacheDepth::new(args.tos_cache)?;
    config.use_ghccc = args.ghccc;

    let toolchain = Toolchain::discover(&config)?;
    let compiler = Compiler::new(toolchain, config);

    let generated_cases = std::fs::read_to_string(&args.cases_path)?;
    let parsed_cases = cases::extract_cases(&generated_cases);
    let template_text = std::fs::read_to_string(&args.template_path)?;
    let trampoline_text = std::fs::read_to_string(&args.trampoline_path)?;

    let stencils = compiler.build(&parsed_cases, &template_text, &trampoline_text).await?;
    let rendered = header::emit_header(&stencils)?;
    std::fs::write(&args.output, rendered)?;
    log::info!("wrote {}", args.output.display());

    if let Some(json_path) = &args.emit_json {
        let json = json_emit::to_json(&stencils).map_err(Error::from)?;
        std::fs::write(json_path, json)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("stencilgen: {err}");
            ExitCode::FAILURE
        }
    }
}
