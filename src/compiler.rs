//! External compile driver (spec §4.C, §5): run the two-pass C → IR → object
//! pipeline for every opcode concurrently, then parse each resulting object
//! file.

use crate::config::StencilConfig;
use crate::error::{Error, Result};
use crate::format::Format;
use crate::model::Stencil;
use crate::reader;
use crate::template;
use crate::toolchain::Toolchain;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::process::Command;
use tokio::task::JoinSet;

/// Skip-set from spec §4.H: opcodes the interpreter handles directly rather
/// than having a stencil generated for them (exception handling, dynamic
/// name lookups, instrumentation, deep call forms, several tier-2 opcodes).
pub fn skip_set() -> &'static [&'static str] {
    &[
        "CALL_BOUND_METHOD_EXACT_ARGS",
        "CALL_FUNCTION_EX",
        "CHECK_EG_MATCH",
        "CHECK_EXC_MATCH",
        "CLEANUP_THROW",
        "DELETE_DEREF",
        "DELETE_FAST",
        "DELETE_GLOBAL",
        "DELETE_NAME",
        "DICT_MERGE",
        "END_ASYNC_FOR",
        "EXTENDED_ARG",
        "FOR_ITER",
        "FORMAT_VALUE",
        "GET_AWAITABLE",
        "IMPORT_FROM",
        "IMPORT_NAME",
        "INSTRUMENTED_CALL",
        "INSTRUMENTED_CALL_FUNCTION_EX",
        "INSTRUMENTED_END_FOR",
        "INSTRUMENTED_END_SEND",
        "INSTRUMENTED_FOR_ITER",
        "INSTRUMENTED_INSTRUCTION",
        "INSTRUMENTED_JUMP_BACKWARD",
        "INSTRUMENTED_JUMP_FORWARD",
        "INSTRUMENTED_LINE",
        "INSTRUMENTED_LOAD_SUPER_ATTR",
        "INSTRUMENTED_POP_JUMP_IF_FALSE",
        "INSTRUMENTED_POP_JUMP_IF_NONE",
        "INSTRUMENTED_POP_JUMP_IF_NOT_NONE",
        "INSTRUMENTED_POP_JUMP_IF_TRUE",
        "INSTRUMENTED_RESUME",
        "INSTRUMENTED_RETURN_CONST",
        "INSTRUMENTED_RETURN_VALUE",
        "INSTRUMENTED_YIELD_VALUE",
        "INTERPRETER_EXIT",
        "JUMP_BACKWARD",
        "JUMP_BACKWARD_INTO_TRACE",
        "JUMP_BACKWARD_NO_INTERRUPT",
        "KW_NAMES",
        "LOAD_CLASSDEREF",
        "LOAD_CLOSURE",
        "LOAD_DEREF",
        "LOAD_FAST_CHECK",
        "LOAD_FROM_DICT_OR_DEREF",
        "LOAD_FROM_DICT_OR_GLOBALS",
        "LOAD_GLOBAL",
        "LOAD_NAME",
        "MAKE_CELL",
        "MATCH_CLASS",
        "MATCH_KEYS",
        "RAISE_VARARGS",
        "RERAISE",
        "SEND",
        "STORE_ATTR_WITH_HINT",
        "UNPACK_EX",
        "UNPACK_SEQUENCE",
        "BB_BRANCH",
        "BB_BRANCH_IF_FLAG_UNSET",
        "BB_JUMP_IF_FLAG_UNSET",
        "BB_BRANCH_IF_FLAG_SET",
        "BB_JUMP_IF_FLAG_SET",
        "BB_JUMP_BACKWARD_LAZY",
    ]
}

/// The fixed CFLAGS set from spec §4.C.
pub fn base_cflags() -> Vec<&'static str> {
    vec![
        "-DPy_BUILD_CORE",
        "-D_PyJIT_ACTIVE",
        "-I.",
        "-I./Include",
        "-I./Include/internal",
        "-I./PC",
        "-O3",
        "-Wno-unreachable-code",
        "-Wno-unused-but-set-variable",
        "-Wno-unused-command-line-argument",
        "-Wno-unused-label",
        "-Wno-unused-variable",
        "-fno-asynchronous-unwind-tables",
        "-fno-stack-protector",
        "-fomit-frame-pointer",
        "-g0",
        "-mcmodel=large",
    ]
}

pub struct Compiler {
    pub toolchain: Toolchain,
    pub config: StencilConfig,
}

impl Compiler {
    pub fn new(toolchain: Toolchain, config: StencilConfig) -> Self {
        Compiler { toolchain, config }
    }

    fn cflags(&self) -> Vec<String> {
        let mut flags: Vec<String> = base_cflags().into_iter().map(String::from).collect();
        flags.extend(self.config.platform.extra_cflags().into_iter().map(String::from));
        flags
    }

    fn format(&self) -> Format {
        match self.config.platform {
            crate::config::PlatformConfig::Elf => Format::Elf,
            crate::config::PlatformConfig::MachO => Format::MachO,
            crate::config::PlatformConfig::Coff { .. } => Format::Coff,
        }
    }

    /// Run both compiler passes and the object-file parse for one opcode's
    /// already-assembled C source (spec §4.C, one task per opcode).
    pub async fn compile_one(&self, opname: &str, c_source: &str) -> Result<Stencil> {
        let dir = tempfile::tempdir()?;
        let c_path = dir.path().join(format!("{opname}.c"));
        let ll_path = dir.path().join(format!("{opname}.ll"));
        let o_path = dir.path().join(format!("{opname}.o"));
        tokio::fs::write(&c_path, c_source).await?;

        let define = format!("-D_JUSTIN_OPCODE={opname}");
        log::debug!("compiling {opname}");
        run_clang(
            &self.toolchain.clang.path,
            &self.cflags(),
            &["-emit-llvm", "-S", &define, "-o"],
            &ll_path,
            &c_path,
            opname,
        )
        .await?;

        if self.config.use_ghccc {
            let ir = tokio::fs::read_to_string(&ll_path).await?;
            let rewritten = template::apply_ghccc(&ir, true);
            tokio::fs::write(&ll_path, rewritten).await?;
        }

        log::debug!("recompiling {opname}");
        run_clang(&self.toolchain.clang.path, &self.cflags(), &["-c", "-o"], &o_path, &ll_path, opname).await?;

        log::debug!("parsing {opname}");
        let sections = reader::read_sections(&self.toolchain.readobj.path, &o_path).await?;
        let stencil = crate::parser::parse(self.format(), self.config.platform.symbol_prefix(), &sections)?;
        log::debug!("built {opname}");
        Ok(stencil)
    }

    /// Compile every case plus the trampoline, concurrently (spec §5).
    /// Every task runs to completion before the first error (if any) is
    /// returned: no task is cancelled because a sibling failed.
    pub async fn build(
        &self,
        cases: &BTreeMap<String, String>,
        template_text: &str,
        trampoline_text: &str,
    ) -> Result<BTreeMap<String, Stencil>> {
        let skip: std::collections::BTreeSet<&str> = skip_set().iter().copied().collect();
        let mut joins: JoinSet<(String, Result<Stencil>)> = JoinSet::new();

        for (opname, body) in cases {
            if skip.contains(opname.as_str()) {
                continue;
            }
            let opname = opname.clone();
            let source = template::assemble_case(template_text, body, self.config.tos_cache_depth);
            let compiler = self.clone_handle();
            joins.spawn(async move {
                let result = compiler.compile_one(&opname, &source).await;
                (opname, result)
            });
        }
        {
            let trampoline_source = template::assemble_trampoline(trampoline_text);
            let compiler = self.clone_handle();
            joins.spawn(async move {
                let result = compiler.compile_one("trampoline", &trampoline_source).await;
                ("trampoline".to_string(), result)
            });
        }

        let mut stencils = BTreeMap::new();
        let mut first_error: Option<Error> = None;
        while let Some(joined) = joins.join_next().await {
            let (opname, result) = joined.map_err(|e| Error::InvariantViolation(format!("compile task panicked: {e}")))?;
            match result {
                Ok(stencil) => {
                    stencils.insert(opname, stencil);
                }
                Err(err) if first_error.is_none() => first_error = Some(err),
                Err(_) => {}
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        Ok(stencils)
    }

    /// Cheap clone for moving into a spawned task; `Toolchain`/`StencilConfig`
    /// hold no unclonable resources.
    fn clone_handle(&self) -> std::sync::Arc<Compiler> {
        std::sync::Arc::new(Compiler {
            toolchain: self.toolchain.clone(),
            config: self.config.clone(),
        })
    }
}

async fn run_clang(
    clang: &str,
    cflags: &[String],
    mode_flags: &[&str],
    output: &Path,
    input: &Path,
    opname: &str,
) -> Result<()> {
    let status = Command::new(clang)
        .args(cflags)
        .args(mode_flags)
        .arg(output)
        .arg(input)
        .status()
        .await?;
    if !status.success() {
        return Err(Error::ExternalProcessFailed(
            clang.to_string(),
            opname.to_string(),
            status.code().unwrap_or(-1),
        ));
    }
    Ok(())
}
