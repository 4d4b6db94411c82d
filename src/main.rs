use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use nullweave::{CheckMode, NullPolicy, WeaveOptions, apply_batch};

/// CLI arguments for nullweave execution.
#[derive(Parser, Debug)]
#[command(
    name = "nullweave",
    about = "Weaves runtime not-null checks into extracted JVM method instruction streams.",
    version
)]
struct Cli {
    /// Batch JSON produced by the build-plugin driver ('-' for stdin).
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = ModeArg::Inline)]
    mode: ModeArg,
    #[arg(long, value_enum, default_value_t = OnNullArg::Throw)]
    on_null: OnNullArg,
    /// slf4j logger name for the logging policy.
    #[arg(long, value_name = "NAME")]
    logger_name: Option<String>,
    /// Cause string woven into generated messages.
    #[arg(long, default_value = "NotNull")]
    cause: String,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum ModeArg {
    /// Delegate to java.util.Objects.requireNonNull.
    Delegate,
    /// Hand-emit a conditional throw-or-log sequence.
    Inline,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum OnNullArg {
    Throw,
    Log,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let options = weave_options(&cli)?;

    let started_at = Instant::now();
    let batch = serde_json::from_str(&read_input(&cli.input)?)
        .with_context(|| format!("failed to parse batch from {}", cli.input.display()))?;
    let (woven, summary) = apply_batch(batch, &options)?;

    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &woven)
        .context("failed to serialize woven batch")?;
    writer
        .write_all(b"\n")
        .context("failed to write woven batch")?;

    if !cli.quiet {
        eprintln!(
            "woven: methods={} instrumented={} checks={}",
            summary.methods_seen, summary.methods_instrumented, summary.checks_emitted
        );
    }
    if cli.timing && !cli.quiet {
        eprintln!("timing: total_ms={}", started_at.elapsed().as_millis());
    }

    Ok(())
}

fn weave_options(cli: &Cli) -> Result<WeaveOptions> {
    let mode = match cli.mode {
        ModeArg::Delegate => CheckMode::Delegate,
        ModeArg::Inline => CheckMode::Inline,
    };
    let policy = match cli.on_null {
        OnNullArg::Throw => NullPolicy::Throw,
        OnNullArg::Log => {
            if mode == CheckMode::Delegate {
                anyhow::bail!("--on-null log is not supported with --mode delegate");
            }
            let logger = cli
                .logger_name
                .clone()
                .context("--on-null log requires --logger-name")?;
            NullPolicy::Log { logger }
        }
    };
    Ok(WeaveOptions {
        mode,
        policy,
        cause: cli.cause.clone(),
    })
}

fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("failed to read batch from stdin")?;
        return Ok(text);
    }
    if !input.exists() {
        anyhow::bail!("input not found: {}", input.display());
    }
    std::fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_for(input: &Path, output: &Path) -> Cli {
        Cli {
            input: input.to_path_buf(),
            output: Some(output.to_path_buf()),
            mode: ModeArg::Inline,
            on_null: OnNullArg::Throw,
            logger_name: None,
            cause: "NotNull".to_string(),
            quiet: true,
            timing: false,
        }
    }

    #[test]
    fn run_weaves_a_batch_file_end_to_end() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = dir.path().join("batch.json");
        let output = dir.path().join("woven.json");
        std::fs::write(
            &input,
            r#"{
              "classes": [
                {
                  "name": "com/acme/Owner",
                  "methods": [
                    {
                      "name": "foo",
                      "descriptor": "(Ljava/lang/String;)V",
                      "access": 8,
                      "not_null_params": [0],
                      "body": [{"insn": "zero_op", "opcode": 177}]
                    }
                  ]
                }
              ]
            }"#,
        )
        .expect("write batch");

        run(cli_for(&input, &output)).expect("run");

        let woven: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).expect("read output"))
                .expect("parse output");
        assert_eq!(woven["classes"][0]["methods"][0]["instrumented"], true);
        let body = woven["classes"][0]["methods"][0]["body"]
            .as_array()
            .expect("body array");
        assert!(body.len() > 1);
    }

    #[test]
    fn run_rejects_missing_input() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cli = cli_for(&dir.path().join("absent.json"), &dir.path().join("out.json"));

        assert!(run(cli).is_err());
    }

    #[test]
    fn logging_policy_requires_a_logger_name() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = dir.path().join("batch.json");
        std::fs::write(&input, r#"{"classes": []}"#).expect("write batch");
        let mut cli = cli_for(&input, &dir.path().join("out.json"));
        cli.on_null = OnNullArg::Log;

        let err = run(cli).expect_err("run must fail");
        assert!(err.to_string().contains("--logger-name"));
    }

    #[test]
    fn delegate_mode_refuses_logging_policy() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = dir.path().join("batch.json");
        std::fs::write(&input, r#"{"classes": []}"#).expect("write batch");
        let mut cli = cli_for(&input, &dir.path().join("out.json"));
        cli.mode = ModeArg::Delegate;
        cli.on_null = OnNullArg::Log;
        cli.logger_name = Some("app".to_string());

        let err = run(cli).expect_err("run must fail");
        assert!(err.to_string().contains("--mode delegate"));
    }
}
