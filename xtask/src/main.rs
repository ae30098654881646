//! Developer tasks for the rust-mysql-session workspace.
//!
//! Run with `cargo xtask <command>`; `cargo xtask --help` lists them.
//!
//! Everything here shells out to cargo. Optional tools are only needed by
//! the commands that use them:
//!
//! | Command    | Needs                          |
//! |------------|--------------------------------|
//! | `deny`     | `cargo-deny`                   |
//! | `fuzz`     | `cargo-fuzz` and a nightly toolchain |
//! | `coverage` | `cargo-llvm-cov`               |
//! | `semver`   | `cargo-semver-checks`          |

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use xshell::{Shell, cmd};

/// Crates published from this workspace, in dependency order.
const PUBLISHED: &[&str] = &["mysql-protocol", "mysql-types", "mysql-codec", "mysql-client"];

#[derive(Parser)]
#[command(name = "xtask", about = "Developer tasks for rust-mysql-session")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Format check, clippy, tests and cargo-deny, stopping at the first failure
    Ci,
    /// Check formatting (or apply it with --fix)
    Fmt {
        #[arg(long)]
        fix: bool,
    },
    /// Lint every target with warnings denied
    Clippy,
    /// Run the test suites
    Test {
        /// Limit to one crate, e.g. mysql-client
        #[arg(short, long)]
        package: Option<String>,
        /// Only the mock-server integration suites
        #[arg(long)]
        mock_only: bool,
    },
    /// Run cargo-deny
    Deny,
    /// Build API docs
    Doc {
        #[arg(long)]
        open: bool,
    },
    /// Run criterion benchmarks
    Bench {
        /// Limit to one crate
        #[arg(short, long)]
        package: Option<String>,
        /// Criterion filter, e.g. `interpolate/`
        filter: Option<String>,
    },
    /// Run a crate example against the in-process mock server
    Example {
        #[arg(default_value = "basic")]
        name: String,
    },
    /// Run a fuzz target
    Fuzz {
        #[arg(default_value = "parse_packet")]
        target: String,
        /// Seconds before libFuzzer stops
        #[arg(long, default_value_t = 60)]
        max_time: u64,
        /// Print the targets declared in fuzz/Cargo.toml and exit
        #[arg(long)]
        list: bool,
    },
    /// Code coverage report
    Coverage {
        #[arg(long, value_enum, default_value_t = CoverageFormat::Html)]
        format: CoverageFormat,
    },
    /// Check published crates for semver violations
    Semver,
    /// Package the published crates after a release build
    Dist {
        /// Skip the test run
        #[arg(long)]
        no_test: bool,
    },
    /// Remove build artifacts
    Clean,
}

#[derive(Clone, Copy, ValueEnum)]
enum CoverageFormat {
    Html,
    Lcov,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(workspace_root()?);

    match cli.command {
        Command::Ci => {
            fmt(&sh, false)?;
            clippy(&sh)?;
            test(&sh, None, false)?;
            step("cargo-deny", || cmd!(sh, "cargo deny check").run())?;
            println!("\nci: all checks passed");
        }
        Command::Fmt { fix } => fmt(&sh, fix)?,
        Command::Clippy => clippy(&sh)?,
        Command::Test { package, mock_only } => test(&sh, package.as_deref(), mock_only)?,
        Command::Deny => step("cargo-deny", || cmd!(sh, "cargo deny check").run())?,
        Command::Doc { open } => {
            let open = open.then_some("--open");
            step("docs", || {
                cmd!(sh, "cargo doc --workspace --all-features --no-deps {open...}").run()
            })?;
        }
        Command::Bench { package, filter } => {
            let package = package.map(|p| ["-p".to_owned(), p]);
            let package = package.iter().flatten();
            let filter = filter.iter();
            step("benchmarks", || cmd!(sh, "cargo bench {package...} -- {filter...}").run())?;
        }
        Command::Example { name } => step(&format!("example {name}"), || {
            cmd!(sh, "cargo run -p mysql-client --example {name}").run()
        })?,
        Command::Fuzz {
            target,
            max_time,
            list,
        } => fuzz(&sh, &target, max_time, list)?,
        Command::Coverage { format } => coverage(&sh, format)?,
        Command::Semver => {
            for krate in PUBLISHED {
                step(&format!("semver {krate}"), || {
                    cmd!(sh, "cargo semver-checks check-release -p {krate}").run()
                })?;
            }
        }
        Command::Dist { no_test } => {
            if !no_test {
                test(&sh, None, false)?;
            }
            step("release build", || cmd!(sh, "cargo build --workspace --release").run())?;
            for krate in PUBLISHED {
                step(&format!("package {krate}"), || {
                    cmd!(sh, "cargo package -p {krate} --allow-dirty").run()
                })?;
            }
            println!("packages written to target/package/");
        }
        Command::Clean => step("clean", || cmd!(sh, "cargo clean").run())?,
    }

    Ok(())
}

/// Run one named step, printing a header and the outcome.
fn step(name: &str, run: impl FnOnce() -> xshell::Result<()>) -> Result<()> {
    println!("==> {name}");
    run().with_context(|| format!("{name} failed"))?;
    println!("ok: {name}");
    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("failed to run cargo locate-project")?;
    let manifest = String::from_utf8(output.stdout).context("invalid UTF-8 in cargo output")?;
    Path::new(manifest.trim())
        .parent()
        .map(Path::to_path_buf)
        .context("workspace manifest has no parent directory")
}

fn fmt(sh: &Shell, fix: bool) -> Result<()> {
    if fix {
        step("rustfmt", || cmd!(sh, "cargo fmt --all").run())
    } else {
        step("rustfmt --check", || cmd!(sh, "cargo fmt --all -- --check").run())
    }
}

fn clippy(sh: &Shell) -> Result<()> {
    step("clippy", || {
        cmd!(sh, "cargo clippy --workspace --all-features --all-targets -- -D warnings").run()
    })
}

fn test(sh: &Shell, package: Option<&str>, mock_only: bool) -> Result<()> {
    if mock_only {
        // The suites under crates/*/tests that talk to MockMySqlServer.
        step("mock fidelity", || {
            cmd!(sh, "cargo test -p mysql-testing --test mock_fidelity").run()
        })?;
        return step("session suites", || {
            cmd!(
                sh,
                "cargo test -p mysql-client --test integration --test timeout_scenarios --test error_handling"
            )
            .run()
        });
    }
    match package {
        Some(pkg) => step(&format!("tests ({pkg})"), || {
            cmd!(sh, "cargo test -p {pkg} --all-features").run()
        }),
        None => step("tests", || cmd!(sh, "cargo test --workspace --all-features").run()),
    }
}

fn fuzz(sh: &Shell, target: &str, max_time: u64, list: bool) -> Result<()> {
    let manifest = sh.current_dir().join("fuzz/Cargo.toml");
    let targets = fuzz_targets(&manifest)?;

    if list {
        for name in &targets {
            println!("{name}");
        }
        return Ok(());
    }
    if !targets.iter().any(|t| t == target) {
        bail!("unknown fuzz target {target:?}; known targets: {}", targets.join(", "));
    }

    let max_time = max_time.to_string();
    let _dir = sh.push_dir("fuzz");
    step(&format!("fuzz {target}"), || {
        cmd!(sh, "cargo +nightly fuzz run {target} -- -max_total_time={max_time}").run()
    })
}

/// Names of the `[[bin]]` targets declared in the fuzz manifest.
fn fuzz_targets(manifest: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(manifest)
        .with_context(|| format!("reading {}", manifest.display()))?;
    let mut names = Vec::new();
    let mut in_bin = false;
    for line in text.lines().map(str::trim) {
        if line.starts_with('[') {
            in_bin = line == "[[bin]]";
            continue;
        }
        if in_bin {
            if let Some(value) = line.strip_prefix("name = ") {
                names.push(value.trim_matches('"').to_owned());
            }
        }
    }
    Ok(names)
}

fn coverage(sh: &Shell, format: CoverageFormat) -> Result<()> {
    match format {
        CoverageFormat::Html => step("coverage (html)", || {
            cmd!(sh, "cargo llvm-cov --workspace --all-features --html").run()
        })?,
        CoverageFormat::Lcov => step("coverage (lcov)", || {
            cmd!(
                sh,
                "cargo llvm-cov --workspace --all-features --lcov --output-path target/lcov.info"
            )
            .run()
        })?,
        CoverageFormat::Json => step("coverage (json)", || {
            cmd!(
                sh,
                "cargo llvm-cov --workspace --all-features --json --output-path target/coverage.json"
            )
            .run()
        })?,
    }
    Ok(())
}
