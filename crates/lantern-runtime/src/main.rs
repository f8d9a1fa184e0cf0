use anyhow::Context;
use clap::Parser;
use winit::event_loop::{ControlFlow, EventLoop};

use lantern_client::check::check_project;
use lantern_client::cli::{CliArgs, Command};
use lantern_client::demos::{print_demo_list, run_demo};
use lantern_client::engine::Engine;
use lantern_client::project_config::{resolve, LaunchSettings};

/// Filter used with `--verbose` when RUST_LOG is unset. wgpu stays at info.
const VERBOSE_FILTER: &str = "info,lantern=debug,lantern_client=debug,lantern_core=debug";

fn init_logging(verbose: bool) {
    let default = if verbose { VERBOSE_FILTER } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.verbose);
    tracing::info!("Lantern v{}", env!("CARGO_PKG_VERSION"));

    let cwd = std::env::current_dir().context("failed to read the current directory")?;

    match &args.command {
        // lantern demos
        Some(Command::Demos) => {
            print_demo_list();
            Ok(())
        }

        // lantern demo <selector>
        Some(Command::Demo { selector }) => {
            let demo_args = run_demo(selector, &args)?;
            run_engine(resolve(&demo_args, &cwd)?)
        }

        // lantern check [--json]
        Some(Command::Check { json }) => {
            let settings = resolve(&args, &cwd)?;
            let report = check_project(&settings);
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
            if !report.ok() {
                anyhow::bail!("check found {} problem(s)", report.problems.len());
            }
            Ok(())
        }

        // lantern [run]
        Some(Command::Run) | None => run_engine(resolve(&args, &cwd)?),
    }
}

fn run_engine(settings: LaunchSettings) -> anyhow::Result<()> {
    tracing::info!(
        "Project {:?}: graph {:?}, scene {:?}",
        settings.project_root,
        settings.graph,
        settings.scene
    );
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut engine = Engine::new(settings)?;
    event_loop.run_app(&mut engine).context("event loop error")?;

    match engine.take_failure() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
