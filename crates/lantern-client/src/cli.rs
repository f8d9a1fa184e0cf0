use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "lantern", version, about = "Lantern - a data-driven render graph playground")]
pub struct CliArgs {
    /// Subcommand (run, demo, demos, check)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Project root. Defaults to the directory holding lantern.yaml.
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Scene YAML, relative to the project root
    #[arg(long, global = true)]
    pub scene: Option<String>,

    /// Render graph YAML, relative to the project root
    #[arg(long, global = true)]
    pub graph: Option<String>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a window and render the project's scene through its graph
    Run,
    /// Run a built-in demo by number or name
    Demo {
        selector: String,
    },
    /// List the built-in demos
    Demos,
    /// Validate the graph and scene without opening a window
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_demo_with_flags() {
        let args = CliArgs::parse_from(["lantern", "demo", "shadow", "--verbose"]);
        assert_eq!(
            args.command,
            Some(Command::Demo {
                selector: "shadow".into()
            })
        );
        assert!(args.verbose);
    }

    #[test]
    fn test_parse_overrides() {
        let args = CliArgs::parse_from([
            "lantern",
            "--project",
            "game",
            "--graph",
            "graphs/deferred.yaml",
            "check",
            "--json",
        ]);
        assert_eq!(args.project.as_deref(), Some("game"));
        assert_eq!(args.graph.as_deref(), Some("graphs/deferred.yaml"));
        assert_eq!(args.command, Some(Command::Check { json: true }));
        assert!(args.scene.is_none());
    }
}
