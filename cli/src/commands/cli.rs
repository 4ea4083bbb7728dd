use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "tribridge",
    version,
    about = "Route tasks and multi-step workflows across claude, gemini and aistudio"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to load instead of ~/.tribridge/config.toml or ./config.toml.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Print results as one-line JSON.
    #[arg(long, global = true)]
    pub jsonl: bool,

    /// Workflow progress events: none | text | jsonl
    #[arg(long, default_value = "none", global = true)]
    pub events: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct TaskArgs {
    #[arg(long, group = "input")]
    pub prompt: Option<String>,

    #[arg(long, group = "input")]
    pub prompt_file: Option<String>,

    /// Attachment path. Can be specified multiple times.
    #[arg(long = "file", action = clap::ArgAction::Append)]
    pub files: Vec<String>,

    /// Skip classification and use this backend (claude | gemini | aistudio).
    #[arg(long)]
    pub backend: Option<String>,

    /// Backend action hint, e.g. search or extract.
    #[arg(long)]
    pub action: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct MultimodalArgs {
    /// analysis | conversion | extraction | generation | research
    #[arg(long, default_value = "analysis")]
    pub kind: String,

    #[arg(long, group = "input")]
    pub prompt: Option<String>,

    #[arg(long, group = "input")]
    pub prompt_file: Option<String>,

    #[arg(long = "file", action = clap::ArgAction::Append)]
    pub files: Vec<String>,

    /// Template option (KEY=VALUE). Can be specified multiple times.
    #[arg(long = "option", action = clap::ArgAction::Append)]
    pub options: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct WorkflowArgs {
    /// JSON plan: {"steps": [...], "fallbackStrategies": {...}}
    #[arg(long)]
    pub plan: String,

    /// JSON object merged into every step's input.
    #[arg(long)]
    pub input: Option<String>,

    /// sequential | parallel | adaptive
    #[arg(long)]
    pub mode: Option<String>,

    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify a task and explain the backend choice without running it.
    Analyze(TaskArgs),
    /// Run a task on the best backend, falling back on failure.
    Run(TaskArgs),
    /// Run a canned multimodal workflow (or the fast path for simple prompts).
    Multimodal(MultimodalArgs),
    /// Validate and run a workflow plan.
    Workflow(WorkflowArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_workflow_flags() {
        let args = Args::parse_from([
            "tribridge",
            "workflow",
            "--plan",
            "plan.json",
            "--mode",
            "parallel",
            "--timeout-ms",
            "5000",
            "--jsonl",
        ]);
        assert!(args.jsonl);
        match args.command {
            Commands::Workflow(w) => {
                assert_eq!(w.plan, "plan.json");
                assert_eq!(w.mode.as_deref(), Some("parallel"));
                assert_eq!(w.timeout_ms, Some(5000));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn files_accumulate() {
        let args = Args::parse_from([
            "tribridge", "run", "--prompt", "hi", "--file", "a.png", "--file", "b.pdf",
        ]);
        match args.command {
            Commands::Run(t) => assert_eq!(t.files, vec!["a.png", "b.pdf"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn prompt_sources_are_exclusive() {
        let res = Args::try_parse_from([
            "tribridge",
            "analyze",
            "--prompt",
            "x",
            "--prompt-file",
            "p.txt",
        ]);
        assert!(res.is_err());
    }
}
