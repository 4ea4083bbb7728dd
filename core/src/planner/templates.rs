//! Canned workflow shapes for `process_multimodal`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::backend::BackendKind;
use crate::error::WorkflowError;
use crate::executor::types::{ExecutionPlan, FileRef, WorkflowStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    #[default]
    Analysis,
    Conversion,
    Extraction,
    Generation,
    Research,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 5] = [
        Self::Analysis,
        Self::Conversion,
        Self::Extraction,
        Self::Generation,
        Self::Research,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Conversion => "conversion",
            Self::Extraction => "extraction",
            Self::Generation => "generation",
            Self::Research => "research",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analysis" | "analyze" => Ok(Self::Analysis),
            "conversion" | "convert" => Ok(Self::Conversion),
            "extraction" | "extract" => Ok(Self::Extraction),
            "generation" | "generate" => Ok(Self::Generation),
            "research" => Ok(Self::Research),
            _ => Err(WorkflowError::UnknownWorkflow(s.to_string())),
        }
    }
}

/// What a template is instantiated with.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub prompt: String,
    pub files: Vec<FileRef>,
    pub options: Map<String, Value>,
}

impl TemplateContext {
    pub fn new(prompt: impl Into<String>, files: Vec<FileRef>) -> Self {
        Self {
            prompt: prompt.into(),
            files,
            options: Map::new(),
        }
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    fn files_value(&self) -> Value {
        serde_json::to_value(&self.files).unwrap_or_else(|_| Value::Array(Vec::new()))
    }

    fn option_str(&self, key: &str, default: &str) -> String {
        self.options
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }
}

/// Build the plan for a canned workflow kind.
pub fn build(kind: WorkflowKind, ctx: &TemplateContext) -> ExecutionPlan {
    match kind {
        WorkflowKind::Analysis => analysis(ctx),
        WorkflowKind::Conversion => conversion(ctx),
        WorkflowKind::Extraction => extraction(ctx),
        WorkflowKind::Generation => generation(ctx),
        WorkflowKind::Research => research(ctx),
    }
}

fn extract_step(ctx: &TemplateContext, backend: BackendKind, id: &str) -> WorkflowStep {
    WorkflowStep::new(id, backend, "extract")
        .input("files", ctx.files_value())
        .input(
            "instructions",
            json!("Extract the full text, tables and key structure from the attached files."),
        )
}

fn analysis(ctx: &TemplateContext) -> ExecutionPlan {
    let extract = extract_step(ctx, BackendKind::AiStudio, "extract");
    let analyze = WorkflowStep::new("analyze", BackendKind::Claude, "analyze")
        .input("prompt", json!(ctx.prompt))
        .input("content", json!("@extract.data"))
        .depends_on(["extract"]);

    ExecutionPlan::new(vec![extract, analyze]).with_fallback(
        BackendKind::AiStudio.unavailable_key(),
        "extract",
        extract_step(ctx, BackendKind::Gemini, "extract_fallback"),
    )
}

fn conversion(ctx: &TemplateContext) -> ExecutionPlan {
    let target = ctx.option_str("format", "markdown");
    let extract = extract_step(ctx, BackendKind::AiStudio, "extract");
    let convert = WorkflowStep::new("convert", BackendKind::Claude, "convert")
        .input("prompt", json!(ctx.prompt))
        .input("content", json!("@extract.data"))
        .input("targetFormat", json!(target))
        .depends_on(["extract"]);

    ExecutionPlan::new(vec![extract, convert]).with_fallback(
        BackendKind::AiStudio.unavailable_key(),
        "extract",
        extract_step(ctx, BackendKind::Gemini, "extract_fallback"),
    )
}

fn extraction(ctx: &TemplateContext) -> ExecutionPlan {
    let schema = ctx.options.get("schema").cloned().unwrap_or(Value::Null);
    let extract = extract_step(ctx, BackendKind::AiStudio, "extract");
    let structure = WorkflowStep::new("structure", BackendKind::Claude, "structure")
        .input("prompt", json!(ctx.prompt))
        .input("content", json!("@extract.data"))
        .input("schema", schema)
        .depends_on(["extract"]);

    ExecutionPlan::new(vec![extract, structure]).with_fallback(
        BackendKind::AiStudio.unavailable_key(),
        "extract",
        extract_step(ctx, BackendKind::Gemini, "extract_fallback"),
    )
}

fn generation(ctx: &TemplateContext) -> ExecutionPlan {
    let medium = ctx.option_str("medium", "image");
    let plan = WorkflowStep::new("plan", BackendKind::Claude, "plan")
        .input("prompt", json!(ctx.prompt))
        .input("medium", json!(medium.clone()));
    let generate = WorkflowStep::new("generate", BackendKind::AiStudio, "generate")
        .input("prompt", json!(ctx.prompt))
        .input("brief", json!("@plan.data"))
        .input("medium", json!(medium))
        .depends_on(["plan"]);

    let plan_fallback = WorkflowStep::new("plan_fallback", BackendKind::Gemini, "plan")
        .input("prompt", json!(ctx.prompt));

    ExecutionPlan::new(vec![plan, generate]).with_fallback(
        BackendKind::Claude.unavailable_key(),
        "plan",
        plan_fallback,
    )
}

fn research(ctx: &TemplateContext) -> ExecutionPlan {
    let search = WorkflowStep::new("search", BackendKind::Gemini, "search")
        .input("query", json!(ctx.prompt));
    let mut synthesize = WorkflowStep::new("synthesize", BackendKind::Claude, "synthesize")
        .input("prompt", json!(ctx.prompt))
        .input("sources", json!("@search.data"))
        .depends_on(["search"]);

    let mut steps = vec![search];
    if !ctx.files.is_empty() {
        steps.push(extract_step(ctx, BackendKind::AiStudio, "extract"));
        synthesize = synthesize
            .input("documents", json!("@extract.data"))
            .depends_on(["extract"]);
    }
    steps.push(synthesize);

    let search_fallback = WorkflowStep::new("search_fallback", BackendKind::Claude, "search")
        .input("query", json!(ctx.prompt));
    let synth_fallback = WorkflowStep::new("synthesize_fallback", BackendKind::AiStudio, "synthesize")
        .input("prompt", json!(ctx.prompt));

    ExecutionPlan::new(steps)
        .with_fallback(BackendKind::Gemini.unavailable_key(), "search", search_fallback)
        .with_fallback(BackendKind::Claude.unavailable_key(), "synthesize", synth_fallback)
}
