//! Heuristic task classification.
//!
//! [`TaskClassifier::classify`] walks a fixed priority ladder and stops at the
//! first rule that matches. It is pure: no I/O, no clock, no randomness, so the
//! same task always yields the same backend and reasoning.

pub mod complexity;
pub mod lexicon;

use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::executor::types::{millis, FileRef, Task};

pub use complexity::{Complexity, ComplexityScore};
pub use lexicon::{contains_term, matched_terms, Lexicon, DEFAULT_LEXICON, LEXICON_VERSION};

/// Prompts longer than this (in characters) go to the reasoning backend.
pub const LONG_PROMPT_CHARS: usize = 2000;
/// Low-complexity prompts shorter than this go to the fastest backend.
pub const SHORT_PROMPT_CHARS: usize = 200;

/// Which ladder rung decided the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingRule {
    ExplicitOverride,
    SourceFiles,
    MediaFiles,
    DocumentFiles,
    GenerationIntent,
    CurrentInformation,
    DeepReasoning,
    SimpleQuery,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    pub backend: BackendKind,
    pub complexity: Complexity,
    pub complexity_score: u32,
    pub rule: RoutingRule,
    pub reasoning: String,
    pub lexicon_version: String,
    pub estimated_cost: f64,
    pub estimated_duration_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct TaskClassifier {
    lexicon: &'static Lexicon,
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self::new(&DEFAULT_LEXICON)
    }
}

impl TaskClassifier {
    pub fn new(lexicon: &'static Lexicon) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &'static Lexicon {
        self.lexicon
    }

    pub fn complexity(&self, task: &Task) -> ComplexityScore {
        let lower = task.prompt.to_lowercase();
        complexity::score(&lower, task.prompt.chars().count(), task.files.len(), self.lexicon)
    }

    pub fn classify(&self, task: &Task, override_backend: Option<BackendKind>) -> TaskAnalysis {
        let lower = task.prompt.to_lowercase();
        let chars = task.prompt.chars().count();
        let score = complexity::score(&lower, chars, task.files.len(), self.lexicon);

        let (backend, rule, reasoning) = self.route(task, &lower, chars, &score, override_backend);
        let profile = backend.profile();

        TaskAnalysis {
            backend,
            complexity: score.level,
            complexity_score: score.score,
            rule,
            reasoning,
            lexicon_version: self.lexicon.version.to_string(),
            estimated_cost: profile.cost_per_call,
            estimated_duration_ms: millis(profile.typical_latency),
        }
    }

    fn route(
        &self,
        task: &Task,
        lower: &str,
        chars: usize,
        score: &ComplexityScore,
        override_backend: Option<BackendKind>,
    ) -> (BackendKind, RoutingRule, String) {
        let lx = self.lexicon;

        if let Some(backend) = override_backend {
            return (
                backend,
                RoutingRule::ExplicitOverride,
                format!("Explicit backend override: {backend}"),
            );
        }

        let source_files = files_matching(&task.files, |f| self.is_source_like(f));
        if !source_files.is_empty() {
            return (
                BackendKind::AiStudio,
                RoutingRule::SourceFiles,
                format!(
                    "Source/config/markup files attached ({}); multimodal file processing",
                    source_files.join(", ")
                ),
            );
        }

        let media_files = files_matching(&task.files, |f| f.kind.is_media());
        if !media_files.is_empty() {
            return (
                BackendKind::AiStudio,
                RoutingRule::MediaFiles,
                format!(
                    "Image/audio/video files attached ({}); multimodal understanding required",
                    media_files.join(", ")
                ),
            );
        }

        let document_files = files_matching(&task.files, |f| f.kind.is_document());
        if !document_files.is_empty() {
            return (
                BackendKind::AiStudio,
                RoutingRule::DocumentFiles,
                format!(
                    "Document files attached ({}); OCR/structured extraction required",
                    document_files.join(", ")
                ),
            );
        }

        let verbs = matched_terms(lower, lx.generation_verbs);
        let media = matched_terms(lower, lx.generatable_media);
        if let (Some(verb), Some(medium)) = (verbs.first(), media.first()) {
            return (
                BackendKind::AiStudio,
                RoutingRule::GenerationIntent,
                format!("Generation intent detected ('{verb}' + '{medium}'); media generation backend"),
            );
        }

        let current = matched_terms(lower, lx.current_info);
        if !current.is_empty() {
            return (
                BackendKind::Gemini,
                RoutingRule::CurrentInformation,
                format!(
                    "Prompt needs current information ({}); search-grounded backend",
                    quote_list(&current)
                ),
            );
        }

        let code = matched_terms(lower, lx.code_markers);
        let high = score.level == Complexity::High;
        let long = chars > LONG_PROMPT_CHARS;
        if high || !code.is_empty() || long {
            let mut why = Vec::new();
            if high {
                why.push(format!("high complexity (score {})", score.score));
            }
            if !code.is_empty() {
                why.push(format!("code-related ({})", quote_list(&code)));
            }
            if long {
                why.push(format!("long prompt ({chars} chars)"));
            }
            return (
                BackendKind::Claude,
                RoutingRule::DeepReasoning,
                format!("Deep reasoning required: {}", why.join(", ")),
            );
        }

        if score.level == Complexity::Low && chars < SHORT_PROMPT_CHARS {
            return (
                BackendKind::Gemini,
                RoutingRule::SimpleQuery,
                format!(
                    "Low complexity (score {}) and short prompt; fastest backend",
                    score.score
                ),
            );
        }

        (
            BackendKind::AiStudio,
            RoutingRule::Default,
            format!(
                "No specific signal ({} complexity); general multimodal backend",
                score.level
            ),
        )
    }

    fn is_source_like(&self, file: &FileRef) -> bool {
        let ext = file.extension().to_ascii_lowercase();
        if ext.is_empty() {
            return false;
        }
        let lx = self.lexicon;
        lx.source_extensions.contains(&ext.as_str())
            || lx.config_extensions.contains(&ext.as_str())
            || lx.markup_extensions.contains(&ext.as_str())
    }
}

fn files_matching(files: &[FileRef], pred: impl Fn(&FileRef) -> bool) -> Vec<String> {
    files
        .iter()
        .filter(|f| pred(f))
        .map(|f| f.path.clone())
        .collect()
}

fn quote_list(terms: &[&str]) -> String {
    terms
        .iter()
        .take(3)
        .map(|t| format!("'{t}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::FileKind;

    fn classify(task: &Task) -> TaskAnalysis {
        TaskClassifier::default().classify(task, None)
    }

    #[test]
    fn generation_prompt_goes_to_multimodal_backend() {
        let a = classify(&Task::new("generate an image of a sunset"));
        assert_eq!(a.backend, BackendKind::AiStudio);
        assert_eq!(a.rule, RoutingRule::GenerationIntent);
        assert!(a.reasoning.contains("Generation intent"));
        assert!(a.reasoning.contains("'generate'"));
        assert!(a.reasoning.contains("'image'"));
    }

    #[test]
    fn multilingual_generation_is_detected() {
        let a = classify(&Task::new("夕日の画像を生成して"));
        assert_eq!(a.rule, RoutingRule::GenerationIntent);
    }

    #[test]
    fn override_wins_over_everything() {
        let task = Task::new("generate an image").with_file(FileRef::from_path("a.png"));
        let a = TaskClassifier::default().classify(&task, Some(BackendKind::Claude));
        assert_eq!(a.backend, BackendKind::Claude);
        assert_eq!(a.rule, RoutingRule::ExplicitOverride);
    }

    #[test]
    fn file_rules_follow_ladder_order() {
        let src = Task::new("review").with_files(vec![
            FileRef::from_path("photo.png"),
            FileRef::from_path("lib.rs"),
        ]);
        assert_eq!(classify(&src).rule, RoutingRule::SourceFiles);

        let media = Task::new("what is this").with_file(FileRef::from_path("clip.mp3"));
        assert_eq!(classify(&media).rule, RoutingRule::MediaFiles);

        let doc = Task::new("summarize").with_file(FileRef::from_path("scan.pdf"));
        let a = classify(&doc);
        assert_eq!(a.rule, RoutingRule::DocumentFiles);
        assert_eq!(a.backend, BackendKind::AiStudio);

        let declared = Task::new("x").with_file(FileRef::from_path("blob").with_kind(FileKind::Video));
        assert_eq!(classify(&declared).rule, RoutingRule::MediaFiles);
    }

    #[test]
    fn current_information_goes_to_search_backend() {
        let a = classify(&Task::new("What are the latest news about Rust 2024?"));
        assert_eq!(a.backend, BackendKind::Gemini);
        assert_eq!(a.rule, RoutingRule::CurrentInformation);
    }

    #[test]
    fn code_prompt_goes_to_reasoning_backend() {
        let a = classify(&Task::new("Why does this python function raise an exception?"));
        assert_eq!(a.backend, BackendKind::Claude);
        assert_eq!(a.rule, RoutingRule::DeepReasoning);
        assert!(a.reasoning.contains("code-related"));
    }

    #[test]
    fn long_prompt_goes_to_reasoning_backend() {
        let prompt = "lorem ipsum ".repeat(200);
        let a = classify(&Task::new(prompt));
        assert_eq!(a.backend, BackendKind::Claude);
        assert!(a.reasoning.contains("long prompt"));
    }

    #[test]
    fn short_simple_prompt_goes_to_fastest_backend() {
        let a = classify(&Task::new("What is the capital of France?"));
        assert_eq!(a.backend, BackendKind::Gemini);
        assert_eq!(a.rule, RoutingRule::SimpleQuery);
        assert_eq!(a.complexity, Complexity::Low);
    }

    #[test]
    fn medium_prompt_falls_back_to_default() {
        // 500+ chars without any signal terms: tier 2 => score 4 (medium)
        let prompt = "Please write a friendly paragraph about gardens. ".repeat(11);
        let a = classify(&Task::new(prompt));
        assert_eq!(a.complexity, Complexity::Medium);
        assert_eq!(a.rule, RoutingRule::Default);
        assert_eq!(a.backend, BackendKind::AiStudio);
    }

    #[test]
    fn classification_is_deterministic() {
        let task = Task::new("compare the latest two releases and explain the architecture");
        let first = classify(&task);
        for _ in 0..10 {
            let again = classify(&task);
            assert_eq!(again.backend, first.backend);
            assert_eq!(again.reasoning, first.reasoning);
        }
    }
}
