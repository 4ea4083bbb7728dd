use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::BackendKind;

/// Declared attachment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Audio,
    Pdf,
    Document,
    Text,
    Video,
    #[default]
    Unknown,
}

impl FileKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "tif" | "tiff" | "heic" => {
                Self::Image
            }
            "mp3" | "wav" | "flac" | "ogg" | "m4a" | "aac" | "opus" => Self::Audio,
            "mp4" | "mov" | "avi" | "mkv" | "webm" | "m4v" => Self::Video,
            "pdf" => Self::Pdf,
            "doc" | "docx" | "odt" | "rtf" | "ppt" | "pptx" | "xls" | "xlsx" | "epub" => {
                Self::Document
            }
            "txt" | "md" | "markdown" | "csv" | "tsv" | "log" | "json" | "yaml" | "yml"
            | "toml" | "xml" | "html" | "htm" | "ini" | "cfg" | "conf" | "rs" | "py" | "js"
            | "ts" | "tsx" | "jsx" | "go" | "java" | "c" | "h" | "cpp" | "hpp" | "cs" | "rb"
            | "php" | "swift" | "kt" | "sh" | "sql" | "css" | "scss" | "vue" | "svg" => {
                Self::Text
            }
            _ => Self::Unknown,
        }
    }

    pub fn is_media(self) -> bool {
        matches!(self, Self::Image | Self::Audio | Self::Video)
    }

    pub fn is_document(self) -> bool {
        matches!(self, Self::Pdf | Self::Document)
    }

    pub fn mime_type(self, ext: &str) -> &'static str {
        match (self, ext.to_ascii_lowercase().as_str()) {
            (Self::Image, "png") => "image/png",
            (Self::Image, "gif") => "image/gif",
            (Self::Image, "webp") => "image/webp",
            (Self::Image, _) => "image/jpeg",
            (Self::Audio, "wav") => "audio/wav",
            (Self::Audio, "flac") => "audio/flac",
            (Self::Audio, "ogg") => "audio/ogg",
            (Self::Audio, _) => "audio/mpeg",
            (Self::Video, "mov") => "video/quicktime",
            (Self::Video, "webm") => "video/webm",
            (Self::Video, _) => "video/mp4",
            (Self::Pdf, _) => "application/pdf",
            (Self::Document, _) => "application/octet-stream",
            (Self::Text, _) => "text/plain",
            (Self::Unknown, _) => "application/octet-stream",
        }
    }
}

/// File attachment reference. Content is never loaded by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub path: String,
    #[serde(rename = "type", default)]
    pub kind: FileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl FileRef {
    /// Build a reference with the type inferred from the extension.
    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        let kind = FileKind::from_extension(extension_of(&path));
        Self {
            path,
            kind,
            size: None,
            encoding: None,
        }
    }

    pub fn with_kind(mut self, kind: FileKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn extension(&self) -> &str {
        extension_of(&self.path)
    }

    pub fn mime_type(&self) -> &'static str {
        self.kind.mime_type(self.extension())
    }
}

fn extension_of(path: &str) -> &str {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
}

/// One unit of work handed to a backend. Immutable per attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub prompt: String,
    #[serde(default)]
    pub files: Vec<FileRef>,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Task {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_files(mut self, files: Vec<FileRef>) -> Self {
        self.files = files;
        self
    }

    pub fn with_file(mut self, file: FileRef) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Common task interface for executor graph handling.
pub trait TaskLike: Clone + Send + Sync {
    fn id(&self) -> &str;
    fn dependencies(&self) -> &[String];
}

/// One node of a workflow plan, bound to exactly one backend and action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: String,
    pub backend: BackendKind,
    pub action: String,
    #[serde(default)]
    pub input: Map<String, Value>,
    #[serde(default, alias = "depends_on")]
    pub depends_on: Vec<String>,
    #[serde(default, alias = "timeout_ms", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, backend: BackendKind, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            backend,
            action: action.into(),
            input: Map::new(),
            depends_on: Vec::new(),
            timeout_ms: None,
        }
    }

    pub fn input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Build the backend task from an already-resolved input map.
    pub fn to_task(&self, input: Map<String, Value>) -> Task {
        let prompt = ["prompt", "instructions", "query", "content"]
            .iter()
            .find_map(|key| input.get(*key).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        let files = input
            .get("files")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(file_ref_from_value).collect())
            .unwrap_or_default();

        Task {
            prompt,
            files,
            options: input,
            action: Some(self.action.clone()),
            timeout_ms: self.timeout_ms,
        }
    }
}

impl TaskLike for WorkflowStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.depends_on
    }
}

fn file_ref_from_value(value: &Value) -> Option<FileRef> {
    match value {
        Value::String(path) => Some(FileRef::from_path(path.clone())),
        Value::Object(_) => serde_json::from_value::<FileRef>(value.clone())
            .ok()
            .map(|f| {
                if f.kind == FileKind::Unknown {
                    let inferred = FileRef::from_path(f.path.clone()).kind;
                    f.with_kind(inferred)
                } else {
                    f
                }
            }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_file_kind_from_extension() {
        assert_eq!(FileRef::from_path("a/b/photo.JPG").kind, FileKind::Image);
        assert_eq!(FileRef::from_path("report.pdf").kind, FileKind::Pdf);
        assert_eq!(FileRef::from_path("notes.docx").kind, FileKind::Document);
        assert_eq!(FileRef::from_path("main.rs").kind, FileKind::Text);
        assert_eq!(FileRef::from_path("blob").kind, FileKind::Unknown);
        assert_eq!(FileRef::from_path("clip.mov").mime_type(), "video/quicktime");
    }

    #[test]
    fn step_to_task_reads_prompt_and_files() {
        let step = WorkflowStep::new("s1", BackendKind::AiStudio, "extract").timeout_ms(500);
        let mut input = Map::new();
        input.insert("instructions".into(), json!("describe"));
        input.insert(
            "files".into(),
            json!(["scan.png", {"path": "doc.pdf"}, {"path": "x.bin", "type": "audio"}, 7]),
        );

        let task = step.to_task(input);
        assert_eq!(task.prompt, "describe");
        assert_eq!(task.action.as_deref(), Some("extract"));
        assert_eq!(task.timeout_ms, Some(500));
        let kinds: Vec<FileKind> = task.files.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FileKind::Image, FileKind::Pdf, FileKind::Audio]);
        assert!(task.options.contains_key("files"));
    }

    #[test]
    fn step_deserializes_camel_and_snake_case() {
        let camel: WorkflowStep = serde_json::from_value(json!({
            "id": "b", "backend": "gemini", "action": "search", "dependsOn": ["a"]
        }))
        .unwrap();
        let snake: WorkflowStep = serde_json::from_value(json!({
            "id": "b", "backend": "gemini", "action": "search", "depends_on": ["a"]
        }))
        .unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.depends_on, vec!["a".to_string()]);
    }
}
