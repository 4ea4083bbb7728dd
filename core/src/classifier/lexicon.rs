//! Keyword tables used by the task classifier and the fast-path check.
//!
//! These are heuristic data, not a grammar. Bump [`LEXICON_VERSION`] whenever
//! a table changes so routing changes can be traced back to a table revision.

pub const LEXICON_VERSION: &str = "2024.11.1";

#[derive(Debug)]
pub struct Lexicon {
    pub version: &'static str,
    pub generation_verbs: &'static [&'static str],
    pub generatable_media: &'static [&'static str],
    pub current_info: &'static [&'static str],
    pub complexity_keywords: &'static [&'static str],
    pub code_markers: &'static [&'static str],
    pub workflow_markers: &'static [&'static str],
    pub fast_path_complex_ops: &'static [&'static str],
    pub source_extensions: &'static [&'static str],
    pub config_extensions: &'static [&'static str],
    pub markup_extensions: &'static [&'static str],
}

pub static DEFAULT_LEXICON: Lexicon = Lexicon {
    version: LEXICON_VERSION,
    generation_verbs: &[
        // en
        "generate", "create", "make", "draw", "render", "paint", "produce", "design",
        "synthesize", "compose",
        // ja
        "生成", "作成", "作って", "描いて", "つくって",
        // zh
        "创建", "制作", "画一", "绘制",
        // es / fr / de
        "genera", "crea", "dibuja", "génère", "crée", "dessine", "erzeuge", "erstelle",
        "zeichne",
    ],
    generatable_media: &[
        // en
        "image", "picture", "photo", "illustration", "drawing", "logo", "icon", "artwork",
        "video", "animation", "clip", "audio", "speech", "voice", "voiceover", "narration",
        "music", "song", "sound",
        // ja
        "画像", "写真", "イラスト", "動画", "音声", "音楽",
        // zh
        "图片", "图像", "照片", "视频", "音频", "语音",
        // es / fr / de
        "imagen", "vídeo", "vidéo", "bild", "foto", "stimme",
    ],
    current_info: &[
        // en
        "latest", "current", "currently", "today", "tonight", "yesterday", "this week",
        "this month", "news", "breaking", "recent", "recently", "trending", "right now",
        "up to date", "up-to-date", "weather", "stock price", "release date",
        // ja
        "最新", "今日", "現在", "ニュース", "最近", "速報",
        // zh
        "今天", "新闻", "目前", "最近的",
        // es / fr / de
        "últimas", "noticias", "hoy", "actualités", "aujourd'hui", "récent", "aktuell",
        "heute", "nachrichten", "neueste",
    ],
    complexity_keywords: &[
        "analyze", "analyse", "analysis", "architecture", "refactor", "optimize", "optimise",
        "compare", "evaluate", "comprehensive", "in-depth", "detailed", "strategy",
        "trade-off", "tradeoff", "debug", "implement", "algorithm", "prove", "reason",
        "investigate", "root cause", "design pattern", "security review",
        "分析", "設計", "最適化", "比較", "优化", "架构",
    ],
    code_markers: &[
        "```", "code", "function", "class", "method", "compile", "compiler", "bug",
        "stack trace", "traceback", "exception", "unit test", "regex", "api endpoint",
        "typescript", "javascript", "python", "rust", "golang", "java", "sql", "bash",
        "コード", "代码", "函数",
    ],
    workflow_markers: &[
        "step by step", "step-by-step", "then", "after that", "afterwards", "followed by",
        "workflow", "pipeline", "multi-step", "first,", "finally", "and then",
        "次に", "その後", "然后", "接着",
    ],
    fast_path_complex_ops: &[
        "workflow", "orchestrate", "convert", "multi-file", "image-generation",
    ],
    source_extensions: &[
        "rs", "py", "js", "ts", "tsx", "jsx", "go", "java", "c", "h", "cpp", "hpp", "cs",
        "rb", "php", "swift", "kt", "scala", "sh", "sql", "lua",
    ],
    config_extensions: &[
        "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "env", "properties", "lock",
    ],
    markup_extensions: &["html", "htm", "xml", "md", "markdown", "rst", "css", "scss", "svg", "vue"],
};

/// Case-insensitive term match against already-lowercased text.
///
/// ASCII word terms must sit on word boundaries (so `now` does not match
/// `know`); terms with non-ASCII letters or punctuation match as substrings.
pub fn contains_term(text_lower: &str, term: &str) -> bool {
    let term = term.to_lowercase();
    let word_like = term
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == '\'');
    if !word_like {
        return text_lower.contains(&term);
    }

    let bytes = text_lower.as_bytes();
    let mut start = 0;
    while let Some(pos) = text_lower[start..].find(&term) {
        let begin = start + pos;
        let end = begin + term.len();
        let before_ok = begin == 0 || !is_word_byte(bytes[begin - 1]);
        let after_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        start = begin + 1;
        while start < text_lower.len() && !text_lower.is_char_boundary(start) {
            start += 1;
        }
        if start >= text_lower.len() {
            break;
        }
    }
    false
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Terms from `table` found in `text_lower`, in table order.
pub fn matched_terms(text_lower: &str, table: &[&'static str]) -> Vec<&'static str> {
    let mut hits: Vec<&'static str> = table
        .iter()
        .copied()
        .filter(|term| contains_term(text_lower, term))
        .collect();
    hits.dedup();
    hits
}
