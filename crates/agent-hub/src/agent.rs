use std::fmt;
use std::str::FromStr;

use crate::errors::HubError;

/// Closed set of agents a front-end can select.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    /// Generates SEO copy from a product image.
    Seo,
    /// Produces an enhanced advertisement scene from a product image.
    ImageEnhancer,
    /// Answers questions about uploaded documents.
    #[serde(rename = "doc-agent")]
    DocumentQa,
}

/// How a front-end talks to an agent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AgentMode {
    /// One streamed run per submit (`RunSessionController`).
    Streaming,
    /// Request/response chat over a document session (`ChatSessionManager`).
    Chat,
}

/// Shape of the terminal payload an agent produces.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputKind {
    /// Markdown text shown verbatim.
    Markdown,
    /// Path (usually relative to the backend) of a generated image.
    ImageUrl,
    /// Plain chat reply.
    ChatReply,
}

/// A named processing stage whose activity is inferred from run logs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ToolDescriptor {
    /// Name as it appears in backend log lines.
    pub name: &'static str,
    /// Human-readable label.
    pub display_name: &'static str,
}

impl ToolDescriptor {
    const fn new(name: &'static str, display_name: &'static str) -> Self {
        Self { name, display_name }
    }
}

const SEO_TOOLS: &[ToolDescriptor] = &[
    ToolDescriptor::new("InitialImageDescriptionTool", "Image Description"),
    ToolDescriptor::new("SEOEnhancementTool", "SEO Enhancement"),
    ToolDescriptor::new("SERankingSimilarKeywordTool", "Similar Keywords"),
    ToolDescriptor::new("SERankingRelatedKeywordTool", "Related Keywords"),
    ToolDescriptor::new("SERankingQuestionKeywordTool", "Question Keywords"),
];

const IMAGE_TOOLS: &[ToolDescriptor] =
    &[ToolDescriptor::new("GenerativeImageTool", "Generative Image")];

const SEO_SUGGESTIONS: &[&str] = &[
    "SEO for blogs focusing on tech reviews",
    "SEO for ecommerce products with eco-friendly features",
    "Create product description highlighting premium quality",
    "Generate meta description for luxury watch",
    "Write SEO content for sustainable fashion brand",
    "Optimize description for fitness equipment",
    "SEO for handmade artisan products",
    "Create compelling product copy for electronics",
];

const IMAGE_SUGGESTIONS: &[&str] = &[
    "Enhance lighting and add warm tones",
    "Remove background and add gradient",
    "Boost color vibrancy and contrast",
    "Place product in modern kitchen setting with natural lighting",
    "Create lifestyle scene with the product",
    "Add soft shadows and professional studio lighting",
    "Generate outdoor advertisement scene",
    "Place in minimalist white background",
];

/// Minimum query length before suggestions are offered.
const MIN_SUGGESTION_QUERY: usize = 2;

impl AgentKind {
    /// Every selectable agent, in selector order.
    pub const ALL: [AgentKind; 3] = [Self::Seo, Self::ImageEnhancer, Self::DocumentQa];

    /// Identifier used by selectors and on the command line.
    pub fn id(self) -> &'static str {
        match self {
            Self::Seo => "seo",
            Self::ImageEnhancer => "image-enhancer",
            Self::DocumentQa => "doc-agent",
        }
    }

    /// Name the backend routes runs by.
    pub fn backend_name(self) -> &'static str {
        match self {
            Self::Seo => "seo_agent",
            Self::ImageEnhancer => "image_enhancer_agent",
            Self::DocumentQa => "doc_agent",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Seo => "SEO Content Agent",
            Self::ImageEnhancer => "Image Enhancer Agent",
            Self::DocumentQa => "Document QA Agent",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Seo => "Generate SEO-optimized content from product images",
            Self::ImageEnhancer => "Create enhanced advertisement scenes from product images",
            Self::DocumentQa => "Chat with your documents using RAG-powered AI",
        }
    }

    pub fn mode(self) -> AgentMode {
        match self {
            Self::Seo | Self::ImageEnhancer => AgentMode::Streaming,
            Self::DocumentQa => AgentMode::Chat,
        }
    }

    pub fn output_kind(self) -> OutputKind {
        match self {
            Self::Seo => OutputKind::Markdown,
            Self::ImageEnhancer => OutputKind::ImageUrl,
            Self::DocumentQa => OutputKind::ChatReply,
        }
    }

    /// Whether a streaming run needs an image payload.
    pub fn requires_image(self) -> bool {
        matches!(self, Self::Seo | Self::ImageEnhancer)
    }

    /// Declared tool roster, in display order.
    pub fn tools(self) -> &'static [ToolDescriptor] {
        match self {
            Self::Seo => SEO_TOOLS,
            Self::ImageEnhancer => IMAGE_TOOLS,
            Self::DocumentQa => &[],
        }
    }

    pub fn prompt_label(self) -> &'static str {
        match self {
            Self::Seo => "Enter SEO Query",
            Self::ImageEnhancer => "Enter Creative Prompt",
            Self::DocumentQa => "Ask a Question",
        }
    }

    pub fn prompt_placeholder(self) -> &'static str {
        match self {
            Self::Seo => {
                "Describe the SEO content you want to generate... (e.g., 'Create product description focusing on eco-friendly features')"
            }
            Self::ImageEnhancer => {
                "Describe the advertisement scene you want to create... (e.g., 'Place product in a modern kitchen setting with natural lighting')"
            }
            Self::DocumentQa => "Ask something about the uploaded document...",
        }
    }

    /// Prompt suggestions containing `query`, compared case-insensitively.
    ///
    /// Returns nothing for queries shorter than two characters.
    pub fn suggestions(self, query: &str) -> Vec<&'static str> {
        if query.chars().count() < MIN_SUGGESTION_QUERY {
            return Vec::new();
        }
        let pool: &[&str] = match self {
            Self::Seo => SEO_SUGGESTIONS,
            Self::ImageEnhancer => IMAGE_SUGGESTIONS,
            Self::DocumentQa => &[],
        };
        let needle = query.to_lowercase();
        pool.iter()
            .copied()
            .filter(|s| s.to_lowercase().contains(&needle))
            .collect()
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for AgentKind {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|agent| agent.id() == needle)
            .ok_or_else(|| HubError::UnknownAgent(needle.to_string()))
    }
}
