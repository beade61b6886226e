//! Post model as served by the content API

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Opaque post identifier assigned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PostId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PostId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(de::Error::custom(format!(
                "post id must be a string or number, got {}",
                other
            ))),
        }
    }
}

/// A published post. Read-only from the rendering side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,

    /// URL-safe unique identifier used for routing
    pub slug: String,

    pub title: String,

    #[serde(default)]
    pub summary: Option<String>,

    /// ISO-8601 creation time, display only
    #[serde(default)]
    pub created_at: String,

    #[serde(default)]
    pub published_at: Option<String>,

    #[serde(default, deserialize_with = "deserialize_content")]
    pub content: PostContent,

    #[serde(default, alias = "image")]
    pub featured_image_url: Option<String>,

    #[serde(default, deserialize_with = "deserialize_kind")]
    pub ai_metadata: PostKind,
}

impl Post {
    /// Markdown body, `None` when the post has no content yet
    pub fn body(&self) -> Option<&str> {
        self.content
            .body
            .as_deref()
            .filter(|body| !body.trim().is_empty())
    }

    pub fn kind(&self) -> &PostKind {
        &self.ai_metadata
    }

    pub fn post_type(&self) -> PostType {
        self.ai_metadata.post_type()
    }

    pub fn is_news(&self) -> bool {
        matches!(self.ai_metadata, PostKind::News { .. })
    }

    /// arXiv abstract link for paper-based posts
    pub fn paper_url(&self) -> Option<String> {
        self.ai_metadata
            .paper_id()
            .map(|id| format!("https://arxiv.org/abs/{}", id))
    }

    pub fn rex_take(&self) -> Option<&str> {
        match &self.ai_metadata {
            PostKind::News { rex_take, .. } => rex_take.as_deref(),
            _ => None,
        }
    }

    /// Preferred display date: publication time if known, else creation time
    pub fn display_timestamp(&self) -> &str {
        self.published_at.as_deref().unwrap_or(&self.created_at)
    }
}

/// Post body container. Unknown keys are preserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostContent {
    #[serde(default)]
    pub body: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Post type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostType {
    Regular,
    Curated,
    WeeklySummary,
    News,
    Ai101,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Regular => "regular",
            PostType::Curated => "curated",
            PostType::WeeklySummary => "weekly_summary",
            PostType::News => "news",
            PostType::Ai101 => "ai101",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "regular" => Some(PostType::Regular),
            "curated" => Some(PostType::Curated),
            "weekly_summary" => Some(PostType::WeeklySummary),
            "news" => Some(PostType::News),
            "ai101" => Some(PostType::Ai101),
            _ => None,
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed view of the loosely structured `ai_metadata` mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "post_type", rename_all = "snake_case")]
pub enum PostKind {
    Regular {
        paper_id: Option<String>,
    },
    Curated {
        paper_id: Option<String>,
    },
    WeeklySummary,
    News {
        original_article_url: Option<String>,
        original_article_source: Option<String>,
        rex_take: Option<String>,
    },
    Ai101,
    /// A discriminator this build does not know about
    Other {
        #[serde(rename = "type")]
        post_type: String,
    },
}

impl Default for PostKind {
    fn default() -> Self {
        PostKind::Regular { paper_id: None }
    }
}

impl PostKind {
    /// Unknown discriminators are reported as regular posts
    pub fn post_type(&self) -> PostType {
        match self {
            PostKind::Regular { .. } | PostKind::Other { .. } => PostType::Regular,
            PostKind::Curated { .. } => PostType::Curated,
            PostKind::WeeklySummary => PostType::WeeklySummary,
            PostKind::News { .. } => PostType::News,
            PostKind::Ai101 => PostType::Ai101,
        }
    }

    pub fn paper_id(&self) -> Option<&str> {
        match self {
            PostKind::Regular { paper_id } | PostKind::Curated { paper_id } => {
                paper_id.as_deref()
            }
            _ => None,
        }
    }

    /// Decode the raw metadata mapping. Missing fields are `None`,
    /// non-string values are ignored.
    pub fn from_metadata(meta: &Map<String, Value>) -> Self {
        let field = |key: &str| {
            meta.get(key).and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        };

        let post_type = meta
            .get("post_type")
            .and_then(Value::as_str)
            .unwrap_or("regular");

        match PostType::parse(post_type) {
            Some(PostType::Regular) => PostKind::Regular {
                paper_id: field("paper_id"),
            },
            Some(PostType::Curated) => PostKind::Curated {
                paper_id: field("paper_id"),
            },
            Some(PostType::WeeklySummary) => PostKind::WeeklySummary,
            Some(PostType::News) => PostKind::News {
                original_article_url: field("original_article_url"),
                original_article_source: field("original_article_source"),
                rex_take: field("rex_take"),
            },
            Some(PostType::Ai101) => PostKind::Ai101,
            None => PostKind::Other {
                post_type: post_type.to_string(),
            },
        }
    }
}

fn deserialize_kind<'de, D>(deserializer: D) -> Result<PostKind, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Object(meta)) => Ok(PostKind::from_metadata(&meta)),
        Some(Value::Null) | None => Ok(PostKind::default()),
        Some(other) => Err(de::Error::custom(format!(
            "ai_metadata must be an object, got {}",
            other
        ))),
    }
}

fn deserialize_content<'de, D>(deserializer: D) -> Result<PostContent, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<PostContent>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_news_post() {
        let post: Post = serde_json::from_value(json!({
            "id": 42,
            "slug": "gemma-tiny-model",
            "title": "Gemma, tiny model",
            "summary": "Runs on phones.",
            "created_at": "2025-08-20T07:00:00.123456",
            "content": { "body": "# Hello", "word_count": 2 },
            "featured_image_url": null,
            "ai_metadata": {
                "post_type": "news",
                "original_article_url": "https://example.com/a",
                "original_article_source": "Example",
                "rex_take": "Small but mighty."
            }
        }))
        .unwrap();

        assert_eq!(post.id.as_str(), "42");
        assert!(post.is_news());
        assert_eq!(post.rex_take(), Some("Small but mighty."));
        assert_eq!(post.body(), Some("# Hello"));
        assert!(post.content.extra.contains_key("word_count"));
        assert_eq!(post.post_type(), PostType::News);
    }

    #[test]
    fn test_missing_metadata_is_regular() {
        let post: Post = serde_json::from_value(json!({
            "id": "abc",
            "slug": "s",
            "title": "t",
            "ai_metadata": null
        }))
        .unwrap();
        assert_eq!(post.ai_metadata, PostKind::Regular { paper_id: None });
        assert_eq!(post.body(), None);
        assert!(post.summary.is_none());
    }

    #[test]
    fn test_curated_paper_link() {
        let post: Post = serde_json::from_value(json!({
            "id": 1,
            "slug": "attention",
            "title": "Attention Is All You Need",
            "image": "https://img.example.com/a.png",
            "ai_metadata": { "post_type": "curated", "paper_id": "1706.03762" }
        }))
        .unwrap();
        assert_eq!(
            post.paper_url().as_deref(),
            Some("https://arxiv.org/abs/1706.03762")
        );
        assert_eq!(
            post.featured_image_url.as_deref(),
            Some("https://img.example.com/a.png")
        );
    }

    #[test]
    fn test_unknown_post_type() {
        let meta = json!({ "post_type": "podcast" });
        let kind = PostKind::from_metadata(meta.as_object().unwrap());
        assert_eq!(
            kind,
            PostKind::Other {
                post_type: "podcast".to_string()
            }
        );
        assert_eq!(kind.post_type(), PostType::Regular);
    }

    #[test]
    fn test_blank_body_is_absent() {
        let post: Post = serde_json::from_value(json!({
            "id": 3, "slug": "s", "title": "t", "content": { "body": "  \n" }
        }))
        .unwrap();
        assert_eq!(post.body(), None);
    }

    #[test]
    fn test_null_content_is_absent() {
        let post: Post = serde_json::from_value(json!({
            "id": 7, "slug": "s", "title": "t", "content": null, "ai_metadata": null
        }))
        .unwrap();
        assert_eq!(post.body(), None);
        assert!(post.content.extra.is_empty());
    }
}
