
use async_trait::async_trait;
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::debug;

use crate::database::lancedb::{CatalogIndex, ContentIndex, SearchResults};
use crate::{RagError, Result};

pub const SEARCH_TOOL_NAME: &str = "search_course_content";
pub const OUTLINE_TOOL_NAME: &str = "get_course_outline";

/// Declared capability offered to the chat model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Result of one tool execution: text for the model and citations for the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    pub sources: Vec<String>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, arguments: &Value) -> Result<ToolOutput>;
}

fn parse_arguments<T: for<'de> Deserialize<'de>>(tool: &str, arguments: &Value) -> Result<T> {
    serde_json::from_value(arguments.clone())
        .map_err(|e| RagError::ModelCall(format!("invalid arguments for tool '{}': {}", tool, e)))
}

/// Accepts `2`, `2.0` or `"2"`; models are not consistent about numeric arguments
fn lenient_lesson_number<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                    .map(|f| f as u64)
            })
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid lesson number {}", number))),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid lesson number '{}'", text))),
        Some(other) => Err(D::Error::custom(format!(
            "invalid lesson number {}",
            other
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct SearchArguments {
    query: String,
    #[serde(default)]
    course_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_lesson_number")]
    lesson_number: Option<u32>,
}

/// Semantic search over lesson content with optional course and lesson filters
pub struct CourseSearchTool {
    catalog: Arc<CatalogIndex>,
    content: Arc<ContentIndex>,
    max_results: usize,
}

impl CourseSearchTool {
    #[inline]
    pub fn new(catalog: Arc<CatalogIndex>, content: Arc<ContentIndex>, max_results: usize) -> Self {
        Self {
            catalog,
            content,
            max_results,
        }
    }

    /// Resolve the course filter, search, and format hits with their citations
    #[inline]
    pub async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
    ) -> Result<ToolOutput> {
        let course_title = match course_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => match self.catalog.resolve_course_name(name).await {
                Ok(title) => Some(title),
                Err(RagError::NotFound(_)) => {
                    debug!("No course matched '{}'", name);
                    return Ok(ToolOutput {
                        text: format!("No course found matching '{}'", name),
                        sources: Vec::new(),
                    });
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        let results = self
            .content
            .query(query, course_title.as_deref(), lesson_number, self.max_results)
            .await?;

        if results.is_empty() {
            return Ok(ToolOutput {
                text: empty_result_message(course_title.as_deref(), lesson_number),
                sources: Vec::new(),
            });
        }

        Ok(format_results(&results))
    }
}

fn empty_result_message(course_title: Option<&str>, lesson_number: Option<u32>) -> String {
    let mut message = "No relevant content found".to_string();
    if let Some(title) = course_title {
        let _ = write!(message, " in course '{}'", title);
    }
    if let Some(lesson) = lesson_number {
        let _ = write!(message, " in lesson {}", lesson);
    }
    message.push('.');
    message
}

fn format_results(results: &SearchResults) -> ToolOutput {
    let text = results
        .hits
        .iter()
        .map(|hit| {
            format!(
                "[{} - Lesson {}]\n{}",
                hit.course_title, hit.lesson_number, hit.content
            )
        })
        .join("\n\n");

    let sources = results
        .hits
        .iter()
        .map(|hit| format!("{} - Lesson {}", hit.course_title, hit.lesson_number))
        .unique()
        .collect();

    ToolOutput { text, sources }
}

#[async_trait]
impl Tool for CourseSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: SEARCH_TOOL_NAME.to_string(),
            description: "Search course materials with smart course name matching and lesson filtering"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search for in the course content"
                    },
                    "course_name": {
                        "type": "string",
                        "description": "Course title; partial matches work (e.g. 'MCP', 'Introduction')"
                    },
                    "lesson_number": {
                        "type": "integer",
                        "description": "Specific lesson number to search within (e.g. 1, 2, 3)"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, arguments: &Value) -> Result<ToolOutput> {
        let args: SearchArguments = parse_arguments(SEARCH_TOOL_NAME, arguments)?;
        self.search(&args.query, args.course_name.as_deref(), args.lesson_number)
            .await
    }
}

#[derive(Debug, Deserialize)]
struct OutlineArguments {
    course_name: String,
}

/// Course title, link, instructor and lesson list for one course
pub struct CourseOutlineTool {
    catalog: Arc<CatalogIndex>,
}

impl CourseOutlineTool {
    #[inline]
    pub fn new(catalog: Arc<CatalogIndex>) -> Self {
        Self { catalog }
    }

    #[inline]
    pub async fn outline(&self, course_name: &str) -> Result<ToolOutput> {
        let not_found = || ToolOutput {
            text: format!("No course found matching '{}'", course_name),
            sources: Vec::new(),
        };

        let title = match self.catalog.resolve_course_name(course_name).await {
            Ok(title) => title,
            Err(RagError::NotFound(_)) => return Ok(not_found()),
            Err(e) => return Err(e),
        };

        let Some(course) = self.catalog.get_course(&title).await? else {
            return Ok(not_found());
        };

        let mut text = format!(
            "Course: {}\nLink: {}\nInstructor: {}\nLessons ({}):",
            course.title,
            course.course_link,
            course.instructor,
            course.lessons.len()
        );
        for lesson in &course.lessons {
            let _ = write!(text, "\nLesson {}: {}", lesson.lesson_number, lesson.title);
        }

        Ok(ToolOutput {
            text,
            sources: vec![course.title],
        })
    }
}

#[async_trait]
impl Tool for CourseOutlineTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: OUTLINE_TOOL_NAME.to_string(),
            description: "Get a course outline: title, link, instructor and the numbered lesson list"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "course_name": {
                        "type": "string",
                        "description": "Course title; partial matches work"
                    }
                },
                "required": ["course_name"]
            }),
        }
    }

    async fn execute(&self, arguments: &Value) -> Result<ToolOutput> {
        let args: OutlineArguments = parse_arguments(OUTLINE_TOOL_NAME, arguments)?;
        self.outline(&args.course_name).await
    }
}

/// Fixed name to handler dispatch table
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Search and outline tools over the given indexes
    #[inline]
    pub fn for_courses(
        catalog: Arc<CatalogIndex>,
        content: Arc<ContentIndex>,
        max_results: usize,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CourseSearchTool::new(
            Arc::clone(&catalog),
            content,
            max_results,
        )));
        registry.register(Arc::new(CourseOutlineTool::new(catalog)));
        registry
    }

    #[inline]
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        self.tools.insert(name, tool);
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Definitions of every registered tool, ordered by name
    #[inline]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| tool.definition())
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
