pub mod engine;
mod parse;
pub mod prompt;
pub mod task;

use std::sync::Arc;

use thiserror::Error;

use mongogenius_core::{
    validate_fields, AiSettings, FieldRule, IndexSuggestionRequest, IndexSuggestionResult,
    InvocationError, QueryOptimizationRequest, QueryOptimizationResult, SchemaGenerationRequest,
    SchemaGenerationResult, ValidationError, DEFAULT_MIN_FIELD_LENGTH,
};

pub use engine::{LlmClient, ModelClient};
pub use task::Task;

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

/// Runs the three features against one model client. Holds no per-call
/// state, so a single instance can serve concurrent callers.
#[derive(Clone)]
pub struct Advisor {
    client: Arc<dyn ModelClient>,
    min_field_length: usize,
}

impl Advisor {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            min_field_length: DEFAULT_MIN_FIELD_LENGTH,
        }
    }

    pub fn from_settings(settings: AiSettings) -> Self {
        let min_field_length = settings.min_field_length();
        Self::new(Arc::new(LlmClient::new(settings))).with_min_field_length(min_field_length)
    }

    pub fn with_min_field_length(mut self, min_field_length: usize) -> Self {
        self.min_field_length = min_field_length;
        self
    }

    /// Validate, render, invoke once, check the reply.
    pub async fn run<T: Task>(&self, request: &T) -> Result<T::Output, AdvisorError> {
        let fields = request.fields();

        let rules: Vec<FieldRule> = T::RULES
            .iter()
            .map(|r| r.with_min_len(self.min_field_length))
            .collect();
        if let Err(e) = validate_fields(&fields, &rules) {
            tracing::debug!(task = T::NAME, fields = ?e.fields(), "rejected request");
            return Err(e.into());
        }

        let prompt = prompt::render(T::TEMPLATE, &fields);
        tracing::debug!(task = T::NAME, bytes = prompt.len(), "rendered prompt");

        let map = engine::invoke(self.client.as_ref(), &prompt, &T::SHAPE)
            .await
            .inspect_err(|e| tracing::warn!(task = T::NAME, "model invocation failed: {e}"))?;

        let output = serde_json::from_value(serde_json::Value::Object(map))
            .map_err(|e| InvocationError::Malformed(e.to_string()))?;
        Ok(output)
    }

    pub async fn generate_schema(
        &self,
        data_requirements: &str,
    ) -> Result<SchemaGenerationResult, AdvisorError> {
        self.run(&SchemaGenerationRequest {
            data_requirements: data_requirements.to_string(),
        })
        .await
    }

    pub async fn optimize_query(
        &self,
        query: &str,
        data_model: &str,
    ) -> Result<QueryOptimizationResult, AdvisorError> {
        self.run(&QueryOptimizationRequest {
            query: query.to_string(),
            data_model: data_model.to_string(),
        })
        .await
    }

    pub async fn suggest_indexes(
        &self,
        data_model_description: &str,
        query_patterns: &str,
    ) -> Result<IndexSuggestionResult, AdvisorError> {
        self.run(&IndexSuggestionRequest {
            data_model_description: data_model_description.to_string(),
            query_patterns: query_patterns.to_string(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every prompt and answers with a fixed reply.
    struct Stub {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl Stub {
        fn replying(raw: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(raw.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(msg: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(msg.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ModelClient for Stub {
        async fn generate(&self, _system: &str, prompt: &str) -> Result<String, InvocationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(InvocationError::Transport)
        }
    }

    fn advisor(stub: &Arc<Stub>) -> Advisor {
        Advisor::new(stub.clone())
    }

    #[tokio::test]
    async fn generate_schema_returns_stubbed_pair() {
        let stub = Stub::replying(
            r#"{"mongoDBSchema":"db.posts...","progress":"Generated a blog schema."}"#,
        );
        let result = advisor(&stub)
            .generate_schema("A blog with posts and comments")
            .await
            .unwrap();
        assert_eq!(
            result,
            SchemaGenerationResult {
                mongodb_schema: "db.posts...".into(),
                progress: "Generated a blog schema.".into(),
            }
        );
        assert_eq!(stub.calls(), 1);
        assert!(stub.last_prompt().contains("A blog with posts and comments"));
    }

    #[tokio::test]
    async fn optimize_query_returns_stubbed_pair_unmodified() {
        let stub = Stub::replying(
            r#"{"optimizedQuery":"db.users.find({status:\"active\"}).hint({status:1})","explanation":"Add an index on status."}"#,
        );
        let query = r#"db.users.find({status:"active"})"#;
        let model = "users: {status: string, indexed: false}";
        let result = advisor(&stub).optimize_query(query, model).await.unwrap();
        assert_eq!(
            result.optimized_query,
            r#"db.users.find({status:"active"}).hint({status:1})"#
        );
        assert_eq!(result.explanation, "Add an index on status.");

        let prompt = stub.last_prompt();
        assert!(prompt.contains(query));
        assert!(prompt.contains(model));
    }

    #[tokio::test]
    async fn suggest_indexes_renders_both_inputs() {
        let stub = Stub::replying(r#"{"suggestedIndexes":"{ authorId: 1, createdAt: -1 }"}"#);
        let desc = "posts: {authorId: ObjectId, createdAt: Date, tags: [string]}";
        let patterns = "latest posts by author, sorted by createdAt";
        let result = advisor(&stub).suggest_indexes(desc, patterns).await.unwrap();
        assert_eq!(result.suggested_indexes, "{ authorId: 1, createdAt: -1 }");

        let prompt = stub.last_prompt();
        assert!(prompt.contains(desc));
        assert!(prompt.contains(patterns));
    }

    #[tokio::test]
    async fn invalid_requests_never_reach_the_model() {
        let stub = Stub::replying("{}");
        let advisor = advisor(&stub);

        let err = advisor.generate_schema("blog").await.unwrap_err();
        assert!(matches!(&err, AdvisorError::Validation(v) if v.fields() == ["dataRequirements"]));

        let err = advisor.optimize_query("", "short").await.unwrap_err();
        assert!(matches!(&err, AdvisorError::Validation(v) if v.fields() == ["query", "dataModel"]));

        let err = advisor
            .suggest_indexes("users with emails and names", "")
            .await
            .unwrap_err();
        assert!(matches!(&err, AdvisorError::Validation(v) if v.fields() == ["queryPatterns"]));

        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn short_requirements_ask_for_more_detail() {
        let stub = Stub::replying("{}");
        let err = advisor(&stub).generate_schema("a blog").await.unwrap_err();
        let AdvisorError::Validation(v) = err else {
            panic!("expected a validation error, got {err:?}");
        };
        assert_eq!(
            v.violations[0].message,
            "Please provide more details about your data requirements."
        );
    }

    #[tokio::test]
    async fn configured_min_length_applies() {
        let stub = Stub::replying(r#"{"mongoDBSchema":"db.a","progress":"ok"}"#);
        let advisor = advisor(&stub).with_min_field_length(3);
        assert!(advisor.generate_schema("a b").await.is_ok());
        assert!(advisor.generate_schema("ab").await.is_err());
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn missing_result_field_is_an_invocation_error() {
        let stub = Stub::replying(r#"{"mongoDBSchema":"db.posts..."}"#);
        let err = advisor(&stub)
            .generate_schema("A blog with posts and comments")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdvisorError::Invocation(InvocationError::MissingField(f)) if f == "progress"
        ));
    }

    #[tokio::test]
    async fn transport_fault_propagates() {
        let stub = Stub::failing("connection reset");
        let err = advisor(&stub)
            .optimize_query(r#"db.users.find({status:"active"})"#, "users: {status: string}")
            .await
            .unwrap_err();
        match err {
            AdvisorError::Invocation(InvocationError::Transport(msg)) => {
                assert_eq!(msg, "connection reset")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn placeholder_like_input_is_sent_verbatim() {
        let stub = Stub::replying(r#"{"suggestedIndexes":"none"}"#);
        advisor(&stub)
            .suggest_indexes("{{queryPatterns}} in a users collection", "lookup by {{email}}")
            .await
            .unwrap();
        let prompt = stub.last_prompt();
        assert!(prompt.contains("{{queryPatterns}} in a users collection"));
        assert!(prompt.contains("lookup by {{email}}"));
    }
}
