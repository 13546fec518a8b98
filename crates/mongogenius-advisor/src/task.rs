use serde::de::DeserializeOwned;

use mongogenius_core::{
    FieldRule, IndexSuggestionRequest, IndexSuggestionResult, OutputShape,
    QueryOptimizationRequest, QueryOptimizationResult, SchemaGenerationRequest,
    SchemaGenerationResult,
};

use crate::prompt;

/// One advisor feature: what to check on the way in, how to phrase the
/// prompt and what the reply must contain.
pub trait Task {
    type Output: DeserializeOwned;

    const NAME: &'static str;
    const TEMPLATE: &'static str;
    const RULES: &'static [FieldRule];
    const SHAPE: OutputShape;

    /// Input fields by placeholder name.
    fn fields(&self) -> Vec<(&'static str, &str)>;
}

impl Task for SchemaGenerationRequest {
    type Output = SchemaGenerationResult;

    const NAME: &'static str = "generate_schema";
    const TEMPLATE: &'static str = prompt::SCHEMA_TEMPLATE;
    const RULES: &'static [FieldRule] = &[FieldRule::new(
        "dataRequirements",
        "Please provide more details about your data requirements.",
    )];
    const SHAPE: OutputShape = SchemaGenerationResult::SHAPE;

    fn fields(&self) -> Vec<(&'static str, &str)> {
        vec![("dataRequirements", self.data_requirements.as_str())]
    }
}

impl Task for QueryOptimizationRequest {
    type Output = QueryOptimizationResult;

    const NAME: &'static str = "optimize_query";
    const TEMPLATE: &'static str = prompt::QUERY_TEMPLATE;
    const RULES: &'static [FieldRule] = &[
        FieldRule::new("query", "Please provide a query to optimize."),
        FieldRule::new("dataModel", "Please provide details about your data model."),
    ];
    const SHAPE: OutputShape = QueryOptimizationResult::SHAPE;

    fn fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("query", self.query.as_str()),
            ("dataModel", self.data_model.as_str()),
        ]
    }
}

impl Task for IndexSuggestionRequest {
    type Output = IndexSuggestionResult;

    const NAME: &'static str = "suggest_indexes";
    const TEMPLATE: &'static str = prompt::INDEX_TEMPLATE;
    const RULES: &'static [FieldRule] = &[
        FieldRule::new(
            "dataModelDescription",
            "Please provide a data model description.",
        ),
        FieldRule::new("queryPatterns", "Please describe your query patterns."),
    ];
    const SHAPE: OutputShape = IndexSuggestionResult::SHAPE;

    fn fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("dataModelDescription", self.data_model_description.as_str()),
            ("queryPatterns", self.query_patterns.as_str()),
        ]
    }
}
