//! Tantivy schema for page-level full-text documents

use tantivy::schema::{
    IndexRecordOption, Schema, SchemaBuilder, TextFieldIndexing, TextOptions, FAST, INDEXED,
    STORED, STRING,
};

/// Field names for the text index
pub mod fields {
    pub const KEY: &str = "key";
    pub const PAGE: &str = "page";
    pub const KIND: &str = "kind";
    pub const TEXT: &str = "text";
}

/// Document kind discriminator values
pub mod kinds {
    pub const PAGE: &str = "page";
    pub const NOTE: &str = "note";
}

/// Build the schema: one document per page (or note) of a work.
pub fn build_schema() -> Schema {
    let mut schema_builder = SchemaBuilder::new();

    // Exact-match owner key and document kind
    schema_builder.add_text_field(fields::KEY, STRING | STORED);
    schema_builder.add_text_field(fields::KIND, STRING | STORED);

    // 0-based page position within the work
    schema_builder.add_u64_field(fields::PAGE, INDEXED | STORED | FAST);

    // Page text: analyzed with positions (phrase queries), stored for
    // fragment extraction
    let text_options = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("en_stem")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    schema_builder.add_text_field(fields::TEXT, text_options);

    schema_builder.build()
}

/// Register the stemming analyzer used by the text field.
pub fn configure_tokenizers(index: &tantivy::Index) {
    index.tokenizers().register(
        "en_stem",
        tantivy::tokenizer::TextAnalyzer::builder(tantivy::tokenizer::SimpleTokenizer::default())
            .filter(tantivy::tokenizer::RemoveLongFilter::limit(40))
            .filter(tantivy::tokenizer::LowerCaser)
            .filter(tantivy::tokenizer::Stemmer::new(
                tantivy::tokenizer::Language::English,
            ))
            .build(),
    );
}
