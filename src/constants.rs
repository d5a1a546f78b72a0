/// Constants used by tabular parsing and null detection.
pub mod tsv {
    /// Field separator for every tabular file read or written.
    pub const FIELD_DELIMITER: char = '\t';
    /// Quote character used when a cell contains a delimiter, quote, or newline.
    pub const QUOTE: char = '"';
    /// Cell contents treated as missing when reading.
    pub const NULL_TOKENS: [&str; 11] = [
        "", "NA", "N/A", "NaN", "nan", "-NaN", "null", "NULL", "None", "#N/A", "<NA>",
    ];
    /// Rendering of a missing value when it is scanned as text.
    pub const MISSING_TOKEN: &str = "nan";
    /// File extensions routed to the tab-separated reader.
    pub const TABULAR_EXTENSIONS: [&str; 2] = ["tsv", "txt"];
    /// Extension used for every written sample/summary file.
    pub const OUTPUT_EXTENSION: &str = "tsv";
}

/// Constants used by record loading.
pub mod loader {
    /// Default identifier column.
    pub const ID_COLUMN: &str = "pmid";
    /// Auxiliary key column that must stay textual.
    pub const PMC_COLUMN: &str = "pmc";
    /// Canonical publication-year column.
    pub const YEAR_COLUMN: &str = "year";
    /// Legacy column renamed to `year` when `year` is absent.
    pub const LEGACY_YEAR_COLUMN: &str = "pubdate";
    /// Title column.
    pub const TITLE_COLUMN: &str = "title";
}

/// Constants used by the keyword annotator.
pub mod annotate {
    /// Default novelty keyword substrings.
    pub const DEFAULT_KEYWORDS: [&str; 4] = ["novel", "innovat", "first", "new"];
    /// Column name used when the annotation is written out.
    pub const ANNOTATION_COLUMN: &str = "novelty_mention";
    /// Default text field scanned for keywords.
    pub const DEFAULT_TEXT_FIELD: &str = "conclusions";
    /// Records covered by one cost unit of the downstream classifier.
    pub const COST_RECORDS_PER_UNIT: f64 = 13_000.0;
    /// Dollars per cost unit of the downstream classifier.
    pub const COST_DOLLARS_PER_UNIT: f64 = 20.0;
}

/// Constants used by the delimited index builder.
pub mod index {
    /// Separator inside the multi-valued key column.
    pub const DEFAULT_DELIMITER: char = ';';
    /// Default multi-valued key column of the mapping source.
    pub const DEFAULT_KEY_COLUMN: &str = "BroadSubjectTerms";
    /// Default value column of the mapping source.
    pub const DEFAULT_VALUE_COLUMN: &str = "JournalTitle";
}

/// Constants used by the stratified sampler and its summary.
pub mod sampler {
    /// Default seed for per-category draws.
    pub const DEFAULT_SEED: u64 = 42;
    /// Default per-category sample bound.
    pub const DEFAULT_SAMPLE_SIZE: usize = 100;
    /// Default grouping field on records.
    pub const DEFAULT_GROUP_FIELD: &str = "journal";
    /// Summary file written next to the output directory.
    pub const SUMMARY_FILENAME: &str = "detected_rate_pubmed.tsv";
    /// Decimal places kept in `detected_rate_num`.
    pub const RATE_DECIMALS: i32 = 4;
    /// Summary column headers, in file order.
    pub const SUMMARY_COLUMNS: [&str; 5] = [
        "BST",
        "n",
        "n_detected",
        "detected_rate_str",
        "detected_rate_num",
    ];
}

/// Constants used by the batch-classification request/response files.
pub mod batch {
    /// HTTP method recorded in each request line.
    pub const REQUEST_METHOD: &str = "POST";
    /// Endpoint recorded in each request line.
    pub const REQUEST_URL: &str = "/v1/chat/completions";
    /// Default model name.
    pub const DEFAULT_MODEL: &str = "gpt-4o";
    /// Token cap per request.
    pub const MAX_TOKENS: u32 = 1000;
    /// Response format requested from the classifier.
    pub const RESPONSE_FORMAT: &str = "json_object";
    /// System prompt attached to every request.
    pub const SYSTEM_PROMPT: &str = "You are a clinician specializing in medical research analysis tasked with classifying sentences from PubMed abstracts based on their novelty.";
    /// Placeholder replaced by the taxonomy text.
    pub const TAXONOMY_PLACEHOLDER: &str = "{taxonomy}";
    /// Placeholder replaced by the record's conclusion text.
    pub const CONCLUSION_PLACEHOLDER: &str = "{conclusion}";
    /// JSON key carrying the category inside a response payload.
    pub const CATEGORY_KEY: &str = "category";
    /// Label emitted when a response payload has no JSON object.
    pub const NO_JSON_LABEL: &str = "No JSON found";
    /// Header of the label column in the converted response table.
    pub const OUTPUT_COLUMN: &str = "output";
}
