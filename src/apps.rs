use std::error::Error;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Parser, Subcommand, error::ErrorKind};
use tracing_subscriber::EnvFilter;

use crate::audit::{AuditSink, StdoutSink, TracingSink};
use crate::batch::{
    RequestSettings, build_requests, read_response_file, write_label_table, write_request_file,
};
use crate::config::{ColumnConfig, PipelineConfig, PipelinePaths};
use crate::constants::annotate::DEFAULT_TEXT_FIELD;
use crate::constants::batch::DEFAULT_MODEL;
use crate::constants::sampler::{DEFAULT_SAMPLE_SIZE, DEFAULT_SEED};
use crate::pipeline::Pipeline;
use crate::transport::tsv::read_table_verbatim;

#[derive(Debug, Parser)]
#[command(
    name = "annotation-prep",
    disable_help_subcommand = true,
    about = "Prepare literature records for novelty annotation",
    long_about = "Merge metadata with abstract conclusions, flag novelty keywords, and draw seeded per-category samples. Also converts batch-classification request and response files."
)]
struct AnnotationPrepCli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full preparation pipeline.
    Prepare(PrepareArgs),
    /// Convert a conclusions table into a batch request file.
    BatchRequests(BatchRequestArgs),
    /// Convert a batch response file into an identifier/label table.
    BatchLabels(BatchLabelArgs),
}

#[derive(Debug, clap::Args)]
#[command(
    after_help = "The summary table is written next to the output directory, as detected_rate_pubmed.tsv."
)]
struct PrepareArgs {
    #[arg(long, value_name = "PATH", help = "Bibliographic metadata table (.tsv)")]
    meta: PathBuf,
    #[arg(
        long = "conclusions-structured",
        value_name = "PATH",
        help = "Primary conclusions table (structured abstracts)"
    )]
    conclusions_structured: PathBuf,
    #[arg(
        long = "conclusions-unstructured",
        value_name = "PATH",
        help = "Secondary conclusions table (unstructured abstracts)"
    )]
    conclusions_unstructured: PathBuf,
    #[arg(
        long = "journal-bsts",
        value_name = "PATH",
        help = "Journal to broad subject term mapping table"
    )]
    journal_bsts: PathBuf,
    #[arg(
        long = "output-dir",
        value_name = "DIR",
        help = "Directory receiving one sample file per category"
    )]
    output_dir: PathBuf,
    #[arg(long, default_value_t = DEFAULT_SEED, help = "Deterministic seed for every category draw")]
    seed: u64,
    #[arg(
        long = "sample-size",
        default_value_t = DEFAULT_SAMPLE_SIZE,
        help = "Upper bound on records sampled per category"
    )]
    sample_size: usize,
    #[arg(
        long = "keyword",
        value_name = "KEYWORD",
        help = "Novelty keyword substring, repeat as needed (defaults to the built-in set)"
    )]
    keywords: Vec<String>,
    #[arg(
        long = "text-field",
        default_value = DEFAULT_TEXT_FIELD,
        help = "Text column scanned for keywords"
    )]
    text_field: String,
    #[arg(
        long = "log-file",
        value_name = "PATH",
        help = "Also append audit messages to this file"
    )]
    log_file: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
struct BatchRequestArgs {
    #[arg(long, value_name = "PATH", help = "Table with pmid and conclusions columns")]
    input: PathBuf,
    #[arg(long, value_name = "PATH", help = "Request file to write (.jsonl)")]
    output: PathBuf,
    #[arg(long, value_name = "PATH", help = "Prompt template file")]
    prompt: PathBuf,
    #[arg(long, value_name = "PATH", help = "Taxonomy file substituted into the prompt")]
    taxonomy: PathBuf,
    #[arg(long, default_value = DEFAULT_MODEL, help = "Model named in every request")]
    model: String,
}

#[derive(Debug, clap::Args)]
struct BatchLabelArgs {
    #[arg(long, value_name = "PATH", help = "Response file (.jsonl)")]
    input: PathBuf,
    #[arg(long, value_name = "PATH", help = "Label table to write (.tsv)")]
    output: PathBuf,
}

/// Parse `args_iter` (without the program name) and run the chosen subcommand.
pub fn run_cli<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let Some(cli) = parse_cli::<AnnotationPrepCli, _>(
        std::iter::once("annotation-prep".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    match cli.command {
        Command::Prepare(args) => run_prepare(args),
        Command::BatchRequests(args) => {
            init_tracing(None)?;
            run_batch_requests(args)
        }
        Command::BatchLabels(args) => {
            init_tracing(None)?;
            run_batch_labels(args)
        }
    }
}

fn run_prepare(args: PrepareArgs) -> Result<(), Box<dyn Error>> {
    let logs_to_file = init_tracing(args.log_file.as_deref())?;

    let mut config = PipelineConfig::default()
        .with_seed(args.seed)
        .with_sample_size(args.sample_size)
        .with_columns(ColumnConfig {
            text_field: args.text_field,
            ..ColumnConfig::default()
        });
    if !args.keywords.is_empty() {
        config = config.with_keywords(args.keywords);
    }
    let paths = PipelinePaths {
        metadata: args.meta,
        structured_text: args.conclusions_structured,
        unstructured_text: args.conclusions_unstructured,
        category_mapping: args.journal_bsts,
        output_dir: args.output_dir,
    };

    let tee = (StdoutSink, TracingSink);
    let sink: &dyn AuditSink = if logs_to_file { &tee } else { &StdoutSink };
    let outcome = Pipeline::new(config)?.with_sink(sink).run(&paths)?;
    println!(
        "Prepared {} categories from {} records ({} flagged); summary at {}",
        outcome.categories,
        outcome.joined_records,
        outcome.annotation.flagged,
        outcome.sampling.summary_path.display()
    );
    Ok(())
}

fn run_batch_requests(args: BatchRequestArgs) -> Result<(), Box<dyn Error>> {
    let table = read_table_verbatim(&args.input)?;
    let settings = RequestSettings::new(
        fs::read_to_string(&args.prompt)?,
        fs::read_to_string(&args.taxonomy)?,
    )
    .with_model(args.model);
    let requests = build_requests(&table, &settings)?;
    write_request_file(&requests, &args.output, None)?;
    Ok(())
}

fn run_batch_labels(args: BatchLabelArgs) -> Result<(), Box<dyn Error>> {
    let labels = read_response_file(&args.input)?;
    write_label_table(&labels, &args.output, None)?;
    Ok(())
}

/// Install the global subscriber. With a log file, INFO and above (audit
/// messages included) are appended there; returns whether that happened.
fn init_tracing(log_file: Option<&Path>) -> Result<bool, Box<dyn Error>> {
    let Some(path) = log_file else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
        return Ok(false);
    };
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(true)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn prepare_flags_parse_with_defaults() {
        let cli = parse_cli::<AnnotationPrepCli, _>(args(&[
            "annotation-prep",
            "prepare",
            "--meta",
            "meta.tsv",
            "--conclusions-structured",
            "str.tsv",
            "--conclusions-unstructured",
            "unstr.tsv",
            "--journal-bsts",
            "bsts.tsv",
            "--output-dir",
            "out/bst",
            "--keyword",
            "novel",
            "--keyword",
            "unprecedented",
        ]))
        .unwrap()
        .unwrap();
        let Command::Prepare(prepare) = cli.command else {
            panic!("expected prepare");
        };
        assert_eq!(prepare.seed, 42);
        assert_eq!(prepare.sample_size, 100);
        assert_eq!(prepare.text_field, "conclusions");
        assert_eq!(prepare.keywords, vec!["novel", "unprecedented"]);
        assert!(prepare.log_file.is_none());
    }

    #[test]
    fn missing_required_flag_is_an_error() {
        let result = parse_cli::<AnnotationPrepCli, _>(args(&["annotation-prep", "prepare"]));
        assert!(result.is_err());
    }

    #[test]
    fn help_returns_none() {
        let result =
            parse_cli::<AnnotationPrepCli, _>(args(&["annotation-prep", "--help"])).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn batch_subcommands_round_trip_files() {
        let temp = tempdir().unwrap();
        let table = temp.path().join("conclusions.tsv");
        let prompt = temp.path().join("prompt.txt");
        let taxonomy = temp.path().join("taxonomy.txt");
        let requests = temp.path().join("requests.jsonl");
        fs::write(&table, "pmid\tconclusions\n11\tA new method.\n").unwrap();
        fs::write(&prompt, "{taxonomy}\n{conclusion}").unwrap();
        fs::write(&taxonomy, "1 - new finding").unwrap();

        run_cli(
            args(&[
                "batch-requests",
                "--input",
                table.to_str().unwrap(),
                "--output",
                requests.to_str().unwrap(),
                "--prompt",
                prompt.to_str().unwrap(),
                "--taxonomy",
                taxonomy.to_str().unwrap(),
            ])
            .into_iter(),
        )
        .unwrap();
        let written = fs::read_to_string(&requests).unwrap();
        assert_eq!(written.lines().count(), 1);
        assert!(written.contains("\"custom_id\":\"11\""));
        assert!(written.contains("\"model\":\"gpt-4o\""));

        let responses = temp.path().join("responses.jsonl");
        let labels = temp.path().join("labels.tsv");
        fs::write(
            &responses,
            "{\"custom_id\":\"11\",\"response\":{\"body\":{\"choices\":[{\"message\":{\"role\":\"assistant\",\"content\":\"{\\\"category\\\": \\\"1 - New finding\\\"}\"}}]}}}\n",
        )
        .unwrap();
        run_cli(
            args(&[
                "batch-labels",
                "--input",
                responses.to_str().unwrap(),
                "--output",
                labels.to_str().unwrap(),
            ])
            .into_iter(),
        )
        .unwrap();
        assert_eq!(
            fs::read_to_string(&labels).unwrap(),
            "pmid\toutput\n11\tnew finding\n"
        );
    }

    #[test]
    fn batch_requests_keep_null_like_cells_as_text() {
        let temp = tempdir().unwrap();
        let table = temp.path().join("conclusions.tsv");
        let prompt = temp.path().join("prompt.txt");
        let taxonomy = temp.path().join("taxonomy.txt");
        let requests = temp.path().join("requests.jsonl");
        fs::write(&table, "pmid\tconclusions\nNA\tNone\n").unwrap();
        fs::write(&prompt, "[{conclusion}]").unwrap();
        fs::write(&taxonomy, "").unwrap();

        run_cli(
            args(&[
                "batch-requests",
                "--input",
                table.to_str().unwrap(),
                "--output",
                requests.to_str().unwrap(),
                "--prompt",
                prompt.to_str().unwrap(),
                "--taxonomy",
                taxonomy.to_str().unwrap(),
            ])
            .into_iter(),
        )
        .unwrap();
        let written = fs::read_to_string(&requests).unwrap();
        assert_eq!(written.lines().count(), 1);
        assert!(written.contains("\"custom_id\":\"NA\""));
        assert!(written.contains("\"content\":\"[None]\""));
    }
}
